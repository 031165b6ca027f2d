// event sink adapter: bounded-retry delivery into the partitioned log

use std::collections::VecDeque;

use log::warn;
use serde::Deserialize;

use crate::vr_interface::{LogTransport, SimClock, SimMillis, TransportError, ViewerEvent};

// ============================================================================
// Configuration
// ============================================================================

/// Delivery policy. Retry count and backoff are explicit fields so
/// failure-injection tests can override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Total attempts per record, first send included.
    pub max_attempts: u32,

    /// Simulated wait between attempts.
    pub backoff_ms: SimMillis,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 1_000,
        }
    }
}

/// Outcome of a batch durability barrier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records acknowledged by all replicas since the last flush.
    pub delivered: usize,

    /// Records that exhausted the retry budget this flush.
    pub failed: usize,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum SinkError {
    /// The record could not be serialized to the wire shape.
    Encode(serde_json::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Encode(e) => write!(f, "failed to encode event: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

// ============================================================================
// Producer
// ============================================================================

struct PendingRecord {
    partition_key: String,
    payload: String,
    attempts: u32,
}

/// Producer-side adapter over a `LogTransport`.
///
/// `send` makes one delivery attempt and parks failures; `flush` is the
/// durability barrier, retrying parked records with a simulated backoff
/// until each is acknowledged or its budget is gone. Events route to the
/// partition named by their `video_id`, which is the only ordering
/// guarantee the system gives.
pub struct SinkProducer<T: LogTransport> {
    config: SinkConfig,
    transport: T,
    pending: VecDeque<PendingRecord>,
    delivered_since_flush: usize,
    delivered_total: u64,
    failed_total: u64,
}

impl<T: LogTransport> SinkProducer<T> {
    /// Connect to the log. An unreachable sink at startup is fatal, so the
    /// probe error propagates.
    pub fn connect(mut transport: T, config: SinkConfig) -> Result<Self, TransportError> {
        transport.connect_check()?;
        Ok(Self {
            config,
            transport,
            pending: VecDeque::new(),
            delivered_since_flush: 0,
            delivered_total: 0,
            failed_total: 0,
        })
    }

    /// Submit one event. Asynchronous from the caller's view: a transport
    /// failure here is not an error, the record is parked for `flush`.
    ///
    /// A record whose partition already has a parked predecessor is parked
    /// unattempted, keeping per-partition submission order intact.
    pub fn send(&mut self, event: &ViewerEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(event).map_err(SinkError::Encode)?;

        let blocked = self
            .pending
            .iter()
            .any(|r| r.partition_key == event.video_id);
        if blocked {
            self.pending.push_back(PendingRecord {
                partition_key: event.video_id.clone(),
                payload,
                attempts: 0,
            });
            return Ok(());
        }

        match self.transport.publish(&event.video_id, &payload) {
            Ok(()) => {
                self.delivered_since_flush += 1;
                self.delivered_total += 1;
            }
            Err(_) => self.pending.push_back(PendingRecord {
                partition_key: event.video_id.clone(),
                payload,
                attempts: 1,
            }),
        }
        Ok(())
    }

    /// Block until every submitted record is acknowledged or out of
    /// retries. Backoff advances the simulated clock, never the wall clock.
    pub fn flush(&mut self, clock: &mut SimClock) -> FlushReport {
        let mut failed = 0;

        while let Some(mut record) = self.pending.pop_front() {
            loop {
                if record.attempts >= self.config.max_attempts {
                    warn!(
                        "event for partition {} dropped after {} attempts",
                        &record.partition_key[..record.partition_key.len().min(8)],
                        record.attempts
                    );
                    failed += 1;
                    self.failed_total += 1;
                    break;
                }

                // no backoff before a record's very first attempt
                if record.attempts > 0 {
                    clock.advance(self.config.backoff_ms);
                }
                record.attempts += 1;
                match self.transport.publish(&record.partition_key, &record.payload) {
                    Ok(()) => {
                        self.delivered_since_flush += 1;
                        self.delivered_total += 1;
                        break;
                    }
                    Err(_) => continue,
                }
            }
        }

        let report = FlushReport {
            delivered: self.delivered_since_flush,
            failed,
        };
        self.delivered_since_flush = 0;
        report
    }

    pub fn delivered_total(&self) -> u64 {
        self.delivered_total
    }

    pub fn failed_total(&self) -> u64 {
        self.failed_total
    }

    /// Release the connection, reporting lifetime delivery counts.
    pub fn close(self) -> (u64, u64) {
        (self.delivered_total, self.failed_total)
    }
}
