// core types shared by the simulator, the sink and the aggregation engine

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

// ids travel on the wire as strings, so they are strings everywhere
pub type VideoId = String;
pub type UserId = String;
pub type SessionId = String;
pub type EventId = String;

/// Simulated time in milliseconds since the start of the run. One second
/// of modeled viewing is 1000 ms.
pub type SimMillis = u64;

/// Base instant that simulated time is anchored to. Fixed so that a
/// replayed run produces bit-identical `event_timestamp` strings.
pub fn base_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Render a simulated instant as the ISO-8601 UTC wire timestamp.
pub fn wire_timestamp(base: DateTime<Utc>, now: SimMillis) -> String {
    (base + Duration::milliseconds(now as i64)).to_rfc3339()
}

/// Random 128-bit identifier as 32 hex chars.
///
/// Ids come from the run's seeded RNG rather than an OS uuid source so a
/// whole run is replayable from its seed alone.
pub fn random_id(rng: &mut impl RngCore) -> String {
    format!("{:016x}{:016x}", rng.next_u64(), rng.next_u64())
}

// ============================================================================
// Simulated Clock
// ============================================================================

/// Monotone simulated clock. All pacing, pause holds, retry backoff and
/// inter-batch idling advance this clock; nothing in the simulator sleeps
/// on the wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimClock {
    now: SimMillis,
}

impl SimClock {
    pub fn new() -> Self {
        Self { now: 0 }
    }

    pub fn now(&self) -> SimMillis {
        self.now
    }

    pub fn advance(&mut self, delta: SimMillis) {
        self.now += delta;
    }

    /// Jump forward to `at`. Ignored if `at` is in the past.
    pub fn advance_to(&mut self, at: SimMillis) {
        if at > self.now {
            self.now = at;
        }
    }
}

// ============================================================================
// Viewer Events
// ============================================================================

/// Telemetry event kinds. Serialized names are the wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewerEventKind {
    SegmentStart,
    SegmentEnd,
    Pause,
    Play,
    Seek,
}

impl ViewerEventKind {
    /// +1 for SEGMENT_START, -1 for SEGMENT_END, 0 otherwise.
    pub fn viewer_delta(&self) -> i32 {
        match self {
            ViewerEventKind::SegmentStart => 1,
            ViewerEventKind::SegmentEnd => -1,
            _ => 0,
        }
    }
}

/// One telemetry record. Field names match the wire shape exactly; the
/// partition/routing key is `video_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerEvent {
    pub event_id: EventId,
    pub video_id: VideoId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub event_timestamp: String,
    pub event_type: ViewerEventKind,
    pub video_time_sec: u32,
    pub delta_viewers: i32,
}

// ============================================================================
// Log Transport & Read Side
// ============================================================================

/// Producer-side handle to the durable partitioned log.
///
/// `publish` acknowledges only once the record is durable on every replica
/// of the target partition. Per-partition submission order is the order any
/// consumer observes; there is no cross-partition ordering.
pub trait LogTransport {
    /// Startup reachability probe. Failure here is fatal to the process.
    fn connect_check(&mut self) -> Result<(), TransportError>;

    /// Append one serialized record to the partition for `partition_key`.
    fn publish(&mut self, partition_key: &str, record: &str) -> Result<(), TransportError>;
}

/// Consumer-side read capability over the log.
pub trait EventLog {
    /// All records of one partition in append order. Unknown partitions
    /// read as empty, not as an error.
    fn scan_partition(&self, partition_key: &str) -> Result<Vec<String>, LogError>;

    /// Every partition key with at least one record, in a stable order.
    fn partition_keys(&self) -> Result<Vec<String>, LogError>;

    /// Reachability probe for the read side.
    fn ping(&self) -> Result<(), LogError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Producer-side delivery failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The broker did not acknowledge the write (transient; retried).
    Unavailable(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Unavailable(msg) => write!(f, "log transport unavailable: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Consumer-side read failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// The log cannot be reached for reads.
    Unavailable(String),
}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogError::Unavailable(msg) => write!(f, "event log unavailable: {}", msg),
        }
    }
}

impl std::error::Error for LogError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_event_wire_shape() {
        let event = ViewerEvent {
            event_id: "e1".into(),
            video_id: "v1".into(),
            user_id: "u1".into(),
            session_id: "s1".into(),
            event_timestamp: wire_timestamp(base_instant(), 1500),
            event_type: ViewerEventKind::SegmentStart,
            video_time_sec: 42,
            delta_viewers: ViewerEventKind::SegmentStart.viewer_delta(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"SEGMENT_START\""));
        assert!(json.contains("\"video_time_sec\":42"));
        assert!(json.contains("\"delta_viewers\":1"));
        assert!(json.contains("2024-01-01T00:00:01.500"));

        let back: ViewerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_viewer_delta_rule() {
        assert_eq!(ViewerEventKind::SegmentStart.viewer_delta(), 1);
        assert_eq!(ViewerEventKind::SegmentEnd.viewer_delta(), -1);
        assert_eq!(ViewerEventKind::Pause.viewer_delta(), 0);
        assert_eq!(ViewerEventKind::Play.viewer_delta(), 0);
        assert_eq!(ViewerEventKind::Seek.viewer_delta(), 0);
    }

    #[test]
    fn test_clock_is_monotone() {
        let mut clock = SimClock::new();
        clock.advance(100);
        clock.advance_to(50);
        assert_eq!(clock.now(), 100);
        clock.advance_to(250);
        assert_eq!(clock.now(), 250);
    }

    #[test]
    fn test_random_id_is_seed_stable() {
        let a = random_id(&mut StdRng::from_seed([7u8; 32]));
        let b = random_id(&mut StdRng::from_seed([7u8; 32]));
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }
}
