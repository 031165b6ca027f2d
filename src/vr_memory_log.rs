// in-memory partitioned append-only log backend

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::vr_interface::{EventLog, LogError, LogTransport, TransportError};

/// In-memory stand-in for the durable broker/store pair: append-only
/// partitions keyed by partition key, each mirrored across N replicas.
/// A publish acknowledges only once every replica has the record.
///
/// Test knobs: `fail_next` makes the next N publishes (or the connect
/// probe) fail transiently; `set_unavailable` takes the read side down.
pub struct MemoryLog {
    replicas: usize,
    // partition key -> one record vec per replica, insertion-ordered so
    // reads and partition listings are reproducible
    partitions: IndexMap<String, Vec<Vec<String>>>,
    fail_next: usize,
    unavailable: bool,
}

impl MemoryLog {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            partitions: IndexMap::new(),
            fail_next: 0,
            unavailable: false,
        }
    }

    /// Shared handle in the form the simulator and engine both hold.
    pub fn shared(replicas: usize) -> Rc<RefCell<MemoryLog>> {
        Rc::new(RefCell::new(Self::new(replicas)))
    }

    /// Fail the next `n` publish/connect calls with a transient error.
    pub fn fail_next(&mut self, n: usize) {
        self.fail_next = n;
    }

    /// Toggle read-side availability.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Records in one partition, replica 0 view.
    pub fn partition_len(&self, partition_key: &str) -> usize {
        self.partitions
            .get(partition_key)
            .map(|r| r[0].len())
            .unwrap_or(0)
    }

    /// All replicas of a partition hold identical records in identical
    /// order. Trivially true here, but the invariant the ack mode promises.
    pub fn replicas_consistent(&self, partition_key: &str) -> bool {
        match self.partitions.get(partition_key) {
            Some(replicas) => replicas.windows(2).all(|w| w[0] == w[1]),
            None => true,
        }
    }

    fn take_failure(&mut self) -> bool {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            true
        } else {
            false
        }
    }
}

impl LogTransport for Rc<RefCell<MemoryLog>> {
    fn connect_check(&mut self) -> Result<(), TransportError> {
        let mut log = self.borrow_mut();
        if log.take_failure() {
            return Err(TransportError::Unavailable("connect probe failed".into()));
        }
        Ok(())
    }

    fn publish(&mut self, partition_key: &str, record: &str) -> Result<(), TransportError> {
        let mut log = self.borrow_mut();
        if log.take_failure() {
            return Err(TransportError::Unavailable("publish not acknowledged".into()));
        }

        let replicas = log.replicas;
        let partition = log
            .partitions
            .entry(partition_key.to_string())
            .or_insert_with(|| vec![Vec::new(); replicas]);
        for replica in partition.iter_mut() {
            replica.push(record.to_string());
        }
        Ok(())
    }
}

impl EventLog for Rc<RefCell<MemoryLog>> {
    fn scan_partition(&self, partition_key: &str) -> Result<Vec<String>, LogError> {
        let log = self.borrow();
        if log.unavailable {
            return Err(LogError::Unavailable("read rejected".into()));
        }
        Ok(log
            .partitions
            .get(partition_key)
            .map(|replicas| replicas[0].clone())
            .unwrap_or_default())
    }

    fn partition_keys(&self) -> Result<Vec<String>, LogError> {
        let log = self.borrow();
        if log.unavailable {
            return Err(LogError::Unavailable("read rejected".into()));
        }
        Ok(log.partitions.keys().cloned().collect())
    }

    fn ping(&self) -> Result<(), LogError> {
        if self.borrow().unavailable {
            return Err(LogError::Unavailable("ping rejected".into()));
        }
        Ok(())
    }
}
