use chrono::Local;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Bounded, in-memory record of user-facing transfer events.
/// Oldest entries are dropped once `capacity` is exceeded.
#[derive(Debug)]
pub struct TransferLog {
    entries: RwLock<VecDeque<String>>,
    capacity: usize,
}

impl Default for TransferLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl TransferLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a message stamped `[HH:MM:SS]` in local time. Returns the stored entry.
    pub fn push(&self, message: &str) -> String {
        let entry = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }

        entry
    }

    /// Copy of all retained entries, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
