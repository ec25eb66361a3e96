//! Bounded buffer of recent command outputs.

use std::collections::VecDeque;

/// Keeps the last `capacity` entries; pushing past capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries oldest first, separated by `separator`.
    pub fn join(&self, separator: &str) -> String {
        self.entries
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(separator)
    }
}
