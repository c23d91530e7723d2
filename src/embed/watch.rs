//! Bounded watch list of source messages pending preview suppression.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long an entry stays eligible before eviction.
const WATCH_TTL: Duration = Duration::from_secs(30);

/// Tracks source messages whose native link preview should be hidden.
///
/// Entries are added when the bot intends to post an embed reply and removed
/// when suppression is attempted. Stale entries are evicted on each sweep, so
/// the map stays bounded without a background timer.
pub struct SuppressWatch {
    entries: HashMap<u64, Instant>,
    ttl: Duration,
}

impl SuppressWatch {
    pub fn new() -> Self {
        Self::with_ttl(WATCH_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Mark a message as pending suppression, refreshing any existing entry.
    pub fn mark(&mut self, message_id: u64) {
        self.entries.insert(message_id, Instant::now());
    }

    /// Remove a message's entry, reporting whether it was present.
    pub fn take(&mut self, message_id: u64) -> bool {
        self.entries.remove(&message_id).is_some()
    }

    /// Evict entries older than the TTL.
    pub fn sweep(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, inserted| inserted.elapsed() <= ttl);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SuppressWatch {
    fn default() -> Self {
        Self::new()
    }
}
