use std::collections::HashSet;

/// Payloads already handled by the running scanner.
///
/// Lives only as long as the process; nothing is persisted. The log store
/// itself has no uniqueness constraint, so a new session scans everyone
/// afresh.
#[derive(Debug, Default)]
pub struct SessionDeduplicator {
    seen: HashSet<String>,
}

impl SessionDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records `payload` the first time it is offered,
    /// false on every later call with the same payload.
    pub fn should_process(&mut self, payload: &str) -> bool {
        if self.seen.contains(payload) {
            return false;
        }
        self.seen.insert(payload.to_string())
    }

    pub fn has_seen(&self, payload: &str) -> bool {
        self.seen.contains(payload)
    }

    /// Mark a payload as handled. Returns false if it already was.
    pub fn record(&mut self, payload: &str) -> bool {
        self.should_process(payload)
    }

    /// Number of distinct payloads handled this session.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
