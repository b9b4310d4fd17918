use std::collections::HashMap;

use relay_core::SessionId;

/// Per-session cooldown gate. Does not limit the global rate.
pub struct RateLimiter {
    cooldown_ms: u64,
    last_accepted: HashMap<SessionId, i64>,
}

impl RateLimiter {
    /// Create a limiter with the given per-session cooldown.
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            last_accepted: HashMap::new(),
        }
    }

    /// Configured cooldown, reported back in `rate_limited` notices.
    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    /// Returns `true` when the session is still cooling down. Otherwise
    /// records `now` as its last accepted time and returns `false`.
    pub fn check_and_record(&mut self, id: &SessionId, now: i64) -> bool {
        if self.retry_after_ms(id, now) > 0 {
            return true;
        }
        self.last_accepted.insert(id.clone(), now);
        false
    }

    /// Milliseconds until the session may send again; 0 if it may now.
    pub fn retry_after_ms(&self, id: &SessionId, now: i64) -> u64 {
        let Some(&last) = self.last_accepted.get(id) else {
            return 0;
        };
        let cooldown = i64::try_from(self.cooldown_ms).unwrap_or(i64::MAX);
        let elapsed = now.saturating_sub(last);
        if elapsed < cooldown {
            u64::try_from(cooldown - elapsed).unwrap_or(self.cooldown_ms)
        } else {
            0
        }
    }

    /// Drop a session's history. Called on disconnect.
    pub fn forget(&mut self, id: &SessionId) {
        self.last_accepted.remove(id);
    }

    /// Number of sessions with a recorded accept.
    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }

    /// Whether the session has an accepted command on record.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.last_accepted.contains_key(id)
    }
}
