//! Per-author auto-reply cooldowns
//!
//! Tracks when each (user, platform, author) last received an auto-reply.
//! The timestamp is recorded when a reply is dispatched, never when a rule
//! merely matches.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::Platform;

type CooldownKey = (String, Platform, String);

/// Normalize an author handle: surrounding whitespace and a leading `@`
/// are ignored, comparison is case-insensitive
pub fn normalize_author(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

pub struct CooldownTracker {
    window: i64,
    last_reply: Mutex<HashMap<CooldownKey, i64>>,
}

impl CooldownTracker {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: i64::try_from(window_secs).unwrap_or(i64::MAX),
            last_reply: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window
    }

    /// Seconds of cooldown left at time `at`, `None` if the author may be
    /// replied to
    pub fn remaining(&self, user_id: &str, platform: Platform, author: &str, at: i64) -> Option<i64> {
        let map = self.last_reply.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&key(user_id, platform, author))
            .and_then(|&last| remaining_at(last, self.window, at))
    }

    /// Atomically check the cooldown at `reference` and, if clear, record a
    /// reply dispatched at `dispatched_at`
    ///
    /// Returns false if another reply claimed the author first.
    pub fn try_claim(
        &self,
        user_id: &str,
        platform: Platform,
        author: &str,
        reference: i64,
        dispatched_at: i64,
    ) -> bool {
        let mut map = self.last_reply.lock().unwrap_or_else(|e| e.into_inner());
        let key = key(user_id, platform, author);

        if let Some(&last) = map.get(&key) {
            if remaining_at(last, self.window, reference).is_some() {
                return false;
            }
        }

        map.insert(key, dispatched_at);
        true
    }

    /// Forget entries whose window has passed
    pub fn prune(&self, now: i64) {
        let window = self.window;
        let mut map = self.last_reply.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|_, last| remaining_at(*last, window, now).is_some());
    }
}

fn key(user_id: &str, platform: Platform, author: &str) -> CooldownKey {
    (user_id.to_string(), platform, normalize_author(author))
}

fn remaining_at(last: i64, window: i64, at: i64) -> Option<i64> {
    let elapsed = at.saturating_sub(last);
    (elapsed < window).then(|| window - elapsed.max(0))
}
