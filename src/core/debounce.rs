//! Debounce registry: one cooldown window per violation identity
//!
//! `allow` is a check-and-set. A denied call leaves the entry untouched, so
//! a stream of identical signals fires once per cooldown, not once per
//! quiet period.

use std::collections::HashMap;

use crate::types::{Timestamp, Violation, ViolationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    first_seen_at: Timestamp,
    last_fire: Timestamp,
    suppressed_until: Timestamp,
}

/// Cooldown registry keyed on `kind + message`
#[derive(Debug, Default)]
pub struct DebounceRegistry {
    entries: HashMap<String, Entry>,
}

impl DebounceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True and records `now` if the key never fired or its cooldown elapsed
    pub fn allow(&mut self, key: &str, now: Timestamp, cooldown_ms: u64) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                if now.saturating_sub(entry.last_fire) < cooldown_ms {
                    return false;
                }
                entry.last_fire = now;
                entry.suppressed_until = now.saturating_add(cooldown_ms);
                true
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        first_seen_at: now,
                        last_fire: now,
                        suppressed_until: now.saturating_add(cooldown_ms),
                    },
                );
                true
            }
        }
    }

    /// Gate a violation identity, returning its record when allowed
    pub fn raise(
        &mut self,
        kind: ViolationKind,
        message: &str,
        now: Timestamp,
        cooldown_ms: u64,
    ) -> Option<Violation> {
        let key = kind.key(message);
        if !self.allow(&key, now, cooldown_ms) {
            return None;
        }
        self.get(kind, message)
    }

    /// Current record for an identity
    pub fn get(&self, kind: ViolationKind, message: &str) -> Option<Violation> {
        self.entries.get(&kind.key(message)).map(|entry| Violation {
            kind,
            message: message.to_string(),
            first_seen_at: entry.first_seen_at,
            last_suppressed_until: entry.suppressed_until,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything (session restart)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
