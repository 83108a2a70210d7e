// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Cooldown gate - duplicate suppression per (domain, pattern, emitter)

use std::collections::HashMap;
use parking_lot::Mutex;

use super::PatternId;
use crate::sensors::Domain;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub domain: Domain,
    pub pattern: PatternId,
    /// `None` for aggregate patterns with no single emitter
    pub emitter_id: Option<String>,
}

/// Shared across classifiers; the only lock on the detection path
#[derive(Debug, Default)]
pub struct CooldownGate {
    last_fired: Mutex<HashMap<CooldownKey, i64>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True (and records `now`) if the key never fired or its window elapsed.
    /// A suppressed attempt leaves the entry untouched.
    pub fn should_fire(
        &self,
        domain: Domain,
        pattern: PatternId,
        emitter_id: Option<&str>,
        now: i64,
        min_interval_ms: i64,
    ) -> bool {
        let key = CooldownKey {
            domain,
            pattern,
            emitter_id: emitter_id.map(str::to_string),
        };

        let mut last_fired = self.last_fired.lock();
        match last_fired.get_mut(&key) {
            Some(last) if now - *last < min_interval_ms => false,
            Some(last) => {
                *last = now;
                true
            }
            None => {
                last_fired.insert(key, now);
                true
            }
        }
    }

    /// Remove keys that last fired before `timestamp`, returns how many went
    pub fn evict_older_than(&self, timestamp: i64) -> usize {
        let mut last_fired = self.last_fired.lock();
        let before = last_fired.len();
        last_fired.retain(|_, last| *last >= timestamp);
        before - last_fired.len()
    }

    pub fn last_fired(&self, key: &CooldownKey) -> Option<i64> {
        self.last_fired.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.last_fired.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.lock().is_empty()
    }
}
