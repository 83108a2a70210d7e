// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/flockwatch-rs

//! Rolling per-emitter sighting history

use std::collections::{BTreeMap, VecDeque};

use super::Sighting;

/// Bounded ring buffer of sightings per emitter.
///
/// Owned by exactly one classifier task, so no locking.
#[derive(Debug, Clone)]
pub struct SightingHistory {
    buffers: BTreeMap<String, VecDeque<Sighting>>,
    capacity: usize,
}

impl SightingHistory {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, sighting: Sighting) {
        let buffer = self.buffers
            .entry(sighting.emitter_id.clone())
            .or_insert_with(VecDeque::new);

        buffer.push_back(sighting);
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    /// Drop every sighting older than `cutoff`
    pub fn prune(&mut self, cutoff: i64) {
        self.buffers.retain(|_, buffer| {
            buffer.retain(|s| s.timestamp >= cutoff);
            !buffer.is_empty()
        });
    }

    /// Sightings of `emitter_id` at or after `since`, oldest first
    pub fn within<'a>(&'a self, emitter_id: &str, since: i64) -> impl Iterator<Item = &'a Sighting> + 'a {
        self.buffers
            .get(emitter_id)
            .into_iter()
            .flat_map(move |b| b.iter().filter(move |s| s.timestamp >= since))
    }

    pub fn latest(&self, emitter_id: &str) -> Option<&Sighting> {
        self.buffers.get(emitter_id).and_then(|b| b.back())
    }

    /// Most recent sighting strictly before `timestamp`
    pub fn before(&self, emitter_id: &str, timestamp: i64) -> Option<&Sighting> {
        self.buffers
            .get(emitter_id)
            .and_then(|b| b.iter().rev().find(|s| s.timestamp < timestamp))
    }

    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.buffers
            .values()
            .filter_map(|b| b.iter().map(|s| s.timestamp).min())
            .min()
    }

    pub fn emitter_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn len(&self) -> usize {
        self.buffers.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for SightingHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
