// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-memory counter store for per-identity admission state.
//!
//! Records live in a sharded map, so mutations to one identity are
//! serialized by its shard lock while unrelated identities proceed in
//! parallel. Counters are process-local and vanish on restart.

use crate::identity::IdentityKey;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Admission state for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub identity: IdentityKey,
    /// Requests admitted in the current window
    pub count: u32,
    /// Start of the current window
    pub window_start: Instant,
    /// Set once `count` reaches the CAPTCHA threshold
    pub captcha_required: bool,
}

impl RateLimitRecord {
    fn new(identity: IdentityKey, now: Instant) -> Self {
        Self {
            identity,
            count: 0,
            window_start: now,
            captcha_required: false,
        }
    }

    /// Clear the count and flag, keeping the current window.
    pub fn reset(&mut self) {
        self.count = 0;
        self.captcha_required = false;
    }

    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) > window
    }

    /// Start a fresh window if the current one has elapsed.
    fn roll_over(&mut self, now: Instant, window: Duration) -> bool {
        if self.is_expired(now, window) {
            self.reset();
            self.window_start = now;
            true
        } else {
            false
        }
    }

    /// Time left until the window rolls over.
    pub fn remaining_window(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }
}

/// Process-wide identity -> record map.
pub struct CounterStore {
    records: DashMap<IdentityKey, RateLimitRecord>,
    window: Duration,
    max_identities: usize,
}

impl CounterStore {
    pub fn new(window: Duration, max_identities: usize) -> Self {
        Self {
            records: DashMap::new(),
            window,
            max_identities: max_identities.max(1),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Snapshot of the record, created or rolled over as needed.
    pub fn get_or_create(&self, identity: &IdentityKey) -> RateLimitRecord {
        self.get_or_create_at(identity, Instant::now())
    }

    pub fn get_or_create_at(&self, identity: &IdentityKey, now: Instant) -> RateLimitRecord {
        self.update_at(identity, now, |record| record.clone())
    }

    pub fn increment(&self, identity: &IdentityKey) -> RateLimitRecord {
        self.update_at(identity, Instant::now(), |record| {
            record.count = record.count.saturating_add(1);
            record.clone()
        })
    }

    /// Clear count and flag. `window_start` is left untouched.
    pub fn reset(&self, identity: &IdentityKey) {
        if let Some(mut record) = self.records.get_mut(identity) {
            record.reset();
        }
    }

    /// Run `f` against the identity's record while holding its lock.
    ///
    /// The record is created on first sight and rolled over first when its
    /// window has elapsed. `f` must not block: the shard lock is held.
    ///
    /// Concurrent first sightings can each pass the capacity check, so the
    /// count is re-checked once the lock is released and any excess beyond
    /// `max_identities` is evicted.
    pub fn update_at<F, R>(&self, identity: &IdentityKey, now: Instant, f: F) -> R
    where
        F: FnOnce(&mut RateLimitRecord) -> R,
    {
        let is_new = !self.records.contains_key(identity);
        if is_new && self.records.len() >= self.max_identities {
            self.make_room(now);
        }

        let result = {
            let mut record = self
                .records
                .entry(identity.clone())
                .or_insert_with(|| RateLimitRecord::new(identity.clone(), now));

            if record.roll_over(now, self.window) {
                debug!(identity = %identity, "Rate limit window rolled over");
            }

            f(record.value_mut())
        };

        if is_new {
            let excess = self.records.len().saturating_sub(self.max_identities);
            if excess > 0 {
                self.evict_oldest(excess, Some(identity));
            }
        }

        result
    }

    /// Remove records whose window has elapsed. Returns how many were dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.records.len();
        let window = self.window;
        self.records
            .retain(|_, record| !record.is_expired(now, window));
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "Swept stale rate limit records");
        }
        removed
    }

    /// Free space for a new identity: sweep, then evict the oldest windows.
    fn make_room(&self, now: Instant) {
        if self.sweep(now) > 0 && self.records.len() < self.max_identities {
            return;
        }

        let excess = (self.records.len() + 1).saturating_sub(self.max_identities);
        if excess > 0 {
            self.evict_oldest(excess, None);
        }
    }

    /// Drop up to `count` records with the oldest windows, sparing `keep`.
    fn evict_oldest(&self, count: usize, keep: Option<&IdentityKey>) {
        let mut by_age: Vec<(IdentityKey, Instant)> = self
            .records
            .iter()
            .filter(|entry| Some(entry.key()) != keep)
            .map(|entry| (entry.key().clone(), entry.window_start))
            .collect();
        by_age.sort_by_key(|(_, start)| *start);

        let mut evicted = 0;
        for (identity, _) in by_age.into_iter().take(count) {
            if self.records.remove(&identity).is_some() {
                evicted += 1;
            }
        }
        debug!(evicted, "Evicted oldest rate limit records");
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
