//! Sliding-window event tracking.
//!
//! An [`EventWindow`] is a time-ordered run of millisecond timestamps. An
//! occurrence at `t` is live at `now` while `t > now - window`. A
//! [`WindowTracker`] keeps one window per key behind a `DashMap`, so the event
//! path and the background compactor can touch it concurrently.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::hash::Hash;

/// One tracked actor inside one group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub group: String,
    pub subject: String,
}

impl ScopeKey {
    pub fn new(group: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            subject: subject.into(),
        }
    }
}

fn is_live(at: u64, now: u64, window_ms: u64) -> bool {
    at.saturating_add(window_ms) > now
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventWindow {
    stamps: VecDeque<u64>,
}

impl EventWindow {
    pub fn from_stamps(stamps: impl IntoIterator<Item = u64>) -> Self {
        let mut stamps: Vec<u64> = stamps.into_iter().collect();
        stamps.sort_unstable();
        Self {
            stamps: stamps.into(),
        }
    }

    /// Appends an occurrence, then drops everything that fell out of the
    /// window relative to the newest stamp held.
    pub fn record(&mut self, at: u64, window_ms: u64) {
        match self.stamps.back() {
            Some(&last) if at < last => {
                let idx = self.stamps.partition_point(|&t| t <= at);
                self.stamps.insert(idx, at);
            }
            _ => self.stamps.push_back(at),
        }
        let newest = self.stamps.back().copied().unwrap_or(at);
        self.prune(newest, window_ms);
    }

    pub fn prune(&mut self, now: u64, window_ms: u64) -> usize {
        let before = self.stamps.len();
        while self.stamps.front().map_or(false, |&t| !is_live(t, now, window_ms)) {
            self.stamps.pop_front();
        }
        before - self.stamps.len()
    }

    pub fn count(&self, now: u64, window_ms: u64) -> usize {
        self.stamps
            .iter()
            .filter(|&&t| t <= now && is_live(t, now, window_ms))
            .count()
    }

    /// Oldest occurrence still inside the window.
    pub fn oldest_live(&self, now: u64, window_ms: u64) -> Option<u64> {
        self.stamps
            .iter()
            .copied()
            .find(|&t| is_live(t, now, window_ms))
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn stamps(&self) -> Vec<u64> {
        self.stamps.iter().copied().collect()
    }
}

/// Per-key event windows sharing one retention period.
pub struct WindowTracker<K> {
    series: DashMap<K, EventWindow>,
    window_ms: u64,
}

impl<K> WindowTracker<K>
where
    K: Eq + Hash + Clone + Ord,
{
    pub fn new(window_ms: u64) -> Self {
        Self {
            series: DashMap::new(),
            window_ms,
        }
    }

    pub fn record(&self, key: K, at: u64) {
        self.series
            .entry(key)
            .or_default()
            .record(at, self.window_ms);
    }

    /// Live occurrences for `key`. Unknown keys count as zero and are not
    /// created; a known key is pruned as a side effect.
    pub fn count(&self, key: &K, now: u64) -> usize {
        match self.series.get_mut(key) {
            Some(mut window) => {
                window.prune(now, self.window_ms);
                window.count(now, self.window_ms)
            }
            None => 0,
        }
    }

    pub fn remove(&self, key: &K) {
        self.series.remove(key);
    }

    /// Evicts expired stamps across every series and drops series left empty.
    /// Returns the number of stamps evicted.
    pub fn sweep(&self, now: u64) -> usize {
        let mut evicted = 0;
        self.series.retain(|_, window| {
            evicted += window.prune(now, self.window_ms);
            !window.is_empty()
        });
        evicted
    }

    /// Key-ordered copy of every series.
    pub fn entries(&self) -> Vec<(K, Vec<u64>)> {
        let mut out: Vec<(K, Vec<u64>)> = self
            .series
            .iter()
            .map(|e| (e.key().clone(), e.value().stamps()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn restore(&self, entries: Vec<(K, Vec<u64>)>) {
        self.series.clear();
        for (key, stamps) in entries {
            if stamps.is_empty() {
                continue;
            }
            self.series.insert(key, EventWindow::from_stamps(stamps));
        }
    }
}
