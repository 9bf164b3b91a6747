use dashmap::DashMap;

use crate::config::StatusMentionConfig;
use crate::window::{ScopeKey, WindowTracker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAlert {
    pub group: String,
    pub poster: String,
    pub count: usize,
    pub cap: usize,
}

/// Per-group opt-in cap on how often a subject may reference the group from
/// status posts within the window.
pub struct StatusMentionGuard {
    enabled: DashMap<String, bool>,
    mentions: WindowTracker<ScopeKey>,
    cap: usize,
}

impl StatusMentionGuard {
    pub fn new(config: &StatusMentionConfig) -> Self {
        Self {
            enabled: DashMap::new(),
            mentions: WindowTracker::new(config.window_ms),
            cap: config.max_per_day,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn is_enabled(&self, group: &str) -> bool {
        self.enabled.get(group).map(|e| *e).unwrap_or(false)
    }

    pub fn set_enabled(&self, group: &str, enabled: bool) {
        self.enabled.insert(group.to_string(), enabled);
    }

    /// Records a status post mentioning `group` when the limit is enabled for
    /// it. The post that pushes the poster past the cap is recorded too, so
    /// the alert fires on `count > cap`.
    pub fn on_status_mention(&self, group: &str, poster: &str, now: u64) -> Option<StatusAlert> {
        if !self.is_enabled(group) {
            return None;
        }

        let key = ScopeKey::new(group, poster);
        self.mentions.record(key.clone(), now);
        let count = self.mentions.count(&key, now);

        (count > self.cap).then(|| StatusAlert {
            group: group.to_string(),
            poster: poster.to_string(),
            count,
            cap: self.cap,
        })
    }

    #[cfg(test)]
    pub fn mention_count(&self, group: &str, poster: &str, now: u64) -> usize {
        self.mentions.count(&ScopeKey::new(group, poster), now)
    }

    pub fn sweep(&self, now: u64) -> usize {
        self.mentions.sweep(now)
    }

    pub fn toggle_entries(&self) -> Vec<(String, bool)> {
        let mut out: Vec<(String, bool)> = self
            .enabled
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort();
        out
    }

    pub fn mention_entries(&self) -> Vec<(ScopeKey, Vec<u64>)> {
        self.mentions.entries()
    }

    pub fn restore(&self, toggles: Vec<(String, bool)>, mentions: Vec<(ScopeKey, Vec<u64>)>) {
        self.enabled.clear();
        for (group, enabled) in toggles {
            self.enabled.insert(group, enabled);
        }
        self.mentions.restore(mentions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "g@g.us";

    fn guard() -> StatusMentionGuard {
        StatusMentionGuard::new(&StatusMentionConfig::default())
    }

    #[test]
    fn test_disabled_group_never_alerts_or_tracks() {
        let guard = guard();
        for i in 0..10 {
            assert_eq!(guard.on_status_mention(GROUP, "poster", i), None);
        }
        assert_eq!(guard.mention_count(GROUP, "poster", 10), 0);
    }

    #[test]
    fn test_alerts_on_every_mention_past_cap() {
        let guard = guard();
        guard.set_enabled(GROUP, true);

        for i in 0..3 {
            assert_eq!(guard.on_status_mention(GROUP, "poster", i), None);
        }
        for i in 3..6 {
            let alert = guard.on_status_mention(GROUP, "poster", i).expect("over cap");
            assert_eq!(alert.count, i as usize + 1);
            assert!(alert.count > alert.cap);
        }
    }

    #[test]
    fn test_posters_are_counted_separately() {
        let guard = guard();
        guard.set_enabled(GROUP, true);
        for i in 0..3 {
            guard.on_status_mention(GROUP, "a", i);
        }
        assert_eq!(guard.on_status_mention(GROUP, "b", 5), None);
    }

    #[test]
    fn test_disabling_stops_evaluation() {
        let guard = guard();
        guard.set_enabled(GROUP, true);
        for i in 0..3 {
            guard.on_status_mention(GROUP, "a", i);
        }
        guard.set_enabled(GROUP, false);
        assert!(!guard.is_enabled(GROUP));
        assert_eq!(guard.on_status_mention(GROUP, "a", 10), None);
        assert_eq!(guard.mention_count(GROUP, "a", 10), 3);
    }
}
