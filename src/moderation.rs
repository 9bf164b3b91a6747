//! Strike-based moderation for burst flooding and disallowed links.
//!
//! Both triggers share one strike counter per (group, subject). The infraction
//! that would reach `max_warnings` yields [`Verdict::Remove`]; every earlier
//! one yields [`Verdict::Warn`] with the new strike count.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ModerationConfig;
use crate::window::{ScopeKey, WindowTracker};

static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(https?://|www\.)\S+|wa\.me/\S+|t\.me/\S+").expect("link pattern is valid")
});

pub fn contains_link(text: &str) -> bool {
    LINK_PATTERN.is_match(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Infraction {
    Flood,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Warn { infraction: Infraction, strike: u32, max: u32 },
    Remove { infraction: Infraction },
}

pub struct ModerationEngine {
    strikes: DashMap<ScopeKey, u32>,
    flood: WindowTracker<ScopeKey>,
    flood_threshold: usize,
    max_warnings: u32,
}

impl ModerationEngine {
    pub fn new(config: &ModerationConfig) -> Self {
        Self {
            strikes: DashMap::new(),
            flood: WindowTracker::new(config.flood_window_ms),
            flood_threshold: config.flood_threshold,
            max_warnings: config.max_warnings,
        }
    }

    pub fn max_warnings(&self) -> u32 {
        self.max_warnings
    }

    /// Evaluates one message. Admins are never tracked or evaluated here.
    pub fn evaluate(&self, key: &ScopeKey, text: &str, is_admin: bool, now: u64) -> Verdict {
        if is_admin {
            return Verdict::Allow;
        }

        self.flood.record(key.clone(), now);
        if self.flood.count(key, now) >= self.flood_threshold {
            return self.escalate(key, Infraction::Flood);
        }

        if contains_link(text) {
            return self.escalate(key, Infraction::Link);
        }

        Verdict::Allow
    }

    fn escalate(&self, key: &ScopeKey, infraction: Infraction) -> Verdict {
        let current = self.strikes.get(key).map(|s| *s).unwrap_or(0);
        if current + 1 >= self.max_warnings {
            return Verdict::Remove { infraction };
        }

        let mut strikes = self.strikes.entry(key.clone()).or_insert(0);
        *strikes += 1;
        Verdict::Warn {
            infraction,
            strike: *strikes,
            max: self.max_warnings,
        }
    }

    /// Clears strikes and the flood window of a subject that is no longer in
    /// the group.
    pub fn forget(&self, key: &ScopeKey) {
        self.strikes.remove(key);
        self.flood.remove(key);
    }

    pub fn strikes(&self, key: &ScopeKey) -> Option<u32> {
        self.strikes.get(key).map(|s| *s)
    }

    /// Subjects with strikes in `group`, ordered by subject id.
    pub fn group_strikes(&self, group: &str) -> Vec<(String, u32)> {
        let mut out: Vec<(String, u32)> = self
            .strikes
            .iter()
            .filter(|e| e.key().group == group)
            .map(|e| (e.key().subject.clone(), *e.value()))
            .collect();
        out.sort();
        out
    }

    pub fn clear_group(&self, group: &str) -> usize {
        let before = self.strikes.len();
        self.strikes.retain(|k, _| k.group != group);
        before - self.strikes.len()
    }

    pub fn sweep(&self, now: u64) -> usize {
        self.flood.sweep(now)
    }

    pub fn strike_entries(&self) -> Vec<(ScopeKey, u32)> {
        let mut out: Vec<(ScopeKey, u32)> = self
            .strikes
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort();
        out
    }

    pub fn restore_strikes(&self, entries: Vec<(ScopeKey, u32)>) {
        self.strikes.clear();
        for (key, count) in entries {
            if count > 0 {
                self.strikes.insert(key, count);
            }
        }
    }

    pub fn flood_entries(&self) -> Vec<(ScopeKey, Vec<u64>)> {
        self.flood.entries()
    }

    pub fn restore_flood(&self, entries: Vec<(ScopeKey, Vec<u64>)>) {
        self.flood.restore(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ModerationEngine {
        ModerationEngine::new(&ModerationConfig::default())
    }

    fn key(subject: &str) -> ScopeKey {
        ScopeKey::new("g@g.us", subject)
    }

    #[test]
    fn test_link_detection() {
        assert!(contains_link("see https://example.com now"));
        assert!(contains_link("WWW.example.org"));
        assert!(contains_link("join wa.me/123456"));
        assert!(contains_link("t.me/somechannel"));
        assert!(!contains_link("no links here, just www"));
    }

    #[test]
    fn test_flood_triggers_at_threshold() {
        let engine = engine();
        for i in 0..4 {
            assert_eq!(engine.evaluate(&key("u"), "hi", false, 1_000 + i), Verdict::Allow);
        }
        assert_eq!(
            engine.evaluate(&key("u"), "hi", false, 1_004),
            Verdict::Warn { infraction: Infraction::Flood, strike: 1, max: 3 }
        );
    }

    #[test]
    fn test_slow_messages_never_flood() {
        let engine = engine();
        for i in 0..20 {
            assert_eq!(engine.evaluate(&key("u"), "hi", false, i * 3_000), Verdict::Allow);
        }
    }

    #[test]
    fn test_escalation_shares_strikes_across_triggers() {
        let engine = engine();
        let link = "https://spam.example";

        assert_eq!(
            engine.evaluate(&key("u"), link, false, 0),
            Verdict::Warn { infraction: Infraction::Link, strike: 1, max: 3 }
        );
        for i in 1..4 {
            engine.evaluate(&key("u"), "hi", false, i);
        }
        assert_eq!(
            engine.evaluate(&key("u"), "hi", false, 4),
            Verdict::Warn { infraction: Infraction::Flood, strike: 2, max: 3 }
        );
        assert_eq!(
            engine.evaluate(&key("u"), "hi", false, 5),
            Verdict::Remove { infraction: Infraction::Flood }
        );
    }

    #[test]
    fn test_strikes_restart_after_forget() {
        let engine = engine();
        let link = "http://x.example";
        engine.evaluate(&key("u"), link, false, 0);
        engine.evaluate(&key("u"), link, false, 20_000);
        assert_eq!(
            engine.evaluate(&key("u"), link, false, 40_000),
            Verdict::Remove { infraction: Infraction::Link }
        );

        engine.forget(&key("u"));
        assert_eq!(engine.strikes(&key("u")), None);
        assert_eq!(
            engine.evaluate(&key("u"), link, false, 60_000),
            Verdict::Warn { infraction: Infraction::Link, strike: 1, max: 3 }
        );
    }

    #[test]
    fn test_admins_are_exempt() {
        let engine = engine();
        for i in 0..10 {
            assert_eq!(
                engine.evaluate(&key("admin"), "https://ok.example", true, i),
                Verdict::Allow
            );
        }
        assert!(engine.flood_entries().is_empty());
    }

    #[test]
    fn test_flood_windows_sweep_and_restore() {
        let engine = engine();
        engine.evaluate(&key("a"), "hi", false, 1_000);
        engine.evaluate(&key("b"), "hi", false, 15_000);

        assert_eq!(engine.sweep(20_000), 1);
        let saved = engine.flood_entries();
        assert_eq!(saved, vec![(key("b"), vec![15_000])]);

        let fresh = self::engine();
        fresh.restore_flood(saved);
        for i in 1..4 {
            fresh.evaluate(&key("b"), "hi", false, 15_000 + i);
        }
        assert_eq!(
            fresh.evaluate(&key("b"), "hi", false, 15_004),
            Verdict::Warn { infraction: Infraction::Flood, strike: 1, max: 3 }
        );
    }

    #[test]
    fn test_group_scoped_strikes() {
        let engine = engine();
        let link = "www.x.example";
        engine.evaluate(&ScopeKey::new("a@g.us", "u"), link, false, 0);
        engine.evaluate(&ScopeKey::new("b@g.us", "u"), link, false, 0);

        assert_eq!(engine.group_strikes("a@g.us"), vec![("u".to_string(), 1)]);
        assert_eq!(engine.clear_group("a@g.us"), 1);
        assert_eq!(engine.strikes(&ScopeKey::new("b@g.us", "u")), Some(1));
    }
}
