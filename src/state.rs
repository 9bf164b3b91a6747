use tracing::{info, warn};

use crate::activity::ActivityTracker;
use crate::config::Config;
use crate::moderation::{ModerationEngine, Verdict};
use crate::ratelimit::RateLimiter;
use crate::snapshot::{Snapshot, SnapshotStore, StatusMentionSection, UserActivitySection, SNAPSHOT_VERSION};
use crate::stats::{GroupCounter, GroupStats};
use crate::status::StatusMentionGuard;
use crate::window::ScopeKey;

/// Owner of every in-memory map. Shared behind an `Arc` by the event path
/// and the background tasks; each map is concurrency-safe on its own.
pub struct BotState {
    pub activity: ActivityTracker,
    pub moderation: ModerationEngine,
    pub status: StatusMentionGuard,
    pub stats: GroupStats,
    pub limiter: RateLimiter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub activity: usize,
    pub flood: usize,
    pub status: usize,
    pub rate_limits: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.activity + self.flood + self.status + self.rate_limits
    }
}

impl BotState {
    pub fn new(config: &Config) -> Self {
        Self {
            activity: ActivityTracker::new(config.tracking.window_ms),
            moderation: ModerationEngine::new(&config.moderation),
            status: StatusMentionGuard::new(&config.status_mention),
            stats: GroupStats::new(),
            limiter: RateLimiter::new(&config.rate_limits),
        }
    }

    /// Runs the moderation engine and counts the infraction, if any, as a
    /// group warning.
    pub fn moderate(&self, key: &ScopeKey, text: &str, is_admin: bool, now: u64) -> Verdict {
        let verdict = self.moderation.evaluate(key, text, is_admin, now);
        if verdict != Verdict::Allow {
            self.stats.increment(&key.group, GroupCounter::Warnings);
        }
        verdict
    }

    /// Called once the subject has actually been removed from the group.
    pub fn confirm_removal(&self, key: &ScopeKey) {
        self.stats.increment(&key.group, GroupCounter::Kicks);
        self.moderation.forget(key);
    }

    pub fn participants_joined(&self, group: &str) {
        self.stats.increment(group, GroupCounter::Joins);
    }

    /// Counts one leave event and drops strikes and flood windows of everyone
    /// who left. Trailing activity stays for reporting.
    pub fn participants_left(&self, group: &str, subjects: &[String]) {
        self.stats.increment(group, GroupCounter::Leaves);
        for subject in subjects {
            self.moderation.forget(&ScopeKey::new(group, subject.as_str()));
        }
    }

    pub fn sweep(&self, now: u64) -> SweepReport {
        SweepReport {
            activity: self.activity.sweep(now),
            flood: self.moderation.sweep(now),
            status: self.status.sweep(now),
            rate_limits: self.limiter.sweep(now),
        }
    }

    pub fn snapshot(&self, now: u64) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at_ms: now,
            user_activity: UserActivitySection {
                messages: self.activity.messages().entries(),
                mentions: self.activity.mentions().entries(),
                replies: self.activity.replies().entries(),
                media: self.activity.media_entries(),
            },
            group_stats: self.stats.group_entries(),
            warnings: self.moderation.strike_entries(),
            flood_windows: self.moderation.flood_entries(),
            status_mentions: StatusMentionSection {
                limits: self.status.toggle_entries(),
                mentions: self.status.mention_entries(),
            },
            command_usage: self.stats.usage_entries(),
        }
    }

    pub fn restore(&self, snapshot: Snapshot) {
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                "Snapshot version {} differs from {}, loading what parses",
                snapshot.version, SNAPSHOT_VERSION
            );
        }

        let Snapshot {
            user_activity,
            group_stats,
            warnings,
            flood_windows,
            status_mentions,
            command_usage,
            ..
        } = snapshot;

        self.activity.messages().restore(user_activity.messages);
        self.activity.mentions().restore(user_activity.mentions);
        self.activity.replies().restore(user_activity.replies);
        self.activity.restore_media(user_activity.media);
        self.moderation.restore_strikes(warnings);
        self.moderation.restore_flood(flood_windows);
        self.status.restore(status_mentions.limits, status_mentions.mentions);
        self.stats.restore(group_stats, command_usage);
    }

    /// Loads the last snapshot. Any failure leaves the state empty.
    pub async fn load_from(&self, store: &SnapshotStore) {
        match store.load().await {
            Ok(Some(snapshot)) => {
                let saved_at = snapshot.saved_at_ms;
                self.restore(snapshot);
                info!(
                    "Restored snapshot from {} (saved at {}, {} groups)",
                    store.path().display(),
                    saved_at,
                    self.stats.group_count()
                );
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to load snapshot from {}: {}, starting empty", store.path().display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{MediaKind, MessageSignals};
    use crate::moderation::Infraction;

    const GROUP: &str = "g@g.us";

    fn state() -> BotState {
        BotState::new(&Config::default())
    }

    fn track(state: &BotState, sender: &str, media: Option<MediaKind>, mentioned: &[String], now: u64) {
        state.activity.record_message(
            &MessageSignals {
                group: GROUP,
                sender,
                is_reply: false,
                media,
                mentioned,
            },
            now,
        );
    }

    #[test]
    fn test_escalation_restarts_after_removal() {
        let state = state();
        let key = ScopeKey::new(GROUP, "u");
        let link = "https://spam.example";

        assert_eq!(
            state.moderate(&key, link, false, 0),
            Verdict::Warn { infraction: Infraction::Link, strike: 1, max: 3 }
        );
        assert_eq!(
            state.moderate(&key, link, false, 20_000),
            Verdict::Warn { infraction: Infraction::Link, strike: 2, max: 3 }
        );
        assert_eq!(
            state.moderate(&key, link, false, 40_000),
            Verdict::Remove { infraction: Infraction::Link }
        );
        state.confirm_removal(&key);
        assert_eq!(state.moderation.strikes(&key), None);

        assert_eq!(
            state.moderate(&key, link, false, 60_000),
            Verdict::Warn { infraction: Infraction::Link, strike: 1, max: 3 }
        );

        let counters = state.stats.get(GROUP);
        assert_eq!(counters.warnings, 4);
        assert_eq!(counters.kicks, 1);
    }

    #[test]
    fn test_admin_flood_is_tracked_but_never_moderated() {
        let state = state();
        let key = ScopeKey::new(GROUP, "admin");
        for i in 0..10 {
            track(&state, "admin", None, &[], 1_000 + i);
            assert_eq!(state.moderate(&key, "hello", true, 1_000 + i), Verdict::Allow);
        }
        assert_eq!(state.activity.message_count(&key, 2_000), 10);
        assert_eq!(state.stats.get(GROUP).warnings, 0);
    }

    #[test]
    fn test_leave_clears_strikes_but_keeps_activity() {
        let state = state();
        let key = ScopeKey::new(GROUP, "u");
        track(&state, "u", None, &[], 0);
        state.moderate(&key, "www.spam.example", false, 0);

        state.participants_left(GROUP, &["u".to_string()]);
        assert_eq!(state.moderation.strikes(&key), None);
        assert_eq!(state.activity.message_count(&key, 1), 1);
        assert_eq!(state.stats.get(GROUP).leaves, 1);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let state = state();
        track(&state, "u", Some(MediaKind::Video), &[], 0);
        state.moderate(&ScopeKey::new(GROUP, "u"), "hi", false, 0);

        let later = 2 * state.activity.window_ms();
        let first = state.sweep(later);
        assert!(first.total() >= 3);
        let after_first = state.snapshot(later);

        assert_eq!(state.sweep(later), SweepReport::default());
        assert_eq!(state.snapshot(later), after_first);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));

        let state = state();
        let mentioned = vec!["v".to_string()];
        for i in 0..3 {
            track(&state, "u", Some(MediaKind::Image), &mentioned, 1_000 + i);
        }
        state.moderate(&ScopeKey::new(GROUP, "u"), "t.me/spam", false, 1_000);
        state.status.set_enabled(GROUP, true);
        state.status.on_status_mention(GROUP, "u", 1_000);
        state.stats.log_command(GROUP, "top");

        let snapshot = state.snapshot(5_000);
        store.save(&snapshot).await.unwrap();

        let fresh = BotState::new(&Config::default());
        fresh.load_from(&store).await;
        assert_eq!(fresh.snapshot(5_000), snapshot);

        let u = ScopeKey::new(GROUP, "u");
        assert_eq!(fresh.activity.message_count(&u, 5_000), 3);
        assert_eq!(fresh.activity.mention_count(&ScopeKey::new(GROUP, "v"), 5_000), 3);
        assert_eq!(fresh.activity.media_counts(&u, 5_000).image, 3);
        assert_eq!(fresh.moderation.strikes(&u), Some(1));
        assert!(fresh.status.is_enabled(GROUP));
        assert_eq!(fresh.status.mention_count(GROUP, "u", 5_000), 1);
        assert_eq!(fresh.stats.command_usage(GROUP), vec![("top".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "garbage").unwrap();

        let state = state();
        state.load_from(&SnapshotStore::new(path)).await;
        assert_eq!(state.stats.group_count(), 0);
    }
}
