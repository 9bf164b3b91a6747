//! Trailing-window activity counters per (group, subject): messages, replies,
//! mentions received, and media sent by category.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::window::{EventWindow, ScopeKey, WindowTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaWindows {
    pub image: EventWindow,
    pub video: EventWindow,
    pub audio: EventWindow,
    pub document: EventWindow,
}

impl MediaWindows {
    fn get_mut(&mut self, kind: MediaKind) -> &mut EventWindow {
        match kind {
            MediaKind::Image => &mut self.image,
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
            MediaKind::Document => &mut self.document,
        }
    }

    fn all_mut(&mut self) -> [&mut EventWindow; 4] {
        [&mut self.image, &mut self.video, &mut self.audio, &mut self.document]
    }

    fn is_empty(&self) -> bool {
        self.image.is_empty() && self.video.is_empty() && self.audio.is_empty() && self.document.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaCounts {
    pub image: usize,
    pub video: usize,
    pub audio: usize,
    pub document: usize,
}

impl MediaCounts {
    pub fn total(&self) -> usize {
        self.image + self.video + self.audio + self.document
    }
}

/// All per-member counts for one trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberActivity {
    pub messages: usize,
    pub replies: usize,
    pub mentions: usize,
    pub media: MediaCounts,
}

/// What one inbound group message contributes to the counters.
#[derive(Debug, Clone)]
pub struct MessageSignals<'a> {
    pub group: &'a str,
    pub sender: &'a str,
    pub is_reply: bool,
    pub media: Option<MediaKind>,
    pub mentioned: &'a [String],
}

pub struct ActivityTracker {
    messages: WindowTracker<ScopeKey>,
    mentions: WindowTracker<ScopeKey>,
    replies: WindowTracker<ScopeKey>,
    media: DashMap<ScopeKey, MediaWindows>,
    window_ms: u64,
}

impl ActivityTracker {
    pub fn new(window_ms: u64) -> Self {
        Self {
            messages: WindowTracker::new(window_ms),
            mentions: WindowTracker::new(window_ms),
            replies: WindowTracker::new(window_ms),
            media: DashMap::new(),
            window_ms,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn record_message(&self, signals: &MessageSignals<'_>, now: u64) {
        let key = ScopeKey::new(signals.group, signals.sender);
        self.messages.record(key.clone(), now);

        if signals.is_reply {
            self.replies.record(key.clone(), now);
        }

        if let Some(kind) = signals.media {
            self.record_media(key, kind, now);
        }

        for mentioned in signals.mentioned {
            self.mentions
                .record(ScopeKey::new(signals.group, mentioned.as_str()), now);
        }
    }

    pub fn record_media(&self, key: ScopeKey, kind: MediaKind, now: u64) {
        self.media
            .entry(key)
            .or_default()
            .get_mut(kind)
            .record(now, self.window_ms);
    }

    pub fn message_count(&self, key: &ScopeKey, now: u64) -> usize {
        self.messages.count(key, now)
    }

    pub fn mention_count(&self, key: &ScopeKey, now: u64) -> usize {
        self.mentions.count(key, now)
    }

    pub fn reply_count(&self, key: &ScopeKey, now: u64) -> usize {
        self.replies.count(key, now)
    }

    pub fn media_counts(&self, key: &ScopeKey, now: u64) -> MediaCounts {
        let Some(media) = self.media.get(key) else {
            return MediaCounts::default();
        };
        MediaCounts {
            image: media.image.count(now, self.window_ms),
            video: media.video.count(now, self.window_ms),
            audio: media.audio.count(now, self.window_ms),
            document: media.document.count(now, self.window_ms),
        }
    }

    pub fn member_activity(&self, key: &ScopeKey, now: u64) -> MemberActivity {
        MemberActivity {
            messages: self.message_count(key, now),
            replies: self.reply_count(key, now),
            mentions: self.mention_count(key, now),
            media: self.media_counts(key, now),
        }
    }

    pub fn sweep(&self, now: u64) -> usize {
        let mut evicted = self.messages.sweep(now) + self.mentions.sweep(now) + self.replies.sweep(now);
        self.media.retain(|_, windows| {
            for window in windows.all_mut() {
                evicted += window.prune(now, self.window_ms);
            }
            !windows.is_empty()
        });
        evicted
    }

    pub fn messages(&self) -> &WindowTracker<ScopeKey> {
        &self.messages
    }

    pub fn mentions(&self) -> &WindowTracker<ScopeKey> {
        &self.mentions
    }

    pub fn replies(&self) -> &WindowTracker<ScopeKey> {
        &self.replies
    }

    pub fn media_entries(&self) -> Vec<(ScopeKey, MediaWindows)> {
        let mut out: Vec<(ScopeKey, MediaWindows)> = self
            .media
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn restore_media(&self, entries: Vec<(ScopeKey, MediaWindows)>) {
        self.media.clear();
        for (key, windows) in entries {
            if !windows.is_empty() {
                self.media.insert(key, windows);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60 * 1000;

    fn signals<'a>(sender: &'a str, mentioned: &'a [String]) -> MessageSignals<'a> {
        MessageSignals {
            group: "g@g.us",
            sender,
            is_reply: false,
            media: None,
            mentioned,
        }
    }

    #[test]
    fn test_message_reply_and_media_are_counted() {
        let tracker = ActivityTracker::new(DAY);
        let mut s = signals("alice", &[]);
        tracker.record_message(&s, 1_000);
        s.is_reply = true;
        s.media = Some(MediaKind::Image);
        tracker.record_message(&s, 2_000);
        s.media = Some(MediaKind::Document);
        tracker.record_message(&s, 3_000);

        let activity = tracker.member_activity(&ScopeKey::new("g@g.us", "alice"), 4_000);
        assert_eq!(activity.messages, 3);
        assert_eq!(activity.replies, 2);
        assert_eq!(activity.media.image, 1);
        assert_eq!(activity.media.document, 1);
        assert_eq!(activity.media.total(), 2);
    }

    #[test]
    fn test_mentions_are_credited_to_the_mentioned_member() {
        let tracker = ActivityTracker::new(DAY);
        let mentioned = vec!["bob".to_string(), "carol".to_string()];
        tracker.record_message(&signals("alice", &mentioned), 1_000);

        assert_eq!(tracker.mention_count(&ScopeKey::new("g@g.us", "bob"), 1_000), 1);
        assert_eq!(tracker.mention_count(&ScopeKey::new("g@g.us", "carol"), 1_000), 1);
        assert_eq!(tracker.mention_count(&ScopeKey::new("g@g.us", "alice"), 1_000), 0);
    }

    #[test]
    fn test_sweep_drops_expired_media() {
        let tracker = ActivityTracker::new(1_000);
        let key = ScopeKey::new("g@g.us", "alice");
        tracker.record_media(key.clone(), MediaKind::Video, 100);
        tracker.record_media(key.clone(), MediaKind::Audio, 1_500);

        assert_eq!(tracker.sweep(2_000), 1);
        assert_eq!(tracker.media_counts(&key, 2_000).audio, 1);

        assert_eq!(tracker.sweep(3_000), 1);
        assert!(tracker.media_entries().is_empty());
    }
}
