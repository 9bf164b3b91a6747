//! Read-only analytics over the activity tracker: the top-N leaderboard and
//! the full per-member report.

use crate::activity::{ActivityTracker, MediaCounts};
use crate::protocol::{display_name, GroupMetadata};
use crate::window::ScopeKey;

const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];
const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Human form of a trailing window: `24h`, `90 min`, `45 s`.
pub fn period_label(window_ms: u64) -> String {
    if window_ms >= HOUR_MS && window_ms % HOUR_MS == 0 {
        format!("{}h", window_ms / HOUR_MS)
    } else if window_ms >= MINUTE_MS && window_ms % MINUTE_MS == 0 {
        format!("{} min", window_ms / MINUTE_MS)
    } else {
        format!("{} s", window_ms.div_ceil(1_000))
    }
}

/// A message body with the ids it mentions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub mentions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub id: String,
    pub is_admin: bool,
    pub messages: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub active_members: usize,
    pub limit: usize,
    pub window_ms: u64,
}

/// Members with at least one message in the trailing window, most active
/// first. Ties keep participant-list order. `None` when nobody is active.
pub fn top_members(
    activity: &ActivityTracker,
    metadata: &GroupMetadata,
    limit: usize,
    now: u64,
) -> Option<Leaderboard> {
    let mut active: Vec<LeaderboardEntry> = metadata
        .participants
        .iter()
        .map(|p| LeaderboardEntry {
            id: p.id.clone(),
            is_admin: p.is_admin(),
            messages: activity.message_count(&ScopeKey::new(&metadata.id, &p.id), now),
        })
        .filter(|e| e.messages > 0)
        .collect();

    if active.is_empty() {
        return None;
    }

    // sort_by is stable
    active.sort_by(|a, b| b.messages.cmp(&a.messages));
    let active_members = active.len();
    active.truncate(limit);

    Some(Leaderboard {
        entries: active,
        active_members,
        limit,
        window_ms: activity.window_ms(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementTier {
    Low,
    Active,
    VeryActive,
    Hyperactive,
}

impl EngagementTier {
    pub fn from_messages(messages: usize) -> Self {
        match messages {
            0..=4 => EngagementTier::Low,
            5..=19 => EngagementTier::Active,
            20..=49 => EngagementTier::VeryActive,
            _ => EngagementTier::Hyperactive,
        }
    }

    fn label(self) -> &'static str {
        match self {
            EngagementTier::Low => "📉 Barely active",
            EngagementTier::Active => "📊 Active",
            EngagementTier::VeryActive => "🔥 Very active",
            EngagementTier::Hyperactive => "⚡ Hyperactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberReport {
    pub id: String,
    pub is_admin: bool,
    pub messages: usize,
    pub replies: usize,
    pub mentions: usize,
    pub media: MediaCounts,
    pub score: f64,
    pub tier: EngagementTier,
}

pub fn activity_score(messages: usize, replies: usize, media: usize) -> f64 {
    messages as f64 * 2.0 + replies as f64 * 3.0 + media as f64 * 1.5
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityReport {
    pub group_name: String,
    pub member_count: usize,
    /// Members with messages, highest score first.
    pub active: Vec<MemberReport>,
    pub inactive: usize,
    pub total_messages: usize,
    pub total_replies: usize,
    pub total_media: usize,
    pub average_messages: f64,
    pub window_ms: u64,
}

pub fn full_report(activity: &ActivityTracker, metadata: &GroupMetadata, now: u64) -> Option<ActivityReport> {
    let mut members: Vec<MemberReport> = metadata
        .participants
        .iter()
        .map(|p| {
            let counts = activity.member_activity(&ScopeKey::new(&metadata.id, &p.id), now);
            MemberReport {
                id: p.id.clone(),
                is_admin: p.is_admin(),
                messages: counts.messages,
                replies: counts.replies,
                mentions: counts.mentions,
                media: counts.media,
                score: activity_score(counts.messages, counts.replies, counts.media.total()),
                tier: EngagementTier::from_messages(counts.messages),
            }
        })
        .collect();

    members.sort_by(|a, b| b.score.total_cmp(&a.score));
    let member_count = members.len();
    let active: Vec<MemberReport> = members.into_iter().filter(|m| m.messages > 0).collect();
    if active.is_empty() {
        return None;
    }

    let total_messages: usize = active.iter().map(|m| m.messages).sum();
    let total_replies = active.iter().map(|m| m.replies).sum();
    let total_media = active.iter().map(|m| m.media.total()).sum();
    let average_messages = total_messages as f64 / active.len() as f64;

    Some(ActivityReport {
        group_name: metadata.subject.clone(),
        member_count,
        inactive: member_count - active.len(),
        active,
        total_messages,
        total_replies,
        total_media,
        average_messages,
        window_ms: activity.window_ms(),
    })
}

fn rank_label(index: usize) -> String {
    MEDALS
        .get(index)
        .map(|m| m.to_string())
        .unwrap_or_else(|| format!("{}.", index + 1))
}

pub fn render_leaderboard(board: &Leaderboard) -> Rendered {
    let mut text = format!(
        "🏆 *TOP {} ACTIVE MEMBERS*\n\n📊 *Last {}*\n\n",
        board.limit,
        period_label(board.window_ms)
    );
    let mut mentions = Vec::with_capacity(board.entries.len());

    for (index, entry) in board.entries.iter().enumerate() {
        let crown = if entry.is_admin { " 👑" } else { "" };
        text.push_str(&format!(
            "{} @{}{}\n   🔥 {} messages\n\n",
            rank_label(index),
            display_name(&entry.id),
            crown,
            entry.messages
        ));
        mentions.push(entry.id.clone());
    }

    text.push_str(&format!("ℹ️ Total: {} active member(s)", board.active_members));
    Rendered { text, mentions }
}

fn media_details(media: &MediaCounts) -> String {
    [
        ("📷", media.image),
        ("🎥", media.video),
        ("🎵", media.audio),
        ("📄", media.document),
    ]
    .iter()
    .filter(|(_, n)| *n > 0)
    .map(|(icon, n)| format!("{}{}", icon, n))
    .collect::<Vec<_>>()
    .join(" ")
}

pub fn render_report(report: &ActivityReport) -> Rendered {
    let mut text = String::from("📋 *FULL ACTIVITY REPORT*\n\n");
    text.push_str(&format!("👥 *Group:* {}\n", report.group_name));
    text.push_str(&format!("👤 *Members:* {}\n", report.member_count));
    text.push_str(&format!("📅 *Period:* last {}\n\n", period_label(report.window_ms)));
    text.push_str(&format!("🔥 *ACTIVE MEMBERS: {}*\n", report.active.len()));
    text.push_str(&format!("😴 *INACTIVE MEMBERS: {}*\n\n", report.inactive));

    let mut mentions = Vec::with_capacity(report.active.len());
    for (index, member) in report.active.iter().enumerate() {
        let crown = if member.is_admin { " 👑" } else { "" };
        text.push_str(&format!("{} *@{}*{}\n", rank_label(index), display_name(&member.id), crown));
        text.push_str(&format!("├ 💬 Messages: {}\n", member.messages));
        text.push_str(&format!("├ 💭 Replies: {}\n", member.replies));
        text.push_str(&format!("├ 🏷️ Mentioned: {} times\n", member.mentions));
        if member.media.total() > 0 {
            text.push_str(&format!(
                "├ 📎 Media: {} ({})\n",
                member.media.total(),
                media_details(&member.media)
            ));
        }
        text.push_str(&format!("└ {}\n\n", member.tier.label()));
        mentions.push(member.id.clone());
    }

    text.push_str("📊 *SUMMARY*\n\n");
    text.push_str(&format!("📨 Total messages: {}\n", report.total_messages));
    text.push_str(&format!("💭 Total replies: {}\n", report.total_replies));
    text.push_str(&format!("📎 Total media: {}\n", report.total_media));
    text.push_str(&format!("📊 Average/member: {:.1} msgs\n\n", report.average_messages));

    text.push_str("🏆 *PODIUM*\n\n");
    for (index, member) in report.active.iter().take(MEDALS.len()).enumerate() {
        text.push_str(&format!(
            "{} @{} - {} msgs\n",
            MEDALS[index],
            display_name(&member.id),
            member.messages
        ));
    }

    Rendered { text, mentions }
}

/// Splits `text` into chunks of at most `max_chars` characters, cutting only
/// at line boundaries. A single line longer than the limit becomes its own
/// chunk. Mentions travel with the first chunk only.
pub fn split_chunks(rendered: Rendered, max_chars: usize) -> Vec<Rendered> {
    if rendered.text.chars().count() <= max_chars {
        return vec![rendered];
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in rendered.text.split('\n') {
        let line_len = line.chars().count() + 1;
        if current_len + line_len > max_chars && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len;
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }

    let mut mentions = Some(rendered.mentions);
    parts
        .into_iter()
        .map(|text| Rendered {
            text,
            mentions: mentions.take().unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{MediaKind, MessageSignals};
    use crate::protocol::Participant;

    const GROUP: &str = "g@g.us";
    const DAY: u64 = 24 * 60 * 60 * 1000;

    fn metadata(ids: &[&str]) -> GroupMetadata {
        GroupMetadata {
            id: GROUP.into(),
            subject: "Test group".into(),
            creation: None,
            participants: ids
                .iter()
                .map(|id| Participant {
                    id: id.to_string(),
                    admin: None,
                })
                .collect(),
        }
    }

    fn send(activity: &ActivityTracker, sender: &str, n: usize, is_reply: bool, media: Option<MediaKind>) {
        for i in 0..n {
            activity.record_message(
                &MessageSignals {
                    group: GROUP,
                    sender,
                    is_reply,
                    media,
                    mentioned: &[],
                },
                1_000 + i as u64,
            );
        }
    }

    #[test]
    fn test_leaderboard_keeps_participant_order_on_ties() {
        let activity = ActivityTracker::new(DAY);
        send(&activity, "c", 2, false, None);
        send(&activity, "b", 5, false, None);
        send(&activity, "a", 5, false, None);
        let meta = metadata(&["a", "b", "c", "d"]);

        let board = top_members(&activity, &meta, 10, 2_000).unwrap();
        let ids: Vec<&str> = board.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(board.active_members, 3);

        let rendered = render_leaderboard(&board);
        assert!(rendered.text.starts_with("🏆"));
        assert!(rendered.text.contains("*Last 24h*"));
        assert!(rendered.text.contains("🥇 @a"));
        assert!(rendered.text.contains("🥉 @c"));
        assert_eq!(rendered.mentions, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_leaderboard_empty_and_limit() {
        let activity = ActivityTracker::new(DAY);
        let meta = metadata(&["a", "b"]);
        assert!(top_members(&activity, &meta, 10, 2_000).is_none());

        send(&activity, "a", 1, false, None);
        send(&activity, "b", 2, false, None);
        let board = top_members(&activity, &meta, 1, 2_000).unwrap();
        assert_eq!(board.entries.len(), 1);
        assert_eq!(board.entries[0].id, "b");
        assert_eq!(board.active_members, 2);
    }

    #[test]
    fn test_activity_score_weights() {
        assert_eq!(activity_score(10, 2, 0), 26.0);
        assert_eq!(activity_score(1, 0, 3), 6.5);
    }

    #[test]
    fn test_full_report_orders_by_score_and_tiers() {
        let activity = ActivityTracker::new(DAY);
        send(&activity, "a", 10, false, None);
        send(&activity, "b", 4, true, None);
        send(&activity, "b", 2, false, Some(MediaKind::Image));
        let meta = metadata(&["a", "b", "idle"]);

        let report = full_report(&activity, &meta, 2_000).unwrap();
        assert_eq!(report.member_count, 3);
        assert_eq!(report.inactive, 1);
        // a: 10*2 = 20; b: 6*2 + 4*3 + 2*1.5 = 27
        assert_eq!(report.active[0].id, "b");
        assert_eq!(report.active[0].score, 27.0);
        assert_eq!(report.active[1].score, 20.0);
        assert_eq!(report.active[0].tier, EngagementTier::Active);
        assert_eq!(report.total_messages, 16);
        assert_eq!(report.total_replies, 4);
        assert_eq!(report.total_media, 2);
        assert_eq!(report.average_messages, 8.0);

        let rendered = render_report(&report);
        assert!(rendered.text.contains("📷2"));
        assert_eq!(rendered.mentions, vec!["b", "a"]);
    }

    #[test]
    fn test_period_follows_tracking_window() {
        assert_eq!(period_label(DAY), "24h");
        assert_eq!(period_label(90 * 60 * 1000), "90 min");
        assert_eq!(period_label(45_000), "45 s");

        let activity = ActivityTracker::new(2 * 60 * 60 * 1000);
        send(&activity, "a", 1, false, None);
        let report = full_report(&activity, &metadata(&["a"]), 2_000).unwrap();
        assert!(render_report(&report).text.contains("*Period:* last 2h"));
    }

    #[test]
    fn test_full_report_none_without_messages() {
        let activity = ActivityTracker::new(DAY);
        assert!(full_report(&activity, &metadata(&["a"]), 0).is_none());
    }

    #[test]
    fn test_tiers() {
        assert_eq!(EngagementTier::from_messages(4), EngagementTier::Low);
        assert_eq!(EngagementTier::from_messages(5), EngagementTier::Active);
        assert_eq!(EngagementTier::from_messages(20), EngagementTier::VeryActive);
        assert_eq!(EngagementTier::from_messages(50), EngagementTier::Hyperactive);
    }

    #[test]
    fn test_split_on_line_boundaries() {
        let rendered = Rendered {
            text: "aaaa\nbbbb\ncccc\ndd".into(),
            mentions: vec!["x".into()],
        };
        let chunks = split_chunks(rendered, 10);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa\nbbbb\n", "cccc\ndd\n"]);
        assert_eq!(chunks[0].mentions, vec!["x".to_string()]);
        assert!(chunks[1].mentions.is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let rendered = Rendered {
            text: "short".into(),
            mentions: vec!["x".into()],
        };
        assert_eq!(split_chunks(rendered.clone(), 100), vec![rendered]);
    }
}
