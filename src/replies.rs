//! User-facing text. Every function returns the finished message body;
//! mentions are attached by the caller.

use crate::activity::MemberActivity;
use crate::commands::{Access, COMMANDS};
use crate::moderation::Infraction;
use crate::protocol::{display_name, GroupMetadata};
use crate::stats::GroupCounters;

const FOOTER: &str = "_group-warden_";

fn with_footer(body: String) -> String {
    format!("{}\n\n{}", body, FOOTER)
}

pub fn warning(subject: &str, infraction: Infraction, strike: u32, max: u32) -> String {
    let reason = match infraction {
        Infraction::Flood => "stop flooding the group!",
        Infraction::Link => "links are not allowed here!",
    };
    with_footer(format!(
        "⚠️ *WARNING {}/{}*\n\n@{}, {}",
        strike,
        max,
        display_name(subject),
        reason
    ))
}

pub fn removal(subject: &str, infraction: Infraction) -> String {
    let reason = match infraction {
        Infraction::Flood => "repeated flooding",
        Infraction::Link => "unauthorized links",
    };
    with_footer(format!(
        "🛡️ *MEMBER REMOVED*\n\n@{} was removed\nReason: {}",
        display_name(subject),
        reason
    ))
}

pub fn status_limit_private(count: usize, cap: usize) -> String {
    with_footer(format!(
        "⚠️ *LIMIT REACHED*\n\nYou mentioned the group in your status too often.\n\nLimit: {} mentions/day\nYour count: {}/{}",
        cap, count, cap
    ))
}

pub fn status_limit_alert(poster: &str, count: usize, cap: usize) -> String {
    with_footer(format!(
        "🔔 *STATUS MENTION ALERT*\n\n@{} exceeded the limit ({}/{})",
        display_name(poster),
        count,
        cap
    ))
}

pub fn welcome(subject: &str, group_name: &str) -> String {
    with_footer(format!(
        "👋 Welcome @{} to *{}*!\n\nPlease read the rules with !rules",
        display_name(subject),
        group_name
    ))
}

pub fn goodbye(subject: &str, group_name: &str) -> String {
    with_footer(format!("👋 @{} left *{}*. Goodbye!", display_name(subject), group_name))
}

pub fn help(prefix: &str) -> String {
    let mut out = String::from("📖 *COMMANDS*\n");
    for (title, access) in [("Everyone", Access::Public), ("Admins", Access::Admin)] {
        out.push_str(&format!("\n*{}*\n", title));
        for spec in COMMANDS.iter().filter(|c| c.access == access) {
            out.push_str(&format!("• {}{} : {}\n", prefix, spec.usage, spec.summary));
        }
    }
    with_footer(out.trim_end().to_string())
}

pub fn rules(flood_threshold: usize, flood_window_ms: u64, max_warnings: u32) -> String {
    with_footer(format!(
        "📜 *GROUP RULES*\n\n1. Be respectful\n2. No links\n3. No flooding ({} messages in {} s)\n4. {} warnings and you are removed",
        flood_threshold,
        flood_window_ms / 1000,
        max_warnings
    ))
}

pub fn group_stats(group_name: &str, counters: &GroupCounters, strikes: usize) -> String {
    with_footer(format!(
        "📊 *STATS: {}*\n\n💬 Messages: {}\n⌨️ Commands: {}\n⚠️ Warnings: {}\n🚫 Kicks: {}\n➕ Joins: {}\n➖ Leaves: {}\n🎯 Members with strikes: {}",
        group_name,
        counters.messages,
        counters.commands,
        counters.warnings,
        counters.kicks,
        counters.joins,
        counters.leaves,
        strikes
    ))
}

pub fn group_info(metadata: &GroupMetadata, created: Option<String>) -> String {
    with_footer(format!(
        "ℹ️ *{}*\n\n👥 Members: {}\n👑 Admins: {}\n📅 Created: {}",
        metadata.subject,
        metadata.participants.len(),
        metadata.admin_count(),
        created.unwrap_or_else(|| "unknown".into())
    ))
}

pub fn members(metadata: &GroupMetadata) -> String {
    let mut admins = String::new();
    let mut members = String::new();
    for p in &metadata.participants {
        let line = format!("• @{}\n", display_name(&p.id));
        if p.is_admin() {
            admins.push_str(&line);
        } else {
            members.push_str(&line);
        }
    }
    with_footer(format!(
        "👑 *ADMINS ({})*\n{}\n👥 *MEMBERS ({})*\n{}",
        metadata.admin_count(),
        admins,
        metadata.participants.len() - metadata.admin_count(),
        members.trim_end()
    ))
}

pub fn mention_all(metadata: &GroupMetadata, note: &str) -> String {
    let mut out = String::from("📢 *ATTENTION EVERYONE*\n");
    if !note.is_empty() {
        out.push_str(&format!("\n{}\n", note));
    }
    out.push('\n');
    for p in &metadata.participants {
        out.push_str(&format!("@{} ", display_name(&p.id)));
    }
    with_footer(out.trim_end().to_string())
}

pub fn member_activity(
    subject: &str,
    activity: &MemberActivity,
    strikes: u32,
    max: u32,
    period: &str,
) -> String {
    with_footer(format!(
        "👤 *@{}* (last {})\n\n💬 Messages: {}\n💭 Replies: {}\n🏷️ Mentioned: {} times\n📎 Media: {}\n⚠️ Warnings: {}/{}",
        display_name(subject),
        period,
        activity.messages,
        activity.replies,
        activity.mentions,
        activity.media.total(),
        strikes,
        max
    ))
}

pub fn strike_list(entries: &[(String, u32)], max: u32) -> String {
    if entries.is_empty() {
        return with_footer("✅ No member has a warning".into());
    }
    let mut out = String::from("⚠️ *WARNINGS*\n\n");
    for (subject, strikes) in entries {
        out.push_str(&format!("• @{} : {}/{}\n", display_name(subject), strikes, max));
    }
    with_footer(out.trim_end().to_string())
}

pub fn strikes_cleared(count: usize) -> String {
    format!("✅ Cleared warnings of {} member(s)", count)
}

pub fn usage(prefix: &str, usage: &str) -> String {
    format!("ℹ️ Usage: {}{}", prefix, usage)
}

pub fn admin_only() -> String {
    "🔒 This command is reserved for admins".into()
}

pub fn too_many_commands() -> String {
    with_footer("⚠️ Too many commands!\n\n⏰ Wait a few seconds".into())
}

pub fn quota_exhausted(wait_minutes: u64) -> String {
    format!("⏳ Limit reached. Try again in {} min", wait_minutes)
}

pub fn cooling_down(wait_seconds: u64) -> String {
    format!("⏳ Please wait {} s before asking again", wait_seconds)
}

pub fn ai_unavailable() -> String {
    "🤖 The assistant is unavailable right now, try again later".into()
}

/// `left` is the (remaining, max) quota once this request is counted.
pub fn ai_answer(answer: &str, left: Option<(usize, usize)>) -> String {
    let mut body = format!("🤖 {}", answer);
    if let Some((remaining, max)) = left {
        body.push_str(&format!("\n\nℹ️ Requests left: {}/{}", remaining, max));
    }
    with_footer(body)
}

pub fn correction(author: &str, fixed: &str, left: Option<(usize, usize)>) -> String {
    let mut body = format!("✏️ *CORRECTION FOR @{}*\n\n📖 {}", display_name(author), fixed);
    if let Some((remaining, max)) = left {
        body.push_str(&format!("\n\nℹ️ Corrections left: {}/{}", remaining, max));
    }
    with_footer(body)
}

pub fn correction_not_needed() -> String {
    "✅ Nothing to fix".into()
}

pub fn nothing_to_correct() -> String {
    "✏️ This message is too short to correct".into()
}

pub fn no_activity(period: &str) -> String {
    format!("📭 No activity in the last {}", period)
}

pub fn action_done(action: &str, subject: &str) -> String {
    format!("✅ @{} {}", display_name(subject), action)
}

pub fn action_failed(action: &str) -> String {
    format!("❌ Could not {}", action)
}

pub fn refuse(reason: &str) -> String {
    format!("❌ {}", reason)
}

pub fn invite_link(code: &str) -> String {
    format!("🔗 https://chat.whatsapp.com/{}", code)
}

pub fn invite_reset() -> String {
    "🔄 Invite link revoked".into()
}

pub fn muted(muted: bool) -> String {
    if muted {
        "🔇 Only admins can send messages now".into()
    } else {
        "🔊 Everyone can send messages now".into()
    }
}

pub fn status_limit_state(enabled: bool, cap: usize) -> String {
    let state = if enabled { "ON" } else { "OFF" };
    format!("📵 Status mention limit: *{}* (max {}/day)", state, cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_names_count_out_of_max() {
        let text = warning("33600000000@s.whatsapp.net", Infraction::Link, 2, 3);
        assert!(text.contains("WARNING 2/3"));
        assert!(text.contains("@33600000000"));
    }

    #[test]
    fn test_answer_shows_quota_when_limited() {
        assert!(ai_answer("Hi", Some((9, 10))).contains("Requests left: 9/10"));
        assert!(!ai_answer("Hi", None).contains("left"));
    }

    #[test]
    fn test_help_lists_every_command() {
        let text = help("!");
        for spec in COMMANDS {
            assert!(text.contains(&format!("!{}", spec.usage)), "{}", spec.name);
        }
    }
}
