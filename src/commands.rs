//! The fixed command vocabulary. Authorization and rate-limit purpose are
//! properties of each row, read by the dispatcher.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::protocol::USER_SUFFIX;
use crate::ratelimit::Purpose;

static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{10,15}\b").expect("phone pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    Rules,
    Stats,
    Info,
    Members,
    All,
    Msg,
    Top,
    Report,
    Ai,
    Fix,
    Add,
    Invite,
    ResetInvite,
    Kick,
    Promote,
    Demote,
    Warnings,
    ClearWarns,
    Mute,
    Unmute,
    StatusLimit,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub kind: CommandKind,
    pub name: &'static str,
    pub access: Access,
    pub limit: Option<Purpose>,
    pub usage: &'static str,
    pub summary: &'static str,
}

const fn public(kind: CommandKind, name: &'static str, usage: &'static str, summary: &'static str) -> CommandSpec {
    CommandSpec {
        kind,
        name,
        access: Access::Public,
        limit: None,
        usage,
        summary,
    }
}

const fn admin(kind: CommandKind, name: &'static str, usage: &'static str, summary: &'static str) -> CommandSpec {
    CommandSpec {
        kind,
        name,
        access: Access::Admin,
        limit: None,
        usage,
        summary,
    }
}

pub static COMMANDS: &[CommandSpec] = &[
    public(CommandKind::Help, "help", "help", "Show this list"),
    public(CommandKind::Rules, "rules", "rules", "Group rules"),
    public(CommandKind::Stats, "stats", "stats", "Group statistics"),
    public(CommandKind::Info, "info", "info", "Group information"),
    public(CommandKind::Members, "members", "members", "List admins and members"),
    public(CommandKind::All, "all", "all [message]", "Mention everyone"),
    public(CommandKind::Msg, "msg", "msg <@user|number>", "Activity of one member"),
    public(CommandKind::Top, "top", "top", "Most active members"),
    public(CommandKind::Report, "report", "report", "Full activity report"),
    CommandSpec {
        limit: Some(Purpose::AiChat),
        ..public(CommandKind::Ai, "ai", "ai <question> (or reply to a message)", "Ask the assistant")
    },
    CommandSpec {
        limit: Some(Purpose::AiCorrection),
        ..public(CommandKind::Fix, "fix", "fix (reply to a message)", "Fix spelling of a message")
    },
    admin(CommandKind::Add, "add", "add <number>", "Add a member"),
    admin(CommandKind::Invite, "invite", "invite", "Show the invite link"),
    admin(CommandKind::ResetInvite, "resetinvite", "resetinvite", "Revoke the invite link"),
    admin(CommandKind::Kick, "kick", "kick <@user|number>", "Remove a member"),
    admin(CommandKind::Promote, "promote", "promote <@user|number>", "Make a member admin"),
    admin(CommandKind::Demote, "demote", "demote <@user|number>", "Revoke admin rights"),
    admin(CommandKind::Warnings, "warnings", "warnings", "List members with strikes"),
    admin(CommandKind::ClearWarns, "clearwarns", "clearwarns", "Reset all strikes"),
    admin(CommandKind::Mute, "mute", "mute", "Only admins can send"),
    admin(CommandKind::Unmute, "unmute", "unmute", "Everyone can send"),
    admin(CommandKind::StatusLimit, "statuslimit", "statuslimit [on|off]", "Limit status mentions"),
];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub fn spec_of(kind: CommandKind) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.kind == kind)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub name: String,
    pub args: &'a str,
}

/// Splits `!name args` into a lowercase name and the raw argument text.
/// Returns `None` when the text is not prefixed or the name is empty.
pub fn parse<'a>(text: &'a str, prefix: &str) -> Option<ParsedCommand<'a>> {
    let body = text.trim_start().strip_prefix(prefix)?;
    let (name, args) = match body.find(char::is_whitespace) {
        Some(idx) => (&body[..idx], body[idx..].trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name: name.to_lowercase(),
        args,
    })
}

/// First 10 to 15 digit run in `text`, ignoring `+`, spaces and dashes
/// inside the number.
pub fn extract_number(text: &str) -> Option<String> {
    let compact: String = text
        .chars()
        .filter(|c| !matches!(c, '+' | '-' | '(' | ')'))
        .collect::<String>();
    if let Some(m) = PHONE_NUMBER.find(&compact) {
        return Some(m.as_str().to_string());
    }
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    (10..=15).contains(&digits.len()).then_some(digits)
}

pub fn number_to_id(number: &str) -> String {
    format!("{}{}", number, USER_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_name_and_args() {
        let cmd = parse("!KICK  @123 spam", "!").unwrap();
        assert_eq!(cmd.name, "kick");
        assert_eq!(cmd.args, "@123 spam");

        let cmd = parse("!top", "!").unwrap();
        assert_eq!(cmd.name, "top");
        assert_eq!(cmd.args, "");

        assert_eq!(parse("hello !top", "!"), None);
        assert_eq!(parse("! top", "!"), None);
    }

    #[test]
    fn test_every_name_is_unique_and_resolvable() {
        for spec in COMMANDS {
            assert_eq!(lookup(spec.name).unwrap().kind, spec.kind);
            assert_eq!(spec_of(spec.kind).unwrap().name, spec.name);
        }
        assert!(lookup("unknown").is_none());
    }

    #[test]
    fn test_access_and_limits_are_declared() {
        assert_eq!(lookup("kick").unwrap().access, Access::Admin);
        assert_eq!(lookup("top").unwrap().access, Access::Public);
        assert_eq!(lookup("ai").unwrap().limit, Some(Purpose::AiChat));
        assert_eq!(lookup("fix").unwrap().limit, Some(Purpose::AiCorrection));
        assert_eq!(lookup("help").unwrap().limit, None);
    }

    #[test]
    fn test_number_extraction() {
        assert_eq!(extract_number("add +33 612345678"), Some("33612345678".into()));
        assert_eq!(extract_number("kick 2250700000000"), Some("2250700000000".into()));
        assert_eq!(extract_number("kick 12345"), None);
        assert_eq!(number_to_id("2250700000000"), "2250700000000@s.whatsapp.net");
    }
}
