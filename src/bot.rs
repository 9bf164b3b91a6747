//! The sequential event path. One [`Bot`] consumes bridge events in arrival
//! order, updates [`BotState`] and delegates every side effect to the
//! [`Transport`].

use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::activity::MessageSignals;
use crate::ai::{self, CompletionClient, CompletionMode, NO_CORRECTION};
use crate::clock;
use crate::commands::{self, Access, CommandKind, CommandSpec, ParsedCommand};
use crate::config::{CommandsConfig, Config, ModerationConfig};
use crate::error::BotError;
use crate::metrics::Metrics;
use crate::moderation::Verdict;
use crate::protocol::{
    display_name, is_group_id, BridgeEvent, ConnectionState, DisconnectReason, GroupMetadata,
    GroupSetting, InboundMessage, Origin, ParticipantAction,
};
use crate::ratelimit::{CooldownCheck, Purpose, QuotaCheck};
use crate::replies;
use crate::report;
use crate::state::BotState;
use crate::stats::GroupCounter;
use crate::transport::Transport;
use crate::window::ScopeKey;

const TOP_LIMIT: usize = 10;
const MIN_ALIAS_QUESTION_CHARS: usize = 5;
const SESSION_LOGGED_OUT: u16 = 401;
const SESSION_REPLACED: u16 = 440;

/// A limited request that passed quota and cooldown. Committed only once the
/// work it gates succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admission {
    purpose: Purpose,
    remaining: usize,
    max: usize,
}

impl Admission {
    /// (remaining, max) once this request is counted.
    fn left_after(&self) -> (usize, usize) {
        (self.remaining.saturating_sub(1), self.max)
    }
}

enum Gate {
    Unlimited,
    Admitted(Admission),
    Refused,
}

pub struct Bot {
    state: Arc<BotState>,
    transport: Arc<dyn Transport>,
    ai: Arc<dyn CompletionClient>,
    metrics: Arc<Metrics>,
    commands: CommandsConfig,
    moderation: ModerationConfig,
    correction_min_words: usize,
    alias: Regex,
    alias_limit: Option<Purpose>,
}

impl Bot {
    pub fn new(
        config: &Config,
        state: Arc<BotState>,
        transport: Arc<dyn Transport>,
        ai: Arc<dyn CompletionClient>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, BotError> {
        let alias = Regex::new(&format!("(?i){}", regex::escape(&config.commands.bot_mention)))
            .map_err(|e| BotError::Config(format!("invalid bot mention alias: {}", e)))?;

        Ok(Self {
            state,
            transport,
            ai,
            metrics,
            commands: config.commands.clone(),
            moderation: config.moderation.clone(),
            correction_min_words: config.ai.correction_min_words,
            alias,
            alias_limit: commands::spec_of(CommandKind::Ai).and_then(|spec| spec.limit),
        })
    }

    /// Consumes queued bridge events one at a time until the queue closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<BridgeEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event, clock::now_ms()).await;
        }
        info!("Event queue closed, dispatcher stopped");
    }

    pub async fn handle_event(&self, event: BridgeEvent, now: u64) {
        self.metrics.inc_events();
        match event {
            BridgeEvent::Message(msg) => self.handle_message(msg, now).await,
            BridgeEvent::ParticipantsUpdate {
                group,
                action,
                participants,
            } => self.handle_participants(&group, action, &participants).await,
            BridgeEvent::ConnectionUpdate { state, reason, code } => {
                self.handle_connection(state, reason, code)
            }
            BridgeEvent::Result { request_id, .. } => {
                debug!("Result {} reached the event path, ignoring", request_id);
            }
        }
    }

    async fn handle_message(&self, msg: InboundMessage, now: u64) {
        match msg.origin() {
            Origin::StatusPost => self.handle_status_post(&msg, now).await,
            Origin::Group => self.handle_group_message(&msg, now).await,
            Origin::Direct => debug!("Ignoring direct message from {}", msg.sender),
        }
    }

    // Transport helpers

    /// Best-effort send. Failures are logged and swallowed.
    async fn say(&self, to: &str, text: &str, mentions: &[String], quoted_id: Option<&str>) {
        if let Err(e) = self.transport.send_text(to, text, mentions, quoted_id).await {
            self.metrics.inc_transport_failures();
            warn!("Failed to send message to {}: {}", to, e);
        }
    }

    async fn metadata(&self, group: &str) -> Option<GroupMetadata> {
        match self.transport.group_metadata(group).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                self.metrics.inc_transport_failures();
                warn!("Failed to fetch metadata of {}: {}", group, e);
                None
            }
        }
    }

    // Status posts

    async fn handle_status_post(&self, msg: &InboundMessage, now: u64) {
        for group in msg.mentions.iter().filter(|m| is_group_id(m)) {
            let Some(alert) = self.state.status.on_status_mention(group, &msg.sender, now) else {
                continue;
            };

            self.metrics.inc_status_alerts();
            info!(
                "{} mentioned {} in status {} times (cap {})",
                alert.poster, alert.group, alert.count, alert.cap
            );
            self.say(
                &alert.poster,
                &replies::status_limit_private(alert.count, alert.cap),
                &[],
                None,
            )
            .await;
            self.say(
                &alert.group,
                &replies::status_limit_alert(&alert.poster, alert.count, alert.cap),
                &[alert.poster.clone()],
                None,
            )
            .await;
        }
    }

    // Group messages

    async fn handle_group_message(&self, msg: &InboundMessage, now: u64) {
        let group = msg.chat.as_str();
        let command = commands::parse(msg.text(), &self.commands.prefix);

        if msg.from_me && command.is_none() {
            return;
        }

        self.state.stats.increment(group, GroupCounter::Messages);
        if let Some(command) = command {
            self.state.stats.increment(group, GroupCounter::Commands);

            let check = self
                .state
                .limiter
                .check_and_commit(Purpose::Command, &msg.sender, now);
            if !check.is_allowed() {
                self.metrics.inc_rate_limits();
                debug!("Command rate limit hit by {}", msg.sender);
                self.say(group, &replies::too_many_commands(), &[], None).await;
                return;
            }

            self.dispatch(msg, command, now).await;
            return;
        }

        self.metrics.inc_messages();
        self.state.activity.record_message(
            &MessageSignals {
                group,
                sender: &msg.sender,
                is_reply: msg.quoted.is_some(),
                media: msg.content.media_kind(),
                mentioned: &msg.mentions,
            },
            now,
        );

        // without metadata the admin flag is unknown, so moderation is skipped
        if let Some(metadata) = self.metadata(group).await {
            let key = ScopeKey::new(group, msg.sender.as_str());
            let verdict = self
                .state
                .moderate(&key, msg.text(), metadata.is_admin(&msg.sender), now);
            if verdict != Verdict::Allow {
                self.enforce(msg, &key, verdict).await;
                return;
            }
        }

        if let Some(question) = self.alias_question(msg.text()) {
            self.state.stats.log_command(group, "ai_mention");
            let admission = match self.admit(self.alias_limit, group, &msg.sender, true, now).await {
                Gate::Refused => return,
                Gate::Admitted(admission) => Some(admission),
                Gate::Unlimited => None,
            };
            self.ask_assistant(msg, &question, None, admission, now).await;
        }
    }

    async fn enforce(&self, msg: &InboundMessage, key: &ScopeKey, verdict: Verdict) {
        let group = key.group.as_str();
        let subject = key.subject.as_str();

        match verdict {
            Verdict::Allow => {}
            Verdict::Warn {
                infraction,
                strike,
                max,
            } => {
                self.metrics.inc_warnings();
                info!("Warning {}/{} for {} in {} ({:?})", strike, max, subject, group, infraction);
                self.say(
                    group,
                    &replies::warning(subject, infraction, strike, max),
                    &[subject.to_string()],
                    None,
                )
                .await;
                if let Err(e) = self
                    .transport
                    .delete_message(group, &msg.id, Some(subject))
                    .await
                {
                    debug!("Could not delete message {} in {}: {}", msg.id, group, e);
                }
            }
            Verdict::Remove { infraction } => {
                self.metrics.inc_warnings();
                match self.transport.remove_participant(group, subject).await {
                    Ok(()) => {
                        self.state.confirm_removal(key);
                        self.metrics.inc_removals();
                        info!("Removed {} from {} ({:?})", subject, group, infraction);
                        self.say(
                            group,
                            &replies::removal(subject, infraction),
                            &[subject.to_string()],
                            None,
                        )
                        .await;
                    }
                    Err(e) => {
                        self.metrics.inc_transport_failures();
                        warn!("Failed to remove {} from {}: {}", subject, group, e);
                    }
                }
            }
        }
    }

    fn alias_question(&self, text: &str) -> Option<String> {
        if !self.alias.is_match(text) {
            return None;
        }
        let question = self.alias.replace_all(text, "").trim().to_string();
        (question.chars().count() > MIN_ALIAS_QUESTION_CHARS).then_some(question)
    }

    // Rate-limited AI calls

    /// Checks quota and cooldown of `limit` without recording anything.
    /// Sends the matching notice when the request is refused.
    async fn admit(
        &self,
        limit: Option<Purpose>,
        chat: &str,
        subject: &str,
        quiet_cooldown: bool,
        now: u64,
    ) -> Gate {
        let Some(purpose) = limit else {
            return Gate::Unlimited;
        };
        let limiter = &self.state.limiter;

        let remaining = match limiter.check_quota(purpose, subject, now) {
            QuotaCheck::Allowed { remaining } => remaining,
            QuotaCheck::Exhausted { wait_minutes } => {
                self.metrics.inc_rate_limits();
                self.say(chat, &replies::quota_exhausted(wait_minutes), &[subject.to_string()], None)
                    .await;
                return Gate::Refused;
            }
        };
        if let CooldownCheck::Cooling { wait_seconds } = limiter.check_cooldown(purpose, subject, now) {
            self.metrics.inc_rate_limits();
            if !quiet_cooldown {
                self.say(chat, &replies::cooling_down(wait_seconds), &[], None).await;
            }
            return Gate::Refused;
        }

        Gate::Admitted(Admission {
            purpose,
            remaining,
            max: limiter.policy(purpose).max_requests,
        })
    }

    fn commit(&self, admission: Option<Admission>, subject: &str, now: u64) -> Option<(usize, usize)> {
        let admission = admission?;
        self.state.limiter.commit(admission.purpose, subject, now);
        Some(admission.left_after())
    }

    async fn ask_assistant(
        &self,
        msg: &InboundMessage,
        prompt: &str,
        context: Option<&str>,
        admission: Option<Admission>,
        now: u64,
    ) {
        let group = msg.chat.as_str();

        self.metrics.inc_ai_requests();
        match self.ai.complete(prompt, context, CompletionMode::Chat).await {
            Ok(answer) => {
                let left = self.commit(admission, &msg.sender, now);
                self.say(group, &replies::ai_answer(&answer, left), &[], Some(&msg.id)).await;
            }
            Err(e) => {
                self.metrics.inc_ai_failures();
                warn!("AI chat request from {} failed: {}", msg.sender, e);
                self.say(group, &replies::ai_unavailable(), &[], None).await;
            }
        }
    }

    async fn correct(
        &self,
        msg: &InboundMessage,
        spec: &CommandSpec,
        admission: Option<Admission>,
        now: u64,
    ) -> Result<(), BotError> {
        let group = msg.chat.as_str();
        let (Some(quoted), Some(text)) = (msg.quoted.as_ref(), msg.quoted_text()) else {
            return Err(BotError::Usage(spec.usage.to_string()));
        };

        if !ai::worth_correcting(text, self.correction_min_words) {
            self.say(group, &replies::nothing_to_correct(), &[], Some(&msg.id)).await;
            return Ok(());
        }

        self.metrics.inc_ai_requests();
        let fixed = match self.ai.complete(text, None, CompletionMode::Correction).await {
            Ok(fixed) => fixed,
            Err(e) => {
                self.metrics.inc_ai_failures();
                return Err(e.into());
            }
        };

        if fixed.trim() == NO_CORRECTION {
            self.say(group, &replies::correction_not_needed(), &[], Some(&msg.id)).await;
            return Ok(());
        }

        let left = self.commit(admission, &msg.sender, now);
        let author = quoted.participant.clone().unwrap_or_else(|| msg.sender.clone());
        self.say(
            group,
            &replies::correction(&author, &fixed, left),
            &[author.clone()],
            Some(&msg.id),
        )
        .await;
        Ok(())
    }

    // Commands

    async fn dispatch(&self, msg: &InboundMessage, command: ParsedCommand<'_>, now: u64) {
        let Some(spec) = commands::lookup(&command.name) else {
            debug!("Unknown command {:?} from {}", command.name, msg.sender);
            return;
        };

        let group = msg.chat.as_str();
        match self.run_command(msg, spec, command.args, now).await {
            Ok(()) => {}
            Err(BotError::Unauthorized(name)) => {
                debug!("{} tried admin command {} in {}", msg.sender, name, group);
                self.say(group, &replies::admin_only(), &[], None).await;
            }
            Err(BotError::Usage(usage)) => {
                self.say(group, &replies::usage(&self.commands.prefix, &usage), &[], None)
                    .await;
            }
            Err(BotError::Ai(e)) => {
                warn!("AI request for {} failed: {}", spec.name, e);
                self.say(group, &replies::ai_unavailable(), &[], None).await;
            }
            Err(BotError::Transport(e)) => {
                self.metrics.inc_transport_failures();
                warn!("Command {} in {} failed: {}", spec.name, group, e);
                self.say(group, &replies::action_failed(spec.name), &[], None).await;
            }
            Err(e) => error!("Command {} in {} failed: {}", spec.name, group, e),
        }
    }

    async fn run_command(
        &self,
        msg: &InboundMessage,
        spec: &CommandSpec,
        args: &str,
        now: u64,
    ) -> Result<(), BotError> {
        let group = msg.chat.as_str();

        let metadata = if spec.access == Access::Admin {
            let metadata = self.transport.group_metadata(group).await?;
            if !metadata.is_admin(&msg.sender) {
                return Err(BotError::Unauthorized(spec.name.to_string()));
            }
            Some(metadata)
        } else {
            None
        };

        self.state.stats.log_command(group, spec.name);
        self.metrics.inc_commands();
        debug!("{} ran {} in {}", msg.sender, spec.name, group);

        let admission = match self.admit(spec.limit, group, &msg.sender, false, now).await {
            Gate::Refused => return Ok(()),
            Gate::Admitted(admission) => Some(admission),
            Gate::Unlimited => None,
        };
        let period = report::period_label(self.state.activity.window_ms());

        match spec.kind {
            CommandKind::Help => {
                self.say(group, &replies::help(&self.commands.prefix), &[], None).await;
            }
            CommandKind::Rules => {
                let text = replies::rules(
                    self.moderation.flood_threshold,
                    self.moderation.flood_window_ms,
                    self.moderation.max_warnings,
                );
                self.say(group, &text, &[], None).await;
            }
            CommandKind::Stats => {
                let name = self
                    .metadata(group)
                    .await
                    .map(|m| m.subject)
                    .unwrap_or_else(|| group.to_string());
                let counters = self.state.stats.get(group);
                let strikes = self.state.moderation.group_strikes(group).len();
                self.say(group, &replies::group_stats(&name, &counters, strikes), &[], None)
                    .await;
            }
            CommandKind::Info => {
                let metadata = self.transport.group_metadata(group).await?;
                let created = metadata
                    .creation
                    .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                    .map(|d| d.format("%Y-%m-%d").to_string());
                self.say(group, &replies::group_info(&metadata, created), &[], None).await;
            }
            CommandKind::Members => {
                let metadata = self.transport.group_metadata(group).await?;
                let ids = participant_ids(&metadata);
                self.say(group, &replies::members(&metadata), &ids, None).await;
            }
            CommandKind::All => {
                let metadata = self.transport.group_metadata(group).await?;
                let ids = participant_ids(&metadata);
                self.say(group, &replies::mention_all(&metadata, args), &ids, None).await;
            }
            CommandKind::Msg => {
                let metadata = self.transport.group_metadata(group).await?;
                let target = resolve_target(msg, args, &metadata, false)
                    .ok_or_else(|| BotError::Usage(spec.usage.to_string()))?;
                let key = ScopeKey::new(group, target.as_str());
                let activity = self.state.activity.member_activity(&key, now);
                let strikes = self.state.moderation.strikes(&key).unwrap_or(0);
                let text = replies::member_activity(
                    &target,
                    &activity,
                    strikes,
                    self.state.moderation.max_warnings(),
                    &period,
                );
                self.say(group, &text, &[target.clone()], None).await;
            }
            CommandKind::Top => {
                let metadata = self.transport.group_metadata(group).await?;
                match report::top_members(&self.state.activity, &metadata, TOP_LIMIT, now) {
                    Some(board) => {
                        let rendered = report::render_leaderboard(&board);
                        self.say(group, &rendered.text, &rendered.mentions, None).await;
                    }
                    None => self.say(group, &replies::no_activity(&period), &[], None).await,
                }
            }
            CommandKind::Report => {
                let metadata = self.transport.group_metadata(group).await?;
                let Some(full) = report::full_report(&self.state.activity, &metadata, now) else {
                    self.say(group, &replies::no_activity(&period), &[], None).await;
                    return Ok(());
                };
                let chunks = report::split_chunks(report::render_report(&full), self.commands.max_chunk_len);
                let last = chunks.len().saturating_sub(1);
                for (i, chunk) in chunks.into_iter().enumerate() {
                    self.say(group, &chunk.text, &chunk.mentions, None).await;
                    if i < last && self.commands.chunk_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.commands.chunk_delay_ms)).await;
                    }
                }
            }
            CommandKind::Ai => {
                let quoted = msg.quoted_text();
                let (prompt, context) = match (args.is_empty(), quoted) {
                    (true, Some(quoted)) => (quoted, None),
                    (false, quoted) => (args, quoted),
                    (true, None) => return Err(BotError::Usage(spec.usage.to_string())),
                };
                self.ask_assistant(msg, prompt, context, admission, now).await;
            }
            CommandKind::Fix => self.correct(msg, spec, admission, now).await?,
            CommandKind::Add => {
                let number = commands::extract_number(args)
                    .ok_or_else(|| BotError::Usage(spec.usage.to_string()))?;
                let id = commands::number_to_id(&number);
                self.change_participant(group, &id, ParticipantAction::Add, "was added")
                    .await?;
            }
            CommandKind::Invite => {
                let code = self.transport.invite_code(group).await?;
                self.say(group, &replies::invite_link(&code), &[], None).await;
            }
            CommandKind::ResetInvite => {
                self.transport.revoke_invite(group).await?;
                self.say(group, &replies::invite_reset(), &[], None).await;
            }
            CommandKind::Kick | CommandKind::Promote | CommandKind::Demote => {
                let metadata = metadata.as_ref().ok_or_else(|| BotError::Unauthorized(spec.name.into()))?;
                self.manage_member(msg, spec, args, metadata).await?;
            }
            CommandKind::Warnings => {
                let entries = self.state.moderation.group_strikes(group);
                let mentions: Vec<String> = entries.iter().map(|(id, _)| id.clone()).collect();
                let text = replies::strike_list(&entries, self.state.moderation.max_warnings());
                self.say(group, &text, &mentions, None).await;
            }
            CommandKind::ClearWarns => {
                let cleared = self.state.moderation.clear_group(group);
                self.say(group, &replies::strikes_cleared(cleared), &[], None).await;
            }
            CommandKind::Mute | CommandKind::Unmute => {
                let mute = spec.kind == CommandKind::Mute;
                let setting = if mute {
                    GroupSetting::Announcement
                } else {
                    GroupSetting::NotAnnouncement
                };
                self.transport.set_group_setting(group, setting).await?;
                self.say(group, &replies::muted(mute), &[], None).await;
            }
            CommandKind::StatusLimit => {
                match args.to_lowercase().as_str() {
                    "on" => self.state.status.set_enabled(group, true),
                    "off" => self.state.status.set_enabled(group, false),
                    "" => {}
                    _ => return Err(BotError::Usage(spec.usage.to_string())),
                }
                let enabled = self.state.status.is_enabled(group);
                let text = replies::status_limit_state(enabled, self.state.status.cap());
                self.say(group, &text, &[], None).await;
            }
        }

        Ok(())
    }

    async fn manage_member(
        &self,
        msg: &InboundMessage,
        spec: &CommandSpec,
        args: &str,
        metadata: &GroupMetadata,
    ) -> Result<(), BotError> {
        let group = msg.chat.as_str();
        let is_kick = spec.kind == CommandKind::Kick;
        let target = resolve_target(msg, args, metadata, is_kick)
            .ok_or_else(|| BotError::Usage(spec.usage.to_string()))?;
        let target_is_admin = metadata.is_admin(&target);

        match spec.kind {
            CommandKind::Kick if target_is_admin => {
                self.say(group, &replies::refuse("Admins cannot be removed"), &[], None).await;
            }
            CommandKind::Kick => {
                self.transport.remove_participant(group, &target).await?;
                let key = ScopeKey::new(group, target.as_str());
                self.state.confirm_removal(&key);
                self.metrics.inc_removals();
                info!("{} removed {} from {}", msg.sender, target, group);
                self.say(group, &replies::action_done("was removed", &target), &[target.clone()], None)
                    .await;
            }
            CommandKind::Promote if target_is_admin => {
                self.say(group, &replies::refuse("Already an admin"), &[], None).await;
            }
            CommandKind::Promote => {
                self.change_participant(group, &target, ParticipantAction::Promote, "is now an admin")
                    .await?;
            }
            CommandKind::Demote if !target_is_admin => {
                self.say(group, &replies::refuse("Not an admin"), &[], None).await;
            }
            _ => {
                self.change_participant(group, &target, ParticipantAction::Demote, "is no longer an admin")
                    .await?;
            }
        }
        Ok(())
    }

    async fn change_participant(
        &self,
        group: &str,
        subject: &str,
        action: ParticipantAction,
        done: &str,
    ) -> Result<(), BotError> {
        let results = self
            .transport
            .update_participants(group, action, &[subject.to_string()])
            .await?;

        if let Some(failed) = results.iter().find(|r| r.status != "200") {
            warn!("{:?} of {} in {} returned status {}", action, subject, group, failed.status);
            self.say(group, &replies::refuse(&format!("Request refused ({})", failed.status)), &[], None)
                .await;
            return Ok(());
        }

        self.say(group, &replies::action_done(done, subject), &[subject.to_string()], None)
            .await;
        Ok(())
    }

    // Participants and connection

    async fn handle_participants(&self, group: &str, action: ParticipantAction, participants: &[String]) {
        match action {
            ParticipantAction::Add => {
                self.state.participants_joined(group);
                let name = self.group_name(group).await;
                for subject in participants {
                    self.say(group, &replies::welcome(subject, &name), &[subject.clone()], None)
                        .await;
                }
            }
            ParticipantAction::Remove => {
                self.state.participants_left(group, participants);
                let name = self.group_name(group).await;
                for subject in participants {
                    self.say(group, &replies::goodbye(subject, &name), &[subject.clone()], None)
                        .await;
                }
            }
            ParticipantAction::Promote | ParticipantAction::Demote => {
                info!("{:?} in {}: {}", action, group, participants.join(", "));
            }
        }
    }

    async fn group_name(&self, group: &str) -> String {
        self.metadata(group)
            .await
            .map(|m| m.subject)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| group.to_string())
    }

    fn handle_connection(&self, state: ConnectionState, reason: Option<DisconnectReason>, code: Option<u16>) {
        match state {
            ConnectionState::Open => info!("Messaging session open"),
            ConnectionState::Connecting => info!("Messaging session connecting"),
            ConnectionState::Closed => {
                if reason == Some(DisconnectReason::LoggedOut) || code == Some(SESSION_LOGGED_OUT) {
                    error!("Messaging session logged out, re-authentication required; not reconnecting");
                } else if reason == Some(DisconnectReason::Replaced) || code == Some(SESSION_REPLACED) {
                    error!("Messaging session replaced by another client");
                } else {
                    warn!("Messaging session closed (code {:?}), bridge will reconnect", code);
                }
            }
        }
    }
}

fn participant_ids(metadata: &GroupMetadata) -> Vec<String> {
    metadata.participants.iter().map(|p| p.id.clone()).collect()
}

/// First mention, else the quoted author, else a phone number in `args`
/// matched against the participants. With `fallback_to_number` an unmatched
/// number still resolves to its user id.
fn resolve_target(
    msg: &InboundMessage,
    args: &str,
    metadata: &GroupMetadata,
    fallback_to_number: bool,
) -> Option<String> {
    if let Some(first) = msg.mentions.first() {
        return Some(first.clone());
    }
    if let Some(author) = msg.quoted.as_ref().and_then(|q| q.participant.clone()) {
        return Some(author);
    }

    let number = commands::extract_number(args)?;
    metadata
        .participants
        .iter()
        .find(|p| display_name(&p.id) == number)
        .map(|p| p.id.clone())
        .or_else(|| fallback_to_number.then(|| commands::number_to_id(&number)))
}
