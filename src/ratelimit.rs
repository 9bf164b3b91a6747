use dashmap::DashMap;

use crate::config::{LimitConfig, RateLimitsConfig};
use crate::window::EventWindow;

const MINUTE_MS: u64 = 60_000;
const SECOND_MS: u64 = 1_000;

/// Independent limiter domains. Two purposes never share counters, even for
/// the same subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    AiChat,
    AiCorrection,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: usize,
    pub window_ms: u64,
    pub cooldown_ms: u64,
}

impl From<&LimitConfig> for RateLimitPolicy {
    fn from(cfg: &LimitConfig) -> Self {
        Self {
            max_requests: cfg.max_requests,
            window_ms: cfg.window_ms,
            cooldown_ms: cfg.cooldown_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCheck {
    Allowed { remaining: usize },
    Exhausted { wait_minutes: u64 },
}

impl QuotaCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaCheck::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    Ready,
    Cooling { wait_seconds: u64 },
}

#[derive(Debug, Default)]
struct LimitRecord {
    requests: EventWindow,
    last_call: Option<u64>,
}

/// Quota-over-window plus cooldown, keyed by (purpose, subject).
///
/// `check_quota` and `check_cooldown` never mutate. `commit` records an
/// attempt; call sites decide whether to commit on dispatch or on success.
/// `check_and_commit` is the synchronous form used for generic commands.
pub struct RateLimiter {
    ai: RateLimitPolicy,
    correction: RateLimitPolicy,
    commands: RateLimitPolicy,
    records: DashMap<(Purpose, String), LimitRecord>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitsConfig) -> Self {
        Self {
            ai: (&config.ai).into(),
            correction: (&config.correction).into(),
            commands: (&config.commands).into(),
            records: DashMap::new(),
        }
    }

    pub fn policy(&self, purpose: Purpose) -> &RateLimitPolicy {
        match purpose {
            Purpose::AiChat => &self.ai,
            Purpose::AiCorrection => &self.correction,
            Purpose::Command => &self.commands,
        }
    }

    fn quota_of(policy: &RateLimitPolicy, record: Option<&LimitRecord>, now: u64) -> QuotaCheck {
        let (count, oldest) = match record {
            Some(r) => (
                r.requests.count(now, policy.window_ms),
                r.requests.oldest_live(now, policy.window_ms),
            ),
            None => (0, None),
        };

        if count >= policy.max_requests {
            let wait_ms = oldest
                .map(|t| (t + policy.window_ms).saturating_sub(now))
                .unwrap_or(policy.window_ms);
            return QuotaCheck::Exhausted {
                wait_minutes: wait_ms.div_ceil(MINUTE_MS),
            };
        }

        QuotaCheck::Allowed {
            remaining: policy.max_requests - count,
        }
    }

    pub fn check_quota(&self, purpose: Purpose, subject: &str, now: u64) -> QuotaCheck {
        let policy = self.policy(purpose);
        let record = self.records.get(&(purpose, subject.to_string()));
        Self::quota_of(policy, record.as_deref(), now)
    }

    pub fn check_cooldown(&self, purpose: Purpose, subject: &str, now: u64) -> CooldownCheck {
        let policy = self.policy(purpose);
        let last = self
            .records
            .get(&(purpose, subject.to_string()))
            .and_then(|r| r.last_call);

        match last {
            Some(last) if now.saturating_sub(last) < policy.cooldown_ms => {
                let left = policy.cooldown_ms - now.saturating_sub(last);
                CooldownCheck::Cooling {
                    wait_seconds: left.div_ceil(SECOND_MS),
                }
            }
            _ => CooldownCheck::Ready,
        }
    }

    pub fn commit(&self, purpose: Purpose, subject: &str, now: u64) {
        let window_ms = self.policy(purpose).window_ms;
        let mut record = self.records.entry((purpose, subject.to_string())).or_default();
        record.requests.record(now, window_ms);
        record.last_call = Some(now);
    }

    /// Checks the quota and, when allowed, records the request under the same
    /// entry lock.
    pub fn check_and_commit(&self, purpose: Purpose, subject: &str, now: u64) -> QuotaCheck {
        let policy = *self.policy(purpose);
        let mut record = self.records.entry((purpose, subject.to_string())).or_default();
        let verdict = Self::quota_of(&policy, Some(&*record), now);
        if verdict.is_allowed() {
            record.requests.record(now, policy.window_ms);
            record.last_call = Some(now);
        }
        verdict
    }

    /// Drops records whose quota window and cooldown have both lapsed.
    pub fn sweep(&self, now: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|(purpose, _), record| {
            let policy = self.policy(*purpose);
            record.requests.prune(now, policy.window_ms);
            let cooling = record
                .last_call
                .map_or(false, |last| now.saturating_sub(last) < policy.cooldown_ms);
            !record.requests.is_empty() || cooling
        });
        before - self.records.len()
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}
