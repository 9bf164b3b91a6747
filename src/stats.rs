use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Lifetime totals for one group. Created on the first event for the group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupCounters {
    pub messages: u64,
    pub commands: u64,
    pub warnings: u64,
    pub kicks: u64,
    pub joins: u64,
    pub leaves: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCounter {
    Messages,
    Commands,
    Warnings,
    Kicks,
    Joins,
    Leaves,
}

impl GroupCounters {
    fn slot(&mut self, counter: GroupCounter) -> &mut u64 {
        match counter {
            GroupCounter::Messages => &mut self.messages,
            GroupCounter::Commands => &mut self.commands,
            GroupCounter::Warnings => &mut self.warnings,
            GroupCounter::Kicks => &mut self.kicks,
            GroupCounter::Joins => &mut self.joins,
            GroupCounter::Leaves => &mut self.leaves,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommandUsageKey {
    pub group: String,
    pub command: String,
}

/// Group aggregates and the append-only command tally. Nothing here is read
/// by moderation decisions.
#[derive(Default)]
pub struct GroupStats {
    groups: DashMap<String, GroupCounters>,
    command_usage: DashMap<CommandUsageKey, u64>,
}

impl GroupStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, group: &str, counter: GroupCounter) {
        let mut counters = self.groups.entry(group.to_string()).or_default();
        *counters.slot(counter) += 1;
    }

    pub fn get(&self, group: &str) -> GroupCounters {
        self.groups.get(group).map(|c| *c).unwrap_or_default()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn log_command(&self, group: &str, command: &str) {
        let key = CommandUsageKey {
            group: group.to_string(),
            command: command.to_string(),
        };
        *self.command_usage.entry(key).or_insert(0) += 1;
    }

    pub fn command_usage(&self, group: &str) -> Vec<(String, u64)> {
        let mut out: Vec<(String, u64)> = self
            .command_usage
            .iter()
            .filter(|e| e.key().group == group)
            .map(|e| (e.key().command.clone(), *e.value()))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn group_entries(&self) -> Vec<(String, GroupCounters)> {
        let mut out: Vec<(String, GroupCounters)> = self
            .groups
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn usage_entries(&self) -> Vec<(CommandUsageKey, u64)> {
        let mut out: Vec<(CommandUsageKey, u64)> = self
            .command_usage
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort();
        out
    }

    pub fn restore(&self, groups: Vec<(String, GroupCounters)>, usage: Vec<(CommandUsageKey, u64)>) {
        self.groups.clear();
        self.command_usage.clear();
        for (group, counters) in groups {
            self.groups.insert(group, counters);
        }
        for (key, count) in usage {
            self.command_usage.insert(key, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_created_lazily() {
        let stats = GroupStats::new();
        assert_eq!(stats.get("g"), GroupCounters::default());
        assert_eq!(stats.group_count(), 0);

        stats.increment("g", GroupCounter::Messages);
        stats.increment("g", GroupCounter::Messages);
        stats.increment("g", GroupCounter::Kicks);

        let counters = stats.get("g");
        assert_eq!(counters.messages, 2);
        assert_eq!(counters.kicks, 1);
        assert_eq!(stats.group_count(), 1);
    }

    #[test]
    fn test_command_usage_is_per_group() {
        let stats = GroupStats::new();
        stats.log_command("a", "top");
        stats.log_command("a", "top");
        stats.log_command("a", "help");
        stats.log_command("b", "top");

        assert_eq!(
            stats.command_usage("a"),
            vec![("top".to_string(), 2), ("help".to_string(), 1)]
        );
        assert_eq!(stats.command_usage("b"), vec![("top".to_string(), 1)]);
    }
}
