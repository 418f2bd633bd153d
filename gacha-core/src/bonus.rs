//! Cumulative-draw bonus thresholds and their stateless evaluation.
//!
//! Every count reported here is a projection of `total_draws` (plus latched
//! one-time flags). Session state only ever memoizes these results.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::rules::RuleConfigError;

/// What a bonus hands out when it unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BonusGrant {
    #[default]
    Item,
    /// A free ten-draw batch outside pity accounting.
    FreeBatch,
}

/// Reward granted every `interval` draws.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatingBonus {
    pub id: String,
    pub interval: u32,
    #[serde(default)]
    pub grant: BonusGrant,
}

/// Reward granted once when `total_draws` first reaches `threshold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeBonus {
    pub id: String,
    pub threshold: u32,
    #[serde(default)]
    pub grant: BonusGrant,
}

/// `initial` at `first_threshold`, then every `interval` draws the next entry of `cycle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternatingBonus {
    pub initial: String,
    pub first_threshold: u32,
    pub interval: u32,
    pub cycle: Vec<String>,
}

impl AlternatingBonus {
    /// Reward identity of the `ordinal`-th grant (zero based).
    #[must_use]
    pub fn reward_at(&self, ordinal: u32) -> &str {
        if ordinal == 0 || self.cycle.is_empty() {
            return &self.initial;
        }
        let len = self.cycle.len();
        let idx = usize::try_from(ordinal - 1).unwrap_or(usize::MAX) % len;
        &self.cycle[idx]
    }
}

/// Bonus thresholds attached to a pool category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BonusTable {
    #[serde(default)]
    pub repeating: Vec<RepeatingBonus>,
    #[serde(default)]
    pub one_time: Vec<OneTimeBonus>,
    #[serde(default)]
    pub alternating: Option<AlternatingBonus>,
}

impl BonusTable {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repeating.is_empty() && self.one_time.is_empty() && self.alternating.is_none()
    }

    pub(crate) fn validate(&self) -> Result<(), RuleConfigError> {
        let mut seen = BTreeSet::new();
        let ids = self
            .repeating
            .iter()
            .map(|b| (&b.id, b.interval))
            .chain(self.one_time.iter().map(|b| (&b.id, b.threshold)));
        for (id, step) in ids {
            if step == 0 {
                return Err(RuleConfigError::ZeroBonusStep { id: id.clone() });
            }
            if !seen.insert(id) {
                return Err(RuleConfigError::DuplicateBonus(id.clone()));
            }
        }
        if let Some(alt) = &self.alternating {
            if alt.first_threshold == 0 || alt.interval == 0 {
                return Err(RuleConfigError::ZeroBonusStep {
                    id: alt.initial.clone(),
                });
            }
            if alt.cycle.is_empty() {
                return Err(RuleConfigError::EmptyRewardCycle);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatingStatus {
    pub id: String,
    pub interval: u32,
    pub unlocked: u32,
    pub next_at: u32,
}

impl RepeatingStatus {
    /// Whether more rewards are unlocked than the caller has recorded.
    #[must_use]
    pub const fn is_new(&self, recorded: u32) -> bool {
        self.unlocked > recorded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeStatus {
    pub id: String,
    pub threshold: u32,
    pub unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternatingStatus {
    /// Total rewards granted so far, initial one included.
    pub granted: u32,
    pub counts: BTreeMap<String, u32>,
    pub next_reward: String,
    pub next_at: u32,
}

/// A bonus that became available between two evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusUnlock {
    pub id: String,
    pub count: u32,
}

/// Read-only projection of every bonus for a draw total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BonusReport {
    pub total_draws: u32,
    pub repeating: Vec<RepeatingStatus>,
    pub one_time: Vec<OneTimeStatus>,
    pub alternating: Option<AlternatingStatus>,
    pub free_batches_unlocked: u32,
}

impl BonusReport {
    /// Unlocked counts of each repeating bonus keyed by id.
    #[must_use]
    pub fn repeating_counts(&self) -> BTreeMap<String, u32> {
        self.repeating
            .iter()
            .map(|status| (status.id.clone(), status.unlocked))
            .collect()
    }

    /// Ids of unlocked one-time bonuses.
    #[must_use]
    pub fn unlocked_one_time(&self) -> BTreeSet<String> {
        self.one_time
            .iter()
            .filter(|status| status.unlocked)
            .map(|status| status.id.clone())
            .collect()
    }

    /// Bonuses unlocked in `self` that were not yet unlocked in `before`.
    #[must_use]
    pub fn unlocked_since(&self, before: &Self) -> Vec<BonusUnlock> {
        let mut unlocks = Vec::new();
        let before_repeating = before.repeating_counts();
        for status in &self.repeating {
            let prior = before_repeating.get(&status.id).copied().unwrap_or(0);
            if status.is_new(prior) {
                unlocks.push(BonusUnlock {
                    id: status.id.clone(),
                    count: status.unlocked - prior,
                });
            }
        }
        let before_one_time = before.unlocked_one_time();
        for status in self.one_time.iter().filter(|s| s.unlocked) {
            if !before_one_time.contains(&status.id) {
                unlocks.push(BonusUnlock {
                    id: status.id.clone(),
                    count: 1,
                });
            }
        }
        if let Some(alt) = &self.alternating {
            let empty = BTreeMap::new();
            let prior_counts = before.alternating.as_ref().map_or(&empty, |a| &a.counts);
            for (id, count) in &alt.counts {
                let prior = prior_counts.get(id).copied().unwrap_or(0);
                if *count > prior {
                    unlocks.push(BonusUnlock {
                        id: id.clone(),
                        count: count - prior,
                    });
                }
            }
        }
        unlocks
    }
}

/// Number of rewards a repeating interval has unlocked.
#[must_use]
pub fn repeating_unlocked(total_draws: u32, interval: u32) -> u32 {
    total_draws.checked_div(interval).unwrap_or(0)
}

/// One-time unlocks latch: once observed they stay unlocked.
#[must_use]
pub const fn one_time_unlocked(total_draws: u32, threshold: u32, latched: bool) -> bool {
    latched || total_draws >= threshold
}

/// Project the alternating reward schedule from `total_draws` alone.
#[must_use]
pub fn alternating_status(total_draws: u32, rule: &AlternatingBonus) -> AlternatingStatus {
    let granted = if total_draws < rule.first_threshold {
        0
    } else {
        1 + repeating_unlocked(total_draws - rule.first_threshold, rule.interval)
    };

    let mut counts = BTreeMap::new();
    if granted > 0 {
        *counts.entry(rule.initial.clone()).or_insert(0) += 1;
        let cycled = granted - 1;
        let len = crate::numbers::len_to_u32(rule.cycle.len());
        if len > 0 {
            for (idx, reward) in (0..len).zip(&rule.cycle) {
                let extra = u32::from(idx < cycled % len);
                let count = cycled / len + extra;
                if count > 0 {
                    *counts.entry(reward.clone()).or_insert(0) += count;
                }
            }
        }
    }

    let next_at = rule
        .first_threshold
        .saturating_add(granted.saturating_mul(rule.interval));

    AlternatingStatus {
        granted,
        counts,
        next_reward: rule.reward_at(granted).to_string(),
        next_at,
    }
}

/// Evaluate every bonus of `table` for `total_draws`.
///
/// `latched` holds one-time ids already observed as unlocked.
#[must_use]
pub fn evaluate_bonuses(
    total_draws: u32,
    table: &BonusTable,
    latched: &BTreeSet<String>,
) -> BonusReport {
    let mut free_batches_unlocked = 0u32;

    let repeating = table
        .repeating
        .iter()
        .map(|bonus| {
            let unlocked = repeating_unlocked(total_draws, bonus.interval);
            if bonus.grant == BonusGrant::FreeBatch {
                free_batches_unlocked = free_batches_unlocked.saturating_add(unlocked);
            }
            RepeatingStatus {
                id: bonus.id.clone(),
                interval: bonus.interval,
                unlocked,
                next_at: unlocked.saturating_add(1).saturating_mul(bonus.interval),
            }
        })
        .collect();

    let one_time = table
        .one_time
        .iter()
        .map(|bonus| {
            let unlocked =
                one_time_unlocked(total_draws, bonus.threshold, latched.contains(&bonus.id));
            if unlocked && bonus.grant == BonusGrant::FreeBatch {
                free_batches_unlocked = free_batches_unlocked.saturating_add(1);
            }
            OneTimeStatus {
                id: bonus.id.clone(),
                threshold: bonus.threshold,
                unlocked,
            }
        })
        .collect();

    BonusReport {
        total_draws,
        repeating,
        one_time,
        alternating: table
            .alternating
            .as_ref()
            .map(|rule| alternating_status(total_draws, rule)),
        free_batches_unlocked,
    }
}
