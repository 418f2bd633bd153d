//! Read-only projections of a pull state: rates, pity history and counter info.
use serde::{Deserialize, Serialize};

use crate::numbers::{percent, ratio};
use crate::probability::{second_tier_probability, top_tier_probability};
use crate::rules::PoolRules;
use crate::state::{PullState, Trigger};

/// Pity spent on one top-tier result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PityHistoryEntry {
    pub draw_index: u32,
    /// Draws since the previous top-tier result; the first one uses its absolute index.
    pub pity: u32,
    pub featured: bool,
    pub trigger: Trigger,
}

/// Serializable statistics snapshot for reporting and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PullStatistics {
    pub total_draws: u32,
    pub top_tier_count: u32,
    pub second_tier_count: u32,
    pub lower_tier_count: u32,
    pub featured_top_tier_count: u32,
    /// Percentages of paid draws.
    pub top_tier_rate: f64,
    pub second_tier_rate: f64,
    /// Featured share of top-tier results, in percent.
    pub featured_success_rate: f64,
    pub average_draws_per_top_tier: Option<f64>,
    /// Top-tier results decided by a real featured roll. Always zero on pools
    /// without a featured item.
    pub fifty_fifty_won: u32,
    pub fifty_fifty_lost: u32,
    pub long_horizon_triggered: u32,
    pub free_draws: u32,
    pub best_pity: Option<u32>,
    pub worst_pity: Option<u32>,
    pub pity_history: Vec<PityHistoryEntry>,
}

/// Current value, ceiling and headroom of one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterInfo {
    pub current: u32,
    pub ceiling: u32,
    pub remaining: u32,
}

impl CounterInfo {
    #[must_use]
    pub const fn new(current: u32, ceiling: u32) -> Self {
        Self {
            current,
            ceiling,
            remaining: ceiling.saturating_sub(current),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PityInfo {
    pub top_tier: CounterInfo,
    pub second_tier: CounterInfo,
    /// `None` when the pool has no long-horizon guarantee.
    pub long_horizon: Option<CounterInfo>,
    pub featured_guaranteed: bool,
    pub long_horizon_received: bool,
    /// Odds the next draw lands in each tier. A pending long-horizon
    /// guarantee pre-empts both rolls.
    pub next_top_tier_probability: f64,
    pub next_second_tier_probability: f64,
}

/// Per-top-tier pity values derived by differencing successive paid log entries.
#[must_use]
pub fn pity_history(state: &PullState) -> Vec<PityHistoryEntry> {
    let mut previous: Option<u32> = None;
    state
        .paid_records()
        .filter(|record| record.is_top_tier())
        .map(|record| {
            let pity = previous.map_or(record.draw_index, |prev| {
                record.draw_index.saturating_sub(prev)
            });
            previous = Some(record.draw_index);
            PityHistoryEntry {
                draw_index: record.draw_index,
                pity,
                featured: record.featured,
                trigger: record.trigger,
            }
        })
        .collect()
}

#[must_use]
pub fn statistics(state: &PullState, rules: &PoolRules) -> PullStatistics {
    let p = &state.progress;
    let history = pity_history(state);

    let mut stats = PullStatistics {
        total_draws: p.total_draws,
        top_tier_count: p.top_tier_count,
        second_tier_count: p.second_tier_count,
        lower_tier_count: p.lower_tier_count(),
        featured_top_tier_count: p.featured_top_tier_count,
        top_tier_rate: percent(p.top_tier_count, p.total_draws),
        second_tier_rate: percent(p.second_tier_count, p.total_draws),
        featured_success_rate: percent(p.featured_top_tier_count, p.top_tier_count),
        average_draws_per_top_tier: ratio(p.total_draws, p.top_tier_count),
        best_pity: history.iter().map(|entry| entry.pity).min(),
        worst_pity: history.iter().map(|entry| entry.pity).max(),
        ..PullStatistics::default()
    };

    let has_featured = rules.featured_win_probability > 0.0;
    for record in state.paid_records().filter(|r| r.is_top_tier()) {
        if record.trigger == Trigger::LongHorizon {
            stats.long_horizon_triggered += 1;
        } else if has_featured && !record.featured_guaranteed {
            if record.featured {
                stats.fifty_fifty_won += 1;
            } else {
                stats.fifty_fifty_lost += 1;
            }
        }
    }
    stats.free_draws = crate::numbers::len_to_u32(state.free_records().count());
    stats.pity_history = history;
    stats
}

#[must_use]
pub fn pity_info(state: &PullState, rules: &PoolRules) -> PityInfo {
    let p = &state.progress;
    let long_horizon_next = rules.hard_guarantee_ceiling.is_some_and(|ceiling| {
        !p.long_horizon_received && p.long_horizon_counter.saturating_add(1) >= ceiling
    });
    let (next_top, next_second) = if long_horizon_next {
        (1.0, 0.0)
    } else {
        (
            top_tier_probability(p.top_tier_pity.saturating_add(1), rules),
            second_tier_probability(p.second_tier_pity.saturating_add(1), rules),
        )
    };
    PityInfo {
        top_tier: CounterInfo::new(p.top_tier_pity, rules.top_tier_pity_ceiling),
        second_tier: CounterInfo::new(p.second_tier_pity, rules.second_tier_pity_ceiling),
        long_horizon: rules
            .hard_guarantee_ceiling
            .map(|ceiling| CounterInfo::new(p.long_horizon_counter, ceiling)),
        featured_guaranteed: p.featured_guaranteed,
        long_horizon_received: p.long_horizon_received,
        next_top_tier_probability: next_top,
        next_second_tier_probability: next_second,
    }
}
