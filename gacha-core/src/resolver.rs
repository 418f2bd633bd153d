//! Single-draw and batch resolution.
//!
//! Each draw consumes rolls in a fixed order: nothing when the long-horizon
//! guarantee fires, otherwise the top-tier roll followed by either the
//! featured roll (top-tier hit without a carried guarantee) or the
//! second-tier roll (top-tier miss). Replays depend on that order.
use smallvec::SmallVec;

use crate::category::PoolCategory;
use crate::error::SessionError;
use crate::probability::{resolve_featured, second_tier_probability, top_tier_probability};
use crate::rng::RollSource;
use crate::rules::PoolRules;
use crate::state::{DrawRecord, Progress, Tier, Trigger};

/// Draws per standard batch.
pub const BATCH_SIZE: usize = 10;

/// Batch results stored inline for the usual ten-draw case.
pub type BatchRecords = SmallVec<[DrawRecord; BATCH_SIZE]>;

/// Per-call context threaded into the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawContext<'a> {
    pub category: PoolCategory,
    /// Featured item for this draw, supplied by the caller.
    pub featured_id: Option<&'a str>,
    pub timestamp_ms: u64,
}

impl<'a> DrawContext<'a> {
    #[must_use]
    pub const fn new(category: PoolCategory, featured_id: Option<&'a str>, timestamp_ms: u64) -> Self {
        Self {
            category,
            featured_id,
            timestamp_ms,
        }
    }
}

/// One resolved draw and the progress it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOutcome {
    pub record: DrawRecord,
    pub next: Progress,
}

/// Ordered batch results and the progress after the last draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub records: BatchRecords,
    pub final_progress: Progress,
}

/// Resolve one draw against `progress`. Pure apart from consuming rolls.
///
/// `rules` must already have passed [`PoolRules::validate`]; sessions check them
/// once at construction.
pub fn resolve_draw<R>(
    progress: &Progress,
    rules: &PoolRules,
    ctx: &DrawContext<'_>,
    rolls: &mut R,
) -> DrawOutcome
where
    R: RollSource + ?Sized,
{
    debug_assert!(
        rules.top_tier_pity_ceiling > 0 && rules.second_tier_pity_ceiling > 0,
        "resolver requires validated rules"
    );

    let mut next = *progress;
    next.top_tier_pity = next.top_tier_pity.saturating_add(1);
    next.second_tier_pity = next.second_tier_pity.saturating_add(1);
    next.long_horizon_counter = next.long_horizon_counter.saturating_add(1);
    next.total_draws = next.total_draws.saturating_add(1);

    let mut record = DrawRecord {
        tier: Tier::Lower,
        featured: false,
        draw_index: next.total_draws,
        timestamp_ms: ctx.timestamp_ms,
        free: false,
        trigger: Trigger::Roll,
        featured_guaranteed: false,
        item: None,
    };

    if let Some(ceiling) = rules.hard_guarantee_ceiling
        && !next.long_horizon_received
        && next.long_horizon_counter >= ceiling
    {
        log::debug!(
            "{} long-horizon guarantee fired at draw {}",
            ctx.category,
            next.total_draws
        );
        next.top_tier_pity = 0;
        next.second_tier_pity = 0;
        next.long_horizon_counter = 0;
        next.featured_guaranteed = false;
        next.long_horizon_received = true;
        next.top_tier_count = next.top_tier_count.saturating_add(1);
        next.featured_top_tier_count = next.featured_top_tier_count.saturating_add(1);
        record.tier = Tier::Top;
        record.featured = true;
        record.trigger = Trigger::LongHorizon;
        record.featured_guaranteed = true;
        record.item = ctx.featured_id.map(str::to_string);
        return DrawOutcome { record, next };
    }

    let top_at_ceiling = next.top_tier_pity >= rules.top_tier_pity_ceiling;
    if rolls.roll() < top_tier_probability(next.top_tier_pity, rules) {
        let carried = next.featured_guaranteed;
        let featured = resolve_featured(carried, rules.featured_win_probability, rolls);
        next.top_tier_pity = 0;
        next.second_tier_pity = 0;
        next.top_tier_count = next.top_tier_count.saturating_add(1);
        if featured {
            next.featured_top_tier_count = next.featured_top_tier_count.saturating_add(1);
            next.long_horizon_counter = 0;
            next.featured_guaranteed = false;
            record.item = ctx.featured_id.map(str::to_string);
        } else {
            next.featured_guaranteed = rules.carries_guarantee;
        }
        record.tier = Tier::Top;
        record.featured = featured;
        record.featured_guaranteed = featured && carried;
        record.trigger = if top_at_ceiling {
            Trigger::Ceiling
        } else {
            Trigger::Roll
        };
        return DrawOutcome { record, next };
    }

    let second_at_ceiling = next.second_tier_pity >= rules.second_tier_pity_ceiling;
    if rolls.roll() < second_tier_probability(next.second_tier_pity, rules) {
        next.second_tier_pity = 0;
        next.second_tier_count = next.second_tier_count.saturating_add(1);
        record.tier = Tier::Second;
        if second_at_ceiling {
            record.trigger = Trigger::Ceiling;
        }
    }

    DrawOutcome { record, next }
}

/// Resolve `n` paid draws, threading progress between them.
///
/// # Errors
///
/// Returns `SessionError::EmptyBatch` when `n` is zero.
pub fn resolve_batch<R>(
    progress: &Progress,
    rules: &PoolRules,
    ctx: &DrawContext<'_>,
    rolls: &mut R,
    n: usize,
) -> Result<BatchOutcome, SessionError>
where
    R: RollSource + ?Sized,
{
    if n == 0 {
        return Err(SessionError::EmptyBatch);
    }
    let mut current = *progress;
    let mut records = BatchRecords::with_capacity(n);
    for _ in 0..n {
        let outcome = resolve_draw(&current, rules, ctx, rolls);
        current = outcome.next;
        records.push(outcome.record);
    }
    Ok(BatchOutcome {
        records,
        final_progress: current,
    })
}

/// Resolve `n` bonus draws that sit outside all pity accounting.
///
/// Draws start from empty counters so they neither consume nor benefit from the
/// caller's pity. Records are marked free and carry `paid_total` as their index;
/// the caller commits only these records.
///
/// # Errors
///
/// Returns `SessionError::EmptyBatch` when `n` is zero.
pub fn resolve_free_batch<R>(
    paid_total: u32,
    rules: &PoolRules,
    ctx: &DrawContext<'_>,
    rolls: &mut R,
    n: usize,
) -> Result<BatchRecords, SessionError>
where
    R: RollSource + ?Sized,
{
    let batch = resolve_batch(&Progress::default(), rules, ctx, rolls, n)?;
    Ok(batch
        .records
        .into_iter()
        .map(|mut record| {
            record.free = true;
            record.draw_index = paid_total;
            record
        })
        .collect())
}
