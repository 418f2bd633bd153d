use anyhow::{Context, Result};
use gacha_core::{
    BATCH_SIZE, PoolCategory, PullSession, PullState, PullStatistics, RuleBook, SeededRolls,
    expected_draws_per_top_tier,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::logic::seeds::SeedInfo;
use crate::schedule::ScheduledRoster;

/// Domain tag for the paid pull stream.
pub const PULL_STREAM: &[u8] = b"gacha-sim/pull";

/// Declarative inputs shared by every simulated session.
#[derive(Debug, Clone)]
pub struct PullPlan {
    pub pool: String,
    pub pulls: usize,
    pub batch: bool,
    pub featured: Option<String>,
}

impl PullPlan {
    #[must_use]
    pub fn new(pool: impl Into<String>, pulls: usize) -> Self {
        Self {
            pool: pool.into(),
            pulls,
            batch: false,
            featured: None,
        }
    }

    #[must_use]
    pub const fn with_batches(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    #[must_use]
    pub fn with_featured(mut self, featured: Option<String>) -> Self {
        self.featured = featured;
        self
    }
}

/// Complete record of one simulated session.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub category: PoolCategory,
    pub statistics: PullStatistics,
    pub final_state: PullState,
    pub rolls_consumed: u64,
}

/// Headless runner that opens seeded sessions against a rule book.
#[derive(Clone)]
pub struct PullSimulator {
    book: Arc<RuleBook>,
    roster: Arc<ScheduledRoster>,
    verbose: bool,
}

impl PullSimulator {
    pub const fn new(book: Arc<RuleBook>, roster: Arc<ScheduledRoster>, verbose: bool) -> Self {
        Self {
            book,
            roster,
            verbose,
        }
    }

    pub fn book(&self) -> &RuleBook {
        &self.book
    }

    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    /// Open a session seeded from `seed` on the paid stream.
    pub fn open_session(&self, plan: &PullPlan, seed: u64) -> Result<PullSession<SeededRolls>> {
        let rolls = SeededRolls::from_user_seed(seed, PULL_STREAM);
        let mut session = PullSession::new(&self.book, &plan.pool, rolls)
            .with_context(|| format!("opening '{}' session", plan.pool))?
            .with_item_source(self.roster.as_ref().clone());
        session.set_featured(plan.featured.clone());
        Ok(session)
    }

    /// Pull through `plan`, claiming free batches as soon as they unlock.
    pub fn drive(&self, session: &mut PullSession<SeededRolls>, plan: &PullPlan) -> Result<()> {
        let mut remaining = plan.pulls;
        while remaining > 0 {
            let step = if plan.batch {
                remaining.min(BATCH_SIZE)
            } else {
                1
            };
            let report = session.pull_many(step)?;
            remaining -= step;
            for unlock in &report.unlocked {
                log::debug!(
                    "{} unlocked {} x{} at draw {}",
                    session.category(),
                    unlock.id,
                    unlock.count,
                    session.state().progress.total_draws
                );
            }
            while session.free_batches_available() > 0 {
                session.pull_free_batch()?;
            }
        }
        Ok(())
    }

    pub fn run_plan(&self, plan: &PullPlan, seed: u64) -> Result<SimulationSummary> {
        let mut session = self.open_session(plan, seed)?;
        self.drive(&mut session, plan)?;
        if self.verbose {
            let info = session.pity_info();
            println!(
                "   seed {seed}: {} draws, pity {}/{}, carried {}",
                session.state().progress.total_draws,
                info.top_tier.current,
                info.top_tier.ceiling,
                info.featured_guaranteed
            );
        }
        Ok(SimulationSummary {
            seed,
            category: session.category(),
            statistics: session.statistics(),
            final_state: session.export_state(),
            rolls_consumed: session.rolls().draws(),
        })
    }
}

/// Per-run pull metrics used by the analysis reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRecord {
    pub pool: PoolCategory,
    pub seed: u64,
    pub total_draws: u32,
    pub top_tier_count: u32,
    pub featured_top_tier_count: u32,
    pub second_tier_count: u32,
    pub long_horizon_triggered: u32,
    pub free_draws: u32,
    pub draws_per_top_tier: Option<f64>,
    pub worst_pity: Option<u32>,
}

impl PullRecord {
    #[must_use]
    pub fn from_summary(summary: &SimulationSummary) -> Self {
        let stats = &summary.statistics;
        Self {
            pool: summary.category,
            seed: summary.seed,
            total_draws: stats.total_draws,
            top_tier_count: stats.top_tier_count,
            featured_top_tier_count: stats.featured_top_tier_count,
            second_tier_count: stats.second_tier_count,
            long_horizon_triggered: stats.long_horizon_triggered,
            free_draws: stats.free_draws,
            draws_per_top_tier: stats.average_draws_per_top_tier,
            worst_pity: stats.worst_pity,
        }
    }
}

/// Aggregated pull analysis for one pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullAggregate {
    pub pool: PoolCategory,
    pub runs: u32,
    pub mean_draws_per_top_tier: f64,
    pub std_draws_per_top_tier: f64,
    pub expected_draws_per_top_tier: f64,
    pub featured_share: f64,
    pub long_horizon_rate: f64,
    pub mean_second_tier: f64,
    pub worst_pity: u32,
}

/// Run every seed `iterations` times and collect one record per run.
pub fn run_pull_analysis(
    simulator: &PullSimulator,
    plan: &PullPlan,
    seeds: &[SeedInfo],
    iterations: usize,
) -> Result<Vec<PullRecord>> {
    let iterations = iterations.max(1);
    let mut records = Vec::with_capacity(seeds.len() * iterations);
    for seed in seeds {
        for iteration in 0..iterations {
            let iteration_seed = seed
                .seed
                .wrapping_add(u64::try_from(iteration).unwrap_or(0));
            let summary = simulator
                .run_plan(plan, iteration_seed)
                .with_context(|| format!("pull analysis failed for seed {iteration_seed}"))?;
            records.push(PullRecord::from_summary(&summary));
        }
    }
    Ok(records)
}

pub fn aggregate_pulls(records: &[PullRecord], book: &RuleBook) -> Vec<PullAggregate> {
    let mut builders: BTreeMap<PoolCategory, AggregateBuilder> = BTreeMap::new();
    for record in records {
        builders
            .entry(record.pool)
            .or_insert_with(|| AggregateBuilder::new(record.pool))
            .ingest(record);
    }
    builders
        .into_values()
        .map(|builder| {
            let expected = book
                .get(builder.pool)
                .map_or(0.0, expected_draws_per_top_tier);
            builder.finish(expected)
        })
        .collect()
}

struct AggregateBuilder {
    pool: PoolCategory,
    runs: u32,
    draws_per_top: RunningStats,
    top_tier_sum: u32,
    featured_sum: u32,
    long_horizon_runs: u32,
    second_tier: RunningStats,
    worst_pity: u32,
}

impl AggregateBuilder {
    fn new(pool: PoolCategory) -> Self {
        Self {
            pool,
            runs: 0,
            draws_per_top: RunningStats::default(),
            top_tier_sum: 0,
            featured_sum: 0,
            long_horizon_runs: 0,
            second_tier: RunningStats::default(),
            worst_pity: 0,
        }
    }

    fn ingest(&mut self, record: &PullRecord) {
        self.runs += 1;
        if let Some(value) = record.draws_per_top_tier {
            self.draws_per_top.add(value);
        }
        self.top_tier_sum += record.top_tier_count;
        self.featured_sum += record.featured_top_tier_count;
        if record.long_horizon_triggered > 0 {
            self.long_horizon_runs += 1;
        }
        self.second_tier.add(f64::from(record.second_tier_count));
        self.worst_pity = self.worst_pity.max(record.worst_pity.unwrap_or(0));
    }

    fn finish(self, expected: f64) -> PullAggregate {
        let denom = f64::from(self.runs.max(1));
        PullAggregate {
            pool: self.pool,
            runs: self.runs,
            mean_draws_per_top_tier: self.draws_per_top.mean(),
            std_draws_per_top_tier: self.draws_per_top.std_dev(),
            expected_draws_per_top_tier: expected,
            featured_share: gacha_core::numbers::ratio(self.featured_sum, self.top_tier_sum)
                .unwrap_or(0.0),
            long_horizon_rate: f64::from(self.long_horizon_runs) / denom,
            mean_second_tier: self.second_tier.mean(),
            worst_pity: self.worst_pity,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct RunningStats {
    count: u32,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let count = f64::from(self.count);
        let delta = value - self.mean;
        self.mean += delta / count;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    const fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    fn std_dev(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / f64::from(self.count - 1)).sqrt()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator() -> PullSimulator {
        let roster = ScheduledRoster::bundled(chrono::NaiveDate::from_ymd_opt(2026, 4, 1)).unwrap();
        PullSimulator::new(Arc::new(RuleBook::default_book()), Arc::new(roster), false)
    }

    #[test]
    fn run_plan_is_deterministic_per_seed() {
        let sim = simulator();
        let plan = PullPlan::new("limited", 200).with_batches(true);
        let a = sim.run_plan(&plan, 7).unwrap();
        let b = sim.run_plan(&plan, 7).unwrap();
        assert_eq!(a.final_state.progress, b.final_state.progress);
        assert_eq!(a.statistics.total_draws, 200);
        assert!(a.rolls_consumed >= 200);
        assert!(a.final_state.free_batches_claimed >= 1);
    }

    #[test]
    fn scheduled_featured_name_lands_on_records() {
        let sim = simulator();
        let plan = PullPlan::new("limited", 400);
        let summary = sim.run_plan(&plan, 3).unwrap();
        let featured: Vec<_> = summary
            .final_state
            .paid_records()
            .filter(|r| r.is_top_tier() && r.featured)
            .collect();
        assert!(!featured.is_empty());
        assert!(featured
            .iter()
            .all(|r| r.item.as_deref() == Some("Nightglass Sable")));
    }

    #[test]
    fn aggregate_tracks_means_and_expectation() {
        let sim = simulator();
        let plan = PullPlan::new("weapon", 300);
        let seeds = vec![SeedInfo::new(1, "1"), SeedInfo::new(2, "2")];
        let records = run_pull_analysis(&sim, &plan, &seeds, 3).unwrap();
        assert_eq!(records.len(), 6);
        let aggregates = aggregate_pulls(&records, sim.book());
        assert_eq!(aggregates.len(), 1);
        let agg = &aggregates[0];
        assert_eq!(agg.pool, PoolCategory::Weapon);
        assert_eq!(agg.runs, 6);
        assert!(agg.mean_draws_per_top_tier > 0.0);
        assert!(agg.expected_draws_per_top_tier > 0.0);
        assert!(agg.worst_pity <= 40);
    }

    #[test]
    fn running_stats_matches_sample_std_dev() {
        let mut stats = RunningStats::default();
        for value in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.add(value);
        }
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        assert!((stats.std_dev() - 2.138_089_935).abs() < 1e-6);
    }
}
