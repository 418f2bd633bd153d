use anyhow::{Context, Result, ensure};
use gacha_core::numbers::len_to_u32;
use gacha_core::{PoolRules, SeededRolls, Tier, Trigger};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::logic::simulation::{PullPlan, PullSimulator};

const REPLAY_STREAM: &[u8] = b"gacha-sim/replay";

/// Inputs handed to every scenario check.
#[derive(Clone, Copy)]
pub struct ScenarioCtx<'a> {
    pub simulator: &'a PullSimulator,
    pub plan: &'a PullPlan,
    pub seed: u64,
}

impl ScenarioCtx<'_> {
    fn rules(&self) -> Result<PoolRules> {
        let (_, rules) = self
            .simulator
            .book()
            .resolve(&self.plan.pool)
            .with_context(|| format!("resolving pool '{}'", self.plan.pool))?;
        Ok(rules.clone())
    }
}

pub type ScenarioCheck = fn(&ScenarioCtx<'_>) -> Result<()>;

/// Named invariant check run once per seed and iteration.
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    check: ScenarioCheck,
}

impl TestScenario {
    const fn new(
        key: &'static str,
        name: &'static str,
        description: &'static str,
        check: ScenarioCheck,
    ) -> Self {
        Self {
            key,
            name,
            description,
            check,
        }
    }

    pub fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()> {
        (self.check)(ctx)
    }
}

pub fn catalog_scenarios() -> Vec<TestScenario> {
    vec![
        TestScenario::new(
            "smoke",
            "Smoke",
            "Pull the plan once and audit counters against the log",
            smoke_check,
        ),
        TestScenario::new(
            "pity-ceiling",
            "Pity Ceilings",
            "No top or second tier drought reaches its ceiling",
            pity_ceiling_check,
        ),
        TestScenario::new(
            "pity-monotonicity",
            "Pity Monotonicity",
            "Top-tier pity resets on a hit and grows by one otherwise",
            pity_monotonicity_check,
        ),
        TestScenario::new(
            "featured-carry",
            "Featured Carry",
            "A lost featured roll guarantees the next top-tier result",
            featured_carry_check,
        ),
        TestScenario::new(
            "long-horizon",
            "Long Horizon Guarantee",
            "Featured drought never passes the long-horizon ceiling",
            long_horizon_check,
        ),
        TestScenario::new(
            "free-batch-isolation",
            "Free Batch Isolation",
            "Free batches leave pity and tallies untouched",
            free_batch_isolation_check,
        ),
        TestScenario::new(
            "state-roundtrip",
            "State Round Trip",
            "Export then import mid-session replays identically",
            state_roundtrip_check,
        ),
        TestScenario::new(
            "bonus-agreement",
            "Bonus Agreement",
            "Gift memos match the draw total after every pull",
            bonus_agreement_check,
        ),
    ]
}

pub fn find_scenario(key: &str) -> Option<TestScenario> {
    catalog_scenarios()
        .into_iter()
        .find(|scenario| scenario.key == key)
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog_scenarios()
        .into_iter()
        .map(|scenario| (scenario.key, scenario.description))
        .collect()
}

fn smoke_check(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let summary = ctx.simulator.run_plan(ctx.plan, ctx.seed)?;
    let state = &summary.final_state;
    let p = state.progress;

    ensure!(
        p.total_draws == len_to_u32(ctx.plan.pulls),
        "expected {} paid draws, got {}",
        ctx.plan.pulls,
        p.total_draws
    );
    ensure!(
        p.top_tier_count + p.second_tier_count + p.lower_tier_count() == p.total_draws,
        "tier tallies do not sum to the draw total"
    );
    let issues = state.audit();
    ensure!(issues.is_empty(), "audit failed: {}", issues.join("; "));
    ensure!(
        summary.rolls_consumed
            >= u64::from(p.total_draws - summary.statistics.long_horizon_triggered),
        "consumed {} rolls for {} draws",
        summary.rolls_consumed,
        p.total_draws
    );
    Ok(())
}

fn pity_ceiling_check(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let rules = ctx.rules()?;
    let summary = ctx.simulator.run_plan(ctx.plan, ctx.seed)?;

    let mut top = 0_u32;
    let mut second = 0_u32;
    for record in summary.final_state.paid_records() {
        top += 1;
        second += 1;
        match record.tier {
            Tier::Top => {
                top = 0;
                second = 0;
            }
            Tier::Second => second = 0,
            Tier::Lower => {}
        }
        ensure!(
            top < rules.top_tier_pity_ceiling,
            "draw {} left top-tier pity at {top}",
            record.draw_index
        );
        ensure!(
            second < rules.second_tier_pity_ceiling,
            "draw {} left second-tier pity at {second}",
            record.draw_index
        );
    }
    for entry in &summary.statistics.pity_history {
        ensure!(
            entry.pity <= rules.top_tier_pity_ceiling,
            "top tier at draw {} took {} pulls",
            entry.draw_index,
            entry.pity
        );
    }
    Ok(())
}

fn pity_monotonicity_check(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let mut session = ctx.simulator.open_session(ctx.plan, ctx.seed)?;
    for _ in 0..ctx.plan.pulls {
        let before = session.state().progress.top_tier_pity;
        let report = session.pull_one();
        let after = session.state().progress.top_tier_pity;
        let hit = report.outcomes.iter().any(|r| r.is_top_tier());
        let expected = if hit { 0 } else { before + 1 };
        ensure!(
            after == expected,
            "pity went {before} -> {after} at draw {}",
            session.state().progress.total_draws
        );
    }
    Ok(())
}

fn featured_carry_check(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let rules = ctx.rules()?;
    let summary = ctx.simulator.run_plan(ctx.plan, ctx.seed)?;

    let mut carried = false;
    for record in summary
        .final_state
        .paid_records()
        .filter(|r| r.is_top_tier())
    {
        if carried {
            ensure!(
                record.featured && record.featured_guaranteed,
                "draw {} ignored a carried guarantee",
                record.draw_index
            );
        } else {
            ensure!(
                !record.featured_guaranteed || record.trigger == Trigger::LongHorizon,
                "draw {} claims a guarantee nobody carried",
                record.draw_index
            );
        }
        carried = rules.carries_guarantee && !record.featured;
    }
    ensure!(
        carried == summary.final_state.progress.featured_guaranteed,
        "carry flag disagrees with the last top-tier result"
    );
    Ok(())
}

fn long_horizon_check(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let rules = ctx.rules()?;
    let summary = ctx.simulator.run_plan(ctx.plan, ctx.seed)?;
    let fired_total = summary.statistics.long_horizon_triggered;

    let Some(limit) = rules.hard_guarantee_ceiling else {
        ensure!(
            fired_total == 0,
            "pool without a long-horizon ceiling fired it"
        );
        return Ok(());
    };

    let mut since_featured = 0_u32;
    let mut fired = 0_u32;
    for record in summary.final_state.paid_records() {
        since_featured += 1;
        if record.trigger == Trigger::LongHorizon {
            ensure!(
                since_featured == limit,
                "long horizon fired after {since_featured} draws instead of {limit}"
            );
            fired += 1;
        } else if fired == 0 {
            ensure!(
                since_featured < limit,
                "draw {} passed the long-horizon ceiling without firing",
                record.draw_index
            );
        }
        if record.is_top_tier() && record.featured {
            since_featured = 0;
        }
    }
    ensure!(fired <= 1, "long horizon fired {fired} times");
    ensure!(
        summary.final_state.progress.long_horizon_received == (fired == 1),
        "received flag disagrees with the log"
    );
    Ok(())
}

fn free_batch_isolation_check(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let mut session = ctx.simulator.open_session(ctx.plan, ctx.seed)?;
    session.pull_many((ctx.plan.pulls / 2).max(1))?;

    let before = session.state().progress;
    let log_len = session.state().draw_log.len();
    for _ in 0..3 {
        session.pull_free_batch()?;
    }

    let state = session.state();
    ensure!(
        state.progress == before,
        "free batches moved progress: {before:?} -> {:?}",
        state.progress
    );
    ensure!(
        state.draw_log.len() == log_len + 30,
        "expected 30 free records, log grew by {}",
        state.draw_log.len() - log_len
    );
    ensure!(
        state
            .free_records()
            .all(|r| r.draw_index == before.total_draws),
        "free records must carry the paid total"
    );
    Ok(())
}

fn state_roundtrip_check(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let mut picker = SmallRng::seed_from_u64(ctx.seed);
    let split = picker.gen_range(1..=ctx.plan.pulls.max(1));

    let mut original = ctx.simulator.open_session(ctx.plan, ctx.seed)?;
    original.pull_many(split)?;
    let json = original.export_json()?;

    let mut restored = ctx
        .simulator
        .open_session(ctx.plan, ctx.seed.wrapping_add(1))?;
    let report = restored.import_json(&json);
    ensure!(report.is_clean(), "import was not clean: {report:?}");
    ensure!(
        restored.state().fingerprint() == original.state().fingerprint(),
        "fingerprint changed across export/import at draw {split}"
    );

    original.replace_rolls(SeededRolls::from_user_seed(ctx.seed, REPLAY_STREAM));
    restored.replace_rolls(SeededRolls::from_user_seed(ctx.seed, REPLAY_STREAM));
    let remaining = ctx.plan.pulls.saturating_sub(split).max(10);
    for _ in 0..remaining {
        let a = original.pull_one();
        let b = restored.pull_one();
        let (x, y) = (&a.outcomes[0], &b.outcomes[0]);
        ensure!(
            (x.tier, x.featured, x.trigger) == (y.tier, y.featured, y.trigger),
            "replay diverged at draw {}",
            x.draw_index
        );
    }
    ensure!(
        original.state().progress == restored.state().progress,
        "progress diverged after replay"
    );
    Ok(())
}

fn bonus_agreement_check(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let rules = ctx.rules()?;
    let mut session = ctx.simulator.open_session(ctx.plan, ctx.seed)?;

    let mut remaining = ctx.plan.pulls;
    while remaining > 0 {
        let step = remaining.min(7);
        session.pull_many(step)?;
        remaining -= step;

        let report = session.bonus_report();
        ensure!(report == session.bonus_report(), "bonus report is not idempotent");

        let state = session.state();
        let total = state.progress.total_draws;
        ensure!(
            len_to_u32(state.paid_records().count()) == total,
            "paid log length disagrees with total draws"
        );
        for bonus in &rules.bonuses.repeating {
            let recorded = state.gifts_received.get(&bonus.id).copied().unwrap_or(0);
            ensure!(
                recorded == total / bonus.interval,
                "{} memo is {recorded} at draw {total}",
                bonus.id
            );
        }
        ensure!(
            report.repeating_counts() == state.gifts_received,
            "gift memo disagrees with projection at draw {total}"
        );
        ensure!(
            report.unlocked_one_time() == state.unlocked_one_time,
            "one-time latches disagree with projection at draw {total}"
        );
        ensure!(
            session.free_batches_available()
                == report
                    .free_batches_unlocked
                    .saturating_sub(state.free_batches_claimed),
            "free batch availability drifted at draw {total}"
        );
    }
    Ok(())
}
