use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::logic::scenarios::{ScenarioCtx, TestScenario};
use crate::logic::simulation::{PullPlan, PullSimulator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub pool: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

pub struct LogicTester {
    simulator: PullSimulator,
}

impl LogicTester {
    pub const fn new(simulator: PullSimulator) -> Self {
        Self { simulator }
    }

    pub fn run_scenario(
        &self,
        scenario: &TestScenario,
        plan: &PullPlan,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.simulator.verbose() {
                println!(
                    "🧪 Testing scenario: {} (pool: {} seed: {})",
                    scenario.name.bright_white(),
                    plan.pool,
                    seed
                );
            }

            results.push(self.run_single_scenario(scenario, plan, seed, iterations));
        }

        results
    }

    fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        plan: &PullPlan,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));
            let ctx = ScenarioCtx {
                simulator: &self.simulator,
                plan,
                seed: iteration_seed,
            };

            match scenario.run(&ctx) {
                Ok(()) => {
                    successes += 1;
                    let duration = start_time.elapsed();
                    performance_data.push(duration);
                    if self.simulator.verbose() {
                        println!(
                            "  ✅ Iteration {}/{} passed ({duration:?})",
                            i + 1,
                            iterations
                        );
                    }
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    if self.simulator.verbose() {
                        println!(
                            "  ❌ Iteration {}/{} failed: {}",
                            i + 1,
                            iterations,
                            message.clone().red()
                        );
                    }
                    failures.push(format!(
                        "Iteration {} (pool {}, seed {}): {}",
                        i + 1,
                        plan.pool,
                        iteration_seed,
                        message
                    ));
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.to_string(),
            pool: plan.pool.clone(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::scenarios::find_scenario;
    use crate::schedule::ScheduledRoster;
    use gacha_core::{PoolCategory, RuleBook};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn tester_with(book: RuleBook) -> LogicTester {
        let roster = ScheduledRoster::bundled(chrono::NaiveDate::from_ymd_opt(2026, 1, 10)).unwrap();
        LogicTester::new(PullSimulator::new(Arc::new(book), Arc::new(roster), false))
    }

    fn tester() -> LogicTester {
        tester_with(RuleBook::default_book())
    }

    #[test]
    fn one_result_per_seed_with_all_iterations() {
        let scenario = find_scenario("featured-carry").unwrap();
        let plan = PullPlan::new("limited", 150);
        let results = tester().run_scenario(&scenario, &plan, &[5, 6], 3);
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(result.passed, "{:?}", result.failures);
            assert_eq!(result.iterations_run, 3);
            assert_eq!(result.successful_iterations, 3);
            assert_eq!(result.performance_data.len(), 3);
        }
        assert_eq!(results[1].seed, 6);
    }

    #[test]
    fn failures_name_pool_and_iteration_seed() {
        // unknown token and no rules for the default category: nothing to fall back on
        let full = RuleBook::default_book();
        let book = RuleBook {
            default_category: PoolCategory::Limited,
            pools: BTreeMap::from([(
                PoolCategory::Weapon,
                full.get(PoolCategory::Weapon).unwrap().clone(),
            )]),
        };
        let scenario = find_scenario("smoke").unwrap();
        let plan = PullPlan::new("novice", 10);
        let results = tester_with(book).run_scenario(&scenario, &plan, &[40], 2);
        let result = &results[0];
        assert!(!result.passed);
        assert_eq!(result.failures.len(), 2);
        assert!(result.failures[1].contains("pool novice, seed 41"));
        assert_eq!(result.average_duration, Duration::ZERO);
    }

    #[test]
    fn durations_serialize_as_millis() {
        let result = ScenarioResult {
            scenario_name: "Smoke".to_string(),
            pool: "limited".to_string(),
            seed: 1,
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["average_duration"], 12);
        assert_eq!(value["performance_data"][0], 12);
        let back: ScenarioResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.average_duration, Duration::from_millis(12));
    }
}
