pub mod reports;
pub mod scenarios;
pub mod seeds;
pub mod simulation;
pub mod tester;

pub use scenarios::{ScenarioCtx, TestScenario, catalog_scenarios, find_scenario, list_scenarios};
pub use seeds::{SeedInfo, resolve_seed_inputs};
pub use simulation::{
    PullAggregate, PullPlan, PullRecord, PullSimulator, SimulationSummary, aggregate_pulls,
    run_pull_analysis,
};
pub use tester::*;
