mod logic;
mod schedule;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use gacha_core::RuleBook;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use logic::{
    LogicTester, PullAggregate, PullPlan, PullRecord, PullSimulator, SeedInfo, aggregate_pulls,
    catalog_scenarios, find_scenario, list_scenarios, resolve_seed_inputs, run_pull_analysis,
};
use schedule::{ScheduledRoster, parse_date};
use util::split_csv;

#[derive(Debug, Parser)]
#[command(name = "gacha-sim", version = "0.1.0")]
#[command(about = "Seeded pull simulator and invariant checker for gacha rule books")]
struct Args {
    /// Pool to simulate (limited, weapon, standard or any alias)
    #[arg(long, default_value = "limited")]
    pool: String,

    /// Seeds to run (comma-separated; decimal, 0x hex, or a..b ranges)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Paid draws per simulated session
    #[arg(long, default_value_t = 300)]
    pulls: usize,

    /// Runs per seed
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Pull in batches of ten instead of single draws
    #[arg(long)]
    batch: bool,

    /// Featured item override for every session
    #[arg(long)]
    featured: Option<String>,

    /// Banner schedule date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<String>,

    /// Rule book JSON file; the bundled rules are used when omitted
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Scenarios to run (comma-separated, or `all`)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the exported state of the last seed's session here
    #[arg(long)]
    state_out: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let book = load_rule_book(args.rules.as_deref())?;
    let date = args.date.as_deref().map(parse_date).transpose()?;
    let roster = ScheduledRoster::bundled(date)?;
    log::info!("banner schedule pinned to {}", roster.date());

    let simulator = PullSimulator::new(Arc::new(book), Arc::new(roster), args.verbose);
    let plan = PullPlan::new(args.pool.clone(), args.pulls)
        .with_batches(args.batch)
        .with_featured(args.featured.clone());

    let scenarios = expand_scenarios(&args.scenarios);
    let seed_infos = resolve_seed_inputs(&split_csv(&args.seeds))?;
    let seeds: Vec<u64> = seed_infos.iter().map(|s| s.seed).collect();

    let results = run_logic_scenarios(&args, &scenarios, &plan, &seeds, &simulator);

    let records = run_pull_analysis(&simulator, &plan, &seed_infos, args.iterations)?;
    let aggregates = aggregate_pulls(&records, simulator.book());

    write_reports(&args, &results, &records, &aggregates, start_time)?;

    if let Some(path) = args.state_out.as_deref() {
        write_state(&simulator, &plan, &seed_infos, path)?;
    }

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🎰 Gacha Pull Simulator".bright_cyan().bold());
    println!("{}", "=======================".cyan());
}

fn load_rule_book(path: Option<&Path>) -> Result<RuleBook> {
    let book = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            RuleBook::from_json(&json)
                .with_context(|| format!("failed to parse rule book {}", path.display()))?
        }
        None => RuleBook::default_book(),
    };
    book.validate().context("rule book failed validation")?;
    Ok(book)
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for scenario in catalog_scenarios() {
            if !scenarios.iter().any(|s| s == scenario.key) {
                scenarios.push(scenario.key.to_string());
            }
        }
    }
    scenarios
}

fn run_logic_scenarios(
    args: &Args,
    scenarios: &[String],
    plan: &PullPlan,
    seeds: &[u64],
    simulator: &PullSimulator,
) -> Vec<logic::ScenarioResult> {
    let mut results = Vec::new();
    if scenarios.is_empty() {
        return results;
    }

    println!("{}", "🧠 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let tester = LogicTester::new(simulator.clone());
    for key in scenarios {
        if let Some(scenario) = find_scenario(key) {
            results.extend(tester.run_scenario(&scenario, plan, seeds, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", key.yellow());
        }
    }
    results
}

fn write_reports(
    args: &Args,
    results: &[logic::ScenarioResult],
    records: &[PullRecord],
    aggregates: &[PullAggregate],
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results, aggregates)?,
        "markdown" => {
            if results.is_empty() && aggregates.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Gacha Pull Simulation Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results, aggregates)?;
            }
        }
        "csv" => logic::reports::generate_csv_report(&mut output_target, records)?,
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() && aggregates.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    aggregates,
                    duration,
                )?;
            }
        }
    }

    if matches!(args.report.as_str(), "console" | "markdown") {
        let duration = start_time.elapsed();
        writeln!(&mut output_target)?;
        writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    }
    output_target.flush_inner()?;
    Ok(())
}

fn write_state(
    simulator: &PullSimulator,
    plan: &PullPlan,
    seeds: &[SeedInfo],
    path: &Path,
) -> Result<()> {
    let Some(last) = seeds.last() else {
        return Ok(());
    };
    let summary = simulator.run_plan(plan, last.seed)?;
    let json = serde_json::to_string_pretty(&summary.final_state)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "💾 Exported {} state (seed {}, {} draws) to {}",
        summary.category,
        last.seed,
        summary.final_state.progress.total_draws,
        path.display()
    );
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gacha_core::PoolCategory;
    use std::time::Duration;

    fn base_args() -> Args {
        Args {
            pool: "limited".to_string(),
            seeds: "1337".to_string(),
            pulls: 120,
            iterations: 1,
            batch: false,
            featured: None,
            date: None,
            rules: None,
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            report: "json".to_string(),
            output: None,
            state_out: None,
            verbose: false,
        }
    }

    fn temp(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gacha-sim-{label}-{}", std::process::id()))
    }

    fn simulator() -> PullSimulator {
        let roster = ScheduledRoster::bundled(parse_date("2026-03-20").ok()).unwrap();
        PullSimulator::new(Arc::new(RuleBook::default_book()), Arc::new(roster), false)
    }

    fn sample_result(passed: bool) -> logic::ScenarioResult {
        logic::ScenarioResult {
            scenario_name: "Smoke".to_string(),
            pool: "limited".to_string(),
            seed: 1337,
            passed,
            iterations_run: 1,
            successful_iterations: usize::from(passed),
            failures: if passed {
                Vec::new()
            } else {
                vec!["failure".to_string()]
            },
            average_duration: Duration::from_millis(4),
            performance_data: vec![Duration::from_millis(4)],
        }
    }

    fn sample_aggregate() -> PullAggregate {
        PullAggregate {
            pool: PoolCategory::Limited,
            runs: 1,
            mean_draws_per_top_tier: 60.0,
            std_draws_per_top_tier: 0.0,
            expected_draws_per_top_tier: 62.5,
            featured_share: 0.5,
            long_horizon_rate: 0.0,
            mean_second_tier: 12.0,
            worst_pity: 70,
        }
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("smoke,all");
        assert_eq!(expanded[0], "smoke");
        assert_eq!(expanded.len(), catalog_scenarios().len());
        assert!(expanded.contains(&"state-roundtrip".to_string()));
    }

    #[test]
    fn expand_scenarios_without_all_preserves_order() {
        let expanded = expand_scenarios("long-horizon, smoke");
        assert_eq!(expanded, vec!["long-horizon".to_string(), "smoke".to_string()]);
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let path = temp("scenarios.txt");
        let args = Args {
            list_scenarios: true,
            output: Some(path.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("Available scenarios"));
        assert!(content.contains("free-batch-isolation"));
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn load_rule_book_rejects_invalid_files() {
        assert!(load_rule_book(None).is_ok());
        let path = temp("bad-rules.json");
        std::fs::write(
            &path,
            r#"{"pools":{"limited":{"base_top_tier_probability":1.5,"base_second_tier_probability":0.1,"top_tier_pity_ceiling":80}}}"#,
        )
        .unwrap();
        assert!(load_rule_book(Some(&path)).is_err());
        assert!(load_rule_book(Some(Path::new("/nonexistent/rules.json"))).is_err());
    }

    #[test]
    fn run_logic_scenarios_skips_unknown_keys() {
        let sim = simulator();
        let plan = PullPlan::new("limited", 50);
        let keys = vec!["smoke".to_string(), "nope".to_string()];
        let results = run_logic_scenarios(&base_args(), &keys, &plan, &[1, 2], &sim);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn write_reports_emits_json_for_results() {
        let path = temp("report.json");
        let args = Args {
            output: Some(path.clone()),
            ..base_args()
        };
        write_reports(
            &args,
            &[sample_result(true)],
            &[],
            &[sample_aggregate()],
            Instant::now(),
        )
        .unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["scenarios"][0]["scenario_name"], "Smoke");
        assert_eq!(value["pull_analysis"][0]["pool"], "limited");
    }

    #[test]
    fn write_reports_markdown_empty_results() {
        let path = temp("empty.md");
        let args = Args {
            report: "markdown".to_string(),
            output: Some(path.clone()),
            ..base_args()
        };
        write_reports(&args, &[], &[], &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("No scenarios executed"));
        assert!(content.contains("Total time"));
    }

    #[test]
    fn write_reports_emits_console_report_with_analysis() {
        let path = temp("console.txt");
        let args = Args {
            report: "console".to_string(),
            output: Some(path.clone()),
            ..base_args()
        };
        write_reports(
            &args,
            &[sample_result(false)],
            &[],
            &[sample_aggregate()],
            Instant::now(),
        )
        .unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("Pull Analysis"));
        assert!(content.contains("failure"));
    }

    #[test]
    fn write_state_exports_the_last_seed() {
        let sim = simulator();
        let plan = PullPlan::new("weapon", 45);
        let path = temp("state.json");
        let seeds = vec![SeedInfo::new(1, "1"), SeedInfo::new(2, "2")];
        write_state(&sim, &plan, &seeds, &path).unwrap();

        let blob: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(blob["category"], "weapon");
        assert_eq!(blob["total_draws"], 45);
        assert_eq!(
            sim.run_plan(&plan, 2).unwrap().final_state.progress,
            serde_json::from_value::<gacha_core::PullState>(blob)
                .unwrap()
                .progress
        );
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
