use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

use super::ScenarioResult;
use super::simulation::{PullAggregate, PullRecord};

#[derive(Serialize)]
struct JsonReport<'a> {
    scenarios: &'a [ScenarioResult],
    pull_analysis: &'a [PullAggregate],
}

fn success_rate(results: &[ScenarioResult]) -> f64 {
    let passed = results.iter().filter(|r| r.passed).count();
    gacha_core::numbers::ratio(
        gacha_core::numbers::len_to_u32(passed),
        gacha_core::numbers::len_to_u32(results.len()),
    )
    .unwrap_or(0.0)
        * 100.0
}

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    aggregates: &[PullAggregate],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Scenario Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "===========================".cyan())?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    writeln!(out, "Total scenarios: {total}")?;
    writeln!(out, "Passed: {}", passed.to_string().green())?;
    writeln!(out, "Failed: {}", (total - passed).to_string().red())?;
    writeln!(out, "Success rate: {:.1}%", success_rate(results))?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(
            out,
            "{} {} [{} seed {}]",
            status,
            result.scenario_name.bold(),
            result.pool,
            result.seed
        )?;
        writeln!(
            out,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }

    if !aggregates.is_empty() {
        writeln!(out, "{}", "🎰 Pull Analysis".bright_yellow().bold())?;
        writeln!(out, "{}", "================".yellow())?;
        for agg in aggregates {
            writeln!(out, "{} ({} runs)", agg.pool.to_string().bold(), agg.runs)?;
            writeln!(
                out,
                "   Draws per top tier: {:.2} ± {:.2} (expected {:.2})",
                agg.mean_draws_per_top_tier,
                agg.std_draws_per_top_tier,
                agg.expected_draws_per_top_tier
            )?;
            writeln!(out, "   Featured share: {:.1}%", agg.featured_share * 100.0)?;
            writeln!(
                out,
                "   Long horizon reached: {:.1}% of runs",
                agg.long_horizon_rate * 100.0
            )?;
            writeln!(out, "   Mean second tier: {:.2}", agg.mean_second_tier)?;
            writeln!(out, "   Worst pity: {}", agg.worst_pity)?;
        }
    }
    Ok(())
}

pub fn generate_json_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    aggregates: &[PullAggregate],
) -> Result<()> {
    let report = JsonReport {
        scenarios: results,
        pull_analysis: aggregates,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

pub fn generate_markdown_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    aggregates: &[PullAggregate],
) -> Result<()> {
    writeln!(out, "# Gacha Pull Simulation Results\n")?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenarios**: {total}")?;
    writeln!(out, "- **Passed**: {passed}")?;
    writeln!(out, "- **Failed**: {}", total - passed)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", success_rate(results))?;

    writeln!(out, "## Detailed Results\n")?;
    for result in results {
        let status = if result.passed { "✅" } else { "❌" };
        writeln!(
            out,
            "### {} {} ({} seed {})\n",
            status, result.scenario_name, result.pool, result.seed
        )?;
        writeln!(
            out,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }

    if !aggregates.is_empty() {
        writeln!(out, "## Pull Analysis\n")?;
        writeln!(
            out,
            "| Pool | Runs | Draws/top | Std | Expected | Featured | Long horizon | Worst pity |"
        )?;
        writeln!(out, "|---|---|---|---|---|---|---|---|")?;
        for agg in aggregates {
            writeln!(
                out,
                "| {} | {} | {:.2} | {:.2} | {:.2} | {:.1}% | {:.1}% | {} |",
                agg.pool,
                agg.runs,
                agg.mean_draws_per_top_tier,
                agg.std_draws_per_top_tier,
                agg.expected_draws_per_top_tier,
                agg.featured_share * 100.0,
                agg.long_horizon_rate * 100.0,
                agg.worst_pity
            )?;
        }
    }
    Ok(())
}

pub fn generate_csv_report(out: &mut dyn Write, records: &[PullRecord]) -> Result<()> {
    writeln!(
        out,
        "pool,seed,total_draws,top_tier,featured,second_tier,long_horizon,free_draws,draws_per_top_tier,worst_pity"
    )?;
    for record in records {
        let per_top = record
            .draws_per_top_tier
            .map_or_else(String::new, |v| format!("{v:.3}"));
        let worst = record
            .worst_pity
            .map_or_else(String::new, |v| v.to_string());
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{}",
            record.pool,
            record.seed,
            record.total_draws,
            record.top_tier_count,
            record.featured_top_tier_count,
            record.second_tier_count,
            record.long_horizon_triggered,
            record.free_draws,
            per_top,
            worst
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gacha_core::PoolCategory;

    fn result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Featured Carry".to_string(),
            pool: "weapon".to_string(),
            seed: 9,
            passed,
            iterations_run: 2,
            successful_iterations: usize::from(passed) + 1,
            failures: if passed {
                Vec::new()
            } else {
                vec!["Iteration 2 (pool weapon, seed 10): boom".to_string()]
            },
            average_duration: Duration::from_millis(3),
            performance_data: vec![Duration::from_millis(3)],
        }
    }

    fn aggregate() -> PullAggregate {
        PullAggregate {
            pool: PoolCategory::Weapon,
            runs: 4,
            mean_draws_per_top_tier: 21.5,
            std_draws_per_top_tier: 3.25,
            expected_draws_per_top_tier: 22.1,
            featured_share: 0.4,
            long_horizon_rate: 0.25,
            mean_second_tier: 30.0,
            worst_pity: 40,
        }
    }

    fn render(f: impl FnOnce(&mut dyn Write) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn console_report_lists_failures_and_analysis() {
        let text = render(|out| {
            generate_console_report(
                out,
                &[result(true), result(false)],
                &[aggregate()],
                Duration::from_secs(1),
            )
        });
        assert!(text.contains("Success rate: 50.0%"));
        assert!(text.contains("boom"));
        assert!(text.contains("Pull Analysis"));
        assert!(text.contains("expected 22.10"));
    }

    #[test]
    fn json_report_nests_scenarios_and_analysis() {
        let text = render(|out| generate_json_report(out, &[result(true)], &[aggregate()]));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["scenarios"][0]["scenario_name"], "Featured Carry");
        assert_eq!(value["pull_analysis"][0]["pool"], "weapon");
    }

    #[test]
    fn markdown_report_has_analysis_table() {
        let text = render(|out| generate_markdown_report(out, &[result(false)], &[aggregate()]));
        assert!(text.starts_with("# Gacha Pull Simulation Results"));
        assert!(text.contains("| weapon | 4 | 21.50 | 3.25 | 22.10 | 40.0% | 25.0% | 40 |"));
    }

    #[test]
    fn csv_report_leaves_missing_values_blank() {
        let record = PullRecord {
            pool: PoolCategory::Standard,
            seed: 3,
            total_draws: 5,
            top_tier_count: 0,
            featured_top_tier_count: 0,
            second_tier_count: 1,
            long_horizon_triggered: 0,
            free_draws: 0,
            draws_per_top_tier: None,
            worst_pity: None,
        };
        let text = render(|out| generate_csv_report(out, &[record]));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("pool,seed,total_draws"));
        assert_eq!(lines[1], "standard,3,5,0,0,1,0,0,,");
    }
}
