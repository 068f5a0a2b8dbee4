use anyhow::Result;
use colored::Colorize;
use courier_game::ScoreRecord;
use std::io::Write;
use std::time::Duration;

use super::ScenarioResult;
use super::playability::{PlayabilityAggregate, PlayabilityRecord};

#[allow(clippy::cast_precision_loss)]
fn success_rate(results: &[ScenarioResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.iter().filter(|r| r.passed).count();
    (passed as f64 / results.len() as f64) * 100.0
}

pub fn generate_console_report<W: Write + ?Sized>(
    out: &mut W,
    results: &[ScenarioResult],
    aggregates: &[PlayabilityAggregate],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Logic Test Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "==============================".cyan())?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(out, "Total scenarios: {total_tests}")?;
    writeln!(out, "Passed: {}", passed_tests.to_string().green())?;
    writeln!(out, "Failed: {}", failed_tests.to_string().red())?;
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
            "{} {} (seed {})",
            status,
            result.scenario_name.bold(),
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

    let fastest = results.iter().min_by_key(|r| r.average_duration);
    let slowest = results.iter().max_by_key(|r| r.average_duration);
    if let (Some(fastest), Some(slowest)) = (fastest, slowest) {
        writeln!(out, "{}", "⚡ Performance Summary".bright_yellow().bold())?;
        writeln!(out, "{}", "=====================".yellow())?;
        writeln!(
            out,
            "Fastest: {} ({:?})",
            fastest.scenario_name.green(),
            fastest.average_duration
        )?;
        writeln!(
            out,
            "Slowest: {} ({:?})",
            slowest.scenario_name.yellow(),
            slowest.average_duration
        )?;
        writeln!(out)?;
    }

    generate_playability_summary(out, aggregates)
}

fn generate_playability_summary<W: Write + ?Sized>(
    out: &mut W,
    aggregates: &[PlayabilityAggregate],
) -> Result<()> {
    writeln!(out, "{}", "🚲 Playability Summary".bright_magenta().bold())?;
    writeln!(out, "{}", "======================".magenta())?;
    if aggregates.is_empty() {
        writeln!(out, "No playability runs.")?;
        return Ok(());
    }
    for aggregate in aggregates {
        writeln!(
            out,
            "{} ({} runs): income {:.0} ± {:.0}, score {:.0}, deliveries {:.1}, expired {:.1}",
            aggregate.scenario_name.bold(),
            aggregate.iterations,
            aggregate.mean_income,
            aggregate.std_income,
            aggregate.mean_score,
            aggregate.mean_deliveries,
            aggregate.mean_expired
        )?;
        writeln!(
            out,
            "   reputation mean {:.1} min {} | victory {:.0}% defeat {:.0}% | replans {:.1}",
            aggregate.mean_reputation,
            aggregate.min_reputation,
            aggregate.victory_pct * 100.0,
            aggregate.defeat_pct * 100.0,
            aggregate.mean_replans
        )?;
    }
    Ok(())
}

pub fn generate_leaderboard<W: Write + ?Sized>(out: &mut W, records: &[ScoreRecord]) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "🏆 Leaderboard".bright_green().bold())?;
    for (rank, record) in records.iter().enumerate() {
        writeln!(
            out,
            "{:>2}. {:>8.0}  income {:>7.0}  rep {:>3}  {:>5.0}s  {}",
            rank + 1,
            record.score,
            record.income,
            record.reputation,
            record.time,
            record.timestamp.format("%Y-%m-%d %H:%M:%S")
        )?;
    }
    Ok(())
}

pub fn generate_json_report<W: Write + ?Sized>(
    out: &mut W,
    results: &[ScenarioResult],
) -> Result<()> {
    let json_output = serde_json::to_string_pretty(results)?;
    writeln!(out, "{json_output}")?;
    Ok(())
}

pub fn generate_markdown_report<W: Write + ?Sized>(
    out: &mut W,
    results: &[ScenarioResult],
) -> Result<()> {
    writeln!(out, "# Courier Logic Test Results\n")?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenarios**: {total_tests}")?;
    writeln!(out, "- **Passed**: {passed_tests}")?;
    writeln!(out, "- **Failed**: {}", total_tests - passed_tests)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", success_rate(results))?;

    writeln!(out, "## Detailed Results\n")?;

    for result in results {
        let status = if result.passed { "✅" } else { "❌" };

        writeln!(out, "### {} {} (seed {})\n", status, result.scenario_name, result.seed)?;
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
    Ok(())
}

const CSV_COLUMNS: [&str; 16] = [
    "scenario",
    "difficulty",
    "seed_code",
    "seed_value",
    "outcome",
    "elapsed",
    "income",
    "score",
    "reputation",
    "min_reputation",
    "deliveries",
    "expired",
    "expired_in_transit",
    "weather_shifts",
    "decisions",
    "replans",
];

pub fn generate_csv_report<W: Write + ?Sized>(
    out: &mut W,
    records: &[PlayabilityRecord],
) -> Result<()> {
    writeln!(out, "{}", CSV_COLUMNS.join(","))?;
    for record in records {
        let m = &record.metrics;
        writeln!(
            out,
            "{},{},{},{},{},{:.1},{:.2},{:.2},{},{},{},{},{},{},{},{}",
            csv_field(&record.scenario_name),
            record.difficulty,
            csv_field(&record.seed_code),
            record.seed_value,
            m.outcome,
            m.elapsed,
            m.income,
            m.score,
            m.reputation,
            m.min_reputation,
            m.deliveries,
            m.expired,
            m.expired_in_transit,
            m.weather_shifts,
            m.decisions,
            m.replans
        )?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::playability::RunMetrics;
    use courier_game::Difficulty;

    fn result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Smoke".into(),
            seed: "1337".into(),
            passed,
            iterations_run: 2,
            successful_iterations: if passed { 2 } else { 1 },
            failures: if passed { Vec::new() } else { vec!["boom".into()] },
            average_duration: Duration::from_millis(4),
            performance_data: vec![Duration::from_millis(4)],
            scores: Vec::new(),
        }
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn console_report_lists_failures_and_playability() {
        colored::control::set_override(false);
        let aggregates = vec![PlayabilityAggregate {
            scenario_name: "Solo - hard".into(),
            difficulty: Difficulty::Hard,
            iterations: 2,
            mean_income: 640.0,
            std_income: 20.0,
            mean_score: 650.0,
            mean_deliveries: 3.5,
            mean_expired: 1.0,
            mean_reputation: 82.0,
            min_reputation: 70,
            victory_pct: 0.0,
            defeat_pct: 0.0,
            mean_replans: 6.0,
        }];
        let text = render(|out| {
            generate_console_report(
                out,
                &[result(true), result(false)],
                &aggregates,
                Duration::from_secs(1),
            )
        });
        assert!(text.contains("Success rate: 50.0%"));
        assert!(text.contains("boom"));
        assert!(text.contains("Playability Summary"));
        assert!(text.contains("Solo - hard (2 runs)"));
    }

    #[test]
    fn markdown_and_json_reports() {
        let markdown = render(|out| generate_markdown_report(out, &[result(false)]));
        assert!(markdown.starts_with("# Courier Logic Test Results"));
        assert!(markdown.contains("- **Failed**: 1"));
        let json = render(|out| generate_json_report(out, &[result(true)]));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["scenario_name"], "Smoke");
    }

    #[test]
    fn csv_rows_escape_text_fields() {
        let record = PlayabilityRecord {
            scenario_name: "Solo - easy".into(),
            difficulty: Difficulty::Easy,
            seed_code: "rainy, monday".into(),
            seed_value: 9,
            metrics: RunMetrics {
                outcome: "time_up".into(),
                elapsed: 900.0,
                income: 120.0,
                score: 120.0,
                reputation: 75,
                min_reputation: 70,
                deliveries: 1,
                expired: 2,
                expired_in_transit: 0,
                weather_shifts: 14,
                decisions: 300,
                replans: 3,
            },
        };
        let csv = render(|out| generate_csv_report(out, &[record]));
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("scenario,difficulty,seed_code"));
        assert_eq!(
            lines.next().unwrap(),
            "Solo - easy,easy,\"rainy, monday\",9,time_up,900.0,120.00,120.00,75,70,1,2,0,14,300,3"
        );
    }

    #[test]
    fn empty_results_have_zero_success_rate() {
        assert!(success_rate(&[]).abs() < f64::EPSILON);
    }
}
