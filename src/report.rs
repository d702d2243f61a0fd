//! Results reporting and formatting.

use crate::metrics::{BackendSummary, RunSummary};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats run summaries for output.
pub struct RunReport;

impl RunReport {
    /// Format the summary as a console table, one column per backend.
    pub fn format_table(summary: &RunSummary) -> String {
        let mut table = Table::new();
        let (a, b) = (&summary.backends[0], &summary.backends[1]);

        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                format!("Scenario: {}", summary.scenario),
                a.name.clone(),
                b.name.clone(),
            ]);

        table.add_row(vec![
            "Duration:".to_string(),
            format!("{:.1}s", summary.duration_secs),
            format!("{:.1} req/s combined", summary.requests_per_second),
        ]);
        table.add_row(vec![
            "Requests:".to_string(),
            format!("{}", a.total_requests),
            format!("{}", b.total_requests),
        ]);
        table.add_row(vec![
            "Failed:".to_string(),
            format!("{} ({:.2}%)", a.failed_requests, a.failure_rate * 100.0),
            format!("{} ({:.2}%)", b.failed_requests, b.failure_rate * 100.0),
        ]);
        table.add_row(vec![
            "Unique routes:".to_string(),
            format!("{}", a.first_accesses),
            format!("{}", b.first_accesses),
        ]);
        table.add_row(vec![
            "Est. hit rate:".to_string(),
            format!("{:.1}%", a.estimated_hit_rate * 100.0),
            format!("{:.1}%", b.estimated_hit_rate * 100.0),
        ]);

        table.add_row(vec!["".to_string(), "".to_string(), "".to_string()]);
        table.add_row(vec![
            "Latency (ms)".to_string(),
            "p50 / p95 / p99 / max".to_string(),
            "p50 / p95 / p99 / max".to_string(),
        ]);
        table.add_row(vec![
            "  overall".to_string(),
            Self::latency_row(a, |s| &s.latency),
            Self::latency_row(b, |s| &s.latency),
        ]);
        table.add_row(vec![
            "  miss-likely".to_string(),
            Self::latency_row(a, |s| &s.miss_likely.latency),
            Self::latency_row(b, |s| &s.miss_likely.latency),
        ]);
        table.add_row(vec![
            "  hit-likely".to_string(),
            Self::latency_row(a, |s| &s.hit_likely.latency),
            Self::latency_row(b, |s| &s.hit_likely.latency),
        ]);

        if !a.categories.is_empty() {
            table.add_row(vec!["".to_string(), "".to_string(), "".to_string()]);
            table.add_row(vec![
                "Category".to_string(),
                "requests / hit rate".to_string(),
                "requests / hit rate".to_string(),
            ]);
            for category in &a.categories {
                let other = b.categories.iter().find(|c| c.category == category.category);
                table.add_row(vec![
                    format!("  {}", category.category),
                    format!(
                        "{} / {:.1}%",
                        category.requests,
                        hit_rate(category.repeat_accesses, category.requests) * 100.0
                    ),
                    match other {
                        Some(c) => format!(
                            "{} / {:.1}%",
                            c.requests,
                            hit_rate(c.repeat_accesses, c.requests) * 100.0
                        ),
                        None => "-".to_string(),
                    },
                ]);
            }
        }

        table.to_string()
    }

    fn latency_row(
        backend: &BackendSummary,
        pick: impl Fn(&BackendSummary) -> &crate::metrics::LatencyStats,
    ) -> String {
        let stats = pick(backend);
        format!(
            "{:.1} / {:.1} / {:.1} / {:.1}",
            stats.p50_ms, stats.p95_ms, stats.p99_ms, stats.max_ms
        )
    }

    /// Format the summary as JSON.
    pub fn format_json(summary: &RunSummary) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(summary)?)
    }

    /// Format the summary as CSV, one row per backend.
    pub fn format_csv(summary: &RunSummary) -> String {
        summary
            .backends
            .iter()
            .map(|backend| {
                format!(
                    "{},{},{},{},{},{:.4},{:.4},{:.1},{:.1},{:.1}",
                    summary.timestamp,
                    summary.scenario,
                    backend.name,
                    backend.total_requests,
                    backend.failed_requests,
                    backend.failure_rate,
                    backend.estimated_hit_rate,
                    backend.latency.p50_ms,
                    backend.latency.p95_ms,
                    backend.latency.p99_ms
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,scenario,backend,requests,failures,failure_rate,est_hit_rate,p50_ms,p95_ms,p99_ms"
    }
}

fn hit_rate(repeats: u64, total: u64) -> f64 {
    if total > 0 {
        repeats as f64 / total as f64
    } else {
        0.0
    }
}
