//! Terminal rendering for backfill progress and coverage.

use domain_embeddings::{BackfillProgress, EmbeddingStats, EmbeddingTable, TableCoverage};
use std::time::Duration;

const BAR_WIDTH: usize = 30;

/// `[#####---------] 42.0% 5/12 batches | 500 updated, 2 failed | 3s elapsed, ~4s left`
pub fn render_progress(progress: &BackfillProgress) -> String {
    let fraction = if progress.total_pending == 0 {
        1.0
    } else {
        (progress.processed() as f64 / progress.total_pending as f64).min(1.0)
    };

    format!(
        "{} {:5.1}% {}/{} batches | {} updated, {} failed | {} elapsed, ~{} left",
        bar(fraction),
        fraction * 100.0,
        progress.batch,
        progress.total_batches,
        progress.updated,
        progress.failed,
        format_duration(progress.elapsed),
        format_duration(progress.estimated_remaining),
    )
}

/// One line per table: `messages       2/3 (66.67%)`.
pub fn render_coverage(stats: &EmbeddingStats) -> String {
    EmbeddingTable::ALL
        .iter()
        .map(|table| coverage_line(*table, &stats.table(*table)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn coverage_line(table: EmbeddingTable, coverage: &TableCoverage) -> String {
    format!(
        "{:<14} {}/{} ({:.2}%)",
        table.to_string(),
        coverage.embedded_rows,
        coverage.total_rows,
        coverage.embedding_percentage
    )
}

fn bar(fraction: f64) -> String {
    let filled = ((fraction * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
