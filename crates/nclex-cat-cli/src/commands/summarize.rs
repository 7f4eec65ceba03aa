//! The `nclex-cat summarize` command.

use std::path::PathBuf;

use anyhow::Result;
use nclex_cat_core::report::SimulationReport;

use super::simulate::print_summary;

pub fn execute(report_path: PathBuf) -> Result<()> {
    let report = SimulationReport::load_json(&report_path)?;

    println!("Report {} ({})", report.id, report.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "Bank: {} ({} items)  Seed: {}  Duration: {:.1}s",
        report.bank.name,
        report.bank.item_count,
        report.seed,
        report.duration_ms as f64 / 1000.0
    );
    println!(
        "Policy: {}-{} items, passing standard {:+.2}",
        report.config.min_items, report.config.max_items, report.config.passing_threshold
    );
    println!();

    print_summary(&report);

    Ok(())
}
