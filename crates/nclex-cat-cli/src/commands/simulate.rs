//! The `nclex-cat simulate` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use nclex_cat_core::bank::{InMemoryItemBank, ItemBank};
use nclex_cat_core::config::load_config_from;
use nclex_cat_core::engine::CatEngine;
use nclex_cat_core::parser;
use nclex_cat_core::report::{BankSummary, SimulationReport};
use nclex_cat_core::simulation::{simulate_candidate, SimulatedCandidate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Semaphore;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    bank_path: Option<PathBuf>,
    synthetic: Option<usize>,
    abilities_str: String,
    replications: usize,
    parallelism: usize,
    seed: u64,
    output: PathBuf,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
    anyhow::ensure!(replications >= 1, "replications must be at least 1");
    anyhow::ensure!(
        matches!(format.as_str(), "json" | "none"),
        "unknown format '{format}', expected json or none"
    );

    let config = load_config_from(config_path.as_deref())?;

    let (bank_name, bank) = match (bank_path, synthetic) {
        (Some(path), None) => {
            let parsed = parser::parse_item_bank(&path)?;
            (parsed.name.clone(), parsed.into_bank()?)
        }
        (None, Some(n)) => {
            anyhow::ensure!(n >= 1, "synthetic bank needs at least one item");
            (format!("synthetic-{n}"), InMemoryItemBank::synthetic(n, seed))
        }
        (None, None) => anyhow::bail!("either --bank or --synthetic is required"),
        (Some(_), Some(_)) => anyhow::bail!("--bank and --synthetic are mutually exclusive"),
    };

    let abilities: Vec<f64> = abilities_str
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| anyhow::anyhow!("invalid ability value: '{}'", s.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    let engine = Arc::new(CatEngine::new(Arc::new(bank), config.clone())?);
    let total = abilities.len() * replications;
    eprintln!(
        "nclex-cat v{}: simulating {} candidates ({} abilities x {} replications) on {} items",
        env!("CARGO_PKG_VERSION"),
        total,
        abilities.len(),
        replications,
        engine.bank().len(),
    );

    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let mut futures = FuturesUnordered::new();

    for (index, theta) in abilities
        .iter()
        .flat_map(|&theta| std::iter::repeat(theta).take(replications))
        .enumerate()
    {
        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        let candidate_seed = seed.wrapping_add(index as u64);

        futures.push(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| anyhow::anyhow!("semaphore closed"))?;

            let candidate = tokio::task::spawn_blocking(move || {
                let mut rng = StdRng::seed_from_u64(candidate_seed);
                simulate_candidate(&engine, theta, &mut rng)
            })
            .await
            .context("simulation task panicked")?
            .with_context(|| format!("simulated candidate at theta {theta} failed"))?;

            Ok::<_, anyhow::Error>(candidate)
        });
    }

    let mut candidates: Vec<SimulatedCandidate> = Vec::with_capacity(total);
    let mut failed = 0usize;
    while let Some(result) = futures.next().await {
        match result {
            Ok(candidate) => {
                tracing::debug!(
                    true_theta = candidate.true_theta,
                    estimate = candidate.estimated_theta,
                    answered = candidate.questions_answered,
                    "candidate finished"
                );
                candidates.push(candidate);
            }
            Err(e) => {
                failed += 1;
                eprintln!("  ERROR: {e:#}");
            }
        }
    }
    let elapsed = start.elapsed();
    eprintln!(
        "\nComplete: {}/{} candidates finished, {} failed ({:.1}s)",
        candidates.len(),
        total,
        failed,
        elapsed.as_secs_f64()
    );

    candidates.sort_by(|a, b| a.true_theta.total_cmp(&b.true_theta));
    let report = SimulationReport::new(
        BankSummary::of(&bank_name, engine.bank().as_ref()),
        config,
        seed,
        candidates,
        elapsed.as_millis() as u64,
    );

    print_summary(&report);

    if format == "json" {
        std::fs::create_dir_all(&output)?;
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
        let path = output.join(format!("simulation-{timestamp}.json"));
        report.save_json(&path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

/// Print the per-ability table and the overall figures of a report.
pub fn print_summary(report: &SimulationReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "True θ",
        "Candidates",
        "Mean θ̂",
        "Bias",
        "RMSE",
        "Mean length",
        "Pass rate",
    ]);

    for row in &report.aggregate.per_ability {
        table.add_row(vec![
            Cell::new(format!("{:+.2}", row.true_theta)),
            Cell::new(row.candidates),
            Cell::new(format!("{:+.3}", row.mean_estimate)),
            Cell::new(format!("{:+.3}", row.bias)),
            Cell::new(format!("{:.3}", row.rmse)),
            Cell::new(format!("{:.1}", row.mean_test_length)),
            Cell::new(format!("{:.1}%", row.pass_rate * 100.0)),
        ]);
    }
    println!("{table}");

    let stats = &report.aggregate;
    println!(
        "Candidates: {}  Bias: {:+.3}  RMSE: {:.3}",
        stats.candidates, stats.bias, stats.rmse
    );
    println!(
        "Test length: mean {:.1}, min {}, max {}",
        stats.mean_test_length, stats.min_test_length, stats.max_test_length
    );
    println!(
        "Classification accuracy: {:.1}%",
        stats.classification_accuracy * 100.0
    );
    let verdicts: Vec<String> = stats
        .verdicts
        .iter()
        .map(|(verdict, n)| format!("{verdict} {n}"))
        .collect();
    println!("Verdicts: {}", verdicts.join(", "));
    let reasons: Vec<String> = stats
        .termination_reasons
        .iter()
        .map(|(reason, n)| format!("{reason} {n}"))
        .collect();
    println!("Termination: {}", reasons.join(", "));
    println!(
        "Max item exposure rate: {:.1}%  Unused items: {}/{}",
        stats.max_exposure_rate * 100.0,
        stats.unused_items,
        report.bank.item_count
    );
}
