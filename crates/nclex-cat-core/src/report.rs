//! Simulation report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::ItemBank;
use crate::config::CatConfig;
use crate::simulation::SimulatedCandidate;
use crate::statistics::{compute_simulation_stats, SimulationStats};

/// A complete simulation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the item bank.
    pub bank: BankSummary,
    /// Engine configuration the candidates were run under.
    pub config: CatConfig,
    /// Seed of the candidates' response generator.
    pub seed: u64,
    /// Individual candidate outcomes.
    pub candidates: Vec<SimulatedCandidate>,
    /// Aggregate statistics.
    pub aggregate: SimulationStats,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of an item bank (without the items themselves).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankSummary {
    pub name: String,
    pub item_count: usize,
    pub categories: Vec<String>,
}

impl BankSummary {
    pub fn of<B: ItemBank + ?Sized>(name: &str, bank: &B) -> Self {
        Self {
            name: name.to_string(),
            item_count: bank.len(),
            categories: bank.categories(),
        }
    }
}

impl SimulationReport {
    /// Build a report, computing the aggregate from the candidates.
    pub fn new(
        bank: BankSummary,
        config: CatConfig,
        seed: u64,
        candidates: Vec<SimulatedCandidate>,
        duration_ms: u64,
    ) -> Self {
        let aggregate =
            compute_simulation_stats(&candidates, config.passing_threshold, bank.item_count);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            bank,
            config,
            seed,
            candidates,
            aggregate,
            duration_ms,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SimulationReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::InMemoryItemBank;
    use crate::model::{ItemId, TerminationReason, Verdict};

    fn make_candidate(true_theta: f64, result: Verdict) -> SimulatedCandidate {
        SimulatedCandidate {
            session_id: Uuid::new_v4(),
            true_theta,
            estimated_theta: true_theta + 0.1,
            standard_error: 0.25,
            passing_probability: 0.7,
            questions_answered: 75,
            questions_correct: 40,
            result,
            termination_reason: TerminationReason::ConfidenceResolved,
            items: (1..=75).map(ItemId).collect(),
        }
    }

    fn make_report() -> SimulationReport {
        let bank = InMemoryItemBank::synthetic(200, 0);
        SimulationReport::new(
            BankSummary::of("synthetic", &bank),
            CatConfig::default(),
            42,
            vec![
                make_candidate(1.0, Verdict::Pass),
                make_candidate(-1.0, Verdict::Fail),
            ],
            1_250,
        )
    }

    #[test]
    fn aggregate_is_computed() {
        let report = make_report();
        assert_eq!(report.bank.item_count, 200);
        assert_eq!(report.bank.categories.len(), 8);
        assert_eq!(report.aggregate.candidates, 2);
        assert_eq!(report.aggregate.unused_items, 125);
        assert!((report.aggregate.classification_accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/sim.json");

        report.save_json(&path).unwrap();
        let loaded = SimulationReport::load_json(&path).unwrap();

        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.seed, 42);
        assert_eq!(loaded.candidates.len(), 2);
        assert_eq!(loaded.config.min_items, report.config.min_items);
        assert_eq!(loaded.aggregate.verdicts, report.aggregate.verdicts);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SimulationReport::load_json(&dir.path().join("nope.json")).is_err());
    }
}
