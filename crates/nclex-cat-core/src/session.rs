//! The per-attempt session aggregate and the values returned at the engine
//! boundary.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::ItemBank;
use crate::error::{CatError, Result};
use crate::estimation::{AbilityEstimate, EstimationMethod};
use crate::model::{
    CategoryTally, ConfidenceInterval, IrtParameters, ItemId, PresentedItem, Response,
    SessionStatus, TerminationReason, Verdict,
};
use crate::probability::PassProbability;

/// One adaptive test attempt.
///
/// Mutated only by [`crate::engine::CatEngine`]; immutable once completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatSession {
    pub(crate) id: Uuid,
    pub(crate) user_id: String,
    pub(crate) status: SessionStatus,
    pub(crate) termination_reason: Option<TerminationReason>,
    pub(crate) responses: Vec<Response>,
    pub(crate) estimate: AbilityEstimate,
    pub(crate) passing: PassProbability,
    pub(crate) category_tally: BTreeMap<String, CategoryTally>,
    /// Every item presented so far, answered or not.
    pub(crate) administered: BTreeSet<ItemId>,
    pub(crate) current_item: Option<ItemId>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) result: Option<CatResult>,
}

impl CatSession {
    pub(crate) fn new(user_id: &str, estimate: AbilityEstimate, passing: PassProbability) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            status: SessionStatus::Active,
            termination_reason: None,
            responses: Vec::new(),
            estimate,
            passing,
            category_tally: BTreeMap::new(),
            administered: BTreeSet::new(),
            current_item: None,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination_reason
    }

    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    pub fn estimate(&self) -> &AbilityEstimate {
        &self.estimate
    }

    pub fn passing(&self) -> &PassProbability {
        &self.passing
    }

    pub fn category_tally(&self) -> &BTreeMap<String, CategoryTally> {
        &self.category_tally
    }

    pub fn administered(&self) -> &BTreeSet<ItemId> {
        &self.administered
    }

    pub fn current_item(&self) -> Option<ItemId> {
        self.current_item
    }

    pub fn result(&self) -> Option<&CatResult> {
        self.result.as_ref()
    }

    pub fn questions_answered(&self) -> u32 {
        self.responses.len() as u32
    }

    pub fn questions_correct(&self) -> u32 {
        self.responses.iter().filter(|r| r.correct).count() as u32
    }

    pub fn time_spent_secs(&self) -> u64 {
        self.responses.iter().map(|r| r.time_spent_secs).sum()
    }

    /// Calibrations and scores of the answered items, in order.
    pub(crate) fn scored_responses<B: ItemBank + ?Sized>(
        &self,
        bank: &B,
    ) -> Result<Vec<(IrtParameters, bool)>> {
        self.responses
            .iter()
            .map(|r| {
                bank.get(r.item_id)
                    .map(|item| (item.params, r.correct))
                    .ok_or_else(|| {
                        CatError::InvalidSessionState(format!(
                            "answered item {} is missing from the bank",
                            r.item_id
                        ))
                    })
            })
            .collect()
    }

    /// Build the final result. The verdict is pass or fail only when at least
    /// `min_items` were answered and the interval clears `threshold`.
    pub(crate) fn build_result(&self, min_items: u32, threshold: f64) -> CatResult {
        let reason = self
            .termination_reason
            .unwrap_or(TerminationReason::MaxItemsReached);
        let interval = self.passing.interval;
        let result = if reason == TerminationReason::EstimationFailed
            || self.questions_answered() < min_items
        {
            Verdict::Undetermined
        } else if interval.theta_lower > threshold {
            Verdict::Pass
        } else if interval.theta_upper < threshold {
            Verdict::Fail
        } else {
            Verdict::Undetermined
        };

        CatResult {
            session_id: self.id,
            user_id: self.user_id.clone(),
            questions_correct: self.questions_correct(),
            questions_answered: self.questions_answered(),
            time_spent_secs: self.time_spent_secs(),
            passing_probability: self.passing.probability,
            ability_estimate: self.estimate.theta,
            standard_error: self.estimate.standard_error,
            confidence_interval: interval,
            category_performance: self.category_tally.clone(),
            result,
            termination_reason: reason,
            started_at: self.started_at,
            completed_at: self.completed_at.unwrap_or_else(Utc::now),
        }
    }

    /// Check the aggregate's invariants. Used when a session is restored from
    /// outside the engine.
    pub(crate) fn check_invariants(&self) -> Result<()> {
        let fail = |msg: String| Err(CatError::InvalidSessionState(msg));

        let tallied: u32 = self.category_tally.values().map(|t| t.total).sum();
        if tallied != self.questions_answered() {
            return fail(format!(
                "category tallies sum to {tallied}, {} responses recorded",
                self.questions_answered()
            ));
        }

        let mut seen = BTreeSet::new();
        for r in &self.responses {
            if !seen.insert(r.item_id) {
                return fail(format!("item {} answered twice", r.item_id));
            }
            if !self.administered.contains(&r.item_id) {
                return fail(format!("item {} answered but never presented", r.item_id));
            }
        }

        let se = self.estimate.standard_error;
        if !self.estimate.theta.is_finite() || se.is_nan() || se <= 0.0 {
            return fail("ability estimate is not finite".into());
        }

        match self.status {
            SessionStatus::Active => {
                if self.result.is_some() || self.termination_reason.is_some() {
                    return fail("active session carries a final result".into());
                }
                if self.responses.is_empty() && self.estimate.method != EstimationMethod::Prior {
                    return fail("estimate without responses".into());
                }
                match self.current_item {
                    Some(id) if self.administered.contains(&id) => {}
                    _ => return fail("active session has no presented question".into()),
                }
            }
            SessionStatus::Completed => {
                if self.result.is_none() || self.termination_reason.is_none() {
                    return fail("completed session is missing its result".into());
                }
                if self.current_item.is_some() {
                    return fail("completed session still presents a question".into());
                }
            }
        }
        Ok(())
    }
}

/// Returned by `start_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub current_question: PresentedItem,
}

/// Returned by `get_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub questions_answered: u32,
    pub current_ability: f64,
    pub standard_error: f64,
    pub passing_probability: f64,
    pub current_question: Option<PresentedItem>,
}

/// Returned by `submit_answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub should_stop: bool,
    pub updated_ability: f64,
    pub updated_standard_error: f64,
    pub updated_passing_probability: f64,
    /// Rationale of the item just answered.
    pub explanation: String,
    /// The next question, absent once the session has stopped.
    pub next_question: Option<PresentedItem>,
    pub termination_reason: Option<TerminationReason>,
}

/// Final outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatResult {
    pub session_id: Uuid,
    pub user_id: String,
    pub questions_correct: u32,
    pub questions_answered: u32,
    pub time_spent_secs: u64,
    pub passing_probability: f64,
    pub ability_estimate: f64,
    pub standard_error: f64,
    pub confidence_interval: ConfidenceInterval,
    pub category_performance: BTreeMap<String, CategoryTally>,
    pub result: Verdict,
    pub termination_reason: TerminationReason,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CatResult {
    /// Save the result as JSON to a file.
    pub fn save_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse result JSON")
    }
}
