//! Core data model types for nclex-cat.
//!
//! Calibrated items, responses, and the small value types that sessions and
//! results are built from.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a calibrated item in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a test-taker answers an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    /// Exactly one option is selected.
    SingleSelect,
    /// Any non-empty subset of options is selected ("select all that apply").
    SelectAll,
}

impl fmt::Display for AnswerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerType::SingleSelect => write!(f, "single_select"),
            AnswerType::SelectAll => write!(f, "select_all"),
        }
    }
}

impl FromStr for AnswerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "single_select" | "single" | "multiple_choice" => Ok(AnswerType::SingleSelect),
            "select_all" | "sata" | "multiple_response" => Ok(AnswerType::SelectAll),
            other => Err(format!("unknown answer type: {other}")),
        }
    }
}

/// One selectable option of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    /// Option identifier (e.g. "A").
    pub id: String,
    /// Option text shown to the test-taker.
    pub text: String,
}

/// 3PL calibration of an item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrtParameters {
    /// Discrimination `a`.
    pub a: f64,
    /// Difficulty `b`.
    pub b: f64,
    /// Guessing (lower asymptote) `c`.
    pub c: f64,
}

/// An immutable calibrated question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Client-needs category (e.g. "Pharmacological Therapies").
    pub category: String,
    /// Question text.
    pub stem: String,
    pub params: IrtParameters,
    pub answer_type: AnswerType,
    pub options: Vec<AnswerOption>,
    /// Option ids that make up the correct answer.
    pub correct: BTreeSet<String>,
    /// Rationale shown after the item is answered.
    #[serde(default)]
    pub explanation: String,
}

impl Item {
    /// Check a submitted answer against this item and score it.
    ///
    /// Returns the reason as `Err` when the answer is malformed: empty, naming
    /// an option the item does not have, or selecting several options on a
    /// single-select item. Correctness is exact set equality.
    pub fn score(&self, answer: &[String]) -> Result<bool, String> {
        if answer.is_empty() {
            return Err("no option selected".into());
        }
        let submitted: BTreeSet<&str> = answer.iter().map(String::as_str).collect();
        if let Some(unknown) = submitted
            .iter()
            .find(|id| !self.options.iter().any(|o| o.id == **id))
        {
            return Err(format!("unknown option '{unknown}'"));
        }
        if self.answer_type == AnswerType::SingleSelect && submitted.len() != 1 {
            return Err(format!(
                "single-select item accepts one option, got {}",
                submitted.len()
            ));
        }
        let correct: BTreeSet<&str> = self.correct.iter().map(String::as_str).collect();
        Ok(submitted == correct)
    }

    /// The item as shown to a test-taker, without the answer key.
    pub fn present(&self) -> PresentedItem {
        PresentedItem {
            id: self.id,
            category: self.category.clone(),
            stem: self.stem.clone(),
            answer_type: self.answer_type,
            options: self.options.clone(),
        }
    }
}

/// The client-facing view of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentedItem {
    pub id: ItemId,
    pub category: String,
    pub stem: String,
    pub answer_type: AnswerType,
    pub options: Vec<AnswerOption>,
}

/// One scored answer. Appended once per submission, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub item_id: ItemId,
    pub category: String,
    /// Option ids as submitted.
    pub answer: Vec<String>,
    pub correct: bool,
    /// Time spent on the item in seconds.
    pub time_spent_secs: u64,
    /// Ability estimate before this response was scored.
    pub theta_before: f64,
}

/// Correct/total counts for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTally {
    pub correct: u32,
    pub total: u32,
}

impl CategoryTally {
    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    /// Share of correct answers, 0.0 when nothing was answered.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Why a session completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// The confidence interval cleared the passing threshold.
    ConfidenceResolved,
    /// The item cap was reached, or the test was ended early by the user.
    MaxItemsReached,
    /// No eligible item was left to administer.
    BankExhausted,
    /// The ability estimate became non-finite.
    EstimationFailed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::ConfidenceResolved => write!(f, "confidence-resolved"),
            TerminationReason::MaxItemsReached => write!(f, "max-items-reached"),
            TerminationReason::BankExhausted => write!(f, "bank-exhausted"),
            TerminationReason::EstimationFailed => write!(f, "estimation-failed"),
        }
    }
}

/// Pass/fail decision of a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Undetermined,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::Undetermined => write!(f, "undetermined"),
        }
    }
}

/// A confidence interval on the ability scale with the matching passing
/// probability bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub theta_lower: f64,
    pub theta_upper: f64,
    pub probability_lower: f64,
    pub probability_upper: f64,
}

impl ConfidenceInterval {
    /// Returns `true` if the interval does not contain `threshold`.
    pub fn excludes(&self, threshold: f64) -> bool {
        self.theta_lower > threshold || self.theta_upper < threshold
    }
}
