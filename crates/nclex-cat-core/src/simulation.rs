//! Simulated candidates.
//!
//! A simulated candidate has a known true ability and answers each presented
//! item correctly with the 3PL probability at that ability. Running many of
//! them through the engine measures how well the test recovers θ and how
//! often it classifies correctly.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::ItemBank;
use crate::engine::CatEngine;
use crate::error::{CatError, Result};
use crate::irt;
use crate::model::{AnswerType, Item, ItemId, TerminationReason, Verdict};

/// Outcome of one simulated test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedCandidate {
    pub session_id: Uuid,
    pub true_theta: f64,
    pub estimated_theta: f64,
    pub standard_error: f64,
    pub passing_probability: f64,
    pub questions_answered: u32,
    pub questions_correct: u32,
    pub result: Verdict,
    pub termination_reason: TerminationReason,
    /// Items in the order they were administered.
    pub items: Vec<ItemId>,
}

/// Run one complete session for a candidate of ability `true_theta`.
///
/// The session is removed from the engine once its result has been read, and
/// also when the run ends in an error.
pub fn simulate_candidate<B, R>(
    engine: &CatEngine<B>,
    true_theta: f64,
    rng: &mut R,
) -> Result<SimulatedCandidate>
where
    B: ItemBank,
    R: Rng + ?Sized,
{
    let started = engine.start_session(&format!("simulated:{true_theta:.3}"))?;
    let session_id = started.session_id;
    let mut items = Vec::new();

    let outcome = answer_until_stopped(
        engine,
        session_id,
        started.current_question.id,
        true_theta,
        rng,
        &mut items,
    )
    .and_then(|()| engine.get_result(session_id));
    let removed = engine.remove_session(session_id);
    let result = outcome?;
    removed?;

    Ok(SimulatedCandidate {
        session_id,
        true_theta,
        estimated_theta: result.ability_estimate,
        standard_error: result.standard_error,
        passing_probability: result.passing_probability,
        questions_answered: result.questions_answered,
        questions_correct: result.questions_correct,
        result: result.result,
        termination_reason: result.termination_reason,
        items,
    })
}

/// Answer presented items until the session stops, recording each item id.
fn answer_until_stopped<B, R>(
    engine: &CatEngine<B>,
    session_id: Uuid,
    first: ItemId,
    true_theta: f64,
    rng: &mut R,
    items: &mut Vec<ItemId>,
) -> Result<()>
where
    B: ItemBank,
    R: Rng + ?Sized,
{
    let mut current = Some(first);
    while let Some(question_id) = current {
        items.push(question_id);
        let item = engine.bank().get(question_id).ok_or_else(|| {
            CatError::InvalidSessionState(format!(
                "presented item {question_id} is not in the bank"
            ))
        })?;

        let p = irt::probability(&item.params, true_theta);
        let answer = if rng.gen::<f64>() < p {
            item.correct.iter().cloned().collect()
        } else {
            wrong_answer(item, rng)
        };
        let time_spent = Duration::from_secs(rng.gen_range(20..=150));

        match engine.submit_answer(session_id, question_id, &answer, time_spent) {
            Ok(outcome) => current = outcome.next_question.map(|q| q.id),
            Err(err) if err.is_fatal_for_session() => {
                tracing::warn!(%session_id, true_theta, error = %err, "simulated session ended early");
                current = None;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// A well-formed answer that does not match the key.
///
/// Single-select items get one wrong option. Select-all items get the key with
/// one option toggled. Degenerate items whose every option is correct fall
/// back to the key.
fn wrong_answer<R: Rng + ?Sized>(item: &Item, rng: &mut R) -> Vec<String> {
    let key: Vec<String> = item.correct.iter().cloned().collect();
    match item.answer_type {
        AnswerType::SingleSelect => {
            let distractors: Vec<&str> = item
                .options
                .iter()
                .map(|o| o.id.as_str())
                .filter(|id| !item.correct.contains(*id))
                .collect();
            match distractors.choose(rng) {
                Some(id) => vec![id.to_string()],
                None => key,
            }
        }
        AnswerType::SelectAll => {
            let Some(toggled) = item.options.choose(rng) else {
                return key;
            };
            let mut answer = item.correct.clone();
            if !answer.remove(&toggled.id) {
                answer.insert(toggled.id.clone());
            }
            if answer.is_empty() {
                if let Some(other) = item.options.iter().find(|o| o.id != toggled.id) {
                    answer.insert(other.id.clone());
                }
            }
            if answer.is_empty() {
                key
            } else {
                answer.into_iter().collect()
            }
        }
    }
}
