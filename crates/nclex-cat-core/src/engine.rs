//! Session controller.
//!
//! Owns every live session and drives the per-answer pipeline: score, record,
//! re-estimate, recompute the passing probability, apply the stopping rule and
//! either finish the session or select the next item.
//!
//! Sessions are stored in an arena keyed by id. Each one sits behind its own
//! mutex, and a submission that finds the mutex held is rejected with
//! [`CatError::ConcurrentModification`] instead of waiting. The item bank is
//! shared by all sessions and only its atomic exposure counters change.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::bank::ItemBank;
use crate::config::CatConfig;
use crate::error::{CatError, Result};
use crate::estimation::AbilityEstimator;
use crate::model::{ItemId, Response, SessionStatus, TerminationReason};
use crate::probability::PassingCalculator;
use crate::selection::ItemSelector;
use crate::session::{AnswerOutcome, CatResult, CatSession, SessionSnapshot, SessionStarted};
use crate::stopping::{StopDecision, StoppingRule};

type SessionHandle = Arc<Mutex<CatSession>>;

/// The adaptive testing engine.
pub struct CatEngine<B: ItemBank> {
    bank: Arc<B>,
    config: CatConfig,
    estimator: AbilityEstimator,
    calculator: PassingCalculator,
    selector: ItemSelector,
    stopping: StoppingRule,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl<B: ItemBank> CatEngine<B> {
    /// Build an engine over `bank`. Fails if the configuration is inconsistent.
    pub fn new(bank: Arc<B>, config: CatConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let selector = ItemSelector::new(&config, bank.as_ref());
        Ok(Self {
            estimator: AbilityEstimator::new(&config),
            calculator: PassingCalculator::new(config.passing_threshold, config.confidence_z),
            stopping: StoppingRule::new(&config),
            selector,
            bank,
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn bank(&self) -> &Arc<B> {
        &self.bank
    }

    pub fn config(&self) -> &CatConfig {
        &self.config
    }

    /// Number of sessions held by the engine, active or completed.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Start a new session for `user_id` and present its first item.
    ///
    /// The first item is the most informative one at the passing standard.
    /// When the bank has nothing to offer no session is registered.
    pub fn start_session(&self, user_id: &str) -> Result<SessionStarted> {
        let estimate = self.estimator.estimate(&[])?;
        let passing = self
            .calculator
            .pass_probability(estimate.theta, estimate.standard_error)?;

        let first = self.selector.select_next(
            self.config.passing_threshold,
            &BTreeSet::new(),
            &BTreeMap::new(),
            self.bank.as_ref(),
        )?;
        self.bank.record_exposure(first.id);

        let mut session = CatSession::new(user_id, estimate, passing);
        session.administered.insert(first.id);
        session.current_item = Some(first.id);
        let session_id = session.id;

        self.sessions
            .write()
            .insert(session_id, Arc::new(Mutex::new(session)));
        tracing::info!(%session_id, user_id, first_item = %first.id, "session started");

        Ok(SessionStarted {
            session_id,
            status: SessionStatus::Active,
            current_question: first.present(),
        })
    }

    /// Current state of a session.
    pub fn get_session(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        let handle = self.handle(session_id)?;
        let session = handle.lock();
        Ok(SessionSnapshot {
            session_id,
            status: session.status,
            questions_answered: session.questions_answered(),
            current_ability: session.estimate.theta,
            standard_error: session.estimate.standard_error,
            passing_probability: session.passing.probability,
            current_question: session
                .current_item
                .and_then(|id| self.bank.get(id))
                .map(|item| item.present()),
        })
    }

    /// Score an answer to the session's current question and advance the test.
    ///
    /// Nothing is mutated when the answer is rejected. An estimation failure
    /// completes the session with an undetermined result before the error is
    /// returned.
    pub fn submit_answer(
        &self,
        session_id: Uuid,
        question_id: ItemId,
        answer: &[String],
        time_spent: Duration,
    ) -> Result<AnswerOutcome> {
        let handle = self.handle(session_id)?;
        let mut session = handle
            .try_lock()
            .ok_or(CatError::ConcurrentModification(session_id))?;

        if session.status == SessionStatus::Completed {
            return Err(CatError::SessionAlreadyCompleted(session_id));
        }
        if session.current_item != Some(question_id) {
            return Err(CatError::UnexpectedQuestion {
                expected: session.current_item,
                received: question_id,
            });
        }
        let item = self.bank.get(question_id).ok_or_else(|| {
            CatError::InvalidSessionState(format!("current item {question_id} is not in the bank"))
        })?;
        let is_correct = item
            .score(answer)
            .map_err(|reason| CatError::InvalidAnswer {
                item: question_id,
                reason,
            })?;

        let theta_before = session.estimate.theta;
        session.responses.push(Response {
            item_id: question_id,
            category: item.category.clone(),
            answer: answer.to_vec(),
            correct: is_correct,
            time_spent_secs: time_spent.as_secs(),
            theta_before,
        });
        session
            .category_tally
            .entry(item.category.clone())
            .or_default()
            .record(is_correct);
        session.current_item = None;

        let update = session
            .scored_responses(self.bank.as_ref())
            .and_then(|scored| self.estimator.estimate(&scored))
            .and_then(|estimate| {
                let passing = self
                    .calculator
                    .pass_probability(estimate.theta, estimate.standard_error)?;
                Ok((estimate, passing))
            });
        let (estimate, passing) = match update {
            Ok(update) => update,
            Err(err) => {
                tracing::error!(%session_id, error = %err, "ability update failed, ending session");
                self.finish(&mut session, TerminationReason::EstimationFailed);
                return Err(err);
            }
        };
        session.estimate = estimate;
        session.passing = passing;
        tracing::debug!(
            %session_id,
            item = %question_id,
            is_correct,
            theta = estimate.theta,
            se = estimate.standard_error,
            "response scored"
        );

        let mut reason = match self
            .stopping
            .evaluate(session.questions_answered(), &passing.interval)
        {
            StopDecision::Stop(reason) => Some(reason),
            StopDecision::Continue => None,
        };

        let mut next_question = None;
        if reason.is_none() {
            match self.selector.select_next(
                estimate.theta,
                &session.administered,
                &session.category_tally,
                self.bank.as_ref(),
            ) {
                Ok(next) => {
                    self.bank.record_exposure(next.id);
                    session.administered.insert(next.id);
                    session.current_item = Some(next.id);
                    next_question = Some(next.present());
                }
                Err(err) => {
                    tracing::warn!(%session_id, error = %err, "no item left to present");
                    reason = Some(TerminationReason::BankExhausted);
                }
            }
        }
        if let Some(reason) = reason {
            self.finish(&mut session, reason);
        }

        Ok(AnswerOutcome {
            is_correct,
            should_stop: reason.is_some(),
            updated_ability: estimate.theta,
            updated_standard_error: estimate.standard_error,
            updated_passing_probability: passing.probability,
            explanation: item.explanation.clone(),
            next_question,
            termination_reason: reason,
        })
    }

    /// End a session and return its result.
    ///
    /// Completing an active session stops it early with reason
    /// `max-items-reached`. Completing it again returns the stored result.
    pub fn complete_session(&self, session_id: Uuid) -> Result<CatResult> {
        let handle = self.handle(session_id)?;
        let mut session = handle
            .try_lock()
            .ok_or(CatError::ConcurrentModification(session_id))?;
        if session.status == SessionStatus::Active {
            self.finish(&mut session, TerminationReason::MaxItemsReached);
        }
        stored_result(&session)
    }

    /// The stored result of a completed session.
    pub fn get_result(&self, session_id: Uuid) -> Result<CatResult> {
        let handle = self.handle(session_id)?;
        let session = handle.lock();
        if session.status == SessionStatus::Active {
            return Err(CatError::SessionActive(session_id));
        }
        stored_result(&session)
    }

    /// Whether the stopping rule says the session is over. Completion by
    /// other means shows in the snapshot's `status`, not here.
    pub fn should_stop(&self, session_id: Uuid) -> Result<bool> {
        let handle = self.handle(session_id)?;
        let session = handle.lock();
        Ok(self.stopping.should_stop(&session))
    }

    /// A copy of the full session aggregate, for persistence.
    pub fn export_session(&self, session_id: Uuid) -> Result<CatSession> {
        let handle = self.handle(session_id)?;
        let session = handle.lock();
        Ok(session.clone())
    }

    /// Register a previously exported session.
    ///
    /// The aggregate is checked against its invariants and against the bank.
    /// An id that is already registered is rejected.
    pub fn restore_session(&self, session: CatSession) -> Result<Uuid> {
        session.check_invariants()?;
        session.scored_responses(self.bank.as_ref())?;
        if let Some(id) = session.current_item {
            if self.bank.get(id).is_none() {
                return Err(CatError::InvalidSessionState(format!(
                    "current item {id} is not in the bank"
                )));
            }
        }

        let session_id = session.id;
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session_id) {
            return Err(CatError::InvalidSessionState(format!(
                "session {session_id} is already registered"
            )));
        }
        sessions.insert(session_id, Arc::new(Mutex::new(session)));
        tracing::info!(%session_id, "session restored");
        Ok(session_id)
    }

    /// Drop a session from the engine, returning its final state.
    pub fn remove_session(&self, session_id: Uuid) -> Result<CatSession> {
        let handle = self
            .sessions
            .write()
            .remove(&session_id)
            .ok_or(CatError::SessionNotFound(session_id))?;
        let session = handle.lock().clone();
        Ok(session)
    }

    fn handle(&self, session_id: Uuid) -> Result<SessionHandle> {
        self.sessions
            .read()
            .get(&session_id)
            .cloned()
            .ok_or(CatError::SessionNotFound(session_id))
    }

    fn finish(&self, session: &mut CatSession, reason: TerminationReason) {
        session.status = SessionStatus::Completed;
        session.termination_reason = Some(reason);
        session.current_item = None;
        session.completed_at = Some(Utc::now());
        let result = session.build_result(self.config.min_items, self.config.passing_threshold);
        tracing::info!(
            session_id = %session.id,
            %reason,
            verdict = %result.result,
            answered = result.questions_answered,
            theta = result.ability_estimate,
            "session completed"
        );
        session.result = Some(result);
    }
}

fn stored_result(session: &CatSession) -> Result<CatResult> {
    session.result.clone().ok_or_else(|| {
        CatError::InvalidSessionState(format!("completed session {} has no result", session.id))
    })
}
