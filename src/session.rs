// src/session.rs

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::{
        question::McqOption,
        submission::AnswerInput,
        test::Test,
    },
};

/// Test-taking session lifecycle.
///
/// `NotStarted → Running → Submitting → Completed`, with the alternate
/// timeout path `Running → TimedOut → Submitting → Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Running,
    TimedOut,
    Submitting,
    Completed,
}

/// One in-progress answer, buffered in memory only. Nothing is persisted
/// until the submit transition packages the buffer for the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BufferedAnswer {
    pub selected_option: Option<McqOption>,
    pub answer_text: Option<String>,
}

/// Everything the ledger needs from a finished session.
#[derive(Debug, Clone)]
pub struct SubmitPayload {
    pub answers: Vec<AnswerInput>,
    pub time_spent_minutes: i64,
}

/// Single-writer, in-process state machine for one student taking one test.
///
/// All timing methods take `now` explicitly so the machine stays pure; the
/// HTTP layer passes wall-clock time per request.
#[derive(Debug, Clone)]
pub struct TestSession {
    pub test_id: i64,
    pub student_id: i64,
    question_ids: Vec<i64>,
    answers: HashMap<i64, BufferedAnswer>,
    started_at: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    state: SessionState,
}

impl TestSession {
    /// Entry guard: only a test that is currently "active for taking" and
    /// has at least one question may enter `Running`.
    pub fn start(
        test: &Test,
        question_ids: Vec<i64>,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<TestSession, AppError> {
        if !test.is_open_at(now) {
            return Err(AppError::TestNotTakeable(
                "Test is not open for taking".to_string(),
            ));
        }
        if question_ids.is_empty() {
            return Err(AppError::TestNotTakeable(
                "Test has no questions".to_string(),
            ));
        }

        Ok(TestSession {
            test_id: test.id,
            student_id,
            question_ids,
            answers: HashMap::new(),
            started_at: now,
            deadline: test
                .duration_minutes
                .map(|minutes| now + Duration::minutes(minutes)),
            state: SessionState::Running,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline
            .map(|deadline| (deadline - now).num_seconds().max(0))
    }

    /// Transitions `Running → TimedOut` once the deadline has passed.
    /// Returns true when the session is (now) timed out; the caller must
    /// then perform the non-cancelable auto-submit.
    pub fn check_timeout(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == SessionState::Running {
            if let Some(deadline) = self.deadline {
                if now > deadline {
                    self.state = SessionState::TimedOut;
                }
            }
        }
        self.state == SessionState::TimedOut
    }

    /// Buffers one answer edit. Later edits for the same question replace
    /// earlier ones.
    pub fn record_answer(
        &mut self,
        question_id: i64,
        answer: BufferedAnswer,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.check_timeout(now) || self.state != SessionState::Running {
            return Err(AppError::TestNotTakeable(
                "Session is no longer accepting answers".to_string(),
            ));
        }
        if !self.question_ids.contains(&question_id) {
            return Err(AppError::BadRequest(
                "Question does not belong to this test".to_string(),
            ));
        }
        self.answers.insert(question_id, answer);
        Ok(())
    }

    /// Transitions into `Submitting` and packages the buffer for the
    /// ledger. The full question set is always included; unanswered
    /// questions become null entries. Valid from `Running` (manual submit)
    /// and `TimedOut` (auto-submit).
    pub fn begin_submit(&mut self, now: DateTime<Utc>) -> Result<SubmitPayload, AppError> {
        match self.state {
            SessionState::Running | SessionState::TimedOut => {}
            _ => {
                return Err(AppError::BadRequest(
                    "Session is not in a submittable state".to_string(),
                ));
            }
        }

        // Time spent is wall-clock minutes since entry, capped at the
        // deadline for late-observed timeouts.
        let effective_end = match self.deadline {
            Some(deadline) if now > deadline => deadline,
            _ => now,
        };
        let time_spent_minutes = (effective_end - self.started_at).num_minutes().max(0);

        let answers = self
            .question_ids
            .iter()
            .map(|&question_id| {
                let buffered = self.answers.get(&question_id).cloned().unwrap_or_default();
                AnswerInput {
                    question_id,
                    selected_option: buffered.selected_option,
                    answer_text: buffered.answer_text,
                }
            })
            .collect();

        self.state = SessionState::Submitting;
        Ok(SubmitPayload {
            answers,
            time_spent_minutes,
        })
    }

    /// Terminal transition after a successful ledger write.
    pub fn complete(&mut self) {
        self.state = SessionState::Completed;
    }
}
