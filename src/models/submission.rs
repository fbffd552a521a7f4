// src/models/submission.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::models::question::McqOption;

/// Represents the 'submissions' table in the database.
///
/// At most one row exists per (test_id, student_id); the database uniqueness
/// constraint is the source of truth for that rule. `total_marks` is a
/// snapshot of the test's total at submission time. `obtained_marks` is a
/// derived sum over the submission's answers and is only ever written by the
/// submit and mark-correction transactions.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub test_id: i64,
    pub student_id: i64,
    pub total_marks: i64,
    pub obtained_marks: i64,
    pub time_spent_minutes: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

/// Represents the 'answers' table: one row per question per submission.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub submission_id: i64,
    pub question_id: i64,

    /// Free-text response for short-answer questions.
    pub answer_text: Option<String>,

    /// Selected option for MCQ questions; null when left unanswered.
    pub selected_option: Option<McqOption>,

    /// Null while a short answer awaits manual grading.
    pub is_correct: Option<bool>,

    pub marks_obtained: i64,
}

/// One answer as sent by the client at submit time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerInput {
    pub question_id: i64,
    pub selected_option: Option<McqOption>,
    pub answer_text: Option<String>,
}

/// DTO for submitting a test attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitTestRequest {
    pub answers: Vec<AnswerInput>,
    pub time_spent_minutes: Option<i64>,
}

/// Submission together with its answers (results view).
#[derive(Debug, Serialize)]
pub struct SubmissionDetail {
    #[serde(flatten)]
    pub submission: Submission,
    pub answers: Vec<Answer>,
}

/// DTO for manual mark correction of a single answer.
#[derive(Debug, Deserialize)]
pub struct SetAnswerMarksRequest {
    pub marks_obtained: i64,
}

/// One leaderboard row for a test, ordered by marks then earliest submission.
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub student_id: i64,
    pub obtained_marks: i64,
    pub total_marks: i64,
    pub submitted_at: DateTime<Utc>,
}
