// src/handlers/session.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    handlers::submissions::record_submission,
    models::{
        question::{PublicQuestion, Question},
        submission::{AnswerInput, Submission},
        test::Test,
    },
    session::{BufferedAnswer, TestSession},
    state::AppState,
    utils::identity::Identity,
};

/// Drives a timed-out or submitting session through the ledger write.
///
/// The session is removed from the registry whichever way the write goes:
/// on success the attempt is recorded; on failure (typically
/// `AlreadySubmitted` from a second device) the buffered answers are
/// discarded and the caller is redirected to the existing results. No
/// automatic retry.
async fn finalize_session(
    pool: &SqlitePool,
    sessions: &mut HashMap<(i64, i64), TestSession>,
    key: (i64, i64),
    now: DateTime<Utc>,
) -> Result<Submission, AppError> {
    let mut session = sessions
        .remove(&key)
        .ok_or_else(|| AppError::NotFound("No active test session".to_string()))?;

    let payload = session.begin_submit(now)?;
    let submission = record_submission(
        pool,
        key.0,
        key.1,
        &payload.answers,
        Some(payload.time_spent_minutes),
        now,
    )
    .await?;
    session.complete();

    Ok(submission)
}

fn session_view(session: &TestSession, now: DateTime<Utc>) -> serde_json::Value {
    json!({
        "test_id": session.test_id,
        "state": session.state(),
        "started_at": session.started_at(),
        "deadline": session.deadline(),
        "remaining_seconds": session.remaining_seconds(now),
        "answered_count": session.answered_count(),
    })
}

fn auto_submitted_view(submission: &Submission) -> serde_json::Value {
    json!({
        "state": "completed",
        "auto_submitted": true,
        "submission": submission,
    })
}

/// Checks the timer of the caller's session, if any. A short-lived borrow so
/// the auto-submit path can re-borrow the registry.
fn observe_timeout(
    sessions: &mut HashMap<(i64, i64), TestSession>,
    key: (i64, i64),
    now: DateTime<Utc>,
) -> Option<bool> {
    sessions
        .get_mut(&key)
        .map(|session| session.check_timeout(now))
}

/// Enters a test-taking session for the calling student.
///
/// Guards: the test must be "active for taking" with at least one question,
/// and no submission may exist yet. Calling again while a session is running
/// returns the running session unchanged (a page refresh must not reset the
/// timer or the answer buffer).
pub async fn start_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = identity.require_student()?;
    let now = Utc::now();

    let existing = sqlx::query("SELECT id FROM submissions WHERE test_id = ? AND student_id = ?")
        .bind(test_id)
        .bind(student_id)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::AlreadySubmitted(
            "A submission already exists for this test".to_string(),
        ));
    }

    let test = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = ?")
        .bind(test_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("Test not found".to_string()))?;

    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE test_id = ? ORDER BY position ASC")
            .bind(test_id)
            .fetch_all(&state.pool)
            .await?;

    let question_ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let public_questions: Vec<PublicQuestion> =
        questions.into_iter().map(PublicQuestion::from).collect();

    let key = (test_id, student_id);
    let mut sessions = state.sessions.lock().await;

    match observe_timeout(&mut sessions, key, now) {
        Some(true) => {
            let submission = finalize_session(&state.pool, &mut sessions, key, now).await?;
            return Ok(Json(auto_submitted_view(&submission)).into_response());
        }
        Some(false) => {
            if let Some(session) = sessions.get(&key) {
                let mut view = session_view(session, now);
                view["questions"] = serde_json::to_value(&public_questions)?;
                return Ok(Json(view).into_response());
            }
        }
        None => {}
    }

    let session = TestSession::start(&test, question_ids, student_id, now)?;
    let mut view = session_view(&session, now);
    view["questions"] = serde_json::to_value(&public_questions)?;
    sessions.insert(key, session);

    Ok(Json(view).into_response())
}

/// Buffers one answer edit in the running session. Nothing is persisted
/// until submit; abandoning the session discards the buffer.
pub async fn buffer_answer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<i64>,
    Json(payload): Json<AnswerInput>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = identity.require_student()?;
    let now = Utc::now();
    let key = (test_id, student_id);

    let mut sessions = state.sessions.lock().await;

    let timed_out = observe_timeout(&mut sessions, key, now)
        .ok_or_else(|| AppError::NotFound("No active test session".to_string()))?;

    if timed_out {
        // The timer beat this edit; the edit is lost and the buffered
        // answers are auto-submitted as-is.
        let submission = finalize_session(&state.pool, &mut sessions, key, now).await?;
        return Ok(Json(auto_submitted_view(&submission)).into_response());
    }

    let session = sessions
        .get_mut(&key)
        .ok_or_else(|| AppError::NotFound("No active test session".to_string()))?;

    session.record_answer(
        payload.question_id,
        BufferedAnswer {
            selected_option: payload.selected_option,
            answer_text: payload.answer_text,
        },
        now,
    )?;

    Ok(Json(session_view(session, now)).into_response())
}

/// Reports the session's state and remaining time. Observing an expired
/// timer here triggers the auto-submit.
pub async fn session_state(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = identity.require_student()?;
    let now = Utc::now();
    let key = (test_id, student_id);

    let mut sessions = state.sessions.lock().await;

    let timed_out = observe_timeout(&mut sessions, key, now)
        .ok_or_else(|| AppError::NotFound("No active test session".to_string()))?;

    if timed_out {
        let submission = finalize_session(&state.pool, &mut sessions, key, now).await?;
        return Ok(Json(auto_submitted_view(&submission)).into_response());
    }

    let session = sessions
        .get(&key)
        .ok_or_else(|| AppError::NotFound("No active test session".to_string()))?;

    Ok(Json(session_view(session, now)).into_response())
}

/// Student-triggered submit of the running session. Whether the timer
/// expired just before the tap or not, the attempt is submitted with
/// whatever is buffered.
pub async fn submit_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = identity.require_student()?;
    let now = Utc::now();
    let key = (test_id, student_id);

    let mut sessions = state.sessions.lock().await;

    observe_timeout(&mut sessions, key, now)
        .ok_or_else(|| AppError::NotFound("No active test session".to_string()))?;

    let submission = finalize_session(&state.pool, &mut sessions, key, now).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}
