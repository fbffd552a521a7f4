// src/handlers/submissions.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    grading::grade_answer,
    models::{
        question::Question,
        submission::{
            Answer, AnswerInput, SetAnswerMarksRequest, SubmissionDetail, SubmitTestRequest,
            Submission,
        },
        test::Test,
    },
    utils::identity::Identity,
};

/// Writes one attempt to the submission ledger.
///
/// Grades every answer, then creates the submission row and all answer rows
/// in a single transaction, so a partially graded attempt is never
/// observable. One answer row is created per question of the test;
/// submitted answers for unknown question ids are ignored. The uniqueness
/// constraint on (test_id, student_id) is the source of truth for the
/// at-most-one-submission rule; a concurrent duplicate surfaces as
/// `AlreadySubmitted`.
pub async fn record_submission(
    pool: &SqlitePool,
    test_id: i64,
    student_id: i64,
    answers: &[AnswerInput],
    time_spent_minutes: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Submission, AppError> {
    let existing = sqlx::query("SELECT id FROM submissions WHERE test_id = ? AND student_id = ?")
        .bind(test_id)
        .bind(student_id)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::AlreadySubmitted(
            "A submission already exists for this test".to_string(),
        ));
    }

    let test = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = ?")
        .bind(test_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Test not found".to_string()))?;

    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE test_id = ? ORDER BY position ASC")
            .bind(test_id)
            .fetch_all(pool)
            .await?;

    let submitted: HashMap<i64, &AnswerInput> = answers
        .iter()
        .map(|answer| (answer.question_id, answer))
        .collect();

    let time_spent_minutes = time_spent_minutes.map(|minutes| minutes.max(0));

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let submission = sqlx::query_as::<_, Submission>(
        r#"
        INSERT INTO submissions
        (test_id, student_id, total_marks, obtained_marks, time_spent_minutes, submitted_at)
        VALUES (?, ?, ?, 0, ?, ?)
        RETURNING *
        "#,
    )
    .bind(test_id)
    .bind(student_id)
    .bind(test.total_marks)
    .bind(time_spent_minutes)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::AlreadySubmitted("A submission already exists for this test".to_string())
        } else {
            tracing::error!("Failed to insert submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    let mut obtained_marks = 0;
    for question in &questions {
        let input = submitted.get(&question.id);
        let selected = input.and_then(|a| a.selected_option);
        let answer_text = input.and_then(|a| a.answer_text.clone());

        let graded = grade_answer(question, selected);
        obtained_marks += graded.marks_obtained;

        sqlx::query(
            r#"
            INSERT INTO answers
            (submission_id, question_id, answer_text, selected_option, is_correct, marks_obtained)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(submission.id)
        .bind(question.id)
        .bind(answer_text)
        .bind(selected)
        .bind(graded.is_correct)
        .bind(graded.marks_obtained)
        .execute(&mut *tx)
        .await?;
    }

    let submission = sqlx::query_as::<_, Submission>(
        "UPDATE submissions SET obtained_marks = ? WHERE id = ? RETURNING *",
    )
    .bind(obtained_marks)
    .bind(submission.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit()
        .await
        .map_err(|e| {
            tracing::error!("Failed to commit submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(submission)
}

/// Submits a student's attempt at a test.
///
/// The window is deliberately not re-checked here: a timer-driven
/// auto-submit may legitimately arrive just after the test closes.
pub async fn submit_test(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<i64>,
    Json(payload): Json<SubmitTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = identity.require_student()?;

    let submission = record_submission(
        &pool,
        test_id,
        student_id,
        &payload.answers,
        payload.time_spent_minutes,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(submission)))
}

/// Retrieves one student's submission for a test, with its answers.
/// Students may only read their own.
pub async fn get_submission(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path((test_id, student_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    if !identity.role.is_staff() && identity.user_id != student_id {
        return Err(AppError::Forbidden(
            "Students may only view their own submission".to_string(),
        ));
    }

    let submission = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE test_id = ? AND student_id = ?",
    )
    .bind(test_id)
    .bind(student_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    let answers = sqlx::query_as::<_, Answer>(
        r#"
        SELECT a.* FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.submission_id = ?
        ORDER BY q.position ASC
        "#,
    )
    .bind(submission.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(SubmissionDetail { submission, answers }))
}

/// Lists all submissions for a test, earliest first.
/// Staff only.
pub async fn list_submissions(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_staff()?;

    let test_exists = sqlx::query("SELECT id FROM tests WHERE id = ?")
        .bind(test_id)
        .fetch_optional(&pool)
        .await?;
    if test_exists.is_none() {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    let submissions = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE test_id = ? ORDER BY submitted_at ASC, id ASC",
    )
    .bind(test_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(submissions))
}

/// Manually corrects the marks of one answer (short-answer grading), then
/// recomputes the submission's obtained total as a fresh sum over all of its
/// answers inside the same transaction. Idempotent; this is the only path
/// that changes `obtained_marks` after submission.
/// Staff only.
pub async fn set_answer_marks(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path((submission_id, question_id)): Path<(i64, i64)>,
    Json(payload): Json<SetAnswerMarksRequest>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_staff()?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT q.marks FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.submission_id = ? AND a.question_id = ?
        "#,
    )
    .bind(submission_id)
    .bind(question_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (question_marks,) = row.ok_or(AppError::NotFound("Answer not found".to_string()))?;

    if payload.marks_obtained < 0 || payload.marks_obtained > question_marks {
        return Err(AppError::InvalidMarks(format!(
            "marks_obtained must be between 0 and {}",
            question_marks
        )));
    }

    sqlx::query(
        "UPDATE answers SET marks_obtained = ?, is_correct = ?
         WHERE submission_id = ? AND question_id = ?",
    )
    .bind(payload.marks_obtained)
    .bind(payload.marks_obtained > 0)
    .bind(submission_id)
    .bind(question_id)
    .execute(&mut *tx)
    .await?;

    let submission = sqlx::query_as::<_, Submission>(
        r#"
        UPDATE submissions
        SET obtained_marks = (SELECT COALESCE(SUM(marks_obtained), 0) FROM answers WHERE submission_id = ?)
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(submission_id)
    .bind(submission_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit()
        .await
        .map_err(|e| {
            tracing::error!("Failed to apply mark correction: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(submission))
}
