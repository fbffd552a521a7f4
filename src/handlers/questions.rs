// src/handlers/questions.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{Sqlite, SqlitePool, Transaction, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::question::{
        CreateQuestionRequest, PublicQuestion, Question, UpdateQuestionRequest,
        check_question_shape,
    },
    utils::identity::Identity,
};

/// Re-derives a test's `total_marks` from its current question set.
/// Must run inside the same transaction as the question mutation so the
/// invariant `total_marks == sum(questions.marks)` is never observable as
/// broken. Always a full re-sum, never an incremental delta.
async fn recompute_total_marks(
    tx: &mut Transaction<'_, Sqlite>,
    test_id: i64,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE tests
         SET total_marks = (SELECT COALESCE(SUM(marks), 0) FROM questions WHERE test_id = ?)
         WHERE id = ?",
    )
    .bind(test_id)
    .bind(test_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Fails with `TestLocked` once the test has at least one submission: graded
/// snapshots stay meaningful only while the question set is frozen.
async fn assert_not_locked(
    tx: &mut Transaction<'_, Sqlite>,
    test_id: i64,
) -> Result<(), AppError> {
    let has_submission = sqlx::query("SELECT id FROM submissions WHERE test_id = ? LIMIT 1")
        .bind(test_id)
        .fetch_optional(&mut **tx)
        .await?;

    if has_submission.is_some() {
        return Err(AppError::TestLocked(
            "Test already has submissions; its questions can no longer be changed".to_string(),
        ));
    }
    Ok(())
}

/// Adds a question to a test and recomputes the test's total marks in the
/// same transaction.
/// Staff only.
pub async fn add_question(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_staff()?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.position.is_some_and(|p| p < 1) {
        return Err(AppError::BadRequest("position must be >= 1".to_string()));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let test_exists = sqlx::query("SELECT id FROM tests WHERE id = ?")
        .bind(test_id)
        .fetch_optional(&mut *tx)
        .await?;
    if test_exists.is_none() {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    assert_not_locked(&mut tx, test_id).await?;

    let position = match payload.position {
        Some(position) => position,
        None => {
            let (max,): (i64,) =
                sqlx::query_as("SELECT COALESCE(MAX(position), 0) FROM questions WHERE test_id = ?")
                    .bind(test_id)
                    .fetch_one(&mut *tx)
                    .await?;
            max + 1
        }
    };

    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions
        (test_id, question_text, question_text_alt, question_type, options,
         correct_option, reference_answer, marks, position)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(test_id)
    .bind(&payload.question_text)
    .bind(&payload.question_text_alt)
    .bind(payload.question_type)
    .bind(payload.options.map(SqlJson))
    .bind(payload.correct_option)
    .bind(&payload.reference_answer)
    .bind(payload.marks)
    .bind(position)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::BadRequest(format!("Position {} is already in use", position))
        } else {
            tracing::error!("Failed to add question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    recompute_total_marks(&mut tx, test_id).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Updates a question by ID. The merged result must still satisfy the
/// question shape rules; a marks change recomputes the test's total in the
/// same transaction.
/// Staff only.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_staff()?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.position.is_some_and(|p| p < 1) {
        return Err(AppError::BadRequest("position must be >= 1".to_string()));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let current = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    assert_not_locked(&mut tx, current.test_id).await?;

    let question_text = payload.question_text.unwrap_or(current.question_text);
    let question_text_alt = payload.question_text_alt.or(current.question_text_alt);
    let options = payload
        .options
        .map(SqlJson)
        .or(current.options);
    let correct_option = payload.correct_option.or(current.correct_option);
    let reference_answer = payload.reference_answer.or(current.reference_answer);
    let marks = payload.marks.unwrap_or(current.marks);
    let position = payload.position.unwrap_or(current.position);

    check_question_shape(
        current.question_type,
        options.as_deref(),
        correct_option,
        marks,
    )
    .map_err(|code| AppError::BadRequest(code.to_string()))?;

    let question = sqlx::query_as::<_, Question>(
        r#"
        UPDATE questions
        SET question_text = ?, question_text_alt = ?, options = ?,
            correct_option = ?, reference_answer = ?, marks = ?, position = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&question_text)
    .bind(&question_text_alt)
    .bind(&options)
    .bind(correct_option)
    .bind(&reference_answer)
    .bind(marks)
    .bind(position)
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::BadRequest(format!("Position {} is already in use", position))
        } else {
            tracing::error!("Failed to update question {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    recompute_total_marks(&mut tx, current.test_id).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(question))
}

/// Removes a question, renumbers the survivors to a contiguous 1..N
/// sequence, and recomputes the test's total marks, all in one transaction.
/// Staff only.
pub async fn remove_question(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_staff()?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let current = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    assert_not_locked(&mut tx, current.test_id).await?;

    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    // Renumber ascending; each new position is <= the row's old one, so the
    // uniqueness constraint holds at every step.
    let remaining: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM questions WHERE test_id = ? ORDER BY position ASC")
            .bind(current.test_id)
            .fetch_all(&mut *tx)
            .await?;

    for (index, (question_id,)) in remaining.iter().enumerate() {
        sqlx::query("UPDATE questions SET position = ? WHERE id = ?")
            .bind(index as i64 + 1)
            .bind(question_id)
            .execute(&mut *tx)
            .await?;
    }

    recompute_total_marks(&mut tx, current.test_id).await?;

    tx.commit()
        .await
        .map_err(|e| {
            tracing::error!("Failed to remove question {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Lists a test's questions ordered by position.
/// Students receive answer-free DTOs.
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test_exists = sqlx::query("SELECT id FROM tests WHERE id = ?")
        .bind(test_id)
        .fetch_optional(&pool)
        .await?;
    if test_exists.is_none() {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE test_id = ? ORDER BY position ASC")
            .bind(test_id)
            .fetch_all(&pool)
            .await?;

    if identity.role.is_staff() {
        Ok(Json(questions).into_response())
    } else {
        let questions: Vec<PublicQuestion> =
            questions.into_iter().map(PublicQuestion::from).collect();
        Ok(Json(questions).into_response())
    }
}
