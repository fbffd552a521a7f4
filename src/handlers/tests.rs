// src/handlers/tests.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{PublicQuestion, Question},
        test::{CreateTestRequest, Test, TestDetail, TestDetailPublic, TestFilters, UpdateTestRequest},
    },
    utils::identity::Identity,
};

/// Creates a new test.
/// Staff only. A new test always starts with zero questions and
/// `total_marks = 0`; the total is derived from the question set from then on.
pub async fn create_test(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_staff()?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let test = sqlx::query_as::<_, Test>(
        r#"
        INSERT INTO tests
        (title, description, test_type, batch_id, subject_id, duration_minutes,
         total_marks, start_date, end_date, is_active, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.test_type)
    .bind(payload.batch_id)
    .bind(payload.subject_id)
    .bind(payload.duration_minutes)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.is_active)
    .bind(identity.user_id)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create test: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(test)))
}

/// Updates a test by ID. Fields are optional; `total_marks` cannot be set
/// through this path.
/// Staff only.
pub async fn update_test(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_staff()?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.is_empty() {
        return Ok(StatusCode::OK);
    }

    let current = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Test not found".to_string()))?;

    // The effective window after the patch must still be ordered.
    let start = payload.start_date.or(current.start_date);
    let end = payload.end_date.or(current.end_date);
    if let (Some(start), Some(end)) = (start, end) {
        if end <= start {
            return Err(AppError::BadRequest(
                "end_date must be after start_date".to_string(),
            ));
        }
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tests SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    if let Some(test_type) = payload.test_type {
        separated.push("test_type = ");
        separated.push_bind_unseparated(test_type);
    }

    if let Some(batch_id) = payload.batch_id {
        separated.push("batch_id = ");
        separated.push_bind_unseparated(batch_id);
    }

    if let Some(subject_id) = payload.subject_id {
        separated.push("subject_id = ");
        separated.push_bind_unseparated(subject_id);
    }

    if let Some(duration_minutes) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration_minutes);
    }

    if let Some(start_date) = payload.start_date {
        separated.push("start_date = ");
        separated.push_bind_unseparated(start_date);
    }

    if let Some(end_date) = payload.end_date {
        separated.push("end_date = ");
        separated.push_bind_unseparated(end_date);
    }

    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update test: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a test and, in the same transaction, its questions, submissions
/// and answers.
/// Staff only. Destructive; there is no soft delete.
pub async fn delete_test(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_staff()?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let exists = sqlx::query("SELECT id FROM tests WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    sqlx::query(
        "DELETE FROM answers WHERE submission_id IN (SELECT id FROM submissions WHERE test_id = ?)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM submissions WHERE test_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM questions WHERE test_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM tests WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit()
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete test {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct GetTestQuery {
    #[serde(default, alias = "includeQuestions")]
    pub include_questions: bool,
}

/// Retrieves a single test, optionally with its question set.
/// Students receive answer-free question DTOs.
pub async fn get_test(
    State(pool): State<SqlitePool>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Query(query): Query<GetTestQuery>,
) -> Result<impl IntoResponse, AppError> {
    let test = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Test not found".to_string()))?;

    if !query.include_questions {
        return Ok(Json(test).into_response());
    }

    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE test_id = ? ORDER BY position ASC")
            .bind(id)
            .fetch_all(&pool)
            .await?;

    if identity.role.is_staff() {
        Ok(Json(TestDetail { test, questions }).into_response())
    } else {
        let questions = questions.into_iter().map(PublicQuestion::from).collect();
        Ok(Json(TestDetailPublic { test, questions }).into_response())
    }
}

/// Lists tests matching the given filters.
pub async fn list_tests(
    State(pool): State<SqlitePool>,
    Query(filters): Query<TestFilters>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tests WHERE 1 = 1");

    if let Some(batch_id) = filters.batch_id {
        builder.push(" AND batch_id = ");
        builder.push_bind(batch_id);
    }

    if let Some(subject_id) = filters.subject_id {
        builder.push(" AND subject_id = ");
        builder.push_bind(subject_id);
    }

    if let Some(test_type) = filters.test_type {
        builder.push(" AND test_type = ");
        builder.push_bind(test_type);
    }

    if let Some(is_active) = filters.is_active {
        builder.push(" AND is_active = ");
        builder.push_bind(is_active);
    }

    if let Some(search) = filters.search.as_deref().map(str::trim) {
        if !search.is_empty() {
            let pattern = format!("%{}%", search.to_lowercase());
            builder.push(" AND (LOWER(title) LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR LOWER(IFNULL(description, '')) LIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
    }

    builder.push(" ORDER BY id DESC");

    let tests = builder
        .build_query_as::<Test>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list tests: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(tests))
}
