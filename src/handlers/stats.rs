// src/handlers/stats.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    config::LEADERBOARD_SIZE,
    error::AppError,
    models::{
        stats::{StatsFilter, TestStats},
        submission::LeaderboardEntry,
        test::Test,
    },
};

/// Aggregated completion and score figures, optionally scoped to one batch.
///
/// Derived fresh from the ledger on every request; nothing is cached. A
/// scope with no submissions reports an average of 0, never NaN.
pub async fn get_stats(
    State(pool): State<SqlitePool>,
    Query(filter): Query<StatsFilter>,
) -> Result<impl IntoResponse, AppError> {
    let mut tests_query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tests");
    if let Some(batch_id) = filter.batch_id {
        tests_query.push(" WHERE batch_id = ");
        tests_query.push_bind(batch_id);
    }

    let tests = tests_query
        .build_query_as::<Test>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch tests for stats: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let now = Utc::now();
    let total_tests = tests.len() as i64;
    let active_tests = tests.iter().filter(|t| t.is_open_at(now)).count() as i64;

    let mut completed_query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COUNT(DISTINCT s.test_id) FROM submissions s JOIN tests t ON t.id = s.test_id",
    );
    if let Some(batch_id) = filter.batch_id {
        completed_query.push(" WHERE t.batch_id = ");
        completed_query.push_bind(batch_id);
    }
    let (completed_tests,): (i64,) = completed_query
        .build_query_as()
        .fetch_one(&pool)
        .await?;

    // Percentage per submission against its own snapshot total; zero-total
    // snapshots contribute 0 rather than dividing by zero.
    let mut average_query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COALESCE(AVG(CASE WHEN s.total_marks > 0
                THEN s.obtained_marks * 100.0 / s.total_marks
                ELSE 0.0 END), 0.0)
         FROM submissions s JOIN tests t ON t.id = s.test_id",
    );
    if let Some(batch_id) = filter.batch_id {
        average_query.push(" WHERE t.batch_id = ");
        average_query.push_bind(batch_id);
    }
    let (average_score,): (f64,) = average_query
        .build_query_as()
        .fetch_one(&pool)
        .await?;

    Ok(Json(TestStats {
        total_tests,
        active_tests,
        completed_tests,
        average_score,
    }))
}

/// Retrieves the top scores for one test, best first, ties broken by the
/// earlier submission.
pub async fn leaderboard(
    State(pool): State<SqlitePool>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test_exists = sqlx::query("SELECT id FROM tests WHERE id = ?")
        .bind(test_id)
        .fetch_optional(&pool)
        .await?;
    if test_exists.is_none() {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT student_id, obtained_marks, total_marks, submitted_at
        FROM submissions
        WHERE test_id = ?
        ORDER BY obtained_marks DESC, submitted_at ASC
        LIMIT ?
        "#,
    )
    .bind(test_id)
    .bind(LEADERBOARD_SIZE)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch leaderboard: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(entries))
}
