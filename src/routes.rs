// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, patch, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{questions, session, stats, submissions, tests},
    state::AppState,
    utils::identity::identity_middleware,
};

/// Assembles the main application router.
///
/// * All engine routes live under `/api` behind the identity middleware;
///   role checks (staff authoring/grading, student taking) are enforced per
///   handler.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, session registry).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let api_routes = Router::new()
        .route("/tests", get(tests::list_tests).post(tests::create_test))
        .route("/tests/stats", get(stats::get_stats))
        .route(
            "/tests/{id}",
            get(tests::get_test)
                .patch(tests::update_test)
                .delete(tests::delete_test),
        )
        .route(
            "/tests/{id}/questions",
            get(questions::list_questions).post(questions::add_question),
        )
        .route(
            "/questions/{id}",
            patch(questions::update_question).delete(questions::remove_question),
        )
        .route("/tests/{id}/submit", post(submissions::submit_test))
        .route("/tests/{id}/submissions", get(submissions::list_submissions))
        .route(
            "/tests/{id}/submissions/{student_id}",
            get(submissions::get_submission),
        )
        .route(
            "/submissions/{id}/answers/{question_id}",
            patch(submissions::set_answer_marks),
        )
        .route("/tests/{id}/leaderboard", get(stats::leaderboard))
        .route(
            "/tests/{id}/session",
            post(session::start_session).get(session::session_state),
        )
        .route("/tests/{id}/session/answers", put(session::buffer_answer))
        .route("/tests/{id}/session/submit", post(session::submit_session))
        .layer(middleware::from_fn(identity_middleware));

    Router::new()
        .nest("/api", api_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
