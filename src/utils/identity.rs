// src/utils/identity.rs

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;

/// Header carrying the resolved user id, set by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the resolved role, set by the upstream gateway.
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Teachers and admins may author tests and grade answers.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// Resolved caller identity, trusted as-is.
///
/// Authentication lives in the upstream gateway; this service only consumes
/// its result and never re-authenticates.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Requires a teacher or admin role".to_string(),
            ))
        }
    }

    pub fn require_student(&self) -> Result<i64, AppError> {
        if self.role == Role::Student {
            Ok(self.user_id)
        } else {
            Err(AppError::Forbidden("Requires a student role".to_string()))
        }
    }
}

/// Axum Middleware: Identity resolution.
///
/// Intercepts requests, parses the gateway-provided identity headers.
/// If valid, injects `Identity` into the request extensions for handlers to use.
/// If missing or malformed, returns 401 Unauthorized.
pub async fn identity_middleware(
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok());

    let role = req
        .headers()
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Role>().ok());

    match (user_id, role) {
        (Some(user_id), Some(role)) => {
            req.extensions_mut().insert(Identity { user_id, role });
            Ok(next.run(req).await)
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
