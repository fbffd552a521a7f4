// src/models/test.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::models::question::{PublicQuestion, Question};

/// Assessment cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TestType {
    Practice,
    Weekly,
    Monthly,
}

/// Represents the 'tests' table in the database.
///
/// `total_marks` is derived from the current question set and only ever
/// written by the question mutation paths.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Test {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub test_type: TestType,
    pub batch_id: i64,
    pub subject_id: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub total_marks: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Test {
    /// "Active for taking": the active flag is set and the optional
    /// scheduling window contains `now`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.start_date.is_none_or(|start| now >= start)
            && self.end_date.is_none_or(|end| now <= end)
    }
}

/// DTO for creating a test. Any caller-supplied total is ignored; a new test
/// always starts with zero questions and `total_marks = 0`.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_window))]
pub struct CreateTestRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub test_type: TestType,
    pub batch_id: i64,
    pub subject_id: Option<i64>,
    #[validate(range(min = 1))]
    pub duration_minutes: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn validate_window(req: &CreateTestRequest) -> Result<(), validator::ValidationError> {
    if let (Some(start), Some(end)) = (req.start_date, req.end_date) {
        if end <= start {
            return Err(validator::ValidationError::new("end_date_before_start_date"));
        }
    }
    Ok(())
}

/// DTO for updating a test. Fields are optional; `total_marks` is not
/// settable through this path.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTestRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub test_type: Option<TestType>,
    pub batch_id: Option<i64>,
    pub subject_id: Option<i64>,
    #[validate(range(min = 1))]
    pub duration_minutes: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl UpdateTestRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.test_type.is_none()
            && self.batch_id.is_none()
            && self.subject_id.is_none()
            && self.duration_minutes.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.is_active.is_none()
    }
}

/// Typed filter set for listing tests. One field per supported filter,
/// validated by construction.
#[derive(Debug, Default, Deserialize)]
pub struct TestFilters {
    pub batch_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub test_type: Option<TestType>,
    pub is_active: Option<bool>,
    /// Case-insensitive substring match over title and description.
    pub search: Option<String>,
}

/// Test together with its full question set (staff view).
#[derive(Debug, Serialize)]
pub struct TestDetail {
    #[serde(flatten)]
    pub test: Test,
    pub questions: Vec<Question>,
}

/// Test together with answer-free questions (student view).
#[derive(Debug, Serialize)]
pub struct TestDetailPublic {
    #[serde(flatten)]
    pub test: Test,
    pub questions: Vec<PublicQuestion>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_test() -> Test {
        Test {
            id: 1,
            title: "Algebra revision".into(),
            description: None,
            test_type: TestType::Weekly,
            batch_id: 7,
            subject_id: None,
            duration_minutes: Some(30),
            total_marks: 10,
            start_date: None,
            end_date: None,
            is_active: true,
            created_by: 2,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn open_when_active_and_no_window() {
        let t = base_test();
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        assert!(t.is_open_at(now));
    }

    #[test]
    fn closed_when_inactive() {
        let mut t = base_test();
        t.is_active = false;
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        assert!(!t.is_open_at(now));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let mut t = base_test();
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap();
        t.start_date = Some(start);
        t.end_date = Some(end);

        assert!(t.is_open_at(start));
        assert!(t.is_open_at(end));
        assert!(!t.is_open_at(start - chrono::Duration::seconds(1)));
        assert!(!t.is_open_at(end + chrono::Duration::seconds(1)));
    }
}
