// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Question kind: auto-graded multiple choice or manually graded short answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    ShortAnswer,
}

/// One of the four MCQ option keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum McqOption {
    A,
    B,
    C,
    D,
}

/// The four option texts of an MCQ question.
/// Stored as a JSON object in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqOptions {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
}

impl McqOptions {
    pub fn all_non_empty(&self) -> bool {
        !self.a.trim().is_empty()
            && !self.b.trim().is_empty()
            && !self.c.trim().is_empty()
            && !self.d.trim().is_empty()
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub test_id: i64,

    /// The text content of the question.
    pub question_text: String,

    /// Optional secondary-language rendering of the question.
    pub question_text_alt: Option<String>,

    pub question_type: QuestionType,

    /// Option texts for MCQ questions; null for short answers.
    pub options: Option<Json<McqOptions>>,

    /// The designated correct option for MCQ questions.
    pub correct_option: Option<McqOption>,

    /// Informational reference answer for short-answer questions; never used
    /// for automatic grading.
    pub reference_answer: Option<String>,

    pub marks: i64,

    /// Presentation order, unique within a test.
    pub position: i64,
}

/// DTO for sending a question to a student (excludes the correct option and
/// the reference answer).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_type: QuestionType,
    pub question_text: String,
    pub question_text_alt: Option<String>,
    pub options: Option<Json<McqOptions>>,
    pub marks: i64,
    pub position: i64,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.question_type,
            question_text: q.question_text,
            question_text_alt: q.question_text_alt,
            options: q.options,
            marks: q.marks,
            position: q.position,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_question_spec))]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question_text: String,
    #[validate(length(max = 2000))]
    pub question_text_alt: Option<String>,
    pub question_type: QuestionType,
    pub options: Option<McqOptions>,
    pub correct_option: Option<McqOption>,
    #[validate(length(max = 2000))]
    pub reference_answer: Option<String>,
    pub marks: i64,
    /// Explicit position; appended after the current last question if omitted.
    pub position: Option<i64>,
}

fn validate_question_spec(spec: &CreateQuestionRequest) -> Result<(), validator::ValidationError> {
    check_question_shape(
        spec.question_type,
        spec.options.as_ref(),
        spec.correct_option,
        spec.marks,
    )
    .map_err(validator::ValidationError::new)
}

/// Shared shape rules for question content, used both by request validation
/// and when applying partial updates to an existing row.
pub fn check_question_shape(
    question_type: QuestionType,
    options: Option<&McqOptions>,
    correct_option: Option<McqOption>,
    marks: i64,
) -> Result<(), &'static str> {
    if marks <= 0 {
        return Err("marks_must_be_positive");
    }

    match question_type {
        QuestionType::Mcq => {
            let options = options.ok_or("mcq_requires_options")?;
            if !options.all_non_empty() {
                return Err("mcq_options_must_be_non_empty");
            }
            if correct_option.is_none() {
                return Err("mcq_requires_correct_option");
            }
        }
        QuestionType::ShortAnswer => {
            if options.is_some() {
                return Err("short_answer_cannot_have_options");
            }
            if correct_option.is_some() {
                return Err("short_answer_cannot_have_correct_option");
            }
        }
    }

    Ok(())
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question_text: Option<String>,
    #[validate(length(max = 2000))]
    pub question_text_alt: Option<String>,
    pub options: Option<McqOptions>,
    pub correct_option: Option<McqOption>,
    #[validate(length(max = 2000))]
    pub reference_answer: Option<String>,
    pub marks: Option<i64>,
    pub position: Option<i64>,
}
