// src/grading.rs

use crate::models::question::{McqOption, Question, QuestionType};

/// Outcome of scoring a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradedAnswer {
    /// None for short answers awaiting manual grading.
    pub is_correct: Option<bool>,
    pub marks_obtained: i64,
}

/// Scores one answer against its question. Pure; runs exactly once per
/// answer at submission time.
///
/// * MCQ: full marks on an exact match with the designated correct option.
///   A missing selection is incorrect, never an error.
/// * Short answer: ungraded (null correctness, 0 marks) until a manual
///   correction is applied.
pub fn grade_answer(question: &Question, selected: Option<McqOption>) -> GradedAnswer {
    match question.question_type {
        QuestionType::Mcq => {
            let is_correct = selected.is_some() && selected == question.correct_option;
            GradedAnswer {
                is_correct: Some(is_correct),
                marks_obtained: if is_correct { question.marks } else { 0 },
            }
        }
        QuestionType::ShortAnswer => GradedAnswer {
            is_correct: None,
            marks_obtained: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::McqOptions;
    use sqlx::types::Json;

    fn mcq_question(correct: McqOption, marks: i64) -> Question {
        Question {
            id: 1,
            test_id: 1,
            question_text: "Pick one".into(),
            question_text_alt: None,
            question_type: QuestionType::Mcq,
            options: Some(Json(McqOptions {
                a: "first".into(),
                b: "second".into(),
                c: "third".into(),
                d: "fourth".into(),
            })),
            correct_option: Some(correct),
            reference_answer: None,
            marks,
            position: 1,
        }
    }

    fn short_answer_question(marks: i64) -> Question {
        Question {
            id: 2,
            test_id: 1,
            question_text: "Explain briefly".into(),
            question_text_alt: None,
            question_type: QuestionType::ShortAnswer,
            options: None,
            correct_option: None,
            reference_answer: Some("model answer".into()),
            marks,
            position: 2,
        }
    }

    #[test]
    fn mcq_correct_selection_earns_full_marks() {
        let q = mcq_question(McqOption::B, 5);
        let graded = grade_answer(&q, Some(McqOption::B));
        assert_eq!(graded.is_correct, Some(true));
        assert_eq!(graded.marks_obtained, 5);
    }

    #[test]
    fn mcq_wrong_selection_earns_zero() {
        let q = mcq_question(McqOption::B, 5);
        let graded = grade_answer(&q, Some(McqOption::A));
        assert_eq!(graded.is_correct, Some(false));
        assert_eq!(graded.marks_obtained, 0);
    }

    #[test]
    fn mcq_missing_selection_is_incorrect() {
        let q = mcq_question(McqOption::B, 5);
        let graded = grade_answer(&q, None);
        assert_eq!(graded.is_correct, Some(false));
        assert_eq!(graded.marks_obtained, 0);
    }

    #[test]
    fn short_answer_is_deferred() {
        let q = short_answer_question(4);
        let graded = grade_answer(&q, None);
        assert_eq!(graded.is_correct, None);
        assert_eq!(graded.marks_obtained, 0);
    }

    #[test]
    fn short_answer_ignores_stray_selection() {
        let q = short_answer_question(4);
        let graded = grade_answer(&q, Some(McqOption::C));
        assert_eq!(graded.is_correct, None);
        assert_eq!(graded.marks_obtained, 0);
    }
}
