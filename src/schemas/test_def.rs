use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{Answer, Question, TestDefinition};
use crate::db::types::TestDifficulty;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CreateAnswerRequest {
    #[validate(length(min = 1, message = "answer_text must not be empty"))]
    pub(crate) answer_text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CreateQuestionRequest {
    #[validate(length(min = 1, message = "question_text must not be empty"))]
    pub(crate) question_text: String,
    #[serde(default = "default_points")]
    #[validate(range(min = 1, message = "points must be positive"))]
    pub(crate) points: i32,
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: i32,
    #[validate(nested)]
    pub(crate) answers: Vec<CreateAnswerRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CreateTestRequest {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub(crate) subject: String,
    #[validate(length(min = 1, message = "grade_level must not be empty"))]
    pub(crate) grade_level: String,
    #[serde(default = "default_difficulty")]
    pub(crate) difficulty: TestDifficulty,
    #[validate(nested)]
    pub(crate) questions: Vec<CreateQuestionRequest>,
}

fn default_points() -> i32 {
    1
}

fn default_difficulty() -> TestDifficulty {
    TestDifficulty::Medium
}

/// Checks what the derive rules cannot: each question carries exactly one
/// correct answer, and that answer is a single letter the sheet parser can
/// produce.
pub(crate) fn validate_question_set(questions: &[CreateQuestionRequest]) -> Result<(), String> {
    for question in questions {
        let correct: Vec<&CreateAnswerRequest> =
            question.answers.iter().filter(|answer| answer.is_correct).collect();

        if correct.len() != 1 {
            return Err(format!(
                "question {} must have exactly one correct answer",
                question.order_index
            ));
        }

        let letter = correct[0].answer_text.trim();
        if letter.len() != 1 || !matches!(letter.as_bytes()[0], b'A'..=b'D') {
            return Err(format!(
                "question {}: the correct answer must be a single letter A-D",
                question.order_index
            ));
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) answer_text: String,
    pub(crate) is_correct: bool,
    pub(crate) order_index: i32,
}

impl From<Answer> for AnswerResponse {
    fn from(answer: Answer) -> Self {
        Self {
            id: answer.id,
            answer_text: answer.answer_text,
            is_correct: answer.is_correct,
            order_index: answer.order_index,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) question_text: String,
    pub(crate) points: i32,
    pub(crate) order_index: i32,
    pub(crate) answers: Vec<AnswerResponse>,
}

impl QuestionResponse {
    pub(crate) fn from_question(question: Question, answers: Vec<Answer>) -> Self {
        Self {
            id: question.id,
            question_text: question.question_text,
            points: question.points,
            order_index: question.order_index,
            answers: answers.into_iter().map(AnswerResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TestResponse {
    pub(crate) id: String,
    pub(crate) author_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject: String,
    pub(crate) grade_level: String,
    pub(crate) difficulty: TestDifficulty,
    pub(crate) is_active: bool,
    pub(crate) question_count: i64,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl TestResponse {
    pub(crate) fn from_test(test: TestDefinition, question_count: i64) -> Self {
        Self {
            id: test.id,
            author_id: test.author_id,
            title: test.title,
            description: test.description,
            subject: test.subject,
            grade_level: test.grade_level,
            difficulty: test.difficulty,
            is_active: test.is_active,
            question_count,
            created_at: format_primitive(test.created_at),
            updated_at: format_primitive(test.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TestDetailResponse {
    #[serde(flatten)]
    pub(crate) test: TestResponse,
    pub(crate) questions: Vec<QuestionResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(answers: Vec<CreateAnswerRequest>) -> CreateQuestionRequest {
        CreateQuestionRequest {
            question_text: "2 + 2 = ?".to_string(),
            points: 1,
            order_index: 1,
            answers,
        }
    }

    fn answer(text: &str, is_correct: bool, order_index: i32) -> CreateAnswerRequest {
        CreateAnswerRequest { answer_text: text.to_string(), is_correct, order_index }
    }

    #[test]
    fn exactly_one_correct_answer_is_required() {
        let none_correct = question(vec![answer("A", false, 0), answer("B", false, 1)]);
        assert!(validate_question_set(&[none_correct]).is_err());

        let two_correct = question(vec![answer("A", true, 0), answer("B", true, 1)]);
        assert!(validate_question_set(&[two_correct]).is_err());

        let one_correct = question(vec![answer("A", true, 0), answer("B", false, 1)]);
        assert!(validate_question_set(&[one_correct]).is_ok());
    }

    #[test]
    fn correct_answer_must_be_a_single_letter() {
        let word = question(vec![answer("Toshkent", true, 0)]);
        assert!(validate_question_set(&[word]).is_err());

        let out_of_range = question(vec![answer("E", true, 0)]);
        assert!(validate_question_set(&[out_of_range]).is_err());

        let padded = question(vec![answer(" C ", true, 0)]);
        assert!(validate_question_set(&[padded]).is_ok());
    }

    #[test]
    fn empty_question_set_is_valid() {
        assert!(validate_question_set(&[]).is_ok());
    }
}
