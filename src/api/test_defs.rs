use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::{ListQuery, PaginatedResponse};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories::test_defs;
use crate::schemas::test_def::{
    validate_question_set, CreateTestRequest, QuestionResponse, TestDetailResponse, TestResponse,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tests).post(create_test))
        .route("/:test_id", get(get_test))
}

async fn create_test(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateTestRequest>,
) -> Result<(StatusCode, Json<TestResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    validate_question_set(&payload.questions).map_err(ApiError::BadRequest)?;

    let test_id = Uuid::new_v4().to_string();
    let question_ids: Vec<String> =
        payload.questions.iter().map(|_| Uuid::new_v4().to_string()).collect();
    let answer_ids: Vec<Vec<String>> = payload
        .questions
        .iter()
        .map(|question| question.answers.iter().map(|_| Uuid::new_v4().to_string()).collect())
        .collect();

    let questions: Vec<test_defs::CreateQuestion<'_>> = payload
        .questions
        .iter()
        .enumerate()
        .map(|(index, question)| test_defs::CreateQuestion {
            id: &question_ids[index],
            question_text: &question.question_text,
            points: question.points,
            order_index: question.order_index,
            answers: question
                .answers
                .iter()
                .enumerate()
                .map(|(answer_index, answer)| test_defs::CreateAnswer {
                    id: &answer_ids[index][answer_index],
                    // Stored verbatim into the grading key, so padding from
                    // the client must not survive the insert.
                    answer_text: answer.answer_text.trim(),
                    is_correct: answer.is_correct,
                    order_index: answer.order_index,
                })
                .collect(),
        })
        .collect();

    let question_count = questions.len() as i64;
    let test = test_defs::create_with_questions(
        state.db(),
        test_defs::CreateTest {
            id: &test_id,
            author_id: &user.id,
            title: &payload.title,
            description: payload.description.as_deref(),
            subject: &payload.subject,
            grade_level: &payload.grade_level,
            difficulty: payload.difficulty,
            created_at: primitive_now_utc(),
        },
        questions,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create test"))?;

    Ok((StatusCode::CREATED, Json(TestResponse::from_test(test, question_count))))
}

async fn list_tests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaginatedResponse<TestResponse>>, ApiError> {
    let (skip, limit) = query.window();

    let tests = test_defs::list_by_author(state.db(), &user.id, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list tests"))?;
    let total_count = test_defs::count_by_author(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count tests"))?;

    let mut items = Vec::with_capacity(tests.len());
    for test in tests {
        let question_count = test_defs::question_count(state.db(), &test.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
        items.push(TestResponse::from_test(test, question_count));
    }

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

async fn get_test(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(test_id): Path<String>,
) -> Result<Json<TestDetailResponse>, ApiError> {
    let test = test_defs::find_by_id_for_author(state.db(), &test_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load test"))?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    let questions = test_defs::list_questions(state.db(), &test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;
    let mut answers = test_defs::list_answers_for_test(state.db(), &test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load answers"))?;

    let question_count = questions.len() as i64;
    let questions = questions
        .into_iter()
        .map(|question| {
            let own_answers: Vec<_> = answers
                .iter()
                .filter(|answer| answer.question_id == question.id)
                .cloned()
                .collect();
            answers.retain(|answer| answer.question_id != question.id);
            QuestionResponse::from_question(question, own_answers)
        })
        .collect();

    Ok(Json(TestDetailResponse {
        test: TestResponse::from_test(test, question_count),
        questions,
    }))
}
