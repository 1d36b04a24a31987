use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::GradingResult;

const COLUMNS: &str = "\
    id, ocr_job_id, test_id, student_name, student_class, total_questions, correct_answers, \
    wrong_answers, score, percentage, grade, processed_at";

pub(crate) async fn find_by_job_id(
    pool: &PgPool,
    ocr_job_id: &str,
) -> Result<Option<GradingResult>, sqlx::Error> {
    sqlx::query_as::<_, GradingResult>(&format!(
        "SELECT {COLUMNS} FROM grading_results WHERE ocr_job_id = $1"
    ))
    .bind(ocr_job_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_test(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<GradingResult>, sqlx::Error> {
    sqlx::query_as::<_, GradingResult>(&format!(
        "SELECT {COLUMNS} FROM grading_results WHERE test_id = $1 ORDER BY processed_at DESC"
    ))
    .bind(test_id)
    .fetch_all(pool)
    .await
}

pub(crate) struct CreateGradingResult<'a> {
    pub id: &'a str,
    pub ocr_job_id: &'a str,
    pub test_id: &'a str,
    pub student_name: &'a str,
    pub student_class: Option<&'a str>,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub score: i32,
    pub percentage: f64,
    pub grade: &'a str,
    pub processed_at: PrimitiveDateTime,
}

/// Inserts one result per job; a concurrent duplicate insert loses on the
/// unique `ocr_job_id` and returns `None`.
pub(crate) async fn insert_if_absent(
    pool: &PgPool,
    params: CreateGradingResult<'_>,
) -> Result<Option<GradingResult>, sqlx::Error> {
    sqlx::query_as::<_, GradingResult>(&format!(
        "INSERT INTO grading_results (
            id, ocr_job_id, test_id, student_name, student_class, total_questions,
            correct_answers, wrong_answers, score, percentage, grade, processed_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
        ON CONFLICT (ocr_job_id) DO NOTHING
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.ocr_job_id)
    .bind(params.test_id)
    .bind(params.student_name)
    .bind(params.student_class)
    .bind(params.total_questions)
    .bind(params.correct_answers)
    .bind(params.wrong_answers)
    .bind(params.score)
    .bind(params.percentage)
    .bind(params.grade)
    .bind(params.processed_at)
    .fetch_optional(pool)
    .await
}
