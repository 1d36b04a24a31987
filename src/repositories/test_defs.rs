use sqlx::{FromRow, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::{Answer, Question, TestDefinition};
use crate::db::types::TestDifficulty;

const TEST_COLUMNS: &str = "\
    id, author_id, title, description, subject, grade_level, difficulty, is_active, \
    created_at, updated_at";

const QUESTION_COLUMNS: &str = "id, test_id, question_text, points, order_index, created_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<TestDefinition>, sqlx::Error> {
    sqlx::query_as::<_, TestDefinition>(&format!("SELECT {TEST_COLUMNS} FROM tests WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_by_id_for_author(
    pool: &PgPool,
    id: &str,
    author_id: &str,
) -> Result<Option<TestDefinition>, sqlx::Error> {
    sqlx::query_as::<_, TestDefinition>(&format!(
        "SELECT {TEST_COLUMNS} FROM tests WHERE id = $1 AND author_id = $2"
    ))
    .bind(id)
    .bind(author_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_author(
    pool: &PgPool,
    author_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<TestDefinition>, sqlx::Error> {
    sqlx::query_as::<_, TestDefinition>(&format!(
        "SELECT {TEST_COLUMNS} FROM tests
         WHERE author_id = $1
         ORDER BY created_at DESC
         OFFSET $2 LIMIT $3"
    ))
    .bind(author_id)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_author(pool: &PgPool, author_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tests WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn question_count(pool: &PgPool, test_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE test_id = $1")
        .bind(test_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE test_id = $1 ORDER BY order_index"
    ))
    .bind(test_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_answers_for_test(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(
        "SELECT a.id, a.question_id, a.answer_text, a.is_correct, a.order_index, a.created_at
         FROM answers a
         JOIN questions q ON q.id = a.question_id
         WHERE q.test_id = $1
         ORDER BY q.order_index, a.order_index",
    )
    .bind(test_id)
    .fetch_all(pool)
    .await
}

/// One row per question of a test, in grading order: the question's 1-based
/// position key and the text of its correct-marked answer.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AnswerKeyEntry {
    pub(crate) order_index: i32,
    pub(crate) answer_text: String,
}

pub(crate) async fn answer_key(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<AnswerKeyEntry>, sqlx::Error> {
    sqlx::query_as::<_, AnswerKeyEntry>(
        "SELECT q.order_index, a.answer_text
         FROM questions q
         JOIN answers a ON a.question_id = q.id AND a.is_correct
         WHERE q.test_id = $1
         ORDER BY q.order_index",
    )
    .bind(test_id)
    .fetch_all(pool)
    .await
}

pub(crate) struct CreateTest<'a> {
    pub id: &'a str,
    pub author_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub subject: &'a str,
    pub grade_level: &'a str,
    pub difficulty: TestDifficulty,
    pub created_at: PrimitiveDateTime,
}

pub(crate) struct CreateQuestion<'a> {
    pub id: &'a str,
    pub question_text: &'a str,
    pub points: i32,
    pub order_index: i32,
    pub answers: Vec<CreateAnswer<'a>>,
}

pub(crate) struct CreateAnswer<'a> {
    pub id: &'a str,
    pub answer_text: &'a str,
    pub is_correct: bool,
    pub order_index: i32,
}

/// Inserts a test with its questions and answers in one transaction so a
/// partially-created test is never visible.
pub(crate) async fn create_with_questions(
    pool: &PgPool,
    test: CreateTest<'_>,
    questions: Vec<CreateQuestion<'_>>,
) -> Result<TestDefinition, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let created = sqlx::query_as::<_, TestDefinition>(&format!(
        "INSERT INTO tests (
            id, author_id, title, description, subject, grade_level, difficulty, is_active,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,TRUE,$8,$8)
        RETURNING {TEST_COLUMNS}",
    ))
    .bind(test.id)
    .bind(test.author_id)
    .bind(test.title)
    .bind(test.description)
    .bind(test.subject)
    .bind(test.grade_level)
    .bind(test.difficulty)
    .bind(test.created_at)
    .fetch_one(&mut *tx)
    .await?;

    for question in &questions {
        sqlx::query(
            "INSERT INTO questions (id, test_id, question_text, points, order_index, created_at)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(question.id)
        .bind(test.id)
        .bind(question.question_text)
        .bind(question.points)
        .bind(question.order_index)
        .bind(test.created_at)
        .execute(&mut *tx)
        .await?;

        for answer in &question.answers {
            sqlx::query(
                "INSERT INTO answers (id, question_id, answer_text, is_correct, order_index, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6)",
            )
            .bind(answer.id)
            .bind(question.id)
            .bind(answer.answer_text)
            .bind(answer.is_correct)
            .bind(answer.order_index)
            .bind(test.created_at)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(created)
}
