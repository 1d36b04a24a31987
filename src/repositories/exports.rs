use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ResultExport;

const COLUMNS: &str = "id, user_id, test_id, file_key, total_students, created_at";

pub(crate) async fn find_by_id_for_user(
    pool: &PgPool,
    id: &str,
    user_id: &str,
) -> Result<Option<ResultExport>, sqlx::Error> {
    sqlx::query_as::<_, ResultExport>(&format!(
        "SELECT {COLUMNS} FROM result_exports WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_user(
    pool: &PgPool,
    user_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<ResultExport>, sqlx::Error> {
    sqlx::query_as::<_, ResultExport>(&format!(
        "SELECT {COLUMNS} FROM result_exports
         WHERE user_id = $1
         ORDER BY created_at DESC
         OFFSET $2 LIMIT $3"
    ))
    .bind(user_id)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_user(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM result_exports WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub(crate) struct CreateExport<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub test_id: &'a str,
    pub file_key: &'a str,
    pub total_students: i32,
    pub created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateExport<'_>,
) -> Result<ResultExport, sqlx::Error> {
    sqlx::query_as::<_, ResultExport>(&format!(
        "INSERT INTO result_exports (id, user_id, test_id, file_key, total_students, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.test_id)
    .bind(params.file_key)
    .bind(params.total_students)
    .bind(params.created_at)
    .fetch_one(pool)
    .await
}
