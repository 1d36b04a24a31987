use serde::Serialize;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::ResultExport;

#[derive(Debug, Serialize)]
pub(crate) struct ExportResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) test_id: String,
    pub(crate) file_key: String,
    pub(crate) total_students: i32,
    pub(crate) created_at: String,
}

impl From<ResultExport> for ExportResponse {
    fn from(export: ResultExport) -> Self {
        Self {
            id: export.id,
            user_id: export.user_id,
            test_id: export.test_id,
            file_key: export.file_key,
            total_students: export.total_students,
            created_at: format_primitive(export.created_at),
        }
    }
}
