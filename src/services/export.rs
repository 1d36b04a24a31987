use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::{format_minutes, primitive_now_utc};
use crate::db::models::{GradingResult, ResultExport, TestDefinition};
use crate::repositories::exports;
use crate::services::storage::StorageService;

pub(crate) const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const RESULT_HEADERS: &[&str] = &[
    "#",
    "Student name",
    "Class",
    "Correct",
    "Wrong",
    "Total questions",
    "Percentage",
    "Grade",
    "Graded at",
];

/// Builds the results workbook, uploads it under `exports/` and records the
/// export.
pub(crate) async fn export_test_results(
    db: &PgPool,
    storage: &StorageService,
    user_id: &str,
    test: &TestDefinition,
    results: &[GradingResult],
) -> Result<ResultExport> {
    let workbook = build_results_workbook(test, results)?;

    let export_id = Uuid::new_v4().to_string();
    let file_key = format!("exports/{}/{}.xlsx", test.id, export_id);
    storage
        .upload_bytes(&file_key, XLSX_CONTENT_TYPE, workbook)
        .await
        .context("Failed to upload export file")?;

    let export = exports::create(
        db,
        exports::CreateExport {
            id: &export_id,
            user_id,
            test_id: &test.id,
            file_key: &file_key,
            total_students: results.len() as i32,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .context("Failed to record export")?;

    Ok(export)
}

/// Two sheets: per-student results and a test summary.
pub(crate) fn build_results_workbook(
    test: &TestDefinition,
    results: &[GradingResult],
) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Results").context("Failed to name results sheet")?;
    for (column, header) in RESULT_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, column as u16, *header, &bold)?;
    }

    for (index, result) in results.iter().enumerate() {
        let row = (index + 1) as u32;
        sheet.write_number(row, 0, (index + 1) as f64)?;
        sheet.write_string(row, 1, &result.student_name)?;
        sheet.write_string(row, 2, result.student_class.as_deref().unwrap_or("-"))?;
        sheet.write_number(row, 3, result.correct_answers)?;
        sheet.write_number(row, 4, result.wrong_answers)?;
        sheet.write_number(row, 5, result.total_questions)?;
        sheet.write_number(row, 6, result.percentage)?;
        sheet.write_string(row, 7, &result.grade)?;
        sheet.write_string(row, 8, &format_minutes(result.processed_at))?;
    }
    sheet.autofit();

    let mean_percentage = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|result| result.percentage).sum::<f64>() / results.len() as f64
    };

    let summary = workbook.add_worksheet();
    summary.set_name("Summary").context("Failed to name summary sheet")?;
    summary.write_string_with_format(0, 0, "Test", &bold)?;
    summary.write_string(0, 1, &test.title)?;
    summary.write_string_with_format(1, 0, "Subject", &bold)?;
    summary.write_string(1, 1, &test.subject)?;
    summary.write_string_with_format(2, 0, "Grade level", &bold)?;
    summary.write_string(2, 1, &test.grade_level)?;
    summary.write_string_with_format(3, 0, "Students graded", &bold)?;
    summary.write_number(3, 1, results.len() as f64)?;
    summary.write_string_with_format(4, 0, "Average percentage", &bold)?;
    summary.write_number(4, 1, mean_percentage)?;
    summary.write_string_with_format(5, 0, "Generated at", &bold)?;
    summary.write_string(5, 1, &format_minutes(primitive_now_utc()))?;
    summary.autofit();

    let buffer = workbook.save_to_buffer().context("Failed to serialize workbook")?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::db::types::TestDifficulty;

    fn sample_test() -> TestDefinition {
        let now = primitive_now_utc();
        TestDefinition {
            id: "test-1".to_string(),
            author_id: "user-1".to_string(),
            title: "Algebra nazorat ishi".to_string(),
            description: None,
            subject: "Matematika".to_string(),
            grade_level: "9".to_string(),
            difficulty: TestDifficulty::Medium,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_result(name: &str, percentage: f64) -> GradingResult {
        GradingResult {
            id: Uuid::new_v4().to_string(),
            ocr_job_id: Uuid::new_v4().to_string(),
            test_id: "test-1".to_string(),
            student_name: name.to_string(),
            student_class: Some("9-A".to_string()),
            total_questions: 10,
            correct_answers: 7,
            wrong_answers: 3,
            score: 7,
            percentage,
            grade: "Satisfactory".to_string(),
            processed_at: primitive_now_utc(),
        }
    }

    #[test]
    fn workbook_bytes_are_a_zip_archive() {
        let results = vec![sample_result("Aliyev Vali", 70.0), sample_result("Karimova N", 90.0)];
        let bytes = build_results_workbook(&sample_test(), &results).expect("workbook");

        assert!(!bytes.is_empty());
        // xlsx files are zip archives.
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn workbook_builds_without_results() {
        let bytes = build_results_workbook(&sample_test(), &[]).expect("workbook");
        assert_eq!(&bytes[..2], b"PK");
    }
}
