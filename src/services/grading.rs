use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{GradingResult, OcrJob};
use crate::repositories::test_defs::AnswerKeyEntry;
use crate::repositories::{grading_results, test_defs};

const UNKNOWN_STUDENT: &str = "Unknown student";

// Answer sheets are labelled in Uzbek, in either Latin or Cyrillic script.
// Recognition often drops the colon after the label, so any run of
// whitespace, colons or dashes separates the label from the name.
const NAME_PATTERNS: &[&str] = &[
    r"(?i)ism[\s:\-]+([A-Za-z\x{0400}-\x{04FF}'’ʻ]+(?:[ \t]+[A-Za-z\x{0400}-\x{04FF}'’ʻ]+)*)",
    r"(?i)ismi[\s:\-]+([A-Za-z\x{0400}-\x{04FF}'’ʻ]+(?:[ \t]+[A-Za-z\x{0400}-\x{04FF}'’ʻ]+)*)",
    r"(?i)foydalanuvchi[\s:\-]+([A-Za-z\x{0400}-\x{04FF}'’ʻ]+(?:[ \t]+[A-Za-z\x{0400}-\x{04FF}'’ʻ]+)*)",
];

const CLASS_PATTERN: &str = r"(?i)sinf\s*[:\-]\s*([^\n]+)";

const ANSWER_PATTERNS: &[&str] = &[
    r"(\d+)[\.\)]\s*([A-Da-d])\b",
    r"(?i)savol\s*(\d+)[:\s]\s*([A-Da-d])\b",
    r"(\d+)\s*-\s*([A-Da-d])\b",
];

fn name_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(NAME_PATTERNS))
}

fn class_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(CLASS_PATTERN).expect("valid class pattern"))
}

fn answer_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(ANSWER_PATTERNS))
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid recognition pattern"))
        .collect()
}

/// First matching name label wins; sheets without a recognizable label grade
/// under a placeholder name rather than failing.
pub(crate) fn extract_student_name(text: &str) -> String {
    for pattern in name_patterns() {
        if let Some(captures) = pattern.captures(text) {
            let name = captures[1].trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    UNKNOWN_STUDENT.to_string()
}

pub(crate) fn extract_student_class(text: &str) -> Option<String> {
    class_pattern()
        .captures(text)
        .map(|captures| captures[1].trim().to_string())
        .filter(|class| !class.is_empty())
}

/// Collects `question number -> answer letter` pairs. All patterns run over
/// the whole text and later matches overwrite earlier ones for the same
/// question, so a corrected answer further down the sheet wins.
pub(crate) fn extract_answers(text: &str) -> BTreeMap<i32, String> {
    let mut answers = BTreeMap::new();

    for pattern in answer_patterns() {
        for captures in pattern.captures_iter(text) {
            let Ok(number) = captures[1].parse::<i32>() else {
                continue;
            };
            answers.insert(number, captures[2].to_uppercase());
        }
    }

    answers
}

pub(crate) fn grade_band(percentage: f64) -> &'static str {
    if percentage >= 90.0 {
        "Excellent"
    } else if percentage >= 80.0 {
        "Good"
    } else if percentage >= 70.0 {
        "Satisfactory"
    } else if percentage >= 60.0 {
        "Unsatisfactory"
    } else {
        "Poor"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradingOutcome {
    pub(crate) student_name: String,
    pub(crate) student_class: Option<String>,
    pub(crate) total_questions: i32,
    pub(crate) correct_answers: i32,
    pub(crate) wrong_answers: i32,
    pub(crate) score: i32,
    pub(crate) percentage: f64,
    pub(crate) grade: &'static str,
}

/// Grades recognized sheet text against a test's answer key. Comparison is a
/// literal match between the parsed letter and the stored correct answer,
/// ignoring surrounding whitespace in the stored text.
pub(crate) fn grade(text: &str, key: &[AnswerKeyEntry]) -> GradingOutcome {
    let student_name = extract_student_name(text);
    let student_class = extract_student_class(text);
    let answers = extract_answers(text);

    let total_questions = key.len() as i32;
    let mut correct_answers = 0;
    for entry in key {
        if answers.get(&entry.order_index).map(String::as_str) == Some(entry.answer_text.trim()) {
            correct_answers += 1;
        }
    }

    let wrong_answers = total_questions - correct_answers;
    let percentage = if total_questions > 0 {
        f64::from(correct_answers) / f64::from(total_questions) * 100.0
    } else {
        0.0
    };

    GradingOutcome {
        student_name,
        student_class,
        total_questions,
        correct_answers,
        wrong_answers,
        score: correct_answers,
        percentage,
        grade: grade_band(percentage),
    }
}

/// Grades a completed job once. A result that already exists for the job is
/// returned as-is, including after losing an insert race.
pub(crate) async fn grade_and_store(
    pool: &PgPool,
    job: &OcrJob,
    test_id: &str,
) -> Result<GradingResult> {
    if let Some(existing) = grading_results::find_by_job_id(pool, &job.id)
        .await
        .context("Failed to look up existing grading result")?
    {
        return Ok(existing);
    }

    let text = job
        .processed_text
        .as_deref()
        .context("Job has no recognized text to grade")?;
    let key = test_defs::answer_key(pool, test_id)
        .await
        .context("Failed to load answer key")?;

    let outcome = grade(text, &key);
    let id = Uuid::new_v4().to_string();

    let inserted = grading_results::insert_if_absent(
        pool,
        grading_results::CreateGradingResult {
            id: &id,
            ocr_job_id: &job.id,
            test_id,
            student_name: &outcome.student_name,
            student_class: outcome.student_class.as_deref(),
            total_questions: outcome.total_questions,
            correct_answers: outcome.correct_answers,
            wrong_answers: outcome.wrong_answers,
            score: outcome.score,
            percentage: outcome.percentage,
            grade: outcome.grade,
            processed_at: primitive_now_utc(),
        },
    )
    .await
    .context("Failed to store grading result")?;

    match inserted {
        Some(result) => Ok(result),
        None => grading_results::find_by_job_id(pool, &job.id)
            .await
            .context("Failed to load grading result after insert race")?
            .context("Grading result vanished after insert race"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(entries: &[(i32, &str)]) -> Vec<AnswerKeyEntry> {
        entries
            .iter()
            .map(|(order_index, answer_text)| AnswerKeyEntry {
                order_index: *order_index,
                answer_text: (*answer_text).to_string(),
            })
            .collect()
    }

    #[test]
    fn name_is_extracted_from_latin_label() {
        assert_eq!(extract_student_name("Ism: Aliyev Vali\n1. A"), "Aliyev Vali");
    }

    #[test]
    fn name_is_extracted_from_cyrillic_text() {
        assert_eq!(extract_student_name("Ismi: Алиев Вали"), "Алиев Вали");
        assert_eq!(extract_student_name("Foydalanuvchi: Karimova Nodira"), "Karimova Nodira");
    }

    #[test]
    fn name_is_extracted_when_recognition_drops_the_colon() {
        assert_eq!(extract_student_name("Ism Aliyev Vali\n1. A"), "Aliyev Vali");
        assert_eq!(extract_student_name("Ismi Алиев Вали"), "Алиев Вали");
    }

    #[test]
    fn missing_name_label_falls_back_to_placeholder() {
        assert_eq!(extract_student_name("1. A\n2. B"), UNKNOWN_STUDENT);
        assert_eq!(extract_student_name(""), UNKNOWN_STUDENT);
    }

    #[test]
    fn class_label_is_optional() {
        assert_eq!(extract_student_class("Sinf: 9-A"), Some("9-A".to_string()));
        assert_eq!(extract_student_class("Ism: Aliyev Vali"), None);
    }

    #[test]
    fn answers_parse_all_label_styles() {
        let answers = extract_answers("1. A\n2) B\n3 - C");
        assert_eq!(answers.get(&1).map(String::as_str), Some("A"));
        assert_eq!(answers.get(&2).map(String::as_str), Some("B"));
        assert_eq!(answers.get(&3).map(String::as_str), Some("C"));
    }

    #[test]
    fn answers_accept_savol_prefix_and_lowercase() {
        let answers = extract_answers("Savol 4: d");
        assert_eq!(answers.get(&4).map(String::as_str), Some("D"));
    }

    #[test]
    fn repeated_question_keeps_last_answer() {
        let answers = extract_answers("1. A\nsomething\n1. B");
        assert_eq!(answers.get(&1).map(String::as_str), Some("B"));
    }

    #[test]
    fn answer_letter_must_stand_alone() {
        // "1. Answer" is prose, not a marked answer.
        assert!(extract_answers("1. Answer sheet").is_empty());
    }

    #[test]
    fn bands_cover_all_ranges() {
        assert_eq!(grade_band(100.0), "Excellent");
        assert_eq!(grade_band(90.0), "Excellent");
        assert_eq!(grade_band(85.0), "Good");
        assert_eq!(grade_band(75.0), "Satisfactory");
        assert_eq!(grade_band(60.0), "Unsatisfactory");
        assert_eq!(grade_band(59.9), "Poor");
        assert_eq!(grade_band(0.0), "Poor");
    }

    #[test]
    fn grading_counts_literal_matches() {
        let key = key(&[(1, "A"), (2, "B"), (3, "C"), (4, "D"), (5, "A")]);
        let outcome = grade("Ism: Aliyev Vali\n1. A\n2. B\n3. D\n4. A\n5. C", &key);

        assert_eq!(outcome.student_name, "Aliyev Vali");
        assert_eq!(outcome.total_questions, 5);
        assert_eq!(outcome.correct_answers, 2);
        assert_eq!(outcome.wrong_answers, 3);
        assert_eq!(outcome.score, 2);
        assert_eq!(outcome.percentage, 40.0);
        assert_eq!(outcome.grade, "Poor");
    }

    #[test]
    fn grading_half_correct_sheet() {
        let key = key(&[(1, "A"), (2, "C")]);
        let outcome = grade("Ism: Test Student\n1. A\n2. B", &key);

        assert_eq!(outcome.student_name, "Test Student");
        assert_eq!(outcome.correct_answers, 1);
        assert_eq!(outcome.wrong_answers, 1);
        assert_eq!(outcome.percentage, 50.0);
        assert_eq!(outcome.grade, "Poor");
    }

    #[test]
    fn empty_answer_key_grades_to_zero() {
        let outcome = grade("Ism: Aliyev Vali\n1. A", &[]);

        assert_eq!(outcome.total_questions, 0);
        assert_eq!(outcome.correct_answers, 0);
        assert_eq!(outcome.wrong_answers, 0);
        assert_eq!(outcome.percentage, 0.0);
        assert_eq!(outcome.grade, "Poor");
    }

    #[test]
    fn padded_answer_key_text_still_matches() {
        let key = key(&[(1, " C "), (2, "B\n")]);
        let outcome = grade("Ism: Aliyev Vali\n1. C\n2. B", &key);

        assert_eq!(outcome.correct_answers, 2);
        assert_eq!(outcome.wrong_answers, 0);
    }

    #[test]
    fn unanswered_questions_count_as_wrong() {
        let key = key(&[(1, "A"), (2, "B"), (3, "C")]);
        let outcome = grade("Ism: Aliyev Vali\n1. A", &key);

        assert_eq!(outcome.correct_answers, 1);
        assert_eq!(outcome.wrong_answers, 2);
    }
}
