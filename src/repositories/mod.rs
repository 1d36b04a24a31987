pub(crate) mod exports;
pub(crate) mod grading_results;
pub(crate) mod ocr_jobs;
pub(crate) mod test_defs;
pub(crate) mod users;
