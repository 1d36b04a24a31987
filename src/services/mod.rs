pub(crate) mod export;
pub(crate) mod grading;
pub(crate) mod ocr_pipeline;
pub(crate) mod preprocess;
pub(crate) mod recognition;
pub(crate) mod storage;
