pub(crate) mod errors;
pub(crate) mod exports;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod ocr;
pub(crate) mod pagination;
pub(crate) mod router;
pub(crate) mod test_defs;
pub(crate) mod validation;
