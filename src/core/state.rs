use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::recognition::TextExtractionEngine;
use crate::services::storage::StorageService;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    storage: Option<StorageService>,
    recognition: TextExtractionEngine,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        storage: Option<StorageService>,
        recognition: TextExtractionEngine,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, storage, recognition }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn recognition(&self) -> &TextExtractionEngine {
        &self.inner.recognition
    }
}
