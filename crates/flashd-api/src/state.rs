//! Application state for the flash API

use std::sync::Arc;

use flashd_core::{FlashEngine, StagingArea};

/// Default multipart body limit (16 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across all handlers
///
/// Holds no per-request data; every flash gets its own staged file and
/// child process.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<FlashEngine>,
    staging: Arc<StagingArea>,
    max_upload_bytes: usize,
}

impl AppState {
    /// Create a new AppState
    pub fn new(engine: FlashEngine, staging: StagingArea) -> Self {
        Self {
            engine: Arc::new(engine),
            staging: Arc::new(staging),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Override the upload size limit
    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn engine(&self) -> &FlashEngine {
        &self.engine
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }
}
