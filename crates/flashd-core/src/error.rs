//! Error types for flash jobs

use std::path::PathBuf;

use thiserror::Error;

/// Result type for flash operations
pub type FlashResult<T> = Result<T, FlashError>;

/// Errors that can occur while staging or flashing an image
#[derive(Debug, Error)]
pub enum FlashError {
    /// Upload rejected before any processing (bad extension, unusable name)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Image file does not exist at engine start
    #[error("ELF file not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    /// Explicitly configured programmer executable does not exist
    #[error("OpenOCD not found: {}", .0.display())]
    ProgrammerNotFound(PathBuf),

    /// Failed to write the staged image
    #[error("Staging error: {0}")]
    Staging(#[from] std::io::Error),
}

impl FlashError {
    /// Returns true for the "does not exist" preconditions checked before spawning
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FlashError::ImageNotFound(_) | FlashError::ProgrammerNotFound(_)
        )
    }
}
