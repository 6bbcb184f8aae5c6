//! Wire types of the flash API

use serde::{Deserialize, Serialize};

/// One line of a flash stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FlashRecord {
    /// Progress line from the server or the programmer
    Log { message: String },
    /// Final verdict; always the last record
    Complete { success: bool, message: String },
}

impl FlashRecord {
    pub fn is_complete(&self) -> bool {
        matches!(self, FlashRecord::Complete { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            FlashRecord::Log { message } | FlashRecord::Complete { message, .. } => message,
        }
    }
}

/// Error body returned for rejected requests
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
