//! flashd-core - Flash job orchestration for STM32F4 targets
//!
//! This crate stages uploaded firmware images, drives OpenOCD as a child
//! process and narrates each run as an ordered stream of [`FlashEvent`]s
//! ending in a single [`OutcomeEvent`]. It knows nothing about HTTP; the API
//! layer adapts the event stream to its wire format.
//!
//! # Usage
//!
//! ```ignore
//! use flashd_core::{FlashEngine, StagingArea};
//!
//! let staged = StagingArea::default().stage("blink.elf", &bytes).await?;
//! let run = FlashEngine::default().start_staged(staged)?;
//! let (logs, outcome) = run.wait().await;
//! ```

pub mod engine;
pub mod error;
pub mod event;
pub mod job;
pub mod staging;

pub use engine::{missing_outcome, EngineConfig, FlashEngine, FlashRun, DEFAULT_CHANNEL_CAPACITY};
pub use error::{FlashError, FlashResult};
pub use event::{FlashEvent, JobState, LogEvent, LogOrigin, OutcomeEvent};
pub use job::{normalize_image_path, FlashJob, TargetConfig, STM32F4_STLINK};
pub use staging::{validate_filename, StagedImage, StagingArea};
