//! flashd Client Library
//!
//! Uploads firmware images to a flashd server and reads the progress stream
//! as it is produced.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use flashd_client::{FlashClient, FlashRecord};
//!
//! #[tokio::main]
//! async fn main() -> flashd_client::Result<()> {
//!     let client = FlashClient::new("http://localhost:8000")?;
//!     let mut stream = client.flash_file(Path::new("blink.elf")).await?;
//!
//!     while let Some(record) = stream.next().await {
//!         match record? {
//!             FlashRecord::Log { message } => println!("{}", message),
//!             FlashRecord::Complete { success, message } => {
//!                 println!("{} ({})", message, success);
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod error;
pub mod parser;
mod stream;
pub mod testing;
mod types;

pub use client::FlashClient;
pub use error::{FlashClientError, Result};
pub use stream::FlashStream;
pub use types::*;
