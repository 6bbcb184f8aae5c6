//! Flash handler
//!
//! `POST /api/flash` takes a multipart upload with a `file` field holding an
//! ELF image, stages it, starts OpenOCD and streams progress back as NDJSON.
//!
//! Anything that can be rejected is rejected before the stream starts: a bad
//! filename, a missing field, an oversized body, a missing programmer. Once
//! the response is streaming, every failure is reported as the final
//! completion record instead.

use axum::extract::{Multipart, State};
use axum::response::Response;
use bytes::Bytes;

use crate::error::ApiError;
use crate::ndjson::ndjson_response;
use crate::state::AppState;

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// Uploaded image read from the request
struct Upload {
    filename: String,
    data: Bytes,
}

/// Find the `file` field, validating its name before reading the body
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        flashd_core::validate_filename(&filename)?;

        let data = field.bytes().await?;
        return Ok(Upload { filename, data });
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{}'",
        FILE_FIELD
    )))
}

/// POST /api/flash
/// Write an ELF image to the target and stream the programmer's output
pub async fn flash_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(&mut multipart).await?;

    let staged = state
        .staging()
        .stage(&upload.filename, &upload.data)
        .await?;

    // On precondition failure the staged file is dropped, and removed, here
    let run = state.engine().start_staged(staged)?;

    tracing::info!(
        file = %upload.filename,
        size = upload.data.len(),
        "Flash started"
    );

    Ok(ndjson_response(run))
}
