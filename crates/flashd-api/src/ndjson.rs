//! Newline-delimited JSON transport for flash runs
//!
//! Every [`FlashEvent`] becomes one JSON object followed by `\n`:
//!
//! ```text
//! {"type": "log", "message": "OpenOCD: Info : STLINK V2J37S7"}
//! {"type": "complete", "success": true, "message": "Flashing completed successfully!"}
//! ```
//!
//! Objects use `": "` and `", "` separators and non-ASCII text is written
//! literally. The completion record is always the last line, and there is
//! always exactly one.

use std::convert::Infallible;
use std::io;

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use flashd_core::{missing_outcome, FlashEvent, FlashRun, OutcomeEvent};
use futures::Stream;
use serde::Serialize;
use serde_json::ser::Formatter;
use tokio_stream::StreamExt;

/// Media type of the response body
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Header telling nginx-style proxies not to buffer the response
pub const X_ACCEL_BUFFERING: &str = "x-accel-buffering";

/// One line of the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Record {
    Log { message: String },
    Complete { success: bool, message: String },
}

impl Record {
    pub fn is_complete(&self) -> bool {
        matches!(self, Record::Complete { .. })
    }
}

impl From<OutcomeEvent> for Record {
    fn from(outcome: OutcomeEvent) -> Self {
        Record::Complete {
            success: outcome.success,
            message: outcome.message,
        }
    }
}

impl From<FlashEvent> for Record {
    fn from(event: FlashEvent) -> Self {
        match event {
            FlashEvent::Log(log) => Record::Log {
                message: log.message(),
            },
            FlashEvent::Outcome(outcome) => outcome.into(),
        }
    }
}

/// JSON formatter that puts a space after `:` and `,`
#[derive(Debug, Clone, Copy, Default)]
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Encode one record as a newline-terminated line
pub fn encode_record(record: &Record) -> Bytes {
    let mut buf = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    if let Err(e) = record.serialize(&mut serializer) {
        tracing::error!(error = %e, "Failed to encode stream record");
    }
    buf.push(b'\n');
    Bytes::from(buf)
}

/// Turn a run's events into encoded lines.
///
/// Ends right after the completion record. If the run's channel closes
/// without one, a failed completion is synthesized so the caller always gets
/// a verdict. Dropping the stream drops the run's receiver, which stops the
/// programmer and removes the staged image.
pub fn record_stream<S>(events: S) -> impl Stream<Item = Result<Bytes, Infallible>>
where
    S: Stream<Item = FlashEvent> + Send + 'static,
{
    async_stream::stream! {
        let mut events = Box::pin(events);
        let mut completed = false;

        while let Some(event) = events.next().await {
            completed = event.is_outcome();
            let record = Record::from(event);
            if let Record::Complete { success, .. } = &record {
                tracing::info!(success, "Final flash result");
            }
            yield Ok(encode_record(&record));
            if completed {
                break;
            }
        }

        if !completed {
            tracing::error!("Flash run ended without an outcome");
            yield Ok(encode_record(&Record::from(missing_outcome())));
        }
    }
}

/// Chunked streaming response for a run
pub fn ndjson_response(run: FlashRun) -> Response {
    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(NDJSON_CONTENT_TYPE),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                HeaderName::from_static(X_ACCEL_BUFFERING),
                HeaderValue::from_static("no"),
            ),
        ],
        Body::from_stream(record_stream(run.into_stream())),
    )
        .into_response()
}
