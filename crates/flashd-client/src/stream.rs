//! Live flash stream

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{FlashClientError, Result};
use crate::parser::NdjsonParser;
use crate::types::FlashRecord;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Records of one flash request, read as the server produces them
///
/// Dropping the stream closes the connection, which makes the server stop
/// the programmer.
pub struct FlashStream {
    byte_stream: ByteStream,
    parser: NdjsonParser,
    buffered: VecDeque<Result<FlashRecord>>,
    finished: bool,
}

impl FlashStream {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self::from_byte_stream(Box::pin(response.bytes_stream()))
    }

    fn from_byte_stream(byte_stream: ByteStream) -> Self {
        Self {
            byte_stream,
            parser: NdjsonParser::new(),
            buffered: VecDeque::new(),
            finished: false,
        }
    }

    /// Next record, or `None` at end of stream
    pub async fn next(&mut self) -> Option<Result<FlashRecord>> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Some(record);
            }
            if self.finished {
                return None;
            }

            match self.byte_stream.next().await {
                Some(Ok(bytes)) => self.buffered.extend(self.parser.feed(&bytes)),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.finished = true;
                    return self.parser.finish();
                }
            }
        }
    }

    /// Adapt into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<FlashRecord>> {
        stream::unfold(self, |mut this| async move {
            this.next().await.map(|record| (record, this))
        })
    }

    /// Read to the end, handing every log message to `on_log`, and return the
    /// completion record as `(success, message)`.
    pub async fn finish_with<F>(mut self, mut on_log: F) -> Result<(bool, String)>
    where
        F: FnMut(&str),
    {
        while let Some(record) = self.next().await {
            match record? {
                FlashRecord::Log { message } => on_log(&message),
                FlashRecord::Complete { success, message } => return Ok((success, message)),
            }
        }
        Err(FlashClientError::IncompleteStream)
    }

    /// Read to the end, discarding log records
    pub async fn finish(self) -> Result<(bool, String)> {
        self.finish_with(|_| {}).await
    }
}
