use std::time::Duration;

use futures::StreamExt;

use querydesk_core::backend::ByteStream;
use querydesk_core::errors::ChatError;

/// Incremental UTF-8 decoder. Bytes of a character split across chunks are
/// held back until the rest arrives; invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `pending + bytes` as forms complete characters.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[start..valid_end]) {
                        out.push_str(valid);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }

    /// Release whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Chunk(String),
    Done,
}

/// Reads a completion body chunk by chunk as decoded text.
pub struct TransportReader {
    inner: ByteStream,
    decoder: Utf8Decoder,
    idle_timeout: Option<Duration>,
    finished: bool,
    bytes_read: usize,
}

impl TransportReader {
    /// Wrap a response body. A response without one cannot be read.
    pub fn new(body: Option<ByteStream>) -> Result<Self, ChatError> {
        let inner = body.ok_or(ChatError::StreamUnavailable)?;
        Ok(Self {
            inner,
            decoder: Utf8Decoder::new(),
            idle_timeout: None,
            finished: false,
            bytes_read: 0,
        })
    }

    /// Fail a read that sees no bytes for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Next decoded chunk, or `Done` once the body is exhausted. Chunks that
    /// decode to nothing (a lone partial character) are skipped.
    pub async fn next_chunk(&mut self) -> Result<ReadOutcome, ChatError> {
        loop {
            if self.finished {
                return Ok(ReadOutcome::Done);
            }

            let next = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, self.inner.next())
                    .await
                    .map_err(|_| ChatError::IdleTimeout(limit))?,
                None => self.inner.next().await,
            };

            match next {
                Some(Ok(bytes)) => {
                    self.bytes_read += bytes.len();
                    let text = self.decoder.decode(&bytes);
                    if !text.is_empty() {
                        return Ok(ReadOutcome::Chunk(text));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.finished = true;
                    let rest = self.decoder.finish();
                    if !rest.is_empty() {
                        return Ok(ReadOutcome::Chunk(rest));
                    }
                }
            }
        }
    }
}
