use std::fmt::{self, Display};

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChunksError(err) => err.fmt(f),
        }
    }
}

/// One `event:`/`data:` pair of an event stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Frame {
    pub name: String,
    pub data: String,
}

/// Splits event stream text into frames.
///
/// Text can be pushed in pieces of any size. A frame is only produced
/// once its terminating blank line has arrived, so a frame split across
/// two pushes comes out whole.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: String,
}

impl FrameParser {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text to the buffer. Carriage returns are dropped, so
    /// `\r\n` line endings behave like `\n`.
    #[inline]
    pub fn push(&mut self, text: &str) {
        self.buf.extend(text.chars().filter(|c| *c != '\r'));
    }

    /// Pushes `text` and returns the frames that became complete.
    #[inline]
    pub fn feed(&mut self, text: &str) -> Frames<'_> {
        self.push(text);
        Frames { parser: self }
    }

    /// Takes the next complete frame out of the buffer.
    ///
    /// Frames without a name or without data are skipped.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let eol_idx = self.buf.find("\n\n")?;
            let raw: String = self.buf.drain(..eol_idx + 2).collect();
            let raw = &raw[..eol_idx];
            if raw.trim().is_empty() {
                continue;
            }
            match parse_frame(raw) {
                Some(frame) => return Some(frame),
                None => warn!("invalid server-sent event: {raw:?}"),
            }
        }
    }

    /// Discards whatever is left in the buffer at end of stream.
    ///
    /// An unterminated frame is never emitted.
    pub fn finish(&mut self) {
        if !self.buf.trim().is_empty() {
            warn!("discarding unterminated event: {:?}", self.buf);
        }
        self.buf.clear();
    }
}

/// Iterator over the complete frames of a [`FrameParser`].
pub struct Frames<'a> {
    parser: &'a mut FrameParser,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    #[inline]
    fn next(&mut self) -> Option<Frame> {
        self.parser.next_frame()
    }
}

// Repeated fields overwrite earlier ones. Lines other than `event: ` and
// `data: ` (comments, ids, retry hints) are ignored.
fn parse_frame(raw: &str) -> Option<Frame> {
    let mut name = None;
    let mut data = None;
    for line in raw.split('\n') {
        if let Some(value) = line.strip_prefix("event: ") {
            name = Some(value);
        } else if let Some(value) = line.strip_prefix("data: ") {
            data = Some(value);
        }
    }
    match (name, data) {
        (Some(name), Some(data)) if !name.is_empty() && !data.is_empty() => {
            Some(Frame {
                name: name.to_owned(),
                data: data.to_owned(),
            })
        }
        _ => None,
    }
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    chunks: Chunks,
    parser: FrameParser,
    // Trailing bytes of a UTF-8 sequence that was cut by a chunk boundary.
    pending_bytes: Vec<u8>,
    exhausted: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            chunks,
            parser: FrameParser::new(),
            pending_bytes: Vec::new(),
            exhausted: false,
        }
    }

    pub async fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            // Drain what is already buffered before touching the network.
            if let Some(frame) = self.parser.next_frame() {
                return Ok(Some(frame));
            }
            if self.exhausted {
                return Ok(None);
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                self.exhausted = true;
                if !self.pending_bytes.is_empty() {
                    warn!("stream ended inside a UTF-8 sequence");
                    self.pending_bytes.clear();
                }
                self.parser.finish();
                return Ok(None);
            };
            let text = self.decode_utf8(&bytes);
            self.parser.push(&text);
        }
    }

    // Invalid bytes become U+FFFD, so they only spoil the frame they
    // are in. An incomplete sequence at the end is kept for the next chunk.
    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(bytes);
        let mut text = String::with_capacity(self.pending_bytes.len());
        let mut rest = &self.pending_bytes[..];
        let consumed = loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break self.pending_bytes.len();
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // Already checked, so this borrows without replacing.
                    text.push_str(&String::from_utf8_lossy(valid));
                    let Some(invalid_len) = err.error_len() else {
                        break self.pending_bytes.len() - after.len();
                    };
                    trace!("replacing {invalid_len} invalid UTF-8 byte(s)");
                    text.push(char::REPLACEMENT_CHARACTER);
                    rest = &after[invalid_len..];
                }
            }
        };
        self.pending_bytes.drain(..consumed);
        text
    }
}
