use std::error::Error as StdError;
use std::fmt::{self, Display};

use alma_model::{SearchResult, StreamEvent};
use serde::de::DeserializeOwned;

use crate::io::Frame;

/// A known event whose payload doesn't have the expected shape.
#[derive(Debug)]
pub struct DecodeError {
    name: &'static str,
    source: serde_json::Error,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed `{}` payload: {}", self.name, self.source)
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

/// Turns a frame into a typed event.
///
/// Returns `Ok(None)` for event names this client doesn't know, which
/// callers may ignore. A known name with a payload that fails to decode
/// is an error.
pub fn decode(frame: &Frame) -> Result<Option<StreamEvent>, DecodeError> {
    let event = match frame.name.as_str() {
        "chat_title" => StreamEvent::ChatTitle(payload("chat_title", frame)?),
        "message_id" => StreamEvent::MessageId(payload("message_id", frame)?),
        "message_delta" => {
            StreamEvent::MessageDelta(payload("message_delta", frame)?)
        }
        "search_query" => {
            StreamEvent::SearchQuery(payload("search_query", frame)?)
        }
        "search_results" => {
            let results: Vec<SearchResult> = payload("search_results", frame)?;
            StreamEvent::SearchResults(results)
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

#[inline]
fn payload<T: DeserializeOwned>(
    name: &'static str,
    frame: &Frame,
) -> Result<T, DecodeError> {
    serde_json::from_str(&frame.data)
        .map_err(|source| DecodeError { name, source })
}
