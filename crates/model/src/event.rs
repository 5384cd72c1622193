use serde::{Deserialize, Serialize};

use crate::SearchResult;

/// An event streamed by the backend while it answers a message.
///
/// The set is closed: anything the backend sends that doesn't map onto
/// one of these variants is dropped before it reaches the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The conversation got a (new) title.
    ChatTitle(String),
    /// The server assigned a durable id to the reply.
    MessageId(String),
    /// A fragment of reply text.
    MessageDelta(String),
    /// The assistant started searching for the given query.
    SearchQuery(String),
    /// The results of the search announced last.
    SearchResults(Vec<SearchResult>),
}

impl StreamEvent {
    /// Returns the wire name of the event.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::ChatTitle(_) => "chat_title",
            StreamEvent::MessageId(_) => "message_id",
            StreamEvent::MessageDelta(_) => "message_delta",
            StreamEvent::SearchQuery(_) => "search_query",
            StreamEvent::SearchResults(_) => "search_results",
        }
    }
}
