use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing into the chat.
    User,
    /// The legal assistant answering.
    Assistant,
}

/// Whether a message is still receiving content.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    /// The reply is being streamed into this message.
    Streaming,
    /// No more content is expected.
    #[default]
    Idle,
}

/// An entry in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, unique within the conversation.
    pub id: String,
    /// Author of the message. Never changes after creation.
    pub role: Role,
    /// Ordered content. Only the last block may still grow.
    pub content_blocks: Vec<ContentBlock>,
    /// Set while `id` is a client-side placeholder that the server has
    /// not replaced yet.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub provisional: bool,
    /// Streaming state of the message.
    #[serde(default)]
    pub state: MessageState,
}

impl Message {
    /// Creates a user message holding a single text block.
    #[inline]
    pub fn user<ID: Into<String>, S: Into<String>>(id: ID, text: S) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content_blocks: vec![ContentBlock::Text { text: text.into() }],
            provisional: false,
            state: MessageState::Idle,
        }
    }

    /// Creates an empty assistant message that is about to be streamed
    /// into.
    #[inline]
    pub fn assistant<ID: Into<String>>(id: ID) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content_blocks: vec![],
            provisional: false,
            state: MessageState::Streaming,
        }
    }

    /// Creates an assistant message whose id is a local placeholder.
    #[inline]
    pub fn assistant_placeholder<ID: Into<String>>(id: ID) -> Self {
        Self {
            provisional: true,
            ..Self::assistant(id)
        }
    }

    /// Concatenates the text of all text blocks.
    pub fn text(&self) -> String {
        self.content_blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Search { .. } => None,
            })
            .collect()
    }
}

/// A typed, ordered unit of message content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// A text fragment, growing as deltas arrive.
    Text {
        /// The accumulated text.
        text: String,
    },
    /// A search the assistant ran while answering.
    Search {
        /// The query that was searched for.
        query: String,
        /// Whether results have arrived yet.
        status: SearchStatus,
        /// The results. Empty until `status` is completed.
        results: Vec<SearchResult>,
    },
}

impl ContentBlock {
    /// Creates a search block that is still waiting for results.
    #[inline]
    pub fn pending_search<S: Into<String>>(query: S) -> Self {
        ContentBlock::Search {
            query: query.into(),
            status: SearchStatus::Pending,
            results: vec![],
        }
    }
}

/// Progress of a search block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchStatus {
    /// The query was announced, results have not arrived.
    #[serde(rename = "in_progress")]
    Pending,
    /// Results have arrived.
    #[serde(rename = "completed")]
    Completed,
}

/// A single document found by a search.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identifier of the document.
    pub id: String,
    /// Human readable title.
    pub title: String,
    /// Where the document can be read.
    pub url: String,
}
