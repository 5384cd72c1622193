use serde::{Deserialize, Serialize};

use crate::Role;

/// A request to post a user message into a chat.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageRequest {
    /// The conversation the message belongs to.
    pub chat_id: String,
    /// The message itself.
    pub message: OutgoingMessage,
}

/// The user message as the backend expects it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Client-generated id of the message.
    pub id: String,
    /// Always [`Role::User`].
    pub role: Role,
    /// The text the user typed.
    pub content: String,
}

impl OutgoingMessage {
    /// Creates a user message.
    #[inline]
    pub fn user<ID: Into<String>, S: Into<String>>(id: ID, content: S) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
        }
    }
}
