use alma_model::{ContentBlock, Message, MessageState, Role};
use serde::Deserialize;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChatDetail {
    pub id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageDetail>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageDetail {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_blocks: Vec<ContentBlock>,
}

/// Body of a 429 response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RateLimitBody {
    pub message: Option<String>,
    pub detail: Option<String>,
}

// -----------
// Conversions
// -----------

/// A conversation as stored by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chat {
    /// Id of the conversation.
    pub id: String,
    /// Title, if the server has generated one yet.
    pub title: Option<String>,
    /// Messages in order.
    pub messages: Vec<Message>,
}

impl From<ChatDetail> for Chat {
    fn from(detail: ChatDetail) -> Self {
        Chat {
            id: detail.id,
            title: detail.title,
            messages: detail.messages.into_iter().map(create_message).collect(),
        }
    }
}

#[inline]
fn create_message(detail: MessageDetail) -> Message {
    // User messages are stored with plain content only.
    let content_blocks =
        if detail.content_blocks.is_empty() && !detail.content.is_empty() {
            vec![ContentBlock::Text {
                text: detail.content,
            }]
        } else {
            detail.content_blocks
        };
    Message {
        id: detail.id,
        role: detail.role,
        content_blocks,
        provisional: false,
        state: MessageState::Idle,
    }
}
