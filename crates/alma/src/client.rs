use alma_core::{SessionBuilder, Transcript};
use alma_http::{HttpBackend, HttpConfigBuilder};

use crate::Config;

/// Entry point for opening chats against the assistant's HTTP API.
#[derive(Clone, Debug)]
pub struct Client {
    backend: HttpBackend,
    config: Config,
}

impl Client {
    /// Creates a client from the given configuration.
    pub fn new(config: Config) -> Self {
        let mut http_config = HttpConfigBuilder::with_base_url(&config.base_url);
        if let Some(token) = &config.token {
            http_config = http_config.with_token(token);
        }
        Self {
            backend: HttpBackend::new(http_config.build()),
            config,
        }
    }

    /// Returns the underlying backend.
    #[inline]
    pub fn backend(&self) -> &HttpBackend {
        &self.backend
    }

    /// Prepares a session for the configured chat, loading what the
    /// server already has of it.
    ///
    /// Without a configured chat id, or if the server doesn't know the
    /// chat, the session starts with an empty transcript.
    pub async fn open_chat(&self) -> Result<SessionBuilder, alma_http::Error> {
        let builder = SessionBuilder::with_backend(self.backend.clone());
        let builder = match self.config.read_timeout {
            Some(read_timeout) => builder.with_read_timeout(read_timeout),
            None => builder.without_read_timeout(),
        };

        let Some(chat_id) = &self.config.chat_id else {
            return Ok(builder);
        };
        let builder = builder.with_chat_id(chat_id);
        match self.backend.fetch_chat(chat_id).await? {
            Some(chat) => {
                debug!(
                    "loaded chat {chat_id} with {} messages",
                    chat.messages.len()
                );
                let history = Transcript::with_history(chat.title, chat.messages);
                Ok(builder.with_history(history))
            }
            None => {
                debug!("chat {chat_id} doesn't exist yet");
                Ok(builder)
            }
        }
    }
}
