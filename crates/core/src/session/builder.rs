use std::time::Duration;

use alma_model::ChatBackend;
use uuid::Uuid;

use super::Session;
use super::state::SessionState;
use crate::backend_client::BackendClient;
use crate::transcript::Transcript;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
pub(crate) struct Observers {
    pub(crate) on_update: Option<Box<dyn Fn(&Transcript) + Send + Sync>>,
    pub(crate) on_title: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub(crate) on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

/// [`Session`] builder.
pub struct SessionBuilder {
    client: BackendClient,
    chat_id: Option<String>,
    history: Transcript,
    read_timeout: Option<Duration>,
    observers: Observers,
}

impl SessionBuilder {
    /// Creates a new builder with the specified backend.
    #[inline]
    pub fn with_backend<B: ChatBackend + 'static>(backend: B) -> Self {
        Self {
            client: BackendClient::new(backend),
            chat_id: None,
            history: Transcript::new(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            observers: Observers::default(),
        }
    }

    /// Continues the chat with the given id. A new chat with a random id
    /// is started otherwise.
    #[inline]
    pub fn with_chat_id<S: Into<String>>(mut self, chat_id: S) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Starts from a transcript that already has messages in it.
    #[inline]
    pub fn with_history(mut self, history: Transcript) -> Self {
        self.history = history;
        self
    }

    /// Sets how long to wait for the response, and then for each event of
    /// it, before giving up. Defaults to 60 seconds.
    #[inline]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    /// Waits for the backend forever.
    #[inline]
    pub fn without_read_timeout(mut self) -> Self {
        self.read_timeout = None;
        self
    }

    /// Attaches a callback to be invoked every time the transcript
    /// changes.
    #[inline]
    pub fn on_update(
        mut self,
        on_update: impl Fn(&Transcript) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_update = Some(Box::new(on_update));
        self
    }

    /// Attaches a callback to be invoked when the chat gets a new title.
    #[inline]
    pub fn on_title(
        mut self,
        on_title: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_title = Some(Box::new(on_title));
        self
    }

    /// Attaches a callback to be invoked when the session is idle.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds the session.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[inline]
    pub fn build(self) -> Session {
        let chat_id = self
            .chat_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let state = SessionState::new(
            self.client,
            chat_id,
            self.history,
            self.read_timeout,
            self.observers,
        );
        Session::spawn(state)
    }
}
