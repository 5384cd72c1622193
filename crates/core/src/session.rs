mod builder;
mod state;

use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use alma_model::{BackendError, RateLimit};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::transcript::Transcript;
pub use builder::SessionBuilder;
use state::{Command, SessionState};

/// A conversation with the assistant.
///
/// The session owns the transcript of one chat and is the only thing that
/// ever changes it. It runs as a background task, and `Session` is a
/// cheap handle to it: clones talk to the same task.
///
/// Only one reply is streamed at a time. Messages sent while a reply is
/// streaming are queued and sent in order once the session becomes idle.
/// The task stops when the last handle is dropped, abandoning any reply
/// that is still streaming.
#[derive(Clone)]
pub struct Session {
    chat_id: Arc<str>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl Session {
    /// Returns the id of the chat this session talks to.
    #[inline]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Sends a user message and waits for the reply to end.
    ///
    /// The message is submitted when this method is called, not when the
    /// returned future is first polled, so calling it twice in a row
    /// queues both messages in that order. Dropping the future does not
    /// cancel the reply, use [`Session::cancel`] for that.
    pub fn send_message<S: Into<String>>(
        &self,
        text: S,
    ) -> impl Future<Output = Result<SendOutcome, SessionClosedError>>
    + Send
    + 'static {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.cmd_tx.send(Command::Send {
            text: text.into(),
            reply_tx,
        });
        async move {
            sent.map_err(|_| SessionClosedError)?;
            reply_rx.await.map_err(|_| SessionClosedError)
        }
    }

    /// Stops streaming the current reply, if any.
    ///
    /// Whatever arrived so far stays in the transcript, and the pending
    /// [`Session::send_message`] call resolves to
    /// [`SendOutcome::Cancelled`]. Queued messages are not affected.
    #[inline]
    pub fn cancel(&self) -> Result<(), SessionClosedError> {
        self.cmd_tx
            .send(Command::Cancel)
            .map_err(|_| SessionClosedError)
    }

    /// Returns the latest published snapshot.
    #[inline]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Returns a receiver that is notified every time the transcript or
    /// the session stage changes.
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    fn spawn(state: SessionState) -> Self {
        let chat_id: Arc<str> = Arc::from(state.chat_id.as_str());
        let snapshot_rx = state.snapshot_tx.subscribe();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(
            run_session(state, cmd_rx, cmd_tx.downgrade())
                .instrument(trace_span!("session", chat_id = %chat_id)),
        );
        Self {
            chat_id,
            cmd_tx,
            snapshot_rx,
        }
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

async fn run_session(
    mut state: SessionState,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
) {
    debug!("started");
    while let Some(cmd) = cmd_rx.recv().await {
        trace!("received command: {cmd:?}");
        state.handle(cmd, &cmd_tx);
    }
    state.shut_down();
    debug!("will terminate");
}

/// What a session looked like at some point.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    /// The transcript, including a reply that is still streaming.
    pub transcript: Arc<Transcript>,
    /// Whether a reply is streaming.
    pub stage: SessionStage,
}

/// Whether a session is streaming a reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStage {
    /// Nothing in flight.
    #[default]
    Idle,
    /// A reply is being received.
    Streaming,
}

/// How a sent message ended.
#[derive(Debug)]
pub enum SendOutcome {
    /// The reply was received in full.
    Succeeded,
    /// The backend refused the message because of rate limiting. The
    /// message was removed from the transcript.
    RateLimited {
        /// The text that was sent, so that it can be offered again.
        input: String,
        /// The quota the backend reported, if any.
        rate_limit: Option<RateLimit>,
    },
    /// The message could not be sent. It was removed from the transcript.
    Failed {
        /// The text that was sent, so that it can be offered again.
        input: String,
        /// Why sending failed.
        error: Box<dyn BackendError>,
    },
    /// The reply broke off midway. The part received so far is kept.
    Interrupted {
        /// Why the reply broke off.
        error: Box<dyn BackendError>,
    },
    /// The reply was cancelled with [`Session::cancel`].
    Cancelled,
}

impl SendOutcome {
    /// Returns the text of a message that was taken back out of the
    /// transcript.
    #[inline]
    pub fn returned_input(&self) -> Option<&str> {
        match self {
            SendOutcome::RateLimited { input, .. }
            | SendOutcome::Failed { input, .. } => Some(input),
            _ => None,
        }
    }
}

/// The session task has stopped.
pub struct SessionClosedError;

impl Debug for SessionClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClosedError").finish()
    }
}

impl Display for SessionClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the session has been closed")
    }
}

impl Error for SessionClosedError {}
