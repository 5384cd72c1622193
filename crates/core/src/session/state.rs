use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use alma_model::{
    ErrorKind, Message, MessageRequest, OutgoingMessage, StreamEvent,
};
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::builder::Observers;
use super::{SendOutcome, SessionSnapshot, SessionStage};
use crate::backend_client::{BackendClient, Stage, StreamFailure};
use crate::transcript::{Applied, Transcript};

#[derive(Debug)]
pub enum Command {
    Send {
        text: String,
        reply_tx: oneshot::Sender<SendOutcome>,
    },
    Cancel,
    Event {
        stream_id: u64,
        event: StreamEvent,
    },
    Ended {
        stream_id: u64,
        result: Result<(), StreamFailure>,
    },
}

struct PendingSend {
    text: String,
    reply_tx: oneshot::Sender<SendOutcome>,
}

struct ActiveStream {
    id: u64,
    input: String,
    /// Transcript length before the optimistic messages were added.
    rollback_len: usize,
    reply_tx: oneshot::Sender<SendOutcome>,
    task: JoinHandle<()>,
}

pub struct SessionState {
    pub(super) client: BackendClient,
    pub(super) chat_id: String,
    pub(super) transcript: Transcript,
    pub(super) read_timeout: Option<Duration>,
    pub(super) snapshot_tx: watch::Sender<SessionSnapshot>,
    pub(super) observers: Observers,
    active: Option<ActiveStream>,
    pending_sends: VecDeque<PendingSend>,
    next_stream_id: u64,
}

type CommandTx = WeakUnboundedSender<Command>;

impl SessionState {
    pub(super) fn new(
        client: BackendClient,
        chat_id: String,
        transcript: Transcript,
        read_timeout: Option<Duration>,
        observers: Observers,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot {
            transcript: Arc::new(transcript.clone()),
            stage: SessionStage::Idle,
        });
        Self {
            client,
            chat_id,
            transcript,
            read_timeout,
            snapshot_tx,
            observers,
            active: None,
            pending_sends: VecDeque::new(),
            next_stream_id: 1,
        }
    }

    pub(super) fn handle(&mut self, cmd: Command, cmd_tx: &CommandTx) {
        match cmd {
            Command::Send { text, reply_tx } => {
                self.enqueue_send(text, reply_tx, cmd_tx)
            }
            Command::Cancel => self.cancel(cmd_tx),
            Command::Event { stream_id, event } => {
                self.apply_event(stream_id, event)
            }
            Command::Ended { stream_id, result } => {
                self.end_stream(stream_id, result, cmd_tx)
            }
        }
    }

    pub(super) fn shut_down(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("abandoning stream {}", active.id);
            active.task.abort();
        }
        // Dropping the reply senders resolves the callers with an error.
        self.pending_sends.clear();
    }

    fn enqueue_send(
        &mut self,
        text: String,
        reply_tx: oneshot::Sender<SendOutcome>,
        cmd_tx: &CommandTx,
    ) {
        if self.active.is_some() {
            // Picked up again when the current stream ends.
            self.pending_sends.push_back(PendingSend { text, reply_tx });
            return;
        }
        self.start_stream(text, reply_tx, cmd_tx);
    }

    fn process_next_send(&mut self, cmd_tx: &CommandTx) {
        if self.active.is_some() {
            return;
        }
        if let Some(PendingSend { text, reply_tx }) =
            self.pending_sends.pop_front()
        {
            self.start_stream(text, reply_tx, cmd_tx);
        } else if let Some(on_idle) = &self.observers.on_idle {
            on_idle();
        }
    }

    /// Starts a stream, assuming no other stream is active.
    fn start_stream(
        &mut self,
        input: String,
        reply_tx: oneshot::Sender<SendOutcome>,
        cmd_tx: &CommandTx,
    ) {
        let rollback_len = self.transcript.len();
        let msg_id = Uuid::new_v4().to_string();
        self.transcript
            .push(Message::user(msg_id.clone(), input.clone()));
        self.transcript.push(Message::assistant_placeholder(
            Uuid::new_v4().to_string(),
        ));

        let stream_id = self.next_stream_id;
        self.next_stream_id += 1;

        let req = MessageRequest {
            chat_id: self.chat_id.clone(),
            message: OutgoingMessage::user(msg_id, input.clone()),
        };
        let client = self.client.clone();
        let read_timeout = self.read_timeout;
        let cmd_tx = cmd_tx.clone();
        let task = tokio::spawn(
            async move {
                let on_event = {
                    let cmd_tx = cmd_tx.clone();
                    move |event| {
                        let Some(cmd_tx) = cmd_tx.upgrade() else {
                            return;
                        };
                        cmd_tx.send(Command::Event { stream_id, event }).ok();
                    }
                };
                let result =
                    client.stream_reply(req, read_timeout, on_event).await;
                if let Some(cmd_tx) = cmd_tx.upgrade() {
                    cmd_tx.send(Command::Ended { stream_id, result }).ok();
                }
            }
            .instrument(trace_span!("stream", id = stream_id)),
        );
        debug!("started stream {stream_id}");

        self.active = Some(ActiveStream {
            id: stream_id,
            input,
            rollback_len,
            reply_tx,
            task,
        });
        self.publish();
    }

    fn apply_event(&mut self, stream_id: u64, event: StreamEvent) {
        if !self.is_active(stream_id) {
            trace!("dropping event of stale stream {stream_id}");
            return;
        }

        let name = event.name();
        match self.transcript.apply(event) {
            Ok(Applied::Title) => {
                if let (Some(on_title), Some(title)) =
                    (&self.observers.on_title, self.transcript.title())
                {
                    on_title(title);
                }
            }
            Ok(Applied::Messages) => {}
            Err(err) => {
                warn!("skipping `{name}`: {err}");
                return;
            }
        }
        self.publish();
    }

    fn end_stream(
        &mut self,
        stream_id: u64,
        result: Result<(), StreamFailure>,
        cmd_tx: &CommandTx,
    ) {
        let Some(active) = self.active.take_if(|a| a.id == stream_id) else {
            trace!("stale stream {stream_id} ended");
            return;
        };

        let outcome = match result {
            Ok(()) => {
                debug!("stream {stream_id} finished");
                self.transcript.finish_streaming();
                SendOutcome::Succeeded
            }
            Err(StreamFailure {
                stage: Stage::Sending,
                error,
            }) => {
                error!("failed to send message: {error}");
                self.transcript.truncate(active.rollback_len);
                if error.kind() == ErrorKind::RateLimited {
                    SendOutcome::RateLimited {
                        input: active.input,
                        rate_limit: error.rate_limit().cloned(),
                    }
                } else {
                    SendOutcome::Failed {
                        input: active.input,
                        error,
                    }
                }
            }
            Err(StreamFailure {
                stage: Stage::Streaming,
                error,
            }) => {
                error!("stream {stream_id} interrupted: {error}");
                self.transcript.finish_streaming();
                SendOutcome::Interrupted { error }
            }
        };

        self.publish();
        active.reply_tx.send(outcome).ok();
        self.process_next_send(cmd_tx);
    }

    fn cancel(&mut self, cmd_tx: &CommandTx) {
        let Some(active) = self.active.take() else {
            debug!("nothing to cancel");
            return;
        };
        debug!("cancelling stream {}", active.id);

        // Events the task already queued are dropped as stale.
        active.task.abort();
        self.transcript.finish_streaming();
        self.publish();
        active.reply_tx.send(SendOutcome::Cancelled).ok();
        self.process_next_send(cmd_tx);
    }

    #[inline]
    fn is_active(&self, stream_id: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == stream_id)
    }

    fn publish(&self) {
        let stage = if self.active.is_some() {
            SessionStage::Streaming
        } else {
            SessionStage::Idle
        };
        self.snapshot_tx.send_replace(SessionSnapshot {
            transcript: Arc::new(self.transcript.clone()),
            stage,
        });
        if let Some(on_update) = &self.observers.on_update {
            on_update(&self.transcript);
        }
    }
}
