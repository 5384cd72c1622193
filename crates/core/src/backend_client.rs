use std::error::Error;
use std::fmt::{self, Display};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use alma_model::{
    BackendError, ChatBackend, ErrorKind, EventStream, MessageRequest,
    StreamEvent,
};
use tokio::time::timeout;
use tracing::Instrument;

type StreamResult = Result<(), StreamFailure>;
type BoxedStreamFuture = Pin<Box<dyn Future<Output = StreamResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(
        MessageRequest,
        Option<Duration>,
        Box<dyn Fn(StreamEvent) + Send + 'static>,
    ) -> BoxedStreamFuture + Send + Sync
>;

/// A wrapper around a chat backend that provides a type-erased interface
/// for the session.
#[derive(Clone)]
pub struct BackendClient {
    handler_fn: HandlerFn,
}

impl BackendClient {
    #[inline]
    pub fn new<B: ChatBackend + 'static>(backend: B) -> Self {
        let handler_fn: HandlerFn =
            Arc::new(move |req, read_timeout, on_event| {
                let fut = backend.send_message(&req);
                Box::pin(
                    async move {
                        trace!("sending: {req:?}");
                        let stream = with_timeout(read_timeout, fut)
                            .await
                            .map_err(|error| StreamFailure {
                                stage: Stage::Sending,
                                error,
                            })?;
                        read_events::<B>(stream, read_timeout, on_event)
                            .await
                            .map_err(|error| StreamFailure {
                                stage: Stage::Streaming,
                                error,
                            })
                    }
                    .instrument(trace_span!("backend req")),
                )
            });
        Self { handler_fn }
    }

    /// Sends a message and forwards every event of the reply to
    /// `on_event`, returning once the reply has ended.
    ///
    /// `read_timeout` bounds the wait for the response and for each
    /// event after it.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. No further events are forwarded once
    /// the returned future is dropped.
    #[inline]
    pub async fn stream_reply(
        &self,
        req: MessageRequest,
        read_timeout: Option<Duration>,
        on_event: impl Fn(StreamEvent) + Send + 'static,
    ) -> Result<(), StreamFailure> {
        (self.handler_fn)(req, read_timeout, Box::new(on_event)).await
    }
}

/// Where a reply failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Before any part of the reply was received.
    Sending,
    /// While reading the reply.
    Streaming,
}

/// A failed reply.
#[derive(Debug)]
pub struct StreamFailure {
    pub stage: Stage,
    pub error: Box<dyn BackendError>,
}

/// The backend went quiet for longer than the read timeout.
#[derive(Debug)]
pub struct TimeoutError(Duration);

impl Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no data received for {:?}", self.0)
    }
}

impl Error for TimeoutError {}

impl BackendError for TimeoutError {
    #[inline]
    fn kind(&self) -> ErrorKind {
        ErrorKind::TimedOut
    }
}

async fn with_timeout<T, E: BackendError>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, Box<dyn BackendError>> {
    let Some(limit) = limit else {
        return fut
            .await
            .map_err(|err| Box::new(err) as Box<dyn BackendError>);
    };
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Box::new(err)),
        Err(_) => Err(Box::new(TimeoutError(limit))),
    }
}

async fn read_events<B: ChatBackend + 'static>(
    stream: B::Stream,
    read_timeout: Option<Duration>,
    on_event: Box<dyn Fn(StreamEvent) + Send + 'static>,
) -> Result<(), Box<dyn BackendError>> {
    trace!("start receiving events");

    let mut pinned_stream = pin!(stream);
    loop {
        let next = poll_fn(|cx| pinned_stream.as_mut().poll_next_event(cx));
        // The session logs the failure.
        let event = with_timeout(read_timeout, next).await?;

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");
        on_event(event);
    }

    trace!("finished a reply");
    Ok(())
}
