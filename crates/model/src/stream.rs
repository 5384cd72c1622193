use std::pin::Pin;
use std::task::{self, Poll};

use crate::backend::BackendError;
use crate::event::StreamEvent;

/// The reply to a posted message, delivered as a sequence of events.
pub trait EventStream: Sized + Send + 'static {
    /// The error type that may be returned by the stream.
    type Error: BackendError;

    /// Attempts to pull out the next event from the reply.
    ///
    /// # Return value
    ///
    /// - `Poll::Pending` means that the stream is still waiting for
    ///   data. Implementations will ensure that the current task will be
    ///   notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the stream has an event to
    ///   deliver, and may produce further events on subsequent calls.
    /// - `Poll::Ready(Ok(None))` means the reply has completed.
    /// - `Poll::Ready(Err(error))` means the stream broke off. Events
    ///   delivered before stay valid.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>>;
}
