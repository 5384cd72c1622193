use std::error::Error;

use crate::error::{ErrorKind, RateLimit};
use crate::request::MessageRequest;
use crate::stream::EventStream;

/// The error type for a chat backend.
pub trait BackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;

    /// Returns what the backend said about the sender's quota when it
    /// refused a message for rate limiting.
    #[inline]
    fn rate_limit(&self) -> Option<&RateLimit> {
        None
    }
}

/// A type that represents the server side of a chat: it accepts user
/// messages and streams the reply back.
///
/// Once the backend is created, it should behave like a stateless
/// object. It can still have internal state, but callers should not rely
/// on it, and the backend should be prepared for being dropped anytime.
pub trait ChatBackend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// The reply stream type for this backend.
    type Stream: EventStream<Error = Self::Error>;

    /// Posts a user message.
    ///
    /// The returned future resolves as soon as the backend has accepted
    /// the message (for HTTP, once response headers arrived). A refusal,
    /// such as a rate limit, is reported here and never as a stream
    /// event.
    fn send_message(
        &self,
        req: &MessageRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;
}
