//! A scripted in-memory chat backend for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use alma_model::{
    BackendError, ChatBackend, ErrorKind, EventStream, MessageRequest,
    RateLimit, StreamEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
    rate_limit: Option<RateLimit>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn rate_limit(&self) -> Option<&RateLimit> {
        self.rate_limit.as_ref()
    }
}

pub struct TestEventStream {
    reply: PresetReply,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EventStream for TestEventStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>> {
        let this = self.get_mut();

        let Some(pause) = &mut this.sleep else {
            this.sleep = Some(Box::pin(sleep(this.delay)));
            return Pin::new(this).poll_next_event(cx);
        };
        ready!(pause.as_mut().poll(cx));

        if let Some(event) = this.reply.events.get(this.event_idx) {
            this.event_idx += 1;
            this.sleep = None;
            return Poll::Ready(Ok(Some(event.clone())));
        }
        if this.reply.stall {
            // Never woken up again, just like a server that stopped
            // sending without closing the connection.
            return Poll::Pending;
        }
        if let Some(kind) = this.reply.interruption.take() {
            return Poll::Ready(Err(Error {
                message: "stream interrupted",
                kind,
                rate_limit: None,
            }));
        }
        Poll::Ready(Ok(None))
    }
}

/// A local fake backend for testing purpose.
///
/// Before sending messages, queue up how the backend should reply. Each
/// message consumes the next [`PresetReply`] in order. If the queue is
/// empty, the message is refused.
///
/// Clones share the queue and the request log, so a test can keep one
/// clone to inspect what a session sent through another.
#[derive(Clone, Default)]
pub struct TestBackend {
    replies: Arc<Mutex<VecDeque<PresetReply>>>,
    requests: Arc<Mutex<Vec<MessageRequest>>>,
    delay: Option<Duration>,
}

impl TestBackend {
    #[inline]
    pub fn add_reply(&mut self, reply: PresetReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Sets the pause before each event. Defaults to one millisecond.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<MessageRequest> {
        lock(&self.requests).clone()
    }
}

impl Debug for TestBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestBackend")
            .field("pending_replies", &lock(&self.replies).len())
            .field("delay", &self.delay)
            .finish()
    }
}

impl ChatBackend for TestBackend {
    type Error = crate::Error;
    type Stream = TestEventStream;

    fn send_message(
        &self,
        req: &MessageRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        lock(&self.requests).push(req.clone());

        let result = match lock(&self.replies).pop_front() {
            None => Err(Error {
                message: "no more preset replies",
                kind: ErrorKind::Other,
                rate_limit: None,
            }),
            Some(PresetReply {
                rejection: Some(kind),
                rate_limit,
                ..
            }) => Err(Error {
                message: "message rejected",
                kind,
                rate_limit,
            }),
            Some(reply) => Ok(TestEventStream {
                reply,
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}

// A panicking test must not poison the script for the others.
#[inline]
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use alma_model::{OutgoingMessage, SearchResult};

    use super::*;

    fn request(content: &str) -> MessageRequest {
        MessageRequest {
            chat_id: "chat".to_owned(),
            message: OutgoingMessage::user("u1", content),
        }
    }

    async fn collect_events(
        stream: TestEventStream,
    ) -> (Vec<StreamEvent>, Option<Error>) {
        let mut stream = pin!(stream);
        let mut events = vec![];
        loop {
            match poll_fn(|cx| stream.as_mut().poll_next_event(cx)).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return (events, None),
                Err(err) => return (events, Some(err)),
            }
        }
    }

    #[tokio::test]
    async fn test_replies_in_order() {
        let mut backend = TestBackend::default();
        backend.add_reply(PresetReply::with_events([
            StreamEvent::MessageId("a1".to_owned()),
            StreamEvent::SearchQuery("Art. 1 ZGB".to_owned()),
            StreamEvent::SearchResults(vec![SearchResult {
                id: "1".to_owned(),
                title: "ZGB 1".to_owned(),
                url: "u".to_owned(),
            }]),
        ]));
        backend.add_reply(
            PresetReply::with_events([StreamEvent::MessageDelta(
                "partial".to_owned(),
            )])
            .interrupted(ErrorKind::Transport),
        );

        let stream = backend.send_message(&request("first")).await.unwrap();
        let (events, err) = collect_events(stream).await;
        assert_eq!(events.len(), 3);
        assert!(err.is_none());

        let stream = backend.send_message(&request("second")).await.unwrap();
        let (events, err) = collect_events(stream).await;
        assert_eq!(events, vec![StreamEvent::MessageDelta("partial".to_owned())]);
        assert_eq!(err.unwrap().kind(), ErrorKind::Transport);

        let err = backend.send_message(&request("third")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);

        let contents: Vec<_> = backend
            .requests()
            .into_iter()
            .map(|req| req.message.content)
            .collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_rejection() {
        let mut backend = TestBackend::default();
        backend.add_reply(PresetReply::rejected(ErrorKind::RateLimited));
        let err = backend.send_message(&request("hi")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }
}
