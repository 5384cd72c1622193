use std::pin::Pin;
use std::task::{Context, Poll, ready};

use alma_model::{ErrorKind, EventStream, StreamEvent};
use pin_project_lite::pin_project;

use crate::Error;
use crate::decode::decode;
use crate::io::Sse;

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<StreamEvent>, Sse), Error>;

pin_project! {
    /// The event stream of a reply, read from an HTTP response body.
    pub struct HttpEventStream {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl HttpEventStream {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let next_event_fut = async move { next_event(sse).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl EventStream for HttpEventStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, sse) = match ready!(next_event_fut.as_mut().poll(cx)) {
            Ok((Some(event), sse)) => (event, sse),
            Ok((None, _)) => {
                *this.next_event_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_event_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        // The body may still have more data to pull, create a new future
        // for the next event.
        let next_event_fut = async move { next_event(sse).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut sse: Sse) -> NextEvent {
    loop {
        let frame = match sse.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok((None, sse)),
            Err(err) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Transport));
            }
        };
        trace!("got sse frame: {}", frame.name);

        match decode(&frame) {
            Ok(Some(event)) => return Ok((Some(event), sse)),
            Ok(None) => debug!("ignoring unknown event: {}", frame.name),
            Err(err) => warn!("skipping event: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use alma_model::{BackendError, SearchResult};
    use bytes::Bytes;

    use super::*;
    use crate::io::Chunks;

    async fn collect(
        chunks: Chunks,
    ) -> (Vec<StreamEvent>, Option<crate::Error>) {
        let mut stream = pin!(HttpEventStream::from_sse(Sse::new(chunks)));
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
    async fn test_reply_events() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(
                    b"event: message_id\ndata: \"m1\"\n\nevent: sea",
                ),
                Bytes::from_static(b"rch_query\ndata: \"foo\"\n\n"),
                Bytes::from_static(concat!(
                    "event: search_results\n",
                    "data: [{\"id\":\"1\",\"title\":\"T\",\"url\":\"u\"}]\n\n",
                    "event: message_delta\ndata: \"Hi\"\n\n",
                    "event: chat_title\ndata: \"Greeting\"\n\n",
                ).as_bytes()),
            ]
            .into(),
        );
        let (events, err) = collect(chunks).await;
        assert!(err.is_none());
        assert_eq!(
            events,
            vec![
                StreamEvent::MessageId("m1".to_owned()),
                StreamEvent::SearchQuery("foo".to_owned()),
                StreamEvent::SearchResults(vec![SearchResult {
                    id: "1".to_owned(),
                    title: "T".to_owned(),
                    url: "u".to_owned(),
                }]),
                StreamEvent::MessageDelta("Hi".to_owned()),
                StreamEvent::ChatTitle("Greeting".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_skips_unknown_and_malformed() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(concat!(
                "event: unknown_thing\ndata: \"x\"\n\n",
                "event: message_delta\ndata: not json\n\n",
                "data: \"no name\"\n\n",
                "event: message_delta\ndata: \"ok\"\n\n",
            ).as_bytes())]
            .into(),
        );
        let (events, err) = collect(chunks).await;
        assert!(err.is_none());
        assert_eq!(events, vec![StreamEvent::MessageDelta("ok".to_owned())]);
    }

    #[tokio::test]
    async fn test_broken_body() {
        let chunks = Chunks::broken_after(
            vec![Bytes::from_static(b"event: message_delta\ndata: \"a\"\n\n")]
                .into(),
        );
        let (events, err) = collect(chunks).await;
        assert_eq!(events, vec![StreamEvent::MessageDelta("a".to_owned())]);
        assert_eq!(err.unwrap().kind(), ErrorKind::Transport);
    }
}
