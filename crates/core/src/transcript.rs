//! Conversation state and the reducer that folds stream events into it.

use std::error::Error;
use std::fmt::{self, Display};
use std::sync::Arc;

use alma_model::{
    ContentBlock, Message, MessageState, Role, SearchStatus, StreamEvent,
};

/// The visible history of one conversation.
///
/// Messages are shared between clones, and a change copies only the
/// message it touches. Keeping a clone per published snapshot is cheap.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Transcript {
    title: Option<String>,
    messages: Vec<Arc<Message>>,
}

/// What part of the transcript an event changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The conversation was renamed.
    Title,
    /// A message was added or extended.
    Messages,
}

/// An event that doesn't fit the current shape of the transcript.
///
/// The transcript is left untouched when this is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReduceError {
    /// The event extends a reply, but the last message is not one.
    NoOpenReply(&'static str),
    /// Search results arrived but the last block is not a search.
    NoOpenSearch,
    /// Search results arrived for a search that already has them.
    SearchAlreadyCompleted,
}

impl Display for ReduceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReduceError::NoOpenReply(name) => {
                write!(f, "`{name}` without an assistant message to extend")
            }
            ReduceError::NoOpenSearch => {
                write!(f, "search results without a pending search")
            }
            ReduceError::SearchAlreadyCompleted => {
                write!(f, "search results for a completed search")
            }
        }
    }
}

impl Error for ReduceError {}

impl Transcript {
    /// Creates an empty transcript.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transcript from existing history.
    #[inline]
    pub fn with_history(title: Option<String>, messages: Vec<Message>) -> Self {
        Self {
            title,
            messages: messages.into_iter().map(Arc::new).collect(),
        }
    }

    /// Returns the conversation title, if known.
    #[inline]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Returns the messages in order.
    #[inline]
    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    /// Applies one event.
    ///
    /// Events only ever touch the tail of the transcript: the last
    /// message, and within it the last content block.
    pub fn apply(&mut self, event: StreamEvent) -> Result<Applied, ReduceError> {
        match event {
            StreamEvent::ChatTitle(title) => {
                self.title = Some(title);
                return Ok(Applied::Title);
            }
            StreamEvent::MessageId(id) => match self.messages.last_mut() {
                Some(msg) if msg.role == Role::Assistant && msg.provisional => {
                    let msg = Arc::make_mut(msg);
                    msg.id = id;
                    msg.provisional = false;
                }
                _ => self.messages.push(Arc::new(Message::assistant(id))),
            },
            StreamEvent::MessageDelta(delta) => {
                let blocks = self.open_reply("message_delta")?;
                match blocks.last_mut() {
                    Some(ContentBlock::Text { text }) => text.push_str(&delta),
                    _ => blocks.push(ContentBlock::Text { text: delta }),
                }
            }
            StreamEvent::SearchQuery(query) => {
                let blocks = self.open_reply("search_query")?;
                blocks.push(ContentBlock::pending_search(query));
            }
            StreamEvent::SearchResults(new_results) => {
                let blocks = self.open_reply("search_results")?;
                let Some(ContentBlock::Search {
                    status, results, ..
                }) = blocks.last_mut()
                else {
                    return Err(ReduceError::NoOpenSearch);
                };
                if *status == SearchStatus::Completed {
                    return Err(ReduceError::SearchAlreadyCompleted);
                }
                *status = SearchStatus::Completed;
                *results = new_results;
            }
        }
        Ok(Applied::Messages)
    }

    /// Applies events in order, skipping the ones that don't fit.
    pub fn fold<I>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = StreamEvent>,
    {
        for event in events {
            let name = event.name();
            if let Err(err) = self.apply(event) {
                warn!("skipping `{name}`: {err}");
            }
        }
        self
    }

    #[inline]
    pub(crate) fn push(&mut self, msg: Message) {
        self.messages.push(Arc::new(msg));
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    /// Drops every message after the first `len`.
    #[inline]
    pub(crate) fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Marks every streaming message as idle.
    pub(crate) fn finish_streaming(&mut self) {
        self.messages
            .iter_mut()
            .filter(|msg| msg.state == MessageState::Streaming)
            .for_each(|msg| Arc::make_mut(msg).state = MessageState::Idle);
    }

    fn open_reply(
        &mut self,
        name: &'static str,
    ) -> Result<&mut Vec<ContentBlock>, ReduceError> {
        match self.messages.last_mut() {
            Some(msg) if msg.role == Role::Assistant => {
                Ok(&mut Arc::make_mut(msg).content_blocks)
            }
            _ => Err(ReduceError::NoOpenReply(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use alma_model::SearchResult;

    use super::*;

    fn result(id: &str) -> SearchResult {
        SearchResult {
            id: id.to_owned(),
            title: format!("Title {id}"),
            url: format!("https://example.com/{id}"),
        }
    }

    fn text(s: &str) -> ContentBlock {
        ContentBlock::Text { text: s.to_owned() }
    }

    fn sample_events() -> Vec<StreamEvent> {
        vec![
            StreamEvent::MessageId("a".to_owned()),
            StreamEvent::SearchQuery("foo".to_owned()),
            StreamEvent::SearchResults(vec![result("1"), result("2")]),
            StreamEvent::MessageDelta("Hello ".to_owned()),
            StreamEvent::ChatTitle("Greeting".to_owned()),
            StreamEvent::MessageDelta("world".to_owned()),
            StreamEvent::SearchQuery("bar".to_owned()),
            StreamEvent::SearchResults(vec![]),
            StreamEvent::MessageDelta("!".to_owned()),
        ]
    }

    #[test]
    fn test_text_delta_accumulation() {
        let transcript = Transcript::new().fold([
            StreamEvent::MessageId("a".to_owned()),
            StreamEvent::MessageDelta("Hello ".to_owned()),
            StreamEvent::MessageDelta("world".to_owned()),
        ]);
        let [msg] = transcript.messages() else {
            panic!("expected one message: {transcript:?}");
        };
        assert_eq!(msg.id, "a");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content_blocks, vec![text("Hello world")]);
    }

    #[test]
    fn test_search_block_lifecycle() {
        let mut transcript =
            Transcript::new().fold([StreamEvent::MessageId("a".to_owned())]);

        transcript
            .apply(StreamEvent::SearchQuery("foo".to_owned()))
            .unwrap();
        assert_eq!(
            transcript.messages()[0].content_blocks,
            vec![ContentBlock::Search {
                query: "foo".to_owned(),
                status: SearchStatus::Pending,
                results: vec![],
            }]
        );

        transcript
            .apply(StreamEvent::SearchResults(vec![result("1")]))
            .unwrap();
        assert_eq!(
            transcript.messages()[0].content_blocks,
            vec![ContentBlock::Search {
                query: "foo".to_owned(),
                status: SearchStatus::Completed,
                results: vec![result("1")],
            }]
        );
    }

    #[test]
    fn test_blocks_interleave_in_arrival_order() {
        let transcript = Transcript::new().fold(sample_events());
        let blocks = &transcript.messages()[0].content_blocks;
        assert_eq!(blocks.len(), 4);
        assert!(matches!(&blocks[0], ContentBlock::Search { query, .. } if query == "foo"));
        assert_eq!(blocks[1], text("Hello world"));
        assert!(matches!(&blocks[2], ContentBlock::Search { query, .. } if query == "bar"));
        assert_eq!(blocks[3], text("!"));
        assert_eq!(transcript.title(), Some("Greeting"));
    }

    #[test]
    fn test_incremental_equals_batch() {
        let events = sample_events();
        let batch = Transcript::new().fold(events.clone());

        let mut incremental = Transcript::new();
        for event in events {
            incremental.apply(event).unwrap();
        }
        assert_eq!(incremental, batch);

        // Any prefix folded one by one matches the batch fold of it.
        for n in 0..sample_events().len() {
            let prefix: Vec<_> = sample_events().into_iter().take(n).collect();
            let mut step = Transcript::new();
            for event in prefix.clone() {
                step.apply(event).unwrap();
            }
            assert_eq!(step, Transcript::new().fold(prefix));
        }
    }

    #[test]
    fn test_message_id_replaces_placeholder() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("u1", "Hi"));
        transcript.push(Message::assistant_placeholder("local"));

        transcript
            .apply(StreamEvent::MessageId("server".to_owned()))
            .unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[1].id, "server");
        assert!(!transcript.messages()[1].provisional);

        // A second id opens another reply.
        transcript
            .apply(StreamEvent::MessageId("server2".to_owned()))
            .unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.messages()[2].id, "server2");
    }

    #[test]
    fn test_contract_violations_leave_transcript_unchanged() {
        let mut transcript = Transcript::new();
        assert_eq!(
            transcript.apply(StreamEvent::MessageDelta("x".to_owned())),
            Err(ReduceError::NoOpenReply("message_delta"))
        );

        transcript.push(Message::user("u1", "Hi"));
        assert_eq!(
            transcript.apply(StreamEvent::SearchQuery("q".to_owned())),
            Err(ReduceError::NoOpenReply("search_query"))
        );

        transcript.push(Message::assistant("a"));
        transcript
            .apply(StreamEvent::MessageDelta("text".to_owned()))
            .unwrap();
        let before = transcript.clone();
        assert_eq!(
            transcript.apply(StreamEvent::SearchResults(vec![result("1")])),
            Err(ReduceError::NoOpenSearch)
        );
        assert_eq!(transcript, before);

        transcript
            .apply(StreamEvent::SearchQuery("q".to_owned()))
            .unwrap();
        transcript.apply(StreamEvent::SearchResults(vec![])).unwrap();
        let before = transcript.clone();
        assert_eq!(
            transcript.apply(StreamEvent::SearchResults(vec![result("1")])),
            Err(ReduceError::SearchAlreadyCompleted)
        );
        assert_eq!(transcript, before);
    }

    #[test]
    fn test_title_does_not_touch_messages() {
        let mut transcript = Transcript::new();
        assert_eq!(
            transcript.apply(StreamEvent::ChatTitle("T".to_owned())),
            Ok(Applied::Title)
        );
        assert!(transcript.messages().is_empty());
        assert_eq!(transcript.title(), Some("T"));
    }

    #[test]
    fn test_finish_streaming() {
        let mut transcript =
            Transcript::new().fold([StreamEvent::MessageId("a".to_owned())]);
        assert_eq!(transcript.messages()[0].state, MessageState::Streaming);
        transcript.finish_streaming();
        assert_eq!(transcript.messages()[0].state, MessageState::Idle);
    }

    #[test]
    fn test_clones_share_untouched_messages() {
        let mut transcript = Transcript::with_history(
            None,
            vec![Message::user("u1", "Hi"), Message::assistant("a1")],
        );
        let snapshot = transcript.clone();
        transcript
            .apply(StreamEvent::MessageDelta("Hello".to_owned()))
            .unwrap();

        assert!(Arc::ptr_eq(
            &snapshot.messages()[0],
            &transcript.messages()[0]
        ));
        assert!(!Arc::ptr_eq(
            &snapshot.messages()[1],
            &transcript.messages()[1]
        ));
        assert_eq!(snapshot.messages()[1].text(), "");
        assert_eq!(transcript.messages()[1].text(), "Hello");
    }
}
