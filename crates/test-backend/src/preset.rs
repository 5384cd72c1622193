use alma_model::{ErrorKind, RateLimit, StreamEvent};

/// How the backend should answer one message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PresetReply {
    /// Events streamed back, in order.
    pub events: Vec<StreamEvent>,
    /// If set, the message is refused up front with this kind and no
    /// event is streamed.
    pub rejection: Option<ErrorKind>,
    /// Quota reported along with a rejection.
    pub rate_limit: Option<RateLimit>,
    /// If set, the stream breaks off with this kind after all events.
    pub interruption: Option<ErrorKind>,
    /// If set, the stream never ends after the last event.
    pub stall: bool,
}

impl PresetReply {
    /// Creates a `PresetReply` that streams the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<StreamEvent>>) -> Self {
        Self {
            events: events.into(),
            rejection: None,
            rate_limit: None,
            interruption: None,
            stall: false,
        }
    }

    /// Creates a `PresetReply` that refuses the message.
    #[inline]
    pub fn rejected(kind: ErrorKind) -> Self {
        Self {
            rejection: Some(kind),
            ..Self::with_events(Vec::new())
        }
    }

    /// Creates a `PresetReply` that refuses the message for rate limiting
    /// and reports `quota`.
    #[inline]
    pub fn rate_limited(quota: RateLimit) -> Self {
        Self {
            rate_limit: Some(quota),
            ..Self::rejected(ErrorKind::RateLimited)
        }
    }

    /// Breaks the stream off after the events.
    #[inline]
    pub fn interrupted(mut self, kind: ErrorKind) -> Self {
        self.interruption = Some(kind);
        self
    }

    /// Keeps the stream open forever after the events.
    #[inline]
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }
}
