use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The backend refused the message because the user sent too many.
    RateLimited,
    /// The backend answered with any other non-success status.
    Rejected,
    /// The connection failed or the stream body could not be read.
    Transport,
    /// Nothing arrived from the backend in time.
    TimedOut,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimited => write!(f, "Rate limited"),
            ErrorKind::Rejected => write!(f, "Rejected"),
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::TimedOut => write!(f, "Timed out"),
            ErrorKind::Other => write!(f, "Other error"),
        }
    }
}

/// The sender's message quota, as reported with a rate-limited refusal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RateLimit {
    /// Messages allowed per window.
    pub limit: Option<u64>,
    /// Messages left in the current window.
    pub remaining: Option<u64>,
    /// The server's explanation of the limit, e.g. `5 per 1 week`.
    pub detail: Option<String>,
}

impl Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.remaining, self.limit) {
            (Some(0), Some(limit)) => {
                write!(f, "You have reached your message limit ({limit} messages)")?
            }
            (Some(remaining), Some(limit)) => {
                write!(f, "{remaining} of {limit} messages remaining")?
            }
            _ => write!(f, "Rate limit exceeded")?,
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}
