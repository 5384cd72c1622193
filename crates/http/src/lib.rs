//! A chat backend that talks to the assistant's HTTP API.
//!
//! Messages are posted to `/chats/{chat_id}/messages`, and the reply is
//! read from the response body as a stream of server-sent events.

#[macro_use]
extern crate tracing;

mod config;
mod decode;
mod io;
mod proto;
mod stream;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use alma_model::{
    BackendError, ChatBackend, ErrorKind, MessageRequest, RateLimit,
};
use mime::Mime;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};

pub use config::{HttpConfig, HttpConfigBuilder, TokenProvider};
pub use decode::{DecodeError, decode};
pub use io::{Frame, FrameParser, Frames};
use io::{Chunks, Sse};
pub use proto::Chat;
use proto::{ChatDetail, RateLimitBody};
pub use stream::HttpEventStream;

/// Error type for [`HttpBackend`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    rate_limit: Option<RateLimit>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            rate_limit: None,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
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

/// Chat backend over the assistant's HTTP API.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    config: Arc<HttpConfig>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` with the given configuration.
    #[inline]
    pub fn new(config: HttpConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Creates a new `HttpBackend` that sends requests through `client`.
    #[inline]
    pub fn with_client(config: HttpConfig, client: Client) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// Fetches a stored conversation.
    ///
    /// Returns `None` if the server doesn't know the chat yet, which is
    /// the case for a chat whose first message was never sent.
    pub async fn fetch_chat(
        &self,
        chat_id: &str,
    ) -> Result<Option<Chat>, Error> {
        let url = self.config.url(&["chats", chat_id])?;
        let req = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json");
        let resp = self.authorize(req).send().await.map_err(transport_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        let detail: ChatDetail = resp.json().await.map_err(|err| {
            Error::new(format!("invalid chat payload: {err}"), ErrorKind::Other)
        })?;
        Ok(Some(detail.into()))
    }

    #[inline]
    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.config.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

impl ChatBackend for HttpBackend {
    type Error = Error;
    type Stream = HttpEventStream;

    fn send_message(
        &self,
        req: &MessageRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let resp_fut = self
            .config
            .url(&["chats", &req.chat_id, "messages"])
            .map(|url| {
                self.authorize(self.client.post(url))
                    .header(header::ACCEPT, "text/event-stream")
                    .json(&req.message)
                    .send()
            });

        async move {
            let resp = resp_fut?.await.map_err(transport_error)?;
            let resp = check_status(resp).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| {
                    m.type_() == mime::TEXT && m.subtype() == mime::EVENT_STREAM
                })
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::Rejected,
                ));
            }

            // Here we got a successful response, the body is read lazily.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(HttpEventStream::from_sse(sse))
        }
    }
}

#[inline]
fn transport_error(err: reqwest::Error) -> Error {
    Error::new(format!("{err}"), ErrorKind::Transport)
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(rate_limit_error(resp).await);
    }
    if !status.is_success() {
        return Err(Error::new(
            format!("unexpected status: {status}"),
            ErrorKind::Rejected,
        ));
    }
    Ok(resp)
}

async fn rate_limit_error(resp: Response) -> Error {
    let headers = resp.headers();
    let limit = header_number(headers, "x-ratelimit-limit");
    let remaining = header_number(headers, "x-ratelimit-remaining");
    // The body is informative only, a missing or odd one is fine.
    let body: RateLimitBody = resp.json().await.unwrap_or_default();

    let message = body
        .message
        .unwrap_or_else(|| "rate limit exceeded".to_owned());
    let mut err = Error::new(message, ErrorKind::RateLimited);
    err.rate_limit = Some(RateLimit {
        limit,
        remaining,
        detail: body.detail,
    });
    err
}

#[inline]
fn header_number(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
