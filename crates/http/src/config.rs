use std::fmt::Debug;
use std::sync::Arc;

use alma_model::ErrorKind;
use reqwest::Url;

use crate::Error;

/// A capability that yields the bearer token to send with a request.
///
/// It is called once per request, so a provider backed by a refreshable
/// credential store always hands out the current token.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Builder for [`HttpConfig`].
#[derive(Clone)]
pub struct HttpConfigBuilder {
    base_url: String,
    token_provider: Option<TokenProvider>,
}

impl HttpConfigBuilder {
    /// Creates a builder for the API at `base_url`, e.g.
    /// `https://example.com/api`.
    #[inline]
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            token_provider: None,
        }
    }

    /// Sends a fixed bearer token with every request.
    #[inline]
    pub fn with_token<S: Into<String>>(self, token: S) -> Self {
        let token = token.into();
        self.with_token_provider(move || Some(token.clone()))
    }

    /// Asks `provider` for the bearer token before every request.
    /// Requests go out unauthenticated when it returns `None`.
    #[inline]
    pub fn with_token_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> HttpConfig {
        HttpConfig {
            base_url: self.base_url.trim_end_matches('/').to_owned(),
            token_provider: self.token_provider,
        }
    }
}

impl Debug for HttpConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfigBuilder")
            .field("base_url", &self.base_url)
            .field("token_provider", &self.token_provider.as_ref().map(|_| ()))
            .finish()
    }
}

/// Configuration for the HTTP backend.
#[derive(Clone)]
pub struct HttpConfig {
    pub(crate) base_url: String,
    token_provider: Option<TokenProvider>,
}

impl HttpConfig {
    #[inline]
    pub(crate) fn token(&self) -> Option<String> {
        self.token_provider.as_ref().and_then(|provider| provider())
    }

    /// Appends `segments` to the base URL, escaping each of them.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let invalid = || {
            Error::new(
                format!("invalid base url: {}", self.base_url),
                ErrorKind::Other,
            )
        };
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token().map(|_| "<deducted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_base_url() {
        let config = HttpConfigBuilder::with_base_url("http://localhost/api/")
            .build();
        assert_eq!(
            config.url(&["chats", "1"]).unwrap().as_str(),
            "http://localhost/api/chats/1"
        );
        assert_eq!(config.token(), None);

        let config = HttpConfigBuilder::with_base_url("http://localhost").build();
        assert_eq!(
            config.url(&["chats", "1"]).unwrap().as_str(),
            "http://localhost/chats/1"
        );
    }

    #[test]
    fn test_segments_are_escaped() {
        let config = HttpConfigBuilder::with_base_url("http://localhost/api")
            .build();
        let url = config.url(&["chats", "a/b?c#d", "messages"]).unwrap();
        assert_eq!(url.path(), "/api/chats/a%2Fb%3Fc%23d/messages");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_base_url() {
        let config = HttpConfigBuilder::with_base_url("not a url").build();
        assert!(config.url(&["chats"]).is_err());
    }

    #[test]
    fn test_token_is_redacted() {
        let config = HttpConfigBuilder::with_base_url("http://localhost")
            .with_token("s3cr3t")
            .build();
        assert_eq!(config.token().as_deref(), Some("s3cr3t"));
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }

    #[test]
    fn test_token_provider_is_called_per_request() {
        let current = Arc::new(Mutex::new("first".to_owned()));
        let config = HttpConfigBuilder::with_base_url("http://localhost")
            .with_token_provider({
                let current = Arc::clone(&current);
                move || Some(current.lock().unwrap().clone())
            })
            .build();
        assert_eq!(config.token().as_deref(), Some("first"));
        *current.lock().unwrap() = "second".to_owned();
        assert_eq!(config.token().as_deref(), Some("second"));
    }
}
