use std::env;
use std::error::Error;
use std::fmt::{self, Display};
use std::time::Duration;

const BASE_URL: &str = "ALMA_BASE_URL";
const TOKEN: &str = "ALMA_TOKEN";
const CHAT_ID: &str = "ALMA_CHAT_ID";
const READ_TIMEOUT_SECS: &str = "ALMA_READ_TIMEOUT_SECS";

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for talking to the assistant.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the API, e.g. `https://example.com/api`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Chat to continue. A new chat is started if unset.
    pub chat_id: Option<String>,
    /// How long to wait for the backend before giving up. `None` waits
    /// forever.
    pub read_timeout: Option<Duration>,
}

impl Config {
    /// Reads the configuration from `ALMA_*` environment variables.
    ///
    /// `ALMA_BASE_URL` is required. `ALMA_TOKEN`, `ALMA_CHAT_ID` and
    /// `ALMA_READ_TIMEOUT_SECS` are optional, and a read timeout of `0`
    /// disables it.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration from whatever `lookup` returns for each
    /// variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url =
            non_empty(BASE_URL).ok_or(ConfigError::Missing(BASE_URL))?;
        let read_timeout = match non_empty(READ_TIMEOUT_SECS) {
            None => Some(DEFAULT_READ_TIMEOUT),
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    return Err(ConfigError::Invalid {
                        name: READ_TIMEOUT_SECS,
                        value,
                    });
                }
            },
        };

        Ok(Self {
            base_url,
            token: non_empty(TOKEN),
            chat_id: non_empty(CHAT_ID),
            read_timeout,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// A configuration variable is missing or unusable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    Missing(&'static str),
    /// A variable is set to something that can't be parsed.
    Invalid {
        /// Name of the variable.
        name: &'static str,
        /// The value it was set to.
        value: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => {
                write!(f, "{name} environment variable is not set")
            }
            ConfigError::Invalid { name, value } => {
                write!(f, "{name} has an invalid value: {value:?}")
            }
        }
    }
}

impl Error for ConfigError {}
