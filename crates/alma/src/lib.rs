//! A terminal client for a streaming chat assistant.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to open chats and follow their transcripts in your
//! own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;
mod config;
pub mod render;

pub use client::Client;
pub use config::{Config, ConfigError};

/// Re-exports of [`alma_core`] crate.
pub mod core {
    pub use alma_core::*;
}

/// Re-exports of [`alma_model`] crate.
pub mod model {
    pub use alma_model::*;
}
