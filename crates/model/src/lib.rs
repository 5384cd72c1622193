//! The shared vocabulary of the chat client.
//!
//! This crate defines what a conversation looks like on the client side
//! (messages made of ordered content blocks), the closed set of events a
//! backend streams back while answering, and the protocol every backend
//! implementation must follow.
//!
//! Types in this crate don't define any behavior. Folding events into a
//! transcript lives in the core crate, and talking to a real server
//! lives in the backend crates.

#![deny(missing_docs)]

mod backend;
mod error;
mod event;
mod message;
mod request;
mod stream;

pub use backend::*;
pub use error::*;
pub use event::*;
pub use message::*;
pub use request::*;
pub use stream::*;
