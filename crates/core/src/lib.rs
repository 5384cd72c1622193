//! Core logic: folding stream events into a transcript, and sessions
//! that send messages and keep the transcript up to date.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod backend_client;
mod session;
mod transcript;

pub use session::{
    SendOutcome, Session, SessionBuilder, SessionClosedError,
    SessionSnapshot, SessionStage,
};
pub use transcript::{Applied, ReduceError, Transcript};
