//! # amp-protocol
//!
//! Wire types for the agent runtime's command/event protocol: [`Command`],
//! [`Event`], correlation/sequencing helpers, and the error taxonomy shared
//! by every transport.
//!
//! - [`command`]: client → server request envelope
//! - [`event`]: server → client response envelope, correlated and sequenced
//! - [`error`]: [`ProtocolError`] enum and its wire-format error body
//! - [`ids`]: id generation for commands, sessions, and approval requests
#![deny(unsafe_code)]

pub mod command;
pub mod error;
pub mod event;
pub mod ids;

pub use command::Command;
pub use error::{ErrorBody, ProtocolError};
pub use event::{Event, Sequencer};
