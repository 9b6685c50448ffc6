//! Error kinds for the outgoing-message engine, per the error-handling table:
//! packetization failures are returned to the caller, transmit-path failures
//! are counted and swallowed (see [`crate::stats`]).

use std::error::Error as StdError;

/// Errors produced by [`crate::message::packetize`] and friends.
#[derive(Debug, thiserror::Error)]
pub enum HomaError {
    #[error("message length {length} exceeds MAX_MESSAGE_LENGTH ({max})")]
    TooLarge { length: u32, max: u32 },

    #[error("failed to allocate packet buffer")]
    AllocFail,

    #[error("byte-source read failed")]
    SourceIo(#[source] Box<dyn StdError + Send + Sync>),

    #[error("submission to network failed: {0}")]
    SubmitFail(String),
}

pub type Result<T> = std::result::Result<T, HomaError>;
