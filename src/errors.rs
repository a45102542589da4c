//! Crate-wide error taxonomy.
//!
//! One closed enum, one variant per failure kind a caller actually needs to branch on.
//! Card status errors carry the raw `sw1`/`sw2` plus a human-readable status string so
//! callers that don't care about the distinction can just print it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    #[error("card returned {sw1:02X}{sw2:02X}: {status}")]
    CardError {
        sw1: u8,
        sw2: u8,
        status: String,
    },

    #[error("application not found on card")]
    MissingApplication,

    #[error("invalid PIN: {0}")]
    InvalidPin(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("CAP error: {0}")]
    Cap(String),
}

impl Error {
    pub fn card(sw1: u8, sw2: u8, status: impl Into<String>) -> Self {
        Error::CardError {
            sw1,
            sw2,
            status: status.into(),
        }
    }
}
