//! The abstract card channel interface (component F, external half).
//!
//! Everything above this trait is reader-agnostic; the only concrete implementation the
//! crate ships is [`crate::pcsc_channel::PcscChannel`]. Tests exercise the session and
//! transport layers against an in-memory fake instead.

use crate::Result;

/// A synchronous half-duplex channel to a card, speaking the T=0 transport.
pub trait Channel {
    /// Send a command APDU, return its raw response bytes (including `sw1 sw2`).
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>>;
}
