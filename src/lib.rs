//! A client library for speaking the EMV smartcard protocol to a contact chip-card
//! reader: BER-TLV/DOL codec, APDU transport framing, a card session state machine, and
//! EMV CAP (Pinsentry-style) one-time-code derivation.

pub mod apdu;
pub mod ber;
pub mod cap;
pub mod channel;
pub mod dict;
pub mod errors;
pub mod pcsc_channel;
pub mod session;
pub mod tag;
pub mod tlv;
pub mod transport;
pub mod util;

pub use errors::{Error, Result};
