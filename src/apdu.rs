//! Command/response APDU codec (component E), built on the `apdu` crate's wire types.
//!
//! Grounded on `src/util.rs` (`apdu::Command::new_with_le`) for the fact that the crate is
//! used directly rather than hand-rolled, and on `src/cmd.rs`/`src/card.rs`/
//! `src/transport/protocol/apdu.rs` for the `apdu::Request`/`apdu::Response`/`apdu::Status`
//! shape (field layout, `Request::new`/`.expect(le)`, `Status` classification) that those
//! files build on. EMV command field layout and PIN block packing are still grounded on
//! `emv/protocol/command.py`/`emv/protocol/response.py`.

use crate::tlv::Tlv;
use crate::{Error, Result};
use apdu::{Request, Response, Status};

/// Generate AC cryptogram type, EMV 4.3 Book 3 section 6.5.5 Table 12.
pub mod crypto_type {
    pub const AAC: u8 = 0b0000_0000;
    pub const TC: u8 = 0b0100_0000;
    pub const ARQC: u8 = 0b1000_0000;
    pub const CDA_SIG: u8 = 0b0001_0000;
}

/// Command APDU, wrapping the `apdu` crate's wire-level `Request`.
#[derive(Clone, Debug)]
pub struct Capdu(Request);

impl Capdu {
    fn build(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>, le: Option<u8>) -> Capdu {
        let mut req = Request::new(cla, ins, p1, p2, data);
        if let Some(le) = le {
            req = req.expect(le as usize);
        }
        Capdu(req)
    }

    /// Marshal to the wire form: `CLA INS P1 P2 [Lc data] [Le]`. Only short (non-extended)
    /// `Lc`/`Le` are supported; every command this crate builds stays well under 256 bytes.
    pub fn marshal(&self) -> Vec<u8> {
        let req = &self.0;
        let mut out = vec![req.cla, req.ins, req.p1, req.p2];
        if !req.data.is_empty() {
            debug_assert!(req.data.len() <= 255, "extended Lc is not supported");
            out.push(req.data.len() as u8);
            out.extend_from_slice(&req.data);
        }
        if let Some(le) = req.le {
            out.push(le as u8);
        }
        out
    }

    /// Set `Le` after the fact; used by the transport layer's `6C xx` retry.
    pub fn set_le(&mut self, le: u8) {
        self.0.le = Some(le as usize);
    }

    /// SELECT by DF name / file path (EMV 4.3 Book 1 section 11.3).
    pub fn select_by_name(name: &[u8], next_occurrence: bool) -> Capdu {
        Capdu::build(
            0x00,
            0xA4,
            0x04,
            if next_occurrence { 0x02 } else { 0x00 },
            name.to_vec(),
            Some(0x00),
        )
    }

    /// SELECT by 2-byte file identifier.
    pub fn select_by_fid(fid: [u8; 2]) -> Capdu {
        Capdu::build(0x00, 0xA4, 0x00, 0x00, fid.to_vec(), Some(0x00))
    }

    /// READ RECORD (EMV 4.3 Book 1 section 11.2).
    pub fn read_record(record_number: u8, sfi: Option<u8>) -> Capdu {
        let p2 = match sfi {
            Some(sfi) => (sfi << 3) + 0x04,
            None => 0x04,
        };
        Capdu::build(0x00, 0xB2, record_number, p2, Vec::new(), Some(0x00))
    }

    /// GET DATA (EMV 4.3 Book 3 section 6.5.7).
    pub fn get_data(p1: u8, p2: u8) -> Capdu {
        Capdu::build(0x80, 0xCA, p1, p2, Vec::new(), Some(0x00))
    }

    /// VERIFY with a plaintext (format 2) PIN block (EMV 4.3 Book 3 section 6.5.12).
    pub fn verify_pin(pin: &str) -> Result<Capdu> {
        Ok(Capdu::build(
            0x00,
            0x20,
            0x00,
            0b1000_0000, // plaintext PIN
            // TODO: enciphered PIN (P2 = 0b1000_1000) is not implemented.
            plaintext_pin_block(pin)?,
            Some(0x00),
        ))
    }

    /// GET PROCESSING OPTIONS (EMV 4.3 Book 3 section 6.5.8).
    pub fn gpo(pdol_data: Option<&[u8]>) -> Capdu {
        let data = pdol_data.map(|d| d.to_vec()).unwrap_or(vec![0x83, 0x00]);
        Capdu::build(0x80, 0xA8, 0x00, 0x00, data, Some(0x00))
    }

    /// GENERATE APPLICATION CRYPTOGRAM (EMV 4.3 Book 3 section 6.5.5).
    pub fn generate_ac(crypto_type: u8, data: Vec<u8>, cda_sig: bool) -> Capdu {
        let mut p1 = crypto_type;
        if cda_sig {
            p1 |= crypto_type::CDA_SIG;
        }
        Capdu::build(0x80, 0xAE, p1, 0x00, data, Some(0x00))
    }
}

/// Format-2 plaintext PIN block: `2 L d1 d2 ... dN` in BCD nibbles, padded with `F`
/// nibbles to 8 bytes. PIN length must be 4-12 digits.
fn plaintext_pin_block(pin: &str) -> Result<Vec<u8>> {
    if !(4..=12).contains(&pin.len()) || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Protocol(format!("invalid PIN length: {}", pin.len())));
    }
    let mut nibbles = format!("2{:x}{}", pin.len(), pin);
    while nibbles.len() < 16 {
        nibbles.push('f');
    }
    hex::decode(nibbles).map_err(|e| Error::Protocol(format!("bad PIN block: {}", e)))
}

/// Response APDU, classified from an `apdu::Response`/`apdu::Status` pair.
#[derive(Clone, Debug)]
pub struct Rapdu {
    pub sw1: u8,
    pub sw2: u8,
    pub data: Tlv,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RapduKind {
    Success,
    Warning(String),
    Error(String),
}

impl Rapdu {
    /// Parse the trailing `sw1 sw2` plus any preceding TLV body.
    ///
    /// `61`/`6C` must already have been resolved by the transport layer (component F);
    /// seeing either here is a contract violation upstream, not something this layer
    /// retries.
    pub fn unmarshal(data: &[u8]) -> Rapdu {
        debug_assert!(data.len() >= 2);
        let sw1 = data[data.len() - 2];
        let sw2 = data[data.len() - 1];
        let body = &data[..data.len() - 2];
        let response = Response::new(Status(sw1, sw2), body.to_vec());
        let tlv = if response.data.is_empty() {
            Tlv::new()
        } else {
            Tlv::parse(&response.data)
        };
        Rapdu {
            sw1: response.status.0,
            sw2: response.status.1,
            data: tlv,
        }
    }

    pub fn kind(&self) -> RapduKind {
        classify(&Status(self.sw1, self.sw2))
    }

    pub fn status(&self) -> String {
        match self.kind() {
            RapduKind::Success => "Process completed".to_string(),
            RapduKind::Warning(s) | RapduKind::Error(s) => s,
        }
    }

    /// Turn an Error-classified response into a crate-level failure; pass Success and
    /// Warning through unchanged for the caller to interpret.
    pub fn into_result(self) -> Result<Rapdu> {
        if let RapduKind::Error(status) = self.kind() {
            Err(Error::card(self.sw1, self.sw2, status))
        } else {
            Ok(self)
        }
    }
}

/// Status-word taxonomy, ISO 7816-4 section 5.1.3. Can't be an inherent impl on `apdu`'s
/// foreign `Status` (orphan rules), so it's a free function taking one by reference.
#[derive(Clone, Debug, Eq, PartialEq)]
enum StatusClass {
    Ok,
    BytesRemaining(u8),
    NonVolatileUnchanged(u8),
    NonVolatileMayHaveChanged(u8),
    SelectedFileDeactivated,
    Counter(u8),
    WrongLe(u8),
    AuthMethodBlocked,
    ReferencedDataInvalidated,
    ConditionsNotSatisfied,
    WrongParams,
    FileNotFound,
    RecordNotFound,
    DataNotFound,
    Unknown(u8, u8),
}

fn status_class(status: &Status) -> StatusClass {
    match (status.0, status.1) {
        (0x90, _) => StatusClass::Ok,
        (0x61, x) => StatusClass::BytesRemaining(x),
        (0x62, 0x83) => StatusClass::SelectedFileDeactivated,
        (y @ 0x62, _) => StatusClass::NonVolatileUnchanged(y),
        (y @ 0x63, 0x00) => StatusClass::NonVolatileMayHaveChanged(y),
        (0x63, x) if (0xC0..=0xCF).contains(&x) => StatusClass::Counter(x & 0x0F),
        (0x69, 0x83) => StatusClass::AuthMethodBlocked,
        (0x69, 0x84) => StatusClass::ReferencedDataInvalidated,
        (0x69, 0x85) => StatusClass::ConditionsNotSatisfied,
        (0x6A, 0x81) | (0x6A, 0x86) | (0x6A, 0x87) => StatusClass::WrongParams,
        (0x6A, 0x82) => StatusClass::FileNotFound,
        (0x6A, 0x83) => StatusClass::RecordNotFound,
        (0x6A, 0x88) => StatusClass::DataNotFound,
        (0x6C, x) => StatusClass::WrongLe(x),
        (sw1, sw2) => StatusClass::Unknown(sw1, sw2),
    }
}

fn describe(status: &Status) -> String {
    match status_class(status) {
        StatusClass::Ok => "Process completed".to_string(),
        StatusClass::BytesRemaining(x) => format!("{} bytes still available", x),
        StatusClass::SelectedFileDeactivated => {
            "State of non-volatile memory unchanged; selected file invalidated".to_string()
        }
        StatusClass::NonVolatileUnchanged(_) => "State of non-volatile memory unchanged".to_string(),
        StatusClass::NonVolatileMayHaveChanged(_) => {
            "State of non-volatile memory changed; authentication failed".to_string()
        }
        StatusClass::Counter(x) => format!("State of non-volatile memory changed; counter is {}", x),
        StatusClass::AuthMethodBlocked => "Command not allowed; authentication method blocked".to_string(),
        StatusClass::ReferencedDataInvalidated => "Command not allowed; referenced data invalidated".to_string(),
        StatusClass::ConditionsNotSatisfied => "Command not allowed; conditions of use not satisfied".to_string(),
        StatusClass::WrongParams => "Wrong parameter(s) P1 P2; function not supported".to_string(),
        StatusClass::FileNotFound => "Wrong parameter(s) P1 P2; file not found".to_string(),
        StatusClass::RecordNotFound => "Wrong parameter(s) P1 P2; record not found".to_string(),
        StatusClass::DataNotFound => "Referenced data (data objects) not found".to_string(),
        StatusClass::WrongLe(x) => format!("Wrong Le; retry with Le = {:02X}", x),
        StatusClass::Unknown(sw1, sw2) => format!("Unknown status: {:02x} {:02x}", sw1, sw2),
    }
}

fn classify(status: &Status) -> RapduKind {
    match status_class(status) {
        StatusClass::Ok => RapduKind::Success,
        StatusClass::SelectedFileDeactivated
        | StatusClass::NonVolatileUnchanged(_)
        | StatusClass::NonVolatileMayHaveChanged(_)
        | StatusClass::Counter(_) => RapduKind::Warning(describe(status)),
        _ => RapduKind::Error(describe(status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_marshals_with_le() {
        let capdu = Capdu::select_by_name(&[0xA0, 0x00, 0x00, 0x00, 0x03, 0x80, 0x02], false);
        assert_eq!(
            capdu.marshal(),
            vec![0x00, 0xA4, 0x04, 0x00, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x03, 0x80, 0x02, 0x00]
        );
    }

    #[test]
    fn read_record_encodes_sfi_in_p2() {
        let capdu = Capdu::read_record(3, Some(2));
        assert_eq!(capdu.0.p1, 3);
        assert_eq!(capdu.0.p2, (2 << 3) + 4);
    }

    #[test]
    fn pin_block_pads_to_eight_bytes() {
        let block = plaintext_pin_block("1234").unwrap();
        assert_eq!(block, vec![0x24, 0x12, 0x34, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn pin_block_rejects_bad_length() {
        assert!(plaintext_pin_block("123").is_err());
        assert!(plaintext_pin_block("1234567890123").is_err());
    }

    #[test]
    fn classifies_success() {
        let rapdu = Rapdu::unmarshal(&[0x90, 0x00]);
        assert_eq!(rapdu.kind(), RapduKind::Success);
    }

    #[test]
    fn classifies_counter_warning() {
        let rapdu = Rapdu::unmarshal(&[0x63, 0xC2]);
        assert_eq!(
            rapdu.kind(),
            RapduKind::Warning("State of non-volatile memory changed; counter is 2".into())
        );
    }

    #[test]
    fn classifies_known_error() {
        let rapdu = Rapdu::unmarshal(&[0x6A, 0x82]);
        assert!(rapdu.into_result().is_err());
    }
}
