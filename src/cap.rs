//! EMV Chip Authentication Program (CAP / Pinsentry) value derivation (component H).
//!
//! Grounded on `emv/cap.py` for the ARQC request side, and on the general
//! IPB-parameterised algorithm exercised by `emv/test/test_cap.py` for the response
//! side — that's a more general form than the single hard-coded Barclays bitshift left
//! in `cap.py` itself, and the one actually required here (see SPEC_FULL.md §4.8).

use crate::apdu::{crypto_type, Capdu};
use crate::session::Session;
use crate::tag::Tag;
use crate::tlv::{Dol, Tlv, Value};
use crate::util::hex_int;
use crate::{Error, Result};
use std::collections::HashMap;

/// Static schedule for deserialising older cards' opaque (RMTF1) GEN AC response.
fn gac_response_dol() -> Dol {
    Dol::parse(&[
        0x9F, 0x27, 0x01, // Cryptogram Information Data
        0x9F, 0x36, 0x02, // Application Transaction Counter
        0x9F, 0x26, 0x08, // Application Cryptogram
        0x9F, 0x10, 0x07, // Issuer Application Data
        0x90, 0x00, // (terminator, zero length)
    ])
}

/// Build the GENERATE AC (ARQC) request described by the application's CDOL1, seeded
/// with a fixed transaction date/TVR and optionally a challenge and/or monetary amount.
pub fn build_arqc_request(app_data: &Tlv, value: Option<f64>, challenge: Option<u64>) -> Result<Capdu> {
    let cdol1 = app_data
        .get_alias("CDOL1")
        .and_then(Value::as_dol)
        .ok_or_else(|| Error::Cap("application data doesn't include CDOL1 field".into()))?;

    let mut data: HashMap<Tag, Vec<u8>> = HashMap::new();
    data.insert(Tag::new(vec![0x9A]), vec![0x01, 0x01, 0x01]); // Transaction Date
    data.insert(Tag::new(vec![0x95]), vec![0x80, 0x00, 0x00, 0x00, 0x00]); // TVR

    if let Some(challenge) = challenge {
        data.insert(Tag::new(vec![0x9F, 0x37]), hex_int(challenge));
    }
    if let Some(value) = value {
        let minor_units = (value * 100.0).round() as u64;
        data.insert(Tag::new(vec![0x9F, 0x02]), hex_int(minor_units));
    }

    let serialised = cdol1.serialise(&data)?;
    Ok(Capdu::generate_ac(crypto_type::ARQC, serialised, false))
}

/// Derive the decimal CAP code from a GEN AC response, using the issuer's bit-selection
/// mask. `psn` is the PAN Sequence Number, prepended to the response bytes when the
/// card's Issuer Authentication Flags say to use it.
pub fn compute_cap_value(response: &Tlv, ipb: &[u8], psn: Option<&[u8]>) -> Result<u64> {
    let inner: Tlv = if let Some(bytes) = response.get_alias("RMTF1").and_then(Value::as_bytes) {
        gac_response_dol().unserialise(bytes)?
    } else if let Some(tlv) = response.get_alias("RMTF2").and_then(Value::as_tlv) {
        tlv.clone()
    } else {
        return Err(Error::Cap("unknown response type in ARQC response".into()));
    };

    let mut r = Vec::new();
    if let Some(psn) = psn {
        r.extend_from_slice(psn);
    }
    r.extend(inner.flatten());

    Ok(select_bits(ipb, &r))
}

/// The IPB bit-selection algorithm itself: for each byte position (from the last shared
/// index down to the first), use the IPB byte as a mask selecting bits out of the
/// response byte at the same position, emitting selected bits low-to-high within each
/// byte. Each emitted bit becomes the new most-significant bit of the accumulator,
/// which is exactly "prepend to a growing bit string" without the string.
fn select_bits(ipb: &[u8], response: &[u8]) -> u64 {
    let m = ipb.len().min(response.len());
    let mut value: u128 = 0;
    let mut bits: u32 = 0;
    for i in (0..m).rev() {
        let mut mask = ipb[i];
        let mut data = response[i];
        while mask != 0 {
            if mask & 1 != 0 {
                value |= ((data & 1) as u128) << bits;
                bits += 1;
            }
            mask >>= 1;
            data >>= 1;
        }
    }
    value as u64
}

/// Full orchestration: select an application, run GPO, verify the PIN, generate an ARQC,
/// and derive its CAP value. Grounded on `emv/card.py`'s `generate_cap_value`.
pub fn generate_cap_value(
    session: &mut Session,
    pin: &str,
    value: Option<f64>,
    challenge: Option<u64>,
) -> Result<u64> {
    let apps = session.list_applications()?;
    let app = apps.last().ok_or(Error::MissingApplication)?;

    // We select the last app listed on the card, which empirically seems to be the
    // correct (bank-specific) one. If this isn't always true, it may be better to
    // select the app with ADF [A0 00 00 00 03 80 02] directly.
    let adf_name = app
        .get_alias("ADF_NAME")
        .and_then(Value::as_bytes)
        .ok_or_else(|| Error::Protocol("application entry missing ADF_NAME".into()))?;
    session.select_application(adf_name)?;

    let opts = session.get_processing_options()?;
    let app_data = session.get_application_data(&opts.afl)?;

    let ipb = app_data
        .get_alias("IPB")
        .and_then(Value::as_bytes)
        .ok_or_else(|| Error::Protocol("Issuer Proprietary Bitmap not found in application file".into()))?
        .to_vec();

    session.verify_pin(pin)?;

    let request = build_arqc_request(&app_data, value, challenge)?;
    let response = session.send(&request)?;

    let use_psn = app_data
        .get_alias("IAF")
        .and_then(Value::as_bytes)
        .map(|b| b.first().map(|b0| b0 & 0x40 != 0).unwrap_or(false))
        .unwrap_or(false);
    let psn = if use_psn {
        app_data.get_alias("PAN_SN").and_then(Value::as_bytes)
    } else {
        None
    };

    compute_cap_value(&response.data, &ipb, psn)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARCLAYS_IPB: &[u8] = &[
        0x80, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00,
    ];

    #[test]
    fn cap_value_rmtf1() {
        let data = [
            0x80, 0x12, 0x80, 0x09, 0x5F, 0x0F, 0x9D, 0x37, 0x98, 0xE9, 0x3F, 0x12, 0x9A, 0x06,
            0x0A, 0x0A, 0x03, 0xA4, 0x90, 0x00,
        ];
        let response = Tlv::parse(&data);
        assert_eq!(compute_cap_value(&response, BARCLAYS_IPB, None).unwrap(), 46076570);
    }

    #[test]
    fn cap_value_rmtf2() {
        let data = [
            0x77, 0x1E, 0x9F, 0x27, 0x01, 0x80, 0x9F, 0x36, 0x02, 0x00, 0x16, 0x9F, 0x26, 0x08,
            0x29, 0x9C, 0xC8, 0xF1, 0x0B, 0x9B, 0xC8, 0x30, 0x9F, 0x10, 0x07, 0x06, 0x0B, 0x0A,
            0x03, 0xA4, 0x90, 0x00,
        ];
        let response = Tlv::parse(&data);
        assert_eq!(compute_cap_value(&response, BARCLAYS_IPB, None).unwrap(), 36554800);
    }

    fn fixture_app_data() -> Tlv {
        // emv/fixtures.py APP_DATA, tag 0x70 body.
        let data = [
            0x70, 0x68, 0x8C, 0x15, 0x9F, 0x02, 0x06, 0x9F, 0x03, 0x06, 0x9F, 0x1A, 0x02, 0x95,
            0x05, 0x5F, 0x2A, 0x02, 0x9A, 0x03, 0x9C, 0x01, 0x9F, 0x37, 0x04, 0x8D, 0x17, 0x8A,
            0x02, 0x9F, 0x02, 0x06, 0x9F, 0x03, 0x06, 0x9F, 0x1A, 0x02, 0x95, 0x05, 0x5F, 0x2A,
            0x02, 0x9A, 0x03, 0x9C, 0x01, 0x9F, 0x37, 0x04, 0x8E, 0x0A, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x9F, 0x56, 0x12, 0x80, 0x00, 0xFF, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x9F,
            0x55, 0x01, 0xA0, 0x5A, 0x08, 0x46, 0x58, 0x12, 0x34, 0x56, 0x78, 0x90, 0x09, 0x5F,
            0x34, 0x01, 0x00, 0x9F, 0x08, 0x02, 0x00, 0x01,
        ];
        let tlv = Tlv::parse(&data);
        tlv.get_bytes(&[0x70]).and_then(Value::as_tlv).unwrap().clone()
    }

    #[test]
    fn arqc_request_matches_reference_vector() {
        let app_data = fixture_app_data();
        let req = build_arqc_request(&app_data, None, None).unwrap();
        assert_eq!(
            req.marshal(),
            vec![
                0x80, 0xAE, 0x80, 0x00, 0x1D, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]
        );
    }

    #[test]
    fn arqc_request_with_amount_and_challenge() {
        let app_data = fixture_app_data();
        let req = build_arqc_request(&app_data, Some(1234.56), Some(78901234)).unwrap();
        assert_eq!(
            req.marshal(),
            vec![
                0x80, 0xAE, 0x80, 0x00, 0x1D, 0x00, 0x00, 0x00, 0x12, 0x34, 0x56, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x01, 0x01, 0x01, 0x00, 0x78, 0x90, 0x12, 0x34, 0x00,
            ]
        );
    }

    #[test]
    fn arqc_request_rejects_missing_cdol1() {
        let app_data = Tlv::new();
        assert!(build_arqc_request(&app_data, None, None).is_err());
    }
}
