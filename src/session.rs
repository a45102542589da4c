//! Card session: high-level EMV operations (component G).
//!
//! Grounded 1:1 on `emv/card.py`'s `Card` class. A `Session` owns its channel exclusively
//! for its lifetime and is never shared across threads (see SPEC_FULL.md §5).

use crate::apdu::{Capdu, Rapdu, RapduKind};
use crate::channel::Channel;
use crate::tag::Tag;
use crate::tlv::{Tlv, Value};
use crate::{Error, Result};
use tracing::{trace_span, warn};

/// Well-known AIDs tried when the PSE-based directory lookup fails. Some older/foreign
/// cards don't expose `1PAY.SYS.DDF01` at all and must be probed by fixed AID instead.
const STATIC_AIDS: &[&[u8]] = &[
    &[0xA0, 0x00, 0x00, 0x00, 0x25, 0x01],       // Amex
    &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10], // Visa
    &[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10], // Mastercard
];

#[derive(Debug, Default)]
pub struct Metadata {
    pub pin_retries: Option<u8>,
    pub atc: Option<u64>,
    pub last_online_atc: Option<u64>,
}

#[derive(Debug)]
pub struct ProcessingOptions {
    pub aip: Vec<u8>,
    pub afl: Vec<u8>,
}

pub struct Session<'a> {
    channel: &'a mut dyn Channel,
}

impl<'a> Session<'a> {
    pub fn new(channel: &'a mut dyn Channel) -> Self {
        Session { channel }
    }

    fn exchange(&mut self, capdu: &Capdu) -> Result<Rapdu> {
        crate::transport::exchange(self.channel, capdu)
    }

    /// Send an arbitrary command APDU and classify the result, failing on card errors.
    /// Used by the CAP module to issue GENERATE AC, which has no session-level method
    /// of its own since it's a one-shot request built from CDOL1 (see `crate::cap`).
    pub fn send(&mut self, capdu: &Capdu) -> Result<Rapdu> {
        self.exchange(capdu)?.into_result()
    }

    /// Select the master file (MF).
    pub fn get_mf(&mut self) -> Result<Rapdu> {
        self.exchange(&Capdu::select_by_fid([0x3F, 0x00]))?.into_result()
    }

    /// Select the Payment System Environment directory.
    pub fn get_pse(&mut self) -> Result<Rapdu> {
        self.exchange(&Capdu::select_by_name(b"1PAY.SYS.DDF01", false))?
            .into_result()
    }

    pub fn read_record(&mut self, record_number: u8, sfi: Option<u8>) -> Result<Rapdu> {
        self.exchange(&Capdu::read_record(record_number, sfi))?
            .into_result()
    }

    /// List applications on the card: PSE/SFI directory first, falling back to probing
    /// a fixed list of well-known AIDs if that fails.
    pub fn list_applications(&mut self) -> Result<Vec<Tlv>> {
        let span = trace_span!("list_applications");
        let _enter = span.enter();
        match self.list_applications_sfi() {
            Ok(apps) if !apps.is_empty() => Ok(apps),
            _ => Ok(self.list_applications_static_aid()),
        }
    }

    fn list_applications_sfi(&mut self) -> Result<Vec<Tlv>> {
        let pse = self.get_pse()?;
        let fci = pse
            .data
            .get_alias("FCI")
            .and_then(Value::as_tlv)
            .ok_or_else(|| Error::Protocol("PSE response missing FCI".into()))?;
        let fci_prop = fci
            .get_bytes(&[0xA5])
            .and_then(Value::as_tlv)
            .ok_or_else(|| Error::Protocol("PSE FCI missing FCI_PROP".into()))?;
        let sfi = fci_prop
            .get_alias("SFI")
            .and_then(Value::as_bytes)
            .and_then(|b| b.first())
            .copied()
            .ok_or_else(|| Error::Protocol("PSE FCI_PROP missing SFI".into()))?;

        let mut apps = Vec::new();
        for record in 1..31 {
            let res = match self.read_record(record, Some(sfi)) {
                Ok(res) => res,
                Err(_) => break,
            };
            let record_tlv = match res.data.get_alias("RECORD").and_then(Value::as_tlv) {
                Some(t) => t,
                None => continue,
            };
            if let Some(app_value) = record_tlv.get_alias("APP") {
                apps.extend(app_value.tlv_list().into_iter().cloned());
            }
        }
        Ok(apps)
    }

    fn list_applications_static_aid(&mut self) -> Vec<Tlv> {
        let mut apps = Vec::new();
        for aid in STATIC_AIDS {
            let res = match self.exchange(&Capdu::select_by_name(aid, false)) {
                Ok(res) => res,
                Err(_) => continue,
            };
            if matches!(res.kind(), RapduKind::Error(_)) {
                continue;
            }
            let fci = match res.data.get_alias("FCI").and_then(Value::as_tlv) {
                Some(t) => t,
                None => continue,
            };
            let df_name = fci.get_alias("DF").cloned();
            let app_label = fci
                .get_bytes(&[0xA5])
                .and_then(Value::as_tlv)
                .and_then(|prop| prop.get_alias("APP_LABEL"))
                .cloned();

            // Synthesise a directory entry shaped like the SFI path's output, so callers
            // of list_applications see one consistent shape either way.
            let mut synthetic = Tlv::new();
            if let Some(df_name) = df_name {
                synthetic.insert(Tag::by_alias("ADF_NAME").unwrap(), df_name);
            }
            if let Some(app_label) = app_label {
                synthetic.insert(Tag::by_alias("APP_LABEL").unwrap(), app_label);
            }
            apps.push(synthetic);
        }
        apps
    }

    pub fn select_application(&mut self, adf_name: &[u8]) -> Result<Rapdu> {
        self.exchange(&Capdu::select_by_name(adf_name, false))
            .and_then(Rapdu::into_result)
            .map_err(|_| Error::MissingApplication)
    }

    /// GET DATA for a single `(p1, p2)` tag pair, soft-failing to `None` on any card
    /// error (the reference treats most GET DATA misses as "item absent", not fatal).
    pub fn get_data_item(&mut self, p1: u8, p2: u8) -> Option<Value> {
        let res = self.exchange(&Capdu::get_data(p1, p2)).ok()?;
        let res = res.into_result().ok()?;
        res.data.get_bytes(&[p1, p2]).cloned()
    }

    pub fn get_metadata(&mut self) -> Metadata {
        let mut metadata = Metadata::default();
        if let Some(v) = self.get_data_item(0x9F, 0x17).as_ref().and_then(Value::as_bytes) {
            metadata.pin_retries = v.first().copied();
        }
        if let Some(v) = self.get_data_item(0x9F, 0x36).as_ref().and_then(Value::as_bytes) {
            metadata.atc = Some(crate::util::decode_int(v));
        }
        if let Some(v) = self.get_data_item(0x9F, 0x13).as_ref().and_then(Value::as_bytes) {
            metadata.last_online_atc = Some(crate::util::decode_int(v));
        }
        metadata
    }

    /// GET PROCESSING OPTIONS; starts the transaction and increments the card's ATC.
    pub fn get_processing_options(&mut self) -> Result<ProcessingOptions> {
        let res = self.exchange(&Capdu::gpo(None))?.into_result()?;
        if let Some(bytes) = res.data.get_alias("RMTF1").and_then(Value::as_bytes) {
            if bytes.len() < 2 {
                return Err(Error::Protocol("RMTF1 too short".into()));
            }
            return Ok(ProcessingOptions {
                aip: bytes[..2].to_vec(),
                afl: bytes[2..].to_vec(),
            });
        }
        if let Some(tlv) = res.data.get_alias("RMTF2").and_then(Value::as_tlv) {
            let aip = tlv
                .get_bytes(&[0x82])
                .and_then(Value::as_bytes)
                .ok_or_else(|| Error::Protocol("RMTF2 missing AIP".into()))?
                .to_vec();
            let afl = tlv
                .get_bytes(&[0x94])
                .and_then(Value::as_bytes)
                .ok_or_else(|| Error::Protocol("RMTF2 missing AFL".into()))?
                .to_vec();
            return Ok(ProcessingOptions { aip, afl });
        }
        Err(Error::Protocol("GPO response has no recognised template".into()))
    }

    /// Read every record referenced by an Application File Locator, merging their
    /// contents into one accumulating TLV (in AFL order).
    pub fn get_application_data(&mut self, afl: &[u8]) -> Result<Tlv> {
        if afl.len() % 4 != 0 {
            return Err(Error::Protocol("AFL length is not a multiple of 4".into()));
        }
        let mut data = Tlv::new();
        for group in afl.chunks(4) {
            let sfi = group[0] >> 3;
            let start_rec = group[1];
            let end_rec = group[2];
            for record in start_rec..=end_rec {
                let res = self.read_record(record, Some(sfi))?;
                if let Some(record_tlv) = res.data.get_alias("RECORD").and_then(Value::as_tlv) {
                    data.merge(record_tlv.clone());
                }
            }
        }
        Ok(data)
    }

    /// VERIFY the PIN. A `63 xx` warning means the card rejected it.
    pub fn verify_pin(&mut self, pin: &str) -> Result<Rapdu> {
        let res = self.exchange(&Capdu::verify_pin(pin)?)?;
        match res.kind() {
            RapduKind::Warning(status) => {
                warn!(%status, "PIN verification failed");
                Err(Error::InvalidPin(status))
            }
            RapduKind::Error(status) => Err(Error::card(res.sw1, res.sw2, status)),
            RapduKind::Success => Ok(res),
        }
    }
}
