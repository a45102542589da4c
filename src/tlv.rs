//! BER-TLV structures: the generic `Tlv`/`Value` tree plus the typed sub-encodings EMV
//! layers on top of it (`Dol`, `TagList`, `CvmList`, `Auc`, `Asrpd`).
//!
//! Grounded on `emv/protocol/structures.py` (`TLV`, `DOL`, `TagList`, `CVMRule`, `CVMList`,
//! `AUC`, `ASRPD`) for the algorithms, and `src/ber.rs`'s parsing idiom for how the tag/
//! length reads are threaded through.

use crate::dict::Parse;
use crate::tag::{read_length, read_tag, Tag};
use crate::util::{bit_set, decode_int, format_bytes};
use std::collections::HashMap;

/// The value half of a TLV entry. `Many` holds repeated occurrences of the same tag at
/// one nesting level, in encounter order — EMV cards do emit these (e.g. multiple
/// `Application Template` entries under one PSE directory record).
#[derive(Clone, Debug)]
pub enum Value {
    Bytes(Vec<u8>),
    Tlv(Tlv),
    Dol(Dol),
    TagList(TagList),
    Cvm(CvmList),
    Auc(Auc),
    Asrpd(Asrpd),
    Many(Vec<Value>),
}

impl Value {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tlv(&self) -> Option<&Tlv> {
        match self {
            Value::Tlv(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_dol(&self) -> Option<&Dol> {
        match self {
            Value::Dol(d) => Some(d),
            _ => None,
        }
    }

    /// Normalise a value that may be one constructed TLV or several (duplicate tags
    /// promoted to `Many`) into a flat list, in encounter order.
    pub fn tlv_list(&self) -> Vec<&Tlv> {
        match self {
            Value::Tlv(t) => vec![t],
            Value::Many(items) => items.iter().flat_map(|v| v.tlv_list()).collect(),
            _ => Vec::new(),
        }
    }
}

/// An insertion-ordered TLV tree. Iteration order matches the order tags were first seen
/// on the wire, which matters both for display and for CAP's byte-flattening step.
#[derive(Clone, Debug, Default)]
pub struct Tlv {
    entries: Vec<(Tag, Value)>,
    /// Set only for the "too short to be a real TLV" pass-through case (see `parse`).
    raw: Option<Vec<u8>>,
}

impl Tlv {
    pub fn new() -> Self {
        Tlv::default()
    }

    /// Parse a BER-TLV byte string into a tree.
    ///
    /// A buffer shorter than 3 bytes can't contain even one minimal tag+length+value, but
    /// some cards send exactly that (a bare `[0x61]`) in edge cases; rather than treat it
    /// as an error, the bytes are kept verbatim and can be recovered via `raw_passthrough`.
    pub fn parse(data: &[u8]) -> Tlv {
        if data.len() < 3 {
            return Tlv {
                entries: Vec::new(),
                raw: Some(data.to_vec()),
            };
        }

        let mut tlv = Tlv::new();
        let mut i = 0usize;
        while i < data.len() {
            let (tag, tag_len) = match read_tag(&data[i..]) {
                Ok(v) => v,
                Err(_) => break,
            };
            i += tag_len;
            if i >= data.len() {
                break;
            }

            let (length, len_len) = match read_length(&data[i..]) {
                Ok(v) => v,
                Err(_) => break,
            };
            i += len_len;

            if i + length > data.len() {
                break;
            }
            let raw_value = &data[i..i + length];

            let value = if tag.is_constructed() {
                Value::Tlv(Tlv::parse(raw_value))
            } else {
                parse_element(&tag, raw_value)
            };

            tlv.insert(tag, value);
            i += length;
        }
        tlv
    }

    /// The raw bytes of a too-short-to-parse buffer, if this is that case.
    pub fn raw_passthrough(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    pub fn insert(&mut self, tag: Tag, value: Value) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(t, _)| *t == tag) {
            match existing {
                Value::Many(items) => items.push(value),
                _ => {
                    let prev = std::mem::replace(existing, Value::Bytes(Vec::new()));
                    *existing = Value::Many(vec![prev, value]);
                }
            }
        } else {
            self.entries.push((tag, value));
        }
    }

    pub fn get(&self, tag: &Tag) -> Option<&Value> {
        self.entries.iter().find(|(t, _)| t == tag).map(|(_, v)| v)
    }

    pub fn get_bytes(&self, tag_bytes: &[u8]) -> Option<&Value> {
        self.get(&Tag::new(tag_bytes.to_vec()))
    }

    pub fn get_alias(&self, alias: &str) -> Option<&Value> {
        let tag = Tag::by_alias(alias)?;
        self.get(&tag)
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.get(tag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Tag, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another TLV's entries into this one, in order (used to accumulate AFL records).
    pub fn merge(&mut self, other: Tlv) {
        for (tag, value) in other.entries {
            self.insert(tag, value);
        }
    }

    /// Flatten every value at this level, in insertion order, into one byte sequence.
    /// Used by CAP to build the bit-selection input from a GEN AC response. Only
    /// meaningful for TLVs whose values are plain byte strings (as GAC responses are).
    pub fn flatten(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (_, value) in &self.entries {
            flatten_value(value, &mut out);
        }
        out
    }
}

fn flatten_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bytes(b) => out.extend_from_slice(b),
        Value::Many(items) => items.iter().for_each(|v| flatten_value(v, out)),
        Value::Tlv(t) => out.extend(t.flatten()),
        _ => {}
    }
}

fn parse_element(tag: &Tag, raw: &[u8]) -> Value {
    match tag.parse_kind() {
        Parse::Dol => Value::Dol(Dol::parse(raw)),
        Parse::TagList => Value::TagList(TagList::parse(raw)),
        Parse::Asrpd => Value::Asrpd(Asrpd::parse(raw)),
        Parse::CvmList => Value::Cvm(CvmList::parse(raw)),
        Parse::Auc => Value::Auc(Auc::parse(raw)),
        _ => Value::Bytes(raw.to_vec()),
    }
}

/// Render a single element for display, honouring redaction of sensitive tags.
pub fn render_element(tag: &Tag, value: &Value, redact: bool) -> String {
    if redact && tag.is_sensitive() {
        return "[REDACTED]".to_string();
    }
    match (tag.parse_kind(), value) {
        (Parse::Ascii, Value::Bytes(b)) => format!("\"{}\"", String::from_utf8_lossy(b)),
        (Parse::Dec | Parse::Int, Value::Bytes(b)) => decode_int(b).to_string(),
        (Parse::Date, Value::Bytes(b)) if b.len() == 3 => {
            format!("{:02X}/{:02X}/{:02X}", b[0], b[1], b[2])
        }
        (Parse::Country, Value::Bytes(b)) => {
            let numeric = bcd_numeric(b);
            match crate::dict::country_alpha3(numeric) {
                Some(alpha) => alpha.to_string(),
                None => format!("{:03}", numeric),
            }
        }
        (Parse::Currency, Value::Bytes(b)) => {
            let numeric = bcd_numeric(b);
            match crate::dict::currency_alpha3(numeric) {
                Some(alpha) => alpha.to_string(),
                None => format!("{:03}", numeric),
            }
        }
        (_, Value::Bytes(b)) => format_bytes(b),
        (_, Value::Tlv(t)) => format!("{:?}", t),
        _ => format!("{:?}", value),
    }
}

/// Decode a BCD-packed numeric field (two decimal digits per byte), as used by EMV `n`
/// fields such as the ISO 3166-1/4217 numeric codes in the country/currency tags.
fn bcd_numeric(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &byte| {
        let hi = (byte >> 4) as u16;
        let lo = (byte & 0x0F) as u16;
        acc.wrapping_mul(100) + hi * 10 + lo
    })
}

/// Data Object List: an ordered `(tag, length)` schedule for a future payload.
#[derive(Clone, Debug, Default)]
pub struct Dol(Vec<(Tag, usize)>);

impl Dol {
    pub fn parse(data: &[u8]) -> Dol {
        let mut entries = Vec::new();
        let mut i = 0;
        while i < data.len() {
            let (tag, tag_len) = match read_tag(&data[i..]) {
                Ok(v) => v,
                Err(_) => break,
            };
            i += tag_len;
            if i >= data.len() {
                break;
            }
            let length = data[i] as usize;
            i += 1;
            entries.push((tag, length));
        }
        Dol(entries)
    }

    pub fn size(&self) -> usize {
        self.0.iter().map(|(_, len)| len).sum()
    }

    pub fn entries(&self) -> &[(Tag, usize)] {
        &self.0
    }

    /// Slice `data` up according to this DOL's schedule, in order.
    pub fn unserialise(&self, data: &[u8]) -> crate::Result<Tlv> {
        if data.len() != self.size() {
            return Err(crate::Error::Protocol(format!(
                "incorrect input size (expecting {} bytes, got {})",
                self.size(),
                data.len()
            )));
        }
        let mut tlv = Tlv::new();
        let mut i = 0;
        for (tag, length) in &self.0 {
            tlv.insert(tag.clone(), Value::Bytes(data[i..i + length].to_vec()));
            i += length;
        }
        Ok(tlv)
    }

    /// Pack `values` according to this DOL's schedule. Missing tags become zero-filled
    /// runs; short values are left-padded with zero bytes; over-long values are an error.
    pub fn serialise(&self, values: &HashMap<Tag, Vec<u8>>) -> crate::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size());
        for (tag, length) in &self.0 {
            let value = values.get(tag).cloned().unwrap_or_else(|| vec![0u8; *length]);
            if value.len() < *length {
                let mut padded = vec![0u8; length - value.len()];
                padded.extend(value);
                out.extend(padded);
            } else if value.len() > *length {
                return Err(crate::Error::Protocol(format!(
                    "data for tag {} is too long",
                    tag
                )));
            } else {
                out.extend(value);
            }
        }
        Ok(out)
    }
}

/// A list of tags (e.g. the Static Data Authentication Tag List).
#[derive(Clone, Debug, Default)]
pub struct TagList(Vec<Tag>);

impl TagList {
    pub fn parse(data: &[u8]) -> TagList {
        let mut tags = Vec::new();
        let mut i = 0;
        while i < data.len() {
            match read_tag(&data[i..]) {
                Ok((tag, len)) => {
                    i += len;
                    tags.push(tag);
                }
                Err(_) => break,
            }
        }
        TagList(tags)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.0
    }
}

/// One rule in a Cardholder Verification Method list. EMV 4.3 Book 3 Appendix C3.
#[derive(Clone, Debug)]
pub struct CvmRule {
    pub b1: u8,
    pub b2: u8,
}

impl CvmRule {
    const RULES: &'static [(u8, &'static str)] = &[
        (0b0000_0001, "Plaintext PIN verification performed by ICC"),
        (0b0000_0010, "Enciphered PIN verified online"),
        (
            0b0000_0011,
            "Plaintext PIN verification performed by ICC and signature (paper)",
        ),
        (0b0000_0100, "Enciphered PIN verification performed by ICC"),
        (
            0b0000_0101,
            "Enciphered PIN verification performed by ICC and signature (paper)",
        ),
        (0b0001_1110, "Signature (paper)"),
        (0b0011_1111, "No CVM required"),
    ];

    const CODES: &'static [(u8, &'static str)] = &[
        (0, "Always"),
        (1, "If unattended cash"),
        (
            2,
            "If not unattended cash and not manual cash and not purchase with cashback",
        ),
        (3, "If terminal supports the CVM"),
        (4, "If manual cash"),
        (5, "If purchase with cashback"),
        (
            6,
            "If transaction is in the application currency and is under X value",
        ),
        (
            7,
            "If transaction is in the application currency and is over X value",
        ),
        (
            8,
            "If transaction is in the application currency and is under Y value",
        ),
        (
            9,
            "If transaction is in the application currency and is over Y value",
        ),
    ];

    pub fn rule_repr(&self) -> &'static str {
        Self::RULES
            .iter()
            .find(|(mask, _)| self.b1 & mask == *mask)
            .map(|(_, s)| *s)
            .unwrap_or("Fail CVM processing")
    }

    pub fn code_repr(&self) -> &'static str {
        Self::CODES
            .iter()
            .find(|(code, _)| *code == self.b2)
            .map(|(_, s)| *s)
            .unwrap_or("Unknown condition")
    }

    pub fn fail_if_unsuccessful(&self) -> bool {
        self.b1 & 0b0100_0000 != 0
    }
}

/// Cardholder Verification Method list: amounts plus an ordered set of rules.
/// EMV 4.3 Book 3 section 10.5.
#[derive(Clone, Debug, Default)]
pub struct CvmList {
    pub x: Option<u64>,
    pub y: Option<u64>,
    pub rules: Vec<CvmRule>,
}

impl CvmList {
    pub fn parse(data: &[u8]) -> CvmList {
        if data.len() < 10 || data.len() % 2 != 0 {
            return CvmList::default();
        }
        let x = decode_int(&data[0..4]);
        let y = decode_int(&data[4..8]);
        let mut rules = Vec::new();
        let mut i = 8;
        while i + 1 < data.len() {
            rules.push(CvmRule {
                b1: data[i],
                b2: data[i + 1],
            });
            i += 2;
        }
        CvmList {
            x: Some(x),
            y: Some(y),
            rules,
        }
    }
}

/// Application Usage Control: two bytes of usage-restriction flags.
#[derive(Clone, Debug, Default)]
pub struct Auc {
    pub b1: u8,
    pub b2: u8,
}

impl Auc {
    const B1_FIELDS: &'static [&'static str] = &[
        "Valid for domestic cash transactions",
        "Valid for international cash transactions",
        "Valid for domestic goods",
        "Valid for international goods",
        "Valid for domestic services",
        "Valid for international services",
        "Valid at ATMs",
        "Valid at terminals other than ATMs",
    ];

    const B2_FIELDS: &'static [&'static str] =
        &["Domestic cashback allowed", "International cashback allowed"];

    pub fn parse(data: &[u8]) -> Auc {
        if data.len() != 2 {
            return Auc::default();
        }
        Auc {
            b1: data[0],
            b2: data[1],
        }
    }

    pub fn get_uses(&self) -> Vec<&'static str> {
        let mut uses = Vec::new();
        for (i, field) in Self::B1_FIELDS.iter().enumerate() {
            if bit_set(self.b1, i as u32) {
                uses.push(*field);
            }
        }
        for (i, field) in Self::B2_FIELDS.iter().enumerate() {
            if bit_set(self.b2, i as u32) {
                uses.push(*field);
            }
        }
        uses
    }
}

/// Application Selection Registered Proprietary Data list: an "almost-TLV" structure in
/// the FCI Discretionary Data object, keyed by a 2-byte ASCII-decimal product identifier.
#[derive(Clone, Debug, Default)]
pub struct Asrpd(HashMap<String, Vec<u8>>);

impl Asrpd {
    pub fn parse(data: &[u8]) -> Asrpd {
        let mut map = HashMap::new();
        let mut i = 0;
        while i + 2 < data.len() {
            let pdi = format!("{:02}{:02}", data[i], data[i + 1]);
            i += 2;
            let length = data[i] as usize;
            i += 1;
            if i + length > data.len() {
                break;
            }
            map.insert(pdi, data[i..i + length].to_vec());
            i += length;
        }
        Asrpd(map)
    }

    pub fn get(&self, pdi: &str) -> Option<&[u8]> {
        self.0.get(pdi).map(|v| v.as_slice())
    }

    pub fn product_id(&self) -> Option<&'static str> {
        self.get("0001").and_then(|v| v.first()).map(|b| crate::dict::epc_product_id(*b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_fci() {
        let tlv = Tlv::parse(&[
            0x6F, 0x1D, 0x84, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x03, 0x80, 0x02, 0xA5, 0x12, 0x50,
            0x08, 0x42, 0x41, 0x52, 0x43, 0x4C, 0x41, 0x59, 0x53, 0x87, 0x01, 0x00, 0x5F, 0x2D,
            0x02, 0x65, 0x6E,
        ]);
        let fci = tlv.get_alias("FCI").unwrap().as_tlv().unwrap();
        let prop = fci.get_bytes(&[0xA5]).unwrap().as_tlv().unwrap();
        let label = prop.get_bytes(&[0x50]).unwrap().as_bytes().unwrap();
        assert_eq!(label, b"BARCLAYS");
    }

    #[test]
    fn too_short_is_raw_passthrough() {
        let tlv = Tlv::parse(&[0x61]);
        assert_eq!(tlv.raw_passthrough(), Some(&[0x61][..]));
        assert!(tlv.is_empty());
    }

    #[test]
    fn duplicate_tags_become_many() {
        let mut tlv = Tlv::new();
        let tag = Tag::new(vec![0x61]);
        tlv.insert(tag.clone(), Value::Bytes(vec![1]));
        tlv.insert(tag.clone(), Value::Bytes(vec![2]));
        match tlv.get(&tag).unwrap() {
            Value::Many(items) => assert_eq!(items.len(), 2),
            other => panic!("expected Many, got {:?}", other),
        }
    }

    #[test]
    fn dol_round_trips() {
        let dol = Dol::parse(&[
            0x9F, 0x02, 0x06, 0x9F, 0x03, 0x06, 0x9F, 0x1A, 0x02, 0x95, 0x05, 0x5F, 0x2A, 0x02,
            0x9A, 0x03, 0x9C, 0x01, 0x9F, 0x37, 0x04,
        ]);
        assert_eq!(dol.size(), 29);
        let input = vec![0u8; 29];
        let tlv = dol.unserialise(&input).unwrap();
        let mut values = HashMap::new();
        for (tag, length) in dol.entries() {
            values.insert(tag.clone(), tlv.get(tag).unwrap().as_bytes().unwrap()[..*length].to_vec());
        }
        assert_eq!(dol.serialise(&values).unwrap(), input);
    }

    #[test]
    fn dol_serialise_pads_short_values() {
        let dol = Dol::parse(&[0x9A, 0x03]);
        let mut values = HashMap::new();
        values.insert(Tag::new(vec![0x9A]), vec![0x01]);
        assert_eq!(dol.serialise(&values).unwrap(), vec![0x00, 0x00, 0x01]);
    }

    #[test]
    fn dol_serialise_rejects_overlong_values() {
        let dol = Dol::parse(&[0x9A, 0x01]);
        let mut values = HashMap::new();
        values.insert(Tag::new(vec![0x9A]), vec![0x01, 0x02]);
        assert!(dol.serialise(&values).is_err());
    }

    #[test]
    fn cvm_list_parses() {
        let mut data = vec![0u8; 8];
        data[3] = 0x64; // x = 100
        data[7] = 0xC8; // y = 200
        data.extend_from_slice(&[0b0011_1111, 0x00]); // "No CVM required", Always
        let list = CvmList::parse(&data);
        assert_eq!(list.x, Some(100));
        assert_eq!(list.y, Some(200));
        assert_eq!(list.rules.len(), 1);
        assert_eq!(list.rules[0].rule_repr(), "No CVM required");
        assert_eq!(list.rules[0].code_repr(), "Always");
        assert!(!list.rules[0].fail_if_unsuccessful());
    }

    #[test]
    fn auc_lists_uses() {
        let auc = Auc::parse(&[0b1000_0000, 0b0000_0001]);
        let uses = auc.get_uses();
        assert!(uses.contains(&"Valid at terminals other than ATMs"));
        assert!(uses.contains(&"Domestic cashback allowed"));
    }

    #[test]
    fn asrpd_decodes_product_id() {
        // PDI bytes are raw integers formatted as 2-digit decimal, not ASCII digits.
        let asrpd = Asrpd::parse(&[0x00, 0x01, 0x01, 0x02]);
        assert_eq!(asrpd.get("0001"), Some(&[0x02][..]));
        assert_eq!(asrpd.product_id(), Some("Credit"));
    }
}
