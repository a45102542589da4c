//! `Tag`: the identifier half of a BER-TLV data element.
//!
//! Wraps the raw tag bytes parsed by [`crate::ber`], and adds the lookup-by-dictionary
//! behaviour the rest of the crate needs: a human name, an optional short alias, and the
//! parse kind that decides how a TLV parser should interpret the value that follows it.
//!
//! Grounded on `emv/protocol/data.py`'s `Tag` class (ordering via `total_ordering`,
//! `__eq__`/`__hash__` on the underlying byte value, shortname lookup via `ELEMENT_TABLE`).

use crate::ber;
use crate::dict;
use std::fmt;

#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Tag(Vec<u8>);

impl Tag {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Tag(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_constructed(&self) -> bool {
        ber::is_constructed(&self.0)
    }

    pub fn entry(&self) -> Option<&'static dict::DictEntry> {
        dict::lookup_tag(&self.0)
    }

    pub fn name(&self) -> Option<&'static str> {
        self.entry().map(|e| e.name)
    }

    pub fn alias(&self) -> Option<&'static str> {
        self.entry().and_then(|e| e.alias)
    }

    pub fn parse_kind(&self) -> dict::Parse {
        self.entry().map(|e| e.parse).unwrap_or(dict::Parse::Bytes)
    }

    pub fn is_sensitive(&self) -> bool {
        dict::is_sensitive(&self.0)
    }

    /// Look up a tag by its short alias (e.g. `"PAN"`, `"CDOL1"`).
    pub fn by_alias(alias: &str) -> Option<Tag> {
        dict::lookup_alias(alias).map(|e| Tag::new(e.tag.to_vec()))
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            write!(f, "{} ({})", crate::util::format_bytes(&self.0), name)
        } else {
            write!(f, "{}", crate::util::format_bytes(&self.0))
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}

/// Reads a variable-length tag from the start of `data`, returning the tag and the
/// number of bytes consumed from `data`.
pub fn read_tag(data: &[u8]) -> Result<(Tag, usize), crate::Error> {
    let (rest, raw) = ber::take_tag(data)
        .map_err(|_| crate::Error::Protocol("truncated tag".into()))?;
    Ok((Tag::new(raw.to_vec()), data.len() - rest.len()))
}

/// Reads a BER length field, returning the length and bytes consumed.
pub fn read_length(data: &[u8]) -> Result<(usize, usize), crate::Error> {
    let (rest, len) =
        ber::take_len(data).map_err(|_| crate::Error::Protocol("malformed length".into()))?;
    Ok((len, data.len() - rest.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_short_tag() {
        let (tag, consumed) = read_tag(&[0x5A, 0x01]).unwrap();
        assert_eq!(tag.bytes(), &[0x5A]);
        assert_eq!(consumed, 1);
        assert_eq!(tag.alias(), Some("PAN"));
    }

    #[test]
    fn reads_two_byte_tag() {
        let (tag, consumed) = read_tag(&[0x9F, 0x37, 0x04]).unwrap();
        assert_eq!(tag.bytes(), &[0x9F, 0x37]);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn equality_by_value() {
        assert_eq!(Tag::new(vec![0x5A]), Tag::new(vec![0x5A]));
        assert_ne!(Tag::new(vec![0x5A]), Tag::new(vec![0x5B]));
    }

    #[test]
    fn by_alias_roundtrips() {
        let tag = Tag::by_alias("CDOL1").unwrap();
        assert_eq!(tag.bytes(), &[0x8C]);
    }
}
