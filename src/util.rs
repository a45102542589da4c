//! Byte/decimal/BCD helpers used by the CAP module and the CLI.
//!
//! Grounded on `emv/util.py` (`hex_int`, `format_bytes`) in the original reference
//! implementation.

/// Render a decimal integer as "BCD-in-hex": each decimal digit pair becomes one byte.
///
/// `123456 -> [0x12, 0x34, 0x56]`, `65432 -> [0x06, 0x54, 0x32]` (odd-length strings are
/// left-padded with a `0` digit first).
pub fn hex_int(val: u64) -> Vec<u8> {
    let mut s = val.to_string();
    if s.len() % 2 != 0 {
        s.insert(0, '0');
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).expect("ascii digits");
            u8::from_str_radix(pair, 16).expect("decimal digit pair is valid hex")
        })
        .collect()
}

/// `[DE AD BE EF]`-style bracketed uppercase hex, matching the reference's `format_bytes`.
pub fn format_bytes(data: &[u8]) -> String {
    let body = data
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    format!("[{}]", body).to_uppercase()
}

/// Decode a big-endian byte sequence as an unsigned integer.
pub fn decode_int(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Is bit `i` (0 = least significant) set in `byte`?
pub fn bit_set(byte: u8, i: u32) -> bool {
    byte & (1 << i) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_int_even() {
        assert_eq!(hex_int(123456), vec![0x12, 0x34, 0x56]);
    }

    #[test]
    fn hex_int_odd_pads() {
        assert_eq!(hex_int(65432), vec![0x06, 0x54, 0x32]);
    }

    #[test]
    fn format_bytes_matches() {
        assert_eq!(format_bytes(&[0xde, 0xad]), "[DE AD]");
    }

    #[test]
    fn decode_int_big_endian() {
        assert_eq!(decode_int(&[0x01, 0x02]), 0x0102);
    }

    #[test]
    fn bit_set_lsb() {
        assert!(bit_set(0b0000_0001, 0));
        assert!(!bit_set(0b0000_0001, 1));
        assert!(bit_set(0b1000_0000, 7));
    }
}
