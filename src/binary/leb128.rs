//! ULEB128/SLEB128 decoding for the integer widths the binary format uses.
//! Overlong encodings (more bytes than the target width permits, or padding
//! bits outside it) are rejected.

use super::Result;
use crate::error::{DecodeError, DecodeErrorKind};

use super::cursor::Cursor;

/// Decode an unsigned LEB128 as u32 (max 5 bytes).
pub fn read_uleb_u32(cur: &mut Cursor) -> Result<u32> {
    read_uleb_generic(cur, 32).map(|v| v as u32)
}

/// Decode an unsigned LEB128 as u64 (max 10 bytes).
pub fn read_uleb_u64(cur: &mut Cursor) -> Result<u64> {
    read_uleb_generic(cur, 64)
}

/// Decode a signed LEB128 as i32 (max 5 bytes).
pub fn read_sleb_i32(cur: &mut Cursor) -> Result<i32> {
    read_sleb_generic(cur, 32).map(|v| v as i32)
}

/// Decode a signed LEB128 as i64 (max 10 bytes).
pub fn read_sleb_i64(cur: &mut Cursor) -> Result<i64> {
    read_sleb_generic(cur, 64)
}

/// Decode a signed 33-bit LEB128, the encoding block types use.
pub fn read_sleb_i33(cur: &mut Cursor) -> Result<i64> {
    read_sleb_generic(cur, 33)
}

fn bad_leb(cur: &Cursor) -> DecodeError {
    DecodeError::new(DecodeErrorKind::BadLeb, cur.offset())
}

fn read_uleb_generic(cur: &mut Cursor, bits: u32) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let max_bytes = (bits + 6) / 7;

    for _ in 0..max_bytes {
        let byte = cur.read_u8()?;
        let low = (byte & 0x7F) as u64;
        result |= low << shift;
        if (byte & 0x80) == 0 {
            // Final byte: bits beyond the target width must be zero.
            if shift + 7 > bits && (low >> (bits - shift)) != 0 {
                return Err(bad_leb(cur));
            }
            return Ok(result);
        }
        shift += 7;
    }
    // Continuation bit still set after the maximum byte count.
    Err(bad_leb(cur))
}

fn read_sleb_generic(cur: &mut Cursor, bits: u32) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let max_bytes = (bits + 6) / 7;

    for _ in 0..max_bytes {
        let byte = cur.read_u8()?;
        let low = (byte & 0x7F) as i64;
        result |= low << shift;
        shift += 7;
        if (byte & 0x80) == 0 {
            if shift < 64 && (byte & 0x40) != 0 {
                // Sign extend.
                result |= !0i64 << shift;
            }
            // Reject values outside the signed target width.
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if result < min || result > max {
                    return Err(bad_leb(cur));
                }
            }
            return Ok(result);
        }
    }
    Err(bad_leb(cur))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uleb32_basic() {
        let mut c = Cursor::new(&[0xE5, 0x8E, 0x26]); // 624485
        assert_eq!(read_uleb_u32(&mut c).unwrap(), 624485);
    }

    #[test]
    fn uleb32_max() {
        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(read_uleb_u32(&mut c).unwrap(), u32::MAX);
    }

    #[test]
    fn sleb32_basic() {
        // -624485 encoded as SLEB128: 9b f1 59
        let mut c = Cursor::new(&[0x9B, 0xF1, 0x59]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), -624485);
    }

    #[test]
    fn sleb32_min_max() {
        let mut c = Cursor::new(&[0x80, 0x80, 0x80, 0x80, 0x78]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), i32::MIN);
        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), i32::MAX);
    }

    #[test]
    fn sleb64_negative_one() {
        let mut c = Cursor::new(&[0x7F]);
        assert_eq!(read_sleb_i64(&mut c).unwrap(), -1);
    }

    #[test]
    fn uleb32_overlong_rejected() {
        // Six continuation bytes cannot encode a u32.
        let bytes = [0xFFu8; 6];
        let mut c = Cursor::new(&bytes);
        let err = read_uleb_u32(&mut c).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::BadLeb);
    }

    #[test]
    fn uleb32_padding_bits_rejected() {
        // Fifth byte carries bits above bit 31.
        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert_eq!(
            read_uleb_u32(&mut c).unwrap_err().kind,
            DecodeErrorKind::BadLeb
        );
    }

    #[test]
    fn truncated_leb_is_eof() {
        let mut c = Cursor::new(&[0x80]);
        assert_eq!(
            read_uleb_u32(&mut c).unwrap_err().kind,
            DecodeErrorKind::UnexpectedEof
        );
    }
}
