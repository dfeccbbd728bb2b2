//! Text, bytea and uuid conversions.
use uuid::Uuid;

use crate::error::DecodeError;
use crate::session::Session;
use crate::value::PgValue;

use super::utf8;

pub(crate) fn decode_text(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Text(utf8(buf)?.to_owned()))
}

// ===== bytea =====

fn hex_nibble(b: u8) -> Result<u8, DecodeError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(DecodeError::new("invalid hex digit in bytea value")),
    }
}

/// Textual bytea comes in two forms: `\x`-prefixed hex, or the historical
/// escape format with `\\` and octal `\nnn` sequences.
pub(crate) fn txt_bytea(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    if let Some(hex) = buf.strip_prefix(b"\\x") {
        if hex.len() % 2 != 0 {
            return Err(DecodeError::new("odd number of hex digits in bytea value"));
        }
        let mut out = Vec::with_capacity(hex.len() / 2);
        for pair in hex.chunks_exact(2) {
            out.push(hex_nibble(pair[0])? << 4 | hex_nibble(pair[1])?);
        }
        return Ok(PgValue::Bytes(out));
    }

    let mut out = Vec::with_capacity(buf.len());
    let mut iter = buf.iter().copied();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(o1 @ b'0'..=b'3') => {
                let (Some(o2), Some(o3)) = (iter.next(), iter.next()) else {
                    return Err(DecodeError::new("truncated bytea escape"));
                };
                if !(b'0'..=b'7').contains(&o2) || !(b'0'..=b'7').contains(&o3) {
                    return Err(DecodeError::new("invalid bytea escape"));
                }
                out.push((o1 - b'0') * 64 + (o2 - b'0') * 8 + (o3 - b'0'));
            }
            _ => return Err(DecodeError::new("invalid bytea escape")),
        }
    }
    Ok(PgValue::Bytes(out))
}

pub(crate) fn bin_bytea(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Bytes(buf.to_vec()))
}

// ===== uuid =====

pub(crate) fn txt_uuid(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let val = Uuid::parse_str(utf8(buf)?).map_err(|_| DecodeError::new("invalid uuid value"))?;
    Ok(PgValue::Uuid(val))
}

pub(crate) fn bin_uuid(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let val = Uuid::from_slice(buf).map_err(|_| DecodeError::new("invalid uuid value"))?;
    Ok(PgValue::Uuid(val))
}

// ===== jsonb =====

/// Binary jsonb is the text form behind a one byte version header.
pub(crate) fn bin_jsonb(session: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    match buf.first() {
        Some(1) => decode_text(session, &buf[1..]),
        _ => Err(DecodeError::new("invalid jsonb version")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new()
    }

    #[test]
    fn bytea_hex_form() {
        let val = txt_bytea(&session(), b"\\x01ff7a").unwrap();
        assert_eq!(val, PgValue::Bytes(vec![0x01, 0xff, 0x7a]));
    }

    #[test]
    fn bytea_escape_form() {
        let val = txt_bytea(&session(), b"ab\\\\cd\\001").unwrap();
        assert_eq!(val, PgValue::Bytes(b"ab\\cd\x01".to_vec()));
    }

    #[test]
    fn bytea_bad_escape_is_rejected() {
        assert!(txt_bytea(&session(), b"ab\\9").is_err());
        assert!(txt_bytea(&session(), b"\\x0").is_err());
    }

    #[test]
    fn uuid_both_formats() {
        let u = Uuid::parse_str("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap();
        assert_eq!(
            txt_uuid(&session(), b"a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap(),
            PgValue::Uuid(u),
        );
        assert_eq!(bin_uuid(&session(), u.as_bytes()).unwrap(), PgValue::Uuid(u));
    }

    #[test]
    fn jsonb_requires_version_header() {
        assert_eq!(
            bin_jsonb(&session(), b"\x01{\"a\":1}").unwrap(),
            PgValue::Text("{\"a\":1}".into()),
        );
        assert!(bin_jsonb(&session(), b"\x02{}").is_err());
    }
}
