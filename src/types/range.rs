//! Range and multirange decoding, generic over the element decoder.
use crate::error::DecodeError;
use crate::session::Session;
use crate::value::{PgRange, PgValue};

use super::array::{parse_quoted, parse_unquoted};
use super::read_prefix;

/// Flag bits of the binary range format.
const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

const RANGE_FLAGS: u8 =
    RANGE_EMPTY | RANGE_LB_INC | RANGE_UB_INC | RANGE_LB_INF | RANGE_UB_INF;

fn invalid() -> DecodeError {
    DecodeError::new("invalid range value")
}

fn read_bound<F>(
    session: &Session,
    buf: &[u8],
    pos: &mut usize,
    elem: &F,
) -> Result<PgValue, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    let len = i32::from_be_bytes(read_prefix(&buf[*pos..])?);
    *pos += 4;
    if len < 0 {
        return Err(invalid());
    }
    let val = buf.get(*pos..*pos + len as usize).ok_or_else(invalid)?;
    *pos += len as usize;
    elem(session, val)
}

/// Decode the binary range form: one flags byte, then a length prefixed
/// value per present bound.
pub(crate) fn decode_binary<F>(
    session: &Session,
    buf: &[u8],
    elem: F,
) -> Result<PgValue, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    let flags = *buf.first().ok_or_else(invalid)?;
    if flags & RANGE_FLAGS != flags {
        return Err(DecodeError::new("invalid range flags"));
    }
    let mut pos = 1;

    let range = if flags & RANGE_EMPTY != 0 {
        PgRange::empty()
    } else {
        let bounds = [
            if flags & RANGE_LB_INC != 0 { b'[' } else { b'(' },
            if flags & RANGE_UB_INC != 0 { b']' } else { b')' },
        ];
        let lower = if flags & RANGE_LB_INF != 0 {
            None
        } else {
            Some(read_bound(session, buf, &mut pos, &elem)?)
        };
        let upper = if flags & RANGE_UB_INF != 0 {
            None
        } else {
            Some(read_bound(session, buf, &mut pos, &elem)?)
        };
        let bounds = std::str::from_utf8(&bounds).expect("ascii bounds");
        PgRange::new(lower, upper, Some(bounds))?
    };

    if pos != buf.len() {
        return Err(invalid());
    }
    Ok(PgValue::Range(Box::new(range)))
}

/// Parse one textual range at `pos`: `[` or `(`, optional value, `,`,
/// optional value, `]` or `)`.
fn parse_range<F>(
    session: &Session,
    buf: &[u8],
    pos: &mut usize,
    elem: &F,
) -> Result<PgRange, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    let open = *buf.get(*pos).ok_or_else(invalid)?;
    *pos += 1;

    let lower = match *buf.get(*pos).ok_or_else(invalid)? {
        b'"' => Some(parse_quoted(session, buf, pos, elem)?),
        b',' => None,
        _ => Some(parse_unquoted(session, buf, pos, &[b','], false, elem)?),
    };
    if buf.get(*pos) != Some(&b',') {
        return Err(invalid());
    }
    *pos += 1;

    let upper = match *buf.get(*pos).ok_or_else(invalid)? {
        b'"' => Some(parse_quoted(session, buf, pos, elem)?),
        b']' | b')' => None,
        _ => Some(parse_unquoted(session, buf, pos, &[b']', b')'], false, elem)?),
    };
    let close = *buf.get(*pos).ok_or_else(invalid)?;
    *pos += 1;

    let bounds = [open, close];
    let bounds = std::str::from_utf8(&bounds).map_err(|_| invalid())?;
    PgRange::new(lower, upper, Some(bounds))
}

/// Decode the textual range form, either `empty` or a bracketed pair.
pub(crate) fn decode_text<F>(
    session: &Session,
    buf: &[u8],
    elem: F,
) -> Result<PgValue, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    if buf == b"empty" {
        return Ok(PgValue::Range(Box::new(PgRange::empty())));
    }
    let mut pos = 0;
    let range = parse_range(session, buf, &mut pos, &elem)?;
    if pos != buf.len() {
        return Err(invalid());
    }
    Ok(PgValue::Range(Box::new(range)))
}

/// Decode the binary multirange form: u32 range count, then each range
/// length prefixed in its binary form.
pub(crate) fn decode_multirange_binary<F>(
    session: &Session,
    buf: &[u8],
    elem: F,
) -> Result<PgValue, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    let count = u32::from_be_bytes(read_prefix(buf)?);
    let mut pos = 4;

    let mut ranges = Vec::new();
    for _ in 0..count {
        let len = i32::from_be_bytes(read_prefix(&buf[pos..])?);
        pos += 4;
        if len < 0 {
            return Err(DecodeError::new("invalid multirange value"));
        }
        let raw = buf
            .get(pos..pos + len as usize)
            .ok_or_else(|| DecodeError::new("invalid multirange value"))?;
        match decode_binary(session, raw, &elem)? {
            PgValue::Range(range) => ranges.push(*range),
            _ => unreachable!("range decoder yields ranges"),
        }
        pos += len as usize;
    }

    if pos != buf.len() {
        return Err(DecodeError::new("invalid multirange value"));
    }
    Ok(PgValue::Multirange(ranges))
}

/// Decode the textual multirange form `{range,range,...}`.
pub(crate) fn decode_multirange_text<F>(
    session: &Session,
    buf: &[u8],
    elem: F,
) -> Result<PgValue, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    let invalid = || DecodeError::new("invalid multirange value");
    if buf.first() != Some(&b'{') {
        return Err(invalid());
    }
    let mut pos = 1;

    let mut ranges = Vec::new();
    if buf.get(pos) == Some(&b'}') {
        pos += 1;
    } else {
        loop {
            ranges.push(parse_range(session, buf, &mut pos, &elem)?);
            let c = *buf.get(pos).ok_or_else(invalid)?;
            pos += 1;
            if c == b'}' {
                break;
            }
            if c != b',' {
                return Err(invalid());
            }
        }
    }

    if pos != buf.len() {
        return Err(invalid());
    }
    Ok(PgValue::Multirange(ranges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::numeric;

    fn session() -> Session {
        Session::new()
    }

    fn int4_range_text(b: &[u8]) -> Result<PgValue, DecodeError> {
        decode_text(&session(), b, numeric::txt_int4)
    }

    fn range(lower: Option<i32>, upper: Option<i32>, bounds: &str) -> PgRange {
        PgRange::new(lower.map(PgValue::Int4), upper.map(PgValue::Int4), Some(bounds)).unwrap()
    }

    #[test]
    fn textual_ranges() {
        assert_eq!(
            int4_range_text(b"[1,10)").unwrap(),
            PgValue::Range(Box::new(range(Some(1), Some(10), "[)"))),
        );
        assert_eq!(
            int4_range_text(b"(,10]").unwrap(),
            PgValue::Range(Box::new(range(None, Some(10), "(]"))),
        );
        assert_eq!(
            int4_range_text(b"empty").unwrap(),
            PgValue::Range(Box::new(PgRange::empty())),
        );
    }

    #[test]
    fn textual_range_trailing_garbage() {
        assert!(int4_range_text(b"[1,10)x").is_err());
        assert!(int4_range_text(b"[1 10)").is_err());
    }

    fn bin_range(flags: u8, bounds: &[&[u8]]) -> Vec<u8> {
        let mut out = vec![flags];
        for b in bounds {
            out.extend_from_slice(&(b.len() as i32).to_be_bytes());
            out.extend_from_slice(b);
        }
        out
    }

    #[test]
    fn binary_range_flags() {
        let buf = bin_range(
            RANGE_LB_INC,
            &[&1i32.to_be_bytes(), &10i32.to_be_bytes()],
        );
        assert_eq!(
            decode_binary(&session(), &buf, numeric::bin_int4).unwrap(),
            PgValue::Range(Box::new(range(Some(1), Some(10), "[)"))),
        );

        let buf = bin_range(RANGE_LB_INC | RANGE_UB_INF, &[&1i32.to_be_bytes()]);
        assert_eq!(
            decode_binary(&session(), &buf, numeric::bin_int4).unwrap(),
            PgValue::Range(Box::new(range(Some(1), None, "[)"))),
        );

        let buf = bin_range(RANGE_EMPTY, &[]);
        assert_eq!(
            decode_binary(&session(), &buf, numeric::bin_int4).unwrap(),
            PgValue::Range(Box::new(PgRange::empty())),
        );
    }

    #[test]
    fn binary_range_unknown_flags() {
        let buf = bin_range(0x20, &[]);
        assert!(decode_binary(&session(), &buf, numeric::bin_int4).is_err());
    }

    #[test]
    fn binary_multirange() {
        let first = bin_range(RANGE_LB_INC, &[&1i32.to_be_bytes(), &3i32.to_be_bytes()]);
        let second = bin_range(RANGE_LB_INC, &[&5i32.to_be_bytes(), &7i32.to_be_bytes()]);
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_be_bytes());
        for r in [&first, &second] {
            buf.extend_from_slice(&(r.len() as i32).to_be_bytes());
            buf.extend_from_slice(r);
        }

        assert_eq!(
            decode_multirange_binary(&session(), &buf, numeric::bin_int4).unwrap(),
            PgValue::Multirange(vec![
                range(Some(1), Some(3), "[)"),
                range(Some(5), Some(7), "[)"),
            ]),
        );
    }

    #[test]
    fn textual_multirange() {
        assert_eq!(
            decode_multirange_text(&session(), b"{[1,3),[5,7)}", numeric::txt_int4).unwrap(),
            PgValue::Multirange(vec![
                range(Some(1), Some(3), "[)"),
                range(Some(5), Some(7), "[)"),
            ]),
        );
        assert_eq!(
            decode_multirange_text(&session(), b"{}", numeric::txt_int4).unwrap(),
            PgValue::Multirange(vec![]),
        );
        assert!(decode_multirange_text(&session(), b"{[1,3)", numeric::txt_int4).is_err());
    }
}
