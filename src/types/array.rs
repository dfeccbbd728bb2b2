//! Array decoding, text and binary, generic over the element decoder.
use crate::error::DecodeError;
use crate::session::Session;
use crate::value::PgValue;

use super::read_prefix;
use crate::postgres::Oid;

/// Arrays nest at most this deep, matching the server limit.
pub(crate) const MAX_ARRAY_DIMS: usize = 6;

fn invalid() -> DecodeError {
    DecodeError::new("invalid array value")
}

/// Parse a quoted element starting at the opening quote.
///
/// `\` escapes the next byte and `""` escapes a quote. Advances past the
/// closing quote.
pub(crate) fn parse_quoted<T>(
    session: &Session,
    buf: &[u8],
    pos: &mut usize,
    elem: impl Fn(&Session, &[u8]) -> Result<T, DecodeError>,
) -> Result<T, DecodeError> {
    debug_assert_eq!(buf[*pos], b'"');
    *pos += 1;

    let mut out = Vec::new();
    let mut escaped = false;
    while *pos < buf.len() {
        let c = buf[*pos];
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == b'\\' {
            escaped = true;
        } else if c == b'"' {
            if buf.get(*pos + 1) == Some(&b'"') {
                escaped = true;
            } else {
                *pos += 1;
                return elem(session, &out);
            }
        } else {
            out.push(c);
        }
        *pos += 1;
    }
    Err(invalid())
}

/// Parse an unquoted element up to one of `delims` (exclusive).
///
/// The unquoted literal `NULL` is recognised case-sensitively. When
/// `end_ok` the element may also run to the end of the buffer.
pub(crate) fn parse_unquoted(
    session: &Session,
    buf: &[u8],
    pos: &mut usize,
    delims: &[u8],
    end_ok: bool,
    elem: impl Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
) -> Result<PgValue, DecodeError> {
    let start = *pos;
    while *pos < buf.len() && !delims.contains(&buf[*pos]) {
        *pos += 1;
    }
    if *pos == buf.len() && !end_ok {
        return Err(invalid());
    }

    let raw = &buf[start..*pos];
    if raw == b"NULL" {
        return Ok(PgValue::Null);
    }
    elem(session, raw)
}

fn parse_array<F>(
    session: &Session,
    buf: &[u8],
    pos: &mut usize,
    delim: u8,
    depth: usize,
    elem: &F,
) -> Result<Vec<PgValue>, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    if depth > MAX_ARRAY_DIMS {
        return Err(DecodeError::new("number of array dimensions exceeded"));
    }
    debug_assert_eq!(buf[*pos], b'{');
    *pos += 1;

    let delims = [delim, b'}'];
    let mut vals = Vec::new();
    loop {
        let c = *buf.get(*pos).ok_or_else(invalid)?;
        if c == b'{' {
            vals.push(PgValue::Array(parse_array(session, buf, pos, delim, depth + 1, elem)?));
        } else if c == b'"' {
            vals.push(parse_quoted(session, buf, pos, elem)?);
        } else if c != b'}' {
            vals.push(parse_unquoted(session, buf, pos, &delims, false, elem)?);
        }

        let c = *buf.get(*pos).ok_or_else(invalid)?;
        *pos += 1;
        if c == b'}' {
            return Ok(vals);
        }
        if c != delim {
            return Err(invalid());
        }
    }
}

/// Decode the textual array form `{...}`.
///
/// An optional dimension prefix such as `[1:2]=` is skipped, as the server
/// emits one for arrays with altered lower bounds.
pub(crate) fn decode_text<F>(
    session: &Session,
    buf: &[u8],
    delim: u8,
    elem: F,
) -> Result<PgValue, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    let mut pos = 0;
    while pos < buf.len() {
        if buf[pos] == b'{' {
            let vals = parse_array(session, buf, &mut pos, delim, 1, &elem)?;
            if pos != buf.len() {
                return Err(invalid());
            }
            return Ok(PgValue::Array(vals));
        }
        pos += 1;
    }
    Err(invalid())
}

fn binary_values<F>(
    session: &Session,
    buf: &[u8],
    pos: &mut usize,
    dims: &[usize],
    elem: &F,
) -> Result<Vec<PgValue>, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    let (&dim, rest) = dims.split_first().expect("caller checks dims");
    let mut vals = Vec::new();
    for _ in 0..dim {
        if rest.is_empty() {
            let len = i32::from_be_bytes(read_prefix(&buf[*pos..])?);
            *pos += 4;
            if len == -1 {
                vals.push(PgValue::Null);
                continue;
            }
            let len = len as usize;
            let val = buf
                .get(*pos..*pos + len)
                .ok_or_else(invalid)?;
            vals.push(elem(session, val)?);
            *pos += len;
        } else {
            vals.push(PgValue::Array(binary_values(session, buf, pos, rest, elem)?));
        }
    }
    Ok(vals)
}

/// Decode the binary array form.
///
/// Header: u32 dimension count, i32 flags (only the has-nulls bit may be
/// set), u32 element oid which must match the registered element; then per
/// dimension a (size, lower bound) pair, the lower bound being ignored;
/// then the values in row-major order, each length prefixed with -1 for
/// NULL.
pub(crate) fn decode_binary<F>(
    session: &Session,
    buf: &[u8],
    elem_oid: Oid,
    elem: F,
) -> Result<PgValue, DecodeError>
where
    F: Fn(&Session, &[u8]) -> Result<PgValue, DecodeError>,
{
    let header: [u8; 12] = read_prefix(buf)?;
    let ndims = u32::from_be_bytes(header[..4].try_into().unwrap()) as usize;
    let flags = i32::from_be_bytes(header[4..8].try_into().unwrap());
    let oid = u32::from_be_bytes(header[8..].try_into().unwrap());

    if oid != elem_oid {
        return Err(DecodeError::new("unexpected array element type"));
    }
    if ndims > MAX_ARRAY_DIMS {
        return Err(DecodeError::new("number of array dimensions exceeded"));
    }
    if flags & 1 != flags {
        return Err(DecodeError::new("invalid value for array flags"));
    }
    if ndims == 0 {
        if buf.len() != 12 {
            return Err(invalid());
        }
        return Ok(PgValue::Array(Vec::new()));
    }

    let mut pos = 12;
    let mut dims = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        let dim = i32::from_be_bytes(read_prefix(&buf[pos..])?);
        // the lower bound is ignored
        let _ = i32::from_be_bytes(read_prefix(&buf[pos + 4..])?);
        if dim < 0 {
            return Err(invalid());
        }
        dims.push(dim as usize);
        pos += 8;
    }

    let vals = binary_values(session, buf, &mut pos, &dims, &elem)?;
    if pos != buf.len() {
        return Err(invalid());
    }
    Ok(PgValue::Array(vals))
}
