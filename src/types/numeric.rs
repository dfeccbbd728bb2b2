//! Numeric conversions: integers, floats, bool and arbitrary precision
//! `numeric`.
use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;
use crate::session::Session;
use crate::value::PgValue;

use super::{read_array, read_prefix, utf8};

// ===== int =====

macro_rules! int_codec {
    ($(
        $txt:ident / $bin:ident: $ty:ty => $variant:ident;
    )*) => {$(
        pub(crate) fn $txt(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
            let val = utf8(buf)?
                .parse::<$ty>()
                .map_err(|_| DecodeError::new(concat!("invalid ", stringify!($ty), " value")))?;
            Ok(PgValue::$variant(val))
        }

        pub(crate) fn $bin(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
            Ok(PgValue::$variant(<$ty>::from_be_bytes(read_array(buf)?)))
        }
    )*};
}

int_codec! {
    txt_int2 / bin_int2: i16 => Int2;
    txt_int4 / bin_int4: i32 => Int4;
    txt_int8 / bin_int8: i64 => Int8;
    txt_oid / bin_oid: u32 => Oid;
}

// ===== float =====

pub(crate) fn txt_float4(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let val = utf8(buf)?
        .parse::<f32>()
        .map_err(|_| DecodeError::new("invalid float4 value"))?;
    Ok(PgValue::Float4(val))
}

pub(crate) fn bin_float4(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Float4(f32::from_be_bytes(read_array(buf)?)))
}

pub(crate) fn txt_float8(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let val = utf8(buf)?
        .parse::<f64>()
        .map_err(|_| DecodeError::new("invalid float8 value"))?;
    Ok(PgValue::Float8(val))
}

pub(crate) fn bin_float8(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Float8(f64::from_be_bytes(read_array(buf)?)))
}

// ===== bool =====

pub(crate) fn txt_bool(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    match buf {
        b"t" => Ok(PgValue::Bool(true)),
        b"f" => Ok(PgValue::Bool(false)),
        _ => Err(DecodeError::new("invalid value for bool")),
    }
}

pub(crate) fn bin_bool(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    match buf {
        [1] => Ok(PgValue::Bool(true)),
        [0] => Ok(PgValue::Bool(false)),
        _ => Err(DecodeError::new("invalid value for bool")),
    }
}

// ===== numeric =====

/// Sign field codes of the binary numeric format.
const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Smallest exponent a postgres numeric can carry; the display scale field
/// is 14 bits.
const MIN_EXPONENT: i64 = -0x3FFF;

/// An arbitrary precision `numeric` value.
///
/// Finite values are a sign, a string of base-10 digits (most significant
/// first) and a power of ten applied to the digit string, mirroring how
/// the wire format stores them. `NaN` and the infinities are separate
/// variants since postgres preserves them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PgNumeric {
    NotANumber,
    Infinity,
    NegInfinity,
    Value {
        negative: bool,
        /// Base-10 digits, most significant first, no leading zeros,
        /// at least one digit.
        digits: Vec<u8>,
        /// Power of ten of the least significant digit.
        exponent: i32,
    },
}

impl PgNumeric {
    /// Decode the binary wire format.
    ///
    /// Header: u16 digit count, i16 weight (base-10000 exponent of the
    /// first digit), u16 sign code, u16 display scale; then the base-10000
    /// digits.
    pub fn from_binary(buf: &[u8]) -> Result<Self, DecodeError> {
        let header: [u8; 8] = read_prefix(buf)?;
        let ndigits = u16::from_be_bytes([header[0], header[1]]) as usize;
        let weight = i16::from_be_bytes([header[2], header[3]]) as i64;
        let sign = u16::from_be_bytes([header[4], header[5]]);
        let dscale = u16::from_be_bytes([header[6], header[7]]) as i32;

        match sign {
            NUMERIC_NAN => return Ok(Self::NotANumber),
            NUMERIC_PINF => return Ok(Self::Infinity),
            NUMERIC_NINF => return Ok(Self::NegInfinity),
            NUMERIC_POS | NUMERIC_NEG => {}
            _ => return Err(DecodeError::new("invalid numeric sign code")),
        }

        let body = &buf[8..];
        if body.len() != ndigits * 2 {
            return Err(DecodeError::new("invalid numeric digit count"));
        }

        let mut digits = Vec::with_capacity(ndigits * 4);
        for chunk in body.chunks_exact(2) {
            let pg_digit = u16::from_be_bytes([chunk[0], chunk[1]]);
            if pg_digit > 9999 {
                return Err(DecodeError::new("invalid base-10000 digit"));
            }
            // a postgres digit contains 4 decimal digits
            digits.push((pg_digit / 1000) as u8);
            digits.push((pg_digit / 100 % 10) as u8);
            digits.push((pg_digit / 10 % 10) as u8);
            digits.push((pg_digit % 10) as u8);
        }

        let mut exponent = ((weight + 1 - ndigits as i64) * 4) as i32;

        // The encoding pads the last base-10000 digit with zeros; drop them
        // down to the display scale.
        while exponent < -dscale && digits.last() == Some(&0) {
            digits.pop();
            exponent += 1;
        }
        strip_leading_zeros(&mut digits);
        if digits.is_empty() {
            digits.push(0);
            exponent = -dscale;
        }

        Ok(Self::Value { negative: sign == NUMERIC_NEG, digits, exponent })
    }

    /// Encode into the binary wire format.
    ///
    /// Returns `None` when the value does not fit the postgres numeric
    /// range, in which case the parameter encoder falls back to text.
    pub fn to_binary(&self) -> Option<Vec<u8>> {
        let (negative, digits, exponent) = match self {
            Self::NotANumber => return Some(numeric_special(NUMERIC_NAN)),
            Self::Infinity => return Some(numeric_special(NUMERIC_PINF)),
            Self::NegInfinity => return Some(numeric_special(NUMERIC_NINF)),
            Self::Value { negative, digits, exponent } => (*negative, digits, *exponent as i64),
        };

        if exponent < MIN_EXPONENT {
            return None;
        }
        let scale = if exponent > 0 { 0u16 } else { (-exponent) as u16 };

        // The base-10000 digits are aligned around the decimal point:
        // 12345.67 becomes 0001 2345 6700. `first` is the count of decimal
        // digits in the first, possibly partial, base-10000 digit.
        let point = digits.len() as i64 + exponent;
        let (q, r) = (point.div_euclid(4), point.rem_euclid(4));
        let weight = q + (r != 0) as i64 - 1;
        if weight > i16::MAX as i64 {
            return None;
        }

        let mut pg_digits: Vec<u16> = Vec::with_capacity(digits.len() / 4 + 2);
        let mut acc = 0u16;
        let mut i = if r != 0 { 4 - r } else { 0 };
        for &digit in digits {
            acc = acc * 10 + digit as u16;
            i += 1;
            if i == 4 {
                pg_digits.push(acc);
                acc = 0;
                i = 0;
            }
        }
        if i != 0 {
            // last decimal digit is not aligned on a 4 digit boundary
            pg_digits.push(acc * 10u16.pow(4 - i as u32));
        }

        // trailing zero base-10000 digits carry no information
        while pg_digits.last() == Some(&0) {
            pg_digits.pop();
        }
        // nor do leading ones; the weight already places the first digit
        let leading = pg_digits.iter().take_while(|d| **d == 0).count();
        pg_digits.drain(..leading);
        let weight = weight - leading as i64;

        let sign = if negative { NUMERIC_NEG } else { NUMERIC_POS };
        let mut out = Vec::with_capacity(8 + pg_digits.len() * 2);
        out.extend_from_slice(&(pg_digits.len() as u16).to_be_bytes());
        out.extend_from_slice(&(weight as i16).to_be_bytes());
        out.extend_from_slice(&sign.to_be_bytes());
        out.extend_from_slice(&scale.to_be_bytes());
        for d in pg_digits {
            out.extend_from_slice(&d.to_be_bytes());
        }
        Some(out)
    }
}

fn numeric_special(sign: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    out.extend_from_slice(&sign.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out
}

fn strip_leading_zeros(digits: &mut Vec<u8>) {
    let leading = digits.iter().take_while(|d| **d == 0).count();
    digits.drain(..leading);
}

impl FromStr for PgNumeric {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("nan") {
            return Ok(Self::NotANumber);
        }
        let (negative, rest) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        if rest.eq_ignore_ascii_case("infinity") || rest.eq_ignore_ascii_case("inf") {
            return Ok(if negative { Self::NegInfinity } else { Self::Infinity });
        }

        let (mantissa, e_exp) = match rest.split_once(['e', 'E']) {
            Some((m, e)) => {
                let e: i32 = e
                    .parse()
                    .map_err(|_| DecodeError::new("invalid numeric value"))?;
                (m, e)
            }
            None => (rest, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecodeError::new("invalid numeric value"));
        }

        let mut digits = Vec::with_capacity(int_part.len() + frac_part.len());
        for b in int_part.bytes().chain(frac_part.bytes()) {
            if !b.is_ascii_digit() {
                return Err(DecodeError::new("invalid numeric value"));
            }
            digits.push(b - b'0');
        }
        let exponent = e_exp - frac_part.len() as i32;

        strip_leading_zeros(&mut digits);
        if digits.is_empty() {
            digits.push(0);
        }

        Ok(Self::Value { negative, digits, exponent })
    }
}

impl fmt::Display for PgNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (negative, digits, exponent) = match self {
            Self::NotANumber => return f.write_str("NaN"),
            Self::Infinity => return f.write_str("Infinity"),
            Self::NegInfinity => return f.write_str("-Infinity"),
            Self::Value { negative, digits, exponent } => (*negative, digits, *exponent),
        };

        if negative {
            f.write_str("-")?;
        }

        let mut out = String::with_capacity(digits.len() + 2);
        if exponent >= 0 {
            for d in digits {
                out.push((b'0' + d) as char);
            }
            for _ in 0..exponent {
                out.push('0');
            }
        } else {
            let point = digits.len() as i32 + exponent;
            if point > 0 {
                for d in &digits[..point as usize] {
                    out.push((b'0' + d) as char);
                }
                out.push('.');
                for d in &digits[point as usize..] {
                    out.push((b'0' + d) as char);
                }
            } else {
                out.push_str("0.");
                for _ in 0..-point {
                    out.push('0');
                }
                for d in digits {
                    out.push((b'0' + d) as char);
                }
            }
        }
        f.write_str(&out)
    }
}

pub(crate) fn txt_numeric(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Numeric(utf8(buf)?.parse()?))
}

pub(crate) fn bin_numeric(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Numeric(PgNumeric::from_binary(buf)?))
}
