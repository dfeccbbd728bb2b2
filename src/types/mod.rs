//! Per-type value codec registry.
//!
//! Every supported oid maps to a [`TypeCodec`]: a pair of plain function
//! pointers, one per wire format. Composite types (arrays, ranges,
//! multiranges) are decoded by generic routines parameterised with their
//! element codec, wired up in the [`lookup`] table.
pub mod array;
pub mod dt;
pub mod network;
pub mod numeric;
pub mod range;
pub mod text;

pub use numeric::PgNumeric;

use crate::error::DecodeError;
use crate::postgres::{oid, Oid, PgFormat};
use crate::session::Session;
use crate::value::PgValue;

/// Decode one value payload into a [`PgValue`].
pub type DecodeFn = fn(&Session, &[u8]) -> Result<PgValue, DecodeError>;

/// Text and binary decoder for one element type.
pub struct TypeCodec {
    pub text: DecodeFn,
    pub binary: DecodeFn,
}

impl TypeCodec {
    pub(crate) fn decode(
        &self,
        session: &Session,
        format: PgFormat,
        buf: &[u8],
    ) -> Result<PgValue, DecodeError> {
        match format {
            PgFormat::Text => (self.text)(session, buf),
            PgFormat::Binary => (self.binary)(session, buf),
        }
    }
}

/// Decoder selected for one result column.
///
/// Composite variants carry a reference to their element codec; the
/// composite routines themselves live in [`array`] and [`range`].
#[derive(Clone, Copy)]
pub enum ColumnDecoder {
    /// A scalar value decoded by its codec directly.
    Scalar(&'static TypeCodec),
    /// An array of scalars.
    Array { elem_oid: Oid, delim: u8, elem: &'static TypeCodec },
    /// A range over a scalar element.
    Range { elem: &'static TypeCodec },
    /// An array of ranges.
    RangeArray { range_oid: Oid, delim: u8, elem: &'static TypeCodec },
    /// A multirange over a scalar element.
    Multirange { elem: &'static TypeCodec },
    /// Unknown oid: text as string, binary as raw bytes.
    Unknown,
}

impl ColumnDecoder {
    pub fn decode(
        &self,
        session: &Session,
        format: PgFormat,
        buf: &[u8],
    ) -> Result<PgValue, DecodeError> {
        match (self, format) {
            (Self::Scalar(codec), _) => codec.decode(session, format, buf),
            (Self::Array { delim, elem, .. }, PgFormat::Text) => {
                array::decode_text(session, buf, *delim, |s, b| (elem.text)(s, b))
            }
            (Self::Array { elem_oid, elem, .. }, PgFormat::Binary) => {
                array::decode_binary(session, buf, *elem_oid, |s, b| (elem.binary)(s, b))
            }
            (Self::Range { elem }, PgFormat::Text) => {
                range::decode_text(session, buf, |s, b| (elem.text)(s, b))
            }
            (Self::Range { elem }, PgFormat::Binary) => {
                range::decode_binary(session, buf, |s, b| (elem.binary)(s, b))
            }
            (Self::RangeArray { delim, elem, .. }, PgFormat::Text) => {
                array::decode_text(session, buf, *delim, |s, b| {
                    range::decode_text(s, b, |s, b| (elem.text)(s, b))
                })
            }
            (Self::RangeArray { range_oid, elem, .. }, PgFormat::Binary) => {
                array::decode_binary(session, buf, *range_oid, |s, b| {
                    range::decode_binary(s, b, |s, b| (elem.binary)(s, b))
                })
            }
            (Self::Multirange { elem }, PgFormat::Text) => {
                range::decode_multirange_text(session, buf, |s, b| (elem.text)(s, b))
            }
            (Self::Multirange { elem }, PgFormat::Binary) => {
                range::decode_multirange_binary(session, buf, |s, b| (elem.binary)(s, b))
            }
            (Self::Unknown, PgFormat::Text) => text::decode_text(session, buf),
            (Self::Unknown, PgFormat::Binary) => Ok(PgValue::Bytes(buf.to_vec())),
        }
    }
}

impl std::fmt::Debug for ColumnDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Scalar(_) => "Scalar",
            Self::Array { .. } => "Array",
            Self::Range { .. } => "Range",
            Self::RangeArray { .. } => "RangeArray",
            Self::Multirange { .. } => "Multirange",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

macro_rules! codec {
    ($name:ident, $text:expr, $binary:expr) => {
        static $name: TypeCodec = TypeCodec { text: $text, binary: $binary };
    };
}

codec!(BOOL, numeric::txt_bool, numeric::bin_bool);
codec!(INT2, numeric::txt_int2, numeric::bin_int2);
codec!(INT4, numeric::txt_int4, numeric::bin_int4);
codec!(INT8, numeric::txt_int8, numeric::bin_int8);
codec!(OID, numeric::txt_oid, numeric::bin_oid);
codec!(FLOAT4, numeric::txt_float4, numeric::bin_float4);
codec!(FLOAT8, numeric::txt_float8, numeric::bin_float8);
codec!(NUMERIC, numeric::txt_numeric, numeric::bin_numeric);
codec!(TEXT, text::decode_text, text::decode_text);
codec!(BYTEA, text::txt_bytea, text::bin_bytea);
codec!(UUID, text::txt_uuid, text::bin_uuid);
codec!(JSONB, text::decode_text, text::bin_jsonb);
codec!(DATE, dt::txt_date, dt::bin_date);
codec!(TIME, dt::txt_time, dt::bin_time);
codec!(TIMETZ, dt::txt_timetz, dt::bin_timetz);
codec!(TIMESTAMP, dt::txt_timestamp, dt::bin_timestamp);
codec!(TIMESTAMPTZ, dt::txt_timestamptz, dt::bin_timestamptz);
codec!(INTERVAL, dt::txt_interval, dt::bin_interval);
codec!(INET, network::txt_inet, network::bin_inet);
codec!(CIDR, network::txt_cidr, network::bin_cidr);

/// Table of supported types.
///
/// Per entry: the element codec, the scalar oid and its array oid, and
/// optionally the range, range array and multirange oids sharing the same
/// element codec.
macro_rules! registry {
    ($lookup_oid:ident; $(
        $codec:ident {
            oid: $o:expr, array: $a:expr
            $(, range: $r:expr, range_array: $ra:expr, multi: $m:expr)?
        }
    )*) => {{
        $(
            if $lookup_oid == $o {
                return Some(ColumnDecoder::Scalar(&$codec));
            }
            if $lookup_oid == $a {
                return Some(ColumnDecoder::Array {
                    elem_oid: $o,
                    delim: b',',
                    elem: &$codec,
                });
            }
            $(
                if $lookup_oid == $r {
                    return Some(ColumnDecoder::Range { elem: &$codec });
                }
                if $lookup_oid == $ra {
                    return Some(ColumnDecoder::RangeArray {
                        range_oid: $r,
                        delim: b',',
                        elem: &$codec,
                    });
                }
                if $lookup_oid == $m {
                    return Some(ColumnDecoder::Multirange { elem: &$codec });
                }
            )?
        )*
        None
    }};
}

/// Find the decoder for an oid. `None` means the type is not registered
/// and falls back to [`ColumnDecoder::Unknown`].
pub fn lookup(type_oid: Oid) -> Option<ColumnDecoder> {
    registry! { type_oid;
        BOOL { oid: oid::BOOL, array: oid::BOOL_ARRAY }
        BYTEA { oid: oid::BYTEA, array: oid::BYTEA_ARRAY }
        TEXT { oid: oid::CHAR, array: oid::CHAR_ARRAY }
        TEXT { oid: oid::NAME, array: oid::NAME_ARRAY }
        INT8 {
            oid: oid::INT8, array: oid::INT8_ARRAY,
            range: oid::INT8_RANGE, range_array: oid::INT8_RANGE_ARRAY,
            multi: oid::INT8_MULTIRANGE
        }
        INT2 { oid: oid::INT2, array: oid::INT2_ARRAY }
        INT4 {
            oid: oid::INT4, array: oid::INT4_ARRAY,
            range: oid::INT4_RANGE, range_array: oid::INT4_RANGE_ARRAY,
            multi: oid::INT4_MULTIRANGE
        }
        TEXT { oid: oid::TEXT, array: oid::TEXT_ARRAY }
        OID { oid: oid::OID, array: oid::OID_ARRAY }
        TEXT { oid: oid::JSON, array: oid::JSON_ARRAY }
        FLOAT4 { oid: oid::FLOAT4, array: oid::FLOAT4_ARRAY }
        FLOAT8 { oid: oid::FLOAT8, array: oid::FLOAT8_ARRAY }
        CIDR { oid: oid::CIDR, array: oid::CIDR_ARRAY }
        INET { oid: oid::INET, array: oid::INET_ARRAY }
        TEXT { oid: oid::BPCHAR, array: oid::BPCHAR_ARRAY }
        TEXT { oid: oid::VARCHAR, array: oid::VARCHAR_ARRAY }
        DATE {
            oid: oid::DATE, array: oid::DATE_ARRAY,
            range: oid::DATE_RANGE, range_array: oid::DATE_RANGE_ARRAY,
            multi: oid::DATE_MULTIRANGE
        }
        TIME { oid: oid::TIME, array: oid::TIME_ARRAY }
        TIMESTAMP {
            oid: oid::TIMESTAMP, array: oid::TIMESTAMP_ARRAY,
            range: oid::TS_RANGE, range_array: oid::TS_RANGE_ARRAY,
            multi: oid::TS_MULTIRANGE
        }
        TIMESTAMPTZ {
            oid: oid::TIMESTAMPTZ, array: oid::TIMESTAMPTZ_ARRAY,
            range: oid::TSTZ_RANGE, range_array: oid::TSTZ_RANGE_ARRAY,
            multi: oid::TSTZ_MULTIRANGE
        }
        INTERVAL { oid: oid::INTERVAL, array: oid::INTERVAL_ARRAY }
        TIMETZ { oid: oid::TIMETZ, array: oid::TIMETZ_ARRAY }
        NUMERIC {
            oid: oid::NUMERIC, array: oid::NUMERIC_ARRAY,
            range: oid::NUM_RANGE, range_array: oid::NUM_RANGE_ARRAY,
            multi: oid::NUM_MULTIRANGE
        }
        UUID { oid: oid::UUID, array: oid::UUID_ARRAY }
        JSONB { oid: oid::JSONB, array: oid::JSONB_ARRAY }
    }
}

// ===== shared read helpers =====

pub(crate) fn read_array<const N: usize>(buf: &[u8]) -> Result<[u8; N], DecodeError> {
    buf.try_into()
        .map_err(|_| DecodeError::new("unexpected value length"))
}

pub(crate) fn read_prefix<const N: usize>(buf: &[u8]) -> Result<[u8; N], DecodeError> {
    buf.get(..N)
        .ok_or_else(|| DecodeError::new("truncated value"))?
        .try_into()
        .map_err(|_| DecodeError::new("truncated value"))
}

pub(crate) fn utf8(buf: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(buf).map_err(|_| DecodeError::new("value is not valid utf8"))
}
