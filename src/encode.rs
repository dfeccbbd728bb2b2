//! Parameter encoding: maps input values to (oid, format, payload).
//!
//! Binary encodings are chosen where practical; values that do not fit the
//! postgres range of their natural type fall back to their textual form
//! with the `unknown` oid so the server infers a type from context.
use std::fmt::Display;

use ipnet::IpNet;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use uuid::Uuid;

use crate::postgres::{oid, Oid, PgFormat};
use crate::types::dt;
use crate::types::PgNumeric;
use crate::value::PgInterval;

/// Payloads up to this size are stored inline in the parameter record.
const INLINE_LEN: usize = 16;

/// Offsets beyond 16 hours can not be expressed by `timetz`.
const MAX_TZ_OFFSET_SECS: i32 = 16 * 60 * 60;

/// Value that can be encoded to be bound to a sql parameter.
pub trait Encode {
    fn encode(self) -> Encoded;
}

/// A postgres encoded parameter value.
#[derive(Debug)]
pub struct Encoded {
    oid: Oid,
    format: PgFormat,
    value: ParamValue,
}

enum ParamValue {
    Null,
    Inline { len: u8, buf: [u8; INLINE_LEN] },
    Owned(Vec<u8>),
}

impl std::fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::ext::FmtExt;
        match self {
            Self::Null => f.write_str("Null"),
            Self::Inline { len, buf } => write!(f, "{:?}", buf[..*len as usize].lossy()),
            Self::Owned(v) => write!(f, "{:?}", v.lossy()),
        }
    }
}

impl Encoded {
    /// The NULL parameter: no payload, length -1 on the wire.
    pub fn null() -> Self {
        Self { oid: 0, format: PgFormat::Text, value: ParamValue::Null }
    }

    fn inline(oid: Oid, format: PgFormat, bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= INLINE_LEN);
        let mut buf = [0u8; INLINE_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self { oid, format, value: ParamValue::Inline { len: bytes.len() as u8, buf } }
    }

    fn owned(oid: Oid, format: PgFormat, bytes: Vec<u8>) -> Self {
        Self { oid, format, value: ParamValue::Owned(bytes) }
    }

    /// Textual parameter under a caller chosen oid; `0` leaves the type for
    /// the server to infer.
    pub fn text(oid: Oid, value: impl Display) -> Self {
        Self::owned(oid, PgFormat::Text, value.to_string().into_bytes())
    }

    /// Stringification fallback with the `unknown` oid.
    pub fn unknown(value: impl Display) -> Self {
        Self::text(0, value)
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn format(&self) -> PgFormat {
        self.format
    }

    /// Wire length of the payload; -1 denotes NULL.
    pub fn wire_len(&self) -> i32 {
        match &self.value {
            ParamValue::Null => -1,
            ParamValue::Inline { len, .. } => *len as i32,
            ParamValue::Owned(v) => v.len() as i32,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.value {
            ParamValue::Null => &[],
            ParamValue::Inline { len, buf } => &buf[..*len as usize],
            ParamValue::Owned(v) => v,
        }
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(self) -> Encoded {
        match self {
            Some(v) => v.encode(),
            None => Encoded::null(),
        }
    }
}

impl Encode for bool {
    fn encode(self) -> Encoded {
        Encoded::inline(oid::BOOL, PgFormat::Binary, &[self as u8])
    }
}

impl Encode for i16 {
    fn encode(self) -> Encoded {
        (self as i64).encode()
    }
}

impl Encode for i32 {
    fn encode(self) -> Encoded {
        Encoded::inline(oid::INT4, PgFormat::Binary, &self.to_be_bytes())
    }
}

impl Encode for i64 {
    fn encode(self) -> Encoded {
        match i32::try_from(self) {
            Ok(v) => v.encode(),
            Err(_) => Encoded::inline(oid::INT8, PgFormat::Binary, &self.to_be_bytes()),
        }
    }
}

impl Encode for i128 {
    fn encode(self) -> Encoded {
        match i64::try_from(self) {
            Ok(v) => v.encode(),
            // too wide for int8, let the server parse the decimal string
            Err(_) => Encoded::unknown(self),
        }
    }
}

impl Encode for f32 {
    fn encode(self) -> Encoded {
        (self as f64).encode()
    }
}

impl Encode for f64 {
    fn encode(self) -> Encoded {
        Encoded::inline(oid::FLOAT8, PgFormat::Binary, &self.to_be_bytes())
    }
}

impl Encode for &str {
    fn encode(self) -> Encoded {
        Encoded::owned(oid::TEXT, PgFormat::Text, self.as_bytes().to_vec())
    }
}

impl Encode for String {
    fn encode(self) -> Encoded {
        Encoded::owned(oid::TEXT, PgFormat::Text, self.into_bytes())
    }
}

impl Encode for &[u8] {
    fn encode(self) -> Encoded {
        Encoded::owned(oid::BYTEA, PgFormat::Binary, self.to_vec())
    }
}

impl Encode for Vec<u8> {
    fn encode(self) -> Encoded {
        Encoded::owned(oid::BYTEA, PgFormat::Binary, self)
    }
}

impl Encode for Uuid {
    fn encode(self) -> Encoded {
        Encoded::inline(oid::UUID, PgFormat::Binary, self.as_bytes())
    }
}

impl Encode for PgNumeric {
    fn encode(self) -> Encoded {
        match self.to_binary() {
            Some(bytes) => Encoded::owned(oid::NUMERIC, PgFormat::Binary, bytes),
            // outside the numeric range, bind the rendering instead
            None => Encoded::unknown(self),
        }
    }
}

impl Encode for Date {
    fn encode(self) -> Encoded {
        let days = dt::date_to_pg_day(self);
        Encoded::inline(oid::DATE, PgFormat::Binary, &days.to_be_bytes())
    }
}

impl Encode for Time {
    fn encode(self) -> Encoded {
        let usecs = dt::time_to_usecs(self);
        Encoded::inline(oid::TIME, PgFormat::Binary, &usecs.to_be_bytes())
    }
}

/// A time of day with a fixed utc offset, the `timetz` type.
impl Encode for (Time, UtcOffset) {
    fn encode(self) -> Encoded {
        let (time, offset) = self;
        let offset_secs = offset.whole_seconds();
        if offset_secs.abs() >= MAX_TZ_OFFSET_SECS {
            // postgres supports offsets up to 16 hours, bind as text
            return Encoded::unknown(format_args!("{time}{offset}"));
        }
        let mut buf = [0u8; 12];
        buf[..8].copy_from_slice(&dt::time_to_usecs(time).to_be_bytes());
        // the wire counts seconds west of greenwich
        buf[8..].copy_from_slice(&(-offset_secs).to_be_bytes());
        Encoded::inline(oid::TIMETZ, PgFormat::Binary, &buf)
    }
}

impl Encode for PrimitiveDateTime {
    fn encode(self) -> Encoded {
        let usecs = dt::timestamp_to_usecs(self);
        Encoded::inline(oid::TIMESTAMP, PgFormat::Binary, &usecs.to_be_bytes())
    }
}

impl Encode for OffsetDateTime {
    fn encode(self) -> Encoded {
        let usecs = dt::timestamptz_to_usecs(self);
        Encoded::inline(oid::TIMESTAMPTZ, PgFormat::Binary, &usecs.to_be_bytes())
    }
}

impl Encode for PgInterval {
    fn encode(self) -> Encoded {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.microseconds.to_be_bytes());
        buf[8..12].copy_from_slice(&self.days.to_be_bytes());
        buf[12..].copy_from_slice(&self.months.to_be_bytes());
        Encoded::inline(oid::INTERVAL, PgFormat::Binary, &buf)
    }
}

impl Encode for IpNet {
    fn encode(self) -> Encoded {
        Encoded::text(oid::INET, self)
    }
}

/// Marks an [`IpNet`] to bind as the `cidr` type instead of `inet`.
#[derive(Debug, Clone, Copy)]
pub struct Cidr(pub IpNet);

impl Encode for Cidr {
    fn encode(self) -> Encoded {
        Encoded::text(oid::CIDR, self.0)
    }
}

impl Encode for Encoded {
    fn encode(self) -> Encoded {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_has_no_payload() {
        let e = Encoded::null();
        assert_eq!(e.oid(), 0);
        assert_eq!(e.wire_len(), -1);
        assert!(e.as_bytes().is_empty());
    }

    #[test]
    fn integers_pick_the_narrowest_type() {
        let e = 42i64.encode();
        assert_eq!((e.oid(), e.format()), (oid::INT4, PgFormat::Binary));
        assert_eq!(e.as_bytes(), 42i32.to_be_bytes());

        let e = (1i64 << 40).encode();
        assert_eq!(e.oid(), oid::INT8);
        assert_eq!(e.as_bytes(), (1i64 << 40).to_be_bytes());

        let e = (i128::from(i64::MAX) + 1).encode();
        assert_eq!((e.oid(), e.format()), (0, PgFormat::Text));
        assert_eq!(e.as_bytes(), b"9223372036854775808");
    }

    #[test]
    fn floats_widen_to_float8() {
        let e = 1.5f32.encode();
        assert_eq!((e.oid(), e.format()), (oid::FLOAT8, PgFormat::Binary));
        assert_eq!(e.as_bytes(), 1.5f64.to_be_bytes());
    }

    #[test]
    fn text_and_bytes() {
        let e = "héllo".encode();
        assert_eq!((e.oid(), e.format()), (oid::TEXT, PgFormat::Text));
        assert_eq!(e.as_bytes(), "héllo".as_bytes());

        let e = (&b"\x00\x01"[..]).encode();
        assert_eq!((e.oid(), e.format()), (oid::BYTEA, PgFormat::Binary));
        assert_eq!(e.as_bytes(), b"\x00\x01");
    }

    #[test]
    fn date_counts_from_the_epoch() {
        use time::macros::date;
        let e = date!(2000-01-01).encode();
        assert_eq!(e.as_bytes(), 0i32.to_be_bytes());
        let e = date!(1999-12-31).encode();
        assert_eq!(e.as_bytes(), (-1i32).to_be_bytes());
    }

    #[test]
    fn aware_datetimes_bind_in_utc() {
        use time::macros::datetime;
        let e = datetime!(2021-06-01 14:00:00 +02:00).encode();
        assert_eq!(e.oid(), oid::TIMESTAMPTZ);
        let expected = dt::timestamp_to_usecs(datetime!(2021-06-01 12:00:00));
        assert_eq!(e.as_bytes(), expected.to_be_bytes());
    }

    #[test]
    fn timetz_offset_overflow_falls_back_to_text() {
        use time::macros::time;
        let offset = UtcOffset::from_whole_seconds(17 * 3600).unwrap();
        let e = (time!(12:00:00), offset).encode();
        assert_eq!((e.oid(), e.format()), (0, PgFormat::Text));

        let offset = UtcOffset::from_whole_seconds(2 * 3600).unwrap();
        let e = (time!(12:00:00), offset).encode();
        assert_eq!(e.oid(), oid::TIMETZ);
        assert_eq!(e.wire_len(), 12);
        assert_eq!(&e.as_bytes()[8..], (-7200i32).to_be_bytes());
    }

    #[test]
    fn numeric_binds_binary_when_in_range() {
        let n: PgNumeric = "12345.67".parse().unwrap();
        let e = n.encode();
        assert_eq!((e.oid(), e.format()), (oid::NUMERIC, PgFormat::Binary));

        let out_of_range = PgNumeric::Value {
            negative: false,
            digits: vec![1],
            exponent: -0x4000,
        };
        let e = out_of_range.encode();
        assert_eq!((e.oid(), e.format()), (0, PgFormat::Text));
    }

    #[test]
    fn networks_bind_as_text() {
        let net: IpNet = "192.168.0.1/24".parse().unwrap();
        let e = net.encode();
        assert_eq!((e.oid(), e.format()), (oid::INET, PgFormat::Text));
        assert_eq!(e.as_bytes(), b"192.168.0.1/24");

        let e = Cidr("10.0.0.0/8".parse().unwrap()).encode();
        assert_eq!(e.oid(), oid::CIDR);
    }

    #[test]
    fn hinted_fallback_keeps_the_oid() {
        let e = Encoded::text(oid::JSONB, "{\"a\":1}");
        assert_eq!((e.oid(), e.format()), (oid::JSONB, PgFormat::Text));
    }
}
