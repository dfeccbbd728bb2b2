//! Decoded postgres values.
use ipnet::IpNet;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::types::PgNumeric;

/// A single decoded column value.
///
/// Values postgres can express but the client type can not, such as the
/// `infinity` dates or years beyond 9999, fall back to the server's textual
/// rendering in [`PgValue::Text`].
#[derive(Clone, Debug, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    /// `oid`, `xid` and friends: unsigned four-byte integers.
    Oid(u32),
    Float4(f32),
    Float8(f64),
    Numeric(PgNumeric),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(Date),
    Time(Time),
    TimeTz(Time, UtcOffset),
    Timestamp(PrimitiveDateTime),
    TimestampTz(OffsetDateTime),
    Interval(PgInterval),
    Inet(IpNet),
    Cidr(IpNet),
    Array(Vec<PgValue>),
    Range(Box<PgRange>),
    Multirange(Vec<PgRange>),
}

impl PgValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PgValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PgValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            PgValue::Int2(v) => Some(*v as i32),
            PgValue::Int4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PgValue::Int2(v) => Some(*v as i64),
            PgValue::Int4(v) => Some(*v as i64),
            PgValue::Int8(v) => Some(*v),
            _ => None,
        }
    }
}

/// Interval as it travels on the wire: microseconds, days and months kept
/// apart, since their calendar lengths differ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PgInterval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

/// A range over one element type.
///
/// `bounds` follows the postgres literal notation: `[` / `(` for the lower
/// bound and `]` / `)` for the upper. A missing bound is unbounded in that
/// direction. The empty range has no bounds at all.
#[derive(Clone, Debug, PartialEq)]
pub struct PgRange {
    lower: Option<PgValue>,
    upper: Option<PgValue>,
    lower_inc: bool,
    upper_inc: bool,
    empty: bool,
}

impl PgRange {
    /// Construct a range from optional bounds and a bounds string such as
    /// `"[)"`. `None` bounds produce the empty range.
    pub fn new(
        lower: Option<PgValue>,
        upper: Option<PgValue>,
        bounds: Option<&str>,
    ) -> Result<Self, DecodeError> {
        let Some(bounds) = bounds else {
            if lower.is_some() || upper.is_some() {
                return Err(DecodeError::new("empty range can not carry bounds"));
            }
            return Ok(Self::empty());
        };

        let [lb, ub] = bounds.as_bytes() else {
            return Err(DecodeError::new("invalid range bounds"));
        };
        let lower_inc = match *lb {
            b'[' => true,
            b'(' => false,
            _ => return Err(DecodeError::new("invalid range bounds")),
        };
        let upper_inc = match *ub {
            b']' => true,
            b')' => false,
            _ => return Err(DecodeError::new("invalid range bounds")),
        };

        // Same as postgres: '[10,10)' collapses to the empty range.
        if let (Some(l), Some(u)) = (&lower, &upper) {
            if l == u && !(lower_inc && upper_inc) {
                return Ok(Self::empty());
            }
        }

        Ok(Self {
            lower_inc: lower_inc && lower.is_some(),
            upper_inc: upper_inc && upper.is_some(),
            lower,
            upper,
            empty: false,
        })
    }

    /// The empty range.
    pub fn empty() -> Self {
        Self { lower: None, upper: None, lower_inc: false, upper_inc: false, empty: true }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Lower bound, `None` when unbounded or empty.
    pub fn lower(&self) -> Option<&PgValue> {
        self.lower.as_ref()
    }

    /// Upper bound, `None` when unbounded or empty.
    pub fn upper(&self) -> Option<&PgValue> {
        self.upper.as_ref()
    }

    /// Bounds notation, `None` for the empty range.
    pub fn bounds(&self) -> Option<&'static str> {
        if self.empty {
            return None;
        }
        Some(match (self.lower_inc, self.upper_inc) {
            (true, true) => "[]",
            (true, false) => "[)",
            (false, true) => "(]",
            (false, false) => "()",
        })
    }
}
