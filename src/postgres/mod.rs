//! Postgres protocol vocabulary: oids, formats and message types.
pub mod backend;
pub mod frontend;

pub use backend::{BackendMessage, BackendProtocol, ServerError};
pub use frontend::FrontendProtocol;

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// Well known type oids from the `pg_type` catalog.
pub mod oid {
    use super::Oid;

    macro_rules! oids {
        ($($name:ident = $val:literal;)*) => {
            $(pub const $name: Oid = $val;)*
        };
    }

    oids! {
        BOOL = 16;
        BYTEA = 17;
        CHAR = 18;
        NAME = 19;
        INT8 = 20;
        INT2 = 21;
        INT4 = 23;
        TEXT = 25;
        OID = 26;
        JSON = 114;
        FLOAT4 = 700;
        FLOAT8 = 701;
        CIDR = 650;
        INET = 869;
        BPCHAR = 1042;
        VARCHAR = 1043;
        DATE = 1082;
        TIME = 1083;
        TIMESTAMP = 1114;
        TIMESTAMPTZ = 1184;
        INTERVAL = 1186;
        TIMETZ = 1266;
        NUMERIC = 1700;
        UUID = 2950;
        JSONB = 3802;

        BOOL_ARRAY = 1000;
        BYTEA_ARRAY = 1001;
        CHAR_ARRAY = 1002;
        NAME_ARRAY = 1003;
        INT8_ARRAY = 1016;
        INT2_ARRAY = 1005;
        INT4_ARRAY = 1007;
        TEXT_ARRAY = 1009;
        OID_ARRAY = 1028;
        JSON_ARRAY = 199;
        FLOAT4_ARRAY = 1021;
        FLOAT8_ARRAY = 1022;
        CIDR_ARRAY = 651;
        INET_ARRAY = 1041;
        BPCHAR_ARRAY = 1014;
        VARCHAR_ARRAY = 1015;
        DATE_ARRAY = 1182;
        TIME_ARRAY = 1183;
        TIMESTAMP_ARRAY = 1115;
        TIMESTAMPTZ_ARRAY = 1185;
        INTERVAL_ARRAY = 1187;
        TIMETZ_ARRAY = 1270;
        NUMERIC_ARRAY = 1231;
        UUID_ARRAY = 2951;
        JSONB_ARRAY = 3807;

        INT4_RANGE = 3904;
        INT4_RANGE_ARRAY = 3905;
        NUM_RANGE = 3906;
        NUM_RANGE_ARRAY = 3907;
        TS_RANGE = 3908;
        TS_RANGE_ARRAY = 3909;
        TSTZ_RANGE = 3910;
        TSTZ_RANGE_ARRAY = 3911;
        DATE_RANGE = 3912;
        DATE_RANGE_ARRAY = 3913;
        INT8_RANGE = 3926;
        INT8_RANGE_ARRAY = 3927;

        INT4_MULTIRANGE = 4451;
        NUM_MULTIRANGE = 4532;
        TS_MULTIRANGE = 4533;
        TSTZ_MULTIRANGE = 4534;
        DATE_MULTIRANGE = 4535;
        INT8_MULTIRANGE = 4536;
    }
}

/// Format used for data values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PgFormat {
    Text,
    Binary,
}

impl PgFormat {
    /// The wire format code.
    pub const fn format_code(self) -> u16 {
        match self {
            PgFormat::Text => 0,
            PgFormat::Binary => 1,
        }
    }

    pub(crate) fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(PgFormat::Text),
            1 => Some(PgFormat::Binary),
            _ => None,
        }
    }
}

/// Requested format for result columns.
///
/// `Default` resolves to text for simple query and binary for extended query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultFormat {
    #[default]
    Default,
    Text,
    Binary,
}

/// Transaction status reported by `ReadyForQuery`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransactionStatus {
    #[default]
    Unknown,
    /// Idle, not in a transaction block.
    Idle,
    /// In a transaction block.
    Transaction,
    /// In a failed transaction block, queries will be rejected until block end.
    Error,
}

impl TransactionStatus {
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'I' => Some(Self::Idle),
            b'T' => Some(Self::Transaction),
            b'E' => Some(Self::Error),
            _ => None,
        }
    }
}
