//! Postgres Backend Messages
use bytes::{Buf, Bytes};
use std::fmt;

use crate::common::ByteStr;
use crate::error::FramingError;
use crate::ext::BytesExt;

/// A type that can be decoded from a postgres backend message.
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, FramingError>;
}

/// Postgres backend messages.
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    CopyData(CopyData),
    CopyDone(CopyDone),
    CopyInResponse(CopyInResponse),
    CopyOutResponse(CopyOutResponse),
    DataRow(DataRow),
    EmptyQueryResponse(EmptyQueryResponse),
    ErrorResponse(ErrorResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, FramingError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(FramingError::new(
                        format!("unknown backend message type: {:?}", msgtype as char),
                    )),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    CopyData,
    CopyDone,
    CopyInResponse,
    CopyOutResponse,
    DataRow,
    EmptyQueryResponse,
    ErrorResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    NotificationResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(FramingError::new(format!(
                "expected message type {:?}, got {:?}",
                Self::MSGTYPE as char, $typ as char,
            )));
        }
    };
}

macro_rules! need {
    ($body:ident, $n:expr) => {
        if Buf::remaining(&$body) < $n {
            return Err(FramingError::new("message body under-read"));
        }
    };
}

/// Identifies the message as an authentication request.
#[derive(Debug)]
pub enum Authentication {
    /// Specifies that the authentication was successful.
    Ok,
    /// Specifies that Kerberos V5 authentication is required.
    KerberosV5,
    /// Specifies that a clear-text password is required.
    CleartextPassword,
    /// Specifies that an MD5-encrypted password is required.
    MD5Password {
        /// The salt to use when encrypting the password.
        salt: [u8; 4],
    },
    /// Specifies that GSSAPI authentication is required.
    Gss,
    /// GSSAPI or SSPI authentication data.
    GssContinue { data: Bytes },
    /// Specifies that SSPI authentication is required.
    Sspi,
    /// Specifies that SASL authentication is required.
    Sasl {
        /// List of SASL authentication mechanisms, in the server's order of
        /// preference, each name nul terminated, with a final extra nul.
        mechanisms: Bytes,
    },
    /// Specifies that this message contains a SASL challenge.
    SaslContinue { data: Bytes },
    /// Specifies that SASL authentication has completed.
    SaslFinal { data: Bytes },
}

impl Authentication {
    pub const MSGTYPE: u8 = b'R';
}

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        need!(body, 4);
        let auth = match body.get_u32() {
            0 => Authentication::Ok,
            2 => Authentication::KerberosV5,
            3 => Authentication::CleartextPassword,
            5 => {
                need!(body, 4);
                Authentication::MD5Password { salt: body.get_u32().to_be_bytes() }
            }
            7 => Authentication::Gss,
            8 => Authentication::GssContinue { data: body },
            9 => Authentication::Sspi,
            10 => Authentication::Sasl { mechanisms: body },
            11 => Authentication::SaslContinue { data: body },
            12 => Authentication::SaslFinal { data: body },
            auth => return Err(FramingError::new(
                format!("unknown authentication specifier: {auth}"),
            )),
        };
        Ok(auth)
    }
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values if it wishes to be able to issue
/// CancelRequest messages later.
#[derive(Debug)]
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: u32,
    /// The secret key of this backend.
    pub secret_key: u32,
}

impl BackendKeyData {
    pub const MSGTYPE: u8 = b'K';
}

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        need!(body, 8);
        Ok(Self {
            process_id: body.get_u32(),
            secret_key: body.get_u32(),
        })
    }
}

/// Identifies the message as a run-time parameter status report.
#[derive(Debug)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported.
    pub name: ByteStr,
    /// The current value of the parameter.
    pub value: ByteStr,
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: body.try_get_nul_bytestr()?,
            value: body.try_get_nul_bytestr()?,
        })
    }
}

/// Identifies the message as a row description.
#[derive(Debug)]
pub struct RowDescription {
    /// Specifies the number of fields in a row (can be zero).
    pub field_len: u16,
    /// Undecoded field descriptors.
    pub body: Bytes,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        need!(body, 2);
        Ok(Self {
            field_len: body.get_u16(),
            body,
        })
    }
}

/// Identifies the message as a data row.
#[derive(Debug)]
pub struct DataRow {
    /// The number of column values that follow (possibly zero).
    pub column_len: u16,
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        need!(body, 2);
        Ok(Self {
            column_len: body.get_u16(),
            body,
        })
    }
}

/// Identifies the message as a command-completed response.
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which
    /// SQL command was completed, optionally followed by a row count.
    pub tag: ByteStr,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            tag: body.try_get_nul_bytestr()?,
        })
    }
}

/// Identifies the message as a protocol version negotiation message.
#[derive(Debug)]
pub struct NegotiateProtocolVersion {
    /// Newest minor protocol version supported by the server for the major
    /// protocol version requested by the client.
    pub minor: u32,
    /// Number of protocol options not recognized by the server.
    pub len: u32,
    pub opt_names: Bytes,
}

impl NegotiateProtocolVersion {
    pub const MSGTYPE: u8 = b'v';
}

impl BackendProtocol for NegotiateProtocolVersion {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        need!(body, 8);
        Ok(Self {
            minor: body.get_u32(),
            len: body.get_u32(),
            opt_names: body,
        })
    }
}

/// Identifies the message as a parameter description.
#[derive(Debug)]
pub struct ParameterDescription {
    /// The number of parameters used by the statement (can be zero).
    pub param_len: u16,
    /// For each parameter, the object ID of its data type.
    pub oids: Bytes,
}

impl ParameterDescription {
    pub const MSGTYPE: u8 = b't';
}

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        need!(body, 2);
        Ok(Self {
            param_len: body.get_u16(),
            oids: body,
        })
    }
}

/// Identifies the message as an asynchronous notification from `NOTIFY`.
#[derive(Debug)]
pub struct NotificationResponse {
    /// The process ID of the notifying backend process.
    pub process_id: u32,
    /// The name of the channel that the notify has been raised on.
    pub channel: ByteStr,
    /// The "payload" string passed from the notifying process.
    pub payload: ByteStr,
}

impl NotificationResponse {
    pub const MSGTYPE: u8 = b'A';
}

impl BackendProtocol for NotificationResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        need!(body, 4);
        Ok(Self {
            process_id: body.get_u32(),
            channel: body.try_get_nul_bytestr()?,
            payload: body.try_get_nul_bytestr()?,
        })
    }
}

/// Identifies the message type. ReadyForQuery is sent whenever the backend
/// is ready for a new query cycle.
#[derive(Debug)]
pub struct ReadyForQuery {
    /// Current backend transaction status indicator: `I`, `T` or `E`.
    pub status: u8,
}

impl ReadyForQuery {
    pub const MSGTYPE: u8 = b'Z';
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        need!(body, 1);
        Ok(Self { status: body.get_u8() })
    }
}

/// Identifies the message as `COPY` data.
#[derive(Debug)]
pub struct CopyData {
    pub data: Bytes,
}

impl CopyData {
    pub const MSGTYPE: u8 = b'd';
}

impl BackendProtocol for CopyData {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        Ok(Self { data: body })
    }
}

/// Identifies the message as a Start Copy In response.
#[derive(Debug)]
pub struct CopyInResponse {
    pub body: Bytes,
}

impl CopyInResponse {
    pub const MSGTYPE: u8 = b'G';
}

impl BackendProtocol for CopyInResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a Start Copy Out response.
#[derive(Debug)]
pub struct CopyOutResponse {
    pub body: Bytes,
}

impl CopyOutResponse {
    pub const MSGTYPE: u8 = b'H';
}

impl BackendProtocol for CopyOutResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name;

        impl $name {
            pub const MSGTYPE: u8 = $ty;
        }

        impl BackendProtocol for $name {
            fn decode(msgtype: u8, _: Bytes) -> Result<Self, FramingError> {
                assert_msgtype!(msgtype);
                Ok(Self)
            }
        }
    )*};
}

unit_msg! {
    /// Identifies the message as a Bind-complete indicator.
    struct BindComplete, b'2';

    /// Identifies the message as a Close-complete indicator.
    struct CloseComplete, b'3';

    /// Identifies the message as a `COPY`-complete indicator.
    struct CopyDone, b'c';

    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';

    /// Identifies the message as a no-data indicator.
    struct NoData, b'n';

    /// Identifies the message as a Parse-complete indicator.
    struct ParseComplete, b'1';

    /// Identifies the message as a portal-suspended indicator.
    ///
    /// Note this only appears if an Execute message's row-count limit was reached.
    struct PortalSuspended, b's';
}

// ===== ErrorResponse / NoticeResponse =====

/// Identifies the message as an error.
///
/// The message body consists of one or more identified fields, followed by
/// a zero byte as a terminator. Fields can appear in any order.
#[derive(Debug)]
pub struct ErrorResponse {
    pub error: ServerError,
}

impl ErrorResponse {
    pub const MSGTYPE: u8 = b'E';
}

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        Ok(Self { error: ServerError::parse(body)? })
    }
}

/// A warning message. The field layout is identical to [`ErrorResponse`].
#[derive(Debug)]
pub struct NoticeResponse {
    pub notice: ServerError,
}

impl NoticeResponse {
    pub const MSGTYPE: u8 = b'N';
}

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, FramingError> {
        assert_msgtype!(msgtype);
        Ok(Self { notice: ServerError::parse(body)? })
    }
}

/// Severity of a [`ServerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Fatal,
    Panic,
    Warning,
    Notice,
    Debug,
    Info,
    Log,
}

impl Severity {
    fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "ERROR" => Self::Error,
            "FATAL" => Self::Fatal,
            "PANIC" => Self::Panic,
            "WARNING" => Self::Warning,
            "NOTICE" => Self::Notice,
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "LOG" => Self::Log,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Panic => "PANIC",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Log => "LOG",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the server, with all identified fields.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug)]
pub struct ServerError {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<String>,
    pub internal_position: Option<String>,
    pub internal_query: Option<String>,
    pub where_: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub data_type_name: Option<String>,
    pub constraint_name: Option<String>,
    pub file_name: Option<String>,
    pub line_number: Option<String>,
    pub routine_name: Option<String>,
}

impl ServerError {
    /// Parse the field list of an `ErrorResponse` or `NoticeResponse` body.
    ///
    /// Format: `({field_code:u8}{field_value}\0)+\0`. Unrecognized field
    /// codes are silently ignored, as the protocol requires.
    pub(crate) fn parse(mut body: Bytes) -> Result<Self, FramingError> {
        let mut severity = None;
        let mut fields: [Option<String>; 16] = Default::default();

        loop {
            need!(body, 1);
            let code = body.get_u8();
            if code == 0 {
                break;
            }
            let value = body.try_get_nul_bytestr()?;
            let idx = match code {
                // 'S' is the localized severity, 'V' the stable one; prefer
                // 'V' but accept 'S' from pre-9.6 servers.
                b'V' => {
                    severity = Severity::parse(&value);
                    continue;
                }
                b'S' => {
                    if severity.is_none() {
                        severity = Severity::parse(&value);
                    }
                    continue;
                }
                b'C' => 0,
                b'M' => 1,
                b'D' => 2,
                b'H' => 3,
                b'P' => 4,
                b'p' => 5,
                b'q' => 6,
                b'W' => 7,
                b's' => 8,
                b't' => 9,
                b'c' => 10,
                b'd' => 11,
                b'n' => 12,
                b'F' => 13,
                b'L' => 14,
                b'R' => 15,
                _ => continue,
            };
            fields[idx] = Some(value.as_str().to_owned());
        }

        let severity = severity
            .ok_or_else(|| FramingError::new("missing severity in error response"))?;
        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or(None);

        let code = next().ok_or_else(|| FramingError::new("missing code in error response"))?;
        let message =
            next().ok_or_else(|| FramingError::new("missing message in error response"))?;

        Ok(Self {
            severity,
            code,
            message,
            detail: next(),
            hint: next(),
            position: next(),
            internal_position: next(),
            internal_query: next(),
            where_: next(),
            schema_name: next(),
            table_name: next(),
            column_name: next(),
            data_type_name: next(),
            constraint_name: next(),
            file_name: next(),
            line_number: next(),
            routine_name: next(),
        })
    }

    /// `FATAL` and `PANIC` severities terminate the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity, Severity::Fatal | Severity::Panic)
    }

    /// The server invalidated a cached plan, usually after a schema change.
    ///
    /// When no transaction is active, a retry of the same statement is safe
    /// once the scheduled Close has been processed.
    pub fn is_cached_plan_invalid(&self) -> bool {
        self.routine_name.as_deref() == Some("RevalidateCachedQuery")
    }

    /// The server no longer knows the named prepared statement (code 26000).
    pub fn is_statement_missing(&self) -> bool {
        self.code == "26000"
    }
}

impl std::error::Error for ServerError { }

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.code, self.message)
    }
}
