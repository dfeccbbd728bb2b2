//! Postgres Frontend Messages
//!
//! All struct fields here mirror the actual message sent to postgres.
use bytes::{BufMut, BytesMut};

use crate::encode::Encoded;
use crate::ext::{BufMutExt, StrExt, UsizeExt};

use super::PgFormat;

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size = msg.size_hint();
    buf.reserve(PREFIX + size as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_i32(4 + size);

    msg.encode(&mut *buf);

    debug_assert_eq!(
        buf.len() - offset,
        PREFIX + size as usize,
        "frontend message body not equal to size hint"
    );
}

/// A type which can be encoded into a postgres frontend message.
///
/// For historical reasons, the very first message sent by the client (the
/// startup message) has no initial message-type byte.
///
/// Thus, [`Startup`], [`SslRequest`] and [`CancelRequest`] do not implement
/// [`FrontendProtocol`].
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Size of the main body.
    ///
    /// Note that this is *only* the size of the main body as opposed to the
    /// full postgres message.
    fn size_hint(&self) -> i32;

    /// Write the main body of the message.
    fn encode(self, buf: impl BufMut);
}

/// Postgres Startup frontend message.
///
/// The protocol version number is followed by pairs of parameter name and
/// value strings; a zero byte is required after the last pair.
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as. Required; there is no default.
    pub user: &'a str,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
    /// Displayed in `pg_stat_activity` and log lines.
    pub application_name: Option<&'a str>,
    /// Session time zone to request at backend start.
    pub timezone: Option<&'a str>,
}

impl Startup<'_> {
    /// The protocol version number: major 3, minor 0.
    pub const PROTOCOL_VERSION: i32 = 196608;

    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // Length of message contents in bytes, including self.
        // Reserve 4 bytes, written after assembly.
        buf.put_i32(0);
        buf.put_i32(Self::PROTOCOL_VERSION);

        let pairs = [
            ("user", Some(self.user)),
            ("database", self.database),
            ("application_name", self.application_name),
            ("timezone", self.timezone),
            // The engine only operates in ISO DateStyle and UTF-8; request
            // both so the first ParameterStatus reports already match.
            ("DateStyle", Some("ISO")),
            ("client_encoding", Some("UTF8")),
        ];

        for (name, value) in pairs {
            let Some(value) = value else { continue };
            if value.is_empty() {
                continue;
            }
            buf.put_nul_string(name);
            buf.put_nul_string(value);
        }

        // A zero byte is required as a terminator after the last pair.
        buf.put_u8(b'\0');

        // write the length over the reserved prefix
        let mut written = &mut buf[offset..];
        let len = written.len().to_i32();
        written.put_i32(len);
    }
}

/// Request to initiate TLS. The server answers with a single byte:
/// `S` to proceed with the handshake or `N` to continue in cleartext.
#[derive(Debug)]
pub struct SslRequest;

impl SslRequest {
    pub const CODE: i32 = 80877103;

    pub fn write(self, buf: &mut BytesMut) {
        buf.put_i32(8);
        buf.put_i32(Self::CODE);
    }
}

/// Out-of-band cancellation request, sent over a dedicated connection.
#[derive(Debug)]
pub struct CancelRequest {
    /// The process ID of the target backend.
    pub process_id: u32,
    /// The secret key for the target backend.
    pub secret_key: u32,
}

impl CancelRequest {
    pub const CODE: i32 = 80877102;

    pub fn write(self, buf: &mut BytesMut) {
        buf.put_i32(16);
        buf.put_i32(Self::CODE);
        buf.put_u32(self.process_id);
        buf.put_u32(self.secret_key);
    }
}

/// Password response, also carries SASL payloads in later auth phases.
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    /// The password (encrypted, if requested).
    pub password: &'a [u8],
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> i32 {
        self.password.len().to_i32() + 1
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_slice(self.password);
        buf.put_u8(b'\0');
    }
}

/// Initial SASL response carrying the selected mechanism name and the
/// client-first message.
#[derive(Debug)]
pub struct SaslInitialResponse<'a> {
    /// Name of the SASL authentication mechanism that the client selected.
    pub mechanism: &'a str,
    /// SASL mechanism specific "initial response".
    pub data: &'a [u8],
}

impl FrontendProtocol for SaslInitialResponse<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> i32 {
        self.mechanism.nul_string_len() + 4 + self.data.len().to_i32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.mechanism);
        buf.put_i32(self.data.len().to_i32());
        buf.put_slice(self.data);
    }
}

/// SASL response for the continuation phases, data only.
#[derive(Debug)]
pub struct SaslResponse<'a> {
    /// SASL mechanism specific message data.
    pub data: &'a [u8],
}

impl FrontendProtocol for SaslResponse<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> i32 {
        self.data.len().to_i32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_slice(self.data);
    }
}

/// Identifies the message as a simple query.
#[derive(Debug)]
pub struct Query<'a> {
    /// The query string itself.
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> i32 {
        self.sql.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Identifies the message as a Parse command.
pub struct Parse<'a, I> {
    /// Prepared statement name (an empty string selects the unnamed
    /// prepared statement).
    pub prepare_name: &'a str,
    /// The query string to be parsed.
    pub sql: &'a str,
    /// The number of parameter data types specified (can be zero).
    ///
    /// Note that this is not an indication of the number of parameters that
    /// might appear in the query string, only the number that the frontend
    /// wants to prespecify types for.
    pub oids_len: i16,
    /// The object ID of each parameter data type.
    ///
    /// Placing a zero here is equivalent to leaving the type unspecified.
    pub oids: I,
}

impl<I> FrontendProtocol for Parse<'_, I>
where
    I: IntoIterator<Item = u32>,
{
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> i32 {
        self.prepare_name.nul_string_len()
            + self.sql.nul_string_len()
            + 2
            + (self.oids_len as i32 * 4)
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.prepare_name);
        buf.put_nul_string(self.sql);
        buf.put_i16(self.oids_len);
        for oid in self.oids {
            buf.put_u32(oid);
        }
    }
}

/// Identifies the message as a Bind command.
pub struct Bind<'a> {
    /// The name of the destination portal (an empty string selects the
    /// unnamed portal).
    pub portal_name: &'a str,
    /// The name of the source prepared statement (an empty string selects
    /// the unnamed prepared statement).
    pub stmt_name: &'a str,
    /// Encoded parameter values; one format code is sent per parameter.
    pub params: &'a [Encoded],
    /// Format applied to all result columns.
    pub result_format: PgFormat,
}

impl FrontendProtocol for Bind<'_> {
    const MSGTYPE: u8 = b'B';

    fn size_hint(&self) -> i32 {
        self.portal_name.nul_string_len()
            + self.stmt_name.nul_string_len()
            // param format code count + codes
            + 2 + self.params.len().to_i32() * 2
            // param count + (length, value) pairs; NULL sends no value bytes
            + 2
            + self
                .params
                .iter()
                .fold(0i32, |acc, p| acc + 4 + p.as_bytes().len().to_i32())
            // result format code count + single code
            + 2 + 2
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_nul_string(self.stmt_name);

        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            buf.put_u16(param.format().format_code());
        }

        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            // The length of the parameter value (not including itself);
            // -1 indicates NULL and no value bytes follow.
            buf.put_i32(param.wire_len());
            buf.put_slice(param.as_bytes());
        }

        buf.put_u16(1);
        buf.put_u16(self.result_format.format_code());
    }
}

/// Identifies the message as a Describe command.
pub struct Describe<'a> {
    /// `'S'` to describe a prepared statement; or `'P'` to describe a portal.
    pub kind: u8,
    /// The name of the prepared statement or portal to describe
    /// (an empty string selects the unnamed prepared statement or portal).
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn size_hint(&self) -> i32 {
        1 + self.name.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

/// Identifies the message as an Execute command.
pub struct Execute<'a> {
    /// The name of the portal to execute (an empty string selects the
    /// unnamed portal).
    pub portal_name: &'a str,
    /// Maximum number of rows to return, if portal contains a query that
    /// returns rows (ignored otherwise). Zero denotes "no limit".
    pub max_row: i32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn size_hint(&self) -> i32 {
        self.portal_name.nul_string_len() + 4
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_i32(self.max_row);
    }
}

/// Identifies the message as a Close command.
pub struct Close<'a> {
    /// `'S'` to close a prepared statement; or `'P'` to close a portal.
    pub variant: u8,
    /// The name of the prepared statement or portal to close
    /// (an empty string selects the unnamed prepared statement or portal).
    pub name: &'a str,
}

impl FrontendProtocol for Close<'_> {
    const MSGTYPE: u8 = b'C';

    fn size_hint(&self) -> i32 {
        1 + self.name.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(self.variant);
        buf.put_nul_string(self.name);
    }
}

/// `COPY` failure indicator from the client.
pub struct CopyFail<'a> {
    /// An error message to report as the cause of failure.
    pub message: &'a str,
}

impl FrontendProtocol for CopyFail<'_> {
    const MSGTYPE: u8 = b'f';

    fn size_hint(&self) -> i32 {
        self.message.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.message);
    }
}

/// `COPY` data transfer from the client.
pub struct CopyData<'a> {
    pub data: &'a [u8],
}

impl FrontendProtocol for CopyData<'_> {
    const MSGTYPE: u8 = b'd';

    fn size_hint(&self) -> i32 {
        self.data.len().to_i32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_slice(self.data);
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name;

        impl FrontendProtocol for $name {
            const MSGTYPE: u8 = $ty;

            fn size_hint(&self) -> i32 { 0 }

            fn encode(self, _: impl BufMut) { }
        }
    )*};
}

unit_msg! {
    /// Identifies the message as a `COPY`-complete indicator.
    struct CopyDone, b'c';

    /// Identifies the message as a Flush command.
    struct Flush, b'H';

    /// Identifies the message as a Sync command.
    struct Sync, b'S';

    /// Identifies the message as a termination.
    struct Terminate, b'X';
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_frame_layout() {
        let mut buf = BytesMut::new();
        Startup { user: "fred", database: Some("db"), application_name: None, timezone: None }
            .write(&mut buf);

        let len = i32::from_be_bytes(buf[..4].try_into().unwrap()) as usize;
        assert_eq!(len, buf.len());
        assert_eq!(&buf[4..8], &Startup::PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(*buf.last().unwrap(), 0);
        let body = &buf[8..buf.len() - 1];
        let pairs: Vec<&[u8]> = body.split(|b| *b == 0).collect();
        assert_eq!(
            pairs,
            [
                &b"user"[..], b"fred", b"database", b"db",
                b"DateStyle", b"ISO", b"client_encoding", b"UTF8", b"",
            ],
        );
    }

    #[test]
    fn sync_frame() {
        let mut buf = BytesMut::new();
        write(Sync, &mut buf);
        assert_eq!(&buf[..], b"S\x00\x00\x00\x04");
    }

    #[test]
    fn describe_portal_frame() {
        let mut buf = BytesMut::new();
        write(Describe { kind: b'P', name: "" }, &mut buf);
        assert_eq!(&buf[..], b"D\x00\x00\x00\x06P\x00");
    }

    #[test]
    fn execute_and_sync_frame() {
        let mut buf = BytesMut::new();
        write(Execute { portal_name: "", max_row: 0 }, &mut buf);
        write(Sync, &mut buf);
        assert_eq!(&buf[..], b"E\x00\x00\x00\x09\x00\x00\x00\x00\x00S\x00\x00\x00\x04");
    }
}
