//! The single connection protocol engine.
//!
//! The engine is sans-io: the transport feeds received bytes in through
//! [`write_region`][Engine::write_region] / [`advance`][Engine::advance] /
//! [`drain`][Engine::drain], and the `*_message` builders return the bytes
//! to send. One logical task drives a connection at a time; the engine
//! performs no synchronisation of its own.
use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::auth::{AuthOutcome, Authenticator};
use crate::cache::{CacheKey, Commit, StatementCache};
use crate::encode::Encoded;
use crate::error::{Error, Result, StateError};
use crate::framer::{Framer, SSL_REPLY_TAG};
use crate::postgres::backend::{
    Authentication, BackendMessage, BackendProtocol, CommandComplete, DataRow, ReadyForQuery,
    RowDescription, ServerError,
};
use crate::postgres::frontend::{self, CancelRequest, SslRequest, Startup};
use crate::postgres::{PgFormat, ResultFormat, TransactionStatus};
use crate::result::{FieldDescription, QueryResult, ResultSet};
use crate::session::Session;
use crate::statement::StatementName;
use crate::types::{self, ColumnDecoder};
use crate::value::PgValue;

/// Connection state of the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolStatus {
    #[default]
    Closed,
    /// An SSL request went out, the single byte answer is pending.
    SslRequested,
    /// Startup sent, authentication in progress.
    Connecting,
    /// Authentication succeeded, session parameters are settling.
    Authenticating,
    ReadyForQuery,
    /// An execute cycle is in flight; no new execute is accepted until
    /// ReadyForQuery.
    Executing,
    Terminating,
}

/// Asynchronous notification received from `NOTIFY`.
#[derive(Clone, Debug)]
pub struct Notification {
    pub process_id: u32,
    pub channel: String,
    pub payload: String,
}

/// A completed step the facade must act on.
#[derive(Debug)]
pub enum Outcome {
    /// Answer to an SSL request: proceed with TLS or stay in cleartext.
    SslAccepted(bool),
    /// Authentication payload to write to the transport.
    Send(Bytes),
    /// Startup finished, the connection accepts queries.
    Ready,
    /// The execute cycle finished.
    Batch(ResultSet),
    /// The execute cycle failed; the connection stays usable.
    Failed(Error),
}

/// Startup parameters for [`Engine::startup_message`].
#[derive(Debug, Default)]
pub struct StartupConfig<'a> {
    user: &'a str,
    password: Option<&'a [u8]>,
    database: Option<&'a str>,
    application_name: Option<&'a str>,
    timezone: Option<&'a str>,
}

impl<'a> StartupConfig<'a> {
    /// Create new config, the database user name is required.
    pub fn new(user: &'a str) -> Self {
        Self { user, ..Self::default() }
    }

    /// Authentication password; omit it only for trust setups.
    pub fn password(mut self, password: &'a [u8]) -> Self {
        self.password = Some(password);
        self
    }

    /// The database to connect to. Defaults to the user name.
    pub fn database(mut self, database: &'a str) -> Self {
        self.database = Some(database);
        self
    }

    /// Displayed in `pg_stat_activity` and log lines.
    pub fn application_name(mut self, name: &'a str) -> Self {
        self.application_name = Some(name);
        self
    }

    /// Session time zone to request at backend start.
    pub fn timezone(mut self, timezone: &'a str) -> Self {
        self.timezone = Some(timezone);
        self
    }
}

/// The wire protocol state machine for one postgres connection.
pub struct Engine {
    framer: Framer,
    status: ProtocolStatus,
    session: Session,
    cache: StatementCache,
    auth: Authenticator,

    // accumulators for the execute cycle in flight
    res_fields: Option<Vec<FieldDescription>>,
    res_decoders: Option<Vec<ColumnDecoder>>,
    res_rows: Option<Vec<Vec<PgValue>>>,
    results: Option<Vec<QueryResult>>,
    current_key: Option<CacheKey>,
    row_format: PgFormat,
    raw_result: bool,
    pending_error: Option<Error>,

    outcomes: Vec<Outcome>,
    notifications: VecDeque<Notification>,
}

impl Engine {
    /// Engine with the default prepare threshold (5) and cache size (100).
    pub fn new() -> Self {
        Self::with_cache(5, 100)
    }

    /// Engine with an explicit prepare threshold and cache size. Threshold
    /// zero disables the statement cache.
    pub fn with_cache(prepare_threshold: u32, cache_size: usize) -> Self {
        Self {
            framer: Framer::new(),
            status: ProtocolStatus::Closed,
            session: Session::new(),
            cache: StatementCache::new(prepare_threshold, cache_size),
            auth: Authenticator::default(),
            res_fields: None,
            res_decoders: None,
            res_rows: None,
            results: None,
            current_key: None,
            row_format: PgFormat::Text,
            raw_result: false,
            pending_error: None,
            outcomes: Vec::new(),
            notifications: VecDeque::new(),
        }
    }

    pub fn status(&self) -> ProtocolStatus {
        self.status
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.session.transaction_status()
    }

    /// Pop the oldest queued notification.
    pub fn take_notification(&mut self) -> Option<Notification> {
        self.notifications.pop_front()
    }

    // ===== outbound =====

    /// The SSL negotiation request; the server answers with one byte,
    /// surfaced as [`Outcome::SslAccepted`].
    pub fn ssl_request_message(&mut self) -> Result<Bytes> {
        self.expect_status(ProtocolStatus::Closed, "ssl request")?;
        let mut buf = BytesMut::new();
        SslRequest.write(&mut buf);
        self.framer.expect_ssl_reply();
        self.status = ProtocolStatus::SslRequested;
        Ok(buf.freeze())
    }

    /// The startup packet. The facade sends it and feeds the reply stream
    /// back in; authentication responses surface as [`Outcome::Send`].
    pub fn startup_message(&mut self, config: &StartupConfig) -> Result<Bytes> {
        if !matches!(self.status, ProtocolStatus::Closed | ProtocolStatus::SslRequested) {
            return Err(StateError::new("startup on an active connection").into());
        }
        self.auth.set_credentials(config.user, config.password);

        let mut buf = BytesMut::new();
        Startup {
            user: config.user,
            database: config.database,
            application_name: config.application_name,
            timezone: config.timezone,
        }
        .write(&mut buf);

        self.status = ProtocolStatus::Connecting;
        debug!("connecting");
        Ok(buf.freeze())
    }

    /// The out-of-band cancel packet, to be sent over a dedicated
    /// connection. Available once startup captured the backend key.
    pub fn cancel_message(&self) -> Result<Bytes> {
        let (process_id, secret_key) = self
            .session
            .backend_key()
            .ok_or_else(|| StateError::new("no backend key received"))?;
        let mut buf = BytesMut::new();
        CancelRequest { process_id, secret_key }.write(&mut buf);
        Ok(buf.freeze())
    }

    /// The terminate message; the transport closes after sending it.
    pub fn terminate_message(&mut self) -> Bytes {
        self.status = ProtocolStatus::Terminating;
        let mut buf = BytesMut::new();
        frontend::write(frontend::Terminate, &mut buf);
        buf.freeze()
    }

    /// Build the message sequence for one execute cycle.
    ///
    /// A parameterless statement with text results and no cached name goes
    /// out as a Simple Query. Everything else uses the extended flow:
    /// Parse (unless prepared), Bind, Describe (unless prepared), Execute,
    /// Sync, with a pending statement Close piggy backed up front. The
    /// chunks must reach the transport in order, as one write.
    pub fn execute_message(
        &mut self,
        sql: &str,
        params: Vec<Encoded>,
        result_format: ResultFormat,
        raw_result: bool,
    ) -> Result<Vec<Bytes>> {
        self.expect_status(ProtocolStatus::ReadyForQuery, "execute")?;

        let mut chunks = Vec::with_capacity(4);

        if let Some(name) = self.cache.pending_close() {
            let mut buf = BytesMut::new();
            frontend::write(frontend::Close { variant: b'S', name: name.as_str() }, &mut buf);
            chunks.push(buf.freeze());
        }

        let mut stmt_name = StatementName::unnamed();
        let mut prepared = false;
        self.current_key = None;
        self.res_fields = None;
        self.res_decoders = None;
        self.res_rows = None;

        if self.cache.enabled() {
            let key = CacheKey::new(sql, params.iter().map(Encoded::oid));
            if let Some(hit) = self.cache.lookup(&key) {
                stmt_name = hit.name;
                prepared = hit.prepared;
                if prepared {
                    self.res_fields = hit.fields;
                    self.res_decoders = hit.decoders;
                }
            }
            self.current_key = Some(key);
        }

        let format = match result_format {
            ResultFormat::Text => PgFormat::Text,
            ResultFormat::Binary => PgFormat::Binary,
            ResultFormat::Default => {
                if params.is_empty() && !prepared && stmt_name.is_unnamed() {
                    PgFormat::Text
                } else {
                    PgFormat::Binary
                }
            }
        };

        let simple = params.is_empty()
            && format == PgFormat::Text
            && !prepared
            && stmt_name.is_unnamed();

        if simple {
            let mut buf = BytesMut::new();
            frontend::write(frontend::Query { sql }, &mut buf);
            chunks.push(buf.freeze());
        } else {
            if !prepared {
                let mut buf = BytesMut::new();
                frontend::write(
                    frontend::Parse {
                        prepare_name: stmt_name.as_str(),
                        sql,
                        oids_len: params.len() as i16,
                        oids: params.iter().map(Encoded::oid),
                    },
                    &mut buf,
                );
                chunks.push(buf.freeze());
            }

            let mut buf = BytesMut::new();
            frontend::write(
                frontend::Bind {
                    portal_name: "",
                    stmt_name: stmt_name.as_str(),
                    params: &params,
                    result_format: format,
                },
                &mut buf,
            );
            chunks.push(buf.freeze());
            // parameter buffers are released with `params` after framing

            if !prepared {
                let mut buf = BytesMut::new();
                frontend::write(frontend::Describe { kind: b'P', name: "" }, &mut buf);
                chunks.push(buf.freeze());
            }

            let mut buf = BytesMut::new();
            frontend::write(frontend::Execute { portal_name: "", max_row: 0 }, &mut buf);
            frontend::write(frontend::Sync, &mut buf);
            chunks.push(buf.freeze());
        }

        if prepared && self.res_fields.is_some() {
            self.res_rows = Some(Vec::new());
        }
        self.results = Some(Vec::new());
        self.row_format = format;
        self.raw_result = raw_result;
        self.status = ProtocolStatus::Executing;

        Ok(chunks)
    }

    // ===== inbound =====

    /// A writable region for the transport to receive into.
    pub fn write_region(&mut self, size_hint: usize) -> &mut [u8] {
        self.framer.write_region(size_hint)
    }

    /// Notify that `n` bytes were written into the last region.
    pub fn advance(&mut self, n: usize) {
        self.framer.advance(n);
    }

    /// Process all complete frames received so far.
    ///
    /// Returns the outcomes the facade must act on, in order; usually
    /// zero or one per drain. An `Err` is fatal: the engine is closed and
    /// any in-flight operation is lost.
    pub fn drain(&mut self) -> Result<Vec<Outcome>> {
        loop {
            let frame = match self.framer.next_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    self.status = ProtocolStatus::Closed;
                    return Err(err.into());
                }
            };
            let Some((tag, body)) = frame else { break };

            if let Err(err) = self.handle_frame(tag, body) {
                // errors inside an execute cycle are reported in place of
                // the batch result once ReadyForQuery arrives
                if self.status == ProtocolStatus::Executing {
                    if self.pending_error.is_none() {
                        self.pending_error = Some(err);
                    }
                } else {
                    self.status = ProtocolStatus::Closed;
                    return Err(err);
                }
            }
        }
        Ok(std::mem::take(&mut self.outcomes))
    }

    fn expect_status(&self, expected: ProtocolStatus, operation: &str) -> Result<(), StateError> {
        if self.status != expected {
            return Err(StateError::new(format!(
                "{operation} requires {expected:?}, connection is {:?}",
                self.status,
            )));
        }
        Ok(())
    }

    fn handle_frame(&mut self, tag: u8, body: Bytes) -> Result<()> {
        if tag == SSL_REPLY_TAG {
            let accepted = match body.first() {
                Some(b'S') => true,
                Some(b'N') => false,
                _ => {
                    return Err(StateError::new("unexpected answer to ssl request").into());
                }
            };
            self.status = ProtocolStatus::Closed;
            self.outcomes.push(Outcome::SslAccepted(accepted));
            return Ok(());
        }

        match BackendMessage::decode(tag, body)? {
            BackendMessage::Authentication(auth) => self.handle_auth(auth),
            BackendMessage::BackendKeyData(key) => {
                self.session.set_backend_key(key.process_id, key.secret_key);
                Ok(())
            }
            BackendMessage::ParameterStatus(status) => {
                if let Err(err) = self.session.update(&status.name, &status.value) {
                    // a broken encoding poisons every decode after it
                    self.status = ProtocolStatus::Closed;
                    return Err(err.into());
                }
                Ok(())
            }
            BackendMessage::NoticeResponse(notice) => {
                warn!(notice = %notice.notice, "server notice");
                Ok(())
            }
            BackendMessage::NotificationResponse(n) => {
                self.notifications.push_back(Notification {
                    process_id: n.process_id,
                    channel: n.channel.as_str().to_owned(),
                    payload: n.payload.as_str().to_owned(),
                });
                Ok(())
            }
            BackendMessage::NegotiateProtocolVersion(v) => {
                warn!(minor = v.minor, "server negotiated an older protocol");
                Ok(())
            }
            BackendMessage::RowDescription(rd) => self.handle_row_description(rd),
            BackendMessage::NoData(_) => Ok(()),
            BackendMessage::DataRow(dr) => self.handle_data_row(dr),
            BackendMessage::CommandComplete(cmd) => self.handle_command_complete(cmd),
            BackendMessage::EmptyQueryResponse(_) => Ok(()),
            BackendMessage::ParseComplete(_) => {
                if let Some(key) = &self.current_key {
                    self.cache.mark_parsed(key);
                }
                Ok(())
            }
            BackendMessage::BindComplete(_) => Ok(()),
            BackendMessage::CloseComplete(_) => {
                if !self.cache.close_complete() {
                    return Err(StateError::new("unexpected close complete message").into());
                }
                Ok(())
            }
            BackendMessage::PortalSuspended(_) => Ok(()),
            BackendMessage::ParameterDescription(_) => Ok(()),
            BackendMessage::ErrorResponse(err) => self.handle_error(err.error),
            BackendMessage::ReadyForQuery(rfq) => self.handle_ready_for_query(rfq),
            BackendMessage::CopyInResponse(_) => {
                // abort the copy so the server returns to the query cycle
                let mut buf = BytesMut::new();
                frontend::write(
                    frontend::CopyFail { message: "COPY is not supported" },
                    &mut buf,
                );
                self.outcomes.push(Outcome::Send(buf.freeze()));
                Err(StateError::new("COPY FROM STDIN is not supported").into())
            }
            BackendMessage::CopyOutResponse(_) => {
                Err(StateError::new("COPY TO STDOUT is not supported").into())
            }
            // the data of a rejected COPY TO is dropped until the server
            // completes the command
            BackendMessage::CopyData(_) => Ok(()),
            BackendMessage::CopyDone(_) => Ok(()),
        }
    }

    fn handle_auth(&mut self, auth: Authentication) -> Result<()> {
        self.expect_status(ProtocolStatus::Connecting, "authentication")?;
        let mut buf = BytesMut::new();
        match self.auth.handle(auth, &mut buf).map_err(|e| e.context("authentication"))? {
            AuthOutcome::Ok => {
                self.status = ProtocolStatus::Authenticating;
                debug!("authenticated");
            }
            AuthOutcome::Respond => {
                if !buf.is_empty() {
                    self.outcomes.push(Outcome::Send(buf.freeze()));
                }
            }
        }
        Ok(())
    }

    fn handle_row_description(&mut self, rd: RowDescription) -> Result<()> {
        let fields = FieldDescription::parse_all(rd.body, rd.field_len)?;
        let decoders: Vec<ColumnDecoder> = fields
            .iter()
            .map(|f| types::lookup(f.type_oid).unwrap_or(ColumnDecoder::Unknown))
            .collect();

        if let Some(key) = &self.current_key {
            self.cache.attach_description(key, &fields, &decoders);
        }

        self.res_fields = Some(fields);
        self.res_decoders = Some(decoders);
        self.res_rows = Some(Vec::new());
        Ok(())
    }

    fn handle_data_row(&mut self, dr: DataRow) -> Result<()> {
        let decoders = self
            .res_decoders
            .as_deref()
            .ok_or_else(|| StateError::new("data row without a row description"))?;
        let rows = self
            .res_rows
            .as_mut()
            .ok_or_else(|| StateError::new("data row without a row description"))?;

        if dr.column_len as usize != decoders.len() {
            return Err(StateError::new("invalid number of row values").into());
        }

        let mut body = dr.body;
        let mut row = Vec::with_capacity(decoders.len());
        for decoder in decoders {
            if body.remaining() < 4 {
                return Err(StateError::new("truncated data row").into());
            }
            let len = body.get_i32();
            if len == -1 {
                row.push(PgValue::Null);
                continue;
            }
            let len = len as usize;
            if body.remaining() < len {
                return Err(StateError::new("truncated data row").into());
            }
            let raw = body.split_to(len);

            let value = if self.raw_result {
                match self.row_format {
                    PgFormat::Text => PgValue::Text(
                        std::str::from_utf8(&raw)
                            .map_err(|_| StateError::new("raw row value is not utf8"))?
                            .to_owned(),
                    ),
                    PgFormat::Binary => PgValue::Bytes(raw.to_vec()),
                }
            } else {
                decoder.decode(&self.session, self.row_format, &raw)?
            };
            row.push(value);
        }
        if body.has_remaining() {
            return Err(StateError::new("additional data after data row").into());
        }
        rows.push(row);
        Ok(())
    }

    fn handle_command_complete(&mut self, cmd: CommandComplete) -> Result<()> {
        let results = self
            .results
            .as_mut()
            .ok_or_else(|| StateError::new("unexpected command complete message"))?;

        let tag = cmd.tag.as_str().to_owned();
        if tag == "DISCARD ALL" || tag == "DEALLOCATE ALL" {
            self.cache.wipe();
        }

        results.push(QueryResult {
            fields: self.res_fields.take(),
            rows: self.res_rows.take(),
            tag,
        });
        self.res_decoders = None;
        Ok(())
    }

    fn handle_error(&mut self, error: ServerError) -> Result<()> {
        if error.is_fatal() {
            self.status = ProtocolStatus::Closed;
            return Err(error.into());
        }
        if self.pending_error.is_none() {
            self.pending_error = Some(error.into());
        }
        Ok(())
    }

    fn handle_ready_for_query(&mut self, rfq: ReadyForQuery) -> Result<()> {
        let tx = TransactionStatus::from_byte(rfq.status)
            .ok_or_else(|| StateError::new("invalid transaction status"))?;
        self.session.set_transaction_status(tx);

        if self.cache.enabled() {
            if let Some(key) = self.current_key.take() {
                let commit = match &self.pending_error {
                    None => Commit::Success {
                        cacheable: self.results.as_ref().is_some_and(|results| {
                            results.len() == 1
                                && !matches!(
                                    results[0].tag.as_str(),
                                    "DISCARD ALL" | "DEALLOCATE ALL",
                                )
                        }),
                    },
                    Some(err) => match err.as_server_error() {
                        Some(server) => Commit::ServerError(server),
                        None => Commit::Failed,
                    },
                };
                self.cache.commit(&key, commit);
            }
        }
        self.current_key = None;
        self.res_fields = None;
        self.res_decoders = None;
        self.res_rows = None;

        self.status = ProtocolStatus::ReadyForQuery;
        self.outcomes.push(match (self.pending_error.take(), self.results.take()) {
            (Some(err), _) => Outcome::Failed(err),
            (None, Some(results)) => Outcome::Batch(ResultSet::new(results)),
            (None, None) => Outcome::Ready,
        });
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("status", &self.status)
            .field("transaction_status", &self.session.transaction_status())
            .field("cache", &self.cache)
            .finish()
    }
}
