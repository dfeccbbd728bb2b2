//! `pagio` error types.
use std::{backtrace::Backtrace, borrow::Cow, fmt, io};

use crate::postgres::backend::ServerError;

/// A specialized [`Result`] type for `pagio` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from the `pagio` engine.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Returns the server error when the kind is [`ErrorKind::Server`].
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match &self.kind {
            ErrorKind::Server(e) => Some(e),
            _ => None,
        }
    }
}

/// All possible error kind from the `pagio` engine.
pub enum ErrorKind {
    /// Message boundary could not be established.
    Framing(FramingError),
    /// A value could not be decoded for its declared oid and format.
    Decode(DecodeError),
    /// A parameter could not be encoded.
    Encode(EncodeError),
    /// A message arrived in a state that does not accept it.
    State(StateError),
    /// `ErrorResponse` reported by the server.
    Server(ServerError),
    /// Session configuration the engine can not operate under.
    Config(ConfigError),
    /// Error propagated verbatim from the transport.
    Io(io::Error),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<FramingError>e => ErrorKind::Framing(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<EncodeError>e => ErrorKind::Encode(e));
from!(<StateError>e => ErrorKind::State(e));
from!(<ServerError>e => ErrorKind::Server(e));
from!(<ConfigError>e => ErrorKind::Config(e));
from!(<io::Error>e => ErrorKind::Io(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framing(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::Encode(e) => e.fmt(f),
            Self::State(e) => e.fmt(f),
            Self::Server(e) => e.fmt(f),
            Self::Config(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

macro_rules! reason_error {
    ($(
        $(#[$doc:meta])* struct $name:ident, $prefix:literal;
    )*) => {$(
        $(#[$doc])*
        pub struct $name {
            reason: Cow<'static, str>,
        }

        impl $name {
            pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
                Self { reason: reason.into() }
            }
        }

        impl std::error::Error for $name { }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ": {}"), self.reason)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "\"{self}\"")
            }
        }
    )*};
}

reason_error! {
    /// Invalid message layout, the byte stream can not be resynchronised.
    struct FramingError, "framing error";

    /// Malformed value for the declared oid and format.
    struct DecodeError, "decode error";

    /// Input value can not be expressed within postgres ranges.
    struct EncodeError, "encode error";

    /// Message received in a state that does not accept it.
    struct StateError, "protocol state error";

    /// Session configuration the engine can not operate under.
    struct ConfigError, "configuration error";
}
