//! Postgres wire protocol engine for a single connection.
//!
//! The engine is sans-io: a facade owns the socket (and TLS), feeds
//! received bytes in, and writes out whatever the engine hands back. The
//! engine covers the protocol state machine for the simple and extended
//! query flows, startup and authentication, a transparent prepared
//! statement cache with LRU eviction and deferred server side close, the
//! per-type value codecs, and the parameter encoder.
//!
//! # Examples
//!
//! ```no_run
//! use pagio::{Encode, Engine, Outcome, ResultFormat, StartupConfig};
//!
//! # fn transport_write(_: &[u8]) {}
//! # fn transport_read(_: &mut [u8]) -> usize { 0 }
//! # fn run() -> pagio::Result<()> {
//! let mut engine = Engine::new();
//!
//! let startup = engine.startup_message(
//!     &StartupConfig::new("fred").password(b"secret").database("app"),
//! )?;
//! transport_write(&startup);
//!
//! loop {
//!     let region = engine.write_region(1024);
//!     let n = transport_read(region);
//!     engine.advance(n);
//!     let mut done = false;
//!     for outcome in engine.drain()? {
//!         match outcome {
//!             Outcome::Send(bytes) => transport_write(&bytes),
//!             Outcome::Ready => done = true,
//!             _ => unreachable!("startup yields send and ready only"),
//!         }
//!     }
//!     if done {
//!         break;
//!     }
//! }
//!
//! let chunks = engine.execute_message(
//!     "SELECT $1::int4 + 1",
//!     vec![41.encode()],
//!     ResultFormat::Default,
//!     false,
//! )?;
//! for chunk in &chunks {
//!     transport_write(chunk);
//! }
//! # Ok(())
//! # }
//! ```
pub mod common;
mod ext;

// Protocol
pub mod postgres;
mod framer;

// Encoding
pub mod encode;
pub mod types;
pub mod value;

// Component
mod auth;
mod cache;
mod scram;
mod statement;
pub mod result;
pub mod session;

// Operation
mod engine;

mod error;

#[doc(inline)]
pub use encode::{Encode, Encoded};
#[doc(inline)]
pub use engine::{Engine, Notification, Outcome, ProtocolStatus, StartupConfig};
#[doc(inline)]
pub use error::{
    ConfigError, DecodeError, EncodeError, Error, ErrorKind, FramingError, Result, StateError,
};
#[doc(inline)]
pub use postgres::{Oid, PgFormat, ResultFormat, TransactionStatus};
#[doc(inline)]
pub use result::{FieldDescription, QueryResult, ResultSet};
#[doc(inline)]
pub use session::Session;
#[doc(inline)]
pub use statement::StatementName;
#[doc(inline)]
pub use types::PgNumeric;
#[doc(inline)]
pub use value::{PgInterval, PgRange, PgValue};

pub use postgres::backend::{ServerError, Severity};
pub use scram::ScramSha256;
