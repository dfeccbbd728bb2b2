//! Supporting utility types.
mod bytestr;
pub use bytestr::ByteStr;
