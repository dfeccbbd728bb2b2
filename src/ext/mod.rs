use bytes::{Buf, BufMut, Bytes};

use crate::common::ByteStr;
use crate::error::FramingError;

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// Length is `usize` in rust, while sometime postgres want `u16`,
    /// this will panic when overflow instead of wrapping.
    fn to_u16(self) -> u16;
    /// Length is `usize` in rust, while message lengths are `i32`,
    /// this will panic when overflow instead of wrapping.
    fn to_i32(self) -> i32;
}

/// Nul string operation.
pub trait StrExt {
    /// String length plus nul (1).
    fn nul_string_len(&self) -> i32;
}

/// Nul string operation in [`BufMut`].
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

/// Nul string operation in [`Bytes`].
pub trait BytesExt: Sized {
    /// Read a nul terminated byte string.
    fn try_get_nul_bytes(&mut self) -> Result<Self, FramingError>;

    /// Read a nul terminated utf8 string.
    ///
    /// Using [`ByteStr`] avoid allocating [`Vec`] as it required for [`String::from_utf8`].
    fn try_get_nul_bytestr(&mut self) -> Result<ByteStr, FramingError>;
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl UsizeExt for usize {
    fn to_u16(self) -> u16 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_i32(self) -> i32 {
        self.try_into().expect("message size too large for protocol")
    }
}

impl StrExt for str {
    fn nul_string_len(&self) -> i32 {
        self.len().to_i32() + 1/* nul */
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

impl BytesExt for Bytes {
    fn try_get_nul_bytes(&mut self) -> Result<Self, FramingError> {
        let end = self
            .iter()
            .position(|e| matches!(e, b'\0'))
            .ok_or_else(|| FramingError::new("string is not nul terminated"))?;
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        Ok(me)
    }

    fn try_get_nul_bytestr(&mut self) -> Result<ByteStr, FramingError> {
        ByteStr::from_utf8(self.try_get_nul_bytes()?)
            .map_err(|_| FramingError::new("string is not valid utf8"))
    }
}

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b.is_ascii_whitespace() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}
