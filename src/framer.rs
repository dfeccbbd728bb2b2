//! Splits the received byte stream into postgres message frames.
use bytes::Bytes;

use crate::error::FramingError;

/// Receive buffer size, matches the largest common backend message burst.
pub(crate) const STANDARD_BUF_SIZE: usize = 0x4000;

/// Message header size: 1 byte tag + 4 byte big endian length.
const HEADER_LEN: usize = 5;

/// Pseudo tag for the single byte answer to an SSL request. Not a real
/// message type, the server sends the bare byte without framing.
pub(crate) const SSL_REPLY_TAG: u8 = b' ';

/// Reassembles postgres message frames from arbitrarily chunked reads.
///
/// The transport asks for a writable region with [`write_region`][1],
/// reports progress with [`advance`][2], and the engine pulls complete
/// frames with [`next_frame`][3]. Bodies larger than the fixed buffer are
/// staged in a one-shot overflow allocation that lives for exactly one
/// message.
///
/// [1]: Framer::write_region
/// [2]: Framer::advance
/// [3]: Framer::next_frame
pub struct Framer {
    standard: Box<[u8]>,
    /// One-shot buffer for a single message body exceeding the standard
    /// buffer capacity.
    overflow: Option<Box<[u8]>>,
    /// End of received bytes in the active buffer.
    filled: usize,
    /// Start of unprocessed bytes in the active buffer.
    start: usize,
    /// Length of the part currently awaited: a header, or a message body.
    part_len: usize,
    /// Tag of the message whose body is awaited, `None` while reading a
    /// header.
    tag: Option<u8>,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            standard: vec![0u8; STANDARD_BUF_SIZE].into_boxed_slice(),
            overflow: None,
            filled: 0,
            start: 0,
            part_len: HEADER_LEN,
            tag: None,
        }
    }

    /// Returns a writable region for the transport to receive into.
    ///
    /// The region is never empty provided frames are drained between
    /// writes; `size_hint` is only an advisory minimum.
    pub fn write_region(&mut self, _size_hint: usize) -> &mut [u8] {
        let filled = self.filled;
        match &mut self.overflow {
            Some(xl) => &mut xl[filled..],
            None => &mut self.standard[filled..],
        }
    }

    /// Notify that `n` bytes were written into the last region.
    pub fn advance(&mut self, n: usize) {
        self.filled += n;
        let cap = self.active_len();
        assert!(self.filled <= cap, "advanced past the writable region");
    }

    /// Switch to expecting the single byte reply of an SSL request.
    ///
    /// The reply is surfaced as a pseudo frame with [`SSL_REPLY_TAG`].
    pub fn expect_ssl_reply(&mut self) {
        self.tag = Some(SSL_REPLY_TAG);
        self.part_len = 1;
    }

    /// Pull the next complete frame, if any.
    ///
    /// Returns the message tag and its body as a contiguous slice. Each
    /// frame is delivered exactly once; partial trailing bytes are moved to
    /// the buffer head before `None` is returned.
    pub fn next_frame(&mut self) -> Result<Option<(u8, Bytes)>, FramingError> {
        loop {
            if self.filled - self.start < self.part_len {
                self.compact();
                return Ok(None);
            }

            match self.tag {
                None => {
                    let buf = &self.standard[self.start..];
                    let tag = buf[0];
                    let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
                    if len < 4 {
                        return Err(FramingError::new(format!(
                            "message {:?} announces negative length {}",
                            tag as char,
                            len - 4,
                        )));
                    }

                    let body_len = (len - 4) as usize;
                    self.start += HEADER_LEN;
                    self.tag = Some(tag);
                    self.part_len = body_len;

                    if body_len > STANDARD_BUF_SIZE {
                        // The body will not fit, stage it in an overflow
                        // allocation and move the received prefix over.
                        let avail = self.filled - self.start;
                        let mut xl = vec![0u8; body_len].into_boxed_slice();
                        xl[..avail].copy_from_slice(&self.standard[self.start..self.filled]);
                        self.overflow = Some(xl);
                        self.start = 0;
                        self.filled = avail;
                    }
                }
                Some(tag) => {
                    let active: &[u8] = match &self.overflow {
                        Some(xl) => xl,
                        None => &self.standard,
                    };
                    let body =
                        Bytes::copy_from_slice(&active[self.start..self.start + self.part_len]);

                    self.start += self.part_len;
                    self.tag = None;
                    self.part_len = HEADER_LEN;

                    if self.overflow.take().is_some() {
                        // The overflow buffer is sized exactly for the one
                        // message, nothing can trail it.
                        self.start = 0;
                        self.filled = 0;
                    }

                    return Ok(Some((tag, body)));
                }
            }
        }
    }

    fn active_len(&self) -> usize {
        match &self.overflow {
            Some(xl) => xl.len(),
            None => self.standard.len(),
        }
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        let avail = self.filled - self.start;
        let buf: &mut [u8] = match &mut self.overflow {
            Some(xl) => xl,
            None => &mut self.standard,
        };
        buf.copy_within(self.start..self.start + avail, 0);
        self.start = 0;
        self.filled = avail;
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Framer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("filled", &self.filled)
            .field("start", &self.start)
            .field("part_len", &self.part_len)
            .field("tag", &self.tag)
            .field("overflow", &self.overflow.as_ref().map(|b| b.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn feed(framer: &mut Framer, mut bytes: &[u8]) -> Vec<(u8, Bytes)> {
        let mut frames = vec![];
        while !bytes.is_empty() {
            let region = framer.write_region(bytes.len());
            let n = region.len().min(bytes.len());
            region[..n].copy_from_slice(&bytes[..n]);
            framer.advance(n);
            bytes = &bytes[n..];
            while let Some(f) = framer.next_frame().unwrap() {
                frames.push(f);
            }
        }
        frames
    }

    #[test]
    fn reassembles_whole_frames() {
        let mut bytes = frame(b'1', b"");
        bytes.extend(frame(b'C', b"SELECT 1\0"));

        let mut framer = Framer::new();
        let frames = feed(&mut framer, &bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, b'1');
        assert_eq!(&frames[1].1[..], b"SELECT 1\0");
    }

    #[test]
    fn reassembles_byte_by_byte() {
        let bytes = frame(b'Z', b"I");
        let mut framer = Framer::new();
        let mut frames = vec![];
        for b in bytes {
            let region = framer.write_region(1);
            region[0] = b;
            framer.advance(1);
            while let Some(f) = framer.next_frame().unwrap() {
                frames.push(f);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, b'Z');
        assert_eq!(&frames[0].1[..], b"I");
    }

    #[test]
    fn split_across_buffer_boundary() {
        // Two frames whose boundary does not align with the buffer size.
        let mut bytes = frame(b'D', &vec![7u8; STANDARD_BUF_SIZE - 9]);
        bytes.extend(frame(b'C', b"SELECT 1\0"));

        let mut framer = Framer::new();
        let frames = feed(&mut framer, &bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].1.len(), STANDARD_BUF_SIZE - 9);
        assert_eq!(&frames[1].1[..], b"SELECT 1\0");
    }

    #[test]
    fn oversized_body_uses_overflow() {
        let big = vec![42u8; STANDARD_BUF_SIZE * 2 + 17];
        let mut bytes = frame(b'D', &big);
        bytes.extend(frame(b'Z', b"I"));

        let mut framer = Framer::new();
        let frames = feed(&mut framer, &bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].1[..], &big[..]);
        assert_eq!(frames[1].0, b'Z');
    }

    #[test]
    fn negative_length_is_a_framing_error() {
        let mut framer = Framer::new();
        let region = framer.write_region(5);
        region[..5].copy_from_slice(&[b'X', 0, 0, 0, 3]);
        framer.advance(5);
        assert!(framer.next_frame().is_err());
    }

    #[test]
    fn ssl_reply_pseudo_frame() {
        let mut framer = Framer::new();
        framer.expect_ssl_reply();
        framer.write_region(1)[0] = b'S';
        framer.advance(1);
        let (tag, body) = framer.next_frame().unwrap().unwrap();
        assert_eq!(tag, SSL_REPLY_TAG);
        assert_eq!(&body[..], b"S");
    }
}
