//! Big-endian read/write primitives for TLS wire structures.
//!
//! Reading goes through [`Reader`], a cursor that checks every access
//! against the remaining input before slicing. An overrun is reported as the
//! malformed-input error of the structure being decoded, so a truncated or
//! hostile ClientHello can never trip a slice panic.

use bytes::{BufMut, Bytes};

use crate::error::Error;

/// Which structure a [`Reader`] is decoding.
///
/// Decides the error an overrun turns into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Malformed {
    /// Handshake body of a ClientHello
    ClientHello,
    /// Flat extension block
    Extensions,
    /// Body of a key_share extension
    KeyShare,
}

impl From<Malformed> for Error {
    fn from(kind: Malformed) -> Self {
        match kind {
            Malformed::ClientHello => Error::MalformedClientHello,
            Malformed::Extensions => Error::MalformedExtensions,
            Malformed::KeyShare => Error::MalformedKeyShare,
        }
    }
}

/// Bounds-checked cursor over a shared byte buffer.
///
/// Slices handed out are zero-copy views into the same [`Bytes`].
#[derive(Debug, Clone)]
pub struct Reader {
    buf: Bytes,
    pos: usize,
    kind: Malformed,
}

impl Reader {
    /// Create a reader positioned at the start of `buf`.
    pub fn new(buf: Bytes, kind: Malformed) -> Self {
        Self { buf, pos: 0, kind }
    }

    /// Current cursor offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the cursor reached the end of input.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<Bytes, Malformed> {
        let end = self.pos.checked_add(len).ok_or(self.kind)?;
        if end > self.buf.len() {
            return Err(self.kind);
        }
        let out = self.buf.slice(self.pos..end);
        self.pos = end;
        Ok(out)
    }

    /// Take exactly `N` bytes into an array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], Malformed> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), Malformed> {
        self.take(len).map(|_| ())
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8, Malformed> {
        Ok(self.array::<1>()?[0])
    }

    /// Read a big-endian u16.
    pub fn u16(&mut self) -> Result<u16, Malformed> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    /// Read a big-endian 24-bit length.
    pub fn u24(&mut self) -> Result<u32, Malformed> {
        let [a, b, c] = self.array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    /// Read a vector prefixed by a one-byte length.
    pub fn vec_u8(&mut self) -> Result<Bytes, Malformed> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    /// Read a vector prefixed by a two-byte length.
    pub fn vec_u16(&mut self) -> Result<Bytes, Malformed> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    /// Everything from the cursor to the end of input.
    pub fn rest(&mut self) -> Bytes {
        let out = self.buf.slice(self.pos..);
        self.pos = self.buf.len();
        out
    }
}

/// Write a 24-bit big-endian length.
///
/// Only the low three bytes of `value` are written.
pub fn put_u24(buf: &mut impl BufMut, value: u32) {
    let [_, a, b, c] = value.to_be_bytes();
    buf.put_slice(&[a, b, c]);
}

/// Read a big-endian u32 from the start of `input`, if present.
pub fn be_u32(input: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(input.get(..4)?.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_sequential_reads() {
        let data = Bytes::from_static(&[0x01, 0x02, 0x03, 0x00, 0x00, 0x05, 0xaa, 0xbb, 0xcc]);
        let mut r = Reader::new(data, Malformed::ClientHello);

        assert_eq!(r.u8().unwrap(), 0x01);
        assert_eq!(r.u16().unwrap(), 0x0203);
        assert_eq!(r.u24().unwrap(), 5);
        assert_eq!(r.position(), 6);
        assert_eq!(r.remaining(), 3);
        assert_eq!(&r.rest()[..], &[0xaa, 0xbb, 0xcc]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_reader_overrun_reports_kind() {
        let mut r = Reader::new(Bytes::from_static(&[0x00, 0x05, 0x01]), Malformed::Extensions);
        assert_eq!(r.vec_u16(), Err(Malformed::Extensions));

        let mut r = Reader::new(Bytes::from_static(&[0x01]), Malformed::KeyShare);
        assert_eq!(r.u16(), Err(Malformed::KeyShare));
    }

    #[test]
    fn test_failed_take_does_not_advance() {
        let mut r = Reader::new(Bytes::from_static(&[0x01, 0x02]), Malformed::ClientHello);
        assert!(r.take(3).is_err());
        assert_eq!(r.position(), 0);
        assert_eq!(r.u16().unwrap(), 0x0102);
    }

    #[test]
    fn test_put_u24() {
        let mut buf = Vec::new();
        put_u24(&mut buf, 0x76);
        put_u24(&mut buf, 0x01_02_03);
        assert_eq!(buf, vec![0x00, 0x00, 0x76, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_be_u32() {
        assert_eq!(be_u32(&[0xde, 0xad, 0xbe, 0xef]), Some(0xdeadbeef));
        assert_eq!(be_u32(&[0xde, 0xad]), None);
    }
}
