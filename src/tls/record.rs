//! TLS record layer framing.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::tls::ContentType;

/// Size of the record header: type(1) + legacy version(2) + length(2)
pub const RECORD_HEADER_LEN: usize = 5;

/// Prepend a record header to `payload`.
///
/// The payload must fit in a 16-bit length; records we build are far below
/// that.
pub fn wrap_record(payload: &[u8], content_type: ContentType, legacy_version: [u8; 2]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(RECORD_HEADER_LEN + payload.len());
    buf.put_u8(content_type as u8);
    buf.put_slice(&legacy_version);
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Strip the record header and return the payload behind it.
///
/// The header is a fixed skip. Its length field is not checked here; the
/// ClientHello parser validates the handshake body length instead.
pub fn peel_record(data: &[u8]) -> Result<&[u8]> {
    data.get(RECORD_HEADER_LEN..)
        .ok_or(Error::MalformedClientHello)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::TLS12;

    #[test]
    fn test_wrap_record_header() {
        let record = wrap_record(&[0x01], ContentType::ChangeCipherSpec, TLS12);
        assert_eq!(record, vec![0x14, 0x03, 0x03, 0x00, 0x01, 0x01]);
    }

    #[test]
    fn test_record_round_trip() {
        let payloads: [&[u8]; 3] = [&[], &[0xde, 0xad, 0xbe, 0xef], &[0x42; 300]];
        for payload in payloads {
            let record = wrap_record(payload, ContentType::Handshake, [0x03, 0x01]);
            assert_eq!(record.len(), RECORD_HEADER_LEN + payload.len());
            assert_eq!(&record[1..3], &[0x03, 0x01]);
            assert_eq!(
                u16::from_be_bytes([record[3], record[4]]) as usize,
                payload.len()
            );
            assert_eq!(peel_record(&record).unwrap(), payload);
        }
    }

    #[test]
    fn test_peel_short_input() {
        assert!(peel_record(&[0x16, 0x03, 0x03]).is_err());
        assert_eq!(peel_record(&[0x16, 0x03, 0x03, 0x00, 0x00]).unwrap(), &[] as &[u8]);
    }
}
