//! x25519 public value extraction from a key_share extension.

use bytes::Bytes;

use crate::crypto::PUBLIC_KEY_SIZE;
use crate::error::{Error, Result};
use crate::tls::codec::{Malformed, Reader};
use crate::tls::NamedGroup;

/// Find the x25519 entry of a client key_share body and return its key.
///
/// Body layout: `total(2) | [group(2) | len(2) | key(len)]*`.
///
/// The scan runs while the cursor offset, which starts past the 2-byte
/// total, is below `total`. That stops one header early compared with a
/// strict `2 + total` bound; well-formed shares never notice because every
/// entry is at least 4 bytes long.
pub fn parse_key_share(body: &[u8]) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    let mut reader = Reader::new(Bytes::copy_from_slice(body), Malformed::KeyShare);
    let total_len = reader.u16()? as usize;

    while reader.position() < total_len {
        let group = reader.u16()?;
        let len = reader.u16()? as usize;
        if group == NamedGroup::X25519 as u16 {
            if len != PUBLIC_KEY_SIZE {
                return Err(Error::KeyShareLength(len));
            }
            return Ok(reader.array()?);
        }
        reader.skip(len)?;
    }

    Err(Error::X25519Missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(group: u16, key: &[u8]) -> Vec<u8> {
        let mut out = group.to_be_bytes().to_vec();
        out.extend_from_slice(&(key.len() as u16).to_be_bytes());
        out.extend_from_slice(key);
        out
    }

    fn share(entries: &[Vec<u8>]) -> Vec<u8> {
        let list: Vec<u8> = entries.concat();
        let mut out = (list.len() as u16).to_be_bytes().to_vec();
        out.extend(list);
        out
    }

    #[test]
    fn test_x25519_only() {
        let key = [0x5au8; 32];
        let body = share(&[entry(0x001d, &key)]);
        assert_eq!(parse_key_share(&body).unwrap(), key);
    }

    #[test]
    fn test_x25519_after_other_groups() {
        let key: [u8; 32] = core::array::from_fn(|i| i as u8);
        let body = share(&[
            entry(0x0a0a, &[0x00]), // GREASE
            entry(0x0017, &[0x04; 65]),
            entry(0x001d, &key),
        ]);
        assert_eq!(parse_key_share(&body).unwrap(), key);
    }

    #[test]
    fn test_wrong_key_length() {
        let body = share(&[entry(0x001d, &[0x01; 31])]);
        let err = parse_key_share(&body).unwrap_err();
        assert!(matches!(err, Error::KeyShareLength(31)));
        assert_eq!(err.to_string(), "key share length should be 32, instead of 31");
    }

    #[test]
    fn test_missing_x25519() {
        let body = share(&[entry(0x0017, &[0x04; 65]), entry(0x0018, &[0x04; 97])]);
        let err = parse_key_share(&body).unwrap_err();
        assert!(matches!(err, Error::X25519Missing));
        assert_eq!(err.to_string(), "x25519 does not exist");
    }

    #[test]
    fn test_scan_bound_is_declared_total() {
        // Declared total of 2 ends the scan before the first entry header.
        let mut body = vec![0x00, 0x02];
        body.extend(entry(0x001d, &[0x11; 32]));
        assert!(matches!(parse_key_share(&body), Err(Error::X25519Missing)));
    }

    #[test]
    fn test_truncated_share() {
        let mut body = share(&[entry(0x001d, &[0x22; 32])]);
        body.truncate(20);
        assert!(matches!(parse_key_share(&body), Err(Error::MalformedKeyShare)));

        assert!(matches!(parse_key_share(&[0x00]), Err(Error::MalformedKeyShare)));
    }

    #[test]
    fn test_truncated_skipped_entry() {
        let mut body = share(&[entry(0x0017, &[0x04; 65])]);
        body.truncate(30);
        assert!(matches!(parse_key_share(&body), Err(Error::MalformedKeyShare)));
    }
}
