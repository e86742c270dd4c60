//! ClientHello extension block decoding.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::Result;
use crate::tls::codec::{Malformed, Reader};

/// Extension bodies keyed by their 2-byte type tag.
///
/// Order on the wire is not kept. A tag that repeats keeps its last body.
pub type Extensions = HashMap<u16, Bytes>;

/// Decode a flat `type(2) | length(2) | body` sequence.
///
/// Runs until the end of `input`, which the caller slices to start right
/// after the extensions length field. Trailing bytes past the declared
/// extensions length are decoded as extensions too. Any overrun fails the
/// whole block; no partial map is returned.
pub fn parse_extensions(input: Bytes) -> Result<Extensions> {
    let mut reader = Reader::new(input, Malformed::Extensions);
    let mut extensions = HashMap::new();

    while !reader.is_empty() {
        let typ = reader.u16()?;
        let body = reader.vec_u16()?;
        extensions.insert(typ, body);
    }

    Ok(extensions)
}
