//! Name-value pair codec used inside PARAMS packets.
//!
//! Each field length is one byte when below 128, otherwise four big-endian
//! bytes with the top bit of the first byte set.

use bytes::{BufMut, BytesMut};

use crate::error::{FcgiError, Result};

fn put_len(buf: &mut BytesMut, len: usize) {
    if len < 128 {
        buf.put_u8(len as u8);
    } else {
        buf.put_u32((len as u32) | 0x8000_0000);
    }
}

/// Encode one pair: both length prefixes, then name bytes, then value bytes.
pub fn encode_pair(buf: &mut BytesMut, name: &[u8], value: &[u8]) {
    put_len(buf, name.len());
    put_len(buf, value.len());
    buf.extend_from_slice(name);
    buf.extend_from_slice(value);
}

/// Encode a sequence of pairs; wire order follows iteration order.
pub fn encode_pairs<'a, I>(pairs: I) -> BytesMut
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut buf = BytesMut::new();
    for (name, value) in pairs {
        encode_pair(&mut buf, name.as_bytes(), value.as_bytes());
    }
    buf
}

fn read_len(data: &[u8], pos: &mut usize) -> Result<usize> {
    let first = *data
        .get(*pos)
        .ok_or_else(|| truncated("length prefix", *pos))?;
    if first < 128 {
        *pos += 1;
        return Ok(first as usize);
    }
    let end = *pos + 4;
    if end > data.len() {
        return Err(truncated("long length prefix", *pos));
    }
    let len = u32::from_be_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]])
        & 0x7fff_ffff;
    *pos = end;
    Ok(len as usize)
}

fn truncated(what: &str, pos: usize) -> FcgiError {
    FcgiError::InvalidArgument(format!(
        "name-value pair data truncated at byte {pos} ({what})"
    ))
}

/// Decode a buffer of concatenated pairs, preserving wire order.
///
/// Fails on any truncation instead of reading past the buffer.
pub fn decode_pairs(data: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut pairs = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let name_len = read_len(data, &mut pos)?;
        let value_len = read_len(data, &mut pos)?;
        let end = pos
            .checked_add(name_len)
            .and_then(|p| p.checked_add(value_len))
            .ok_or_else(|| truncated("field lengths", pos))?;
        if end > data.len() {
            return Err(truncated("field bytes", pos));
        }
        let name = data[pos..pos + name_len].to_vec();
        let value = data[pos + name_len..end].to_vec();
        pairs.push((name, value));
        pos = end;
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(pairs: &[(&str, &str)]) {
        let encoded = encode_pairs(pairs.iter().copied());
        let decoded = decode_pairs(&encoded).expect("decode");
        assert_eq!(decoded.len(), pairs.len());
        for ((name, value), (exp_name, exp_value)) in decoded.iter().zip(pairs) {
            assert_eq!(name, exp_name.as_bytes());
            assert_eq!(value, exp_value.as_bytes());
        }
    }

    #[test]
    fn short_pairs_roundtrip() {
        roundtrip(&[
            ("REQUEST_METHOD", "GET"),
            ("SCRIPT_FILENAME", "/var/www/index.php"),
            ("QUERY_STRING", ""),
        ]);
    }

    #[test]
    fn long_fields_use_four_byte_lengths() {
        let long_name = "X".repeat(128);
        let long_value = "y".repeat(70_000);
        let mut buf = BytesMut::new();
        encode_pair(&mut buf, long_name.as_bytes(), long_value.as_bytes());

        // Both prefixes must be the 4-byte form with the marker bit set.
        assert_eq!(buf[0] & 0x80, 0x80);
        assert_eq!(buf[4] & 0x80, 0x80);
        roundtrip(&[(long_name.as_str(), long_value.as_str())]);
    }

    #[test]
    fn boundary_length_127_stays_single_byte() {
        let name = "n".repeat(127);
        let mut buf = BytesMut::new();
        encode_pair(&mut buf, name.as_bytes(), b"v");
        assert_eq!(buf[0], 127);
        roundtrip(&[(name.as_str(), "v")]);
    }

    #[test]
    fn wire_order_is_preserved() {
        let encoded = encode_pairs([("b", "2"), ("a", "1"), ("c", "3")]);
        let decoded = decode_pairs(&encoded).expect("decode");
        let names: Vec<&[u8]> = decoded.iter().map(|(n, _)| n.as_slice()).collect();
        assert_eq!(names, vec![b"b" as &[u8], b"a", b"c"]);
    }

    #[test]
    fn truncated_buffers_fail_without_panicking() {
        let encoded = encode_pairs([("REQUEST_METHOD", "POST")]);
        for cut in 1..encoded.len() {
            let err = decode_pairs(&encoded[..cut]).expect_err("must fail");
            assert!(matches!(err, FcgiError::InvalidArgument(_)), "cut {cut}");
        }
    }

    #[test]
    fn truncated_long_length_prefix_fails() {
        // Marker bit set but only two of four length bytes present.
        let err = decode_pairs(&[0x80, 0x00]).expect_err("must fail");
        assert!(matches!(err, FcgiError::InvalidArgument(_)));
    }
}
