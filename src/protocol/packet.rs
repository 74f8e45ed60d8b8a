//! Fixed-header packet codec.
//!
//! Every FastCGI packet starts with an 8-byte header followed by
//! `content_length` payload bytes and `padding_length` bytes of padding.
//! This client emits packets without padding; the read side still honors
//! padding from the peer.

use bytes::{BufMut, Bytes, BytesMut};

use super::{PacketType, MAX_CONTENT_LEN, VERSION};
use crate::error::{FcgiError, Result};

/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 8;

/// Decoded packet header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u8,
    pub packet_type: u8,
    pub request_id: u16,
    pub content_length: u16,
    pub padding_length: u8,
    pub reserved: u8,
}

/// A fully read packet: header plus content (padding already discarded).
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub content: Bytes,
}

impl Packet {
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u8(self.header.packet_type)
    }
}

/// Encode one packet: header and content, no padding.
///
/// Content larger than 65535 bytes cannot fit a single packet; callers
/// chunk larger payloads into multiple packets of the same type.
pub fn encode_packet(
    packet_type: PacketType,
    content: &[u8],
    request_id: u16,
) -> Result<BytesMut> {
    if content.len() > MAX_CONTENT_LEN {
        return Err(FcgiError::InvalidArgument(format!(
            "packet content too large: {} bytes",
            content.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(HEADER_LEN + content.len());
    buf.put_u8(VERSION);
    buf.put_u8(packet_type as u8);
    buf.put_u16(request_id);
    buf.put_u16(content.len() as u16);
    buf.put_u8(0); // padding length
    buf.put_u8(0); // reserved
    buf.extend_from_slice(content);
    Ok(buf)
}

/// Decode an 8-byte packet header.
pub fn decode_header(data: &[u8]) -> Result<PacketHeader> {
    if data.len() != HEADER_LEN {
        return Err(FcgiError::InvalidArgument(format!(
            "packet header must be exactly {} bytes, got {}",
            HEADER_LEN,
            data.len()
        )));
    }
    Ok(PacketHeader {
        version: data[0],
        packet_type: data[1],
        request_id: u16::from_be_bytes([data[2], data[3]]),
        content_length: u16::from_be_bytes([data[4], data[5]]),
        padding_length: data[6],
        reserved: data[7],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let buf = encode_packet(PacketType::Stdout, b"data", 0x0102).expect("encode");
        let header = decode_header(&buf[..HEADER_LEN]).expect("decode");
        assert_eq!(header.version, VERSION);
        assert_eq!(header.packet_type, PacketType::Stdout as u8);
        assert_eq!(header.request_id, 0x0102);
        assert_eq!(header.content_length, 4);
        assert_eq!(header.padding_length, 0);
        assert_eq!(header.reserved, 0);
        assert_eq!(&buf[HEADER_LEN..], b"data");
    }

    #[test]
    fn roundtrip_boundary_ids_and_lengths() {
        for request_id in [0u16, 1, 0x00ff, 0xff00, u16::MAX] {
            let content = vec![0xaau8; MAX_CONTENT_LEN];
            let buf = encode_packet(PacketType::Stdin, &content, request_id).expect("encode");
            let header = decode_header(&buf[..HEADER_LEN]).expect("decode");
            assert_eq!(header.request_id, request_id);
            assert_eq!(header.content_length as usize, MAX_CONTENT_LEN);
        }
    }

    #[test]
    fn oversized_content_is_rejected() {
        let content = vec![0u8; MAX_CONTENT_LEN + 1];
        let err = encode_packet(PacketType::Stdin, &content, 1).expect_err("must fail");
        assert!(matches!(err, FcgiError::InvalidArgument(_)));
    }

    #[test]
    fn short_and_long_headers_are_rejected() {
        for len in [0usize, 7, 9] {
            let data = vec![0u8; len];
            let err = decode_header(&data).expect_err("must fail");
            assert!(matches!(err, FcgiError::InvalidArgument(_)), "len {len}");
        }
    }
}
