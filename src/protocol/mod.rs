//! FastCGI 1.0 wire-level types shared by the codecs and the session
//! state machine.

mod nvpair;
mod packet;

pub use nvpair::{decode_pairs, encode_pair, encode_pairs};
pub use packet::{decode_header, encode_packet, Packet, PacketHeader, HEADER_LEN};

/// Protocol version byte carried by every packet.
pub const VERSION: u8 = 1;

/// Largest content payload a single packet may carry.
pub const MAX_CONTENT_LEN: usize = 65535;

/// BEGIN_REQUEST flags byte sent by this client.
pub const BEGIN_REQUEST_FLAGS: u8 = 1;

/// FastCGI packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    BeginRequest = 1,
    AbortRequest = 2,
    EndRequest = 3,
    Params = 4,
    Stdin = 5,
    Stdout = 6,
    Stderr = 7,
    Data = 8,
    GetValues = 9,
    GetValuesResult = 10,
    UnknownType = 11,
}

impl PacketType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => Self::BeginRequest,
            2 => Self::AbortRequest,
            3 => Self::EndRequest,
            4 => Self::Params,
            5 => Self::Stdin,
            6 => Self::Stdout,
            7 => Self::Stderr,
            8 => Self::Data,
            9 => Self::GetValues,
            10 => Self::GetValuesResult,
            11 => Self::UnknownType,
            _ => return None,
        })
    }
}

/// Request roles defined by the protocol. This client always sends
/// `Responder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Role {
    Responder = 1,
    Authorizer = 2,
    Filter = 3,
}

/// Protocol status byte of an END_REQUEST payload (fifth content byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolStatus {
    RequestComplete = 0,
    CantMpxConn = 1,
    Overloaded = 2,
    UnknownRole = 3,
}

impl ProtocolStatus {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::RequestComplete,
            1 => Self::CantMpxConn,
            2 => Self::Overloaded,
            3 => Self::UnknownRole,
            _ => return None,
        })
    }
}
