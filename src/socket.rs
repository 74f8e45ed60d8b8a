//! Per-request session: builds and writes the request packet stream, then
//! reads and demultiplexes the response stream into a [`Response`].
//!
//! A session drives exactly one in-flight request over one connection:
//! INIT -> (connect) -> IDLE -> (send) -> BUSY -> (complete) -> IDLE with a
//! cached response, or a terminal error.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::connection::{Connection, FcgiStream};
use crate::error::{FcgiError, Result};
use crate::protocol::{
    decode_header, encode_packet, Packet, PacketType, ProtocolStatus, Role,
    BEGIN_REQUEST_FLAGS, HEADER_LEN, MAX_CONTENT_LEN,
};
use crate::registry::SocketId;
use crate::request::Request;
use crate::response::Response;

/// Session lifecycle state. INIT and IDLE are both "available"; BUSY means
/// a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Init,
    Idle,
    Busy,
}

impl SocketStatus {
    pub fn is_available(self) -> bool {
        matches!(self, Self::Init | Self::Idle)
    }
}

/// One request session bound to a unique request id.
#[derive(Debug)]
pub struct Socket {
    id: SocketId,
    connection: Connection,
    stream: Option<FcgiStream>,
    status: SocketStatus,
    started_at: Option<Instant>,
    connect_duration: Duration,
    write_duration: Duration,
    response: Option<Response>,
}

impl Socket {
    pub(crate) fn new(id: SocketId, connection: Connection) -> Self {
        Self {
            id,
            connection,
            stream: None,
            status: SocketStatus::Init,
            started_at: None,
            connect_duration: Duration::ZERO,
            write_duration: Duration::ZERO,
            response: None,
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn status(&self) -> SocketStatus {
        self.status
    }

    pub fn is_busy(&self) -> bool {
        self.status == SocketStatus::Busy
    }

    /// Serialize `request` and write it to the responder, entering BUSY.
    ///
    /// Fails with a connection error if the session is already driving a
    /// request. Connecting is idempotent: an open stream is reused.
    pub async fn send_request(&mut self, request: &Request) -> Result<()> {
        if !self.status.is_available() {
            return Err(FcgiError::Connection(
                "trying to use a socket that is not idle".into(),
            ));
        }
        self.response = None;

        let connect_start = Instant::now();
        self.connect().await?;
        self.connect_duration = connect_start.elapsed();

        let packets = self.build_request_packets(request)?;
        debug!(
            id = self.id.value(),
            bytes = packets.len(),
            script = request.script_path(),
            "sending fastcgi request"
        );

        let write_start = Instant::now();
        self.write(&packets).await?;
        self.write_duration = write_start.elapsed();

        self.status = SocketStatus::Busy;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.stream = Some(self.connection.connect().await?);
            self.status = SocketStatus::Idle;
        }
        Ok(())
    }

    /// Full request byte stream: BEGIN_REQUEST, PARAMS (chunked, then empty
    /// terminator), STDIN (chunked, then empty terminator).
    fn build_request_packets(&self, request: &Request) -> Result<BytesMut> {
        let request_id = self.id.value();
        let mut packets = BytesMut::new();

        let mut begin = BytesMut::with_capacity(8);
        begin.put_u16(Role::Responder as u16);
        begin.put_u8(BEGIN_REQUEST_FLAGS);
        begin.put_bytes(0, 5);
        packets.extend_from_slice(&encode_packet(
            PacketType::BeginRequest,
            &begin,
            request_id,
        )?);

        let params = crate::protocol::encode_pairs(request.params());
        for chunk in params.chunks(MAX_CONTENT_LEN) {
            packets.extend_from_slice(&encode_packet(PacketType::Params, chunk, request_id)?);
        }
        packets.extend_from_slice(&encode_packet(PacketType::Params, &[], request_id)?);

        if let Some(content) = request.content() {
            for chunk in content.body().chunks(MAX_CONTENT_LEN) {
                packets.extend_from_slice(&encode_packet(PacketType::Stdin, chunk, request_id)?);
            }
        }
        packets.extend_from_slice(&encode_packet(PacketType::Stdin, &[], request_id)?);

        Ok(packets)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let write_timeout = self.connection.read_write_timeout();
        let stream = self.stream.as_mut().ok_or_else(|| {
            FcgiError::Write("failed to write request to socket [broken pipe]".into())
        })?;

        let io = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        match timeout(write_timeout, io).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FcgiError::Write(format!(
                "failed to write request to socket [broken pipe]: {e}"
            ))),
            Err(_) => Err(FcgiError::Timeout("write timed out".into())),
        }
    }

    /// Read the response stream until END_REQUEST and parse it.
    ///
    /// Idempotent: returns the cached response once computed. The read
    /// timeout is the explicit override, or the connection's read/write
    /// timeout.
    pub async fn fetch_response(&mut self, timeout_ms: Option<u64>) -> Result<Response> {
        if let Some(response) = &self.response {
            return Ok(response.clone());
        }

        let read_timeout = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.connection.read_write_timeout());
        let request_id = self.id.value();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FcgiError::Read("socket is not connected".into()))?;

        let mut output = BytesMut::new();
        let mut stderr = BytesMut::new();
        let mut end_packet = None;

        while let Some(packet) = read_packet(stream, read_timeout).await? {
            if packet.header.request_id != request_id {
                // Single connection per session; anything else is a stray.
                continue;
            }
            match packet.packet_type() {
                Some(PacketType::Stdout) => output.extend_from_slice(&packet.content),
                Some(PacketType::Stderr) => stderr.extend_from_slice(&packet.content),
                Some(PacketType::EndRequest) => {
                    end_packet = Some(packet);
                    break;
                }
                _ => {}
            }
        }

        let Some(end_packet) = end_packet else {
            return Err(FcgiError::Read("stream got blocked or terminated".into()));
        };
        check_protocol_status(&end_packet)?;

        if !stderr.is_empty() {
            warn!(
                id = request_id,
                stderr = %String::from_utf8_lossy(&stderr),
                "fastcgi responder wrote stderr"
            );
        }

        let duration = self
            .started_at
            .map(|start| start.elapsed())
            .unwrap_or_default();
        let response = Response::new(
            output.freeze(),
            stderr.freeze(),
            duration,
            self.connect_duration,
            self.write_duration,
        );
        self.status = SocketStatus::Idle;
        self.response = Some(response.clone());
        Ok(response)
    }

    /// Close the underlying stream. Idempotent.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.disconnect().await;
        }
    }
}

/// Read one packet: exactly 8 header bytes, `content_length` content bytes,
/// then discard `padding_length` bytes.
///
/// Returns `Ok(None)` on a clean end of stream at a packet boundary. A
/// timeout on any read surfaces as `FcgiError::Timeout`, never as end of
/// stream.
pub(crate) async fn read_packet<R>(stream: &mut R, read_timeout: Duration) -> Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0usize;
    while filled < HEADER_LEN {
        let n = timeout(read_timeout, stream.read(&mut header[filled..]))
            .await
            .map_err(|_| FcgiError::Timeout("read timed out".into()))?
            .map_err(|e| FcgiError::Read(format!("read failed: {e}")))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FcgiError::Read("read failed: truncated packet header".into()));
        }
        filled += n;
    }

    let header = decode_header(&header)?;
    let total = header.content_length as usize + header.padding_length as usize;
    let mut body = vec![0u8; total];
    if total > 0 {
        timeout(read_timeout, stream.read_exact(&mut body))
            .await
            .map_err(|_| FcgiError::Timeout("read timed out".into()))?
            .map_err(|e| FcgiError::Read(format!("read failed: {e}")))?;
    }
    body.truncate(header.content_length as usize);

    Ok(Some(Packet {
        header,
        content: body.into(),
    }))
}

/// Inspect the protocol-status byte of an END_REQUEST payload.
fn check_protocol_status(packet: &Packet) -> Result<()> {
    if packet.content.len() < 5 {
        return Ok(());
    }
    let raw = packet.content[4];
    match ProtocolStatus::from_u8(raw) {
        Some(ProtocolStatus::RequestComplete) => Ok(()),
        Some(ProtocolStatus::CantMpxConn) => Err(FcgiError::Write(
            "this app can't multiplex [CANT_MPX_CONN]".into(),
        )),
        Some(ProtocolStatus::Overloaded) => Err(FcgiError::Write(
            "new request rejected; too busy [OVERLOADED]".into(),
        )),
        Some(ProtocolStatus::UnknownRole) => Err(FcgiError::Write(
            "role value not known [UNKNOWN_ROLE]".into(),
        )),
        None => Err(FcgiError::Read(format!("unknown protocol status: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn packet(packet_type: PacketType, request_id: u16, content: &[u8]) -> Packet {
        Packet {
            header: crate::protocol::PacketHeader {
                version: 1,
                packet_type: packet_type as u8,
                request_id,
                content_length: content.len() as u16,
                padding_length: 0,
                reserved: 0,
            },
            content: Bytes::copy_from_slice(content),
        }
    }

    #[tokio::test]
    async fn read_packet_honors_padding() {
        let (mut client, mut server) = tokio::io::duplex(256);
        tokio::spawn(async move {
            // STDOUT packet with 4 content bytes and 4 padding bytes.
            let frame = [
                1u8,
                PacketType::Stdout as u8,
                0,
                1,
                0,
                4,
                4,
                0,
                b'b',
                b'o',
                b'd',
                b'y',
                0,
                0,
                0,
                0,
            ];
            let _ = server.write_all(&frame).await;
        });

        let got = read_packet(&mut client, Duration::from_secs(1))
            .await
            .expect("read")
            .expect("packet");
        assert_eq!(got.header.request_id, 1);
        assert_eq!(got.content.as_ref(), b"body");

        // The padding was consumed; the stream then reports clean EOF.
        let next = read_packet(&mut client, Duration::from_secs(1))
            .await
            .expect("read");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn read_packet_times_out_instead_of_reporting_eof() {
        let (mut client, _server) = tokio::io::duplex(64);
        let err = read_packet(&mut client, Duration::from_millis(50))
            .await
            .expect_err("must time out");
        assert!(err.is_timeout(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn read_packet_rejects_truncated_header() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let _ = server.write_all(&[1u8, 6, 0]).await;
            // Dropping the server closes the stream mid-header.
        });
        let err = read_packet(&mut client, Duration::from_secs(1))
            .await
            .expect_err("must fail");
        assert!(matches!(err, FcgiError::Read(_)), "unexpected error: {err}");
    }

    #[test]
    fn protocol_status_mapping() {
        let ok = packet(PacketType::EndRequest, 1, &[0, 0, 0, 0, 0]);
        assert!(check_protocol_status(&ok).is_ok());

        let overloaded = packet(PacketType::EndRequest, 1, &[0, 0, 0, 0, 2]);
        let err = check_protocol_status(&overloaded).expect_err("must fail");
        assert!(matches!(err, FcgiError::Write(_)));
        assert!(err.to_string().contains("OVERLOADED"));

        let cant_mpx = packet(PacketType::EndRequest, 1, &[0, 0, 0, 0, 1]);
        assert!(check_protocol_status(&cant_mpx)
            .expect_err("must fail")
            .to_string()
            .contains("CANT_MPX_CONN"));

        let unknown_role = packet(PacketType::EndRequest, 1, &[0, 0, 0, 0, 3]);
        assert!(check_protocol_status(&unknown_role)
            .expect_err("must fail")
            .to_string()
            .contains("UNKNOWN_ROLE"));

        let unknown = packet(PacketType::EndRequest, 1, &[0, 0, 0, 0, 9]);
        let err = check_protocol_status(&unknown).expect_err("must fail");
        assert!(matches!(err, FcgiError::Read(_)));

        // Short payloads carry no protocol status to check.
        let short = packet(PacketType::EndRequest, 1, &[0, 0]);
        assert!(check_protocol_status(&short).is_ok());
    }

    #[test]
    fn status_availability() {
        assert!(SocketStatus::Init.is_available());
        assert!(SocketStatus::Idle.is_available());
        assert!(!SocketStatus::Busy.is_available());
    }
}
