//! Packet driver.
//!
//! Reads OBEX packets from a connected stream, turns them into engine
//! events and writes the responses back:
//!
//! | Packet                              | Events raised                          |
//! |-------------------------------------|----------------------------------------|
//! | first packet of a request           | `RequestHint` (+ `RequestCheck` on PUT) |
//! | BODY / END-OF-BODY of a PUT         | `StreamAvailable` per chunk            |
//! | non-final packet                    | `Progress` after the CONTINUE reply    |
//! | final packet                        | `Request`                              |
//! | GET while a body is being sent      | `StreamEmpty`                          |
//! | ABORT                               | `Abort`                                |
//! | after the final response            | `RequestDone`                          |

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::codec::{ConnectParams, Header, Packet, OBEX_VERSION, PACKET_PREFIX_SIZE};
use crate::error::{ObexError, Result};
use crate::protocol::{
    BodyStream, Control, Event, ObexObject, Opcode, ResponseCode, Session,
};

/// Read one packet; `Ok(None)` when the peer closed between packets.
///
/// Packets shorter than their prefix or longer than `rx_mtu` are parse errors.
pub async fn read_packet<R>(reader: &mut R, rx_mtu: usize) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let code = match reader.read_u8().await {
        Ok(code) => code,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let len = usize::from(reader.read_u16().await?);

    if len < PACKET_PREFIX_SIZE || len > rx_mtu {
        return Err(ObexError::Parse(format!(
            "packet length {} outside {}..={}",
            len, PACKET_PREFIX_SIZE, rx_mtu
        )));
    }

    let mut frame = BytesMut::zeroed(len);
    frame[0] = code;
    frame[1..3].copy_from_slice(&(len as u16).to_be_bytes());
    reader.read_exact(&mut frame[PACKET_PREFIX_SIZE..]).await?;
    Ok(Some(frame.freeze()))
}

/// Write one packet and flush
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let wire = packet.encode()?;
    writer.write_all(&wire).await?;
    writer.flush().await?;
    Ok(())
}

/// Drive `session` over `stream` until the peer disconnects.
///
/// The session is torn down on every exit path.
pub async fn serve_connection<S>(stream: S, session: Session) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let rx_mtu = session.state().rx_mtu();
    let mut conn = Connection {
        stream,
        session,
        current: None,
        rx_mtu,
    };

    let result = conn.run().await;
    conn.session.teardown();
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

struct Connection<S> {
    stream: S,
    session: Session,
    current: Option<ObexObject>,
    rx_mtu: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn run(&mut self) -> Result<()> {
        loop {
            let frame = match read_packet(&mut self.stream, self.rx_mtu).await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("Peer closed the connection");
                    return Ok(());
                },
                Err(e) => {
                    let event = match e {
                        ObexError::Parse(_) => Event::ParseError,
                        _ => Event::LinkError,
                    };
                    if let Some(obj) = self.current.as_mut() {
                        self.session.handle_event(event, obj);
                    }
                    return Err(e);
                },
            };

            if self.handle_frame(frame).await? == Flow::Close {
                return Ok(());
            }
        }
    }

    async fn handle_frame(&mut self, frame: Bytes) -> Result<Flow> {
        let opcode = Opcode::from_byte(frame[0]);
        let packet = match Packet::decode(frame, opcode.non_header_len()) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Malformed {} packet: {}", opcode.name(), e);
                let mut obj = self
                    .current
                    .take()
                    .unwrap_or_else(|| ObexObject::new(opcode, Bytes::new(), Vec::new()));
                self.session.handle_event(Event::ParseError, &mut obj);
                return Err(e);
            },
        };

        if opcode == Opcode::Abort {
            return self.abort().await;
        }

        match self.current.take() {
            Some(obj) if obj.opcode() == opcode => self.continue_request(obj, packet).await,
            Some(mut obj) => {
                debug!("{} while {} in progress", opcode.name(), obj.opcode().name());
                self.session.handle_event(Event::Unexpected, &mut obj);
                obj.take_reply_headers();
                obj.respond(ResponseCode::BadRequest);
                self.finish(obj).await
            },
            None => self.start_request(opcode, packet).await,
        }
    }

    async fn start_request(&mut self, opcode: Opcode, packet: Packet) -> Result<Flow> {
        let last = packet.is_final();
        let chunks = body_chunks(&packet.headers);
        let mut obj = ObexObject::new(opcode, packet.non_header, packet.headers);

        self.session.handle_event(Event::RequestHint, &mut obj);
        if !obj.response().proceeds() {
            return self.finish(obj).await;
        }

        if opcode == Opcode::Put {
            self.session.handle_event(Event::RequestCheck, &mut obj);
            if !obj.response().proceeds() {
                return self.finish(obj).await;
            }
        }

        self.process(obj, chunks, last).await
    }

    async fn continue_request(&mut self, mut obj: ObexObject, packet: Packet) -> Result<Flow> {
        if obj.is_streaming_out() {
            return self.stream_next(obj).await;
        }

        let last = packet.is_final();
        let chunks = body_chunks(&packet.headers);
        obj.append_headers(
            packet
                .headers
                .into_iter()
                .filter(|h| h.body_chunk().is_none()),
        );
        self.process(obj, chunks, last).await
    }

    async fn process(&mut self, mut obj: ObexObject, chunks: Vec<Bytes>, last: bool) -> Result<Flow> {
        if obj.body_stream() == BodyStream::Inbound {
            for chunk in chunks {
                obj.deliver_chunk(chunk);
                if self.session.handle_event(Event::StreamAvailable, &mut obj) == Control::Cancel {
                    return self.cancel(obj).await;
                }
            }
        }

        if !last {
            if !obj.response().proceeds() {
                return self.finish(obj).await;
            }
            self.send(ResponseCode::Continue, Vec::new(), None).await?;
            self.session.handle_event(Event::Progress, &mut obj);
            self.current = Some(obj);
            return Ok(Flow::Continue);
        }

        if self.session.handle_event(Event::Request, &mut obj) == Control::Cancel {
            return self.cancel(obj).await;
        }
        if obj.is_streaming_out() {
            return self.stream_next(obj).await;
        }
        self.finish(obj).await
    }

    async fn stream_next(&mut self, mut obj: ObexObject) -> Result<Flow> {
        if self.session.handle_event(Event::StreamEmpty, &mut obj) == Control::Cancel {
            return self.cancel(obj).await;
        }
        if obj.body_stream() == BodyStream::Finished {
            return self.finish(obj).await;
        }

        let headers = obj.take_reply_headers();
        self.send(obj.response().next, headers, None).await?;
        self.current = Some(obj);
        Ok(Flow::Continue)
    }

    async fn cancel(&mut self, mut obj: ObexObject) -> Result<Flow> {
        let response = obj.response();
        let code = if response.next == ResponseCode::Continue {
            ResponseCode::InternalServerError
        } else {
            response.last
        };
        debug!("Cancelling {} with {:?}", obj.opcode().name(), code);
        obj.take_reply_headers();
        obj.respond(code);
        self.finish(obj).await
    }

    async fn finish(&mut self, mut obj: ObexObject) -> Result<Flow> {
        let headers = obj.take_reply_headers();
        let non_header = (obj.opcode() == Opcode::Connect).then(|| {
            ConnectParams {
                version: OBEX_VERSION,
                flags: 0,
                mtu: u16::try_from(self.rx_mtu).unwrap_or(u16::MAX),
            }
            .to_bytes()
        });
        self.send(obj.response().last, headers, non_header).await?;

        match self.session.handle_event(Event::RequestDone, &mut obj) {
            Control::Disconnect => Ok(Flow::Close),
            Control::Continue | Control::Cancel => Ok(Flow::Continue),
        }
    }

    async fn abort(&mut self) -> Result<Flow> {
        let mut obj = self
            .current
            .take()
            .unwrap_or_else(|| ObexObject::new(Opcode::Abort, Bytes::new(), Vec::new()));
        self.session.handle_event(Event::Abort, &mut obj);
        self.send(obj.response().last, Vec::new(), None).await?;
        Ok(Flow::Continue)
    }

    async fn send(
        &mut self,
        code: ResponseCode,
        headers: Vec<Header>,
        non_header: Option<Bytes>,
    ) -> Result<()> {
        let mut packet = Packet::new(code.to_wire(), headers);
        if let Some(data) = non_header {
            packet = packet.with_non_header(data);
        }
        write_packet(&mut self.stream, &packet).await
    }
}

fn body_chunks(headers: &[Header]) -> Vec<Bytes> {
    headers.iter().filter_map(Header::body_chunk).cloned().collect()
}
