// JDWP connection management
//
// Handshake and event loop startup for a stream a connector has already
// opened (attached, accepted, or accepted from a launched target).

use crate::eventloop::{spawn_event_loop, EventLoopHandle};
use crate::events::EventSet;
use crate::protocol::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct JdwpConnection {
    event_loop: EventLoopHandle,
    next_id: Arc<AtomicU32>,
}

/// Perform the debugger side of the JDWP handshake
///
/// The debugger always speaks first, whichever side opened the socket.
pub async fn handshake<S>(stream: &mut S) -> JdwpResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("Performing JDWP handshake");

    stream.write_all(JDWP_HANDSHAKE).await?;
    stream.flush().await?;

    let mut buf = vec![0u8; JDWP_HANDSHAKE.len()];
    stream.read_exact(&mut buf).await?;

    if buf != JDWP_HANDSHAKE {
        warn!("Invalid handshake response: {:?}", buf);
        return Err(JdwpError::InvalidHandshake);
    }

    info!("JDWP handshake successful");
    Ok(())
}

impl JdwpConnection {
    /// Take over a handshaken socket and start routing replies and events
    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::from_parts(reader, writer)
    }

    pub fn from_parts<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            event_loop: spawn_event_loop(reader, writer),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Send a command and wait for reply
    pub async fn send_command(&mut self, packet: CommandPacket) -> JdwpResult<ReplyPacket> {
        debug!("Sending command packet id={}", packet.id);
        self.event_loop.send_command(packet).await
    }

    /// Try to receive an event (non-blocking)
    pub async fn try_recv_event(&self) -> Option<EventSet> {
        self.event_loop.try_recv_event().await
    }

    /// Wait for the next event
    pub async fn recv_event(&self) -> Option<EventSet> {
        self.event_loop.recv_event().await
    }

    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handshake_echo() {
        let (mut debugger, mut target) = tokio::io::duplex(64);

        let echo = tokio::spawn(async move {
            let mut buf = [0u8; 14];
            target.read_exact(&mut buf).await.unwrap();
            target.write_all(&buf).await.unwrap();
            target
        });

        handshake(&mut debugger).await.unwrap();
        drop(echo.await.unwrap());
    }

    #[tokio::test]
    async fn test_handshake_rejects_garbage() {
        let (mut debugger, mut target) = tokio::io::duplex(64);

        let reply = tokio::spawn(async move {
            let mut buf = [0u8; 14];
            target.read_exact(&mut buf).await.unwrap();
            target.write_all(b"HTTP/1.1 400 B").await.unwrap();
            target
        });

        assert!(matches!(
            handshake(&mut debugger).await,
            Err(JdwpError::InvalidHandshake)
        ));
        drop(reply.await.unwrap());
    }

    #[tokio::test]
    async fn test_next_id_increments() {
        let (client, _target) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let connection = JdwpConnection::from_parts(reader, writer);

        assert_eq!(connection.next_id(), 1);
        assert_eq!(connection.next_id(), 2);
    }
}
