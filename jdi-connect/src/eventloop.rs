// JDWP event loop
//
// Owns both halves of an established session's stream. Outgoing commands are
// written in order; a reader task hands over whole incoming packets, which
// are either routed to the waiting command (replies) or decoded and queued
// (events).

use crate::commands::{command_sets, event_commands};
use crate::events::{parse_event_packet, EventSet};
use crate::protocol::{CommandPacket, JdwpError, JdwpResult, ReplyPacket, HEADER_SIZE, REPLY_FLAG};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Maximum allowed JDWP packet size (10MB)
const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// Request to send a command and get reply
pub struct CommandRequest {
    pub packet: CommandPacket,
    pub reply_tx: oneshot::Sender<JdwpResult<ReplyPacket>>,
}

/// Handle to the event loop for sending commands and receiving events
#[derive(Clone, Debug)]
pub struct EventLoopHandle {
    command_tx: mpsc::Sender<CommandRequest>,
    event_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<EventSet>>>,
}

impl EventLoopHandle {
    /// Send a command and wait for reply
    pub async fn send_command(&self, packet: CommandPacket) -> JdwpResult<ReplyPacket> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CommandRequest { packet, reply_tx })
            .await
            .map_err(|_| JdwpError::ConnectionClosed)?;

        reply_rx.await.map_err(|_| JdwpError::ConnectionClosed)?
    }

    /// Try to receive an event (non-blocking)
    pub async fn try_recv_event(&self) -> Option<EventSet> {
        let mut rx = self.event_rx.lock().await;
        rx.try_recv().ok()
    }

    /// Wait for the next event; `None` once the target has gone away
    pub async fn recv_event(&self) -> Option<EventSet> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }
}

/// Start the event loop task over an already handshaken stream
pub fn spawn_event_loop<R, W>(reader: R, writer: W) -> EventLoopHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    // VMStart/VMDeath must not be lost while nobody is polling
    let (event_tx, event_rx) = mpsc::channel(256);

    tokio::spawn(event_loop_task(reader, writer, command_rx, event_tx));

    EventLoopHandle {
        command_tx,
        event_rx: Arc::new(tokio::sync::Mutex::new(event_rx)),
    }
}

async fn event_loop_task<R, W>(
    reader: R,
    mut writer: W,
    mut command_rx: mpsc::Receiver<CommandRequest>,
    event_tx: mpsc::Sender<EventSet>,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    info!("Event loop started");

    // Packets are read in their own task: a read cut short by select! would
    // lose the bytes it already consumed
    let (packet_tx, mut packet_rx) = mpsc::channel(32);
    let reader = tokio::spawn(read_packets(reader, packet_tx));

    let mut pending_replies: HashMap<u32, oneshot::Sender<JdwpResult<ReplyPacket>>> =
        HashMap::new();

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("All session handles dropped");
                    break;
                };

                let packet_id = cmd.packet.id;
                debug!("Sending command id={}", packet_id);

                let encoded = cmd.packet.encode();
                let written = match writer.write_all(&encoded).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                };

                if let Err(e) = written {
                    error!("Failed to write command: {}", e);
                    cmd.reply_tx.send(Err(JdwpError::Io(e))).ok();
                    continue;
                }

                pending_replies.insert(packet_id, cmd.reply_tx);
            }

            packet = packet_rx.recv() => {
                let Some(packet) = packet else {
                    break;
                };

                if packet.is_reply {
                    debug!("Received reply id={}", packet.id);

                    match pending_replies.remove(&packet.id) {
                        Some(tx) => {
                            tx.send(ReplyPacket::decode(&packet.data)).ok();
                        }
                        None => warn!("Received reply for unknown command id={}", packet.id),
                    }
                    continue;
                }

                let (command_set, command) = (packet.data[9], packet.data[10]);
                if command_set != command_sets::EVENT || command != event_commands::COMPOSITE {
                    warn!("Ignoring command {}/{} sent by target", command_set, command);
                    continue;
                }

                match parse_event_packet(&packet.data[HEADER_SIZE..]) {
                    Ok(event_set) => {
                        debug!("Parsed event set: {} events, suspend_policy={}",
                               event_set.events.len(), event_set.suspend_policy);

                        match event_tx.try_send(event_set) {
                            Ok(_) => {}
                            Err(mpsc::error::TrySendError::Full(event)) => {
                                error!("Event channel full, dropping event set with {} events",
                                       event.events.len());
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                warn!("Event receiver dropped, future events will be discarded");
                            }
                        }
                    }
                    Err(e) => warn!("Failed to parse event: {}", e),
                }
            }
        }
    }

    reader.abort();
    for (_, tx) in pending_replies.drain() {
        tx.send(Err(JdwpError::ConnectionClosed)).ok();
    }

    info!("Event loop shutting down");
}

/// A whole packet as read off the wire, header included
struct RawPacket {
    is_reply: bool,
    id: u32,
    data: Vec<u8>,
}

/// Forward whole packets until the stream ends or the loop goes away
async fn read_packets<R>(mut reader: R, packet_tx: mpsc::Sender<RawPacket>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_packet(&mut reader).await {
            Ok((is_reply, id, data)) => {
                if packet_tx.send(RawPacket { is_reply, id, data }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                info!("Target connection ended: {}", e);
                break;
            }
        }
    }
}

/// Read one packet; returns (is_reply, id, full packet including header)
async fn read_packet<R>(reader: &mut R) -> JdwpResult<(bool, u32, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let packet_id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let flags = header[8];

    if length < HEADER_SIZE {
        return Err(JdwpError::Protocol(format!("Invalid packet length: {}", length)));
    }

    if length > MAX_PACKET_SIZE {
        return Err(JdwpError::Protocol(format!(
            "Packet too large: {} bytes (max: {} bytes)",
            length, MAX_PACKET_SIZE
        )));
    }

    let mut full_packet = vec![0u8; length];
    full_packet[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut full_packet[HEADER_SIZE..]).await?;

    Ok((flags == REPLY_FLAG, packet_id, full_packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[tokio::test]
    async fn test_reply_routed_to_command() {
        let (client, mut target) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(client);
        let handle = spawn_event_loop(reader, writer);

        let target_task = tokio::spawn(async move {
            let mut header = [0u8; HEADER_SIZE];
            target.read_exact(&mut header).await.unwrap();
            assert_eq!(header[9], 1);
            assert_eq!(header[10], 9);

            let mut reply = Vec::new();
            reply.put_u32(HEADER_SIZE as u32);
            reply.put_slice(&header[4..8]);
            reply.put_u8(REPLY_FLAG);
            reply.put_u16(0);
            target.write_all(&reply).await.unwrap();
            target
        });

        let reply = handle.send_command(CommandPacket::new(42, 1, 9)).await.unwrap();
        assert_eq!(reply.id, 42);
        assert!(!reply.is_error());

        drop(target_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_stream_fails_pending_command() {
        let (client, target) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(client);
        let handle = spawn_event_loop(reader, writer);
        drop(target);

        let result = handle.send_command(CommandPacket::new(1, 1, 1)).await;
        assert!(result.is_err());
        assert!(handle.recv_event().await.is_none());
    }

    fn reply_bytes(id: u32) -> Vec<u8> {
        let mut reply = Vec::new();
        reply.put_u32(HEADER_SIZE as u32);
        reply.put_u32(id);
        reply.put_u8(REPLY_FLAG);
        reply.put_u16(0);
        reply
    }

    #[tokio::test]
    async fn test_command_during_partial_reply_keeps_stream_in_step() {
        let (client, mut target) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(client);
        let handle = spawn_event_loop(reader, writer);

        let first = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.send_command(CommandPacket::new(42, 1, 1)).await })
        };

        let mut header = [0u8; HEADER_SIZE];
        target.read_exact(&mut header).await.unwrap();
        assert_eq!(&header[4..8], &42u32.to_be_bytes());

        // Half a reply header, then a second command while it is in flight
        let reply = reply_bytes(42);
        target.write_all(&reply[..5]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let second = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.send_command(CommandPacket::new(43, 1, 1)).await })
        };
        target.read_exact(&mut header).await.unwrap();
        assert_eq!(&header[4..8], &43u32.to_be_bytes());

        target.write_all(&reply[5..]).await.unwrap();
        target.write_all(&reply_bytes(43)).await.unwrap();

        let within = std::time::Duration::from_secs(1);
        let first = tokio::time::timeout(within, first).await.unwrap().unwrap().unwrap();
        let second = tokio::time::timeout(within, second).await.unwrap().unwrap().unwrap();
        assert_eq!(first.id, 42);
        assert_eq!(second.id, 43);
    }
}
