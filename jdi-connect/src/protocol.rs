// JDWP wire definitions
//
// Handshake bytes, packet framing and the low-level error type shared by the
// connection, the event loop and the session handle.
//
// Reference: https://docs.oracle.com/javase/8/docs/platform/jpda/jdwp/jdwp-protocol.html

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

// All multi-byte values on the wire are big-endian

pub type JdwpResult<T> = Result<T, JdwpError>;

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid handshake")]
    InvalidHandshake,

    #[error("JDWP error code {0}: {1}")]
    JdwpErrorCode(u16, String),

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Sent by the debugger and echoed by the target before any packet
pub const JDWP_HANDSHAKE: &[u8] = b"JDWP-Handshake";

// length (4) + id (4) + flags (1) + command set/command (2) or error code (2)
pub const HEADER_SIZE: usize = 11;
pub const REPLY_FLAG: u8 = 0x80;

#[derive(Debug, Clone)]
pub struct CommandPacket {
    pub id: u32,
    pub command_set: u8,
    pub command: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ReplyPacket {
    pub id: u32,
    pub error_code: u16,
    pub data: Vec<u8>,
}

impl CommandPacket {
    pub fn new(id: u32, command_set: u8, command: u8) -> Self {
        Self {
            id,
            command_set,
            command,
            data: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let length = HEADER_SIZE + self.data.len();
        let mut buf = BytesMut::with_capacity(length);

        buf.put_u32(length as u32);
        buf.put_u32(self.id);
        buf.put_u8(0x00);
        buf.put_u8(self.command_set);
        buf.put_u8(self.command);
        buf.put_slice(&self.data);

        buf.to_vec()
    }
}

impl ReplyPacket {
    pub fn decode(mut buf: &[u8]) -> JdwpResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(JdwpError::Protocol("Reply packet too short".to_string()));
        }

        let _length = buf.get_u32();
        let id = buf.get_u32();
        let flags = buf.get_u8();

        if flags != REPLY_FLAG {
            return Err(JdwpError::Protocol(format!("Invalid reply flag: {:#x}", flags)));
        }

        let error_code = buf.get_u16();

        Ok(Self {
            id,
            error_code,
            data: buf.to_vec(),
        })
    }

    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }

    pub fn check_error(&self) -> JdwpResult<()> {
        if self.is_error() {
            Err(JdwpError::JdwpErrorCode(
                self.error_code,
                self.error_message().to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Names for the error codes the VirtualMachine command set can return
    pub fn error_message(&self) -> &'static str {
        match self.error_code {
            0 => "NONE",
            10 => "INVALID_THREAD",
            13 => "THREAD_NOT_SUSPENDED",
            20 => "INVALID_OBJECT",
            99 => "NOT_IMPLEMENTED",
            100 => "NULL_POINTER",
            103 => "ILLEGAL_ARGUMENT",
            110 => "OUT_OF_MEMORY",
            111 => "ACCESS_DENIED",
            112 => "VM_DEAD",
            113 => "INTERNAL",
            115 => "UNATTACHED_THREAD",
            _ => "UNKNOWN_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_packet_encode() {
        let mut packet = CommandPacket::new(0x01020304, 1, 10);
        packet.data.put_i32(3);
        let encoded = packet.encode();

        assert_eq!(encoded.len(), HEADER_SIZE + 4);
        assert_eq!(&encoded[0..4], &[0, 0, 0, 15]);
        assert_eq!(&encoded[4..8], &[1, 2, 3, 4]);
        assert_eq!(encoded[8], 0x00);
        assert_eq!(encoded[9], 1);
        assert_eq!(encoded[10], 10);
        assert_eq!(&encoded[11..], &[0, 0, 0, 3]);
    }

    #[test]
    fn test_reply_packet_with_error_code() {
        let raw = [0, 0, 0, 11, 0, 0, 0, 7, 0x80, 0, 112];

        let packet = ReplyPacket::decode(&raw).unwrap();
        assert_eq!(packet.id, 7);
        assert!(packet.is_error());
        assert_eq!(packet.error_message(), "VM_DEAD");

        match packet.check_error() {
            Err(JdwpError::JdwpErrorCode(112, name)) => assert_eq!(name, "VM_DEAD"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reply_packet_rejects_command_flag() {
        let raw = [0, 0, 0, 11, 0, 0, 0, 1, 0x00, 0, 0];
        assert!(matches!(ReplyPacket::decode(&raw), Err(JdwpError::Protocol(_))));
    }

    #[test]
    fn test_reply_packet_too_short() {
        assert!(ReplyPacket::decode(&[0, 0, 0]).is_err());
    }
}
