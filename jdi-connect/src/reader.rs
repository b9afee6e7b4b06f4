// Cursor helpers for decoding JDWP reply and event payloads

use crate::protocol::{JdwpError, JdwpResult};
use bytes::Buf;

fn ensure(buf: &&[u8], needed: usize, what: &str) -> JdwpResult<()> {
    if buf.remaining() < needed {
        return Err(JdwpError::Protocol(format!(
            "Not enough data for {}: expected {}, got {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Read a JDWP string (4-byte length prefix + UTF-8 bytes)
pub fn read_string(buf: &mut &[u8]) -> JdwpResult<String> {
    ensure(buf, 4, "string length")?;
    let len = buf.get_u32() as usize;
    ensure(buf, len, "string")?;

    let bytes = &buf[..len];
    buf.advance(len);

    String::from_utf8(bytes.to_vec())
        .map_err(|e| JdwpError::Protocol(format!("Invalid UTF-8 in string: {}", e)))
}

pub fn read_i32(buf: &mut &[u8]) -> JdwpResult<i32> {
    ensure(buf, 4, "i32")?;
    Ok(buf.get_i32())
}

pub fn read_u8(buf: &mut &[u8]) -> JdwpResult<u8> {
    ensure(buf, 1, "u8")?;
    Ok(buf.get_u8())
}

pub fn read_u64(buf: &mut &[u8]) -> JdwpResult<u64> {
    ensure(buf, 8, "u64")?;
    Ok(buf.get_u64())
}
