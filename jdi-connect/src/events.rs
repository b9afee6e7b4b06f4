// JDWP event decoding
//
// The target reports lifecycle changes in composite event packets. A
// launched VM sends VMStart first; that is the signal a caller waits for
// before relying on the target being fully initialised.

use crate::commands::event_kinds;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reader::{read_i32, read_u64, read_u8};
use crate::types::ThreadId;
use bytes::Buf;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Composite event packet (can contain multiple events)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSet {
    pub suspend_policy: u8,
    pub events: Vec<Event>,
}

/// Single event within an event set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: u8,
    pub request_id: i32,
    pub details: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    VMStart { thread: ThreadId },
    VMDeath,
    ThreadStart { thread: ThreadId },
    ThreadDeath { thread: ThreadId },
    Unknown { kind: u8 },
}

impl EventSet {
    pub fn contains_vm_start(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.details, EventKind::VMStart { .. }))
    }

    pub fn contains_vm_death(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.details, EventKind::VMDeath))
    }
}

const MIN_EVENT_SIZE: usize = 5;

/// Parse the body of a composite event packet (header already stripped)
pub fn parse_event_packet(data: &[u8]) -> JdwpResult<EventSet> {
    let mut buf = data;

    let suspend_policy = read_u8(&mut buf)?;
    let event_count = read_i32(&mut buf)?;
    if event_count < 0 {
        return Err(JdwpError::Protocol(format!("Negative event count: {}", event_count)));
    }

    // The count comes off the wire; every event needs at least kind + request id
    let capacity = (event_count as usize).min(buf.remaining() / MIN_EVENT_SIZE);
    let mut events = Vec::with_capacity(capacity);

    for _ in 0..event_count {
        let kind = read_u8(&mut buf)?;
        let request_id = read_i32(&mut buf)?;

        let details = match kind {
            event_kinds::VM_START => EventKind::VMStart {
                thread: read_u64(&mut buf)?,
            },
            event_kinds::VM_DEATH => EventKind::VMDeath,
            event_kinds::THREAD_START => EventKind::ThreadStart {
                thread: read_u64(&mut buf)?,
            },
            event_kinds::THREAD_DEATH => EventKind::ThreadDeath {
                thread: read_u64(&mut buf)?,
            },
            _ => {
                // Payload length depends on the kind, so the rest of the set is unreadable
                warn!("Unsupported event kind: {}", kind);
                events.push(Event {
                    kind,
                    request_id,
                    details: EventKind::Unknown { kind },
                });
                break;
            }
        };

        events.push(Event {
            kind,
            request_id,
            details,
        });
    }

    Ok(EventSet {
        suspend_policy,
        events,
    })
}
