// JDWP identifier types
//
// Object IDs are negotiated through VirtualMachine.IDSizes; every VM this
// crate talks to uses 8 bytes, which is what the event decoder assumes.

pub type ObjectId = u64;
pub type ThreadId = ObjectId;
