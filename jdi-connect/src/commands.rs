// JDWP command constants used by the session handle
//
// Only the VirtualMachine command set and the composite event command are
// needed once a connector has produced a session.

pub mod command_sets {
    pub const VIRTUAL_MACHINE: u8 = 1;
    pub const EVENT: u8 = 64;
}

// VirtualMachine commands (set 1)
pub mod vm_commands {
    pub const VERSION: u8 = 1;
    pub const DISPOSE: u8 = 6;
    pub const ID_SIZES: u8 = 7;
    pub const SUSPEND: u8 = 8;
    pub const RESUME: u8 = 9;
    pub const EXIT: u8 = 10;
}

// Event commands (set 64)
pub mod event_commands {
    pub const COMPOSITE: u8 = 100;
}

// Event kinds that carry no location payload
pub mod event_kinds {
    pub const THREAD_START: u8 = 6;
    pub const THREAD_DEATH: u8 = 7;
    pub const VM_START: u8 = 90;
    pub const VM_DEATH: u8 = 99;
}
