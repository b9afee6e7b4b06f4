// JDI-style connectors for JDWP debug sessions
//
// Three strategies for getting a session with a target JVM:
// - attach to a VM that is already listening
// - launch a VM and let it connect back
// - listen for VMs that connect in
//
// Each connector describes its configuration as typed, named arguments,
// validates them, and returns a `VirtualMachine` session handle.

pub mod commands;
pub mod connect;
pub mod connection;
pub mod eventloop;
pub mod events;
pub mod protocol;
pub mod reader;
pub mod types;
pub mod vm;

pub use connect::{
    AnyConnector, Argument, ArgumentKind, Arguments, AttachingConnector, ConnectError,
    ConnectResult, Connector, ConnectorManager, LaunchingConnector, ListenSession,
    ListeningConnector, TargetProcess, Transport,
};
pub use connection::JdwpConnection;
pub use protocol::{JdwpError, JdwpResult};
pub use vm::{VirtualMachine, VmIdSizes, VmVersion};
