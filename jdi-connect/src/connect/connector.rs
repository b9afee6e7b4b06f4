// Connector contracts
//
// A connector is a stateless strategy for getting a session with a target
// VM. The three strategies share the descriptive part (`Connector`) and add
// exactly one way of establishing a session each.

use crate::connect::argument::Arguments;
use crate::connect::error::ConnectResult;
use crate::connect::listen::ListenSession;
use crate::connect::transport::Transport;
use crate::vm::VirtualMachine;
use async_trait::async_trait;
use std::fmt;

pub trait Connector: Send + Sync + fmt::Debug {
    /// Dotted identifier, e.g. `com.sun.jdi.SocketAttach`; not meant for display
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn transport(&self) -> Transport;

    /// A fresh argument map holding the defaults
    ///
    /// The key set is identical on every call.
    fn default_arguments(&self) -> Arguments;
}

/// Attach to a target that is already running and listening
#[async_trait]
pub trait AttachingConnector: Connector {
    async fn attach(&self, arguments: &Arguments) -> ConnectResult<VirtualMachine>;
}

/// Start a target and wait for it to connect back
///
/// The returned session may precede the target's VMStart event; see
/// [`VirtualMachine::wait_for_start`]. The target's stdio is exposed through
/// [`VirtualMachine::process_mut`] and must be drained by the caller.
#[async_trait]
pub trait LaunchingConnector: Connector {
    async fn launch(&self, arguments: &Arguments) -> ConnectResult<VirtualMachine>;
}

/// Wait for targets to connect in
#[async_trait]
pub trait ListeningConnector: Connector {
    fn supports_multiple_connections(&self) -> bool;

    /// Bind and return the listening context; its address is what the target needs
    async fn start_listening(&self, arguments: &Arguments) -> ConnectResult<ListenSession>;

    /// Wait for one target on a listening session
    async fn accept(&self, session: &ListenSession) -> ConnectResult<VirtualMachine>;

    /// Release the session's address; pending and later accepts fail
    async fn stop_listening(&self, session: &ListenSession) -> ConnectResult<()>;

    /// Listen on a fully specified address for a single target, then release it
    async fn accept_once(&self, arguments: &Arguments) -> ConnectResult<VirtualMachine>;
}
