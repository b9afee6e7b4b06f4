// Socket attaching connector (com.sun.jdi.SocketAttach)
//
// Attaches to a VM started with
// -agentlib:jdwp=transport=dt_socket,server=y,address=<port>

use crate::connect::argument::{Argument, Arguments};
use crate::connect::connector::{AttachingConnector, Connector};
use crate::connect::error::{ConnectError, ConnectResult};
use crate::connect::socket::{self, timeout_argument, to_timeout, ARG_TIMEOUT};
use crate::connect::transport::Transport;
use crate::vm::VirtualMachine;
use async_trait::async_trait;

pub const SOCKET_ATTACH: &str = "com.sun.jdi.SocketAttach";

const ARG_HOST: &str = "hostname";
const ARG_PORT: &str = "port";

#[derive(Debug, Default, Clone)]
pub struct SocketAttachingConnector;

impl SocketAttachingConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SocketAttachingConnector {
    fn name(&self) -> &str {
        SOCKET_ATTACH
    }

    fn description(&self) -> &str {
        "Attaches by socket to other VMs"
    }

    fn transport(&self) -> Transport {
        Transport::Socket
    }

    fn default_arguments(&self) -> Arguments {
        [
            Argument::string(
                ARG_HOST,
                "Host",
                "Machine name to which to attach for VM connections",
            )
            .with_default("localhost"),
            Argument::integer(
                ARG_PORT,
                "Port",
                "Port number to which to attach for VM connections",
                1,
                u16::MAX as i32,
            )
            .required(),
            timeout_argument(),
        ]
        .into_iter()
        .collect()
    }
}

#[async_trait]
impl AttachingConnector for SocketAttachingConnector {
    async fn attach(&self, arguments: &Arguments) -> ConnectResult<VirtualMachine> {
        arguments.validate()?;

        let host = arguments.string(ARG_HOST)?.unwrap_or("localhost");
        let port = arguments
            .int(ARG_PORT)?
            .ok_or_else(|| ConnectError::illegal(ARG_PORT))? as u16;
        let timeout = to_timeout(arguments.int(ARG_TIMEOUT)?);

        let (connection, remote) =
            socket::with_timeout(timeout, socket::connect_target(host, port)).await?;

        Ok(VirtualMachine::new(connection, SOCKET_ATTACH, Transport::Socket)
            .with_remote_address(remote))
    }
}
