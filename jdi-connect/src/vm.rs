// Session handle
//
// A `VirtualMachine` is what every connector hands back on success. It owns
// the JDWP connection and, for launched targets, the target process.

use crate::commands::{command_sets, vm_commands};
use crate::connect::process::TargetProcess;
use crate::connect::transport::Transport;
use crate::connection::JdwpConnection;
use crate::events::EventSet;
use crate::protocol::{CommandPacket, JdwpError, JdwpResult};
use crate::reader::{read_i32, read_string};
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, info};

/// JVM version information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmVersion {
    pub description: String,
    pub jdwp_major: i32,
    pub jdwp_minor: i32,
    pub vm_version: String,
    pub vm_name: String,
}

/// ID sizes used by the JVM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmIdSizes {
    pub field_id_size: i32,
    pub method_id_size: i32,
    pub object_id_size: i32,
    pub reference_type_id_size: i32,
    pub frame_id_size: i32,
}

#[derive(Debug)]
pub struct VirtualMachine {
    connection: JdwpConnection,
    connector: String,
    transport: Transport,
    remote: Option<SocketAddr>,
    process: Option<TargetProcess>,
}

impl VirtualMachine {
    pub fn new(connection: JdwpConnection, connector: &str, transport: Transport) -> Self {
        Self {
            connection,
            connector: connector.to_string(),
            transport,
            remote: None,
            process: None,
        }
    }

    pub(crate) fn with_remote_address(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    pub(crate) fn with_process(mut self, process: TargetProcess) -> Self {
        self.process = Some(process);
        self
    }

    /// Name of the connector that produced this session
    pub fn connector_name(&self) -> &str {
        &self.connector
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// The launched target, if this session came from a launching connector
    pub fn process(&self) -> Option<&TargetProcess> {
        self.process.as_ref()
    }

    pub fn process_mut(&mut self) -> Option<&mut TargetProcess> {
        self.process.as_mut()
    }

    pub fn take_process(&mut self) -> Option<TargetProcess> {
        self.process.take()
    }

    /// Raw access for commands this handle does not wrap
    pub fn connection_mut(&mut self) -> &mut JdwpConnection {
        &mut self.connection
    }

    async fn command(&mut self, command: u8, data: Vec<u8>) -> JdwpResult<Vec<u8>> {
        let id = self.connection.next_id();
        let mut packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, command);
        packet.data = data;

        let reply = self.connection.send_command(packet).await?;
        reply.check_error()?;
        Ok(reply.data)
    }

    /// VirtualMachine.Version
    pub async fn version(&mut self) -> JdwpResult<VmVersion> {
        let data = self.command(vm_commands::VERSION, Vec::new()).await?;
        let mut data = data.as_slice();

        Ok(VmVersion {
            description: read_string(&mut data)?,
            jdwp_major: read_i32(&mut data)?,
            jdwp_minor: read_i32(&mut data)?,
            vm_version: read_string(&mut data)?,
            vm_name: read_string(&mut data)?,
        })
    }

    /// VirtualMachine.IDSizes
    pub async fn id_sizes(&mut self) -> JdwpResult<VmIdSizes> {
        let data = self.command(vm_commands::ID_SIZES, Vec::new()).await?;
        let mut data = data.as_slice();

        Ok(VmIdSizes {
            field_id_size: read_i32(&mut data)?,
            method_id_size: read_i32(&mut data)?,
            object_id_size: read_i32(&mut data)?,
            reference_type_id_size: read_i32(&mut data)?,
            frame_id_size: read_i32(&mut data)?,
        })
    }

    pub async fn suspend(&mut self) -> JdwpResult<()> {
        self.command(vm_commands::SUSPEND, Vec::new()).await?;
        Ok(())
    }

    pub async fn resume(&mut self) -> JdwpResult<()> {
        self.command(vm_commands::RESUME, Vec::new()).await?;
        Ok(())
    }

    /// Detach; the target keeps running
    pub async fn dispose(mut self) -> JdwpResult<Option<TargetProcess>> {
        info!("Disposing session from {}", self.connector);
        self.command(vm_commands::DISPOSE, Vec::new()).await?;
        Ok(self.process.take())
    }

    /// Ask the target to terminate with `exit_code`
    pub async fn exit(mut self, exit_code: i32) -> JdwpResult<Option<TargetProcess>> {
        info!("Terminating target with exit code {}", exit_code);
        let mut data = Vec::with_capacity(4);
        data.put_i32(exit_code);
        self.command(vm_commands::EXIT, data).await?;
        Ok(self.process.take())
    }

    pub async fn recv_event(&self) -> Option<EventSet> {
        self.connection.recv_event().await
    }

    pub async fn try_recv_event(&self) -> Option<EventSet> {
        self.connection.try_recv_event().await
    }

    /// Wait for the VMStart event that marks a fully started target
    ///
    /// Events seen before it are discarded.
    pub async fn wait_for_start(&self) -> JdwpResult<EventSet> {
        while let Some(event_set) = self.connection.recv_event().await {
            if event_set.contains_vm_start() {
                info!("Target VM started");
                return Ok(event_set);
            }
            if event_set.contains_vm_death() {
                break;
            }
            debug!("Skipping {} events before VMStart", event_set.events.len());
        }

        Err(JdwpError::ConnectionClosed)
    }
}
