// Launching connectors
//
// Both launchers listen on a socket first, start the target, and then race
// the target's connection against the target's exit. A target that exits
// first is reported as a start failure carrying the exited process.

use crate::connect::argument::{Argument, Arguments};
use crate::connect::connector::{Connector, LaunchingConnector};
use crate::connect::error::{ConnectError, ConnectResult};
use crate::connect::process::{tokenize, TargetProcess};
use crate::connect::socket;
use crate::connect::transport::Transport;
use crate::vm::VirtualMachine;
use async_trait::async_trait;
use std::path::Path;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const COMMAND_LINE_LAUNCH: &str = "com.sun.jdi.CommandLineLaunch";
pub const RAW_COMMAND_LINE_LAUNCH: &str = "com.sun.jdi.RawCommandLineLaunch";

const ARG_HOME: &str = "home";
const ARG_OPTIONS: &str = "options";
const ARG_MAIN: &str = "main";
const ARG_SUSPEND: &str = "suspend";
const ARG_QUOTE: &str = "quote";
const ARG_VM_EXEC: &str = "vmexec";
const ARG_COMMAND: &str = "command";
const ARG_ADDRESS: &str = "address";

fn quote_argument() -> Argument {
    Argument::string(
        ARG_QUOTE,
        "Quote",
        "Character used to combine space-delimited text into a single command line argument",
    )
    .with_default("\"")
    .required()
}

fn quote_char(arguments: &Arguments) -> ConnectResult<char> {
    let quote = arguments.string(ARG_QUOTE)?.unwrap_or_default();
    let mut chars = quote.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ConnectError::illegal(ARG_QUOTE)),
    }
}

fn split(arguments: &Arguments, name: &str, quote: char) -> ConnectResult<Vec<String>> {
    let text = arguments.string(name)?.unwrap_or_default();
    tokenize(text, quote)
        .map_err(|_| ConnectError::IllegalArguments(vec![name.into(), ARG_QUOTE.into()]))
}

/// Spawn the target and wait for whichever comes first: its connection or its exit
async fn launch_target(
    connector: &str,
    listener: TcpListener,
    command_line: Vec<String>,
) -> ConnectResult<VirtualMachine> {
    let mut process = TargetProcess::spawn(command_line)?;

    let connected = tokio::select! {
        accepted = socket::accept_target(&listener) => Some(accepted),
        _ = process.wait() => None,
    };

    match connected {
        Some(Ok((connection, remote))) => Ok(VirtualMachine::new(connection, connector, Transport::Socket)
            .with_remote_address(remote)
            .with_process(process)),
        Some(Err(e)) => {
            warn!("Target failed to connect: {}", e);
            process.kill().await.ok();
            Err(e)
        }
        None => {
            let status = process.wait().await?;
            warn!("Target exited before connecting: {}", status);
            Err(ConnectError::VmStartFailure {
                process: Box::new(process),
                status,
            })
        }
    }
}

/// Launches a JVM from a java home, main class and options
#[derive(Debug, Default, Clone)]
pub struct CommandLineLaunchingConnector;

impl CommandLineLaunchingConnector {
    pub fn new() -> Self {
        Self
    }

    /// Full command line for a target that connects back to `address`
    pub fn command_line(&self, arguments: &Arguments, address: &str) -> ConnectResult<Vec<String>> {
        arguments.validate()?;

        let quote = quote_char(arguments)?;
        let vm_exec = arguments
            .string(ARG_VM_EXEC)?
            .ok_or_else(|| ConnectError::illegal(ARG_VM_EXEC))?;
        let executable = match arguments.string(ARG_HOME)? {
            Some(home) => Path::new(home)
                .join("bin")
                .join(vm_exec)
                .to_string_lossy()
                .into_owned(),
            None => vm_exec.to_string(),
        };

        let suspend = arguments.boolean(ARG_SUSPEND)?.unwrap_or(true);
        let main = split(arguments, ARG_MAIN, quote)?;
        if main.is_empty() {
            return Err(ConnectError::illegal(ARG_MAIN));
        }

        let mut command_line = vec![executable];
        command_line.extend(split(arguments, ARG_OPTIONS, quote)?);
        command_line.push(format!(
            "-agentlib:jdwp=transport={},address={},suspend={},server=n",
            Transport::Socket.name(),
            address,
            if suspend { "y" } else { "n" }
        ));
        command_line.extend(main);

        Ok(command_line)
    }
}

impl Connector for CommandLineLaunchingConnector {
    fn name(&self) -> &str {
        COMMAND_LINE_LAUNCH
    }

    fn description(&self) -> &str {
        "Launches target using Sun Java VM command line and attaches to it"
    }

    fn transport(&self) -> Transport {
        Transport::Socket
    }

    fn default_arguments(&self) -> Arguments {
        let java_home = std::env::var("JAVA_HOME").unwrap_or_default();

        [
            Argument::string(ARG_HOME, "Home", "Home directory of the SDK or runtime environment used to launch the application")
                .with_default(java_home),
            Argument::string(ARG_OPTIONS, "Options", "Launched VM options"),
            Argument::string(ARG_MAIN, "Main", "Main class and arguments, or if -jar is an option, the main jar file and arguments")
                .required(),
            Argument::boolean(ARG_SUSPEND, "Suspend", "All threads will be suspended before execution of main")
                .with_default(Argument::string_value_of(true))
                .required(),
            quote_argument(),
            Argument::string(ARG_VM_EXEC, "Launcher", "Name of the Java VM launcher")
                .with_default("java")
                .required(),
        ]
        .into_iter()
        .collect()
    }
}

#[async_trait]
impl LaunchingConnector for CommandLineLaunchingConnector {
    async fn launch(&self, arguments: &Arguments) -> ConnectResult<VirtualMachine> {
        arguments.validate()?;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let address = socket::listen_address(&listener)?;
        let command_line = self.command_line(arguments, &address)?;

        info!("Launching {} (target connects to {})", command_line[0], address);
        launch_target(COMMAND_LINE_LAUNCH, listener, command_line).await
    }
}

/// Runs a caller-supplied command that is expected to connect to `address`
#[derive(Debug, Default, Clone)]
pub struct RawCommandLineLaunchingConnector;

impl RawCommandLineLaunchingConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for RawCommandLineLaunchingConnector {
    fn name(&self) -> &str {
        RAW_COMMAND_LINE_LAUNCH
    }

    fn description(&self) -> &str {
        "Launches target using user-specified command line and attaches to it"
    }

    fn transport(&self) -> Transport {
        Transport::Socket
    }

    fn default_arguments(&self) -> Arguments {
        [
            Argument::string(ARG_COMMAND, "Command", "Raw command to start the debugged application VM")
                .required(),
            quote_argument(),
            Argument::string(ARG_ADDRESS, "Address", "Address from which to listen for a connection after the raw command is run")
                .required(),
        ]
        .into_iter()
        .collect()
    }
}

#[async_trait]
impl LaunchingConnector for RawCommandLineLaunchingConnector {
    async fn launch(&self, arguments: &Arguments) -> ConnectResult<VirtualMachine> {
        arguments.validate()?;

        let quote = quote_char(arguments)?;
        let command_line = split(arguments, ARG_COMMAND, quote)?;
        if command_line.is_empty() {
            return Err(ConnectError::illegal(ARG_COMMAND));
        }

        let address = arguments.string(ARG_ADDRESS)?.unwrap_or_default();
        let (host, port) =
            socket::parse_address(address).ok_or_else(|| ConnectError::illegal(ARG_ADDRESS))?;

        let listener = TcpListener::bind((host.unwrap_or("127.0.0.1"), port)).await?;
        info!(
            "Launching {} (listening on {})",
            command_line[0],
            socket::listen_address(&listener)?
        );

        launch_target(RAW_COMMAND_LINE_LAUNCH, listener, command_line).await
    }
}
