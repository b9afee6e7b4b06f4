// Connectors: the ways a debugger obtains a session with a target VM

pub mod argument;
pub mod attach;
pub mod connector;
pub mod error;
pub mod launch;
pub mod listen;
pub mod manager;
pub mod process;
pub mod socket;
pub mod transport;

pub use argument::{Argument, ArgumentKind, Arguments};
pub use attach::SocketAttachingConnector;
pub use connector::{AttachingConnector, Connector, LaunchingConnector, ListeningConnector};
pub use error::{ConnectError, ConnectResult};
pub use launch::{CommandLineLaunchingConnector, RawCommandLineLaunchingConnector};
pub use listen::{ListenSession, SocketListeningConnector};
pub use manager::{AnyConnector, ConnectorInfo, ConnectorManager};
pub use process::TargetProcess;
pub use transport::Transport;
