// Socket listening connector (com.sun.jdi.SocketListen)
//
// Targets started with -agentlib:jdwp=transport=dt_socket,server=n,address=<addr>
// connect in. `start_listening` returns a `ListenSession`; the same session
// must be handed to `accept` and `stop_listening`.

use crate::connect::argument::{Argument, Arguments};
use crate::connect::connector::{Connector, ListeningConnector};
use crate::connect::error::{ConnectError, ConnectResult};
use crate::connect::socket::{self, timeout_argument, to_timeout, ARG_TIMEOUT};
use crate::connect::transport::Transport;
use crate::vm::VirtualMachine;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub const SOCKET_LISTEN: &str = "com.sun.jdi.SocketListen";

const ARG_PORT: &str = "port";
const ARG_LOCAL_ADDRESS: &str = "localAddress";
const DEFAULT_LOCAL_ADDRESS: &str = "127.0.0.1";

/// One listening session: Listening until stopped, then Idle for good
///
/// Clones share the same listener, so several accepts may wait at once.
#[derive(Debug, Clone)]
pub struct ListenSession {
    inner: Arc<ListenState>,
}

#[derive(Debug)]
struct ListenState {
    connector: String,
    address: String,
    timeout: Option<Duration>,
    listener: Mutex<Option<Arc<TcpListener>>>,
    stopped: watch::Sender<bool>,
}

impl ListenSession {
    fn new(connector: &str, listener: TcpListener, timeout: Option<Duration>) -> ConnectResult<Self> {
        let address = socket::listen_address(&listener)?;
        let (stopped, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(ListenState {
                connector: connector.to_string(),
                address,
                timeout,
                listener: Mutex::new(Some(Arc::new(listener))),
                stopped,
            }),
        })
    }

    /// Concrete `host:port` the target should connect to
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    pub fn connector_name(&self) -> &str {
        &self.inner.connector
    }

    pub fn is_listening(&self) -> bool {
        !*self.inner.stopped.borrow()
    }

    fn listener(&self) -> Option<Arc<TcpListener>> {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn stop(&self) -> bool {
        let released = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some();
        self.inner.stopped.send_replace(true);
        released
    }
}

#[derive(Debug, Default, Clone)]
pub struct SocketListeningConnector;

impl SocketListeningConnector {
    pub fn new() -> Self {
        Self
    }

    fn check_session(&self, session: &ListenSession) -> ConnectResult<()> {
        if session.connector_name() == self.name() {
            Ok(())
        } else {
            Err(ConnectError::IllegalArguments(
                self.default_arguments().keys().map(String::from).collect(),
            ))
        }
    }

    async fn bind(arguments: &Arguments) -> ConnectResult<TcpListener> {
        let host = arguments
            .string(ARG_LOCAL_ADDRESS)?
            .unwrap_or(DEFAULT_LOCAL_ADDRESS);
        let port = arguments.int(ARG_PORT)?.unwrap_or(0) as u16;

        Ok(TcpListener::bind((host, port)).await?)
    }

    async fn accept_on(
        listener: &TcpListener,
        timeout: Option<Duration>,
    ) -> ConnectResult<VirtualMachine> {
        let (connection, remote) =
            socket::with_timeout(timeout, socket::accept_target(listener)).await?;

        Ok(VirtualMachine::new(connection, SOCKET_LISTEN, Transport::Socket)
            .with_remote_address(remote))
    }
}

impl Connector for SocketListeningConnector {
    fn name(&self) -> &str {
        SOCKET_LISTEN
    }

    fn description(&self) -> &str {
        "Accepts socket connections initiated by other VMs"
    }

    fn transport(&self) -> Transport {
        Transport::Socket
    }

    fn default_arguments(&self) -> Arguments {
        [
            Argument::integer(
                ARG_PORT,
                "Port",
                "Port number at which to listen for VM connections; 0 picks a free port",
                0,
                u16::MAX as i32,
            ),
            Argument::string(
                ARG_LOCAL_ADDRESS,
                "Local address",
                "Local address that the listener binds to",
            ),
            timeout_argument(),
        ]
        .into_iter()
        .collect()
    }
}

#[async_trait]
impl ListeningConnector for SocketListeningConnector {
    fn supports_multiple_connections(&self) -> bool {
        true
    }

    async fn start_listening(&self, arguments: &Arguments) -> ConnectResult<ListenSession> {
        arguments.validate()?;

        let listener = Self::bind(arguments).await?;
        let session = ListenSession::new(
            SOCKET_LISTEN,
            listener,
            to_timeout(arguments.int(ARG_TIMEOUT)?),
        )?;

        info!("Listening for targets at {}", session.address());
        Ok(session)
    }

    async fn accept(&self, session: &ListenSession) -> ConnectResult<VirtualMachine> {
        self.check_session(session)?;

        // Subscribe before looking at the listener so a concurrent stop is never missed
        let mut stopped = session.inner.stopped.subscribe();
        let listener = session
            .listener()
            .ok_or_else(|| ConnectError::not_listening("listening session was stopped"))?;

        tokio::select! {
            _ = stopped.wait_for(|stopped| *stopped) => {
                Err(ConnectError::not_listening("listening stopped while accepting"))
            }
            accepted = Self::accept_on(&listener, session.timeout()) => accepted,
        }
    }

    async fn stop_listening(&self, session: &ListenSession) -> ConnectResult<()> {
        self.check_session(session)?;

        if !session.stop() {
            return Err(ConnectError::not_listening("listening session was already stopped"));
        }

        info!("Stopped listening at {}", session.address());
        Ok(())
    }

    async fn accept_once(&self, arguments: &Arguments) -> ConnectResult<VirtualMachine> {
        arguments.validate()?;
        if arguments.int(ARG_PORT)?.unwrap_or(0) == 0 {
            return Err(ConnectError::illegal(ARG_PORT));
        }

        let listener = Self::bind(arguments).await?;
        info!("Waiting for one target at {}", socket::listen_address(&listener)?);

        Self::accept_on(&listener, to_timeout(arguments.int(ARG_TIMEOUT)?)).await
    }
}
