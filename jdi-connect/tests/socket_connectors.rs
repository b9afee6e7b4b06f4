// End-to-end connector tests against fake targets on loopback sockets
//
// A fake target only speaks the handshake: it reads the debugger's 14 bytes
// and echoes them back, then holds the socket open.

use jdi_connect::protocol::JDWP_HANDSHAKE;
use jdi_connect::{
    AttachingConnector, ConnectError, ConnectorManager, LaunchingConnector, ListeningConnector,
    Transport,
};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SOCKET_ATTACH: &str = "com.sun.jdi.SocketAttach";
const SOCKET_LISTEN: &str = "com.sun.jdi.SocketListen";
const RAW_LAUNCH: &str = "com.sun.jdi.RawCommandLineLaunch";

async fn echo_handshake(stream: &mut TcpStream) {
    let mut buf = [0u8; 14];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, JDWP_HANDSHAKE);
    stream.write_all(&buf).await.unwrap();
}

/// A target started with server=y: listens, accepts one debugger
async fn listening_target() -> (u16, tokio::task::JoinHandle<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        echo_handshake(&mut stream).await;
        stream
    });

    (port, task)
}

/// A target started with server=n: connects to the debugger, retrying until it listens
async fn connecting_target(address: String) -> TcpStream {
    loop {
        match TcpStream::connect(&address).await {
            Ok(mut stream) => {
                echo_handshake(&mut stream).await;
                return stream;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_attach_to_listening_target() {
    let (port, target) = listening_target().await;

    let connector = ConnectorManager::new().attaching_connector(SOCKET_ATTACH).unwrap();
    let mut arguments = connector.default_arguments();
    arguments.set("hostname", "127.0.0.1").unwrap();
    arguments.set("port", port.to_string()).unwrap();
    arguments.set("timeout", "2000").unwrap();

    let vm = connector.attach(&arguments).await.unwrap();
    assert_eq!(vm.connector_name(), SOCKET_ATTACH);
    assert_eq!(vm.transport(), Transport::Socket);
    assert_eq!(vm.remote_address().unwrap().port(), port);
    assert!(vm.process().is_none());

    drop(target.await.unwrap());
}

#[tokio::test]
async fn test_attach_to_silent_target_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // Accepts but never answers the handshake
    let silent = tokio::spawn(async move { listener.accept().await.unwrap().0 });

    let connector = ConnectorManager::new().attaching_connector(SOCKET_ATTACH).unwrap();
    let mut arguments = connector.default_arguments();
    arguments.set("hostname", "127.0.0.1").unwrap();
    arguments.set("port", port.to_string()).unwrap();
    arguments.set("timeout", "100").unwrap();

    let err = connector.attach(&arguments).await.unwrap_err();
    assert!(err.is_timeout(), "{:?}", err);
    assert!(err.is_io());

    drop(silent.await.unwrap());
}

#[tokio::test]
async fn test_listen_address_round_trip() {
    let manager = ConnectorManager::new();
    let listen = manager.listening_connector(SOCKET_LISTEN).unwrap();
    let attach = manager.attaching_connector(SOCKET_ATTACH).unwrap();

    let session = listen
        .start_listening(&listen.default_arguments())
        .await
        .unwrap();
    assert!(!session.address().is_empty());

    let (host, port) = session.address().rsplit_once(':').unwrap();
    let mut arguments = attach.default_arguments();
    arguments.set("hostname", host).unwrap();
    arguments.set("port", port).unwrap();

    let accepting = {
        let listen = listen.clone();
        let session = session.clone();
        tokio::spawn(async move { listen.accept(&session).await })
    };

    // Both ends speak the debugger side of the handshake, which is symmetric
    let attached = attach.attach(&arguments).await.unwrap();
    let accepted = accepting.await.unwrap().unwrap();

    assert_eq!(accepted.connector_name(), SOCKET_LISTEN);
    assert_eq!(attached.remote_address().unwrap().to_string(), session.address());

    listen.stop_listening(&session).await.unwrap();
}

#[tokio::test]
async fn test_listening_accepts_multiple_targets() {
    let connector = ConnectorManager::new().listening_connector(SOCKET_LISTEN).unwrap();
    assert!(connector.supports_multiple_connections());

    let session = connector
        .start_listening(&connector.default_arguments())
        .await
        .unwrap();

    let first = tokio::spawn(connecting_target(session.address().to_string()));
    let vm1 = connector.accept(&session).await.unwrap();
    let second = tokio::spawn(connecting_target(session.address().to_string()));
    let vm2 = connector.accept(&session).await.unwrap();

    assert_ne!(vm1.remote_address(), vm2.remote_address());
    drop((first.await.unwrap(), second.await.unwrap()));

    connector.stop_listening(&session).await.unwrap();
}

#[tokio::test]
async fn test_accept_after_stop_fails_fast() {
    let connector = ConnectorManager::new().listening_connector(SOCKET_LISTEN).unwrap();
    let session = connector
        .start_listening(&connector.default_arguments())
        .await
        .unwrap();

    connector.stop_listening(&session).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), connector.accept(&session))
        .await
        .expect("accept after stop must not block");

    match result {
        Err(ConnectError::Io(e)) => assert_eq!(e.kind(), ErrorKind::NotConnected),
        other => panic!("expected NotConnected, got {:?}", other),
    }

    // The address is released
    let (_, port) = session.address().rsplit_once(':').unwrap();
    TcpListener::bind(("127.0.0.1", port.parse::<u16>().unwrap()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stop_wakes_pending_accept() {
    let connector = ConnectorManager::new().listening_connector(SOCKET_LISTEN).unwrap();
    let session = connector
        .start_listening(&connector.default_arguments())
        .await
        .unwrap();

    let pending = {
        let connector = connector.clone();
        let session = session.clone();
        tokio::spawn(async move { connector.accept(&session).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    connector.stop_listening(&session).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .unwrap()
        .unwrap();
    assert!(result.unwrap_err().is_io());
}

#[tokio::test]
async fn test_accept_once_on_concrete_port() {
    let connector = ConnectorManager::new().listening_connector(SOCKET_LISTEN).unwrap();
    let port = free_port();

    let mut arguments = connector.default_arguments();
    arguments.set("port", port.to_string()).unwrap();
    arguments.set("timeout", "5000").unwrap();

    let target = tokio::spawn(connecting_target(format!("127.0.0.1:{}", port)));
    let vm = connector.accept_once(&arguments).await.unwrap();

    assert_eq!(vm.connector_name(), SOCKET_LISTEN);
    drop(target.await.unwrap());
}

#[cfg(unix)]
#[tokio::test]
async fn test_undrained_target_output_stalls_target() {
    const OUTPUT_BYTES: usize = 1024 * 1024;

    let connector = ConnectorManager::new().launching_connector(RAW_LAUNCH).unwrap();
    let address = format!("127.0.0.1:{}", free_port());

    let mut arguments = connector.default_arguments();
    arguments
        .set(
            "command",
            format!("sh -c \"head -c {} /dev/zero; echo finished >&2\"", OUTPUT_BYTES),
        )
        .unwrap();
    arguments.set("address", address.clone()).unwrap();

    let target = tokio::spawn(connecting_target(address));
    let mut vm = connector.launch(&arguments).await.unwrap();
    let _socket = target.await.unwrap();

    let process = vm.process_mut().expect("launched session carries its process");

    // Far more than a pipe buffer holds; with nobody reading, the writer blocks
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(process.try_wait().unwrap().is_none(), "target should be stalled");

    let mut stdout = process.take_stdout().unwrap();
    let mut stderr = process.take_stderr().unwrap();
    let mut out = Vec::new();
    let mut err = String::new();
    stdout.read_to_end(&mut out).await.unwrap();
    stderr.read_to_string(&mut err).await.unwrap();

    assert_eq!(out.len(), OUTPUT_BYTES);
    assert_eq!(err, "finished\n");
    assert!(process.wait().await.unwrap().success());
}
