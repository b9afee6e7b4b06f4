// Listen for a JVM started with
//   java -agentlib:jdwp=transport=dt_socket,server=n,address=<printed address> ...

use jdi_connect::ConnectorManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("jdi_connect=debug")
        .init();

    let manager = ConnectorManager::new();
    let connector = manager
        .listening_connector("com.sun.jdi.SocketListen")
        .ok_or_else(|| anyhow::anyhow!("socket listen connector missing"))?;

    let session = connector
        .start_listening(&connector.default_arguments())
        .await?;
    println!("Listening at {}", session.address());
    println!(
        "Start the target with -agentlib:jdwp=transport=dt_socket,server=n,address={}",
        session.address()
    );

    let mut vm = connector.accept(&session).await?;
    connector.stop_listening(&session).await?;
    println!("✓ Target connected from {:?}", vm.remote_address());

    let sizes = vm.id_sizes().await?;
    println!("  Object ID size: {} bytes", sizes.object_id_size);

    vm.resume().await?;
    vm.dispose().await?;

    Ok(())
}
