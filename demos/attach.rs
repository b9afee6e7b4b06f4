// Attach to a JVM started with
//   java -agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address=5005 ...
//
// Usage: cargo run --example attach -- [host] [port]

use jdi_connect::ConnectorManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("jdi_connect=debug")
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = args.next().unwrap_or_else(|| "5005".to_string());

    let manager = ConnectorManager::new();
    let connector = manager
        .attaching_connector("com.sun.jdi.SocketAttach")
        .ok_or_else(|| anyhow::anyhow!("socket attach connector missing"))?;

    let mut arguments = connector.default_arguments();
    arguments.set("hostname", host)?;
    arguments.set("port", port)?;
    arguments.set("timeout", "5000")?;

    let mut vm = connector.attach(&arguments).await?;
    println!("✓ Attached to {:?}", vm.remote_address());

    let version = vm.version().await?;
    println!("  VM: {} {}", version.vm_name, version.vm_version);
    println!("  JDWP: {}.{}", version.jdwp_major, version.jdwp_minor);

    vm.dispose().await?;
    println!("✓ Detached");

    Ok(())
}
