// Launch a JVM under the debugger and wait for it to start
//
// Usage: cargo run --example launch -- <main class> [options]

use jdi_connect::ConnectorManager;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("jdi_connect=info")
        .init();

    let mut args = std::env::args().skip(1);
    let main_class = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: launch <main class> [options]"))?;
    let options = args.collect::<Vec<_>>().join(" ");

    let manager = ConnectorManager::new();
    let connector = manager
        .default_connector()
        .ok_or_else(|| anyhow::anyhow!("no launching connector"))?;

    let mut arguments = connector.default_arguments();
    arguments.set("main", main_class)?;
    arguments.set("options", options)?;

    let mut vm = connector.launch(&arguments).await?;
    let process = vm
        .process_mut()
        .ok_or_else(|| anyhow::anyhow!("launched session has no process"))?;

    // The target blocks if nobody reads its output
    if let Some(stdout) = process.take_stdout() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                println!("[target] {}", line);
            }
        });
    }
    if let Some(stderr) = process.take_stderr() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                eprintln!("[target] {}", line);
            }
        });
    }

    vm.wait_for_start().await?;
    println!("✓ Target started, resuming");
    vm.resume().await?;

    while let Some(events) = vm.recv_event().await {
        if events.contains_vm_death() {
            break;
        }
    }

    if let Some(mut process) = vm.take_process() {
        println!("✓ Target exited: {}", process.wait().await?);
    }

    Ok(())
}
