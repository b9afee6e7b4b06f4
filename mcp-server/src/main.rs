// JDI connector MCP server - attach, launch, and listen for JVMs over MCP
//
// Exposes the debugger connectors as tools so a client can bring a target
// VM under debug without knowing the transport details

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

mod handlers;
mod protocol;
mod session;
mod tools;

use handlers::RequestHandler;
use protocol::*;

async fn write_response<W: AsyncWrite + Unpin>(out: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let response_str = serde_json::to_string(response)?;
    debug!("Sending: {}", response_str);
    out.write_all(response_str.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

/// Single writer so responses from concurrent requests never interleave
fn spawn_writer<W>(mut out: W) -> mpsc::Sender<JsonRpcResponse>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (response_tx, mut response_rx) = mpsc::channel::<JsonRpcResponse>(64);

    tokio::spawn(async move {
        while let Some(response) = response_rx.recv().await {
            if let Err(e) = write_response(&mut out, &response).await {
                error!("Failed to write response: {}", e);
                break;
            }
        }
    });

    response_tx
}

/// Read newline-delimited JSON-RPC until the input closes
///
/// Each request runs in its own task, so a long wait such as debug.accept
/// does not stop the loop from reading the debug.stop_listening that ends it.
async fn serve<R, W>(handler: Arc<RequestHandler>, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let responses = spawn_writer(output);
    let mut reader = BufReader::new(input);

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Client disconnected");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                debug!("Received: {}", line);

                let value = match serde_json::from_str::<Value>(line) {
                    Ok(value) => value,
                    Err(e) => {
                        error!("Parse error: {}", e);
                        let response = JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error");
                        responses.send(response).await?;
                        continue;
                    }
                };

                // Requests carry an id, notifications don't
                if value.get("id").is_some() {
                    match serde_json::from_value::<JsonRpcRequest>(value) {
                        Ok(request) => {
                            let handler = handler.clone();
                            let responses = responses.clone();
                            tokio::spawn(async move {
                                let response = handler.handle_request(request).await;
                                responses.send(response).await.ok();
                            });
                        }
                        Err(e) => {
                            error!("Invalid request: {}", e);
                            let response =
                                JsonRpcResponse::error(Value::Null, INVALID_REQUEST, "Invalid request");
                            responses.send(response).await?;
                        }
                    }
                } else {
                    match serde_json::from_value::<JsonRpcNotification>(value) {
                        Ok(notification) => handler.handle_notification(notification).await,
                        Err(e) => error!("Invalid notification: {}", e),
                    }
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing to stderr only - stdout is reserved for JSON-RPC protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jdi_connect_mcp=info".parse()?)
                .add_directive("jdi_connect=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting JDI connector MCP server...");

    let handler = Arc::new(RequestHandler::new());

    info!("Ready, waiting for requests...");
    serve(handler, tokio::io::stdin(), tokio::io::stdout()).await?;

    info!("JDI connector MCP server shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, DuplexStream, Lines};

    async fn send(client: &mut DuplexStream, request: Value) {
        let mut line = serde_json::to_vec(&request).unwrap();
        line.push(b'\n');
        client.write_all(&line).await.unwrap();
    }

    async fn next_response(lines: &mut Lines<BufReader<DuplexStream>>) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .expect("response within deadline")
            .unwrap()
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn tool_call(id: u64, name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
    }

    #[tokio::test]
    async fn test_pending_accept_does_not_block_stop_listening() {
        let (mut requests, server_in) = tokio::io::duplex(4096);
        let (server_out, client_out) = tokio::io::duplex(4096);
        let mut responses = BufReader::new(client_out).lines();

        tokio::spawn(serve(Arc::new(RequestHandler::new()), server_in, server_out));

        send(&mut requests, tool_call(1, "debug.listen", json!({}))).await;
        let listening = next_response(&mut responses).await;
        let text = listening["result"]["content"][0]["text"].as_str().unwrap();
        let listener_id = text
            .split("(listener: ")
            .nth(1)
            .and_then(|rest| rest.split(')').next())
            .unwrap()
            .to_string();

        // No timeout: this only returns once the listener is stopped
        send(&mut requests, tool_call(2, "debug.accept", json!({ "listener_id": listener_id }))).await;
        send(&mut requests, tool_call(3, "debug.stop_listening", json!({ "listener_id": listener_id }))).await;

        let mut answered = Vec::new();
        for _ in 0..2 {
            let response = next_response(&mut responses).await;
            let is_error = response["result"].get("isError").is_some();
            answered.push((response["id"].as_u64().unwrap(), is_error));
        }
        answered.sort();

        assert_eq!(answered, [(2, true), (3, false)]);
    }

    #[tokio::test]
    async fn test_parse_error_is_answered() {
        let (mut requests, server_in) = tokio::io::duplex(1024);
        let (server_out, client_out) = tokio::io::duplex(1024);
        let mut responses = BufReader::new(client_out).lines();

        tokio::spawn(serve(Arc::new(RequestHandler::new()), server_in, server_out));

        requests.write_all(b"{not json\n").await.unwrap();
        let response = next_response(&mut responses).await;
        assert_eq!(response["error"]["code"], PARSE_ERROR);
    }
}
