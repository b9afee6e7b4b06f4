// MCP request handlers
//
// Handles initialize, list tools, and connector tool execution

use crate::protocol::*;
use crate::session::SessionManager;
use crate::tools;
use jdi_connect::{Argument, Arguments, ConnectError, ConnectorManager};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_ATTACH: &str = "com.sun.jdi.SocketAttach";
const DEFAULT_LISTEN: &str = "com.sun.jdi.SocketListen";

pub struct RequestHandler {
    connectors: ConnectorManager,
    session_manager: SessionManager,
}

fn internal_error(e: serde_json::Error) -> JsonRpcError {
    JsonRpcError {
        code: INTERNAL_ERROR,
        message: format!("Failed to encode result: {}", e),
        data: None,
    }
}

fn invalid_params(what: &str, e: serde_json::Error) -> JsonRpcError {
    JsonRpcError {
        code: INVALID_PARAMS,
        message: format!("Invalid {} params: {}", what, e),
        data: None,
    }
}

fn connector_name<'a>(args: &'a Value, default: &'a str) -> &'a str {
    args.get("connector")
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

/// Apply the tool call's `arguments` object onto a connector's defaults
fn prepare_arguments(mut arguments: Arguments, args: &Value) -> Result<Arguments, String> {
    let values = match args.get("arguments") {
        None | Some(Value::Null) => return Ok(arguments),
        Some(Value::Object(values)) => values,
        Some(_) => return Err("'arguments' must be an object".to_string()),
    };

    let mut pairs = Vec::with_capacity(values.len());
    for (name, value) in values {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => Argument::string_value_of(*b).to_string(),
            _ => return Err(format!("Unsupported value for argument '{}'", name)),
        };
        pairs.push((name.as_str(), text));
    }

    arguments
        .apply(pairs)
        .map_err(|e| format!("{}. Use connectors.list to see accepted values.", e))?;
    Ok(arguments)
}

async fn read_leftover<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut bytes = Vec::new();
    // The target has exited, so this only picks up what is already in the pipe
    match tokio::time::timeout(Duration::from_millis(500), stream.read_to_end(&mut bytes)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!("Failed reading leftover target output: {}", e),
        Err(_) => debug!("Timed out reading leftover target output after {} bytes", bytes.len()),
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Turn a connector failure into a message the client can act on
async fn describe_failure(err: ConnectError) -> String {
    match err {
        ConnectError::VmStartFailure { mut process, status } => {
            let stderr = read_leftover(process.take_stderr()).await;
            let stdout = read_leftover(process.take_stdout()).await;
            let mut message = format!(
                "Target VM failed to start ({})\n   Command: {}",
                status,
                process.command_line().join(" ")
            );
            for (label, text) in [("stdout", stdout), ("stderr", stderr)] {
                if !text.trim().is_empty() {
                    message.push_str(&format!("\n   {}: {}", label, text.trim()));
                }
            }
            message
        }
        e @ ConnectError::IllegalArguments(_) => {
            format!("{}. Use connectors.list to see accepted values.", e)
        }
        e @ ConnectError::Timeout { .. } => format!("{} (retry with a larger timeout)", e),
        e => format!("Connection failed: {}", e),
    }
}

/// Forward a target's output stream to the server log, line by line
fn drain_output<R>(stream: R, stream_name: &'static str, pid: Option<u32>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => info!(target: "jdi_connect_mcp::target", "[{:?} {}] {}", pid, stream_name, line),
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed reading target {}: {}", stream_name, e);
                    break;
                }
            }
        }
        debug!("Target {} closed", stream_name);
    })
}

impl RequestHandler {
    pub fn new() -> Self {
        Self {
            connectors: ConnectorManager::new(),
            session_manager: SessionManager::new(),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            _ => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", request.method),
                data: None,
            }),
        };

        match result {
            Ok(value) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(error),
            },
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => debug!("Request cancelled"),
            _ => warn!("Unknown notification: {}", notification.method),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let _params: InitializeParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| invalid_params("initialize", e))?;

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {},
            },
            server_info: ServerInfo {
                name: "jdi-connect-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "JVM debug connector server. Use connectors.list to see how each \
                connector is configured, then debug.attach, debug.launch, or \
                debug.listen followed by debug.accept."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(internal_error)
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: tools::get_tools(),
        };

        serde_json::to_value(result).map_err(internal_error)
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let call_params: CallToolParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| invalid_params("tool call", e))?;

        let args = call_params.arguments;
        let result = match call_params.name.as_str() {
            "connectors.list" => self.handle_list_connectors(),
            "debug.attach" => self.handle_attach(args).await,
            "debug.launch" => self.handle_launch(args).await,
            "debug.listen" => self.handle_listen(args).await,
            "debug.accept" => self.handle_accept(args).await,
            "debug.stop_listening" => self.handle_stop_listening(args).await,
            "debug.vm_version" => self.handle_vm_version().await,
            "debug.resume" => self.handle_resume().await,
            "debug.disconnect" => self.handle_disconnect().await,
            _ => Err(format!("Unknown tool: {}", call_params.name)),
        };

        let call_result = match result {
            Ok(text) => CallToolResult {
                content: vec![ContentBlock::Text { text }],
                is_error: None,
            },
            Err(text) => CallToolResult {
                content: vec![ContentBlock::Text { text }],
                is_error: Some(true),
            },
        };

        serde_json::to_value(call_result).map_err(internal_error)
    }

    fn handle_list_connectors(&self) -> Result<String, String> {
        let infos: Vec<_> = self
            .connectors
            .all_connectors()
            .iter()
            .map(|c| c.info())
            .collect();

        serde_json::to_string_pretty(&infos).map_err(|e| format!("Failed to render connectors: {}", e))
    }

    async fn handle_attach(&self, args: Value) -> Result<String, String> {
        let name = connector_name(&args, DEFAULT_ATTACH);
        let connector = self
            .connectors
            .attaching_connector(name)
            .ok_or_else(|| format!("Unknown attaching connector: {}", name))?;

        let arguments = prepare_arguments(connector.default_arguments(), &args)?;
        let vm = match connector.attach(&arguments).await {
            Ok(vm) => vm,
            Err(e) => return Err(describe_failure(e).await),
        };

        let remote = vm.remote_address();
        let session_id = self.session_manager.create_session(vm, Vec::new()).await;
        Ok(format!(
            "Attached to {:?} via {} (session: {})",
            remote, name, session_id
        ))
    }

    async fn handle_launch(&self, args: Value) -> Result<String, String> {
        let connector = match args.get("connector").and_then(|v| v.as_str()) {
            Some(name) => self.connectors.launching_connector(name),
            None => self.connectors.default_connector(),
        }
        .ok_or_else(|| "Unknown launching connector".to_string())?;

        let arguments = prepare_arguments(connector.default_arguments(), &args)?;
        let mut vm = match connector.launch(&arguments).await {
            Ok(vm) => vm,
            Err(e) => return Err(describe_failure(e).await),
        };

        // stdout is the protocol channel, so target output goes to the log
        let mut drains = Vec::new();
        let mut pid = None;
        if let Some(process) = vm.process_mut() {
            pid = process.id();
            if let Some(stdout) = process.take_stdout() {
                drains.push(drain_output(stdout, "stdout", pid));
            }
            if let Some(stderr) = process.take_stderr() {
                drains.push(drain_output(stderr, "stderr", pid));
            }
        }

        let session_id = self.session_manager.create_session(vm, drains).await;
        Ok(format!(
            "Launched target via {} (pid: {:?}, session: {})\n   The VM may still be starting; it is suspended if 'suspend' was true. Use debug.resume to run it.",
            connector.name(),
            pid,
            session_id
        ))
    }

    async fn handle_listen(&self, args: Value) -> Result<String, String> {
        let name = connector_name(&args, DEFAULT_LISTEN);
        let connector = self
            .connectors
            .listening_connector(name)
            .ok_or_else(|| format!("Unknown listening connector: {}", name))?;

        let arguments = prepare_arguments(connector.default_arguments(), &args)?;
        let session = match connector.start_listening(&arguments).await {
            Ok(session) => session,
            Err(e) => return Err(describe_failure(e).await),
        };

        let address = session.address().to_string();
        let listener_id = self.session_manager.add_listener(name, session).await;
        Ok(format!(
            "Listening at {} (listener: {})\n   Start the target with -agentlib:jdwp=transport=dt_socket,server=n,address={}",
            address, listener_id, address
        ))
    }

    async fn handle_accept(&self, args: Value) -> Result<String, String> {
        let listener_id = args
            .get("listener_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing 'listener_id' parameter".to_string())?;

        let listener = self
            .session_manager
            .get_listener(listener_id)
            .await
            .ok_or_else(|| format!("Listener not found: {}", listener_id))?;
        let connector = self
            .connectors
            .listening_connector(&listener.connector)
            .ok_or_else(|| format!("Unknown listening connector: {}", listener.connector))?;

        let vm = match connector.accept(&listener.session).await {
            Ok(vm) => vm,
            Err(e) => return Err(describe_failure(e).await),
        };

        let remote = vm.remote_address();
        let session_id = self.session_manager.create_session(vm, Vec::new()).await;
        Ok(format!(
            "Target connected from {:?} (session: {})",
            remote, session_id
        ))
    }

    async fn handle_stop_listening(&self, args: Value) -> Result<String, String> {
        let listener_id = args
            .get("listener_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing 'listener_id' parameter".to_string())?;

        let listener = self
            .session_manager
            .remove_listener(listener_id)
            .await
            .ok_or_else(|| format!("Listener not found: {}", listener_id))?;
        let connector = self
            .connectors
            .listening_connector(&listener.connector)
            .ok_or_else(|| format!("Unknown listening connector: {}", listener.connector))?;

        match connector.stop_listening(&listener.session).await {
            Ok(()) => Ok(format!("Stopped listening at {}", listener.session.address())),
            Err(e) => Err(describe_failure(e).await),
        }
    }

    async fn handle_vm_version(&self) -> Result<String, String> {
        let session_guard = self
            .session_manager
            .get_current_session()
            .await
            .ok_or_else(|| "No active debug session".to_string())?;
        let mut session = session_guard.lock().await;

        let version = session
            .vm_mut()?
            .version()
            .await
            .map_err(|e| format!("Failed to get version: {}", e))?;

        Ok(format!(
            "{} {}\n   {}\n   JDWP {}.{}",
            version.vm_name,
            version.vm_version,
            version.description,
            version.jdwp_major,
            version.jdwp_minor
        ))
    }

    async fn handle_resume(&self) -> Result<String, String> {
        let session_guard = self
            .session_manager
            .get_current_session()
            .await
            .ok_or_else(|| "No active debug session".to_string())?;
        let mut session = session_guard.lock().await;

        session
            .vm_mut()?
            .resume()
            .await
            .map_err(|e| format!("Failed to resume: {}", e))?;

        Ok("Resumed all threads".to_string())
    }

    async fn handle_disconnect(&self) -> Result<String, String> {
        let session_id = self
            .session_manager
            .get_current_session_id()
            .await
            .ok_or_else(|| "No active debug session".to_string())?;

        let session = self
            .session_manager
            .remove_session(&session_id)
            .await
            .ok_or_else(|| format!("Session not found: {}", session_id))?;
        let mut session = session.lock().await;
        let drains = std::mem::take(&mut session.output_drains);
        let mut vm = session
            .vm
            .take()
            .ok_or_else(|| format!("Session {} is already disconnected", session_id))?;
        drop(session);

        let process = vm.take_process();
        let detached = vm.dispose().await;

        for drain in drains {
            drain.abort();
        }
        // A launched target does not outlive the debugger that started it
        let mut terminated = "";
        if let Some(mut process) = process {
            process.kill().await.ok();
            terminated = "\n   Launched target terminated";
        }

        match detached {
            Ok(_) => Ok(format!("Disconnected session {}{}", session_id, terminated)),
            Err(e) => Err(format!(
                "Session {} removed, but the target did not acknowledge the detach: {}{}",
                session_id, e, terminated
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn call(handler: &RequestHandler, name: &str, arguments: Value) -> (bool, String) {
        let response = handler
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: json!(1),
                method: "tools/call".to_string(),
                params: Some(json!({ "name": name, "arguments": arguments })),
            })
            .await;

        let result = response.result.expect("tool calls always produce a result");
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        (result.get("isError").is_some(), text)
    }

    fn listener_id_from(text: &str) -> String {
        text.split("(listener: ")
            .nth(1)
            .and_then(|rest| rest.split(')').next())
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let handler = RequestHandler::new();
        let response = handler
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: json!(7),
                method: "resources/list".to_string(),
                params: None,
            })
            .await;

        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_connectors_list_renders_schemas() {
        let handler = RequestHandler::new();
        let (is_error, text) = call(&handler, "connectors.list", json!({})).await;
        assert!(!is_error);

        let connectors: Value = serde_json::from_str(&text).unwrap();
        let connectors = connectors.as_array().unwrap();
        assert_eq!(connectors.len(), 4);
        assert_eq!(connectors[0]["name"], "com.sun.jdi.CommandLineLaunch");
        assert_eq!(connectors[0]["arguments"]["suspend"]["type"], "boolean");
    }

    #[tokio::test]
    async fn test_attach_reports_argument_names() {
        let handler = RequestHandler::new();

        let (is_error, text) = call(&handler, "debug.attach", json!({})).await;
        assert!(is_error);
        assert!(text.contains("Illegal connector arguments: port"), "{}", text);

        let (is_error, text) = call(
            &handler,
            "debug.attach",
            json!({ "arguments": { "port": 70000, "hostname": "localhost", "nope": true } }),
        )
        .await;
        assert!(is_error);
        assert!(text.contains("nope") && text.contains("port"), "{}", text);
        assert!(!text.contains("hostname"), "{}", text);
    }

    #[tokio::test]
    async fn test_listen_accept_stop() {
        let handler = RequestHandler::new();

        let (is_error, text) = call(&handler, "debug.listen", json!({ "arguments": { "timeout": 5000 } })).await;
        assert!(!is_error, "{}", text);

        let listener_id = listener_id_from(&text);
        let address = text
            .split_whitespace()
            .nth(2)
            .unwrap()
            .to_string();

        let target = tokio::spawn(async move {
            let mut stream = TcpStream::connect(address).await.unwrap();
            let mut buf = [0u8; 14];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
            stream
        });

        let (is_error, text) = call(&handler, "debug.accept", json!({ "listener_id": listener_id })).await;
        assert!(!is_error, "{}", text);
        assert!(text.contains("session_"));
        drop(target.await.unwrap());

        let (is_error, _) = call(&handler, "debug.stop_listening", json!({ "listener_id": listener_id })).await;
        assert!(!is_error);

        let (is_error, text) = call(&handler, "debug.accept", json!({ "listener_id": listener_id })).await;
        assert!(is_error);
        assert!(text.contains("Listener not found"));
    }

    #[tokio::test]
    async fn test_session_tools_need_a_session() {
        let handler = RequestHandler::new();
        for tool in ["debug.vm_version", "debug.resume", "debug.disconnect"] {
            let (is_error, text) = call(&handler, tool, json!({})).await;
            assert!(is_error);
            assert_eq!(text, "No active debug session");
        }
    }

    #[tokio::test]
    async fn test_stop_listening_wakes_pending_accept() {
        let handler = Arc::new(RequestHandler::new());
        let (is_error, text) = call(&handler, "debug.listen", json!({})).await;
        assert!(!is_error, "{}", text);
        let listener_id = listener_id_from(&text);

        let pending = {
            let handler = handler.clone();
            let listener_id = listener_id.clone();
            tokio::spawn(async move {
                call(&handler, "debug.accept", json!({ "listener_id": listener_id })).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let (is_error, _) = call(&handler, "debug.stop_listening", json!({ "listener_id": listener_id })).await;
        assert!(!is_error);

        let (is_error, text) = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("stop_listening must wake the accept")
            .unwrap();
        assert!(is_error);
        assert!(text.starts_with("Connection failed"), "{}", text);
    }

    #[tokio::test]
    async fn test_disconnect_from_dead_target_removes_session() {
        let handler = RequestHandler::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Handshakes, then goes away before the debugger detaches
        let target = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 14];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let (is_error, text) = call(
            &handler,
            "debug.attach",
            json!({ "arguments": { "hostname": "127.0.0.1", "port": port } }),
        )
        .await;
        assert!(!is_error, "{}", text);
        target.await.unwrap();

        let (is_error, text) = call(&handler, "debug.disconnect", json!({})).await;
        assert!(is_error);
        assert!(text.contains("removed"), "{}", text);

        let (_, text) = call(&handler, "debug.vm_version", json!({})).await;
        assert_eq!(text, "No active debug session");
    }

    #[tokio::test]
    async fn test_leftover_output_keeps_undecodable_bytes() {
        let raw: &[u8] = b"\xffboom";
        let text = read_leftover(Some(raw)).await;
        assert!(text.ends_with("boom"), "{}", text);
        assert_eq!(read_leftover(None::<&[u8]>).await, "");
    }
}
