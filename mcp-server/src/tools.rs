// Tool schema definitions
//
// Connector arguments are passed through as a free-form object: the
// connectors describe their own arguments, see connectors.list.

use crate::protocol::Tool;
use serde_json::{json, Value};

fn connector_call_schema(default_connector: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "connector": {
                "type": "string",
                "description": "Connector name from connectors.list",
                "default": default_connector
            },
            "arguments": {
                "type": "object",
                "description": "Argument values by name; strings, numbers and booleans are accepted",
                "additionalProperties": { "type": ["string", "integer", "boolean"] }
            }
        }
    })
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn get_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "connectors.list".to_string(),
            description: "List connectors with their argument names, types, bounds and defaults"
                .to_string(),
            input_schema: no_params(),
        },
        Tool {
            name: "debug.attach".to_string(),
            description: "Attach to a JVM that is listening for a debugger".to_string(),
            input_schema: connector_call_schema("com.sun.jdi.SocketAttach"),
        },
        Tool {
            name: "debug.launch".to_string(),
            description: "Launch a JVM under the debugger; its output goes to the server log"
                .to_string(),
            input_schema: connector_call_schema("com.sun.jdi.CommandLineLaunch"),
        },
        Tool {
            name: "debug.listen".to_string(),
            description: "Start listening for JVMs that connect in; returns the address to give the target"
                .to_string(),
            input_schema: connector_call_schema("com.sun.jdi.SocketListen"),
        },
        Tool {
            name: "debug.accept".to_string(),
            description: "Wait for one JVM to connect to a listener".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "listener_id": {
                        "type": "string",
                        "description": "Listener ID returned by debug.listen"
                    }
                },
                "required": ["listener_id"]
            }),
        },
        Tool {
            name: "debug.stop_listening".to_string(),
            description: "Stop a listener and release its address".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "listener_id": {
                        "type": "string",
                        "description": "Listener ID returned by debug.listen"
                    }
                },
                "required": ["listener_id"]
            }),
        },
        Tool {
            name: "debug.vm_version".to_string(),
            description: "Show the connected VM's version".to_string(),
            input_schema: no_params(),
        },
        Tool {
            name: "debug.resume".to_string(),
            description: "Resume all threads in the connected VM".to_string(),
            input_schema: no_params(),
        },
        Tool {
            name: "debug.disconnect".to_string(),
            description: "Detach from the current VM".to_string(),
            input_schema: no_params(),
        },
    ]
}
