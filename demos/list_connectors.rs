// Print every connector and its argument schema

use jdi_connect::{ArgumentKind, ConnectorManager};

fn main() {
    let manager = ConnectorManager::new();

    for connector in manager.all_connectors() {
        println!("{} ({}, {})", connector.name(), connector.kind(), connector.transport());
        println!("  {}", connector.description());

        for arg in connector.default_arguments().iter() {
            let kind = match arg.kind() {
                ArgumentKind::String => "string".to_string(),
                ArgumentKind::Boolean => "boolean".to_string(),
                ArgumentKind::Integer { min, max } => format!("integer {}..={}", min, max),
                ArgumentKind::Selected { choices } => format!("one of {}", choices.join("|")),
            };
            println!(
                "  {}{:<14} {:<24} default={:?}",
                if arg.must_specify() { "*" } else { " " },
                arg.name(),
                kind,
                arg.value().unwrap_or("")
            );
        }
        println!();
    }
}
