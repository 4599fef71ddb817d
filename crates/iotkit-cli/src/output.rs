//! Terminal and JSON rendering of command results

use anyhow::Error;
use colored::*;
use serde_json::{Value, json};

fn emit(envelope: &Value) {
    match serde_json::to_string_pretty(envelope) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("JSON rendering failed: {}", e),
    }
}

/// Report a failed command, including every cause in the chain
pub fn print_error(json: bool, error: &Error, exit_code: u8) {
    if json {
        let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        emit(&json!({
            "success": false,
            "exit_code": exit_code,
            "error": { "message": error.to_string(), "causes": causes },
        }));
        return;
    }

    eprintln!("{} {}", "error:".red().bold(), error);
    for cause in error.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".yellow(), cause);
    }
}

/// Print a command result as JSON or as aligned `key: value` lines
pub fn print_value(json: bool, value: &Value) {
    if json {
        emit(&json!({ "success": true, "result": value }));
        return;
    }

    let Some(fields) = value.as_object() else {
        println!("{}", value);
        return;
    };
    let width = fields.keys().map(String::len).max().unwrap_or(0);
    for (key, field) in fields {
        match field {
            Value::Array(items) => {
                println!("{:width$}  {}", key.bold(), items.len(), width = width);
                for item in items {
                    println!("{:width$}  - {}", "", human(item), width = width);
                }
            }
            other => println!("{:width$}  {}", key.bold(), human(other), width = width),
        }
    }
}

fn human(value: &Value) -> String {
    match value {
        Value::Null => "-".dimmed().to_string(),
        Value::String(text) => text.clone(),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, field)| format!("{}={}", key, human(field)))
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_formats_objects() {
        let value = json!({ "role": "Firmware", "supported": true });
        assert_eq!(human(&value), "role=Firmware supported=true");
        assert_eq!(human(&json!("v1.2.0")), "v1.2.0");
    }
}
