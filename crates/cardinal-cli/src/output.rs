//! Output formatting utilities

use cardinal_core::{Node, Properties, Relationship};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Render `data` as pretty JSON, or through `table` for human output
pub fn format_output<T: Serialize>(
    data: &T,
    format: OutputFormat,
    table: impl FnOnce(&T) -> String,
) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => table(data),
    }
}

/// `{result_count, result}` envelope, the same shape the REST listing uses
#[derive(Debug, Serialize)]
pub struct Listing<'a, T> {
    pub result_count: usize,
    pub result: &'a [T],
}

impl<'a, T> Listing<'a, T> {
    pub fn of(result: &'a [T]) -> Self {
        Self {
            result_count: result.len(),
            result,
        }
    }
}

fn properties(props: &Properties) -> String {
    let mut pairs: Vec<String> = props.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    pairs.join(" ")
}

pub fn node_line(node: &Node) -> String {
    let line = format!("{}  {}", node.id, node.node_type);
    if node.properties.is_empty() {
        line
    } else {
        format!("{}  {}", line, properties(&node.properties))
    }
}

pub fn relationship_line(rel: &Relationship) -> String {
    let line = format!("{}  {} -[{}]-> {}", rel.id, rel.source, rel.rel_type, rel.target);
    if rel.properties.is_empty() {
        line
    } else {
        format!("{}  {}", line, properties(&rel.properties))
    }
}

/// Parse `key=value` pairs. Values that parse as JSON keep their type,
/// anything else is a string.
pub fn parse_properties(pairs: &[String]) -> anyhow::Result<Properties> {
    let mut props = Properties::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("Invalid property '{}', expected key=value", pair);
        };
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        props.insert(key.trim().to_string(), value);
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_properties() {
        let props = parse_properties(&[
            "name=report".to_string(),
            "size=42".to_string(),
            "draft=true".to_string(),
        ])
        .unwrap();
        assert_eq!(props["name"], json!("report"));
        assert_eq!(props["size"], json!(42));
        assert_eq!(props["draft"], json!(true));
        assert!(parse_properties(&["oops".to_string()]).is_err());
    }
}
