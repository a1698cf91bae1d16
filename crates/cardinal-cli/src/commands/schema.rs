//! Schema commands

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use serde_json::json;

use crate::config::Config;
use crate::output::{format_output, OutputFormat};
use crate::Cli;
use cardinal_core::Schema;

#[derive(Args)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommands,
}

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// List declared node and relationship types
    List,
    /// Validate a schema file
    Check {
        /// Schema file (defaults to the configured schema)
        path: Option<PathBuf>,
    },
}

fn load(path: &Path) -> anyhow::Result<Schema> {
    Schema::load(path).with_context(|| format!("Invalid schema {}", path.display()))
}

pub fn run(args: &SchemaArgs, cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let format = OutputFormat::from(cli.format.as_str());

    match &args.command {
        SchemaCommands::List => {
            let schema = load(&cli.schema_path(config)?)?;
            let relationships: Vec<_> = schema
                .relationship_types()
                .into_iter()
                .map(|d| {
                    json!({
                        "name": d.name,
                        "source": d.source_type,
                        "target": d.target_type,
                        "cardinality": d.cardinality(),
                        "autoCreate": d.auto_create,
                    })
                })
                .collect();
            let data = json!({
                "nodes": schema.node_types(),
                "relationships": relationships,
            });

            let out = format_output(&data, format, |_| {
                let mut lines = vec!["Node types:".to_string()];
                for node in schema.node_types() {
                    let caps: Vec<&str> = node.capabilities.iter().map(String::as_str).collect();
                    if caps.is_empty() {
                        lines.push(format!("  {}", node.name));
                    } else {
                        lines.push(format!("  {} [{}]", node.name, caps.join(", ")));
                    }
                }
                lines.push("Relationship types:".to_string());
                for rel in schema.relationship_types() {
                    let auto = if rel.auto_create { " (auto-create)" } else { "" };
                    lines.push(format!(
                        "  {}: {} -> {} {}{}",
                        rel.name,
                        rel.source_type,
                        rel.target_type,
                        rel.cardinality(),
                        auto
                    ));
                }
                lines.join("\n")
            });
            println!("{}", out);
        }
        SchemaCommands::Check { path } => {
            let path = match path {
                Some(path) => path.clone(),
                None => cli.schema_path(config)?,
            };
            let schema = load(&path)?;
            println!(
                "Schema OK: {} node type(s), {} relationship type(s)",
                schema.node_types().len(),
                schema.relationship_types().len()
            );
        }
    }

    Ok(())
}
