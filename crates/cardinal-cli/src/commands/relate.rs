//! Relationship commands

use clap::{Args, Subcommand};

use crate::output::{format_output, parse_properties, relationship_line, OutputFormat};
use crate::{AppContext, Cli};
use cardinal_core::{NodeId, RelationshipId};

#[derive(Args)]
pub struct RelateArgs {
    #[command(subcommand)]
    pub command: RelateCommands,
}

#[derive(Subcommand)]
pub enum RelateCommands {
    /// Relate two nodes, replacing edges the type's cardinality forbids
    Add {
        /// Relationship type
        r#type: String,
        /// Source node id
        source: String,
        /// Target node id
        target: String,
        /// Property as key=value (repeatable)
        #[arg(long = "prop")]
        props: Vec<String>,
    },
    /// Delete a relationship
    Delete {
        /// Relationship id
        id: String,
    },
}

fn node_id(role: &str, id: &str) -> anyhow::Result<NodeId> {
    NodeId::from_string(id).map_err(|e| anyhow::anyhow!("Invalid {} id '{}': {}", role, id, e))
}

pub async fn run(args: &RelateArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let format = OutputFormat::from(cli.format.as_str());

    match &args.command {
        RelateCommands::Add {
            r#type,
            source,
            target,
            props,
        } => {
            let source = node_id("source", source)?;
            let target = node_id("target", target)?;
            let properties = parse_properties(props)?;

            let mut tx = ctx.engine.begin();
            let rel = match tx.create_or_replace(r#type, source, target, properties).await {
                Ok(rel) => rel,
                Err(e) => {
                    tx.rollback()?;
                    return Err(e.into());
                }
            };
            let outcome = tx.commit().await?;
            let replaced = outcome.receipt.relationships_deleted;
            tracing::info!(
                "Related {} -[{}]-> {} ({} replaced)",
                source,
                r#type,
                target,
                replaced
            );

            let out = format_output(&rel, format, |r| {
                let mut text = format!("Related {}", relationship_line(r));
                if replaced > 0 {
                    text.push_str(&format!("\n  replaced {} existing relationship(s)", replaced));
                }
                text
            });
            println!("{}", out);
        }
        RelateCommands::Delete { id } => {
            let rel_id = RelationshipId::from_string(id)
                .map_err(|e| anyhow::anyhow!("Invalid relationship id '{}': {}", id, e))?;
            let mut tx = ctx.engine.begin();
            if !tx.delete_relationship(rel_id).await? {
                tx.rollback()?;
                anyhow::bail!("Relationship {} not found", id);
            }
            tx.commit().await?;
            println!("Deleted relationship {}", id);
        }
    }

    Ok(())
}
