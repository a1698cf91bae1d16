//! Node commands

use clap::{Args, Subcommand};

use crate::output::{format_output, node_line, parse_properties, OutputFormat};
use crate::{AppContext, Cli};
use cardinal_core::NodeId;

#[derive(Args)]
pub struct NodeArgs {
    #[command(subcommand)]
    pub command: NodeCommands,
}

#[derive(Subcommand)]
pub enum NodeCommands {
    /// Create a node of a declared type
    Create {
        /// Node type
        r#type: String,
        /// Property as key=value (repeatable)
        #[arg(long = "prop")]
        props: Vec<String>,
    },
    /// Show a node
    Get {
        /// Node id
        id: String,
    },
}

pub async fn run(args: &NodeArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let format = OutputFormat::from(cli.format.as_str());

    match &args.command {
        NodeCommands::Create { r#type, props } => {
            let properties = parse_properties(props)?;
            let mut tx = ctx.engine.begin();
            let node = match tx.create_node(r#type, properties).await {
                Ok(node) => node,
                Err(e) => {
                    tx.rollback()?;
                    return Err(e.into());
                }
            };
            tx.commit().await?;
            tracing::info!("Created {} node {}", r#type, node.id);

            let out = format_output(&node, format, |n| format!("Created {}", node_line(n)));
            println!("{}", out);
        }
        NodeCommands::Get { id } => {
            let node_id = NodeId::from_string(id)
                .map_err(|e| anyhow::anyhow!("Invalid node id '{}': {}", id, e))?;
            match ctx.engine.get_node(&node_id).await? {
                Some(node) => println!("{}", format_output(&node, format, node_line)),
                None => anyhow::bail!("Node {} not found", id),
            }
        }
    }

    Ok(())
}

