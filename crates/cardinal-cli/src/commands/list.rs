//! Typed listing command

use clap::Args;

use crate::output::{format_output, node_line, relationship_line, Listing, OutputFormat};
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct ListArgs {
    /// Node or relationship type
    pub r#type: String,
}

pub async fn run(args: &ListArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let format = OutputFormat::from(cli.format.as_str());
    let type_name = args.r#type.as_str();

    let out = if ctx.engine.schema().is_relationship_type(type_name) {
        let rels = ctx.engine.relationships_of_type(type_name).await?;
        tracing::info!("Found {} {} relationships", rels.len(), type_name);
        format_output(&Listing::of(&rels), format, |l| {
            table(type_name, l.result.iter().map(relationship_line).collect())
        })
    } else {
        let nodes = ctx.engine.nodes_of_type(type_name).await?;
        tracing::info!("Found {} {} nodes", nodes.len(), type_name);
        format_output(&Listing::of(&nodes), format, |l| {
            table(type_name, l.result.iter().map(node_line).collect())
        })
    };
    println!("{}", out);
    Ok(())
}

fn table(type_name: &str, lines: Vec<String>) -> String {
    if lines.is_empty() {
        return format!("No {} found", type_name);
    }
    let mut out = format!("{} ({} found):", type_name, lines.len());
    for line in lines {
        out.push_str("\n  ");
        out.push_str(&line);
    }
    out
}
