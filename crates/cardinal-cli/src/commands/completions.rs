//! Shell completions command

use std::fs::File;
use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

use crate::Cli;

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script to a file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &CompletionsArgs) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    match &args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            generate(args.shell, &mut cmd, bin, &mut file);
            tracing::info!("Wrote {} completions to {}", args.shell, path.display());
        }
        None => generate(args.shell, &mut cmd, bin, &mut io::stdout()),
    }
    Ok(())
}
