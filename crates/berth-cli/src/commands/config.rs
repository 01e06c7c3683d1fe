//! `berth config`: validate the descriptor and print it normalized.

use anyhow::Context as _;
use clap::{Args, ValueEnum};

use super::Context;

/// Output format of the normalized descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// YAML document.
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Only validate; print nothing on success.
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the service names in start order, one per line.
    #[arg(long, conflicts_with = "quiet")]
    pub services: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Yaml)]
    pub format: Format,
}

/// Executes the `config` command.
///
/// Parses, validates and plans the descriptor, so every load-time error
/// (parse, reference, cycle) surfaces here without starting anything.
///
/// # Errors
///
/// Returns the first load error, or a serialization error.
pub fn execute(ctx: &Context, args: &ConfigArgs) -> anyhow::Result<()> {
    let path = ctx.descriptor_path()?;
    let plan = berth_compose::load_file(&path)
        .with_context(|| format!("invalid descriptor {}", path.display()))?;

    if args.quiet {
        return Ok(());
    }
    if args.services {
        for name in plan.order() {
            println!("{name}");
        }
        return Ok(());
    }

    let rendered = match args.format {
        Format::Yaml => serde_yaml::to_string(plan.descriptor())?,
        Format::Json => serde_json::to_string_pretty(plan.descriptor())? + "\n",
    };
    print!("{rendered}");
    Ok(())
}
