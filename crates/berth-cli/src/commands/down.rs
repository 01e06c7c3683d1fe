//! `berth down`: remove the project's resources.

use berth_common::config::{BackendKind, RuntimeConfig};
use clap::Args;

use super::Context;
use crate::output::{GREEN, RESET};

/// Arguments for the `down` command.
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Also remove the project's named volumes. External volumes are kept.
    #[arg(short, long)]
    pub volumes: bool,

    /// Backend the project ran on.
    #[arg(long, env = "BERTH_BACKEND", default_value_t = BackendKind::Docker)]
    pub backend: BackendKind,
}

/// Executes the `down` command.
///
/// # Errors
///
/// Returns an error if loading fails or the backend cannot remove a
/// resource.
pub async fn execute(ctx: &Context, args: DownArgs) -> anyhow::Result<()> {
    let config = RuntimeConfig {
        backend: args.backend,
        ..RuntimeConfig::default()
    };
    let engine = ctx.engine(config)?;
    engine.down(args.volumes).await?;
    eprintln!(
        "  {GREEN}Project {} removed.{RESET}",
        engine.project().name
    );
    Ok(())
}
