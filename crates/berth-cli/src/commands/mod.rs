//! CLI command definitions and dispatch.

pub mod config;
pub mod down;
pub mod logs;
pub mod plan;
pub mod ps;
pub mod up;

use std::path::PathBuf;

use anyhow::Context as _;
use berth_common::config::RuntimeConfig;
use berth_runtime::Engine;
use clap::{Parser, Subcommand, ValueEnum};

/// berth: load, plan and supervise compose-style deployments.
#[derive(Parser, Debug)]
#[command(name = "berth", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Descriptor file. Defaults to compose.yaml, compose.yml,
    /// docker-compose.yaml or docker-compose.yml in the current directory.
    #[arg(short = 'f', long = "file", global = true, env = "BERTH_FILE")]
    pub file: Option<PathBuf>,

    /// Project name. Defaults to the descriptor's `name`, then its
    /// directory name.
    #[arg(short = 'p', long, global = true, env = "BERTH_PROJECT_NAME")]
    pub project_name: Option<String>,

    /// Log output format.
    #[arg(long, global = true, env = "BERTH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the descriptor and print it in normalized form.
    Config(config::ConfigArgs),
    /// Display the resolved start order before running anything.
    Plan(plan::PlanArgs),
    /// Start the services and supervise them until they finish or Ctrl+C.
    Up(up::UpArgs),
    /// Remove the project's network, containers and optionally volumes.
    Down(down::DownArgs),
    /// Show the service states recorded by the last run.
    Ps(ps::PsArgs),
    /// Print a service's captured output.
    Logs(logs::LogsArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    file: Option<PathBuf>,
    project_name: Option<String>,
}

impl Context {
    /// Resolves the descriptor path: the explicit file, or the first
    /// well-known file name in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no descriptor is given and none is found.
    pub fn descriptor_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(file) = &self.file {
            return Ok(file.clone());
        }
        let cwd = std::env::current_dir().context("cannot determine current directory")?;
        berth_compose::parser::find_descriptor(&cwd).ok_or_else(|| {
            anyhow::anyhow!(
                "no descriptor found in {}\n\
                 Create a compose.yaml or pass one with: berth -f <file>",
                cwd.display()
            )
        })
    }

    /// Opens the engine for the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be found, read, parsed or
    /// planned.
    pub fn engine(&self, config: RuntimeConfig) -> anyhow::Result<Engine> {
        let path = self.descriptor_path()?;
        Engine::open(&path, self.project_name.as_deref(), config)
            .with_context(|| format!("failed to load {}", path.display()))
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context {
        file: cli.file,
        project_name: cli.project_name,
    };
    match cli.command {
        Command::Config(args) => config::execute(&ctx, &args),
        Command::Plan(args) => plan::execute(&ctx, &args),
        Command::Up(args) => up::execute(&ctx, args).await,
        Command::Down(args) => down::execute(&ctx, args).await,
        Command::Ps(args) => ps::execute(&ctx, &args),
        Command::Logs(args) => logs::execute(&ctx, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_apply_to_subcommands() {
        let cli = Cli::try_parse_from([
            "berth",
            "up",
            "-f",
            "demos/foodgram/docker-compose.yml",
            "-p",
            "foodgram",
            "--backend",
            "process",
        ])
        .expect("parse");
        assert_eq!(
            cli.file.as_deref(),
            Some(std::path::Path::new("demos/foodgram/docker-compose.yml"))
        );
        assert_eq!(cli.project_name.as_deref(), Some("foodgram"));
        assert!(matches!(cli.command, Command::Up(_)));
    }

    #[test]
    fn explicit_file_wins_over_discovery() {
        let ctx = Context {
            file: Some(PathBuf::from("/srv/foodgram/docker-compose.yml")),
            project_name: None,
        };
        assert_eq!(
            ctx.descriptor_path().expect("path"),
            PathBuf::from("/srv/foodgram/docker-compose.yml")
        );
    }
}
