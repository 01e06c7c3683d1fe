//! `berth ps`: show the service states recorded by the last run.

use berth_common::config::RuntimeConfig;
use berth_runtime::state::{ServiceStatus, StateSnapshot};
use clap::Args;

use super::Context;
use crate::output::{self, DIM, RESET};

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all services (including exited and stopped).
    #[arg(short, long)]
    pub all: bool,

    /// Print the raw state snapshot as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `ps` command.
///
/// Reads the state snapshot of the project and displays it in a tabular
/// format.
///
/// # Errors
///
/// Returns an error if the descriptor or the snapshot cannot be loaded.
pub fn execute(ctx: &Context, args: &PsArgs) -> anyhow::Result<()> {
    let engine = ctx.engine(RuntimeConfig::default())?;
    let Some(snapshot) = engine.status()? else {
        println!("No runs recorded for project {}.", engine.project().name);
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let rows = rows(&snapshot, args.all);
    if rows.is_empty() {
        println!("No running services. Use -a to show all.");
        return Ok(());
    }
    println!(
        "{DIM}project {} on {}, run {}, updated {}{RESET}",
        snapshot.project, snapshot.backend, snapshot.run_id, snapshot.updated_at
    );
    print!(
        "{}",
        output::render_table(&["SERVICE", "STATE", "PID", "RESTARTS", "EXIT", "IMAGE"], &rows)
    );
    Ok(())
}

fn rows(snapshot: &StateSnapshot, all: bool) -> Vec<Vec<String>> {
    snapshot
        .services
        .iter()
        .filter(|s| all || !s.state.is_terminal())
        .map(row)
        .collect()
}

fn row(status: &ServiceStatus) -> Vec<String> {
    vec![
        status.name.clone(),
        status.state.to_string(),
        status
            .pid
            .map_or_else(|| "-".to_string(), |p| p.to_string()),
        status.restarts.to_string(),
        output::format_exit(status.last_exit),
        status.image.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_common::types::{ExitStatus, ServiceState};

    fn status(name: &str, state: ServiceState) -> ServiceStatus {
        ServiceStatus {
            name: name.into(),
            image: "img".into(),
            state,
            pid: None,
            restarts: 0,
            last_exit: None,
            updated_at: String::new(),
        }
    }

    #[test]
    fn terminal_services_hidden_unless_all() {
        let snapshot = StateSnapshot {
            project: "foodgram".into(),
            run_id: "run".into(),
            backend: "docker".into(),
            supervisor_pid: 1,
            updated_at: String::new(),
            services: vec![
                status("db", ServiceState::Running),
                ServiceStatus {
                    last_exit: Some(ExitStatus::code(0)),
                    ..status("frontend", ServiceState::Exited)
                },
            ],
        };
        let running = rows(&snapshot, false);
        assert_eq!(running.len(), 1);
        assert_eq!(running[0][0], "db");

        let all = rows(&snapshot, true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], vec!["frontend", "exited", "-", "0", "0", "img"]);
    }
}
