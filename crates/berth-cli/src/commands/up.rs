//! `berth up`: start the services and supervise them.

use std::time::{Duration, Instant};

use berth_common::config::{BackendKind, RuntimeConfig};
use berth_common::constants::DEFAULT_STOP_GRACE_SECS;
use berth_runtime::SupervisorReport;
use clap::Args;

use super::Context;
use crate::output::{self, BOLD, CYAN, DIM, GREEN, RED, RESET, YELLOW};

/// Arguments for the `up` command.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Backend that runs the services.
    #[arg(long, env = "BERTH_BACKEND", default_value_t = BackendKind::Docker)]
    pub backend: BackendKind,

    /// Seconds a service gets to stop before it is killed.
    #[arg(short, long, default_value_t = DEFAULT_STOP_GRACE_SECS)]
    pub timeout: u64,
}

/// Executes the `up` command.
///
/// Runs until every service has exited for good, or until Ctrl+C or
/// SIGTERM, which stops the services in reverse start order.
///
/// # Errors
///
/// Returns an error if loading fails, the backend is unusable, or any
/// service ends unsuccessfully.
pub async fn execute(ctx: &Context, args: UpArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let config = RuntimeConfig {
        backend: args.backend,
        stop_grace: Duration::from_secs(args.timeout),
        ..RuntimeConfig::default()
    };
    let engine = ctx.engine(config)?;

    eprintln!();
    eprintln!(
        "  {BOLD}berth{RESET} {DIM}v{}{RESET}  project {BOLD}{}{RESET} on {}",
        env!("CARGO_PKG_VERSION"),
        engine.project().name,
        args.backend
    );
    eprintln!("  {DIM}Start order: {}{RESET}", engine.plan().order().join(" -> "));
    for service in engine.plan().services() {
        for port in service.ports.iter().filter_map(|p| p.host_port) {
            eprintln!("  {CYAN}Access at:{RESET} {BOLD}http://localhost:{port}{RESET} {DIM}({}){RESET}", service.name);
        }
    }
    eprintln!();
    eprintln!("  Press {BOLD}Ctrl+C{RESET} to stop all services...");
    eprintln!();

    let report = engine.up(shutdown_signal()).await?;
    print_report(&report, started);

    let failed: Vec<&str> = report.failed().map(|s| s.name.as_str()).collect();
    if !failed.is_empty() {
        anyhow::bail!("{} service(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn print_report(report: &SupervisorReport, started: Instant) {
    eprintln!();
    eprintln!(
        "  {GREEN}{BOLD}Supervision ended{RESET} after {:.1}s:",
        started.elapsed().as_secs_f64()
    );
    eprintln!();
    for service in &report.services {
        let restarts = match service.restarts {
            0 => String::new(),
            n => format!(" {YELLOW}({n} restart(s)){RESET}"),
        };
        let exit = match service.last_exit {
            Some(exit) if !exit.success() => format!(" {RED}{exit}{RESET}"),
            Some(exit) => format!(" {DIM}{exit}{RESET}"),
            None => String::new(),
        };
        eprintln!(
            "    {} {BOLD}{}{RESET} {DIM}[{}]{RESET}{exit}{restarts}",
            output::state_marker(service.state),
            service.name,
            service.state
        );
    }
}

/// Completes on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let _ = sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    eprintln!();
    eprintln!("  Stopping services...");
}
