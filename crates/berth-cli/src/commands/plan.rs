//! `berth plan`: display the resolved start order before running anything.

use berth_common::config::RuntimeConfig;
use berth_compose::model::MountSource;
use clap::Args;

use super::Context;
use crate::output::{BOLD, DIM, RESET};

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Hide mounts and ports.
    #[arg(long)]
    pub brief: bool,
}

/// Executes the `plan` command.
///
/// Loads the descriptor, resolves the dependency graph, and prints the
/// services in start order with their images, dependencies, mounts and
/// ports.
///
/// # Errors
///
/// Returns an error if loading or graph resolution fails.
pub fn execute(ctx: &Context, args: &PlanArgs) -> anyhow::Result<()> {
    let engine = ctx.engine(RuntimeConfig::default())?;
    let plan = engine.plan();
    let project = engine.project();

    println!(
        "Start plan for: {} {DIM}(project {}){RESET}",
        engine.descriptor_path().display(),
        project.name
    );
    println!("{}", "\u{2550}".repeat(40));
    println!();

    for (i, service) in plan.services().enumerate() {
        println!("  {}. {BOLD}{}{RESET}", i + 1, service.name);
        println!("      image: {}", service.image);
        println!("      restart: {}", service.restart);
        let deps = plan.dependencies(&service.name);
        if !deps.is_empty() {
            println!("      depends on: {}", deps.join(", "));
        }
        if args.brief {
            continue;
        }
        for mount in &service.mounts {
            match &mount.source {
                MountSource::Volume(_) | MountSource::Anonymous => {
                    println!("      mount: {mount}");
                }
                MountSource::Host(path) => println!(
                    "      mount: {mount} {DIM}({}){RESET}",
                    project.resolve(path).display()
                ),
            }
        }
        for port in &service.ports {
            println!("      port: {port}");
        }
    }

    println!();
    println!("  {} service(s) will be started.", plan.order().len());

    let volumes = &plan.descriptor().volumes;
    if !volumes.is_empty() {
        println!();
        println!("  Volumes:");
        for volume in volumes {
            let users: Vec<&str> = plan
                .descriptor()
                .volume_users(&volume.name)
                .map(|s| s.name.as_str())
                .collect();
            println!(
                "    {} {DIM}-> {}{RESET}  used by: {}",
                volume.name,
                project.volume_name(volume),
                if users.is_empty() { "-".to_string() } else { users.join(", ") }
            );
        }
    }

    println!();
    println!("  Network: {}", project.network_name());
    println!(
        "  Shutdown order: {}",
        plan.shutdown_order().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}
