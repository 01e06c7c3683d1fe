//! Lifecycle supervisor.
//!
//! A single control loop owns the state of every service. Each launched
//! service gets a watcher task that starts it through the backend, waits for
//! it to exit (or to be told to stop) and reports back over an mpsc channel.
//! The loop reacts to those events: it launches services whose dependencies
//! have started, applies restart policies with exponential backoff, and on
//! shutdown stops everything in reverse start order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use berth_common::config::RuntimeConfig;
use berth_common::error::Result;
use berth_common::types::{ExitStatus, ServiceState};
use berth_compose::Plan;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::backend::ServiceBackend;
use crate::logs;
use crate::project::Project;
use crate::state::{self, ServiceStatus, StateSnapshot};

/// Final outcome of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    /// Service name.
    pub name: String,
    /// State the service ended in.
    pub state: ServiceState,
    /// Number of restarts performed.
    pub restarts: u32,
    /// How the last run ended, `None` if it never ran.
    pub last_exit: Option<ExitStatus>,
}

/// Outcome of a supervised run, in start order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorReport {
    /// Per-service outcome.
    pub services: Vec<ServiceReport>,
}

impl SupervisorReport {
    /// Looks up the outcome of a service.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Services that exited unsuccessfully or never ran.
    pub fn failed(&self) -> impl Iterator<Item = &ServiceReport> {
        self.services.iter().filter(|s| {
            s.state == ServiceState::Exited && !s.last_exit.is_some_and(ExitStatus::success)
        })
    }
}

#[derive(Debug)]
enum Event {
    Started {
        service: String,
        pid: Option<u32>,
    },
    StartFailed {
        service: String,
        error: String,
    },
    Exited {
        service: String,
        status: ExitStatus,
        uptime: Duration,
        stopped: bool,
    },
    RestartDue {
        service: String,
    },
}

#[derive(Debug)]
struct Slot {
    state: ServiceState,
    /// Reached `Running` at least once; gates dependents.
    started: bool,
    restarts: u32,
    /// Consecutive restarts since the last long enough run.
    attempt: u32,
    pid: Option<u32>,
    last_exit: Option<ExitStatus>,
    stop_tx: Option<oneshot::Sender<()>>,
    updated_at: String,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: ServiceState::Pending,
            started: false,
            restarts: 0,
            attempt: 0,
            pid: None,
            last_exit: None,
            stop_tx: None,
            updated_at: now(),
        }
    }
}

/// Shared, read-only inputs of a watcher task.
#[derive(Clone)]
struct WatchContext {
    plan: Arc<Plan>,
    project: Arc<Project>,
    backend: Arc<dyn ServiceBackend>,
    tx: mpsc::UnboundedSender<Event>,
    grace: Duration,
}

/// Supervises the services of one plan.
pub struct Supervisor {
    ctx: WatchContext,
    config: RuntimeConfig,
    run_id: String,
    slots: HashMap<String, Slot>,
    rx: mpsc::UnboundedReceiver<Event>,
    shutting_down: bool,
}

impl Supervisor {
    /// Creates a supervisor; nothing runs until [`Supervisor::run`].
    #[must_use]
    pub fn new(
        plan: Arc<Plan>,
        project: Project,
        backend: Arc<dyn ServiceBackend>,
        config: RuntimeConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let slots = plan
            .order()
            .iter()
            .map(|name| (name.clone(), Slot::new()))
            .collect();
        Self {
            ctx: WatchContext {
                plan,
                project: Arc::new(project),
                backend,
                tx,
                grace: config.stop_grace,
            },
            config,
            run_id: uuid::Uuid::new_v4().to_string(),
            slots,
            rx,
            shutting_down: false,
        }
    }

    /// Runs until every service is terminal or `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot prepare the project. Failures
    /// of individual services are reported, not returned.
    pub async fn run<F>(mut self, shutdown: F) -> Result<SupervisorReport>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            project = %self.ctx.project.name,
            backend = self.ctx.backend.name(),
            run_id = %self.run_id,
            "supervisor starting"
        );
        self.ctx
            .backend
            .prepare(&self.ctx.project, self.ctx.plan.descriptor())
            .await?;
        self.persist();
        self.launch_ready();

        tokio::pin!(shutdown);
        while !self.all_terminal() {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    self.shutdown().await;
                    break;
                }
                event = self.rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event);
                }
            }
        }

        self.persist();
        let report = self.report();
        tracing::info!(
            failed = report.failed().count(),
            "supervisor finished"
        );
        Ok(report)
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Started { service, pid } => {
                if let Some(slot) = self.slots.get_mut(&service) {
                    slot.started = true;
                    slot.pid = pid;
                }
                tracing::info!(service = %service, ?pid, "service running");
                self.log_line(&service, "running");
                self.transition(&service, ServiceState::Running);
                self.launch_ready();
            }
            Event::StartFailed { service, error } => {
                tracing::warn!(service = %service, %error, "service failed to start");
                self.log_line(&service, &format!("failed to start: {error}"));
                self.on_exit(&service, ExitStatus::unknown(), Duration::ZERO);
            }
            Event::Exited {
                service,
                status,
                uptime,
                stopped,
            } => {
                let uptime_ms = u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX);
                self.log_line(&service, &format!("exited ({status})"));
                if stopped {
                    tracing::info!(service = %service, %status, uptime_ms, "service stopped");
                    if let Some(slot) = self.slots.get_mut(&service) {
                        slot.pid = None;
                        slot.last_exit = Some(status);
                    }
                    self.transition(&service, ServiceState::Stopped);
                } else {
                    tracing::info!(service = %service, %status, uptime_ms, "service exited");
                    self.on_exit(&service, status, uptime);
                }
            }
            Event::RestartDue { service } => {
                if !self.shutting_down && self.state_of(&service) == Some(ServiceState::Restarting)
                {
                    self.launch(&service);
                }
            }
        }
    }

    /// Applies the restart policy to a service whose run just ended.
    fn on_exit(&mut self, name: &str, status: ExitStatus, uptime: Duration) {
        let Some(policy) = self.ctx.plan.service(name).map(|s| s.restart) else {
            return;
        };
        let Some(slot) = self.slots.get_mut(name) else {
            return;
        };
        slot.pid = None;
        slot.stop_tx = None;
        slot.last_exit = Some(status);
        if uptime >= self.config.backoff.reset_after {
            slot.attempt = 0;
        }

        if !self.shutting_down && policy.should_restart(status, slot.restarts) {
            let delay = self.config.backoff.delay(slot.attempt);
            slot.attempt = slot.attempt.saturating_add(1);
            slot.restarts = slot.restarts.saturating_add(1);
            tracing::info!(
                service = name,
                %policy,
                restarts = slot.restarts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling restart"
            );
            self.transition(name, ServiceState::Restarting);

            let tx = self.ctx.tx.clone();
            let service = name.to_string();
            let _timer = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Event::RestartDue { service });
            });
        } else {
            let started = slot.started;
            self.transition(name, ServiceState::Exited);
            if !started {
                self.abandon_dependents(name);
            }
        }
    }

    /// Marks every pending service that transitively depends on a service
    /// that will never start as exited.
    fn abandon_dependents(&mut self, name: &str) {
        let mut queue = self.ctx.plan.dependents(name);
        while let Some(dependent) = queue.pop() {
            if self.state_of(&dependent) != Some(ServiceState::Pending) {
                continue;
            }
            tracing::warn!(service = %dependent, blocked_by = name, "dependency never started");
            self.log_line(&dependent, &format!("not started: dependency {name} never started"));
            self.transition(&dependent, ServiceState::Exited);
            queue.extend(self.ctx.plan.dependents(&dependent));
        }
    }

    /// Launches every pending service whose dependencies have all started.
    fn launch_ready(&mut self) {
        if self.shutting_down {
            return;
        }
        let ready: Vec<String> = self
            .ctx
            .plan
            .order()
            .iter()
            .filter(|name| {
                self.state_of(name) == Some(ServiceState::Pending)
                    && self
                        .ctx
                        .plan
                        .dependencies(name)
                        .iter()
                        .all(|dep| self.slots.get(dep).is_some_and(|s| s.started))
            })
            .cloned()
            .collect();
        for name in ready {
            self.launch(&name);
        }
    }

    fn launch(&mut self, name: &str) {
        let (stop_tx, stop_rx) = oneshot::channel();
        if let Some(slot) = self.slots.get_mut(name) {
            slot.stop_tx = Some(stop_tx);
        }
        tracing::info!(service = name, "starting service");
        self.transition(name, ServiceState::Starting);
        let _watcher = tokio::spawn(watch(self.ctx.clone(), name.to_string(), stop_rx));
    }

    /// Stops running services in reverse start order, one at a time.
    async fn shutdown(&mut self) {
        self.shutting_down = true;
        let order: Vec<String> = self
            .ctx
            .plan
            .shutdown_order()
            .map(str::to_string)
            .collect();
        for name in order {
            match self.state_of(&name) {
                Some(ServiceState::Pending | ServiceState::Restarting) => {
                    self.transition(&name, ServiceState::Stopped);
                }
                Some(ServiceState::Starting | ServiceState::Running) => {
                    if let Some(tx) = self.slots.get_mut(&name).and_then(|s| s.stop_tx.take()) {
                        tracing::info!(service = %name, "stopping service");
                        let _ = tx.send(());
                    }
                    while !self
                        .state_of(&name)
                        .is_none_or(ServiceState::is_terminal)
                    {
                        let Some(event) = self.rx.recv().await else {
                            break;
                        };
                        self.handle(event);
                    }
                }
                Some(ServiceState::Exited | ServiceState::Stopped) | None => {}
            }
        }
    }

    fn state_of(&self, name: &str) -> Option<ServiceState> {
        self.slots.get(name).map(|s| s.state)
    }

    fn all_terminal(&self) -> bool {
        self.slots.values().all(|s| s.state.is_terminal())
    }

    fn transition(&mut self, name: &str, to: ServiceState) {
        let Some(slot) = self.slots.get_mut(name) else {
            return;
        };
        let from = slot.state;
        slot.state = to;
        slot.updated_at = now();
        tracing::debug!(service = name, %from, %to, "state transition");
        self.persist();
    }

    fn log_line(&self, service: &str, message: &str) {
        let line = format!("[berth {}] {message}", now());
        if let Err(e) = logs::append_log(&self.ctx.project.logs_dir(), service, &line) {
            tracing::warn!(service, error = %e, "failed to write log line");
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        let services = self
            .ctx
            .plan
            .services()
            .filter_map(|service| {
                let slot = self.slots.get(&service.name)?;
                Some(ServiceStatus {
                    name: service.name.clone(),
                    image: service.image.clone(),
                    state: slot.state,
                    pid: slot.pid,
                    restarts: slot.restarts,
                    last_exit: slot.last_exit,
                    updated_at: slot.updated_at.clone(),
                })
            })
            .collect();
        StateSnapshot {
            project: self.ctx.project.name.clone(),
            run_id: self.run_id.clone(),
            backend: self.ctx.backend.name().to_string(),
            supervisor_pid: std::process::id(),
            updated_at: now(),
            services,
        }
    }

    fn persist(&self) {
        let path = self.ctx.project.state_file();
        if let Err(e) = state::save_state(&path, &self.snapshot()) {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist state");
        }
    }

    fn report(&self) -> SupervisorReport {
        let services = self
            .ctx
            .plan
            .order()
            .iter()
            .filter_map(|name| {
                let slot = self.slots.get(name)?;
                Some(ServiceReport {
                    name: name.clone(),
                    state: slot.state,
                    restarts: slot.restarts,
                    last_exit: slot.last_exit,
                })
            })
            .collect();
        SupervisorReport { services }
    }
}

/// Watcher task: starts one service and reports how its run ends.
async fn watch(ctx: WatchContext, service: String, mut stop_rx: oneshot::Receiver<()>) {
    let Some(definition) = ctx.plan.service(&service) else {
        let _ = ctx.tx.send(Event::StartFailed {
            service,
            error: "not part of the plan".into(),
        });
        return;
    };

    let mut process = match ctx
        .backend
        .start(&ctx.project, ctx.plan.descriptor(), definition)
        .await
    {
        Ok(process) => process,
        Err(e) => {
            let _ = ctx.tx.send(Event::StartFailed {
                service,
                error: e.to_string(),
            });
            return;
        }
    };
    let _ = ctx.tx.send(Event::Started {
        service: service.clone(),
        pid: process.pid(),
    });

    let started = Instant::now();
    let waited = tokio::select! {
        biased;
        Ok(()) = &mut stop_rx => None,
        result = process.wait() => Some(result),
    };
    let (result, stopped) = match waited {
        Some(result) => (result, false),
        None => (process.stop(ctx.grace).await, true),
    };
    let status = result.unwrap_or_else(|e| {
        tracing::warn!(service = %service, error = %e, "lost track of service process");
        ExitStatus::unknown()
    });
    let _ = ctx.tx.send(Event::Exited {
        service,
        status,
        uptime: started.elapsed(),
        stopped,
    });
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
