use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::abstractions::{InterceptHooks, ReportStore, SessionStore, Simulator};
use crate::domain::{Mode, NoiseConfig, TestRunStatus};
use crate::engine::runner::{run_test_set, RunContext};
use crate::engine::shutdown::ShutdownCoordinator;
use crate::proxy::{boot_proxy, Proxy, ProxyOption};
use crate::telemetry::RunTelemetry;

/// Invocation parameters of one replay run, as handed over by the CLI.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub path: PathBuf,
    pub proxy_port: u16,
    pub report_path: Option<PathBuf>,
    pub app_cmd: String,
    pub test_sets: Vec<String>,
    pub container_name: String,
    pub network_name: String,
    pub delay: u64,
    pub passthrough_ports: Vec<u16>,
    pub api_timeout: u64,
    pub noise: NoiseConfig,
    pub pid: u32,
}

impl ReplayConfig {
    pub fn report_dir(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| self.path.join("testReports"))
    }
}

/// Owns one whole replay run: interception hooks and proxy lifecycle,
/// session discovery, per-set runs and the terminal status table, and the
/// shutdown path.
pub struct Orchestrator {
    hooks: Arc<dyn InterceptHooks>,
    simulator: Arc<dyn Simulator>,
    session_store: Arc<dyn SessionStore>,
    report_store: Arc<dyn ReportStore>,
}

impl Orchestrator {
    pub fn new(
        hooks: Arc<dyn InterceptHooks>,
        simulator: Arc<dyn Simulator>,
        session_store: Arc<dyn SessionStore>,
        report_store: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            hooks,
            simulator,
            session_store,
            report_store,
        }
    }

    /// Replays every selected test set. Returns whether the whole run
    /// passed; the caller turns this into the process exit code.
    pub async fn run(&self, cfg: ReplayConfig) -> bool {
        let mode = Mode::Test;
        debug!(?mode, "starting replay run");

        if let Err(err) = self
            .hooks
            .load(&cfg.app_cmd, &cfg.container_name, cfg.pid)
        {
            error!(error = %err, "failed to load the interception hooks");
            return false;
        }

        let proxy = match boot_proxy(ProxyOption {
            port: cfg.proxy_port,
            passthrough_ports: cfg.passthrough_ports.clone(),
        })
        .await
        {
            Ok(proxy) => proxy,
            Err(err) => {
                error!(error = %err, "failed to boot the proxy");
                self.hooks.stop(true);
                return false;
            }
        };
        if let Err(err) = self.hooks.send_proxy_info(proxy.ip4, proxy.port, proxy.ip6) {
            error!(error = %err, "failed to publish proxy info to the interception layer");
            self.hooks.stop(true);
            proxy.stop();
            return false;
        }

        let sessions = match self.session_store.read_session_indices(&cfg.path) {
            Ok(sessions) => sessions,
            Err(err) => {
                debug!(error = %err, "failed to read the recorded sessions");
                self.hooks.stop(true);
                proxy.stop();
                return false;
            }
        };
        debug!(?sessions, "discovered recorded test sets");

        let selected: Vec<String> = if cfg.test_sets.is_empty() {
            sessions
        } else {
            let known: HashSet<&String> = sessions.iter().collect();
            cfg.test_sets
                .iter()
                .filter(|set| {
                    let found = known.contains(set);
                    if !found {
                        info!(test_set = %set, "no recorded test set found with this name");
                    }
                    found
                })
                .cloned()
                .collect()
        };

        let telemetry = Arc::new(RunTelemetry::new());
        let coordinator =
            ShutdownCoordinator::install(self.hooks.clone(), proxy.clone(), telemetry.clone());

        let ctx = RunContext {
            mode,
            cfg: Arc::new(cfg),
            hooks: self.hooks.clone(),
            simulator: self.simulator.clone(),
            session_store: self.session_store.clone(),
            report_store: self.report_store.clone(),
            telemetry,
            abort: coordinator.abort_handle(),
        };

        let mut overall = true;
        let mut routine_id: u64 = 0;
        for test_set in selected {
            if coordinator.aborted() {
                overall = false;
                break;
            }
            routine_id += 1;

            // Each set runs on its own task so a panicking case cannot
            // orphan the proxy or the hooks.
            let status = match tokio::spawn(run_test_set(ctx.clone(), test_set.clone())).await {
                Ok(status) => status,
                Err(err) if err.is_panic() => {
                    error!(test_set = %test_set, "test set panicked");
                    self.hooks.recover(routine_id);
                    TestRunStatus::Failed
                }
                Err(_) => TestRunStatus::Failed,
            };

            match status {
                TestRunStatus::Passed => {}
                TestRunStatus::Failed | TestRunStatus::Running => {
                    overall = false;
                }
                TestRunStatus::UserAbort => {
                    return self.finish(coordinator, &proxy, false).await;
                }
                TestRunStatus::FaultUserApp | TestRunStatus::AppHalted => {
                    overall = false;
                    break;
                }
            }
        }
        info!(passed = overall, "test run completed");

        self.finish(coordinator, &proxy, overall).await
    }

    /// Single exit path. When a signal already forced the teardown the
    /// coordinator owns it; otherwise the hooks and proxy stop gracefully
    /// here.
    async fn finish(&self, coordinator: ShutdownCoordinator, proxy: &Proxy, overall: bool) -> bool {
        if coordinator.aborted() {
            coordinator.wait_exit().await;
            return false;
        }
        coordinator.complete_normally();
        self.hooks.stop(true);
        proxy.stop();
        overall
    }
}
