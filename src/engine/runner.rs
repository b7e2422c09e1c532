use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::abstractions::{
    AppError, InterceptHooks, ReportStore, SessionStore, Simulator,
};
use crate::domain::{Mode, TestReport, TestRunStatus, API_VERSION};
use crate::engine::diff::print_set_summary;
use crate::engine::executor::{execute_case, SetTally};
use crate::engine::mocks::filter_tcs_mocks;
use crate::engine::orchestrator::ReplayConfig;
use crate::engine::shutdown::AbortHandle;
use crate::telemetry::RunTelemetry;

/// Everything a set run needs, cloned per set so each set can run on its
/// own task.
#[derive(Clone)]
pub struct RunContext {
    pub mode: Mode,
    pub cfg: Arc<ReplayConfig>,
    pub hooks: Arc<dyn InterceptHooks>,
    pub simulator: Arc<dyn Simulator>,
    pub session_store: Arc<dyn SessionStore>,
    pub report_store: Arc<dyn ReportStore>,
    pub telemetry: Arc<RunTelemetry>,
    pub abort: AbortHandle,
}

fn status_of(err: &AppError) -> TestRunStatus {
    match err {
        AppError::Interrupted => TestRunStatus::UserAbort,
        AppError::CommandError(_) => TestRunStatus::FaultUserApp,
        AppError::Unexpected(_) => TestRunStatus::AppHalted,
    }
}

/// Runs one test set end to end: load artifacts, install mocks, launch the
/// application, drive every case in recorded order, finalize and persist
/// the report.
pub async fn run_test_set(ctx: RunContext, test_set: String) -> TestRunStatus {
    let cfg = ctx.cfg.clone();
    let set_dir = cfg.path.join(&test_set);
    debug!(mode = ?ctx.mode, test_set = %test_set, "starting test set");

    let cases = match ctx.session_store.read_testcases(&set_dir) {
        Ok(cases) => cases,
        Err(err) => {
            error!(test_set = %test_set, error = %err, "failed to read the recorded testcases");
            return TestRunStatus::Failed;
        }
    };
    if cases.is_empty() {
        info!(test_set = %test_set, "no testcases are recorded for the user application");
        return TestRunStatus::Failed;
    }

    let (config_mocks, tcs_mocks) = match ctx.session_store.read_mocks(&set_dir) {
        Ok(mocks) => mocks,
        Err(err) => {
            error!(test_set = %test_set, error = %err, "failed to read the recorded mocks");
            return TestRunStatus::Failed;
        }
    };
    debug!(
        config = config_mocks.len(),
        test_case = tcs_mocks.len(),
        "installing recorded mocks"
    );
    ctx.hooks.set_config_mocks(config_mocks);
    ctx.hooks.set_tcs_mocks(tcs_mocks.clone());

    let mut report = TestReport {
        version: API_VERSION.to_string(),
        name: format!("{test_set}-report"),
        test_set: test_set.clone(),
        total: cases.len(),
        success: 0,
        failure: 0,
        status: TestRunStatus::Running,
        tests: Vec::new(),
    };
    let report_dir = cfg.report_dir();
    if let Err(err) = ctx.report_store.write(&report_dir, &report) {
        error!(test_set = %test_set, error = %err, "failed to write the initial test report");
        return TestRunStatus::Failed;
    }

    // The SUT is launched here unless a pid was attached externally with no
    // command of our own.
    let launches_app = !(cfg.app_cmd.is_empty() && cfg.pid != 0);
    let (err_tx, mut err_rx) = mpsc::channel::<AppError>(1);
    if launches_app {
        info!(test_set = %test_set, "running user application for the test set");
        let hooks = ctx.hooks.clone();
        let cmd = cfg.app_cmd.clone();
        let container = cfg.container_name.clone();
        let network = cfg.network_name.clone();
        let delay = cfg.delay;
        tokio::spawn(async move {
            if let Err(err) = hooks
                .launch_user_application(&cmd, &container, &network, delay)
                .await
            {
                match &err {
                    AppError::Interrupted => info!("replayman terminated the user application"),
                    AppError::CommandError(message) => {
                        warn!(%message, "user application command failed")
                    }
                    AppError::Unexpected(message) => warn!(
                        %message,
                        "user application terminated unexpectedly, stopping the test run"
                    ),
                }
                let _ = err_tx.send(err).await;
            }
        });
    } else {
        debug!(pid = cfg.pid, "running replay against an externally attached application");
    }

    info!(cases = cases.len(), test_set = %test_set, "replaying recorded testcases");
    debug!(delay = ?Duration::from_secs(cfg.delay), "waiting for the user application to become ready");
    // Time is the only readiness signal available.
    tokio::time::sleep(Duration::from_secs(cfg.delay)).await;

    let dide = cfg.app_cmd.is_empty() && !cfg.container_name.is_empty();
    let docker_mode = ctx.hooks.is_docker_related_cmd(&cfg.app_cmd) || dide;
    let user_ip = if docker_mode {
        let ip = ctx.hooks.user_ip().await;
        debug!(ip = ?ip, "resolved ip of the user docker container");
        ip
    } else {
        None
    };

    let mut tally = SetTally::new();
    let mut app_stopped = false;
    for case in &cases {
        if ctx.abort.aborted() {
            tally.status = TestRunStatus::UserAbort;
            break;
        }
        if let Ok(err) = err_rx.try_recv() {
            app_stopped = true;
            tally.status = status_of(&err);
            warn!(test_set = %test_set, status = tally.status.as_str(), "stopping testrun for the test set");
            break;
        }

        ctx.hooks.set_tcs_mocks(filter_tcs_mocks(case, &tcs_mocks));
        execute_case(
            &ctx,
            &test_set,
            &report.name,
            user_ip.as_deref(),
            case,
            &mut tally,
        )
        .await;
    }

    let status = finalize_report(&ctx, &mut report, tally, &report_dir);

    if launches_app && !app_stopped {
        ctx.hooks.stop_user_application();
    }
    status
}

/// Folds the appended results back into the report, persists it, updates the
/// run telemetry and prints the set summary.
fn finalize_report(
    ctx: &RunContext,
    report: &mut TestReport,
    tally: SetTally,
    report_dir: &std::path::Path,
) -> TestRunStatus {
    let mut status = tally.status;

    match ctx.report_store.get_results(&report.name) {
        Ok(results) => {
            report.total = results.len();
            report.tests = results;
        }
        Err(err) => {
            // No recorded results with final pass/fail status and untouched
            // counters means the result log itself is broken.
            if matches!(status, TestRunStatus::Passed | TestRunStatus::Failed)
                && tally.success + tally.failure == 0
            {
                error!(report = %report.name, error = %err, "failed to fetch test results");
                return TestRunStatus::Failed;
            }
            report.total = 0;
            report.tests = Vec::new();
        }
    }
    report.success = tally.success;
    report.failure = tally.failure;
    report.status = status;

    ctx.telemetry.add_set(tally.success, tally.failure);

    if let Err(err) = ctx.report_store.write(report_dir, report) {
        error!(report = %report.name, error = %err, "failed to write the test report");
        status = TestRunStatus::Failed;
    }
    info!(
        report = %report.name,
        path = %report_dir.join(format!("{}.json", report.name)).display(),
        "test report written"
    );

    print_set_summary(
        &report.test_set,
        report.total,
        report.success,
        report.failure,
        status,
    );
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NoiseConfig;
    use crate::engine::shutdown::ShutdownCoordinator;
    use crate::engine::testutil::{
        http_case, tcs_mock, EchoSimulator, FakeHooks, LaunchPlan, MemoryReportStore,
        MemorySessionStore,
    };
    use crate::proxy::{boot_proxy, ProxyOption};
    use std::sync::Arc;
    use tokio::sync::Notify;

    struct Harness {
        hooks: Arc<FakeHooks>,
        simulator: Arc<EchoSimulator>,
        report_store: Arc<MemoryReportStore>,
        ctx: RunContext,
    }

    async fn harness(session_store: MemorySessionStore, app_cmd: &str, pid: u32) -> Harness {
        let hooks = Arc::new(FakeHooks::new());
        let simulator = Arc::new(EchoSimulator::new());
        let report_store = Arc::new(MemoryReportStore::new());
        let telemetry = Arc::new(RunTelemetry::new());
        let proxy = boot_proxy(ProxyOption {
            port: 0,
            passthrough_ports: vec![],
        })
        .await
        .unwrap();
        let coordinator =
            ShutdownCoordinator::install(hooks.clone(), proxy.clone(), telemetry.clone());
        let ctx = RunContext {
            mode: Mode::Test,
            cfg: Arc::new(ReplayConfig {
                path: "/tmp/replayman-runner-test".into(),
                proxy_port: 0,
                report_path: None,
                app_cmd: app_cmd.to_string(),
                test_sets: vec![],
                container_name: String::new(),
                network_name: String::new(),
                delay: 0,
                passthrough_ports: vec![],
                api_timeout: 5,
                noise: NoiseConfig::default(),
                pid,
            }),
            hooks: hooks.clone(),
            simulator: simulator.clone(),
            session_store: Arc::new(session_store),
            report_store: report_store.clone(),
            telemetry,
            abort: coordinator.abort_handle(),
        };
        proxy.stop();
        Harness {
            hooks,
            simulator,
            report_store,
            ctx,
        }
    }

    #[tokio::test]
    async fn test_empty_case_list_fails_the_set() {
        let harness = harness(
            MemorySessionStore {
                sets: vec![("test-set-1".into(), vec![], vec![], vec![])],
            },
            "",
            1,
        )
        .await;

        let status = run_test_set(harness.ctx, "test-set-1".into()).await;
        assert_eq!(status, TestRunStatus::Failed);
    }

    #[tokio::test]
    async fn test_passing_set_keeps_recorded_result_order() {
        let cases = vec![
            http_case("test-1", None),
            http_case("test-2", None),
            http_case("test-3", None),
        ];
        let harness = harness(
            MemorySessionStore {
                sets: vec![("test-set-1".into(), cases, vec![], vec![])],
            },
            "",
            1,
        )
        .await;

        let status = run_test_set(harness.ctx, "test-set-1".into()).await;
        assert_eq!(status, TestRunStatus::Passed);

        let results = harness.report_store.get_results("test-set-1-report").unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.test_case_id.as_str()).collect();
        assert_eq!(ids, vec!["test-1", "test-2", "test-3"]);

        let written = harness.report_store.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].status, TestRunStatus::Running);
        assert_eq!(written[1].status, TestRunStatus::Passed);
        assert_eq!((written[1].success, written[1].failure), (3, 0));
    }

    #[tokio::test]
    async fn test_mock_installs_narrow_to_each_case_window() {
        let cases = vec![
            http_case("test-1", Some((100, 200))),
            http_case("test-2", Some((300, 400))),
        ];
        let tcs = vec![
            tcs_mock("mock-early", 110, 190),
            tcs_mock("mock-late", 310, 390),
        ];
        let harness = harness(
            MemorySessionStore {
                sets: vec![("test-set-1".into(), cases, vec![], tcs)],
            },
            "",
            1,
        )
        .await;

        run_test_set(harness.ctx, "test-set-1".into()).await;

        let installs = harness.hooks.tcs_installs.lock().unwrap().clone();
        assert_eq!(
            installs,
            vec![
                vec!["mock-early".to_string(), "mock-late".to_string()],
                vec!["mock-early".to_string()],
                vec!["mock-late".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_case_fails_the_set_but_runs_the_rest() {
        let cases = vec![http_case("test-1", None), http_case("test-2", None)];
        let harness = harness(
            MemorySessionStore {
                sets: vec![("test-set-1".into(), cases, vec![], vec![])],
            },
            "",
            1,
        )
        .await;
        harness.simulator.mismatch.lock().unwrap().push("test-1".into());

        let status = run_test_set(harness.ctx.clone(), "test-set-1".into()).await;
        assert_eq!(status, TestRunStatus::Failed);

        let results = harness.report_store.get_results("test-set-1-report").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!((harness.ctx.telemetry.snapshot()), (1, 1));
    }

    #[tokio::test]
    async fn test_app_halting_mid_set_stops_the_remaining_cases() {
        // Three cases; the supervisor reports an unexpected exit right after
        // case one completes.
        let cases = vec![
            http_case("test-1", None),
            http_case("test-2", None),
            http_case("test-3", None),
        ];
        let harness = harness(
            MemorySessionStore {
                sets: vec![("test-set-1".into(), cases, vec![], vec![])],
            },
            "./user-app",
            0,
        )
        .await;

        let gate = Arc::new(Notify::new());
        *harness.hooks.launch_plan.lock().unwrap() = Some(LaunchPlan {
            gate: gate.clone(),
            error: AppError::Unexpected("user application exited".into()),
        });
        *harness.simulator.on_first_complete.lock().unwrap() = Some(gate);

        let status = run_test_set(harness.ctx, "test-set-1".into()).await;
        assert_eq!(status, TestRunStatus::AppHalted);

        let results = harness.report_store.get_results("test-set-1-report").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].test_case_id, "test-1");

        let written = harness.report_store.written.lock().unwrap();
        assert_eq!(written.last().unwrap().status, TestRunStatus::AppHalted);
        // The supervisor already reported the exit; the runner must not stop
        // the application again.
        assert_eq!(
            harness.hooks.app_stops.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_command_failure_maps_to_fault_user_app() {
        let cases = vec![http_case("test-1", None), http_case("test-2", None)];
        let harness = harness(
            MemorySessionStore {
                sets: vec![("test-set-1".into(), cases, vec![], vec![])],
            },
            "./user-app",
            0,
        )
        .await;

        let gate = Arc::new(Notify::new());
        *harness.hooks.launch_plan.lock().unwrap() = Some(LaunchPlan {
            gate: gate.clone(),
            error: AppError::CommandError("exit status 3".into()),
        });
        *harness.simulator.on_first_complete.lock().unwrap() = Some(gate);

        let status = run_test_set(harness.ctx, "test-set-1".into()).await;
        assert_eq!(status, TestRunStatus::FaultUserApp);
    }

    #[tokio::test]
    async fn test_launched_app_is_stopped_on_normal_completion() {
        let cases = vec![http_case("test-1", None)];
        let harness = harness(
            MemorySessionStore {
                sets: vec![("test-set-1".into(), cases, vec![], vec![])],
            },
            "./user-app",
            0,
        )
        .await;

        let status = run_test_set(harness.ctx, "test-set-1".into()).await;
        assert_eq!(status, TestRunStatus::Passed);
        assert_eq!(
            harness.hooks.app_stops.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
