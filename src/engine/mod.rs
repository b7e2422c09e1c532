pub mod compare;
pub mod diff;
pub mod executor;
pub mod http;
pub mod mocks;
pub mod orchestrator;
pub mod runner;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashMap;
    use std::future::Future;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::path::Path;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::Notify;

    use crate::abstractions::{
        AppError, HookError, InterceptHooks, ReportStore, SessionStore, SimulationError,
        Simulator, StoreError,
    };
    use crate::domain::{
        HttpReq, HttpResp, Kind, Mock, MockUsage, TestCase, TestReport, TestResult,
    };

    pub fn http_case(name: &str, window: Option<(i64, i64)>) -> TestCase {
        TestCase {
            name: name.into(),
            kind: Kind::Http,
            req_timestamp: window.map(|(req, _)| req),
            res_timestamp: window.map(|(_, res)| res),
            http_req: HttpReq {
                method: "GET".into(),
                proto_major: 1,
                proto_minor: 1,
                url: format!("http://localhost:8080/{name}"),
                url_params: HashMap::new(),
                header: HashMap::new(),
                body: String::new(),
            },
            http_resp: HttpResp {
                status_code: 200,
                status_message: "OK".into(),
                proto_major: 1,
                proto_minor: 1,
                header: HashMap::new(),
                body: format!(r#"{{"case":"{name}"}}"#),
            },
            noise: vec![],
        }
    }

    pub fn tcs_mock(name: &str, req: i64, res: i64) -> Mock {
        Mock {
            name: name.into(),
            usage: MockUsage::TestCase,
            req_timestamp: Some(req),
            res_timestamp: Some(res),
            spec: serde_json::Value::Null,
        }
    }

    /// A launch outcome armed on [`FakeHooks`]: the error is returned once
    /// the gate fires.
    pub struct LaunchPlan {
        pub gate: Arc<Notify>,
        pub error: AppError,
    }

    #[derive(Default)]
    pub struct FakeHooks {
        pub launch_plan: Mutex<Option<LaunchPlan>>,
        pub tcs_installs: Mutex<Vec<Vec<String>>>,
        pub stops: Mutex<Vec<bool>>,
        pub app_stops: AtomicUsize,
        pub recovered: AtomicUsize,
    }

    impl FakeHooks {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl InterceptHooks for FakeHooks {
        fn load(&self, _app_cmd: &str, _container: &str, _pid: u32) -> Result<(), HookError> {
            Ok(())
        }

        fn send_proxy_info(
            &self,
            _v4: Ipv4Addr,
            _port: u16,
            _v6: Ipv6Addr,
        ) -> Result<(), HookError> {
            Ok(())
        }

        fn set_config_mocks(&self, _mocks: Vec<Mock>) {}

        fn set_tcs_mocks(&self, mocks: Vec<Mock>) {
            self.tcs_installs
                .lock()
                .unwrap()
                .push(mocks.into_iter().map(|m| m.name).collect());
        }

        fn launch_user_application<'a>(
            &'a self,
            _cmd: &str,
            _container: &str,
            _network: &str,
            _delay: u64,
        ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
            let plan = self.launch_plan.lock().unwrap().take();
            Box::pin(async move {
                match plan {
                    Some(plan) => {
                        plan.gate.notified().await;
                        Err(plan.error)
                    }
                    None => std::future::pending().await,
                }
            })
        }

        fn stop_user_application(&self) {
            self.app_stops.fetch_add(1, Ordering::SeqCst);
        }

        fn user_ip(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
            Box::pin(async { None })
        }

        fn is_docker_related_cmd(&self, _cmd: &str) -> bool {
            false
        }

        fn stop(&self, graceful: bool) {
            self.stops.lock().unwrap().push(graceful);
        }

        fn recover(&self, _routine_id: u64) {
            self.recovered.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Replays every case back exactly as recorded; selected cases can be
    /// failed with a mutated body or a transport error instead. Firing
    /// `on_first_complete` before the first response settles lets tests
    /// interleave an app-supervisor event between case one and case two.
    #[derive(Default)]
    pub struct EchoSimulator {
        pub calls: AtomicUsize,
        pub on_first_complete: Mutex<Option<Arc<Notify>>>,
        pub mismatch: Mutex<Vec<String>>,
        pub transport_fail: Mutex<Vec<String>>,
    }

    impl EchoSimulator {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Simulator for EchoSimulator {
        fn simulate<'a>(
            &'a self,
            case: &'a TestCase,
            _api_timeout: u64,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResp, SimulationError>> + Send + 'a>>
        {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    let gate = self.on_first_complete.lock().unwrap().take();
                    if let Some(gate) = gate {
                        gate.notify_one();
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
                if self.transport_fail.lock().unwrap().contains(&case.name) {
                    return Err(SimulationError::Transport("connection refused".into()));
                }
                let mut resp = case.http_resp.clone();
                if self.mismatch.lock().unwrap().contains(&case.name) {
                    resp.status_code = 500;
                }
                Ok(resp)
            })
        }
    }

    pub struct MemorySessionStore {
        pub sets: Vec<(String, Vec<TestCase>, Vec<Mock>, Vec<Mock>)>,
    }

    impl MemorySessionStore {
        fn set_of(&self, dir: &Path) -> Option<&(String, Vec<TestCase>, Vec<Mock>, Vec<Mock>)> {
            let name = dir.file_name()?.to_string_lossy();
            self.sets.iter().find(|(set, ..)| *set == name)
        }
    }

    impl SessionStore for MemorySessionStore {
        fn read_session_indices(&self, _path: &Path) -> Result<Vec<String>, StoreError> {
            Ok(self.sets.iter().map(|(set, ..)| set.clone()).collect())
        }

        fn read_testcases(&self, set_dir: &Path) -> Result<Vec<TestCase>, StoreError> {
            self.set_of(set_dir)
                .map(|(_, cases, ..)| cases.clone())
                .ok_or_else(|| StoreError::Io {
                    path: set_dir.display().to_string(),
                    message: "unknown test set".into(),
                })
        }

        fn read_mocks(&self, set_dir: &Path) -> Result<(Vec<Mock>, Vec<Mock>), StoreError> {
            self.set_of(set_dir)
                .map(|(_, _, config, tcs)| (config.clone(), tcs.clone()))
                .ok_or_else(|| StoreError::Io {
                    path: set_dir.display().to_string(),
                    message: "unknown test set".into(),
                })
        }
    }

    #[derive(Default)]
    pub struct MemoryReportStore {
        pub results: Mutex<HashMap<String, Vec<TestResult>>>,
        pub written: Mutex<Vec<TestReport>>,
    }

    impl MemoryReportStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl ReportStore for MemoryReportStore {
        fn write(&self, _dir: &Path, report: &TestReport) -> Result<(), StoreError> {
            self.written.lock().unwrap().push(report.clone());
            Ok(())
        }

        fn set_result(&self, report_name: &str, result: TestResult) {
            self.results
                .lock()
                .unwrap()
                .entry(report_name.to_string())
                .or_default()
                .push(result);
        }

        fn get_results(&self, report_name: &str) -> Result<Vec<TestResult>, StoreError> {
            self.results
                .lock()
                .unwrap()
                .get(report_name)
                .cloned()
                .ok_or_else(|| StoreError::UnknownReport(report_name.to_string()))
        }
    }
}
