use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::abstractions::{AppError, HookError, InterceptHooks};
use crate::domain::Mock;

const IP_RESOLVE_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy)]
struct ProxyInfo {
    v4: Ipv4Addr,
    port: u16,
    v6: Ipv6Addr,
}

/// Whether the command launches the application through docker.
pub fn is_docker_cmd(cmd: &str) -> bool {
    let cmd = cmd.trim();
    cmd.starts_with("docker ")
        || cmd.starts_with("docker-compose ")
        || cmd.starts_with("sudo docker ")
        || cmd.starts_with("sudo docker-compose ")
        || cmd.contains("docker compose ")
}

/// Pulls the container name out of a `docker run --name <name> …` command.
fn container_name_from_cmd(cmd: &str) -> Option<String> {
    let mut tokens = cmd.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "--name" {
            return tokens.next().map(|name| name.to_string());
        }
        if let Some(name) = token.strip_prefix("--name=") {
            return Some(name.to_string());
        }
    }
    None
}

async fn inspect_container_ip(container: &str) -> Option<String> {
    let output = Command::new("docker")
        .args([
            "inspect",
            "-f",
            "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}",
            container,
        ])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let ip = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!ip.is_empty()).then_some(ip)
}

/// Interception-layer front end owned by the orchestrator.
///
/// Holds the installed mock registries (written by the runner, read by the
/// interception side), the published proxy addresses, and the supervised
/// user application.
pub struct AppHooks {
    loaded: AtomicBool,
    stopped: AtomicBool,
    config_mocks: RwLock<Vec<Mock>>,
    tcs_mocks: RwLock<Vec<Mock>>,
    proxy_info: Mutex<Option<ProxyInfo>>,
    container: Mutex<String>,
    user_ip: Mutex<Option<String>>,
    interrupt: Notify,
}

impl AppHooks {
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            config_mocks: RwLock::new(Vec::new()),
            tcs_mocks: RwLock::new(Vec::new()),
            proxy_info: Mutex::new(None),
            container: Mutex::new(String::new()),
            user_ip: Mutex::new(None),
            interrupt: Notify::new(),
        }
    }

    /// Reader side of the mock registries, consumed by the interception
    /// layer when it serves an intercepted flow.
    pub fn active_config_mocks(&self) -> Vec<Mock> {
        self.config_mocks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn active_tcs_mocks(&self) -> Vec<Mock> {
        self.tcs_mocks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The proxy endpoint intercepted flows are redirected to, once
    /// published.
    pub fn proxy_endpoint(&self) -> Option<(Ipv4Addr, u16, Ipv6Addr)> {
        self.proxy_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|info| (info.v4, info.port, info.v6))
    }

    async fn launch_inner(
        &self,
        cmd: String,
        container: String,
        network: String,
        delay: u64,
    ) -> Result<(), AppError> {
        if !container.is_empty() {
            *self.container.lock().unwrap_or_else(|e| e.into_inner()) = container.clone();
        }

        if cmd.is_empty() {
            if container.is_empty() {
                return Err(AppError::CommandError(
                    "no application command provided".to_string(),
                ));
            }
            // DIDE mode: the container is already running; only park until a
            // stop is requested.
            info!(container = %container, "attaching to an already running container");
            self.interrupt.notified().await;
            return Err(AppError::Interrupted);
        }

        if is_docker_cmd(&cmd) && !network.is_empty() {
            debug!(network = %network, "user application joins a docker network");
        }

        info!(cmd = %cmd, "starting user application");
        let mut child = Command::new("sh")
            .args(["-c", &cmd])
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AppError::CommandError(format!("failed to start user application: {err}"))
            })?;
        debug!(pid = ?child.id(), delay, "user application spawned");

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => Err(AppError::Unexpected(
                    "user application exited with status 0".to_string(),
                )),
                Ok(status) => Err(AppError::CommandError(format!(
                    "user application exited with {status}"
                ))),
                Err(err) => Err(AppError::Unexpected(format!(
                    "failed to wait on user application: {err}"
                ))),
            },
            _ = self.interrupt.notified() => {
                if let Err(err) = child.kill().await {
                    warn!(error = %err, "failed to kill user application");
                }
                Err(AppError::Interrupted)
            }
        }
    }

    async fn resolve_user_ip(&self) -> Option<String> {
        if let Some(ip) = self
            .user_ip
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Some(ip);
        }
        let container = self
            .container
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if container.is_empty() {
            return None;
        }

        for _ in 0..IP_RESOLVE_ATTEMPTS {
            if let Some(ip) = inspect_container_ip(&container).await {
                debug!(container = %container, ip = %ip, "resolved user container ip");
                *self.user_ip.lock().unwrap_or_else(|e| e.into_inner()) = Some(ip.clone());
                return Some(ip);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        warn!(container = %container, "failed to resolve user container ip");
        None
    }
}

impl Default for AppHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptHooks for AppHooks {
    fn load(&self, app_cmd: &str, container: &str, pid: u32) -> Result<(), HookError> {
        let mut name = container.to_string();
        if name.is_empty() && is_docker_cmd(app_cmd) {
            name = container_name_from_cmd(app_cmd).unwrap_or_default();
        }
        if !name.is_empty() {
            *self.container.lock().unwrap_or_else(|e| e.into_inner()) = name;
        }
        self.loaded.store(true, Ordering::SeqCst);
        info!(pid, "interception hooks loaded");
        Ok(())
    }

    fn send_proxy_info(&self, v4: Ipv4Addr, port: u16, v6: Ipv6Addr) -> Result<(), HookError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(HookError::NotLoaded);
        }
        *self.proxy_info.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(ProxyInfo { v4, port, v6 });
        debug!(%v4, port, %v6, "published proxy info to the interception layer");
        Ok(())
    }

    fn set_config_mocks(&self, mocks: Vec<Mock>) {
        *self.config_mocks.write().unwrap_or_else(|e| e.into_inner()) = mocks;
    }

    fn set_tcs_mocks(&self, mocks: Vec<Mock>) {
        *self.tcs_mocks.write().unwrap_or_else(|e| e.into_inner()) = mocks;
    }

    fn launch_user_application<'a>(
        &'a self,
        cmd: &str,
        container: &str,
        network: &str,
        delay: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        let cmd = cmd.to_string();
        let container = container.to_string();
        let network = network.to_string();
        Box::pin(self.launch_inner(cmd, container, network, delay))
    }

    fn stop_user_application(&self) {
        self.interrupt.notify_one();
    }

    fn user_ip(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(self.resolve_user_ip())
    }

    fn is_docker_related_cmd(&self, cmd: &str) -> bool {
        is_docker_cmd(cmd)
    }

    fn stop(&self, graceful: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if !graceful {
            self.interrupt.notify_one();
        }
        self.set_config_mocks(Vec::new());
        self.set_tcs_mocks(Vec::new());
        info!(graceful, "interception hooks stopped");
    }

    fn recover(&self, routine_id: u64) {
        warn!(routine_id, "recovered a panicked replay routine");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockUsage;

    fn mock(name: &str) -> Mock {
        Mock {
            name: name.into(),
            usage: MockUsage::TestCase,
            req_timestamp: None,
            res_timestamp: None,
            spec: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_docker_command_detection() {
        assert!(is_docker_cmd("docker run --name app image"));
        assert!(is_docker_cmd("sudo docker-compose up"));
        assert!(is_docker_cmd("  docker compose up app"));
        assert!(!is_docker_cmd("cargo run"));
        assert!(!is_docker_cmd("./dockerish-binary"));
    }

    #[test]
    fn test_container_name_parsing() {
        assert_eq!(
            container_name_from_cmd("docker run --name my-app -p 80:80 img"),
            Some("my-app".to_string())
        );
        assert_eq!(
            container_name_from_cmd("docker run --name=my-app img"),
            Some("my-app".to_string())
        );
        assert_eq!(container_name_from_cmd("docker run img"), None);
    }

    #[test]
    fn test_mock_install_fully_replaces_previous_set() {
        let hooks = AppHooks::new();
        hooks.set_tcs_mocks(vec![mock("a"), mock("b")]);
        hooks.set_tcs_mocks(vec![mock("c")]);

        let names: Vec<_> = hooks
            .active_tcs_mocks()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(names, vec!["c"]);
    }

    #[test]
    fn test_proxy_info_requires_loaded_hooks() {
        let hooks = AppHooks::new();
        let err = hooks.send_proxy_info(Ipv4Addr::LOCALHOST, 16789, Ipv6Addr::UNSPECIFIED);
        assert!(matches!(err, Err(HookError::NotLoaded)));

        hooks.load("cargo run", "", 0).unwrap();
        hooks
            .send_proxy_info(Ipv4Addr::LOCALHOST, 16789, Ipv6Addr::UNSPECIFIED)
            .unwrap();
        assert_eq!(
            hooks.proxy_endpoint(),
            Some((Ipv4Addr::LOCALHOST, 16789, Ipv6Addr::UNSPECIFIED))
        );
    }

    #[tokio::test]
    async fn test_failing_command_maps_to_command_error() {
        let hooks = AppHooks::new();
        let err = hooks
            .launch_user_application("exit 3", "", "", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CommandError(_)));
    }

    #[tokio::test]
    async fn test_clean_exit_maps_to_unexpected() {
        let hooks = AppHooks::new();
        let err = hooks
            .launch_user_application("true", "", "", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unexpected(_)));
    }

    #[tokio::test]
    async fn test_stop_interrupts_a_running_application() {
        let hooks = std::sync::Arc::new(AppHooks::new());
        let launched = {
            let hooks = hooks.clone();
            tokio::spawn(async move {
                hooks
                    .launch_user_application("sleep 30", "", "", 0)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        hooks.stop_user_application();

        let err = launched.await.unwrap().unwrap_err();
        assert_eq!(err, AppError::Interrupted);
    }
}
