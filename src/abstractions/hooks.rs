use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::pin::Pin;

use thiserror::Error;

use crate::domain::Mock;

/// Terminal error of the supervised user application.
///
/// The runner maps these onto its terminal status: `Interrupted` becomes
/// `UserAbort`, `CommandError` becomes `FaultUserApp`, everything else
/// becomes `AppHalted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("user application terminated by replayman")]
    Interrupted,
    #[error("user application command failed: {0}")]
    CommandError(String),
    #[error("user application terminated unexpectedly: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("interception layer is not loaded")]
    NotLoaded,
    #[error("failed to load interception hooks: {0}")]
    LoadFailed(String),
}

/// Contract of the traffic-interception layer.
///
/// The replay engine is the single owner of an implementation; mock sets are
/// installed by the runner and read by the interception side. A new install
/// fully replaces the previous set.
pub trait InterceptHooks: Send + Sync {
    /// Bring up the interception layer and bind it to the application's
    /// process lineage.
    fn load(&self, app_cmd: &str, container: &str, pid: u32) -> Result<(), HookError>;

    /// Publish the proxy's addresses so intercepted flows can be redirected.
    fn send_proxy_info(&self, v4: Ipv4Addr, port: u16, v6: Ipv6Addr) -> Result<(), HookError>;

    /// Replace the always-active mock set.
    fn set_config_mocks(&self, mocks: Vec<Mock>);

    /// Replace the per-case mock set.
    fn set_tcs_mocks(&self, mocks: Vec<Mock>);

    /// Launch and supervise the user application. Resolves only when the
    /// application terminates; a clean stop requested through
    /// [`InterceptHooks::stop_user_application`] resolves to
    /// `Err(AppError::Interrupted)`.
    fn launch_user_application<'a>(
        &'a self,
        cmd: &str,
        container: &str,
        network: &str,
        delay: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Request termination of a launched user application.
    fn stop_user_application(&self);

    /// IP of the application's container, when it runs inside one.
    fn user_ip(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>>;

    /// Whether the command launches the application through docker.
    fn is_docker_related_cmd(&self, cmd: &str) -> bool;

    /// Tear the interception layer down. `graceful` is false when a signal
    /// forced the teardown.
    fn stop(&self, graceful: bool);

    /// Resynchronization point invoked after a panic was caught in a replay
    /// routine.
    fn recover(&self, routine_id: u64);
}
