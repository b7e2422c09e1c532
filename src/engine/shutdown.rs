use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};
use tracing::warn;

use crate::abstractions::InterceptHooks;
use crate::proxy::Proxy;
use crate::telemetry::RunTelemetry;

/// Cheap clonable view of the coordinator's abort state, polled by the
/// runner between cases.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    forced: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn aborted(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }
}

/// Demultiplexes OS termination signals and normal completion into a single
/// teardown path. The listener resolves exactly once, so teardown runs
/// exactly once regardless of how many stimuli arrive.
pub struct ShutdownCoordinator {
    forced: Arc<AtomicBool>,
    normal: Arc<Notify>,
    exit_rx: oneshot::Receiver<()>,
}

impl ShutdownCoordinator {
    /// Spawns the listener. On a signal it stops the hooks forcefully, emits
    /// the telemetry totals, stops the proxy, and unblocks
    /// [`ShutdownCoordinator::wait_exit`]. On normal completion it only
    /// emits telemetry; the orchestrator owns the graceful teardown.
    pub fn install(
        hooks: Arc<dyn InterceptHooks>,
        proxy: Proxy,
        telemetry: Arc<RunTelemetry>,
    ) -> Self {
        let forced = Arc::new(AtomicBool::new(false));
        let normal = Arc::new(Notify::new());
        let (exit_tx, exit_rx) = oneshot::channel();

        let listener_forced = forced.clone();
        let listener_normal = normal.clone();
        tokio::spawn(async move {
            match wait_for_stimulus(&listener_normal).await {
                Some(signal) => {
                    warn!(signal, "termination signal received, tearing the run down");
                    listener_forced.store(true, Ordering::SeqCst);
                    hooks.stop(false);
                    telemetry.emit();
                    proxy.stop();
                    let _ = exit_tx.send(());
                }
                None => telemetry.emit(),
            }
        });

        Self {
            forced,
            normal,
            exit_rx,
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            forced: self.forced.clone(),
        }
    }

    pub fn aborted(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }

    /// Takes the listener down its normal branch.
    pub fn complete_normally(&self) {
        self.normal.notify_one();
    }

    /// Blocks until the signal-driven teardown finished. Resolves
    /// immediately when the listener already took the normal branch.
    pub async fn wait_exit(self) {
        let _ = self.exit_rx.await;
    }
}

#[cfg(unix)]
async fn wait_for_stimulus(normal: &Notify) -> Option<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let streams = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
        signal(SignalKind::quit()),
    );
    match streams {
        (Ok(mut int_s), Ok(mut term_s), Ok(mut hup_s), Ok(mut quit_s)) => {
            tokio::select! {
                _ = int_s.recv() => Some("SIGINT"),
                _ = term_s.recv() => Some("SIGTERM"),
                _ = hup_s.recv() => Some("SIGHUP"),
                _ = quit_s.recv() => Some("SIGQUIT"),
                _ = normal.notified() => None,
            }
        }
        _ => {
            warn!("failed to register signal listeners, falling back to ctrl-c");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => Some("SIGINT"),
                _ = normal.notified() => None,
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stimulus(normal: &Notify) -> Option<&'static str> {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => Some("interrupt"),
        _ = normal.notified() => None,
    }
}
