use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;

use crate::domain::NoiseConfig;
use crate::engine::orchestrator::ReplayConfig;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read noise config {path}: {message}")]
    NoiseRead { path: String, message: String },
    #[error("failed to parse noise config {path}: {message}")]
    NoiseParse { path: String, message: String },
}

/// Replay invocation surface. Exit code 0 means every replayed case passed.
#[derive(Debug, Parser)]
#[command(
    name = "replayman",
    version,
    about = "Replay recorded API traffic against your application and diff the live responses"
)]
pub struct Cli {
    /// Root path of the recorded sessions.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Port the interception proxy binds to.
    #[arg(long, default_value_t = 16789)]
    pub proxy_port: u16,

    /// Directory test reports are written to. Defaults to
    /// <path>/testReports.
    #[arg(long)]
    pub report_path: Option<PathBuf>,

    /// Command that starts the user application.
    #[arg(long, default_value = "")]
    pub app_cmd: String,

    /// Test sets to replay, comma separated. All recorded sets when empty.
    #[arg(long, value_delimiter = ',')]
    pub test_sets: Vec<String>,

    /// Name of the application container when it is already running.
    #[arg(long, default_value = "")]
    pub container_name: String,

    /// Docker network the application joins.
    #[arg(long, default_value = "")]
    pub network_name: String,

    /// Seconds to wait for the application to become ready.
    #[arg(long, default_value_t = 5)]
    pub delay: u64,

    /// Ports the proxy forwards unmodified, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub passthrough_ports: Vec<u16>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 5)]
    pub api_timeout: u64,

    /// JSON file carrying the run-level noise configuration.
    #[arg(long)]
    pub noise_config: Option<PathBuf>,

    /// Pid of an externally attached application. 0 means none.
    #[arg(long, default_value_t = 0)]
    pub pid: u32,
}

pub fn load_noise_config(path: &Path) -> Result<NoiseConfig, CliError> {
    let raw = fs::read_to_string(path).map_err(|err| CliError::NoiseRead {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|err| CliError::NoiseParse {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

impl Cli {
    pub fn into_config(self) -> Result<ReplayConfig, CliError> {
        let noise = match &self.noise_config {
            Some(path) => load_noise_config(path)?,
            None => NoiseConfig::default(),
        };
        Ok(ReplayConfig {
            path: self.path,
            proxy_port: self.proxy_port,
            report_path: self.report_path,
            app_cmd: self.app_cmd,
            test_sets: self.test_sets,
            container_name: self.container_name,
            network_name: self.network_name,
            delay: self.delay,
            passthrough_ports: self.passthrough_ports,
            api_timeout: self.api_timeout,
            noise,
            pid: self.pid,
        })
    }
}
