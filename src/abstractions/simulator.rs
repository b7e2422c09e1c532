use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::domain::{HttpResp, TestCase};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid recorded request: {0}")]
    InvalidRequest(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Drives one recorded request against the running application.
pub trait Simulator: Send + Sync {
    fn simulate<'a>(
        &'a self,
        case: &'a TestCase,
        api_timeout: u64,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResp, SimulationError>> + Send + 'a>>;
}
