pub mod hooks;
pub mod simulator;
pub mod storage;

pub use hooks::{AppError, HookError, InterceptHooks};
pub use simulator::{SimulationError, Simulator};
pub use storage::{ReportStore, SessionStore, StoreError};
