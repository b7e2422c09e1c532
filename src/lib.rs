//! Replay recorded API traffic against a user-supplied application and
//! decide, per test case, whether the live response matches the recorded
//! one modulo declared noise.

pub mod abstractions;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod hooks;
pub mod proxy;
pub mod store;
pub mod telemetry;
