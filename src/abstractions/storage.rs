use std::path::Path;

use thiserror::Error;

use crate::domain::{Mock, TestCase, TestReport, TestResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("duplicate test case name `{name}` in {set}")]
    DuplicateCase { set: String, name: String },
    #[error("no results recorded for report `{0}`")]
    UnknownReport(String),
}

/// Read side of the session store: discovery plus case and mock loading.
pub trait SessionStore: Send + Sync {
    /// Names of the recorded test sets under `path`, in recorded order.
    fn read_session_indices(&self, path: &Path) -> Result<Vec<String>, StoreError>;

    /// All cases of one set, in recorded order. Duplicate case names are a
    /// load error.
    fn read_testcases(&self, set_dir: &Path) -> Result<Vec<TestCase>, StoreError>;

    /// All mocks of one set, split into (config mocks, test-case mocks).
    fn read_mocks(&self, set_dir: &Path) -> Result<(Vec<Mock>, Vec<Mock>), StoreError>;
}

/// Write side: durable reports plus the in-flight per-case result log.
///
/// `set_result` appends under one internal critical section; callers never
/// hold a lock across anything else.
pub trait ReportStore: Send + Sync {
    fn write(&self, dir: &Path, report: &TestReport) -> Result<(), StoreError>;

    fn set_result(&self, report_name: &str, result: TestResult);

    fn get_results(&self, report_name: &str) -> Result<Vec<TestResult>, StoreError>;
}
