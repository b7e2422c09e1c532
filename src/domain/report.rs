use serde::{Deserialize, Serialize};

use super::types::{HttpReq, HttpResp, Kind};

/// Terminal (or in-flight) status of one test-set run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestRunStatus {
    Running,
    Passed,
    Failed,
    UserAbort,
    FaultUserApp,
    AppHalted,
}

impl TestRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestRunStatus::Running => "Running",
            TestRunStatus::Passed => "Passed",
            TestRunStatus::Failed => "Failed",
            TestRunStatus::UserAbort => "UserAbort",
            TestRunStatus::FaultUserApp => "FaultUserApp",
            TestRunStatus::AppHalted => "AppHalted",
        }
    }
}

/// Status of one executed case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    Pending,
    Passed,
    Failed,
}

/// Status-code outcome of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntResult {
    pub normal: bool,
    pub expected: u16,
    pub actual: u16,
}

/// One header as recorded on either side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub key: String,
    pub value: Vec<String>,
}

/// Per-header outcome of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderResult {
    pub normal: bool,
    pub expected: Header,
    pub actual: Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyType {
    Plain,
    Json,
}

/// Body outcome of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyResult {
    pub normal: bool,
    #[serde(rename = "type")]
    pub body_type: BodyType,
    pub expected: String,
    pub actual: String,
}

/// Full per-field outcome of comparing one response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub status_code: IntResult,
    pub headers_result: Vec<HeaderResult>,
    pub body_result: Vec<BodyResult>,
}

impl CaseResult {
    /// A case passes iff every compared component is normal.
    pub fn passed(&self) -> bool {
        self.status_code.normal
            && self.body_result.iter().all(|b| b.normal)
            && self.headers_result.iter().all(|h| h.normal)
    }
}

/// One entry in a test report: the case that ran, its request/response
/// snapshots, and the comparison outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub kind: Kind,
    pub name: String,
    pub status: TestStatus,
    pub started: i64,
    pub completed: i64,
    pub test_case_id: String,
    pub test_case_path: String,
    pub req: HttpReq,
    pub res: HttpResp,
    #[serde(default)]
    pub noise: Vec<String>,
    pub result: CaseResult,
}

/// Durable accumulator for one test set, written at set start (Running) and
/// again at set completion with the final totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub version: String,
    pub name: String,
    pub test_set: String,
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub status: TestRunStatus,
    #[serde(default)]
    pub tests: Vec<TestResult>,
}
