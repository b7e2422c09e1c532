pub mod report;
pub mod types;

pub use report::{
    BodyResult, BodyType, CaseResult, Header, HeaderResult, IntResult, TestReport, TestResult,
    TestRunStatus, TestStatus,
};
pub use types::{
    HttpReq, HttpResp, Kind, Mock, MockUsage, Mode, NoiseConfig, TestCase, API_VERSION,
};
