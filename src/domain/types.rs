use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema version tag written into every persisted report.
pub const API_VERSION: &str = "api.replayman.io/v1";

/// Process-wide operating mode. Replay runs always thread `Test`; `Record`
/// exists for the collaborators that share these artifact types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Record,
    Test,
}

/// Kind of a recorded interaction. Only HTTP replay is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Http,
}

fn default_proto_major() -> u32 {
    1
}

fn default_proto_minor() -> u32 {
    1
}

/// Snapshot of a recorded HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpReq {
    pub method: String,
    #[serde(default = "default_proto_major")]
    pub proto_major: u32,
    #[serde(default = "default_proto_minor")]
    pub proto_minor: u32,
    pub url: String,
    #[serde(default)]
    pub url_params: HashMap<String, String>,
    #[serde(default)]
    pub header: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
}

/// Snapshot of a recorded HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResp {
    pub status_code: u16,
    #[serde(default)]
    pub status_message: String,
    #[serde(default = "default_proto_major")]
    pub proto_major: u32,
    #[serde(default = "default_proto_minor")]
    pub proto_minor: u32,
    #[serde(default)]
    pub header: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
}

/// One recorded interaction: the request to replay, the response that was
/// observed at recording time, and the noise selectors declared for it.
///
/// The `req_timestamp`/`res_timestamp` pair is the case's recording window;
/// mock selection scopes test-case mocks to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    pub kind: Kind,
    #[serde(default)]
    pub req_timestamp: Option<i64>,
    #[serde(default)]
    pub res_timestamp: Option<i64>,
    pub http_req: HttpReq,
    pub http_resp: HttpResp,
    #[serde(default)]
    pub noise: Vec<String>,
}

/// Whether a mock is always active for the set or scoped to the cases whose
/// recording window contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MockUsage {
    Config,
    TestCase,
}

/// A recorded dependency interaction served during replay in place of the
/// real dependency call. The `spec` payload is opaque to the replay core;
/// the interception layer interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mock {
    pub name: String,
    pub usage: MockUsage,
    #[serde(default)]
    pub req_timestamp: Option<i64>,
    #[serde(default)]
    pub res_timestamp: Option<i64>,
    #[serde(default)]
    pub spec: serde_json::Value,
}

/// Run-level noise configuration: body paths and header names whose
/// differences must not fail a case. An empty value list makes the ignore
/// unconditional; a non-empty list scopes it to matching values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    #[serde(default)]
    pub body: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub header: HashMap<String, Vec<String>>,
}

impl NoiseConfig {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.header.is_empty()
    }
}
