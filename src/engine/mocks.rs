use tracing::debug;

use crate::domain::{Mock, TestCase};

/// Narrows the set's test-case mocks to those temporally relevant to one
/// case: a mock qualifies when its recorded window lies inside the case's
/// own request/response window (inclusive on both ends).
///
/// Cases recorded before timestamps existed carry no window; the full mock
/// list is kept for them. Likewise a mock without timestamps cannot be
/// proven unrelated and is retained. Recorded order and timestamp ties are
/// preserved.
pub fn filter_tcs_mocks(case: &TestCase, mocks: &[Mock]) -> Vec<Mock> {
    let (Some(req_ts), Some(res_ts)) = (case.req_timestamp, case.res_timestamp) else {
        debug!(
            case = %case.name,
            "request timestamps are missing for the testcase, serving all test-case mocks"
        );
        return mocks.to_vec();
    };

    mocks
        .iter()
        .filter(|mock| match (mock.req_timestamp, mock.res_timestamp) {
            (Some(mock_req), Some(mock_res)) => mock_req >= req_ts && mock_res <= res_ts,
            _ => true,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HttpReq, HttpResp, Kind, MockUsage};
    use std::collections::HashMap;

    fn case_with_window(req: Option<i64>, res: Option<i64>) -> TestCase {
        TestCase {
            name: "test-1".into(),
            kind: Kind::Http,
            req_timestamp: req,
            res_timestamp: res,
            http_req: HttpReq {
                method: "GET".into(),
                proto_major: 1,
                proto_minor: 1,
                url: "http://localhost/x".into(),
                url_params: HashMap::new(),
                header: HashMap::new(),
                body: String::new(),
            },
            http_resp: HttpResp {
                status_code: 200,
                status_message: String::new(),
                proto_major: 1,
                proto_minor: 1,
                header: HashMap::new(),
                body: String::new(),
            },
            noise: vec![],
        }
    }

    fn mock(name: &str, req: Option<i64>, res: Option<i64>) -> Mock {
        Mock {
            name: name.into(),
            usage: MockUsage::TestCase,
            req_timestamp: req,
            res_timestamp: res,
            spec: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_keeps_only_mocks_inside_the_case_window() {
        let case = case_with_window(Some(100), Some(200));
        let mocks = vec![
            mock("before", Some(50), Some(90)),
            mock("inside", Some(110), Some(190)),
            mock("overlapping-end", Some(150), Some(250)),
            mock("at-bounds", Some(100), Some(200)),
        ];

        let filtered = filter_tcs_mocks(&case, &mocks);
        let names: Vec<_> = filtered.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["inside", "at-bounds"]);
    }

    #[test]
    fn test_preserves_recorded_order_and_ties() {
        let case = case_with_window(Some(100), Some(200));
        let mocks = vec![
            mock("first", Some(120), Some(130)),
            mock("tie-a", Some(150), Some(150)),
            mock("tie-b", Some(150), Some(150)),
            mock("last", Some(160), Some(170)),
        ];

        let filtered = filter_tcs_mocks(&case, &mocks);
        let names: Vec<_> = filtered.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["first", "tie-a", "tie-b", "last"]);
    }

    #[test]
    fn test_case_without_window_keeps_everything() {
        let case = case_with_window(None, None);
        let mocks = vec![mock("a", Some(1), Some(2)), mock("b", Some(900), Some(901))];
        assert_eq!(filter_tcs_mocks(&case, &mocks).len(), 2);
    }

    #[test]
    fn test_mock_without_timestamps_is_retained() {
        let case = case_with_window(Some(100), Some(200));
        let mocks = vec![mock("untimed", None, None), mock("outside", Some(1), Some(2))];

        let filtered = filter_tcs_mocks(&case, &mocks);
        let names: Vec<_> = filtered.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["untimed"]);
    }
}
