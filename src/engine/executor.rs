use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::domain::{Kind, TestCase, TestResult, TestRunStatus, TestStatus};
use crate::engine::compare;
use crate::engine::diff::DiffPrinter;
use crate::engine::http::replace_host_with_ip;
use crate::engine::runner::RunContext;

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or_default()
}

/// Per-set tally mutated case by case. A failed case makes the running
/// status stick at `Failed`.
#[derive(Debug)]
pub struct SetTally {
    pub success: usize,
    pub failure: usize,
    pub status: TestRunStatus,
}

impl SetTally {
    pub fn new() -> Self {
        Self {
            success: 0,
            failure: 0,
            status: TestRunStatus::Passed,
        }
    }
}

impl Default for SetTally {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulates one recorded case against the running application, classifies
/// the outcome, and appends a result to the set's report.
pub async fn execute_case(
    ctx: &RunContext,
    test_set: &str,
    report_name: &str,
    user_ip: Option<&str>,
    case: &TestCase,
    tally: &mut SetTally,
) {
    match case.kind {
        Kind::Http => execute_http(ctx, test_set, report_name, user_ip, case, tally).await,
    }
}

async fn execute_http(
    ctx: &RunContext,
    test_set: &str,
    report_name: &str,
    user_ip: Option<&str>,
    case: &TestCase,
    tally: &mut SetTally,
) {
    let started = now_secs();

    // Recorded URLs may carry container names unresolvable from this
    // process; in docker mode the hostname is swapped for the container IP.
    let mut case = case.clone();
    if let Some(ip) = user_ip {
        case.http_req.url = replace_host_with_ip(&case.http_req.url, ip);
        debug!(url = %case.http_req.url, "replaced url host for the docker environment");
    }

    let response = match ctx.simulator.simulate(&case, ctx.cfg.api_timeout).await {
        Ok(response) => response,
        Err(err) => {
            info!(
                testcase = %case.name,
                test_set = %test_set,
                error = %err,
                passed = false,
                "result"
            );
            tally.failure += 1;
            tally.status = TestRunStatus::Failed;
            return;
        }
    };

    let comparison = compare::compare(&case, &response, &ctx.cfg.noise);
    info!(
        testcase = %case.name,
        test_set = %test_set,
        passed = comparison.pass,
        "result"
    );

    let status = if comparison.pass {
        tally.success += 1;
        TestStatus::Passed
    } else {
        DiffPrinter::new(&case.name, &comparison.result, &comparison.body_diffs).render();
        tally.failure += 1;
        tally.status = TestRunStatus::Failed;
        TestStatus::Failed
    };

    ctx.report_store.set_result(
        report_name,
        TestResult {
            kind: Kind::Http,
            name: report_name.to_string(),
            status,
            started,
            completed: now_secs(),
            test_case_id: case.name.clone(),
            test_case_path: ctx.cfg.path.join(test_set).display().to_string(),
            req: case.http_req.clone(),
            res: case.http_resp.clone(),
            noise: case.noise.clone(),
            result: comparison.result,
        },
    );
}
