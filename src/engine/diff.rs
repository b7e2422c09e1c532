use std::fmt::Write as _;
use std::sync::Mutex;

use colored::Colorize;

use crate::domain::{CaseResult, TestRunStatus};
use crate::engine::compare::DiffEntry;

/// Failure renders from concurrently rendered cases must not interleave on
/// stdout.
static RENDER_LOCK: Mutex<()> = Mutex::new(());

fn text_or(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<missing>".to_string(),
    }
}

/// Renders one failed comparison as a three-section diff: status code,
/// headers, body.
pub struct DiffPrinter<'a> {
    case_name: &'a str,
    result: &'a CaseResult,
    body_diffs: &'a [DiffEntry],
}

impl<'a> DiffPrinter<'a> {
    pub fn new(case_name: &'a str, result: &'a CaseResult, body_diffs: &'a [DiffEntry]) -> Self {
        Self {
            case_name,
            result,
            body_diffs,
        }
    }

    fn render_to_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{}",
            format!("testrun failed for testcase with id: {}", self.case_name)
                .red()
                .bold()
        );
        let _ = writeln!(
            out,
            "--------------------------------------------------------------------"
        );

        if !self.result.status_code.normal {
            let _ = writeln!(out, "{}", "status code".underline());
            let _ = writeln!(
                out,
                "  expected: {}",
                self.result.status_code.expected.to_string().green()
            );
            let _ = writeln!(
                out,
                "  actual:   {}",
                self.result.status_code.actual.to_string().red()
            );
        }

        let failed_headers: Vec<_> = self
            .result
            .headers_result
            .iter()
            .filter(|h| !h.normal)
            .collect();
        if !failed_headers.is_empty() {
            let _ = writeln!(out, "{}", "headers".underline());
            for header in failed_headers {
                let _ = writeln!(
                    out,
                    "  {}: expected {} | actual {}",
                    header.expected.key,
                    format!("{:?}", header.expected.value).green(),
                    format!("{:?}", header.actual.value).red()
                );
            }
        }

        if self.result.body_result.iter().any(|b| !b.normal) {
            let _ = writeln!(out, "{}", "body".underline());
            if self.body_diffs.is_empty() {
                let body = &self.result.body_result[0];
                let _ = writeln!(out, "  expected: {}", body.expected.green());
                let _ = writeln!(out, "  actual:   {}", body.actual.red());
            } else {
                for diff in self.body_diffs {
                    let _ = writeln!(
                        out,
                        "  {}: expected {} | actual {}",
                        diff.path,
                        text_or(&diff.expected).green(),
                        text_or(&diff.actual).red()
                    );
                }
            }
        }
        out
    }

    /// Prints the diff under the shared render lock.
    pub fn render(&self) {
        let rendered = self.render_to_string();
        let _guard = RENDER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        println!("{rendered}");
    }
}

/// Prints the end-of-set summary block in the pass or fail color scheme.
pub fn print_set_summary(
    test_set: &str,
    total: usize,
    success: usize,
    failure: usize,
    status: TestRunStatus,
) {
    let block = format!(
        "\n <=========================================> \n  TESTRUN SUMMARY. For the test-set: {test_set}\n\tTotal tests: {total}\n\tTotal test passed: {success}\n\tTotal test failed: {failure}\n <=========================================> \n",
    );
    let _guard = RENDER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if status == TestRunStatus::Passed {
        println!("{}", block.green());
    } else {
        println!("{}", block.red());
    }
}
