use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use tracing::debug;

use crate::abstractions::{ReportStore, SessionStore, StoreError};
use crate::domain::{Mock, MockUsage, TestCase, TestReport, TestResult};

const TESTS_DIR: &str = "tests";
const MOCKS_FILE: &str = "mocks.json";

fn io_err(path: &Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn parse_err(path: &Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Splits a trailing decimal run off a name, so `test-10` orders after
/// `test-2`.
fn natural_key(name: &str) -> (&str, Option<u64>) {
    let digits = name.len() - name.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    match name[digits..].parse::<u64>() {
        Ok(n) => (&name[..digits], Some(n)),
        Err(_) => (name, None),
    }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ap, an) = natural_key(a);
    let (bp, bn) = natural_key(b);
    ap.cmp(bp).then(an.cmp(&bn)).then(a.cmp(b))
}

/// JSON session store over the recorded directory layout:
/// `<root>/<test-set>/tests/<case>.json` plus `<root>/<test-set>/mocks.json`.
#[derive(Debug, Default)]
pub struct FsSessionStore;

impl FsSessionStore {
    pub fn new() -> Self {
        Self
    }
}

impl SessionStore for FsSessionStore {
    fn read_session_indices(&self, path: &Path) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(path).map_err(|err| io_err(path, err))?;
        let mut sets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_err(path, err))?;
            let is_dir = entry
                .file_type()
                .map_err(|err| io_err(path, err))?
                .is_dir();
            if !is_dir {
                continue;
            }
            if !entry.path().join(TESTS_DIR).is_dir() {
                debug!(dir = %entry.path().display(), "skipping directory without recorded tests");
                continue;
            }
            sets.push(entry.file_name().to_string_lossy().into_owned());
        }
        sets.sort_by(|a, b| natural_cmp(a, b));
        Ok(sets)
    }

    fn read_testcases(&self, set_dir: &Path) -> Result<Vec<TestCase>, StoreError> {
        let tests_dir = set_dir.join(TESTS_DIR);
        let entries = fs::read_dir(&tests_dir).map_err(|err| io_err(&tests_dir, err))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_err(&tests_dir, err))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        // Recorded order is the numeric-aware file-name order.
        files.sort_by(|a, b| {
            let an = a.file_stem().unwrap_or_default().to_string_lossy();
            let bn = b.file_stem().unwrap_or_default().to_string_lossy();
            natural_cmp(&an, &bn)
        });

        let set_name = set_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| set_dir.display().to_string());
        let mut seen = HashSet::new();
        let mut cases = Vec::with_capacity(files.len());
        for path in files {
            let raw = fs::read_to_string(&path).map_err(|err| io_err(&path, err))?;
            let case: TestCase =
                serde_json::from_str(&raw).map_err(|err| parse_err(&path, err))?;
            if !seen.insert(case.name.clone()) {
                return Err(StoreError::DuplicateCase {
                    set: set_name,
                    name: case.name,
                });
            }
            cases.push(case);
        }
        Ok(cases)
    }

    fn read_mocks(&self, set_dir: &Path) -> Result<(Vec<Mock>, Vec<Mock>), StoreError> {
        let path = set_dir.join(MOCKS_FILE);
        if !path.exists() {
            return Ok((Vec::new(), Vec::new()));
        }
        let raw = fs::read_to_string(&path).map_err(|err| io_err(&path, err))?;
        let mocks: Vec<Mock> = serde_json::from_str(&raw).map_err(|err| parse_err(&path, err))?;

        let (config, tcs) = mocks
            .into_iter()
            .partition(|m| m.usage == MockUsage::Config);
        Ok((config, tcs))
    }
}

/// Report store keeping in-flight results in memory and writing the report
/// document to `<dir>/<name>.json`.
#[derive(Debug, Default)]
pub struct FsReportStore {
    results: Mutex<HashMap<String, Vec<TestResult>>>,
}

impl FsReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for FsReportStore {
    fn write(&self, dir: &Path, report: &TestReport) -> Result<(), StoreError> {
        fs::create_dir_all(dir).map_err(|err| io_err(dir, err))?;
        let path = dir.join(format!("{}.json", report.name));
        let raw = serde_json::to_string_pretty(report).map_err(|err| parse_err(&path, err))?;
        fs::write(&path, raw).map_err(|err| io_err(&path, err))
    }

    fn set_result(&self, report_name: &str, result: TestResult) {
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        results
            .entry(report_name.to_string())
            .or_default()
            .push(result);
    }

    fn get_results(&self, report_name: &str) -> Result<Vec<TestResult>, StoreError> {
        let results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        results
            .get(report_name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownReport(report_name.to_string()))
    }
}
