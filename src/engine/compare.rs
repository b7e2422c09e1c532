use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::domain::{
    BodyResult, BodyType, CaseResult, Header, HeaderResult, HttpResp, IntResult, NoiseConfig,
    TestCase,
};

/// Merged noise mask for one comparison. Body keys are dotted paths into the
/// JSON body, header keys are lowercased header names. An empty fragment
/// list ignores the path unconditionally; a non-empty list only ignores
/// values matching one of the fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoiseMask {
    pub body: HashMap<String, Vec<String>>,
    pub header: HashMap<String, Vec<String>>,
    pub skip_body: bool,
}

/// One body-level difference, kept for the failure render.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    pub path: String,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
}

/// Outcome of comparing one response pair.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub pass: bool,
    pub result: CaseResult,
    pub body_diffs: Vec<DiffEntry>,
}

/// Merges the case's dotted noise selectors with the run-level noise
/// configuration. Case entries are unconditional ignores; run entries carry
/// their value fragments and take precedence on a shared path.
pub fn resolve_noise(case_noise: &[String], run_noise: &NoiseConfig) -> NoiseMask {
    let mut mask = NoiseMask::default();

    for entry in case_noise {
        let parts: Vec<&str> = entry.split('.').collect();
        match parts.as_slice() {
            ["body"] => mask.skip_body = true,
            ["body", rest @ ..] => {
                mask.body.insert(rest.join("."), Vec::new());
            }
            ["header", ..] => {
                let last = parts[parts.len() - 1];
                mask.header.insert(last.to_lowercase(), Vec::new());
            }
            _ => {}
        }
    }

    for (path, values) in &run_noise.body {
        mask.body.insert(path.clone(), values.clone());
    }
    for (name, values) in &run_noise.header {
        mask.header.insert(name.to_lowercase(), values.clone());
    }
    mask
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A fragment is tried as a regular expression first; an invalid pattern
/// degrades to substring matching.
fn fragment_matches(value: &str, fragments: &[String]) -> bool {
    fragments.iter().any(|fragment| match Regex::new(fragment) {
        Ok(re) => re.is_match(value),
        Err(_) => value.contains(fragment.as_str()),
    })
}

fn noisy_value(value: Option<&Value>, fragments: &[String]) -> bool {
    value.is_some_and(|v| fragment_matches(&value_as_text(v), fragments))
}

/// Removes noisy paths from both trees in lockstep. Arrays are descended
/// element-wise without extending the path, so `items.ts` prunes `ts` in
/// every element of `items`.
fn prune_noise(expected: &mut Value, actual: &mut Value, prefix: &str, noise: &NoiseMask) {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            let keys: Vec<String> = exp.keys().chain(act.keys()).cloned().collect();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if let Some(fragments) = noise.body.get(&path) {
                    let masked = fragments.is_empty()
                        || (noisy_value(exp.get(&key), fragments)
                            && noisy_value(act.get(&key), fragments));
                    if masked {
                        exp.remove(&key);
                        act.remove(&key);
                        continue;
                    }
                }
                if let (Some(ev), Some(av)) = (exp.get_mut(&key), act.get_mut(&key)) {
                    prune_noise(ev, av, &path, noise);
                }
            }
        }
        (Value::Array(exp), Value::Array(act)) => {
            for (ev, av) in exp.iter_mut().zip(act.iter_mut()) {
                prune_noise(ev, av, prefix, noise);
            }
        }
        _ => {}
    }
}

/// Structural comparison of two JSON bodies under the body-noise mask.
/// Returns pass plus the cleaned forms used for diagnostics.
fn compare_json(
    expected: &str,
    actual: &str,
    noise: &NoiseMask,
) -> Result<(bool, Value, Value), serde_json::Error> {
    let mut exp: Value = serde_json::from_str(expected)?;
    let mut act: Value = serde_json::from_str(actual)?;
    prune_noise(&mut exp, &mut act, "", noise);
    let pass = exp == act;
    Ok((pass, exp, act))
}

/// Walks the cleaned trees and records every differing leaf for rendering.
fn collect_diffs(expected: &Value, actual: &Value, prefix: &str, out: &mut Vec<DiffEntry>) {
    if expected == actual {
        return;
    }
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            let mut keys: Vec<&String> = exp.keys().chain(act.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match (exp.get(key), act.get(key)) {
                    (Some(ev), Some(av)) => collect_diffs(ev, av, &path, out),
                    (ev, av) => out.push(DiffEntry {
                        path,
                        expected: ev.cloned(),
                        actual: av.cloned(),
                    }),
                }
            }
        }
        (Value::Array(exp), Value::Array(act)) if exp.len() == act.len() => {
            for (i, (ev, av)) in exp.iter().zip(act.iter()).enumerate() {
                collect_diffs(ev, av, &format!("{prefix}.{i}"), out);
            }
        }
        _ => out.push(DiffEntry {
            path: prefix.to_string(),
            expected: Some(expected.clone()),
            actual: Some(actual.clone()),
        }),
    }
}

fn header_values(headers: &HashMap<String, Vec<String>>, lower: &str) -> Vec<String> {
    headers
        .iter()
        .find(|(k, _)| k.to_lowercase() == lower)
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

/// Compares the union of expected and actual headers under the header-noise
/// mask. Header names match case-insensitively; value lists compare in
/// recorded order.
fn compare_headers(
    expected: &HashMap<String, Vec<String>>,
    actual: &HashMap<String, Vec<String>>,
    noise: &NoiseMask,
) -> (bool, Vec<HeaderResult>) {
    let mut names: BTreeMap<String, String> = BTreeMap::new();
    for key in expected.keys().chain(actual.keys()) {
        names.entry(key.to_lowercase()).or_insert_with(|| key.clone());
    }

    let mut all_normal = true;
    let mut results = Vec::with_capacity(names.len());
    for (lower, display) in names {
        let expected_vals = header_values(expected, &lower);
        let actual_vals = header_values(actual, &lower);
        let normal = match noise.header.get(&lower) {
            Some(fragments) if fragments.is_empty() => true,
            Some(fragments) => {
                expected_vals == actual_vals
                    || (fragment_matches(&expected_vals.join(", "), fragments)
                        && fragment_matches(&actual_vals.join(", "), fragments))
            }
            None => expected_vals == actual_vals,
        };
        if !normal {
            all_normal = false;
        }
        results.push(HeaderResult {
            normal,
            expected: Header {
                key: display.clone(),
                value: expected_vals,
            },
            actual: Header {
                key: display,
                value: actual_vals,
            },
        });
    }
    (all_normal, results)
}

/// Compares the live response of one case against its recorded response
/// under the merged noise mask. Comparison is pure; only the caller renders.
pub fn compare(case: &TestCase, actual: &HttpResp, run_noise: &NoiseConfig) -> Comparison {
    let mask = resolve_noise(&case.noise, run_noise);
    let expected = &case.http_resp;

    let body_type = if serde_json::from_str::<Value>(&actual.body).is_ok() {
        BodyType::Json
    } else {
        BodyType::Plain
    };

    let mut body_diffs = Vec::new();
    let body_normal = if mask.skip_body {
        true
    } else if body_type == BodyType::Json {
        match compare_json(&expected.body, &actual.body, &mask) {
            Ok((pass, clean_exp, clean_act)) => {
                if !pass {
                    collect_diffs(&clean_exp, &clean_act, "", &mut body_diffs);
                }
                pass
            }
            Err(err) => {
                warn!(case = %case.name, error = %err, "failed to compute json body diff");
                false
            }
        }
    } else {
        expected.body == actual.body
    };

    let (headers_normal, headers_result) = compare_headers(&expected.header, &actual.header, &mask);
    let status_normal = expected.status_code == actual.status_code;

    let result = CaseResult {
        status_code: IntResult {
            normal: status_normal,
            expected: expected.status_code,
            actual: actual.status_code,
        },
        headers_result,
        body_result: vec![BodyResult {
            normal: body_normal,
            body_type,
            expected: expected.body.clone(),
            actual: actual.body.clone(),
        }],
    };

    Comparison {
        pass: status_normal && body_normal && headers_normal,
        result,
        body_diffs,
    }
}
