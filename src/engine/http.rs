use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::{Client, Method, Url, Version};
use tracing::{debug, warn};

use crate::abstractions::{SimulationError, Simulator};
use crate::domain::{HttpResp, TestCase};

/// Replaces the hostname of a recorded URL with the resolved container IP.
/// Scheme, port, path and query are preserved. Recorded URLs may carry names
/// that are unresolvable from the testing process.
pub fn replace_host_with_ip(url: &str, ip: &str) -> String {
    if ip.is_empty() {
        warn!("failed to replace url host: container ip is empty");
        return url.to_string();
    }
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.set_host(Some(ip)).is_err() {
        return url.to_string();
    }
    parsed.to_string()
}

fn build_headers(input: &HashMap<String, Vec<String>>) -> Result<HeaderMap, SimulationError> {
    let mut headers = HeaderMap::new();
    for (key, values) in input {
        // reqwest recomputes the length for the replayed body.
        if key.is_empty() || key.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
            continue;
        }
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            SimulationError::InvalidRequest(format!("invalid header name `{key}`: {err}"))
        })?;
        for value in values {
            let value = HeaderValue::from_str(value).map_err(|err| {
                SimulationError::InvalidRequest(format!("invalid header value for `{key}`: {err}"))
            })?;
            headers.append(name.clone(), value);
        }
    }
    Ok(headers)
}

fn build_url(case: &TestCase) -> Result<Url, SimulationError> {
    let mut url = Url::parse(&case.http_req.url)
        .map_err(|err| SimulationError::InvalidRequest(format!("invalid URL: {err}")))?;
    if !case.http_req.url_params.is_empty() {
        let present: HashSet<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &case.http_req.url_params {
            if !present.contains(key) {
                pairs.append_pair(key, value);
            }
        }
    }
    Ok(url)
}

fn proto_of(version: Version) -> (u32, u32) {
    if version == Version::HTTP_09 {
        (0, 9)
    } else if version == Version::HTTP_10 {
        (1, 0)
    } else if version == Version::HTTP_2 {
        (2, 0)
    } else if version == Version::HTTP_3 {
        (3, 0)
    } else {
        (1, 1)
    }
}

async fn response_to_snapshot(response: reqwest::Response) -> Result<HttpResp, SimulationError> {
    let status = response.status();
    let status_message = status.canonical_reason().unwrap_or("Unknown").to_string();
    let (proto_major, proto_minor) = proto_of(response.version());

    let mut header: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in response.headers() {
        let value = value.to_str().unwrap_or("<binary>").to_string();
        header.entry(name.to_string()).or_default().push(value);
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| SimulationError::Transport(format!("failed to read response: {err}")))?;

    Ok(HttpResp {
        status_code: status.as_u16(),
        status_message,
        proto_major,
        proto_minor,
        header,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// reqwest-backed simulator driving one recorded request against the live
/// application.
pub struct HttpSimulator {
    client: Client,
}

impl HttpSimulator {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn simulate_inner(
        &self,
        case: &TestCase,
        api_timeout: u64,
    ) -> Result<HttpResp, SimulationError> {
        let method = Method::from_bytes(case.http_req.method.as_bytes()).map_err(|err| {
            SimulationError::InvalidRequest(format!(
                "invalid method `{}`: {err}",
                case.http_req.method
            ))
        })?;
        let url = build_url(case)?;
        let headers = build_headers(&case.http_req.header)?;

        debug!(case = %case.name, url = %url, "simulating recorded request");

        let mut request = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(Duration::from_secs(api_timeout));
        if !case.http_req.body.is_empty() {
            request = request.body(case.http_req.body.clone());
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                SimulationError::Timeout(api_timeout)
            } else {
                SimulationError::Transport(format!("request failed: {err}"))
            }
        })?;
        response_to_snapshot(response).await
    }
}

impl Default for HttpSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator for HttpSimulator {
    fn simulate<'a>(
        &'a self,
        case: &'a TestCase,
        api_timeout: u64,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResp, SimulationError>> + Send + 'a>> {
        Box::pin(self.simulate_inner(case, api_timeout))
    }
}
