//! Argument parsing and output formatting for the `primary-proxy` binary.

use anyhow::{Context, Result, anyhow, bail};

use crate::proxy::{CapturedRequest, OutboundResponse, Payload};

/// Parses `Name: value`.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid header '{}'. Expected 'Name: value'.", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header '{}'. Name is empty.", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parses `key=value`. The value may be empty or contain further `=`.
pub fn parse_pair(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid pair '{}'. Expected 'key=value'.", raw))?;
    if key.is_empty() {
        bail!("Invalid pair '{}'. Key is empty.", raw);
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parses a JSON object body.
pub fn parse_payload(raw: &str) -> Result<Payload> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .context("Request body is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("Request body must be a JSON object, got: {}", other),
    }
}

/// Assembles the caller context from repeated flags.
///
/// Returns `None` when no flag was given, which makes the forward an
/// internal one.
pub fn build_request(
    headers: &[String],
    query: &[String],
    cookies: &[String],
) -> Result<Option<CapturedRequest>> {
    let mut request = CapturedRequest::new();
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }
    for raw in query {
        let (key, value) = parse_pair(raw)?;
        request = request.with_query(key, value);
    }
    for raw in cookies {
        let (name, value) = parse_pair(raw)?;
        request = request.with_cookie(name, value);
    }

    if request.is_empty() {
        Ok(None)
    } else {
        Ok(Some(request))
    }
}

/// Status line, headers, a blank line, then the body.
pub fn render_response(response: &OutboundResponse) -> String {
    let mut out = format!("HTTP {}\n", response.status);
    for (name, value) in &response.headers {
        out.push_str(&format!("{}: {}\n", name, value));
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&response.body));
    out
}
