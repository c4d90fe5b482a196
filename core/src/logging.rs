//! Wire logging for requests that ask for it.
//!
//! The blocks are built by the pure `format_*` functions and emitted on the
//! `http_request_core::wire` target, so a subscriber can route or silence them
//! independently of the engine's own diagnostics.

use std::fmt::Write;
use std::time::Duration;

use crate::http::{PreparedRequest, ResponseHead};

pub const WIRE_TARGET: &str = "http_request_core::wire";

pub fn format_request(request: &PreparedRequest) -> String {
    let mut out = format!("---> {} {}\n", request.method, request.url);
    write_headers(&mut out, &request.headers);
    let body = request.body.as_deref().unwrap_or_default();
    write_body(&mut out, body);
    let _ = write!(out, "---> END ({} bytes)", body.len());
    out
}

pub fn format_response(
    request: &PreparedRequest,
    head: &ResponseHead,
    elapsed: Duration,
    body: &[u8],
) -> String {
    let mut out = format!(
        "<--- {} {} ({}, {:.2}s)\n",
        request.method,
        request.url,
        head.status,
        elapsed.as_secs_f64()
    );
    write_headers(&mut out, &head.headers);
    write_body(&mut out, body);
    let _ = write!(out, "<--- END ({} bytes)", body.len());
    out
}

pub fn log_request(request: &PreparedRequest) {
    tracing::info!(target: WIRE_TARGET, "{}", format_request(request));
}

pub fn log_response(
    request: &PreparedRequest,
    head: &ResponseHead,
    elapsed: Duration,
    body: &[u8],
) {
    tracing::info!(
        target: WIRE_TARGET,
        "{}",
        format_response(request, head, elapsed, body)
    );
}

fn write_headers(out: &mut String, headers: &[(String, String)]) {
    for (name, value) in headers {
        let _ = writeln!(out, "{name}: {value}");
    }
}

// Non-UTF-8 bodies only show up in the END byte count.
fn write_body(out: &mut String, body: &[u8]) {
    if body.is_empty() {
        return;
    }
    if let Ok(text) = std::str::from_utf8(body) {
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
}
