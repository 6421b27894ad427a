// File: response.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^HTTP/(\d+\.?\d*)\s+(\d+)\s*(.*)?$").unwrap());

/// Ordered header multimap. Names are stored lowercased; duplicate values
/// keep arrival order. Raw servers send anything, so this never validates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: &str, value: &str) {
        self.entries
            .push((name.trim().to_lowercase(), value.trim().to_string()));
    }

    pub fn append_raw(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        let name = name.to_lowercase();
        self.entries
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn count(&self, name: &str) -> usize {
        let name = name.to_lowercase();
        self.entries.iter().filter(|(n, _)| *n == name).count()
    }

    /// Distinct names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (n, _) in &self.entries {
            if !seen.contains(&n.as_str()) {
                seen.push(n.as_str());
            }
        }
        seen
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All values for `name` joined with ", " (the comparison form the diff
    /// engine uses), or None when absent.
    pub fn joined(&self, name: &str) -> Option<String> {
        let all = self.get_all(name);
        if all.is_empty() {
            None
        } else {
            Some(all.join(", "))
        }
    }
}

/// Wall-clock capture for one network exchange. All values are unix
/// milliseconds except the computed deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start_ms: u64,
    pub connect_ms: u64,
    pub first_byte_ms: u64,
    pub end_ms: u64,
    pub ttfb_ms: u64,
    pub total_ms: u64,
    pub connection_ms: u64,
}

impl Timing {
    pub fn from_marks(start_ms: u64, connect_ms: u64, first_byte_ms: u64, end_ms: u64) -> Self {
        Self {
            start_ms,
            connect_ms,
            first_byte_ms,
            end_ms,
            ttfb_ms: first_byte_ms.saturating_sub(start_ms),
            total_ms: end_ms.saturating_sub(start_ms),
            connection_ms: connect_ms.saturating_sub(start_ms),
        }
    }
}

/// Counts of the two body-length headers, for smuggling triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmugglingIndicators {
    pub content_length_count: usize,
    pub transfer_encoding_count: usize,
    pub both_present: bool,
}

/// A parsed HTTP/1.x response. Parsing is forensic: malformed input is never
/// rejected, it is recorded. `status_code` stays 0 when the status line did
/// not parse and `parse_error` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    pub raw: Vec<u8>,
    pub raw_text: String,
    pub http_version: String,
    pub status_code: u16,
    pub status_message: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub parse_error: Option<String>,
    pub timing: Option<Timing>,
}

impl RawResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status_code)
    }

    pub fn is_redirect(&self) -> bool {
        (300..=399).contains(&self.status_code)
    }

    pub fn is_client_error(&self) -> bool {
        (400..=499).contains(&self.status_code)
    }

    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status_code)
    }

    pub fn has_status(&self, code: u16) -> bool {
        self.status_code == code
    }

    pub fn has_status_in_range(&self, low: u16, high: u16) -> bool {
        (low..=high).contains(&self.status_code)
    }

    pub fn body_contains(&self, needle: &str, case_sensitive: bool) -> bool {
        let body = self.body_text();
        if case_sensitive {
            body.contains(needle)
        } else {
            body.to_lowercase().contains(&needle.to_lowercase())
        }
    }

    pub fn body_matches(&self, pattern: &str) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let re = Regex::new(pattern)?;
        Ok(re.is_match(&self.body_text()))
    }

    pub fn raw_contains(&self, needle: &str) -> bool {
        self.raw_text.contains(needle)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    pub fn get_header(&self, name: &str) -> Vec<&str> {
        self.headers.get_all(name)
    }

    pub fn get_first_header(&self, name: &str) -> Option<&str> {
        self.headers.get_first(name)
    }

    pub fn header_contains(&self, name: &str, needle: &str) -> bool {
        self.headers
            .get_all(name)
            .iter()
            .any(|v| v.to_lowercase().contains(&needle.to_lowercase()))
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get_first("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_first("content-type")
    }

    /// The stored `set-cookie` values, verbatim and in arrival order.
    pub fn cookies(&self) -> Vec<&str> {
        self.headers.get_all("set-cookie")
    }

    pub fn smuggling_indicators(&self) -> SmugglingIndicators {
        let cl = self.headers.count("content-length");
        let te = self.headers.count("transfer-encoding");
        SmugglingIndicators {
            content_length_count: cl,
            transfer_encoding_count: te,
            both_present: cl > 0 && te > 0,
        }
    }

    /// Reconstruct response bytes from the parsed record. Header names come
    /// back lowercased; for well-formed input `parse_response(serialize())`
    /// equals the original record.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.raw.len());
        let status_line = format!(
            "HTTP/{} {} {}",
            self.http_version, self.status_code, self.status_message
        );
        out.extend_from_slice(status_line.trim_end().as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in self.headers.entries() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Locate the header/body boundary: first `\r\n\r\n`, else first `\n\n`,
/// else the whole buffer is headers. Returns (head_end, body_start).
pub fn header_body_split(buf: &[u8]) -> (usize, usize) {
    if let Some(pos) = find_subslice(buf, b"\r\n\r\n") {
        return (pos, pos + 4);
    }
    if let Some(pos) = find_subslice(buf, b"\n\n") {
        return (pos, pos + 2);
    }
    (buf.len(), buf.len())
}

pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

/// Parse possibly malformed response bytes. Never fails; see `RawResponse`.
pub fn parse_response(raw: &[u8]) -> RawResponse {
    let raw_text = String::from_utf8_lossy(raw).into_owned();
    let (head_end, body_start) = header_body_split(raw);
    let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();
    let body = raw[body_start.min(raw.len())..].to_vec();

    let mut lines = head.split("\r\n").flat_map(|l| l.split('\n'));
    let status_line = lines.next().unwrap_or("");

    let mut http_version = String::new();
    let mut status_code = 0u16;
    let mut status_message = String::new();
    let mut parse_error = None;

    match STATUS_LINE.captures(status_line.trim_end()) {
        Some(caps) => {
            http_version = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            status_code = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            status_message = caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        }
        None => {
            parse_error = Some(format!("invalid status line: {:?}", status_line));
        }
    }

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        match line.find(':') {
            Some(0) | None => continue,
            Some(pos) => headers.append(&line[..pos], &line[pos + 1..]),
        }
    }

    RawResponse {
        raw: raw.to_vec(),
        raw_text,
        http_version,
        status_code,
        status_message,
        headers,
        body,
        parse_error,
        timing: None,
    }
}

/// Scan the header block (everything before the split) for a
/// `Content-Length` value without building a full record.
pub fn head_content_length(head: &str) -> Option<usize> {
    for line in head.lines() {
        if let Some(pos) = line.find(':') {
            if pos > 0 && line[..pos].trim().eq_ignore_ascii_case("content-length") {
                return line[pos + 1..].trim().parse().ok();
            }
        }
    }
    None
}

pub fn head_is_chunked(head: &str) -> bool {
    for line in head.lines() {
        if let Some(pos) = line.find(':') {
            if pos > 0
                && line[..pos].trim().eq_ignore_ascii_case("transfer-encoding")
                && line[pos + 1..].to_lowercase().contains("chunked")
            {
                return true;
            }
        }
    }
    false
}

/// Position of the chunked terminator `0\r\n\r\n` at or after `from`.
pub fn find_chunk_terminator(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    find_subslice(&buf[from..], b"0\r\n\r\n").map(|p| from + p)
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod response_tests;
