// File: diff.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::response::{header_body_split, parse_response, HeaderMap, RawResponse};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Unchanged,
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub kind: DiffKind,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderDiff {
    pub name: String,
    pub kind: DiffKind,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharDiff {
    pub index: usize,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingDiff {
    pub ttfb_diff_ms: i64,
    pub total_diff_ms: i64,
}

/// Structural comparison of two exchanges: scalar fields, unioned headers,
/// a unified line diff and a char-level diff of the raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeDiff {
    pub fields: Vec<FieldDiff>,
    pub headers: Vec<HeaderDiff>,
    pub unified: Vec<String>,
    pub chars: Vec<CharDiff>,
    pub timing: Option<TimingDiff>,
}

fn scalar_diff(field: &str, old: &str, new: &str) -> FieldDiff {
    let kind = match (old.is_empty(), new.is_empty()) {
        (true, true) => DiffKind::Unchanged,
        (true, false) => DiffKind::Added,
        (false, true) => DiffKind::Removed,
        (false, false) if old == new => DiffKind::Unchanged,
        _ => DiffKind::Changed,
    };
    FieldDiff {
        field: field.to_string(),
        kind,
        old: if old.is_empty() { None } else { Some(old.to_string()) },
        new: if new.is_empty() { None } else { Some(new.to_string()) },
    }
}

/// Union both key sets; duplicate values are joined with ", " before
/// comparison so multiplicity differences surface as Changed.
fn header_diffs(a: &HeaderMap, b: &HeaderMap) -> Vec<HeaderDiff> {
    let mut names: Vec<&str> = a.names();
    for name in b.names() {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    names
        .into_iter()
        .map(|name| {
            let old = a.joined(name);
            let new = b.joined(name);
            let kind = match (&old, &new) {
                (Some(o), Some(n)) if o == n => DiffKind::Unchanged,
                (Some(_), Some(_)) => DiffKind::Changed,
                (None, Some(_)) => DiffKind::Added,
                (Some(_), None) => DiffKind::Removed,
                (None, None) => DiffKind::Unchanged,
            };
            HeaderDiff {
                name: name.to_string(),
                kind,
                old,
                new,
            }
        })
        .collect()
}

/// Line-oriented unified diff: equal lines are kept with a two-space
/// prefix, differing positions emit `- old` then `+ new`.
pub fn unified_diff(a: &str, b: &str) -> Vec<String> {
    let a_lines: Vec<&str> = split_lines(a);
    let b_lines: Vec<&str> = split_lines(b);
    let mut out = Vec::new();

    for i in 0..a_lines.len().max(b_lines.len()) {
        match (a_lines.get(i), b_lines.get(i)) {
            (Some(x), Some(y)) if x == y => out.push(format!("  {}", x)),
            (Some(x), Some(y)) => {
                out.push(format!("- {}", x));
                out.push(format!("+ {}", y));
            }
            (Some(x), None) => out.push(format!("- {}", x)),
            (None, Some(y)) => out.push(format!("+ {}", y)),
            (None, None) => {}
        }
    }
    out
}

fn split_lines(s: &str) -> Vec<&str> {
    s.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect()
}

fn escape_char(c: char) -> String {
    match c {
        '\r' => "\\r".to_string(),
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\0' => "\\0".to_string(),
        c if (' '..='~').contains(&c) => c.to_string(),
        c => format!("\\x{:02X}", c as u32),
    }
}

/// Per-position character diff with control characters escaped.
pub fn char_diff(a: &str, b: &str) -> Vec<CharDiff> {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let mut out = Vec::new();

    for i in 0..a_chars.len().max(b_chars.len()) {
        let old = a_chars.get(i);
        let new = b_chars.get(i);
        if old != new {
            out.push(CharDiff {
                index: i,
                old: old.map(|c| escape_char(*c)),
                new: new.map(|c| escape_char(*c)),
            });
        }
    }
    out
}

fn timing_diff(a: &RawResponse, b: &RawResponse) -> Option<TimingDiff> {
    match (a.timing, b.timing) {
        (Some(ta), Some(tb)) => Some(TimingDiff {
            ttfb_diff_ms: tb.ttfb_ms as i64 - ta.ttfb_ms as i64,
            total_diff_ms: tb.total_ms as i64 - ta.total_ms as i64,
        }),
        _ => None,
    }
}

pub fn diff_responses(a: &RawResponse, b: &RawResponse) -> ExchangeDiff {
    let fields = vec![
        scalar_diff("http_version", &a.http_version, &b.http_version),
        scalar_diff(
            "status_code",
            &a.status_code.to_string(),
            &b.status_code.to_string(),
        ),
        scalar_diff("status_message", &a.status_message, &b.status_message),
        scalar_diff("body", &a.body_text(), &b.body_text()),
    ];

    ExchangeDiff {
        fields,
        headers: header_diffs(&a.headers, &b.headers),
        unified: unified_diff(&a.raw_text, &b.raw_text),
        chars: char_diff(&a.raw_text, &b.raw_text),
        timing: timing_diff(a, b),
    }
}

pub fn diff_response_bytes(a: &[u8], b: &[u8]) -> ExchangeDiff {
    diff_responses(&parse_response(a), &parse_response(b))
}

/// Minimal request-side view sharing the response head/body split.
#[derive(Debug, Clone, Default)]
struct RequestView {
    method: String,
    path: String,
    version: String,
    headers: HeaderMap,
    raw_text: String,
}

fn parse_request_view(raw: &[u8]) -> RequestView {
    let raw_text = String::from_utf8_lossy(raw).into_owned();
    let (head_end, _) = header_body_split(raw);
    let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();
    let mut lines = head.split("\r\n").flat_map(|l| l.split('\n'));

    let mut view = RequestView {
        raw_text,
        ..Default::default()
    };
    if let Some(request_line) = lines.next() {
        let mut parts = request_line.split_whitespace();
        view.method = parts.next().unwrap_or("").to_string();
        view.path = parts.next().unwrap_or("").to_string();
        view.version = parts.next().unwrap_or("").to_string();
    }
    for line in lines {
        if let Some(pos) = line.find(':') {
            if pos > 0 {
                view.headers.append(&line[..pos], &line[pos + 1..]);
            }
        }
    }
    view
}

pub fn diff_requests(a: &[u8], b: &[u8]) -> ExchangeDiff {
    let va = parse_request_view(a);
    let vb = parse_request_view(b);

    let fields = vec![
        scalar_diff("method", &va.method, &vb.method),
        scalar_diff("path", &va.path, &vb.path),
        scalar_diff("version", &va.version, &vb.version),
    ];

    ExchangeDiff {
        fields,
        headers: header_diffs(&va.headers, &vb.headers),
        unified: unified_diff(&va.raw_text, &vb.raw_text),
        chars: char_diff(&va.raw_text, &vb.raw_text),
        timing: None,
    }
}

pub fn is_identical(diff: &ExchangeDiff) -> bool {
    diff.fields.iter().all(|f| f.kind == DiffKind::Unchanged)
        && diff.headers.iter().all(|h| h.kind == DiffKind::Unchanged)
        && diff.chars.is_empty()
}

/// One-paragraph human summary of a diff.
pub fn summarize(diff: &ExchangeDiff) -> String {
    if is_identical(diff) {
        return "identical".to_string();
    }
    let changed_fields: Vec<&str> = diff
        .fields
        .iter()
        .filter(|f| f.kind != DiffKind::Unchanged)
        .map(|f| f.field.as_str())
        .collect();
    let changed_headers: Vec<&str> = diff
        .headers
        .iter()
        .filter(|h| h.kind != DiffKind::Unchanged)
        .map(|h| h.name.as_str())
        .collect();

    let mut parts = Vec::new();
    if !changed_fields.is_empty() {
        parts.push(format!("fields: {}", changed_fields.join(", ")));
    }
    if !changed_headers.is_empty() {
        parts.push(format!("headers: {}", changed_headers.join(", ")));
    }
    parts.push(format!("{} char positions differ", diff.chars.len()));
    if let Some(t) = &diff.timing {
        parts.push(format!(
            "ttfb {:+}ms, total {:+}ms",
            t.ttfb_diff_ms, t.total_diff_ms
        ));
    }
    parts.join("; ")
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
