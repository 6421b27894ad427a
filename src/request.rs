// File: request.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection scheme for the target socket. Independent of whatever the
/// request bytes claim in their Host header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the socket goes, regardless of what the bytes say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
}

impl Target {
    pub fn new(host: &str, port: u16, scheme: Scheme) -> Self {
        Self {
            host: host.to_string(),
            port,
            scheme,
        }
    }

    pub fn key(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Line terminator written after the request line and each header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEnding {
    Crlf,
    Lf,
    Cr,
    Custom(String),
}

impl LineEnding {
    pub fn as_str(&self) -> &str {
        match self {
            LineEnding::Crlf => "\r\n",
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
            LineEnding::Custom(s) => s,
        }
    }
}

/// One header slot. `Pair` is formatted as `name: value`; `Raw` bytes are
/// emitted verbatim and may contain CR, LF, NUL or anything else.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderEntry {
    Pair { name: String, value: String },
    Raw(Vec<u8>),
}

/// The recognized ways to bend a header line out of shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformation {
    SpaceBeforeColon,
    TabSeparator,
    NoSpaceAfterColon,
    DoubleSpace,
    CrlfInjection,
    NullByte,
    OversizedHeader,
    EmptyHeaderName,
    EmptyHeaderValue,
}

impl Malformation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "space-before-colon" => Some(Self::SpaceBeforeColon),
            "tab-separator" => Some(Self::TabSeparator),
            "no-space-after-colon" => Some(Self::NoSpaceAfterColon),
            "double-space" => Some(Self::DoubleSpace),
            "crlf-injection" => Some(Self::CrlfInjection),
            "null-byte" => Some(Self::NullByte),
            "oversized-header" => Some(Self::OversizedHeader),
            "empty-header-name" => Some(Self::EmptyHeaderName),
            "empty-header-value" => Some(Self::EmptyHeaderValue),
            _ => None,
        }
    }

    /// Render the malformed raw line for `name`/`value`.
    pub fn render(&self, name: &str, value: &str) -> Vec<u8> {
        match self {
            Self::SpaceBeforeColon => format!("{} : {}", name, value).into_bytes(),
            Self::TabSeparator => format!("{}:\t{}", name, value).into_bytes(),
            Self::NoSpaceAfterColon => format!("{}:{}", name, value).into_bytes(),
            Self::DoubleSpace => format!("{}:  {}", name, value).into_bytes(),
            Self::CrlfInjection => {
                format!("{}: {}\r\nInjected: header", name, value).into_bytes()
            }
            Self::NullByte => format!("{}: {}\0injected", name, value).into_bytes(),
            Self::OversizedHeader => {
                let mut line = format!("{}: ", name).into_bytes();
                line.extend(std::iter::repeat(b'A').take(8192));
                line.extend_from_slice(value.as_bytes());
                line
            }
            Self::EmptyHeaderName => format!(": {}", value).into_bytes(),
            Self::EmptyHeaderValue => format!("{}: ", name).into_bytes(),
        }
    }
}

/// Well-formed projection of a plan: raw-only entries excluded, duplicate
/// names collected into arrays in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellFormedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Vec<u8>,
}

/// Fetch-style projection: every entry as a (name, value) pair, raw lines
/// split at the first `:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchInit {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Byte-exact request assembler. Accumulates state and emits exactly what
/// it was told: header order is preserved, duplicates are kept, nothing is
/// validated or corrected.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPlan {
    method: String,
    path: String,
    version: String,
    host: String,
    port: Option<u16>,
    scheme: Scheme,
    headers: Vec<HeaderEntry>,
    body: Vec<u8>,
    line_ending: LineEnding,
    request_line_separator: String,
}

impl Default for RequestPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestPlan {
    pub fn new() -> Self {
        Self {
            method: "GET".to_string(),
            path: "/".to_string(),
            version: "HTTP/1.1".to_string(),
            host: String::new(),
            port: None,
            scheme: Scheme::Http,
            headers: Vec::new(),
            body: Vec::new(),
            line_ending: LineEnding::Crlf,
            request_line_separator: " ".to_string(),
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push(HeaderEntry::Pair {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Append a raw header line, emitted byte-for-byte at this position.
    pub fn raw_header(mut self, line: impl Into<Vec<u8>>) -> Self {
        self.headers.push(HeaderEntry::Raw(line.into()));
        self
    }

    pub fn malformed_header(self, kind: Malformation, name: &str, value: &str) -> Self {
        let line = kind.render(name, value);
        self.raw_header(line)
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the body and append a Content-Type header.
    /// Appends unconditionally; deduplication is the caller's choice.
    pub fn json_body(mut self, value: &serde_json::Value) -> Self {
        self.body = serde_json::to_vec(value).unwrap_or_default();
        self.headers.push(HeaderEntry::Pair {
            name: "Content-Type".to_string(),
            value: "application/json".to_string(),
        });
        self
    }

    pub fn line_ending(mut self, ending: LineEnding) -> Self {
        self.line_ending = ending;
        self
    }

    /// Separator between method, target and version on the request line.
    /// A single space unless you are testing parser tolerance.
    pub fn request_line_separator(mut self, sep: &str) -> Self {
        self.request_line_separator = sep.to_string();
        self
    }

    pub fn get_method(&self) -> &str {
        &self.method
    }

    pub fn get_path(&self) -> &str {
        &self.path
    }

    pub fn get_version(&self) -> &str {
        &self.version
    }

    pub fn get_host(&self) -> &str {
        &self.host
    }

    pub fn get_body(&self) -> &[u8] {
        &self.body
    }

    pub fn header_entries(&self) -> &[HeaderEntry] {
        &self.headers
    }

    pub fn target(&self) -> Target {
        Target {
            host: self.host.clone(),
            port: self.port.unwrap_or_else(|| self.scheme.default_port()),
            scheme: self.scheme,
        }
    }

    /// Emit the exact request bytes: request line, headers in insertion
    /// order, blank line, body appended with no separator.
    pub fn build(&self) -> Vec<u8> {
        let sep = self.request_line_separator.as_bytes();
        let ending = self.line_ending.as_str().as_bytes();
        let mut out = Vec::with_capacity(256 + self.body.len());

        out.extend_from_slice(self.method.as_bytes());
        out.extend_from_slice(sep);
        out.extend_from_slice(self.path.as_bytes());
        out.extend_from_slice(sep);
        out.extend_from_slice(self.version.as_bytes());
        out.extend_from_slice(ending);

        for entry in &self.headers {
            match entry {
                HeaderEntry::Pair { name, value } => {
                    out.extend_from_slice(name.as_bytes());
                    out.extend_from_slice(b": ");
                    out.extend_from_slice(value.as_bytes());
                }
                HeaderEntry::Raw(line) => out.extend_from_slice(line),
            }
            out.extend_from_slice(ending);
        }

        out.extend_from_slice(ending);
        out.extend_from_slice(&self.body);
        out
    }

    /// Canonical URL for the plan target; default ports are elided.
    pub fn canonical_url(&self) -> String {
        let default = self.scheme.default_port();
        match self.port {
            Some(p) if p != default => {
                format!("{}://{}:{}{}", self.scheme, self.host, p, self.path)
            }
            _ => format!("{}://{}{}", self.scheme, self.host, self.path),
        }
    }

    pub fn to_well_formed(&self) -> WellFormedRequest {
        let mut headers: Vec<(String, Vec<String>)> = Vec::new();
        for entry in &self.headers {
            if let HeaderEntry::Pair { name, value } = entry {
                match headers.iter_mut().find(|(n, _)| n == name) {
                    Some((_, values)) => values.push(value.clone()),
                    None => headers.push((name.clone(), vec![value.clone()])),
                }
            }
        }
        WellFormedRequest {
            method: self.method.clone(),
            url: self.canonical_url(),
            headers,
            body: self.body.clone(),
        }
    }

    /// Raw entries are split at the first `:`; entries with an empty name
    /// are rejected (dropped).
    pub fn to_fetch_init(&self) -> FetchInit {
        let mut headers = Vec::new();
        for entry in &self.headers {
            match entry {
                HeaderEntry::Pair { name, value } => {
                    headers.push((name.clone(), value.clone()));
                }
                HeaderEntry::Raw(line) => {
                    let text = String::from_utf8_lossy(line);
                    if let Some(pos) = text.find(':') {
                        let name = text[..pos].trim().to_string();
                        if name.is_empty() {
                            continue;
                        }
                        headers.push((name, text[pos + 1..].trim().to_string()));
                    }
                }
            }
        }
        FetchInit {
            method: self.method.clone(),
            headers,
            body: self.body.clone(),
        }
    }

    /// HTTP/2 pseudo-headers for this plan, in canonical order.
    pub fn h2_pseudo_headers(&self) -> Vec<(String, String)> {
        vec![
            (":method".to_string(), self.method.clone()),
            (":path".to_string(), self.path.clone()),
            (":scheme".to_string(), self.scheme.as_str().to_string()),
            (":authority".to_string(), self.host.clone()),
        ]
    }

    /// Regular headers for HTTP/2: lowercased, `host` suppressed (it moved
    /// into `:authority`), explicit pseudo-headers preserved.
    pub fn h2_regular_headers(&self) -> Vec<(String, String)> {
        self.to_fetch_init()
            .headers
            .into_iter()
            .map(|(n, v)| (n.to_lowercase(), v))
            .filter(|(n, _)| n != "host")
            .collect()
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod request_tests;
