// File: cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long = "log-level", default_value = "warn", global = true)]
    pub log_level: String,

    #[arg(long = "timeout", default_value = "30000", global = true)]
    pub timeout_ms: u64,

    #[arg(
        long = "verify-tls",
        global = true,
        help = "Verify server certificates (off by default: targets are usually self-signed)"
    )]
    pub verify_tls: bool,

    #[arg(long = "timing", global = true, help = "Capture timing marks")]
    pub timing: bool,

    #[command(flatten)]
    pub proxy: ProxyArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    #[arg(long = "proxy-host", global = true)]
    pub proxy_host: Option<String>,

    #[arg(long = "proxy-port", default_value = "8080", global = true)]
    pub proxy_port: u16,

    #[arg(long = "proxy-protocol", default_value = "http", global = true)]
    pub proxy_protocol: String,

    #[arg(long = "proxy-user", global = true)]
    pub proxy_user: Option<String>,

    #[arg(long = "proxy-pass", global = true)]
    pub proxy_pass: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a raw HTTP/1.x request (assembled or from a file)
    Send(SendArgs),
    /// Build and send a named attack payload
    Attack(AttackArgs),
    /// Send a request over HTTP/2 with direct frame construction
    H2(H2Args),
    /// Compare two captured responses (or requests)
    Diff(DiffArgs),
    /// Encode or decode a payload string
    Encode(EncodeArgs),
    /// Print path traversal variants
    Traversal(TraversalArgs),
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Target URL, e.g. http://host:8080/path
    pub target: String,

    #[arg(short = 'X', long = "method", default_value = "GET")]
    pub method: String,

    #[arg(short = 'H', long = "header", help = "Header as 'Name: Value', repeatable")]
    pub headers: Vec<String>,

    #[arg(long = "raw-header", help = "Verbatim header line, repeatable")]
    pub raw_headers: Vec<String>,

    #[arg(short = 'd', long = "data")]
    pub body: Option<String>,

    #[arg(short = 'f', long = "file", help = "Read the full request bytes from a file")]
    pub file: Option<PathBuf>,

    #[arg(long = "pipeline", help = "Send the request N times in one write")]
    pub pipeline: Option<usize>,

    #[arg(long = "keep-alive")]
    pub keep_alive: bool,

    #[arg(long = "line-ending", default_value = "crlf")]
    pub line_ending: String,
}

#[derive(Args, Debug)]
pub struct AttackArgs {
    /// Recipe name: cl-te, te-cl, te-obfuscation, crlf, duplicate-headers,
    /// oversized-header, null-byte, method-override, absolute-uri,
    /// host-header, http09
    pub recipe: String,

    pub target: String,

    #[arg(long = "kind", help = "Recipe-specific variant selector")]
    pub kind: Option<String>,

    #[arg(long = "name", default_value = "X-Test")]
    pub name: String,

    #[arg(long = "value", default_value = "probe")]
    pub value: String,

    #[arg(long = "size", default_value = "8192")]
    pub size: usize,

    #[arg(long = "attack-host", help = "Attacker-controlled host for host-header recipes")]
    pub attack_host: Option<String>,

    #[arg(long = "dry-run", help = "Print the payload without sending")]
    pub dry_run: bool,

    #[arg(long = "i-have-authorization")]
    pub authorization_confirmed: bool,
}

#[derive(Args, Debug)]
pub struct H2Args {
    pub target: String,

    #[arg(short = 'X', long = "method", default_value = "GET")]
    pub method: String,

    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    #[arg(short = 'd', long = "data")]
    pub body: Option<String>,

    #[arg(long = "show-frames", help = "Dump the inbound frame list")]
    pub show_frames: bool,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    pub file_a: PathBuf,
    pub file_b: PathBuf,

    #[arg(long = "requests", help = "Treat the inputs as requests, not responses")]
    pub requests: bool,

    #[arg(long = "full", help = "Print the unified diff too")]
    pub full: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Encoding: url, double-url, url-all, unicode, hex, octal,
    /// html-entity, base64, overlong-utf8
    pub kind: String,

    pub input: String,

    #[arg(long = "decode")]
    pub decode: bool,
}

#[derive(Args, Debug)]
pub struct TraversalArgs {
    #[arg(default_value = "3")]
    pub depth: usize,
}
