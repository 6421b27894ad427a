// File: transport.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::pool;
use crate::request::{HeaderEntry, RequestPlan, Scheme, Target};
use crate::response::{
    find_chunk_terminator, head_content_length, head_is_chunked, header_body_split,
    parse_response, RawResponse, Timing,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{debug, trace, warn};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{rustls, TlsConnector};

const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// TLS knobs. Verification is off by default; this is a testing tool and
/// the targets are frequently self-signed.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub reject_unauthorized: bool,
    pub servername: Option<String>,
    pub min_version: Option<TlsVersion>,
    pub max_version: Option<TlsVersion>,
    pub ciphers: Option<Vec<String>>,
    /// DER client certificate + key for mutual TLS.
    pub cert: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
    /// Extra DER roots trusted when verification is on.
    pub ca: Option<Vec<Vec<u8>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Http,
    Socks4,
    Socks5,
}

impl ProxyProtocol {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "socks4" => Some(Self::Socks4),
            "socks5" => Some(Self::Socks5),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub host: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
    pub auth: Option<ProxyAuth>,
}

/// Per-call options for the raw transports.
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub timeout_ms: u64,
    pub collect_timing: bool,
    pub tls: TlsOptions,
    pub proxy: Option<ProxyOptions>,
    pub keep_alive: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            collect_timing: false,
            tls: TlsOptions::default(),
            proxy: None,
            keep_alive: false,
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Plain or TLS client socket, pooled and used interchangeably.
pub enum PooledStream {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl std::fmt::Debug for PooledStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(_) => f.write_str("PooledStream::Tcp"),
            Self::Tls(_) => f.write_str("PooledStream::Tls"),
        }
    }
}

impl AsyncRead for PooledStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PooledStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

struct NoVerify;

impl rustls::client::ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

fn protocol_versions(tls: &TlsOptions) -> Vec<&'static rustls::SupportedProtocolVersion> {
    let min = tls.min_version.unwrap_or(TlsVersion::Tls12);
    let max = tls.max_version.unwrap_or(TlsVersion::Tls13);
    let mut versions = Vec::new();
    if min <= TlsVersion::Tls12 && max >= TlsVersion::Tls12 {
        versions.push(&rustls::version::TLS12);
    }
    if min <= TlsVersion::Tls13 && max >= TlsVersion::Tls13 {
        versions.push(&rustls::version::TLS13);
    }
    versions
}

fn cipher_suites(tls: &TlsOptions) -> Vec<rustls::SupportedCipherSuite> {
    match &tls.ciphers {
        Some(names) => rustls::ALL_CIPHER_SUITES
            .iter()
            .copied()
            .filter(|s| {
                let id = format!("{:?}", s.suite()).to_uppercase();
                names.iter().any(|n| id.contains(&n.to_uppercase()))
            })
            .collect(),
        None => rustls::DEFAULT_CIPHER_SUITES.to_vec(),
    }
}

pub(crate) fn build_client_config(
    tls: &TlsOptions,
    alpn: &[&[u8]],
) -> Result<rustls::ClientConfig, Box<dyn std::error::Error + Send + Sync>> {
    let suites = cipher_suites(tls);
    let versions = protocol_versions(tls);
    if suites.is_empty() || versions.is_empty() {
        return Err("Connection error: empty TLS cipher or version selection".into());
    }

    let builder = rustls::ClientConfig::builder()
        .with_cipher_suites(&suites)
        .with_safe_default_kx_groups()
        .with_protocol_versions(&versions)
        .map_err(|e| format!("Connection error: {}", e))?;

    let mut roots = rustls::RootCertStore::empty();
    if tls.reject_unauthorized {
        roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        if let Some(extra) = &tls.ca {
            let ders: Vec<Vec<u8>> = extra.clone();
            roots.add_parsable_certificates(&ders);
        }
    }
    let builder = builder.with_root_certificates(roots);

    let mut config = match (&tls.cert, &tls.key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(
                vec![rustls::Certificate(cert.clone())],
                rustls::PrivateKey(key.clone()),
            )
            .map_err(|e| format!("Connection error: {}", e))?,
        _ => builder.with_no_client_auth(),
    };

    if !tls.reject_unauthorized {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerify));
    }
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

/// Open a plain or TLS socket to the target. SNI defaults to the host.
pub(crate) async fn connect_stream(
    target: &Target,
    tls: &TlsOptions,
    alpn: &[&[u8]],
) -> Result<PooledStream, Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", target.host, target.port);
    trace!("connecting to {}", addr);
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| format!("Connection error: {}", e))?;

    match target.scheme {
        Scheme::Http => Ok(PooledStream::Tcp(tcp)),
        Scheme::Https => {
            let config = build_client_config(tls, alpn)?;
            let connector = TlsConnector::from(Arc::new(config));
            let sni = tls.servername.clone().unwrap_or_else(|| target.host.clone());
            let domain = rustls::ServerName::try_from(sni.as_str())
                .map_err(|e| format!("Connection error: {}", e))?;
            let stream = connector
                .connect(domain, tcp)
                .await
                .map_err(|e| format!("Connection error: {}", e))?;
            Ok(PooledStream::Tls(Box::new(stream)))
        }
    }
}

/// True once `buf` holds one complete response under the body-delimiting
/// rules (Content-Length, chunked terminator, or header-only).
fn response_complete(buf: &[u8]) -> bool {
    let (head_end, body_start) = header_body_split(buf);
    if head_end == buf.len() {
        return false;
    }
    let head = String::from_utf8_lossy(&buf[..head_end]);
    if let Some(n) = head_content_length(&head) {
        return buf.len() >= body_start + n;
    }
    if head_is_chunked(&head) {
        return find_chunk_terminator(buf, body_start).is_some();
    }
    true
}

/// The caller-facing request-from-options helper: guarantee a Connection
/// header matching the keep-alive choice. The transport itself never
/// rewrites caller bytes.
pub fn plan_with_connection(plan: &RequestPlan, keep_alive: bool) -> RequestPlan {
    let has_connection = plan.header_entries().iter().any(|e| match e {
        HeaderEntry::Pair { name, .. } => name.eq_ignore_ascii_case("connection"),
        HeaderEntry::Raw(_) => false,
    });
    if has_connection {
        return plan.clone();
    }
    let value = if keep_alive { "keep-alive" } else { "close" };
    plan.clone().header("Connection", value)
}

/// Send an assembled plan to its own target.
pub async fn send_plan(
    plan: &RequestPlan,
    options: &SendOptions,
) -> Result<RawResponse, Box<dyn std::error::Error + Send + Sync>> {
    let prepared = plan_with_connection(plan, options.keep_alive);
    send_bytes(&prepared.target(), &prepared.build(), options).await
}

/// Send caller bytes verbatim and parse whatever comes back.
pub async fn send_raw_bytes(
    host: &str,
    port: u16,
    scheme: Scheme,
    bytes: &[u8],
    options: &SendOptions,
) -> Result<RawResponse, Box<dyn std::error::Error + Send + Sync>> {
    send_bytes(&Target::new(host, port, scheme), bytes, options).await
}

pub async fn send_bytes(
    target: &Target,
    bytes: &[u8],
    options: &SendOptions,
) -> Result<RawResponse, Box<dyn std::error::Error + Send + Sync>> {
    let timeout = Duration::from_millis(options.timeout_ms);
    match tokio::time::timeout(timeout, exchange_once(target, bytes, options)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("request to {} timed out", target.key());
            Err(format!("Connection timeout after {}ms", options.timeout_ms).into())
        }
    }
}

async fn exchange_once(
    target: &Target,
    bytes: &[u8],
    options: &SendOptions,
) -> Result<RawResponse, Box<dyn std::error::Error + Send + Sync>> {
    if let Some(proxy) = &options.proxy {
        return exchange_via_proxy(target, bytes, proxy, options).await;
    }

    let start_ms = now_ms();

    if options.keep_alive {
        let mut lease = pool::global()
            .acquire(&target.host, target.port, target.scheme, &options.tls)
            .await?;
        let connect_ms = now_ms();
        let (raw, first_byte_ms) = write_then_read(lease.stream(), bytes, true).await?;
        lease.release().await;
        return Ok(finish(raw, options, start_ms, connect_ms, first_byte_ms));
    }

    let mut stream = connect_stream(target, &options.tls, &[]).await?;
    let connect_ms = now_ms();
    let (raw, first_byte_ms) = write_then_read(&mut stream, bytes, false).await?;
    Ok(finish(raw, options, start_ms, connect_ms, first_byte_ms))
}

fn finish(
    raw: Vec<u8>,
    options: &SendOptions,
    start_ms: u64,
    connect_ms: u64,
    first_byte_ms: u64,
) -> RawResponse {
    let mut response = parse_response(&raw);
    if options.collect_timing {
        response.timing = Some(Timing::from_marks(
            start_ms,
            connect_ms,
            first_byte_ms,
            now_ms(),
        ));
    }
    response
}

/// Write the request in one shot, then accumulate the response. With
/// `stop_when_complete` the read stops at a framed response boundary so the
/// socket survives for reuse; otherwise it runs to EOF/close.
async fn write_then_read(
    stream: &mut PooledStream,
    bytes: &[u8],
    stop_when_complete: bool,
) -> Result<(Vec<u8>, u64), Box<dyn std::error::Error + Send + Sync>> {
    stream
        .write_all(bytes)
        .await
        .map_err(|e| format!("Socket error: {}", e))?;
    stream
        .flush()
        .await
        .map_err(|e| format!("Socket error: {}", e))?;
    debug!("wrote {} request bytes", bytes.len());

    let mut raw = Vec::new();
    let mut first_byte_ms = 0u64;
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if first_byte_ms == 0 {
                    first_byte_ms = now_ms();
                }
                raw.extend_from_slice(&chunk[..n]);
                if stop_when_complete && response_complete(&raw) {
                    break;
                }
            }
            Err(e) => {
                if raw.is_empty() {
                    return Err(format!("Socket error: {}", e).into());
                }
                // Partial data is still forensically useful
                trace!("read ended with error after {} bytes: {}", raw.len(), e);
                break;
            }
        }
    }
    if first_byte_ms == 0 {
        first_byte_ms = now_ms();
    }
    Ok((raw, first_byte_ms))
}

/// Split a pipelined response buffer into `count` responses, applying the
/// Content-Length / chunked / header-only rules in order. A buffer that
/// runs out mid-response yields whatever remains as the final response.
pub fn split_pipelined_responses(buf: &[u8], count: usize) -> Vec<RawResponse> {
    let mut responses = Vec::with_capacity(count);
    let mut pos = 0usize;

    for _ in 0..count {
        if pos >= buf.len() {
            break;
        }
        let rest = &buf[pos..];
        let (head_end, body_start) = header_body_split(rest);
        let end = if head_end == rest.len() {
            // no separator: the remainder is the final (truncated) response
            rest.len()
        } else {
            let head = String::from_utf8_lossy(&rest[..head_end]);
            if let Some(n) = head_content_length(&head) {
                (body_start + n).min(rest.len())
            } else if head_is_chunked(&head) {
                match find_chunk_terminator(rest, body_start) {
                    Some(p) => (p + 5).min(rest.len()),
                    None => rest.len(),
                }
            } else {
                body_start
            }
        };
        responses.push(parse_response(&rest[..end]));
        pos += end;
    }

    while responses.len() < count {
        responses.push(parse_response(&[]));
    }
    responses
}

/// Pipelined send: all requests are concatenated and written before any
/// read, then the response buffer is framed back into one record per
/// request.
pub async fn send_pipelined(
    target: &Target,
    payloads: &[Vec<u8>],
    options: &SendOptions,
) -> Result<Vec<RawResponse>, Box<dyn std::error::Error + Send + Sync>> {
    let timeout = Duration::from_millis(options.timeout_ms);
    match tokio::time::timeout(timeout, pipeline_once(target, payloads, options)).await {
        Ok(result) => result,
        Err(_) => Err(format!("Connection timeout after {}ms", options.timeout_ms).into()),
    }
}

pub async fn send_pipelined_plans(
    plans: &[RequestPlan],
    options: &SendOptions,
) -> Result<Vec<RawResponse>, Box<dyn std::error::Error + Send + Sync>> {
    let target = match plans.first() {
        Some(plan) => plan.target(),
        None => return Ok(Vec::new()),
    };
    let payloads: Vec<Vec<u8>> = plans.iter().map(|p| p.build()).collect();
    send_pipelined(&target, &payloads, options).await
}

async fn pipeline_once(
    target: &Target,
    payloads: &[Vec<u8>],
    options: &SendOptions,
) -> Result<Vec<RawResponse>, Box<dyn std::error::Error + Send + Sync>> {
    let combined: Vec<u8> = payloads.iter().flatten().copied().collect();
    debug!(
        "pipelining {} requests ({} bytes) to {}",
        payloads.len(),
        combined.len(),
        target.key()
    );

    let mut stream = connect_stream(target, &options.tls, &[]).await?;
    stream
        .write_all(&combined)
        .await
        .map_err(|e| format!("Socket error: {}", e))?;
    stream
        .flush()
        .await
        .map_err(|e| format!("Socket error: {}", e))?;

    let mut raw = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => raw.extend_from_slice(&chunk[..n]),
            Err(e) => {
                if raw.is_empty() {
                    return Err(format!("Socket error: {}", e).into());
                }
                break;
            }
        }
    }

    Ok(split_pipelined_responses(&raw, payloads.len()))
}

async fn exchange_via_proxy(
    target: &Target,
    bytes: &[u8],
    proxy: &ProxyOptions,
    options: &SendOptions,
) -> Result<RawResponse, Box<dyn std::error::Error + Send + Sync>> {
    match proxy.protocol {
        ProxyProtocol::Socks4 | ProxyProtocol::Socks5 => {
            return Err(
                "SOCKS proxy support not yet implemented, use an HTTP proxy instead".into(),
            );
        }
        ProxyProtocol::Http => {}
    }
    if target.scheme == Scheme::Https {
        // Upgrading an established tunnel socket to TLS is deliberately
        // unsupported; failing beats silently downgrading.
        return Err(
            "TLS through HTTP proxy not supported: establish the tunnel and upgrade externally"
                .into(),
        );
    }

    let start_ms = now_ms();
    let addr = format!("{}:{}", proxy.host, proxy.port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| format!("Proxy connection error: {}", e))?;
    let connect_ms = now_ms();

    let mut connect_req = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n",
        host = target.host,
        port = target.port
    );
    if let Some(auth) = &proxy.auth {
        let token = BASE64.encode(format!("{}:{}", auth.username, auth.password));
        connect_req.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
    }
    connect_req.push_str("\r\n");

    stream
        .write_all(connect_req.as_bytes())
        .await
        .map_err(|e| format!("Proxy socket error: {}", e))?;

    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| format!("Proxy socket error: {}", e))?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if crate::response::find_subslice(&head, b"\r\n\r\n").is_some() {
            break;
        }
    }
    let head_text = String::from_utf8_lossy(&head);
    let first_line = head_text.lines().next().unwrap_or("").to_string();
    debug!("proxy CONNECT reply: {}", first_line);

    if first_line.contains("407") {
        return Err("Proxy authentication required".into());
    }
    if !first_line.contains("200") {
        return Err(format!("Proxy CONNECT failed: {}", first_line).into());
    }

    let mut tunnel = PooledStream::Tcp(stream);
    let (raw, first_byte_ms) = write_then_read(&mut tunnel, bytes, false).await?;
    Ok(finish(raw, options, start_ms, connect_ms, first_byte_ms))
}
