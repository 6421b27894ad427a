// File: h2.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::frame::{
    self, Frame, CONNECTION_PREFACE, FLAG_END_STREAM, SETTINGS_INITIAL_WINDOW_SIZE,
    SETTINGS_MAX_CONCURRENT_STREAMS, TYPE_DATA, TYPE_GOAWAY, TYPE_HEADERS,
};
use crate::hpack::{HpackDecoder, HpackEncoder};
use crate::request::{RequestPlan, Scheme, Target};
use crate::response::{HeaderMap, Timing};
use crate::transport::{connect_stream, now_ms, PooledStream, SendOptions};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const REQUEST_STREAM: u32 = 1;
const READ_CHUNK: usize = 16384;

/// Response reassembled from the frames of one stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct H2Response {
    pub stream_id: u32,
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub frames: Vec<Frame>,
    pub raw: Vec<u8>,
    pub timing: Option<Timing>,
}

/// Raw-mode result: whatever frames came back, plus the byte stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct H2RawExchange {
    pub frames: Vec<Frame>,
    pub raw: Vec<u8>,
}

/// Send a plan as an HTTP/2 request on stream 1: preface, SETTINGS,
/// HEADERS, optional DATA, then reassemble the response from inbound
/// frames.
pub async fn send(
    plan: &RequestPlan,
    options: &SendOptions,
) -> Result<H2Response, Box<dyn std::error::Error + Send + Sync>> {
    let timeout = Duration::from_millis(options.timeout_ms);
    match tokio::time::timeout(timeout, send_once(plan, options)).await {
        Ok(result) => result,
        Err(_) => Err(format!("Connection timeout after {}ms", options.timeout_ms).into()),
    }
}

async fn send_once(
    plan: &RequestPlan,
    options: &SendOptions,
) -> Result<H2Response, Box<dyn std::error::Error + Send + Sync>> {
    let mut target = plan.target();
    if target.scheme == Scheme::Http {
        // h2 here is TLS-only; h2c is a different animal
        let port = if target.port == 80 { 443 } else { target.port };
        target = Target::new(&target.host, port, Scheme::Https);
    }

    let start_ms = now_ms();
    let mut stream = connect_stream(&target, &options.tls, &[b"h2"]).await?;
    let connect_ms = now_ms();

    let mut headers = plan.h2_pseudo_headers();
    headers.extend(plan.h2_regular_headers());
    let mut encoder = HpackEncoder::new();
    let block = encoder.encode_headers(&headers);

    let body = plan.get_body();
    let mut outbound = Vec::with_capacity(64 + block.len() + body.len());
    outbound.extend_from_slice(CONNECTION_PREFACE);
    outbound.extend_from_slice(&frame::settings_frame(&[
        (SETTINGS_MAX_CONCURRENT_STREAMS, 100),
        (SETTINGS_INITIAL_WINDOW_SIZE, 65535),
    ]));
    outbound.extend_from_slice(&frame::headers_frame(
        REQUEST_STREAM,
        &block,
        body.is_empty(),
    ));
    if !body.is_empty() {
        outbound.extend_from_slice(&frame::data_frame(REQUEST_STREAM, body, true));
    }

    stream
        .write_all(&outbound)
        .await
        .map_err(|e| format!("Socket error: {}", e))?;
    debug!(
        "h2 request sent to {}: {} header bytes, {} body bytes",
        target.key(),
        block.len(),
        body.len()
    );

    let (raw, first_byte_ms) = read_inbound(&mut stream, REQUEST_STREAM).await;
    let frames = frame::parse_frames(&raw);
    trace!("h2 inbound: {} bytes, {} frames", raw.len(), frames.len());

    let mut response = assemble_response(REQUEST_STREAM, frames, raw)?;
    if options.collect_timing {
        response.timing = Some(Timing::from_marks(
            start_ms,
            connect_ms,
            first_byte_ms,
            now_ms(),
        ));
    }
    Ok(response)
}

/// Accumulate inbound bytes until the peer closes, errors, or finishes the
/// watched stream with END_STREAM.
async fn read_inbound(stream: &mut PooledStream, watch_stream: u32) -> (Vec<u8>, u64) {
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
                if stream_finished(&raw, watch_stream) {
                    break;
                }
            }
            Err(e) => {
                warn!("h2 read ended: {}", e);
                break;
            }
        }
    }
    if first_byte_ms == 0 {
        first_byte_ms = now_ms();
    }
    (raw, first_byte_ms)
}

fn stream_finished(raw: &[u8], stream_id: u32) -> bool {
    frame::parse_frames(raw).iter().any(|f| {
        (f.stream_id == stream_id
            && matches!(f.frame_type, TYPE_DATA | TYPE_HEADERS)
            && f.has_flag(FLAG_END_STREAM))
            || f.frame_type == TYPE_GOAWAY
    })
}

/// Rebuild the response for one stream: HEADERS frames provide `:status`
/// and the header multimap, DATA frames concatenate into the body.
pub fn assemble_response(
    stream_id: u32,
    frames: Vec<Frame>,
    raw: Vec<u8>,
) -> Result<H2Response, Box<dyn std::error::Error + Send + Sync>> {
    let mut decoder = HpackDecoder::new();
    let mut headers = HeaderMap::new();
    let mut status_code = 0u16;
    let mut saw_headers = false;
    let mut body = Vec::new();

    for frame in &frames {
        if frame.stream_id != stream_id {
            continue;
        }
        match frame.frame_type {
            TYPE_HEADERS => {
                let (block, _priority) = frame::parse_headers_payload(frame);
                match decoder.decode(&block) {
                    Ok(pairs) => {
                        saw_headers = true;
                        for (name, value) in pairs {
                            if name == ":status" {
                                status_code = value.parse().unwrap_or(0);
                            } else if !name.starts_with(':') {
                                headers.append_raw(name, value);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("h2 header block decode failed: {}", e);
                    }
                }
            }
            TYPE_DATA => {
                body.extend_from_slice(&frame::parse_data_payload(frame));
            }
            _ => {}
        }
    }

    if !saw_headers {
        return Err("Failed to parse HTTP/2 response".into());
    }

    Ok(H2Response {
        stream_id,
        status_code,
        headers,
        body,
        frames,
        raw,
        timing: None,
    })
}

/// Raw mode: the caller supplies every outbound byte, preface included.
/// Returns the parsed inbound frames plus the raw buffer.
pub async fn send_raw_frames(
    host: &str,
    port: u16,
    frame_bytes: &[u8],
    options: &SendOptions,
) -> Result<H2RawExchange, Box<dyn std::error::Error + Send + Sync>> {
    let timeout = Duration::from_millis(options.timeout_ms);
    match tokio::time::timeout(timeout, raw_once(host, port, frame_bytes, options)).await {
        Ok(result) => result,
        Err(_) => Err(format!("Connection timeout after {}ms", options.timeout_ms).into()),
    }
}

async fn raw_once(
    host: &str,
    port: u16,
    frame_bytes: &[u8],
    options: &SendOptions,
) -> Result<H2RawExchange, Box<dyn std::error::Error + Send + Sync>> {
    let target = Target::new(host, port, Scheme::Https);
    let mut stream = connect_stream(&target, &options.tls, &[b"h2"]).await?;
    stream
        .write_all(frame_bytes)
        .await
        .map_err(|e| format!("Socket error: {}", e))?;
    debug!("h2 raw mode: wrote {} bytes to {}", frame_bytes.len(), target.key());

    let (raw, _) = read_inbound(&mut stream, 0).await;
    Ok(H2RawExchange {
        frames: frame::parse_frames(&raw),
        raw,
    })
}
