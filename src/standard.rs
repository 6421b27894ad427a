// File: standard.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::request::RequestPlan;
use crate::response::{HeaderMap, RawResponse, Timing};
use crate::transport::{now_ms, SendOptions};
use log::debug;
use std::time::Duration;

/// Send the well-formed projection of a plan through a stock HTTP client.
/// Raw header entries are dropped by the projection; anything byte-exact
/// belongs on the raw transport instead. Redirects are not followed and
/// no cookie jar exists.
pub async fn send_standard(
    plan: &RequestPlan,
    options: &SendOptions,
) -> Result<RawResponse, Box<dyn std::error::Error + Send + Sync>> {
    let wf = plan.to_well_formed();
    let start_ms = now_ms();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(options.timeout_ms))
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(!options.tls.reject_unauthorized)
        .build()
        .map_err(|e| format!("Connection error: {}", e))?;

    let method = reqwest::Method::from_bytes(wf.method.as_bytes())
        .map_err(|e| format!("Connection error: {}", e))?;
    let mut builder = client.request(method, &wf.url);
    for (name, values) in &wf.headers {
        for value in values {
            builder = builder.header(name, value);
        }
    }
    if !wf.body.is_empty() {
        builder = builder.body(wf.body.clone());
    }

    debug!("standard send: {} {}", wf.method, wf.url);
    let result = builder
        .send()
        .await
        .map_err(|e| format!("Connection error: {}", e))?;
    let connect_ms = now_ms();

    let status_code = result.status().as_u16();
    let status_message = result
        .status()
        .canonical_reason()
        .unwrap_or("")
        .to_string();
    let http_version = match result.version() {
        reqwest::Version::HTTP_09 => "0.9",
        reqwest::Version::HTTP_10 => "1.0",
        reqwest::Version::HTTP_11 => "1.1",
        reqwest::Version::HTTP_2 => "2.0",
        reqwest::Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
    .to_string();

    let mut headers = HeaderMap::new();
    for (name, value) in result.headers() {
        headers.append(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }

    let first_byte_ms = now_ms();
    let body = result
        .bytes()
        .await
        .map_err(|e| format!("Socket error: {}", e))?
        .to_vec();
    let end_ms = now_ms();

    // Reconstruct a raw view so the analyzer and diff engine see the same
    // shape the byte-level transports produce.
    let mut response = RawResponse {
        raw: Vec::new(),
        raw_text: String::new(),
        http_version,
        status_code,
        status_message,
        headers,
        body,
        parse_error: None,
        timing: None,
    };
    response.raw = response.serialize();
    response.raw_text = String::from_utf8_lossy(&response.raw).into_owned();
    if options.collect_timing {
        response.timing = Some(Timing::from_marks(start_ms, connect_ms, first_byte_ms, end_ms));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Scheme;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_standard_send_against_local_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Probe: 1\r\nConnection: close\r\n\r\nHello",
            )
            .await
            .unwrap();
        });

        let plan = RequestPlan::new()
            .host("127.0.0.1")
            .port(port)
            .scheme(Scheme::Http)
            .header("X-Client", "rwire");
        let resp = send_standard(&plan, &SendOptions::default()).await.unwrap();

        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, b"Hello");
        assert_eq!(resp.get_first_header("x-probe"), Some("1"));
        assert!(resp.raw_text.starts_with("HTTP/1.1 200"));
    }
}
