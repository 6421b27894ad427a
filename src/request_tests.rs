// File: request_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use super::*;
use rstest::rstest;

#[test]
fn test_default_build() {
    let plan = RequestPlan::new().host("example.com").header("Host", "example.com");
    let bytes = plan.build();

    assert_eq!(
        bytes,
        b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n".to_vec()
    );
}

#[test]
fn test_build_is_stable() {
    let plan = RequestPlan::new()
        .method("POST")
        .path("/submit")
        .host("example.com")
        .header("Host", "example.com")
        .body("data");

    assert_eq!(plan.build(), plan.build());
}

#[test]
fn test_duplicate_headers_preserved() {
    let plan = RequestPlan::new()
        .header("X-Dup", "one")
        .header("X-Dup", "two");
    let text = String::from_utf8(plan.build()).unwrap();

    let first = text.find("X-Dup: one").unwrap();
    let second = text.find("X-Dup: two").unwrap();
    assert!(first < second);
}

#[test]
fn test_raw_header_byte_exact_at_position() {
    let plan = RequestPlan::new()
        .header("A", "1")
        .raw_header(b"X-Raw : weird\0".to_vec())
        .header("B", "2");
    let bytes = plan.build();
    let text = String::from_utf8_lossy(&bytes);

    let a = text.find("A: 1").unwrap();
    let raw = text.find("X-Raw : weird\0").unwrap();
    let b = text.find("B: 2").unwrap();
    assert!(a < raw && raw < b);
}

#[test]
fn test_line_ending_policy() {
    let plan = RequestPlan::new().header("A", "1").line_ending(LineEnding::Lf);
    assert_eq!(plan.build(), b"GET / HTTP/1.1\nA: 1\n\n".to_vec());

    let plan = RequestPlan::new().line_ending(LineEnding::Custom("\r\n\r\n".to_string()));
    assert_eq!(plan.build(), b"GET / HTTP/1.1\r\n\r\n\r\n\r\n".to_vec());
}

#[test]
fn test_request_line_separator() {
    let plan = RequestPlan::new().request_line_separator("\t");
    assert_eq!(plan.build(), b"GET\t/\tHTTP/1.1\r\n\r\n".to_vec());
}

#[test]
fn test_body_appended_without_separator() {
    let plan = RequestPlan::new().method("POST").body("raw-bytes");
    let bytes = plan.build();
    assert!(bytes.ends_with(b"\r\n\r\nraw-bytes"));
}

#[rstest]
#[case(Malformation::SpaceBeforeColon, "X-A : v")]
#[case(Malformation::TabSeparator, "X-A:\tv")]
#[case(Malformation::NoSpaceAfterColon, "X-A:v")]
#[case(Malformation::DoubleSpace, "X-A:  v")]
#[case(Malformation::CrlfInjection, "X-A: v\r\nInjected: header")]
#[case(Malformation::EmptyHeaderName, ": v")]
#[case(Malformation::EmptyHeaderValue, "X-A: ")]
fn test_malformation_render(#[case] kind: Malformation, #[case] expected: &str) {
    assert_eq!(kind.render("X-A", "v"), expected.as_bytes().to_vec());
}

#[test]
fn test_malformation_null_byte() {
    assert_eq!(
        Malformation::NullByte.render("X-A", "v"),
        b"X-A: v\0injected".to_vec()
    );
}

#[test]
fn test_malformation_oversized() {
    let line = Malformation::OversizedHeader.render("X-Big", "tail");
    assert_eq!(line.len(), "X-Big: ".len() + 8192 + "tail".len());
    assert!(line.starts_with(b"X-Big: AAAA"));
    assert!(line.ends_with(b"Atail"));
}

#[test]
fn test_malformation_from_name() {
    assert_eq!(
        Malformation::from_name("crlf-injection"),
        Some(Malformation::CrlfInjection)
    );
    assert_eq!(Malformation::from_name("bogus"), None);
}

#[test]
fn test_json_body_appends_content_type() {
    let plan = RequestPlan::new()
        .method("POST")
        .json_body(&serde_json::json!({"k": "v"}));
    let text = String::from_utf8(plan.build()).unwrap();

    assert!(text.contains("Content-Type: application/json\r\n"));
    assert!(text.ends_with("{\"k\":\"v\"}"));
}

#[test]
fn test_clone_produces_independent_variant() {
    let base = RequestPlan::new().host("target.com").header("Host", "target.com");
    let variant = base.clone().header("X-Extra", "1");

    assert!(!String::from_utf8_lossy(&base.build()).contains("X-Extra"));
    assert!(String::from_utf8_lossy(&variant.build()).contains("X-Extra"));
}

#[test]
fn test_canonical_url_elides_default_ports() {
    let plan = RequestPlan::new().host("h.com").port(80).path("/x");
    assert_eq!(plan.canonical_url(), "http://h.com/x");

    let plan = RequestPlan::new()
        .scheme(Scheme::Https)
        .host("h.com")
        .port(443)
        .path("/x");
    assert_eq!(plan.canonical_url(), "https://h.com/x");

    let plan = RequestPlan::new().host("h.com").port(8080).path("/x");
    assert_eq!(plan.canonical_url(), "http://h.com:8080/x");
}

#[test]
fn test_well_formed_excludes_raw_and_groups_duplicates() {
    let plan = RequestPlan::new()
        .host("h.com")
        .header("X-Dup", "1")
        .raw_header(b"Broken line no colon".to_vec())
        .header("X-Dup", "2");
    let wf = plan.to_well_formed();

    assert_eq!(wf.headers.len(), 1);
    assert_eq!(wf.headers[0].0, "X-Dup");
    assert_eq!(wf.headers[0].1, vec!["1".to_string(), "2".to_string()]);
}

#[test]
fn test_fetch_init_parses_raw_entries() {
    let plan = RequestPlan::new()
        .raw_header(b"X-Raw:  padded value ".to_vec())
        .raw_header(b": empty name".to_vec())
        .raw_header(b"no colon at all".to_vec())
        .header("X-Pair", "v");
    let init = plan.to_fetch_init();

    assert_eq!(
        init.headers,
        vec![
            ("X-Raw".to_string(), "padded value".to_string()),
            ("X-Pair".to_string(), "v".to_string()),
        ]
    );
}

#[test]
fn test_h2_projections() {
    let plan = RequestPlan::new()
        .method("POST")
        .path("/api")
        .scheme(Scheme::Https)
        .host("target.com")
        .header("Host", "target.com")
        .header("X-Custom", "v")
        .header(":protocol", "websocket");

    let pseudo = plan.h2_pseudo_headers();
    assert_eq!(pseudo[0], (":method".to_string(), "POST".to_string()));
    assert_eq!(pseudo[1], (":path".to_string(), "/api".to_string()));
    assert_eq!(pseudo[2], (":scheme".to_string(), "https".to_string()));
    assert_eq!(pseudo[3], (":authority".to_string(), "target.com".to_string()));

    let regular = plan.h2_regular_headers();
    assert!(regular.contains(&("x-custom".to_string(), "v".to_string())));
    assert!(regular.contains(&(":protocol".to_string(), "websocket".to_string())));
    assert!(!regular.iter().any(|(n, _)| n == "host"));
}

#[test]
fn test_target_defaults_port_from_scheme() {
    let plan = RequestPlan::new().scheme(Scheme::Https).host("h.com");
    let target = plan.target();
    assert_eq!(target.port, 443);
    assert_eq!(target.key(), "https://h.com:443");
}
