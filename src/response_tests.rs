// File: response_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use super::*;
use rstest::rstest;

#[test]
fn test_simple_parse() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nHello";
    let resp = parse_response(raw);

    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.http_version, "1.1");
    assert_eq!(resp.status_message, "OK");
    assert_eq!(resp.get_header("content-type"), vec!["text/plain"]);
    assert_eq!(resp.body, b"Hello");
    assert!(resp.parse_error.is_none());
}

#[test]
fn test_duplicate_set_cookie_preserved_in_order() {
    let raw = b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\nSet-Cookie: c=3\r\n\r\n";
    let resp = parse_response(raw);

    let cookies = resp.cookies();
    assert_eq!(cookies.len(), 3);
    assert_eq!(cookies, vec!["a=1", "b=2", "c=3"]);
}

#[test]
fn test_malformed_status_line() {
    let resp = parse_response(b"not a valid http response");

    assert!(resp.parse_error.is_some());
    assert_eq!(resp.status_code, 0);
    assert_eq!(resp.raw_text, "not a valid http response");
}

#[test]
fn test_malformed_status_still_parses_headers() {
    let raw = b"GARBAGE FIRST LINE\r\nX-Test: yes\r\n\r\nbody";
    let resp = parse_response(raw);

    assert!(resp.parse_error.is_some());
    assert_eq!(resp.status_code, 0);
    assert_eq!(resp.get_first_header("x-test"), Some("yes"));
    assert_eq!(resp.body, b"body");
}

#[test]
fn test_lf_only_separator() {
    let raw = b"HTTP/1.0 404 Not Found\nServer: thing\n\nmissing";
    let resp = parse_response(raw);

    assert_eq!(resp.status_code, 404);
    assert_eq!(resp.http_version, "1.0");
    assert_eq!(resp.get_first_header("server"), Some("thing"));
    assert_eq!(resp.body, b"missing");
}

#[test]
fn test_no_separator_whole_buffer_is_headers() {
    let raw = b"HTTP/1.1 204 No Content\r\nX-One: 1";
    let resp = parse_response(raw);

    assert_eq!(resp.status_code, 204);
    assert_eq!(resp.get_first_header("x-one"), Some("1"));
    assert!(resp.body.is_empty());
}

#[test]
fn test_header_lines_without_colon_are_skipped() {
    let raw = b"HTTP/1.1 200 OK\r\nthis line has no colon\r\n: leading colon\r\nGood: value\r\n\r\n";
    let resp = parse_response(raw);

    assert_eq!(resp.headers.len(), 1);
    assert_eq!(resp.get_first_header("good"), Some("value"));
}

#[test]
fn test_header_names_lowercased_values_trimmed() {
    let raw = b"HTTP/1.1 200 OK\r\nX-MiXeD-CaSe:   padded value  \r\n\r\n";
    let resp = parse_response(raw);

    assert_eq!(resp.get_first_header("x-mixed-case"), Some("padded value"));
}

#[test]
fn test_parse_serialize_idempotent() {
    let raw = b"HTTP/1.1 200 OK\r\ncontent-type: text/html\r\nx-a: 1\r\nx-a: 2\r\n\r\n<html></html>";
    let first = parse_response(raw);
    let second = parse_response(&first.serialize());

    assert_eq!(first.http_version, second.http_version);
    assert_eq!(first.status_code, second.status_code);
    assert_eq!(first.status_message, second.status_message);
    assert_eq!(first.headers, second.headers);
    assert_eq!(first.body, second.body);
}

#[rstest]
#[case(200, true, false, false, false)]
#[case(299, true, false, false, false)]
#[case(301, false, true, false, false)]
#[case(404, false, false, true, false)]
#[case(503, false, false, false, true)]
fn test_status_predicates(
    #[case] status: u16,
    #[case] success: bool,
    #[case] redirect: bool,
    #[case] client_err: bool,
    #[case] server_err: bool,
) {
    let raw = format!("HTTP/1.1 {} X\r\n\r\n", status);
    let resp = parse_response(raw.as_bytes());

    assert_eq!(resp.is_success(), success);
    assert_eq!(resp.is_redirect(), redirect);
    assert_eq!(resp.is_client_error(), client_err);
    assert_eq!(resp.is_server_error(), server_err);
    assert!(resp.has_status(status));
    assert!(resp.has_status_in_range(status, status));
}

#[test]
fn test_body_predicates() {
    let raw = b"HTTP/1.1 200 OK\r\n\r\nHello World";
    let resp = parse_response(raw);

    assert!(resp.body_contains("World", true));
    assert!(!resp.body_contains("world", true));
    assert!(resp.body_contains("world", false));
    assert!(resp.body_matches(r"^Hello \w+$").unwrap());
    assert!(resp.raw_contains("200 OK"));
}

#[test]
fn test_content_helpers() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nContent-Type: text/plain\r\n\r\nHello World";
    let resp = parse_response(raw);

    assert_eq!(resp.content_length(), Some(11));
    assert_eq!(resp.content_type(), Some("text/plain"));
    assert!(resp.header_contains("content-type", "TEXT"));
}

#[test]
fn test_smuggling_indicators() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nContent-Length: 11\r\nTransfer-Encoding: chunked\r\n\r\n";
    let resp = parse_response(raw);
    let ind = resp.smuggling_indicators();

    assert_eq!(ind.content_length_count, 2);
    assert_eq!(ind.transfer_encoding_count, 1);
    assert!(ind.both_present);
}

#[test]
fn test_head_helpers() {
    let head = "HTTP/1.1 200 OK\r\nContent-Length: 42\r\n";
    assert_eq!(head_content_length(head), Some(42));
    assert!(!head_is_chunked(head));

    let chunked = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n";
    assert!(head_is_chunked(chunked));
    assert_eq!(head_content_length(chunked), None);
}

#[test]
fn test_find_chunk_terminator() {
    let buf = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n0\r\n\r\n";
    let (_, body_start) = header_body_split(buf);
    let pos = find_chunk_terminator(buf, body_start).unwrap();
    assert_eq!(&buf[pos..pos + 5], b"0\r\n\r\n");
}

#[test]
fn test_timing_from_marks() {
    let t = Timing::from_marks(1000, 1020, 1100, 1250);
    assert_eq!(t.connection_ms, 20);
    assert_eq!(t.ttfb_ms, 100);
    assert_eq!(t.total_ms, 250);
}
