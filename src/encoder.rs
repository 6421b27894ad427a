// File: encoder.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::seq::SliceRandom;
use std::fmt;

/// Payload encodings used to build filter-evasion variants of attack input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Url,
    DoubleUrl,
    UrlAll,
    Unicode,
    Hex,
    Octal,
    HtmlEntity,
    Base64,
    OverlongUtf8,
}

impl Encoding {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "url" => Some(Self::Url),
            "double-url" | "doubleurl" => Some(Self::DoubleUrl),
            "url-all" | "urlencodeall" => Some(Self::UrlAll),
            "unicode" => Some(Self::Unicode),
            "hex" => Some(Self::Hex),
            "octal" => Some(Self::Octal),
            "html-entity" | "html" => Some(Self::HtmlEntity),
            "base64" => Some(Self::Base64),
            "overlong-utf8" | "overlong" => Some(Self::OverlongUtf8),
            _ => None,
        }
    }

    pub fn all() -> &'static [Encoding] {
        &[
            Self::Url,
            Self::DoubleUrl,
            Self::UrlAll,
            Self::Unicode,
            Self::Hex,
            Self::Octal,
            Self::HtmlEntity,
            Self::Base64,
            Self::OverlongUtf8,
        ]
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Url => "url",
            Self::DoubleUrl => "double-url",
            Self::UrlAll => "url-all",
            Self::Unicode => "unicode",
            Self::Hex => "hex",
            Self::Octal => "octal",
            Self::HtmlEntity => "html-entity",
            Self::Base64 => "base64",
            Self::OverlongUtf8 => "overlong-utf8",
        };
        f.write_str(name)
    }
}

fn is_url_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

pub fn url_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for b in input.bytes() {
        if is_url_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Percent-encode every byte, reserved or not.
pub fn url_encode_all(input: &str) -> String {
    input.bytes().map(|b| format!("%{:02X}", b)).collect()
}

pub fn unicode_encode(input: &str) -> String {
    input
        .encode_utf16()
        .map(|u| format!("\\u{:04X}", u))
        .collect()
}

pub fn hex_encode(input: &str) -> String {
    input.bytes().map(|b| format!("\\x{:02X}", b)).collect()
}

pub fn octal_encode(input: &str) -> String {
    input.bytes().map(|b| format!("\\{:03o}", b)).collect()
}

pub fn html_entity_encode(input: &str) -> String {
    input.chars().map(|c| format!("&#x{:X};", c as u32)).collect()
}

/// Two-byte overlong UTF-8 form of each ASCII byte; multi-byte input is
/// passed through unchanged.
pub fn overlong_utf8_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 6);
    for b in input.bytes() {
        if b < 0x80 {
            out.push_str(&format!("%{:02X}%{:02X}", 0xC0 | (b >> 6), 0x80 | (b & 0x3F)));
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

pub fn encode(input: &str, encoding: Encoding) -> String {
    match encoding {
        Encoding::Url => url_encode(input),
        Encoding::DoubleUrl => url_encode(&url_encode(input)),
        Encoding::UrlAll => url_encode_all(input),
        Encoding::Unicode => unicode_encode(input),
        Encoding::Hex => hex_encode(input),
        Encoding::Octal => octal_encode(input),
        Encoding::HtmlEntity => html_entity_encode(input),
        Encoding::Base64 => BASE64.encode(input.as_bytes()),
        Encoding::OverlongUtf8 => overlong_utf8_encode(input),
    }
}

pub fn url_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(h), Some(l)) = (
                bytes.get(i + 1).and_then(|c| (*c as char).to_digit(16)),
                bytes.get(i + 2).and_then(|c| (*c as char).to_digit(16)),
            ) {
                out.push(((h << 4) | l) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn unescape_prefixed(input: &str, prefix: char, digits: usize, radix: u32) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() && chars[i + 1] == prefix {
            let start = i + 2;
            let end = start + digits;
            if end <= chars.len() {
                let group: String = chars[start..end].iter().collect();
                if let Ok(v) = u32::from_str_radix(&group, radix) {
                    if let Some(c) = char::from_u32(v) {
                        out.push(c);
                        i = end;
                        continue;
                    }
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn octal_decode(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            let group: String = chars[i + 1..(i + 4).min(chars.len())].iter().collect();
            if group.len() == 3 {
                if let Ok(v) = u32::from_str_radix(&group, 8) {
                    if let Some(c) = char::from_u32(v) {
                        out.push(c);
                        i += 4;
                        continue;
                    }
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn html_entity_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find("&#") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let (value, consumed) = if let Some(hex) = after.strip_prefix(['x', 'X']) {
            let digits: String = hex.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
            (u32::from_str_radix(&digits, 16).ok(), 1 + digits.len())
        } else {
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            (digits.parse::<u32>().ok(), digits.len())
        };
        let mut end = pos + 2 + consumed;
        if rest[end..].starts_with(';') {
            end += 1;
        }
        match value.and_then(char::from_u32) {
            Some(c) => out.push(c),
            None => out.push_str(&rest[pos..end]),
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

fn overlong_utf8_decode(input: &str) -> String {
    let decoded = url_decode_bytes(input);
    let mut out = Vec::with_capacity(decoded.len());
    let mut i = 0;
    while i < decoded.len() {
        if i + 1 < decoded.len()
            && (decoded[i] & 0xE0) == 0xC0
            && (decoded[i + 1] & 0xC0) == 0x80
        {
            out.push(((decoded[i] & 0x1F) << 6) | (decoded[i + 1] & 0x3F));
            i += 2;
        } else {
            out.push(decoded[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn url_decode_bytes(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(h), Some(l)) = (
                bytes.get(i + 1).and_then(|c| (*c as char).to_digit(16)),
                bytes.get(i + 2).and_then(|c| (*c as char).to_digit(16)),
            ) {
                out.push(((h << 4) | l) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

pub fn decode(input: &str, encoding: Encoding) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let out = match encoding {
        Encoding::Url | Encoding::UrlAll => url_decode(input),
        Encoding::DoubleUrl => url_decode(&url_decode(input)),
        Encoding::Unicode => unescape_prefixed(input, 'u', 4, 16),
        Encoding::Hex => unescape_prefixed(input, 'x', 2, 16),
        Encoding::Octal => octal_decode(input),
        Encoding::HtmlEntity => html_entity_decode(input),
        Encoding::Base64 => {
            let raw = BASE64.decode(input.trim().as_bytes())?;
            String::from_utf8_lossy(&raw).into_owned()
        }
        Encoding::OverlongUtf8 => overlong_utf8_decode(input),
    };
    Ok(out)
}

/// Encode each character with one of `types`, chosen uniformly at random.
pub fn mixed_encode(input: &str, types: &[Encoding]) -> String {
    if types.is_empty() {
        return input.to_string();
    }
    let mut rng = rand::thread_rng();
    input
        .chars()
        .map(|c| {
            let enc = types.choose(&mut rng).copied().unwrap();
            encode(&c.to_string(), enc)
        })
        .collect()
}

pub fn path_traversal(depth: usize, encoding: Option<Encoding>) -> String {
    let base = "../".repeat(depth);
    match encoding {
        Some(enc) => encode(&base, enc),
        None => base,
    }
}

/// Fixed set of traversal spellings used to probe normalization differences
/// between path parsers. Order is stable.
pub fn path_traversal_variants(depth: usize) -> Vec<String> {
    let base = "../".repeat(depth);
    vec![
        base.clone(),
        "..\\".repeat(depth),
        url_encode(&base),
        url_encode(&url_encode(&base)),
        base.replace("../", "..%00"),
        base.replace("../", "..%2500"),
        base.replace('/', "%2f"),
        base.replace('/', "%252f"),
        "....//".repeat(depth),
        "..;/".repeat(depth),
        "..\\/".repeat(depth),
        "..%c0%af".repeat(depth),
        "..%c1%9c".repeat(depth),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encode_reserved() {
        assert_eq!(url_encode("../etc/passwd"), "..%2Fetc%2Fpasswd");
        assert_eq!(url_encode("a b"), "a%20b");
        assert_eq!(url_encode("!'()*"), "%21%27%28%29%2A");
    }

    #[test]
    fn test_url_encode_all() {
        assert_eq!(url_encode_all("abc"), "%61%62%63");
    }

    #[test]
    fn test_double_url_encode() {
        assert_eq!(encode("/", Encoding::DoubleUrl), "%252F");
    }

    #[test]
    fn test_base64() {
        assert_eq!(encode("hello", Encoding::Base64), "aGVsbG8=");
        assert_eq!(decode("aGVsbG8=", Encoding::Base64).unwrap(), "hello");
    }

    #[test]
    fn test_unicode_and_hex() {
        assert_eq!(encode("A", Encoding::Unicode), "\\u0041");
        assert_eq!(encode("A", Encoding::Hex), "\\x41");
        assert_eq!(decode("\\u0041\\u0042", Encoding::Unicode).unwrap(), "AB");
        assert_eq!(decode("\\x41\\x42", Encoding::Hex).unwrap(), "AB");
    }

    #[test]
    fn test_octal() {
        assert_eq!(encode("A", Encoding::Octal), "\\101");
        assert_eq!(decode("\\101", Encoding::Octal).unwrap(), "A");
    }

    #[test]
    fn test_html_entity() {
        assert_eq!(encode("A", Encoding::HtmlEntity), "&#x41;");
        assert_eq!(decode("&#x41;&#66;", Encoding::HtmlEntity).unwrap(), "AB");
    }

    #[test]
    fn test_overlong_utf8() {
        // '/' = 0x2F -> 0xC0 0xAF
        assert_eq!(encode("/", Encoding::OverlongUtf8), "%C0%AF");
        assert_eq!(decode("%C0%AF", Encoding::OverlongUtf8).unwrap(), "/");
    }

    #[test]
    fn test_mixed_encode_roundtrippable_charset() {
        let out = mixed_encode("abc", &[Encoding::Hex]);
        assert_eq!(out, "\\x61\\x62\\x63");
    }

    #[test]
    fn test_path_traversal_variants_depth_one() {
        let variants = path_traversal_variants(1);
        assert!(variants.len() >= 10);
        assert!(variants.contains(&"../".to_string()));
        assert!(variants.contains(&"..\\".to_string()));
        assert!(variants.contains(&"..%2F".to_string()));
        assert!(variants.contains(&"..%c0%af".to_string()));
    }

    #[test]
    fn test_path_traversal_depth() {
        assert_eq!(path_traversal(3, None), "../../../");
        assert_eq!(path_traversal(1, Some(Encoding::Url)), "..%2F");
    }
}
