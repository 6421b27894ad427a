// File: hpack.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::collections::VecDeque;

/// RFC 7541 Appendix A static table, indexed 1..=61. Entries without a
/// default value carry "".
pub const STATIC_TABLE: &[(&str, &str)] = &[
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// Prefix-coded integer (RFC 7541 §5.1). `prefix` carries the opcode bits
/// above the N-bit value field.
pub fn encode_integer(mut value: u64, nbits: u8, prefix: u8, out: &mut Vec<u8>) {
    let max_prefix = (1u64 << nbits) - 1;
    if value < max_prefix {
        out.push(prefix | value as u8);
        return;
    }
    out.push(prefix | max_prefix as u8);
    value -= max_prefix;
    while value >= 128 {
        out.push(0x80 | (value % 128) as u8);
        value /= 128;
    }
    out.push(value as u8);
}

pub fn decode_integer(
    buf: &[u8],
    pos: &mut usize,
    nbits: u8,
) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
    if *pos >= buf.len() {
        return Err("HPACK integer: empty input".into());
    }
    let nmask = (1u64 << nbits) - 1;
    let mut value = (buf[*pos] & nmask as u8) as u64;
    *pos += 1;
    if value < nmask {
        return Ok(value);
    }
    let mut shift = 0u32;
    loop {
        if *pos >= buf.len() {
            return Err("HPACK integer: truncated continuation".into());
        }
        let b = buf[*pos];
        *pos += 1;
        value += ((b & 0x7f) as u64) << shift;
        if (b & 0x80) == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err("HPACK integer: too large".into());
        }
    }
    Ok(value)
}

/// String literal, always emitted with H=0 (no Huffman).
pub fn encode_string(s: &[u8], out: &mut Vec<u8>) {
    encode_integer(s.len() as u64, 7, 0x00, out);
    out.extend_from_slice(s);
}

/// Decode a string literal. Huffman-flagged bytes are passed through as
/// lossy UTF-8; values recovered from Huffman-encoding peers may therefore
/// be approximate.
pub fn decode_string(
    buf: &[u8],
    pos: &mut usize,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    if *pos >= buf.len() {
        return Err("HPACK string: empty input".into());
    }
    let huffman = (buf[*pos] & 0x80) != 0;
    let len = decode_integer(buf, pos, 7)? as usize;
    if buf.len() - *pos < len {
        return Err("HPACK string: truncated".into());
    }
    let raw = &buf[*pos..*pos + len];
    *pos += len;
    let _ = huffman;
    Ok(String::from_utf8_lossy(raw).into_owned())
}

/// Encoder over the static table plus an unevicted MRU dynamic table.
/// Correctness bar: decoder round-trip for bounded inputs.
#[derive(Debug, Default)]
pub struct HpackEncoder {
    dynamic: VecDeque<(String, String)>,
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn static_exact(name: &str, value: &str) -> Option<usize> {
        STATIC_TABLE
            .iter()
            .position(|(n, v)| *n == name && *v == value)
            .map(|i| i + 1)
    }

    fn static_name(name: &str) -> Option<usize> {
        STATIC_TABLE.iter().position(|(n, _)| *n == name).map(|i| i + 1)
    }

    /// Encode one header with the best available representation:
    /// indexed, literal with incremental indexing + indexed name, or
    /// literal with incremental indexing + new name.
    pub fn encode_header(&mut self, name: &str, value: &str, out: &mut Vec<u8>) {
        if let Some(idx) = Self::static_exact(name, value) {
            encode_integer(idx as u64, 7, 0x80, out);
            return;
        }
        if let Some(idx) = Self::static_name(name) {
            encode_integer(idx as u64, 6, 0x40, out);
            encode_string(value.as_bytes(), out);
        } else {
            out.push(0x40);
            encode_string(name.as_bytes(), out);
            encode_string(value.as_bytes(), out);
        }
        self.dynamic.push_front((name.to_string(), value.to_string()));
    }

    /// Literal without indexing (4-bit prefix, opcode 0x00). Kept for
    /// probing how targets treat unindexed fields.
    pub fn encode_header_without_indexing(&self, name: &str, value: &str, out: &mut Vec<u8>) {
        if let Some(idx) = Self::static_name(name) {
            encode_integer(idx as u64, 4, 0x00, out);
        } else {
            out.push(0x00);
            encode_string(name.as_bytes(), out);
        }
        encode_string(value.as_bytes(), out);
    }

    pub fn encode_headers(&mut self, headers: &[(String, String)]) -> Vec<u8> {
        let mut out = Vec::with_capacity(headers.len() * 32);
        for (name, value) in headers {
            self.encode_header(name, value, &mut out);
        }
        out
    }

    pub fn encode_headers_without_indexing(&self, headers: &[(String, String)]) -> Vec<u8> {
        let mut out = Vec::with_capacity(headers.len() * 32);
        for (name, value) in headers {
            self.encode_header_without_indexing(name, value, &mut out);
        }
        out
    }

    pub fn dynamic_table(&self) -> &VecDeque<(String, String)> {
        &self.dynamic
    }
}

/// Decoder covering all four RFC 7541 representations.
#[derive(Debug, Default)]
pub struct HpackDecoder {
    dynamic: VecDeque<(String, String)>,
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table lookup: 1..=61 static, 62.. dynamic in MRU order.
    pub fn table_entry(
        &self,
        index: u64,
    ) -> Result<(String, String), Box<dyn std::error::Error + Send + Sync>> {
        if index == 0 {
            return Err("HPACK index 0 is invalid".into());
        }
        let idx = index as usize;
        if idx <= STATIC_TABLE.len() {
            let (n, v) = STATIC_TABLE[idx - 1];
            return Ok((n.to_string(), v.to_string()));
        }
        let dyn_idx = idx - STATIC_TABLE.len() - 1;
        match self.dynamic.get(dyn_idx) {
            Some((n, v)) => Ok((n.clone(), v.clone())),
            None => Err(format!("HPACK index {} out of table range", index).into()),
        }
    }

    pub fn decode(
        &mut self,
        buf: &[u8],
    ) -> Result<Vec<(String, String)>, Box<dyn std::error::Error + Send + Sync>> {
        let mut headers = Vec::new();
        let mut pos = 0usize;
        while pos < buf.len() {
            let b = buf[pos];
            if (b & 0x80) != 0 {
                // Indexed header field
                let index = decode_integer(buf, &mut pos, 7)?;
                headers.push(self.table_entry(index)?);
            } else if (b & 0x40) != 0 {
                // Literal with incremental indexing
                let (name, value) = self.decode_literal(buf, &mut pos, 6)?;
                self.dynamic.push_front((name.clone(), value.clone()));
                headers.push((name, value));
            } else if (b & 0x20) != 0 {
                // Dynamic table size update
                let size = decode_integer(buf, &mut pos, 5)?;
                if size == 0 {
                    self.dynamic.clear();
                }
            } else {
                // Literal without indexing / never indexed (4-bit prefix)
                let (name, value) = self.decode_literal(buf, &mut pos, 4)?;
                headers.push((name, value));
            }
        }
        Ok(headers)
    }

    fn decode_literal(
        &self,
        buf: &[u8],
        pos: &mut usize,
        nbits: u8,
    ) -> Result<(String, String), Box<dyn std::error::Error + Send + Sync>> {
        let index = decode_integer(buf, pos, nbits)?;
        let name = if index == 0 {
            decode_string(buf, pos)?
        } else {
            self.table_entry(index)?.0
        };
        let value = decode_string(buf, pos)?;
        Ok((name, value))
    }

    pub fn dynamic_table(&self) -> &VecDeque<(String, String)> {
        &self.dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_integer_small_value_fits_prefix() {
        let mut out = Vec::new();
        encode_integer(10, 5, 0x00, &mut out);
        assert_eq!(out, vec![10]);

        let mut pos = 0;
        assert_eq!(decode_integer(&out, &mut pos, 5).unwrap(), 10);
    }

    #[test]
    fn test_integer_multi_byte() {
        // RFC 7541 C.1.2: 1337 with 5-bit prefix -> 1f 9a 0a
        let mut out = Vec::new();
        encode_integer(1337, 5, 0x00, &mut out);
        assert_eq!(out, vec![0x1f, 0x9a, 0x0a]);

        let mut pos = 0;
        assert_eq!(decode_integer(&out, &mut pos, 5).unwrap(), 1337);
        assert_eq!(pos, 3);
    }

    #[test]
    fn test_string_roundtrip() {
        let mut out = Vec::new();
        encode_string(b"custom-value", &mut out);
        assert_eq!(out[0], 12);

        let mut pos = 0;
        assert_eq!(decode_string(&out, &mut pos).unwrap(), "custom-value");
    }

    #[test]
    fn test_static_table_has_61_entries() {
        assert_eq!(STATIC_TABLE.len(), 61);
        assert_eq!(STATIC_TABLE[1], (":method", "GET"));
        assert_eq!(STATIC_TABLE[60], ("www-authenticate", ""));
    }

    #[test]
    fn test_indexed_method_get_is_0x82() {
        let mut enc = HpackEncoder::new();
        let block = enc.encode_headers(&pairs(&[(":method", "GET")]));
        assert_eq!(block, vec![0x82]);

        let mut dec = HpackDecoder::new();
        let headers = dec.decode(&block).unwrap();
        assert_eq!(headers, pairs(&[(":method", "GET")]));
    }

    #[test]
    fn test_name_match_uses_indexed_name() {
        let mut enc = HpackEncoder::new();
        let block = enc.encode_headers(&pairs(&[(":path", "/custom")]));
        // 6-bit prefix literal-with-indexing against static index 4
        assert_eq!(block[0], 0x44);

        let mut dec = HpackDecoder::new();
        assert_eq!(dec.decode(&block).unwrap(), pairs(&[(":path", "/custom")]));
    }

    #[test]
    fn test_new_name_literal() {
        let mut enc = HpackEncoder::new();
        let block = enc.encode_headers(&pairs(&[("x-custom", "v1")]));
        assert_eq!(block[0], 0x40);

        let mut dec = HpackDecoder::new();
        assert_eq!(dec.decode(&block).unwrap(), pairs(&[("x-custom", "v1")]));
    }

    #[test]
    fn test_without_indexing_mode() {
        let enc = HpackEncoder::new();
        let block = enc.encode_headers_without_indexing(&pairs(&[("x-probe", "1")]));
        assert_eq!(block[0] & 0xf0, 0x00);

        let mut dec = HpackDecoder::new();
        assert_eq!(dec.decode(&block).unwrap(), pairs(&[("x-probe", "1")]));
        assert!(dec.dynamic_table().is_empty());
    }

    #[test]
    fn test_incremental_indexing_feeds_dynamic_table() {
        let mut dec = HpackDecoder::new();
        let mut enc = HpackEncoder::new();
        let block = enc.encode_headers(&pairs(&[("x-a", "1"), ("x-b", "2")]));
        dec.decode(&block).unwrap();

        // MRU order: newest first
        assert_eq!(dec.dynamic_table().len(), 2);
        assert_eq!(dec.dynamic_table()[0], ("x-b".to_string(), "2".to_string()));
        assert_eq!(dec.table_entry(62).unwrap(), ("x-b".to_string(), "2".to_string()));
        assert_eq!(dec.table_entry(63).unwrap(), ("x-a".to_string(), "1".to_string()));
    }

    #[test]
    fn test_table_size_update_zero_clears() {
        let mut dec = HpackDecoder::new();
        let mut enc = HpackEncoder::new();
        let mut block = enc.encode_headers(&pairs(&[("x-a", "1")]));
        block.push(0x20); // size update, size 0
        dec.decode(&block).unwrap();
        assert!(dec.dynamic_table().is_empty());
    }

    #[test]
    fn test_roundtrip_ordered_header_list() {
        let input = pairs(&[
            (":method", "POST"),
            (":path", "/api/items"),
            (":scheme", "https"),
            (":authority", "target.example"),
            ("content-type", "application/json"),
            ("x-request-id", "abc123"),
            ("x-request-id", "def456"),
        ]);

        let mut enc = HpackEncoder::new();
        let block = enc.encode_headers(&input);
        let mut dec = HpackDecoder::new();
        assert_eq!(dec.decode(&block).unwrap(), input);
    }

    #[test]
    fn test_roundtrip_without_indexing_mode_list() {
        let input = pairs(&[("a", "1"), ("content-type", "text/x"), ("z", "")]);
        let enc = HpackEncoder::new();
        let block = enc.encode_headers_without_indexing(&input);
        let mut dec = HpackDecoder::new();
        assert_eq!(dec.decode(&block).unwrap(), input);
    }

    #[test]
    fn test_truncated_input_errors() {
        let mut dec = HpackDecoder::new();
        // Literal with new name announcing a 10-byte string, then nothing
        assert!(dec.decode(&[0x40, 0x0a]).is_err());
        // Index beyond both tables
        assert!(dec.decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
