// File: frame.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};

// Frame types (RFC 7540 §6)
pub const TYPE_DATA: u8 = 0x0;
pub const TYPE_HEADERS: u8 = 0x1;
pub const TYPE_PRIORITY: u8 = 0x2;
pub const TYPE_RST_STREAM: u8 = 0x3;
pub const TYPE_SETTINGS: u8 = 0x4;
pub const TYPE_PUSH_PROMISE: u8 = 0x5;
pub const TYPE_PING: u8 = 0x6;
pub const TYPE_GOAWAY: u8 = 0x7;
pub const TYPE_WINDOW_UPDATE: u8 = 0x8;
pub const TYPE_CONTINUATION: u8 = 0x9;

// Flags
pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;
pub const FLAG_PADDED: u8 = 0x8;
pub const FLAG_PRIORITY: u8 = 0x20;

// SETTINGS identifiers
pub const SETTINGS_HEADER_TABLE_SIZE: u16 = 0x1;
pub const SETTINGS_ENABLE_PUSH: u16 = 0x2;
pub const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 0x5;
pub const SETTINGS_MAX_HEADER_LIST_SIZE: u16 = 0x6;

pub const FRAME_HEADER_LENGTH: usize = 9;

/// The 24-byte client connection preface.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub fn frame_type_name(frame_type: u8) -> &'static str {
    match frame_type {
        TYPE_DATA => "DATA",
        TYPE_HEADERS => "HEADERS",
        TYPE_PRIORITY => "PRIORITY",
        TYPE_RST_STREAM => "RST_STREAM",
        TYPE_SETTINGS => "SETTINGS",
        TYPE_PUSH_PROMISE => "PUSH_PROMISE",
        TYPE_PING => "PING",
        TYPE_GOAWAY => "GOAWAY",
        TYPE_WINDOW_UPDATE => "WINDOW_UPDATE",
        TYPE_CONTINUATION => "CONTINUATION",
        _ => "UNKNOWN",
    }
}

/// One parsed frame: the 9-byte header fields plus the raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn type_name(&self) -> &'static str {
        frame_type_name(self.frame_type)
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Stream priority as carried by PRIORITY frames and HEADERS frames with
/// the PRIORITY flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    pub exclusive: bool,
    pub dependency: u32,
    pub weight: u16,
}

/// 9-byte header + payload; reserved stream-id bit is emitted as zero.
pub fn build_frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut out = Vec::with_capacity(FRAME_HEADER_LENGTH + len);
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.push(frame_type);
    out.push(flags);
    out.extend_from_slice(&(stream_id & 0x7fff_ffff).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Parse one frame from the start of `buf`. Returns the frame and the
/// number of bytes consumed, or None when fewer than 9 + length bytes are
/// available. Callers loop until None to frame an inbound byte stream.
pub fn parse_frame(buf: &[u8]) -> Option<(Frame, usize)> {
    if buf.len() < FRAME_HEADER_LENGTH {
        return None;
    }
    let length = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | buf[2] as u32;
    let total = FRAME_HEADER_LENGTH + length as usize;
    if buf.len() < total {
        return None;
    }
    let stream_id =
        u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
    Some((
        Frame {
            length,
            frame_type: buf[3],
            flags: buf[4],
            stream_id,
            payload: buf[FRAME_HEADER_LENGTH..total].to_vec(),
        },
        total,
    ))
}

/// Frame a whole inbound buffer; trailing partial bytes are ignored.
pub fn parse_frames(buf: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while let Some((frame, consumed)) = parse_frame(&buf[pos..]) {
        frames.push(frame);
        pos += consumed;
    }
    frames
}

pub fn data_frame(stream_id: u32, data: &[u8], end_stream: bool) -> Vec<u8> {
    let flags = if end_stream { FLAG_END_STREAM } else { 0 };
    build_frame(TYPE_DATA, flags, stream_id, data)
}

/// DATA frame with a pad-length prefix and `pad_len` zero bytes appended.
pub fn data_frame_padded(stream_id: u32, data: &[u8], end_stream: bool, pad_len: u8) -> Vec<u8> {
    let mut flags = FLAG_PADDED;
    if end_stream {
        flags |= FLAG_END_STREAM;
    }
    let mut payload = Vec::with_capacity(1 + data.len() + pad_len as usize);
    payload.push(pad_len);
    payload.extend_from_slice(data);
    payload.extend(std::iter::repeat(0u8).take(pad_len as usize));
    build_frame(TYPE_DATA, flags, stream_id, &payload)
}

/// HEADERS frame around an HPACK block. END_HEADERS is always set; no
/// priority or padding is emitted.
pub fn headers_frame(stream_id: u32, header_block: &[u8], end_stream: bool) -> Vec<u8> {
    let mut flags = FLAG_END_HEADERS;
    if end_stream {
        flags |= FLAG_END_STREAM;
    }
    build_frame(TYPE_HEADERS, flags, stream_id, header_block)
}

pub fn settings_frame(settings: &[(u16, u32)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(settings.len() * 6);
    for (id, value) in settings {
        payload.extend_from_slice(&id.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
    }
    build_frame(TYPE_SETTINGS, 0, 0, &payload)
}

pub fn settings_ack_frame() -> Vec<u8> {
    build_frame(TYPE_SETTINGS, FLAG_ACK, 0, &[])
}

pub fn window_update_frame(stream_id: u32, increment: u32) -> Vec<u8> {
    build_frame(
        TYPE_WINDOW_UPDATE,
        0,
        stream_id,
        &(increment & 0x7fff_ffff).to_be_bytes(),
    )
}

pub fn ping_frame(payload: [u8; 8], ack: bool) -> Vec<u8> {
    let flags = if ack { FLAG_ACK } else { 0 };
    build_frame(TYPE_PING, flags, 0, &payload)
}

pub fn goaway_frame(last_stream_id: u32, error_code: u32, debug_data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + debug_data.len());
    payload.extend_from_slice(&(last_stream_id & 0x7fff_ffff).to_be_bytes());
    payload.extend_from_slice(&error_code.to_be_bytes());
    payload.extend_from_slice(debug_data);
    build_frame(TYPE_GOAWAY, 0, 0, &payload)
}

pub fn rst_stream_frame(stream_id: u32, error_code: u32) -> Vec<u8> {
    build_frame(TYPE_RST_STREAM, 0, stream_id, &error_code.to_be_bytes())
}

/// Weight is stored on the wire as weight-1.
pub fn priority_frame(stream_id: u32, exclusive: bool, dependency: u32, weight: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(5);
    let dep = if exclusive {
        dependency | 0x8000_0000
    } else {
        dependency & 0x7fff_ffff
    };
    payload.extend_from_slice(&dep.to_be_bytes());
    payload.push(weight.saturating_sub(1) as u8);
    build_frame(TYPE_PRIORITY, 0, stream_id, &payload)
}

/// Decode a SETTINGS payload into (id, value) pairs; a trailing partial
/// entry is ignored.
pub fn parse_settings(payload: &[u8]) -> Vec<(u16, u32)> {
    payload
        .chunks_exact(6)
        .map(|c| {
            (
                u16::from_be_bytes([c[0], c[1]]),
                u32::from_be_bytes([c[2], c[3], c[4], c[5]]),
            )
        })
        .collect()
}

/// HEADERS payload with PADDED and PRIORITY honored: returns the bare
/// header-block fragment plus the priority, if present.
pub fn parse_headers_payload(frame: &Frame) -> (Vec<u8>, Option<Priority>) {
    let mut payload = frame.payload.as_slice();
    let mut pad_len = 0usize;

    if frame.has_flag(FLAG_PADDED) && !payload.is_empty() {
        pad_len = payload[0] as usize;
        payload = &payload[1..];
    }

    let mut priority = None;
    if frame.has_flag(FLAG_PRIORITY) && payload.len() >= 5 {
        let dep = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        priority = Some(Priority {
            exclusive: dep & 0x8000_0000 != 0,
            dependency: dep & 0x7fff_ffff,
            weight: payload[4] as u16 + 1,
        });
        payload = &payload[5..];
    }

    let end = payload.len().saturating_sub(pad_len);
    (payload[..end].to_vec(), priority)
}

/// DATA payload with PADDED honored.
pub fn parse_data_payload(frame: &Frame) -> Vec<u8> {
    let mut payload = frame.payload.as_slice();
    let mut pad_len = 0usize;
    if frame.has_flag(FLAG_PADDED) && !payload.is_empty() {
        pad_len = payload[0] as usize;
        payload = &payload[1..];
    }
    let end = payload.len().saturating_sub(pad_len);
    payload[..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TYPE_DATA, FLAG_END_STREAM, 1, b"hello".to_vec())]
    #[case(TYPE_HEADERS, FLAG_END_HEADERS, 3, vec![0x82, 0x84])]
    #[case(TYPE_SETTINGS, 0, 0, vec![0, 3, 0, 0, 0, 100])]
    #[case(TYPE_WINDOW_UPDATE, 0, 0, vec![0, 0, 0xff, 0xff])]
    #[case(TYPE_PING, FLAG_ACK, 0, vec![1, 2, 3, 4, 5, 6, 7, 8])]
    #[case(TYPE_GOAWAY, 0, 0, vec![0, 0, 0, 1, 0, 0, 0, 0])]
    #[case(TYPE_RST_STREAM, 0, 5, vec![0, 0, 0, 8])]
    #[case(TYPE_PRIORITY, 0, 7, vec![0x80, 0, 0, 1, 15])]
    fn test_build_parse_roundtrip(
        #[case] frame_type: u8,
        #[case] flags: u8,
        #[case] stream_id: u32,
        #[case] payload: Vec<u8>,
    ) {
        let bytes = build_frame(frame_type, flags, stream_id, &payload);
        let (frame, consumed) = parse_frame(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(frame.frame_type, frame_type);
        assert_eq!(frame.flags, flags);
        assert_eq!(frame.stream_id, stream_id);
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.length as usize, payload.len());
    }

    #[test]
    fn test_parse_returns_none_on_short_buffers() {
        assert!(parse_frame(&[0, 0, 5, 0, 0]).is_none());
        // Header promises 5 payload bytes but only 2 arrive
        let mut bytes = build_frame(TYPE_DATA, 0, 1, b"hello");
        bytes.truncate(11);
        assert!(parse_frame(&bytes).is_none());
    }

    #[test]
    fn test_parse_frames_loops_and_ignores_tail() {
        let mut buf = settings_frame(&[(SETTINGS_INITIAL_WINDOW_SIZE, 65535)]);
        buf.extend_from_slice(&data_frame(1, b"abc", true));
        buf.extend_from_slice(&[0, 0, 9]); // partial next header

        let frames = parse_frames(&buf);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_type, TYPE_SETTINGS);
        assert_eq!(frames[1].frame_type, TYPE_DATA);
    }

    #[test]
    fn test_reserved_stream_bit_ignored_on_parse() {
        let mut bytes = build_frame(TYPE_DATA, 0, 1, b"x");
        bytes[5] |= 0x80; // set reserved bit
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(frame.stream_id, 1);
    }

    #[test]
    fn test_settings_payload() {
        let bytes = settings_frame(&[
            (SETTINGS_MAX_CONCURRENT_STREAMS, 100),
            (SETTINGS_INITIAL_WINDOW_SIZE, 65535),
        ]);
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(
            parse_settings(&frame.payload),
            vec![
                (SETTINGS_MAX_CONCURRENT_STREAMS, 100),
                (SETTINGS_INITIAL_WINDOW_SIZE, 65535)
            ]
        );
    }

    #[test]
    fn test_settings_ack_is_empty_on_stream_zero() {
        let (frame, _) = parse_frame(&settings_ack_frame()).unwrap();
        assert_eq!(frame.stream_id, 0);
        assert!(frame.payload.is_empty());
        assert!(frame.has_flag(FLAG_ACK));
    }

    #[test]
    fn test_headers_padded_and_priority_stripped() {
        // PADDED + PRIORITY inbound frame built by hand:
        // pad_len=2, exclusive dep on 3, weight byte 9 (=> weight 10), block [0x82], pad [0,0]
        let mut payload = vec![2u8];
        payload.extend_from_slice(&(3u32 | 0x8000_0000).to_be_bytes());
        payload.push(9);
        payload.push(0x82);
        payload.extend_from_slice(&[0, 0]);
        let bytes = build_frame(
            TYPE_HEADERS,
            FLAG_END_HEADERS | FLAG_PADDED | FLAG_PRIORITY,
            1,
            &payload,
        );
        let (frame, _) = parse_frame(&bytes).unwrap();
        let (block, priority) = parse_headers_payload(&frame);

        assert_eq!(block, vec![0x82]);
        let priority = priority.unwrap();
        assert!(priority.exclusive);
        assert_eq!(priority.dependency, 3);
        assert_eq!(priority.weight, 10);
    }

    #[test]
    fn test_data_padding_roundtrip() {
        let bytes = data_frame_padded(1, b"body", false, 4);
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(frame.length as usize, 1 + 4 + 4);
        assert_eq!(parse_data_payload(&frame), b"body".to_vec());
    }

    #[test]
    fn test_priority_frame_weight_offset() {
        let bytes = priority_frame(7, true, 3, 16);
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(frame.payload[4], 15);
        let dep = u32::from_be_bytes([
            frame.payload[0],
            frame.payload[1],
            frame.payload[2],
            frame.payload[3],
        ]);
        assert!(dep & 0x8000_0000 != 0);
        assert_eq!(dep & 0x7fff_ffff, 3);
    }

    #[test]
    fn test_window_update_clears_high_bit() {
        let bytes = window_update_frame(0, 0xffff_ffff);
        let (frame, _) = parse_frame(&bytes).unwrap();
        let incr = u32::from_be_bytes([
            frame.payload[0],
            frame.payload[1],
            frame.payload[2],
            frame.payload[3],
        ]);
        assert_eq!(incr, 0x7fff_ffff);
    }

    #[test]
    fn test_goaway_layout() {
        let bytes = goaway_frame(5, 2, b"dbg");
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(&frame.payload[..4], &5u32.to_be_bytes());
        assert_eq!(&frame.payload[4..8], &2u32.to_be_bytes());
        assert_eq!(&frame.payload[8..], b"dbg");
    }

    #[test]
    fn test_preface_constant() {
        assert_eq!(CONNECTION_PREFACE, b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n");
        assert_eq!(CONNECTION_PREFACE.len(), 24);
    }
}
