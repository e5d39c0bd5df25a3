//! RTMP chunk stream codec
//!
//! RTMP messages are split into chunks for multiplexing. Each chunk has a
//! header that identifies the chunk stream and message being sent.
//!
//! ```text
//! Chunk Format:
//! +-------------+-----------------+-------------------+
//! | Basic Header| Message Header  | Chunk Data        |
//! | (1-3 bytes) | (0,3,7,11 bytes)| (variable)        |
//! +-------------+-----------------+-------------------+
//!
//! Basic Header formats:
//! - 1 byte:  fmt(2) + csid(6)        for csid 2-63
//! - 2 bytes: fmt(2) + 0 + csid(8)    for csid 64-319
//! - 3 bytes: fmt(2) + 1 + csid(16)   for csid 64-65599
//!
//! Message Header formats (based on fmt):
//! - Type 0 (11 bytes): timestamp(3) + length(3) + type(1) + stream_id(4 LE)
//! - Type 1 (7 bytes):  timestamp_delta(3) + length(3) + type(1)
//! - Type 2 (3 bytes):  timestamp_delta(3)
//! - Type 3 (0 bytes):  (use previous chunk's values)
//!
//! A 24-bit timestamp field of 0xFFFFFF means a 4-byte extended timestamp
//! follows the message header; type-3 chunks of such a message repeat the
//! extended field.
//! ```
//!
//! Reference: RTMP Specification Section 5.3

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// A complete RTMP message, reassembled from chunks on one chunk stream
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Chunk stream ID (for multiplexing)
    pub csid: u32,
    /// Absolute message timestamp (milliseconds, 32-bit wraparound)
    pub timestamp: u32,
    /// Message type ID
    pub message_type: u8,
    /// Message stream ID
    pub stream_id: u32,
    /// Message payload
    pub payload: Bytes,
}

/// Per-chunk-stream state for reassembly
#[derive(Debug, Default)]
struct ChunkStreamState {
    /// Current absolute timestamp
    timestamp: u32,
    /// Last timestamp delta (types 1/2)
    timestamp_delta: u32,
    /// Last message length
    message_length: u32,
    /// Last message type
    message_type: u8,
    /// Last message stream ID
    stream_id: u32,
    /// Whether the last header carried an extended timestamp
    has_extended_timestamp: bool,
    /// Header type of the last type-0/1/2 header on this stream
    last_header_type: u8,
    /// Buffer for partial message reassembly
    partial_message: BytesMut,
    /// Expected total length of the in-flight message
    expected_length: u32,
}

impl ChunkStreamState {
    fn bytes_remaining(&self) -> u32 {
        self.expected_length - self.partial_message.len() as u32
    }

    /// True while a message on this stream is partially assembled.
    /// `expected_length` drops back to zero when a message completes.
    fn reassembling(&self) -> bool {
        self.expected_length > 0
    }
}

/// Chunk stream decoder
///
/// Handles chunk demultiplexing and message reassembly. `decode` consumes
/// nothing until an entire chunk (header plus its share of payload) is
/// buffered, so callers can feed partial network reads safely.
pub struct ChunkDecoder {
    /// Maximum incoming chunk size
    chunk_size: u32,
    /// Per-chunk-stream state
    streams: HashMap<u32, ChunkStreamState>,
}

impl ChunkDecoder {
    /// Create a new decoder with the protocol default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    /// Set the chunk size (called when a SetChunkSize message is accepted).
    /// Takes effect at the next chunk boundary.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_MESSAGE_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Try to decode one chunk from the buffer.
    ///
    /// Returns Ok(Some(message)) when the chunk completed a message,
    /// Ok(None) if more data is needed (buffer untouched) or the chunk was
    /// a non-final fragment, and Err on protocol violation.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RawMessage>> {
        let (fmt, csid, basic_len) = match parse_basic_header(buf) {
            Some(v) => v,
            None => return Ok(None),
        };

        let msg_header_len: usize = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };

        let state = self.streams.entry(csid).or_default();

        // Types 0/1/2 may only appear at a message boundary
        if fmt != 3 && state.reassembling() {
            return Err(ProtocolError::ChunkBoundary {
                csid,
                remaining: state.bytes_remaining(),
            }
            .into());
        }

        if buf.len() < basic_len + msg_header_len {
            return Ok(None);
        }

        // Peek the message header to learn whether an extended timestamp
        // field follows; type 3 inherits the flag from the stored header.
        let header = &buf[basic_len..basic_len + msg_header_len];
        let has_ext = if fmt == 3 {
            state.has_extended_timestamp
        } else {
            get_u24(&header[0..3]) >= EXTENDED_TIMESTAMP_THRESHOLD
        };
        let ext_len = if has_ext { 4 } else { 0 };

        // Length of the message this chunk belongs to
        let message_length = match fmt {
            0 | 1 => get_u24(&header[3..6]),
            _ => state.message_length,
        };

        let remaining = if state.reassembling() {
            state.bytes_remaining()
        } else {
            message_length
        };
        let data_len = remaining.min(self.chunk_size) as usize;

        if buf.len() < basic_len + msg_header_len + ext_len + data_len {
            return Ok(None);
        }

        // The whole chunk is buffered; consume it.
        buf.advance(basic_len);

        match fmt {
            0 => {
                let timestamp = buf.get_uint(3) as u32;
                state.message_length = buf.get_uint(3) as u32;
                state.message_type = buf.get_u8();
                state.stream_id = buf.get_u32_le();
                state.timestamp = if has_ext { buf.get_u32() } else { timestamp };
                state.has_extended_timestamp = has_ext;
                state.last_header_type = 0;
                state.start_message();
            }
            1 => {
                let delta = buf.get_uint(3) as u32;
                state.message_length = buf.get_uint(3) as u32;
                state.message_type = buf.get_u8();
                let delta = if has_ext { buf.get_u32() } else { delta };
                state.timestamp_delta = delta;
                state.timestamp = state.timestamp.wrapping_add(delta);
                state.has_extended_timestamp = has_ext;
                state.last_header_type = 1;
                state.start_message();
            }
            2 => {
                let delta = buf.get_uint(3) as u32;
                let delta = if has_ext { buf.get_u32() } else { delta };
                state.timestamp_delta = delta;
                state.timestamp = state.timestamp.wrapping_add(delta);
                state.has_extended_timestamp = has_ext;
                state.last_header_type = 2;
                state.start_message();
            }
            _ => {
                if state.reassembling() {
                    // Continuation chunk; the extended field, if present,
                    // repeats the message timestamp.
                    if has_ext {
                        buf.advance(4);
                    }
                } else {
                    // Message boundary: a new message reusing the stored
                    // header fields.
                    if has_ext {
                        let ext = buf.get_u32();
                        match state.last_header_type {
                            0 => state.timestamp = ext,
                            _ => state.timestamp = state.timestamp.wrapping_add(ext),
                        }
                    } else if state.last_header_type != 0 {
                        state.timestamp = state.timestamp.wrapping_add(state.timestamp_delta);
                    }
                    state.start_message();
                }
            }
        }

        state.partial_message.put_slice(&buf[..data_len]);
        buf.advance(data_len);

        if state.partial_message.len() as u32 >= state.expected_length {
            let payload = state.partial_message.split().freeze();
            state.expected_length = 0;

            Ok(Some(RawMessage {
                csid,
                timestamp: state.timestamp,
                message_type: state.message_type,
                stream_id: state.stream_id,
                payload,
            }))
        } else {
            Ok(None)
        }
    }
}

impl ChunkStreamState {
    /// Begin assembling a new message of `message_length` bytes
    fn start_message(&mut self) {
        self.expected_length = self.message_length;
        self.partial_message.clear();
        self.partial_message.reserve(self.message_length as usize);
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk stream encoder
///
/// Fragments messages into chunks for transmission. Every message starts
/// with a type-0 header; continuation chunks use type 3 on the same csid.
pub struct ChunkEncoder {
    /// Outgoing chunk size
    chunk_size: u32,
}

impl ChunkEncoder {
    /// Create a new encoder with the protocol default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the chunk size (announce it to the peer with SetChunkSize first)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_MESSAGE_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Encode a message into chunks
    pub fn encode(&self, msg: &RawMessage, buf: &mut BytesMut) -> Result<()> {
        let payload_len = msg.payload.len();
        if payload_len as u64 > MAX_MESSAGE_SIZE as u64 {
            return Err(ProtocolError::MessageTooLarge {
                size: payload_len as u32,
                max: MAX_MESSAGE_SIZE,
            }
            .into());
        }

        let needs_ext = msg.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD;
        let timestamp_field = if needs_ext {
            EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            msg.timestamp
        };

        // Type-0 header
        write_basic_header(msg.csid, 0, buf);
        put_u24(timestamp_field, buf);
        put_u24(payload_len as u32, buf);
        buf.put_u8(msg.message_type);
        buf.put_u32_le(msg.stream_id);
        if needs_ext {
            buf.put_u32(msg.timestamp);
        }

        let chunk_size = self.chunk_size as usize;
        let mut offset = 0;
        loop {
            let data_len = (payload_len - offset).min(chunk_size);
            buf.put_slice(&msg.payload[offset..offset + data_len]);
            offset += data_len;

            if offset >= payload_len {
                break;
            }

            // Type-3 continuation on the same csid
            write_basic_header(msg.csid, 3, buf);
            if needs_ext {
                buf.put_u32(msg.timestamp);
            }
        }

        Ok(())
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Peek the basic header and return (fmt, csid, header_length), or None if
/// the buffer does not yet hold the whole basic header.
fn parse_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    if buf.is_empty() {
        return None;
    }

    let first = buf[0];
    let fmt = first >> 6;
    let csid_low = first & 0x3F;

    match csid_low {
        0 => {
            // 2-byte header: csid = 64 + second byte
            if buf.len() < 2 {
                return None;
            }
            Some((fmt, 64 + buf[1] as u32, 2))
        }
        1 => {
            // 3-byte header: csid = 64 + second + third*256 (little-endian)
            if buf.len() < 3 {
                return None;
            }
            Some((fmt, 64 + buf[1] as u32 + (buf[2] as u32) * 256, 3))
        }
        _ => Some((fmt, csid_low as u32, 1)),
    }
}

/// Write a basic header for the given csid and format
fn write_basic_header(csid: u32, fmt: u8, buf: &mut BytesMut) {
    if csid >= 64 + 256 {
        // 3-byte form
        buf.put_u8((fmt << 6) | 1);
        let ext = csid - 64;
        buf.put_u8((ext & 0xFF) as u8);
        buf.put_u8(((ext >> 8) & 0xFF) as u8);
    } else if csid >= 64 {
        // 2-byte form
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        // 1-byte form
        buf.put_u8((fmt << 6) | (csid as u8));
    }
}

fn put_u24(value: u32, buf: &mut BytesMut) {
    buf.put_u8(((value >> 16) & 0xFF) as u8);
    buf.put_u8(((value >> 8) & 0xFF) as u8);
    buf.put_u8((value & 0xFF) as u8);
}

fn get_u24(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: &RawMessage, write_size: u32, read_size: u32) -> RawMessage {
        let encoder = {
            let mut e = ChunkEncoder::new();
            e.set_chunk_size(write_size);
            e
        };
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(read_size);

        let mut wire = BytesMut::new();
        encoder.encode(msg, &mut wire).unwrap();

        loop {
            if let Some(decoded) = decoder.decode(&mut wire).unwrap() {
                assert!(wire.is_empty(), "trailing bytes after message");
                return decoded;
            }
        }
    }

    #[test]
    fn test_basic_header_parsing() {
        // 1-byte header (csid 2-63)
        assert_eq!(parse_basic_header(&[0x03]), Some((0, 3, 1)));
        // 2-byte header (csid 64-319)
        assert_eq!(parse_basic_header(&[0x00, 0x00]), Some((0, 64, 2)));
        assert_eq!(parse_basic_header(&[0xC0, 0xFF]), Some((3, 319, 2)));
        // 3-byte header (csid 64-65599)
        assert_eq!(parse_basic_header(&[0x01, 0x00, 0x01]), Some((0, 320, 3)));
        assert_eq!(
            parse_basic_header(&[0x41, 0xFF, 0xFF]),
            Some((1, 65599, 3))
        );
        // Truncated extended forms
        assert_eq!(parse_basic_header(&[0x00]), None);
        assert_eq!(parse_basic_header(&[0x01, 0x00]), None);
    }

    #[test]
    fn test_roundtrip_chunk_sizes() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        for write_size in [1, 2, 128, 4096, 1 << 20] {
            let original = RawMessage {
                csid: CSID_COMMAND,
                timestamp: 1000,
                message_type: MSG_COMMAND_AMF0,
                stream_id: 1,
                payload: Bytes::from(payload.clone()),
            };
            let decoded = roundtrip(&original, write_size, write_size);
            assert_eq!(decoded.csid, original.csid);
            assert_eq!(decoded.timestamp, original.timestamp);
            assert_eq!(decoded.message_type, original.message_type);
            assert_eq!(decoded.stream_id, original.stream_id);
            assert_eq!(decoded.payload, original.payload);
        }
    }

    #[test]
    fn test_roundtrip_extended_csids() {
        for csid in [2, 63, 64, 319, 320, 65599] {
            let original = RawMessage {
                csid,
                timestamp: 0,
                message_type: MSG_VIDEO,
                stream_id: 1,
                payload: Bytes::from_static(b"payload"),
            };
            let decoded = roundtrip(&original, 128, 128);
            assert_eq!(decoded.csid, csid);
            assert_eq!(decoded.payload, original.payload);
        }
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let original = RawMessage {
            csid: 3,
            timestamp: 5,
            message_type: MSG_COMMAND_AMF0,
            stream_id: 0,
            payload: Bytes::new(),
        };
        let decoded = roundtrip(&original, 128, 128);
        assert_eq!(decoded.payload.len(), 0);
        assert_eq!(decoded.timestamp, 5);
    }

    #[test]
    fn test_extended_timestamp_roundtrip() {
        for timestamp in [0xFFFFFF, 0x1000000, u32::MAX] {
            let original = RawMessage {
                csid: CSID_VIDEO,
                timestamp,
                message_type: MSG_VIDEO,
                stream_id: 1,
                payload: Bytes::from(vec![0xAB; 300]),
            };
            // Small chunk size forces type-3 continuations that must carry
            // the extended field too.
            let decoded = roundtrip(&original, 64, 64);
            assert_eq!(decoded.timestamp, timestamp);
            assert_eq!(decoded.payload, original.payload);
        }
    }

    #[test]
    fn test_extended_timestamp_on_continuations() {
        let original = RawMessage {
            csid: 3,
            timestamp: 0x1234567,
            message_type: MSG_VIDEO,
            stream_id: 1,
            payload: Bytes::from(vec![0u8; 256]),
        };
        let encoder = ChunkEncoder::new(); // 128-byte chunks
        let mut wire = BytesMut::new();
        encoder.encode(&original, &mut wire).unwrap();

        // type-0: 1 basic + 11 header + 4 ext + 128 data, then the
        // continuation starts with 0xC3 followed by the extended timestamp.
        let cont = 1 + 11 + 4 + 128;
        assert_eq!(wire[cont], 0xC3);
        assert_eq!(
            &wire[cont + 1..cont + 5],
            &0x1234567u32.to_be_bytes()[..]
        );
    }

    #[test]
    fn test_large_message_chunk_count() {
        // 4096-byte message at write size 128: 1 type-0 + 32 type-3 chunks
        let original = RawMessage {
            csid: CSID_COMMAND,
            timestamp: 0,
            message_type: MSG_COMMAND_AMF0,
            stream_id: 0,
            payload: Bytes::from(vec![0x55; 4096]),
        };
        let encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder.encode(&original, &mut wire).unwrap();

        // 12-byte full header + payload + 32 one-byte continuation headers
        assert_eq!(wire.len(), 12 + 4096 + 32);
        assert_eq!(wire[0], 0x03); // fmt 0, csid 3
        let type3_count = wire.iter().filter(|&&b| b == 0xC3).count();
        assert!(type3_count >= 32);
        assert_eq!(wire[12 + 128], 0xC3); // first continuation boundary

        let mut decoder = ChunkDecoder::new();
        let mut decoded = None;
        while decoded.is_none() {
            decoded = decoder.decode(&mut wire).unwrap();
        }
        assert_eq!(decoded.unwrap().payload, original.payload);
    }

    #[test]
    fn test_interleaved_chunk_streams() {
        // Two messages on distinct csids, chunks interleaved on the wire:
        // A0 B0 A1 B1. Per-csid reassembly must keep them independent.
        let a: Vec<u8> = vec![0xAA; 200];
        let b: Vec<u8> = vec![0xBB; 200];

        let mut wire = BytesMut::new();
        // A0: fmt0 csid 3, len 200, type 9, msgsid 1, first 128 bytes
        wire.put_u8(0x03);
        put_u24(10, &mut wire);
        put_u24(200, &mut wire);
        wire.put_u8(MSG_VIDEO);
        wire.put_u32_le(1);
        wire.put_slice(&a[..128]);
        // B0: fmt0 csid 4, len 200, type 8, msgsid 1, first 128 bytes
        wire.put_u8(0x04);
        put_u24(20, &mut wire);
        put_u24(200, &mut wire);
        wire.put_u8(MSG_AUDIO);
        wire.put_u32_le(1);
        wire.put_slice(&b[..128]);
        // A1: fmt3 csid 3, remaining 72 bytes
        wire.put_u8(0xC3);
        wire.put_slice(&a[128..]);
        // B1: fmt3 csid 4, remaining 72 bytes
        wire.put_u8(0xC4);
        wire.put_slice(&b[128..]);

        let mut decoder = ChunkDecoder::new();
        let mut messages = Vec::new();
        while !wire.is_empty() {
            if let Some(msg) = decoder.decode(&mut wire).unwrap() {
                messages.push(msg);
            }
        }

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].csid, 3);
        assert_eq!(messages[0].timestamp, 10);
        assert_eq!(messages[0].payload, Bytes::from(a));
        assert_eq!(messages[1].csid, 4);
        assert_eq!(messages[1].timestamp, 20);
        assert_eq!(messages[1].payload, Bytes::from(b));
    }

    #[test]
    fn test_type1_and_type2_deltas() {
        let mut wire = BytesMut::new();
        // fmt0: ts 100, len 4, type 8
        wire.put_u8(0x03);
        put_u24(100, &mut wire);
        put_u24(4, &mut wire);
        wire.put_u8(MSG_AUDIO);
        wire.put_u32_le(1);
        wire.put_slice(&[1, 2, 3, 4]);
        // fmt1: delta 25, len 2, type 8
        wire.put_u8(0x43);
        put_u24(25, &mut wire);
        put_u24(2, &mut wire);
        wire.put_u8(MSG_AUDIO);
        wire.put_slice(&[5, 6]);
        // fmt2: delta 25 again
        wire.put_u8(0x83);
        put_u24(25, &mut wire);
        wire.put_slice(&[7, 8]);
        // fmt3 at message boundary: repeats the stored delta
        wire.put_u8(0xC3);
        wire.put_slice(&[9, 10]);

        let mut decoder = ChunkDecoder::new();
        let mut timestamps = Vec::new();
        while !wire.is_empty() {
            if let Some(msg) = decoder.decode(&mut wire).unwrap() {
                timestamps.push(msg.timestamp);
            }
        }
        assert_eq!(timestamps, vec![100, 125, 150, 175]);
    }

    #[test]
    fn test_header_mid_reassembly_rejected() {
        let mut wire = BytesMut::new();
        // fmt0 announcing 200 bytes but carrying only one chunk of 128
        wire.put_u8(0x03);
        put_u24(0, &mut wire);
        put_u24(200, &mut wire);
        wire.put_u8(MSG_VIDEO);
        wire.put_u32_le(1);
        wire.put_slice(&[0u8; 128]);
        // fmt0 again on the same csid while 72 bytes are still pending
        wire.put_u8(0x03);
        put_u24(0, &mut wire);
        put_u24(10, &mut wire);
        wire.put_u8(MSG_VIDEO);
        wire.put_u32_le(1);
        wire.put_slice(&[0u8; 10]);

        let mut decoder = ChunkDecoder::new();
        assert!(decoder.decode(&mut wire).unwrap().is_none());
        let err = decoder.decode(&mut wire).unwrap_err();
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn test_set_chunk_size_mid_stream() {
        // A 3000-byte message at read/write chunk size 1024 arrives as
        // 1024 + 1024 + 952.
        let payload = Bytes::from(vec![0x42; 3000]);
        let original = RawMessage {
            csid: CSID_VIDEO,
            timestamp: 0,
            message_type: MSG_VIDEO,
            stream_id: 1,
            payload: payload.clone(),
        };

        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(1024);
        let mut wire = BytesMut::new();
        encoder.encode(&original, &mut wire).unwrap();

        // 12-byte header + 3000 payload + 2 continuation headers
        assert_eq!(wire.len(), 12 + 3000 + 2);

        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(1024);
        let mut decoded = None;
        let mut chunks = 0;
        while decoded.is_none() {
            decoded = decoder.decode(&mut wire).unwrap();
            chunks += 1;
        }
        assert_eq!(chunks, 3);
        assert_eq!(decoded.unwrap().payload, payload);
    }

    #[test]
    fn test_incremental_feed() {
        // Bytes trickling in one at a time must never desynchronize the
        // decoder.
        let original = RawMessage {
            csid: 3,
            timestamp: 42,
            message_type: MSG_COMMAND_AMF0,
            stream_id: 0,
            payload: Bytes::from(vec![9u8; 300]),
        };
        let encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder.encode(&original, &mut wire).unwrap();

        let mut decoder = ChunkDecoder::new();
        let mut feed = BytesMut::new();
        let mut result = None;
        for byte in wire.iter() {
            feed.put_u8(*byte);
            if let Some(msg) = decoder.decode(&mut feed).unwrap() {
                result = Some(msg);
            }
        }
        let msg = result.expect("message should complete on the last byte");
        assert_eq!(msg.payload, original.payload);
        assert_eq!(msg.timestamp, 42);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let original = RawMessage {
            csid: 3,
            timestamp: 0,
            message_type: MSG_VIDEO,
            stream_id: 1,
            payload: Bytes::from(vec![0u8; MAX_MESSAGE_SIZE as usize + 1]),
        };
        let encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        assert!(encoder.encode(&original, &mut wire).is_err());
    }
}
