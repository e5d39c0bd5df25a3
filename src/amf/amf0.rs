//! AMF0 encoding and decoding
//!
//! AMF0 serializes one value as a one-byte type marker followed by the
//! payload. Objects and ECMA arrays are key/value runs terminated by an
//! empty key plus the object-end marker; strict arrays are count-prefixed.
//!
//! Only the subset RTMP command and metadata traffic actually uses is kept
//! first-class. Markers this engine never produces (typed objects, XML,
//! references) still decode, folding into the nearest plain value.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::value::AmfValue;
use crate::error::AmfError;

mod marker {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const REFERENCE: u8 = 0x07;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const DATE: u8 = 0x0B;
    pub const LONG_STRING: u8 = 0x0C;
    pub const UNSUPPORTED: u8 = 0x0D;
    pub const XML: u8 = 0x0F;
    pub const TYPED_OBJECT: u8 = 0x10;
}

/// Recursion bound for nested objects/arrays
const DEPTH_LIMIT: usize = 64;

/// AMF0 value decoder
///
/// Strict mode rejects unknown markers and missing object terminators.
/// The default is forgiving: encoders in the wild omit both.
pub struct Amf0Decoder {
    strict: bool,
    depth: usize,
    ref_table: Vec<AmfValue>,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self::with_lenient(true)
    }

    pub fn with_lenient(lenient: bool) -> Self {
        Self {
            strict: !lenient,
            depth: 0,
            ref_table: Vec::new(),
        }
    }

    /// Decode one value from the front of `buf`
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if self.depth >= DEPTH_LIMIT {
            return Err(AmfError::NestingTooDeep);
        }
        self.depth += 1;
        let value = self.dispatch(buf);
        self.depth -= 1;
        value
    }

    /// Decode values until the buffer runs dry
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut out = Vec::new();
        while !buf.is_empty() {
            out.push(self.decode(buf)?);
        }
        Ok(out)
    }

    fn dispatch(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match take_u8(buf)? {
            marker::NUMBER => Ok(AmfValue::Number(f64::from_bits(take_u64(buf)?))),
            marker::BOOLEAN => Ok(AmfValue::Boolean(take_u8(buf)? != 0)),
            marker::STRING => Ok(AmfValue::String(short_string(buf)?)),
            marker::LONG_STRING | marker::XML => Ok(AmfValue::String(long_string(buf)?)),
            marker::NULL => Ok(AmfValue::Null),
            marker::UNDEFINED | marker::UNSUPPORTED => Ok(AmfValue::Undefined),
            marker::OBJECT => {
                let props = self.properties(buf)?;
                Ok(self.remember(AmfValue::Object(props)))
            }
            marker::ECMA_ARRAY => {
                // The advertised count is a hint; the terminator decides
                take_u32(buf)?;
                let props = self.properties(buf)?;
                Ok(self.remember(AmfValue::EcmaArray(props)))
            }
            marker::TYPED_OBJECT => {
                // Class name carries nothing this engine needs
                short_string(buf)?;
                let props = self.properties(buf)?;
                Ok(self.remember(AmfValue::Object(props)))
            }
            marker::STRICT_ARRAY => {
                let count = take_u32(buf)? as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.decode(buf)?);
                }
                Ok(self.remember(AmfValue::Array(items)))
            }
            marker::DATE => {
                let millis = f64::from_bits(take_u64(buf)?);
                take_u16(buf)?; // timezone field, zero on the wire
                Ok(AmfValue::Date(millis))
            }
            marker::REFERENCE => {
                let index = take_u16(buf)?;
                self.ref_table
                    .get(index as usize)
                    .cloned()
                    .ok_or(AmfError::InvalidReference(index))
            }
            other if self.strict => Err(AmfError::UnknownMarker(other)),
            _ => Ok(AmfValue::Undefined),
        }
    }

    /// Key/value pairs up to the empty-key + object-end terminator
    fn properties(&mut self, buf: &mut Bytes) -> Result<HashMap<String, AmfValue>, AmfError> {
        let mut props = HashMap::new();
        loop {
            let key = short_string(buf)?;
            if !key.is_empty() {
                let value = self.decode(buf)?;
                props.insert(key, value);
                continue;
            }
            return match take_u8(buf) {
                Ok(m) if m == marker::OBJECT_END => Ok(props),
                _ if !self.strict => Ok(props),
                Ok(_) => Err(AmfError::InvalidObjectEnd),
                Err(e) => Err(e),
            };
        }
    }

    /// Record a container for later reference markers
    fn remember(&mut self, value: AmfValue) -> AmfValue {
        self.ref_table.push(value.clone());
        value
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn need(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        Err(AmfError::UnexpectedEof)
    } else {
        Ok(())
    }
}

fn take_u8(buf: &mut Bytes) -> Result<u8, AmfError> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut Bytes) -> Result<u16, AmfError> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut Bytes) -> Result<u32, AmfError> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

fn take_u64(buf: &mut Bytes) -> Result<u64, AmfError> {
    need(buf, 8)?;
    Ok(buf.get_u64())
}

fn utf8(buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
    need(buf, len)?;
    String::from_utf8(buf.copy_to_bytes(len).to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// UTF-8 with a 16-bit length prefix
fn short_string(buf: &mut Bytes) -> Result<String, AmfError> {
    let len = take_u16(buf)? as usize;
    utf8(buf, len)
}

/// UTF-8 with a 32-bit length prefix
fn long_string(buf: &mut Bytes) -> Result<String, AmfError> {
    let len = take_u32(buf)? as usize;
    utf8(buf, len)
}

/// AMF0 value encoder accumulating into one buffer
pub struct Amf0Encoder {
    out: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            out: BytesMut::with_capacity(256),
        }
    }

    /// Append one value
    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Number(n) => {
                self.out.put_u8(marker::NUMBER);
                self.out.put_u64(n.to_bits());
            }
            AmfValue::Boolean(b) => {
                self.out.put_u8(marker::BOOLEAN);
                self.out.put_u8(*b as u8);
            }
            AmfValue::String(s) => self.string(s),
            AmfValue::Null => self.out.put_u8(marker::NULL),
            AmfValue::Undefined => self.out.put_u8(marker::UNDEFINED),
            AmfValue::Object(props) => {
                self.out.put_u8(marker::OBJECT);
                self.pairs(props);
            }
            AmfValue::EcmaArray(props) => {
                self.out.put_u8(marker::ECMA_ARRAY);
                self.out.put_u32(props.len() as u32);
                self.pairs(props);
            }
            AmfValue::Array(items) => {
                self.out.put_u8(marker::STRICT_ARRAY);
                self.out.put_u32(items.len() as u32);
                for item in items {
                    self.encode(item);
                }
            }
            AmfValue::Date(millis) => {
                self.out.put_u8(marker::DATE);
                self.out.put_u64(millis.to_bits());
                self.out.put_i16(0);
            }
        }
    }

    /// Hand back everything appended so far
    pub fn finish(&mut self) -> Bytes {
        self.out.split().freeze()
    }

    /// Short or long form depending on length
    fn string(&mut self, s: &str) {
        if s.len() <= u16::MAX as usize {
            self.out.put_u8(marker::STRING);
            self.out.put_u16(s.len() as u16);
        } else {
            self.out.put_u8(marker::LONG_STRING);
            self.out.put_u32(s.len() as u32);
        }
        self.out.put_slice(s.as_bytes());
    }

    fn pairs(&mut self, props: &HashMap<String, AmfValue>) {
        for (key, value) in props {
            let len = key.len().min(u16::MAX as usize);
            self.out.put_u16(len as u16);
            self.out.put_slice(&key.as_bytes()[..len]);
            self.encode(value);
        }
        self.out.put_u16(0);
        self.out.put_u8(marker::OBJECT_END);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value to its wire bytes
pub fn encode(value: &AmfValue) -> Bytes {
    let mut enc = Amf0Encoder::new();
    enc.encode(value);
    enc.finish()
}

/// Decode a single value from the start of `data`
pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    let mut buf = Bytes::copy_from_slice(data);
    Amf0Decoder::new().decode(&mut buf)
}

/// Decode every value in `data`
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut buf = Bytes::copy_from_slice(data);
    Amf0Decoder::new().decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf_object;

    #[test]
    fn test_number_roundtrip() {
        let value = AmfValue::Number(42.5);
        let encoded = encode(&value);
        assert_eq!(encoded[0], marker::NUMBER);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_string_roundtrip() {
        let value = AmfValue::String("hello world".into());
        let encoded = encode(&value);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_boolean_and_null_roundtrip() {
        for value in [AmfValue::Boolean(true), AmfValue::Boolean(false), AmfValue::Null] {
            let decoded = decode(&encode(&value)).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_object_roundtrip() {
        let value = amf_object! {
            "app" => "live",
            "tcUrl" => "rtmp://localhost:1935/live",
            "fpad" => false,
            "capabilities" => 15.0,
        };
        let decoded = decode(&encode(&value)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_nested_object_roundtrip() {
        let inner = amf_object! { "code" => "NetConnection.Connect.Success" };
        let mut outer = std::collections::HashMap::new();
        outer.insert("info".to_string(), inner);
        let value = AmfValue::Object(outer);
        let decoded = decode(&encode(&value)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_strict_array_roundtrip() {
        let value = AmfValue::Array(vec![
            AmfValue::Number(1.0),
            AmfValue::String("two".into()),
            AmfValue::Null,
        ]);
        let decoded = decode(&encode(&value)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_date_roundtrip() {
        let value = AmfValue::Date(1234567890.0);
        let decoded = decode(&encode(&value)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_decode_all_command_sequence() {
        let mut enc = Amf0Encoder::new();
        enc.encode(&AmfValue::String("connect".into()));
        enc.encode(&AmfValue::Number(1.0));
        enc.encode(&amf_object! { "app" => "live" });
        let bytes = enc.finish();

        let values = decode_all(&bytes).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].as_str(), Some("connect"));
        assert_eq!(values[1].as_number(), Some(1.0));
        assert_eq!(values[2].get_string("app"), Some("live"));
    }

    #[test]
    fn test_truncated_input_errors() {
        let encoded = encode(&AmfValue::Number(1.0));
        assert!(matches!(
            decode(&encoded[..4]),
            Err(AmfError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_unknown_marker_strict_mode() {
        let mut decoder = Amf0Decoder::with_lenient(false);
        let mut buf = Bytes::from_static(&[0x7F]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(AmfError::UnknownMarker(0x7F))
        ));
    }

    #[test]
    fn test_lenient_missing_object_end() {
        // Object with one property and no trailing end marker
        let mut bytes = BytesMut::new();
        bytes.put_u8(marker::OBJECT);
        bytes.put_u16(3);
        bytes.put_slice(b"app");
        bytes.put_u8(marker::STRING);
        bytes.put_u16(4);
        bytes.put_slice(b"live");
        bytes.put_u16(0); // empty key, but no 0x09 follows

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.get_string("app"), Some("live"));
    }

    #[test]
    fn test_nesting_limit() {
        // 65 nested objects, each with one key holding the next
        let mut bytes = BytesMut::new();
        for _ in 0..=DEPTH_LIMIT {
            bytes.put_u8(marker::OBJECT);
            bytes.put_u16(1);
            bytes.put_slice(b"k");
        }
        assert!(matches!(
            decode(&bytes),
            Err(AmfError::NestingTooDeep)
        ));
    }
}
