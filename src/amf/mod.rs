//! AMF (Action Message Format) implementation
//!
//! AMF is Adobe's binary serialization format used in RTMP for encoding
//! command parameters and metadata. This module implements AMF0, which is
//! what RTMP commands and data messages actually exchange. AMF3 command and
//! data messages are handled at the message layer by skipping the leading
//! marker byte and parsing the remainder as AMF0.

pub mod amf0;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use value::AmfValue;
