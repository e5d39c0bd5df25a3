//! Media handling for RTMP
//!
//! This module provides:
//! - FLV tag values and the packets surfaced at the connection boundary
//! - Codec descriptions (H.264 decoder config, AAC audio specific config)
//! - Tag/packet/codec-data conversions
//! - The prober that derives codec descriptions from an initial tag window

pub mod aac;
pub mod flv;
pub mod h264;

pub use aac::AudioSpecificConfig;
pub use flv::{codec_data_to_tag, packet_to_tag, CodecData, FlvTag, FlvTagType, Packet, Prober};
pub use h264::AvcConfig;
