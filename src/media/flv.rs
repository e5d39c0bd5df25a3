//! FLV tag values, packets, codec descriptions and the pre-media prober
//!
//! RTMP audio/video message bodies are FLV tag bodies:
//!
//! ```text
//! Video: | FrameType(4) CodecID(4) | AVCPacketType(8) | CompositionTime(SI24) | Data |
//! Audio: | SoundFormat(4) Rate(2) Size(1) Type(1) | AACPacketType(8) | Data |
//! ```
//!
//! Sequence-header tags (AVCPacketType/AACPacketType == 0) carry codec
//! configuration instead of media. The `Prober` consumes an initial window
//! of tags to derive per-stream `CodecData` before packets are surfaced.

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

use crate::error::{MediaError, Result};
use crate::media::aac::AudioSpecificConfig;
use crate::media::h264::AvcConfig;

/// FLV video codec id for H.264/AVC
pub const VIDEO_H264: u8 = 7;
/// FLV sound format for AAC
pub const SOUND_AAC: u8 = 10;

/// AVC packet type: sequence header (AVCDecoderConfigurationRecord)
pub const AVC_SEQHDR: u8 = 0;
/// AVC packet type: NAL units
pub const AVC_NALU: u8 = 1;

/// AAC packet type: sequence header (AudioSpecificConfig)
pub const AAC_SEQHDR: u8 = 0;
/// AAC packet type: raw frame
pub const AAC_RAW: u8 = 1;

/// FLV video frame type: keyframe
pub const FRAME_KEY: u8 = 1;
/// FLV video frame type: inter frame
pub const FRAME_INTER: u8 = 2;

/// How many tags the prober inspects before giving up
pub const MAX_PROBE_TAGS: usize = 32;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
}

/// An audio or video tag body as carried by an RTMP A/V message.
/// Timestamps travel with the enclosing message, not the tag.
#[derive(Debug, Clone)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Raw tag body (including codec header bytes)
    pub data: Bytes,
}

impl FlvTag {
    /// Create a new video tag
    pub fn video(data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            data,
        }
    }

    /// Create a new audio tag
    pub fn audio(data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            data,
        }
    }

    /// Check if this is a video tag
    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    /// Check if this is an audio tag
    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    /// For video tags, the codec id (lower 4 bits of the first byte)
    pub fn video_codec_id(&self) -> Option<u8> {
        if self.is_video() && !self.data.is_empty() {
            Some(self.data[0] & 0x0F)
        } else {
            None
        }
    }

    /// For AVC video tags, the packet type byte
    pub fn avc_packet_type(&self) -> Option<u8> {
        if self.video_codec_id() == Some(VIDEO_H264) && self.data.len() >= 2 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// For AVC video tags, the signed 24-bit composition time offset
    pub fn composition_time(&self) -> i32 {
        if self.video_codec_id() == Some(VIDEO_H264) && self.data.len() >= 5 {
            let ct = ((self.data[2] as i32) << 16)
                | ((self.data[3] as i32) << 8)
                | (self.data[4] as i32);
            // Sign extend from 24 bits
            if ct & 0x80_0000 != 0 {
                ct | !0xFF_FFFF
            } else {
                ct
            }
        } else {
            0
        }
    }

    /// For audio tags, the sound format (upper 4 bits of the first byte)
    pub fn sound_format(&self) -> Option<u8> {
        if self.is_audio() && !self.data.is_empty() {
            Some(self.data[0] >> 4)
        } else {
            None
        }
    }

    /// For AAC audio tags, the packet type byte
    pub fn aac_packet_type(&self) -> Option<u8> {
        if self.sound_format() == Some(SOUND_AAC) && self.data.len() >= 2 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// Check if this is a keyframe video tag
    pub fn is_keyframe(&self) -> bool {
        self.is_video() && !self.data.is_empty() && self.data[0] >> 4 == FRAME_KEY
    }

    /// Check if this is an AVC sequence header
    pub fn is_avc_sequence_header(&self) -> bool {
        self.avc_packet_type() == Some(AVC_SEQHDR)
    }

    /// Check if this is an AAC sequence header
    pub fn is_aac_sequence_header(&self) -> bool {
        self.aac_packet_type() == Some(AAC_SEQHDR)
    }

    /// Codec payload after the per-codec header bytes
    pub fn body(&self) -> Bytes {
        match self.tag_type {
            FlvTagType::Video if self.data.len() >= 5 => self.data.slice(5..),
            FlvTagType::Audio if self.data.len() >= 2 => self.data.slice(2..),
            _ => Bytes::new(),
        }
    }
}

/// The unit surfaced at the connection API boundary
#[derive(Debug, Clone)]
pub struct Packet {
    /// Stream index into the probed/declared codec list
    pub idx: usize,
    /// Presentation time in milliseconds (32-bit, may wrap)
    pub time: u32,
    /// Composition time offset in milliseconds (B-frames)
    pub composition_time: i32,
    /// Keyframe flag (always false for audio)
    pub is_keyframe: bool,
    /// Codec payload
    pub data: Bytes,
}

/// Per-stream codec description derived from sequence headers
#[derive(Debug, Clone)]
pub enum CodecData {
    H264 {
        /// The raw AVCDecoderConfigurationRecord
        record: Bytes,
        config: AvcConfig,
        width: u32,
        height: u32,
    },
    Aac {
        config: AudioSpecificConfig,
    },
}

impl CodecData {
    /// Build an H.264 description from an AVCDecoderConfigurationRecord
    pub fn from_avc_record(record: Bytes) -> Result<Self> {
        let config = AvcConfig::parse(record.clone())?;
        let (width, height) = config.dimensions()?;
        Ok(CodecData::H264 {
            record,
            config,
            width,
            height,
        })
    }

    /// Build an AAC description from an AudioSpecificConfig
    pub fn from_audio_specific_config(asc: Bytes) -> Result<Self> {
        let config = AudioSpecificConfig::parse(asc)?;
        Ok(CodecData::Aac { config })
    }

    pub fn is_video(&self) -> bool {
        matches!(self, CodecData::H264 { .. })
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, CodecData::Aac { .. })
    }

    /// Coded width (video only)
    pub fn width(&self) -> Option<u32> {
        match self {
            CodecData::H264 { width, .. } => Some(*width),
            _ => None,
        }
    }

    /// Coded height (video only)
    pub fn height(&self) -> Option<u32> {
        match self {
            CodecData::H264 { height, .. } => Some(*height),
            _ => None,
        }
    }

    /// Sample rate in Hz (audio only)
    pub fn sample_rate(&self) -> Option<u32> {
        match self {
            CodecData::Aac { config } => Some(config.sampling_frequency),
            _ => None,
        }
    }

    /// Channel count (audio only)
    pub fn channels(&self) -> Option<u8> {
        match self {
            CodecData::Aac { config } => Some(config.channel_configuration),
            _ => None,
        }
    }
}

/// Build the codec-config tag for a stream (sent after onMetaData)
pub fn codec_data_to_tag(stream: &CodecData) -> FlvTag {
    match stream {
        CodecData::H264 { record, .. } => {
            let mut data = BytesMut::with_capacity(5 + record.len());
            data.extend_from_slice(&[
                (FRAME_KEY << 4) | VIDEO_H264,
                AVC_SEQHDR,
                0,
                0,
                0,
            ]);
            data.extend_from_slice(record);
            FlvTag::video(data.freeze())
        }
        CodecData::Aac { config } => {
            let mut data = BytesMut::with_capacity(2 + config.raw.len());
            data.extend_from_slice(&[aac_sound_byte(config), AAC_SEQHDR]);
            data.extend_from_slice(&config.raw);
            FlvTag::audio(data.freeze())
        }
    }
}

/// Convert an outbound packet into a tag for its stream.
/// Returns the tag and the message timestamp to send it with.
pub fn packet_to_tag(pkt: &Packet, stream: &CodecData) -> (FlvTag, u32) {
    let tag = match stream {
        CodecData::H264 { .. } => {
            let frame_type = if pkt.is_keyframe { FRAME_KEY } else { FRAME_INTER };
            let ct = pkt.composition_time;
            let mut data = BytesMut::with_capacity(5 + pkt.data.len());
            data.extend_from_slice(&[
                (frame_type << 4) | VIDEO_H264,
                AVC_NALU,
                ((ct >> 16) & 0xFF) as u8,
                ((ct >> 8) & 0xFF) as u8,
                (ct & 0xFF) as u8,
            ]);
            data.extend_from_slice(&pkt.data);
            FlvTag::video(data.freeze())
        }
        CodecData::Aac { config } => {
            let mut data = BytesMut::with_capacity(2 + pkt.data.len());
            data.extend_from_slice(&[aac_sound_byte(config), AAC_RAW]);
            data.extend_from_slice(&pkt.data);
            FlvTag::audio(data.freeze())
        }
    };
    (tag, pkt.time)
}

/// First byte of an AAC audio tag: format/rate/size/type bits
fn aac_sound_byte(config: &AudioSpecificConfig) -> u8 {
    let rate_bits = match config.sampling_frequency {
        0..=5512 => 0,
        5513..=11025 => 1,
        11026..=22050 => 2,
        _ => 3,
    };
    let stereo = u8::from(config.channel_configuration >= 2);
    (SOUND_AAC << 4) | (rate_bits << 2) | (1 << 1) | stereo
}

/// Accumulates an initial window of A/V tags to derive per-stream codec
/// descriptions before media delivery begins.
///
/// Sequence headers register streams; media tags for registered streams are
/// buffered as packets and handed out through `pop_packet`. Probing
/// completes once both kinds are registered, or once at least one kind is
/// registered and a media tag has been seen (encoders emit every sequence
/// header before the first frame), or at the window cap.
#[derive(Debug, Default)]
pub struct Prober {
    /// Codec descriptions in registration order
    pub streams: Vec<CodecData>,
    video_idx: Option<usize>,
    audio_idx: Option<usize>,
    cached: VecDeque<Packet>,
    pushed_count: usize,
    saw_media: bool,
}

impl Prober {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one tag (with its message timestamp) into the probe window
    pub fn push_tag(&mut self, tag: &FlvTag, timestamp: u32) -> Result<()> {
        self.pushed_count += 1;

        match tag.tag_type {
            FlvTagType::Video => match tag.avc_packet_type() {
                Some(AVC_SEQHDR) => {
                    if self.video_idx.is_none() {
                        let stream = CodecData::from_avc_record(tag.body())?;
                        self.video_idx = Some(self.streams.len());
                        self.streams.push(stream);
                        tracing::debug!(
                            width = self.streams[self.video_idx.unwrap()].width(),
                            height = self.streams[self.video_idx.unwrap()].height(),
                            "probe: registered h264 stream"
                        );
                    }
                }
                Some(AVC_NALU) => {
                    self.saw_media = true;
                    if let Some(pkt) = self.tag_to_packet(tag, timestamp) {
                        self.cached.push_back(pkt);
                    }
                }
                _ => {}
            },
            FlvTagType::Audio => match tag.aac_packet_type() {
                Some(AAC_SEQHDR) => {
                    if self.audio_idx.is_none() {
                        let stream = CodecData::from_audio_specific_config(tag.body())?;
                        self.audio_idx = Some(self.streams.len());
                        self.streams.push(stream);
                        tracing::debug!(
                            sample_rate = self.streams[self.audio_idx.unwrap()].sample_rate(),
                            "probe: registered aac stream"
                        );
                    }
                }
                Some(AAC_RAW) => {
                    self.saw_media = true;
                    if let Some(pkt) = self.tag_to_packet(tag, timestamp) {
                        self.cached.push_back(pkt);
                    }
                }
                // Non-AAC audio cannot be described; it still counts as media
                _ => self.saw_media = true,
            },
        }

        if self.pushed_count >= MAX_PROBE_TAGS && self.streams.is_empty() {
            return Err(MediaError::ProbeWindowExhausted.into());
        }

        Ok(())
    }

    /// Whether the probe window is complete
    pub fn probed(&self) -> bool {
        let got_video = self.video_idx.is_some();
        let got_audio = self.audio_idx.is_some();
        if got_video && got_audio {
            return true;
        }
        (got_video || got_audio) && (self.saw_media || self.pushed_count >= MAX_PROBE_TAGS)
    }

    /// Whether any probed packets are waiting
    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }

    /// Pop the oldest packet buffered during probing
    pub fn pop_packet(&mut self) -> Option<Packet> {
        self.cached.pop_front()
    }

    /// Convert a media tag into a packet for its registered stream.
    /// Sequence headers and tags for unregistered codecs return None.
    pub fn tag_to_packet(&self, tag: &FlvTag, timestamp: u32) -> Option<Packet> {
        match tag.tag_type {
            FlvTagType::Video => {
                if tag.avc_packet_type() != Some(AVC_NALU) {
                    return None;
                }
                let idx = self.video_idx?;
                Some(Packet {
                    idx,
                    time: timestamp,
                    composition_time: tag.composition_time(),
                    is_keyframe: tag.is_keyframe(),
                    data: tag.body(),
                })
            }
            FlvTagType::Audio => {
                if tag.aac_packet_type() != Some(AAC_RAW) {
                    return None;
                }
                let idx = self.audio_idx?;
                Some(Packet {
                    idx,
                    time: timestamp,
                    composition_time: 0,
                    is_keyframe: false,
                    data: tag.body(),
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::media::aac::tests::ASC_44100_STEREO;
    use crate::media::h264::tests::avc_record;

    pub(crate) fn video_config_tag() -> FlvTag {
        let rec = avc_record();
        let mut data = BytesMut::new();
        data.extend_from_slice(&[0x17, AVC_SEQHDR, 0, 0, 0]);
        data.extend_from_slice(&rec);
        FlvTag::video(data.freeze())
    }

    pub(crate) fn audio_config_tag() -> FlvTag {
        let mut data = BytesMut::new();
        data.extend_from_slice(&[0xAF, AAC_SEQHDR]);
        data.extend_from_slice(&ASC_44100_STEREO);
        FlvTag::audio(data.freeze())
    }

    pub(crate) fn video_keyframe_tag() -> FlvTag {
        FlvTag::video(Bytes::from_static(&[
            0x17, AVC_NALU, 0, 0, 0, 0, 0, 0, 2, 0x65, 0x88,
        ]))
    }

    pub(crate) fn audio_frame_tag() -> FlvTag {
        FlvTag::audio(Bytes::from_static(&[0xAF, AAC_RAW, 0x21, 0x00, 0x03]))
    }

    #[test]
    fn test_tag_predicates() {
        let config = video_config_tag();
        assert!(config.is_video());
        assert!(config.is_avc_sequence_header());
        assert!(config.is_keyframe());
        assert_eq!(config.video_codec_id(), Some(VIDEO_H264));

        let key = video_keyframe_tag();
        assert!(!key.is_avc_sequence_header());
        assert!(key.is_keyframe());
        assert_eq!(key.composition_time(), 0);

        let audio = audio_frame_tag();
        assert!(audio.is_audio());
        assert!(!audio.is_aac_sequence_header());
        assert_eq!(audio.sound_format(), Some(SOUND_AAC));
        assert_eq!(audio.body(), Bytes::from_static(&[0x21, 0x00, 0x03]));
    }

    #[test]
    fn test_composition_time_sign_extension() {
        let tag = FlvTag::video(Bytes::from_static(&[0x27, AVC_NALU, 0xFF, 0xFF, 0xFE]));
        assert_eq!(tag.composition_time(), -2);

        let tag = FlvTag::video(Bytes::from_static(&[0x27, AVC_NALU, 0x00, 0x00, 0x28]));
        assert_eq!(tag.composition_time(), 40);
    }

    #[test]
    fn test_probe_video_and_audio() {
        let mut prober = Prober::new();
        prober.push_tag(&video_config_tag(), 0).unwrap();
        assert!(!prober.probed());
        prober.push_tag(&audio_config_tag(), 0).unwrap();
        assert!(prober.probed());

        assert_eq!(prober.streams.len(), 2);
        assert!(prober.streams[0].is_video());
        assert_eq!(prober.streams[0].width(), Some(320));
        assert_eq!(prober.streams[0].height(), Some(240));
        assert!(prober.streams[1].is_audio());
        assert_eq!(prober.streams[1].sample_rate(), Some(44100));
    }

    #[test]
    fn test_probe_video_only_completes_on_first_frame() {
        let mut prober = Prober::new();
        prober.push_tag(&video_config_tag(), 0).unwrap();
        assert!(!prober.probed());
        prober.push_tag(&video_keyframe_tag(), 40).unwrap();
        assert!(prober.probed());

        assert_eq!(prober.streams.len(), 1);
        assert!(!prober.is_empty());
        let pkt = prober.pop_packet().unwrap();
        assert_eq!(pkt.idx, 0);
        assert_eq!(pkt.time, 40);
        assert!(pkt.is_keyframe);
        assert!(prober.is_empty());
    }

    #[test]
    fn test_probe_buffers_packets_in_order() {
        let mut prober = Prober::new();
        prober.push_tag(&audio_config_tag(), 0).unwrap();
        prober.push_tag(&audio_frame_tag(), 10).unwrap();
        prober.push_tag(&audio_frame_tag(), 20).unwrap();
        assert!(prober.probed());

        assert_eq!(prober.pop_packet().unwrap().time, 10);
        assert_eq!(prober.pop_packet().unwrap().time, 20);
        assert!(prober.pop_packet().is_none());
    }

    #[test]
    fn test_probe_window_exhaustion() {
        let mut prober = Prober::new();
        let unknown = FlvTag::audio(Bytes::from_static(&[0x2F, 0x01])); // MP3
        let mut result = Ok(());
        for _ in 0..MAX_PROBE_TAGS {
            result = prober.push_tag(&unknown, 0);
            if result.is_err() {
                break;
            }
        }
        assert!(result.is_err());
        assert!(!prober.probed());
    }

    #[test]
    fn test_tag_to_packet_requires_registered_stream() {
        let prober = Prober::new();
        assert!(prober.tag_to_packet(&video_keyframe_tag(), 0).is_none());

        let mut prober = Prober::new();
        prober.push_tag(&video_config_tag(), 0).unwrap();
        let pkt = prober.tag_to_packet(&video_keyframe_tag(), 5).unwrap();
        assert_eq!(pkt.idx, 0);
        // Config tags never convert
        assert!(prober.tag_to_packet(&video_config_tag(), 5).is_none());
    }

    #[test]
    fn test_codec_data_to_tag_roundtrip() {
        let video = CodecData::from_avc_record(avc_record()).unwrap();
        let tag = codec_data_to_tag(&video);
        assert!(tag.is_avc_sequence_header());
        assert_eq!(tag.body(), avc_record());

        let audio =
            CodecData::from_audio_specific_config(Bytes::from_static(&ASC_44100_STEREO)).unwrap();
        let tag = codec_data_to_tag(&audio);
        assert!(tag.is_aac_sequence_header());
        assert_eq!(tag.data[0], 0xAF);
        assert_eq!(tag.body(), Bytes::from_static(&ASC_44100_STEREO));
    }

    #[test]
    fn test_packet_to_tag() {
        let video = CodecData::from_avc_record(avc_record()).unwrap();
        let pkt = Packet {
            idx: 0,
            time: 1000,
            composition_time: 40,
            is_keyframe: true,
            data: Bytes::from_static(&[0, 0, 0, 2, 0x65, 0x88]),
        };
        let (tag, timestamp) = packet_to_tag(&pkt, &video);
        assert_eq!(timestamp, 1000);
        assert_eq!(tag.data[0], 0x17);
        assert_eq!(tag.data[1], AVC_NALU);
        assert_eq!(tag.composition_time(), 40);
        assert_eq!(tag.body(), pkt.data);

        let audio =
            CodecData::from_audio_specific_config(Bytes::from_static(&ASC_44100_STEREO)).unwrap();
        let pkt = Packet {
            idx: 1,
            time: 23,
            composition_time: 0,
            is_keyframe: false,
            data: Bytes::from_static(&[0x21, 0x00]),
        };
        let (tag, timestamp) = packet_to_tag(&pkt, &audio);
        assert_eq!(timestamp, 23);
        assert_eq!(tag.data[0], 0xAF);
        assert_eq!(tag.data[1], AAC_RAW);
        assert_eq!(tag.body(), pkt.data);
    }
}
