//! AAC audio configuration parsing
//!
//! RTMP transports AAC in raw frames (no ADTS headers). The sequence-header
//! audio tag carries the AudioSpecificConfig, which is bit-packed:
//!
//! ```text
//! audioObjectType: 5 bits
//! samplingFrequencyIndex: 4 bits
//! if (samplingFrequencyIndex == 0xF) samplingFrequency: 24 bits
//! channelConfiguration: 4 bits
//! ```

use bytes::Bytes;

use crate::error::{MediaError, Result};

/// AudioSpecificConfig (from the AAC sequence header)
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC, the common case)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, ...)
    pub channel_configuration: u8,
    /// Raw config bytes (echoed back out in sequence-header tags)
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    /// Standard sampling frequencies by index
    const SAMPLING_FREQUENCIES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    /// Parse from AAC sequence header data
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacConfig.into());
        }

        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);

        let (sampling_frequency, channel_configuration) = if sampling_frequency_index == 0x0F {
            // Explicit frequency in the next 24 bits, then channels
            if data.len() < 6 {
                return Err(MediaError::InvalidAacConfig.into());
            }
            let f0 = (data[1] & 0x7F) as u32;
            let f1 = data[2] as u32;
            let f2 = data[3] as u32;
            let f3 = (data[4] >> 1) as u32;
            let freq = (f0 << 17) | (f1 << 9) | (f2 << 1) | f3;
            let channels = ((data[4] & 0x01) << 3) | ((data[5] >> 5) & 0x07);
            (freq, channels)
        } else if (sampling_frequency_index as usize) < Self::SAMPLING_FREQUENCIES.len() {
            let freq = Self::SAMPLING_FREQUENCIES[sampling_frequency_index as usize];
            let channels = (b1 >> 3) & 0x0F;
            (freq, channels)
        } else {
            return Err(MediaError::InvalidAacConfig.into());
        };

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            raw: data,
        })
    }
}
