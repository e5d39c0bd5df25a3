//! H.264/AVC configuration parsing
//!
//! RTMP transports H.264 in AVCC format. The sequence-header video tag
//! carries an AVCDecoderConfigurationRecord:
//!
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```
//!
//! The first SPS is parsed (exp-Golomb, after emulation-prevention removal)
//! for the coded picture dimensions that stream metadata reports.

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};

/// AVC decoder configuration (from the sequence header)
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, ...)
    pub profile: u8,
    /// Profile compatibility flags
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// NALU length size (usually 4)
    pub nalu_length_size: u8,
    /// Sequence Parameter Sets
    pub sps: Vec<Bytes>,
    /// Picture Parameter Sets
    pub pps: Vec<Bytes>,
}

/// Forward-only reader over the record; every read checks what is left
struct RecordCursor {
    rest: Bytes,
}

impl RecordCursor {
    fn u8(&mut self) -> Result<u8> {
        if self.rest.is_empty() {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        Ok(self.rest.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        if self.rest.len() < 2 {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        Ok(self.rest.get_u16())
    }

    fn take(&mut self, n: usize) -> Result<Bytes> {
        if self.rest.len() < n {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        Ok(self.rest.copy_to_bytes(n))
    }

    /// `count` NAL units, each with a 16-bit length prefix
    fn nal_units(&mut self, count: usize) -> Result<Vec<Bytes>> {
        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.u16()? as usize;
            units.push(self.take(len)?);
        }
        Ok(units)
    }
}

impl AvcConfig {
    /// Parse from an AVCDecoderConfigurationRecord
    pub fn parse(record: Bytes) -> Result<Self> {
        let mut cur = RecordCursor { rest: record };

        // configurationVersion is always 1
        if cur.u8()? != 1 {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        let profile = cur.u8()?;
        let compatibility = cur.u8()?;
        let level = cur.u8()?;
        // lengthSizeMinusOne lives in the low 2 bits; the rest is reserved
        let nalu_length_size = (cur.u8()? & 0b11) + 1;

        let sps_count = (cur.u8()? & 0x1F) as usize;
        let sps = cur.nal_units(sps_count)?;
        let pps_count = cur.u8()? as usize;
        let pps = cur.nal_units(pps_count)?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }

    /// Coded picture dimensions from the first SPS
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let sps = self.sps.first().ok_or(MediaError::InvalidAvcConfig)?;
        let info = parse_sps(sps)?;
        Ok((info.width, info.height))
    }
}

/// Fields of a sequence parameter set this engine cares about
#[derive(Debug, Clone, Copy)]
pub struct SpsInfo {
    pub profile: u8,
    pub level: u8,
    pub width: u32,
    pub height: u32,
}

/// Parse an SPS NAL unit for the coded picture size
pub fn parse_sps(nal: &[u8]) -> Result<SpsInfo> {
    if nal.len() < 4 || nal[0] & 0x1F != 7 {
        return Err(MediaError::InvalidSps.into());
    }

    let rbsp = strip_emulation_prevention(&nal[1..]);
    let mut r = BitReader::new(&rbsp);

    let profile = r.read(8)? as u8;
    let _constraints = r.read(8)?;
    let level = r.read(8)? as u8;
    let _sps_id = r.ue()?;

    let mut chroma_format_idc = 1;
    if matches!(
        profile,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = r.ue()?;
        if chroma_format_idc == 3 {
            r.read(1)?; // separate_colour_plane_flag
        }
        r.ue()?; // bit_depth_luma_minus8
        r.ue()?; // bit_depth_chroma_minus8
        r.read(1)?; // qpprime_y_zero_transform_bypass_flag
        if r.read(1)? == 1 {
            // seq_scaling_matrix_present_flag
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..count {
                if r.read(1)? == 1 {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    r.ue()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = r.ue()?;
    if pic_order_cnt_type == 0 {
        r.ue()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if pic_order_cnt_type == 1 {
        r.read(1)?; // delta_pic_order_always_zero_flag
        r.se()?; // offset_for_non_ref_pic
        r.se()?; // offset_for_top_to_bottom_field
        let cycles = r.ue()?;
        for _ in 0..cycles {
            r.se()?; // offset_for_ref_frame
        }
    }
    r.ue()?; // max_num_ref_frames
    r.read(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = r.ue()?;
    let pic_height_in_map_units_minus1 = r.ue()?;
    if pic_width_in_mbs_minus1 >= 4096 || pic_height_in_map_units_minus1 >= 4096 {
        return Err(MediaError::InvalidSps.into());
    }
    let frame_mbs_only = r.read(1)?;
    if frame_mbs_only == 0 {
        r.read(1)?; // mb_adaptive_frame_field_flag
    }
    r.read(1)?; // direct_8x8_inference_flag

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
    if r.read(1)? == 1 {
        crop_left = r.ue()?;
        crop_right = r.ue()?;
        crop_top = r.ue()?;
        crop_bottom = r.ue()?;
    }

    let (sub_width, sub_height) = match chroma_format_idc {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1), // monochrome or 4:4:4
    };
    let crop_unit_x = sub_width as u64;
    let crop_unit_y = (sub_height * (2 - frame_mbs_only)) as u64;

    let full_width = ((pic_width_in_mbs_minus1 + 1) * 16) as u64;
    let full_height = ((pic_height_in_map_units_minus1 + 1) * 16 * (2 - frame_mbs_only)) as u64;
    let crop_x = (crop_left as u64 + crop_right as u64) * crop_unit_x;
    let crop_y = (crop_top as u64 + crop_bottom as u64) * crop_unit_y;
    if crop_x >= full_width || crop_y >= full_height {
        return Err(MediaError::InvalidSps.into());
    }
    let width = (full_width - crop_x) as u32;
    let height = (full_height - crop_y) as u32;

    Ok(SpsInfo {
        profile,
        level,
        width,
        height,
    })
}

/// Remove 0x000003 emulation-prevention bytes from an RBSP
fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 3 {
            zeros = 0;
            continue;
        }
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b);
    }
    out
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: u32) -> Result<()> {
    let mut last: i64 = 8;
    let mut next: i64 = 8;
    for _ in 0..size {
        if next != 0 {
            let delta = r.se()?;
            next = (last + delta as i64 + 256) % 256;
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}

/// MSB-first bit reader over an RBSP
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize, // bit position
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, count: u32) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            let byte = self.pos / 8;
            if byte >= self.data.len() {
                return Err(MediaError::InvalidSps.into());
            }
            let bit = (self.data[byte] >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Ok(value)
    }

    /// Unsigned exp-Golomb
    fn ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while self.read(1)? == 0 {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(MediaError::InvalidSps.into());
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let rest = self.read(leading_zeros)?;
        Ok((1 << leading_zeros) - 1 + rest)
    }

    /// Signed exp-Golomb
    fn se(&mut self) -> Result<i32> {
        let v = self.ue()?;
        if v % 2 == 0 {
            Ok(-((v / 2) as i32))
        } else {
            Ok((v / 2 + 1) as i32)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A hand-assembled 320x240 Baseline SPS:
    /// pic_width_in_mbs_minus1=19, pic_height_in_map_units_minus1=14,
    /// frame_mbs_only=1, no cropping, no VUI.
    pub(crate) const SPS_320X240: [u8; 8] = [0x67, 0x42, 0x00, 0x1E, 0xDA, 0x05, 0x07, 0xE4];

    pub(crate) const PPS_MINIMAL: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];

    /// Build an AVCDecoderConfigurationRecord around the test SPS/PPS
    pub(crate) fn avc_record() -> Bytes {
        let mut rec = vec![
            0x01,
            0x42,
            0x00,
            0x1E,
            0xFF,
            0xE1,
            0x00,
            SPS_320X240.len() as u8,
        ];
        rec.extend_from_slice(&SPS_320X240);
        rec.push(0x01);
        rec.extend_from_slice(&[0x00, PPS_MINIMAL.len() as u8]);
        rec.extend_from_slice(&PPS_MINIMAL);
        Bytes::from(rec)
    }

    #[test]
    fn test_parse_record() {
        let config = AvcConfig::parse(avc_record()).unwrap();
        assert_eq!(config.profile, 66);
        assert_eq!(config.level, 30);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(config.pps.len(), 1);
    }

    #[test]
    fn test_sps_dimensions() {
        let info = parse_sps(&SPS_320X240).unwrap();
        assert_eq!(info.profile, 66);
        assert_eq!(info.level, 30);
        assert_eq!(info.width, 320);
        assert_eq!(info.height, 240);

        let config = AvcConfig::parse(avc_record()).unwrap();
        assert_eq!(config.dimensions().unwrap(), (320, 240));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let rec = avc_record();
        for len in [0, 4, 6, 8] {
            assert!(AvcConfig::parse(rec.slice(..len)).is_err());
        }
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut rec = avc_record().to_vec();
        rec[0] = 0;
        assert!(AvcConfig::parse(Bytes::from(rec)).is_err());
    }

    #[test]
    fn test_emulation_prevention_strip() {
        assert_eq!(
            strip_emulation_prevention(&[0x00, 0x00, 0x03, 0x01]),
            vec![0x00, 0x00, 0x01]
        );
        assert_eq!(
            strip_emulation_prevention(&[0x00, 0x03, 0x00, 0x00, 0x03, 0x03]),
            vec![0x00, 0x03, 0x00, 0x00, 0x03]
        );
    }

    #[test]
    fn test_exp_golomb() {
        // bit pattern: ue()=0 ("1"), ue()=1 ("010"), ue()=19 ("000010100"),
        // padded with zeros
        let data = [0b1010_0000, 0b1010_0000];
        let mut r = BitReader::new(&data);
        assert_eq!(r.ue().unwrap(), 0);
        assert_eq!(r.ue().unwrap(), 1);
        assert_eq!(r.ue().unwrap(), 19);
    }
}
