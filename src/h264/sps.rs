// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sequence parameter set, ISO/IEC 14496-10 section 7.3.2.1.

use crate::bits::BitCursor;
use crate::h264::vui::{parse_vui, Vui};
use base::Error;
use serde::Serialize;

/// Profiles whose SPS carries the chroma-format / bit-depth / scaling-list
/// block (ISO/IEC 14496-10 table A-1 plus later amendments).
const HIGH_PROFILES: [u8; 14] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 134, 135, 138, 139, 144];

#[derive(Clone, Debug, Serialize)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_set0_flag: bool,
    pub constraint_set1_flag: bool,
    pub constraint_set2_flag: bool,
    pub constraint_set3_flag: bool,
    pub constraint_set4_flag: bool,
    pub constraint_set5_flag: bool,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    /// High-profile chroma block; absent for Baseline/Main, where
    /// `chroma_format_idc` is inferred as 1 (4:2:0).
    pub chroma: Option<ChromaInfo>,
    pub log2_max_frame_num_minus4: u32,
    pub poc: PocType,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: Option<bool>,
    pub direct_8x8_inference_flag: bool,
    pub cropping: Option<Cropping>,
    pub vui: Option<Vui>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChromaInfo {
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    /// One entry per list; `None` where the present flag was 0.
    pub seq_scaling_lists: Option<Vec<Option<Vec<u8>>>>,
}

/// Picture-order-count sub-syntax, keyed by `pic_order_cnt_type`. The
/// presence rules of the per-type fields are type-level invariants.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "pic_order_cnt_type")]
pub enum PocType {
    #[serde(rename = "0")]
    Type0 { log2_max_pic_order_cnt_lsb_minus4: u32 },
    #[serde(rename = "1")]
    Type1 {
        delta_pic_order_always_zero_flag: bool,
        offset_for_non_ref_pic: i32,
        offset_for_top_to_bottom_field: i32,
        offset_for_ref_frame: Vec<i32>,
    },
    #[serde(rename = "2")]
    Type2,
}

impl PocType {
    pub fn type_number(&self) -> u8 {
        match self {
            PocType::Type0 { .. } => 0,
            PocType::Type1 { .. } => 1,
            PocType::Type2 => 2,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Cropping {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Sps {
    pub fn parse(rbsp: &[u8]) -> Result<Sps, Error> {
        let mut c = BitCursor::new(rbsp);
        let c = &mut c;

        let profile_idc = c.read_u8()?;
        let constraint_set0_flag = c.read_bool()?;
        let constraint_set1_flag = c.read_bool()?;
        let constraint_set2_flag = c.read_bool()?;
        let constraint_set3_flag = c.read_bool()?;
        let constraint_set4_flag = c.read_bool()?;
        let constraint_set5_flag = c.read_bool()?;
        c.skip(2)?; // reserved_zero_2bits
        let level_idc = c.read_u8()?;
        let seq_parameter_set_id = c.read_ue()?;

        let chroma = if HIGH_PROFILES.contains(&profile_idc) {
            let chroma_format_idc = c.read_ue()?;
            let separate_colour_plane_flag = if chroma_format_idc == 3 {
                c.read_bool()?
            } else {
                false
            };
            let bit_depth_luma_minus8 = c.read_ue()?;
            let bit_depth_chroma_minus8 = c.read_ue()?;
            let qpprime_y_zero_transform_bypass_flag = c.read_bool()?;
            let seq_scaling_lists = if c.read_bool()? {
                let num_lists = if chroma_format_idc != 3 { 8 } else { 12 };
                let mut lists = Vec::with_capacity(num_lists);
                for i in 0..num_lists {
                    if c.read_bool()? {
                        let size = if i < 6 { 16 } else { 64 };
                        lists.push(Some(read_scaling_list(c, size)?));
                    } else {
                        lists.push(None);
                    }
                }
                Some(lists)
            } else {
                None
            };
            Some(ChromaInfo {
                chroma_format_idc,
                separate_colour_plane_flag,
                bit_depth_luma_minus8,
                bit_depth_chroma_minus8,
                qpprime_y_zero_transform_bypass_flag,
                seq_scaling_lists,
            })
        } else {
            None
        };

        let log2_max_frame_num_minus4 = c.read_ue()?;
        let poc = match c.read_ue()? {
            0 => PocType::Type0 {
                log2_max_pic_order_cnt_lsb_minus4: c.read_ue()?,
            },
            1 => {
                let delta_pic_order_always_zero_flag = c.read_bool()?;
                let offset_for_non_ref_pic = c.read_se()?;
                let offset_for_top_to_bottom_field = c.read_se()?;
                let n = c.read_ue()?;
                let mut offset_for_ref_frame = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    offset_for_ref_frame.push(c.read_se()?);
                }
                PocType::Type1 {
                    delta_pic_order_always_zero_flag,
                    offset_for_non_ref_pic,
                    offset_for_top_to_bottom_field,
                    offset_for_ref_frame,
                }
            }
            2 => PocType::Type2,
            other => {
                base::bail_t!(Malformed, "pic_order_cnt_type {} out of range", other);
            }
        };

        let max_num_ref_frames = c.read_ue()?;
        let gaps_in_frame_num_value_allowed_flag = c.read_bool()?;
        let pic_width_in_mbs_minus1 = c.read_ue()?;
        let pic_height_in_map_units_minus1 = c.read_ue()?;
        let frame_mbs_only_flag = c.read_bool()?;
        let mb_adaptive_frame_field_flag = if !frame_mbs_only_flag {
            Some(c.read_bool()?)
        } else {
            None
        };
        let direct_8x8_inference_flag = c.read_bool()?;
        let cropping = if c.read_bool()? {
            Some(Cropping {
                left: c.read_ue()?,
                right: c.read_ue()?,
                top: c.read_ue()?,
                bottom: c.read_ue()?,
            })
        } else {
            None
        };
        let vui = if c.read_bool()? {
            Some(parse_vui(c)?)
        } else {
            None
        };

        Ok(Sps {
            profile_idc,
            constraint_set0_flag,
            constraint_set1_flag,
            constraint_set2_flag,
            constraint_set3_flag,
            constraint_set4_flag,
            constraint_set5_flag,
            level_idc,
            seq_parameter_set_id,
            chroma,
            log2_max_frame_num_minus4,
            poc,
            max_num_ref_frames,
            gaps_in_frame_num_value_allowed_flag,
            pic_width_in_mbs_minus1,
            pic_height_in_map_units_minus1,
            frame_mbs_only_flag,
            mb_adaptive_frame_field_flag,
            direct_8x8_inference_flag,
            cropping,
            vui,
        })
    }

    pub fn chroma_format_idc(&self) -> u32 {
        self.chroma.as_ref().map(|ch| ch.chroma_format_idc).unwrap_or(1)
    }

    /// ChromaArrayType per section 7.4.2.1.1: 0 when colour planes are
    /// coded separately, else `chroma_format_idc`.
    pub fn chroma_array_type(&self) -> u32 {
        match &self.chroma {
            Some(ch) if ch.separate_colour_plane_flag => 0,
            Some(ch) => ch.chroma_format_idc,
            None => 1,
        }
    }

    pub fn separate_colour_plane_flag(&self) -> bool {
        self.chroma
            .as_ref()
            .map(|ch| ch.separate_colour_plane_flag)
            .unwrap_or(false)
    }

    /// Bit width of `frame_num` in slice headers.
    pub fn frame_num_bits(&self) -> u32 {
        self.log2_max_frame_num_minus4 + 4
    }

    /// Bit width of `pic_order_cnt_lsb`; only meaningful for POC type 0.
    pub fn poc_lsb_bits(&self) -> Option<u32> {
        match &self.poc {
            PocType::Type0 {
                log2_max_pic_order_cnt_lsb_minus4,
            } => Some(log2_max_pic_order_cnt_lsb_minus4 + 4),
            _ => None,
        }
    }

    pub fn pic_size_in_map_units(&self) -> u32 {
        (self.pic_width_in_mbs_minus1 + 1) * (self.pic_height_in_map_units_minus1 + 1)
    }
}

/// Scaling list delta decoding (section 7.3.2.1.1.1). Returns the decoded
/// scale values.
pub fn read_scaling_list(c: &mut BitCursor, size: usize) -> Result<Vec<u8>, Error> {
    let mut list = Vec::with_capacity(size);
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = c.read_se()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        let value = if next_scale == 0 { last_scale } else { next_scale };
        list.push(value as u8);
        last_scale = value;
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_sps() {
        // 640x480 Baseline SPS payload (after the 0x67 NAL header byte).
        let rbsp = [0x42, 0xc0, 0x1e, 0xe9, 0x01, 0x40, 0x7b, 0x20];
        let sps = Sps::parse(&rbsp).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert!(sps.constraint_set0_flag);
        assert!(sps.constraint_set1_flag);
        assert_eq!(sps.level_idc, 30);
        assert_eq!(sps.seq_parameter_set_id, 0);
        assert_eq!(sps.log2_max_frame_num_minus4, 0);
        assert_eq!(sps.poc.type_number(), 0);
        assert_eq!(sps.poc_lsb_bits(), Some(5));
        assert_eq!(sps.max_num_ref_frames, 1);
        assert_eq!((sps.pic_width_in_mbs_minus1 + 1) * 16, 640);
        assert_eq!((sps.pic_height_in_map_units_minus1 + 1) * 16, 480);
        assert!(sps.frame_mbs_only_flag);
        assert!(sps.cropping.is_none());
        assert!(sps.vui.is_none());
        assert!(sps.chroma.is_none());
        assert_eq!(sps.chroma_format_idc(), 1);
    }

    #[test]
    fn main_profile_with_vui() {
        // 1280x720 Main profile SPS from an IP camera.
        let rbsp = [
            0x4d, 0x00, 0x1f, 0x9a, 0x66, 0x02, 0x80, 0x2d, 0xff, 0x35, 0x01, 0x01, 0x01, 0x40,
            0x00, 0x00, 0xfa, 0x00, 0x00, 0x1d, 0x4c, 0x01,
        ];
        let sps = Sps::parse(&rbsp).unwrap();
        assert_eq!(sps.profile_idc, 77);
        assert_eq!((sps.pic_width_in_mbs_minus1 + 1) * 16, 1280);
        assert_eq!((sps.pic_height_in_map_units_minus1 + 1) * 16, 720);
        let vui = sps.vui.as_ref().expect("vui present");
        let timing = vui.timing_info.as_ref().expect("timing info");
        assert_eq!(timing.time_scale, 30000);
        assert_eq!(timing.num_units_in_tick, 1000);
        assert!(!timing.fixed_frame_rate_flag);
    }

    #[test]
    fn truncated_sps_is_an_error() {
        let rbsp = [0x42, 0xc0];
        let e = Sps::parse(&rbsp).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::Truncated);
    }
}
