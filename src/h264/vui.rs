// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! VUI and HRD parameters, ISO/IEC 14496-10 Annex E.

use crate::bits::BitCursor;
use base::Error;
use serde::Serialize;

pub const EXTENDED_SAR: u8 = 255;

#[derive(Clone, Debug, Serialize)]
pub struct Vui {
    pub aspect_ratio: Option<AspectRatioInfo>,
    pub overscan_appropriate_flag: Option<bool>,
    pub video_signal_type: Option<VideoSignalType>,
    pub chroma_loc_info: Option<ChromaLocInfo>,
    pub timing_info: Option<TimingInfo>,
    pub nal_hrd_parameters: Option<Hrd>,
    pub vcl_hrd_parameters: Option<Hrd>,
    pub low_delay_hrd_flag: Option<bool>,
    pub pic_struct_present_flag: bool,
    pub bitstream_restriction: Option<BitstreamRestriction>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AspectRatioInfo {
    pub aspect_ratio_idc: u8,
    /// Present only for `aspect_ratio_idc == EXTENDED_SAR`.
    pub sar: Option<(u16, u16)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VideoSignalType {
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description: Option<ColourDescription>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ColourDescription {
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChromaLocInfo {
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct TimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Hrd {
    pub cpb_cnt_minus1: u32,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub bit_rate_value_minus1: Vec<u32>,
    pub cpb_size_value_minus1: Vec<u32>,
    pub cbr_flag: Vec<bool>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub time_offset_length: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct BitstreamRestriction {
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_mb_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
    pub num_reorder_frames: u32,
    pub max_dec_frame_buffering: u32,
}

pub fn parse_vui(c: &mut BitCursor) -> Result<Vui, Error> {
    let aspect_ratio = if c.read_bool()? {
        let aspect_ratio_idc = c.read_u8()?;
        let sar = if aspect_ratio_idc == EXTENDED_SAR {
            Some((c.read_u16()?, c.read_u16()?))
        } else {
            None
        };
        Some(AspectRatioInfo {
            aspect_ratio_idc,
            sar,
        })
    } else {
        None
    };

    let overscan_appropriate_flag = if c.read_bool()? {
        Some(c.read_bool()?)
    } else {
        None
    };

    let video_signal_type = if c.read_bool()? {
        let video_format = c.read_u(3)? as u8;
        let video_full_range_flag = c.read_bool()?;
        let colour_description = if c.read_bool()? {
            Some(ColourDescription {
                colour_primaries: c.read_u8()?,
                transfer_characteristics: c.read_u8()?,
                matrix_coefficients: c.read_u8()?,
            })
        } else {
            None
        };
        Some(VideoSignalType {
            video_format,
            video_full_range_flag,
            colour_description,
        })
    } else {
        None
    };

    let chroma_loc_info = if c.read_bool()? {
        Some(ChromaLocInfo {
            chroma_sample_loc_type_top_field: c.read_ue()?,
            chroma_sample_loc_type_bottom_field: c.read_ue()?,
        })
    } else {
        None
    };

    let timing_info = if c.read_bool()? {
        Some(TimingInfo {
            num_units_in_tick: c.read_u32()?,
            time_scale: c.read_u32()?,
            fixed_frame_rate_flag: c.read_bool()?,
        })
    } else {
        None
    };

    let nal_hrd_parameters = if c.read_bool()? {
        Some(parse_hrd(c)?)
    } else {
        None
    };
    let vcl_hrd_parameters = if c.read_bool()? {
        Some(parse_hrd(c)?)
    } else {
        None
    };
    let low_delay_hrd_flag = if nal_hrd_parameters.is_some() || vcl_hrd_parameters.is_some() {
        Some(c.read_bool()?)
    } else {
        None
    };

    let pic_struct_present_flag = c.read_bool()?;
    let bitstream_restriction = if c.read_bool()? {
        Some(BitstreamRestriction {
            motion_vectors_over_pic_boundaries_flag: c.read_bool()?,
            max_bytes_per_pic_denom: c.read_ue()?,
            max_bits_per_mb_denom: c.read_ue()?,
            log2_max_mv_length_horizontal: c.read_ue()?,
            log2_max_mv_length_vertical: c.read_ue()?,
            num_reorder_frames: c.read_ue()?,
            max_dec_frame_buffering: c.read_ue()?,
        })
    } else {
        None
    };

    Ok(Vui {
        aspect_ratio,
        overscan_appropriate_flag,
        video_signal_type,
        chroma_loc_info,
        timing_info,
        nal_hrd_parameters,
        vcl_hrd_parameters,
        low_delay_hrd_flag,
        pic_struct_present_flag,
        bitstream_restriction,
    })
}

pub fn parse_hrd(c: &mut BitCursor) -> Result<Hrd, Error> {
    let cpb_cnt_minus1 = c.read_ue()?;
    let bit_rate_scale = c.read_u(4)? as u8;
    let cpb_size_scale = c.read_u(4)? as u8;
    let n = cpb_cnt_minus1 as usize + 1;
    let mut bit_rate_value_minus1 = Vec::with_capacity(n);
    let mut cpb_size_value_minus1 = Vec::with_capacity(n);
    let mut cbr_flag = Vec::with_capacity(n);
    for _ in 0..n {
        bit_rate_value_minus1.push(c.read_ue()?);
        cpb_size_value_minus1.push(c.read_ue()?);
        cbr_flag.push(c.read_bool()?);
    }
    Ok(Hrd {
        cpb_cnt_minus1,
        bit_rate_scale,
        cpb_size_scale,
        bit_rate_value_minus1,
        cpb_size_value_minus1,
        cbr_flag,
        initial_cpb_removal_delay_length_minus1: c.read_u(5)? as u8,
        cpb_removal_delay_length_minus1: c.read_u(5)? as u8,
        dpb_output_delay_length_minus1: c.read_u(5)? as u8,
        time_offset_length: c.read_u(5)? as u8,
    })
}
