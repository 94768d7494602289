// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! VUI and HRD parameters, ITU-T H.265 Annex E.

use crate::bits::BitCursor;
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Vui {
    pub aspect_ratio: Option<AspectRatioInfo>,
    pub overscan_appropriate_flag: Option<bool>,
    pub video_signal_type: Option<VideoSignalType>,
    pub chroma_loc_info: Option<ChromaLocInfo>,
    pub neutral_chroma_indication_flag: bool,
    pub field_seq_flag: bool,
    pub frame_field_info_present_flag: bool,
    pub default_display_window: Option<DisplayWindow>,
    pub timing_info: Option<TimingInfo>,
    pub hrd_parameters: Option<Hrd>,
    pub bitstream_restriction: Option<BitstreamRestriction>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AspectRatioInfo {
    pub aspect_ratio_idc: u8,
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
    pub matrix_coeffs: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChromaLocInfo {
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct DisplayWindow {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct TimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub num_ticks_poc_diff_one_minus1: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BitstreamRestriction {
    pub tiles_fixed_structure_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub restricted_ref_pic_lists_flag: bool,
    pub min_spatial_segmentation_idc: u32,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_min_cu_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct Hrd {
    pub nal_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters_present_flag: bool,
    pub sub_pic: Option<SubPicHrd>,
    pub bit_rate_scale: Option<u8>,
    pub cpb_size_scale: Option<u8>,
    pub cpb_size_du_scale: Option<u8>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub au_cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub sub_layers: Vec<SubLayerHrd>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubPicHrd {
    pub tick_divisor_minus2: u8,
    pub du_cpb_removal_delay_increment_length_minus1: u8,
    pub sub_pic_cpb_params_in_pic_timing_sei_flag: bool,
    pub dpb_output_delay_du_length_minus1: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubLayerHrd {
    pub fixed_pic_rate_general_flag: bool,
    pub fixed_pic_rate_within_cvs_flag: bool,
    pub elemental_duration_in_tc_minus1: Option<u32>,
    pub low_delay_hrd_flag: bool,
    pub cpb_cnt_minus1: u32,
    pub nal_cpbs: Vec<CpbEntry>,
    pub vcl_cpbs: Vec<CpbEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CpbEntry {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cpb_size_du_value_minus1: Option<u32>,
    pub bit_rate_du_value_minus1: Option<u32>,
    pub cbr_flag: bool,
}

pub fn parse_vui(
    c: &mut BitCursor,
    sps_max_sub_layers_minus1: u8,
) -> Result<Vui, Error> {
    let aspect_ratio = if c.read_bool()? {
        let aspect_ratio_idc = c.read_u8()?;
        let sar = if aspect_ratio_idc == 255 {
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
                matrix_coeffs: c.read_u8()?,
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

    let neutral_chroma_indication_flag = c.read_bool()?;
    let field_seq_flag = c.read_bool()?;
    let frame_field_info_present_flag = c.read_bool()?;

    let default_display_window = if c.read_bool()? {
        Some(DisplayWindow {
            left_offset: c.read_ue()?,
            right_offset: c.read_ue()?,
            top_offset: c.read_ue()?,
            bottom_offset: c.read_ue()?,
        })
    } else {
        None
    };

    let mut timing_info = None;
    let mut hrd_parameters = None;
    if c.read_bool()? {
        let num_units_in_tick = c.read_u32()?;
        let time_scale = c.read_u32()?;
        let num_ticks_poc_diff_one_minus1 = if c.read_bool()? {
            Some(c.read_ue()?)
        } else {
            None
        };
        timing_info = Some(TimingInfo {
            num_units_in_tick,
            time_scale,
            num_ticks_poc_diff_one_minus1,
        });
        if c.read_bool()? {
            hrd_parameters = Some(parse_hrd(c, true, sps_max_sub_layers_minus1)?);
        }
    }

    let bitstream_restriction = if c.read_bool()? {
        Some(BitstreamRestriction {
            tiles_fixed_structure_flag: c.read_bool()?,
            motion_vectors_over_pic_boundaries_flag: c.read_bool()?,
            restricted_ref_pic_lists_flag: c.read_bool()?,
            min_spatial_segmentation_idc: c.read_ue()?,
            max_bytes_per_pic_denom: c.read_ue()?,
            max_bits_per_min_cu_denom: c.read_ue()?,
            log2_max_mv_length_horizontal: c.read_ue()?,
            log2_max_mv_length_vertical: c.read_ue()?,
        })
    } else {
        None
    };

    Ok(Vui {
        aspect_ratio,
        overscan_appropriate_flag,
        video_signal_type,
        chroma_loc_info,
        neutral_chroma_indication_flag,
        field_seq_flag,
        frame_field_info_present_flag,
        default_display_window,
        timing_info,
        hrd_parameters,
        bitstream_restriction,
    })
}

pub fn parse_hrd(
    c: &mut BitCursor,
    common_inf_present: bool,
    max_num_sub_layers_minus1: u8,
) -> Result<Hrd, Error> {
    let mut nal_present = false;
    let mut vcl_present = false;
    let mut sub_pic = None;
    let mut bit_rate_scale = None;
    let mut cpb_size_scale = None;
    let mut cpb_size_du_scale = None;
    let mut initial_len = 23u8;
    let mut au_len = 23u8;
    let mut dpb_len = 23u8;

    if common_inf_present {
        nal_present = c.read_bool()?;
        vcl_present = c.read_bool()?;
        if nal_present || vcl_present {
            let sub_pic_present = c.read_bool()?;
            if sub_pic_present {
                sub_pic = Some(SubPicHrd {
                    tick_divisor_minus2: c.read_u8()?,
                    du_cpb_removal_delay_increment_length_minus1: c.read_u(5)? as u8,
                    sub_pic_cpb_params_in_pic_timing_sei_flag: c.read_bool()?,
                    dpb_output_delay_du_length_minus1: c.read_u(5)? as u8,
                });
            }
            bit_rate_scale = Some(c.read_u(4)? as u8);
            cpb_size_scale = Some(c.read_u(4)? as u8);
            if sub_pic.is_some() {
                cpb_size_du_scale = Some(c.read_u(4)? as u8);
            }
            initial_len = c.read_u(5)? as u8;
            au_len = c.read_u(5)? as u8;
            dpb_len = c.read_u(5)? as u8;
        }
    }

    let mut sub_layers = Vec::with_capacity(max_num_sub_layers_minus1 as usize + 1);
    for _ in 0..=max_num_sub_layers_minus1 {
        let fixed_pic_rate_general_flag = c.read_bool()?;
        let fixed_pic_rate_within_cvs_flag = if !fixed_pic_rate_general_flag {
            c.read_bool()?
        } else {
            true
        };
        let elemental_duration_in_tc_minus1 = if fixed_pic_rate_within_cvs_flag {
            Some(c.read_ue()?)
        } else {
            None
        };
        let low_delay_hrd_flag = if !fixed_pic_rate_within_cvs_flag {
            c.read_bool()?
        } else {
            false
        };
        let cpb_cnt_minus1 = if !low_delay_hrd_flag { c.read_ue()? } else { 0 };

        let mut nal_cpbs = Vec::new();
        let mut vcl_cpbs = Vec::new();
        if nal_present {
            for _ in 0..=cpb_cnt_minus1 {
                nal_cpbs.push(read_cpb(c, sub_pic.is_some())?);
            }
        }
        if vcl_present {
            for _ in 0..=cpb_cnt_minus1 {
                vcl_cpbs.push(read_cpb(c, sub_pic.is_some())?);
            }
        }
        sub_layers.push(SubLayerHrd {
            fixed_pic_rate_general_flag,
            fixed_pic_rate_within_cvs_flag,
            elemental_duration_in_tc_minus1,
            low_delay_hrd_flag,
            cpb_cnt_minus1,
            nal_cpbs,
            vcl_cpbs,
        });
    }

    Ok(Hrd {
        nal_hrd_parameters_present_flag: nal_present,
        vcl_hrd_parameters_present_flag: vcl_present,
        sub_pic,
        bit_rate_scale,
        cpb_size_scale,
        cpb_size_du_scale,
        initial_cpb_removal_delay_length_minus1: initial_len,
        au_cpb_removal_delay_length_minus1: au_len,
        dpb_output_delay_length_minus1: dpb_len,
        sub_layers,
    })
}

fn read_cpb(c: &mut BitCursor, sub_pic: bool) -> Result<CpbEntry, Error> {
    let bit_rate_value_minus1 = c.read_ue()?;
    let cpb_size_value_minus1 = c.read_ue()?;
    let (cpb_size_du_value_minus1, bit_rate_du_value_minus1) = if sub_pic {
        (Some(c.read_ue()?), Some(c.read_ue()?))
    } else {
        (None, None)
    };
    Ok(CpbEntry {
        bit_rate_value_minus1,
        cpb_size_value_minus1,
        cpb_size_du_value_minus1,
        bit_rate_du_value_minus1,
        cbr_flag: c.read_bool()?,
    })
}
