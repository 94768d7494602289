// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Picture parameter set, ISO/IEC 14496-10 section 7.3.2.2.

use crate::bits::BitCursor;
use crate::h264::sps::{read_scaling_list, Sps};
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Pps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub num_slice_groups_minus1: u32,
    /// Present only when `num_slice_groups_minus1 > 0` (FMO).
    pub slice_groups: Option<SliceGroupMap>,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    /// High-profile trailer, present only when `more_rbsp_data()` held.
    pub tail: Option<PpsTail>,
}

/// `slice_group_map_type` sub-syntax. Types 3..5 share one shape.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "map_type")]
pub enum SliceGroupMap {
    Interleaved {
        run_length_minus1: Vec<u32>,
    },
    Dispersed,
    Foreground {
        top_left: Vec<u32>,
        bottom_right: Vec<u32>,
    },
    Changing {
        slice_group_map_type: u32,
        slice_group_change_direction_flag: bool,
        slice_group_change_rate_minus1: u32,
    },
    Explicit {
        pic_size_in_map_units_minus1: u32,
        slice_group_id: Vec<u32>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct PpsTail {
    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix_present_flag: bool,
    pub scaling_matrix_4x4: Vec<Option<Vec<u8>>>,
    pub scaling_matrix_8x8: Vec<Option<Vec<u8>>>,
    pub second_chroma_qp_index_offset: i32,
}

/// Number of bits needed to distinguish `n` values.
pub(crate) fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        32 - (n - 1).leading_zeros()
    }
}

impl Pps {
    /// Parses a PPS RBSP. The active SPS (when already seen) supplies
    /// `chroma_format_idc` for the scaling-matrix count in the trailer.
    pub fn parse(rbsp: &[u8], sps: Option<&Sps>) -> Result<Pps, Error> {
        let mut c = BitCursor::new(rbsp);
        let c = &mut c;

        let pic_parameter_set_id = c.read_ue()?;
        let seq_parameter_set_id = c.read_ue()?;
        let entropy_coding_mode_flag = c.read_bool()?;
        let bottom_field_pic_order_in_frame_present_flag = c.read_bool()?;
        let num_slice_groups_minus1 = c.read_ue()?;

        let slice_groups = if num_slice_groups_minus1 > 0 {
            let n = num_slice_groups_minus1 as usize + 1;
            let map_type = c.read_ue()?;
            Some(match map_type {
                0 => {
                    let mut run_length_minus1 = Vec::with_capacity(n);
                    for _ in 0..n {
                        run_length_minus1.push(c.read_ue()?);
                    }
                    SliceGroupMap::Interleaved { run_length_minus1 }
                }
                1 => SliceGroupMap::Dispersed,
                2 => {
                    let mut top_left = Vec::with_capacity(n);
                    let mut bottom_right = Vec::with_capacity(n);
                    for _ in 0..n {
                        top_left.push(c.read_ue()?);
                        bottom_right.push(c.read_ue()?);
                    }
                    SliceGroupMap::Foreground {
                        top_left,
                        bottom_right,
                    }
                }
                3..=5 => SliceGroupMap::Changing {
                    slice_group_map_type: map_type,
                    slice_group_change_direction_flag: c.read_bool()?,
                    slice_group_change_rate_minus1: c.read_ue()?,
                },
                6 => {
                    let pic_size_in_map_units_minus1 = c.read_ue()?;
                    let id_bits = ceil_log2(num_slice_groups_minus1 + 1);
                    let count = pic_size_in_map_units_minus1 as usize + 1;
                    let mut slice_group_id = Vec::with_capacity(count);
                    for _ in 0..count {
                        slice_group_id.push(c.read_u(id_bits)? as u32);
                    }
                    SliceGroupMap::Explicit {
                        pic_size_in_map_units_minus1,
                        slice_group_id,
                    }
                }
                other => {
                    base::bail_t!(Malformed, "slice_group_map_type {} out of range", other);
                }
            })
        } else {
            None
        };

        let num_ref_idx_l0_default_active_minus1 = c.read_ue()?;
        let num_ref_idx_l1_default_active_minus1 = c.read_ue()?;
        let weighted_pred_flag = c.read_bool()?;
        let weighted_bipred_idc = c.read_u(2)? as u8;
        let pic_init_qp_minus26 = c.read_se()?;
        let pic_init_qs_minus26 = c.read_se()?;
        let chroma_qp_index_offset = c.read_se()?;
        let deblocking_filter_control_present_flag = c.read_bool()?;
        let constrained_intra_pred_flag = c.read_bool()?;
        let redundant_pic_cnt_present_flag = c.read_bool()?;

        let tail = if c.more_rbsp_data() {
            let transform_8x8_mode_flag = c.read_bool()?;
            let pic_scaling_matrix_present_flag = c.read_bool()?;
            let mut scaling_matrix_4x4 = Vec::new();
            let mut scaling_matrix_8x8 = Vec::new();
            if pic_scaling_matrix_present_flag {
                let chroma_format_idc = sps.map(|s| s.chroma_format_idc()).unwrap_or(1);
                let per_mode = if chroma_format_idc == 3 { 6 } else { 2 };
                let num_8x8 = if transform_8x8_mode_flag { per_mode } else { 0 };
                for i in 0..(6 + num_8x8) {
                    if c.read_bool()? {
                        if i < 6 {
                            scaling_matrix_4x4.push(Some(read_scaling_list(c, 16)?));
                        } else {
                            scaling_matrix_8x8.push(Some(read_scaling_list(c, 64)?));
                        }
                    } else if i < 6 {
                        scaling_matrix_4x4.push(None);
                    } else {
                        scaling_matrix_8x8.push(None);
                    }
                }
            }
            Some(PpsTail {
                transform_8x8_mode_flag,
                pic_scaling_matrix_present_flag,
                scaling_matrix_4x4,
                scaling_matrix_8x8,
                second_chroma_qp_index_offset: c.read_se()?,
            })
        } else {
            None
        };

        Ok(Pps {
            pic_parameter_set_id,
            seq_parameter_set_id,
            entropy_coding_mode_flag,
            bottom_field_pic_order_in_frame_present_flag,
            num_slice_groups_minus1,
            slice_groups,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            weighted_pred_flag,
            weighted_bipred_idc,
            pic_init_qp_minus26,
            pic_init_qs_minus26,
            chroma_qp_index_offset,
            deblocking_filter_control_present_flag,
            constrained_intra_pred_flag,
            redundant_pic_cnt_present_flag,
            tail,
        })
    }
}
