// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Slice header decoding, ISO/IEC 14496-10 section 7.3.3.
//!
//! The slice *data* (macroblock layer) is deliberately left opaque: the
//! forensic pipeline only needs header state (frame_num, POC LSBs, slice
//! type), not residuals.

use crate::bits::BitCursor;
use crate::h264::pps::{ceil_log2, Pps, SliceGroupMap};
use crate::h264::sps::Sps;
use base::Error;
use serde::Serialize;

pub const NAL_SLICE_NON_IDR: u8 = 1;
pub const NAL_SLICE_IDR: u8 = 5;
pub const NAL_SLICE_AUX: u8 = 19;

/// `slice_type` mod 5: P=0, B=1, I=2, SP=3, SI=4.
pub const SLICE_P: u32 = 0;
pub const SLICE_B: u32 = 1;
pub const SLICE_I: u32 = 2;
pub const SLICE_SP: u32 = 3;
pub const SLICE_SI: u32 = 4;

#[derive(Clone, Debug, Serialize)]
pub struct SliceSegment {
    pub header: SliceHeader,
    /// Index, into the owning stream's parse-ordered `sps` / `pps` lists,
    /// of the parameter set that was active when this slice was parsed.
    /// Later re-sends of a set with the same id do not move these.
    pub active_sps_index: usize,
    pub active_pps_index: usize,
    /// Opaque slice data (CABAC/CAVLC residuals), byte-aligned remainder of
    /// the RBSP after the header.
    #[serde(serialize_with = "crate::record::b64::serialize")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: u32,
    pub pic_parameter_set_id: u32,
    pub colour_plane_id: Option<u8>,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: Option<bool>,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_lsb: Option<u32>,
    pub delta_pic_order_cnt_bottom: Option<i32>,
    pub delta_pic_order_cnt: Vec<i32>,
    pub redundant_pic_cnt: Option<u32>,
    pub direct_spatial_mv_pred_flag: Option<bool>,
    pub num_ref_idx_active_override_flag: Option<bool>,
    pub num_ref_idx_l0_active_minus1: Option<u32>,
    pub num_ref_idx_l1_active_minus1: Option<u32>,
    pub ref_pic_list_modification: Option<RefPicListModification>,
    pub pred_weight_table: Option<PredWeightTable>,
    pub dec_ref_pic_marking: Option<DecRefPicMarking>,
    pub cabac_init_idc: Option<u32>,
    pub slice_qp_delta: i32,
    pub sp_for_switch_flag: Option<bool>,
    pub slice_qs_delta: Option<i32>,
    pub deblocking: Option<DeblockingControl>,
    pub slice_group_change_cycle: Option<u32>,
}

impl SliceHeader {
    pub fn slice_type_mod5(&self) -> u32 {
        self.slice_type % 5
    }

    pub fn is_intra(&self) -> bool {
        matches!(self.slice_type_mod5(), SLICE_I | SLICE_SI)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RefPicListModification {
    pub modifications_l0: Option<Vec<Modification>>,
    pub modifications_l1: Option<Vec<Modification>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Modification {
    pub modification_of_pic_nums_idc: u32,
    pub abs_diff_pic_num_minus1: Option<u32>,
    pub long_term_pic_num: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    pub chroma_log2_weight_denom: Option<u32>,
    pub l0: Vec<WeightEntry>,
    pub l1: Option<Vec<WeightEntry>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WeightEntry {
    pub luma_weight: Option<(i32, i32)>,
    pub chroma_weight: Option<[(i32, i32); 2]>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DecRefPicMarking {
    Idr {
        no_output_of_prior_pics_flag: bool,
        long_term_reference_flag: bool,
    },
    NonIdr {
        adaptive_ref_pic_marking_mode_flag: bool,
        operations: Vec<MemoryManagementControl>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct MemoryManagementControl {
    pub memory_management_control_operation: u32,
    pub difference_of_pic_nums_minus1: Option<u32>,
    pub long_term_pic_num: Option<u32>,
    pub long_term_frame_idx: Option<u32>,
    pub max_long_term_frame_idx_plus1: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeblockingControl {
    pub disable_deblocking_filter_idc: u32,
    pub slice_alpha_c0_offset_div2: Option<i32>,
    pub slice_beta_offset_div2: Option<i32>,
}

/// Reads the first three header fields, enough to learn which PPS the slice
/// references. The caller resolves the parameter sets, then finishes with
/// [`parse_slice_header`].
pub fn peek_pps_id(rbsp: &[u8]) -> Result<u32, Error> {
    let mut c = BitCursor::new(rbsp);
    let _first_mb_in_slice = c.read_ue()?;
    let _slice_type = c.read_ue()?;
    c.read_ue()
}

pub fn parse_slice(
    rbsp: &[u8],
    nal_type: u8,
    nal_ref_idc: u8,
    sps: &Sps,
    pps: &Pps,
) -> Result<SliceSegment, Error> {
    let mut c = BitCursor::new(rbsp);
    let header = parse_slice_header(&mut c, nal_type, nal_ref_idc, sps, pps)?;
    // Everything after the header is entropy-coded slice data; keep the
    // byte-aligned remainder verbatim.
    c.align_to_byte();
    let data = rbsp[c.position() / 8..].to_vec();
    // The stream parser fills in the active parameter-set indices.
    Ok(SliceSegment {
        header,
        active_sps_index: 0,
        active_pps_index: 0,
        data,
    })
}

pub fn parse_slice_header(
    c: &mut BitCursor,
    nal_type: u8,
    nal_ref_idc: u8,
    sps: &Sps,
    pps: &Pps,
) -> Result<SliceHeader, Error> {
    let idr_pic_flag = nal_type == NAL_SLICE_IDR;

    let first_mb_in_slice = c.read_ue()?;
    let slice_type = c.read_ue()?;
    let st_mod = slice_type % 5;
    let pic_parameter_set_id = c.read_ue()?;

    let colour_plane_id = if sps.separate_colour_plane_flag() {
        Some(c.read_u(2)? as u8)
    } else {
        None
    };

    let frame_num = c.read_u(sps.frame_num_bits())? as u32;

    let mut field_pic_flag = false;
    let mut bottom_field_flag = None;
    if !sps.frame_mbs_only_flag {
        field_pic_flag = c.read_bool()?;
        if field_pic_flag {
            bottom_field_flag = Some(c.read_bool()?);
        }
    }

    let idr_pic_id = if idr_pic_flag { Some(c.read_ue()?) } else { None };

    let mut pic_order_cnt_lsb = None;
    let mut delta_pic_order_cnt_bottom = None;
    let mut delta_pic_order_cnt = Vec::new();
    match &sps.poc {
        crate::h264::sps::PocType::Type0 { .. } => {
            let bits = sps.poc_lsb_bits().unwrap();
            pic_order_cnt_lsb = Some(c.read_u(bits)? as u32);
            if pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag {
                delta_pic_order_cnt_bottom = Some(c.read_se()?);
            }
        }
        crate::h264::sps::PocType::Type1 {
            delta_pic_order_always_zero_flag,
            ..
        } => {
            if !delta_pic_order_always_zero_flag {
                delta_pic_order_cnt.push(c.read_se()?);
                if pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag {
                    delta_pic_order_cnt.push(c.read_se()?);
                }
            }
        }
        crate::h264::sps::PocType::Type2 => {}
    }

    let redundant_pic_cnt = if pps.redundant_pic_cnt_present_flag {
        Some(c.read_ue()?)
    } else {
        None
    };

    let direct_spatial_mv_pred_flag = if st_mod == SLICE_B {
        Some(c.read_bool()?)
    } else {
        None
    };

    let mut num_ref_idx_active_override_flag = None;
    let mut num_ref_idx_l0_active_minus1 = None;
    let mut num_ref_idx_l1_active_minus1 = None;
    if matches!(st_mod, SLICE_P | SLICE_B | SLICE_SP) {
        let over = c.read_bool()?;
        num_ref_idx_active_override_flag = Some(over);
        if over {
            num_ref_idx_l0_active_minus1 = Some(c.read_ue()?);
            if st_mod == SLICE_B {
                num_ref_idx_l1_active_minus1 = Some(c.read_ue()?);
            }
        } else {
            num_ref_idx_l0_active_minus1 = Some(pps.num_ref_idx_l0_default_active_minus1);
            num_ref_idx_l1_active_minus1 = Some(pps.num_ref_idx_l1_default_active_minus1);
        }
    }

    let ref_pic_list_modification = Some(parse_ref_pic_list_modification(c, slice_type)?);

    let weighted = (pps.weighted_pred_flag && matches!(st_mod, SLICE_P | SLICE_SP))
        || (pps.weighted_bipred_idc == 1 && st_mod == SLICE_B);
    let pred_weight_table = if weighted {
        Some(parse_pred_weight_table(
            c,
            st_mod,
            sps.chroma_array_type(),
            num_ref_idx_l0_active_minus1.unwrap_or(0),
            num_ref_idx_l1_active_minus1.unwrap_or(0),
        )?)
    } else {
        None
    };

    let dec_ref_pic_marking = if nal_ref_idc != 0 {
        Some(parse_dec_ref_pic_marking(c, idr_pic_flag)?)
    } else {
        None
    };

    let cabac_init_idc = if pps.entropy_coding_mode_flag && !matches!(st_mod, SLICE_I | SLICE_SI) {
        Some(c.read_ue()?)
    } else {
        None
    };

    let slice_qp_delta = c.read_se()?;

    let mut sp_for_switch_flag = None;
    let mut slice_qs_delta = None;
    if matches!(st_mod, SLICE_SP | SLICE_SI) {
        if st_mod == SLICE_SP {
            sp_for_switch_flag = Some(c.read_bool()?);
        }
        slice_qs_delta = Some(c.read_se()?);
    }

    let deblocking = if pps.deblocking_filter_control_present_flag {
        let disable_deblocking_filter_idc = c.read_ue()?;
        let (alpha, beta) = if disable_deblocking_filter_idc != 1 {
            (Some(c.read_se()?), Some(c.read_se()?))
        } else {
            (None, None)
        };
        Some(DeblockingControl {
            disable_deblocking_filter_idc,
            slice_alpha_c0_offset_div2: alpha,
            slice_beta_offset_div2: beta,
        })
    } else {
        None
    };

    let slice_group_change_cycle = match &pps.slice_groups {
        Some(SliceGroupMap::Changing {
            slice_group_change_rate_minus1,
            ..
        }) => {
            // Ceil(Log2(PicSizeInMapUnits / SliceGroupChangeRate + 1)) bits.
            let rate = slice_group_change_rate_minus1 + 1;
            let bits = ceil_log2(sps.pic_size_in_map_units() / rate + 1);
            Some(c.read_u(bits)? as u32)
        }
        _ => None,
    };

    Ok(SliceHeader {
        first_mb_in_slice,
        slice_type,
        pic_parameter_set_id,
        colour_plane_id,
        frame_num,
        field_pic_flag,
        bottom_field_flag,
        idr_pic_id,
        pic_order_cnt_lsb,
        delta_pic_order_cnt_bottom,
        delta_pic_order_cnt,
        redundant_pic_cnt,
        direct_spatial_mv_pred_flag,
        num_ref_idx_active_override_flag,
        num_ref_idx_l0_active_minus1,
        num_ref_idx_l1_active_minus1,
        ref_pic_list_modification,
        pred_weight_table,
        dec_ref_pic_marking,
        cabac_init_idc,
        slice_qp_delta,
        sp_for_switch_flag,
        slice_qs_delta,
        deblocking,
        slice_group_change_cycle,
    })
}

fn read_modifications(c: &mut BitCursor) -> Result<Vec<Modification>, Error> {
    let mut out = Vec::new();
    loop {
        let idc = c.read_ue()?;
        if idc == 3 {
            break;
        }
        // Guard against a malformed endless list.
        if out.len() > 256 {
            base::bail_t!(Malformed, "ref-pic-list modification list too long");
        }
        let mut m = Modification {
            modification_of_pic_nums_idc: idc,
            abs_diff_pic_num_minus1: None,
            long_term_pic_num: None,
        };
        match idc {
            0 | 1 => m.abs_diff_pic_num_minus1 = Some(c.read_ue()?),
            2 => m.long_term_pic_num = Some(c.read_ue()?),
            other => {
                base::bail_t!(Malformed, "modification_of_pic_nums_idc {}", other);
            }
        }
        out.push(m);
    }
    Ok(out)
}

pub fn parse_ref_pic_list_modification(
    c: &mut BitCursor,
    slice_type: u32,
) -> Result<RefPicListModification, Error> {
    let st_mod = slice_type % 5;
    let mut modifications_l0 = None;
    let mut modifications_l1 = None;
    if !matches!(st_mod, SLICE_I | SLICE_SI) {
        if c.read_bool()? {
            modifications_l0 = Some(read_modifications(c)?);
        }
    }
    if st_mod == SLICE_B {
        if c.read_bool()? {
            modifications_l1 = Some(read_modifications(c)?);
        }
    }
    Ok(RefPicListModification {
        modifications_l0,
        modifications_l1,
    })
}

fn read_weight_entries(
    c: &mut BitCursor,
    count: usize,
    chroma_array_type: u32,
) -> Result<Vec<WeightEntry>, Error> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let luma_weight = if c.read_bool()? {
            Some((c.read_se()?, c.read_se()?))
        } else {
            None
        };
        let chroma_weight = if chroma_array_type != 0 {
            if c.read_bool()? {
                Some([(c.read_se()?, c.read_se()?), (c.read_se()?, c.read_se()?)])
            } else {
                None
            }
        } else {
            None
        };
        out.push(WeightEntry {
            luma_weight,
            chroma_weight,
        });
    }
    Ok(out)
}

pub fn parse_pred_weight_table(
    c: &mut BitCursor,
    st_mod: u32,
    chroma_array_type: u32,
    num_ref_idx_l0_active_minus1: u32,
    num_ref_idx_l1_active_minus1: u32,
) -> Result<PredWeightTable, Error> {
    let luma_log2_weight_denom = c.read_ue()?;
    let chroma_log2_weight_denom = if chroma_array_type != 0 {
        Some(c.read_ue()?)
    } else {
        None
    };
    let l0 = read_weight_entries(c, num_ref_idx_l0_active_minus1 as usize + 1, chroma_array_type)?;
    let l1 = if st_mod == SLICE_B {
        Some(read_weight_entries(
            c,
            num_ref_idx_l1_active_minus1 as usize + 1,
            chroma_array_type,
        )?)
    } else {
        None
    };
    Ok(PredWeightTable {
        luma_log2_weight_denom,
        chroma_log2_weight_denom,
        l0,
        l1,
    })
}

pub fn parse_dec_ref_pic_marking(
    c: &mut BitCursor,
    idr_pic_flag: bool,
) -> Result<DecRefPicMarking, Error> {
    if idr_pic_flag {
        Ok(DecRefPicMarking::Idr {
            no_output_of_prior_pics_flag: c.read_bool()?,
            long_term_reference_flag: c.read_bool()?,
        })
    } else {
        let adaptive = c.read_bool()?;
        let mut operations = Vec::new();
        if adaptive {
            loop {
                let mmco = c.read_ue()?;
                if mmco == 0 {
                    break;
                }
                if operations.len() > 64 {
                    base::bail_t!(Malformed, "memory-management op list too long");
                }
                let mut op = MemoryManagementControl {
                    memory_management_control_operation: mmco,
                    difference_of_pic_nums_minus1: None,
                    long_term_pic_num: None,
                    long_term_frame_idx: None,
                    max_long_term_frame_idx_plus1: None,
                };
                if matches!(mmco, 1 | 3) {
                    op.difference_of_pic_nums_minus1 = Some(c.read_ue()?);
                }
                if mmco == 2 {
                    op.long_term_pic_num = Some(c.read_ue()?);
                }
                if matches!(mmco, 3 | 6) {
                    op.long_term_frame_idx = Some(c.read_ue()?);
                }
                if mmco == 4 {
                    op.max_long_term_frame_idx_plus1 = Some(c.read_ue()?);
                }
                operations.push(op);
            }
        }
        Ok(DecRefPicMarking::NonIdr {
            adaptive_ref_pic_marking_mode_flag: adaptive,
            operations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    fn test_sps() -> Sps {
        // 640x480 Baseline: frame_num 4 bits, POC type 0 with 4 LSB bits.
        let rbsp = {
            let mut w = BitWriter::new();
            w.put_bits(66, 8); // profile_idc
            w.put_bits(0xc0, 8); // constraint flags + reserved
            w.put_bits(30, 8); // level_idc
            w.put_ue(0); // seq_parameter_set_id
            w.put_ue(0); // log2_max_frame_num_minus4
            w.put_ue(0); // pic_order_cnt_type
            w.put_ue(0); // log2_max_pic_order_cnt_lsb_minus4
            w.put_ue(1); // max_num_ref_frames
            w.put_bit(false); // gaps_in_frame_num_value_allowed_flag
            w.put_ue(39); // pic_width_in_mbs_minus1
            w.put_ue(29); // pic_height_in_map_units_minus1
            w.put_bit(true); // frame_mbs_only_flag
            w.put_bit(true); // direct_8x8_inference_flag
            w.put_bit(false); // frame_cropping_flag
            w.put_bit(false); // vui_parameters_present_flag
            w.put_trailing_bits();
            w.finish()
        };
        Sps::parse(&rbsp).unwrap()
    }

    fn test_pps() -> Pps {
        // CAVLC, no deblocking-control, no weighted prediction.
        let rbsp = {
            let mut w = BitWriter::new();
            w.put_ue(0); // pic_parameter_set_id
            w.put_ue(0); // seq_parameter_set_id
            w.put_bit(false); // entropy_coding_mode_flag
            w.put_bit(false); // bottom_field_pic_order_in_frame_present_flag
            w.put_ue(0); // num_slice_groups_minus1
            w.put_ue(0); // num_ref_idx_l0_default_active_minus1
            w.put_ue(0); // num_ref_idx_l1_default_active_minus1
            w.put_bit(false); // weighted_pred_flag
            w.put_bits(0, 2); // weighted_bipred_idc
            w.put_se(0); // pic_init_qp_minus26
            w.put_se(0); // pic_init_qs_minus26
            w.put_se(0); // chroma_qp_index_offset
            w.put_bit(false); // deblocking_filter_control_present_flag
            w.put_bit(false); // constrained_intra_pred_flag
            w.put_bit(false); // redundant_pic_cnt_present_flag
            w.put_trailing_bits();
            w.finish()
        };
        Pps::parse(&rbsp, None).unwrap()
    }

    #[test]
    fn idr_slice_header() {
        let sps = test_sps();
        let pps = test_pps();
        let mut w = BitWriter::new();
        w.put_ue(0); // first_mb_in_slice
        w.put_ue(7); // slice_type (I, all slices of picture)
        w.put_ue(0); // pic_parameter_set_id
        w.put_bits(0, 4); // frame_num
        w.put_ue(0); // idr_pic_id
        w.put_bits(0, 4); // pic_order_cnt_lsb
        w.put_bit(false); // no_output_of_prior_pics_flag
        w.put_bit(false); // long_term_reference_flag
        w.put_se(0); // slice_qp_delta
        w.put_trailing_bits();
        let rbsp = w.finish();

        let seg = parse_slice(&rbsp, NAL_SLICE_IDR, 3, &sps, &pps).unwrap();
        let h = &seg.header;
        assert_eq!(h.first_mb_in_slice, 0);
        assert_eq!(h.slice_type, 7);
        assert_eq!(h.slice_type_mod5(), SLICE_I);
        assert!(h.is_intra());
        assert_eq!(h.frame_num, 0);
        assert_eq!(h.idr_pic_id, Some(0));
        assert_eq!(h.pic_order_cnt_lsb, Some(0));
        assert!(matches!(
            h.dec_ref_pic_marking,
            Some(DecRefPicMarking::Idr { .. })
        ));
        assert_eq!(h.slice_qp_delta, 0);
    }

    #[test]
    fn p_slice_header_with_nonzero_poc() {
        let sps = test_sps();
        let pps = test_pps();
        let mut w = BitWriter::new();
        w.put_ue(0); // first_mb_in_slice
        w.put_ue(5); // slice_type (P, all slices of picture)
        w.put_ue(0); // pic_parameter_set_id
        w.put_bits(3, 4); // frame_num
        w.put_bits(6, 4); // pic_order_cnt_lsb
        w.put_bit(false); // num_ref_idx_active_override_flag
        w.put_bit(false); // ref_pic_list_modification_flag_l0
        w.put_bit(false); // adaptive_ref_pic_marking_mode_flag
        w.put_se(-2); // slice_qp_delta
        w.put_trailing_bits();
        let rbsp = w.finish();

        let seg = parse_slice(&rbsp, NAL_SLICE_NON_IDR, 2, &sps, &pps).unwrap();
        let h = &seg.header;
        assert_eq!(h.slice_type_mod5(), SLICE_P);
        assert_eq!(h.frame_num, 3);
        assert_eq!(h.pic_order_cnt_lsb, Some(6));
        assert_eq!(h.idr_pic_id, None);
        // Defaults inherited from the PPS when not overridden.
        assert_eq!(h.num_ref_idx_l0_active_minus1, Some(0));
        assert!(matches!(
            h.dec_ref_pic_marking,
            Some(DecRefPicMarking::NonIdr {
                adaptive_ref_pic_marking_mode_flag: false,
                ..
            })
        ));
        assert_eq!(h.slice_qp_delta, -2);
    }

    #[test]
    fn non_reference_slice_skips_marking() {
        let sps = test_sps();
        let pps = test_pps();
        let mut w = BitWriter::new();
        w.put_ue(0);
        w.put_ue(5); // P
        w.put_ue(0);
        w.put_bits(4, 4); // frame_num
        w.put_bits(9, 4); // pic_order_cnt_lsb
        w.put_bit(false); // num_ref_idx_active_override_flag
        w.put_bit(false); // ref_pic_list_modification_flag_l0
        w.put_se(0); // slice_qp_delta
        w.put_trailing_bits();
        let rbsp = w.finish();

        let seg = parse_slice(&rbsp, NAL_SLICE_NON_IDR, 0, &sps, &pps).unwrap();
        assert!(seg.header.dec_ref_pic_marking.is_none());
        assert_eq!(seg.header.pic_order_cnt_lsb, Some(9));
    }

    #[test]
    fn peeking_the_pps_id() {
        let mut w = BitWriter::new();
        w.put_ue(0);
        w.put_ue(7);
        w.put_ue(3); // pic_parameter_set_id
        w.put_trailing_bits();
        let rbsp = w.finish();
        assert_eq!(peek_pps_id(&rbsp).unwrap(), 3);
    }
}
