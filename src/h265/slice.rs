// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Slice segment header, ITU-T H.265 section 7.3.6.

use crate::bits::BitCursor;
use crate::h265::pps::Pps;
use crate::h265::rps::{parse_short_term_ref_pic_set, ShortTermRefPicSet};
use crate::h265::sps::Sps;
use base::Error;
use serde::Serialize;

pub const NAL_BLA_W_LP: u8 = 16;
pub const NAL_IDR_W_RADL: u8 = 19;
pub const NAL_IDR_N_LP: u8 = 20;
pub const NAL_RSV_IRAP_VCL23: u8 = 23;

pub const SLICE_B: u32 = 0;
pub const SLICE_P: u32 = 1;
pub const SLICE_I: u32 = 2;

#[derive(Clone, Debug, Serialize)]
pub struct SliceSegment {
    pub header: SliceSegmentHeader,
    /// Index, into the owning stream's parse-ordered `sps` / `pps` lists,
    /// of the parameter set that was active when this segment was parsed.
    /// Later re-sends of a set with the same id do not move these.
    pub active_sps_index: usize,
    pub active_pps_index: usize,
    /// Opaque CABAC slice data following the header.
    #[serde(serialize_with = "crate::record::b64::serialize")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SliceSegmentHeader {
    pub nal_unit_type: u8,
    pub first_slice_segment_in_pic_flag: bool,
    /// IRAP pictures (types 16..=23) only.
    pub no_output_of_prior_pics_flag: Option<bool>,
    pub slice_pic_parameter_set_id: u32,
    pub dependent_slice_segment_flag: bool,
    pub slice_segment_address: u32,
    pub slice_reserved_flag: Vec<bool>,
    /// Absent for dependent slice segments (inherited from the preceding
    /// independent segment).
    pub slice_type: Option<u32>,
    pub pic_output_flag: Option<bool>,
    pub colour_plane_id: Option<u8>,
    pub slice_pic_order_cnt_lsb: Option<u32>,
    pub short_term_ref_pic_set_sps_flag: Option<bool>,
    pub short_term_ref_pic_set: Option<ShortTermRefPicSet>,
    pub short_term_ref_pic_set_idx: Option<u32>,
    pub long_term: Option<LongTermPics>,
    pub slice_temporal_mvp_enabled_flag: Option<bool>,
    pub slice_sao_luma_flag: Option<bool>,
    pub slice_sao_chroma_flag: Option<bool>,
    pub num_ref_idx_active_override_flag: Option<bool>,
    pub num_ref_idx_l0_active_minus1: Option<u32>,
    pub num_ref_idx_l1_active_minus1: Option<u32>,
    pub ref_pic_lists_modification: Option<RefPicListsModification>,
    pub mvd_l1_zero_flag: Option<bool>,
    pub cabac_init_flag: Option<bool>,
    pub collocated_from_l0_flag: Option<bool>,
    pub collocated_ref_idx: Option<u32>,
    pub pred_weight_table: Option<PredWeightTable>,
    pub five_minus_max_num_merge_cand: Option<u32>,
    pub use_integer_mv_flag: Option<bool>,
    pub slice_qp_delta: Option<i32>,
    pub slice_cb_qp_offset: Option<i32>,
    pub slice_cr_qp_offset: Option<i32>,
    pub slice_act_qp_offsets: Option<[i32; 3]>,
    pub cu_chroma_qp_offset_enabled_flag: Option<bool>,
    pub deblocking_filter_override_flag: Option<bool>,
    pub slice_deblocking_filter_disabled_flag: Option<bool>,
    pub slice_beta_offset_div2: Option<i32>,
    pub slice_tc_offset_div2: Option<i32>,
    pub slice_loop_filter_across_slices_enabled_flag: Option<bool>,
    pub entry_points: Option<EntryPoints>,
    #[serde(serialize_with = "crate::record::b64::serialize_opt")]
    pub extension_data: Option<Vec<u8>>,
}

impl SliceSegmentHeader {
    pub fn is_irap(&self) -> bool {
        (NAL_BLA_W_LP..=NAL_RSV_IRAP_VCL23).contains(&self.nal_unit_type)
    }

    /// `slice_pic_order_cnt_lsb` with IDR slices (which carry none)
    /// counting as zero.
    pub fn poc_lsb_or_zero(&self) -> u32 {
        self.slice_pic_order_cnt_lsb.unwrap_or(0)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LongTermPics {
    pub num_long_term_sps: u32,
    pub num_long_term_pics: u32,
    pub entries: Vec<LongTermEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LongTermEntry {
    pub lt_idx_sps: Option<u32>,
    pub poc_lsb_lt: Option<u32>,
    pub used_by_curr_pic_lt_flag: bool,
    pub delta_poc_msb_cycle_lt: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefPicListsModification {
    pub ref_pic_list_modification_flag_l0: bool,
    pub list_entry_l0: Vec<u32>,
    pub ref_pic_list_modification_flag_l1: Option<bool>,
    pub list_entry_l1: Vec<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    pub delta_chroma_log2_weight_denom: Option<i32>,
    pub l0: Vec<WeightEntry>,
    pub l1: Option<Vec<WeightEntry>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WeightEntry {
    pub luma: Option<(i32, i32)>,
    pub chroma: Option<[(i32, i32); 2]>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EntryPoints {
    pub num_entry_point_offsets: u32,
    pub offset_len_minus1: Option<u32>,
    pub entry_point_offset_minus1: Vec<u32>,
}

fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        32 - (n - 1).leading_zeros()
    }
}

pub fn parse_slice_segment(
    rbsp: &[u8],
    nal_unit_type: u8,
    sps: &Sps,
    pps: &Pps,
) -> Result<SliceSegment, Error> {
    let mut c = BitCursor::new(rbsp);
    let header = parse_slice_segment_header(&mut c, nal_unit_type, sps, pps)?;
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

pub fn parse_slice_segment_header(
    c: &mut BitCursor,
    nal_unit_type: u8,
    sps: &Sps,
    pps: &Pps,
) -> Result<SliceSegmentHeader, Error> {
    let first_slice_segment_in_pic_flag = c.read_bool()?;
    let no_output_of_prior_pics_flag =
        if (NAL_BLA_W_LP..=NAL_RSV_IRAP_VCL23).contains(&nal_unit_type) {
            Some(c.read_bool()?)
        } else {
            None
        };
    let slice_pic_parameter_set_id = c.read_ue()?;

    let mut dependent_slice_segment_flag = false;
    let mut slice_segment_address = 0u32;
    if !first_slice_segment_in_pic_flag {
        if pps.dependent_slice_segments_enabled_flag {
            dependent_slice_segment_flag = c.read_bool()?;
        }
        let pic_size = sps.pic_size_in_ctbs_y();
        if pic_size > 0 {
            let bits = std::cmp::max(1, ceil_log2(pic_size));
            slice_segment_address = c.read_u(bits)? as u32;
        }
    }

    let mut h = SliceSegmentHeader {
        nal_unit_type,
        first_slice_segment_in_pic_flag,
        no_output_of_prior_pics_flag,
        slice_pic_parameter_set_id,
        dependent_slice_segment_flag,
        slice_segment_address,
        slice_reserved_flag: Vec::new(),
        slice_type: None,
        pic_output_flag: None,
        colour_plane_id: None,
        slice_pic_order_cnt_lsb: None,
        short_term_ref_pic_set_sps_flag: None,
        short_term_ref_pic_set: None,
        short_term_ref_pic_set_idx: None,
        long_term: None,
        slice_temporal_mvp_enabled_flag: None,
        slice_sao_luma_flag: None,
        slice_sao_chroma_flag: None,
        num_ref_idx_active_override_flag: None,
        num_ref_idx_l0_active_minus1: None,
        num_ref_idx_l1_active_minus1: None,
        ref_pic_lists_modification: None,
        mvd_l1_zero_flag: None,
        cabac_init_flag: None,
        collocated_from_l0_flag: None,
        collocated_ref_idx: None,
        pred_weight_table: None,
        five_minus_max_num_merge_cand: None,
        use_integer_mv_flag: None,
        slice_qp_delta: None,
        slice_cb_qp_offset: None,
        slice_cr_qp_offset: None,
        slice_act_qp_offsets: None,
        cu_chroma_qp_offset_enabled_flag: None,
        deblocking_filter_override_flag: None,
        slice_deblocking_filter_disabled_flag: None,
        slice_beta_offset_div2: None,
        slice_tc_offset_div2: None,
        slice_loop_filter_across_slices_enabled_flag: None,
        entry_points: None,
        extension_data: None,
    };

    if !dependent_slice_segment_flag {
        for _ in 0..pps.num_extra_slice_header_bits {
            h.slice_reserved_flag.push(c.read_bool()?);
        }
        let slice_type = c.read_ue()?;
        if slice_type > SLICE_I {
            base::bail_t!(Malformed, "slice_type {} out of range", slice_type);
        }
        h.slice_type = Some(slice_type);

        if pps.output_flag_present_flag {
            h.pic_output_flag = Some(c.read_bool()?);
        }
        if sps.separate_colour_plane_flag {
            h.colour_plane_id = Some(c.read_u(2)? as u8);
        }

        if nal_unit_type != NAL_IDR_W_RADL && nal_unit_type != NAL_IDR_N_LP {
            h.slice_pic_order_cnt_lsb = Some(c.read_u(sps.poc_lsb_bits())? as u32);
            let sps_rps = c.read_bool()?;
            h.short_term_ref_pic_set_sps_flag = Some(sps_rps);
            let num_sets = sps.num_short_term_ref_pic_sets;
            if !sps_rps {
                h.short_term_ref_pic_set = Some(parse_short_term_ref_pic_set(
                    c,
                    num_sets,
                    num_sets,
                    &sps.short_term_ref_pic_sets,
                )?);
            } else if num_sets > 1 {
                let bits = ceil_log2(num_sets);
                h.short_term_ref_pic_set_idx = Some(c.read_u(bits)? as u32);
            }

            if let Some(lt) = &sps.long_term_ref_pics {
                let num_lt_sps = lt.lt_ref_pic_poc_lsb_sps.len() as u32;
                let num_long_term_sps = if num_lt_sps > 0 { c.read_ue()? } else { 0 };
                let num_long_term_pics = c.read_ue()?;
                let total = num_long_term_sps as u64 + num_long_term_pics as u64;
                if total > 64 {
                    base::bail_t!(Malformed, "long-term picture count {}", total);
                }
                let mut entries = Vec::with_capacity(total as usize);
                for i in 0..total {
                    let lt_idx_sps = if i < num_long_term_sps as u64 {
                        let bits = ceil_log2(num_lt_sps);
                        if bits > 0 {
                            Some(c.read_u(bits)? as u32)
                        } else {
                            Some(0)
                        }
                    } else {
                        None
                    };
                    let poc_lsb_lt = if lt_idx_sps.is_none() {
                        Some(c.read_u(sps.poc_lsb_bits())? as u32)
                    } else {
                        None
                    };
                    let used_by_curr_pic_lt_flag = if lt_idx_sps.is_none() {
                        c.read_bool()?
                    } else {
                        lt.used_by_curr_pic_lt_sps_flag
                            .get(lt_idx_sps.unwrap_or(0) as usize)
                            .copied()
                            .unwrap_or(false)
                    };
                    let delta_poc_msb_cycle_lt = if c.read_bool()? {
                        Some(c.read_ue()?)
                    } else {
                        None
                    };
                    entries.push(LongTermEntry {
                        lt_idx_sps,
                        poc_lsb_lt,
                        used_by_curr_pic_lt_flag,
                        delta_poc_msb_cycle_lt,
                    });
                }
                h.long_term = Some(LongTermPics {
                    num_long_term_sps,
                    num_long_term_pics,
                    entries,
                });
            }

            if sps.sps_temporal_mvp_enabled_flag {
                h.slice_temporal_mvp_enabled_flag = Some(c.read_bool()?);
            }
        }

        if sps.sample_adaptive_offset_enabled_flag {
            h.slice_sao_luma_flag = Some(c.read_bool()?);
            if sps.chroma_array_type() != 0 {
                h.slice_sao_chroma_flag = Some(c.read_bool()?);
            }
        }

        if matches!(slice_type, SLICE_P | SLICE_B) {
            let over = c.read_bool()?;
            h.num_ref_idx_active_override_flag = Some(over);
            if over {
                h.num_ref_idx_l0_active_minus1 = Some(c.read_ue()?);
                if slice_type == SLICE_B {
                    h.num_ref_idx_l1_active_minus1 = Some(c.read_ue()?);
                }
            } else {
                h.num_ref_idx_l0_active_minus1 = Some(pps.num_ref_idx_l0_default_active_minus1);
                if slice_type == SLICE_B {
                    h.num_ref_idx_l1_active_minus1 =
                        Some(pps.num_ref_idx_l1_default_active_minus1);
                }
            }

            let num_poc_total_curr = num_poc_total_curr(&h, sps);
            if pps.lists_modification_present_flag && num_poc_total_curr > 1 {
                h.ref_pic_lists_modification = Some(parse_ref_pic_lists_modification(
                    c,
                    slice_type,
                    h.num_ref_idx_l0_active_minus1.unwrap_or(0),
                    h.num_ref_idx_l1_active_minus1.unwrap_or(0),
                    num_poc_total_curr,
                )?);
            }

            if slice_type == SLICE_B {
                h.mvd_l1_zero_flag = Some(c.read_bool()?);
            }
            if pps.cabac_init_present_flag {
                h.cabac_init_flag = Some(c.read_bool()?);
            }
            if h.slice_temporal_mvp_enabled_flag == Some(true) {
                if slice_type == SLICE_B {
                    h.collocated_from_l0_flag = Some(c.read_bool()?);
                }
                let from_l0 = h.collocated_from_l0_flag.unwrap_or(true);
                let active = if from_l0 {
                    h.num_ref_idx_l0_active_minus1
                } else {
                    h.num_ref_idx_l1_active_minus1
                };
                if active.unwrap_or(0) > 0 {
                    h.collocated_ref_idx = Some(c.read_ue()?);
                }
            }

            if (pps.weighted_pred_flag && slice_type == SLICE_P)
                || (pps.weighted_bipred_flag && slice_type == SLICE_B)
            {
                h.pred_weight_table = Some(parse_pred_weight_table(
                    c,
                    slice_type,
                    sps.chroma_array_type(),
                    h.num_ref_idx_l0_active_minus1.unwrap_or(0),
                    h.num_ref_idx_l1_active_minus1.unwrap_or(0),
                )?);
            }

            h.five_minus_max_num_merge_cand = Some(c.read_ue()?);

            let mv_res_control = sps
                .extensions
                .as_ref()
                .and_then(|e| e.scc.as_ref())
                .map(|s| s.motion_vector_resolution_control_idc)
                .unwrap_or(0);
            if mv_res_control == 2 {
                h.use_integer_mv_flag = Some(c.read_bool()?);
            }
        }

        h.slice_qp_delta = Some(c.read_se()?);
        if pps.pps_slice_chroma_qp_offsets_present_flag {
            h.slice_cb_qp_offset = Some(c.read_se()?);
            h.slice_cr_qp_offset = Some(c.read_se()?);
        }
        if pps.act_qp_offsets_present() {
            h.slice_act_qp_offsets = Some([c.read_se()?, c.read_se()?, c.read_se()?]);
        }
        if pps.chroma_qp_offset_list_enabled() {
            h.cu_chroma_qp_offset_enabled_flag = Some(c.read_bool()?);
        }

        let override_enabled = pps
            .deblocking
            .as_ref()
            .map(|d| d.deblocking_filter_override_enabled_flag)
            .unwrap_or(false);
        if override_enabled {
            h.deblocking_filter_override_flag = Some(c.read_bool()?);
        }
        if h.deblocking_filter_override_flag == Some(true) {
            let disabled = c.read_bool()?;
            h.slice_deblocking_filter_disabled_flag = Some(disabled);
            if !disabled {
                h.slice_beta_offset_div2 = Some(c.read_se()?);
                h.slice_tc_offset_div2 = Some(c.read_se()?);
            }
        }

        if pps.pps_loop_filter_across_slices_enabled_flag
            && (h.slice_sao_luma_flag == Some(true)
                || h.slice_sao_chroma_flag == Some(true)
                || h.slice_deblocking_filter_disabled_flag != Some(true))
        {
            h.slice_loop_filter_across_slices_enabled_flag = Some(c.read_bool()?);
        }
    }

    if pps.tiles_enabled() || pps.entropy_coding_sync_enabled_flag {
        let num_entry_point_offsets = c.read_ue()?;
        if num_entry_point_offsets > (1 << 16) {
            base::bail_t!(Malformed, "num_entry_point_offsets {}", num_entry_point_offsets);
        }
        let mut offset_len_minus1 = None;
        let mut entry_point_offset_minus1 = Vec::new();
        if num_entry_point_offsets > 0 {
            let len = c.read_ue()?;
            if len > 31 {
                base::bail_t!(Malformed, "offset_len_minus1 {}", len);
            }
            offset_len_minus1 = Some(len);
            for _ in 0..num_entry_point_offsets {
                entry_point_offset_minus1.push(c.read_u(len + 1)? as u32);
            }
        }
        h.entry_points = Some(EntryPoints {
            num_entry_point_offsets,
            offset_len_minus1,
            entry_point_offset_minus1,
        });
    }

    if pps.slice_segment_header_extension_present_flag {
        let len = c.read_ue()?;
        if len > 256 {
            base::bail_t!(Malformed, "slice_segment_header_extension_length {}", len);
        }
        let mut data = Vec::with_capacity(len as usize);
        for _ in 0..len {
            data.push(c.read_u8()?);
        }
        h.extension_data = Some(data);
    }

    // byte_alignment(): one stop bit then zeros.
    c.byte_alignment()?;

    Ok(h)
}

/// NumPocTotalCurr, section 7.4.7.2: pictures in the active RPS marked as
/// used by the current picture.
fn num_poc_total_curr(h: &SliceSegmentHeader, sps: &Sps) -> u32 {
    let st = match (&h.short_term_ref_pic_set, h.short_term_ref_pic_set_idx) {
        (Some(set), _) => count_used(set),
        (None, Some(idx)) => sps
            .short_term_ref_pic_sets
            .get(idx as usize)
            .map(count_used)
            .unwrap_or(0),
        (None, None) => sps.short_term_ref_pic_sets.first().map(count_used).unwrap_or(0),
    };
    let lt = h
        .long_term
        .as_ref()
        .map(|l| l.entries.iter().filter(|e| e.used_by_curr_pic_lt_flag).count() as u32)
        .unwrap_or(0);
    st + lt
}

fn count_used(set: &ShortTermRefPicSet) -> u32 {
    match set {
        ShortTermRefPicSet::Explicit { negative, positive } => negative
            .iter()
            .chain(positive.iter())
            .filter(|d| d.used_by_curr_pic)
            .count() as u32,
        ShortTermRefPicSet::Predicted {
            used_by_curr_pic_flag,
            ..
        } => used_by_curr_pic_flag.iter().filter(|f| **f).count() as u32,
    }
}

fn parse_ref_pic_lists_modification(
    c: &mut BitCursor,
    slice_type: u32,
    num_ref_idx_l0_active_minus1: u32,
    num_ref_idx_l1_active_minus1: u32,
    num_poc_total_curr: u32,
) -> Result<RefPicListsModification, Error> {
    let entry_bits = ceil_log2(num_poc_total_curr);
    let flag_l0 = c.read_bool()?;
    let mut list_entry_l0 = Vec::new();
    if flag_l0 {
        for _ in 0..=num_ref_idx_l0_active_minus1 {
            list_entry_l0.push(c.read_u(entry_bits)? as u32);
        }
    }
    let mut flag_l1 = None;
    let mut list_entry_l1 = Vec::new();
    if slice_type == SLICE_B {
        let f = c.read_bool()?;
        flag_l1 = Some(f);
        if f {
            for _ in 0..=num_ref_idx_l1_active_minus1 {
                list_entry_l1.push(c.read_u(entry_bits)? as u32);
            }
        }
    }
    Ok(RefPicListsModification {
        ref_pic_list_modification_flag_l0: flag_l0,
        list_entry_l0,
        ref_pic_list_modification_flag_l1: flag_l1,
        list_entry_l1,
    })
}

fn parse_pred_weight_table(
    c: &mut BitCursor,
    slice_type: u32,
    chroma_array_type: u32,
    num_ref_idx_l0_active_minus1: u32,
    num_ref_idx_l1_active_minus1: u32,
) -> Result<PredWeightTable, Error> {
    let luma_log2_weight_denom = c.read_ue()?;
    let delta_chroma_log2_weight_denom = if chroma_array_type != 0 {
        Some(c.read_se()?)
    } else {
        None
    };
    let l0 = read_weight_list(c, num_ref_idx_l0_active_minus1, chroma_array_type)?;
    let l1 = if slice_type == SLICE_B {
        Some(read_weight_list(c, num_ref_idx_l1_active_minus1, chroma_array_type)?)
    } else {
        None
    };
    Ok(PredWeightTable {
        luma_log2_weight_denom,
        delta_chroma_log2_weight_denom,
        l0,
        l1,
    })
}

fn read_weight_list(
    c: &mut BitCursor,
    num_ref_idx_active_minus1: u32,
    chroma_array_type: u32,
) -> Result<Vec<WeightEntry>, Error> {
    let n = num_ref_idx_active_minus1 as usize + 1;
    if n > 16 {
        base::bail_t!(Malformed, "pred-weight list of {} entries", n);
    }
    let mut luma_flags = Vec::with_capacity(n);
    for _ in 0..n {
        luma_flags.push(c.read_bool()?);
    }
    let mut chroma_flags = vec![false; n];
    if chroma_array_type != 0 {
        for f in chroma_flags.iter_mut() {
            *f = c.read_bool()?;
        }
    }
    let mut entries = Vec::with_capacity(n);
    for i in 0..n {
        let luma = if luma_flags[i] {
            Some((c.read_se()?, c.read_se()?))
        } else {
            None
        };
        let chroma = if chroma_flags[i] {
            Some([(c.read_se()?, c.read_se()?), (c.read_se()?, c.read_se()?)])
        } else {
            None
        };
        entries.push(WeightEntry { luma, chroma });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h265::pps::tests::minimal_pps_rbsp;
    use crate::h265::sps::tests::minimal_sps_rbsp;
    use crate::testutil::BitWriter;

    fn fixture() -> (Sps, Pps) {
        (
            Sps::parse(&minimal_sps_rbsp()).unwrap(),
            Pps::parse(&minimal_pps_rbsp()).unwrap(),
        )
    }

    #[test]
    fn idr_first_slice() {
        let (sps, pps) = fixture();
        let mut w = BitWriter::new();
        w.put_bit(true); // first_slice_segment_in_pic_flag
        w.put_bit(false); // no_output_of_prior_pics_flag (IRAP)
        w.put_ue(0); // slice_pic_parameter_set_id
        w.put_ue(SLICE_I); // slice_type
        // IDR: no POC, no RPS.
        w.put_bit(true); // slice_sao_luma_flag
        w.put_bit(true); // slice_sao_chroma_flag
        w.put_se(3); // slice_qp_delta
        w.put_bit(false); // slice_loop_filter_across_slices_enabled_flag
        w.put_trailing_bits(); // byte_alignment
        let rbsp = w.finish();

        let seg = parse_slice_segment(&rbsp, NAL_IDR_W_RADL, &sps, &pps).unwrap();
        let h = &seg.header;
        assert!(h.first_slice_segment_in_pic_flag);
        assert_eq!(h.no_output_of_prior_pics_flag, Some(false));
        assert_eq!(h.slice_type, Some(SLICE_I));
        assert_eq!(h.slice_pic_order_cnt_lsb, None);
        assert_eq!(h.poc_lsb_or_zero(), 0);
        assert!(h.is_irap());
        assert_eq!(h.slice_qp_delta, Some(3));
    }

    #[test]
    fn trailing_p_slice_with_poc() {
        let (sps, pps) = fixture();
        let mut w = BitWriter::new();
        w.put_bit(true); // first_slice_segment_in_pic_flag
        w.put_ue(0); // slice_pic_parameter_set_id
        w.put_ue(SLICE_P); // slice_type
        w.put_bits(42, 8); // slice_pic_order_cnt_lsb (8 bits per SPS)
        w.put_bit(true); // short_term_ref_pic_set_sps_flag (1 set: no idx)
        w.put_bit(true); // slice_temporal_mvp_enabled_flag
        w.put_bit(true); // slice_sao_luma_flag
        w.put_bit(false); // slice_sao_chroma_flag
        w.put_bit(false); // num_ref_idx_active_override_flag
        w.put_ue(0); // five_minus_max_num_merge_cand
        w.put_se(0); // slice_qp_delta
        w.put_bit(true); // slice_loop_filter_across_slices_enabled_flag
        w.put_trailing_bits();
        let rbsp = w.finish();

        // TRAIL_R = nal type 1.
        let seg = parse_slice_segment(&rbsp, 1, &sps, &pps).unwrap();
        let h = &seg.header;
        assert_eq!(h.slice_type, Some(SLICE_P));
        assert_eq!(h.slice_pic_order_cnt_lsb, Some(42));
        assert_eq!(h.short_term_ref_pic_set_sps_flag, Some(true));
        assert_eq!(h.num_ref_idx_l0_active_minus1, Some(0));
        assert!(!h.is_irap());
    }

    #[test]
    fn non_first_slice_reads_ctu_address() {
        let (sps, pps) = fixture();
        // PicSizeInCtbsY = 510 -> 9 address bits.
        let mut w = BitWriter::new();
        w.put_bit(false); // first_slice_segment_in_pic_flag
        w.put_ue(0); // slice_pic_parameter_set_id
        w.put_bits(300, 9); // slice_segment_address
        w.put_ue(SLICE_I); // slice_type
        w.put_bits(7, 8); // slice_pic_order_cnt_lsb
        w.put_bit(true); // short_term_ref_pic_set_sps_flag
        w.put_bit(false); // slice_temporal_mvp_enabled_flag
        w.put_bit(false); // slice_sao_luma_flag
        w.put_bit(false); // slice_sao_chroma_flag
        w.put_se(0); // slice_qp_delta
        w.put_bit(false); // slice_loop_filter_across_slices_enabled_flag
        w.put_trailing_bits();
        let rbsp = w.finish();

        // CRA_NUT = 21: IRAP, carries a POC.
        let seg = parse_slice_segment(&rbsp, 21, &sps, &pps).unwrap();
        let h = &seg.header;
        assert_eq!(h.slice_segment_address, 300);
        assert_eq!(h.slice_pic_order_cnt_lsb, Some(7));
    }

    #[test]
    fn dependent_slice_skips_independent_fields() {
        let sps = Sps::parse(&minimal_sps_rbsp()).unwrap();
        // PPS with dependent slices enabled.
        let pps = {
            let mut w = BitWriter::new();
            w.put_ue(0);
            w.put_ue(0);
            w.put_bit(true); // dependent_slice_segments_enabled_flag
            w.put_bit(false);
            w.put_bits(0, 3);
            w.put_bit(false);
            w.put_bit(false);
            w.put_ue(0);
            w.put_ue(0);
            w.put_se(0);
            w.put_bit(false);
            w.put_bit(false);
            w.put_bit(false); // cu_qp_delta_enabled_flag
            w.put_se(0);
            w.put_se(0);
            w.put_bit(false);
            w.put_bit(false);
            w.put_bit(false);
            w.put_bit(false);
            w.put_bit(false); // tiles_enabled_flag
            w.put_bit(false); // entropy_coding_sync_enabled_flag
            w.put_bit(true);
            w.put_bit(false);
            w.put_bit(false);
            w.put_bit(false);
            w.put_ue(0);
            w.put_bit(false);
            w.put_bit(false); // pps_extension_present_flag
            w.put_trailing_bits();
            Pps::parse(&w.finish()).unwrap()
        };

        let mut w = BitWriter::new();
        w.put_bit(false); // first_slice_segment_in_pic_flag
        w.put_ue(0); // slice_pic_parameter_set_id
        w.put_bit(true); // dependent_slice_segment_flag
        w.put_bits(17, 9); // slice_segment_address
        w.put_trailing_bits();
        let rbsp = w.finish();

        let seg = parse_slice_segment(&rbsp, 1, &sps, &pps).unwrap();
        let h = &seg.header;
        assert!(h.dependent_slice_segment_flag);
        assert_eq!(h.slice_segment_address, 17);
        assert_eq!(h.slice_type, None);
        assert_eq!(h.slice_qp_delta, None);
    }
}
