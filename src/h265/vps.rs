// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Video parameter set, ITU-T H.265 section 7.3.2.1.

use crate::bits::BitCursor;
use crate::h265::ptl::{parse_profile_tier_level, ProfileTierLevel};
use crate::h265::vui::{parse_hrd, Hrd};
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Vps {
    pub vps_video_parameter_set_id: u8,
    pub vps_base_layer_internal_flag: bool,
    pub vps_base_layer_available_flag: bool,
    pub vps_max_layers_minus1: u8,
    pub vps_max_sub_layers_minus1: u8,
    pub vps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    pub vps_sub_layer_ordering_info_present_flag: bool,
    pub vps_max_dec_pic_buffering_minus1: Vec<u32>,
    pub vps_max_num_reorder_pics: Vec<u32>,
    pub vps_max_latency_increase_plus1: Vec<u32>,
    pub vps_max_layer_id: u8,
    pub vps_num_layer_sets_minus1: u32,
    /// `layer_id_included_flag[set][layer]`.
    pub layer_id_included_flag: Vec<Vec<bool>>,
    pub timing: Option<VpsTiming>,
    pub vps_extension_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct VpsTiming {
    pub vps_num_units_in_tick: u32,
    pub vps_time_scale: u32,
    pub vps_num_ticks_poc_diff_one_minus1: Option<u32>,
    pub vps_num_hrd_parameters: u32,
    pub hrd_layer_set_idx: Vec<u32>,
    pub cprms_present_flag: Vec<Option<bool>>,
    pub hrd_parameters: Vec<Hrd>,
}

impl Vps {
    pub fn parse(rbsp: &[u8]) -> Result<Vps, Error> {
        let mut c = BitCursor::new(rbsp);
        let c = &mut c;

        let vps_video_parameter_set_id = c.read_u(4)? as u8;
        let vps_base_layer_internal_flag = c.read_bool()?;
        let vps_base_layer_available_flag = c.read_bool()?;
        let vps_max_layers_minus1 = c.read_u(6)? as u8;
        let vps_max_sub_layers_minus1 = c.read_u(3)? as u8;
        let vps_temporal_id_nesting_flag = c.read_bool()?;
        c.skip(16)?; // vps_reserved_0xffff_16bits

        let profile_tier_level = parse_profile_tier_level(c, true, vps_max_sub_layers_minus1)?;

        let vps_sub_layer_ordering_info_present_flag = c.read_bool()?;
        let num_ordering = if vps_sub_layer_ordering_info_present_flag {
            vps_max_sub_layers_minus1 as usize + 1
        } else {
            1
        };
        let mut vps_max_dec_pic_buffering_minus1 = Vec::with_capacity(num_ordering);
        let mut vps_max_num_reorder_pics = Vec::with_capacity(num_ordering);
        let mut vps_max_latency_increase_plus1 = Vec::with_capacity(num_ordering);
        for _ in 0..num_ordering {
            vps_max_dec_pic_buffering_minus1.push(c.read_ue()?);
            vps_max_num_reorder_pics.push(c.read_ue()?);
            vps_max_latency_increase_plus1.push(c.read_ue()?);
        }

        let vps_max_layer_id = c.read_u(6)? as u8;
        let vps_num_layer_sets_minus1 = c.read_ue()?;
        if vps_num_layer_sets_minus1 > 1023 {
            base::bail_t!(Malformed, "vps_num_layer_sets_minus1 {}", vps_num_layer_sets_minus1);
        }
        let mut layer_id_included_flag = Vec::new();
        for _ in 1..=vps_num_layer_sets_minus1 {
            let mut per_layer = Vec::with_capacity(vps_max_layer_id as usize + 1);
            for _ in 0..=vps_max_layer_id {
                per_layer.push(c.read_bool()?);
            }
            layer_id_included_flag.push(per_layer);
        }

        let timing = if c.read_bool()? {
            let vps_num_units_in_tick = c.read_u32()?;
            let vps_time_scale = c.read_u32()?;
            let vps_num_ticks_poc_diff_one_minus1 = if c.read_bool()? {
                Some(c.read_ue()?)
            } else {
                None
            };
            let vps_num_hrd_parameters = c.read_ue()?;
            if vps_num_hrd_parameters > 1024 {
                base::bail_t!(Malformed, "vps_num_hrd_parameters {}", vps_num_hrd_parameters);
            }
            let mut hrd_layer_set_idx = Vec::new();
            let mut cprms_present_flag = Vec::new();
            let mut hrd_parameters = Vec::new();
            for i in 0..vps_num_hrd_parameters {
                hrd_layer_set_idx.push(c.read_ue()?);
                let cprms = if i > 0 { Some(c.read_bool()?) } else { None };
                cprms_present_flag.push(cprms);
                // cprms_present_flag is inferred to be 1 for the first set.
                let common_inf = cprms.unwrap_or(true);
                hrd_parameters.push(parse_hrd(c, common_inf, vps_max_sub_layers_minus1)?);
            }
            Some(VpsTiming {
                vps_num_units_in_tick,
                vps_time_scale,
                vps_num_ticks_poc_diff_one_minus1,
                vps_num_hrd_parameters,
                hrd_layer_set_idx,
                cprms_present_flag,
                hrd_parameters,
            })
        } else {
            None
        };

        // vps_extension_flag; extension payload bytes are not interpreted.
        let vps_extension_flag = c.read_bool().unwrap_or(false);

        Ok(Vps {
            vps_video_parameter_set_id,
            vps_base_layer_internal_flag,
            vps_base_layer_available_flag,
            vps_max_layers_minus1,
            vps_max_sub_layers_minus1,
            vps_temporal_id_nesting_flag,
            profile_tier_level,
            vps_sub_layer_ordering_info_present_flag,
            vps_max_dec_pic_buffering_minus1,
            vps_max_num_reorder_pics,
            vps_max_latency_increase_plus1,
            vps_max_layer_id,
            vps_num_layer_sets_minus1,
            layer_id_included_flag,
            timing,
            vps_extension_flag,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    pub(crate) fn minimal_vps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_bits(0, 4); // vps_video_parameter_set_id
        w.put_bit(true); // vps_base_layer_internal_flag
        w.put_bit(true); // vps_base_layer_available_flag
        w.put_bits(0, 6); // vps_max_layers_minus1
        w.put_bits(0, 3); // vps_max_sub_layers_minus1
        w.put_bit(true); // vps_temporal_id_nesting_flag
        w.put_bits(0xffff, 16); // reserved
        w.put_main_ptl();
        w.put_bit(false); // vps_sub_layer_ordering_info_present_flag
        w.put_ue(3); // vps_max_dec_pic_buffering_minus1[0]
        w.put_ue(1); // vps_max_num_reorder_pics[0]
        w.put_ue(0); // vps_max_latency_increase_plus1[0]
        w.put_bits(0, 6); // vps_max_layer_id
        w.put_ue(0); // vps_num_layer_sets_minus1
        w.put_bit(false); // vps_timing_info_present_flag
        w.put_bit(false); // vps_extension_flag
        w.put_trailing_bits();
        w.finish()
    }

    #[test]
    fn minimal_vps() {
        let rbsp = minimal_vps_rbsp();
        let vps = Vps::parse(&rbsp).unwrap();
        assert_eq!(vps.vps_video_parameter_set_id, 0);
        assert_eq!(vps.vps_max_sub_layers_minus1, 0);
        assert!(vps.vps_temporal_id_nesting_flag);
        assert_eq!(vps.profile_tier_level.general_level_idc, 120);
        assert_eq!(vps.vps_max_dec_pic_buffering_minus1, vec![3]);
        assert_eq!(vps.vps_max_num_reorder_pics, vec![1]);
        assert!(vps.timing.is_none());
        assert!(!vps.vps_extension_flag);
    }
}
