// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sequence parameter set, ITU-T H.265 section 7.3.2.2.

use crate::bits::BitCursor;
use crate::h265::ptl::{parse_profile_tier_level, ProfileTierLevel};
use crate::h265::rps::{parse_short_term_ref_pic_set, ShortTermRefPicSet};
use crate::h265::scaling::{parse_scaling_list_data, ScalingListData};
use crate::h265::vui::{parse_vui, Vui};
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Sps {
    pub sps_video_parameter_set_id: u8,
    pub sps_max_sub_layers_minus1: u8,
    pub sps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    pub sps_seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    pub conformance_window: Option<ConformanceWindow>,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub sps_sub_layer_ordering_info_present_flag: bool,
    pub max_dec_pic_buffering_minus1: Vec<u32>,
    pub max_num_reorder_pics: Vec<u32>,
    pub max_latency_increase_plus1: Vec<u32>,
    pub log2_min_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_luma_coding_block_size: u32,
    pub log2_min_luma_transform_block_size_minus2: u32,
    pub log2_diff_max_min_luma_transform_block_size: u32,
    pub max_transform_hierarchy_depth_inter: u32,
    pub max_transform_hierarchy_depth_intra: u32,
    pub scaling_list_enabled_flag: bool,
    pub scaling_list_data: Option<ScalingListData>,
    pub amp_enabled_flag: bool,
    pub sample_adaptive_offset_enabled_flag: bool,
    pub pcm: Option<PcmInfo>,
    pub num_short_term_ref_pic_sets: u32,
    pub short_term_ref_pic_sets: Vec<ShortTermRefPicSet>,
    pub long_term_ref_pics: Option<LongTermRefPics>,
    pub sps_temporal_mvp_enabled_flag: bool,
    pub strong_intra_smoothing_enabled_flag: bool,
    pub vui: Option<Vui>,
    pub extensions: Option<SpsExtensions>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConformanceWindow {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct PcmInfo {
    pub pcm_sample_bit_depth_luma_minus1: u8,
    pub pcm_sample_bit_depth_chroma_minus1: u8,
    pub log2_min_pcm_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_pcm_luma_coding_block_size: u32,
    pub pcm_loop_filter_disabled_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct LongTermRefPics {
    pub lt_ref_pic_poc_lsb_sps: Vec<u32>,
    pub used_by_curr_pic_lt_sps_flag: Vec<bool>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpsExtensions {
    pub range: Option<SpsRangeExtension>,
    pub multilayer: Option<SpsMultilayerExtension>,
    pub three_d: Option<Sps3dExtension>,
    pub scc: Option<SpsSccExtension>,
    pub sps_extension_4bits: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpsRangeExtension {
    pub transform_skip_rotation_enabled_flag: bool,
    pub transform_skip_context_enabled_flag: bool,
    pub implicit_rdpcm_enabled_flag: bool,
    pub explicit_rdpcm_enabled_flag: bool,
    pub extended_precision_processing_flag: bool,
    pub intra_smoothing_disabled_flag: bool,
    pub high_precision_offsets_enabled_flag: bool,
    pub persistent_rice_adaptation_enabled_flag: bool,
    pub cabac_bypass_alignment_enabled_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpsMultilayerExtension {
    pub inter_view_mv_vert_constraint_flag: bool,
}

/// 3D extension, one block per depth flag d in {0, 1}.
#[derive(Clone, Debug, Serialize)]
pub struct Sps3dExtension {
    pub texture: Sps3dTexture,
    pub depth: Sps3dDepth,
}

#[derive(Clone, Debug, Serialize)]
pub struct Sps3dTexture {
    pub iv_di_mc_enabled_flag: bool,
    pub iv_mv_scal_enabled_flag: bool,
    pub log2_ivmc_sub_pb_size_minus3: u32,
    pub iv_res_pred_enabled_flag: bool,
    pub depth_ref_enabled_flag: bool,
    pub vsp_mc_enabled_flag: bool,
    pub dbbp_enabled_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Sps3dDepth {
    pub iv_di_mc_enabled_flag: bool,
    pub iv_mv_scal_enabled_flag: bool,
    pub tex_mc_enabled_flag: bool,
    pub log2_texmc_sub_pb_size_minus3: u32,
    pub intra_contour_enabled_flag: bool,
    pub intra_dc_only_wedge_enabled_flag: bool,
    pub cqt_cu_part_pred_enabled_flag: bool,
    pub inter_dc_only_enabled_flag: bool,
    pub skip_intra_enabled_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpsSccExtension {
    pub sps_curr_pic_ref_enabled_flag: bool,
    pub palette: Option<PaletteInfo>,
    pub motion_vector_resolution_control_idc: u8,
    pub intra_boundary_filtering_disabled_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct PaletteInfo {
    pub palette_max_size: u32,
    pub delta_palette_max_predictor_size: u32,
    /// `[component][entry]`, present when the SPS carries initializers.
    pub sps_palette_predictor_initializer: Option<Vec<Vec<u8>>>,
}

impl Sps {
    pub fn parse(rbsp: &[u8]) -> Result<Sps, Error> {
        let mut c = BitCursor::new(rbsp);
        let c = &mut c;

        let sps_video_parameter_set_id = c.read_u(4)? as u8;
        let sps_max_sub_layers_minus1 = c.read_u(3)? as u8;
        let sps_temporal_id_nesting_flag = c.read_bool()?;
        let profile_tier_level = parse_profile_tier_level(c, true, sps_max_sub_layers_minus1)?;

        let sps_seq_parameter_set_id = c.read_ue()?;
        let chroma_format_idc = c.read_ue()?;
        let separate_colour_plane_flag = if chroma_format_idc == 3 {
            c.read_bool()?
        } else {
            false
        };
        let pic_width_in_luma_samples = c.read_ue()?;
        let pic_height_in_luma_samples = c.read_ue()?;
        let conformance_window = if c.read_bool()? {
            Some(ConformanceWindow {
                left_offset: c.read_ue()?,
                right_offset: c.read_ue()?,
                top_offset: c.read_ue()?,
                bottom_offset: c.read_ue()?,
            })
        } else {
            None
        };
        let bit_depth_luma_minus8 = c.read_ue()?;
        let bit_depth_chroma_minus8 = c.read_ue()?;
        let log2_max_pic_order_cnt_lsb_minus4 = c.read_ue()?;

        let sps_sub_layer_ordering_info_present_flag = c.read_bool()?;
        let start_layer = if sps_sub_layer_ordering_info_present_flag {
            0
        } else {
            sps_max_sub_layers_minus1
        };
        let mut max_dec_pic_buffering_minus1 = Vec::new();
        let mut max_num_reorder_pics = Vec::new();
        let mut max_latency_increase_plus1 = Vec::new();
        for _ in start_layer..=sps_max_sub_layers_minus1 {
            max_dec_pic_buffering_minus1.push(c.read_ue()?);
            max_num_reorder_pics.push(c.read_ue()?);
            max_latency_increase_plus1.push(c.read_ue()?);
        }

        let log2_min_luma_coding_block_size_minus3 = c.read_ue()?;
        let log2_diff_max_min_luma_coding_block_size = c.read_ue()?;
        let log2_min_luma_transform_block_size_minus2 = c.read_ue()?;
        let log2_diff_max_min_luma_transform_block_size = c.read_ue()?;
        let max_transform_hierarchy_depth_inter = c.read_ue()?;
        let max_transform_hierarchy_depth_intra = c.read_ue()?;

        let scaling_list_enabled_flag = c.read_bool()?;
        let scaling_list_data = if scaling_list_enabled_flag && c.read_bool()? {
            Some(parse_scaling_list_data(c)?)
        } else {
            None
        };

        let amp_enabled_flag = c.read_bool()?;
        let sample_adaptive_offset_enabled_flag = c.read_bool()?;

        let pcm = if c.read_bool()? {
            Some(PcmInfo {
                pcm_sample_bit_depth_luma_minus1: c.read_u(4)? as u8,
                pcm_sample_bit_depth_chroma_minus1: c.read_u(4)? as u8,
                log2_min_pcm_luma_coding_block_size_minus3: c.read_ue()?,
                log2_diff_max_min_pcm_luma_coding_block_size: c.read_ue()?,
                pcm_loop_filter_disabled_flag: c.read_bool()?,
            })
        } else {
            None
        };

        let num_short_term_ref_pic_sets = c.read_ue()?;
        if num_short_term_ref_pic_sets > 64 {
            base::bail_t!(
                Malformed,
                "num_short_term_ref_pic_sets {}",
                num_short_term_ref_pic_sets
            );
        }
        let mut short_term_ref_pic_sets: Vec<ShortTermRefPicSet> = Vec::new();
        for i in 0..num_short_term_ref_pic_sets {
            let set =
                parse_short_term_ref_pic_set(c, i, num_short_term_ref_pic_sets, &short_term_ref_pic_sets)?;
            short_term_ref_pic_sets.push(set);
        }

        let long_term_ref_pics = if c.read_bool()? {
            let n = c.read_ue()?;
            if n > 32 {
                base::bail_t!(Malformed, "num_long_term_ref_pics_sps {}", n);
            }
            let lsb_bits = log2_max_pic_order_cnt_lsb_minus4 + 4;
            let mut lt_ref_pic_poc_lsb_sps = Vec::with_capacity(n as usize);
            let mut used_by_curr_pic_lt_sps_flag = Vec::with_capacity(n as usize);
            for _ in 0..n {
                lt_ref_pic_poc_lsb_sps.push(c.read_u(lsb_bits)? as u32);
                used_by_curr_pic_lt_sps_flag.push(c.read_bool()?);
            }
            Some(LongTermRefPics {
                lt_ref_pic_poc_lsb_sps,
                used_by_curr_pic_lt_sps_flag,
            })
        } else {
            None
        };

        let sps_temporal_mvp_enabled_flag = c.read_bool()?;
        let strong_intra_smoothing_enabled_flag = c.read_bool()?;

        let vui = if c.read_bool()? {
            Some(parse_vui(c, sps_max_sub_layers_minus1)?)
        } else {
            None
        };

        let extensions = if c.read_bool()? {
            let range_flag = c.read_bool()?;
            let multilayer_flag = c.read_bool()?;
            let three_d_flag = c.read_bool()?;
            let scc_flag = c.read_bool()?;
            let sps_extension_4bits = c.read_u(4)? as u8;
            let range = if range_flag {
                Some(SpsRangeExtension {
                    transform_skip_rotation_enabled_flag: c.read_bool()?,
                    transform_skip_context_enabled_flag: c.read_bool()?,
                    implicit_rdpcm_enabled_flag: c.read_bool()?,
                    explicit_rdpcm_enabled_flag: c.read_bool()?,
                    extended_precision_processing_flag: c.read_bool()?,
                    intra_smoothing_disabled_flag: c.read_bool()?,
                    high_precision_offsets_enabled_flag: c.read_bool()?,
                    persistent_rice_adaptation_enabled_flag: c.read_bool()?,
                    cabac_bypass_alignment_enabled_flag: c.read_bool()?,
                })
            } else {
                None
            };
            let multilayer = if multilayer_flag {
                Some(SpsMultilayerExtension {
                    inter_view_mv_vert_constraint_flag: c.read_bool()?,
                })
            } else {
                None
            };
            let three_d = if three_d_flag {
                Some(parse_sps_3d_extension(c)?)
            } else {
                None
            };
            let scc = if scc_flag {
                Some(parse_sps_scc_extension(c, chroma_format_idc)?)
            } else {
                None
            };
            Some(SpsExtensions {
                range,
                multilayer,
                three_d,
                scc,
                sps_extension_4bits,
            })
        } else {
            None
        };

        Ok(Sps {
            sps_video_parameter_set_id,
            sps_max_sub_layers_minus1,
            sps_temporal_id_nesting_flag,
            profile_tier_level,
            sps_seq_parameter_set_id,
            chroma_format_idc,
            separate_colour_plane_flag,
            pic_width_in_luma_samples,
            pic_height_in_luma_samples,
            conformance_window,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            log2_max_pic_order_cnt_lsb_minus4,
            sps_sub_layer_ordering_info_present_flag,
            max_dec_pic_buffering_minus1,
            max_num_reorder_pics,
            max_latency_increase_plus1,
            log2_min_luma_coding_block_size_minus3,
            log2_diff_max_min_luma_coding_block_size,
            log2_min_luma_transform_block_size_minus2,
            log2_diff_max_min_luma_transform_block_size,
            max_transform_hierarchy_depth_inter,
            max_transform_hierarchy_depth_intra,
            scaling_list_enabled_flag,
            scaling_list_data,
            amp_enabled_flag,
            sample_adaptive_offset_enabled_flag,
            pcm,
            num_short_term_ref_pic_sets,
            short_term_ref_pic_sets,
            long_term_ref_pics,
            sps_temporal_mvp_enabled_flag,
            strong_intra_smoothing_enabled_flag,
            vui,
            extensions,
        })
    }

    /// ChromaArrayType, section 7.4.3.2.1.
    pub fn chroma_array_type(&self) -> u32 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc
        }
    }

    /// Bit width of `slice_pic_order_cnt_lsb`.
    pub fn poc_lsb_bits(&self) -> u32 {
        self.log2_max_pic_order_cnt_lsb_minus4 + 4
    }

    /// CtbLog2SizeY, section 7.4.3.2.1.
    pub fn ctb_log2_size_y(&self) -> u32 {
        self.log2_min_luma_coding_block_size_minus3
            + 3
            + self.log2_diff_max_min_luma_coding_block_size
    }

    /// PicSizeInCtbsY: the CTU count the slice-segment-address width is
    /// derived from.
    pub fn pic_size_in_ctbs_y(&self) -> u32 {
        let ctb_size = 1u32 << self.ctb_log2_size_y();
        let w = self.pic_width_in_luma_samples.div_ceil(ctb_size);
        let h = self.pic_height_in_luma_samples.div_ceil(ctb_size);
        w * h
    }
}

fn parse_sps_3d_extension(c: &mut BitCursor) -> Result<Sps3dExtension, Error> {
    let texture = Sps3dTexture {
        iv_di_mc_enabled_flag: c.read_bool()?,
        iv_mv_scal_enabled_flag: c.read_bool()?,
        log2_ivmc_sub_pb_size_minus3: c.read_ue()?,
        iv_res_pred_enabled_flag: c.read_bool()?,
        depth_ref_enabled_flag: c.read_bool()?,
        vsp_mc_enabled_flag: c.read_bool()?,
        dbbp_enabled_flag: c.read_bool()?,
    };
    let depth = Sps3dDepth {
        iv_di_mc_enabled_flag: c.read_bool()?,
        iv_mv_scal_enabled_flag: c.read_bool()?,
        tex_mc_enabled_flag: c.read_bool()?,
        log2_texmc_sub_pb_size_minus3: c.read_ue()?,
        intra_contour_enabled_flag: c.read_bool()?,
        intra_dc_only_wedge_enabled_flag: c.read_bool()?,
        cqt_cu_part_pred_enabled_flag: c.read_bool()?,
        inter_dc_only_enabled_flag: c.read_bool()?,
        skip_intra_enabled_flag: c.read_bool()?,
    };
    Ok(Sps3dExtension { texture, depth })
}

fn parse_sps_scc_extension(
    c: &mut BitCursor,
    chroma_format_idc: u32,
) -> Result<SpsSccExtension, Error> {
    let sps_curr_pic_ref_enabled_flag = c.read_bool()?;
    let palette = if c.read_bool()? {
        let palette_max_size = c.read_ue()?;
        let delta_palette_max_predictor_size = c.read_ue()?;
        let sps_palette_predictor_initializer = if c.read_bool()? {
            let n = c.read_ue()? as usize + 1;
            if n > 128 {
                base::bail_t!(Malformed, "palette predictor initializer count {}", n);
            }
            let num_comps = if chroma_format_idc == 0 { 1 } else { 3 };
            let mut comps = Vec::with_capacity(num_comps);
            for _ in 0..num_comps {
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    entries.push(c.read_u8()?);
                }
                comps.push(entries);
            }
            Some(comps)
        } else {
            None
        };
        Some(PaletteInfo {
            palette_max_size,
            delta_palette_max_predictor_size,
            sps_palette_predictor_initializer,
        })
    } else {
        None
    };
    Ok(SpsSccExtension {
        sps_curr_pic_ref_enabled_flag,
        palette,
        motion_vector_resolution_control_idc: c.read_u(2)? as u8,
        intra_boundary_filtering_disabled_flag: c.read_bool()?,
    })
}
