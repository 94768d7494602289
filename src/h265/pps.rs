// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Picture parameter set, ITU-T H.265 section 7.3.2.3, including the
//! range / multilayer / 3D / SCC extension families.

use crate::bits::BitCursor;
use crate::h265::scaling::{parse_scaling_list_data, ScalingListData};
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Pps {
    pub pps_pic_parameter_set_id: u32,
    pub pps_seq_parameter_set_id: u32,
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub init_qp_minus26: i32,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta: Option<u32>,
    pub pps_cb_qp_offset: i32,
    pub pps_cr_qp_offset: i32,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
    pub tiles: Option<Tiles>,
    pub entropy_coding_sync_enabled_flag: bool,
    pub pps_loop_filter_across_slices_enabled_flag: bool,
    pub deblocking: Option<DeblockingFilterControl>,
    pub scaling_list_data: Option<ScalingListData>,
    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u32,
    pub slice_segment_header_extension_present_flag: bool,
    pub extensions: Option<PpsExtensions>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Tiles {
    pub num_tile_columns_minus1: u32,
    pub num_tile_rows_minus1: u32,
    pub uniform_spacing_flag: bool,
    /// Explicit column widths / row heights when spacing is not uniform.
    pub column_width_minus1: Vec<u32>,
    pub row_height_minus1: Vec<u32>,
    pub loop_filter_across_tiles_enabled_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeblockingFilterControl {
    pub deblocking_filter_override_enabled_flag: bool,
    pub pps_deblocking_filter_disabled_flag: bool,
    pub pps_beta_offset_div2: Option<i32>,
    pub pps_tc_offset_div2: Option<i32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PpsExtensions {
    pub range: Option<PpsRangeExtension>,
    pub multilayer: Option<PpsMultilayerExtension>,
    pub three_d: Option<Pps3dExtension>,
    pub scc: Option<PpsSccExtension>,
    pub pps_extension_4bits: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct PpsRangeExtension {
    pub log2_max_transform_skip_block_size_minus2: Option<u32>,
    pub cross_component_prediction_enabled_flag: bool,
    pub chroma_qp_offset_list: Option<ChromaQpOffsetList>,
    pub log2_sao_offset_scale_luma: u32,
    pub log2_sao_offset_scale_chroma: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChromaQpOffsetList {
    pub diff_cu_chroma_qp_offset_depth: u32,
    pub cb_qp_offset_list: Vec<i32>,
    pub cr_qp_offset_list: Vec<i32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PpsMultilayerExtension {
    pub poc_reset_info_present_flag: bool,
    pub pps_scaling_list_ref_layer_id: Option<u8>,
    pub ref_loc_offsets: Vec<RefLocOffset>,
    pub colour_mapping_table: Option<ColourMappingTable>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefLocOffset {
    pub ref_loc_offset_layer_id: u8,
    pub scaled_ref_layer_offset: Option<[i32; 4]>,
    pub ref_region_offset: Option<[i32; 4]>,
    pub resample_phase_set: Option<ResamplePhaseSet>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResamplePhaseSet {
    pub phase_hor_luma: u32,
    pub phase_ver_luma: u32,
    pub phase_hor_chroma_plus8: u32,
    pub phase_ver_chroma_plus8: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ColourMappingTable {
    pub cm_ref_layer_id: Vec<u8>,
    pub cm_octant_depth: u8,
    pub cm_y_part_num_log2: u8,
    pub luma_bit_depth_cm_input_minus8: u32,
    pub chroma_bit_depth_cm_input_minus8: u32,
    pub luma_bit_depth_cm_output_minus8: u32,
    pub chroma_bit_depth_cm_output_minus8: u32,
    pub cm_res_quant_bits: u8,
    pub cm_delta_flc_bits_minus1: u8,
    pub cm_adapt_threshold_u_delta: Option<i32>,
    pub cm_adapt_threshold_v_delta: Option<i32>,
    pub octants: ColourMappingOctants,
}

/// Recursive octant descent of the colour-mapping table.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "node")]
pub enum ColourMappingOctants {
    Split {
        children: Vec<ColourMappingOctants>,
    },
    Leaf {
        coded_res: Vec<Option<Vec<ResCoeff>>>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct ResCoeff {
    pub res_coeff_q: u32,
    pub res_coeff_sign_flag: bool,
    pub res_coeff_abs_minus1: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Pps3dExtension {
    pub pps_depth_layers_minus1: u8,
    pub pps_bit_depth_for_depth_layers_minus8: u8,
    pub layers: Vec<DepthLayerDlt>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "dlt")]
pub enum DepthLayerDlt {
    Absent,
    Predicted,
    ValueFlags { dlt_value_flag: Vec<bool> },
    Delta(DeltaDlt),
}

#[derive(Clone, Debug, Serialize)]
pub struct DeltaDlt {
    pub num_val_delta_dlt: u32,
    pub max_diff: Option<u32>,
    pub min_diff_minus1: Option<u32>,
    pub delta_dlt_val0: Option<i32>,
    pub delta_val_diff_minus_min: Vec<i32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PpsSccExtension {
    pub pps_curr_pic_ref_enabled_flag: bool,
    pub act_qp_offsets: Option<ActQpOffsets>,
    pub palette_predictor_initializers: Option<PpsPaletteInitializers>,
    pub motion_vector_resolution_control_idc: u8,
    pub intra_boundary_filtering_disabled_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActQpOffsets {
    pub pps_slice_act_qp_offsets_present_flag: bool,
    pub pps_act_y_qp_offset_plus5: i32,
    pub pps_act_cb_qp_offset_plus5: i32,
    pub pps_act_cr_qp_offset_plus5: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct PpsPaletteInitializers {
    pub monochrome_palette_flag: bool,
    pub luma_bit_depth_entry_minus8: u32,
    pub chroma_bit_depth_entry_minus8: Option<u32>,
    /// `[component][entry]`.
    pub pps_palette_predictor_initializer: Vec<Vec<u32>>,
}

impl Pps {
    pub fn parse(rbsp: &[u8]) -> Result<Pps, Error> {
        let mut c = BitCursor::new(rbsp);
        let c = &mut c;

        let pps_pic_parameter_set_id = c.read_ue()?;
        let pps_seq_parameter_set_id = c.read_ue()?;
        let dependent_slice_segments_enabled_flag = c.read_bool()?;
        let output_flag_present_flag = c.read_bool()?;
        let num_extra_slice_header_bits = c.read_u(3)? as u8;
        let sign_data_hiding_enabled_flag = c.read_bool()?;
        let cabac_init_present_flag = c.read_bool()?;
        let num_ref_idx_l0_default_active_minus1 = c.read_ue()?;
        let num_ref_idx_l1_default_active_minus1 = c.read_ue()?;
        let init_qp_minus26 = c.read_se()?;
        let constrained_intra_pred_flag = c.read_bool()?;
        let transform_skip_enabled_flag = c.read_bool()?;
        let cu_qp_delta = if c.read_bool()? {
            Some(c.read_ue()?)
        } else {
            None
        };
        let pps_cb_qp_offset = c.read_se()?;
        let pps_cr_qp_offset = c.read_se()?;
        let pps_slice_chroma_qp_offsets_present_flag = c.read_bool()?;
        let weighted_pred_flag = c.read_bool()?;
        let weighted_bipred_flag = c.read_bool()?;
        let transquant_bypass_enabled_flag = c.read_bool()?;
        let tiles_enabled_flag = c.read_bool()?;
        let entropy_coding_sync_enabled_flag = c.read_bool()?;

        let tiles = if tiles_enabled_flag {
            let num_tile_columns_minus1 = c.read_ue()?;
            let num_tile_rows_minus1 = c.read_ue()?;
            if num_tile_columns_minus1 > 1024 || num_tile_rows_minus1 > 1024 {
                base::bail_t!(
                    Malformed,
                    "tile grid {}x{}",
                    num_tile_columns_minus1,
                    num_tile_rows_minus1
                );
            }
            let uniform_spacing_flag = c.read_bool()?;
            let mut column_width_minus1 = Vec::new();
            let mut row_height_minus1 = Vec::new();
            if !uniform_spacing_flag {
                for _ in 0..num_tile_columns_minus1 {
                    column_width_minus1.push(c.read_ue()?);
                }
                for _ in 0..num_tile_rows_minus1 {
                    row_height_minus1.push(c.read_ue()?);
                }
            }
            Some(Tiles {
                num_tile_columns_minus1,
                num_tile_rows_minus1,
                uniform_spacing_flag,
                column_width_minus1,
                row_height_minus1,
                loop_filter_across_tiles_enabled_flag: c.read_bool()?,
            })
        } else {
            None
        };

        let pps_loop_filter_across_slices_enabled_flag = c.read_bool()?;
        let deblocking = if c.read_bool()? {
            let deblocking_filter_override_enabled_flag = c.read_bool()?;
            let pps_deblocking_filter_disabled_flag = c.read_bool()?;
            let (beta, tc) = if !pps_deblocking_filter_disabled_flag {
                (Some(c.read_se()?), Some(c.read_se()?))
            } else {
                (None, None)
            };
            Some(DeblockingFilterControl {
                deblocking_filter_override_enabled_flag,
                pps_deblocking_filter_disabled_flag,
                pps_beta_offset_div2: beta,
                pps_tc_offset_div2: tc,
            })
        } else {
            None
        };

        let scaling_list_data = if c.read_bool()? {
            Some(parse_scaling_list_data(c)?)
        } else {
            None
        };

        let lists_modification_present_flag = c.read_bool()?;
        let log2_parallel_merge_level_minus2 = c.read_ue()?;
        let slice_segment_header_extension_present_flag = c.read_bool()?;

        let extensions = if c.read_bool()? {
            let range_flag = c.read_bool()?;
            let multilayer_flag = c.read_bool()?;
            let three_d_flag = c.read_bool()?;
            let scc_flag = c.read_bool()?;
            let pps_extension_4bits = c.read_u(4)? as u8;
            let range = if range_flag {
                Some(parse_pps_range_extension(c, transform_skip_enabled_flag)?)
            } else {
                None
            };
            let multilayer = if multilayer_flag {
                Some(parse_pps_multilayer_extension(c)?)
            } else {
                None
            };
            let three_d = if three_d_flag {
                Some(parse_pps_3d_extension(c)?)
            } else {
                None
            };
            let scc = if scc_flag {
                Some(parse_pps_scc_extension(c)?)
            } else {
                None
            };
            Some(PpsExtensions {
                range,
                multilayer,
                three_d,
                scc,
                pps_extension_4bits,
            })
        } else {
            None
        };

        Ok(Pps {
            pps_pic_parameter_set_id,
            pps_seq_parameter_set_id,
            dependent_slice_segments_enabled_flag,
            output_flag_present_flag,
            num_extra_slice_header_bits,
            sign_data_hiding_enabled_flag,
            cabac_init_present_flag,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            init_qp_minus26,
            constrained_intra_pred_flag,
            transform_skip_enabled_flag,
            cu_qp_delta,
            pps_cb_qp_offset,
            pps_cr_qp_offset,
            pps_slice_chroma_qp_offsets_present_flag,
            weighted_pred_flag,
            weighted_bipred_flag,
            transquant_bypass_enabled_flag,
            tiles,
            entropy_coding_sync_enabled_flag,
            pps_loop_filter_across_slices_enabled_flag,
            deblocking,
            scaling_list_data,
            lists_modification_present_flag,
            log2_parallel_merge_level_minus2,
            slice_segment_header_extension_present_flag,
            extensions,
        })
    }

    pub fn tiles_enabled(&self) -> bool {
        self.tiles.is_some()
    }

    pub fn chroma_qp_offset_list_enabled(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|e| e.range.as_ref())
            .map(|r| r.chroma_qp_offset_list.is_some())
            .unwrap_or(false)
    }

    pub fn act_qp_offsets_present(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|e| e.scc.as_ref())
            .and_then(|s| s.act_qp_offsets.as_ref())
            .map(|a| a.pps_slice_act_qp_offsets_present_flag)
            .unwrap_or(false)
    }
}

fn parse_pps_range_extension(
    c: &mut BitCursor,
    transform_skip_enabled: bool,
) -> Result<PpsRangeExtension, Error> {
    let log2_max_transform_skip_block_size_minus2 = if transform_skip_enabled {
        Some(c.read_ue()?)
    } else {
        None
    };
    let cross_component_prediction_enabled_flag = c.read_bool()?;
    let chroma_qp_offset_list = if c.read_bool()? {
        let diff_cu_chroma_qp_offset_depth = c.read_ue()?;
        let len = c.read_ue()? as usize + 1;
        if len > 6 {
            base::bail_t!(Malformed, "chroma_qp_offset_list_len {}", len);
        }
        let mut cb_qp_offset_list = Vec::with_capacity(len);
        let mut cr_qp_offset_list = Vec::with_capacity(len);
        for _ in 0..len {
            cb_qp_offset_list.push(c.read_se()?);
            cr_qp_offset_list.push(c.read_se()?);
        }
        Some(ChromaQpOffsetList {
            diff_cu_chroma_qp_offset_depth,
            cb_qp_offset_list,
            cr_qp_offset_list,
        })
    } else {
        None
    };
    Ok(PpsRangeExtension {
        log2_max_transform_skip_block_size_minus2,
        cross_component_prediction_enabled_flag,
        chroma_qp_offset_list,
        log2_sao_offset_scale_luma: c.read_ue()?,
        log2_sao_offset_scale_chroma: c.read_ue()?,
    })
}

fn parse_pps_multilayer_extension(c: &mut BitCursor) -> Result<PpsMultilayerExtension, Error> {
    let poc_reset_info_present_flag = c.read_bool()?;
    let pps_scaling_list_ref_layer_id = if c.read_bool()? {
        Some(c.read_u(6)? as u8)
    } else {
        None
    };
    let num_ref_loc_offsets = c.read_ue()?;
    if num_ref_loc_offsets > 64 {
        base::bail_t!(Malformed, "num_ref_loc_offsets {}", num_ref_loc_offsets);
    }
    let mut ref_loc_offsets = Vec::with_capacity(num_ref_loc_offsets as usize);
    for _ in 0..num_ref_loc_offsets {
        let ref_loc_offset_layer_id = c.read_u(6)? as u8;
        let scaled_ref_layer_offset = if c.read_bool()? {
            Some([c.read_se()?, c.read_se()?, c.read_se()?, c.read_se()?])
        } else {
            None
        };
        let ref_region_offset = if c.read_bool()? {
            Some([c.read_se()?, c.read_se()?, c.read_se()?, c.read_se()?])
        } else {
            None
        };
        let resample_phase_set = if c.read_bool()? {
            Some(ResamplePhaseSet {
                phase_hor_luma: c.read_ue()?,
                phase_ver_luma: c.read_ue()?,
                phase_hor_chroma_plus8: c.read_ue()?,
                phase_ver_chroma_plus8: c.read_ue()?,
            })
        } else {
            None
        };
        ref_loc_offsets.push(RefLocOffset {
            ref_loc_offset_layer_id,
            scaled_ref_layer_offset,
            ref_region_offset,
            resample_phase_set,
        });
    }
    let colour_mapping_table = if c.read_bool()? {
        Some(parse_colour_mapping_table(c)?)
    } else {
        None
    };
    Ok(PpsMultilayerExtension {
        poc_reset_info_present_flag,
        pps_scaling_list_ref_layer_id,
        ref_loc_offsets,
        colour_mapping_table,
    })
}

fn parse_colour_mapping_table(c: &mut BitCursor) -> Result<ColourMappingTable, Error> {
    let num_cm_ref_layers_minus1 = c.read_ue()?;
    if num_cm_ref_layers_minus1 > 61 {
        base::bail_t!(Malformed, "num_cm_ref_layers_minus1 {}", num_cm_ref_layers_minus1);
    }
    let mut cm_ref_layer_id = Vec::with_capacity(num_cm_ref_layers_minus1 as usize + 1);
    for _ in 0..=num_cm_ref_layers_minus1 {
        cm_ref_layer_id.push(c.read_u(6)? as u8);
    }
    let cm_octant_depth = c.read_u(2)? as u8;
    let cm_y_part_num_log2 = c.read_u(2)? as u8;
    let luma_bit_depth_cm_input_minus8 = c.read_ue()?;
    let chroma_bit_depth_cm_input_minus8 = c.read_ue()?;
    let luma_bit_depth_cm_output_minus8 = c.read_ue()?;
    let chroma_bit_depth_cm_output_minus8 = c.read_ue()?;
    let cm_res_quant_bits = c.read_u(2)? as u8;
    let cm_delta_flc_bits_minus1 = c.read_u(2)? as u8;
    let (u_delta, v_delta) = if cm_octant_depth == 1 {
        (Some(c.read_se()?), Some(c.read_se()?))
    } else {
        (None, None)
    };
    let octants = parse_colour_mapping_octants(c, cm_octant_depth, 0, 1 << cm_octant_depth)?;
    Ok(ColourMappingTable {
        cm_ref_layer_id,
        cm_octant_depth,
        cm_y_part_num_log2,
        luma_bit_depth_cm_input_minus8,
        chroma_bit_depth_cm_input_minus8,
        luma_bit_depth_cm_output_minus8,
        chroma_bit_depth_cm_output_minus8,
        cm_res_quant_bits,
        cm_delta_flc_bits_minus1,
        cm_adapt_threshold_u_delta: u_delta,
        cm_adapt_threshold_v_delta: v_delta,
        octants,
    })
}

fn parse_colour_mapping_octants(
    c: &mut BitCursor,
    cm_octant_depth: u8,
    inp_depth: u8,
    inp_length: u32,
) -> Result<ColourMappingOctants, Error> {
    let split = if inp_depth < cm_octant_depth {
        c.read_bool()?
    } else {
        false
    };
    if split {
        let mut children = Vec::with_capacity(8);
        for _ in 0..8 {
            children.push(parse_colour_mapping_octants(
                c,
                cm_octant_depth,
                inp_depth + 1,
                inp_length / 2,
            )?);
        }
        return Ok(ColourMappingOctants::Split { children });
    }
    let n = inp_length.min(64) as usize;
    let mut coded_res = Vec::with_capacity(n);
    for _ in 0..n {
        if c.read_bool()? {
            let mut coeffs = Vec::with_capacity(3);
            for _ in 0..3 {
                let res_coeff_q = c.read_ue()?;
                let res_coeff_sign_flag = c.read_bool()?;
                let res_coeff_abs_minus1 = if res_coeff_sign_flag {
                    Some(c.read_ue()?)
                } else {
                    None
                };
                coeffs.push(ResCoeff {
                    res_coeff_q,
                    res_coeff_sign_flag,
                    res_coeff_abs_minus1,
                });
            }
            coded_res.push(Some(coeffs));
        } else {
            coded_res.push(None);
        }
    }
    Ok(ColourMappingOctants::Leaf { coded_res })
}

fn parse_pps_3d_extension(c: &mut BitCursor) -> Result<Pps3dExtension, Error> {
    if !c.read_bool()? {
        // dlts_present_flag == 0
        return Ok(Pps3dExtension {
            pps_depth_layers_minus1: 0,
            pps_bit_depth_for_depth_layers_minus8: 0,
            layers: Vec::new(),
        });
    }
    let pps_depth_layers_minus1 = c.read_u(6)? as u8;
    let pps_bit_depth_for_depth_layers_minus8 = c.read_u(4)? as u8;
    let depth_max_value = (1u32 << (pps_bit_depth_for_depth_layers_minus8 as u32 + 8)) - 1;
    let mut layers = Vec::with_capacity(pps_depth_layers_minus1 as usize + 1);
    for _ in 0..=pps_depth_layers_minus1 {
        if !c.read_bool()? {
            layers.push(DepthLayerDlt::Absent);
            continue;
        }
        if c.read_bool()? {
            // dlt_pred_flag
            layers.push(DepthLayerDlt::Predicted);
            continue;
        }
        if c.read_bool()? {
            // dlt_val_flags_present_flag
            let mut dlt_value_flag = Vec::with_capacity(depth_max_value as usize + 1);
            for _ in 0..=depth_max_value {
                dlt_value_flag.push(c.read_bool()?);
            }
            layers.push(DepthLayerDlt::ValueFlags { dlt_value_flag });
        } else {
            layers.push(DepthLayerDlt::Delta(parse_delta_dlt(c)?));
        }
    }
    Ok(Pps3dExtension {
        pps_depth_layers_minus1,
        pps_bit_depth_for_depth_layers_minus8,
        layers,
    })
}

fn parse_delta_dlt(c: &mut BitCursor) -> Result<DeltaDlt, Error> {
    let num_val_delta_dlt = c.read_ue()?;
    let mut max_diff = None;
    let mut min_diff_minus1 = None;
    let mut delta_dlt_val0 = None;
    let mut delta_val_diff_minus_min = Vec::new();
    if num_val_delta_dlt > 0 {
        if num_val_delta_dlt > 1 {
            max_diff = Some(c.read_ue()?);
        }
        if num_val_delta_dlt > 2 && max_diff.unwrap_or(0) > 0 {
            min_diff_minus1 = Some(c.read_ue()?);
        }
        delta_dlt_val0 = Some(c.read_se()?);
        // min_diff is inferred equal to max_diff when not coded.
        let min_diff = match min_diff_minus1 {
            Some(m) => m + 1,
            None => max_diff.unwrap_or(0),
        };
        if max_diff.unwrap_or(0) > min_diff {
            for _ in 1..num_val_delta_dlt {
                delta_val_diff_minus_min.push(c.read_se()?);
            }
        }
    }
    Ok(DeltaDlt {
        num_val_delta_dlt,
        max_diff,
        min_diff_minus1,
        delta_dlt_val0,
        delta_val_diff_minus_min,
    })
}

fn parse_pps_scc_extension(c: &mut BitCursor) -> Result<PpsSccExtension, Error> {
    let pps_curr_pic_ref_enabled_flag = c.read_bool()?;
    let act_qp_offsets = if c.read_bool()? {
        Some(ActQpOffsets {
            pps_slice_act_qp_offsets_present_flag: c.read_bool()?,
            pps_act_y_qp_offset_plus5: c.read_se()?,
            pps_act_cb_qp_offset_plus5: c.read_se()?,
            pps_act_cr_qp_offset_plus5: c.read_se()?,
        })
    } else {
        None
    };
    let palette_predictor_initializers = if c.read_bool()? {
        let n = c.read_ue()?;
        if n > 128 {
            base::bail_t!(Malformed, "pps_num_palette_predictor_initializers {}", n);
        }
        if n > 0 {
            let monochrome_palette_flag = c.read_bool()?;
            let luma_bit_depth_entry_minus8 = c.read_ue()?;
            let chroma_bit_depth_entry_minus8 = if !monochrome_palette_flag {
                Some(c.read_ue()?)
            } else {
                None
            };
            let num_comps = if monochrome_palette_flag { 1 } else { 3 };
            let luma_bits = luma_bit_depth_entry_minus8 + 8;
            if luma_bits > 16 {
                base::bail_t!(Malformed, "palette entry bit depth {}", luma_bits);
            }
            let mut comps = Vec::with_capacity(num_comps);
            for _ in 0..num_comps {
                let mut entries = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    entries.push(c.read_u(luma_bits)? as u32);
                }
                comps.push(entries);
            }
            Some(PpsPaletteInitializers {
                monochrome_palette_flag,
                luma_bit_depth_entry_minus8,
                chroma_bit_depth_entry_minus8,
                pps_palette_predictor_initializer: comps,
            })
        } else {
            None
        }
    } else {
        None
    };
    Ok(PpsSccExtension {
        pps_curr_pic_ref_enabled_flag,
        act_qp_offsets,
        palette_predictor_initializers,
        motion_vector_resolution_control_idc: c.read_u(2)? as u8,
        intra_boundary_filtering_disabled_flag: c.read_bool()?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    /// Default-everything PPS matching `sps::tests::minimal_sps_rbsp`.
    pub(crate) fn minimal_pps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        put_pps_prefix(&mut w, false);
        w.put_bit(false); // pps_extension_present_flag
        w.put_trailing_bits();
        w.finish()
    }

    /// Everything up to (not including) pps_extension_present_flag.
    fn put_pps_prefix(w: &mut BitWriter, tiles: bool) {
        w.put_ue(0); // pps_pic_parameter_set_id
        w.put_ue(0); // pps_seq_parameter_set_id
        w.put_bit(false); // dependent_slice_segments_enabled_flag
        w.put_bit(false); // output_flag_present_flag
        w.put_bits(0, 3); // num_extra_slice_header_bits
        w.put_bit(true); // sign_data_hiding_enabled_flag
        w.put_bit(false); // cabac_init_present_flag
        w.put_ue(0); // num_ref_idx_l0_default_active_minus1
        w.put_ue(0); // num_ref_idx_l1_default_active_minus1
        w.put_se(0); // init_qp_minus26
        w.put_bit(false); // constrained_intra_pred_flag
        w.put_bit(false); // transform_skip_enabled_flag
        w.put_bit(true); // cu_qp_delta_enabled_flag
        w.put_ue(1); // diff_cu_qp_delta_depth
        w.put_se(0); // pps_cb_qp_offset
        w.put_se(0); // pps_cr_qp_offset
        w.put_bit(false); // pps_slice_chroma_qp_offsets_present_flag
        w.put_bit(false); // weighted_pred_flag
        w.put_bit(false); // weighted_bipred_flag
        w.put_bit(false); // transquant_bypass_enabled_flag
        w.put_bit(tiles); // tiles_enabled_flag
        w.put_bit(false); // entropy_coding_sync_enabled_flag
        if tiles {
            w.put_ue(1); // num_tile_columns_minus1
            w.put_ue(1); // num_tile_rows_minus1
            w.put_bit(false); // uniform_spacing_flag
            w.put_ue(9); // column_width_minus1[0]
            w.put_ue(7); // row_height_minus1[0]
            w.put_bit(true); // loop_filter_across_tiles_enabled_flag
        }
        w.put_bit(true); // pps_loop_filter_across_slices_enabled_flag
        w.put_bit(false); // deblocking_filter_control_present_flag
        w.put_bit(false); // pps_scaling_list_data_present_flag
        w.put_bit(false); // lists_modification_present_flag
        w.put_ue(0); // log2_parallel_merge_level_minus2
        w.put_bit(false); // slice_segment_header_extension_present_flag
    }

    #[test]
    fn minimal_pps() {
        let pps = Pps::parse(&minimal_pps_rbsp()).unwrap();
        assert_eq!(pps.pps_pic_parameter_set_id, 0);
        assert!(pps.sign_data_hiding_enabled_flag);
        assert_eq!(pps.cu_qp_delta, Some(1));
        assert!(pps.tiles.is_none());
        assert!(pps.deblocking.is_none());
        assert!(pps.extensions.is_none());
    }

    #[test]
    fn explicit_tile_grid() {
        let mut w = BitWriter::new();
        put_pps_prefix(&mut w, true);
        w.put_bit(false); // pps_extension_present_flag
        w.put_trailing_bits();
        let pps = Pps::parse(&w.finish()).unwrap();
        let tiles = pps.tiles.expect("tiles");
        assert_eq!(tiles.num_tile_columns_minus1, 1);
        assert_eq!(tiles.num_tile_rows_minus1, 1);
        assert!(!tiles.uniform_spacing_flag);
        assert_eq!(tiles.column_width_minus1, vec![9]);
        assert_eq!(tiles.row_height_minus1, vec![7]);
        assert!(tiles.loop_filter_across_tiles_enabled_flag);
    }

    #[test]
    fn scc_extension_with_palette() {
        let mut w = BitWriter::new();
        put_pps_prefix(&mut w, false);
        w.put_bit(true); // pps_extension_present_flag
        w.put_bit(false); // range
        w.put_bit(false); // multilayer
        w.put_bit(false); // 3d
        w.put_bit(true); // scc
        w.put_bits(0, 4); // pps_extension_4bits
        w.put_bit(true); // pps_curr_pic_ref_enabled_flag
        w.put_bit(false); // residual_adaptive_colour_transform_enabled_flag
        w.put_bit(true); // pps_palette_predictor_initializers_present_flag
        w.put_ue(2); // pps_num_palette_predictor_initializers
        w.put_bit(false); // monochrome_palette_flag
        w.put_ue(0); // luma_bit_depth_entry_minus8
        w.put_ue(0); // chroma_bit_depth_entry_minus8
        for v in [10u64, 20, 30, 40, 50, 60] {
            w.put_bits(v, 8); // three components x two entries
        }
        w.put_bits(0, 2); // motion_vector_resolution_control_idc
        w.put_bit(false); // intra_boundary_filtering_disabled_flag
        w.put_trailing_bits();
        let pps = Pps::parse(&w.finish()).unwrap();
        let scc = pps.extensions.unwrap().scc.expect("scc");
        assert!(scc.pps_curr_pic_ref_enabled_flag);
        let pal = scc.palette_predictor_initializers.expect("palette");
        assert!(!pal.monochrome_palette_flag);
        assert_eq!(pal.pps_palette_predictor_initializer.len(), 3);
        assert_eq!(pal.pps_palette_predictor_initializer[0], vec![10, 20]);
        assert_eq!(pal.pps_palette_predictor_initializer[2], vec![50, 60]);
    }

    #[test]
    fn multilayer_colour_mapping_depth_zero() {
        // cm_octant_depth = 0: the root is immediately a leaf.
        let mut w = BitWriter::new();
        put_pps_prefix(&mut w, false);
        w.put_bit(true); // pps_extension_present_flag
        w.put_bit(false); // range
        w.put_bit(true); // multilayer
        w.put_bit(false); // 3d
        w.put_bit(false); // scc
        w.put_bits(0, 4);
        w.put_bit(false); // poc_reset_info_present_flag
        w.put_bit(false); // pps_infer_scaling_list_flag
        w.put_ue(0); // num_ref_loc_offsets
        w.put_bit(true); // colour_mapping_enabled_flag
        w.put_ue(0); // num_cm_ref_layers_minus1
        w.put_bits(0, 6); // cm_ref_layer_id[0]
        w.put_bits(0, 2); // cm_octant_depth = 0
        w.put_bits(0, 2); // cm_y_part_num_log2
        w.put_ue(0); // luma_bit_depth_cm_input_minus8
        w.put_ue(0); // chroma_bit_depth_cm_input_minus8
        w.put_ue(0); // luma_bit_depth_cm_output_minus8
        w.put_ue(0); // chroma_bit_depth_cm_output_minus8
        w.put_bits(0, 2); // cm_res_quant_bits
        w.put_bits(0, 2); // cm_delta_flc_bits_minus1
        w.put_bit(false); // coded_res_flag[0] (inp_length = 1)
        w.put_trailing_bits();
        let pps = Pps::parse(&w.finish()).unwrap();
        let ml = pps.extensions.unwrap().multilayer.expect("multilayer");
        let cmt = ml.colour_mapping_table.expect("cmt");
        assert_eq!(cmt.cm_octant_depth, 0);
        match cmt.octants {
            ColourMappingOctants::Leaf { ref coded_res } => {
                assert_eq!(coded_res.len(), 1);
                assert!(coded_res[0].is_none());
            }
            ref other => panic!("wrong node: {other:?}"),
        }
    }
}
