// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! SEI messages, ITU-T H.265 Annex D.
//!
//! Each message is framed (ff-extended type and size), its payload bytes
//! extracted, and a typed body parsed for the payload types the analyzer
//! and exporters care about. Unknown or unparseable payloads keep their
//! exact bytes.

use crate::bits::BitCursor;
use crate::h264::sei::read_ff_coded;
use crate::h265::sps::Sps;
use crate::h265::vui::Hrd;
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct SeiMessage {
    pub payload_type: u32,
    pub payload_size: u32,
    pub body: SeiPayload,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind")]
pub enum SeiPayload {
    BufferingPeriod(BufferingPeriod),
    PicTiming(PicTiming),
    PanScanRect(PanScanRect),
    FillerPayload,
    UserDataRegisteredItuTT35(UserDataRegistered),
    UserDataUnregistered(UserDataUnregistered),
    RecoveryPoint(RecoveryPoint),
    FramePackingArrangement(FramePackingArrangement),
    DisplayOrientation(DisplayOrientation),
    StructureOfPicturesInfo(StructureOfPicturesInfo),
    ActiveParameterSets(ActiveParameterSets),
    DecodingUnitInfo(DecodingUnitInfo),
    TemporalSubLayerZeroIndex(TemporalSubLayerZeroIndex),
    DecodedPictureHash(DecodedPictureHash),
    ScalableNesting(ScalableNesting),
    RegionRefreshInfo(RegionRefreshInfo),
    NoDisplay,
    TimeCode(TimeCode),
    MasteringDisplayColourVolume(MasteringDisplayColourVolume),
    ContentLightLevelInfo(ContentLightLevelInfo),
    AlternativeTransferCharacteristics(AlternativeTransferCharacteristics),
    AmbientViewingEnvironment(AmbientViewingEnvironment),
    ContentColourVolume(ContentColourVolume),
    /// Exact payload bytes of an uninterpreted (or failed) payload type.
    Raw {
        #[serde(serialize_with = "crate::record::b64::serialize")]
        bytes: Vec<u8>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct BufferingPeriod {
    pub bp_seq_parameter_set_id: u32,
    pub irap_cpb_params_present_flag: bool,
    pub cpb_delay_offset: Option<u32>,
    pub dpb_delay_offset: Option<u32>,
    pub concatenation_flag: bool,
    pub au_cpb_removal_delay_delta_minus1: u32,
    pub nal_cpb: Vec<InitialCpbRemoval>,
    pub vcl_cpb: Vec<InitialCpbRemoval>,
}

#[derive(Clone, Debug, Serialize)]
pub struct InitialCpbRemoval {
    pub initial_cpb_removal_delay: u32,
    pub initial_cpb_removal_offset: u32,
    pub initial_alt_cpb_removal_delay: Option<u32>,
    pub initial_alt_cpb_removal_offset: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PicTiming {
    pub pic_struct: Option<u8>,
    pub source_scan_type: Option<u8>,
    pub duplicate_flag: Option<bool>,
    pub au_cpb_removal_delay_minus1: Option<u32>,
    pub pic_dpb_output_delay: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PanScanRect {
    pub pan_scan_rect_id: u32,
    pub pan_scan_rect_cancel_flag: bool,
    pub rects: Vec<[i32; 4]>,
    pub pan_scan_rect_persistence_flag: Option<bool>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserDataRegistered {
    pub itu_t_t35_country_code: u8,
    pub itu_t_t35_country_code_extension_byte: Option<u8>,
    #[serde(serialize_with = "crate::record::b64::serialize")]
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserDataUnregistered {
    #[serde(serialize_with = "crate::record::b64::serialize")]
    pub uuid_iso_iec_11578: Vec<u8>,
    #[serde(serialize_with = "crate::record::b64::serialize")]
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecoveryPoint {
    pub recovery_poc_cnt: i32,
    pub exact_match_flag: bool,
    pub broken_link_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct FramePackingArrangement {
    pub frame_packing_arrangement_id: u32,
    pub frame_packing_arrangement_cancel_flag: bool,
    pub frame_packing_arrangement_type: Option<u8>,
    pub quincunx_sampling_flag: Option<bool>,
    pub content_interpretation_type: Option<u8>,
    pub spatial_flipping_flag: Option<bool>,
    pub frame0_flipped_flag: Option<bool>,
    pub field_views_flag: Option<bool>,
    pub current_frame_is_frame0_flag: Option<bool>,
    pub frame0_self_contained_flag: Option<bool>,
    pub frame1_self_contained_flag: Option<bool>,
    pub grid_positions: Option<[u8; 4]>,
    pub frame_packing_arrangement_persistence_flag: Option<bool>,
    pub upsampled_aspect_ratio_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct DisplayOrientation {
    pub display_orientation_cancel_flag: bool,
    pub hor_flip: Option<bool>,
    pub ver_flip: Option<bool>,
    pub anticlockwise_rotation: Option<u16>,
    pub display_orientation_persistence_flag: Option<bool>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StructureOfPicturesInfo {
    pub sop_seq_parameter_set_id: u32,
    pub entries: Vec<SopEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SopEntry {
    pub sop_vcl_nut: u8,
    pub sop_temporal_id: u8,
    pub sop_short_term_rps_idx: Option<u32>,
    pub sop_poc_delta: Option<i32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActiveParameterSets {
    pub active_video_parameter_set_id: u8,
    pub self_contained_cvs_flag: bool,
    pub no_parameter_set_update_flag: bool,
    pub active_seq_parameter_set_id: Vec<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DecodingUnitInfo {
    pub decoding_unit_idx: u32,
    pub du_spt_cpb_removal_delay_increment: Option<u32>,
    pub pic_spt_dpb_output_du_delay: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TemporalSubLayerZeroIndex {
    pub temporal_sub_layer_zero_idx: u8,
    pub irap_pic_id: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct DecodedPictureHash {
    pub hash_type: u8,
    /// One entry per colour plane.
    pub hashes: Vec<PlaneHash>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum PlaneHash {
    Md5(#[serde(serialize_with = "crate::record::b64::serialize")] Vec<u8>),
    Crc(u16),
    Checksum(u32),
}

#[derive(Clone, Debug, Serialize)]
pub struct ScalableNesting {
    pub bitstream_subset_flag: bool,
    pub nesting_op_flag: bool,
    pub default_op_flag: Option<bool>,
    pub nesting_max_temporal_id_plus1: Vec<u8>,
    pub nesting_op_idx: Vec<u32>,
    pub all_layers_flag: bool,
    pub nesting_no_op_max_temporal_id_plus1: Option<u8>,
    pub nesting_layer_id: Vec<u8>,
    /// Nested messages, recursively parsed.
    pub nested: Vec<SeiMessage>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegionRefreshInfo {
    pub refreshed_region_flag: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct TimeCode {
    pub clock_timestamps: Vec<Option<ClockTimestamp>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ClockTimestamp {
    pub units_field_based_flag: bool,
    pub counting_type: u8,
    pub full_timestamp_flag: bool,
    pub discontinuity_flag: bool,
    pub cnt_dropped_flag: bool,
    pub n_frames: u16,
    pub seconds_value: Option<u8>,
    pub minutes_value: Option<u8>,
    pub hours_value: Option<u8>,
    pub time_offset_value: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MasteringDisplayColourVolume {
    pub display_primaries_x: [u16; 3],
    pub display_primaries_y: [u16; 3],
    pub white_point_x: u16,
    pub white_point_y: u16,
    pub max_display_mastering_luminance: u32,
    pub min_display_mastering_luminance: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ContentLightLevelInfo {
    pub max_content_light_level: u16,
    pub max_pic_average_light_level: u16,
}

#[derive(Clone, Debug, Serialize)]
pub struct AlternativeTransferCharacteristics {
    pub preferred_transfer_characteristics: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct AmbientViewingEnvironment {
    pub ambient_illuminance: u32,
    pub ambient_light_x: u16,
    pub ambient_light_y: u16,
}

#[derive(Clone, Debug, Serialize)]
pub struct ContentColourVolume {
    pub ccv_cancel_flag: bool,
    pub ccv_persistence_flag: Option<bool>,
    pub ccv_primaries: Option<[(u32, u32); 3]>,
    pub ccv_min_luminance_value: Option<u32>,
    pub ccv_max_luminance_value: Option<u32>,
    pub ccv_avg_luminance_value: Option<u32>,
}

/// Parses the SEI messages of one prefix/suffix NAL. `sps` is the latest
/// active SPS (buffering-period and pic-timing widths come from its HRD).
pub fn parse_sei(rbsp: &[u8], sps: Option<&Sps>) -> Result<Vec<SeiMessage>, Error> {
    let mut c = BitCursor::new(rbsp);
    let mut messages = Vec::new();
    while c.more_rbsp_data() && c.bits_remaining() >= 16 {
        let Ok(payload_type) = read_ff_coded(&mut c) else {
            break;
        };
        let Ok(payload_size) = read_ff_coded(&mut c) else {
            break;
        };
        let mut payload = Vec::with_capacity(payload_size as usize);
        for _ in 0..payload_size {
            match c.read_u8() {
                Ok(b) => payload.push(b),
                Err(_) => break,
            }
        }
        messages.push(parse_message(payload_type, payload_size, payload, sps));
    }
    Ok(messages)
}

fn parse_message(
    payload_type: u32,
    payload_size: u32,
    payload: Vec<u8>,
    sps: Option<&Sps>,
) -> SeiMessage {
    let body = match parse_payload(payload_type, &payload, sps) {
        Ok(Some(body)) => body,
        // Unknown type, truncated payload, or absent SPS context: keep the
        // exact bytes.
        Ok(None) | Err(_) => SeiPayload::Raw { bytes: payload },
    };
    SeiMessage {
        payload_type,
        payload_size,
        body,
    }
}

fn parse_payload(
    payload_type: u32,
    payload: &[u8],
    sps: Option<&Sps>,
) -> Result<Option<SeiPayload>, Error> {
    let mut c = BitCursor::new(payload);
    let c = &mut c;
    Ok(Some(match payload_type {
        0 => match sps.and_then(active_hrd) {
            Some(hrd) => SeiPayload::BufferingPeriod(parse_buffering_period(c, hrd)?),
            None => return Ok(None),
        },
        1 => match sps {
            Some(sps) => SeiPayload::PicTiming(parse_pic_timing(c, sps)?),
            None => return Ok(None),
        },
        2 => SeiPayload::PanScanRect(parse_pan_scan_rect(c)?),
        3 => SeiPayload::FillerPayload,
        4 => {
            let itu_t_t35_country_code = c.read_u8()?;
            let ext = if itu_t_t35_country_code == 0xff {
                Some(c.read_u8()?)
            } else {
                None
            };
            let skip = if ext.is_some() { 2 } else { 1 };
            SeiPayload::UserDataRegisteredItuTT35(UserDataRegistered {
                itu_t_t35_country_code,
                itu_t_t35_country_code_extension_byte: ext,
                payload: payload[skip.min(payload.len())..].to_vec(),
            })
        }
        5 => {
            if payload.len() < 16 {
                return Ok(None);
            }
            SeiPayload::UserDataUnregistered(UserDataUnregistered {
                uuid_iso_iec_11578: payload[..16].to_vec(),
                payload: payload[16..].to_vec(),
            })
        }
        6 => SeiPayload::RecoveryPoint(RecoveryPoint {
            recovery_poc_cnt: c.read_se()?,
            exact_match_flag: c.read_bool()?,
            broken_link_flag: c.read_bool()?,
        }),
        45 => SeiPayload::FramePackingArrangement(parse_frame_packing(c)?),
        47 => SeiPayload::DisplayOrientation(parse_display_orientation(c)?),
        128 => SeiPayload::StructureOfPicturesInfo(parse_sop_info(c)?),
        129 => SeiPayload::ActiveParameterSets(parse_active_parameter_sets(c)?),
        130 => match sps.and_then(active_hrd) {
            Some(hrd) => SeiPayload::DecodingUnitInfo(parse_decoding_unit_info(c, hrd)?),
            None => return Ok(None),
        },
        131 => SeiPayload::TemporalSubLayerZeroIndex(TemporalSubLayerZeroIndex {
            temporal_sub_layer_zero_idx: c.read_u8()?,
            irap_pic_id: c.read_u8()?,
        }),
        132 => SeiPayload::DecodedPictureHash(parse_decoded_picture_hash(c, sps)?),
        133 => SeiPayload::ScalableNesting(parse_scalable_nesting(c, payload, sps)?),
        134 => SeiPayload::RegionRefreshInfo(RegionRefreshInfo {
            refreshed_region_flag: c.read_bool()?,
        }),
        135 => SeiPayload::NoDisplay,
        136 => SeiPayload::TimeCode(parse_time_code(c)?),
        137 => SeiPayload::MasteringDisplayColourVolume(MasteringDisplayColourVolume {
            display_primaries_x: [c.read_u16()?, c.read_u16()?, c.read_u16()?],
            display_primaries_y: [c.read_u16()?, c.read_u16()?, c.read_u16()?],
            white_point_x: c.read_u16()?,
            white_point_y: c.read_u16()?,
            max_display_mastering_luminance: c.read_u32()?,
            min_display_mastering_luminance: c.read_u32()?,
        }),
        144 => SeiPayload::ContentLightLevelInfo(ContentLightLevelInfo {
            max_content_light_level: c.read_u16()?,
            max_pic_average_light_level: c.read_u16()?,
        }),
        147 => SeiPayload::AlternativeTransferCharacteristics(
            AlternativeTransferCharacteristics {
                preferred_transfer_characteristics: c.read_u8()?,
            },
        ),
        148 => SeiPayload::AmbientViewingEnvironment(AmbientViewingEnvironment {
            ambient_illuminance: c.read_u32()?,
            ambient_light_x: c.read_u16()?,
            ambient_light_y: c.read_u16()?,
        }),
        149 => SeiPayload::ContentColourVolume(parse_content_colour_volume(c)?),
        _ => return Ok(None),
    }))
}

fn active_hrd(sps: &Sps) -> Option<&Hrd> {
    sps.vui.as_ref()?.hrd_parameters.as_ref()
}

fn parse_buffering_period(c: &mut BitCursor, hrd: &Hrd) -> Result<BufferingPeriod, Error> {
    let bp_seq_parameter_set_id = c.read_ue()?;
    let irap_cpb_params_present_flag = if hrd.sub_pic.is_none() {
        c.read_bool()?
    } else {
        false
    };
    let (cpb_delay_offset, dpb_delay_offset) = if irap_cpb_params_present_flag {
        (
            Some(c.read_u(hrd.au_cpb_removal_delay_length_minus1 as u32 + 1)? as u32),
            Some(c.read_u(hrd.dpb_output_delay_length_minus1 as u32 + 1)? as u32),
        )
    } else {
        (None, None)
    };
    let concatenation_flag = c.read_bool()?;
    let au_cpb_removal_delay_delta_minus1 =
        c.read_u(hrd.au_cpb_removal_delay_length_minus1 as u32 + 1)? as u32;

    let cpb_cnt = hrd
        .sub_layers
        .first()
        .map(|s| s.cpb_cnt_minus1 + 1)
        .unwrap_or(1);
    let alt = hrd.sub_pic.is_some() || irap_cpb_params_present_flag;
    let init_len = hrd.initial_cpb_removal_delay_length_minus1 as u32 + 1;
    let mut read_cpbs = |c: &mut BitCursor| -> Result<Vec<InitialCpbRemoval>, Error> {
        let mut out = Vec::with_capacity(cpb_cnt as usize);
        for _ in 0..cpb_cnt {
            let initial_cpb_removal_delay = c.read_u(init_len)? as u32;
            let initial_cpb_removal_offset = c.read_u(init_len)? as u32;
            let (alt_delay, alt_offset) = if alt {
                (Some(c.read_u(init_len)? as u32), Some(c.read_u(init_len)? as u32))
            } else {
                (None, None)
            };
            out.push(InitialCpbRemoval {
                initial_cpb_removal_delay,
                initial_cpb_removal_offset,
                initial_alt_cpb_removal_delay: alt_delay,
                initial_alt_cpb_removal_offset: alt_offset,
            });
        }
        Ok(out)
    };
    let nal_cpb = if hrd.nal_hrd_parameters_present_flag {
        read_cpbs(c)?
    } else {
        Vec::new()
    };
    let vcl_cpb = if hrd.vcl_hrd_parameters_present_flag {
        read_cpbs(c)?
    } else {
        Vec::new()
    };
    Ok(BufferingPeriod {
        bp_seq_parameter_set_id,
        irap_cpb_params_present_flag,
        cpb_delay_offset,
        dpb_delay_offset,
        concatenation_flag,
        au_cpb_removal_delay_delta_minus1,
        nal_cpb,
        vcl_cpb,
    })
}

fn parse_pic_timing(c: &mut BitCursor, sps: &Sps) -> Result<PicTiming, Error> {
    let mut pt = PicTiming {
        pic_struct: None,
        source_scan_type: None,
        duplicate_flag: None,
        au_cpb_removal_delay_minus1: None,
        pic_dpb_output_delay: None,
    };
    let Some(vui) = sps.vui.as_ref() else {
        return Ok(pt);
    };
    if vui.frame_field_info_present_flag {
        pt.pic_struct = Some(c.read_u(4)? as u8);
        pt.source_scan_type = Some(c.read_u(2)? as u8);
        pt.duplicate_flag = Some(c.read_bool()?);
    }
    if let Some(hrd) = vui.hrd_parameters.as_ref() {
        pt.au_cpb_removal_delay_minus1 =
            Some(c.read_u(hrd.au_cpb_removal_delay_length_minus1 as u32 + 1)? as u32);
        pt.pic_dpb_output_delay =
            Some(c.read_u(hrd.dpb_output_delay_length_minus1 as u32 + 1)? as u32);
    }
    Ok(pt)
}

fn parse_pan_scan_rect(c: &mut BitCursor) -> Result<PanScanRect, Error> {
    let pan_scan_rect_id = c.read_ue()?;
    let pan_scan_rect_cancel_flag = c.read_bool()?;
    let mut rects = Vec::new();
    let mut persistence = None;
    if !pan_scan_rect_cancel_flag {
        let cnt = c.read_ue()? + 1;
        if cnt > 3 {
            base::bail_t!(Malformed, "pan_scan_cnt {}", cnt);
        }
        for _ in 0..cnt {
            rects.push([c.read_se()?, c.read_se()?, c.read_se()?, c.read_se()?]);
        }
        persistence = Some(c.read_bool()?);
    }
    Ok(PanScanRect {
        pan_scan_rect_id,
        pan_scan_rect_cancel_flag,
        rects,
        pan_scan_rect_persistence_flag: persistence,
    })
}

fn parse_frame_packing(c: &mut BitCursor) -> Result<FramePackingArrangement, Error> {
    let frame_packing_arrangement_id = c.read_ue()?;
    let cancel = c.read_bool()?;
    let mut fpa = FramePackingArrangement {
        frame_packing_arrangement_id,
        frame_packing_arrangement_cancel_flag: cancel,
        frame_packing_arrangement_type: None,
        quincunx_sampling_flag: None,
        content_interpretation_type: None,
        spatial_flipping_flag: None,
        frame0_flipped_flag: None,
        field_views_flag: None,
        current_frame_is_frame0_flag: None,
        frame0_self_contained_flag: None,
        frame1_self_contained_flag: None,
        grid_positions: None,
        frame_packing_arrangement_persistence_flag: None,
        upsampled_aspect_ratio_flag: false,
    };
    if !cancel {
        let ty = c.read_u(7)? as u8;
        fpa.frame_packing_arrangement_type = Some(ty);
        let quincunx = c.read_bool()?;
        fpa.quincunx_sampling_flag = Some(quincunx);
        fpa.content_interpretation_type = Some(c.read_u(6)? as u8);
        fpa.spatial_flipping_flag = Some(c.read_bool()?);
        fpa.frame0_flipped_flag = Some(c.read_bool()?);
        fpa.field_views_flag = Some(c.read_bool()?);
        fpa.current_frame_is_frame0_flag = Some(c.read_bool()?);
        fpa.frame0_self_contained_flag = Some(c.read_bool()?);
        fpa.frame1_self_contained_flag = Some(c.read_bool()?);
        if !quincunx && ty != 5 {
            fpa.grid_positions = Some([
                c.read_u(4)? as u8,
                c.read_u(4)? as u8,
                c.read_u(4)? as u8,
                c.read_u(4)? as u8,
            ]);
        }
        c.skip(8)?; // frame_packing_arrangement_reserved_byte
        fpa.frame_packing_arrangement_persistence_flag = Some(c.read_bool()?);
    }
    fpa.upsampled_aspect_ratio_flag = c.read_bool()?;
    Ok(fpa)
}

fn parse_display_orientation(c: &mut BitCursor) -> Result<DisplayOrientation, Error> {
    let cancel = c.read_bool()?;
    if cancel {
        return Ok(DisplayOrientation {
            display_orientation_cancel_flag: true,
            hor_flip: None,
            ver_flip: None,
            anticlockwise_rotation: None,
            display_orientation_persistence_flag: None,
        });
    }
    Ok(DisplayOrientation {
        display_orientation_cancel_flag: false,
        hor_flip: Some(c.read_bool()?),
        ver_flip: Some(c.read_bool()?),
        anticlockwise_rotation: Some(c.read_u16()?),
        display_orientation_persistence_flag: Some(c.read_bool()?),
    })
}

fn parse_sop_info(c: &mut BitCursor) -> Result<StructureOfPicturesInfo, Error> {
    let sop_seq_parameter_set_id = c.read_ue()?;
    let n = c.read_ue()? + 1;
    if n > 1024 {
        base::bail_t!(Malformed, "num_entries_in_sop {}", n);
    }
    let mut entries = Vec::with_capacity(n as usize);
    for i in 0..n {
        let sop_vcl_nut = c.read_u(6)? as u8;
        let sop_temporal_id = c.read_u(3)? as u8;
        let (idx, delta) = if sop_vcl_nut != 19 && sop_vcl_nut != 20 {
            let idx = c.read_ue()?;
            let delta = if i > 0 { Some(c.read_se()?) } else { None };
            (Some(idx), delta)
        } else {
            (None, None)
        };
        entries.push(SopEntry {
            sop_vcl_nut,
            sop_temporal_id,
            sop_short_term_rps_idx: idx,
            sop_poc_delta: delta,
        });
    }
    Ok(StructureOfPicturesInfo {
        sop_seq_parameter_set_id,
        entries,
    })
}

fn parse_active_parameter_sets(c: &mut BitCursor) -> Result<ActiveParameterSets, Error> {
    let active_video_parameter_set_id = c.read_u(4)? as u8;
    let self_contained_cvs_flag = c.read_bool()?;
    let no_parameter_set_update_flag = c.read_bool()?;
    let n = c.read_ue()? + 1;
    if n > 16 {
        base::bail_t!(Malformed, "num_sps_ids {}", n);
    }
    let mut active_seq_parameter_set_id = Vec::with_capacity(n as usize);
    for _ in 0..n {
        active_seq_parameter_set_id.push(c.read_ue()?);
    }
    Ok(ActiveParameterSets {
        active_video_parameter_set_id,
        self_contained_cvs_flag,
        no_parameter_set_update_flag,
        active_seq_parameter_set_id,
    })
}

fn parse_decoding_unit_info(c: &mut BitCursor, hrd: &Hrd) -> Result<DecodingUnitInfo, Error> {
    let decoding_unit_idx = c.read_ue()?;
    let sub_pic = hrd.sub_pic.as_ref();
    let du_spt = match sub_pic {
        Some(sp) if !sp.sub_pic_cpb_params_in_pic_timing_sei_flag => Some(
            c.read_u(sp.du_cpb_removal_delay_increment_length_minus1 as u32 + 1)? as u32,
        ),
        _ => None,
    };
    let dpb_output = if c.read_bool()? {
        match sub_pic {
            Some(sp) => Some(c.read_u(sp.dpb_output_delay_du_length_minus1 as u32 + 1)? as u32),
            None => None,
        }
    } else {
        None
    };
    Ok(DecodingUnitInfo {
        decoding_unit_idx,
        du_spt_cpb_removal_delay_increment: du_spt,
        pic_spt_dpb_output_du_delay: dpb_output,
    })
}

fn parse_decoded_picture_hash(
    c: &mut BitCursor,
    sps: Option<&Sps>,
) -> Result<DecodedPictureHash, Error> {
    let hash_type = c.read_u8()?;
    let planes = match sps.map(|s| s.chroma_array_type()) {
        Some(0) => 1,
        _ => 3,
    };
    let mut hashes = Vec::with_capacity(planes);
    for _ in 0..planes {
        hashes.push(match hash_type {
            0 => {
                let mut md5 = Vec::with_capacity(16);
                for _ in 0..16 {
                    md5.push(c.read_u8()?);
                }
                PlaneHash::Md5(md5)
            }
            1 => PlaneHash::Crc(c.read_u16()?),
            2 => PlaneHash::Checksum(c.read_u32()?),
            other => {
                base::bail_t!(Malformed, "decoded-picture-hash type {}", other);
            }
        });
    }
    Ok(DecodedPictureHash { hash_type, hashes })
}

fn parse_scalable_nesting(
    c: &mut BitCursor,
    payload: &[u8],
    sps: Option<&Sps>,
) -> Result<ScalableNesting, Error> {
    let bitstream_subset_flag = c.read_bool()?;
    let nesting_op_flag = c.read_bool()?;
    let mut default_op_flag = None;
    let mut nesting_max_temporal_id_plus1 = Vec::new();
    let mut nesting_op_idx = Vec::new();
    if nesting_op_flag {
        let default_op = c.read_bool()?;
        default_op_flag = Some(default_op);
        let n = c.read_ue()? + 1;
        if n > 1024 {
            base::bail_t!(Malformed, "nesting_num_ops {}", n);
        }
        for i in 0..n {
            if !default_op || i == 0 {
                nesting_max_temporal_id_plus1.push(c.read_u(3)? as u8);
            }
            if !default_op {
                nesting_op_idx.push(c.read_ue()?);
            }
        }
    }
    let all_layers_flag = c.read_bool()?;
    let mut nesting_no_op_max_temporal_id_plus1 = None;
    let mut nesting_layer_id = Vec::new();
    if !all_layers_flag {
        nesting_no_op_max_temporal_id_plus1 = Some(c.read_u(3)? as u8);
        let n = c.read_ue()? + 1;
        if n > 64 {
            base::bail_t!(Malformed, "nesting_num_layers {}", n);
        }
        for _ in 0..n {
            nesting_layer_id.push(c.read_u(6)? as u8);
        }
    }
    // nesting_zero_bit alignment, then nested SEI messages to the end of
    // this payload.
    c.align_to_byte();
    let nested_bytes = &payload[c.position() / 8..];
    let nested = parse_sei(nested_bytes, sps)?;
    Ok(ScalableNesting {
        bitstream_subset_flag,
        nesting_op_flag,
        default_op_flag,
        nesting_max_temporal_id_plus1,
        nesting_op_idx,
        all_layers_flag,
        nesting_no_op_max_temporal_id_plus1,
        nesting_layer_id,
        nested,
    })
}

fn parse_time_code(c: &mut BitCursor) -> Result<TimeCode, Error> {
    let num_clock_ts = c.read_u(2)? as usize;
    let mut clock_timestamps = Vec::with_capacity(num_clock_ts);
    for _ in 0..num_clock_ts {
        if !c.read_bool()? {
            clock_timestamps.push(None);
            continue;
        }
        let units_field_based_flag = c.read_bool()?;
        let counting_type = c.read_u(5)? as u8;
        let full_timestamp_flag = c.read_bool()?;
        let discontinuity_flag = c.read_bool()?;
        let cnt_dropped_flag = c.read_bool()?;
        let n_frames = c.read_u(9)? as u16;
        let mut seconds_value = None;
        let mut minutes_value = None;
        let mut hours_value = None;
        if full_timestamp_flag {
            seconds_value = Some(c.read_u(6)? as u8);
            minutes_value = Some(c.read_u(6)? as u8);
            hours_value = Some(c.read_u(5)? as u8);
        } else if c.read_bool()? {
            seconds_value = Some(c.read_u(6)? as u8);
            if c.read_bool()? {
                minutes_value = Some(c.read_u(6)? as u8);
                if c.read_bool()? {
                    hours_value = Some(c.read_u(5)? as u8);
                }
            }
        }
        let time_offset_length = c.read_u(5)? as u32;
        let time_offset_value = if time_offset_length > 0 {
            Some(c.read_u(time_offset_length)? as u32)
        } else {
            None
        };
        clock_timestamps.push(Some(ClockTimestamp {
            units_field_based_flag,
            counting_type,
            full_timestamp_flag,
            discontinuity_flag,
            cnt_dropped_flag,
            n_frames,
            seconds_value,
            minutes_value,
            hours_value,
            time_offset_value,
        }));
    }
    Ok(TimeCode { clock_timestamps })
}

fn parse_content_colour_volume(c: &mut BitCursor) -> Result<ContentColourVolume, Error> {
    let ccv_cancel_flag = c.read_bool()?;
    if ccv_cancel_flag {
        return Ok(ContentColourVolume {
            ccv_cancel_flag,
            ccv_persistence_flag: None,
            ccv_primaries: None,
            ccv_min_luminance_value: None,
            ccv_max_luminance_value: None,
            ccv_avg_luminance_value: None,
        });
    }
    let ccv_persistence_flag = Some(c.read_bool()?);
    let primaries_present = c.read_bool()?;
    let min_present = c.read_bool()?;
    let max_present = c.read_bool()?;
    let avg_present = c.read_bool()?;
    c.skip(2)?; // ccv_reserved_zero_2bits
    let ccv_primaries = if primaries_present {
        let mut xs = [0u32; 3];
        let mut ys = [0u32; 3];
        for x in xs.iter_mut() {
            *x = c.read_u32()?;
        }
        for y in ys.iter_mut() {
            *y = c.read_u32()?;
        }
        Some([(xs[0], ys[0]), (xs[1], ys[1]), (xs[2], ys[2])])
    } else {
        None
    };
    Ok(ContentColourVolume {
        ccv_cancel_flag,
        ccv_persistence_flag,
        ccv_primaries,
        ccv_min_luminance_value: if min_present { Some(c.read_u32()?) } else { None },
        ccv_max_luminance_value: if max_present { Some(c.read_u32()?) } else { None },
        ccv_avg_luminance_value: if avg_present { Some(c.read_u32()?) } else { None },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mastering_display_payload() {
        // Type 137, 24 bytes: BT.2020 primaries, D65 white point.
        let mut payload = Vec::new();
        for v in [35400u16, 14600, 8500, 39850, 6550, 2300, 15635, 16450] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        payload.extend_from_slice(&10_000_000u32.to_be_bytes());
        payload.extend_from_slice(&50u32.to_be_bytes());

        let mut rbsp = vec![137, 24];
        rbsp.extend_from_slice(&payload);
        rbsp.push(0x80);

        let messages = parse_sei(&rbsp, None).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload_type, 137);
        match &messages[0].body {
            SeiPayload::MasteringDisplayColourVolume(m) => {
                assert_eq!(m.display_primaries_x, [35400, 8500, 6550]);
                assert_eq!(m.white_point_x, 15635);
                assert_eq!(m.max_display_mastering_luminance, 10_000_000);
                assert_eq!(m.min_display_mastering_luminance, 50);
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn content_light_level() {
        let rbsp = [144, 4, 0x03, 0xe8, 0x01, 0xf4, 0x80];
        let messages = parse_sei(&rbsp, None).unwrap();
        match &messages[0].body {
            SeiPayload::ContentLightLevelInfo(c) => {
                assert_eq!(c.max_content_light_level, 1000);
                assert_eq!(c.max_pic_average_light_level, 500);
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_kept_raw_with_exact_length() {
        let rbsp = [200, 3, 0xaa, 0xbb, 0xcc, 0x80];
        let messages = parse_sei(&rbsp, None).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload_type, 200);
        assert_eq!(messages[0].payload_size, 3);
        match &messages[0].body {
            SeiPayload::Raw { bytes } => assert_eq!(bytes, &vec![0xaa, 0xbb, 0xcc]),
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn user_data_unregistered() {
        let mut rbsp = vec![5, 20];
        rbsp.extend_from_slice(&[0x11; 16]);
        rbsp.extend_from_slice(b"data");
        rbsp.push(0x80);
        let messages = parse_sei(&rbsp, None).unwrap();
        match &messages[0].body {
            SeiPayload::UserDataUnregistered(u) => {
                assert_eq!(u.uuid_iso_iec_11578, vec![0x11; 16]);
                assert_eq!(u.payload, b"data".to_vec());
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn alternative_transfer() {
        // HLG (18).
        let rbsp = [147, 1, 18, 0x80];
        let messages = parse_sei(&rbsp, None).unwrap();
        match &messages[0].body {
            SeiPayload::AlternativeTransferCharacteristics(a) => {
                assert_eq!(a.preferred_transfer_characteristics, 18);
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn buffering_period_without_sps_stays_raw() {
        let rbsp = [0, 2, 0x12, 0x34, 0x80];
        let messages = parse_sei(&rbsp, None).unwrap();
        assert!(matches!(messages[0].body, SeiPayload::Raw { .. }));
    }
}
