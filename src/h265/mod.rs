// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! H.265 (ITU-T H.265 / HEVC) syntax parsing.
//!
//! Same shape as the H.264 module: NAL units in source order, parameter
//! sets keyed by id with latest-wins activation, out-of-band sets from
//! `hvcC` seeded ahead of the in-band stream.

pub mod pps;
pub mod ptl;
pub mod rps;
pub mod scaling;
pub mod sei;
pub mod slice;
pub mod sps;
pub mod vps;
pub mod vui;

pub use pps::Pps;
pub use sei::SeiMessage;
pub use slice::SliceSegment;
pub use sps::Sps;
pub use vps::Vps;

use crate::bits::BitCursor;
use crate::nal::{split_annex_b, strip_emulation_prevention, NalUnit};
use crate::record::Codec;
use base::Error;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

// ITU-T H.265 table 7-1, NAL unit type codes.
pub const NAL_VPS: u8 = 32;
pub const NAL_SPS: u8 = 33;
pub const NAL_PPS: u8 = 34;
pub const NAL_AUD: u8 = 35;
pub const NAL_EOS: u8 = 36;
pub const NAL_EOB: u8 = 37;
pub const NAL_FD: u8 = 38;
pub const NAL_SEI_PREFIX: u8 = 39;
pub const NAL_SEI_SUFFIX: u8 = 40;

#[derive(Clone, Debug, Serialize)]
pub struct Aud {
    pub pic_type: u8,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind")]
pub enum NalBody {
    Vps(Vps),
    Sps(Sps),
    Pps(Pps),
    SeiPrefix { messages: Vec<SeiMessage> },
    SeiSuffix { messages: Vec<SeiMessage> },
    Slice(SliceSegment),
    Aud(Aud),
    EndOfSequence,
    EndOfBitstream,
    FillerData,
    Unparsed,
    Raw,
}

#[derive(Clone, Debug, Serialize)]
pub struct NalRecord {
    #[serde(flatten)]
    pub unit: NalUnit,
    pub body: NalBody,
}

/// Parsed H.265 elementary stream record.
#[derive(Clone, Debug, Serialize, Default)]
pub struct Stream {
    pub nal_units: Vec<NalRecord>,
    pub vps: Vec<Vps>,
    pub sps: Vec<Sps>,
    pub pps: Vec<Pps>,
    pub sei_prefix: Vec<SeiMessage>,
    pub sei_suffix: Vec<SeiMessage>,
    pub slice_segments: Vec<SliceSegment>,
    pub aud: Vec<Aud>,
    pub warnings: Vec<String>,
}

/// Latest parameter set per id; SPS/PPS carry their position in the
/// stream's parse-ordered list so slices can record which variant they
/// resolved.
#[derive(Default)]
struct ParamStore {
    vps: BTreeMap<u8, Vps>,
    sps: BTreeMap<u32, (Sps, usize)>,
    pps: BTreeMap<u32, (Pps, usize)>,
}

/// Parses an Annex B elementary stream. The seed slices carry out-of-band
/// parameter-set NAL units (2-byte header included) from `hvcC`.
pub fn parse_stream(
    es: &[u8],
    seed_vps: &[Vec<u8>],
    seed_sps: &[Vec<u8>],
    seed_pps: &[Vec<u8>],
) -> Stream {
    let mut stream = Stream::default();
    let mut store = ParamStore::default();

    for raw in seed_vps {
        if let Some(rbsp) = seed_rbsp(raw, &mut stream) {
            match Vps::parse(&rbsp) {
                Ok(vps) => {
                    store.vps.insert(vps.vps_video_parameter_set_id, vps.clone());
                    stream.vps.push(vps);
                }
                Err(e) => {
                    warn!(err = %e, "bad out-of-band VPS");
                    stream.warnings.push(format!("bad out-of-band VPS: {e}"));
                }
            }
        }
    }
    for raw in seed_sps {
        if let Some(rbsp) = seed_rbsp(raw, &mut stream) {
            match Sps::parse(&rbsp) {
                Ok(sps) => {
                    let index = stream.sps.len();
                    store
                        .sps
                        .insert(sps.sps_seq_parameter_set_id, (sps.clone(), index));
                    stream.sps.push(sps);
                }
                Err(e) => {
                    warn!(err = %e, "bad out-of-band SPS");
                    stream.warnings.push(format!("bad out-of-band SPS: {e}"));
                }
            }
        }
    }
    for raw in seed_pps {
        if let Some(rbsp) = seed_rbsp(raw, &mut stream) {
            match Pps::parse(&rbsp) {
                Ok(pps) => {
                    let index = stream.pps.len();
                    store
                        .pps
                        .insert(pps.pps_pic_parameter_set_id, (pps.clone(), index));
                    stream.pps.push(pps);
                }
                Err(e) => {
                    warn!(err = %e, "bad out-of-band PPS");
                    stream.warnings.push(format!("bad out-of-band PPS: {e}"));
                }
            }
        }
    }

    for unit in split_annex_b(es, Codec::H265) {
        let nal_type = unit.header.nal_type();
        let body = parse_nal_body(&unit, nal_type, &mut store, &mut stream);
        stream.nal_units.push(NalRecord { unit, body });
    }
    stream
}

impl Stream {
    /// The first parsed slice segment together with the SPS that was active
    /// when it was parsed. Resolved through the snapshot taken at parse
    /// time, so a set re-sent later with the same id cannot shadow it.
    pub fn first_slice_sps(&self) -> Option<(&SliceSegment, &Sps)> {
        let seg = self.slice_segments.first()?;
        let sps = self.sps.get(seg.active_sps_index)?;
        Some((seg, sps))
    }
}

fn seed_rbsp(raw: &[u8], stream: &mut Stream) -> Option<Vec<u8>> {
    if raw.len() <= 2 {
        stream
            .warnings
            .push(format!("out-of-band parameter set too short ({} bytes)", raw.len()));
        return None;
    }
    Some(strip_emulation_prevention(&raw[2..]))
}

fn parse_nal_body(
    unit: &NalUnit,
    nal_type: u8,
    store: &mut ParamStore,
    stream: &mut Stream,
) -> NalBody {
    let rbsp = &unit.rbsp;
    let downgrade = |e: Error, what: &str, stream: &mut Stream| {
        warn!(err = %e, offset = unit.offset, "failed to parse {}", what);
        stream
            .warnings
            .push(format!("{what} at offset {}: {e}", unit.offset));
        NalBody::Unparsed
    };
    match nal_type {
        NAL_VPS => match Vps::parse(rbsp) {
            Ok(vps) => {
                store.vps.insert(vps.vps_video_parameter_set_id, vps.clone());
                stream.vps.push(vps.clone());
                NalBody::Vps(vps)
            }
            Err(e) => downgrade(e, "VPS", stream),
        },
        NAL_SPS => match Sps::parse(rbsp) {
            Ok(sps) => {
                let index = stream.sps.len();
                store
                    .sps
                    .insert(sps.sps_seq_parameter_set_id, (sps.clone(), index));
                stream.sps.push(sps.clone());
                NalBody::Sps(sps)
            }
            Err(e) => downgrade(e, "SPS", stream),
        },
        NAL_PPS => match Pps::parse(rbsp) {
            Ok(pps) => {
                let index = stream.pps.len();
                store
                    .pps
                    .insert(pps.pps_pic_parameter_set_id, (pps.clone(), index));
                stream.pps.push(pps.clone());
                NalBody::Pps(pps)
            }
            Err(e) => downgrade(e, "PPS", stream),
        },
        NAL_SEI_PREFIX => {
            let latest_sps = store.sps.values().next_back().map(|(s, _)| s);
            match sei::parse_sei(rbsp, latest_sps) {
                Ok(messages) => {
                    stream.sei_prefix.extend(messages.iter().cloned());
                    NalBody::SeiPrefix { messages }
                }
                Err(e) => downgrade(e, "prefix SEI", stream),
            }
        }
        NAL_SEI_SUFFIX => {
            let latest_sps = store.sps.values().next_back().map(|(s, _)| s);
            match sei::parse_sei(rbsp, latest_sps) {
                Ok(messages) => {
                    stream.sei_suffix.extend(messages.iter().cloned());
                    NalBody::SeiSuffix { messages }
                }
                Err(e) => downgrade(e, "suffix SEI", stream),
            }
        }
        0..=31 => {
            // VCL: a slice segment. Resolve the PPS its header names.
            let pps_id = match peek_slice_pps_id(rbsp, nal_type) {
                Ok(id) => id,
                Err(e) => return downgrade(e, "slice segment header", stream),
            };
            let Some((pps, pps_index)) = store.pps.get(&pps_id).cloned() else {
                stream.warnings.push(format!(
                    "slice at offset {} references missing PPS {pps_id}",
                    unit.offset
                ));
                return NalBody::Unparsed;
            };
            let Some((sps, sps_index)) = store.sps.get(&pps.pps_seq_parameter_set_id).cloned()
            else {
                stream.warnings.push(format!(
                    "slice at offset {} references missing SPS {} (via PPS {pps_id})",
                    unit.offset, pps.pps_seq_parameter_set_id
                ));
                return NalBody::Unparsed;
            };
            match slice::parse_slice_segment(rbsp, nal_type, &sps, &pps) {
                Ok(mut seg) => {
                    seg.active_sps_index = sps_index;
                    seg.active_pps_index = pps_index;
                    stream.slice_segments.push(seg.clone());
                    NalBody::Slice(seg)
                }
                Err(e) => downgrade(e, "slice segment header", stream),
            }
        }
        NAL_AUD => {
            let mut c = BitCursor::new(rbsp);
            match c.read_u(3) {
                Ok(v) => {
                    let aud = Aud { pic_type: v as u8 };
                    stream.aud.push(aud.clone());
                    NalBody::Aud(aud)
                }
                Err(e) => downgrade(e, "AUD", stream),
            }
        }
        NAL_EOS => NalBody::EndOfSequence,
        NAL_EOB => NalBody::EndOfBitstream,
        NAL_FD => NalBody::FillerData,
        _ => NalBody::Raw,
    }
}

/// Reads just enough of a slice segment header to learn its PPS id.
fn peek_slice_pps_id(rbsp: &[u8], nal_type: u8) -> Result<u32, Error> {
    let mut c = BitCursor::new(rbsp);
    let _first_slice_segment_in_pic_flag = c.read_bool()?;
    if (slice::NAL_BLA_W_LP..=slice::NAL_RSV_IRAP_VCL23).contains(&nal_type) {
        let _no_output_of_prior_pics_flag = c.read_bool()?;
    }
    c.read_ue()
}
