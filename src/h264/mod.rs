// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! H.264 (ISO/IEC 14496-10) syntax parsing.
//!
//! The stream parser walks framed NAL units in source order, keeping the
//! latest parameter set per id; a slice resolves its PPS (and through it
//! the SPS) by the id in its own header. Parameter sets delivered
//! out-of-band (`avcC`) are seeded before the first in-band NAL parses.

pub mod pps;
pub mod sei;
pub mod slice;
pub mod sps;
pub mod vui;

pub use pps::Pps;
pub use sei::SeiMessage;
pub use slice::SliceSegment;
pub use sps::Sps;

use crate::bits::BitCursor;
use crate::nal::{split_annex_b, strip_emulation_prevention, NalUnit};
use crate::record::Codec;
use base::Error;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

// ISO/IEC 14496-10 table 7-1, NAL unit type codes.
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;
pub const NAL_END_OF_SEQ: u8 = 10;
pub const NAL_END_OF_STREAM: u8 = 11;
pub const NAL_FILLER: u8 = 12;
pub const NAL_SPS_EXT: u8 = 13;

#[derive(Clone, Debug, Serialize)]
pub struct Aud {
    pub primary_pic_type: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpsExtension {
    pub seq_parameter_set_id: u32,
    pub aux_format_idc: u32,
    pub bit_depth_aux_minus8: Option<u32>,
    pub alpha_incr_flag: Option<bool>,
    pub alpha_opaque_value: Option<u32>,
    pub alpha_transparent_value: Option<u32>,
    pub additional_extension_flag: bool,
}

impl SpsExtension {
    fn parse(rbsp: &[u8]) -> Result<SpsExtension, Error> {
        let mut c = BitCursor::new(rbsp);
        let seq_parameter_set_id = c.read_ue()?;
        let aux_format_idc = c.read_ue()?;
        let mut ext = SpsExtension {
            seq_parameter_set_id,
            aux_format_idc,
            bit_depth_aux_minus8: None,
            alpha_incr_flag: None,
            alpha_opaque_value: None,
            alpha_transparent_value: None,
            additional_extension_flag: false,
        };
        if aux_format_idc != 0 {
            let depth = c.read_ue()?;
            ext.bit_depth_aux_minus8 = Some(depth);
            ext.alpha_incr_flag = Some(c.read_bool()?);
            let bits = depth + 9;
            ext.alpha_opaque_value = Some(c.read_u(bits)? as u32);
            ext.alpha_transparent_value = Some(c.read_u(bits)? as u32);
        }
        ext.additional_extension_flag = c.read_bool()?;
        Ok(ext)
    }
}

/// What a NAL unit's RBSP parsed into.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind")]
pub enum NalBody {
    Sps(Sps),
    Pps(Pps),
    Sei { messages: Vec<SeiMessage> },
    Slice(SliceSegment),
    Aud(Aud),
    EndOfSequence,
    EndOfStream,
    Filler,
    SpsExtension(SpsExtension),
    /// A slice whose referenced parameter sets were never seen, or a unit
    /// whose parse failed; the raw bytes are still in the enclosing record.
    Unparsed,
    /// A type this parser does not interpret.
    Raw,
}

#[derive(Clone, Debug, Serialize)]
pub struct NalRecord {
    #[serde(flatten)]
    pub unit: NalUnit,
    pub body: NalBody,
}

/// Parsed H.264 elementary stream record.
#[derive(Clone, Debug, Serialize, Default)]
pub struct Stream {
    pub nal_units: Vec<NalRecord>,
    pub sps: Vec<Sps>,
    pub pps: Vec<Pps>,
    pub sei: Vec<SeiMessage>,
    pub slice_segments: Vec<SliceSegment>,
    pub aud: Vec<Aud>,
    pub warnings: Vec<String>,
}

impl Stream {
    /// The first parsed slice together with the SPS that was active when it
    /// was parsed. Resolved through the snapshot taken at parse time, so a
    /// set re-sent later with the same id cannot shadow it.
    pub fn first_slice_sps(&self) -> Option<(&SliceSegment, &Sps)> {
        let seg = self.slice_segments.first()?;
        let sps = self.sps.get(seg.active_sps_index)?;
        Some((seg, sps))
    }
}

/// Latest parameter set per id, paired with its position in the stream's
/// parse-ordered list (so slices can record which variant they resolved).
#[derive(Default)]
struct ParamStore {
    sps: BTreeMap<u32, (Sps, usize)>,
    pps: BTreeMap<u32, (Pps, usize)>,
}

/// Parses an Annex B elementary stream. `seed_sps` / `seed_pps` carry
/// out-of-band parameter-set NAL units (header byte included, EPB intact)
/// taken from the container; they activate before the first in-band unit.
pub fn parse_stream(es: &[u8], seed_sps: &[Vec<u8>], seed_pps: &[Vec<u8>]) -> Stream {
    let mut stream = Stream::default();
    let mut store = ParamStore::default();

    for raw in seed_sps {
        match seed_rbsp(raw, 1, &mut stream) {
            Some(rbsp) => match Sps::parse(&rbsp) {
                Ok(sps) => {
                    let index = stream.sps.len();
                    store
                        .sps
                        .insert(sps.seq_parameter_set_id, (sps.clone(), index));
                    stream.sps.push(sps);
                }
                Err(e) => {
                    warn!(err = %e, "bad out-of-band SPS");
                    stream.warnings.push(format!("bad out-of-band SPS: {e}"));
                }
            },
            None => continue,
        }
    }
    for raw in seed_pps {
        match seed_rbsp(raw, 1, &mut stream) {
            Some(rbsp) => {
                let latest_sps = store.sps.values().next_back().map(|(s, _)| s.clone());
                match Pps::parse(&rbsp, latest_sps.as_ref()) {
                    Ok(pps) => {
                        let index = stream.pps.len();
                        store
                            .pps
                            .insert(pps.pic_parameter_set_id, (pps.clone(), index));
                        stream.pps.push(pps);
                    }
                    Err(e) => {
                        warn!(err = %e, "bad out-of-band PPS");
                        stream.warnings.push(format!("bad out-of-band PPS: {e}"));
                    }
                }
            }
            None => continue,
        }
    }

    for unit in split_annex_b(es, Codec::H264) {
        let nal_type = unit.header.nal_type();
        let ref_idc = unit.header.ref_idc();
        let body = parse_nal_body(&unit, nal_type, ref_idc, &mut store, &mut stream);
        stream.nal_units.push(NalRecord { unit, body });
    }
    stream
}

/// Strips the NAL header and emulation prevention from an out-of-band
/// parameter-set NAL, warning (and returning `None`) when it is too short
/// to hold even a header.
fn seed_rbsp(raw: &[u8], header_len: usize, stream: &mut Stream) -> Option<Vec<u8>> {
    if raw.len() <= header_len {
        stream
            .warnings
            .push(format!("out-of-band parameter set too short ({} bytes)", raw.len()));
        return None;
    }
    Some(strip_emulation_prevention(&raw[header_len..]))
}

fn parse_nal_body(
    unit: &NalUnit,
    nal_type: u8,
    ref_idc: u8,
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
        NAL_SPS => match Sps::parse(rbsp) {
            Ok(sps) => {
                let index = stream.sps.len();
                store
                    .sps
                    .insert(sps.seq_parameter_set_id, (sps.clone(), index));
                stream.sps.push(sps.clone());
                NalBody::Sps(sps)
            }
            Err(e) => downgrade(e, "SPS", stream),
        },
        NAL_PPS => {
            let latest_sps = store.sps.values().next_back().map(|(s, _)| s.clone());
            match Pps::parse(rbsp, latest_sps.as_ref()) {
                Ok(pps) => {
                    let index = stream.pps.len();
                    store
                        .pps
                        .insert(pps.pic_parameter_set_id, (pps.clone(), index));
                    stream.pps.push(pps.clone());
                    NalBody::Pps(pps)
                }
                Err(e) => downgrade(e, "PPS", stream),
            }
        }
        NAL_SEI => match sei::parse_sei(rbsp) {
            Ok(messages) => {
                stream.sei.extend(messages.iter().cloned());
                NalBody::Sei { messages }
            }
            Err(e) => downgrade(e, "SEI", stream),
        },
        slice::NAL_SLICE_NON_IDR | slice::NAL_SLICE_IDR | slice::NAL_SLICE_AUX => {
            let pps_id = match slice::peek_pps_id(rbsp) {
                Ok(id) => id,
                Err(e) => return downgrade(e, "slice header", stream),
            };
            let Some((pps, pps_index)) = store.pps.get(&pps_id).cloned() else {
                stream.warnings.push(format!(
                    "slice at offset {} references missing PPS {pps_id}",
                    unit.offset
                ));
                return NalBody::Unparsed;
            };
            let Some((sps, sps_index)) = store.sps.get(&pps.seq_parameter_set_id).cloned()
            else {
                stream.warnings.push(format!(
                    "slice at offset {} references missing SPS {} (via PPS {pps_id})",
                    unit.offset, pps.seq_parameter_set_id
                ));
                return NalBody::Unparsed;
            };
            match slice::parse_slice(rbsp, nal_type, ref_idc, &sps, &pps) {
                Ok(mut seg) => {
                    seg.active_sps_index = sps_index;
                    seg.active_pps_index = pps_index;
                    stream.slice_segments.push(seg.clone());
                    NalBody::Slice(seg)
                }
                Err(e) => downgrade(e, "slice header", stream),
            }
        }
        NAL_AUD => {
            let mut c = BitCursor::new(rbsp);
            match c.read_u(3) {
                Ok(v) => {
                    let aud = Aud {
                        primary_pic_type: v as u8,
                    };
                    stream.aud.push(aud.clone());
                    NalBody::Aud(aud)
                }
                Err(e) => downgrade(e, "AUD", stream),
            }
        }
        NAL_END_OF_SEQ => NalBody::EndOfSequence,
        NAL_END_OF_STREAM => NalBody::EndOfStream,
        NAL_FILLER => NalBody::Filler,
        NAL_SPS_EXT => match SpsExtension::parse(rbsp) {
            Ok(ext) => NalBody::SpsExtension(ext),
            Err(e) => downgrade(e, "SPS extension", stream),
        },
        _ => NalBody::Raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    fn annex_b(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for u in units {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(u);
        }
        out
    }

    fn minimal_sps_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_bits(66, 8);
        w.put_bits(0xc0, 8);
        w.put_bits(30, 8);
        w.put_ue(0); // seq_parameter_set_id
        w.put_ue(0); // log2_max_frame_num_minus4
        w.put_ue(0); // pic_order_cnt_type
        w.put_ue(0); // log2_max_pic_order_cnt_lsb_minus4
        w.put_ue(1); // max_num_ref_frames
        w.put_bit(false);
        w.put_ue(39);
        w.put_ue(29);
        w.put_bit(true);
        w.put_bit(true);
        w.put_bit(false);
        w.put_bit(false);
        w.put_trailing_bits();
        let mut nal = vec![0x67];
        nal.extend(w.finish());
        nal
    }

    /// Same id 0, but POC type 2: a variant that would change the trim
    /// classification if it shadowed the set the first slice used.
    fn poc_type2_sps_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_bits(66, 8);
        w.put_bits(0xc0, 8);
        w.put_bits(30, 8);
        w.put_ue(0); // seq_parameter_set_id
        w.put_ue(0); // log2_max_frame_num_minus4
        w.put_ue(2); // pic_order_cnt_type
        w.put_ue(1); // max_num_ref_frames
        w.put_bit(false);
        w.put_ue(39);
        w.put_ue(29);
        w.put_bit(true);
        w.put_bit(true);
        w.put_bit(false);
        w.put_bit(false);
        w.put_trailing_bits();
        let mut nal = vec![0x67];
        nal.extend(w.finish());
        nal
    }

    fn minimal_pps_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_ue(0);
        w.put_ue(0);
        w.put_bit(false);
        w.put_bit(false);
        w.put_ue(0);
        w.put_ue(0);
        w.put_ue(0);
        w.put_bit(false);
        w.put_bits(0, 2);
        w.put_se(0);
        w.put_se(0);
        w.put_se(0);
        w.put_bit(false);
        w.put_bit(false);
        w.put_bit(false);
        w.put_trailing_bits();
        let mut nal = vec![0x68];
        nal.extend(w.finish());
        nal
    }

    fn idr_slice_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put_ue(0); // first_mb_in_slice
        w.put_ue(7); // slice_type
        w.put_ue(0); // pic_parameter_set_id
        w.put_bits(0, 4); // frame_num
        w.put_ue(0); // idr_pic_id
        w.put_bits(0, 4); // pic_order_cnt_lsb
        w.put_bit(false);
        w.put_bit(false);
        w.put_se(0);
        w.put_trailing_bits();
        let mut nal = vec![0x65];
        nal.extend(w.finish());
        nal
    }

    #[test]
    fn in_band_parameter_sets() {
        let es = annex_b(&[&minimal_sps_nal(), &minimal_pps_nal(), &idr_slice_nal()]);
        let stream = parse_stream(&es, &[], &[]);
        assert_eq!(stream.nal_units.len(), 3);
        assert_eq!(stream.sps.len(), 1);
        assert_eq!(stream.pps.len(), 1);
        assert_eq!(stream.slice_segments.len(), 1);
        assert!(stream.warnings.is_empty());
        assert!(matches!(stream.nal_units[2].body, NalBody::Slice(_)));
        let (seg, sps) = stream.first_slice_sps().unwrap();
        assert_eq!(seg.header.pic_order_cnt_lsb, Some(0));
        assert_eq!(sps.poc.type_number(), 0);
    }

    #[test]
    fn out_of_band_parameter_sets() {
        // Only the slice is in-band, as when samples come from an mp4 and
        // the parameter sets from avcC.
        let es = annex_b(&[&idr_slice_nal()]);
        let stream = parse_stream(&es, &[minimal_sps_nal()], &[minimal_pps_nal()]);
        assert_eq!(stream.sps.len(), 1);
        assert_eq!(stream.pps.len(), 1);
        assert_eq!(stream.slice_segments.len(), 1);
        assert!(stream.warnings.is_empty());
    }

    #[test]
    fn resent_sps_does_not_shadow_first_slice() {
        // The first slice parses against the POC-type-0 SPS; a later SPS
        // with the same id must not change what it resolves to.
        let es = annex_b(&[
            &minimal_sps_nal(),
            &minimal_pps_nal(),
            &idr_slice_nal(),
            &poc_type2_sps_nal(),
        ]);
        let stream = parse_stream(&es, &[], &[]);
        assert_eq!(stream.sps.len(), 2);
        assert_eq!(stream.slice_segments.len(), 1);
        assert_eq!(stream.slice_segments[0].active_sps_index, 0);
        let (seg, sps) = stream.first_slice_sps().unwrap();
        assert_eq!(sps.poc.type_number(), 0);
        assert_eq!(seg.header.pic_order_cnt_lsb, Some(0));
    }

    #[test]
    fn missing_parameter_set_is_not_fatal() {
        let es = annex_b(&[&idr_slice_nal()]);
        let stream = parse_stream(&es, &[], &[]);
        assert_eq!(stream.slice_segments.len(), 0);
        assert_eq!(stream.nal_units.len(), 1);
        assert!(matches!(stream.nal_units[0].body, NalBody::Unparsed));
        assert_eq!(stream.warnings.len(), 1);
        assert!(stream.warnings[0].contains("missing PPS"));
    }
}
