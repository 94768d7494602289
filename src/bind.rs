// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Binds container tracks to codec parsers.
//!
//! Decides per track which bitstream parser applies, collects out-of-band
//! parameter sets from `avcC` / `hvcC` (or the first `hvcC` item property
//! for HEIF stills), obtains the raw elementary stream (via the external
//! demuxer for movie files, by `iloc` reassembly for HEIF) and hands it
//! to the NAL-level parsers.

use crate::demux::Demuxer;
use crate::h264;
use crate::h265;
use crate::mp4::{self, BoxBody, BoxTree, HvcC, StsdEntryKind};
use crate::record::{AudioStream, Codec, VideoStream};
use std::path::Path;
use tracing::{info, warn};

/// Everything the binder produced for one file.
#[derive(Debug, Default)]
pub struct Bound {
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
    pub warnings: Vec<String>,
}

/// Binds every track of a parsed container. `data` is the whole file (for
/// HEIF item reassembly); `path` is handed to the demuxer.
pub fn bind_container(
    path: &Path,
    data: &[u8],
    tree: &BoxTree,
    demuxer: &dyn Demuxer,
) -> Bound {
    let mut bound = Bound::default();

    if let Some(w) = mp4::check_sample_integrity(tree) {
        warn!(file = %path.display(), "{}", w);
        bound.warnings.push(w);
    }

    let traks = tree.traks();
    if !traks.is_empty() {
        for trak in traks {
            bind_trak(path, trak, demuxer, &mut bound);
        }
    } else if tree.first("meta").is_some() {
        bind_heif(path, data, tree, &mut bound);
    } else {
        bound
            .warnings
            .push("no moov track list and no meta item tree".to_string());
    }
    bound
}

/// Parses a raw Annex B elementary stream file (`.h264` / `.h265`): all
/// parameter sets are in-band.
pub fn bind_raw(codec: Codec, data: &[u8]) -> Bound {
    let video = match codec {
        Codec::H264 => VideoStream::H264(h264::parse_stream(data, &[], &[])),
        Codec::H265 => VideoStream::H265(h265::parse_stream(data, &[], &[], &[])),
    };
    Bound {
        video_streams: vec![video],
        audio_streams: Vec::new(),
        warnings: Vec::new(),
    }
}

fn bind_trak(path: &Path, trak: &mp4::BoxNode, demuxer: &dyn Demuxer, bound: &mut Bound) {
    let handler = trak
        .find("mdia/hdlr")
        .and_then(|n| match &n.body {
            BoxBody::Hdlr(h) => Some(h.handler_type),
            _ => None,
        });
    let Some(handler) = handler else {
        bound.warnings.push("track without hdlr box".to_string());
        return;
    };
    let Some(stsd_node) = trak.find("mdia/minf/stbl/stsd") else {
        bound.warnings.push("track without stsd box".to_string());
        return;
    };
    let BoxBody::Stsd(stsd) = &stsd_node.body else {
        return;
    };

    if handler == "vide" {
        for entry in &stsd.entries {
            let StsdEntryKind::Video { avcc, hvcc, .. } = &entry.kind else {
                continue;
            };
            match &entry.format.0 {
                b"avc1" | b"avc3" => {
                    let (seed_sps, seed_pps) = match avcc {
                        Some(a) => (a.sps.clone(), a.pps.clone()),
                        None => {
                            bound
                                .warnings
                                .push(format!("{} entry without avcC", entry.format));
                            (Vec::new(), Vec::new())
                        }
                    };
                    match demuxer.demux(path, Codec::H264) {
                        Ok(es) => {
                            info!(file = %path.display(), bytes = es.len(), "demuxed H.264 stream");
                            bound.video_streams.push(VideoStream::H264(
                                h264::parse_stream(&es, &seed_sps, &seed_pps),
                            ));
                        }
                        Err(e) => {
                            warn!(file = %path.display(), err = %e, "H.264 demux failed");
                            bound.warnings.push(format!("demux failed: {e}"));
                        }
                    }
                }
                b"hvc1" | b"hev1" => {
                    let (seed_vps, seed_sps, seed_pps) = match hvcc {
                        Some(h) => (h.vps.clone(), h.sps.clone(), h.pps.clone()),
                        None => {
                            bound
                                .warnings
                                .push(format!("{} entry without hvcC", entry.format));
                            (Vec::new(), Vec::new(), Vec::new())
                        }
                    };
                    match demuxer.demux(path, Codec::H265) {
                        Ok(es) => {
                            info!(file = %path.display(), bytes = es.len(), "demuxed H.265 stream");
                            bound.video_streams.push(VideoStream::H265(
                                h265::parse_stream(&es, &seed_vps, &seed_sps, &seed_pps),
                            ));
                        }
                        Err(e) => {
                            warn!(file = %path.display(), err = %e, "H.265 demux failed");
                            bound.warnings.push(format!("demux failed: {e}"));
                        }
                    }
                }
                _ => {
                    bound.warnings.push(format!(
                        "unsupported video sample entry {}",
                        entry.format
                    ));
                }
            }
        }
    } else if handler == "soun" {
        for entry in &stsd.entries {
            let StsdEntryKind::Audio { extensions, .. } = &entry.kind else {
                continue;
            };
            let codec = match &entry.format.0 {
                b"mp4a" => "AAC",
                b"ac-3" | b"ec-3" => "AC-3",
                _ => {
                    bound.warnings.push(format!(
                        "unsupported audio sample entry {}",
                        entry.format
                    ));
                    continue;
                }
            };
            // The decoder configuration (esds / dac3) is kept verbatim.
            let config = extensions
                .iter()
                .find_map(|n| match &n.body {
                    BoxBody::Raw { data } if n.box_type == "esds" || n.box_type == "dac3" => {
                        Some(data.clone())
                    }
                    _ => None,
                })
                .unwrap_or_default();
            bound.audio_streams.push(AudioStream {
                codec: codec.to_string(),
                config,
            });
        }
    }
}

/// HEIF stills: parameter sets from the first `hvcC` property, elementary
/// stream re-assembled by prefixing each `iloc` extent with a start code.
/// Item payloads are length-prefixed, so the leading 4-byte length is
/// replaced by the start code.
fn bind_heif(path: &Path, data: &[u8], tree: &BoxTree, bound: &mut Bound) {
    let Some(meta) = tree.first("meta") else {
        return;
    };
    let Some(hvcc) = find_heif_hvcc(meta) else {
        bound
            .warnings
            .push(format!("{}: no hvcC item property", path.display()));
        return;
    };
    let Some(iloc_node) = meta.child("iloc") else {
        bound.warnings.push("meta without iloc".to_string());
        return;
    };
    let BoxBody::Iloc(iloc) = &iloc_node.body else {
        return;
    };

    let mut es = Vec::new();
    for item in &iloc.items {
        for extent in &item.extents {
            let start = extent.extent_offset as usize;
            let len = extent.extent_length as usize;
            if len < 4 || start + len > data.len() {
                bound.warnings.push(format!(
                    "iloc extent at {} of {} bytes out of bounds",
                    extent.extent_offset, extent.extent_length
                ));
                continue;
            }
            es.extend_from_slice(&[0, 0, 0, 1]);
            es.extend_from_slice(&data[start + 4..start + len]);
        }
    }
    if es.is_empty() {
        bound.warnings.push("no usable iloc extents".to_string());
        return;
    }
    info!(file = %path.display(), bytes = es.len(), "reassembled HEIF elementary stream");
    bound.video_streams.push(VideoStream::H265(h265::parse_stream(
        &es,
        &hvcc.vps,
        &hvcc.sps,
        &hvcc.pps,
    )));
}

fn find_heif_hvcc(meta: &mp4::BoxNode) -> Option<HvcC> {
    let ipco = meta.find("iprp/ipco")?;
    for node in ipco.children() {
        if node.box_type == "hvcC" {
            if let BoxBody::Raw { data } = &node.body {
                if let Ok(h) = mp4::parse_hvcc(data) {
                    return Some(h);
                }
            }
        }
    }
    None
}
