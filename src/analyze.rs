// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Forensic analysis of parsed media records.
//!
//! Joins the container's edit-list timing with codec-level picture-order
//! state to decide whether a video was trimmed (the Apple Photos
//! non-destructive edit lineage), reports the track transformation matrix
//! (rotation/flip), the track dimensions, Apple key/value metadata and the
//! geotag, and extracts unreferenced lead-in frames through the demuxer.

use crate::demux::Demuxer;
use crate::mp4::{BoxBody, BoxNode, BoxTree};
use crate::record::{Codec, MediaRecord, VideoStream};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    Low,
    Info,
    Warn,
    Critical,
}

#[derive(Clone, Debug, Serialize)]
pub struct Finding {
    pub item: String,
    pub value: serde_json::Value,
    pub severity: Severity,
    pub comment: String,
}

impl Finding {
    fn new(
        item: &str,
        value: impl Into<serde_json::Value>,
        severity: Severity,
        comment: impl Into<String>,
    ) -> Finding {
        Finding {
            item: item.to_string(),
            value: value.into(),
            severity,
            comment: comment.into(),
        }
    }
}

/// Trim classification of one video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict")]
pub enum TrimVerdict {
    /// No edit list at all: nothing points at an edit.
    Unedited,
    /// Consistent with a camera original; no way to tell.
    Unknown,
    /// Edit-list or picture-order state betrays an edit. The inclusive
    /// sample range of unreferenced lead-in frames, when one exists.
    Edited { unreferenced: Option<(u64, u64)> },
}

/// The identity matrix values of `tkhd.matrix` indices (0, 1, 3, 4).
const IDENTITY_ABCD: [i32; 4] = [0x0001_0000, 0, 0, 0x0001_0000];

/// Runs every forensic check on one parsed record. `output_dir` receives
/// extracted unreferenced frames; extraction failures degrade to findings.
pub fn analyze(record: &MediaRecord, output_dir: &Path, demuxer: &dyn Demuxer) -> Vec<Finding> {
    let mut findings = Vec::new();
    let Some(tree) = record.container.as_ref() else {
        // Raw elementary streams carry no container state to analyze.
        return findings;
    };

    let verdict = detect_trim(record, tree);
    report_trim(record, &verdict, output_dir, demuxer, &mut findings);
    report_orientation(tree, &mut findings);
    report_dimensions_and_metadata(tree, &mut findings);

    for f in &findings {
        info!(
            file = %record.file_path.display(),
            item = %f.item,
            severity = ?f.severity,
            value = %f.value,
            "{}",
            f.comment
        );
    }
    findings
}

/// Trim detection per the Apple Photos lineage: the last non-empty edit's
/// media time, corrected by the first composition-time offset, measured
/// against the sample-delta table (or the first fragment's run).
pub fn detect_trim(record: &MediaRecord, tree: &BoxTree) -> TrimVerdict {
    let traks = tree.traks();
    let Some(trak) = traks.first() else {
        return TrimVerdict::Unedited;
    };
    let Some(elst) = elst_of(trak) else {
        return TrimVerdict::Unedited;
    };

    let mut media_time: i64 = 0;
    for entry in &elst.entries {
        if entry.is_empty_edit() {
            continue;
        }
        media_time = entry.media_time;
    }

    let ctts_lead_in = first_ctts_offset(trak);
    let adjusted = media_time - ctts_lead_in.unwrap_or(0);

    if media_time == 0 || (ctts_lead_in.is_some() && adjusted == 0) {
        return classify_by_picture_order(record);
    }

    if let Some(stts) = stts_of(trak) {
        if !stts.entries.is_empty() {
            let first_delta = stts.entries[0].sample_delta as i64;
            if adjusted > first_delta {
                // Last sample index whose cumulative start time is still
                // below the media time.
                let mut start_time: i64 = 0;
                let mut start_offset: i64 = 0;
                for (i, delta) in stts.expand().iter().enumerate() {
                    if start_time >= adjusted {
                        start_offset = i as i64 - 1;
                        break;
                    }
                    start_time += *delta as i64;
                }
                if start_offset <= 0 {
                    return TrimVerdict::Edited { unreferenced: None };
                }
                return TrimVerdict::Edited {
                    unreferenced: Some((0, start_offset as u64)),
                };
            }
            return TrimVerdict::Edited { unreferenced: None };
        }
    }

    // Fragmented file: scan the first fragment's composition offsets.
    let moofs = tree.all("moof");
    if let Some(samples) = moofs.first().and_then(|m| trun_samples(m)) {
        let mut sum: i64 = 0;
        let mut start_offset: Option<i64> = None;
        for (i, s) in samples.iter().enumerate() {
            sum += s.sample_composition_time_offset.unwrap_or(0);
            if sum >= adjusted {
                start_offset = Some(i as i64 - 1);
                break;
            }
        }
        return match start_offset {
            Some(o) if o >= 0 => TrimVerdict::Edited {
                unreferenced: Some((0, o as u64)),
            },
            _ => TrimVerdict::Edited { unreferenced: None },
        };
    }

    TrimVerdict::Edited { unreferenced: None }
}

/// Decides edited-vs-unknown from the first slice's picture-order state
/// when the edit list shows no leading trim.
fn classify_by_picture_order(record: &MediaRecord) -> TrimVerdict {
    let Some(stream) = record.video_streams.first() else {
        return TrimVerdict::Unknown;
    };
    match stream {
        VideoStream::H264(s) => {
            let Some((seg, sps)) = s.first_slice_sps() else {
                return TrimVerdict::Unknown;
            };
            match sps.poc.type_number() {
                0 => {
                    if seg.header.pic_order_cnt_lsb.unwrap_or(0) == 0 {
                        TrimVerdict::Unknown
                    } else {
                        TrimVerdict::Edited { unreferenced: None }
                    }
                }
                // Type 1 carries no per-slice order LSB and defines no
                // edited-vs-unknown split; every type-1 stream classifies
                // as unknown, slice type unread.
                1 => TrimVerdict::Unknown,
                _ => {
                    if seg.header.frame_num == 0 {
                        TrimVerdict::Unknown
                    } else {
                        TrimVerdict::Edited { unreferenced: None }
                    }
                }
            }
        }
        VideoStream::H265(s) => match s.slice_segments.first() {
            Some(seg) if seg.header.poc_lsb_or_zero() != 0 => {
                TrimVerdict::Edited { unreferenced: None }
            }
            _ => TrimVerdict::Unknown,
        },
    }
}

fn report_trim(
    record: &MediaRecord,
    verdict: &TrimVerdict,
    output_dir: &Path,
    demuxer: &dyn Demuxer,
    findings: &mut Vec<Finding>,
) {
    match verdict {
        TrimVerdict::Unedited => {
            findings.push(Finding::new(
                "trim.verdict",
                "unedited",
                Severity::Info,
                "no edit list present",
            ));
        }
        TrimVerdict::Unknown => {
            findings.push(Finding::new(
                "trim.verdict",
                "unknown",
                Severity::Info,
                "no leading trim; picture order consistent with a camera original",
            ));
        }
        TrimVerdict::Edited { unreferenced } => {
            findings.push(Finding::new(
                "trim.verdict",
                "edited",
                Severity::Warn,
                match unreferenced {
                    Some(_) => "edit list trims leading frames that remain in the stream",
                    None => "edited file; no extractable unreferenced frames",
                },
            ));
            if let Some((lo, hi)) = unreferenced {
                findings.push(Finding::new(
                    "trim.unreferenced_range",
                    serde_json::json!([lo, hi]),
                    Severity::Warn,
                    "inclusive sample range before the edit-list start",
                ));
                extract_unreferenced(record, *lo, *hi, output_dir, demuxer, findings);
            }
        }
    }
}

fn extract_unreferenced(
    record: &MediaRecord,
    lo: u64,
    hi: u64,
    output_dir: &Path,
    demuxer: &dyn Demuxer,
    findings: &mut Vec<Finding>,
) {
    let codec = match record.video_streams.first() {
        Some(s) => s.codec(),
        None => Codec::H264,
    };
    let basename = record
        .file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stream".to_string());
    let dir = output_dir.join("unreferenced_frame").join(&basename);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(dir = %dir.display(), err = %e, "can't create extraction dir");
        findings.push(Finding::new(
            "trim.extraction",
            "failed",
            Severity::Warn,
            format!("can't create {}: {e}", dir.display()),
        ));
        return;
    }
    let pattern = dir.join("extracted_frame_%04d.png");
    match demuxer.extract_frames(&record.file_path, codec, lo, hi, &pattern) {
        Ok(()) => {
            findings.push(Finding::new(
                "trim.extraction",
                dir.display().to_string(),
                Severity::Warn,
                "unreferenced frames extracted",
            ));
        }
        Err(e) => {
            // Non-fatal: the verdict stands, only the images are missing.
            warn!(file = %record.file_path.display(), err = %e, "frame extraction failed");
            findings.push(Finding::new(
                "trim.extraction",
                "failed",
                Severity::Warn,
                format!("demuxer unavailable or failed: {e}"),
            ));
        }
    }
}

/// The (a, b, c, d) cells of `tkhd.matrix` encode rotation and flips.
fn report_orientation(tree: &BoxTree, findings: &mut Vec<Finding>) {
    let traks = tree.traks();
    let Some(tkhd) = traks.first().and_then(|t| tkhd_of(t)) else {
        return;
    };
    let abcd = [
        tkhd.matrix[0],
        tkhd.matrix[1],
        tkhd.matrix[3],
        tkhd.matrix[4],
    ];
    let severity = if abcd == IDENTITY_ABCD {
        Severity::Info
    } else {
        Severity::Warn
    };
    findings.push(Finding::new(
        "track.matrix",
        serde_json::json!(abcd),
        severity,
        if severity == Severity::Warn {
            "transformation matrix differs from identity (rotation or flip)"
        } else {
            "identity transformation matrix"
        },
    ));
}

fn report_dimensions_and_metadata(tree: &BoxTree, findings: &mut Vec<Finding>) {
    let traks = tree.traks();
    if let Some(tkhd) = traks.first().and_then(|t| tkhd_of(t)) {
        findings.push(Finding::new(
            "track.dimensions",
            serde_json::json!({ "width": tkhd.width, "height": tkhd.height }),
            Severity::Info,
            "presentation size from the track header",
        ));
    }

    for meta in [
        tree.first("moov/meta"),
        tree.first("moov/udta/meta"),
    ]
    .into_iter()
    .flatten()
    {
        report_keyed_metadata(meta, findings);
    }

    if let Some(node) = tree.first("moov/udta/\u{a9}xyz") {
        if let BoxBody::Xyz(geo) = &node.body {
            findings.push(Finding::new(
                "location.geotag",
                geo.value.clone(),
                Severity::Info,
                "ISO 6709 geotag in user data",
            ));
        }
    }
}

fn report_keyed_metadata(meta: &BoxNode, findings: &mut Vec<Finding>) {
    let keys = match meta.child("keys").map(|n| &n.body) {
        Some(BoxBody::Keys(k)) => k,
        _ => return,
    };
    let ilst = match meta.child("ilst").map(|n| &n.body) {
        Some(BoxBody::Ilst(i)) => i,
        _ => return,
    };
    for (i, key) in keys.entries.iter().enumerate() {
        let Some(entry) = ilst.entries.get(i) else {
            continue;
        };
        let Some(value) = entry.values.first().and_then(|v| v.as_text()) else {
            continue;
        };
        findings.push(Finding::new(
            &format!("metadata.{key}"),
            value,
            Severity::Low,
            "container key/value metadata",
        ));
    }
}

fn elst_of<'t>(trak: &'t BoxNode) -> Option<&'t crate::mp4::Elst> {
    match trak.find("edts/elst").map(|n| &n.body) {
        Some(BoxBody::Elst(e)) => Some(e),
        _ => None,
    }
}

fn tkhd_of<'t>(trak: &'t BoxNode) -> Option<&'t crate::mp4::Tkhd> {
    match trak.child("tkhd").map(|n| &n.body) {
        Some(BoxBody::Tkhd(t)) => Some(t),
        _ => None,
    }
}

fn stts_of<'t>(trak: &'t BoxNode) -> Option<&'t crate::mp4::Stts> {
    match trak.find("mdia/minf/stbl/stts").map(|n| &n.body) {
        Some(BoxBody::Stts(s)) => Some(s),
        _ => None,
    }
}

fn first_ctts_offset(trak: &BoxNode) -> Option<i64> {
    match trak.find("mdia/minf/stbl/ctts").map(|n| &n.body) {
        Some(BoxBody::Ctts(c)) => c.entries.first().map(|e| e.sample_offset),
        _ => None,
    }
}

fn trun_samples<'t>(moof: &'t BoxNode) -> Option<&'t [crate::mp4::TrunSample]> {
    match moof.find("traf/trun").map(|n| &n.body) {
        Some(BoxBody::Trun(t)) => Some(&t.samples),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::testing::{Call, FakeDemuxer};
    use crate::mp4::tests::{full_box, make_box};
    use crate::record::MediaRecord;
    use byteorder::{BigEndian, WriteBytesExt};
    use std::path::PathBuf;

    fn elst_box(entries: &[(u32, u32)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(entries.len() as u32).unwrap();
        for (duration, media_time) in entries {
            body.write_u32::<BigEndian>(*duration).unwrap();
            body.write_u32::<BigEndian>(*media_time).unwrap();
            body.write_u16::<BigEndian>(1).unwrap();
            body.write_u16::<BigEndian>(0).unwrap();
        }
        full_box(b"elst", 0, 0, &body)
    }

    fn stts_box(entries: &[(u32, u32)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(entries.len() as u32).unwrap();
        for (count, delta) in entries {
            body.write_u32::<BigEndian>(*count).unwrap();
            body.write_u32::<BigEndian>(*delta).unwrap();
        }
        full_box(b"stts", 0, 0, &body)
    }

    fn movie(elst: Option<Vec<u8>>, stts: Option<Vec<u8>>, moof_ctos: Option<&[u32]>) -> BoxTree {
        let mut stbl_children = Vec::new();
        if let Some(s) = stts {
            stbl_children.extend_from_slice(&s);
        }
        let stbl = make_box(b"stbl", &stbl_children);
        let minf = make_box(b"minf", &stbl);
        let mdia = make_box(b"mdia", &minf);
        let mut trak_children = Vec::new();
        if let Some(e) = elst {
            trak_children.extend_from_slice(&make_box(b"edts", &e));
        }
        trak_children.extend_from_slice(&mdia);
        let trak = make_box(b"trak", &trak_children);
        let moov = make_box(b"moov", &trak);

        let mut file = moov;
        if let Some(ctos) = moof_ctos {
            let mut trun_body = Vec::new();
            trun_body.write_u32::<BigEndian>(ctos.len() as u32).unwrap();
            for cto in ctos {
                trun_body.write_u32::<BigEndian>(*cto).unwrap();
            }
            let trun = full_box(b"trun", 0, 0x800, &trun_body);
            let traf = make_box(b"traf", &trun);
            let moof = make_box(b"moof", &traf);
            file.extend_from_slice(&moof);
        }
        crate::mp4::parse(&file)
    }

    fn h264_record_with_poc_lsb(tree: BoxTree, poc_lsb: u32) -> MediaRecord {
        use crate::testutil::BitWriter;
        let mut sps = vec![0x67];
        {
            let mut w = BitWriter::new();
            w.put_bits(66, 8);
            w.put_bits(0xc0, 8);
            w.put_bits(30, 8);
            w.put_ue(0);
            w.put_ue(0);
            w.put_ue(0); // pic_order_cnt_type 0
            w.put_ue(0);
            w.put_ue(1);
            w.put_bit(false);
            w.put_ue(39);
            w.put_ue(29);
            w.put_bit(true);
            w.put_bit(true);
            w.put_bit(false);
            w.put_bit(false);
            w.put_trailing_bits();
            sps.extend(w.finish());
        }
        let mut pps = vec![0x68];
        {
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
            pps.extend(w.finish());
        }
        let mut slice = vec![0x65];
        {
            let mut w = BitWriter::new();
            w.put_ue(0);
            w.put_ue(7);
            w.put_ue(0);
            w.put_bits(0, 4); // frame_num
            w.put_ue(0); // idr_pic_id
            w.put_bits(poc_lsb as u64, 4);
            w.put_bit(false);
            w.put_bit(false);
            w.put_se(0);
            w.put_trailing_bits();
            slice.extend(w.finish());
        }
        let mut es = Vec::new();
        for unit in [&sps, &pps, &slice] {
            es.extend_from_slice(&[0, 0, 0, 1]);
            es.extend_from_slice(unit);
        }
        let stream = crate::h264::parse_stream(&es, &[], &[]);
        assert_eq!(stream.slice_segments.len(), 1, "{:?}", stream.warnings);
        MediaRecord {
            file_path: PathBuf::from("video.mp4"),
            container: Some(tree),
            video_streams: vec![crate::record::VideoStream::H264(stream)],
            audio_streams: Vec::new(),
        }
    }

    fn empty_h264_record(tree: BoxTree) -> MediaRecord {
        MediaRecord {
            file_path: PathBuf::from("video.mp4"),
            container: Some(tree),
            video_streams: vec![crate::record::VideoStream::H264(Default::default())],
            audio_streams: Vec::new(),
        }
    }

    #[test]
    fn no_trim_zero_poc_is_unknown() {
        // elst = [{media_time=0, duration=T}], no ctts, first slice
        // pic_order_cnt_lsb == 0.
        let tree = movie(Some(elst_box(&[(9000, 0)])), Some(stts_box(&[(30, 100)])), None);
        let record = h264_record_with_poc_lsb(tree, 0);
        let tree = record.container.as_ref().unwrap();
        assert_eq!(detect_trim(&record, tree), TrimVerdict::Unknown);
    }

    #[test]
    fn no_trim_nonzero_poc_is_edited() {
        let tree = movie(Some(elst_box(&[(9000, 0)])), Some(stts_box(&[(30, 100)])), None);
        let record = h264_record_with_poc_lsb(tree, 4);
        let tree = record.container.as_ref().unwrap();
        assert_eq!(
            detect_trim(&record, tree),
            TrimVerdict::Edited { unreferenced: None }
        );
    }

    #[test]
    fn apple_trim_with_unreferenced_range() {
        // elst = [{empty edit}, {media_time=1200}], stts = 30 x delta 100.
        // The prefix sum reaches 1200 at sample 12: range [0, 11].
        let tree = movie(
            Some(elst_box(&[(500, 0xffff_ffff), (9000, 1200)])),
            Some(stts_box(&[(30, 100)])),
            None,
        );
        let record = empty_h264_record(tree);
        let tree = record.container.as_ref().unwrap();
        assert_eq!(
            detect_trim(&record, tree),
            TrimVerdict::Edited {
                unreferenced: Some((0, 11))
            }
        );
    }

    #[test]
    fn fragmented_lead_in() {
        // No stts entries; first moof trun carries composition offsets of
        // 200 each; media_time 500 -> range [0, 1].
        let tree = movie(
            Some(elst_box(&[(9000, 500)])),
            Some(stts_box(&[])),
            Some(&[200, 200, 200, 200]),
        );
        let record = empty_h264_record(tree);
        let tree = record.container.as_ref().unwrap();
        assert_eq!(
            detect_trim(&record, tree),
            TrimVerdict::Edited {
                unreferenced: Some((0, 1))
            }
        );
    }

    #[test]
    fn no_edit_list_is_unedited() {
        let tree = movie(None, Some(stts_box(&[(30, 100)])), None);
        let record = empty_h264_record(tree);
        let tree = record.container.as_ref().unwrap();
        assert_eq!(detect_trim(&record, tree), TrimVerdict::Unedited);
    }

    #[test]
    fn trim_smaller_than_first_delta() {
        // media_time 50 < first delta 100: edited, nothing to extract.
        let tree = movie(Some(elst_box(&[(9000, 50)])), Some(stts_box(&[(30, 100)])), None);
        let record = empty_h264_record(tree);
        let tree = record.container.as_ref().unwrap();
        assert_eq!(
            detect_trim(&record, tree),
            TrimVerdict::Edited { unreferenced: None }
        );
    }

    #[test]
    fn extraction_invokes_demuxer_with_range() {
        base::tracing_setup::install_for_tests();
        let tree = movie(
            Some(elst_box(&[(500, 0xffff_ffff), (9000, 1200)])),
            Some(stts_box(&[(30, 100)])),
            None,
        );
        let record = empty_h264_record(tree);
        let out = tempfile::tempdir().unwrap();
        let demuxer = FakeDemuxer::with_stream(Vec::new());
        let findings = analyze(&record, out.path(), &demuxer);

        let calls = demuxer.calls.borrow();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::ExtractFrames { lo, hi, pattern } => {
                assert_eq!((*lo, *hi), (0, 11));
                let p = pattern.to_string_lossy();
                assert!(p.contains("unreferenced_frame"));
                assert!(p.contains("video.mp4"));
                assert!(p.ends_with("extracted_frame_%04d.png"));
            }
            other => panic!("wrong call: {other:?}"),
        }
        assert!(findings
            .iter()
            .any(|f| f.item == "trim.verdict" && f.value == "edited"));
        assert!(findings.iter().any(|f| f.item == "trim.unreferenced_range"));
    }

    #[test]
    fn demuxer_failure_keeps_other_findings() {
        let tree = movie(
            Some(elst_box(&[(500, 0xffff_ffff), (9000, 1200)])),
            Some(stts_box(&[(30, 100)])),
            None,
        );
        let record = empty_h264_record(tree);
        let out = tempfile::tempdir().unwrap();
        let demuxer = FakeDemuxer::failing();
        let findings = analyze(&record, out.path(), &demuxer);
        assert!(findings
            .iter()
            .any(|f| f.item == "trim.verdict" && f.value == "edited"));
        assert!(findings
            .iter()
            .any(|f| f.item == "trim.extraction" && f.value == "failed"));
    }

    #[test]
    fn orientation_and_dimensions() {
        // tkhd with a 90-degree rotation matrix and 1920x1080.
        let mut body = Vec::new();
        body.extend_from_slice(&[0; 8]); // creation + modification
        body.write_u32::<BigEndian>(1).unwrap(); // track_id
        body.extend_from_slice(&[0; 4]); // reserved
        body.write_u32::<BigEndian>(9000).unwrap(); // duration
        body.extend_from_slice(&[0; 8]); // reserved
        body.write_u16::<BigEndian>(0).unwrap(); // layer
        body.write_u16::<BigEndian>(0).unwrap(); // alternate_group
        body.write_u16::<BigEndian>(0).unwrap(); // volume
        body.write_u16::<BigEndian>(0).unwrap(); // reserved
        // 90-degree rotation: a=0, b=1, c=-1, d=0.
        for v in [
            0i32,
            0x0001_0000,
            0,
            -0x0001_0000,
            0,
            0,
            0,
            0,
            0x4000_0000,
        ] {
            body.write_i32::<BigEndian>(v).unwrap();
        }
        body.write_u32::<BigEndian>(1920 << 16).unwrap();
        body.write_u32::<BigEndian>(1080 << 16).unwrap();
        let tkhd = full_box(b"tkhd", 0, 3, &body);
        let trak = make_box(b"trak", &tkhd);
        let moov = make_box(b"moov", &trak);
        let tree = crate::mp4::parse(&moov);

        let record = empty_h264_record(tree);
        let out = tempfile::tempdir().unwrap();
        let demuxer = FakeDemuxer::with_stream(Vec::new());
        let findings = analyze(&record, out.path(), &demuxer);

        let matrix = findings
            .iter()
            .find(|f| f.item == "track.matrix")
            .expect("matrix finding");
        assert_eq!(matrix.severity, Severity::Warn);
        assert_eq!(
            matrix.value,
            serde_json::json!([0, 0x0001_0000, -0x0001_0000, 0])
        );
        let dims = findings
            .iter()
            .find(|f| f.item == "track.dimensions")
            .expect("dimensions finding");
        assert_eq!(dims.value["width"], 1920.0);
        assert_eq!(dims.value["height"], 1080.0);
    }

    #[test]
    fn geotag_and_apple_metadata() {
        // moov/udta with (c)xyz geotag.
        let mut xyz_body = Vec::new();
        let text = b"+37.3349-122.0090/";
        xyz_body.write_u16::<BigEndian>(text.len() as u16).unwrap();
        xyz_body.write_u16::<BigEndian>(0x15c7).unwrap();
        xyz_body.extend_from_slice(text);
        let xyz = make_box(b"\xa9xyz", &xyz_body);
        let udta = make_box(b"udta", &xyz);
        let moov = make_box(b"moov", &udta);
        let tree = crate::mp4::parse(&moov);

        let record = empty_h264_record(tree);
        let out = tempfile::tempdir().unwrap();
        let demuxer = FakeDemuxer::with_stream(Vec::new());
        let findings = analyze(&record, out.path(), &demuxer);
        let geo = findings
            .iter()
            .find(|f| f.item == "location.geotag")
            .expect("geotag finding");
        assert_eq!(geo.value, "+37.3349-122.0090/");
    }
}
