// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Parse mode: walk the input directory, reconstruct every media file's
//! syntactic structure, optionally export, optionally run the forensic
//! analyzer.

use crate::analyze;
use crate::bind;
use crate::demux::{Demuxer, FfmpegDemuxer};
use crate::export::{self, ExportFormat};
use crate::mp4;
use crate::record::{Codec, MediaRecord};
use base::{bail_t, Error, ErrorKind, ResultExt};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct Args {
    pub input: PathBuf,
    pub output: PathBuf,
    pub export: Option<ExportFormat>,
    pub apple: bool,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let (videos, images) = super::walk_input(&args.input)?;
    info!(
        videos = videos.len(),
        images = images.len(),
        input = %args.input.display(),
        "starting analysis"
    );
    std::fs::create_dir_all(&args.output).err_kind(ErrorKind::Io)?;

    let demuxer = FfmpegDemuxer::locate()?;
    let records = parse_all(&videos, &demuxer);

    if !images.is_empty() {
        // Image-format parsing lives in a separate pipeline.
        info!(count = images.len(), "image files skipped by the video parser");
    }

    if let Some(format) = args.export {
        export::export(&records, format, &args.output)?;
    }

    if args.apple {
        for record in &records {
            analyze::analyze(record, &args.output, &demuxer);
        }
    }

    Ok(0)
}

/// Parses every file, skipping (with an error log) the ones that can't be
/// read or use a container this parser does not speak.
pub fn parse_all(videos: &[PathBuf], demuxer: &dyn Demuxer) -> Vec<MediaRecord> {
    let mut records = Vec::with_capacity(videos.len());
    for path in videos {
        info!(file = %path.display(), "parsing video file");
        super::log_signature(path);
        match parse_file(path, demuxer) {
            Ok(record) => records.push(record),
            Err(e) => error!(file = %path.display(), err = %e, "skipping file"),
        }
    }
    records
}

fn parse_file(path: &Path, demuxer: &dyn Demuxer) -> Result<MediaRecord, Error> {
    let data = std::fs::read(path).err_kind(ErrorKind::Io)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let (container, bound) = match ext.as_str() {
        "h264" => (None, bind::bind_raw(Codec::H264, &data)),
        "h265" => (None, bind::bind_raw(Codec::H265, &data)),
        "mp4" | "mov" | "heic" | "m4a" | "aac" | "3gp" => {
            let tree = mp4::parse(&data);
            for w in &tree.warnings {
                warn!(file = %path.display(), "{}", w);
            }
            let bound = bind::bind_container(path, &data, &tree, demuxer);
            (Some(tree), bound)
        }
        other => {
            bail_t!(Unsupported, "container format .{} is not parsed", other);
        }
    };

    for w in &bound.warnings {
        warn!(file = %path.display(), "{}", w);
    }
    Ok(MediaRecord {
        file_path: path.to_path_buf(),
        container,
        video_streams: bound.video_streams,
        audio_streams: bound.audio_streams,
    })
}
