// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! External demuxer collaborator.
//!
//! Separating the video elementary stream from its container (and turning
//! frames into images) is delegated to an ffmpeg-compatible binary run as
//! a subprocess. The dependency is a trait so the parse and analysis
//! pipelines can be exercised with a test double.

use crate::record::Codec;
use base::{bail_t, Error, ErrorKind, ResultExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

pub trait Demuxer {
    /// Writes the raw Annex B elementary stream of `input`'s video track
    /// and returns its bytes.
    fn demux(&self, input: &Path, codec: Codec) -> Result<Vec<u8>, Error>;

    /// Extracts frames `lo..=hi` (decode order) of `input`'s video stream
    /// as images following `out_pattern` (a printf-style `%04d` pattern).
    fn extract_frames(
        &self,
        input: &Path,
        codec: Codec,
        lo: u64,
        hi: u64,
        out_pattern: &Path,
    ) -> Result<(), Error>;
}

/// Runs the `ffmpeg.exe` binary shipped under `utils/ffmpeg/`.
pub struct FfmpegDemuxer {
    binary: PathBuf,
}

impl FfmpegDemuxer {
    /// Looks for `utils/ffmpeg/ffmpeg.exe` next to the executable, then one
    /// directory up, then falls back to `ffmpeg` on `PATH`.
    pub fn locate() -> Result<FfmpegDemuxer, Error> {
        let exe = std::env::current_exe().err_kind(ErrorKind::Io)?;
        if let Some(dir) = exe.parent() {
            for base in [dir, dir.parent().unwrap_or(dir)] {
                let candidate = base.join("utils").join("ffmpeg").join("ffmpeg.exe");
                if candidate.is_file() {
                    debug!(path = %candidate.display(), "found bundled ffmpeg");
                    return Ok(FfmpegDemuxer { binary: candidate });
                }
            }
        }
        Ok(FfmpegDemuxer {
            binary: PathBuf::from("ffmpeg"),
        })
    }

    pub fn with_binary(binary: PathBuf) -> FfmpegDemuxer {
        FfmpegDemuxer { binary }
    }

    fn run(&self, args: &[&std::ffi::OsStr]) -> Result<(), Error> {
        info!(binary = %self.binary.display(), ?args, "running demuxer");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .err_kind(ErrorKind::Unavailable)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status, "demuxer failed");
            bail_t!(
                Unavailable,
                "demuxer exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

impl Demuxer for FfmpegDemuxer {
    fn demux(&self, input: &Path, codec: Codec) -> Result<Vec<u8>, Error> {
        let dir = tempfile::Builder::new()
            .prefix("framesift-demux")
            .tempdir()
            .err_kind(ErrorKind::Io)?;
        let out = dir.path().join(format!("demux_temp.{}", codec.demux_name()));
        self.run(&[
            "-i".as_ref(),
            input.as_os_str(),
            "-c:v".as_ref(),
            "copy".as_ref(),
            "-an".as_ref(),
            out.as_os_str(),
        ])?;
        std::fs::read(&out).err_kind(ErrorKind::Io)
    }

    fn extract_frames(
        &self,
        input: &Path,
        codec: Codec,
        lo: u64,
        hi: u64,
        out_pattern: &Path,
    ) -> Result<(), Error> {
        // Two steps, like the demux path: strip the container first so the
        // frame indices seen by the select filter are decode-order indices
        // of the elementary stream.
        let dir = tempfile::Builder::new()
            .prefix("framesift-demux")
            .tempdir()
            .err_kind(ErrorKind::Io)?;
        let es = dir.path().join(format!("demux_temp.{}", codec.demux_name()));
        self.run(&[
            "-i".as_ref(),
            input.as_os_str(),
            "-c:v".as_ref(),
            "copy".as_ref(),
            "-an".as_ref(),
            es.as_os_str(),
        ])?;
        let filter = format!("select='between(n,{lo},{hi})'");
        self.run(&[
            "-i".as_ref(),
            es.as_os_str(),
            "-vf".as_ref(),
            filter.as_ref(),
            "-vsync".as_ref(),
            "0".as_ref(),
            out_pattern.as_os_str(),
        ])?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Demux { codec: Codec },
        ExtractFrames { lo: u64, hi: u64, pattern: PathBuf },
    }

    /// Test double that records calls and serves canned bytes.
    pub(crate) struct FakeDemuxer {
        pub stream: Vec<u8>,
        pub fail: bool,
        pub calls: RefCell<Vec<Call>>,
    }

    impl FakeDemuxer {
        pub fn with_stream(stream: Vec<u8>) -> FakeDemuxer {
            FakeDemuxer {
                stream,
                fail: false,
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn failing() -> FakeDemuxer {
            FakeDemuxer {
                stream: Vec::new(),
                fail: true,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Demuxer for FakeDemuxer {
        fn demux(&self, _input: &Path, codec: Codec) -> Result<Vec<u8>, Error> {
            self.calls.borrow_mut().push(Call::Demux { codec });
            if self.fail {
                bail_t!(Unavailable, "fake demuxer configured to fail");
            }
            Ok(self.stream.clone())
        }

        fn extract_frames(
            &self,
            _input: &Path,
            _codec: Codec,
            lo: u64,
            hi: u64,
            out_pattern: &Path,
        ) -> Result<(), Error> {
            self.calls.borrow_mut().push(Call::ExtractFrames {
                lo,
                hi,
                pattern: out_pattern.to_path_buf(),
            });
            if self.fail {
                bail_t!(Unavailable, "fake demuxer configured to fail");
            }
            Ok(())
        }
    }
}
