// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mode drivers and the directory walking they share.

use base::{bail_t, Error, ErrorKind, ResultExt};
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod carve;
pub mod parse;

/// Extensions routed to the video/container pipeline (case-insensitive).
pub const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "mkv", "avi", "mov", "heic", "h264", "h265", "m4a", "aac", "3gp",
];

/// Extensions routed to the image pipeline (a collaborator surface).
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "dng", "tiff", "png", "gif", "webp"];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

pub fn classify(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

/// Recursively walks `input`, returning the media files it holds, split by
/// pipeline, in a stable order.
pub fn walk_input(input: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), Error> {
    if !input.is_dir() {
        bail_t!(NotFound, "input directory {} does not exist", input.display());
    }
    let mut videos = Vec::new();
    let mut images = Vec::new();
    for entry in walkdir::WalkDir::new(input).sort_by_file_name() {
        let entry = entry.err_kind(ErrorKind::Io)?;
        if !entry.file_type().is_file() {
            continue;
        }
        match classify(entry.path()) {
            Some(MediaKind::Video) => videos.push(entry.into_path()),
            Some(MediaKind::Image) => images.push(entry.into_path()),
            None => debug!(path = %entry.path().display(), "skipping unsupported extension"),
        }
    }
    Ok((videos, images))
}

/// First bytes of the file, logged while routing to catch files whose
/// extension lies about their format.
pub fn log_signature(path: &Path) {
    let mut sig = [0u8; 8];
    if let Ok(mut f) = std::fs::File::open(path) {
        use std::io::Read;
        if f.read(&mut sig).is_ok() {
            debug!(path = %path.display(), signature = ?sig, "file signature");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_extension_case_insensitive() {
        assert_eq!(classify(Path::new("a/b.MP4")), Some(MediaKind::Video));
        assert_eq!(classify(Path::new("x.heic")), Some(MediaKind::Video));
        assert_eq!(classify(Path::new("x.h265")), Some(MediaKind::Video));
        assert_eq!(classify(Path::new("x.JPEG")), Some(MediaKind::Image));
        assert_eq!(classify(Path::new("x.webp")), Some(MediaKind::Image));
        assert_eq!(classify(Path::new("x.txt")), None);
        assert_eq!(classify(Path::new("noext")), None);
    }

    #[test]
    fn walk_splits_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(sub.join("b.jpg"), b"x").unwrap();
        std::fs::write(sub.join("c.bin"), b"x").unwrap();
        let (videos, images) = walk_input(dir.path()).unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(images.len(), 1);
        assert!(videos[0].ends_with("a.mp4"));
    }

    #[test]
    fn missing_input_dir_is_not_found() {
        let e = walk_input(Path::new("/nonexistent/framesift-input")).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::NotFound);
    }
}
