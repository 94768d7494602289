// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Slack-carving mode.
//!
//! Carving itself lives outside this tool; this mode only walks the input
//! directory and inventories the candidate files so a carver can pick
//! them up.

use base::{Error, ErrorKind, ResultExt};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub input: PathBuf,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let (videos, images) = super::walk_input(&args.input)?;
    for path in videos.iter().chain(images.iter()) {
        let len = std::fs::metadata(path).err_kind(ErrorKind::Io)?.len();
        super::log_signature(path);
        info!(file = %path.display(), bytes = len, "carve candidate");
    }
    info!(
        videos = videos.len(),
        images = images.len(),
        "slack carving inventory complete"
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventories_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"xx").unwrap();
        let rv = run(Args {
            input: dir.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(rv, 0);
    }
}
