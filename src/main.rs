// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! framesift: forensic multimedia parser and editing detector.
//!
//! Reconstructs the syntactic structure of media files down to the codec
//! bitstream syntax elements and runs forensic inferences on the result.

use base::Error;
use bpaf::Bpaf;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

mod analyze;
mod bind;
mod bits;
mod cmds;
mod demux;
mod export;
mod h264;
mod h265;
mod mp4;
mod nal;
mod record;
#[cfg(test)]
mod testutil;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// framesift: forensic multimedia parser and editing detector.
#[derive(Bpaf, Debug)]
#[bpaf(options, version(VERSION))]
struct Args {
    /// Parse mode: reconstruct the structure of every media file.
    #[bpaf(short('p'), long("parse"))]
    parse: bool,

    /// Slack-carving mode: inventory candidate files only.
    #[bpaf(long("slack_carver"), long("sc"))]
    slack_carver: bool,

    /// Directory containing the media files; walked recursively.
    #[bpaf(short('i'), long("input"), argument("DIR"))]
    input: Option<PathBuf>,

    /// Output directory (created if missing).
    #[bpaf(short('o'), long("output"), argument("DIR"))]
    output: Option<PathBuf>,

    /// Export parsed data as csv or json.
    #[bpaf(short('e'), long("export"), argument("FORMAT"))]
    export: Option<export::ExportFormat>,

    /// Detect tampered videos (Apple Photos trim lineage).
    #[bpaf(short('a'), long("apple"))]
    apple: bool,
}

impl Args {
    fn run(self) -> Result<i32, Error> {
        let input = match self.input {
            Some(i) => i,
            None => {
                base::bail_t!(InvalidArgument, "--input is required");
            }
        };
        if self.parse {
            let output = self.output.unwrap_or_else(|| PathBuf::from("."));
            cmds::parse::run(cmds::parse::Args {
                input,
                output,
                export: self.export,
                apple: self.apple,
            })
        } else if self.slack_carver {
            cmds::carve::run(cmds::carve::Args { input })
        } else {
            base::bail_t!(InvalidArgument, "choose a mode: --parse or --slack_carver");
        }
    }
}

fn main() {
    base::tracing_setup::install();

    // Get the program name from the OS (e.g. if invoked as
    // `target/debug/framesift`: `framesift`), falling back to the crate
    // name if conversion to a path/UTF-8 string fails.
    let progname = std::env::args_os().next().map(PathBuf::from);
    let progname = progname
        .as_deref()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str)
        .unwrap_or(env!("CARGO_PKG_NAME"));

    let args = match args()
        .fallback_to_usage()
        .run_inner(bpaf::Args::current_args().set_name(progname))
    {
        Ok(a) => a,
        Err(e) => std::process::exit(e.exit_code()),
    };
    tracing::trace!("parsed command-line arguments: {args:#?}");

    match args.run() {
        Err(e) => {
            error!(err = %e, "exiting due to error");
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(rv) => {
            debug!("exiting with status {}", rv);
            std::process::exit(rv)
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn bpaf_invariants() {
        super::args().check_invariants(false);
    }

    #[test]
    fn mode_is_required() {
        let e = super::Args {
            parse: false,
            slack_carver: false,
            input: Some("/tmp".into()),
            output: None,
            export: None,
            apple: false,
        }
        .run()
        .unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::InvalidArgument);
    }

    #[test]
    fn missing_input_is_invalid() {
        let e = super::Args {
            parse: true,
            slack_carver: false,
            input: None,
            output: None,
            export: None,
            apple: false,
        }
        .run()
        .unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::InvalidArgument);
    }
}
