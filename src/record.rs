// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The per-file parsed record: the root of everything the parse pipeline
//! produces and the exporters consume.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Video codecs the bitstream layer understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Codec {
    #[serde(rename = "H.264")]
    H264,
    #[serde(rename = "H.265")]
    H265,
}

impl Codec {
    /// The codec name the external demuxer expects (`-c:v copy` output
    /// extension).
    pub fn demux_name(self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Codec::H264 => "H.264",
            Codec::H265 => "H.265",
        })
    }
}

/// Serializes byte blobs as base64 strings (JSON has no binary type).
pub mod b64 {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::encode(bytes))
    }

    pub fn serialize_opt<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serialize(b, s),
            None => s.serialize_none(),
        }
    }
}

/// Root of the per-file output.
#[derive(Debug, Serialize)]
pub struct MediaRecord {
    pub file_path: PathBuf,
    /// `None` for raw elementary streams (`.h264` / `.h265`), which have no
    /// container at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<crate::mp4::BoxTree>,
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
}

/// One parsed video elementary stream. The codec tag selects which syntax
/// record is attached.
#[derive(Debug, Serialize)]
#[serde(tag = "codec")]
pub enum VideoStream {
    #[serde(rename = "H.264")]
    H264(crate::h264::Stream),
    #[serde(rename = "H.265")]
    H265(crate::h265::Stream),
}

impl VideoStream {
    pub fn codec(&self) -> Codec {
        match self {
            VideoStream::H264(_) => Codec::H264,
            VideoStream::H265(_) => Codec::H265,
        }
    }
}

/// Audio is a collaborator surface: the codec is identified from the sample
/// description and its decoder configuration kept verbatim, but the
/// bitstream itself is not parsed.
#[derive(Debug, Serialize)]
pub struct AudioStream {
    pub codec: String,
    #[serde(serialize_with = "b64::serialize")]
    pub config: Vec<u8>,
}
