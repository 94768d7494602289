// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! ISO base media file format (ISO/IEC 14496-12) box walking.
//!
//! Produces a typed box tree: container boxes are descended into, the
//! leaves the forensic pipeline needs are parsed field-by-field, and
//! everything else is kept as raw bytes. The walker is size-resilient:
//! `size == 0` extends to the end of the enclosing bound, `size == 1`
//! carries a 64-bit extended size, and truncation ends iteration cleanly
//! instead of failing the file.

use base::{bail_t, Error};
use serde::{Serialize, Serializer};
use std::fmt;

/// Container types whose body is a plain sequence of child boxes.
const CONTAINERS: [&[u8; 4]; 14] = [
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"dinf", b"edts", b"udta", b"moof", b"traf",
    b"mvex", b"iprp", b"ipco", b"schi",
];

/// Nesting bound; real files stay in single digits.
const MAX_DEPTH: u32 = 32;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub fn as_str(&self) -> String {
        // Latin-1 style mapping keeps Apple's (c)-prefixed types readable.
        self.0.iter().map(|&b| b as char).collect()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FourCc({})", self.as_str())
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str())
    }
}

impl PartialEq<&str> for FourCc {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Byte-level reader over a box body.
struct Buf<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Buf<'a> {
    fn new(data: &'a [u8]) -> Self {
        Buf { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            bail_t!(Truncated, "need {} bytes, have {}", n, self.remaining());
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, Error> {
        Ok(self.u32()? as i32)
    }

    fn fourcc(&mut self) -> Result<FourCc, Error> {
        Ok(FourCc(self.take(4)?.try_into().unwrap()))
    }

    fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.take(n)?;
        Ok(())
    }

    /// Version + flags of a full box.
    fn version_flags(&mut self) -> Result<(u8, u32), Error> {
        let v = self.u32()?;
        Ok(((v >> 24) as u8, v & 0x00ff_ffff))
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BoxNode {
    #[serde(rename = "type")]
    pub box_type: FourCc,
    /// Absolute file offset of the box header.
    pub offset: u64,
    /// Total size including the header.
    pub size: u64,
    pub body: BoxBody,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "box")]
pub enum BoxBody {
    Container { children: Vec<BoxNode> },
    Ftyp(Ftyp),
    Mvhd(Mvhd),
    Tkhd(Tkhd),
    Mdhd(Mdhd),
    Hdlr(Hdlr),
    Elst(Elst),
    Stsd(Stsd),
    Stts(Stts),
    Ctts(Ctts),
    Stss(Stss),
    Stsc(Stsc),
    Stsz(Stsz),
    Stco(Stco),
    Trex(Trex),
    Tfhd(Tfhd),
    Trun(Trun),
    Meta { children: Vec<BoxNode> },
    Keys(Keys),
    Ilst(Ilst),
    Xyz(Geotag),
    Iloc(Iloc),
    Iinf(Iinf),
    /// Payload location only; the bytes stay in the file.
    Mdat { data_offset: u64, data_len: u64 },
    Raw {
        #[serde(serialize_with = "crate::record::b64::serialize")]
        data: Vec<u8>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Ftyp {
    pub major_brand: FourCc,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Mvhd {
    pub version: u8,
    pub timescale: u32,
    pub duration: u64,
    pub rate: i32,
    pub volume: u16,
    pub matrix: [i32; 9],
    pub next_track_id: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct Tkhd {
    pub version: u8,
    pub flags: u32,
    pub track_id: u32,
    pub duration: u64,
    pub layer: u16,
    pub alternate_group: u16,
    pub volume: u16,
    pub matrix: [i32; 9],
    /// 16.16 fixed point, converted.
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Mdhd {
    pub version: u8,
    pub timescale: u32,
    pub duration: u64,
    /// ISO-639-2/T code unpacked from its 5-bit letters.
    pub language: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Hdlr {
    pub handler_type: FourCc,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Elst {
    pub version: u8,
    pub entries: Vec<ElstEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ElstEntry {
    pub segment_duration: u64,
    /// Signed; -1 (`0xFFFFFFFF` in version 0) marks an empty edit.
    pub media_time: i64,
    pub media_rate_integer: u16,
    pub media_rate_fraction: u16,
}

impl ElstEntry {
    pub fn is_empty_edit(&self) -> bool {
        self.media_time == -1
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Stsd {
    pub entries: Vec<StsdEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StsdEntry {
    #[serde(rename = "type")]
    pub format: FourCc,
    pub data_reference_index: u16,
    pub kind: StsdEntryKind,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind")]
pub enum StsdEntryKind {
    Video {
        width: u16,
        height: u16,
        avcc: Option<AvcC>,
        hvcc: Option<HvcC>,
        /// Other extension boxes (pasp, colr, ...), kept raw.
        extensions: Vec<BoxNode>,
    },
    Audio {
        channel_count: u16,
        sample_size: u16,
        sample_rate: u32,
        /// esds / dac3 and friends, kept raw.
        extensions: Vec<BoxNode>,
    },
    Other {
        #[serde(serialize_with = "crate::record::b64::serialize")]
        data: Vec<u8>,
    },
}

/// AVCDecoderConfigurationRecord, ISO/IEC 14496-15 section 5.2.4.1.
#[derive(Clone, Debug, Serialize)]
pub struct AvcC {
    pub configuration_version: u8,
    pub avc_profile_indication: u8,
    pub profile_compatibility: u8,
    pub avc_level_indication: u8,
    pub length_size_minus_one: u8,
    #[serde(serialize_with = "serialize_nal_list")]
    pub sps: Vec<Vec<u8>>,
    #[serde(serialize_with = "serialize_nal_list")]
    pub pps: Vec<Vec<u8>>,
}

/// HEVCDecoderConfigurationRecord, ISO/IEC 14496-15 section 8.3.3.1.
#[derive(Clone, Debug, Serialize)]
pub struct HvcC {
    pub configuration_version: u8,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub length_size_minus_one: u8,
    #[serde(serialize_with = "serialize_nal_list")]
    pub vps: Vec<Vec<u8>>,
    #[serde(serialize_with = "serialize_nal_list")]
    pub sps: Vec<Vec<u8>>,
    #[serde(serialize_with = "serialize_nal_list")]
    pub pps: Vec<Vec<u8>>,
}

fn serialize_nal_list<S: Serializer>(list: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;
    let mut seq = s.serialize_seq(Some(list.len()))?;
    for item in list {
        seq.serialize_element(&base64::encode(item))?;
    }
    seq.end()
}

#[derive(Clone, Debug, Serialize)]
pub struct Stts {
    pub entries: Vec<SttsEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

impl Stts {
    /// Expands the run-length form into one delta per sample.
    pub fn expand(&self) -> Vec<u32> {
        let total: usize = self.entries.iter().map(|e| e.sample_count as usize).sum();
        let mut out = Vec::with_capacity(total.min(1 << 22));
        for e in &self.entries {
            for _ in 0..e.sample_count.min(1 << 22) {
                out.push(e.sample_delta);
            }
        }
        out
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Ctts {
    pub entries: Vec<CttsEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CttsEntry {
    pub sample_count: u32,
    pub sample_offset: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Stss {
    pub sample_numbers: Vec<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Stsc {
    pub entries: Vec<StscEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct Stsz {
    pub sample_size: u32,
    pub sample_count: u32,
    pub sizes: Vec<u32>,
}

impl Stsz {
    pub fn total_bytes(&self) -> u64 {
        if self.sample_size != 0 {
            self.sample_size as u64 * self.sample_count as u64
        } else {
            self.sizes.iter().map(|&s| s as u64).sum()
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Stco {
    pub offsets: Vec<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Trex {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct Tfhd {
    pub flags: u32,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Trun {
    pub version: u8,
    pub flags: u32,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrunSample>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrunSample {
    pub sample_duration: Option<u32>,
    pub sample_size: Option<u32>,
    pub sample_flags: Option<u32>,
    pub sample_composition_time_offset: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Keys {
    pub entries: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Ilst {
    pub entries: Vec<IlstEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IlstEntry {
    pub name: FourCc,
    pub values: Vec<IlstValue>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum IlstValue {
    Text(String),
    Binary {
        type_indicator: u32,
        #[serde(serialize_with = "crate::record::b64::serialize")]
        data: Vec<u8>,
    },
}

impl IlstValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            IlstValue::Text(s) => Some(s),
            IlstValue::Binary { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Geotag {
    pub value: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Iloc {
    pub items: Vec<IlocItem>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IlocItem {
    pub item_id: u32,
    pub construction_method: u8,
    pub data_reference_index: u16,
    pub base_offset: u64,
    pub extents: Vec<IlocExtent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IlocExtent {
    pub extent_offset: u64,
    pub extent_length: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Iinf {
    pub entries: Vec<ItemInfoEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemInfoEntry {
    pub item_id: u32,
    pub item_type: Option<FourCc>,
    pub item_name: String,
}

/// The parsed box tree of one file.
#[derive(Clone, Debug, Serialize)]
pub struct BoxTree {
    pub children: Vec<BoxNode>,
    pub warnings: Vec<String>,
}

impl BoxTree {
    /// First node matching a `/`-separated path from the root, e.g.
    /// `"moov/trak/mdia/hdlr"`.
    pub fn first(&self, path: &str) -> Option<&BoxNode> {
        let mut parts = path.split('/');
        let head = parts.next()?;
        let mut node = self.children.iter().find(|n| n.box_type == head)?;
        for part in parts {
            node = node.child(part)?;
        }
        Some(node)
    }

    /// All top-level nodes of a type, in on-disk order.
    pub fn all(&self, ty: &str) -> Vec<&BoxNode> {
        self.children.iter().filter(|n| n.box_type == ty).collect()
    }

    /// The `trak` boxes of the movie, whether one or many.
    pub fn traks(&self) -> Vec<&BoxNode> {
        match self.first("moov") {
            Some(moov) => moov.children_of_type("trak"),
            None => Vec::new(),
        }
    }
}

impl BoxNode {
    pub fn children(&self) -> &[BoxNode] {
        match &self.body {
            BoxBody::Container { children } | BoxBody::Meta { children } => children,
            _ => &[],
        }
    }

    pub fn child(&self, ty: &str) -> Option<&BoxNode> {
        self.children().iter().find(|n| n.box_type == ty)
    }

    pub fn children_of_type(&self, ty: &str) -> Vec<&BoxNode> {
        self.children().iter().filter(|n| n.box_type == ty).collect()
    }

    /// Descends a `/`-separated path below this node.
    pub fn find(&self, path: &str) -> Option<&BoxNode> {
        let mut node = self;
        for part in path.split('/') {
            node = node.child(part)?;
        }
        Some(node)
    }
}

/// Walks the complete box tree of `data`.
pub fn parse(data: &[u8]) -> BoxTree {
    let mut warnings = Vec::new();
    let children = walk(data, 0, 0, &mut warnings);
    BoxTree { children, warnings }
}

fn walk(data: &[u8], base_offset: u64, depth: u32, warnings: &mut Vec<String>) -> Vec<BoxNode> {
    let mut out = Vec::new();
    if depth > MAX_DEPTH {
        warnings.push(format!("box nesting deeper than {MAX_DEPTH}, not descending"));
        return out;
    }
    let mut pos = 0usize;
    while pos + 8 <= data.len() {
        let size32 = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap());
        let box_type = FourCc(data[pos + 4..pos + 8].try_into().unwrap());
        let (size, header_len) = match size32 {
            0 => ((data.len() - pos) as u64, 8usize),
            1 => {
                if pos + 16 > data.len() {
                    warnings.push(format!(
                        "truncated 64-bit box header at offset {}",
                        base_offset + pos as u64
                    ));
                    break;
                }
                (
                    u64::from_be_bytes(data[pos + 8..pos + 16].try_into().unwrap()),
                    16usize,
                )
            }
            s => (s as u64, 8usize),
        };
        if size < header_len as u64 {
            warnings.push(format!(
                "box {} at offset {} declares size {} smaller than its header",
                box_type,
                base_offset + pos as u64,
                size
            ));
            break;
        }
        let end = (pos as u64 + size).min(data.len() as u64) as usize;
        if pos as u64 + size > data.len() as u64 {
            warnings.push(format!(
                "box {} at offset {} extends past the end of its container",
                box_type,
                base_offset + pos as u64
            ));
        }
        let body_bytes = &data[pos + header_len..end];
        let body_offset = base_offset + (pos + header_len) as u64;
        let body = parse_body(box_type, body_bytes, body_offset, depth, warnings);
        out.push(BoxNode {
            box_type,
            offset: base_offset + pos as u64,
            size,
            body,
        });
        pos = end;
    }
    if pos < data.len() {
        warnings.push(format!(
            "{} trailing bytes after last box at offset {}",
            data.len() - pos,
            base_offset + pos as u64
        ));
    }
    out
}

fn parse_body(
    box_type: FourCc,
    body: &[u8],
    body_offset: u64,
    depth: u32,
    warnings: &mut Vec<String>,
) -> BoxBody {
    if CONTAINERS.contains(&&box_type.0) {
        return BoxBody::Container {
            children: walk(body, body_offset, depth + 1, warnings),
        };
    }
    let result: Result<BoxBody, Error> = match &box_type.0 {
        b"ftyp" => parse_ftyp(body),
        b"mvhd" => parse_mvhd(body),
        b"tkhd" => parse_tkhd(body),
        b"mdhd" => parse_mdhd(body),
        b"hdlr" => parse_hdlr(body),
        b"elst" => parse_elst(body),
        b"stsd" => parse_stsd(body, body_offset, depth, warnings),
        b"stts" => parse_stts(body),
        b"ctts" => parse_ctts(body),
        b"stss" => parse_stss(body),
        b"stsc" => parse_stsc(body),
        b"stsz" => parse_stsz(body),
        b"stco" => parse_stco(body, false),
        b"co64" => parse_stco(body, true),
        b"trex" => parse_trex(body),
        b"tfhd" => parse_tfhd(body),
        b"trun" => parse_trun(body),
        b"meta" => parse_meta(body, body_offset, depth, warnings),
        // A full box holding reference boxes; skip version + flags.
        b"iref" if body.len() >= 4 => Ok(BoxBody::Container {
            children: walk(&body[4..], body_offset + 4, depth + 1, warnings),
        }),
        b"keys" => parse_keys(body),
        b"ilst" => parse_ilst(body, warnings),
        b"\xa9xyz" => parse_xyz(body),
        b"iloc" => parse_iloc(body),
        b"iinf" => parse_iinf(body, warnings),
        b"mdat" => Ok(BoxBody::Mdat {
            data_offset: body_offset,
            data_len: body.len() as u64,
        }),
        _ => Ok(BoxBody::Raw {
            data: body.to_vec(),
        }),
    };
    match result {
        Ok(b) => b,
        Err(e) => {
            warnings.push(format!("bad {} box at offset {}: {}", box_type, body_offset, e));
            BoxBody::Raw {
                data: body.to_vec(),
            }
        }
    }
}

fn parse_ftyp(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let major_brand = b.fourcc()?;
    let minor_version = b.u32()?;
    let mut compatible_brands = Vec::new();
    while b.remaining() >= 4 {
        compatible_brands.push(b.fourcc()?);
    }
    Ok(BoxBody::Ftyp(Ftyp {
        major_brand,
        minor_version,
        compatible_brands,
    }))
}

fn parse_mvhd(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (version, _flags) = b.version_flags()?;
    let (timescale, duration) = if version == 1 {
        b.skip(16)?; // creation + modification
        let ts = b.u32()?;
        (ts, b.u64()?)
    } else {
        b.skip(8)?;
        let ts = b.u32()?;
        (ts, b.u32()? as u64)
    };
    let rate = b.i32()?;
    let volume = b.u16()?;
    b.skip(10)?; // reserved
    let mut matrix = [0i32; 9];
    for m in matrix.iter_mut() {
        *m = b.i32()?;
    }
    b.skip(24)?; // pre_defined
    let next_track_id = b.u32()?;
    Ok(BoxBody::Mvhd(Mvhd {
        version,
        timescale,
        duration,
        rate,
        volume,
        matrix,
        next_track_id,
    }))
}

fn parse_tkhd(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (version, flags) = b.version_flags()?;
    let (track_id, duration) = if version == 1 {
        b.skip(16)?;
        let id = b.u32()?;
        b.skip(4)?; // reserved
        (id, b.u64()?)
    } else {
        b.skip(8)?;
        let id = b.u32()?;
        b.skip(4)?;
        (id, b.u32()? as u64)
    };
    b.skip(8)?; // reserved
    let layer = b.u16()?;
    let alternate_group = b.u16()?;
    let volume = b.u16()?;
    b.skip(2)?; // reserved
    let mut matrix = [0i32; 9];
    for m in matrix.iter_mut() {
        *m = b.i32()?;
    }
    let width = b.u32()? as f64 / 65536.0;
    let height = b.u32()? as f64 / 65536.0;
    Ok(BoxBody::Tkhd(Tkhd {
        version,
        flags,
        track_id,
        duration,
        layer,
        alternate_group,
        volume,
        matrix,
        width,
        height,
    }))
}

fn parse_mdhd(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (version, _flags) = b.version_flags()?;
    let (timescale, duration) = if version == 1 {
        b.skip(16)?;
        let ts = b.u32()?;
        (ts, b.u64()?)
    } else {
        b.skip(8)?;
        let ts = b.u32()?;
        (ts, b.u32()? as u64)
    };
    let packed = b.u16()?;
    let language = [
        (((packed >> 10) & 0x1f) as u8 + 0x60) as char,
        (((packed >> 5) & 0x1f) as u8 + 0x60) as char,
        ((packed & 0x1f) as u8 + 0x60) as char,
    ]
    .iter()
    .collect();
    Ok(BoxBody::Mdhd(Mdhd {
        version,
        timescale,
        duration,
        language,
    }))
}

fn parse_hdlr(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    b.skip(4)?; // pre_defined
    let handler_type = b.fourcc()?;
    b.skip(12)?; // reserved
    let name_bytes = b.rest();
    let name = String::from_utf8_lossy(name_bytes)
        .trim_end_matches('\0')
        .to_string();
    Ok(BoxBody::Hdlr(Hdlr { handler_type, name }))
}

fn parse_elst(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (version, _flags) = b.version_flags()?;
    let entry_count = b.u32()?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        if b.remaining() == 0 {
            break;
        }
        let (segment_duration, media_time) = if version == 1 {
            (b.u64()?, b.u64()? as i64)
        } else {
            (b.u32()? as u64, b.i32()? as i64)
        };
        entries.push(ElstEntry {
            segment_duration,
            media_time,
            media_rate_integer: b.u16()?,
            media_rate_fraction: b.u16()?,
        });
    }
    Ok(BoxBody::Elst(Elst { version, entries }))
}

const VIDEO_FORMATS: [&[u8; 4]; 6] = [b"avc1", b"avc3", b"hvc1", b"hev1", b"mp4v", b"encv"];
const AUDIO_FORMATS: [&[u8; 4]; 4] = [b"mp4a", b"ac-3", b"ec-3", b"enca"];

fn parse_stsd(
    body: &[u8],
    body_offset: u64,
    depth: u32,
    warnings: &mut Vec<String>,
) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    let entry_count = b.u32()?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        if b.remaining() < 8 {
            break;
        }
        let entry_start = b.pos;
        let size = b.u32()? as usize;
        let format = b.fourcc()?;
        if size < 16 || entry_start + size > body.len() {
            bail_t!(Malformed, "sample entry {} of size {}", format, size);
        }
        let entry_body = &body[entry_start + 8..entry_start + size];
        let mut e = Buf::new(entry_body);
        e.skip(6)?; // reserved
        let data_reference_index = e.u16()?;
        let kind = if VIDEO_FORMATS.contains(&&format.0) {
            e.skip(16)?; // pre_defined + reserved
            let width = e.u16()?;
            let height = e.u16()?;
            e.skip(50)?; // resolutions, frame count, compressor name, depth
            let ext_bytes = e.rest();
            let ext_offset = body_offset + (entry_start + 8 + 8 + 70) as u64;
            let boxes = walk(ext_bytes, ext_offset, depth + 1, warnings);
            let mut avcc = None;
            let mut hvcc = None;
            let mut extensions = Vec::new();
            for node in boxes {
                match &node.body {
                    BoxBody::Raw { data } if node.box_type == "avcC" => {
                        match parse_avcc(data) {
                            Ok(a) => avcc = Some(a),
                            Err(err) => warnings.push(format!("bad avcC: {err}")),
                        }
                    }
                    BoxBody::Raw { data } if node.box_type == "hvcC" => {
                        match parse_hvcc(data) {
                            Ok(h) => hvcc = Some(h),
                            Err(err) => warnings.push(format!("bad hvcC: {err}")),
                        }
                    }
                    _ => extensions.push(node),
                }
            }
            StsdEntryKind::Video {
                width,
                height,
                avcc,
                hvcc,
                extensions,
            }
        } else if AUDIO_FORMATS.contains(&&format.0) {
            e.skip(8)?; // reserved
            let channel_count = e.u16()?;
            let sample_size = e.u16()?;
            e.skip(4)?; // pre_defined + reserved
            let sample_rate = e.u32()? >> 16;
            let ext_bytes = e.rest();
            let ext_offset = body_offset + (entry_start + 8 + 8 + 20) as u64;
            let extensions = walk(ext_bytes, ext_offset, depth + 1, warnings);
            StsdEntryKind::Audio {
                channel_count,
                sample_size,
                sample_rate,
                extensions,
            }
        } else {
            StsdEntryKind::Other {
                data: e.rest().to_vec(),
            }
        };
        entries.push(StsdEntry {
            format,
            data_reference_index,
            kind,
        });
        b.pos = entry_start + size;
    }
    Ok(BoxBody::Stsd(Stsd { entries }))
}

/// AVCDecoderConfigurationRecord bytes (the `avcC` body).
pub fn parse_avcc(data: &[u8]) -> Result<AvcC, Error> {
    let mut b = Buf::new(data);
    let configuration_version = b.u8()?;
    let avc_profile_indication = b.u8()?;
    let profile_compatibility = b.u8()?;
    let avc_level_indication = b.u8()?;
    let length_size_minus_one = b.u8()? & 0x3;
    let num_sps = b.u8()? & 0x1f;
    let mut sps = Vec::with_capacity(num_sps as usize);
    for _ in 0..num_sps {
        let len = b.u16()? as usize;
        sps.push(b.take(len)?.to_vec());
    }
    let num_pps = b.u8()?;
    let mut pps = Vec::with_capacity(num_pps as usize);
    for _ in 0..num_pps {
        let len = b.u16()? as usize;
        pps.push(b.take(len)?.to_vec());
    }
    Ok(AvcC {
        configuration_version,
        avc_profile_indication,
        profile_compatibility,
        avc_level_indication,
        length_size_minus_one,
        sps,
        pps,
    })
}

/// HEVCDecoderConfigurationRecord bytes (the `hvcC` body).
pub fn parse_hvcc(data: &[u8]) -> Result<HvcC, Error> {
    let mut b = Buf::new(data);
    let configuration_version = b.u8()?;
    let byte1 = b.u8()?;
    let general_profile_space = byte1 >> 6;
    let general_tier_flag = (byte1 >> 5) & 1 != 0;
    let general_profile_idc = byte1 & 0x1f;
    let general_profile_compatibility_flags = b.u32()?;
    b.skip(6)?; // general_constraint_indicator_flags
    let general_level_idc = b.u8()?;
    b.skip(2)?; // min_spatial_segmentation_idc
    b.skip(1)?; // parallelismType
    let chroma_format_idc = b.u8()? & 0x3;
    let bit_depth_luma_minus8 = b.u8()? & 0x7;
    let bit_depth_chroma_minus8 = b.u8()? & 0x7;
    b.skip(2)?; // avgFrameRate
    let length_size_minus_one = b.u8()? & 0x3;
    let num_arrays = b.u8()?;
    let mut vps = Vec::new();
    let mut sps = Vec::new();
    let mut pps = Vec::new();
    for _ in 0..num_arrays {
        let nal_unit_type = b.u8()? & 0x3f;
        let num_nalus = b.u16()?;
        for _ in 0..num_nalus {
            let len = b.u16()? as usize;
            let nalu = b.take(len)?.to_vec();
            match nal_unit_type {
                crate::h265::NAL_VPS => vps.push(nalu),
                crate::h265::NAL_SPS => sps.push(nalu),
                crate::h265::NAL_PPS => pps.push(nalu),
                _ => {}
            }
        }
    }
    Ok(HvcC {
        configuration_version,
        general_profile_space,
        general_tier_flag,
        general_profile_idc,
        general_profile_compatibility_flags,
        general_level_idc,
        chroma_format_idc,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        length_size_minus_one,
        vps,
        sps,
        pps,
    })
}

fn parse_stts(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    let entry_count = b.u32()?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        if b.remaining() < 8 {
            break;
        }
        entries.push(SttsEntry {
            sample_count: b.u32()?,
            sample_delta: b.u32()?,
        });
    }
    Ok(BoxBody::Stts(Stts { entries }))
}

fn parse_ctts(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (version, _flags) = b.version_flags()?;
    let entry_count = b.u32()?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        if b.remaining() < 8 {
            break;
        }
        let sample_count = b.u32()?;
        let sample_offset = if version == 1 {
            b.i32()? as i64
        } else {
            b.u32()? as i64
        };
        entries.push(CttsEntry {
            sample_count,
            sample_offset,
        });
    }
    Ok(BoxBody::Ctts(Ctts { entries }))
}

fn parse_stss(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    let entry_count = b.u32()?;
    let mut sample_numbers = Vec::new();
    for _ in 0..entry_count {
        if b.remaining() < 4 {
            break;
        }
        sample_numbers.push(b.u32()?);
    }
    Ok(BoxBody::Stss(Stss { sample_numbers }))
}

fn parse_stsc(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    let entry_count = b.u32()?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        if b.remaining() < 12 {
            break;
        }
        entries.push(StscEntry {
            first_chunk: b.u32()?,
            samples_per_chunk: b.u32()?,
            sample_description_index: b.u32()?,
        });
    }
    Ok(BoxBody::Stsc(Stsc { entries }))
}

fn parse_stsz(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    let sample_size = b.u32()?;
    let sample_count = b.u32()?;
    let mut sizes = Vec::new();
    if sample_size == 0 {
        for _ in 0..sample_count {
            if b.remaining() < 4 {
                break;
            }
            sizes.push(b.u32()?);
        }
    }
    Ok(BoxBody::Stsz(Stsz {
        sample_size,
        sample_count,
        sizes,
    }))
}

fn parse_stco(body: &[u8], wide: bool) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    let entry_count = b.u32()?;
    let mut offsets = Vec::new();
    for _ in 0..entry_count {
        let need = if wide { 8 } else { 4 };
        if b.remaining() < need {
            break;
        }
        offsets.push(if wide { b.u64()? } else { b.u32()? as u64 });
    }
    Ok(BoxBody::Stco(Stco { offsets }))
}

fn parse_trex(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    Ok(BoxBody::Trex(Trex {
        track_id: b.u32()?,
        default_sample_description_index: b.u32()?,
        default_sample_duration: b.u32()?,
        default_sample_size: b.u32()?,
        default_sample_flags: b.u32()?,
    }))
}

fn parse_tfhd(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (_version, flags) = b.version_flags()?;
    let track_id = b.u32()?;
    Ok(BoxBody::Tfhd(Tfhd {
        flags,
        track_id,
        base_data_offset: if flags & 0x1 != 0 { Some(b.u64()?) } else { None },
        sample_description_index: if flags & 0x2 != 0 { Some(b.u32()?) } else { None },
        default_sample_duration: if flags & 0x8 != 0 { Some(b.u32()?) } else { None },
        default_sample_size: if flags & 0x10 != 0 { Some(b.u32()?) } else { None },
        default_sample_flags: if flags & 0x20 != 0 { Some(b.u32()?) } else { None },
    }))
}

fn parse_trun(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (version, flags) = b.version_flags()?;
    let sample_count = b.u32()?;
    let data_offset = if flags & 0x1 != 0 { Some(b.i32()?) } else { None };
    let first_sample_flags = if flags & 0x4 != 0 { Some(b.u32()?) } else { None };
    let mut samples = Vec::new();
    for _ in 0..sample_count {
        let sample_duration = if flags & 0x100 != 0 { Some(b.u32()?) } else { None };
        let sample_size = if flags & 0x200 != 0 { Some(b.u32()?) } else { None };
        let sample_flags = if flags & 0x400 != 0 { Some(b.u32()?) } else { None };
        let sample_composition_time_offset = if flags & 0x800 != 0 {
            Some(if version == 0 {
                b.u32()? as i64
            } else {
                b.i32()? as i64
            })
        } else {
            None
        };
        samples.push(TrunSample {
            sample_duration,
            sample_size,
            sample_flags,
            sample_composition_time_offset,
        });
    }
    Ok(BoxBody::Trun(Trun {
        version,
        flags,
        data_offset,
        first_sample_flags,
        samples,
    }))
}

/// `meta` appears both as an ISO full box and (in QuickTime movies) as a
/// plain container; sniff which form this is by checking whether the body
/// starts directly with a plausible child box.
fn parse_meta(
    body: &[u8],
    body_offset: u64,
    depth: u32,
    warnings: &mut Vec<String>,
) -> Result<BoxBody, Error> {
    let headerless = body.len() >= 8 && {
        let size = u32::from_be_bytes(body[0..4].try_into().unwrap()) as usize;
        let printable = body[4..8].iter().all(|b| b.is_ascii_graphic() || *b == 0xa9);
        size >= 8 && size <= body.len() && printable
    };
    let skip = if headerless { 0 } else { 4 };
    if body.len() < skip {
        bail_t!(Truncated, "meta box of {} bytes", body.len());
    }
    Ok(BoxBody::Meta {
        children: walk(&body[skip..], body_offset + skip as u64, depth + 1, warnings),
    })
}

fn parse_keys(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    b.version_flags()?;
    let entry_count = b.u32()?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        if b.remaining() < 8 {
            break;
        }
        let key_size = b.u32()? as usize;
        let _namespace = b.fourcc()?;
        if key_size < 8 || key_size - 8 > b.remaining() {
            break;
        }
        let key = b.take(key_size - 8)?;
        entries.push(String::from_utf8_lossy(key).into_owned());
    }
    Ok(BoxBody::Keys(Keys { entries }))
}

fn parse_ilst(body: &[u8], warnings: &mut Vec<String>) -> Result<BoxBody, Error> {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos + 8 <= body.len() {
        let size = u32::from_be_bytes(body[pos..pos + 4].try_into().unwrap()) as usize;
        let name = FourCc(body[pos + 4..pos + 8].try_into().unwrap());
        if size < 8 || pos + size > body.len() {
            warnings.push(format!("bad ilst item {name}"));
            break;
        }
        let item_body = &body[pos + 8..pos + size];
        let mut values = Vec::new();
        let mut vpos = 0usize;
        while vpos + 8 <= item_body.len() {
            let vsize = u32::from_be_bytes(item_body[vpos..vpos + 4].try_into().unwrap()) as usize;
            let vtype = &item_body[vpos + 4..vpos + 8];
            if vsize < 8 || vpos + vsize > item_body.len() {
                break;
            }
            if vtype == b"data" && vsize >= 16 {
                let type_indicator =
                    u32::from_be_bytes(item_body[vpos + 8..vpos + 12].try_into().unwrap());
                let data = &item_body[vpos + 16..vpos + vsize];
                // Well-known type 1 is UTF-8.
                if type_indicator == 1 {
                    values.push(IlstValue::Text(String::from_utf8_lossy(data).into_owned()));
                } else {
                    values.push(IlstValue::Binary {
                        type_indicator,
                        data: data.to_vec(),
                    });
                }
            }
            vpos += vsize;
        }
        entries.push(IlstEntry { name, values });
        pos += size;
    }
    Ok(BoxBody::Ilst(Ilst { entries }))
}

fn parse_xyz(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let len = b.u16()? as usize;
    let _language = b.u16()?;
    let text = b.take(len.min(b.remaining()))?;
    Ok(BoxBody::Xyz(Geotag {
        value: String::from_utf8_lossy(text).into_owned(),
    }))
}

fn parse_iloc(body: &[u8]) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (version, _flags) = b.version_flags()?;
    let sizes = b.u16()?;
    let offset_size = (sizes >> 12) & 0xf;
    let length_size = (sizes >> 8) & 0xf;
    let base_offset_size = (sizes >> 4) & 0xf;
    let index_size = sizes & 0xf;
    let read_sized = |b: &mut Buf, size: u16| -> Result<u64, Error> {
        match size {
            0 => Ok(0),
            4 => Ok(b.u32()? as u64),
            8 => b.u64(),
            other => {
                bail_t!(Malformed, "iloc field size {}", other);
            }
        }
    };
    let item_count = if version < 2 {
        b.u16()? as u32
    } else {
        b.u32()?
    };
    let mut items = Vec::new();
    for _ in 0..item_count {
        let item_id = if version < 2 { b.u16()? as u32 } else { b.u32()? };
        let construction_method = if version >= 1 { (b.u16()? & 0xf) as u8 } else { 0 };
        let data_reference_index = b.u16()?;
        let base_offset = read_sized(&mut b, base_offset_size)?;
        let extent_count = b.u16()?;
        let mut extents = Vec::with_capacity(extent_count as usize);
        for _ in 0..extent_count {
            if version >= 1 && index_size > 0 {
                read_sized(&mut b, index_size)?; // extent_index
            }
            let extent_offset = read_sized(&mut b, offset_size)?;
            let extent_length = read_sized(&mut b, length_size)?;
            extents.push(IlocExtent {
                extent_offset: base_offset + extent_offset,
                extent_length,
            });
        }
        items.push(IlocItem {
            item_id,
            construction_method,
            data_reference_index,
            base_offset,
            extents,
        });
    }
    Ok(BoxBody::Iloc(Iloc { items }))
}

fn parse_iinf(body: &[u8], warnings: &mut Vec<String>) -> Result<BoxBody, Error> {
    let mut b = Buf::new(body);
    let (version, _flags) = b.version_flags()?;
    let entry_count = if version == 0 { b.u16()? as u32 } else { b.u32()? };
    let mut entries = Vec::new();
    let mut rest = Buf::new(b.rest());
    for _ in 0..entry_count {
        if rest.remaining() < 8 {
            break;
        }
        let start = rest.pos;
        let size = rest.u32()? as usize;
        let ty = rest.fourcc()?;
        if size < 8 || start + size > rest.data.len() {
            warnings.push("bad infe entry".to_string());
            break;
        }
        if ty == "infe" {
            let mut e = Buf::new(&rest.data[start + 8..start + size]);
            if let Ok(entry) = parse_infe(&mut e) {
                entries.push(entry);
            }
        }
        rest.pos = start + size;
    }
    Ok(BoxBody::Iinf(Iinf { entries }))
}

fn parse_infe(b: &mut Buf) -> Result<ItemInfoEntry, Error> {
    let (version, _flags) = b.version_flags()?;
    let (item_id, item_type) = if version >= 2 {
        let id = if version == 2 { b.u16()? as u32 } else { b.u32()? };
        b.skip(2)?; // item_protection_index
        (id, Some(b.fourcc()?))
    } else {
        let id = b.u16()? as u32;
        b.skip(2)?;
        (id, None)
    };
    let name_bytes = b.rest();
    let item_name = String::from_utf8_lossy(name_bytes)
        .split('\0')
        .next()
        .unwrap_or("")
        .to_string();
    Ok(ItemInfoEntry {
        item_id,
        item_type,
        item_name,
    })
}

/// Container integrity check: the bytes the sample tables claim must be
/// covered by the `mdat` payloads. Returns a warning string on mismatch.
pub fn check_sample_integrity(tree: &BoxTree) -> Option<String> {
    let mut table_total = 0u64;
    let mut any_stsz = false;
    for trak in tree.traks() {
        if let Some(node) = trak.find("mdia/minf/stbl/stsz") {
            if let BoxBody::Stsz(stsz) = &node.body {
                any_stsz = true;
                table_total += stsz.total_bytes();
            }
        }
    }
    if !any_stsz {
        return None;
    }
    let mdat_total: u64 = tree
        .all("mdat")
        .iter()
        .filter_map(|n| match &n.body {
            BoxBody::Mdat { data_len, .. } => Some(*data_len),
            _ => None,
        })
        .sum();
    if table_total > mdat_total {
        return Some(format!(
            "sample tables claim {table_total} bytes but mdat holds only {mdat_total}"
        ));
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    /// Serializes a box with a u32 size header.
    pub(crate) fn make_box(ty: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 8);
        out.write_u32::<BigEndian>(body.len() as u32 + 8).unwrap();
        out.extend_from_slice(ty);
        out.extend_from_slice(body);
        out
    }

    pub(crate) fn full_box(ty: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(body.len() + 4);
        full.write_u32::<BigEndian>(((version as u32) << 24) | flags)
            .unwrap();
        full.extend_from_slice(body);
        make_box(ty, &full)
    }

    #[test]
    fn ftyp_fields() {
        let mut body = Vec::new();
        body.extend_from_slice(b"isom");
        body.write_u32::<BigEndian>(512).unwrap();
        body.extend_from_slice(b"isom");
        body.extend_from_slice(b"avc1");
        let data = make_box(b"ftyp", &body);
        let tree = parse(&data);
        assert!(tree.warnings.is_empty());
        let node = tree.first("ftyp").unwrap();
        match &node.body {
            BoxBody::Ftyp(f) => {
                assert_eq!(f.major_brand, "isom");
                assert_eq!(f.minor_version, 512);
                assert_eq!(f.compatible_brands.len(), 2);
                assert_eq!(f.compatible_brands[1], "avc1");
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn extended_size_box() {
        // size == 1 with a 64-bit size carrying an 8-byte payload.
        let mut data = Vec::new();
        data.write_u32::<BigEndian>(1).unwrap();
        data.extend_from_slice(b"blob");
        data.write_u64::<BigEndian>(16 + 8).unwrap();
        data.extend_from_slice(&[0xaa; 8]);
        let tree = parse(&data);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].size, 24);
        match &tree.children[0].body {
            BoxBody::Raw { data } => assert_eq!(data, &vec![0xaa; 8]),
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn size_zero_extends_to_eof() {
        let mut data = Vec::new();
        data.write_u32::<BigEndian>(0).unwrap();
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0x55; 32]);
        let tree = parse(&data);
        assert_eq!(tree.children.len(), 1);
        match &tree.children[0].body {
            BoxBody::Mdat {
                data_offset,
                data_len,
            } => {
                assert_eq!(*data_offset, 8);
                assert_eq!(*data_len, 32);
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn truncated_box_stops_cleanly() {
        let mut data = Vec::new();
        data.write_u32::<BigEndian>(100).unwrap();
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&[0; 4]); // far less than declared
        let tree = parse(&data);
        assert_eq!(tree.children.len(), 1);
        assert!(!tree.warnings.is_empty());
    }

    #[test]
    fn elst_v0_empty_edit() {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(2).unwrap(); // entry_count
        body.write_u32::<BigEndian>(1000).unwrap(); // segment_duration
        body.write_u32::<BigEndian>(0xffff_ffff).unwrap(); // media_time -1
        body.write_u16::<BigEndian>(1).unwrap();
        body.write_u16::<BigEndian>(0).unwrap();
        body.write_u32::<BigEndian>(9000).unwrap();
        body.write_u32::<BigEndian>(1200).unwrap();
        body.write_u16::<BigEndian>(1).unwrap();
        body.write_u16::<BigEndian>(0).unwrap();
        let data = full_box(b"elst", 0, 0, &body);
        let tree = parse(&data);
        match &tree.children[0].body {
            BoxBody::Elst(e) => {
                assert_eq!(e.entries.len(), 2);
                assert!(e.entries[0].is_empty_edit());
                assert_eq!(e.entries[0].media_time, -1);
                assert_eq!(e.entries[1].media_time, 1200);
                assert!(!e.entries[1].is_empty_edit());
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn nested_containers_and_stts() {
        let mut stts_body = Vec::new();
        stts_body.write_u32::<BigEndian>(2).unwrap();
        stts_body.write_u32::<BigEndian>(3).unwrap();
        stts_body.write_u32::<BigEndian>(100).unwrap();
        stts_body.write_u32::<BigEndian>(1).unwrap();
        stts_body.write_u32::<BigEndian>(50).unwrap();
        let stts = full_box(b"stts", 0, 0, &stts_body);
        let stbl = make_box(b"stbl", &stts);
        let minf = make_box(b"minf", &stbl);
        let mdia = make_box(b"mdia", &minf);
        let trak = make_box(b"trak", &mdia);
        let moov = make_box(b"moov", &trak);

        let tree = parse(&moov);
        let node = tree.first("moov/trak/mdia/minf/stbl/stts").unwrap();
        match &node.body {
            BoxBody::Stts(s) => {
                assert_eq!(s.entries.len(), 2);
                assert_eq!(s.expand(), vec![100, 100, 100, 50]);
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn avcc_round_trip() {
        // From a real AVCDecoderConfigurationRecord.
        #[rustfmt::skip]
        const AVCC: [u8; 38] = [
            0x01, 0x4d, 0x00, 0x1f, 0xff, 0xe1, 0x00, 0x17,
            0x67, 0x4d, 0x00, 0x1f, 0x9a, 0x66, 0x02, 0x80,
            0x2d, 0xff, 0x35, 0x01, 0x01, 0x01, 0x40, 0x00,
            0x00, 0xfa, 0x00, 0x00, 0x1d, 0x4c, 0x01, 0x01,
            0x00, 0x04, 0x68, 0xee, 0x3c, 0x80,
        ];
        let avcc = parse_avcc(&AVCC).unwrap();
        assert_eq!(avcc.configuration_version, 1);
        assert_eq!(avcc.avc_profile_indication, 0x4d);
        assert_eq!(avcc.avc_level_indication, 0x1f);
        assert_eq!(avcc.length_size_minus_one, 3);
        assert_eq!(avcc.sps.len(), 1);
        assert_eq!(avcc.sps[0].len(), 0x17);
        assert_eq!(avcc.sps[0][0], 0x67);
        assert_eq!(avcc.pps, vec![vec![0x68, 0xee, 0x3c, 0x80]]);
    }

    #[test]
    fn hvcc_parameter_set_arrays() {
        let mut data = Vec::new();
        data.push(1); // configurationVersion
        data.push(0x01); // space/tier/profile_idc = Main
        data.write_u32::<BigEndian>(0x6000_0000).unwrap(); // compat
        data.extend_from_slice(&[0x90, 0, 0, 0, 0, 0]); // constraints
        data.push(120); // level
        data.extend_from_slice(&[0xf0, 0x00]); // min_spatial_segmentation
        data.push(0xfc); // parallelismType
        data.push(0xfd); // chroma_format_idc = 1
        data.push(0xf8); // bit_depth_luma_minus8 = 0
        data.push(0xf8); // bit_depth_chroma_minus8 = 0
        data.extend_from_slice(&[0, 0]); // avgFrameRate
        data.push(0x0f); // ...lengthSizeMinusOne = 3
        data.push(3); // numOfArrays
        for (ty, payload) in [
            (32u8, vec![0x40u8, 0x01, 0x0c]),
            (33, vec![0x42, 0x01, 0x01]),
            (34, vec![0x44, 0x01, 0xc0]),
        ] {
            data.push(ty);
            data.write_u16::<BigEndian>(1).unwrap();
            data.write_u16::<BigEndian>(payload.len() as u16).unwrap();
            data.extend_from_slice(&payload);
        }
        let hvcc = parse_hvcc(&data).unwrap();
        assert_eq!(hvcc.general_profile_idc, 1);
        assert_eq!(hvcc.chroma_format_idc, 1);
        assert_eq!(hvcc.length_size_minus_one, 3);
        assert_eq!(hvcc.vps, vec![vec![0x40, 0x01, 0x0c]]);
        assert_eq!(hvcc.sps, vec![vec![0x42, 0x01, 0x01]]);
        assert_eq!(hvcc.pps, vec![vec![0x44, 0x01, 0xc0]]);
    }

    #[test]
    fn stsd_video_entry_with_avcc() {
        // Build avc1 sample entry: 8 header + 70 visual fields + avcC box.
        #[rustfmt::skip]
        const AVCC: [u8; 38] = [
            0x01, 0x4d, 0x00, 0x1f, 0xff, 0xe1, 0x00, 0x17,
            0x67, 0x4d, 0x00, 0x1f, 0x9a, 0x66, 0x02, 0x80,
            0x2d, 0xff, 0x35, 0x01, 0x01, 0x01, 0x40, 0x00,
            0x00, 0xfa, 0x00, 0x00, 0x1d, 0x4c, 0x01, 0x01,
            0x00, 0x04, 0x68, 0xee, 0x3c, 0x80,
        ];
        let mut entry = Vec::new();
        entry.extend_from_slice(&[0; 6]); // reserved
        entry.write_u16::<BigEndian>(1).unwrap(); // data_reference_index
        entry.extend_from_slice(&[0; 16]); // pre_defined + reserved
        entry.write_u16::<BigEndian>(1280).unwrap();
        entry.write_u16::<BigEndian>(720).unwrap();
        entry.extend_from_slice(&[0; 50]);
        entry.extend_from_slice(&make_box(b"avcC", &AVCC));
        let mut sample_entry = Vec::new();
        sample_entry
            .write_u32::<BigEndian>(entry.len() as u32 + 8)
            .unwrap();
        sample_entry.extend_from_slice(b"avc1");
        sample_entry.extend_from_slice(&entry);

        let mut stsd_body = Vec::new();
        stsd_body.write_u32::<BigEndian>(1).unwrap(); // entry_count
        stsd_body.extend_from_slice(&sample_entry);
        let data = full_box(b"stsd", 0, 0, &stsd_body);

        let tree = parse(&data);
        assert!(tree.warnings.is_empty(), "{:?}", tree.warnings);
        match &tree.children[0].body {
            BoxBody::Stsd(stsd) => {
                assert_eq!(stsd.entries.len(), 1);
                assert_eq!(stsd.entries[0].format, "avc1");
                match &stsd.entries[0].kind {
                    StsdEntryKind::Video {
                        width,
                        height,
                        avcc,
                        ..
                    } => {
                        assert_eq!(*width, 1280);
                        assert_eq!(*height, 720);
                        let avcc = avcc.as_ref().expect("avcC parsed");
                        assert_eq!(avcc.sps.len(), 1);
                    }
                    other => panic!("wrong kind: {other:?}"),
                }
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn sample_integrity_mismatch() {
        let mut stsz_body = Vec::new();
        stsz_body.write_u32::<BigEndian>(0).unwrap(); // sample_size
        stsz_body.write_u32::<BigEndian>(2).unwrap(); // sample_count
        stsz_body.write_u32::<BigEndian>(100).unwrap();
        stsz_body.write_u32::<BigEndian>(100).unwrap();
        let stsz = full_box(b"stsz", 0, 0, &stsz_body);
        let stbl = make_box(b"stbl", &stsz);
        let minf = make_box(b"minf", &stbl);
        let mdia = make_box(b"mdia", &minf);
        let trak = make_box(b"trak", &mdia);
        let moov = make_box(b"moov", &trak);
        let mdat = make_box(b"mdat", &[0u8; 50]); // too small

        let mut data = moov;
        data.extend_from_slice(&mdat);
        let tree = parse(&data);
        let warning = check_sample_integrity(&tree).expect("mismatch detected");
        assert!(warning.contains("200"));

        // And a large-enough mdat passes.
        let mut data2 = Vec::new();
        let stsz2 = {
            let mut b = Vec::new();
            b.write_u32::<BigEndian>(100).unwrap();
            b.write_u32::<BigEndian>(2).unwrap();
            full_box(b"stsz", 0, 0, &b)
        };
        let moov2 = make_box(
            b"moov",
            &make_box(
                b"trak",
                &make_box(b"mdia", &make_box(b"minf", &make_box(b"stbl", &stsz2))),
            ),
        );
        data2.extend_from_slice(&moov2);
        data2.extend_from_slice(&make_box(b"mdat", &[0u8; 200]));
        assert!(check_sample_integrity(&parse(&data2)).is_none());
    }

    #[test]
    fn apple_keys_and_ilst() {
        let mut keys_body = Vec::new();
        keys_body.write_u32::<BigEndian>(1).unwrap();
        let key = b"com.apple.quicktime.model";
        keys_body.write_u32::<BigEndian>(key.len() as u32 + 8).unwrap();
        keys_body.extend_from_slice(b"mdta");
        keys_body.extend_from_slice(key);
        let keys = full_box(b"keys", 0, 0, &keys_body);

        let mut data_box_body = Vec::new();
        data_box_body.write_u32::<BigEndian>(1).unwrap(); // type: UTF-8
        data_box_body.write_u32::<BigEndian>(0).unwrap(); // locale
        data_box_body.extend_from_slice(b"iPhone 12");
        let data_box = make_box(b"data", &data_box_body);
        let item = make_box(&[0, 0, 0, 1], &data_box);
        let ilst = make_box(b"ilst", &item);

        let mut meta_children = keys;
        meta_children.extend_from_slice(&ilst);
        let mut meta_full = vec![0, 0, 0, 0]; // version + flags
        meta_full.extend_from_slice(&meta_children);
        let meta = make_box(b"meta", &meta_full);
        let moov = make_box(b"moov", &meta);

        let tree = parse(&moov);
        let meta_node = tree.first("moov/meta").unwrap();
        let keys_node = meta_node.child("keys").unwrap();
        match &keys_node.body {
            BoxBody::Keys(k) => {
                assert_eq!(k.entries, vec!["com.apple.quicktime.model".to_string()]);
            }
            other => panic!("wrong body: {other:?}"),
        }
        let ilst_node = meta_node.child("ilst").unwrap();
        match &ilst_node.body {
            BoxBody::Ilst(i) => {
                assert_eq!(i.entries.len(), 1);
                assert_eq!(i.entries[0].values[0].as_text(), Some("iPhone 12"));
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn geotag() {
        let mut body = Vec::new();
        let text = b"+37.3349-122.0090/";
        body.write_u16::<BigEndian>(text.len() as u16).unwrap();
        body.write_u16::<BigEndian>(0x15c7).unwrap(); // language
        body.extend_from_slice(text);
        let data = make_box(b"\xa9xyz", &body);
        let tree = parse(&data);
        match &tree.children[0].body {
            BoxBody::Xyz(g) => assert_eq!(g.value, "+37.3349-122.0090/"),
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn fragmented_trun() {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(3).unwrap(); // sample_count
        body.write_u32::<BigEndian>(0x1000).unwrap(); // data_offset
        for cto in [200u32, 200, 200] {
            body.write_u32::<BigEndian>(cto).unwrap();
        }
        // flags: data-offset (0x1) + sample-composition-time-offsets (0x800)
        let data = full_box(b"trun", 0, 0x801, &body);
        let tree = parse(&data);
        match &tree.children[0].body {
            BoxBody::Trun(t) => {
                assert_eq!(t.samples.len(), 3);
                assert_eq!(t.data_offset, Some(0x1000));
                assert_eq!(t.samples[0].sample_composition_time_offset, Some(200));
                assert!(t.samples[0].sample_duration.is_none());
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn heif_iloc() {
        let mut body = Vec::new();
        body.write_u16::<BigEndian>(0x4400).unwrap(); // offset_size 4, length_size 4
        body.write_u16::<BigEndian>(1).unwrap(); // item_count
        body.write_u16::<BigEndian>(1).unwrap(); // item_id
        body.write_u16::<BigEndian>(0).unwrap(); // data_reference_index
        body.write_u16::<BigEndian>(1).unwrap(); // extent_count
        body.write_u32::<BigEndian>(0x2000).unwrap(); // extent_offset
        body.write_u32::<BigEndian>(0x300).unwrap(); // extent_length
        let data = full_box(b"iloc", 0, 0, &body);
        let tree = parse(&data);
        match &tree.children[0].body {
            BoxBody::Iloc(iloc) => {
                assert_eq!(iloc.items.len(), 1);
                assert_eq!(iloc.items[0].item_id, 1);
                assert_eq!(iloc.items[0].extents.len(), 1);
                assert_eq!(iloc.items[0].extents[0].extent_offset, 0x2000);
                assert_eq!(iloc.items[0].extents[0].extent_length, 0x300);
            }
            other => panic!("wrong body: {other:?}"),
        }
    }
}
