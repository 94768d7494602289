// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! CSV and JSON export of parsed records.
//!
//! JSON is the serde tree verbatim (bytes as base64) after a size-limiting
//! pass that replaces bulk payloads with the literal string `"skip"`. CSV
//! flattens the nested records into dotted keys with `_i` suffixes for
//! list elements; the header is the sorted union of keys across all
//! records and missing values render empty.

use crate::record::MediaRecord;
use base::{Error, ErrorKind, ResultExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format {other:?} (csv or json)")),
        }
    }
}

/// Writes all records to `<output_dir>/parsed_data.{csv,json}` and returns
/// the path written.
pub fn export(
    records: &[MediaRecord],
    format: ExportFormat,
    output_dir: &Path,
) -> Result<PathBuf, Error> {
    std::fs::create_dir_all(output_dir).err_kind(ErrorKind::Io)?;
    let mut values: Vec<Value> = Vec::with_capacity(records.len());
    for r in records {
        let mut v = serde_json::to_value(r).err_kind(ErrorKind::Internal)?;
        limit_output_size(&mut v);
        values.push(v);
    }
    let path = match format {
        ExportFormat::Json => {
            let path = output_dir.join("parsed_data.json");
            let file = std::fs::File::create(&path).err_kind(ErrorKind::Io)?;
            serde_json::to_writer_pretty(file, &values).err_kind(ErrorKind::Io)?;
            path
        }
        ExportFormat::Csv => {
            let path = output_dir.join("parsed_data.csv");
            write_csv(&values, &path)?;
            path
        }
    };
    info!(path = %path.display(), records = records.len(), "exported parsed records");
    Ok(path)
}

/// Replaces bulk binary payloads with `"skip"`: encoded NAL bytes and
/// slice data dwarf everything else in the record.
pub fn limit_output_size(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let is_slice_like = map.contains_key("header");
            for (k, v) in map.iter_mut() {
                match k.as_str() {
                    "raw" | "rbsp" => *v = Value::String("skip".to_string()),
                    "data" if is_slice_like => *v = Value::String("skip".to_string()),
                    _ => limit_output_size(v),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                limit_output_size(item);
            }
        }
        _ => {}
    }
}

fn write_csv(values: &[Value], path: &Path) -> Result<(), Error> {
    let flattened: Vec<BTreeMap<String, String>> = values.iter().map(flatten_record).collect();
    let keys: BTreeSet<&String> = flattened.iter().flat_map(|m| m.keys()).collect();

    let mut w = csv::Writer::from_path(path).err_kind(ErrorKind::Io)?;
    w.write_record(keys.iter().map(|k| k.as_str()))
        .err_kind(ErrorKind::Io)?;
    for row in &flattened {
        w.write_record(
            keys.iter()
                .map(|k| row.get(*k).map(|v| v.as_str()).unwrap_or("")),
        )
        .err_kind(ErrorKind::Io)?;
    }
    w.flush().err_kind(ErrorKind::Io)?;
    Ok(())
}

fn flatten_record(value: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten(value, String::new(), &mut out);
    out
}

fn flatten(value: &Value, key: String, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let new_key = if key.is_empty() {
                    k.clone()
                } else {
                    format!("{key}.{k}")
                };
                flatten(v, new_key, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten(item, format!("{key}_{i}"), out);
            }
        }
        Value::Null => {
            out.insert(key, String::new());
        }
        Value::String(s) => {
            out.insert(key, s.clone());
        }
        other => {
            out.insert(key, other.to_string());
        }
    }
}
