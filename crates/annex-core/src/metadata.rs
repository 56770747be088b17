//! Per-object metadata sidecars (`<identifier>.info`).
//!
//! A sidecar is a YAML document shaped as
//! `{filenames: {<original-name>: {date: <time>}}}`. Keys this crate does not
//! know about are carried through rewrites untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{Local, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnnexError, AnnexResult};
use crate::utils::{self, WRITE_MODE};

/// `ctime`-style dates written by older releases, e.g. `Tue Jan  2 15:04:05 2024`.
const CTIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Locale dates once written with `%c`, after meridiem and zone are peeled off.
const LOCALE_FORMATS: [&str; 2] = ["%a %d %b %Y %H:%M:%S", "%d %b %Y %H:%M:%S"];

/// When an original filename was recorded.
///
/// Stores have held this field in three shapes over time; decoding tries
/// them in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InsertionTime {
    Unix(i64),
    UnixFloat(f64),
    Text(String),
}

impl InsertionTime {
    pub fn now() -> Self {
        InsertionTime::Unix(Utc::now().timestamp())
    }

    /// Normalize to integer Unix seconds. `object` names the owner in errors.
    pub fn to_unix(&self, object: &str) -> AnnexResult<i64> {
        let malformed = |value: String| AnnexError::MalformedMetadata {
            object: object.to_string(),
            value,
        };
        match self {
            InsertionTime::Unix(secs) => Ok(*secs),
            InsertionTime::UnixFloat(secs) if secs.is_finite() => Ok(secs.trunc() as i64),
            InsertionTime::UnixFloat(secs) => Err(malformed(secs.to_string())),
            InsertionTime::Text(text) => {
                parse_legacy_date(text).ok_or_else(|| malformed(text.clone()))
            }
        }
    }
}

fn local_timestamp(naive: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

fn parse_legacy_date(text: &str) -> Option<i64> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if let Ok(naive) = NaiveDateTime::parse_from_str(&tokens.join(" "), CTIME_FORMAT) {
        return local_timestamp(naive);
    }
    parse_locale_date(tokens)
}

fn parse_locale_date(mut tokens: Vec<&str>) -> Option<i64> {
    let mut utc = false;
    if let Some(last) = tokens.last() {
        let upper = last.to_ascii_uppercase();
        let is_zone = last.bytes().all(|b| b.is_ascii_alphabetic()) && upper != "AM" && upper != "PM";
        if is_zone {
            utc = matches!(upper.as_str(), "UTC" | "GMT" | "Z");
            tokens.pop();
        }
    }

    let mut pm = None;
    if let Some(last) = tokens.last() {
        match last.to_ascii_uppercase().as_str() {
            "AM" => pm = Some(false),
            "PM" => pm = Some(true),
            _ => {}
        }
        if pm.is_some() {
            tokens.pop();
        }
    }

    let joined = tokens.join(" ");
    let mut naive = LOCALE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&joined, fmt).ok())?;

    // A 24-hour clock value wins over a contradicting marker.
    let hour = naive.hour();
    naive = match (pm, hour) {
        (Some(true), 1..=11) => naive.with_hour(hour + 12)?,
        (Some(false), 12) => naive.with_hour(0)?,
        _ => naive,
    };

    if utc {
        Some(naive.and_utc().timestamp())
    } else {
        local_timestamp(naive)
    }
}

/// One original filename entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub date: InsertionTime,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Sidecar content for one object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    #[serde(default)]
    pub filenames: BTreeMap<String, FileRecord>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ObjectMetadata {
    /// Load the sidecar at `path`; a missing or empty file is empty metadata.
    pub fn load(path: &Path) -> AnnexResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(AnnexError::io(path, e)),
        }
    }

    pub fn parse(text: &str, path: &Path) -> AnnexResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str::<Option<Self>>(text)
            .map(Option::unwrap_or_default)
            .map_err(|e| AnnexError::Metadata {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Write the sidecar atomically with group-writable permissions.
    pub fn save(&self, path: &Path) -> AnnexResult<()> {
        let text = serde_yaml::to_string(self).map_err(|e| AnnexError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        utils::write_atomic(path, text.as_bytes(), WRITE_MODE)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.filenames.contains_key(filename)
    }

    /// Fold `newer` into `self`; on conflicting keys `newer` wins.
    pub fn merge(&mut self, newer: ObjectMetadata) {
        self.filenames.extend(newer.filenames);
        self.extra.extend(newer.extra);
    }

    /// Record `filename` at `date`, keeping every other name and field.
    pub fn record(&mut self, filename: &str, date: InsertionTime) {
        match self.filenames.get_mut(filename) {
            Some(entry) => entry.date = date,
            None => {
                self.filenames.insert(
                    filename.to_string(),
                    FileRecord {
                        date,
                        extra: BTreeMap::new(),
                    },
                );
            }
        }
    }
}
