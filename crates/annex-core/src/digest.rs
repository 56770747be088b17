//! Content identifiers and pointer file classification.

use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::error::{AnnexError, AnnexResult};

/// Read size for hashing and binary sniffing.
const IO_SIZE: usize = 64 * 1024;

/// Suffix of metadata sidecar files.
pub const INFO_SUFFIX: &str = ".info";

/// Hash used to name objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashKind {
    /// 128-bit MD5, used by legacy stores.
    Md5,
    /// 256-bit SHA3.
    #[default]
    Sha3_256,
}

impl HashKind {
    /// Length of the hex encoding.
    pub fn hex_len(&self) -> usize {
        match self {
            HashKind::Md5 => 32,
            HashKind::Sha3_256 => 64,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "md5" => Some(HashKind::Md5),
            "sha3" | "sha3-256" | "sha3_256" => Some(HashKind::Sha3_256),
            _ => None,
        }
    }
}

/// Lowercase hex digest naming one stored object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Validate `text` as a 32 or 64 character hex digest.
    pub fn parse(text: &str) -> AnnexResult<Self> {
        if looks_like_identifier(text) {
            Ok(ObjectId(text.to_ascii_lowercase()))
        } else {
            Err(AnnexError::InvalidIdentifier(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Which hash produced this identifier, judging by its width.
    pub fn kind(&self) -> HashKind {
        if self.0.len() == 32 {
            HashKind::Md5
        } else {
            HashKind::Sha3_256
        }
    }

    /// Name of the metadata sidecar for this object.
    pub fn info_name(&self) -> String {
        format!("{}{}", self.0, INFO_SUFFIX)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn looks_like_identifier(text: &str) -> bool {
    matches!(text.len(), 32 | 64) && text.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Digest of the file at `path` with the current hash.
pub fn digest(path: &Path) -> AnnexResult<ObjectId> {
    digest_with(path, HashKind::Sha3_256)
}

/// Digest of the file at `path`, read in bounded chunks.
pub fn digest_with(path: &Path, kind: HashKind) -> AnnexResult<ObjectId> {
    let mut f = File::open(path).map_err(|e| AnnexError::io(path, e))?;
    let mut buf = vec![0u8; IO_SIZE];
    let hex = match kind {
        HashKind::Sha3_256 => {
            let mut hasher = Sha3_256::new();
            loop {
                let n = f.read(&mut buf).map_err(|e| AnnexError::io(path, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            format!("{:x}", hasher.finalize())
        }
        HashKind::Md5 => {
            let mut ctx = md5::Context::new();
            loop {
                let n = f.read(&mut buf).map_err(|e| AnnexError::io(path, e))?;
                if n == 0 {
                    break;
                }
                ctx.consume(&buf[..n]);
            }
            format!("{:x}", ctx.compute())
        }
    };
    Ok(ObjectId(hex))
}

/// Whether the file at `path` is a pointer: UTF-8 text whose content, without
/// trailing whitespace, is a 32 or 64 character hex digest.
///
/// Unreadable files, directories and non-text content are never pointers.
pub fn is_pointer(path: &Path) -> bool {
    pointer_text(path).is_some()
}

fn pointer_text(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let identifier = text.trim_end();
    looks_like_identifier(identifier).then(|| identifier.to_string())
}

/// Identifier held by the pointer file at `path`.
pub fn read_pointer(path: &Path) -> AnnexResult<ObjectId> {
    let bytes = fs::read(path).map_err(|e| AnnexError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    ObjectId::parse(text.trim_end())
}

fn is_text_byte(b: u8) -> bool {
    matches!(b, 9 | 10 | 13 | 32..=126)
}

/// Whether the file looks binary, judging by its first 64 KiB.
///
/// A handful of stray bytes (under 1% of the sample) still counts as text.
pub fn is_binary(path: &Path) -> AnnexResult<bool> {
    let f = File::open(path).map_err(|e| AnnexError::io(path, e))?;
    let mut data = Vec::with_capacity(IO_SIZE);
    f.take(IO_SIZE as u64)
        .read_to_end(&mut data)
        .map_err(|e| AnnexError::io(path, e))?;
    if data.is_empty() {
        return Ok(false);
    }
    let binchars = data.iter().filter(|b| !is_text_byte(**b)).count();
    Ok((binchars as f64) / (data.len() as f64) >= 0.01)
}
