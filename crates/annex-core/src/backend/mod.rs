//! Storage backends and the capability contract they share.
//!
//! Callers hold a `Box<dyn AnnexBackend>` chosen from configuration; the
//! concrete store is never inspected at runtime.

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use std::fs::File;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::digest::ObjectId;
use crate::error::{AnnexError, AnnexResult};

/// One listing row: an object and one of the names it was pushed under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    /// Object identifier (its file name in the store).
    pub name: String,
    /// Size reported by the store.
    pub size: u64,
    /// Insertion time, Unix seconds.
    pub inserted: i64,
    /// Original filenames this row covers.
    pub filenames: Vec<String>,
}

/// What `push` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    /// Same size and name already recorded; nothing written.
    AlreadyPresent,
}

/// Backup progress callback: `(done, total)` after each identifier.
pub type Progress<'a> = &'a mut dyn FnMut(usize, usize);

/// Operations every store supports or explicitly refuses with
/// [`AnnexError::Unsupported`].
pub trait AnnexBackend: Send + Sync {
    /// Short backend name used in messages.
    fn kind(&self) -> &'static str;

    /// Place the content of `id` at `dest`.
    ///
    /// Returns `Ok(false)` if the store does not hold `id`. `dest` is either
    /// fully written or left untouched.
    fn get(&self, id: &ObjectId, dest: &Path) -> AnnexResult<bool>;

    /// Remove an object and its metadata sidecar.
    fn delete(&self, id: &ObjectId) -> AnnexResult<()>;

    /// Enumerate stored objects, sidecars excluded.
    fn list(&self) -> AnnexResult<Vec<ObjectEntry>>;

    /// Ensure `id` is stored with `source`'s basename among its known names.
    ///
    /// Existing content of the same size under an already recorded name is
    /// assumed identical; bytes are not compared.
    fn push(&self, source: &Path, id: &ObjectId) -> AnnexResult<PushOutcome>;

    /// Write a `.tar.gz` holding each object and its sidecar, in order.
    fn backup(&self, ids: &[ObjectId], output: &Path, progress: Progress<'_>) -> AnnexResult<()>;
}

/// Gzip-compressed tar written entry by entry.
pub(crate) struct ArchiveWriter {
    builder: tar::Builder<GzEncoder<File>>,
    output: std::path::PathBuf,
}

impl ArchiveWriter {
    pub(crate) fn create(output: &Path) -> AnnexResult<Self> {
        let file = File::create(output).map_err(|e| AnnexError::io(output, e))?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.follow_symlinks(true);
        Ok(Self {
            builder,
            output: output.to_path_buf(),
        })
    }

    /// Add the file at `path` as top-level entry `name`.
    pub(crate) fn add(&mut self, path: &Path, name: &str) -> AnnexResult<()> {
        self.builder
            .append_path_with_name(path, name)
            .map_err(|e| AnnexError::io(path, e))
    }

    /// Flush tar trailer and gzip footer.
    pub(crate) fn finish(self) -> AnnexResult<()> {
        let output = self.output;
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| AnnexError::io(&output, e))?;
        let file = encoder.finish().map_err(|e| AnnexError::io(&output, e))?;
        file.sync_all().map_err(|e| AnnexError::io(&output, e))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::BTreeMap;
    use std::fs::File;
    use std::path::Path;

    use flate2::read::GzDecoder;
    use tar::Archive;

    /// Entry name -> content of a `.tar.gz`.
    pub(crate) fn read_archive(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut archive = Archive::new(GzDecoder::new(File::open(path).unwrap()));
        let mut out = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut buf).unwrap();
            out.insert(name, buf);
        }
        out
    }
}
