//! Read/write store on a local or network-mounted filesystem.
//!
//! Objects and their `.info` sidecars live side by side in a flat directory.
//! Pushes land in the staging root; reads, listing, deletion and backups go
//! to the published root. Moving staged objects to the published root is
//! done outside this crate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use super::{AnnexBackend, ArchiveWriter, ObjectEntry, Progress, PushOutcome};
use crate::digest::{ObjectId, INFO_SUFFIX};
use crate::error::{AnnexError, AnnexResult};
use crate::metadata::{InsertionTime, ObjectMetadata};
use crate::utils::{self, READ_MODE, WRITE_MODE};

/// Filesystem-backed store.
#[derive(Clone, Debug)]
pub struct LocalStore {
    published: PathBuf,
    staging: PathBuf,
    /// Root whose sidecars seed the staged ones on push.
    upstream: PathBuf,
}

impl LocalStore {
    /// Store whose pushes and reads share one root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            staging: root.clone(),
            upstream: root.clone(),
            published: root,
        }
    }

    /// Store that writes to `staging` and reads from `published`.
    pub fn with_staging(published: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        let published = published.into();
        Self {
            upstream: published.clone(),
            published,
            staging: staging.into(),
        }
    }

    /// Merge names already recorded under `published` into sidecars pushed
    /// here, for a store used as the staging area of another one.
    pub fn publishing_to(mut self, published: impl Into<PathBuf>) -> Self {
        self.upstream = published.into();
        self
    }

    /// Sidecar to extend on push: the upstream one with staged changes on top.
    fn load_for_push(&self, id: &ObjectId) -> AnnexResult<ObjectMetadata> {
        let staged = ObjectMetadata::load(&self.staging.join(id.info_name()))?;
        if self.upstream == self.staging {
            return Ok(staged);
        }
        let mut metadata = ObjectMetadata::load(&self.upstream.join(id.info_name()))?;
        metadata.merge(staged);
        Ok(metadata)
    }

    fn is_object_name(name: &str) -> bool {
        !name.starts_with('.') && !name.ends_with(INFO_SUFFIX)
    }

    fn entries_for(&self, name: &str, path: &Path) -> AnnexResult<Vec<ObjectEntry>> {
        let meta = fs::metadata(path).map_err(|e| AnnexError::io(path, e))?;
        let size = meta.len();
        let info = ObjectMetadata::load(&self.published.join(format!("{}{}", name, INFO_SUFFIX)))?;

        if info.filenames.is_empty() {
            let inserted = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default();
            return Ok(vec![ObjectEntry {
                name: name.to_string(),
                size,
                inserted,
                filenames: Vec::new(),
            }]);
        }

        info.filenames
            .iter()
            .map(|(filename, record)| {
                Ok(ObjectEntry {
                    name: name.to_string(),
                    size,
                    inserted: record.date.to_unix(name)?,
                    filenames: vec![filename.clone()],
                })
            })
            .collect()
    }
}

impl AnnexBackend for LocalStore {
    fn kind(&self) -> &'static str {
        "directory"
    }

    fn get(&self, id: &ObjectId, dest: &Path) -> AnnexResult<bool> {
        let src = self.published.join(id.as_str());
        match fs::metadata(&src) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not in {}", id, self.published.display());
                return Ok(false);
            }
            Err(e) => return Err(AnnexError::io(&src, e)),
        }
        debug!("Extracting {} to {}", id, dest.display());
        utils::copy_atomic(&src, dest, READ_MODE)?;
        Ok(true)
    }

    fn delete(&self, id: &ObjectId) -> AnnexResult<()> {
        let path = self.published.join(id.as_str());
        let info = self.published.join(id.info_name());
        debug!("Deleting from annex: {}", path.display());
        fs::remove_file(&path).map_err(|e| AnnexError::io(&path, e))?;
        match fs::remove_file(&info) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                warn!("Could not remove {}: {}", info.display(), e)
            }
            _ => {}
        }
        Ok(())
    }

    fn list(&self) -> AnnexResult<Vec<ObjectEntry>> {
        let mut out = Vec::new();
        for path in utils::sorted_entries(&self.published)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !Self::is_object_name(name) || !path.is_file() {
                continue;
            }
            out.extend(self.entries_for(name, &path)?);
        }
        Ok(out)
    }

    fn push(&self, source: &Path, id: &ObjectId) -> AnnexResult<PushOutcome> {
        let dest = self.staging.join(id.as_str());
        let info_path = self.staging.join(id.info_name());
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AnnexError::io(source, io::Error::from(io::ErrorKind::InvalidInput)))?;

        let mut metadata = self.load_for_push(id)?;
        let src_len = fs::metadata(source)
            .map_err(|e| AnnexError::io(source, e))?
            .len();
        if let Ok(existing) = fs::metadata(&dest) {
            if existing.len() == src_len && metadata.contains(&filename) {
                debug!("{} is already in annex, skipping it", filename);
                return Ok(PushOutcome::AlreadyPresent);
            }
        }

        // The sidecar must be visible no later than the object it describes.
        metadata.record(&filename, InsertionTime::now());
        metadata.save(&info_path)?;

        debug!("Importing {} into annex ({})", source.display(), id);
        utils::copy_atomic(source, &dest, WRITE_MODE)?;
        Ok(PushOutcome::Stored)
    }

    fn backup(&self, ids: &[ObjectId], output: &Path, progress: Progress<'_>) -> AnnexResult<()> {
        let total = ids.len();
        let mut archive = ArchiveWriter::create(output)?;
        for (done, id) in ids.iter().enumerate() {
            let info = id.info_name();
            archive.add(&self.published.join(id.as_str()), id.as_str())?;
            archive.add(&self.published.join(&info), &info)?;
            progress(done + 1, total);
        }
        archive.finish()
    }
}
