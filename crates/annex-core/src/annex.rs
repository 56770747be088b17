//! The annex as callers see it: a primary store, an optional staging store
//! and an optional local restore cache behind one [`AnnexBackend`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::backend::{AnnexBackend, LocalStore, ObjectEntry, Progress, PushOutcome, RemoteStore};
use crate::config::{AnnexConfig, StoreSpec};
use crate::digest::{self, HashKind, ObjectId};
use crate::error::{AnnexError, AnnexResult};
use crate::utils::{self, READ_MODE};

pub struct Annex {
    primary: Box<dyn AnnexBackend>,
    staging: Option<Box<dyn AnnexBackend>>,
    restore_cache: Option<PathBuf>,
    hash: HashKind,
}

impl Annex {
    pub fn new(primary: Box<dyn AnnexBackend>) -> Self {
        Self {
            primary,
            staging: None,
            restore_cache: None,
            hash: HashKind::default(),
        }
    }

    pub fn with_staging(mut self, staging: Box<dyn AnnexBackend>) -> Self {
        self.staging = Some(staging);
        self
    }

    pub fn with_restore_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.restore_cache = Some(dir.into());
        self
    }

    pub fn with_hash(mut self, hash: HashKind) -> Self {
        self.hash = hash;
        self
    }

    /// Build the stores named by `config`.
    pub fn open(config: &AnnexConfig) -> AnnexResult<Self> {
        let primary_spec = config.annex.as_ref().ok_or_else(|| {
            AnnexError::Config(
                "no annex configured (set 'annex' in .annexrc, ANNEX_PATH or --annex)".to_string(),
            )
        })?;
        let staging_root = match &config.staging {
            None => None,
            Some(StoreSpec::Directory(path)) => Some(path.clone()),
            Some(StoreSpec::Server(url)) => {
                return Err(AnnexError::Config(format!(
                    "staging annex must be a directory, got {}",
                    url
                )))
            }
        };

        let primary: Box<dyn AnnexBackend> = match (primary_spec, &staging_root) {
            (StoreSpec::Directory(root), Some(staging)) => {
                Box::new(LocalStore::with_staging(root, staging))
            }
            (StoreSpec::Directory(root), None) => Box::new(LocalStore::new(root)),
            (StoreSpec::Server(url), _) => Box::new(RemoteStore::new(url, config.http_timeout())),
        };

        let mut annex = Annex::new(primary).with_hash(config.hash_kind());
        if let Some(staging) = staging_root {
            let mut store = LocalStore::new(staging);
            if let StoreSpec::Directory(root) = primary_spec {
                store = store.publishing_to(root);
            }
            annex = annex.with_staging(Box::new(store));
        }
        if let Some(cache) = &config.restore_cache {
            annex = annex.with_restore_cache(cache);
        }
        Ok(annex)
    }

    pub fn hash_kind(&self) -> HashKind {
        self.hash
    }

    /// Like `get`, but absence is an error.
    pub fn fetch(&self, id: &ObjectId, dest: &Path) -> AnnexResult<()> {
        if self.get(id, dest)? {
            Ok(())
        } else {
            Err(AnnexError::NotFound(id.to_string()))
        }
    }

    /// Store `path` and turn it into a pointer to its content.
    pub fn import(&self, path: &Path) -> AnnexResult<ObjectId> {
        let id = digest::digest_with(path, self.hash)?;
        self.push(path, &id)?;
        utils::set_mode(path, READ_MODE)?;
        utils::write_atomic(path, id.as_str().as_bytes(), READ_MODE)?;
        Ok(id)
    }

    /// Replace the pointer at `path` with the content it names.
    pub fn restore(&self, path: &Path) -> AnnexResult<ObjectId> {
        let id = digest::read_pointer(path)?;
        self.fetch(&id, path)?;
        Ok(id)
    }

    /// Back up the objects named by `pointers`, each once, in first-seen order.
    ///
    /// Without `output` the archive goes to a fresh temporary file. Returns the
    /// archive path.
    pub fn backup_pointers(
        &self,
        pointers: &[PathBuf],
        output: Option<&Path>,
        progress: Progress<'_>,
    ) -> AnnexResult<PathBuf> {
        let mut ids: Vec<ObjectId> = Vec::new();
        for path in pointers {
            let id = digest::read_pointer(path)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        let output = match output {
            Some(p) => p.to_path_buf(),
            None => {
                let tmp = tempfile::Builder::new()
                    .prefix("annex-backup")
                    .suffix(".tar.gz")
                    .tempfile()
                    .map_err(|e| AnnexError::io(std::env::temp_dir(), e))?;
                let (_, path) = tmp.keep().map_err(|e| AnnexError::io(std::env::temp_dir(), e.error))?;
                path
            }
        };
        self.backup(&ids, &output, progress)?;
        Ok(output)
    }

    fn from_cache(&self, id: &ObjectId, dest: &Path) -> AnnexResult<bool> {
        let Some(cache) = &self.restore_cache else {
            return Ok(false);
        };
        let cached = cache.join(id.as_str());
        match fs::metadata(&cached) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(AnnexError::io(&cached, e)),
        }
        debug!("Restoring {} from cache {}", id, cache.display());
        utils::copy_atomic(&cached, dest, READ_MODE)?;
        Ok(true)
    }

    fn fill_cache(&self, id: &ObjectId, fetched: &Path) {
        let Some(cache) = &self.restore_cache else {
            return;
        };
        let result = fs::create_dir_all(cache)
            .map_err(|e| AnnexError::io(cache, e))
            .and_then(|_| utils::copy_atomic(fetched, &cache.join(id.as_str()), READ_MODE));
        if let Err(e) = result {
            warn!("Could not cache {}: {}", id, e);
        }
    }
}

impl AnnexBackend for Annex {
    fn kind(&self) -> &'static str {
        self.primary.kind()
    }

    fn get(&self, id: &ObjectId, dest: &Path) -> AnnexResult<bool> {
        if self.from_cache(id, dest)? {
            return Ok(true);
        }
        let mut found = self.primary.get(id, dest)?;
        if !found {
            if let Some(staging) = &self.staging {
                info!("{} not in {} annex, trying staging", id, self.primary.kind());
                found = staging.get(id, dest)?;
            }
        }
        if found {
            self.fill_cache(id, dest);
        }
        Ok(found)
    }

    fn delete(&self, id: &ObjectId) -> AnnexResult<()> {
        self.primary.delete(id)
    }

    fn list(&self) -> AnnexResult<Vec<ObjectEntry>> {
        self.primary.list()
    }

    fn push(&self, source: &Path, id: &ObjectId) -> AnnexResult<PushOutcome> {
        match &self.staging {
            Some(staging) => staging.push(source, id),
            None => self.primary.push(source, id),
        }
    }

    fn backup(&self, ids: &[ObjectId], output: &Path, progress: Progress<'_>) -> AnnexResult<()> {
        self.primary.backup(ids, output, progress)
    }
}
