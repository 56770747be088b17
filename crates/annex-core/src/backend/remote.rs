//! Read-only store served over HTTP(S).
//!
//! Objects and sidecars are fetched as `<origin>/<name>`. The origin cannot
//! be written, listed or pruned through this crate.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use super::{AnnexBackend, ArchiveWriter, ObjectEntry, Progress, PushOutcome};
use crate::digest::ObjectId;
use crate::error::{AnnexError, AnnexResult};
use crate::http_client::{Fetch, HttpClient};
use crate::utils::{self, READ_MODE};

const KIND: &str = "server";

#[derive(Clone)]
pub struct RemoteStore {
    origin: String,
    client: HttpClient,
}

impl RemoteStore {
    pub fn new(origin: &str, timeout: Duration) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            client: HttpClient::new(timeout),
        }
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}", self.origin, name)
    }

    /// Download `name` into `dest`; `false` on 404, `dest` untouched.
    fn download(&self, name: &str, dest: &Path) -> AnnexResult<bool> {
        let mut tmp = utils::temp_beside(dest)?;
        match self.client.fetch(&self.url(name), tmp.as_file_mut())? {
            Fetch::Found(n) => {
                debug!("Downloaded {} ({} bytes)", name, n);
                utils::persist(tmp, dest, READ_MODE)?;
                Ok(true)
            }
            Fetch::Missing => Ok(false),
        }
    }
}

impl AnnexBackend for RemoteStore {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn get(&self, id: &ObjectId, dest: &Path) -> AnnexResult<bool> {
        let found = self.download(id.as_str(), dest)?;
        if !found {
            debug!("{} not found on {}", id, self.origin);
        }
        Ok(found)
    }

    fn delete(&self, _id: &ObjectId) -> AnnexResult<()> {
        Err(AnnexError::unsupported("delete", KIND))
    }

    fn list(&self) -> AnnexResult<Vec<ObjectEntry>> {
        Err(AnnexError::unsupported("list", KIND))
    }

    fn push(&self, _source: &Path, _id: &ObjectId) -> AnnexResult<PushOutcome> {
        Err(AnnexError::unsupported("push", KIND))
    }

    fn backup(&self, ids: &[ObjectId], output: &Path, progress: Progress<'_>) -> AnnexResult<()> {
        let scratch = tempfile::Builder::new()
            .prefix("annex-backup")
            .tempdir()
            .map_err(|e| AnnexError::io(std::env::temp_dir(), e))?;
        let total = ids.len();
        let mut archive = ArchiveWriter::create(output)?;
        for (done, id) in ids.iter().enumerate() {
            for name in [id.as_str().to_string(), id.info_name()] {
                let local = scratch.path().join(&name);
                let mut file = File::create(&local).map_err(|e| AnnexError::io(&local, e))?;
                match self.client.fetch(&self.url(&name), &mut file)? {
                    Fetch::Found(_) => archive.add(&local, &name)?,
                    Fetch::Missing => warn!("{} not found on {}, skipping", name, self.origin),
                }
            }
            progress(done + 1, total);
        }
        archive.finish()
    }
}
