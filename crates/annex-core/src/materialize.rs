//! Materialize a package directory: a copy where every pointer is replaced by
//! the object it names.
//!
//! Directories without pointers are left alone and no copy is made unless
//! forced. Pointers are recognized only among the direct entries.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::backend::AnnexBackend;
use crate::digest;
use crate::error::{AnnexError, AnnexResult};
use crate::utils;

const WORKSPACE_PREFIX: &str = "annex-sources";

/// Temporary directory created on demand; removed on drop unless kept.
#[derive(Debug, Default)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    /// Location of the copy, `None` when none was needed.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    pub fn is_created(&self) -> bool {
        self.dir.is_some()
    }

    /// Delete the copy now, surfacing removal errors.
    pub fn release(self) -> AnnexResult<()> {
        match self.dir {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().map_err(|e| AnnexError::io(path, e))
            }
            None => Ok(()),
        }
    }

    /// Detach the copy from this handle so it outlives it.
    pub fn keep(self) -> Option<PathBuf> {
        self.dir.map(TempDir::keep)
    }

    fn create(&mut self) -> AnnexResult<()> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(|e| AnnexError::io(std::env::temp_dir(), e))?;
        debug!("Created workspace {}", dir.path().display());
        self.dir = Some(dir);
        Ok(())
    }
}

/// Build a pointer-free copy of `directory` when it holds pointers (or when
/// `force` is set).
///
/// A missing directory has no entries. A pointer whose object no store
/// holds fails with [`AnnexError::NotFound`] and the partial copy is removed.
pub fn materialize(
    backend: &dyn AnnexBackend,
    directory: &Path,
    force: bool,
) -> AnnexResult<Workspace> {
    let mut workspace = Workspace::default();
    if force {
        workspace.create()?;
    }
    let mut pending: Vec<PathBuf> = Vec::new();

    for path in utils::sorted_entries(directory)? {
        let Some(name) = path.file_name() else {
            continue;
        };
        if !path.is_dir() && digest::is_pointer(&path) {
            if !workspace.is_created() {
                workspace.create()?;
                if let Some(root) = workspace.path() {
                    for plain in pending.drain(..) {
                        utils::copy_into(&plain, root)?;
                    }
                }
            }
            let id = digest::read_pointer(&path)?;
            if let Some(root) = workspace.path() {
                debug!("Resolving {} -> {}", path.display(), id);
                if !backend.get(&id, &root.join(name))? {
                    return Err(AnnexError::NotFound(id.to_string()));
                }
            }
        } else if let Some(root) = workspace.path() {
            utils::copy_into(&path, root)?;
        } else {
            pending.push(path);
        }
    }
    Ok(workspace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalStore;
    use std::fs;

    fn store_with(root: &Path, content: &[u8]) -> (LocalStore, String) {
        let store = LocalStore::new(root);
        let src = root.parent().unwrap().join("upload.bin");
        fs::write(&src, content).unwrap();
        let id = digest::digest(&src).unwrap();
        store.push(&src, &id).unwrap();
        (store, id.to_string())
    }

    #[test]
    fn test_no_pointers_no_workspace() {
        let td = tempfile::tempdir().unwrap();
        let pkg = td.path().join("pkg");
        fs::create_dir(&pkg).unwrap();
        fs::write(pkg.join("foo.spec"), b"Name: foo\n").unwrap();
        let store = LocalStore::new(td.path().join("annex"));
        let ws = materialize(&store, &pkg, false).unwrap();
        assert!(!ws.is_created());
        assert!(ws.path().is_none());
        ws.release().unwrap();
    }

    #[test]
    fn test_pointers_resolved_and_plain_files_backfilled() {
        let td = tempfile::tempdir().unwrap();
        let annex = td.path().join("annex");
        fs::create_dir(&annex).unwrap();
        let (store, id) = store_with(&annex, b"\x00tarball\xff");

        let pkg = td.path().join("pkg");
        fs::create_dir_all(pkg.join("patches")).unwrap();
        fs::write(pkg.join("a.spec"), b"Name: a\n").unwrap();
        fs::write(pkg.join("patches/fix.patch"), b"diff").unwrap();
        fs::write(pkg.join("m.tar.gz"), id.as_bytes()).unwrap();
        fs::write(pkg.join("z.txt"), b"late").unwrap();

        let ws = materialize(&store, &pkg, false).unwrap();
        let root = ws.path().unwrap().to_path_buf();
        assert_eq!(fs::read(root.join("a.spec")).unwrap(), b"Name: a\n");
        assert_eq!(fs::read(root.join("patches/fix.patch")).unwrap(), b"diff");
        assert_eq!(fs::read(root.join("m.tar.gz")).unwrap(), b"\x00tarball\xff");
        assert_eq!(fs::read(root.join("z.txt")).unwrap(), b"late");
        assert_eq!(fs::read(pkg.join("m.tar.gz")).unwrap(), id.as_bytes());

        ws.release().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_force_and_missing_directory() {
        let td = tempfile::tempdir().unwrap();
        let store = LocalStore::new(td.path().join("annex"));
        let ws = materialize(&store, &td.path().join("absent"), true).unwrap();
        let root = ws.path().unwrap().to_path_buf();
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
        let kept = ws.keep().unwrap();
        assert!(kept.is_dir());
        fs::remove_dir_all(kept).unwrap();

        let ws = materialize(&store, &td.path().join("absent"), false).unwrap();
        assert!(!ws.is_created());
    }

    #[test]
    fn test_unresolvable_pointer_fails() {
        let td = tempfile::tempdir().unwrap();
        let pkg = td.path().join("pkg");
        fs::create_dir(&pkg).unwrap();
        fs::write(pkg.join("src.tar.gz"), "d".repeat(64)).unwrap();
        let store = LocalStore::new(td.path().join("annex"));
        match materialize(&store, &pkg, false) {
            Err(AnnexError::NotFound(id)) => assert_eq!(id, "d".repeat(64)),
            other => panic!("expected NotFound, got {:?}", other.map(|w| w.is_created())),
        }
    }
}
