//! Filesystem helpers: atomic placement, permissions, tree copies.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{AnnexError, AnnexResult};

/// Mode for files handed to callers.
pub const READ_MODE: u32 = 0o644;
/// Mode for files inside a store, shared by the publishing group.
pub const WRITE_MODE: u32 = 0o664;

fn parent_dir(dest: &Path) -> &Path {
    match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Temporary file next to `dest`, so the final rename stays on one filesystem.
pub fn temp_beside(dest: &Path) -> AnnexResult<NamedTempFile> {
    let dir = parent_dir(dest);
    NamedTempFile::new_in(dir).map_err(|e| AnnexError::io(dir, e))
}

/// Atomically move a finished temporary file onto `dest` and set its mode.
pub fn persist(tmp: NamedTempFile, dest: &Path, mode: u32) -> AnnexResult<()> {
    tmp.as_file()
        .sync_all()
        .map_err(|e| AnnexError::io(tmp.path(), e))?;
    tmp.persist(dest).map_err(|e| AnnexError::io(dest, e.error))?;
    set_mode(dest, mode)
}

/// Copy `src` to `dest` without ever exposing a partially written `dest`.
pub fn copy_atomic(src: &Path, dest: &Path, mode: u32) -> AnnexResult<u64> {
    let mut input = File::open(src).map_err(|e| AnnexError::io(src, e))?;
    let mut tmp = temp_beside(dest)?;
    let n = io::copy(&mut input, tmp.as_file_mut()).map_err(|e| AnnexError::io(dest, e))?;
    persist(tmp, dest, mode)?;
    Ok(n)
}

/// Write `content` to `dest` through a temporary file.
pub fn write_atomic(dest: &Path, content: &[u8], mode: u32) -> AnnexResult<()> {
    let mut tmp = temp_beside(dest)?;
    tmp.write_all(content)
        .map_err(|e| AnnexError::io(dest, e))?;
    persist(tmp, dest, mode)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> AnnexResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| AnnexError::io(path, e))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> AnnexResult<()> {
    Ok(())
}

/// Copy a file or a whole directory tree into `dest_dir`, keeping its name.
pub fn copy_into(src: &Path, dest_dir: &Path) -> AnnexResult<()> {
    let Some(name) = src.file_name() else {
        return Ok(());
    };
    let dest = dest_dir.join(name);
    if src.is_dir() {
        fs::create_dir_all(&dest).map_err(|e| AnnexError::io(&dest, e))?;
        for entry in fs::read_dir(src).map_err(|e| AnnexError::io(src, e))? {
            let entry = entry.map_err(|e| AnnexError::io(src, e))?;
            copy_into(&entry.path(), &dest)?;
        }
    } else {
        fs::copy(src, &dest).map_err(|e| AnnexError::io(&dest, e))?;
    }
    Ok(())
}

/// Sorted direct entries of `dir`; a missing directory has none.
pub fn sorted_entries(dir: &Path) -> AnnexResult<Vec<PathBuf>> {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AnnexError::io(dir, e)),
    };
    let mut paths = Vec::new();
    for entry in rd {
        paths.push(entry.map_err(|e| AnnexError::io(dir, e))?.path());
    }
    paths.sort();
    Ok(paths)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
