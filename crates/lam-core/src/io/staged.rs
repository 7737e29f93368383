//! Staged writes.
//!
//! Content is written to a temporary file in the destination's directory and
//! renamed over the destination only when [`StagedFile::commit`] is called.
//! Dropping a `StagedFile` without committing removes the temporary file, so
//! a partial payload is never visible under the final name. A process that
//! dies mid-write leaves at worst a `.lam-*.part` file behind, which
//! [`is_staging_file`] recognizes for cleanup.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

const STAGING_PREFIX: &str = ".lam-";
const STAGING_SUFFIX: &str = ".part";

/// A pending write that becomes visible atomically on commit.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
    dest: PathBuf,
}

impl StagedFile {
    /// Opens a staging file next to `dest`.
    pub fn create(dest: &Path) -> io::Result<Self> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(dir)?;
        Ok(Self {
            file,
            dest: dest.to_path_buf(),
        })
    }

    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Final destination.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Bytes written so far.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> io::Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Flushes, syncs and renames the staged content over the destination.
    pub fn commit(mut self) -> io::Result<PathBuf> {
        self.file.flush()?;
        self.file.as_file().sync_all()?;
        apply_permissions(self.file.path(), &self.dest)?;

        let dest = self.dest;
        self.file.persist(&dest).map_err(|e| e.error)?;
        Ok(dest)
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Writes `bytes` to `dest` through a staging file.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut staged = StagedFile::create(dest)?;
    staged.write_all(bytes)?;
    staged.commit()?;
    Ok(())
}

/// Whether `path` is a leftover staging file.
pub fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(STAGING_PREFIX) && n.ends_with(STAGING_SUFFIX))
}

// Temp files are created owner-only; keep the destination's mode when
// replacing, otherwise fall back to the usual world-readable default.
fn apply_permissions(staged: &Path, dest: &Path) -> io::Result<()> {
    if let Ok(meta) = fs::metadata(dest) {
        return fs::set_permissions(staged, meta.permissions());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staged, fs::Permissions::from_mode(0o644))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("gameinfo.txt");
        fs::write(&dest, b"old").unwrap();

        write_atomic(&dest, b"new contents").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new contents");
    }

    #[test]
    fn test_drop_before_commit_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("gameinfo.txt");
        fs::write(&dest, b"pristine").unwrap();

        let staged_path = {
            let mut staged = StagedFile::create(&dest).unwrap();
            staged.write_all(b"half of the new").unwrap();
            assert!(is_staging_file(staged.path()));
            staged.path().to_path_buf()
            // interrupted: never committed
        };

        assert_eq!(fs::read(&dest).unwrap(), b"pristine");
        assert!(!staged_path.exists());
    }

    #[test]
    fn test_staging_file_names() {
        assert!(is_staging_file(Path::new("/x/.lam-abc123.part")));
        assert!(!is_staging_file(Path::new("/x/1234.vpk")));
        assert!(!is_staging_file(Path::new("/x/.lam-abc123")));
    }

    #[cfg(unix)]
    #[test]
    fn test_commit_keeps_destination_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file");
        fs::write(&dest, b"a").unwrap();
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&dest, b"b").unwrap();
        let mode = fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }
}
