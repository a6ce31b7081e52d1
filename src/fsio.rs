//! Small filesystem helpers shared by the ledger and the reconcilers.

use crate::Result;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Atomic write-then-rename.
///
/// Config fragments and the ledger are replaced whole-file; combined with the
/// rename this makes individual project updates atomic at the filesystem
/// level even without locking.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a/b/file.conf");
        atomic_write(&path, "one").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "one");
        atomic_write(&path, "two").expect("rewrite");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn remove_if_exists_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gone.conf");
        fs::write(&path, "x").expect("write");
        assert!(remove_if_exists(&path).expect("first"));
        assert!(!remove_if_exists(&path).expect("second"));
    }
}
