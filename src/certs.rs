//! Wildcard certificate detection.
//!
//! Certificate generation happens outside this tool (mkcert or similar);
//! here we only check whether a wildcard pair for the TLD is present, which
//! decides whether generated URLs use the secure scheme.

use crate::context::StateDirs;
use std::path::PathBuf;

/// Expected file names for a wildcard pair covering `*.<tld>`.
pub fn wildcard_pair(dirs: &StateDirs, tld: &str) -> (PathBuf, PathBuf) {
    let certs = dirs.certs_dir();
    (
        certs.join(format!("_wildcard.{}.pem", tld)),
        certs.join(format!("_wildcard.{}-key.pem", tld)),
    )
}

/// True when both the certificate and its key exist.
pub fn wildcard_present(dirs: &StateDirs, tld: &str) -> bool {
    let (cert, key) = wildcard_pair(dirs, tld);
    cert.is_file() && key.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn absent_without_both_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dirs = StateDirs::under(dir.path().to_path_buf());
        assert!(!wildcard_present(&dirs, "test"));

        fs::create_dir_all(dirs.certs_dir()).expect("mkdir");
        let (cert, key) = wildcard_pair(&dirs, "test");
        fs::write(&cert, "cert").expect("write cert");
        assert!(!wildcard_present(&dirs, "test"));

        fs::write(&key, "key").expect("write key");
        assert!(wildcard_present(&dirs, "test"));
    }
}
