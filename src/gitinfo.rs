//! Best-effort git summary for status display.
//!
//! Purely cosmetic: every failure (not a repo, bare repo, detached head,
//! unreadable index) collapses to `None` and is never surfaced.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSummary {
    pub branch: String,
    pub dirty_files: usize,
}

impl GitSummary {
    pub fn one_line(&self) -> String {
        if self.dirty_files == 0 {
            format!("on {}", self.branch)
        } else {
            format!("on {} ({} changed)", self.branch, self.dirty_files)
        }
    }
}

/// Summarize the repository containing `dir`, if there is one.
pub fn summarize(dir: &Path) -> Option<GitSummary> {
    let repo = git2::Repository::discover(dir).ok()?;

    let head = repo.head().ok()?;
    let branch = if head.is_branch() {
        head.shorthand()?.to_string()
    } else {
        // Detached: show the short id instead of a branch name.
        head.peel_to_commit()
            .ok()?
            .id()
            .to_string()
            .chars()
            .take(8)
            .collect()
    };

    let mut options = git2::StatusOptions::new();
    options.include_untracked(true).exclude_submodules(true);
    let dirty_files = repo
        .statuses(Some(&mut options))
        .map(|statuses| statuses.len())
        .unwrap_or(0);

    Some(GitSummary {
        branch,
        dirty_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_repo_directory_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(summarize(dir.path()).is_none());
    }

    #[test]
    fn fresh_repo_summarizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = git2::Repository::init(dir.path()).expect("init");

        // One commit so HEAD points at a real branch.
        let sig = git2::Signature::now("t", "t@example.com").expect("sig");
        let tree_id = {
            let mut index = repo.index().expect("index");
            index.write_tree().expect("tree")
        };
        let tree = repo.find_tree(tree_id).expect("find tree");
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .expect("commit");

        let summary = summarize(dir.path()).expect("summary");
        assert!(!summary.branch.is_empty());
        assert_eq!(summary.dirty_files, 0);
        assert!(summary.one_line().starts_with("on "));
    }

    #[test]
    fn dirty_count_reflects_untracked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = git2::Repository::init(dir.path()).expect("init");
        let sig = git2::Signature::now("t", "t@example.com").expect("sig");
        let tree_id = {
            let mut index = repo.index().expect("index");
            index.write_tree().expect("tree")
        };
        let tree = repo.find_tree(tree_id).expect("find tree");
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .expect("commit");

        std::fs::write(dir.path().join("scratch.txt"), "x").expect("write");
        let summary = summarize(dir.path()).expect("summary");
        assert_eq!(summary.dirty_files, 1);
        assert!(summary.one_line().contains("1 changed"));
    }
}
