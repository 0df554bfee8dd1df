//! Spec-change detection: which files did a commit modify?
//!
//! The classifier asks this to discard flaky commit-groups that merely
//! reflect an edit to the test's own spec file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

/// Failure to determine the files changed by a commit.
#[derive(Debug, thiserror::Error)]
pub enum ChangeDetectionError {
    #[error("invalid commit sha: {0}")]
    InvalidCommit(String),

    #[error("invalid repository path component: {0}")]
    InvalidPath(String),

    #[error("no local checkout at {0}")]
    MissingCheckout(PathBuf),

    #[error("git error: {0}")]
    Git(String),
}

/// Lists the files modified by a commit of `owner/repo`.
#[async_trait]
pub trait SpecChangeDetector: Send + Sync {
    async fn modified_files(
        &self,
        owner: &str,
        repo: &str,
        commit_sha: &str,
    ) -> Result<Vec<String>, ChangeDetectionError>;
}

fn is_commit_sha(candidate: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[0-9a-fA-F]{4,64}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(candidate))
}

fn safe_component(part: &str) -> Result<&str, ChangeDetectionError> {
    if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\']) {
        return Err(ChangeDetectionError::InvalidPath(part.to_string()));
    }
    Ok(part)
}

/// Whether `changed` (a repo-relative path from git) is `spec_file`.
///
/// Reporters sometimes emit spec paths relative to a sub-project, so a
/// suffix match on a path boundary also counts.
pub fn same_file(changed: &str, spec_file: &str) -> bool {
    let changed = changed.trim_start_matches("./");
    let spec = spec_file.trim_start_matches("./");
    if spec.is_empty() || changed.is_empty() {
        return false;
    }
    changed == spec
        || changed.ends_with(&format!("/{spec}"))
        || spec.ends_with(&format!("/{changed}"))
}

// ---------------------------------------------------------------------------
// Local git checkouts
// ---------------------------------------------------------------------------

/// Reads commit diffs from local clones at `<checkout_root>/<owner>/<repo>`.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    checkout_root: PathBuf,
}

impl GitChangeDetector {
    pub fn new(checkout_root: impl Into<PathBuf>) -> Self {
        Self {
            checkout_root: checkout_root.into(),
        }
    }

    pub fn checkout_root(&self) -> &Path {
        &self.checkout_root
    }

    fn checkout_dir(&self, owner: &str, repo: &str) -> Result<PathBuf, ChangeDetectionError> {
        let dir = self
            .checkout_root
            .join(safe_component(owner)?)
            .join(safe_component(repo)?);
        if !dir.is_dir() {
            return Err(ChangeDetectionError::MissingCheckout(dir));
        }
        Ok(dir)
    }
}

#[async_trait]
impl SpecChangeDetector for GitChangeDetector {
    async fn modified_files(
        &self,
        owner: &str,
        repo: &str,
        commit_sha: &str,
    ) -> Result<Vec<String>, ChangeDetectionError> {
        if !is_commit_sha(commit_sha) {
            return Err(ChangeDetectionError::InvalidCommit(commit_sha.to_string()));
        }
        let dir = self.checkout_dir(owner, repo)?;

        let output = Command::new("git")
            .args(["diff-tree", "--no-commit-id", "--name-only", "-r", "--root"])
            .arg(commit_sha)
            .current_dir(&dir)
            .output()
            .await
            .map_err(|e| ChangeDetectionError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChangeDetectionError::Git(format!(
                "git diff-tree {commit_sha} failed: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fixed answers
// ---------------------------------------------------------------------------

/// Reports that no commit changed anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChangeDetector;

#[async_trait]
impl SpecChangeDetector for NoChangeDetector {
    async fn modified_files(
        &self,
        _owner: &str,
        _repo: &str,
        _commit_sha: &str,
    ) -> Result<Vec<String>, ChangeDetectionError> {
        Ok(Vec::new())
    }
}

/// Serves a fixed commit → files map; commits listed in `failing` error out.
#[derive(Debug, Default, Clone)]
pub struct StaticChangeDetector {
    changes: HashMap<String, Vec<String>>,
    failing: Vec<String>,
}

impl StaticChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change(mut self, commit_sha: &str, files: &[&str]) -> Self {
        self.changes.insert(
            commit_sha.to_string(),
            files.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    pub fn with_failure(mut self, commit_sha: &str) -> Self {
        self.failing.push(commit_sha.to_string());
        self
    }
}

#[async_trait]
impl SpecChangeDetector for StaticChangeDetector {
    async fn modified_files(
        &self,
        _owner: &str,
        _repo: &str,
        commit_sha: &str,
    ) -> Result<Vec<String>, ChangeDetectionError> {
        if self.failing.iter().any(|c| c == commit_sha) {
            return Err(ChangeDetectionError::Git(format!("unknown revision {commit_sha}")));
        }
        Ok(self.changes.get(commit_sha).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// `<root>/acme/web` with two commits; returns (root, first sha, second sha).
    fn make_checkout() -> (tempfile::TempDir, String, String) {
        let root = tempfile::tempdir().unwrap();
        let repo = root.path().join("acme").join("web");
        std::fs::create_dir_all(repo.join("cypress/e2e")).unwrap();
        run_git(&repo, &["init"]);
        run_git(&repo, &["config", "user.name", "test-user"]);
        run_git(&repo, &["config", "user.email", "test@example.com"]);

        std::fs::write(repo.join("README.md"), "web").unwrap();
        run_git(&repo, &["add", "."]);
        run_git(&repo, &["commit", "-m", "initial"]);
        let first = run_git(&repo, &["rev-parse", "HEAD"]);

        std::fs::write(repo.join("cypress/e2e/login.cy.ts"), "it('logs in')").unwrap();
        run_git(&repo, &["add", "."]);
        run_git(&repo, &["commit", "-m", "add login spec"]);
        let second = run_git(&repo, &["rev-parse", "HEAD"]);

        (root, first, second)
    }

    #[tokio::test]
    async fn git_detector_lists_files_of_commit() {
        let (root, first, second) = make_checkout();
        let detector = GitChangeDetector::new(root.path());

        let files = detector.modified_files("acme", "web", &second).await.unwrap();
        assert_eq!(files, vec!["cypress/e2e/login.cy.ts".to_string()]);

        let files = detector.modified_files("acme", "web", &first).await.unwrap();
        assert_eq!(files, vec!["README.md".to_string()]);
    }

    #[tokio::test]
    async fn git_detector_rejects_bad_input() {
        let (root, _, _) = make_checkout();
        let detector = GitChangeDetector::new(root.path());

        let err = detector.modified_files("acme", "web", "--output=x").await.unwrap_err();
        assert!(matches!(err, ChangeDetectionError::InvalidCommit(_)));

        let err = detector.modified_files("..", "web", "abc1234").await.unwrap_err();
        assert!(matches!(err, ChangeDetectionError::InvalidPath(_)));

        let err = detector.modified_files("acme", "api", "abc1234").await.unwrap_err();
        assert!(matches!(err, ChangeDetectionError::MissingCheckout(_)));

        let err = detector.modified_files("acme", "web", "deadbeef").await.unwrap_err();
        assert!(matches!(err, ChangeDetectionError::Git(_)));
    }

    #[test]
    fn same_file_matches_on_path_boundary() {
        assert!(same_file("cypress/e2e/login.cy.ts", "cypress/e2e/login.cy.ts"));
        assert!(same_file("apps/web/cypress/e2e/login.cy.ts", "cypress/e2e/login.cy.ts"));
        assert!(same_file("./e2e/login.cy.ts", "e2e/login.cy.ts"));
        assert!(!same_file("cypress/e2e/relogin.cy.ts", "login.cy.ts"));
        assert!(!same_file("", "login.cy.ts"));
    }

    #[tokio::test]
    async fn static_detector_serves_map_and_failures() {
        let detector = StaticChangeDetector::new()
            .with_change("c1", &["a.cy.ts"])
            .with_failure("c2");
        assert_eq!(detector.modified_files("o", "r", "c1").await.unwrap(), vec!["a.cy.ts"]);
        assert!(detector.modified_files("o", "r", "c2").await.is_err());
        assert!(detector.modified_files("o", "r", "c3").await.unwrap().is_empty());
    }
}
