//! Exclusive working locations for approaches.
//!
//! Every approach gets its own directory. [`GitWorktreeWorkspaces`] backs each
//! one with a `git worktree` on a dedicated branch so candidates can be
//! inspected and diffed after the tournament.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Errors raised while provisioning workspaces or resolving repositories.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("repository not found: {0}")]
    RepoNotFound(PathBuf),

    #[error("not a git repository: {0}")]
    NotAGitRepo(PathBuf),

    #[error("repository must be an existing directory or a git URL, got {0:?}")]
    InvalidRepo(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for workspace operations.
pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

/// Working location handed to one approach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub approach: String,

    pub path: PathBuf,

    /// Branch reference when the location is a git worktree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Provisions one exclusive [`Workspace`] per approach.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn provision(&self, approach: &str) -> WorkspaceResult<Workspace>;
}

/// Filesystem-safe, lowercase rendition of an approach name.
///
/// Runs of characters outside `[a-z0-9._-]` collapse to a single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "approach".to_string()
    } else {
        slug.to_string()
    }
}

/// Branch used for an approach's worktree.
pub fn branch_name(approach: &str) -> String {
    format!("agentfleet/{}", slugify(approach))
}

// ---------------------------------------------------------------------------
// Plain directories
// ---------------------------------------------------------------------------

/// One fresh directory per approach under `base_dir`.
#[derive(Debug, Clone)]
pub struct DirectoryWorkspaces {
    base_dir: PathBuf,
}

impl DirectoryWorkspaces {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl WorkspaceProvider for DirectoryWorkspaces {
    async fn provision(&self, approach: &str) -> WorkspaceResult<Workspace> {
        let path = self.base_dir.join(slugify(approach));
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&path).await?;
        debug!(approach, path = %path.display(), "provisioned directory workspace");
        Ok(Workspace {
            approach: approach.to_string(),
            path,
            branch: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Git worktrees
// ---------------------------------------------------------------------------

/// One `git worktree` per approach, branched from the repository's HEAD.
#[derive(Debug, Clone)]
pub struct GitWorktreeWorkspaces {
    repo: PathBuf,
    base_dir: PathBuf,
}

impl GitWorktreeWorkspaces {
    /// `repo` must be a git work tree; worktrees are created under `base_dir`.
    pub fn new(repo: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            base_dir: base_dir.into(),
        }
    }

    async fn add_worktree(&self, branch: &str, path: &Path) -> WorkspaceResult<()> {
        let path_arg = path.to_string_lossy();
        run_git(&self.repo, &["worktree", "add", "-b", branch, &path_arg]).await?;
        Ok(())
    }

    /// Remove whatever a previous run left behind for `branch` / `path`.
    async fn clear_stale(&self, branch: &str, path: &Path) -> WorkspaceResult<()> {
        let path_arg = path.to_string_lossy();
        // Either may legitimately be absent.
        let _ = run_git(&self.repo, &["worktree", "remove", "--force", &path_arg]).await;
        let _ = run_git(&self.repo, &["worktree", "prune"]).await;
        let _ = run_git(&self.repo, &["branch", "-D", branch]).await;
        if tokio::fs::try_exists(path).await? {
            tokio::fs::remove_dir_all(path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceProvider for GitWorktreeWorkspaces {
    async fn provision(&self, approach: &str) -> WorkspaceResult<Workspace> {
        if !tokio::fs::try_exists(&self.repo).await? {
            return Err(WorkspaceError::RepoNotFound(self.repo.clone()));
        }
        if !is_git_repo(&self.repo).await {
            return Err(WorkspaceError::NotAGitRepo(self.repo.clone()));
        }

        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = std::path::absolute(self.base_dir.join(slugify(approach)))?;
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_dir_all(&path).await?;
        }

        let branch = branch_name(approach);
        if let Err(first) = self.add_worktree(&branch, &path).await {
            warn!(approach, branch = %branch, error = %first, "recreating stale worktree");
            self.clear_stale(&branch, &path).await?;
            self.add_worktree(&branch, &path).await.map_err(|e| {
                WorkspaceError::Git(format!(
                    "failed to create worktree {branch} in {}: {e}",
                    self.repo.display()
                ))
            })?;
        }

        info!(approach, branch = %branch, path = %path.display(), "provisioned worktree");
        Ok(Workspace {
            approach: approach.to_string(),
            path,
            branch: Some(branch),
        })
    }
}

// ---------------------------------------------------------------------------
// Repository helpers
// ---------------------------------------------------------------------------

async fn run_git(dir: &Path, args: &[&str]) -> WorkspaceResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| WorkspaceError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WorkspaceError::Git(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check whether a directory is inside a git work tree.
pub async fn is_git_repo(dir: &Path) -> bool {
    run_git(dir, &["rev-parse", "--is-inside-work-tree"])
        .await
        .is_ok()
}

/// Capture the HEAD commit SHA of a repository.
pub async fn capture_head_sha(repo_dir: &Path) -> WorkspaceResult<String> {
    let sha = run_git(repo_dir, &["rev-parse", "HEAD"]).await?;
    if sha.is_empty() {
        return Err(WorkspaceError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// Heuristic: `http(s)://` or `git@` prefix, or a `.git` suffix.
pub fn looks_like_git_url(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    lowered.starts_with("http://")
        || lowered.starts_with("https://")
        || lowered.starts_with("git@")
        || lowered.ends_with(".git")
}

/// Deterministic cache folder name for a remote: the last three path tokens.
pub fn remote_slug(remote: &str) -> String {
    let cleaned = remote.trim().trim_end_matches('/').replace(':', "/");
    let cleaned = cleaned.strip_suffix(".git").unwrap_or(&cleaned);
    let cleaned = cleaned.split_once("://").map_or(cleaned, |(_, rest)| rest);

    let tokens: Vec<&str> = cleaned.split('/').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return "repo".to_string();
    }
    tokens[tokens.len().saturating_sub(3)..]
        .join("-")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Resolve a path or git URL to a local git work tree.
///
/// Existing paths are validated in place. URLs are cloned once into
/// `<work_dir>/repos/<slug>` and reused on later runs.
pub async fn resolve_repo(repo: &str, work_dir: &Path) -> WorkspaceResult<PathBuf> {
    let repo = repo.trim();
    if repo.is_empty() {
        return Err(WorkspaceError::InvalidRepo(repo.to_string()));
    }

    let candidate = PathBuf::from(repo);
    if tokio::fs::try_exists(&candidate).await? {
        let path = tokio::fs::canonicalize(&candidate).await?;
        ensure_git_repo(&path).await?;
        return Ok(path);
    }

    if !looks_like_git_url(repo) {
        return Err(WorkspaceError::InvalidRepo(repo.to_string()));
    }

    let cache_root = work_dir.join("repos");
    tokio::fs::create_dir_all(&cache_root).await?;
    let target = cache_root.join(remote_slug(repo));

    if tokio::fs::try_exists(&target).await? {
        ensure_git_repo(&target).await?;
        return Ok(target);
    }

    info!(remote = repo, target = %target.display(), "cloning repository");
    let target_arg = target.to_string_lossy();
    if let Err(e) = run_git(&cache_root, &["clone", repo, &target_arg]).await {
        let _ = tokio::fs::remove_dir_all(&target).await;
        return Err(WorkspaceError::Git(format!(
            "failed to clone repository {repo}: {e}"
        )));
    }
    ensure_git_repo(&target).await?;
    Ok(target)
}

async fn ensure_git_repo(path: &Path) -> WorkspaceResult<()> {
    if is_git_repo(path).await {
        Ok(())
    } else {
        Err(WorkspaceError::NotAGitRepo(path.to_path_buf()))
    }
}
