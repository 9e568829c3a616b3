use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::GitError;

/// Result of asking for a worktree to be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeRemoval {
    /// Nothing on disk at the derived path.
    Missing,
    Removed,
}

/// Replace `/` with `-` so a task worktree is always one flat directory.
fn flatten_branch(branch: &str) -> String {
    branch.replace('/', "-")
}

/// Turn `git@host:owner/repo.git` into `https://host/owner/repo` and drop any
/// trailing `.git`.
pub fn normalize_remote_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.starts_with("git@") {
        url = url.replacen(':', "/", 1).replacen("git@", "https://", 1);
    }
    if let Some(stripped) = url.strip_suffix(".git") {
        url = stripped.to_string();
    }
    url
}

/// The only component that runs `git`. Every command runs in `workdir`,
/// which the workflow moves when a session relocates into or out of a
/// worktree.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    main_branch: String,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>, main_branch: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            main_branch: main_branch.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn relocate(&mut self, dir: impl Into<PathBuf>) {
        self.workdir = dir.into();
        tracing::debug!(workdir = %self.workdir.display(), "git workdir relocated");
    }

    fn run_in(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        tracing::debug!(dir = %dir.display(), args = ?args, "running git");
        let output = Command::new("git").current_dir(dir).args(args).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        self.run_in(&self.workdir, args)
    }

    pub fn ensure_repository(&self) -> Result<(), GitError> {
        match self.run(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) if out.trim() == "true" => Ok(()),
            Ok(_) | Err(GitError::CommandFailed { .. }) => Err(GitError::NotARepository),
            Err(e) => Err(e),
        }
    }

    pub fn current_branch(&self) -> Result<String, GitError> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let reference = format!("refs/heads/{}", name);
        match self.run(&["rev-parse", "--verify", "--quiet", &reference]) {
            Ok(_) => Ok(true),
            Err(GitError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Switch to `name`, creating it from HEAD when it does not exist yet.
    /// A failed switch is returned as-is; it never falls back to creation.
    pub fn create_or_switch_branch(&self, name: &str) -> Result<(), GitError> {
        if self.branch_exists(name)? {
            tracing::info!(branch = name, "branch exists, switching");
            self.run(&["checkout", name])?;
        } else {
            tracing::info!(branch = name, "creating branch");
            self.run(&["checkout", "-b", name])?;
        }
        Ok(())
    }

    pub fn push_branch(&self, name: &str) -> Result<(), GitError> {
        tracing::info!(branch = name, "pushing branch");
        self.run(&["push", "-u", "origin", name])?;
        Ok(())
    }

    /// Normalized HTTPS remote URL of `origin`, or an empty string if there is none.
    pub fn remote_url(&self) -> String {
        match self.run(&["config", "--get", "remote.origin.url"]) {
            Ok(url) => normalize_remote_url(&url),
            Err(_) => String::new(),
        }
    }

    pub fn has_uncommitted_changes(&self) -> Result<bool, GitError> {
        let output = self.run(&["status", "--porcelain"])?;
        Ok(!output.trim().is_empty())
    }

    pub fn stage_all(&self) -> Result<(), GitError> {
        self.run(&["add", "-A"])?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> Result<(), GitError> {
        tracing::info!("committing staged changes");
        self.run(&["commit", "-m", message])?;
        Ok(())
    }

    /// Configured main branch; never auto-detected.
    pub fn main_branch(&self) -> &str {
        &self.main_branch
    }

    pub fn checkout(&self, branch_name: &str) -> Result<(), GitError> {
        tracing::info!(branch = branch_name, "checking out");
        self.run(&["checkout", branch_name])?;
        Ok(())
    }

    /// Pull `branch_name` from origin into the current checkout.
    pub fn pull(&self, branch_name: &str) -> Result<(), GitError> {
        tracing::info!(branch = branch_name, "pulling");
        self.run(&["pull", "origin", branch_name])?;
        Ok(())
    }

    pub fn delete_local_branch(&self, name: &str) -> Result<(), GitError> {
        tracing::info!(branch = name, "deleting local branch");
        self.run(&["branch", "-d", name])?;
        Ok(())
    }

    pub fn delete_remote_branch(&self, name: &str) -> Result<(), GitError> {
        tracing::info!(branch = name, "deleting remote branch");
        self.run(&["push", "origin", "--delete", name])?;
        Ok(())
    }

    pub fn diff_staged(&self) -> Result<String, GitError> {
        self.run(&["diff", "--staged"])
    }

    /// Changes on `branch` since it forked from `base`.
    pub fn diff_between(&self, branch: &str, base: &str) -> Result<String, GitError> {
        let range = format!("{}...{}", base, branch);
        self.run(&["diff", &range])
    }

    /// Root of the current working tree (a linked worktree's own root when
    /// run inside one).
    pub fn toplevel(&self) -> Result<PathBuf, GitError> {
        self.run(&["rev-parse", "--show-toplevel"]).map(PathBuf::from)
    }

    /// Root of the primary working tree, shared by every linked worktree.
    pub fn primary_root(&self) -> Result<PathBuf, GitError> {
        let common = self.run(&["rev-parse", "--path-format=absolute", "--git-common-dir"])?;
        let common = PathBuf::from(common);
        match common.parent() {
            Some(parent) if common.file_name().is_some_and(|n| n == ".git") => {
                Ok(parent.to_path_buf())
            }
            _ => self.toplevel(),
        }
    }

    /// True when the workdir belongs to a linked worktree rather than the
    /// primary checkout.
    pub fn in_linked_worktree(&self) -> Result<bool, GitError> {
        let top = canonical(&self.toplevel()?);
        let primary = canonical(&self.primary_root()?);
        Ok(top != primary)
    }

    /// Directory that holds the primary checkout; worktrees live next to it.
    pub fn worktree_base_path(&self) -> Result<PathBuf, GitError> {
        let root = self.primary_root()?;
        Ok(root.parent().map(Path::to_path_buf).unwrap_or(root))
    }

    /// `<parent>/<repo>-worktree/<task_id>-<branch with / replaced by ->`
    pub fn worktree_path_for(&self, branch_name: &str, task_id: u64) -> Result<PathBuf, GitError> {
        let root = self.primary_root()?;
        let repo_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "repo".to_string());
        Ok(self
            .worktree_base_path()?
            .join(format!("{}-worktree", repo_name))
            .join(format!("{}-{}", task_id, flatten_branch(branch_name))))
    }

    /// Create the task worktree, or return the existing path untouched.
    /// A new branch is created from the main branch; an existing local branch
    /// is attached as-is.
    pub fn create_worktree(&self, branch_name: &str, task_id: u64) -> Result<PathBuf, GitError> {
        let worktree_path = self.worktree_path_for(branch_name, task_id)?;
        if worktree_path.exists() {
            tracing::info!(path = %worktree_path.display(), "worktree already exists, reusing");
            return Ok(worktree_path);
        }

        let primary = self.primary_root()?;
        let path_arg = worktree_path.to_string_lossy().to_string();
        if self.branch_exists(branch_name)? {
            tracing::info!(branch = branch_name, path = %path_arg, "creating worktree for existing branch");
            self.run_in(&primary, &["worktree", "add", &path_arg, branch_name])?;
        } else {
            tracing::info!(branch = branch_name, path = %path_arg, base = %self.main_branch, "creating worktree");
            self.run_in(
                &primary,
                &["worktree", "add", &path_arg, "-b", branch_name, &self.main_branch],
            )?;
        }

        Ok(worktree_path)
    }

    /// Remove the task worktree. If the workdir is inside it, the main branch
    /// is checked out in the primary working tree and the workdir moves there
    /// before removal.
    pub fn remove_worktree(&mut self, branch_name: &str, task_id: u64) -> Result<WorktreeRemoval, GitError> {
        let worktree_path = self.worktree_path_for(branch_name, task_id)?;
        if !worktree_path.exists() {
            tracing::info!(path = %worktree_path.display(), "worktree does not exist, skipping");
            return Ok(WorktreeRemoval::Missing);
        }

        let primary = self.primary_root()?;
        if canonical(&self.workdir).starts_with(canonical(&worktree_path)) {
            if self.run_in(&primary, &["rev-parse", "--abbrev-ref", "HEAD"])? != self.main_branch {
                self.run_in(&primary, &["checkout", &self.main_branch])?;
            }
            self.relocate(primary.clone());
        }

        let path_arg = worktree_path.to_string_lossy().to_string();
        tracing::info!(path = %path_arg, "removing worktree");
        self.run_in(&primary, &["worktree", "remove", &path_arg])?;
        Ok(WorktreeRemoval::Removed)
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
