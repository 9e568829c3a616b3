//! The `start` / `submit` / `done` / `review` state machine.
//!
//! Fatal failures come back as `WorkflowError`. Failures in optional steps
//! (bookkeeping, AI, pull requests, comments, cleanup) are collected as
//! `Advisory` values on the outcome and the command keeps going.

use std::path::PathBuf;

use crate::ai::{self, AiClient, CodeReviewer, ReviewReport};
use crate::backend::{TaskBackend, TaskRecord, TaskStatus, TaskUpdate};
use crate::branch::{self, TaskType};
use crate::comments::ReviewCommentProvider;
use crate::config::Settings;
use crate::error::{ProviderError, WorkflowError};
use crate::git::{Git, WorktreeRemoval};
use crate::hosting::{self, HostingProvider, PullRequestInfo};

/// Operator interaction needed by `submit`.
pub trait Prompter {
    fn confirm(&mut self, question: &str, default: bool) -> bool;
    fn input(&mut self, question: &str) -> String;
}

/// A non-fatal failure the operator should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    TaskFetchFailed { task_id: u64, reason: String },
    StatusUpdateFailed { task_id: u64, status: TaskStatus, reason: String },
    AiFailed { step: &'static str, reason: String },
    DiffFailed { reason: String },
    PullRequestFailed { reason: String },
    NoPullRequest,
    CommentsNotPublished { reason: String },
    CommentsPartiallyPublished { posted: usize, total: usize },
    BranchDeleteFailed { branch: String, remote: bool, reason: String },
    WorktreeRemovalFailed { reason: String },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::TaskFetchFailed { task_id, reason } => {
                write!(f, "could not fetch task #{}: {}", task_id, reason)
            }
            Advisory::StatusUpdateFailed { task_id, status, reason } => {
                write!(f, "could not set task #{} to {}: {}", task_id, status, reason)
            }
            Advisory::AiFailed { step, reason } => write!(f, "AI {} failed: {}", step, reason),
            Advisory::DiffFailed { reason } => {
                write!(f, "could not diff against the main branch: {}", reason)
            }
            Advisory::PullRequestFailed { reason } => {
                write!(f, "pull request was not created: {}", reason)
            }
            Advisory::NoPullRequest => write!(f, "no open pull request found for this branch"),
            Advisory::CommentsNotPublished { reason } => {
                write!(f, "review comments were not published: {}", reason)
            }
            Advisory::CommentsPartiallyPublished { posted, total } => {
                write!(f, "only {} of {} review comments were published", posted, total)
            }
            Advisory::BranchDeleteFailed { branch, remote, reason } => {
                let kind = if *remote { "remote" } else { "local" };
                write!(f, "could not delete {} branch {}: {}", kind, branch, reason)
            }
            Advisory::WorktreeRemovalFailed { reason } => {
                write!(f, "could not remove worktree: {}", reason)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Overrides `use_worktree` when set.
    pub use_worktree: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Commit message to use instead of asking.
    pub message: Option<String>,
    /// Run the AI review after the pull request is created.
    pub review: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            message: None,
            review: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub task_id: u64,
    pub branch_name: String,
    pub newly_generated: bool,
    /// Set when the task was started in a worktree; the session moved there.
    pub worktree: Option<PathBuf>,
    pub advisories: Vec<Advisory>,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub task_id: u64,
    pub branch_name: String,
    pub committed: bool,
    pub pull_request: Option<PullRequestInfo>,
    /// Manual compare URL when no pull request could be created.
    pub compare_url: Option<String>,
    pub review: Option<ReviewReport>,
    pub comment_ids: Vec<String>,
    pub advisories: Vec<Advisory>,
}

#[derive(Debug, Clone)]
pub struct DoneOutcome {
    pub task_id: u64,
    pub branch_name: String,
    /// Primary root the session moved back to after the worktree was removed.
    pub relocated_to: Option<PathBuf>,
    pub advisories: Vec<Advisory>,
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub task_id: u64,
    pub branch_name: String,
    pub report: ReviewReport,
    pub pull_request: Option<u64>,
    pub comment_ids: Vec<String>,
    pub advisories: Vec<Advisory>,
}

/// Build the hosting provider selected by `git_provider`, if any.
pub fn hosting_from_settings(settings: &Settings, remote_url: &str) -> Result<Option<HostingProvider>, ProviderError> {
    let Some(key) = settings.git_provider.as_deref() else {
        return Ok(None);
    };
    let token = settings
        .token_for(key)
        .ok_or_else(|| ProviderError::MissingCredential(key.to_string()))?;
    HostingProvider::from_key(key, token, remote_url, settings.git_api_url.as_deref()).map(Some)
}

/// Build the comment provider selected by `comment_provider` (falling back to
/// `git_provider`), if any.
pub fn comments_from_settings(
    settings: &Settings,
    remote_url: &str,
) -> Result<Option<ReviewCommentProvider>, ProviderError> {
    let Some(key) = settings.comment_provider_key() else {
        return Ok(None);
    };
    // The API override belongs to the hosting provider unless both are the same host.
    let api_base = if settings.comment_provider.is_none()
        || settings.comment_provider == settings.git_provider
    {
        settings.git_api_url.as_deref()
    } else {
        None
    };
    let token = settings.token_for(key).unwrap_or_default();
    ReviewCommentProvider::from_key(key, token, remote_url, api_base).map(Some)
}

/// Whether the outcome's task status change reached the backend.
pub fn status_recorded(advisories: &[Advisory]) -> bool {
    !advisories
        .iter()
        .any(|a| matches!(a, Advisory::StatusUpdateFailed { .. }))
}

fn parse_current(git: &Git) -> Result<(String, TaskType, u64), WorkflowError> {
    git.ensure_repository()?;
    let branch_name = git.current_branch()?;
    let (task_type, task_id) =
        branch::parse_branch(&branch_name).ok_or_else(|| WorkflowError::InvalidBranchName(branch_name.clone()))?;
    Ok((branch_name, task_type, task_id))
}

pub struct Workflow<B: TaskBackend, P: Prompter> {
    settings: Settings,
    git: Git,
    backend: B,
    prompter: P,
    ai: Option<AiClient>,
    hosting: Option<HostingProvider>,
    comments: Option<ReviewCommentProvider>,
}

impl<B: TaskBackend, P: Prompter> Workflow<B, P> {
    pub fn new(settings: Settings, git: Git, backend: B, prompter: P) -> Self {
        Self {
            settings,
            git,
            backend,
            prompter,
            ai: None,
            hosting: None,
            comments: None,
        }
    }

    pub fn with_ai(mut self, ai: Option<AiClient>) -> Self {
        self.ai = ai;
        self
    }

    pub fn with_hosting(mut self, hosting: Option<HostingProvider>) -> Self {
        self.hosting = hosting;
        self
    }

    pub fn with_comments(mut self, comments: Option<ReviewCommentProvider>) -> Self {
        self.comments = comments;
        self
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    /// Bind the task to a branch and move it to IN_PROGRESS.
    ///
    /// A stored `branch_name` is reused as-is; otherwise a new one is generated
    /// and written back together with the status. That write is fatal.
    pub fn start(&mut self, task_id: u64, options: &StartOptions) -> Result<StartOutcome, WorkflowError> {
        self.git.ensure_repository()?;
        let task = self.backend.get_task(task_id)?;
        tracing::info!(task_id, status = %task.status, "starting task");

        let (branch_name, newly_generated) = match task.branch_name.as_deref().map(str::trim) {
            Some(existing) if !existing.is_empty() => (existing.to_string(), false),
            _ => (
                branch::generate_branch(task.task_type.unwrap_or_default(), task_id),
                true,
            ),
        };

        let update = TaskUpdate {
            status: Some(TaskStatus::InProgress),
            branch_name: newly_generated.then(|| branch_name.clone()),
        };
        self.backend.update_task(task_id, &update)?;

        let use_worktree = options.use_worktree.unwrap_or(self.settings.use_worktree);
        let worktree = if use_worktree {
            let path = self.git.create_worktree(&branch_name, task_id)?;
            self.git.relocate(path.clone());
            Some(path)
        } else {
            self.git.create_or_switch_branch(&branch_name)?;
            None
        };

        tracing::info!(task_id, branch = %branch_name, newly_generated, worktree = use_worktree, "task started");
        Ok(StartOutcome {
            task_id,
            branch_name,
            newly_generated,
            worktree,
            advisories: Vec::new(),
        })
    }

    /// Commit pending work, push, and open a pull request for the current
    /// task branch.
    pub fn submit(&mut self, options: &SubmitOptions) -> Result<SubmitOutcome, WorkflowError> {
        let (branch_name, task_type, task_id) = parse_current(&self.git)?;
        tracing::info!(task_id, branch = %branch_name, "submitting task");
        let mut advisories = Vec::new();

        let task = match self.backend.get_task(task_id) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!(task_id, error = %e, "could not fetch task for submit");
                advisories.push(Advisory::TaskFetchFailed {
                    task_id,
                    reason: e.to_string(),
                });
                None
            }
        };
        let title = task
            .as_ref()
            .map(|t| t.title.clone())
            .unwrap_or_else(|| branch_name.clone());

        let mut committed = false;
        if self.git.has_uncommitted_changes()? {
            self.git.stage_all()?;
            let message = self.commit_message(options, &title, &mut advisories)?;
            self.git.commit(&message)?;
            committed = true;
        } else {
            tracing::info!(task_id, "no uncommitted changes, pushing existing commits");
        }

        self.advisory_status(task_id, TaskStatus::Review, &mut advisories);

        self.git.push_branch(&branch_name)?;

        let main_branch = self.settings.main_branch.clone();
        let diff = match self.git.diff_between(&branch_name, &main_branch) {
            Ok(diff) => diff,
            Err(e) => {
                tracing::warn!(error = %e, "could not diff against main branch");
                advisories.push(Advisory::DiffFailed { reason: e.to_string() });
                String::new()
            }
        };

        let (pull_request, compare_url) =
            self.open_pull_request(task_id, task_type, task.as_ref(), &title, &branch_name, &diff, &mut advisories);

        let mut review = None;
        let mut comment_ids = Vec::new();
        if options.review && self.settings.ai_review_enabled {
            if let Some(ai) = &self.ai {
                let report = CodeReviewer::new(ai, self.settings.ai_review_strict).review_diff(&diff);
                if let Some(pr) = &pull_request {
                    comment_ids = self.publish_review(pr.number, &report, &mut advisories);
                }
                review = Some(report);
            }
        }

        Ok(SubmitOutcome {
            task_id,
            branch_name,
            committed,
            pull_request,
            compare_url,
            review,
            comment_ids,
            advisories,
        })
    }

    /// Return to the main branch and close out the current task.
    pub fn done(&mut self) -> Result<DoneOutcome, WorkflowError> {
        let (branch_name, _, task_id) = parse_current(&self.git)?;
        tracing::info!(task_id, branch = %branch_name, "finishing task");
        let mut advisories = Vec::new();
        let main_branch = self.settings.main_branch.clone();

        let in_worktree = self.git.in_linked_worktree()?;
        if in_worktree {
            // The main branch can only be checked out in the primary tree.
            let primary = Git::new(self.git.primary_root()?, main_branch.clone());
            primary.checkout(&main_branch)?;
            primary.pull(&main_branch)?;
        } else {
            self.git.checkout(&main_branch)?;
            self.git.pull(&main_branch)?;
        }

        self.advisory_status(task_id, TaskStatus::Done, &mut advisories);

        let mut relocated_to = None;
        if in_worktree {
            let primary = self.git.primary_root()?;
            if self.settings.delete_worktree_on_done {
                match self.git.remove_worktree(&branch_name, task_id) {
                    Ok(WorktreeRemoval::Removed) => relocated_to = Some(primary.clone()),
                    Ok(WorktreeRemoval::Missing) => {}
                    Err(e) => {
                        tracing::warn!(task_id, error = %e, "worktree removal failed");
                        advisories.push(Advisory::WorktreeRemovalFailed { reason: e.to_string() });
                    }
                }
            }
            self.git.relocate(primary);
        }

        if self.settings.delete_local_on_done {
            if let Err(e) = self.git.delete_local_branch(&branch_name) {
                tracing::warn!(branch = %branch_name, error = %e, "local branch deletion failed");
                advisories.push(Advisory::BranchDeleteFailed {
                    branch: branch_name.clone(),
                    remote: false,
                    reason: e.to_string(),
                });
            }
        }
        if self.settings.delete_remote_on_done {
            if let Err(e) = self.git.delete_remote_branch(&branch_name) {
                tracing::warn!(branch = %branch_name, error = %e, "remote branch deletion failed");
                advisories.push(Advisory::BranchDeleteFailed {
                    branch: branch_name.clone(),
                    remote: true,
                    reason: e.to_string(),
                });
            }
        }

        tracing::info!(task_id, "task done");
        Ok(DoneOutcome {
            task_id,
            branch_name,
            relocated_to,
            advisories,
        })
    }

    /// Review the current task branch against the main branch. With
    /// `publish`, post the results on the branch's pull request (`pr_number`,
    /// or the open request found for the branch).
    pub fn review(&self, publish: bool, pr_number: Option<u64>) -> Result<ReviewOutcome, WorkflowError> {
        let (branch_name, _, task_id) = parse_current(&self.git)?;
        if !self.settings.ai_review_enabled {
            return Err(WorkflowError::ReviewDisabled);
        }
        let ai = self.ai.as_ref().ok_or(WorkflowError::AiNotConfigured)?;
        let diff = self.git.diff_between(&branch_name, &self.settings.main_branch)?;
        let report = CodeReviewer::new(ai, self.settings.ai_review_strict).review_diff(&diff);

        let mut advisories = Vec::new();
        let mut comment_ids = Vec::new();
        let mut pull_request = None;
        if publish {
            pull_request = match pr_number {
                Some(n) => Some(n),
                None => self.find_pull_request(&branch_name, &mut advisories),
            };
            match pull_request {
                Some(number) => comment_ids = self.publish_review(number, &report, &mut advisories),
                None => advisories.push(Advisory::NoPullRequest),
            }
        }

        Ok(ReviewOutcome {
            task_id,
            branch_name,
            report,
            pull_request,
            comment_ids,
            advisories,
        })
    }

    fn commit_message(
        &mut self,
        options: &SubmitOptions,
        title: &str,
        advisories: &mut Vec<Advisory>,
    ) -> Result<String, WorkflowError> {
        if let Some(message) = options.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            return Ok(message.to_string());
        }

        let mut suggestion = None;
        if let Some(ai) = &self.ai {
            let diff = self.git.diff_staged()?;
            match ai.generate_commit_message(&diff, title) {
                Ok(message) => suggestion = Some(message),
                Err(e) => {
                    tracing::warn!(error = %e, "AI commit message generation failed");
                    advisories.push(Advisory::AiFailed {
                        step: "commit message",
                        reason: e.to_string(),
                    });
                }
            }
        }

        let message = match suggestion {
            Some(message) => {
                let question = format!("Use this commit message?\n\n  {}\n", message);
                if self.prompter.confirm(&question, true) {
                    message
                } else {
                    self.prompter.input("Commit message")
                }
            }
            None => self.prompter.input("Commit message"),
        };

        let message = message.trim().to_string();
        if message.is_empty() {
            return Err(WorkflowError::EmptyCommitMessage);
        }
        Ok(message)
    }

    fn advisory_status(&self, task_id: u64, status: TaskStatus, advisories: &mut Vec<Advisory>) {
        match self.backend.update_task(task_id, &TaskUpdate::status(status)) {
            Ok(_) => tracing::info!(task_id, status = %status, "task status updated"),
            Err(e) => {
                tracing::warn!(task_id, status = %status, error = %e, "task status update failed, continuing");
                advisories.push(Advisory::StatusUpdateFailed {
                    task_id,
                    status,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn pr_description(
        &self,
        task_id: u64,
        task_type: TaskType,
        task: Option<&TaskRecord>,
        title: &str,
        diff: &str,
        advisories: &mut Vec<Advisory>,
    ) -> String {
        let description = task.and_then(|t| t.description.as_deref()).unwrap_or_default();
        let Some(ai) = &self.ai else {
            return ai::fallback_pr_description(task_id, description);
        };
        match ai.generate_pr_description(diff, task_id, title, task_type.as_str(), description) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "AI PR description generation failed");
                advisories.push(Advisory::AiFailed {
                    step: "PR description",
                    reason: e.to_string(),
                });
                ai::fallback_pr_description(task_id, description)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn open_pull_request(
        &self,
        task_id: u64,
        task_type: TaskType,
        task: Option<&TaskRecord>,
        title: &str,
        branch_name: &str,
        diff: &str,
        advisories: &mut Vec<Advisory>,
    ) -> (Option<PullRequestInfo>, Option<String>) {
        let main_branch = &self.settings.main_branch;
        let Some(hosting) = &self.hosting else {
            return (None, self.manual_compare_url(branch_name));
        };

        let description = self.pr_description(task_id, task_type, task, title, diff, advisories);
        let pr_title = format!("[Task #{}] {}", task_id, title);
        match hosting.create_pull_request(&pr_title, branch_name, main_branch, &description) {
            Ok(pr) => {
                tracing::info!(number = pr.number, url = %pr.url, "pull request created");
                (Some(pr), None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "pull request creation failed");
                advisories.push(Advisory::PullRequestFailed { reason: e.to_string() });
                // A rerun after a partial submit finds the request it already opened.
                match hosting.find_open_pull_request(branch_name) {
                    Ok(Some(existing)) => (Some(existing), None),
                    _ => (None, self.manual_compare_url(branch_name)),
                }
            }
        }
    }

    fn manual_compare_url(&self, branch_name: &str) -> Option<String> {
        let remote = self.git.remote_url();
        if remote.is_empty() {
            return None;
        }
        let key = match self.settings.git_provider.as_deref() {
            Some(key) => key.to_string(),
            None if remote.contains("gitlab") => "gitlab".to_string(),
            None => "github".to_string(),
        };
        Some(hosting::compare_url(&key, &remote, &self.settings.main_branch, branch_name))
    }

    fn find_pull_request(&self, branch_name: &str, advisories: &mut Vec<Advisory>) -> Option<u64> {
        let hosting = self.hosting.as_ref()?;
        match hosting.find_open_pull_request(branch_name) {
            Ok(pr) => pr.map(|pr| pr.number),
            Err(e) => {
                tracing::warn!(error = %e, "pull request lookup failed");
                advisories.push(Advisory::PullRequestFailed { reason: e.to_string() });
                None
            }
        }
    }

    /// Post the Markdown summary, then the per-issue comments. Returns the ids
    /// of everything that was accepted.
    fn publish_review(&self, pr_number: u64, report: &ReviewReport, advisories: &mut Vec<Advisory>) -> Vec<String> {
        let Some(comments) = &self.comments else {
            advisories.push(Advisory::CommentsNotPublished {
                reason: "no comment provider configured".to_string(),
            });
            return Vec::new();
        };

        let mut ids = Vec::new();
        match comments.create_comment(pr_number, &report.to_markdown(), None) {
            Ok(id) => ids.push(id),
            Err(e) => {
                tracing::warn!(pr_number, error = %e, "review summary comment failed");
                advisories.push(Advisory::CommentsNotPublished { reason: e.to_string() });
            }
        }

        let inline = report.comments();
        let posted = comments.create_batch(pr_number, &inline);
        if posted.len() < inline.len() {
            advisories.push(Advisory::CommentsPartiallyPublished {
                posted: posted.len(),
                total: inline.len(),
            });
        }
        ids.extend(posted);
        ids
    }
}
