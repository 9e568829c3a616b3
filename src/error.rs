use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository (run inside your project folder)")]
    NotARepository,
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not logged in: set `access_token` with `ctx config set access_token <token>`")]
    MissingCredential,
    #[error("task #{0} not found")]
    TaskNotFound(u64),
    #[error("failed to update task #{task_id}: {message}")]
    UpdateRejected { task_id: u64, message: String },
    #[error("backend request failed: {0}")]
    RequestFailed(String),
    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unsupported provider: {0}")]
    Unsupported(String),
    #[error("no token configured for provider {0}")]
    MissingCredential(String),
    #[error("cannot derive owner/repo from remote url: {0}")]
    InvalidRepositoryUrl(String),
    #[error("failed to create pull request: {0}")]
    PrCreationFailed(String),
    #[error("failed to publish comment: {0}")]
    CommentPublishFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("provider request failed: {0}")]
    RequestFailed(String),
    #[error("provider unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI generation failed: {0}")]
    GenerationFailed(String),
    #[error("AI backend returned an empty response")]
    EmptyResponse,
    #[error("AI backend unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown config key '{key}' (known keys: {known})")]
    UnknownKey { key: String, known: String },
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("failed to write config {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Fatal failures of a workflow command. Advisory failures never surface here;
/// they are collected in the command's outcome instead.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("current branch '{0}' is not a task branch (expected <type>/task-<id>-<suffix>)")]
    InvalidBranchName(String),
    #[error("commit message cannot be empty")]
    EmptyCommitMessage,
    #[error("no AI provider configured: set `ai_provider` and `ai_api_key` (or `ai_base_url` for local)")]
    AiNotConfigured,
    #[error("AI review is disabled: set `ai_review_enabled` to true")]
    ReviewDisabled,
}

impl From<HttpError> for BackendError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Transport(msg) => BackendError::Unreachable(msg),
            other => BackendError::RequestFailed(other.to_string()),
        }
    }
}

impl From<HttpError> for ProviderError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Status { code: 404, body } => ProviderError::NotFound(body),
            HttpError::Transport(msg) => ProviderError::Unreachable(msg),
            other => ProviderError::RequestFailed(other.to_string()),
        }
    }
}

impl From<HttpError> for AiError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Transport(msg) => AiError::Unreachable(msg),
            other => AiError::GenerationFailed(other.to_string()),
        }
    }
}
