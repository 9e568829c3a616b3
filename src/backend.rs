use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::branch::TaskType;
use crate::error::{BackendError, HttpError};
use crate::http::{self, JsonClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "TODO"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Review => write!(f, "REVIEW"),
            TaskStatus::Done => write!(f, "DONE"),
        }
    }
}

/// A task as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub task_type: Option<TaskType>,
    pub status: TaskStatus,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

/// Partial update sent with PATCH; unset fields are omitted from the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub project_id: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
}

/// The task service the workflow reads and writes through.
pub trait TaskBackend {
    fn get_task(&self, id: u64) -> Result<TaskRecord, BackendError>;
    fn update_task(&self, id: u64, update: &TaskUpdate) -> Result<TaskRecord, BackendError>;
    fn create_task(&self, task: &NewTask) -> Result<TaskRecord, BackendError>;
    fn list_tasks(&self) -> Result<Vec<TaskRecord>, BackendError>;
}

/// HTTP client for the task backend, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpTaskBackend {
    client: JsonClient,
}

impl HttpTaskBackend {
    /// Fails with `MissingCredential` before any request is made if no token
    /// is configured.
    pub fn new(api_url: &str, access_token: Option<&str>) -> Result<Self, BackendError> {
        let token = access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(BackendError::MissingCredential)?;
        let client = JsonClient::new(api_url).with_header("Authorization", &format!("Bearer {}", token));
        Ok(Self { client })
    }
}

fn to_value<T: Serialize>(body: &T) -> Result<Value, BackendError> {
    serde_json::to_value(body).map_err(|e| BackendError::RequestFailed(e.to_string()))
}

impl TaskBackend for HttpTaskBackend {
    fn get_task(&self, id: u64) -> Result<TaskRecord, BackendError> {
        self.client
            .get(&format!("/tasks/{}", id))
            .map_err(|e| match e {
                HttpError::Status { code: 404, .. } => BackendError::TaskNotFound(id),
                other => other.into(),
            })
    }

    fn update_task(&self, id: u64, update: &TaskUpdate) -> Result<TaskRecord, BackendError> {
        tracing::info!(task_id = id, update = ?update, "updating task");
        self.client
            .patch(&format!("/tasks/{}", id), &to_value(update)?)
            .map_err(|e| match e {
                HttpError::Status { code: 404, .. } => BackendError::TaskNotFound(id),
                HttpError::Transport(msg) => BackendError::Unreachable(msg),
                other => BackendError::UpdateRejected {
                    task_id: id,
                    message: http::error_message(&other),
                },
            })
    }

    fn create_task(&self, task: &NewTask) -> Result<TaskRecord, BackendError> {
        tracing::info!(title = %task.title, project_id = task.project_id, "creating task");
        self.client
            .post("/tasks/", &to_value(task)?)
            .map_err(BackendError::from)
    }

    fn list_tasks(&self) -> Result<Vec<TaskRecord>, BackendError> {
        self.client.get("/tasks/").map_err(BackendError::from)
    }
}
