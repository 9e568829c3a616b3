#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cortex::ai::AiClient;
use cortex::backend::{NewTask, TaskBackend, TaskRecord, TaskStatus, TaskUpdate};
use cortex::branch::TaskType;
use cortex::config::Settings;
use cortex::error::BackendError;
use cortex::git::Git;
use cortex::workflow::Prompter;
use mockito::{Mock, Server};
use tempfile::TempDir;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Create `<tmp>/work/<name>` with an initial commit on `main`, pushed to a
/// bare `<tmp>/origin.git`.
pub fn init_test_repo(tmp: &TempDir, name: &str) -> PathBuf {
    let origin = tmp.path().join("origin.git");
    std::fs::create_dir_all(&origin).unwrap();
    git(&origin, &["init", "--bare", "--initial-branch=main"]);

    let repo_path = tmp.path().join("work").join(name);
    std::fs::create_dir_all(&repo_path).unwrap();

    git(&repo_path, &["init", "-b", "main"]);
    git(&repo_path, &["config", "user.email", "test@test.com"]);
    git(&repo_path, &["config", "user.name", "Test"]);

    // Create an initial commit so HEAD exists
    std::fs::write(repo_path.join("README.md"), "# test repo\n").unwrap();
    git(&repo_path, &["add", "."]);
    git(&repo_path, &["commit", "-m", "initial commit"]);

    git(&repo_path, &["remote", "add", "origin", origin.to_str().unwrap()]);
    git(&repo_path, &["push", "-u", "origin", "main"]);

    repo_path
}

pub fn test_git(repo: &Path) -> Git {
    Git::new(repo, "main")
}

pub fn remote_branch_exists(tmp: &TempDir, branch: &str) -> bool {
    let origin = tmp.path().join("origin.git");
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)])
        .current_dir(&origin)
        .output()
        .unwrap();
    output.status.success()
}

/// Settings with no providers and no AI.
pub fn test_settings() -> Settings {
    Settings::default()
}

pub fn task(id: u64, task_type: Option<TaskType>, branch_name: Option<&str>) -> TaskRecord {
    TaskRecord {
        id,
        title: format!("Task {}", id),
        description: Some(format!("Description of task {}", id)),
        task_type,
        status: TaskStatus::Todo,
        branch_name: branch_name.map(str::to_string),
        priority: Some("MEDIUM".to_string()),
        deadline: None,
    }
}

/// In-memory task backend that records every update.
#[derive(Default)]
pub struct FakeBackend {
    pub tasks: Mutex<HashMap<u64, TaskRecord>>,
    pub updates: Mutex<Vec<(u64, TaskUpdate)>>,
    /// Updates setting one of these statuses are rejected.
    pub reject_statuses: Mutex<Vec<TaskStatus>>,
}

impl FakeBackend {
    pub fn with_task(task: TaskRecord) -> Self {
        let backend = Self::default();
        backend.tasks.lock().unwrap().insert(task.id, task);
        backend
    }

    pub fn reject(&self, status: TaskStatus) {
        self.reject_statuses.lock().unwrap().push(status);
    }

    pub fn task(&self, id: u64) -> TaskRecord {
        self.tasks.lock().unwrap()[&id].clone()
    }

    pub fn updates(&self) -> Vec<(u64, TaskUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

impl TaskBackend for FakeBackend {
    fn get_task(&self, id: u64) -> Result<TaskRecord, BackendError> {
        self.tasks
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(BackendError::TaskNotFound(id))
    }

    fn update_task(&self, id: u64, update: &TaskUpdate) -> Result<TaskRecord, BackendError> {
        if let Some(status) = update.status {
            if self.reject_statuses.lock().unwrap().contains(&status) {
                return Err(BackendError::UpdateRejected {
                    task_id: id,
                    message: "HTTP 500: boom".to_string(),
                });
            }
        }
        self.updates.lock().unwrap().push((id, update.clone()));
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(&id).ok_or(BackendError::TaskNotFound(id))?;
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(branch) = &update.branch_name {
            task.branch_name = Some(branch.clone());
        }
        Ok(task.clone())
    }

    fn create_task(&self, new: &NewTask) -> Result<TaskRecord, BackendError> {
        let mut tasks = self.tasks.lock().unwrap();
        let id = tasks.keys().max().copied().unwrap_or(0) + 1;
        let record = TaskRecord {
            id,
            title: new.title.clone(),
            description: new.description.clone(),
            task_type: Some(new.task_type),
            status: TaskStatus::Todo,
            branch_name: None,
            priority: Some(new.priority.clone()),
            deadline: new.deadline,
        };
        tasks.insert(id, record.clone());
        Ok(record)
    }

    fn list_tasks(&self) -> Result<Vec<TaskRecord>, BackendError> {
        Ok(self.tasks.lock().unwrap().values().cloned().collect())
    }
}

/// Prompter answering from scripted queues; panics if a prompt is unexpected.
#[derive(Default)]
pub struct ScriptedPrompter {
    pub confirms: VecDeque<bool>,
    pub inputs: VecDeque<String>,
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm_with(mut self, answer: bool) -> Self {
        self.confirms.push_back(answer);
        self
    }

    pub fn input_with(mut self, answer: &str) -> Self {
        self.inputs.push_back(answer.to_string());
        self
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, question: &str, _default: bool) -> bool {
        self.asked.push(question.to_string());
        self.confirms.pop_front().expect("unexpected confirm prompt")
    }

    fn input(&mut self, question: &str) -> String {
        self.asked.push(question.to_string());
        self.inputs.pop_front().expect("unexpected input prompt")
    }
}

/// Mock answering `method path` (path and query matched exactly) with a
/// canned JSON body.
pub fn json_mock(server: &mut Server, method: &str, path: &str, status: usize, body: &str) -> Mock {
    server
        .mock(method, path)
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create()
}

/// OpenAI-style chat completion carrying `content`.
pub fn chat_reply(content: &str) -> String {
    serde_json::json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
}

/// Keyless local AI backend served by `server`.
pub fn local_ai(server: &Server) -> AiClient {
    let mut settings = test_settings();
    settings.ai_provider = Some("local".to_string());
    settings.ai_base_url = Some(server.url());
    AiClient::from_settings(&settings).unwrap()
}
