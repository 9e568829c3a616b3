//! Task branch naming: `{type}/task-{id}-{suffix}`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Feature,
    Bug,
    Docs,
    Fix,
    Chore,
    Refactor,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::Feature,
        TaskType::Bug,
        TaskType::Docs,
        TaskType::Fix,
        TaskType::Chore,
        TaskType::Refactor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Feature => "feature",
            TaskType::Bug => "bug",
            TaskType::Docs => "docs",
            TaskType::Fix => "fix",
            TaskType::Chore => "chore",
            TaskType::Refactor => "refactor",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown task type '{}'", s))
    }
}

fn branch_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(feature|bug|docs|fix|chore|refactor)/task-(\d+)-")
            .expect("valid branch pattern")
    })
}

/// Build a fresh branch name for a task. The 8-hex suffix is random, so two
/// calls for the same task give different names.
pub fn generate_branch(task_type: TaskType, task_id: u64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}/task-{}-{}", task_type, task_id, &suffix[..8])
}

/// Recover `(type, id)` from a branch name. Only the `{type}/task-{id}-`
/// prefix is checked.
pub fn parse_branch(branch_name: &str) -> Option<(TaskType, u64)> {
    let caps = branch_pattern().captures(branch_name)?;
    let task_type = caps[1].parse().ok()?;
    let task_id = caps[2].parse().ok()?;
    Some((task_type, task_id))
}
