use clap::{Parser, Subcommand};

use cortex::branch::TaskType;

#[derive(Parser)]
#[command(name = "ctx")]
#[command(about = "Cortex - Bind tasks to branches, worktrees and pull requests")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start working on a task (creates or switches to its branch, IN_PROGRESS)
    Start {
        /// Task id
        task_id: u64,
        /// Start in a dedicated worktree
        #[arg(long, conflicts_with = "no_worktree")]
        worktree: bool,
        /// Start in the current checkout even if `use_worktree` is set
        #[arg(long)]
        no_worktree: bool,
    },

    /// Commit, push and open a pull request for the current task (REVIEW)
    #[command(alias = "pr")]
    Submit {
        /// Commit message (skips the AI suggestion and the prompt)
        #[arg(short, long)]
        message: Option<String>,
        /// Skip the AI code review
        #[arg(long)]
        no_review: bool,
    },

    /// Finish the current task: back to main, DONE, optional cleanup
    Done,

    /// AI code review of the current task branch against main
    Review {
        /// Post the review on the pull request
        #[arg(long)]
        publish: bool,
        /// Pull request number (looked up by branch when omitted)
        #[arg(long)]
        pr: Option<u64>,
    },

    /// Task backend commands
    #[command(subcommand)]
    Tasks(TasksCommand),

    /// Read and write ~/.cortex/config.toml
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum TasksCommand {
    /// List tasks
    List,

    /// Create a task
    Create {
        /// Project the task belongs to
        #[arg(long)]
        project: u64,
        /// Task title
        title: String,
        /// Task description
        #[arg(short, long)]
        description: Option<String>,
        /// Task type
        #[arg(long = "type", default_value = "feature")]
        task_type: TaskType,
        /// Priority (LOW, MEDIUM, HIGH, URGENT)
        #[arg(long, default_value = "MEDIUM")]
        priority: String,
        /// Deadline (YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<chrono::NaiveDate>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Set a value
    Set { key: String, value: String },
    /// Print a value
    Get { key: String },
    /// Remove a value
    Unset { key: String },
    /// Print every stored value (tokens masked)
    List,
    /// Print every known key with its description
    Keys,
}
