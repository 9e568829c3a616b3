mod cli;
mod logging;
mod prompt;

use anyhow::{Context, Result};
use clap::Parser;

use cortex::ai::{AiClient, ReviewReport};
use cortex::backend::{HttpTaskBackend, NewTask, TaskBackend};
use cortex::comments::Severity;
use cortex::config::{self, ConfigStore, ConfigValue, Paths, Settings};
use cortex::git::Git;
use cortex::workflow::{self, Advisory, StartOptions, SubmitOptions, Workflow};
use cli::{Cli, Commands, ConfigCommand, TasksCommand};
use prompt::TerminalPrompter;

fn main() -> Result<()> {
    // Setup better panic handling
    better_panic::install();

    let paths = Paths::from_home()?;

    // Rotate log file before setting up logging (keeps it under 1000 lines)
    logging::rotate_log(&paths);

    // Initialize file-based logging to ~/.cortex/cortex.log
    logging::setup_logging(&paths)?;

    let cli = Cli::parse();

    tracing::debug!(command = ?cli.command, "dispatching command");

    let mut store = ConfigStore::load(&paths.config_file)?;
    let settings = Settings::from_store(&store);

    match cli.command {
        Commands::Start {
            task_id,
            worktree,
            no_worktree,
        } => {
            let use_worktree = match (worktree, no_worktree) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_start(settings, task_id, &StartOptions { use_worktree })
        }

        Commands::Submit { message, no_review } => cmd_submit(
            settings,
            &SubmitOptions {
                message,
                review: !no_review,
            },
        ),

        Commands::Done => cmd_done(settings),

        Commands::Review { publish, pr } => cmd_review(settings, publish, pr),

        Commands::Tasks(cmd) => cmd_tasks(&settings, cmd),

        Commands::Config(cmd) => cmd_config(&paths, &mut store, cmd),
    }
}

/// Backend credential is checked first; nothing runs without it.
fn build_workflow(settings: Settings) -> Result<Workflow<HttpTaskBackend, TerminalPrompter>> {
    let backend = HttpTaskBackend::new(&settings.api_url, settings.access_token.as_deref())?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let git = Git::new(cwd, settings.main_branch.clone());
    git.ensure_repository()?;

    let ai = AiClient::from_settings(&settings);
    let remote = git.remote_url();
    let (hosting, comments) = if remote.is_empty() {
        (None, None)
    } else {
        let hosting = workflow::hosting_from_settings(&settings, &remote).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "hosting provider unavailable");
            eprintln!("warning: hosting provider unavailable: {}", e);
            None
        });
        let comments = workflow::comments_from_settings(&settings, &remote).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "comment provider unavailable");
            None
        });
        (hosting, comments)
    };

    Ok(Workflow::new(settings, git, backend, TerminalPrompter)
        .with_ai(ai)
        .with_hosting(hosting)
        .with_comments(comments))
}

fn print_advisories(advisories: &[Advisory]) {
    for advisory in advisories {
        eprintln!("warning: {}", advisory);
    }
}

fn cmd_start(settings: Settings, task_id: u64, options: &StartOptions) -> Result<()> {
    let mut flow = build_workflow(settings)?;
    let outcome = flow.start(task_id, options)?;
    print_advisories(&outcome.advisories);

    if outcome.newly_generated {
        println!("Created branch {} for task #{}", outcome.branch_name, outcome.task_id);
    } else {
        println!("Using branch {} for task #{}", outcome.branch_name, outcome.task_id);
    }
    if let Some(path) = &outcome.worktree {
        println!("Worktree ready at {}", path.display());
        println!();
        println!("  cd {}", path.display());
    }
    println!("Task #{} is IN_PROGRESS", outcome.task_id);
    Ok(())
}

fn cmd_submit(settings: Settings, options: &SubmitOptions) -> Result<()> {
    let mut flow = build_workflow(settings)?;
    let outcome = flow.submit(options)?;

    if outcome.committed {
        println!("Committed changes on {}", outcome.branch_name);
    }
    println!("Pushed {}", outcome.branch_name);
    if let Some(pr) = &outcome.pull_request {
        println!("Pull request #{}: {}", pr.number, pr.url);
    } else if let Some(url) = &outcome.compare_url {
        println!("Open a pull request manually: {}", url);
    }
    if let Some(report) = &outcome.review {
        println!();
        print_report(report);
        if !outcome.comment_ids.is_empty() {
            println!("Published {} review comment(s)", outcome.comment_ids.len());
        }
    }
    print_advisories(&outcome.advisories);
    if workflow::status_recorded(&outcome.advisories) {
        println!("Task #{} is in REVIEW", outcome.task_id);
    }
    Ok(())
}

fn cmd_done(settings: Settings) -> Result<()> {
    let main_branch = settings.main_branch.clone();
    let mut flow = build_workflow(settings)?;
    let outcome = flow.done()?;
    print_advisories(&outcome.advisories);

    println!("Switched to {} and pulled", main_branch);
    if let Some(path) = &outcome.relocated_to {
        println!("Removed task worktree; continue in the main checkout:");
        println!();
        println!("  cd {}", path.display());
    }
    if workflow::status_recorded(&outcome.advisories) {
        println!("Task #{} is DONE", outcome.task_id);
    }
    Ok(())
}

fn cmd_review(settings: Settings, publish: bool, pr: Option<u64>) -> Result<()> {
    let flow = build_workflow(settings)?;
    let outcome = flow.review(publish, pr)?;
    print_report(&outcome.report);
    if let Some(number) = outcome.pull_request {
        println!();
        println!("Published {} comment(s) on #{}", outcome.comment_ids.len(), number);
    }
    print_advisories(&outcome.advisories);
    Ok(())
}

fn print_report(report: &ReviewReport) {
    println!("Review score: {}/100", report.score);
    println!("{}", report.summary);
    if report.issues.is_empty() {
        return;
    }
    println!(
        "{} error(s), {} warning(s), {} info",
        report.count(Severity::Error),
        report.count(Severity::Warning),
        report.count(Severity::Info)
    );
    for issue in &report.issues {
        println!(
            "  [{}] {}:{} ({}) {}",
            issue.severity, issue.file, issue.line, issue.category, issue.message
        );
        if let Some(suggestion) = &issue.suggestion {
            println!("      suggestion: {}", suggestion);
        }
    }
}

fn cmd_tasks(settings: &Settings, cmd: TasksCommand) -> Result<()> {
    let backend = HttpTaskBackend::new(&settings.api_url, settings.access_token.as_deref())?;
    match cmd {
        TasksCommand::List => {
            let tasks = backend.list_tasks()?;
            if tasks.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            println!("{:>6}  {:<40}  {:<8}  {:<12}  BRANCH", "ID", "TITLE", "PRIORITY", "STATUS");
            for task in tasks {
                let title: String = task.title.chars().take(40).collect();
                println!(
                    "{:>6}  {:<40}  {:<8}  {:<12}  {}",
                    task.id,
                    title,
                    task.priority.as_deref().unwrap_or("-"),
                    task.status.to_string(),
                    task.branch_name.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        TasksCommand::Create {
            project,
            title,
            description,
            task_type,
            priority,
            deadline,
        } => {
            let task = backend.create_task(&NewTask {
                project_id: project,
                title,
                description,
                task_type,
                priority: priority.to_ascii_uppercase(),
                deadline,
            })?;
            println!("Created task #{}: {}", task.id, task.title);
            Ok(())
        }
    }
}

/// Show only the first four characters of credentials.
fn masked(key: &str, value: &ConfigValue) -> String {
    let secret = key.contains("token") || key.contains("key");
    match value {
        ConfigValue::Str(s) if secret => {
            let head: String = s.chars().take(4).collect();
            format!("{}****", head)
        }
        other => other.to_string(),
    }
}

fn cmd_config(paths: &Paths, store: &mut ConfigStore, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Set { key, value } => {
            let stored = store.set(&key, &value)?.clone();
            store.save(&paths.config_file)?;
            println!("{} = {}", key, masked(&key, &stored));
        }
        ConfigCommand::Get { key } => match store.get(&key) {
            Some(value) => println!("{}", value),
            None => println!("{} is not set", key),
        },
        ConfigCommand::Unset { key } => {
            if store.unset(&key)?.is_some() {
                store.save(&paths.config_file)?;
                println!("Removed {}", key);
            } else {
                println!("{} was not set", key);
            }
        }
        ConfigCommand::List => {
            let mut any = false;
            for (key, value) in store.entries() {
                println!("{} = {}", key, masked(key, value));
                any = true;
            }
            if !any {
                println!("No configuration set ({})", paths.config_file.display());
            }
        }
        ConfigCommand::Keys => {
            for (key, description) in config::KNOWN_KEYS {
                println!("{:<24} {}", key, description);
            }
        }
    }
    Ok(())
}
