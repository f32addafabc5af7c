// SPDX-License-Identifier: MIT

//! `supervisor issue`: seed and inspect the tracker's issue set directly,
//! without going through an agent run. Useful for operators wiring this
//! executor up to a fresh store, and for smoke-testing the work loop.

use clap::{Args, Subcommand};
use std::path::PathBuf;
use supervisor_core::{IssueId, IssuePriority, IssueType};
use supervisor_storage::{IssueFilter, NewIssue, TrackerStore};

#[derive(Args)]
pub struct IssueArgs {
    #[command(subcommand)]
    command: IssueCommand,
}

#[derive(Subcommand)]
enum IssueCommand {
    /// File a new issue.
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Priority 0 (highest) through 4 (lowest).
        #[arg(long, default_value_t = 2)]
        priority: i64,
        /// Issue IDs this issue depends on.
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },
    /// List issues, optionally filtered by status.
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one issue's detail, including comments and events.
    Show { id: String },
    /// Close an issue directly (bypassing the execution pipeline).
    Close { id: String, #[arg(long, default_value = "closed manually")] reason: String },
}

pub async fn run(state_dir: PathBuf, args: IssueArgs) -> anyhow::Result<()> {
    let store = super::open_store(&state_dir)?;
    let now = chrono::Utc::now();

    match args.command {
        IssueCommand::Create {
            title,
            description,
            priority,
            depends_on,
        } => {
            let depends_on = depends_on.into_iter().map(IssueId::from_string).collect::<Vec<_>>();
            let issue = store
                .create_issue(
                    NewIssue {
                        title,
                        description,
                        priority: IssuePriority::clamp(priority),
                        issue_type: IssueType::task(),
                        labels: Vec::new(),
                        depends_on,
                    },
                    now,
                )
                .await?;
            println!("created {}", issue.id);
        }
        IssueCommand::List { status } => {
            let filter = IssueFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                label: None,
                assignee: None,
            };
            let issues = store.search_issues(filter).await?;
            for issue in issues {
                println!(
                    "{}\t{}\t{}\tp{}\t{}",
                    issue.id, issue.status, issue.issue_type, issue.priority.0, issue.title
                );
            }
        }
        IssueCommand::Show { id } => {
            let id = IssueId::from_string(&id);
            let Some(issue) = store.get_issue(&id).await? else {
                anyhow::bail!("issue {id} not found");
            };
            println!("{:#?}", issue);
            let state = store.get_execution_state(&id).await?;
            println!("execution state: {:?}", state.map(|s| s.state));
            for comment in store.get_comments(&id).await? {
                println!("-- comment by {} at {}:\n{}", comment.author, comment.created_at, comment.body);
            }
        }
        IssueCommand::Close { id, reason } => {
            let id = IssueId::from_string(&id);
            store.close_issue(&id, &reason, now).await?;
            println!("closed {id}");
        }
    }
    Ok(())
}

fn parse_status(raw: &str) -> anyhow::Result<supervisor_core::IssueStatus> {
    use supervisor_core::IssueStatus::*;
    Ok(match raw {
        "open" => Open,
        "in_progress" => InProgress,
        "blocked" => Blocked,
        "closed" => Closed,
        other => anyhow::bail!("unknown status '{other}'"),
    })
}
