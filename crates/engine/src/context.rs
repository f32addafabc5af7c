// SPDX-License-Identifier: MIT

//! Context gathering and prompt construction for one mission (§4.3 step 4).
//!
//! The context gatherer pulls together everything the agent needs to know
//! about an issue before it starts working; the prompt builder renders that
//! into the single large string the agent subprocess is invoked with.

use supervisor_core::{Issue, IssueComment};
use supervisor_storage::{StoreError, TrackerStore};

/// Everything gathered about an issue before execution.
#[derive(Debug, Clone)]
pub struct IssueContext {
    pub issue: Issue,
    pub dependency_titles: Vec<String>,
    pub recent_comments: Vec<IssueComment>,
}

/// Pull together issue description, design notes, acceptance criteria,
/// a summary of (closed) dependencies, and recent comments.
pub async fn gather<St: TrackerStore>(store: &St, issue: &Issue) -> Result<IssueContext, StoreError> {
    let mut dependency_titles = Vec::with_capacity(issue.depends_on.len());
    for dep_id in &issue.depends_on {
        if let Some(dep) = store.get_issue(dep_id).await? {
            dependency_titles.push(format!("{} ({})", dep.title, dep.status));
        }
    }

    let mut recent_comments = store.get_comments(&issue.id).await?;
    const MAX_COMMENTS: usize = 10;
    if recent_comments.len() > MAX_COMMENTS {
        recent_comments = recent_comments.split_off(recent_comments.len() - MAX_COMMENTS);
    }

    Ok(IssueContext {
        issue: issue.clone(),
        dependency_titles,
        recent_comments,
    })
}

/// Render gathered context into the single prompt string the agent
/// subprocess is invoked with.
pub fn build_prompt(context: &IssueContext) -> String {
    let issue = &context.issue;
    let mut prompt = String::new();

    prompt.push_str(&format!("# {}\n\n", issue.title));
    prompt.push_str(&format!("Issue ID: {}\n", issue.id));
    prompt.push_str(&format!("Priority: {}\n\n", issue.priority.0));

    prompt.push_str("## Description\n\n");
    prompt.push_str(&issue.description);
    prompt.push('\n');

    if let Some(design) = &issue.design_notes {
        prompt.push_str("\n## Design notes\n\n");
        prompt.push_str(design);
        prompt.push('\n');
    }

    if let Some(acceptance) = &issue.acceptance_criteria {
        prompt.push_str("\n## Acceptance criteria\n\n");
        prompt.push_str(acceptance);
        prompt.push('\n');
    }

    if !context.dependency_titles.is_empty() {
        prompt.push_str("\n## Dependencies\n\n");
        for title in &context.dependency_titles {
            prompt.push_str(&format!("- {title}\n"));
        }
    }

    if !context.recent_comments.is_empty() {
        prompt.push_str("\n## Recent comments\n\n");
        for comment in &context.recent_comments {
            prompt.push_str(&format!("- {}: {}\n", comment.author, comment.body));
        }
    }

    prompt
}
