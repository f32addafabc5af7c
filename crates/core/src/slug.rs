// SPDX-License-Identifier: MIT

//! Branch-name slug derivation.

/// Derive the `<slug>` half of `mission/<issue-id>-<slug>`: lowercase the
/// title, collapse runs of non-alphanumeric characters to a single `-`, trim
/// leading/trailing dashes, and truncate to 40 bytes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.len() > 40 {
        let mut end = 40;
        while !slug.is_char_boundary(end) {
            end -= 1;
        }
        slug.truncate(end);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "issue".to_string()
    } else {
        slug
    }
}

/// Build the mission branch name for an issue.
pub fn mission_branch(issue_id: &str, title: &str) -> String {
    format!("mission/{issue_id}-{}", slugify(title))
}
