// SPDX-License-Identifier: MIT

//! Discovery deduplication (§4.5): newly-discovered issue candidates are
//! compared against the existing issue set, and against each other within
//! the same batch, before being filed. Candidates are split into chunks of
//! at most `DeduplicationConfig::batch_size` and each chunk is sent to the
//! oracle in a single `deduplicate` call.
//!
//! `Oracle::deduplicate`'s `DedupVerdict.duplicate_of` can only name a real
//! `IssueId`. To express "duplicate of another candidate in this same
//! chunk" without widening that return type, every candidate in the chunk
//! is given a synthetic `IssueId` (never persisted) before the call, folded
//! alongside already-accepted candidates from earlier chunks into the
//! `existing` slice — a verdict whose `duplicate_of` matches one of those
//! synthetic IDs is a within-batch duplicate, valid only when it points at
//! an earlier candidate in the chunk that was itself accepted.

use chrono::Utc;
use supervisor_adapters::Oracle;
use supervisor_core::{
    Clock, DedupCandidate, DeduplicationConfig, Issue, IssueId, IssuePriority, IssueType,
};
use supervisor_storage::{IssueFilter, NewIssue, TrackerStore};
use tracing::{info, warn};

/// Default priority stamped on issues filed from agent discoveries.
const DISCOVERED_ISSUE_PRIORITY: IssuePriority = IssuePriority(4);

/// Compare `candidates` against the existing issue set (and, when
/// `within_batch` is enabled, against each other) and file every candidate
/// that survives as a new `discovered` issue. Logs every decision with a
/// `[DEDUP]`-tagged message.
pub async fn process<St, O, C>(
    store: &St,
    oracle: &O,
    config: &DeduplicationConfig,
    clock: &C,
    candidates: Vec<DedupCandidate>,
) where
    St: TrackerStore,
    O: Oracle,
    C: Clock,
{
    let candidates: Vec<DedupCandidate> = candidates
        .into_iter()
        .filter(|c| {
            let keep = c.title.trim().len() >= config.min_title_length;
            if !keep {
                info!(title = %c.title, "[DEDUP] skipping candidate below MinTitleLength");
            }
            keep
        })
        .collect();
    if candidates.is_empty() {
        return;
    }

    let existing = match load_existing(store, config).await {
        Ok(issues) => issues,
        Err(e) => {
            warn!(error = %e, "[DEDUP] failed to load existing issues for comparison");
            Vec::new()
        }
    };

    let mut accepted_synthetic: Vec<Issue> = Vec::new();
    let batch_size = config.batch_size.max(1);

    for chunk in candidates.chunks(batch_size) {
        let chunk_ids: Vec<IssueId> = chunk.iter().map(|_| IssueId::new()).collect();

        let mut comparison_set = existing.clone();
        if config.within_batch {
            comparison_set.extend(accepted_synthetic.iter().cloned());
            let now = clock.now_utc();
            for (candidate, id) in chunk.iter().zip(&chunk_ids) {
                let mut synthetic = Issue::new(id.clone(), candidate.title.clone(), now);
                synthetic.description = candidate.description.clone();
                comparison_set.push(synthetic);
            }
        }

        let verdicts = call_with_retries(oracle, chunk, &comparison_set, config).await;
        if let Err(e) = &verdicts {
            warn!(error = %e, "[DEDUP] oracle call failed after retries for this batch");
        }

        let mut accepted_in_chunk = vec![false; chunk.len()];

        for (index, candidate) in chunk.iter().enumerate() {
            let is_duplicate = match &verdicts {
                Ok(vs) => vs
                    .iter()
                    .find(|v| v.candidate_index == index)
                    .is_some_and(|v| match v.duplicate_of {
                        Some(dup) if v.confidence >= config.confidence_threshold => {
                            match chunk_ids.iter().position(|id| *id == dup) {
                                Some(pos) => pos < index && accepted_in_chunk[pos],
                                None => true,
                            }
                        }
                        _ => false,
                    }),
                Err(_) => !config.fail_open,
            };

            if is_duplicate {
                info!(title = %candidate.title, "[DEDUP] discarding duplicate candidate");
                continue;
            }

            info!(index, title = %candidate.title, "[DEDUP] filing new discovered issue");
            let now = clock.now_utc();
            if let Err(e) = store
                .create_issue(
                    NewIssue {
                        title: candidate.title.clone(),
                        description: candidate.description.clone(),
                        priority: DISCOVERED_ISSUE_PRIORITY,
                        issue_type: IssueType::discovered(),
                        labels: Vec::new(),
                        depends_on: Vec::new(),
                    },
                    now,
                )
                .await
            {
                warn!(error = %e, title = %candidate.title, "[DEDUP] failed to file discovered issue");
                continue;
            }

            accepted_in_chunk[index] = true;
            if config.within_batch {
                let mut synthetic = Issue::new(chunk_ids[index].clone(), candidate.title.clone(), now);
                synthetic.description = candidate.description.clone();
                accepted_synthetic.push(synthetic);
            }
        }
    }
}

async fn load_existing<St: TrackerStore>(
    store: &St,
    config: &DeduplicationConfig,
) -> Result<Vec<Issue>, supervisor_storage::StoreError> {
    let cutoff = Utc::now() - chrono::Duration::days(config.lookback_days as i64);
    let mut issues = store.search_issues(IssueFilter::default()).await?;
    issues.retain(|issue| {
        let in_window = issue.created_at >= cutoff;
        let status_ok = config.include_closed || !issue.status.is_terminal();
        in_window && status_ok
    });
    issues.truncate(config.max_candidates);
    Ok(issues)
}

async fn call_with_retries<O: Oracle>(
    oracle: &O,
    candidates: &[DedupCandidate],
    existing: &[Issue],
    config: &DeduplicationConfig,
) -> Result<Vec<supervisor_core::DedupVerdict>, supervisor_adapters::OracleError> {
    let mut attempt = 0;
    loop {
        match oracle.deduplicate(candidates, existing).await {
            Ok(verdicts) => return Ok(verdicts),
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                warn!(attempt, error = %e, "[DEDUP] retrying oracle call");
            }
            Err(e) => return Err(e),
        }
    }
}
