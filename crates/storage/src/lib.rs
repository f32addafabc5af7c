// SPDX-License-Identifier: MIT

//! Durable storage for the execution supervisor: an append-only
//! write-ahead log, the in-memory materialized state it replays into, and
//! the [`TrackerStore`] capability surface the executor core depends on.

mod event;
mod file_store;
mod state;
mod store;
mod wal;

pub use event::StorageEvent;
pub use file_store::FileStore;
pub use state::MaterializedState;
pub use store::{
    ClaimOutcome, EventFilter, IssueFilter, IssueStatistics, IssueUpdate, NewIssue,
    ReadyWorkFilter, StoreError, TrackerStore,
};
pub use wal::{Wal, WalEntry, WalError};
