// SPDX-License-Identifier: MIT

//! The two periodic janitors (§4.6): stale-instance reclamation + sandbox
//! pruning, and event retention. Each runs as its own long-lived task.

pub mod events;
pub mod instances;
