// SPDX-License-Identifier: MIT

//! Shared helpers for state event handlers.

use std::collections::HashMap;

/// Look up a value by exact key or unique prefix match.
pub(crate) fn find_by_prefix<'a, V>(map: &'a HashMap<String, V>, id: &str) -> Option<&'a V> {
    if let Some(val) = map.get(id) {
        return Some(val);
    }
    let matches: Vec<_> = map.iter().filter(|(k, _)| k.starts_with(id)).collect();
    if matches.len() == 1 {
        Some(matches[0].1)
    } else {
        None
    }
}
