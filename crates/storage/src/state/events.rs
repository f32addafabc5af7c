// SPDX-License-Identifier: MIT

//! Agent-event log and configuration event handlers.

use super::MaterializedState;
use crate::event::StorageEvent;

pub(crate) fn apply(state: &mut MaterializedState, event: &StorageEvent) {
    match event {
        StorageEvent::AgentEventStored { event } => {
            state.events.push((**event).clone());
        }

        StorageEvent::AgentEventsDeleted { ids } => {
            state.events.retain(|e| !ids.contains(&e.id.as_str().to_string()));
        }

        StorageEvent::ConfigSet { key, value } => {
            state.config.insert(key.clone(), value.clone());
        }

        _ => {}
    }
}
