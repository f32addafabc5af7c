// SPDX-License-Identifier: MIT

//! Executor instance registry event handlers.

use super::MaterializedState;
use crate::event::StorageEvent;
use supervisor_core::{ExecutorInstance, InstanceStatus};

pub(crate) fn apply(state: &mut MaterializedState, event: &StorageEvent) {
    match event {
        StorageEvent::InstanceRegistered {
            id,
            hostname,
            pid,
            version,
            started_at,
        } => {
            let key = id.as_str().to_string();
            if state.instances.contains_key(&key) {
                return;
            }
            state.instances.insert(
                key,
                ExecutorInstance::new(id.clone(), hostname.clone(), *pid, version.clone(), *started_at),
            );
        }

        StorageEvent::InstanceHeartbeat { id, at } => {
            if let Some(instance) = state.instances.get_mut(id.as_str()) {
                instance.last_heartbeat = *at;
            }
        }

        StorageEvent::InstanceStopped { id, at } => {
            if let Some(instance) = state.instances.get_mut(id.as_str()) {
                instance.status = InstanceStatus::Stopped;
                instance.last_heartbeat = *at;
            }
        }

        StorageEvent::InstanceCrashed { id } => {
            if let Some(instance) = state.instances.get_mut(id.as_str()) {
                instance.status = InstanceStatus::Crashed;
            }
        }

        StorageEvent::InstanceDeleted { id } => {
            state.instances.remove(id.as_str());
        }

        _ => {}
    }
}
