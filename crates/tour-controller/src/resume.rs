//! Cross-page resumption records.
//!
//! Two keys in short-lived per-tab storage:
//! - `activeTourPointer`: tour id, step id, step index and scope
//! - `stepData:<stepId>`: the serialized step
//!
//! The pointer is single-writer and read once: reading it clears it.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tourguide_core_types::{Scope, Step, StepId, Tour, TourId};
use tracing::debug;

use crate::errors::StoreError;

pub const ACTIVE_TOUR_POINTER: &str = "activeTourPointer";

pub fn step_data_key(step: &StepId) -> String {
    format!("stepData:{}", step)
}

/// String key/value storage with session-storage semantics.
pub trait ResumeStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryResumeStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ResumeStore for MemoryResumeStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePointer {
    pub tour_id: TourId,
    pub step_id: StepId,
    pub step_index: usize,
    #[serde(default)]
    pub scope: Scope,
}

/// Persists the pointer and the step it names.
pub fn write_record(
    store: &dyn ResumeStore,
    tour: &Tour,
    step_index: usize,
) -> Result<(), StoreError> {
    let Some(step) = tour.step(step_index) else {
        return Ok(());
    };
    let step_json = serde_json::to_string(step).map_err(|err| StoreError::Corrupt {
        key: step_data_key(&step.id),
        reason: err.to_string(),
    })?;
    store.set(&step_data_key(&step.id), step_json)?;

    let pointer = ResumePointer {
        tour_id: tour.id.clone(),
        step_id: step.id.clone(),
        step_index,
        scope: tour.scope.clone(),
    };
    let pointer_json = serde_json::to_string(&pointer).map_err(|err| StoreError::Corrupt {
        key: ACTIVE_TOUR_POINTER.to_string(),
        reason: err.to_string(),
    })?;
    store.set(ACTIVE_TOUR_POINTER, pointer_json)?;
    debug!(target: "tour-controller", tour = %tour.id, step = %step.id, "resume record written");
    Ok(())
}

/// Reads and clears the pointer.
pub fn take_pointer(store: &dyn ResumeStore) -> Result<Option<ResumePointer>, StoreError> {
    let Some(raw) = store.get(ACTIVE_TOUR_POINTER)? else {
        return Ok(None);
    };
    store.remove(ACTIVE_TOUR_POINTER)?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| StoreError::Corrupt {
            key: ACTIVE_TOUR_POINTER.to_string(),
            reason: err.to_string(),
        })
}

pub fn read_step(store: &dyn ResumeStore, step: &StepId) -> Result<Option<Step>, StoreError> {
    let key = step_data_key(step);
    let Some(raw) = store.get(&key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| StoreError::Corrupt {
            key,
            reason: err.to_string(),
        })
}

/// Removes the pointer and every step record of `tour`.
pub fn clear_record(store: &dyn ResumeStore, tour: &Tour) -> Result<(), StoreError> {
    store.remove(ACTIVE_TOUR_POINTER)?;
    for step in &tour.steps {
        store.remove(&step_data_key(&step.id))?;
    }
    Ok(())
}
