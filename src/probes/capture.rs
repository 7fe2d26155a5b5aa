//! Per-node capture bookkeeping shared by the probe handlers

use crate::error::{FlowProbeError, Result};
use crate::flow::{Flow, Table};
use crate::topology::NodeId;
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One active capture: its flow table plus handler-specific state
pub(crate) struct Capture<S> {
    pub table: Arc<Table>,
    pub state: S,
}

/// Active captures keyed by node id
///
/// Guarded by its own mutex, never by the graph lock, so handlers can
/// register and unregister while a graph sweep is in progress.
pub(crate) struct Captures<S> {
    entries: Mutex<BTreeMap<NodeId, Capture<S>>>,
}

impl<S> Captures<S> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<NodeId, Capture<S>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.lock().contains_key(id)
    }

    /// Insert `capture` unless `id` already has one
    ///
    /// Check and insert happen under one lock. A rejected capture is handed
    /// back so the caller can release what it started.
    pub fn insert_if_absent(&self, id: NodeId, capture: Capture<S>) -> Option<Capture<S>> {
        match self.lock().entry(id) {
            Entry::Occupied(_) => Some(capture),
            Entry::Vacant(slot) => {
                slot.insert(capture);
                None
            }
        }
    }

    pub fn remove(&self, id: &NodeId) -> Option<Capture<S>> {
        self.lock().remove(id)
    }

    /// Remove every capture
    pub fn take_all(&self) -> Vec<(NodeId, Capture<S>)> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.lock().keys().cloned().collect()
    }

    /// Run `f` on one capture's state
    pub fn with_state<R>(&self, id: &NodeId, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.lock().get(id).map(|c| f(&c.state))
    }

    /// Merge flows into the table of the capture on `id`
    pub fn ingest(&self, id: &NodeId, flows: Vec<Flow>) -> Result<()> {
        let table = self
            .lock()
            .get(id)
            .map(|c| c.table.clone())
            .ok_or_else(|| FlowProbeError::NodeNotFound(id.to_string()))?;
        table.update(flows);
        Ok(())
    }

    /// Collect expired flows from every table
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<Flow> {
        self.tables().iter().flat_map(|t| t.expire(now)).collect()
    }

    /// Collect every flow from every table
    pub fn drain(&self) -> Vec<Flow> {
        self.tables().iter().flat_map(|t| t.drain()).collect()
    }

    fn tables(&self) -> Vec<Arc<Table>> {
        self.lock().values().map(|c| c.table.clone()).collect()
    }
}
