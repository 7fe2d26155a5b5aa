//! Flow tables and the allocator that hands them out

use super::Flow;
use crate::config::FlowTableConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Factory for flow tables
///
/// One allocator is shared by every probe type. It only tracks how many
/// tables are alive so teardown can be verified.
#[derive(Debug)]
pub struct TableAllocator {
    update: Duration,
    expire: Duration,
    next_id: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl TableAllocator {
    pub fn new(update: Duration, expire: Duration) -> Self {
        Self {
            update,
            expire,
            next_id: AtomicU64::new(1),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &FlowTableConfig) -> Self {
        Self::new(
            Duration::from_secs(config.update),
            Duration::from_secs(config.expire),
        )
    }

    /// Allocate a fresh, empty table
    pub fn alloc(&self) -> Arc<Table> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Allocated flow table {}", id);
        Arc::new(Table {
            id,
            update: self.update,
            expire: self.expire,
            flows: Mutex::new(HashMap::new()),
            live: self.live.clone(),
        })
    }

    /// Number of allocated tables that have not been dropped yet
    pub fn live_tables(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn update_interval(&self) -> Duration {
        self.update
    }

}

impl Default for TableAllocator {
    fn default() -> Self {
        Self::from_config(&FlowTableConfig::default())
    }
}

/// Live flows of one capture, keyed by flow uuid
#[derive(Debug)]
pub struct Table {
    id: u64,
    update: Duration,
    expire: Duration,
    flows: Mutex<HashMap<String, Flow>>,
    live: Arc<AtomicUsize>,
}

impl Table {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn update_interval(&self) -> Duration {
        self.update
    }

    /// Insert new flows or merge them into existing ones
    pub fn update(&self, flows: impl IntoIterator<Item = Flow>) {
        let mut table = self.lock();
        for flow in flows {
            match table.get_mut(&flow.uuid) {
                Some(existing) => existing.merge(&flow),
                None => {
                    table.insert(flow.uuid.clone(), flow);
                }
            }
        }
    }

    /// Remove and return flows idle for longer than the expire delay
    pub fn expire(&self, now: DateTime<Utc>) -> Vec<Flow> {
        let expire_ms = i64::try_from(self.expire.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.timestamp_millis().saturating_sub(expire_ms);

        let mut table = self.lock();
        let expired: Vec<String> = table
            .values()
            .filter(|f| f.last < cutoff)
            .map(|f| f.uuid.clone())
            .collect();

        expired
            .iter()
            .filter_map(|uuid| table.remove(uuid))
            .collect()
    }

    /// Remove and return every flow
    pub fn drain(&self) -> Vec<Flow> {
        self.lock().drain().map(|(_, f)| f).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Flow>> {
        self.flows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
