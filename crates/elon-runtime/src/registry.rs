use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config;
use crate::context::ExecutionContext;
use crate::engine::RoutingEngine;

/// Process-local identifier of a running instance. Never zero, never reused.
pub type Handle = u64;

/// A running routing engine together with its cancellation capability and
/// the configuration text it was started from.
pub struct Instance {
    pub(crate) engine: Box<dyn RoutingEngine>,
    pub(crate) context: ExecutionContext,
    raw_config: String,
    fingerprint: String,
    started_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(engine: Box<dyn RoutingEngine>, context: ExecutionContext, raw_config: String) -> Self {
        let fingerprint = config::fingerprint(&raw_config);
        Self {
            engine,
            context,
            raw_config,
            fingerprint,
            started_at: Utc::now(),
        }
    }

    pub fn raw_config(&self) -> &str {
        &self.raw_config
    }

    fn info(&self, handle: Handle) -> InstanceInfo {
        InstanceInfo {
            handle,
            raw_config: self.raw_config.clone(),
            fingerprint: self.fingerprint.clone(),
            started_at: self.started_at,
        }
    }
}

/// Read-only snapshot of a registered instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub handle: Handle,
    pub raw_config: String,
    /// SHA-256 of `raw_config`, hex encoded.
    pub fingerprint: String,
    pub started_at: DateTime<Utc>,
}

struct RegistryState {
    next_handle: Handle,
    instances: HashMap<Handle, Instance>,
}

/// Handle → instance mapping plus the monotonic handle counter.
///
/// One lock covers both. Allocation and insertion happen under a single
/// acquisition, as do lookup and removal, so handles are unique and an
/// instance is handed out for destruction at most once. Engine construction
/// and close never run while the lock is held.
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_handle: 1,
                instances: HashMap::new(),
            }),
        }
    }

    /// Mint the next handle and store `instance` under it.
    ///
    /// The instance's context is disarmed only once the lock is held, so an
    /// insert abandoned while waiting for the lock still cancels it.
    pub async fn insert(&self, mut instance: Instance) -> Handle {
        let mut state = self.state.lock().await;
        instance.context.disarm();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.instances.insert(handle, instance);
        handle
    }

    /// Remove and return the instance for `handle`, if present.
    pub async fn remove(&self, handle: Handle) -> Option<Instance> {
        self.state.lock().await.instances.remove(&handle)
    }

    pub async fn get(&self, handle: Handle) -> Option<InstanceInfo> {
        let state = self.state.lock().await;
        state.instances.get(&handle).map(|instance| instance.info(handle))
    }

    pub async fn contains(&self, handle: Handle) -> bool {
        self.state.lock().await.instances.contains_key(&handle)
    }

    /// Live handles in ascending order.
    pub async fn handles(&self) -> Vec<Handle> {
        let state = self.state.lock().await;
        let mut handles: Vec<Handle> = state.instances.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.instances.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.instances.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
