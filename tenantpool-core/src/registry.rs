//! Tenant id → pool handle registry.
//!
//! One registry is shared by every request of a multi-tenant service.
//! The map sits behind an `RwLock` that is held for a single lookup,
//! insert, or delete and released before any database work, so a slow
//! query on one tenant never blocks registration of another.
//!
//! Lifecycle calls never fail. Invalid (empty) ids, duplicate adds, and
//! overrides of unknown tenants are no-ops; the return values say which
//! case happened.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::handle::PoolHandle;
use crate::pg::PgBackend;

/// What `Registry::add` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The handle is now registered under the id.
    Added,
    /// The id already had a handle; it was left in place.
    AlreadyRegistered,
    /// The id was empty; nothing changed.
    InvalidId,
}

impl Registration {
    pub fn is_added(self) -> bool {
        self == Registration::Added
    }
}

/// Registry of per-tenant pool handles
pub struct Registry<B: Backend = PgBackend> {
    pools: RwLock<HashMap<String, Arc<PoolHandle<B>>>>,
}

impl<B: Backend> Default for Registry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> std::fmt::Debug for Registry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("projects", &self.projects())
            .finish()
    }
}

impl<B: Backend> Registry<B> {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated:
    // every critical section is a single HashMap call.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<PoolHandle<B>>>> {
        self.pools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<PoolHandle<B>>>> {
        self.pools.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handle` under `project` unless the tenant already has one.
    ///
    /// First registration wins: a second `add` for the same id leaves the
    /// original handle in place and returns `AlreadyRegistered`.
    pub fn add(&self, project: &str, handle: impl Into<Arc<PoolHandle<B>>>) -> Registration {
        if project.is_empty() {
            warn!("ignoring pool registration with empty project id");
            return Registration::InvalidId;
        }

        let outcome = match self.write().entry(project.to_owned()) {
            std::collections::hash_map::Entry::Occupied(_) => Registration::AlreadyRegistered,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(handle.into());
                Registration::Added
            }
        };

        debug!(project, ?outcome, "pool registration");
        outcome
    }

    /// Handle registered for `project`, if any.
    pub fn get(&self, project: &str) -> Option<Arc<PoolHandle<B>>> {
        if project.is_empty() {
            return None;
        }
        self.read().get(project).cloned()
    }

    /// Forget the tenant's handle and hand it back.
    ///
    /// The pool stays open; close it with [`PoolHandle::close`] once no
    /// caller still holds the handle.
    pub fn remove(&self, project: &str) -> Option<Arc<PoolHandle<B>>> {
        if project.is_empty() {
            warn!("ignoring pool removal with empty project id");
            return None;
        }

        let removed = self.write().remove(project);
        debug!(project, removed = removed.is_some(), "pool removal");
        removed
    }

    /// Swap in a new handle for a tenant that is already registered,
    /// returning the previous one. Unknown tenants are left unregistered;
    /// use [`Registry::add`] to create an entry.
    pub fn replace(
        &self,
        project: &str,
        handle: impl Into<Arc<PoolHandle<B>>>,
    ) -> Option<Arc<PoolHandle<B>>> {
        if project.is_empty() {
            warn!("ignoring pool override with empty project id");
            return None;
        }

        let previous = self
            .write()
            .get_mut(project)
            .map(|slot| std::mem::replace(slot, handle.into()));
        debug!(project, replaced = previous.is_some(), "pool override");
        previous
    }

    pub fn contains(&self, project: &str) -> bool {
        !project.is_empty() && self.read().contains_key(project)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered tenant ids, sorted.
    pub fn projects(&self) -> Vec<String> {
        let mut projects: Vec<String> = self.read().keys().cloned().collect();
        projects.sort();
        projects
    }

    /// Empty the registry and close every pool it held.
    ///
    /// Entries are drained under the lock; pools are closed after it is
    /// released. Returns the number of pools closed.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<_> = self.write().drain().collect();
        let count = drained.len();

        for (project, handle) in drained {
            debug!(project = %project, "closing pool");
            handle.close().await;
        }

        info!(pools = count, "pool registry shut down");
        count
    }
}
