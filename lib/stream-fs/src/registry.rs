//! The scheme → backend registry.

use crate::{FsError, MountConfig, Result, StorageBackend};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One registered backend together with its mount configuration.
#[derive(Debug, Clone)]
pub(crate) struct Mount {
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) config: MountConfig,
}

/// Maps scheme prefixes to backend instances.
///
/// Registration is write-once per scheme: re-registering reports failure
/// instead of overwriting. Unregistering removes the binding without
/// affecting handles that are already open (they hold their own reference to
/// the backend).
#[derive(Debug, Default)]
pub struct BackendRegistry {
    mounts: Mutex<HashMap<String, Mount>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `backend` to `scheme`. Returns false if the scheme is taken.
    pub fn register(
        &self,
        scheme: &str,
        backend: Arc<dyn StorageBackend>,
        config: MountConfig,
    ) -> bool {
        let Ok(mut mounts) = self.mounts.lock() else {
            return false;
        };

        if mounts.contains_key(scheme) {
            return false;
        }

        debug!(scheme, "registering backend");
        mounts.insert(scheme.to_owned(), Mount { backend, config });

        true
    }

    /// Removes the binding for `scheme`. Returns false if it was not bound.
    pub fn unregister(&self, scheme: &str) -> bool {
        let Ok(mut mounts) = self.mounts.lock() else {
            return false;
        };

        debug!(scheme, "unregistering backend");
        mounts.remove(scheme).is_some()
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.mounts
            .lock()
            .map(|mounts| mounts.contains_key(scheme))
            .unwrap_or(false)
    }

    pub(crate) fn get(&self, scheme: &str) -> Result<Mount> {
        let mounts = self.mounts.lock().map_err(|_| FsError::Lock)?;
        mounts.get(scheme).cloned().ok_or(FsError::UnregisteredScheme)
    }
}
