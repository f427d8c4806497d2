//! The in-memory backend.

use crate::buffer::LocalBuffer;
use crate::metadata::{EntryInfo, EntryKind, ObjectInfo, Visibility};
use crate::{FsError, ObjectStream, Result, StorageBackend};
use std::io::Read;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

/// An in-memory object store.
///
/// This `MemBackend` type can be cloned; clones are light copies sharing the
/// same store behind an `Arc` + `RwLock`. Listing order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemBackend {
    inner: Arc<RwLock<MemBackendInner>>,
}

#[derive(Debug, Default)]
struct MemBackendInner {
    // Vec keeps the listing in insertion order; the store stays small enough
    // that linear lookups are fine.
    entries: Vec<(String, MemNode)>,
}

#[derive(Debug, Clone)]
enum MemNode {
    File {
        data: Vec<u8>,
        modified: u64,
        visibility: Visibility,
    },
    Directory {
        modified: u64,
        visibility: Visibility,
    },
}

impl MemNode {
    fn info(&self) -> ObjectInfo {
        match self {
            Self::File {
                data,
                modified,
                visibility,
            } => ObjectInfo::file(data.len() as u64)
                .with_modified(*modified)
                .with_visibility(*visibility),
            Self::Directory {
                modified,
                visibility,
            } => ObjectInfo::directory()
                .with_modified(*modified)
                .with_visibility(*visibility),
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object directly into the store, bypassing the handle layer.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.ensure_parent_dirs(path);
            inner.upsert_file(path, data.into());
        }
    }

    /// Raw object bytes, for inspecting the store from tests and tools.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.read().ok()?;

        match inner.find(path)? {
            MemNode::File { data, .. } => Some(data.clone()),
            MemNode::Directory { .. } => None,
        }
    }
}

impl MemBackendInner {
    fn find(&self, path: &str) -> Option<&MemNode> {
        self.entries
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, node)| node)
    }

    fn find_mut(&mut self, path: &str) -> Option<&mut MemNode> {
        self.entries
            .iter_mut()
            .find(|(name, _)| name == path)
            .map(|(_, node)| node)
    }

    fn remove(&mut self, path: &str) -> Option<MemNode> {
        let index = self.entries.iter().position(|(name, _)| name == path)?;

        Some(self.entries.remove(index).1)
    }

    fn ensure_parent_dirs(&mut self, path: &str) {
        let mut parent = parent_of(path);

        while !parent.is_empty() && self.find(parent).is_none() {
            self.entries.push((
                parent.to_owned(),
                MemNode::Directory {
                    modified: now(),
                    visibility: Visibility::Public,
                },
            ));
            parent = parent_of(parent);
        }
    }

    fn upsert_file(&mut self, path: &str, data: Vec<u8>) {
        match self.find_mut(path) {
            Some(MemNode::File {
                data: existing,
                modified,
                ..
            }) => {
                *existing = data;
                *modified = now();
            }
            Some(MemNode::Directory { .. }) => {}
            None => {
                self.entries.push((
                    path.to_owned(),
                    MemNode::File {
                        data,
                        modified: now(),
                        visibility: Visibility::Public,
                    },
                ));
            }
        }
    }
}

impl StorageBackend for MemBackend {
    fn exists(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }

        self.inner
            .read()
            .map(|inner| inner.find(path).is_some())
            .unwrap_or(false)
    }

    /// Hands out an independent copy of the object's bytes. The copy is the
    /// handle's alone, so it reports as writable and the handle skips its
    /// defensive copy.
    fn read_stream(&self, path: &str) -> Result<Box<dyn ObjectStream>> {
        let inner = self.inner.read().map_err(|_| FsError::Lock)?;

        match inner.find(path) {
            Some(MemNode::File { data, .. }) => {
                Ok(Box::new(LocalBuffer::from_vec(data.clone())))
            }
            Some(MemNode::Directory { .. }) => Err(FsError::NotAFile),
            None => Err(FsError::EntityNotFound),
        }
    }

    fn write_stream(&self, path: &str, src: &mut dyn Read) -> Result<()> {
        let mut data = Vec::new();
        src.read_to_end(&mut data)?;

        let mut inner = self.inner.write().map_err(|_| FsError::Lock)?;
        if matches!(inner.find(path), Some(MemNode::Directory { .. })) {
            return Err(FsError::NotAFile);
        }

        trace!(path, bytes = data.len(), "storing object");
        inner.ensure_parent_dirs(path);
        inner.upsert_file(path, data);

        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| FsError::Lock)?;

        match inner.find(path) {
            Some(MemNode::File { .. }) => {
                inner.remove(path);
                Ok(())
            }
            Some(MemNode::Directory { .. }) => Err(FsError::NotAFile),
            None => Err(FsError::EntityNotFound),
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| FsError::Lock)?;

        if inner.find(from).is_none() {
            return Err(FsError::EntityNotFound);
        }
        if inner.find(to).is_some() {
            return Err(FsError::AlreadyExists);
        }

        inner.ensure_parent_dirs(to);

        // Move the node and, for directories, everything beneath it.
        let child_prefix = format!("{from}/");
        for (name, _) in &mut inner.entries {
            if name == from {
                *name = to.to_owned();
            } else if let Some(rest) = name.strip_prefix(&child_prefix) {
                *name = format!("{to}/{rest}");
            }
        }

        Ok(())
    }

    fn create_dir(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(FsError::AlreadyExists);
        }

        let mut inner = self.inner.write().map_err(|_| FsError::Lock)?;

        match inner.find(path) {
            Some(MemNode::File { .. }) => Err(FsError::AlreadyExists),
            Some(MemNode::Directory { .. }) => Ok(()),
            None => {
                inner.ensure_parent_dirs(path);
                inner.entries.push((
                    path.to_owned(),
                    MemNode::Directory {
                        modified: now(),
                        visibility: Visibility::Public,
                    },
                ));
                Ok(())
            }
        }
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(FsError::RootViolation);
        }

        let mut inner = self.inner.write().map_err(|_| FsError::Lock)?;

        match inner.find(path) {
            Some(MemNode::Directory { .. }) => {
                let child_prefix = format!("{path}/");
                inner
                    .entries
                    .retain(|(name, _)| name != path && !name.starts_with(&child_prefix));
                Ok(())
            }
            Some(MemNode::File { .. }) => Err(FsError::BaseNotDirectory),
            None => Err(FsError::EntityNotFound),
        }
    }

    fn list(&self, path: &str) -> Result<Vec<EntryInfo>> {
        let inner = self.inner.read().map_err(|_| FsError::Lock)?;

        Ok(inner
            .entries
            .iter()
            .filter(|(name, _)| parent_of(name) == path && !name.is_empty())
            .map(|(name, node)| EntryInfo {
                path: name.clone(),
                info: node.info(),
            })
            .collect())
    }

    fn metadata(&self, path: &str) -> Result<ObjectInfo> {
        if path.is_empty() {
            return Ok(ObjectInfo::directory());
        }

        let inner = self.inner.read().map_err(|_| FsError::Lock)?;
        inner
            .find(path)
            .map(MemNode::info)
            .ok_or(FsError::EntityNotFound)
    }

    fn set_visibility(&self, path: &str, new_visibility: Visibility) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| FsError::Lock)?;

        match inner.find_mut(path) {
            Some(MemNode::File { visibility, .. }) | Some(MemNode::Directory { visibility, .. }) => {
                *visibility = new_visibility;
                Ok(())
            }
            None => Err(FsError::EntityNotFound),
        }
    }
}
