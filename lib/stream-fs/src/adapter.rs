//! The native-style operation surface over registered backends.

use crate::lock::{LockMode, LockToken};
use crate::metadata::{translate, StatRecord};
use crate::readdir::relative_names;
use crate::registry::{BackendRegistry, Mount};
use crate::uri::VfsUri;
use crate::{
    FileHandle, FsError, LockRegistry, OpenOptions, OpenOptionsConfig, ReadDir, Result,
};
use std::io;
use std::sync::Arc;
use tracing::warn;

/// Metadata mutations a caller can request on a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOp {
    /// Native permission bits; reduced to a visibility through the mount's
    /// public mask and forwarded to the backend.
    Access(u32),
    /// Create the object empty if it does not exist.
    Touch,
}

/// The adapter: resolves `scheme://path` references against a registry of
/// backends and exposes file, directory, metadata and lock operations with
/// native-API semantics.
#[derive(Debug)]
pub struct StreamFs {
    registry: Arc<BackendRegistry>,
    locks: LockRegistry,
}

impl Default for StreamFs {
    fn default() -> Self {
        Self::new(Arc::new(BackendRegistry::new()))
    }
}

impl StreamFs {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            locks: LockRegistry::new(),
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn new_open_options(&self) -> OpenOptions<'_> {
        OpenOptions::new(self)
    }

    fn resolve(&self, uri: &str) -> Result<(VfsUri, Mount)> {
        let parsed = VfsUri::parse(uri)?;
        let mount = self.registry.get(parsed.scheme())?;

        Ok((parsed, mount))
    }

    pub(crate) fn open_with(&self, uri: &str, conf: &OpenOptionsConfig) -> Result<FileHandle> {
        let (parsed, mount) = self.resolve(uri)?;

        FileHandle::open(mount, parsed, conf).map_err(|error| fail("open", uri, error))
    }

    /// Opens a snapshot of the directory's entries. The snapshot keeps the
    /// backend's own ordering and is immune to later backend changes.
    pub fn open_dir(&self, uri: &str) -> Result<ReadDir> {
        let (parsed, mount) = self.resolve(uri)?;
        let listing = mount.backend.list(parsed.target())?;

        Ok(ReadDir::new(relative_names(parsed.target(), listing)))
    }

    /// Stat, surfacing a missing target as a warning-class failure.
    pub fn stat(&self, uri: &str) -> Result<StatRecord> {
        let (parsed, mount) = self.resolve(uri)?;

        mount
            .backend
            .metadata(parsed.target())
            .map(|info| translate(&info, &mount.config))
            .map_err(|error| fail("stat", uri, error))
    }

    /// Quiet stat for existence probes: a missing target is `None`, every
    /// other failure still surfaces.
    pub fn stat_quiet(&self, uri: &str) -> Result<Option<StatRecord>> {
        let (parsed, mount) = self.resolve(uri)?;

        match mount.backend.metadata(parsed.target()) {
            Ok(info) => Ok(Some(translate(&info, &mount.config))),
            Err(FsError::EntityNotFound) => Ok(None),
            Err(other) => Err(other),
        }
    }

    pub fn exists(&self, uri: &str) -> bool {
        matches!(self.stat_quiet(uri), Ok(Some(_)))
    }

    /// Deletes a file.
    pub fn unlink(&self, uri: &str) -> Result<()> {
        let (parsed, mount) = self.resolve(uri)?;

        mount
            .backend
            .delete(parsed.target())
            .map_err(|error| fail("unlink", uri, error))
    }

    /// Creates a directory. Without `recursive`, the parent must already
    /// exist.
    pub fn mkdir(&self, uri: &str, recursive: bool) -> Result<()> {
        let (parsed, mount) = self.resolve(uri)?;
        let target = parsed.target();

        if mount.backend.exists(target) {
            return Err(fail("mkdir", uri, FsError::AlreadyExists));
        }

        if !recursive {
            let parent = target.rsplit_once('/').map(|(parent, _)| parent);
            if let Some(parent) = parent {
                if !mount.backend.exists(parent) {
                    return Err(fail("mkdir", uri, FsError::EntityNotFound));
                }
            }
        }

        mount
            .backend
            .create_dir(target)
            .map_err(|error| fail("mkdir", uri, error))
    }

    /// Removes a directory. Without `recursive`, it must be empty.
    pub fn rmdir(&self, uri: &str, recursive: bool) -> Result<()> {
        let (parsed, mount) = self.resolve(uri)?;
        let target = parsed.target();

        if target.is_empty() {
            return Err(fail("rmdir", uri, FsError::RootViolation));
        }

        match mount.backend.metadata(target) {
            Ok(info) if info.kind.is_dir() => {}
            Ok(_) => return Err(fail("rmdir", uri, FsError::BaseNotDirectory)),
            Err(error) => return Err(fail("rmdir", uri, error)),
        }

        if !recursive && !mount.backend.list(target)?.is_empty() {
            return Err(fail("rmdir", uri, FsError::DirectoryNotEmpty));
        }

        mount
            .backend
            .remove_dir(target)
            .map_err(|error| fail("rmdir", uri, error))
    }

    /// Moves `from` onto `to` within one scheme. An existing destination
    /// file is replaced — in a single backend call when the backend renames
    /// over existing objects itself, otherwise by deleting the destination
    /// first. An existing destination directory is refused.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (parsed_from, mount) = self.resolve(from)?;
        let parsed_to = VfsUri::parse(to)?;

        if parsed_from.scheme() != parsed_to.scheme() {
            return Err(fail("rename", from, FsError::InvalidInput));
        }
        if parsed_from.target() == parsed_to.target() {
            return Ok(());
        }

        if !mount.backend.exists(parsed_from.target()) {
            return Err(fail("rename", from, FsError::EntityNotFound));
        }

        match mount.backend.metadata(parsed_to.target()) {
            Ok(info) if info.kind.is_dir() => {
                return Err(fail("rename", to, FsError::AlreadyExists));
            }
            Ok(_) if !mount.backend.rename_replaces() => {
                mount
                    .backend
                    .delete(parsed_to.target())
                    .map_err(|error| fail("rename", to, error))?;
            }
            _ => {}
        }

        mount
            .backend
            .rename(parsed_from.target(), parsed_to.target())
            .map_err(|error| fail("rename", from, error))
    }

    /// Applies an advisory lock operation for the reference. Locks are
    /// cooperative within this process only; see [`LockRegistry`].
    pub fn lock(&self, uri: &str, mode: LockMode, non_blocking: bool) -> Result<bool> {
        let (parsed, _mount) = self.resolve(uri)?;
        let token = LockToken::for_reference(&parsed.canonical());

        Ok(self.locks.apply(token, mode, non_blocking))
    }

    /// Applies a metadata mutation. A backend without visibility support
    /// makes `Access` a successful no-op.
    pub fn set_metadata(&self, uri: &str, op: MetadataOp) -> Result<()> {
        let (parsed, mount) = self.resolve(uri)?;
        let target = parsed.target();

        match op {
            MetadataOp::Access(mode) => {
                let visibility = mount.config.visibility_for_mode(mode);

                match mount.backend.set_visibility(target, visibility) {
                    Err(FsError::Unsupported) => Ok(()),
                    other => other.map_err(|error| fail("chmod", uri, error)),
                }
            }
            MetadataOp::Touch => {
                if mount.backend.exists(target) {
                    return Ok(());
                }

                mount
                    .backend
                    .write_stream(target, &mut io::empty())
                    .map_err(|error| fail("touch", uri, error))
            }
        }
    }
}

/// Emits the user-facing diagnostic for anticipated, warning-class failures
/// and hands the error back for propagation. Unanticipated backend errors
/// pass through silently here and stay loud for the caller.
fn fail(op: &str, uri: &str, error: FsError) -> FsError {
    match error {
        FsError::EntityNotFound => warn!("{op}({uri}): No such file or directory"),
        FsError::AlreadyExists => warn!("{op}({uri}): File exists"),
        FsError::RootViolation => warn!("{op}({uri}): Cannot remove the root directory"),
        FsError::DirectoryNotEmpty => warn!("{op}({uri}): Directory not empty"),
        FsError::BaseNotDirectory => warn!("{op}({uri}): Not a directory"),
        FsError::UnregisteredScheme => warn!("{op}({uri}): No such protocol"),
        _ => {}
    }

    error
}
