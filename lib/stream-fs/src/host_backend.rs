//! The local-disk backend, rooted at a host directory.

use crate::metadata::{EntryInfo, EntryKind, ObjectInfo, PermissionTable, Visibility};
use crate::{FsError, ObjectStream, Result, StorageBackend};
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::trace;

/// A backend over a directory of the host filesystem.
///
/// Read streams are plain read-only files, so mutating handles copy before
/// their first write. Visibility maps onto unix permission bits where the
/// platform has them and reports `Unsupported` elsewhere.
#[derive(Debug, Clone)]
pub struct HostBackend {
    root: PathBuf,
    permissions: PermissionTable,
}

impl HostBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            permissions: PermissionTable::default(),
        }
    }

    pub fn with_permissions(mut self, permissions: PermissionTable) -> Self {
        self.permissions = permissions;
        self
    }

    fn full_path(&self, target: &str) -> PathBuf {
        if target.is_empty() {
            self.root.clone()
        } else {
            self.root.join(target)
        }
    }

    fn relative(&self, path: &Path, target: &str) -> String {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if target.is_empty() {
            name
        } else {
            format!("{target}/{name}")
        }
    }
}

/// A host file wrapped as an object stream.
struct HostStream {
    file: fs::File,
    writable: bool,
}

impl std::fmt::Debug for HostStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostStream")
            .field("writable", &self.writable)
            .finish()
    }
}

impl Read for HostStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for HostStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for HostStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ObjectStream for HostStream {
    fn size(&self) -> u64 {
        self.file.metadata().map(|meta| meta.len()).unwrap_or(0)
    }

    fn set_len(&mut self, new_size: u64) -> Result<()> {
        self.file.set_len(new_size).map_err(Into::into)
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

fn info_for(metadata: &fs::Metadata) -> ObjectInfo {
    let kind = if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    let timestamp = |time: io::Result<std::time::SystemTime>| {
        time.ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs())
    };

    ObjectInfo {
        kind,
        size: kind.is_file().then(|| metadata.len()),
        modified: timestamp(metadata.modified()),
        created: timestamp(metadata.created()),
        visibility: visibility_of(metadata),
    }
}

#[cfg(unix)]
fn visibility_of(metadata: &fs::Metadata) -> Option<Visibility> {
    use std::os::unix::fs::PermissionsExt;

    if metadata.permissions().mode() & 0o044 != 0 {
        Some(Visibility::Public)
    } else {
        Some(Visibility::Private)
    }
}

#[cfg(not(unix))]
fn visibility_of(_metadata: &fs::Metadata) -> Option<Visibility> {
    None
}

impl StorageBackend for HostBackend {
    fn exists(&self, path: &str) -> bool {
        self.full_path(path).exists()
    }

    fn read_stream(&self, path: &str) -> Result<Box<dyn ObjectStream>> {
        let file = fs::File::open(self.full_path(path))?;

        if file.metadata()?.is_dir() {
            return Err(FsError::NotAFile);
        }

        Ok(Box::new(HostStream {
            file,
            writable: false,
        }))
    }

    fn write_stream(&self, path: &str, src: &mut dyn Read) -> Result<()> {
        let full = self.full_path(path);

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&full)?;
        let bytes = io::copy(src, &mut file)?;
        trace!(path, bytes, "stored object");

        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);

        if full.is_dir() {
            return Err(FsError::NotAFile);
        }

        fs::remove_file(full).map_err(Into::into)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.full_path(from);

        if !source.exists() {
            return Err(FsError::EntityNotFound);
        }

        let destination = self.full_path(to);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::rename(source, destination).map_err(Into::into)
    }

    /// `std::fs::rename` replaces an existing destination file atomically on
    /// unix; elsewhere the adapter has to delete first.
    fn rename_replaces(&self) -> bool {
        cfg!(unix)
    }

    fn create_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.full_path(path)).map_err(Into::into)
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(FsError::RootViolation);
        }

        let full = self.full_path(path);
        if full.exists() && !full.is_dir() {
            return Err(FsError::BaseNotDirectory);
        }

        fs::remove_dir_all(full).map_err(Into::into)
    }

    fn list(&self, path: &str) -> Result<Vec<EntryInfo>> {
        let read_dir = match fs::read_dir(self.full_path(path)) {
            Ok(read_dir) => read_dir,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            entries.push(EntryInfo {
                path: self.relative(&entry.path(), path),
                info: info_for(&entry.metadata()?),
            });
        }

        // read_dir order is platform-defined; make the listing stable.
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(entries)
    }

    fn metadata(&self, path: &str) -> Result<ObjectInfo> {
        let metadata = fs::metadata(self.full_path(path))?;

        Ok(info_for(&metadata))
    }

    #[cfg(unix)]
    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let full = self.full_path(path);
        let kind = if fs::metadata(&full)?.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let mode = self.permissions.bits(kind, visibility);

        fs::set_permissions(full, fs::Permissions::from_mode(mode)).map_err(Into::into)
    }

    #[cfg(not(unix))]
    fn set_visibility(&self, _path: &str, _visibility: Visibility) -> Result<()> {
        Err(FsError::Unsupported)
    }
}
