//! A virtual filesystem that routes `scheme://path` references to pluggable
//! storage backends and synthesizes positional, mutable file-handle semantics
//! (seek, truncate, partial overwrite, append, exclusive create, advisory
//! locks) on top of their flat whole-object read/write model.

mod adapter;
mod buffer;
mod handle;
mod host_backend;
mod lock;
mod mem_backend;
mod metadata;
pub mod ops;
mod readdir;
mod registry;
mod uri;

pub use adapter::{MetadataOp, StreamFs};
pub use buffer::{HandleBuf, LocalBuffer};
pub use handle::FileHandle;
pub use host_backend::HostBackend;
pub use lock::{LockMode, LockRegistry, LockToken};
pub use mem_backend::MemBackend;
pub use metadata::{
    EntryInfo, EntryKind, MountConfig, ObjectInfo, PermissionTable, StatRecord, Visibility,
};
pub use readdir::ReadDir;
pub use registry::BackendRegistry;
pub use uri::VfsUri;

use std::fmt;
use std::io::{self, Read, Seek, Write};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// The capability set a storage backend exposes to the adapter.
///
/// Backends speak a flat whole-object model: an object is read back as one
/// stream and written as one stream, and there are no partial writes. The
/// positional file semantics callers expect are synthesized on top of this
/// contract by [`FileHandle`].
///
/// Paths handed to a backend are already normalized, relative to the
/// backend's root, and never carry a scheme prefix.
pub trait StorageBackend: fmt::Debug + Send + Sync {
    /// Whether an object or directory exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Open the object at `path` for reading as a single stream.
    ///
    /// A backend may hand out a stream that is itself writable (for example
    /// an independent in-memory copy); it signals that through
    /// [`ObjectStream::is_writable`] so the handle can skip its defensive
    /// copy.
    fn read_stream(&self, path: &str) -> Result<Box<dyn ObjectStream>>;

    /// Replace the object at `path` with the full contents of `src`,
    /// creating it (and any intermediate directories) if needed.
    fn write_stream(&self, path: &str, src: &mut dyn Read) -> Result<()>;

    /// Delete the object at `path`. Directories are rejected.
    fn delete(&self, path: &str) -> Result<()>;

    /// Move `from` to `to`. Fails with `AlreadyExists` if the destination is
    /// taken, unless [`Self::rename_replaces`] reports otherwise.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Whether `rename` atomically replaces an existing destination file.
    /// When `false`, the adapter deletes the destination itself before
    /// renaming.
    fn rename_replaces(&self) -> bool {
        false
    }

    /// Create the directory at `path`, including intermediate directories.
    fn create_dir(&self, path: &str) -> Result<()>;

    /// Remove the directory at `path` and its contents. Removing the
    /// backend's root is a `RootViolation`.
    fn remove_dir(&self, path: &str) -> Result<()>;

    /// List the direct children of the directory at `path`, in whatever
    /// order the backend defines. A missing directory lists as empty.
    fn list(&self, path: &str) -> Result<Vec<EntryInfo>>;

    /// Metadata for the object or directory at `path`. Fields the backend
    /// cannot supply are `None`; the stat translation fills the gaps.
    fn metadata(&self, path: &str) -> Result<ObjectInfo>;

    /// Change the visibility of `path`. Backends without a visibility
    /// concept report `Unsupported`.
    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let _ = (path, visibility);
        Err(FsError::Unsupported)
    }
}

/// A byte stream a backend handed out for one object.
pub trait ObjectStream: fmt::Debug + Read + Write + Seek + Send {
    /// Current size of the stream's content in bytes.
    fn size(&self) -> u64;

    /// Resize the content to `new_size`; extending zero-fills. The cursor
    /// does not move.
    fn set_len(&mut self, new_size: u64) -> Result<()>;

    /// Whether writes through this stream land in a resource owned by the
    /// handle alone. Streams reporting `false` are copied in full before the
    /// first mutation.
    fn is_writable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct OpenOptionsConfig {
    read: bool,
    write: bool,
    create_new: bool,
    create: bool,
    append: bool,
    truncate: bool,
}

impl OpenOptionsConfig {
    pub const fn read(&self) -> bool {
        self.read
    }

    pub const fn write(&self) -> bool {
        self.write
    }

    pub const fn create_new(&self) -> bool {
        self.create_new
    }

    pub const fn create(&self) -> bool {
        self.create
    }

    pub const fn append(&self) -> bool {
        self.append
    }

    pub const fn truncate(&self) -> bool {
        self.truncate
    }
}

pub struct OpenOptions<'a> {
    fs: &'a StreamFs,
    conf: OpenOptionsConfig,
}

impl<'a> OpenOptions<'a> {
    pub(crate) fn new(fs: &'a StreamFs) -> Self {
        Self {
            fs,
            conf: OpenOptionsConfig {
                read: false,
                write: false,
                create_new: false,
                create: false,
                append: false,
                truncate: false,
            },
        }
    }

    pub fn read(&mut self, read: bool) -> &mut Self {
        self.conf.read = read;
        self
    }

    pub fn write(&mut self, write: bool) -> &mut Self {
        self.conf.write = write;
        self
    }

    pub fn append(&mut self, append: bool) -> &mut Self {
        self.conf.append = append;
        self
    }

    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.conf.truncate = truncate;
        self
    }

    pub fn create(&mut self, create: bool) -> &mut Self {
        self.conf.create = create;
        self
    }

    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.conf.create_new = create_new;
        self
    }

    pub fn open(&mut self, uri: &str) -> Result<FileHandle> {
        self.fs.open_with(uri, &self.conf)
    }
}

/// Error type for external users
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    /// No backend is bound for the reference's scheme
    #[error("no backend registered for scheme")]
    UnregisteredScheme,
    /// The requested file or directory could not be found
    #[error("entity not found")]
    EntityNotFound,
    /// File exists
    #[error("file exists")]
    AlreadyExists,
    /// The path given as a base was not a directory so the operation was not possible
    #[error("not a directory")]
    BaseNotDirectory,
    /// Expected a file but found not a file
    #[error("not a file")]
    NotAFile,
    /// The directory still has entries in it
    #[error("directory not empty")]
    DirectoryNotEmpty,
    /// Attempt to remove the root of a backend's namespace
    #[error("cannot remove the root directory")]
    RootViolation,
    /// Caller was not allowed to perform this operation
    #[error("permission denied")]
    PermissionDenied,
    /// The backend lacks this capability
    #[error("operation not supported by the backend")]
    Unsupported,
    /// The provided data is invalid
    #[error("invalid input")]
    InvalidInput,
    /// Invalid internal data, if the argument data is invalid, use `InvalidInput`
    #[error("invalid internal data")]
    InvalidData,
    /// A shared state lock was poisoned
    #[error("lock poisoned")]
    Lock,
    /// Something failed when doing IO. These errors can generally not be handled.
    /// It may work if tried again.
    #[error("io error")]
    IOError,
    /// Some other unhandled error. If you see this, it's probably a bug.
    #[error("unknown error found")]
    UnknownError,
}

impl From<io::Error> for FsError {
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            io::ErrorKind::InvalidData => FsError::InvalidData,
            io::ErrorKind::InvalidInput => FsError::InvalidInput,
            io::ErrorKind::NotFound => FsError::EntityNotFound,
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            io::ErrorKind::Unsupported => FsError::Unsupported,
            _ => FsError::IOError,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(fs_error: FsError) -> Self {
        let kind = match fs_error {
            FsError::AlreadyExists => io::ErrorKind::AlreadyExists,
            FsError::EntityNotFound => io::ErrorKind::NotFound,
            FsError::InvalidData => io::ErrorKind::InvalidData,
            FsError::InvalidInput => io::ErrorKind::InvalidInput,
            FsError::PermissionDenied => io::ErrorKind::PermissionDenied,
            FsError::Unsupported => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, fs_error)
    }
}
