//! Backend metadata and its translation into the fixed-shape stat record.

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;

/// Backend-level visibility of an object, the only permission concept most
/// object stores have.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_file(self) -> bool {
        self == Self::File
    }

    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }
}

/// What a backend knows about one object. Every field except the kind is
/// optional; the stat translation fills the gaps with deterministic defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: EntryKind,
    /// Size in bytes, if the backend tracks it.
    pub size: Option<u64>,
    /// Last modification time in seconds since the epoch.
    pub modified: Option<u64>,
    /// Creation time in seconds since the epoch.
    pub created: Option<u64>,
    pub visibility: Option<Visibility>,
}

impl ObjectInfo {
    pub fn file(size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            size: Some(size),
            modified: None,
            created: None,
            visibility: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            size: None,
            modified: None,
            created: None,
            visibility: None,
        }
    }

    pub fn with_modified(mut self, modified: u64) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// One entry of a backend directory listing: the backend-relative path plus
/// whatever metadata came along with it.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub path: String,
    pub info: ObjectInfo,
}

/// Permission bits assigned per entry kind and visibility.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct PermissionTable {
    pub file_public: u32,
    pub file_private: u32,
    pub dir_public: u32,
    pub dir_private: u32,
}

impl Default for PermissionTable {
    fn default() -> Self {
        Self {
            file_public: 0o644,
            file_private: 0o600,
            dir_public: 0o755,
            dir_private: 0o700,
        }
    }
}

impl PermissionTable {
    pub fn bits(&self, kind: EntryKind, visibility: Visibility) -> u32 {
        match (kind, visibility) {
            (EntryKind::File, Visibility::Public) => self.file_public,
            (EntryKind::File, Visibility::Private) => self.file_private,
            (EntryKind::Directory, Visibility::Public) => self.dir_public,
            (EntryKind::Directory, Visibility::Private) => self.dir_private,
        }
    }
}

/// Per-mount configuration supplied at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct MountConfig {
    pub permissions: PermissionTable,
    /// Mode bits that make a mode count as public when mapping native
    /// permission bits back onto a visibility.
    pub public_mask: u32,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            permissions: PermissionTable::default(),
            public_mask: 0o044,
        }
    }
}

impl MountConfig {
    pub fn visibility_for_mode(&self, mode: u32) -> Visibility {
        if mode & self.public_mask != 0 {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// The fixed-shape stat record consumers expect. Fields the backend cannot
/// supply are filled with deterministic defaults: sizes and timestamps with
/// 0, identity fields with 0, the inode is always 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StatRecord {
    pub kind: EntryKind,
    /// Type bits combined with permission bits from the mount's table.
    pub mode: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub inode: u64,
}

impl StatRecord {
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// The record reported for a handle whose object does not exist in the
    /// backend yet: a public regular file of size 0.
    pub(crate) fn synthetic_file(config: &MountConfig) -> Self {
        Self {
            kind: EntryKind::File,
            mode: S_IFREG | config.permissions.bits(EntryKind::File, Visibility::Public),
            size: 0,
            uid: 0,
            gid: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            inode: 0,
        }
    }
}

/// Maps partial backend metadata into the full stat shape.
///
/// Missing visibility counts as public. All timestamp fields default to 0
/// when the backend has nothing better; access time mirrors modification
/// time, creation time falls back to modification time.
pub(crate) fn translate(info: &ObjectInfo, config: &MountConfig) -> StatRecord {
    let visibility = info.visibility.unwrap_or(Visibility::Public);
    let type_bits = match info.kind {
        EntryKind::File => S_IFREG,
        EntryKind::Directory => S_IFDIR,
    };
    let mtime = info.modified.unwrap_or(0);

    StatRecord {
        kind: info.kind,
        mode: type_bits | config.permissions.bits(info.kind, visibility),
        size: info.size.unwrap_or(0),
        uid: 0,
        gid: 0,
        atime: mtime,
        mtime,
        ctime: info.created.unwrap_or(mtime),
        inode: 0,
    }
}
