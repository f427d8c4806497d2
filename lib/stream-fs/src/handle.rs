//! Open file handles: positional, mutable I/O synthesized over a backend's
//! whole-object contract.

use crate::buffer::HandleBuf;
use crate::metadata::{translate, StatRecord};
use crate::registry::Mount;
use crate::uri::VfsUri;
use crate::{FsError, ObjectStream, OpenOptionsConfig, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{debug, warn};

/// One active file-like session against a logical reference.
///
/// The handle exclusively owns its buffer; two handles on the same reference
/// are independent materializations, and the last one to flush wins. Reads
/// and writes move a cursor over the buffer; flush and close commit the full
/// buffer back to the backend as one whole-object write.
#[derive(Debug)]
pub struct FileHandle {
    uri: VfsUri,
    mount: Mount,
    buf: HandleBuf,
    read_only: bool,
    write_only: bool,
    append_only: bool,
    needs_flush: bool,
}

impl FileHandle {
    /// Materializes a handle for `uri` according to the open intent.
    pub(crate) fn open(mount: Mount, uri: VfsUri, conf: &OpenOptionsConfig) -> Result<Self> {
        let mut handle = Self {
            uri,
            mount,
            buf: HandleBuf::empty(),
            read_only: false,
            write_only: false,
            append_only: false,
            needs_flush: false,
        };

        if conf.create_new() {
            handle.materialize_create_new(conf)?;
        } else if conf.truncate() {
            handle.materialize_truncate(conf);
        } else if conf.append() {
            handle.materialize_write_or_create(conf)?;
            handle.append_only = true;
            handle.buf.stream().seek(SeekFrom::End(0))?;
        } else if conf.create() {
            handle.materialize_write_or_create(conf)?;
        } else if conf.read() {
            handle.materialize_read(conf)?;
        } else {
            return Err(FsError::InvalidInput);
        }

        Ok(handle)
    }

    /// Read intent: the object must exist. Without write capability the
    /// handle stays read-only; with it, the backend stream is wrapped with
    /// its provenance so the first mutation copies unless the stream is
    /// already exclusively ours.
    fn materialize_read(&mut self, conf: &OpenOptionsConfig) -> Result<()> {
        let stream = self.mount.backend.read_stream(self.uri.target())?;

        if conf.write() {
            self.buf = HandleBuf::from_backend(stream);
        } else {
            self.read_only = true;
            self.buf = HandleBuf::Borrowed(stream);
        }

        Ok(())
    }

    /// Write-truncate intent: any existing content is discarded and the
    /// empty buffer is committed even if nothing is ever written.
    fn materialize_truncate(&mut self, conf: &OpenOptionsConfig) {
        self.write_only = !conf.read();
        self.buf = HandleBuf::empty();
        self.needs_flush = true;
    }

    /// Create-exclusive intent: fails if the object exists at open time.
    fn materialize_create_new(&mut self, conf: &OpenOptionsConfig) -> Result<()> {
        if self.mount.backend.exists(self.uri.target()) {
            return Err(FsError::AlreadyExists);
        }

        self.write_only = !conf.read();
        self.buf = HandleBuf::empty();
        self.needs_flush = true;

        Ok(())
    }

    /// Write-or-create intent: materialize existing content, or start from
    /// an empty dirty buffer.
    fn materialize_write_or_create(&mut self, conf: &OpenOptionsConfig) -> Result<()> {
        self.write_only = !conf.read();

        match self.mount.backend.read_stream(self.uri.target()) {
            Ok(stream) => {
                self.buf = HandleBuf::from_backend(stream);
            }
            Err(FsError::EntityNotFound) => {
                self.buf = HandleBuf::empty();
                self.needs_flush = true;
            }
            Err(other) => return Err(other),
        }

        Ok(())
    }

    pub fn uri(&self) -> &VfsUri {
        &self.uri
    }

    /// Current cursor position. Append-only handles report 0, mirroring
    /// native append-stream behavior.
    pub fn tell(&mut self) -> Result<u64> {
        if self.append_only {
            return Ok(0);
        }

        Ok(self.buf.stream().stream_position()?)
    }

    /// Whether the cursor sits at or past the end of the buffer.
    pub fn eof(&mut self) -> Result<bool> {
        let size = self.buf.stream_ref().size();
        Ok(self.buf.stream().stream_position()? >= size)
    }

    /// Current size of the handle's buffer.
    pub fn size(&self) -> u64 {
        self.buf.stream_ref().size()
    }

    /// Resizes the buffer in place. Read-only handles are refused.
    pub fn truncate(&mut self, new_size: u64) -> Result<()> {
        if self.read_only {
            return Err(FsError::PermissionDenied);
        }

        self.needs_flush = true;
        self.buf.make_owned()?;
        self.buf.stream().set_len(new_size)
    }

    /// Commits the buffer to the backend if any write happened since open or
    /// since the last flush; otherwise succeeds without touching the
    /// backend. The cursor is restored afterwards either way.
    pub fn flush_to_backend(&mut self) -> Result<()> {
        if !self.needs_flush {
            return Ok(());
        }

        let stream = self.buf.stream();
        let pos = stream.stream_position()?;
        stream.seek(SeekFrom::Start(0))?;

        debug!(uri = %self.uri.canonical(), "committing handle buffer");
        let committed = self
            .mount
            .backend
            .write_stream(self.uri.target(), &mut ByRef(stream));

        self.buf.stream().seek(SeekFrom::Start(pos))?;
        committed?;
        self.needs_flush = false;

        Ok(())
    }

    /// Commits pending writes and consumes the handle, releasing its buffer.
    pub fn close(mut self) -> Result<()> {
        self.flush_to_backend()
    }

    /// Stat for the open handle itself: quiet stat of the reference, with
    /// the size taken from the buffer (it may have been written or truncated
    /// since open) and a default public file mode for objects the backend
    /// does not know about yet.
    pub fn stat(&self) -> Result<StatRecord> {
        let mut record = match self.mount.backend.metadata(self.uri.target()) {
            Ok(info) => translate(&info, &self.mount.config),
            Err(FsError::EntityNotFound) => StatRecord::synthetic_file(&self.mount.config),
            Err(other) => return Err(other),
        };

        record.size = self.buf.stream_ref().size();

        Ok(record)
    }
}

impl Read for FileHandle {
    /// Write-only handles read as empty rather than failing.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.write_only {
            return Ok(0);
        }

        self.buf.stream().read(buf)
    }
}

impl Write for FileHandle {
    /// Read-only handles accept zero bytes rather than failing. Append-only
    /// handles land every write at end-of-content, wherever the cursor was.
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.read_only {
            return Ok(0);
        }

        self.needs_flush = true;
        self.buf.make_owned()?;

        if self.append_only {
            self.buf.stream().seek(SeekFrom::End(0))?;
        }

        self.buf.stream().write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_to_backend().map_err(Into::into)
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buf.stream().seek(pos)
    }
}

impl Drop for FileHandle {
    /// Scope exit commits like an explicit close; a failed commit can only
    /// be reported here.
    fn drop(&mut self) {
        if let Err(error) = self.flush_to_backend() {
            warn!(uri = %self.uri.canonical(), %error, "discarding unflushed handle buffer");
        }
    }
}

/// Lets the borrowed buffer stream travel as a plain `&mut dyn Read`.
struct ByRef<'a>(&'a mut dyn ObjectStream);

impl Read for ByRef<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EntryInfo, ObjectInfo, Visibility};
    use crate::{
        BackendRegistry, MemBackend, MountConfig, ReadDir, StorageBackend, StreamFs,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Wraps a [`MemBackend`], counting commits and handing out read streams
    /// that refuse in-place mutation, the way a remote backend's streams do.
    #[derive(Debug)]
    struct RemoteLike {
        store: MemBackend,
        commits: AtomicUsize,
    }

    impl RemoteLike {
        fn new(store: MemBackend) -> Self {
            Self {
                store,
                commits: AtomicUsize::new(0),
            }
        }

        fn commits(&self) -> usize {
            self.commits.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug)]
    struct FrozenStream(Box<dyn ObjectStream>);

    impl Read for FrozenStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Write for FrozenStream {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            panic!("mutation reached the backend's stream");
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FrozenStream {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.0.seek(pos)
        }
    }

    impl ObjectStream for FrozenStream {
        fn size(&self) -> u64 {
            self.0.size()
        }

        fn set_len(&mut self, _new_size: u64) -> crate::Result<()> {
            panic!("mutation reached the backend's stream");
        }
    }

    impl StorageBackend for RemoteLike {
        fn exists(&self, path: &str) -> bool {
            self.store.exists(path)
        }

        fn read_stream(&self, path: &str) -> crate::Result<Box<dyn ObjectStream>> {
            Ok(Box::new(FrozenStream(self.store.read_stream(path)?)))
        }

        fn write_stream(&self, path: &str, src: &mut dyn Read) -> crate::Result<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.store.write_stream(path, src)
        }

        fn delete(&self, path: &str) -> crate::Result<()> {
            self.store.delete(path)
        }

        fn rename(&self, from: &str, to: &str) -> crate::Result<()> {
            self.store.rename(from, to)
        }

        fn create_dir(&self, path: &str) -> crate::Result<()> {
            self.store.create_dir(path)
        }

        fn remove_dir(&self, path: &str) -> crate::Result<()> {
            self.store.remove_dir(path)
        }

        fn list(&self, path: &str) -> crate::Result<Vec<EntryInfo>> {
            self.store.list(path)
        }

        fn metadata(&self, path: &str) -> crate::Result<ObjectInfo> {
            self.store.metadata(path)
        }

        fn set_visibility(&self, path: &str, visibility: Visibility) -> crate::Result<()> {
            self.store.set_visibility(path, visibility)
        }
    }

    fn fixture() -> (StreamFs, MemBackend, Arc<RemoteLike>) {
        let store = MemBackend::new();
        let remote = Arc::new(RemoteLike::new(store.clone()));
        let registry = Arc::new(BackendRegistry::new());
        registry.register("test", remote.clone(), MountConfig::default());

        (StreamFs::new(registry), store, remote)
    }

    fn read_all(handle: &mut FileHandle) -> Vec<u8> {
        let mut data = Vec::new();
        handle.read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn test_read_only_handles_accept_no_bytes() {
        let (fs, store, _remote) = fixture();
        store.insert("a.txt", *b"hello");

        let mut handle = fs.new_open_options().read(true).open("test://a.txt").unwrap();

        assert_eq!(handle.write(b"nope").unwrap(), 0, "zero bytes accepted");
        assert_eq!(
            handle.truncate(0),
            Err(FsError::PermissionDenied),
            "truncation is refused",
        );
        assert_eq!(read_all(&mut handle), b"hello", "content never changed");

        handle.close().unwrap();
        assert_eq!(store.get("a.txt").as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_write_only_handles_read_as_empty() {
        let (fs, store, _remote) = fixture();
        store.insert("a.txt", *b"hello");

        let mut handle = fs
            .new_open_options()
            .write(true)
            .create(true)
            .open("test://a.txt")
            .unwrap();

        assert_eq!(read_all(&mut handle), b"", "reads come back empty");
    }

    #[test]
    fn test_append_lands_at_end_despite_seeks() {
        let (fs, store, _remote) = fixture();
        store.insert("log.txt", *b"one");

        let mut handle = fs
            .new_open_options()
            .write(true)
            .append(true)
            .open("test://log.txt")
            .unwrap();

        handle.seek(SeekFrom::Start(0)).unwrap();
        handle.write_all(b"-two").unwrap();
        handle.seek(SeekFrom::Start(1)).unwrap();
        handle.write_all(b"-three").unwrap();

        assert_eq!(handle.tell(), Ok(0), "append-only handles report 0");

        handle.close().unwrap();
        assert_eq!(store.get("log.txt").as_deref(), Some(&b"one-two-three"[..]));
    }

    #[test]
    fn test_copy_on_write_leaves_the_original_stream_alone() {
        let (fs, store, _remote) = fixture();
        store.insert("a.txt", *b"hello");

        let mut handle = fs
            .new_open_options()
            .read(true)
            .write(true)
            .open("test://a.txt")
            .unwrap();
        assert!(handle.buf.is_borrowed(), "remote stream is not writable");

        handle.write_all(b"HELLO").unwrap();
        assert!(!handle.buf.is_borrowed(), "first write took the copy");

        assert_eq!(
            store.get("a.txt").as_deref(),
            Some(&b"hello"[..]),
            "backend object is untouched before flush",
        );

        handle.close().unwrap();
        assert_eq!(store.get("a.txt").as_deref(), Some(&b"HELLO"[..]));
    }

    #[test]
    fn test_truncate_triggers_the_copy_too() {
        let (fs, store, _remote) = fixture();
        store.insert("a.txt", *b"hello");

        let mut handle = fs
            .new_open_options()
            .read(true)
            .write(true)
            .open("test://a.txt")
            .unwrap();

        handle.truncate(2).unwrap();
        assert_eq!(handle.size(), 2);
        assert_eq!(
            store.get("a.txt").as_deref(),
            Some(&b"hello"[..]),
            "backend object is untouched before flush",
        );

        handle.close().unwrap();
        assert_eq!(store.get("a.txt").as_deref(), Some(&b"he"[..]));
    }

    #[test]
    fn test_flush_is_idempotent_and_position_preserving() {
        let (fs, _store, remote) = fixture();

        let mut handle = fs
            .new_open_options()
            .read(true)
            .write(true)
            .create(true)
            .open("test://a.txt")
            .unwrap();

        handle.write_all(b"hello world").unwrap();
        handle.seek(SeekFrom::Start(6)).unwrap();

        handle.flush_to_backend().unwrap();
        assert_eq!(remote.commits(), 1);
        assert_eq!(handle.tell(), Ok(6), "flush left the cursor in place");

        handle.flush_to_backend().unwrap();
        handle.flush_to_backend().unwrap();
        assert_eq!(remote.commits(), 1, "clean handles make zero backend calls");

        handle.write_all(b"!").unwrap();
        handle.close().unwrap();
        assert_eq!(remote.commits(), 2, "close commits the new write");
    }

    #[test]
    fn test_open_read_missing_fails() {
        let (fs, _store, _remote) = fixture();

        assert_eq!(
            fs.new_open_options()
                .read(true)
                .open("test://missing.txt")
                .map(|_| ()),
            Err(FsError::EntityNotFound),
        );
    }

    #[test]
    fn test_truncate_mode_commits_an_empty_object_on_close() {
        let (fs, store, _remote) = fixture();
        store.insert("a.txt", *b"hello");

        fs.new_open_options()
            .write(true)
            .truncate(true)
            .open("test://a.txt")
            .unwrap()
            .close()
            .unwrap();

        assert_eq!(
            store.get("a.txt").as_deref(),
            Some(&b""[..]),
            "opening with truncate dirties the handle",
        );
    }

    #[test]
    fn test_create_new_refuses_existing_objects() {
        let (fs, store, _remote) = fixture();

        let mut first = fs
            .new_open_options()
            .write(true)
            .create_new(true)
            .open("test://fresh.txt")
            .unwrap();
        first.write_all(b"first").unwrap();
        first.close().unwrap();

        assert_eq!(
            fs.new_open_options()
                .write(true)
                .create_new(true)
                .open("test://fresh.txt")
                .map(|_| ()),
            Err(FsError::AlreadyExists),
            "second exclusive create fails",
        );
        assert_eq!(
            store.get("fresh.txt").as_deref(),
            Some(&b"first"[..]),
            "the first object is not altered",
        );
    }

    #[test]
    fn test_handle_stat_prefers_the_buffer_size() {
        let (fs, _store, _remote) = fixture();

        let mut handle = fs
            .new_open_options()
            .write(true)
            .create(true)
            .open("test://fresh.txt")
            .unwrap();
        handle.write_all(b"123456").unwrap();

        let stat = handle.stat().expect("stat of an unflushed handle");
        assert_eq!(stat.size, 6, "size comes from the buffer, not the backend");
        assert!(stat.is_file());
        assert_eq!(stat.mode & 0o777, 0o644, "default mode for fresh objects");
    }

    #[test]
    fn test_abandoned_handle_commits_on_drop() {
        let (fs, store, _remote) = fixture();

        {
            let mut handle = fs
                .new_open_options()
                .write(true)
                .create(true)
                .open("test://dropped.txt")
                .unwrap();
            handle.write_all(b"late").unwrap();
        }

        assert_eq!(store.get("dropped.txt").as_deref(), Some(&b"late"[..]));
    }

    #[test]
    fn test_independent_handles_last_writer_wins() {
        let (fs, store, _remote) = fixture();
        store.insert("a.txt", *b"base");

        let mut first = fs
            .new_open_options()
            .read(true)
            .write(true)
            .open("test://a.txt")
            .unwrap();
        let mut second = fs
            .new_open_options()
            .read(true)
            .write(true)
            .open("test://a.txt")
            .unwrap();

        first.write_all(b"1111").unwrap();
        second.write_all(b"2222").unwrap();

        first.close().unwrap();
        second.close().unwrap();

        assert_eq!(store.get("a.txt").as_deref(), Some(&b"2222"[..]));
    }

    #[test]
    fn test_directory_snapshot_ignores_later_backend_changes() {
        let (fs, store, _remote) = fixture();
        store.insert("dir/x", *b"1");
        store.insert("dir/y/z", *b"2");

        let mut readdir: ReadDir = fs.open_dir("test://dir").unwrap();
        store.insert("dir/added-later", *b"3");

        assert_eq!(readdir.next().as_deref(), Some("x"));
        assert_eq!(readdir.next().as_deref(), Some("y"), "nested stays one level");
        assert_eq!(readdir.next(), None, "the later insert is invisible");

        readdir.rewind();
        assert_eq!(readdir.next().as_deref(), Some("x"));
    }
}
