//! Scratch Storage Abstraction
//!
//! Local staging area for stream data before upload. Each stream gets one
//! anonymous scratch file, written through a `std::io::Write` handle while
//! the batch is open and read back asynchronously at commit.
//!
//! ## Implementations
//!
//! - `LocalScratchStore`: temp files on the local filesystem
//! - `InMemoryScratchStore`: for unit tests, with capacity limits and
//!   failure switches

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufWriter, Cursor, Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Where a scratch file lives, for re-reading after finalize
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScratchLocation(PathBuf);

impl ScratchLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ScratchLocation(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for ScratchLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Trait for scratch storage backends
pub trait ScratchStore: Send + Sync + 'static {
    type Writer: Write + Send + 'static;
    type Reader: AsyncRead + Send + Unpin + 'static;

    /// Allocate a new anonymous scratch file for writing.
    fn create_temporary(&self) -> IoResult<(Self::Writer, ScratchLocation)>;
    /// Reopen a finalized scratch file for reading.
    fn open_read(&self, location: &ScratchLocation) -> IoResult<Self::Reader>;
    /// Size of a scratch file in bytes.
    fn stat(&self, location: &ScratchLocation) -> IoResult<u64>;
    /// Delete a scratch file. Removing a missing file is not an error.
    fn remove(&self, location: &ScratchLocation) -> IoResult<()>;
}

// ============================================================================
// LocalScratchStore - temp files on disk
// ============================================================================

/// Scratch files created with `tempfile` in a directory of our choosing
#[derive(Debug, Clone)]
pub struct LocalScratchStore {
    dir: PathBuf,
    prefix: String,
}

impl LocalScratchStore {
    pub fn new(dir: PathBuf, prefix: impl Into<String>) -> Self {
        LocalScratchStore {
            dir,
            prefix: prefix.into(),
        }
    }

    /// Scratch files in the OS temp dir
    pub fn in_temp_dir(prefix: impl Into<String>) -> Self {
        Self::new(std::env::temp_dir(), prefix)
    }
}

impl ScratchStore for LocalScratchStore {
    type Writer = BufWriter<std::fs::File>;
    type Reader = tokio::fs::File;

    fn create_temporary(&self) -> IoResult<(Self::Writer, ScratchLocation)> {
        let file = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempfile_in(&self.dir)?;
        // Removal is ours to manage: after upload, on abort, or on drop
        let (file, path) = file.keep().map_err(|e| e.error)?;
        Ok((BufWriter::new(file), ScratchLocation(path)))
    }

    fn open_read(&self, location: &ScratchLocation) -> IoResult<Self::Reader> {
        let file = std::fs::File::open(location.path())?;
        Ok(tokio::fs::File::from_std(file))
    }

    fn stat(&self, location: &ScratchLocation) -> IoResult<u64> {
        Ok(std::fs::metadata(location.path())?.len())
    }

    fn remove(&self, location: &ScratchLocation) -> IoResult<()> {
        match std::fs::remove_file(location.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// InMemoryScratchStore - For unit tests
// ============================================================================

#[derive(Debug, Default)]
struct InMemoryScratchState {
    files: HashMap<ScratchLocation, Vec<u8>>,
    next_id: u64,
    used_bytes: usize,
    capacity_bytes: Option<usize>,
    fail_allocations: bool,
    fail_reads: bool,
}

/// In-memory scratch store for unit tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryScratchStore {
    state: Arc<Mutex<InMemoryScratchState>>,
}

impl InMemoryScratchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that fails writes once `bytes` have been stored in total
    pub fn with_capacity(bytes: usize) -> Self {
        let store = Self::new();
        store.state.lock().capacity_bytes = Some(bytes);
        store
    }

    /// Make every subsequent allocation fail
    pub fn set_fail_allocations(&self, fail: bool) {
        self.state.lock().fail_allocations = fail;
    }

    /// Make every subsequent open/stat fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Number of live scratch files
    pub fn len(&self) -> usize {
        self.state.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().files.is_empty()
    }

    /// Raw bytes of a scratch file (for testing)
    pub fn contents(&self, location: &ScratchLocation) -> Option<Vec<u8>> {
        self.state.lock().files.get(location).cloned()
    }
}

/// In-memory scratch file writer
pub struct InMemoryScratchWriter {
    location: ScratchLocation,
    state: Arc<Mutex<InMemoryScratchState>>,
}

impl Write for InMemoryScratchWriter {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let mut state = self.state.lock();
        if let Some(capacity) = state.capacity_bytes {
            if state.used_bytes + buf.len() > capacity {
                return Err(IoError::new(ErrorKind::Other, "No space left on device"));
            }
        }
        let file = state
            .files
            .get_mut(&self.location)
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("scratch file {} removed", self.location)))?;
        file.extend_from_slice(buf);
        state.used_bytes += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl ScratchStore for InMemoryScratchStore {
    type Writer = InMemoryScratchWriter;
    type Reader = Cursor<Vec<u8>>;

    fn create_temporary(&self) -> IoResult<(Self::Writer, ScratchLocation)> {
        let mut state = self.state.lock();
        if state.fail_allocations {
            return Err(IoError::new(ErrorKind::PermissionDenied, "simulated allocation failure"));
        }
        state.next_id += 1;
        let location = ScratchLocation::new(format!("mem/scratch-{:06}", state.next_id));
        state.files.insert(location.clone(), Vec::new());

        Ok((
            InMemoryScratchWriter {
                location: location.clone(),
                state: Arc::clone(&self.state),
            },
            location,
        ))
    }

    fn open_read(&self, location: &ScratchLocation) -> IoResult<Self::Reader> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(IoError::new(ErrorKind::Other, "simulated read failure"));
        }
        state
            .files
            .get(location)
            .map(|data| Cursor::new(data.clone()))
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("scratch file {} not found", location)))
    }

    fn stat(&self, location: &ScratchLocation) -> IoResult<u64> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(IoError::new(ErrorKind::Other, "simulated stat failure"));
        }
        state
            .files
            .get(location)
            .map(|data| data.len() as u64)
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("scratch file {} not found", location)))
    }

    fn remove(&self, location: &ScratchLocation) -> IoResult<()> {
        let mut state = self.state.lock();
        if let Some(data) = state.files.remove(location) {
            state.used_bytes -= data.len();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_local_create_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalScratchStore::new(dir.path().to_path_buf(), "scratch");

        let (mut writer, location) = store.create_temporary().unwrap();
        assert!(location.path().starts_with(dir.path()));
        let name = location.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("scratch"));

        writer.write_all(b"hello").unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert_eq!(store.stat(&location).unwrap(), 5);
        let mut reader = store.open_read(&location).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");

        store.remove(&location).unwrap();
        assert!(!location.path().exists());
        // Second remove is a no-op
        store.remove(&location).unwrap();
    }

    #[test]
    fn test_local_allocation_in_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalScratchStore::new(dir.path().join("does/not/exist"), "scratch");
        assert!(store.create_temporary().is_err());
    }

    #[test]
    fn test_local_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalScratchStore::new(dir.path().to_path_buf(), "scratch");
        let (_, a) = store.create_temporary().unwrap();
        let (_, b) = store.create_temporary().unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_inmemory_roundtrip() {
        let store = InMemoryScratchStore::new();
        let (mut writer, location) = store.create_temporary().unwrap();
        writer.write_all(b"abc").unwrap();

        assert_eq!(store.stat(&location).unwrap(), 3);
        let mut buf = Vec::new();
        store.open_read(&location).unwrap().read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"abc");

        store.remove(&location).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_inmemory_capacity_exhaustion() {
        let store = InMemoryScratchStore::with_capacity(4);
        let (mut writer, _) = store.create_temporary().unwrap();
        writer.write_all(b"1234").unwrap();
        let err = writer.write_all(b"5").unwrap_err();
        assert!(err.to_string().contains("No space left"));
    }

    #[test]
    fn test_inmemory_failure_switches() {
        let store = InMemoryScratchStore::new();
        let (_, location) = store.create_temporary().unwrap();

        store.set_fail_reads(true);
        assert!(store.stat(&location).is_err());
        assert!(store.open_read(&location).is_err());

        store.set_fail_allocations(true);
        assert!(store.create_temporary().is_err());
        assert_eq!(store.len(), 1);
    }
}
