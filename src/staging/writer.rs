//! Staged Writer
//!
//! The public entry point. Callers write bytes to any number of logical
//! keys while the batch is open; `commit` closes the batch and uploads one
//! object per key.
//!
//! ## Lifecycle
//!
//! ```text
//! write(k, b) ──► lock ──► registry.get_or_create(k) ──► sink.append(b)
//!
//! commit() ──► lock ──► accepting = false, drain registry ──► unlock
//!                 │
//!                 └─► for each stream: finalize ─► open ─► stat ─► put ─► remove scratch
//! ```
//!
//! A single mutex guards the accepting flag and the registry. `write` holds
//! it across lookup and append, and `commit` flips the flag and drains the
//! registry under it. Once commit releases the lock no writer can reach a
//! drained stream, so finalization runs without the lock and never races an
//! append.

use crate::staging::config::WriterConfig;
use crate::staging::error::{Result, StagingError};
use crate::staging::object_store::ObjectStore;
use crate::staging::registry::{StreamEntry, StreamRegistry};
use crate::staging::scratch::{LocalScratchStore, ScratchLocation, ScratchStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Error as IoError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a successful commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// Objects uploaded, one per distinct key
    pub objects: usize,
    /// Bytes uploaded (after compression)
    pub bytes: u64,
}

struct WriterState<S: ScratchStore> {
    accepting: bool,
    registry: StreamRegistry<S>,
    last_error: Option<String>,
    /// First failed append. The stream it hit is incomplete, so commit refuses the batch.
    write_failure: Option<(String, IoError)>,
}

/// Streams drained for commit that still own a scratch file. Dropping it,
/// including when the commit future is dropped mid-upload, removes them.
struct PendingUploads<'w, S: ScratchStore> {
    scratch: &'w S,
    entries: Vec<StreamEntry<S::Writer>>,
    in_flight: Option<ScratchLocation>,
}

impl<'w, S: ScratchStore> PendingUploads<'w, S> {
    /// Give up ownership of the remaining scratch files without removing them
    fn leave_behind(mut self) {
        self.in_flight = None;
        self.entries.clear();
    }
}

impl<'w, S: ScratchStore> Drop for PendingUploads<'w, S> {
    fn drop(&mut self) {
        if let Some(location) = self.in_flight.take() {
            remove_scratch(self.scratch, &location);
        }
        for entry in self.entries.drain(..) {
            let (_, sink, location) = entry.into_parts();
            // Close the handle before unlinking
            drop(sink);
            remove_scratch(self.scratch, &location);
        }
    }
}

fn remove_scratch<S: ScratchStore>(scratch: &S, location: &ScratchLocation) {
    if let Err(e) = scratch.remove(location) {
        warn!(location = %location, error = %e, "Failed to remove scratch file");
    }
}

/// Buffers keyed byte streams on scratch storage and commits each as one object.
///
/// Shareable across threads (`&self` everywhere); wrap in an `Arc` to write
/// from several threads at once.
pub struct StagedWriter<S: ScratchStore = LocalScratchStore> {
    store: Arc<dyn ObjectStore>,
    scratch: Arc<S>,
    config: WriterConfig,
    state: Mutex<WriterState<S>>,
}

impl StagedWriter<LocalScratchStore> {
    /// Writer staging to the OS temp dir, gzipping every stream when `compress` is set.
    pub fn new(store: Arc<dyn ObjectStore>, compress: bool) -> Self {
        Self::with_config(store, WriterConfig::gzip(compress))
    }

    /// Writer staging to local scratch files as described by `config`.
    pub fn with_config(store: Arc<dyn ObjectStore>, config: WriterConfig) -> Self {
        let scratch = match &config.scratch_dir {
            Some(dir) => LocalScratchStore::new(dir.clone(), config.scratch_prefix.clone()),
            None => LocalScratchStore::in_temp_dir(config.scratch_prefix.clone()),
        };
        Self::with_scratch(store, Arc::new(scratch), config)
    }
}

impl<S: ScratchStore> StagedWriter<S> {
    /// Writer over an explicit scratch store
    pub fn with_scratch(store: Arc<dyn ObjectStore>, scratch: Arc<S>, config: WriterConfig) -> Self {
        let registry = StreamRegistry::new(Arc::clone(&scratch), config.compression);
        StagedWriter {
            store,
            scratch,
            config,
            state: Mutex::new(WriterState {
                accepting: true,
                registry,
                last_error: None,
                write_failure: None,
            }),
        }
    }

    /// Append `data` to the stream for `key`. No newline or framing is added.
    ///
    /// Returns the number of bytes accepted, or `Closed` once commit has begun.
    pub fn write(&self, key: &str, data: &[u8]) -> Result<usize> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.accepting {
            return Err(StagingError::Closed);
        }

        let entry = match state.registry.get_or_create(key) {
            Ok(entry) => entry,
            Err(e) => {
                state.last_error = Some(format!("{}: {}", key, e));
                return Err(StagingError::ScratchAllocation(e));
            }
        };

        match entry.append(data) {
            Ok(n) => Ok(n),
            Err(source) => {
                state.last_error = Some(format!("{}: {}", key, source));
                let reported = IoError::new(source.kind(), source.to_string());
                if state.write_failure.is_none() {
                    state.write_failure = Some((key.to_string(), source));
                }
                Err(StagingError::ScratchWrite {
                    key: key.to_string(),
                    source: reported,
                })
            }
        }
    }

    /// Same as [`write`](Self::write) on the UTF-8 bytes of `text`.
    pub fn write_str(&self, key: &str, text: &str) -> Result<usize> {
        self.write(key, text.as_bytes())
    }

    /// Close the batch and upload every stream as one object under its key.
    ///
    /// Streams are uploaded one at a time in unspecified order. The first
    /// failure aborts the commit and is returned; objects already uploaded
    /// stay uploaded. If an append failed while the batch was open, nothing
    /// is uploaded and that write failure is returned. Any later call to
    /// `write` or `commit` returns `Closed`.
    pub async fn commit(&self) -> Result<CommitSummary> {
        let (entries, write_failure) = {
            let mut state = self.state.lock();
            if !state.accepting {
                return Err(StagingError::Closed);
            }
            state.accepting = false;
            (state.registry.drain(), state.write_failure.take())
        };
        let mut pending = PendingUploads {
            scratch: &*self.scratch,
            entries,
            in_flight: None,
        };

        if let Some((key, source)) = write_failure {
            let e = StagingError::ScratchWrite { key, source };
            error!(error = %e, streams = pending.entries.len(), "Commit refused, batch has a failed write");
            self.state.lock().last_error = Some(e.to_string());
            self.abandon(pending);
            return Err(e);
        }

        info!(
            streams = pending.entries.len(),
            compression = self.config.compression.name(),
            "Committing batch"
        );

        let mut summary = CommitSummary::default();
        while let Some(entry) = pending.entries.pop() {
            pending.in_flight = Some(entry.location().clone());
            match self.upload_stream(entry).await {
                Ok(bytes) => {
                    pending.in_flight = None;
                    summary.objects += 1;
                    summary.bytes += bytes;
                }
                Err(e) => {
                    error!(
                        error = %e,
                        uploaded = summary.objects,
                        remaining = pending.entries.len(),
                        "Commit aborted"
                    );
                    self.state.lock().last_error = Some(e.to_string());
                    self.abandon(pending);
                    return Err(e);
                }
            }
        }

        info!(objects = summary.objects, bytes = summary.bytes, "Batch committed");
        Ok(summary)
    }

    /// Release the scratch files of an aborted commit, unless configured to keep them
    fn abandon(&self, pending: PendingUploads<'_, S>) {
        if self.config.cleanup_on_abort {
            drop(pending);
        } else {
            pending.leave_behind();
        }
    }

    /// Finalize one stream, upload it, then release its scratch file.
    async fn upload_stream(&self, entry: StreamEntry<S::Writer>) -> Result<u64> {
        let (key, sink, location) = entry.into_parts();

        if let Err(source) = sink.finalize() {
            return Err(StagingError::ScratchWrite { key, source });
        }

        let reader = match self.scratch.open_read(&location) {
            Ok(reader) => reader,
            Err(source) => return Err(StagingError::ScratchRead { key, source }),
        };
        let size = match self.scratch.stat(&location) {
            Ok(size) => size,
            Err(source) => return Err(StagingError::ScratchRead { key, source }),
        };

        if let Err(source) = self
            .store
            .put(&key, Box::new(reader), size, &self.config.content_type)
            .await
        {
            return Err(StagingError::Transfer { key, source });
        }
        debug!(key = %key, bytes = size, "Uploaded stream");

        remove_scratch(&*self.scratch, &location);
        Ok(size)
    }


    /// False once commit has begun
    pub fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }

    /// Number of distinct keys written so far (zero after commit)
    pub fn stream_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Keys written so far, sorted
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().registry.keys()
    }

    /// Description of the most recent write or commit failure, for diagnostics
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }
}

impl<S: ScratchStore> Drop for StagedWriter<S> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.registry.is_empty() {
            return;
        }
        warn!(
            streams = state.registry.len(),
            "Writer dropped without commit, discarding scratch files"
        );
        for entry in state.registry.drain() {
            let (_, sink, location) = entry.into_parts();
            drop(sink);
            remove_scratch(&*self.scratch, &location);
        }
    }
}

impl<S: ScratchStore> std::fmt::Debug for StagedWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StagedWriter")
            .field("accepting", &state.accepting)
            .field("streams", &state.registry.len())
            .field("compression", &self.config.compression)
            .finish()
    }
}
