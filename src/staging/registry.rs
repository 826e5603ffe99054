//! Stream Registry
//!
//! Maps each logical key to its sink and scratch location. Entries are
//! created on first write and live until the batch is drained for commit.

use crate::staging::scratch::{ScratchLocation, ScratchStore};
use crate::staging::sink::{CompressingSink, Compression};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{Result as IoResult, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// One logical stream: its sink and where its bytes are staged
pub struct StreamEntry<W: Write> {
    key: String,
    sink: CompressingSink<W>,
    location: ScratchLocation,
}

impl<W: Write> StreamEntry<W> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn location(&self) -> &ScratchLocation {
        &self.location
    }

    /// Append bytes to this stream's sink
    pub fn append(&mut self, data: &[u8]) -> IoResult<usize> {
        self.sink.append(data)
    }

    /// Uncompressed bytes written to this stream
    pub fn bytes_in(&self) -> u64 {
        self.sink.bytes_in()
    }

    /// Split into key, sink and location for finalization
    pub fn into_parts(self) -> (String, CompressingSink<W>, ScratchLocation) {
        (self.key, self.sink, self.location)
    }
}

impl<W: Write> std::fmt::Debug for StreamEntry<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEntry")
            .field("key", &self.key)
            .field("location", &self.location)
            .field("sink", &self.sink)
            .finish()
    }
}

/// Key to stream mapping for one batch
pub struct StreamRegistry<S: ScratchStore> {
    scratch: Arc<S>,
    compression: Compression,
    entries: HashMap<String, StreamEntry<S::Writer>>,
}

impl<S: ScratchStore> StreamRegistry<S> {
    pub fn new(scratch: Arc<S>, compression: Compression) -> Self {
        StreamRegistry {
            scratch,
            compression,
            entries: HashMap::new(),
        }
    }

    /// Return the stream for `key`, allocating scratch storage on first use.
    ///
    /// On failure nothing is registered, so a later write to the same key
    /// tries the allocation again.
    pub fn get_or_create(&mut self, key: &str) -> IoResult<&mut StreamEntry<S::Writer>> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => Ok(occupied.into_mut()),
            Entry::Vacant(vacant) => {
                let (writer, location) = self.scratch.create_temporary()?;
                let sink = match self.compression.wrap(writer) {
                    Ok(sink) => sink,
                    Err(e) => {
                        if let Err(rm) = self.scratch.remove(&location) {
                            warn!(location = %location, error = %rm, "Failed to remove scratch file");
                        }
                        return Err(e);
                    }
                };
                debug!(
                    key = %key,
                    location = %location,
                    compression = self.compression.name(),
                    "Created stream"
                );
                Ok(vacant.insert(StreamEntry {
                    key: key.to_string(),
                    sink,
                    location,
                }))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&StreamEntry<S::Writer>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Hand every entry over for finalization, leaving the registry empty.
    /// Order is unspecified.
    pub fn drain(&mut self) -> Vec<StreamEntry<S::Writer>> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}
