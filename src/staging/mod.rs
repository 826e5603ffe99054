//! Staged Multi-Object Writes
//!
//! Accumulates many independent byte streams, keyed by object name, on
//! local scratch storage and commits each one as a single object in a
//! remote store.
//!
//! ## Architecture
//!
//! ```text
//! write(key, bytes) → StagedWriter → StreamRegistry → CompressingSink → scratch file
//!                                                                        ↓
//!                          commit() → finalize → stat → ObjectStore::put → remove
//! ```
//!
//! ## Key Properties
//!
//! - **One object per key**: every key written in a batch is uploaded, even if
//!   it only ever received zero bytes
//! - **Ordered per key**: an object is the exact concatenation of its writes
//! - **Closed after commit**: writes and commits after the first commit fail
//! - **Optional compression**: gzip (or zstd with the `compression` feature)

pub mod error;
pub mod sink;
pub mod scratch;
pub mod registry;
pub mod object_store;
pub mod simulated_store;
pub mod config;
pub mod writer;
#[cfg(feature = "s3")]
pub mod s3_store;

pub use error::{Result, StagingError};
pub use sink::{CompressingSink, Compression};
pub use scratch::{
    InMemoryScratchStore, InMemoryScratchWriter, LocalScratchStore, ScratchLocation, ScratchStore,
};
pub use registry::{StreamEntry, StreamRegistry};
pub use object_store::{
    InMemoryObjectStore, LocalFsObjectStore, ObjectBody, ObjectMeta, ObjectStore, StoreFuture,
    DEFAULT_CONTENT_TYPE,
};
pub use simulated_store::{SimulatedObjectStore, SimulatedStoreConfig, SimulatedStoreStats};
pub use config::{open_store, ObjectStoreType, StoreConfig, WriterConfig, DEFAULT_SCRATCH_PREFIX};
pub use writer::{CommitSummary, StagedWriter};
#[cfg(feature = "s3")]
pub use s3_store::S3ObjectStore;
#[cfg(feature = "s3")]
pub use config::S3Config;
