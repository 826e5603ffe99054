pub mod logging;
pub mod staging;

pub use logging::init_tracing;
pub use staging::{
    CommitSummary, Compression, InMemoryObjectStore, LocalFsObjectStore, ObjectStore, StagedWriter,
    StagingError, WriterConfig,
};
