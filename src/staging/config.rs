//! Configuration for Staged Writes
//!
//! Writer settings can be built in code, parsed from TOML, or loaded from
//! `STAGEWRITE_*` environment variables. Store settings pick the backend
//! committed objects are uploaded to.

use crate::staging::object_store::{InMemoryObjectStore, LocalFsObjectStore, ObjectStore, DEFAULT_CONTENT_TYPE};
use crate::staging::sink::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Default file-name prefix for scratch files
pub const DEFAULT_SCRATCH_PREFIX: &str = "stagewrite";

/// Per-batch writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Compression applied to every stream in the batch
    pub compression: Compression,
    /// Content type sent with every committed object
    pub content_type: String,
    /// Directory for scratch files (OS temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
    /// File-name prefix for scratch files
    pub scratch_prefix: String,
    /// Remove scratch files of unreached streams when commit aborts
    pub cleanup_on_abort: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            compression: Compression::None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            scratch_dir: None,
            scratch_prefix: DEFAULT_SCRATCH_PREFIX.to_string(),
            cleanup_on_abort: true,
        }
    }
}

impl WriterConfig {
    /// Default config with gzip turned on or off
    pub fn gzip(enabled: bool) -> Self {
        WriterConfig {
            compression: if enabled { Compression::gzip() } else { Compression::None },
            ..Default::default()
        }
    }

    /// Configuration for tests (fast compression)
    pub fn test() -> Self {
        WriterConfig {
            compression: Compression::Gzip { level: 1 },
            scratch_prefix: "stagewrite-test".to_string(),
            ..Default::default()
        }
    }

    /// Parse from a TOML document; missing fields take their defaults
    pub fn from_toml_str(input: &str) -> IoResult<Self> {
        toml::from_str(input).map_err(|e| {
            IoError::new(ErrorKind::InvalidInput, format!("Invalid writer config: {}", e))
        })
    }

    /// Load configuration from environment variables
    ///
    /// - `STAGEWRITE_COMPRESSION`: `none`, `gzip` or `zstd` (default: none)
    /// - `STAGEWRITE_CONTENT_TYPE`: content type of committed objects
    /// - `STAGEWRITE_SCRATCH_DIR`: directory for scratch files
    /// - `STAGEWRITE_CLEANUP_ON_ABORT`: `true`/`1` or `false`/`0` (default: true)
    pub fn from_env() -> IoResult<Self> {
        let mut config = WriterConfig::default();

        if let Ok(value) = std::env::var("STAGEWRITE_COMPRESSION") {
            config.compression = Compression::from_name(&value).ok_or_else(|| {
                IoError::new(
                    ErrorKind::InvalidInput,
                    format!("Unknown compression: {}", value),
                )
            })?;
        }
        if let Ok(value) = std::env::var("STAGEWRITE_CONTENT_TYPE") {
            config.content_type = value;
        }
        if let Ok(value) = std::env::var("STAGEWRITE_SCRATCH_DIR") {
            config.scratch_dir = Some(PathBuf::from(value));
        }
        if let Ok(value) = std::env::var("STAGEWRITE_CLEANUP_ON_ABORT") {
            config.cleanup_on_abort = match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(IoError::new(
                        ErrorKind::InvalidInput,
                        format!("Invalid STAGEWRITE_CLEANUP_ON_ABORT: {}", value),
                    ))
                }
            };
        }

        Ok(config)
    }
}

/// Type of object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectStoreType {
    /// In-memory store (for tests)
    InMemory,
    /// Local filesystem
    LocalFs,
    /// Amazon S3 or compatible
    #[cfg(feature = "s3")]
    S3,
}

/// Backend selection for committed objects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Object store type
    pub store_type: ObjectStoreType,
    /// Local filesystem path (for LocalFs store)
    pub local_path: Option<PathBuf>,
    /// S3 configuration (for S3 store)
    #[cfg(feature = "s3")]
    pub s3: Option<S3Config>,
}

impl StoreConfig {
    /// In-memory store config
    pub fn in_memory() -> Self {
        StoreConfig {
            store_type: ObjectStoreType::InMemory,
            local_path: None,
            #[cfg(feature = "s3")]
            s3: None,
        }
    }

    /// Local filesystem store rooted at `path`
    pub fn local(path: PathBuf) -> Self {
        StoreConfig {
            store_type: ObjectStoreType::LocalFs,
            local_path: Some(path),
            #[cfg(feature = "s3")]
            s3: None,
        }
    }
}

/// S3 configuration
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// Key prefix within bucket
    pub prefix: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,
    /// Objects larger than this are uploaded in parts (default: 8MB)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
}

#[cfg(feature = "s3")]
fn default_multipart_threshold() -> u64 {
    8 * 1024 * 1024
}

/// Build the object store described by `config`
pub fn open_store(config: &StoreConfig) -> IoResult<Arc<dyn ObjectStore>> {
    match config.store_type {
        ObjectStoreType::InMemory => Ok(Arc::new(InMemoryObjectStore::new())),
        ObjectStoreType::LocalFs => {
            let path = config.local_path.clone().ok_or_else(|| {
                IoError::new(ErrorKind::InvalidInput, "LocalFs store requires local_path")
            })?;
            std::fs::create_dir_all(&path)?;
            Ok(Arc::new(LocalFsObjectStore::new(path)))
        }
        #[cfg(feature = "s3")]
        ObjectStoreType::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                IoError::new(ErrorKind::InvalidInput, "S3 store requires s3 config")
            })?;
            Ok(Arc::new(crate::staging::s3_store::S3ObjectStore::new(s3)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV_VARS: [&str; 4] = [
        "STAGEWRITE_COMPRESSION",
        "STAGEWRITE_CONTENT_TYPE",
        "STAGEWRITE_SCRATCH_DIR",
        "STAGEWRITE_CLEANUP_ON_ABORT",
    ];

    #[test]
    fn test_from_env() {
        let saved: Vec<(&str, Option<String>)> =
            ENV_VARS.iter().map(|name| (*name, std::env::var(name).ok())).collect();
        for name in ENV_VARS {
            std::env::remove_var(name);
        }

        let config = WriterConfig::from_env().unwrap();
        assert_eq!(config.compression, Compression::None);
        assert!(config.cleanup_on_abort);

        std::env::set_var("STAGEWRITE_COMPRESSION", "GZIP");
        std::env::set_var("STAGEWRITE_CONTENT_TYPE", "text/plain");
        std::env::set_var("STAGEWRITE_SCRATCH_DIR", "/var/tmp/stage");
        std::env::set_var("STAGEWRITE_CLEANUP_ON_ABORT", "0");
        let config = WriterConfig::from_env().unwrap();
        assert_eq!(config.compression, Compression::gzip());
        assert_eq!(config.content_type, "text/plain");
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/var/tmp/stage")));
        assert!(!config.cleanup_on_abort);

        std::env::set_var("STAGEWRITE_CLEANUP_ON_ABORT", "TRUE");
        assert!(WriterConfig::from_env().unwrap().cleanup_on_abort);
        std::env::set_var("STAGEWRITE_CLEANUP_ON_ABORT", "False");
        assert!(!WriterConfig::from_env().unwrap().cleanup_on_abort);

        std::env::set_var("STAGEWRITE_CLEANUP_ON_ABORT", "yes");
        let err = WriterConfig::from_env().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        std::env::set_var("STAGEWRITE_CLEANUP_ON_ABORT", "1");
        std::env::set_var("STAGEWRITE_COMPRESSION", "lz4");
        let err = WriterConfig::from_env().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        for (name, value) in saved {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = WriterConfig::default();
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.content_type, "application/octet-stream");
        assert!(config.cleanup_on_abort);
        assert!(config.scratch_dir.is_none());
    }

    #[test]
    fn test_gzip_flag() {
        assert!(matches!(WriterConfig::gzip(true).compression, Compression::Gzip { .. }));
        assert_eq!(WriterConfig::gzip(false).compression, Compression::None);
    }

    #[test]
    fn test_toml_partial_config() {
        let config = WriterConfig::from_toml_str(
            r#"
            content_type = "text/plain"
            scratch_dir = "/var/tmp/staging"

            [compression]
            Gzip = { level = 9 }
            "#,
        )
        .unwrap();

        assert_eq!(config.compression, Compression::Gzip { level: 9 });
        assert_eq!(config.content_type, "text/plain");
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/var/tmp/staging")));
        assert_eq!(config.scratch_prefix, DEFAULT_SCRATCH_PREFIX);
    }

    #[test]
    fn test_toml_rejects_garbage() {
        assert!(WriterConfig::from_toml_str("cleanup_on_abort = \"maybe\"").is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = WriterConfig::test();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: WriterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.compression, config.compression);
        assert_eq!(parsed.scratch_prefix, config.scratch_prefix);
    }

    #[test]
    fn test_open_local_store_requires_path() {
        let mut config = StoreConfig::local(PathBuf::from("/tmp"));
        config.local_path = None;
        assert!(open_store(&config).is_err());
    }

    #[test]
    fn test_open_in_memory_store() {
        assert!(open_store(&StoreConfig::in_memory()).is_ok());
    }
}
