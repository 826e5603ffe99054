//! Compressing Sink
//!
//! Wraps a scratch write handle with an optional streaming compressor and
//! exposes the same append/finalize contract either way. Compressed output
//! is only complete once [`CompressingSink::finalize`] has written the
//! compressor trailer, so scratch data must never be read before that.

use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Result as IoResult, Write};

/// Compression applied to a stream's scratch data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    /// No compression
    #[default]
    None,
    /// Gzip via flate2 (level 0-9)
    Gzip { level: u32 },
    /// Zstd compression (requires feature)
    #[cfg(feature = "compression")]
    Zstd { level: i32 },
}

impl Compression {
    /// Gzip at flate2's default level
    pub fn gzip() -> Self {
        Compression::Gzip { level: 6 }
    }

    /// Parse a codec name as used in environment configuration
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Some(Compression::None),
            "gzip" | "gz" => Some(Compression::gzip()),
            #[cfg(feature = "compression")]
            "zstd" => Some(Compression::Zstd { level: 3 }),
            _ => None,
        }
    }

    /// Codec name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip { .. } => "gzip",
            #[cfg(feature = "compression")]
            Compression::Zstd { .. } => "zstd",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Compression::None)
    }

    /// Layer this codec in front of `writer`
    pub fn wrap<W: Write>(&self, writer: W) -> IoResult<CompressingSink<W>> {
        let inner = match *self {
            Compression::None => SinkInner::Raw(writer),
            Compression::Gzip { level } => {
                SinkInner::Gzip(GzEncoder::new(writer, flate2::Compression::new(level.min(9))))
            }
            #[cfg(feature = "compression")]
            Compression::Zstd { level } => SinkInner::Zstd(zstd::stream::write::Encoder::new(writer, level)?),
        };
        Ok(CompressingSink { inner, bytes_in: 0 })
    }

    /// Decode data produced by a sink using this codec
    pub fn decompress(&self, data: &[u8]) -> IoResult<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip { .. } => {
                // Multi-member aware, matching how gzip tools read concatenated output
                let mut decoder = flate2::read::MultiGzDecoder::new(data);
                let mut buf = Vec::new();
                decoder.read_to_end(&mut buf)?;
                Ok(buf)
            }
            #[cfg(feature = "compression")]
            Compression::Zstd { .. } => zstd::decode_all(data),
        }
    }
}

enum SinkInner<W: Write> {
    Raw(W),
    Gzip(GzEncoder<W>),
    #[cfg(feature = "compression")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

/// Write side of one stream: raw or compressing, same contract.
pub struct CompressingSink<W: Write> {
    inner: SinkInner<W>,
    bytes_in: u64,
}

impl<W: Write> CompressingSink<W> {
    /// Append bytes verbatim. Returns the full length on success.
    pub fn append(&mut self, data: &[u8]) -> IoResult<usize> {
        match &mut self.inner {
            SinkInner::Raw(w) => w.write_all(data)?,
            SinkInner::Gzip(enc) => enc.write_all(data)?,
            #[cfg(feature = "compression")]
            SinkInner::Zstd(enc) => enc.write_all(data)?,
        }
        self.bytes_in += data.len() as u64;
        Ok(data.len())
    }

    /// Uncompressed bytes accepted so far
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn is_compressing(&self) -> bool {
        !matches!(self.inner, SinkInner::Raw(_))
    }

    /// Finish the compressor (writing its trailer), then flush and close the handle.
    pub fn finalize(self) -> IoResult<()> {
        let mut handle = match self.inner {
            SinkInner::Raw(w) => w,
            SinkInner::Gzip(enc) => enc.finish()?,
            #[cfg(feature = "compression")]
            SinkInner::Zstd(enc) => enc.finish()?,
        };
        handle.flush()
    }
}

impl<W: Write> std::fmt::Debug for CompressingSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressingSink")
            .field("compressing", &self.is_compressing())
            .field("bytes_in", &self.bytes_in)
            .finish()
    }
}
