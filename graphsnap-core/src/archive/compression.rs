/*!
Compression adapters for archived graphs.

Encoded graphs are verbose, repetitive JSON and shrink well under gzip. The
adapter trait keeps the archive independent of the algorithm.
*/

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::{GraphSnapError, Result};

/// Compression abstraction for archive containers
pub trait CompressionAdapter {
    /// Compress the input data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the input data
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Name recorded in the archive metadata
    fn algorithm_name(&self) -> &str;
}

/// Gzip compression adapter
///
/// # Example
/// ```rust
/// use graphsnap_core::archive::{CompressionAdapter, GzipCompressor};
///
/// let compressor = GzipCompressor::new();
/// let data = br#"{"version":"1","root":null}"#;
/// let compressed = compressor.compress(data).unwrap();
/// assert_eq!(compressor.decompress(&compressed).unwrap(), data.to_vec());
/// ```
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    compression_level: Compression,
}

impl GzipCompressor {
    /// Gzip with the default level (6)
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Gzip with an explicit level, 0 (store) to 9 (smallest)
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level.min(9)),
        }
    }

    pub fn fast() -> Self {
        Self::with_level(1)
    }

    pub fn max() -> Self {
        Self::with_level(9)
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.compression_level);

        encoder.write_all(data).map_err(|e| {
            GraphSnapError::compression(format!("Failed to write data for compression: {e}"))
        })?;

        encoder
            .finish()
            .map_err(|e| GraphSnapError::compression(format!("Failed to finish compression: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| GraphSnapError::compression(format!("Failed to decompress data: {e}")))?;

        Ok(decompressed)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through adapter, for archives meant to be read by eye
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}

/// Adapter for a name recorded in archive metadata
pub fn compressor_for(algorithm: &str) -> Result<Box<dyn CompressionAdapter + Send + Sync>> {
    match algorithm {
        "gzip" => Ok(Box::new(GzipCompressor::new())),
        "none" => Ok(Box::new(NoCompression::new())),
        other => Err(GraphSnapError::compression(format!(
            "Unsupported compression algorithm '{other}'"
        ))),
    }
}
