/*!
Archive metadata and integrity hashing.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{GraphSnapError, Result};

/// Current archive container format version
pub const ARCHIVE_FORMAT_VERSION: u8 = 1;

/// Metadata stored alongside every archived graph
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArchiveMetadata {
    /// Unique identifier of this archive
    pub archive_id: String,

    /// Caller-chosen label, e.g. the agent or session the graph belongs to
    pub label: String,

    pub timestamp: DateTime<Utc>,

    /// Container format version (current: 1)
    pub format_version: u8,

    /// Version tag of the encoded envelope
    pub envelope_version: String,

    /// SHA-256 of the encoded graph text
    pub content_hash: String,

    /// Nodes fully written in the encoded graph
    pub node_count: usize,

    pub uncompressed_size: usize,
    pub compressed_size: Option<usize>,
    pub compression_algorithm: String,
    pub description: Option<String>,
}

impl ArchiveMetadata {
    /// Fresh metadata for a new archive; hash and sizes are filled in on save
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self {
            archive_id: Uuid::new_v4().to_string(),
            label: label.into(),
            timestamp: Utc::now(),
            format_version: ARCHIVE_FORMAT_VERSION,
            envelope_version: String::new(),
            content_hash: String::new(),
            node_count: 0,
            uncompressed_size: 0,
            compressed_size: None,
            compression_algorithm: "gzip".to_string(),
            description: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Record the hash and size of the encoded graph text
    pub fn with_content_hash(mut self, graph_text: &[u8]) -> Self {
        self.content_hash = Self::compute_hash(graph_text);
        self.uncompressed_size = graph_text.len();
        self
    }

    pub fn with_compressed_size(mut self, compressed_size: usize) -> Self {
        self.compressed_size = Some(compressed_size);
        self
    }

    pub fn with_compression_algorithm<S: Into<String>>(mut self, algorithm: S) -> Self {
        self.compression_algorithm = algorithm.into();
        self
    }

    /// Hex SHA-256 of `data`
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Check `graph_text` against the recorded hash
    pub fn verify_integrity(&self, graph_text: &[u8]) -> Result<()> {
        let actual = Self::compute_hash(graph_text);
        if actual == self.content_hash {
            Ok(())
        } else {
            Err(GraphSnapError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual,
            })
        }
    }

    /// Validate that all required fields are set
    pub fn validate(&self) -> Result<()> {
        if self.archive_id.is_empty() {
            return Err(GraphSnapError::validation("archive_id cannot be empty"));
        }
        if self.label.is_empty() {
            return Err(GraphSnapError::validation("label cannot be empty"));
        }
        if self.content_hash.is_empty() {
            return Err(GraphSnapError::validation("content_hash cannot be empty"));
        }
        Ok(())
    }

    pub fn is_compatible(&self) -> bool {
        self.format_version <= ARCHIVE_FORMAT_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata_defaults() {
        let metadata = ArchiveMetadata::new("planner");
        assert_eq!(metadata.label, "planner");
        assert_eq!(metadata.format_version, ARCHIVE_FORMAT_VERSION);
        assert!(Uuid::parse_str(&metadata.archive_id).is_ok());
        assert!(metadata.compressed_size.is_none());
        assert!(metadata.is_compatible());
    }

    #[test]
    fn test_hash_and_integrity() {
        let text = br#"{"version":"1","root":null}"#;
        let metadata = ArchiveMetadata::new("a").with_content_hash(text);
        assert_eq!(metadata.content_hash.len(), 64);
        assert_eq!(metadata.uncompressed_size, text.len());
        assert!(metadata.verify_integrity(text).is_ok());

        let err = metadata.verify_integrity(b"tampered").unwrap_err();
        assert!(matches!(err, GraphSnapError::IntegrityCheckFailed { .. }));
    }

    #[test]
    fn test_validate_requires_hash_and_label() {
        assert!(ArchiveMetadata::new("a").validate().is_err());
        assert!(ArchiveMetadata::new("").with_content_hash(b"x").validate().is_err());
        assert!(ArchiveMetadata::new("a").with_content_hash(b"x").validate().is_ok());
    }

    #[test]
    fn test_future_format_is_incompatible() {
        let mut metadata = ArchiveMetadata::new("a");
        metadata.format_version = ARCHIVE_FORMAT_VERSION + 1;
        assert!(!metadata.is_compatible());
    }

    #[test]
    fn test_serde_roundtrip() {
        let metadata = ArchiveMetadata::new("a")
            .with_description("nightly")
            .with_content_hash(b"graph");
        let json = serde_json::to_string(&metadata).unwrap();
        let back: ArchiveMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
