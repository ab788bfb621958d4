/*!
Persisting encoded graphs.

[`GraphArchive`] stores encoded graph text together with [`ArchiveMetadata`]
in a compressed container, and verifies the content hash when it is read back.

Container layout before compression:

```text
{"metadata": {...}, "graph": "<encoded graph text>"}
```

The graph is kept as a string so that its bytes, and therefore its hash, are
exactly the bytes the serializer produced.
*/

mod compression;
mod metadata;
mod storage;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::factory::Factory;
use crate::inspect::EnvelopeReport;
use crate::serializer::GraphSerializer;
use crate::value::Value;
use crate::{GraphSnapError, Result};

pub use compression::{compressor_for, CompressionAdapter, GzipCompressor, NoCompression};
pub use metadata::{ArchiveMetadata, ARCHIVE_FORMAT_VERSION};
pub use storage::{LocalFileStorage, MemoryStorage, StorageAdapter};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Serialize, Deserialize, Debug)]
struct ArchiveContainer {
    metadata: ArchiveMetadata,
    graph: String,
}

/// Archive of encoded graphs over pluggable storage and compression.
///
/// # Example
/// ```rust
/// use graphsnap_core::archive::{ArchiveMetadata, GraphArchive, GzipCompressor, MemoryStorage};
///
/// let archive = GraphArchive::new(MemoryStorage::new(), GzipCompressor::new());
/// let text = r#"{"version":"1","root":[1,2,3]}"#;
///
/// let saved = archive.save_text(text, &ArchiveMetadata::new("demo"), "demo.json.gz").unwrap();
/// let (metadata, graph) = archive.load_text("demo.json.gz").unwrap();
/// assert_eq!(metadata.content_hash, saved.content_hash);
/// assert_eq!(graph, text);
/// ```
pub struct GraphArchive<S, C>
where
    S: StorageAdapter,
    C: CompressionAdapter,
{
    storage: S,
    compressor: C,
}

impl<S, C> GraphArchive<S, C>
where
    S: StorageAdapter,
    C: CompressionAdapter,
{
    pub fn new(storage: S, compressor: C) -> Self {
        Self {
            storage,
            compressor,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Serialize `value` and archive the result at `path`
    pub async fn save(
        &self,
        serializer: &GraphSerializer,
        value: &Value,
        metadata: &ArchiveMetadata,
        path: &str,
    ) -> Result<ArchiveMetadata> {
        let text = serializer.serialize(value).await?;
        self.save_text(&text, metadata, path)
    }

    /// Load the archive at `path` and rebuild its graph
    pub async fn load(
        &self,
        serializer: &GraphSerializer,
        path: &str,
        extra: &[Arc<dyn Factory>],
    ) -> Result<(ArchiveMetadata, Value)> {
        let (metadata, text) = self.load_text(path)?;
        let value = serializer.deserialize(&text, extra).await?;
        Ok((metadata, value))
    }

    /// Archive already encoded graph text.
    ///
    /// The text must be a consistent envelope; its version and node count are
    /// recorded in the returned metadata.
    pub fn save_text(
        &self,
        graph_text: &str,
        metadata: &ArchiveMetadata,
        path: &str,
    ) -> Result<ArchiveMetadata> {
        let report = EnvelopeReport::analyze(graph_text)?;
        if !report.is_consistent() {
            return Err(GraphSnapError::invalid_format(format!(
                "Refusing to archive an inconsistent graph ({} dangling, {} duplicate refs)",
                report.dangling_refs.len(),
                report.duplicate_refs.len()
            )));
        }

        let mut updated = metadata
            .clone()
            .with_content_hash(graph_text.as_bytes())
            .with_compression_algorithm(self.compressor.algorithm_name());
        updated.envelope_version = report.version;
        updated.node_count = report.node_count;
        updated.validate()?;

        let container = ArchiveContainer {
            metadata: updated.clone(),
            graph: graph_text.to_string(),
        };
        let container_json = serde_json::to_vec(&container)?;
        let compressed = self.compressor.compress(&container_json)?;
        updated = updated.with_compressed_size(compressed.len());

        self.storage
            .save(&compressed, path)
            .map_err(|e| GraphSnapError::storage(format!("Failed to save archive: {e}")))?;

        info!(
            "Archived graph '{}' at {} ({} nodes, {} -> {} bytes)",
            updated.label,
            path,
            updated.node_count,
            updated.uncompressed_size,
            compressed.len()
        );
        Ok(updated)
    }

    /// Load archived graph text, verifying format and integrity
    pub fn load_text(&self, path: &str) -> Result<(ArchiveMetadata, String)> {
        let compressed = self
            .storage
            .load(path)
            .map_err(|e| GraphSnapError::storage(format!("Failed to load archive: {e}")))?;
        let decompressed = self.compressor.decompress(&compressed)?;
        let (mut metadata, graph) = open_container(&decompressed)?;
        metadata.compressed_size = Some(compressed.len());

        debug!("Loaded archive '{}' from {}", metadata.label, path);
        Ok((metadata, graph))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.storage.exists(path)
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        self.storage.delete(path)
    }
}

/// Open container bytes of unknown compression.
///
/// Gzip is recognised by its magic bytes; anything else is read as an
/// uncompressed container.
pub fn unpack(data: &[u8]) -> Result<(ArchiveMetadata, String)> {
    if data.starts_with(&GZIP_MAGIC) {
        open_container(&GzipCompressor::new().decompress(data)?)
    } else {
        open_container(data)
    }
}

fn open_container(json: &[u8]) -> Result<(ArchiveMetadata, String)> {
    let container: ArchiveContainer = serde_json::from_slice(json)?;

    if !container.metadata.is_compatible() {
        return Err(GraphSnapError::invalid_format(format!(
            "Incompatible archive format version: {} (current: {})",
            container.metadata.format_version, ARCHIVE_FORMAT_VERSION
        )));
    }
    container
        .metadata
        .verify_integrity(container.graph.as_bytes())?;

    Ok((container.metadata, container.graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn archive() -> GraphArchive<MemoryStorage, GzipCompressor> {
        GraphArchive::new(MemoryStorage::new(), GzipCompressor::new())
    }

    #[tokio::test]
    async fn test_save_and_load_value() {
        let serializer = GraphSerializer::with_builtins().unwrap();
        let archive = archive();
        let shared = Value::object_from([("turn", Value::from(1))]);
        let root = Value::object_from([("a", shared.clone()), ("b", shared)]);

        let saved = archive
            .save(&serializer, &root, &ArchiveMetadata::new("agent"), "agent.gz")
            .await
            .unwrap();
        assert_eq!(saved.envelope_version, "1");
        assert_eq!(saved.node_count, 2);
        assert!(saved.compressed_size.is_some());

        let (metadata, back) = archive.load(&serializer, "agent.gz", &[]).await.unwrap();
        assert_eq!(metadata.archive_id, saved.archive_id);
        assert!(back.deep_equals(&root));
        let (a, b) = (back.get("a").unwrap(), back.get("b").unwrap());
        assert!(a.same_identity(&b));
    }

    #[test]
    fn test_tampered_archive_fails_integrity() {
        let archive = GraphArchive::new(MemoryStorage::new(), NoCompression::new());
        archive
            .save_text(r#"{"version":"1","root":1}"#, &ArchiveMetadata::new("x"), "x")
            .unwrap();

        let raw = archive.storage().load("x").unwrap();
        let tampered = String::from_utf8(raw)
            .unwrap()
            .replace(r#"\"root\":1"#, r#"\"root\":2"#);
        archive.storage().save(tampered.as_bytes(), "x").unwrap();

        let err = archive.load_text("x").unwrap_err();
        assert!(matches!(err, GraphSnapError::IntegrityCheckFailed { .. }));
    }

    #[test]
    fn test_inconsistent_graph_is_refused() {
        let text = r#"{"version":"1","root":{"__node":true,"class":"Object","ref":"4","marker":"ref"}}"#;
        let err = archive()
            .save_text(text, &ArchiveMetadata::new("x"), "x")
            .unwrap_err();
        assert!(matches!(err, GraphSnapError::InvalidFormat(_)));
    }

    #[test]
    fn test_unpack_detects_compression() {
        let temp_dir = TempDir::new().unwrap();
        let text = r#"{"version":"1","root":"hi"}"#;

        let gz = GraphArchive::new(LocalFileStorage::with_base_dir(temp_dir.path()), GzipCompressor::new());
        gz.save_text(text, &ArchiveMetadata::new("gz"), "a.gz").unwrap();
        let plain = GraphArchive::new(LocalFileStorage::with_base_dir(temp_dir.path()), NoCompression::new());
        plain.save_text(text, &ArchiveMetadata::new("plain"), "a.json").unwrap();

        for file in ["a.gz", "a.json"] {
            let bytes = std::fs::read(temp_dir.path().join(file)).unwrap();
            let (_, graph) = unpack(&bytes).unwrap();
            assert_eq!(graph, text);
        }
    }

    #[test]
    fn test_missing_archive() {
        let err = archive().load_text("nowhere").unwrap_err();
        assert!(matches!(err, GraphSnapError::Storage(_)));
    }
}
