//! OCI manifest walk, blob re-ingestion via the writer, descriptor rewrite,
//! new manifest publish.
//!
//! Every child blob is ingested through [`crate::writer::Writer`], and
//! every successful commit pins its CID (the store-wide policy this
//! workspace settled on, see `DESIGN.md`). That subsumes the separate
//! "child-label propagation" step a GC-aware store would otherwise need:
//! by the time the rewritten manifest itself commits, every descriptor it
//! references is already pinned.

use crate::writer::{Writer, WriterOpts};
use cas_core::{BlobProvider, BlockService, BridgeError, Descriptor, DescriptorBuilder, Manifest, MediaType, PinRegistry, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::instrument;

/// Walks a source manifest and produces a new, content-addressed one.
pub struct Converter {
    block: Arc<dyn BlockService>,
    pins: Arc<dyn PinRegistry>,
}

impl Converter {
    /// Build a converter writing into the given store.
    #[must_use]
    pub fn new(block: Arc<dyn BlockService>, pins: Arc<dyn PinRegistry>) -> Self {
        Self { block, pins }
    }

    /// Convert `root_desc` (read from `source`) into a new root descriptor
    /// in this converter's store. Any sub-step failing aborts the whole
    /// conversion; already-ingested children may remain pinned and rely on
    /// GC to reclaim them if the overall conversion is later retried.
    #[instrument(skip(self, source))]
    pub async fn convert(&self, source: &dyn BlobProvider, root_desc: &Descriptor) -> Result<Descriptor> {
        let manifest_bytes = read_all(source, root_desc).await?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| BridgeError::Transport(format!("decoding source manifest: {e}")))?;

        let mut reingested = HashMap::new();
        let new_config = self.reingest(source, manifest.config(), &mut reingested).await?;

        let mut new_layers = Vec::with_capacity(manifest.layers().len());
        for layer in manifest.layers() {
            new_layers.push(self.reingest(source, layer, &mut reingested).await?);
        }

        let mut rewritten = manifest.clone();
        *rewritten.config_mut() = new_config;
        *rewritten.layers_mut() = new_layers;

        let encoded = serde_json::to_vec_pretty(&rewritten)
            .map_err(|e| BridgeError::Transport(format!("encoding rewritten manifest: {e}")))?;

        let opts = WriterOpts { r#ref: format!("convert-manifest-{}", root_desc.digest()), expected_descriptor: None };
        let mut writer = Writer::open(Arc::clone(&self.block), Arc::clone(&self.pins), opts).await?;
        writer.write(&encoded).await?;
        let digest = writer.commit(encoded.len() as u64, None).await?;

        Ok(DescriptorBuilder::default()
            .media_type(MediaType::ImageManifest)
            .size(encoded.len() as i64)
            .digest(digest.to_oci_string())
            .build()
            .expect("media_type, size and digest are always set"))
    }

    /// Re-ingest one child descriptor, reusing a prior result if another
    /// descriptor in the same conversion shares its digest: ingested once,
    /// the result reused for every matching duplicate layer.
    async fn reingest(
        &self,
        source: &dyn BlobProvider,
        desc: &Descriptor,
        cache: &mut HashMap<String, Descriptor>,
    ) -> Result<Descriptor> {
        let key = desc.digest().clone();
        if let Some(cached) = cache.get(&key) {
            return Ok(cached.clone());
        }
        let mut reader = source.reader_at(desc).await?;
        let opts = WriterOpts {
            r#ref: format!("convert-{}-{}", desc.media_type(), desc.digest()),
            expected_descriptor: None,
        };
        let mut writer = Writer::open(Arc::clone(&self.block), Arc::clone(&self.pins), opts).await?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write(&buf[..n]).await?;
        }
        let digest = writer.commit(desc.size() as u64, None).await?;
        let rewritten = DescriptorBuilder::default()
            .media_type(desc.media_type().clone())
            .size(desc.size())
            .digest(digest.to_oci_string())
            .build()
            .expect("media_type, size and digest are always set");
        cache.insert(key, rewritten.clone());
        Ok(rewritten)
    }
}

async fn read_all(source: &dyn BlobProvider, desc: &Descriptor) -> Result<Vec<u8>> {
    let mut reader = source.reader_at(desc).await?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await?;
    Ok(bytes)
}
