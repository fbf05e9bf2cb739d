//! The content store bridge: presents a runtime content store surface
//! (`Info`/`Walk`/`Delete`/`ReaderAt`/`Writer`) while mapping every
//! operation onto a DAG-based P2P block service.
//!
//! No global registration (see the design note this resolves): a
//! [`ContentStoreBridge`] is constructed explicitly from a block service and
//! a pin registry handle; the runtime registers it at its own bootstrap.

#![deny(unsafe_code)]

pub mod clock;
pub mod converter;
pub mod fetch;
pub mod info;
pub mod reader;
pub mod resolver;
pub mod writer;

pub use converter::Converter;
pub use fetch::Puller;
pub use info::BlobInfo;
pub use reader::Reader;
pub use resolver::{resolve, Resolved};
pub use writer::{Writer, WriterOpts};

use async_trait::async_trait;
use cas_core::{BlobProvider, BlockService, BoxAsyncRead, Digest, PinRegistry, Result};
use std::str::FromStr;
use std::sync::Arc;

/// The store side of the bridge: everything the runtime's content store
/// contract needs, backed by a [`BlockService`] and [`PinRegistry`].
#[derive(Clone)]
pub struct ContentStoreBridge {
    block: Arc<dyn BlockService>,
    pins: Arc<dyn PinRegistry>,
}

impl ContentStoreBridge {
    /// Construct a bridge over the given collaborator handles.
    #[must_use]
    pub fn new(block: Arc<dyn BlockService>, pins: Arc<dyn PinRegistry>) -> Self {
        Self { block, pins }
    }

    /// `{digest, size, created_at, updated_at}` for a blob, as exposed by
    /// the content store contract. `NotFound` on an absent digest.
    pub async fn info(&self, digest: &Digest) -> Result<BlobInfo> {
        info::info(self.block.as_ref(), digest).await
    }

    /// Always rejected: the store has no metadata layer to mutate against.
    pub fn update(&self, digest: &Digest, fields: &[String]) -> Result<BlobInfo> {
        info::update(digest, fields)
    }

    /// Iterate the pin set, calling `visit` with each entry's info.
    /// `filters` is accepted but ignored (documented behaviour, see
    /// [`info::walk`]).
    pub async fn walk<F>(&self, filters: &[String], visit: F) -> Result<()>
    where
        F: FnMut(&BlobInfo),
    {
        info::walk(self.block.as_ref(), self.pins.as_ref(), filters, visit).await
    }

    /// Unpin the blob named by `digest`.
    pub async fn delete(&self, digest: &Digest) -> Result<()> {
        info::delete(self.pins.as_ref(), digest).await
    }

    /// Open a positional reader over the blob named by `desc`.
    pub async fn reader_at(&self, desc: &cas_core::Descriptor) -> Result<Reader> {
        Reader::open(Arc::clone(&self.block), desc).await
    }

    /// Open a writer with the given options. The idempotence guard on an
    /// already-present expected descriptor applies before any pipe is
    /// started.
    pub async fn writer(&self, opts: WriterOpts) -> Result<Writer> {
        Writer::open(Arc::clone(&self.block), Arc::clone(&self.pins), opts).await
    }

    /// A converter writing into this bridge's store.
    #[must_use]
    pub fn converter(&self) -> Converter {
        Converter::new(Arc::clone(&self.block), Arc::clone(&self.pins))
    }

    /// `Status`, `ListStatuses`, `Abort` from the external interface are
    /// no-ops for this store: it tracks no out-of-band ingest registry
    /// beyond the writer objects callers already hold.
    #[must_use]
    pub fn list_statuses(&self, _filters: &[String]) -> Vec<cas_core::IngestStatus> {
        Vec::new()
    }

    /// See [`Self::list_statuses`].
    pub fn abort(&self, _ref: &str) -> Result<()> {
        Ok(())
    }
}

/// The bridge is itself a descriptor-keyed [`BlobProvider`], constructed
/// from its own [`BlockService`] via the addressing law — exactly the
/// named-capability split the collaborator side uses, applied internally.
#[async_trait]
impl BlobProvider for ContentStoreBridge {
    async fn reader_at(&self, desc: &cas_core::Descriptor) -> Result<BoxAsyncRead> {
        let digest = Digest::from_str(desc.digest())?;
        let cid = cas_core::digest_to_cid(&digest);
        self.block.open_read(&cid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cas_core::{DescriptorBuilder, MediaType};
    use cas_testkit::{MemoryBlockService, MemoryPinRegistry};

    fn bridge() -> ContentStoreBridge {
        ContentStoreBridge::new(
            Arc::new(MemoryBlockService::new()) as Arc<dyn BlockService>,
            Arc::new(MemoryPinRegistry::new()) as Arc<dyn PinRegistry>,
        )
    }

    /// Scenario S1: single blob ingest.
    #[tokio::test]
    async fn s1_single_blob_ingest() {
        let store = bridge();
        let mut w = store.writer(WriterOpts { r#ref: "s1".to_string(), expected_descriptor: None }).await.unwrap();
        w.write(b"hello world").await.unwrap();
        let digest = w.commit(11, None).await.unwrap();
        assert_eq!(digest.to_oci_string(), Digest::of(b"hello world").to_oci_string());
        let entry = store.info(&digest).await.unwrap();
        assert_eq!(entry.size, 11);
    }

    /// Scenario S2: digest round-trip.
    #[test]
    fn s2_digest_round_trip() {
        let digest: Digest = Digest::of(b"foobar");
        let cid = cas_core::digest_to_cid(&digest);
        let back = cas_core::cid_to_digest(&cid).unwrap();
        assert_eq!(digest, back);
    }

    /// Scenario S3: expected-digest mismatch.
    #[tokio::test]
    async fn s3_expected_digest_mismatch() {
        let store = bridge();
        let mut w = store.writer(WriterOpts { r#ref: "s3".to_string(), expected_descriptor: None }).await.unwrap();
        w.write(b"hello world").await.unwrap();
        let bogus = Digest::of(b"not the same bytes");
        let result = w.commit(11, Some(&bogus)).await;
        assert!(result.is_err());

        let mut seen = Vec::new();
        store.walk(&[], |entry| seen.push(entry.digest)).await.unwrap();
        assert!(!seen.contains(&Digest::of(b"hello world")));
    }

    /// Scenario S4: already-exists short circuit.
    #[tokio::test]
    async fn s4_already_exists_short_circuit() {
        let store = bridge();
        let mut w = store.writer(WriterOpts { r#ref: "s4".to_string(), expected_descriptor: None }).await.unwrap();
        w.write(b"hello world").await.unwrap();
        let digest = w.commit(11, None).await.unwrap();

        let desc = DescriptorBuilder::default()
            .media_type(MediaType::ImageLayer)
            .size(11)
            .digest(digest.to_oci_string())
            .build()
            .unwrap();
        let reopened = store.writer(WriterOpts { r#ref: "s4-retry".to_string(), expected_descriptor: Some(desc) }).await;
        assert!(matches!(reopened, Err(cas_core::BridgeError::AlreadyExists(_))));
    }
}
