//! In-memory reference implementations of every collaborator trait in
//! `cas-core`, for `cas-bridge`'s integration tests and for a local dev loop
//! without a real libp2p/DHT peer.
//!
//! Content addressing discipline mirrors the digest-of-plaintext, atomic
//! insert pattern; indices are `DashMap`/`DashSet`-backed throughout.

#![deny(unsafe_code)]

use async_trait::async_trait;
use cas_core::{
    cid_to_digest, digest_to_cid, BlobProvider, BlockService, BoxAsyncRead, BridgeError, Descriptor,
    GcLease, ImageService, LeaseGuard, NameResolver, NodeStat, PinRegistry, Result,
};
use cid::Cid;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// An in-memory DAG: every "node" is just its full byte content, keyed by
/// the CID that content's digest maps to. Chunking/tree-building is a real
/// block service's concern; this store only needs to agree on the address.
#[derive(Clone, Default)]
pub struct MemoryBlockService {
    nodes: Arc<DashMap<Cid, Vec<u8>>>,
}

impl MemoryBlockService {
    /// A fresh, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockService for MemoryBlockService {
    async fn add(&self, mut data: BoxAsyncRead) -> Result<Cid> {
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        let digest = cas_core::Digest::of(&buf);
        let cid = digest_to_cid(&digest);
        self.nodes.insert(cid, buf);
        Ok(cid)
    }

    async fn stat(&self, cid: &Cid) -> Result<NodeStat> {
        let entry = self
            .nodes
            .get(cid)
            .ok_or_else(|| BridgeError::NotFound(cid.to_string()))?;
        Ok(NodeStat { size: entry.len() as u64, is_directory: false })
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.nodes.contains_key(cid))
    }

    async fn open_read(&self, cid: &Cid) -> Result<BoxAsyncRead> {
        let entry = self
            .nodes
            .get(cid)
            .ok_or_else(|| BridgeError::NotFound(cid.to_string()))?;
        let bytes = entry.clone();
        Ok(Box::pin(std::io::Cursor::new(bytes)))
    }

    async fn remove(&self, cid: &Cid) -> Result<()> {
        self.nodes.remove(cid);
        Ok(())
    }
}

/// An in-memory pin set.
#[derive(Clone, Default)]
pub struct MemoryPinRegistry {
    pins: Arc<DashSet<Cid>>,
}

impl MemoryPinRegistry {
    /// A fresh, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PinRegistry for MemoryPinRegistry {
    async fn add(&self, cid: &Cid) -> Result<()> {
        self.pins.insert(*cid);
        Ok(())
    }

    async fn remove(&self, cid: &Cid) -> Result<()> {
        self.pins.remove(cid);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Cid>> {
        Ok(self.pins.iter().map(|e| *e).collect())
    }

    async fn is_pinned(&self, cid: &Cid) -> Result<bool> {
        Ok(self.pins.contains(cid))
    }
}

/// A descriptor-keyed in-memory source, standing in for an external registry
/// fetcher in converter tests. Seed it with [`MemoryBlobProvider::seed`]
/// before running a conversion.
#[derive(Clone, Default)]
pub struct MemoryBlobProvider {
    blobs: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryBlobProvider {
    /// A fresh, empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` as the content behind `desc.digest`.
    pub fn seed(&self, desc: &Descriptor, bytes: Vec<u8>) {
        self.blobs.insert(desc.digest().to_string(), bytes);
    }
}

#[async_trait]
impl BlobProvider for MemoryBlobProvider {
    async fn reader_at(&self, desc: &Descriptor) -> Result<BoxAsyncRead> {
        let key = desc.digest().to_string();
        let bytes = self
            .blobs
            .get(&key)
            .ok_or_else(|| BridgeError::NotFound(key.clone()))?
            .clone();
        Ok(Box::pin(std::io::Cursor::new(bytes)))
    }
}

/// The runtime's image-name index, in memory.
#[derive(Clone, Default)]
pub struct MemoryImageService {
    images: Arc<DashMap<String, Descriptor>>,
}

impl MemoryImageService {
    /// A fresh, empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageService for MemoryImageService {
    async fn create(&self, name: &str, target: &Descriptor) -> Result<()> {
        match self.images.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(BridgeError::AlreadyExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(target.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, name: &str, target: &Descriptor) -> Result<()> {
        match self.images.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                slot.insert(target.clone());
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(_) => Err(BridgeError::NotFound(name.to_string())),
        }
    }

    async fn get(&self, name: &str) -> Result<Option<Descriptor>> {
        Ok(self.images.get(name).map(|e| e.clone()))
    }
}

/// Resolves name paths registered ahead of time with [`MemoryNameResolver::seed`].
#[derive(Clone, Default)]
pub struct MemoryNameResolver {
    entries: Arc<DashMap<String, (Cid, Vec<u8>)>>,
}

impl MemoryNameResolver {
    /// A fresh, empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` to resolve to `bytes`, addressed by `bytes`'s digest.
    pub fn seed(&self, path: &str, bytes: Vec<u8>) {
        let digest = cas_core::Digest::of(&bytes);
        let cid = digest_to_cid(&digest);
        self.entries.insert(path.to_string(), (cid, bytes));
    }
}

#[async_trait]
impl NameResolver for MemoryNameResolver {
    async fn resolve_bytes(&self, path: &str) -> Result<(Cid, Vec<u8>)> {
        self.entries
            .get(path)
            .map(|e| e.clone())
            .ok_or_else(|| BridgeError::NotFound(path.to_string()))
    }
}

/// A lease guard that does nothing on release; pairs with [`NoopGcLease`].
pub struct NoopLeaseGuard;

impl LeaseGuard for NoopLeaseGuard {
    fn release(&mut self) {}
}

/// A GC lease collaborator that always grants immediately and never expires,
/// for tests that don't exercise lease timing.
#[derive(Clone, Default)]
pub struct NoopGcLease;

impl NoopGcLease {
    /// A fresh no-op lease source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GcLease for NoopGcLease {
    async fn acquire(&self, _key: &str) -> Result<Box<dyn LeaseGuard>> {
        Ok(Box::new(NoopLeaseGuard))
    }
}

/// Recover the digest cid_to_digest would report for `cid`, for assertions
/// in tests that only have the CID on hand.
pub fn digest_of_cid(cid: &Cid) -> Result<cas_core::Digest> {
    cid_to_digest(cid)
}
