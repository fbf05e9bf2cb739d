//! The collaborator surface: everything the bridge consumes but never
//! implements in production code (the peer host, its DHT/bitswap block
//! service, the pin registry, the runtime's image index, the GC lease).
//!
//! Split per the two named capabilities the bridge actually needs instead of
//! one duck-typed provider graph: [`BlockService`] is CID-keyed (the DAG
//! layer's native addressing), [`BlobProvider`] is descriptor-keyed (what the
//! converter's source side and the reader surface actually want). The bridge
//! itself implements `BlobProvider` on top of a `BlockService` via the
//! addressing law; it never asks a collaborator to be both.

use crate::error::Result;
use crate::model::Descriptor;
use async_trait::async_trait;
use cid::Cid;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// A boxed, owned, pinned async byte stream — the shape every streaming
/// collaborator method hands across the trait-object boundary.
pub type BoxAsyncRead = Pin<Box<dyn AsyncRead + Send>>;

/// What a DAG node looks like from the outside, without reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    /// Size in bytes, if the node is a file.
    pub size: u64,
    /// Whether the node is a directory rather than a file.
    pub is_directory: bool,
}

/// The DAG chunk size a [`BlockService`] implementation is expected to target
/// when splitting a blob into balanced-tree nodes. The core never chunks
/// anything itself — the collaborator does — but the constant is named here,
/// at the trait boundary, so it stays a fixed, visible parameter of the
/// contract rather than an implementation detail buried in a peer crate.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// The external block/DAG collaborator (libp2p + bitswap + DHT peer, in
/// production; an in-memory map in tests).
#[async_trait]
pub trait BlockService: Send + Sync {
    /// Stream `data` through the DAG chunker and balanced-tree builder,
    /// returning the resulting root CID.
    async fn add(&self, data: BoxAsyncRead) -> Result<Cid>;

    /// Stat a DAG node without reading its contents.
    async fn stat(&self, cid: &Cid) -> Result<NodeStat>;

    /// Whether a node for `cid` already exists.
    async fn has(&self, cid: &Cid) -> Result<bool>;

    /// Open a forward-reading byte stream over the node's contents.
    async fn open_read(&self, cid: &Cid) -> Result<BoxAsyncRead>;

    /// Remove a node. Does not touch pins; a pinned node's removal is the
    /// block service's own GC concern, not this call's.
    async fn remove(&self, cid: &Cid) -> Result<()>;
}

/// The pin sub-surface: the "what exists" index [`crate::model`]'s `walk`
/// iterates over.
#[async_trait]
pub trait PinRegistry: Send + Sync {
    /// Add a pin, protecting `cid` and its transitive closure from GC.
    async fn add(&self, cid: &Cid) -> Result<()>;

    /// Remove a pin.
    async fn remove(&self, cid: &Cid) -> Result<()>;

    /// List every currently pinned root.
    async fn list(&self) -> Result<Vec<Cid>>;

    /// Whether `cid` is currently pinned.
    async fn is_pinned(&self, cid: &Cid) -> Result<bool>;
}

/// A descriptor-keyed source of blob bytes: either an external registry
/// fetcher (the converter's source side) or the bridge's own store,
/// constructed from a [`BlockService`] via the addressing law.
#[async_trait]
pub trait BlobProvider: Send + Sync {
    /// Open a forward-reading stream over the blob named by `desc.digest`.
    async fn reader_at(&self, desc: &Descriptor) -> Result<BoxAsyncRead>;
}

/// The runtime's image-name index (`{name, target}` records), consulted and
/// mutated by the recursive pull orchestrator.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Create a new image record. Fails with `AlreadyExists` if `name` is
    /// already recorded — callers retry with [`Self::update`].
    async fn create(&self, name: &str, target: &Descriptor) -> Result<()>;

    /// Overwrite an existing image record. Fails with `NotFound` if `name`
    /// has no record — callers retry with [`Self::create`].
    async fn update(&self, name: &str, target: &Descriptor) -> Result<()>;

    /// Look up the current target descriptor for `name`, if any.
    async fn get(&self, name: &str) -> Result<Option<Descriptor>>;
}

/// Resolves a human-facing P2P name path (e.g. `/ipns/<name>/image` or
/// `/ipfs/<cid>`) to its terminal DAG node.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve `path` to the CID and raw bytes of the terminal node.
    /// Fails with `IsDirectory` if the terminal node is a directory.
    async fn resolve_bytes(&self, path: &str) -> Result<(Cid, Vec<u8>)>;
}

/// An RAII handle on a time-bounded GC deferral, held for the duration of a
/// `pull` so newly fetched blobs cannot be collected before the image record
/// references them.
pub trait LeaseGuard: Send {
    /// Release the lease. Called automatically on drop; safe to call
    /// (at most) once more explicitly for early release.
    fn release(&mut self);
}

/// Acquires [`LeaseGuard`]s keyed by an arbitrary caller-chosen string (the
/// ref being pulled, in practice).
#[async_trait]
pub trait GcLease: Send + Sync {
    /// Acquire a lease for `key`, bounded to some collaborator-defined
    /// duration.
    async fn acquire(&self, key: &str) -> Result<Box<dyn LeaseGuard>>;
}
