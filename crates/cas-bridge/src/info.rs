//! The metadata surface over the pin set: `Info`, `Walk`, `Delete`, and the
//! always-rejecting `Update`.
//!
//! This store persists no per-blob timestamps (the block service only
//! stores chunks, the pin registry only stores roots), so `created_at` and
//! `updated_at` are fabricated fresh on every call. This is an acknowledged
//! weakness rather than a bug: callers that key their own bookkeeping off
//! these timestamps will see them move on every read.

use crate::clock::now_ms;
use cas_core::{BlockService, BridgeError, Digest, PinRegistry, Result};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// `{digest, size, created_at, updated_at}` for a single blob, re-measured
/// on every call rather than persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// The blob's content digest.
    pub digest: Digest,
    /// Size in bytes, as measured by the block service.
    pub size: u64,
    /// Always "now" at call time; see the module's weakness note.
    pub created_at_ms: u64,
    /// Always "now" at call time; see the module's weakness note.
    pub updated_at_ms: u64,
}

/// Fetch `{size, created_at, updated_at}` for the blob named by `digest`.
/// Fails with `NotFound` if the block service has no node for it.
#[instrument(skip(block))]
pub async fn info(block: &dyn BlockService, digest: &Digest) -> Result<BlobInfo> {
    let cid = cas_core::digest_to_cid(digest);
    let stat = block.stat(&cid).await?;
    let now = now_ms();
    Ok(BlobInfo { digest: *digest, size: stat.size, created_at_ms: now, updated_at_ms: now })
}

/// Always rejected: the store has no metadata layer to mutate labels
/// against, so no field update is ever legal.
#[instrument]
pub fn update(_digest: &Digest, _fields: &[String]) -> Result<BlobInfo> {
    Err(BridgeError::FailedPrecondition(
        "update is not supported: this store is immutable with respect to labels".to_string(),
    ))
}

/// Iterate the pin set, calling `info` on each pinned digest and passing the
/// result to `visit`. `filters` is accepted for interface parity with the
/// runtime's contract but ignored — there is no metadata layer for a label
/// filter to match against, and that is documented behaviour, not a bug.
#[instrument(skip(block, pins, visit))]
pub async fn walk<F>(
    block: &dyn BlockService,
    pins: &dyn PinRegistry,
    _filters: &[String],
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&BlobInfo),
{
    for cid in pins.list().await? {
        let digest = cas_core::cid_to_digest(&cid)?;
        let entry = info(block, &digest).await?;
        visit(&entry);
    }
    Ok(())
}

/// Remove the pin for `digest`. The underlying blocks may be garbage
/// collected later by the block service; this only touches the pin, not the
/// chunk graph.
#[instrument(skip(pins))]
pub async fn delete(pins: &dyn PinRegistry, digest: &Digest) -> Result<()> {
    let cid = cas_core::digest_to_cid(digest);
    pins.remove(&cid).await
}

/// Parse a digest out of an OCI-style `"sha256:<hex>"` string, for callers
/// that only have the wire form on hand.
pub fn parse_digest(s: &str) -> Result<Digest> {
    Digest::from_str(s)
}
