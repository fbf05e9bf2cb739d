//! Maps a human-facing reference (a P2P name path) to a P2P descriptor.

use cas_core::{Descriptor, DescriptorBuilder, MediaType, NameResolver, Result};
use tracing::instrument;

/// `{name, descriptor}` returned by [`resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The reference as given by the caller.
    pub name: String,
    /// `{media_type: image-manifest, digest, size}` of the resolved node.
    pub descriptor: Descriptor,
}

/// Resolve `r#ref` (e.g. `"/ipns/<name>/image"` or `"/ipfs/<cid>"`) to its
/// terminal manifest descriptor. The resolver itself is responsible for
/// failing with `NotFound` on a dead end and `IsDirectory` if the terminal
/// node is a directory; this only packages the result.
#[instrument(skip(resolver))]
pub async fn resolve(resolver: &dyn NameResolver, r#ref: &str) -> Result<Resolved> {
    let (cid, bytes) = resolver.resolve_bytes(r#ref).await?;
    let digest = cas_core::cid_to_digest(&cid)?;
    let descriptor = DescriptorBuilder::default()
        .media_type(MediaType::ImageManifest)
        .size(bytes.len() as i64)
        .digest(digest.to_oci_string())
        .build()
        .expect("media_type, size and digest are always set");
    Ok(Resolved { name: r#ref.to_string(), descriptor })
}
