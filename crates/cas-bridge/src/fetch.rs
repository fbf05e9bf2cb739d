//! The recursive pull orchestrator: dispatches a pin/fetch/children handler
//! chain on a root descriptor, then creates or updates the runtime's image
//! record.
//!
//! Pin-on-fetch is recursive by construction of the handler chain, not by a
//! separate traversal — each newly discovered child goes through the same
//! chain, which is why [`Puller::dispatch`] returns a boxed future: an
//! `async fn` cannot call itself directly in Rust.

use cas_core::{
    Arch, BlobProvider, BlockService, BridgeError, Descriptor, Digest, GcLease, ImageService,
    ImageIndex, Manifest, MediaType, Os, PinRegistry, Result,
};
use futures::future::BoxFuture;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, instrument, warn};

use crate::writer::{Writer, WriterOpts};

/// Bounded retries for the image create/update race in step 2 of the pull.
const MAX_IMAGE_RETRIES: u32 = 8;

/// Orchestrates a recursive pull: fetch-handler chain, then image record
/// create/update, under a GC lease held for the whole operation.
pub struct Puller {
    block: Arc<dyn BlockService>,
    pins: Arc<dyn PinRegistry>,
    source: Arc<dyn BlobProvider>,
    images: Arc<dyn ImageService>,
    lease: Arc<dyn GcLease>,
}

impl Puller {
    /// Build a puller. `source` is the external provider new blobs are
    /// fetched from (a registry mirror, or another peer); `block`/`pins`
    /// name this node's own store.
    #[must_use]
    pub fn new(
        block: Arc<dyn BlockService>,
        pins: Arc<dyn PinRegistry>,
        source: Arc<dyn BlobProvider>,
        images: Arc<dyn ImageService>,
        lease: Arc<dyn GcLease>,
    ) -> Self {
        Self { block, pins, source, images, lease }
    }

    /// Pull `root_desc` under `r#ref`, pinning it and everything it
    /// transitively references, then recording `{name: r#ref, target:
    /// root_desc}` in the image service. The lease is released on every
    /// exit path, success or failure.
    #[instrument(skip(self, root_desc), fields(r#ref))]
    pub async fn pull(&self, r#ref: &str, root_desc: &Descriptor) -> Result<Descriptor> {
        let r#ref = normalize_ref(r#ref);
        let mut guard = self.lease.acquire(&r#ref).await?;
        let result = async {
            let root = self.dispatch(root_desc).await?;
            self.create_or_update(&r#ref, &root).await?;
            Ok(root)
        }
        .await;
        guard.release();
        result
    }

    /// Pin handler, fetch handler, children handler — in order, recursing
    /// into children discovered by the last stage.
    fn dispatch<'a>(&'a self, desc: &'a Descriptor) -> BoxFuture<'a, Result<Descriptor>> {
        Box::pin(async move {
            if is_schema1(desc.media_type()) {
                return Err(BridgeError::Unsupported(format!(
                    "docker schema 1 manifest rejected: {}",
                    desc.digest()
                )));
            }

            let digest = Digest::from_str(desc.digest())?;
            let cid = cas_core::digest_to_cid(&digest);
            self.pins.add(&cid).await?;
            info!(digest = %digest, "pinned");

            if !self.block.has(&cid).await? {
                let mut reader = self.source.reader_at(desc).await?;
                let opts = WriterOpts { r#ref: format!("pull-{}", desc.digest()), expected_descriptor: None };
                let mut writer = Writer::open(Arc::clone(&self.block), Arc::clone(&self.pins), opts).await?;
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = reader.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    writer.write(&buf[..n]).await?;
                }
                writer.commit(desc.size() as u64, Some(&digest)).await?;
            }

            if is_manifest(desc.media_type()) {
                let bytes = self.read_own(&cid).await?;
                let manifest: Manifest = serde_json::from_slice(&bytes)
                    .map_err(|e| BridgeError::Transport(format!("decoding pulled manifest: {e}")))?;
                self.dispatch(manifest.config()).await?;
                for layer in manifest.layers() {
                    self.dispatch(layer).await?;
                }
            } else if is_index(desc.media_type()) {
                let bytes = self.read_own(&cid).await?;
                let index: ImageIndex = serde_json::from_slice(&bytes)
                    .map_err(|e| BridgeError::Transport(format!("decoding pulled index: {e}")))?;
                if let Some(chosen) = select_manifest_for_current_platform(&index) {
                    self.dispatch(chosen).await?;
                }
            }

            Ok(desc.clone())
        })
    }

    async fn read_own(&self, cid: &cid::Cid) -> Result<Vec<u8>> {
        let mut stream = self.block.open_read(cid).await?;
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }

    /// Create the image record, falling back to update on `AlreadyExists`
    /// and back to create on `NotFound` (a racing delete), bounded and
    /// idempotent as the source's retry loop is.
    #[instrument(skip(self, target))]
    async fn create_or_update(&self, r#ref: &str, target: &Descriptor) -> Result<()> {
        let mut want_create = true;
        for attempt in 0..MAX_IMAGE_RETRIES {
            let result =
                if want_create { self.images.create(r#ref, target).await } else { self.images.update(r#ref, target).await };
            match result {
                Ok(()) => return Ok(()),
                Err(BridgeError::AlreadyExists(_)) if want_create => {
                    warn!(attempt, "image record exists, retrying as update");
                    want_create = false;
                }
                Err(BridgeError::NotFound(_)) if !want_create => {
                    warn!(attempt, "image record vanished, retrying as create");
                    want_create = true;
                }
                Err(e) => return Err(e),
            }
        }
        Err(BridgeError::Cancelled(format!(
            "image record create/update for {ref} did not converge after {MAX_IMAGE_RETRIES} attempts"
        )))
    }
}

/// Append `:latest` to a bare `<name>` reference
/// (`<name>[:<tag>|@<digest>]`). A reference already carrying a tag or a
/// digest is returned unchanged.
fn normalize_ref(r#ref: &str) -> String {
    if r#ref.contains('@') {
        return r#ref.to_string();
    }
    // A ':' after the last '/' is a tag; one before it is just a registry
    // port, so only look past the final path segment.
    let last_segment = r#ref.rsplit('/').next().unwrap_or(r#ref);
    if last_segment.contains(':') {
        r#ref.to_string()
    } else {
        format!("{ref}:latest")
    }
}

/// Docker's legacy, signature-wrapped manifest media type. Distinct from the
/// OCI `application/vnd.oci.image.manifest.v1+json` type despite both
/// containing the substring `manifest.v1` — matched verbatim, never by
/// substring, so the two are never confused.
const DOCKER_SCHEMA1_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+json";

/// Docker Schema 1 manifests are rejected uniformly at the pin step, before
/// any fetch or recursion is attempted.
fn is_schema1(media_type: &MediaType) -> bool {
    matches!(media_type, MediaType::Other(s) if s == DOCKER_SCHEMA1_MEDIA_TYPE)
}

fn is_manifest(media_type: &MediaType) -> bool {
    matches!(media_type, MediaType::ImageManifest)
        || matches!(media_type, MediaType::Other(s) if s == "application/vnd.docker.distribution.manifest.v2+json")
}

fn is_index(media_type: &MediaType) -> bool {
    matches!(media_type, MediaType::ImageIndex)
        || matches!(media_type, MediaType::Other(s) if s == "application/vnd.docker.distribution.manifest.list.v2+json")
}

fn current_arch() -> Arch {
    match std::env::consts::ARCH {
        "x86_64" => Arch::Amd64,
        "aarch64" => Arch::ARM64,
        "arm" => Arch::ARM,
        other => Arch::Other(other.to_string()),
    }
}

fn current_os() -> Os {
    match std::env::consts::OS {
        "linux" => Os::Linux,
        "macos" => Os::Darwin,
        "windows" => Os::Windows,
        other => Os::Other(other.to_string()),
    }
}

/// Filter an index's manifests by platform and limit to one, per the pull
/// spec's "filter by platform, limit to one manifest per index" rule.
/// Falls back to the first listed manifest if none declares a matching
/// platform, so an index with no platform metadata still resolves.
fn select_manifest_for_current_platform(index: &ImageIndex) -> Option<&Descriptor> {
    let arch = current_arch();
    let os = current_os();
    index
        .manifests()
        .iter()
        .find(|d| {
            d.platform()
                .as_ref()
                .map(|p| *p.architecture() == arch && *p.os() == os)
                .unwrap_or(false)
        })
        .or_else(|| index.manifests().first())
}
