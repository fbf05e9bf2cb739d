//! Data model shared by every crate in the workspace.

use crate::addressing::Digest;
use serde::{Deserialize, Serialize};

/// OCI image manifest and descriptor types, re-exported so downstream crates
/// depend on one crate boundary instead of reaching into `oci_spec`
/// directly.
pub use oci_spec::image::{
    Arch, Descriptor, DescriptorBuilder, ImageIndex, ImageManifest as Manifest,
    ImageManifestBuilder as ManifestBuilder, MediaType, Os, Platform, SCHEMA_VERSION,
};

/// A point-in-time snapshot of an in-progress or finished ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatus {
    /// Bytes written so far.
    pub offset: u64,
    /// Declared total size, if known in advance.
    pub expected_size: Option<u64>,
    /// Digest computed over bytes written so far, once closed; `None` while
    /// still streaming.
    pub digest: Option<Digest>,
    /// Milliseconds since the Unix epoch when the write was opened.
    pub started_at_ms: u64,
    /// Milliseconds since the Unix epoch of the most recent write.
    pub updated_at_ms: u64,
}
