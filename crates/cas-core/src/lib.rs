//! Addressing law, data model and collaborator trait surface for the
//! content store bridge.
//!
//! This crate never touches a network or a disk; it is the pure core that
//! `cas-bridge` composes against whatever peer host wires in the
//! [`traits::BlockService`], [`traits::PinRegistry`], [`traits::ImageService`],
//! [`traits::NameResolver`] and [`traits::GcLease`] implementations.

#![deny(unsafe_code)]

pub mod addressing;
pub mod error;
pub mod model;
pub mod traits;

pub use addressing::{cid_to_digest, digest_to_cid, parse_cid, Digest};
pub use error::{BridgeError, Result};
pub use model::{
    Arch, Descriptor, DescriptorBuilder, ImageIndex, IngestStatus, Manifest, ManifestBuilder,
    MediaType, Os, Platform, SCHEMA_VERSION,
};
pub use traits::{
    BlobProvider, BlockService, BoxAsyncRead, GcLease, ImageService, LeaseGuard, NodeStat,
    NameResolver, PinRegistry, DEFAULT_CHUNK_SIZE,
};
