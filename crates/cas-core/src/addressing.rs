//! The digest <-> CID bijection.
//!
//! This store is addressed two ways at once: OCI descriptors name content by
//! `sha256:<hex>` digest, the block network names the same bytes by CID. The
//! two must agree on exactly one pair of bytes for exactly one CID, in both
//! directions, for as long as the store exists. Fixed for the store's
//! lifetime: CID v1, raw codec (0x55), multihash SHA2-256 (code 0x12).

use crate::error::BridgeError;
use cid::Cid;
use multihash::Multihash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Raw binary codec, as assigned in the multicodec table.
const RAW_CODEC: u64 = 0x55;
/// SHA2-256 multihash function code.
const SHA2_256_CODE: u64 = 0x12;
const DIGEST_SIZE: usize = 32;

/// A content digest: the SHA-256 hash of a blob's plaintext bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Wrap raw SHA-256 bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Compute the digest of `data`.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// The raw 32 hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Lowercase hex encoding of the hash bytes (no `sha256:` prefix).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// OCI-style `sha256:<hex>` rendering.
    #[must_use]
    pub fn to_oci_string(&self) -> String {
        format!("sha256:{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_oci_string())
    }
}

impl FromStr for Digest {
    type Err = BridgeError;

    /// Parses either `sha256:<hex>` or bare `<hex>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = match s.split_once(':') {
            Some(("sha256", rest)) => rest,
            Some((alg, _)) => return Err(BridgeError::UnsupportedAlgorithm(alg.to_string())),
            None => s,
        };
        let bytes = hex::decode(hex_part)
            .map_err(|e| BridgeError::MalformedDigest(format!("{s}: {e}")))?;
        let array: [u8; DIGEST_SIZE] = bytes
            .try_into()
            .map_err(|_| BridgeError::MalformedDigest(format!("{s}: expected 32 bytes")))?;
        Ok(Self(array))
    }
}

/// Convert a content digest to its canonical CID (v1, raw codec).
///
/// This is the forward half of the bijection: the result always round-trips
/// back through [`cid_to_digest`] to the same digest.
pub fn digest_to_cid(digest: &Digest) -> Cid {
    let mh = Multihash::wrap(SHA2_256_CODE, digest.as_bytes())
        .expect("32-byte sha2-256 digest always fits the multihash size limit");
    Cid::new_v1(RAW_CODEC, mh)
}

/// Recover the content digest that produced `cid`, per [`digest_to_cid`].
///
/// Rejects any CID that is not this store's canonical shape (wrong codec,
/// wrong hash function, or wrong digest length) rather than silently
/// reinterpreting it — a CID the bijection didn't mint is not this store's
/// concern to resolve.
pub fn cid_to_digest(cid: &Cid) -> Result<Digest, BridgeError> {
    if cid.codec() != RAW_CODEC {
        return Err(BridgeError::MalformedCid(format!(
            "unsupported codec 0x{:x}, expected raw (0x55)",
            cid.codec()
        )));
    }
    let mh = cid.hash();
    if mh.code() != SHA2_256_CODE {
        return Err(BridgeError::UnsupportedAlgorithm(format!(
            "multihash code 0x{:x}, expected sha2-256 (0x12)",
            mh.code()
        )));
    }
    let digest_bytes = mh.digest();
    let array: [u8; DIGEST_SIZE] = digest_bytes
        .try_into()
        .map_err(|_| BridgeError::MalformedCid("sha2-256 digest must be 32 bytes".to_string()))?;
    Ok(Digest(array))
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_oci_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a CID from its string form, translating parse failures into
/// [`BridgeError::MalformedCid`].
pub fn parse_cid(s: &str) -> Result<Cid, BridgeError> {
    Cid::try_from(s).map_err(|e| BridgeError::MalformedCid(format!("{s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bijection_roundtrip_known_vector() {
        let digest = Digest::of(b"hello world");
        let cid = digest_to_cid(&digest);
        let back = cid_to_digest(&cid).unwrap();
        assert_eq!(digest, back);
    }

    #[test]
    fn cid_has_expected_shape() {
        let digest = Digest::of(b"shape check");
        let cid = digest_to_cid(&digest);
        assert_eq!(cid.version(), cid::Version::V1);
        assert_eq!(cid.codec(), RAW_CODEC);
        assert_eq!(cid.hash().code(), SHA2_256_CODE);
    }

    #[test]
    fn rejects_wrong_codec() {
        let digest = Digest::of(b"dag-pb please");
        let mh = Multihash::wrap(SHA2_256_CODE, digest.as_bytes()).unwrap();
        let dagpb_cid = Cid::new_v1(0x70, mh);
        assert!(cid_to_digest(&dagpb_cid).is_err());
    }

    #[test]
    fn digest_string_roundtrip() {
        let digest = Digest::of(b"oci string form");
        let s = digest.to_oci_string();
        let parsed: Digest = s.parse().unwrap();
        assert_eq!(digest, parsed);
    }

    proptest! {
        #[test]
        fn bijection_roundtrip_arbitrary(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let digest = Digest::of(&bytes);
            let cid = digest_to_cid(&digest);
            let back = cid_to_digest(&cid).unwrap();
            prop_assert_eq!(digest, back);
        }
    }
}
