//! End-to-end scenarios against the bridge's public surface, one test per
//! scenario this workspace tracks.

use cas_bridge::{ContentStoreBridge, Converter, Puller, WriterOpts};
use cas_core::{
    BlockService, Descriptor, DescriptorBuilder, Digest, GcLease, ImageService, Manifest,
    ManifestBuilder, MediaType, PinRegistry, BlobProvider,
};
use cas_testkit::{
    MemoryBlobProvider, MemoryBlockService, MemoryImageService, MemoryPinRegistry, NoopGcLease,
};
use std::sync::Arc;

fn fresh_bridge() -> ContentStoreBridge {
    ContentStoreBridge::new(
        Arc::new(MemoryBlockService::new()) as Arc<dyn BlockService>,
        Arc::new(MemoryPinRegistry::new()) as Arc<dyn PinRegistry>,
    )
}

fn descriptor_for(media_type: MediaType, bytes: &[u8]) -> Descriptor {
    DescriptorBuilder::default()
        .media_type(media_type)
        .size(bytes.len() as i64)
        .digest(Digest::of(bytes).to_oci_string())
        .build()
        .unwrap()
}

/// S1: a single blob is written end to end and its digest is immediately
/// queryable through `info`.
#[tokio::test]
async fn s1_single_blob_ingest_is_immediately_readable() {
    let store = fresh_bridge();
    let mut writer = store
        .writer(WriterOpts { r#ref: "scenario-s1".to_string(), expected_descriptor: None })
        .await
        .unwrap();
    writer.write(b"a modest payload").await.unwrap();
    let digest = writer.commit(16, None).await.unwrap();

    let info = store.info(&digest).await.unwrap();
    assert_eq!(info.size, 16);

    let desc = descriptor_for(MediaType::ImageLayer, b"a modest payload");
    let reader = store.reader_at(&desc).await.unwrap();
    let mut buf = [0u8; 16];
    let n = reader.read_at(&mut buf, 0).await.unwrap();
    assert_eq!(&buf[..n], b"a modest payload");
}

/// S2: the digest/CID bijection holds for an arbitrary payload's digest, end
/// to end through the public API only.
#[test]
fn s2_digest_cid_round_trip_holds() {
    let digest = Digest::of(b"round trip payload");
    let cid = cas_core::digest_to_cid(&digest);
    let recovered = cas_core::cid_to_digest(&cid).unwrap();
    assert_eq!(digest, recovered);
    assert_eq!(cid.to_string(), cas_core::digest_to_cid(&recovered).to_string());
}

/// S3: a commit whose declared expected digest disagrees with the bytes
/// actually streamed is rejected and leaves no pin behind.
#[tokio::test]
async fn s3_expected_digest_mismatch_rejected() {
    let store = fresh_bridge();
    let mut writer = store
        .writer(WriterOpts { r#ref: "scenario-s3".to_string(), expected_descriptor: None })
        .await
        .unwrap();
    writer.write(b"actual bytes").await.unwrap();
    let wrong_digest = Digest::of(b"not the bytes above");
    let result = writer.commit(12, Some(&wrong_digest)).await;
    assert!(result.is_err());

    let mut pinned_digests = Vec::new();
    store.walk(&[], |entry| pinned_digests.push(entry.digest)).await.unwrap();
    assert!(pinned_digests.is_empty());
}

/// S4: opening a writer whose expected descriptor already has content in the
/// store short-circuits with `AlreadyExists`, never starting a second pipe.
#[tokio::test]
async fn s4_already_present_descriptor_short_circuits_open() {
    let store = fresh_bridge();
    let mut first = store
        .writer(WriterOpts { r#ref: "scenario-s4-first".to_string(), expected_descriptor: None })
        .await
        .unwrap();
    first.write(b"already here").await.unwrap();
    let digest = first.commit(12, None).await.unwrap();

    let desc = descriptor_for(MediaType::ImageLayer, b"already here");
    assert_eq!(desc.digest(), &digest.to_oci_string());

    let reopened = store
        .writer(WriterOpts {
            r#ref: "scenario-s4-second".to_string(),
            expected_descriptor: Some(desc),
        })
        .await;
    assert!(matches!(reopened, Err(cas_core::BridgeError::AlreadyExists(_))));
}

/// S5: converting a manifest re-ingests every child blob and rewrites the
/// manifest's digests to the destination store's addressing, without
/// touching the source.
#[tokio::test]
async fn s5_manifest_conversion_rewrites_all_digests() {
    let config_bytes = vec![5u8; 128];
    let layer_one = vec![1u8; 4096];
    let layer_two = vec![2u8; 8192];
    let config_desc = descriptor_for(MediaType::ImageConfig, &config_bytes);
    let layer_one_desc = descriptor_for(MediaType::ImageLayer, &layer_one);
    let layer_two_desc = descriptor_for(MediaType::ImageLayer, &layer_two);

    let source_manifest: Manifest = ManifestBuilder::default()
        .schema_version(cas_core::SCHEMA_VERSION)
        .config(config_desc.clone())
        .layers(vec![layer_one_desc.clone(), layer_two_desc.clone()])
        .build()
        .unwrap();
    let manifest_bytes = serde_json::to_vec_pretty(&source_manifest).unwrap();
    let manifest_desc = descriptor_for(MediaType::ImageManifest, &manifest_bytes);

    let source = MemoryBlobProvider::new();
    source.seed(&config_desc, config_bytes.clone());
    source.seed(&layer_one_desc, layer_one.clone());
    source.seed(&layer_two_desc, layer_two.clone());
    source.seed(&manifest_desc, manifest_bytes.clone());

    let block: Arc<dyn BlockService> = Arc::new(MemoryBlockService::new());
    let pins: Arc<dyn PinRegistry> = Arc::new(MemoryPinRegistry::new());
    let converter = Converter::new(Arc::clone(&block), Arc::clone(&pins));

    let new_root = converter.convert(&source, &manifest_desc).await.unwrap();
    assert_ne!(new_root.digest(), manifest_desc.digest());

    let new_root_digest: Digest = new_root.digest().parse().unwrap();
    let new_root_cid = cas_core::digest_to_cid(&new_root_digest);
    let mut raw = Vec::new();
    let mut stream = block.open_read(&new_root_cid).await.unwrap();
    tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut raw).await.unwrap();
    let rewritten: Manifest = serde_json::from_slice(&raw).unwrap();

    assert_eq!(rewritten.config().digest(), &Digest::of(&config_bytes).to_oci_string());
    assert_eq!(rewritten.layers()[0].digest(), &Digest::of(&layer_one).to_oci_string());
    assert_eq!(rewritten.layers()[1].digest(), &Digest::of(&layer_two).to_oci_string());
}

/// S6: a recursive pull pins the manifest, its config and every layer, and
/// records the image under its reference.
#[tokio::test]
async fn s6_recursive_pull_pins_everything_reachable() {
    let config_bytes = b"{\"architecture\":\"amd64\"}".to_vec();
    let layer_bytes = vec![9u8; 2048];
    let config_desc = descriptor_for(MediaType::ImageConfig, &config_bytes);
    let layer_desc = descriptor_for(MediaType::ImageLayer, &layer_bytes);

    let manifest: Manifest = ManifestBuilder::default()
        .schema_version(cas_core::SCHEMA_VERSION)
        .config(config_desc.clone())
        .layers(vec![layer_desc.clone()])
        .build()
        .unwrap();
    let manifest_bytes = serde_json::to_vec_pretty(&manifest).unwrap();
    let manifest_desc = descriptor_for(MediaType::ImageManifest, &manifest_bytes);

    let source = Arc::new(MemoryBlobProvider::new());
    source.seed(&config_desc, config_bytes);
    source.seed(&layer_desc, layer_bytes);
    source.seed(&manifest_desc, manifest_bytes);

    let block = Arc::new(MemoryBlockService::new());
    let pins = Arc::new(MemoryPinRegistry::new());
    let images = Arc::new(MemoryImageService::new());
    let lease = Arc::new(NoopGcLease::new());

    let puller = Puller::new(
        block as Arc<dyn BlockService>,
        pins.clone() as Arc<dyn PinRegistry>,
        source as Arc<dyn BlobProvider>,
        images.clone() as Arc<dyn ImageService>,
        lease as Arc<dyn GcLease>,
    );

    let root = puller.pull("scenario:s6", &manifest_desc).await.unwrap();
    assert_eq!(root.digest(), manifest_desc.digest());

    let pinned = pins.list().await.unwrap();
    assert_eq!(pinned.len(), 3);

    let recorded = images.get("scenario:s6").await.unwrap().unwrap();
    assert_eq!(recorded.digest(), manifest_desc.digest());
}
