//! Debug CLI for the content store bridge.
//!
//! `digest-to-cid`/`cid-to-digest` are pure and exercise the addressing law
//! directly. `ingest` is a self-contained demo: it spins up a fresh
//! in-memory store for the process lifetime, runs a file through the real
//! writer state machine, and reports what the bridge would have recorded.
//! There is no persistent store wired into this binary, so two invocations
//! never share state — a real deployment wires [`cas_bridge::ContentStoreBridge`]
//! against a long-lived block service instead.

#![deny(unsafe_code)]

use cas_bridge::{ContentStoreBridge, WriterOpts};
use cas_core::{BlockService, PinRegistry};
use cas_testkit::{MemoryBlockService, MemoryPinRegistry};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "cas-cli", about = "Inspect the content store bridge's addressing law and run local demo ingests")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a `sha256:<hex>` (or bare hex) digest to its canonical CID.
    DigestToCid {
        digest: String,
    },
    /// Convert a CID back to its `sha256:<hex>` digest.
    CidToDigest {
        cid: String,
    },
    /// Ingest a local file through the writer state machine and print what
    /// was recorded.
    Ingest {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    cas_telemetry::init_json_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Command::DigestToCid { digest } => cmd_digest_to_cid(&digest)?,
        Command::CidToDigest { cid } => cmd_cid_to_digest(&cid)?,
        Command::Ingest { path } => cmd_ingest(&path).await?,
    }
    Ok(())
}

fn cmd_digest_to_cid(digest: &str) -> Result<(), Box<dyn std::error::Error>> {
    let digest: cas_core::Digest = digest.parse()?;
    let cid = cas_core::digest_to_cid(&digest);
    println!("{}", json!({ "digest": digest.to_oci_string(), "cid": cid.to_string() }));
    Ok(())
}

fn cmd_cid_to_digest(cid: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cid = cas_core::parse_cid(cid)?;
    let digest = cas_core::cid_to_digest(&cid)?;
    println!("{}", json!({ "cid": cid.to_string(), "digest": digest.to_oci_string() }));
    Ok(())
}

async fn cmd_ingest(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(path).await?;
    let store = ContentStoreBridge::new(
        Arc::new(MemoryBlockService::new()) as Arc<dyn BlockService>,
        Arc::new(MemoryPinRegistry::new()) as Arc<dyn PinRegistry>,
    );
    let mut writer = store
        .writer(WriterOpts { r#ref: path.display().to_string(), expected_descriptor: None })
        .await?;
    writer.write(&bytes).await?;
    let digest = writer.commit(bytes.len() as u64, None).await?;
    let info = store.info(&digest).await?;
    println!(
        "{}",
        json!({
            "path": path.display().to_string(),
            "digest": digest.to_oci_string(),
            "cid": cas_core::digest_to_cid(&digest).to_string(),
            "size": info.size,
        })
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_to_cid_then_back_is_identity() {
        let digest = cas_core::Digest::of(b"cli round trip");
        let cid = cas_core::digest_to_cid(&digest);
        let back = cas_core::cid_to_digest(&cid).unwrap();
        assert_eq!(digest, back);
    }

    #[tokio::test]
    async fn ingest_reports_digest_of_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        tokio::fs::write(&path, b"cli ingest demo").await.unwrap();
        cmd_ingest(&path).await.unwrap();
    }
}
