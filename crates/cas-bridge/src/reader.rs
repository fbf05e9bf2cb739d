//! Wraps a DAG file node as a positional byte reader with a known size.
//!
//! The block service only ever hands back a forward-reading stream, so this
//! adapter tracks the last absolute offset it has produced and discards
//! bytes to catch up to any later, still-forward request. Container fetch
//! paths only ever read forward; this shortcut preserves the zero-copy
//! stream while meeting the positional-read shape the runtime expects.

use cas_core::{BlockService, BoxAsyncRead, BridgeError, Descriptor, Digest, Result};
use cid::Cid;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

struct OpenStream {
    stream: BoxAsyncRead,
    /// Absolute offset of the next byte the stream will yield.
    position: u64,
}

/// A positional reader over a single DAG node, opened lazily on first read.
pub struct Reader {
    block: Arc<dyn BlockService>,
    cid: Cid,
    size: u64,
    state: Mutex<Option<OpenStream>>,
}

impl Reader {
    /// Open a reader at `desc`. Fails with `IsDirectory` if the named node
    /// is a directory. If `desc.size() > 0` that declared size is trusted
    /// without measuring; otherwise the node is stat'd for its real size.
    pub async fn open(block: Arc<dyn BlockService>, desc: &Descriptor) -> Result<Self> {
        let digest = Digest::from_str(desc.digest())?;
        let cid = cas_core::digest_to_cid(&digest);
        let stat = block.stat(&cid).await?;
        if stat.is_directory {
            return Err(BridgeError::IsDirectory(desc.digest().clone()));
        }
        let declared = desc.size();
        let size = if declared > 0 { declared as u64 } else { stat.size };
        Ok(Self { block, cid, size, state: Mutex::new(None) })
    }

    /// The blob's size, as determined at open time.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Read up to `buf.len()` bytes starting at absolute offset `off`.
    /// Returns the number of bytes read (`0` at end of blob). Fails with
    /// `InvalidOffset` if `off` is behind the last position already
    /// produced.
    pub async fn read_at(&self, buf: &mut [u8], off: u64) -> Result<usize> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            let stream = self.block.open_read(&self.cid).await?;
            *guard = Some(OpenStream { stream, position: 0 });
        }
        let open = guard.as_mut().expect("just initialised above");
        if off < open.position {
            return Err(BridgeError::InvalidOffset(format!(
                "requested offset {off} is behind current position {}",
                open.position
            )));
        }
        if off > open.position {
            let mut discard = off - open.position;
            let mut scratch = [0u8; 8192];
            while discard > 0 {
                let want = discard.min(scratch.len() as u64) as usize;
                let n = open.stream.read(&mut scratch[..want]).await?;
                if n == 0 {
                    break;
                }
                discard -= n as u64;
                open.position += n as u64;
            }
        }
        let n = open.stream.read(buf).await?;
        open.position += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cas_testkit::MemoryBlockService;

    async fn seeded_reader(bytes: &[u8]) -> Reader {
        let block: Arc<dyn BlockService> = Arc::new(MemoryBlockService::new());
        let cid = block.add(Box::pin(std::io::Cursor::new(bytes.to_vec()))).await.unwrap();
        let digest = cas_core::cid_to_digest(&cid).unwrap();
        let desc = cas_core::DescriptorBuilder::default()
            .media_type(cas_core::MediaType::ImageLayer)
            .size(bytes.len() as i64)
            .digest(digest.to_oci_string())
            .build()
            .unwrap();
        Reader::open(block, &desc).await.unwrap()
    }

    #[tokio::test]
    async fn forward_monotonic_reads_concatenate_to_whole_blob() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let reader = seeded_reader(data).await;
        let mut out = Vec::new();
        let mut off = 0u64;
        let mut buf = [0u8; 7];
        loop {
            let n = reader.read_at(&mut buf, off).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            off += n as u64;
        }
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn backward_seek_is_rejected() {
        let data = b"0123456789";
        let reader = seeded_reader(data).await;
        let mut buf = [0u8; 4];
        reader.read_at(&mut buf, 4).await.unwrap();
        let err = reader.read_at(&mut buf, 0).await;
        assert!(matches!(err, Err(BridgeError::InvalidOffset(_))));
    }

    #[tokio::test]
    async fn skipping_ahead_discards_middle_bytes() {
        let data = b"abcdefghij";
        let reader = seeded_reader(data).await;
        let mut buf = [0u8; 3];
        let n = reader.read_at(&mut buf, 5).await.unwrap();
        assert_eq!(&buf[..n], b"fgh");
    }
}
