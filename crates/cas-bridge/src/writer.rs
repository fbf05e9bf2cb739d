//! The streaming ingest state machine.
//!
//! The caller sees a synchronous staged-write interface; underneath, bytes
//! are piped into a background task that drives the block service's DAG
//! chunker. The actual content address is only known once that task
//! finishes, which is why `commit` both closes the pipe and joins the task
//! before it can report a digest.

use crate::clock::now_ms;
use cas_core::{
    cid_to_digest, BlockService, BridgeError, Descriptor, Digest, IngestStatus, PinRegistry, Result,
};
use cid::Cid;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Duplex pipe capacity between the writer and its background ingest task:
/// large enough that a typical `write` call doesn't block on the consumer,
/// small enough not to buffer an entire blob in memory.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Options for [`Writer::open`].
#[derive(Debug, Clone)]
pub struct WriterOpts {
    /// A caller-chosen label for this write, used only for logging/status
    /// (e.g. `"convert-application/vnd.oci.image.config.v1+json-sha256:..."`).
    pub r#ref: String,
    /// If set and already present in the block service, `open` fails fast
    /// with `AlreadyExists` instead of starting a pipe.
    pub expected_descriptor: Option<Descriptor>,
}

#[derive(Debug)]
enum WriterState {
    Ready,
    Streaming,
    Committed { digest: Digest },
    Aborted,
}

/// A single in-flight or finished blob ingest.
///
/// Not safe for concurrent calls on the same instance; distinct writers are
/// independent and may run concurrently.
pub struct Writer {
    block: Arc<dyn BlockService>,
    pins: Arc<dyn PinRegistry>,
    r#ref: String,
    offset: u64,
    expected_size: Option<u64>,
    expected_digest: Option<Digest>,
    started_at_ms: u64,
    updated_at_ms: u64,
    state: WriterState,
    pipe_write: Option<DuplexStream>,
    ingest: Option<JoinHandle<Result<Cid>>>,
}

impl Writer {
    /// Open a writer. Applies the idempotence guard (4.3.1): if
    /// `opts.expected_descriptor` names a digest the block service already
    /// has, this fails with `AlreadyExists` without spawning a pipe.
    #[instrument(skip(block, pins, opts), fields(r#ref = %opts.r#ref))]
    pub async fn open(
        block: Arc<dyn BlockService>,
        pins: Arc<dyn PinRegistry>,
        opts: WriterOpts,
    ) -> Result<Self> {
        let mut expected_digest = None;
        if let Some(desc) = &opts.expected_descriptor {
            let digest = Digest::from_str(desc.digest())?;
            let cid = cas_core::digest_to_cid(&digest);
            if block.has(&cid).await? {
                return Err(BridgeError::AlreadyExists(desc.digest().clone()));
            }
            expected_digest = Some(digest);
        }
        let now = now_ms();
        let mut writer = Self {
            block,
            pins,
            r#ref: opts.r#ref,
            offset: 0,
            expected_size: opts.expected_descriptor.as_ref().and_then(|d| {
                let size = d.size();
                (size > 0).then_some(size as u64)
            }),
            expected_digest,
            started_at_ms: now,
            updated_at_ms: now,
            state: WriterState::Ready,
            pipe_write: None,
            ingest: None,
        };
        writer.truncate(0).await?;
        Ok(writer)
    }

    /// Only `n == 0` is supported: tears down any prior pipe/background task
    /// and spawns a fresh pair.
    #[instrument(skip(self), fields(r#ref = %self.r#ref))]
    pub async fn truncate(&mut self, n: u64) -> Result<()> {
        if n != 0 {
            return Err(BridgeError::FailedPrecondition(format!(
                "truncate only supports size=0, got {n}"
            )));
        }
        if matches!(self.state, WriterState::Committed { .. }) {
            return Err(BridgeError::FailedPrecondition(
                "cannot truncate a committed writer".to_string(),
            ));
        }
        self.teardown_pipe();
        let (tx, rx) = tokio::io::duplex(PIPE_CAPACITY);
        let block = Arc::clone(&self.block);
        self.ingest = Some(tokio::spawn(async move { block.add(Box::pin(rx)).await }));
        self.pipe_write = Some(tx);
        self.offset = 0;
        self.state = WriterState::Ready;
        Ok(())
    }

    /// Forward `p` to the pipe; bump the byte offset.
    #[instrument(skip(self, p), fields(r#ref = %self.r#ref, len = p.len()))]
    pub async fn write(&mut self, p: &[u8]) -> Result<usize> {
        match self.state {
            WriterState::Committed { .. } | WriterState::Aborted => {
                return Err(BridgeError::FailedPrecondition(
                    "write after close/commit".to_string(),
                ))
            }
            WriterState::Ready => self.state = WriterState::Streaming,
            WriterState::Streaming => {}
        }
        let pipe = self
            .pipe_write
            .as_mut()
            .expect("streaming writer always has an open pipe");
        if let Err(e) = pipe.write_all(p).await {
            warn!(error = %e, "background ingest task ended early");
            self.state = WriterState::Aborted;
            return Err(BridgeError::Io(e));
        }
        self.offset += p.len() as u64;
        self.updated_at_ms = now_ms();
        Ok(p.len())
    }

    /// Close the write end and wait for the background ingest. Rejects the
    /// commit (precondition failure) if the declared size or expected
    /// digest disagree with what was actually ingested. On success pins the
    /// resulting CID.
    #[instrument(skip(self, expected), fields(r#ref = %self.r#ref, size))]
    pub async fn commit(&mut self, size: u64, expected: Option<&Digest>) -> Result<Digest> {
        if matches!(self.state, WriterState::Committed { .. } | WriterState::Aborted) {
            return Err(BridgeError::FailedPrecondition(
                "commit called on a writer that is already committed or aborted".to_string(),
            ));
        }
        let offset = self.offset;
        self.close_pipe_write();
        let handle = self
            .ingest
            .take()
            .expect("a writer always has a live ingest task until commit/close");
        let cid = match handle.await {
            Ok(Ok(cid)) => cid,
            Ok(Err(e)) => {
                self.state = WriterState::Aborted;
                return Err(e);
            }
            Err(join_err) => {
                self.state = WriterState::Aborted;
                return Err(BridgeError::Cancelled(join_err.to_string()));
            }
        };
        let computed = cid_to_digest(&cid)?;
        if size > 0 && size != offset {
            self.state = WriterState::Aborted;
            return Err(BridgeError::FailedPrecondition(format!(
                "commit size {size} does not match {offset} bytes written"
            )));
        }
        if let Some(expected) = expected {
            if expected != &computed {
                self.state = WriterState::Aborted;
                return Err(BridgeError::FailedPrecondition(format!(
                    "commit expected digest {expected} but computed {computed}"
                )));
            }
        }
        self.pins.add(&cid).await?;
        info!(digest = %computed, "writer commit pinned");
        self.state = WriterState::Committed { digest: computed };
        Ok(computed)
    }

    /// Idempotent: cancels the background task and discards the pipe if the
    /// writer was still streaming; a no-op if already committed or aborted.
    #[instrument(skip(self), fields(r#ref = %self.r#ref))]
    pub fn close(&mut self) {
        if matches!(self.state, WriterState::Committed { .. } | WriterState::Aborted) {
            return;
        }
        self.teardown_pipe();
        self.state = WriterState::Aborted;
    }

    /// `{ref, offset, total, started_at, updated_at}`, reflecting live state.
    #[must_use]
    pub fn status(&self) -> IngestStatus {
        let digest = match &self.state {
            WriterState::Committed { digest } => Some(*digest),
            _ => None,
        };
        IngestStatus {
            offset: self.offset,
            expected_size: self.expected_size,
            digest,
            started_at_ms: self.started_at_ms,
            updated_at_ms: self.updated_at_ms,
        }
    }

    /// The committed digest. Fails with `FailedPrecondition` before commit.
    pub fn digest(&self) -> Result<Digest> {
        match &self.state {
            WriterState::Committed { digest } => Ok(*digest),
            _ => Err(BridgeError::FailedPrecondition(
                "digest is only valid after commit".to_string(),
            )),
        }
    }

    /// The expected digest declared at open time, if any — used by callers
    /// that want to commit with the writer's own opening precondition.
    #[must_use]
    pub fn expected_digest(&self) -> Option<&Digest> {
        self.expected_digest.as_ref()
    }

    fn close_pipe_write(&mut self) {
        // Dropping the duplex write half signals EOF to the paired read
        // half; the background task's `AsyncRead` then returns `Ok(0)`.
        self.pipe_write = None;
    }

    fn teardown_pipe(&mut self) {
        self.close_pipe_write();
        if let Some(handle) = self.ingest.take() {
            handle.abort();
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !matches!(self.state, WriterState::Committed { .. } | WriterState::Aborted) {
            self.teardown_pipe();
        }
    }
}
