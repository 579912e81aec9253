//! Parallel ranged downloads into a local replica
//!
//! A remote object larger than one part is split into fixed-size ranges. Each
//! range becomes a [`DownloadPart`] task on the shared on-demand queue and
//! writes straight to its offset in the replica. The orchestrator waits for
//! every part to report back. If any part fails, every sibling is told to
//! stop and the orchestrator still waits for all of them before returning,
//! so no part keeps writing after the download is declared failed.

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::client::{ClientError, ObjectClient};
use common::object::{MetadataRecord, ObjectIdentity};
use common::worker::{DedupPolicy, Enqueued, OnDemandTask, Priority, TaskQueue};

use crate::local::stamp_times;

const COPY_CHUNK: usize = 64 * 1024;

/// One contiguous byte range of a download, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub number: u32,
    pub offset: u64,
    pub length: u64,
}

/// Split `[0, total)` into ranges of `part_size` bytes, the last one shorter
pub fn partition(total: u64, part_size: u64) -> Vec<PartRange> {
    let part_size = part_size.max(1);
    let mut parts = Vec::with_capacity(total.div_ceil(part_size) as usize);
    let mut offset = 0;
    let mut number = 1;
    while offset < total {
        let length = part_size.min(total - offset);
        parts.push(PartRange {
            number,
            offset,
            length,
        });
        offset += length;
        number += 1;
    }
    parts
}

#[derive(Debug, thiserror::Error)]
pub enum PartError {
    #[error("interrupted")]
    Interrupted,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("local i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("stream ended after {received} of {expected} bytes")]
    Short { expected: u64, received: u64 },
    #[error("part task was dropped before reporting")]
    Dropped,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download of {path} failed ({cause}): parts {failed:?} of {total} failed, {interrupted:?} interrupted")]
    PartialFailure {
        path: String,
        total: u32,
        failed: Vec<u32>,
        interrupted: Vec<u32>,
        cause: String,
    },
    #[error(transparent)]
    Part(#[from] PartError),
    #[error("local i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("downloaded {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },
}

impl DownloadError {
    /// The remote classification behind a single-part failure, if any
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            DownloadError::Part(PartError::Client(e)) => Some(e),
            _ => None,
        }
    }
}

struct PartOutcome {
    number: u32,
    result: Result<u64, PartError>,
}

/// Fetch one range and write it at its offset in `local_path`
///
/// `interrupted` is checked before any I/O and between chunks.
fn fetch_part(
    client: &dyn ObjectClient,
    identity: &ObjectIdentity,
    local_path: &Path,
    part: PartRange,
    interrupted: &AtomicBool,
) -> Result<u64, PartError> {
    if interrupted.load(Ordering::Acquire) {
        return Err(PartError::Interrupted);
    }

    let mut reader = client.get_object_range(identity, part.offset, part.length)?;
    let mut file = OpenOptions::new().write(true).open(local_path)?;
    file.seek(SeekFrom::Start(part.offset))?;

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut written = 0u64;
    while written < part.length {
        if interrupted.load(Ordering::Acquire) {
            return Err(PartError::Interrupted);
        }
        let want = (part.length - written).min(COPY_CHUNK as u64) as usize;
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(match ClientError::from_read_error(e) {
                    Ok(remote) => PartError::Client(remote),
                    Err(local) => PartError::Io(local),
                })
            }
        };
        file.write_all(&buf[..n])?;
        written += n as u64;
    }

    if written != part.length {
        return Err(PartError::Short {
            expected: part.length,
            received: written,
        });
    }
    Ok(written)
}

/// One queued range fetch
///
/// Reports exactly once: from `run`, from `cancelled` when the queue shuts
/// down first, or from `Drop` if the task is discarded some other way.
struct DownloadPart {
    name: String,
    client: Arc<dyn ObjectClient>,
    identity: ObjectIdentity,
    local_path: PathBuf,
    part: PartRange,
    interrupted: Arc<AtomicBool>,
    done: Option<flume::Sender<PartOutcome>>,
}

impl DownloadPart {
    fn signal(&mut self, result: Result<u64, PartError>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(PartOutcome {
                number: self.part.number,
                result,
            });
        }
    }
}

impl OnDemandTask for DownloadPart {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, worker: usize) -> anyhow::Result<()> {
        tracing::trace!(
            path = %self.identity,
            part = self.part.number,
            offset = self.part.offset,
            length = self.part.length,
            worker,
            "fetching part"
        );
        let result = fetch_part(
            self.client.as_ref(),
            &self.identity,
            &self.local_path,
            self.part,
            &self.interrupted,
        );
        let failure = match &result {
            Ok(_) | Err(PartError::Interrupted) => None,
            Err(e) => Some(e.to_string()),
        };
        self.signal(result);
        match failure {
            Some(e) => Err(anyhow::anyhow!("part {} of {}: {e}", self.part.number, self.identity)),
            None => Ok(()),
        }
    }

    fn cancelled(&mut self) {
        self.signal(Err(PartError::Interrupted));
    }
}

impl Drop for DownloadPart {
    fn drop(&mut self) {
        self.signal(Err(PartError::Dropped));
    }
}

/// Splits downloads into parts and runs them on a shared [`TaskQueue`]
#[derive(Debug, Clone)]
pub struct DownloadOrchestrator {
    client: Arc<dyn ObjectClient>,
    queue: Arc<TaskQueue>,
    part_size: u64,
}

impl DownloadOrchestrator {
    pub fn new(client: Arc<dyn ObjectClient>, queue: Arc<TaskQueue>, part_size: u64) -> Self {
        Self {
            client,
            queue,
            part_size: part_size.max(1),
        }
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Fill `local_path` with the content of `remote`
    ///
    /// The file must already exist. On success the replica carries the
    /// remote timestamps and the number of bytes written is returned; on
    /// failure its content is undefined and the caller must not trust it.
    pub fn download(
        &self,
        identity: &ObjectIdentity,
        remote: &MetadataRecord,
        local_path: &Path,
    ) -> Result<u64, DownloadError> {
        let total = remote.size();
        let parts = partition(total, self.part_size);

        let received = if parts.len() <= 1 {
            match parts.first() {
                Some(part) => fetch_part(
                    self.client.as_ref(),
                    identity,
                    local_path,
                    *part,
                    &AtomicBool::new(false),
                )?,
                None => 0,
            }
        } else {
            self.download_parts(identity, local_path, &parts)?
        };

        if received != total {
            return Err(DownloadError::Incomplete {
                expected: total,
                received,
            });
        }

        let file = OpenOptions::new().write(true).open(local_path)?;
        stamp_times(&file, remote.creation_time(), remote.last_write_time())?;

        tracing::debug!(path = %identity, size = total, parts = parts.len(), "download complete");
        Ok(received)
    }

    fn download_parts(
        &self,
        identity: &ObjectIdentity,
        local_path: &Path,
        parts: &[PartRange],
    ) -> Result<u64, DownloadError> {
        let (done_tx, done_rx) = flume::unbounded();
        let flags: Vec<Arc<AtomicBool>> = parts
            .iter()
            .map(|_| Arc::new(AtomicBool::new(false)))
            .collect();
        let interrupt_all = || {
            for flag in &flags {
                flag.store(true, Ordering::Release);
            }
        };

        for (part, flag) in parts.iter().zip(&flags) {
            let task = DownloadPart {
                name: format!("DownloadPart({identity}#{})", part.number),
                client: self.client.clone(),
                identity: identity.clone(),
                local_path: local_path.to_path_buf(),
                part: *part,
                interrupted: flag.clone(),
                done: Some(done_tx.clone()),
            };
            if self
                .queue
                .add_task(Box::new(task), Priority::Middle, DedupPolicy::Always)
                == Enqueued::Rejected
            {
                interrupt_all();
            }
        }
        drop(done_tx);

        let mut received = 0u64;
        let mut failed = Vec::new();
        let mut interrupted = Vec::new();
        let mut cause = None;

        for _ in 0..parts.len() {
            let Ok(outcome) = done_rx.recv() else {
                break;
            };
            match outcome.result {
                Ok(written) => received += written,
                Err(PartError::Interrupted) => interrupted.push(outcome.number),
                Err(error) => {
                    if failed.is_empty() {
                        tracing::warn!(
                            path = %identity,
                            part = outcome.number,
                            error = %error,
                            "part failed, interrupting siblings"
                        );
                        interrupt_all();
                        cause = Some(error.to_string());
                    }
                    failed.push(outcome.number);
                }
            }
        }

        if failed.is_empty() && interrupted.is_empty() {
            return Ok(received);
        }

        failed.sort_unstable();
        interrupted.sort_unstable();
        Err(DownloadError::PartialFailure {
            path: identity.to_string(),
            total: parts.len() as u32,
            failed,
            interrupted,
            cause: cause.unwrap_or_else(|| "download queue stopped".to_string()),
        })
    }
}
