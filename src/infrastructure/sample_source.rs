//! Sample Source
//!
//! Reads raw input samples from a named pipe fed by an external producer.
//!
//! The pipe is opened once, read-write and non-blocking. Holding the write
//! side ourselves means the reader never sees EOF when the producer exits, so
//! a restarted producer is picked up without reopening. Each poll drains what
//! is buffered and keeps only the newest complete line.

use crate::domain::report::RawInputSample;
use crate::error::ResourceError;
use interprocess::os::unix::fifo_file::create_fifo;
use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tokio::net::unix::pipe;
use tracing::{debug, info, trace, warn};

/// Upper bound on bytes consumed per poll so one tick stays short
const MAX_READ_PER_POLL: usize = 4096;

/// Partial line length after which the buffered bytes are thrown away
const MAX_PENDING: usize = 1024;

/// Producer of raw input samples, polled once per relay tick
pub trait SampleSource {
    /// Newest sample, or `None` if nothing usable arrived. Never blocks.
    fn poll(&mut self) -> Option<RawInputSample>;
}

/// [`SampleSource`] backed by a filesystem FIFO
pub struct FifoSource {
    path: PathBuf,
    receiver: pipe::Receiver,
    pending: Vec<u8>,
}

impl FifoSource {
    /// Create the FIFO at `path` (or reuse an existing one) and open it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ResourceError> {
        let path = path.into();

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_fifo() => {
                debug!("Reusing existing FIFO at {}", path.display());
            }
            Ok(_) => return Err(ResourceError::NotAFifo { path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                create_fifo(&path, 0o666).map_err(|source| ResourceError::Create {
                    path: path.clone(),
                    source,
                })?;
                info!("Created sample FIFO at {}", path.display());
            }
            Err(source) => return Err(ResourceError::Create { path, source }),
        }

        let receiver = pipe::OpenOptions::new()
            .read_write(true)
            .open_receiver(&path)
            .map_err(|source| ResourceError::Open {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            receiver,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drain the pipe and return the newest complete line, if any.
    pub fn read_latest_line(&mut self) -> Result<Option<String>, ResourceError> {
        let mut chunk = [0u8; 512];
        let mut consumed = 0;

        while consumed < MAX_READ_PER_POLL {
            match self.receiver.try_read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    consumed += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ResourceError::Read(e)),
            }
        }

        Ok(take_latest_line(&mut self.pending))
    }

    /// Close the pipe and delete it from the filesystem.
    pub fn remove(self) {
        let Self { path, receiver, .. } = self;
        drop(receiver);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed sample FIFO at {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}

impl SampleSource for FifoSource {
    fn poll(&mut self) -> Option<RawInputSample> {
        let line = match self.read_latest_line() {
            Ok(line) => line?,
            Err(e) => {
                debug!("No sample this tick: {}", e);
                return None;
            }
        };

        match line.parse() {
            Ok(sample) => Some(sample),
            Err(e) => {
                trace!("Discarding sample {:?}: {}", line, e);
                None
            }
        }
    }
}

/// Split off every complete line in `pending` and return the last non-empty
/// one. An unterminated tail stays buffered for the next poll.
fn take_latest_line(pending: &mut Vec<u8>) -> Option<String> {
    let Some(end) = pending.iter().rposition(|&b| b == b'\n') else {
        if pending.len() > MAX_PENDING {
            debug!("Dropping {} bytes without a line break", pending.len());
            pending.clear();
        }
        return None;
    };

    let complete: Vec<u8> = pending.drain(..=end).collect();
    complete
        .split(|&b| b == b'\n')
        .map(|line| String::from_utf8_lossy(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .last()
}
