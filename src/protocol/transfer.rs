//! Transfer state of one GET or PUT exchange.
//!
//! A [`Transfer`] owns the open file, the in-memory object (if the profile
//! built one) and the single staging buffer. Dropping or resetting it
//! releases all three, so every exit path from a request frees them.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use tracing::{debug, error};

use crate::error::{ObexError, Result};

/// Object size declared by the peer or learned from the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObjectSize {
    /// Nothing declared yet
    #[default]
    Unset,
    /// LENGTH header or file size
    Known(u64),
    /// Body announced without a LENGTH; size only known at the end
    Streamed,
}

/// Staging state of one transfer
#[derive(Debug, Default)]
pub struct Transfer {
    file: Option<File>,
    memory: Option<Bytes>,
    buffer: Option<BytesMut>,
    offset: u64,
    size: ObjectSize,
    time: Option<i64>,
    finished: bool,
}

impl Transfer {
    /// Open `path` as the source of an outbound transfer.
    ///
    /// The staging buffer is only allocated for non-empty files.
    pub fn prepare_get(&mut self, path: &Path, tx_mtu: usize) -> Result<u64> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        self.file = Some(file);
        self.memory = None;
        self.offset = 0;
        self.size = ObjectSize::Known(size);
        self.buffer = (size > 0).then(|| BytesMut::zeroed(tx_mtu));

        debug!("Prepared {} ({} bytes) for GET", path.display(), size);
        Ok(size)
    }

    /// Serve a pre-built object instead of a file
    pub fn prepare_memory(&mut self, object: Bytes) -> u64 {
        let size = object.len() as u64;
        self.file = None;
        self.buffer = None;
        self.memory = Some(object);
        self.offset = 0;
        self.size = ObjectSize::Known(size);
        size
    }

    /// Pull the next outbound chunk of at most `tx_mtu` bytes.
    ///
    /// `Ok(None)` signals end of data; the staging buffer is released then,
    /// and also when reading fails.
    pub fn next_outbound(&mut self, tx_mtu: usize) -> Result<Option<Bytes>> {
        let chunk = if let Some(file) = self.file.as_mut() {
            match self.buffer.as_mut() {
                None => Bytes::new(),
                Some(buf) => {
                    let want = tx_mtu.min(buf.len());
                    let read = loop {
                        match file.read(&mut buf[..want]) {
                            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                            other => break other,
                        }
                    };
                    match read {
                        Ok(len) => Bytes::copy_from_slice(&buf[..len]),
                        Err(err) => {
                            error!("read(): {}", err);
                            self.buffer = None;
                            return Err(err.into());
                        },
                    }
                },
            }
        } else if let Some(object) = self.memory.as_ref() {
            let start = (self.offset as usize).min(object.len());
            let end = start + tx_mtu.min(object.len() - start);
            object.slice(start..end)
        } else {
            return Err(ObexError::Stream("no outbound source".to_string()));
        };

        if chunk.is_empty() {
            self.buffer = None;
            return Ok(None);
        }

        self.offset += chunk.len() as u64;
        Ok(Some(chunk))
    }

    /// Accept one inbound chunk.
    ///
    /// Without a destination the chunk is held in the staging buffer; only
    /// one chunk may be held at a time. With a destination the chunk is
    /// written through, retrying interrupted writes.
    pub fn receive_chunk(&mut self, chunk: &[u8], rx_mtu: usize) -> Result<()> {
        if chunk.len() > rx_mtu {
            return Err(ObexError::Stream(format!(
                "received {} bytes, more than rx_mtu {}",
                chunk.len(),
                rx_mtu
            )));
        }

        let Some(file) = self.file.as_mut() else {
            if chunk.is_empty() {
                return Ok(());
            }
            if self.buffer.is_some() {
                return Err(ObexError::Stream(
                    "got more data but there is still a pending buffer".to_string(),
                ));
            }

            let mut buf = BytesMut::with_capacity(rx_mtu);
            buf.extend_from_slice(chunk);
            self.buffer = Some(buf);
            self.offset = chunk.len() as u64;
            debug!("Stored {} bytes into temporary buffer", chunk.len());
            return Ok(());
        };

        let written = write_retrying(file, chunk)?;
        self.offset += written as u64;
        Ok(())
    }

    /// Open (create, truncate) the destination of an inbound transfer and
    /// flush any chunk held while it did not exist yet.
    pub fn open_destination(&mut self, path: &Path) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path).map_err(|err| {
            error!("open({}): {}", path.display(), err);
            ObexError::Forbidden(format!("cannot open {}: {err}", path.display()))
        })?;

        match self.buffer.take() {
            Some(pending) => {
                write_retrying(&mut file, &pending)?;
                debug!("Flushed {} buffered bytes", pending.len());
            },
            None => debug!("PUT request authorized, no buffered data"),
        }

        self.file = Some(file);
        Ok(())
    }

    /// Whether a file is open for this transfer
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    /// Whether a chunk is waiting in the staging buffer
    pub fn has_pending_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Whether any resource is held
    pub fn is_active(&self) -> bool {
        self.file.is_some() || self.memory.is_some() || self.buffer.is_some()
    }

    /// Bytes transferred so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Declared object size
    pub fn size(&self) -> ObjectSize {
        self.size
    }

    /// Record the declared object size
    pub fn set_size(&mut self, size: ObjectSize) {
        self.size = size;
    }

    /// Record the object timestamp
    pub fn set_time(&mut self, time: Option<i64>) {
        self.time = time;
    }

    /// Mark the end of the body as seen.
    ///
    /// A streamed object has no size to compare against, so this is the
    /// only way it becomes complete. The recorded TIME is applied to the
    /// destination here.
    pub fn finish(&mut self) {
        self.finished = true;
        if let (Some(file), Some(time)) = (self.file.as_ref(), self.time) {
            let Some(mtime) = u64::try_from(time)
                .ok()
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
            else {
                return;
            };
            if let Err(err) = file.set_modified(mtime) {
                debug!("Cannot set modification time: {}", err);
            }
        }
    }

    /// Whether the bytes moved match the declared size
    pub fn is_complete(&self) -> bool {
        match self.size {
            ObjectSize::Known(size) => self.offset == size,
            ObjectSize::Streamed => self.finished,
            ObjectSize::Unset => self.offset == 0,
        }
    }

    /// Release everything; safe to call repeatedly
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn write_retrying(file: &mut File, data: &[u8]) -> Result<usize> {
    let mut written = 0;
    while written < data.len() {
        match file.write(&data[written..]) {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
            Ok(n) => written += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(written)
}

/// Bytes available to unprivileged users on the file system holding `path`
#[cfg(unix)]
pub fn available_space(path: &Path) -> Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path)?;
    Ok(u64::from(stat.block_size()) * u64::from(stat.blocks_available()))
}

/// Bytes available on the file system holding `path` (not queried here)
#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> Result<u64> {
    Ok(u64::MAX)
}
