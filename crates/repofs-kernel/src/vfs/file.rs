//! OverlayFile: an open file handle over the overlay.
//!
//! The handle holds the whole file in memory. Writes only touch the buffer;
//! [`OverlayFile::sync`] pushes a dirty buffer into the writable layer, never
//! the readable tree, so a handle seeded from remote content copies it up on
//! first flush.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::flags::OpenFlags;
use super::traits::Filesystem;
use repofs_types::{FsError, FsResult};

pub struct OverlayFile {
    path: PathBuf,
    buffer: Vec<u8>,
    position: usize,
    flags: OpenFlags,
    mode: u32,
    dirty: bool,
    store: Arc<dyn Filesystem>,
}

impl fmt::Debug for OverlayFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayFile")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("len", &self.buffer.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl OverlayFile {
    pub(crate) fn new(
        path: PathBuf,
        flags: OpenFlags,
        mode: u32,
        contents: Vec<u8>,
        store: Arc<dyn Filesystem>,
    ) -> Self {
        let position = if flags.append { contents.len() } else { 0 };
        Self {
            path,
            buffer: contents,
            position,
            flags,
            mode,
            dirty: false,
            store,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn check_readable(&self) -> FsResult<()> {
        if self.flags.readable {
            Ok(())
        } else {
            Err(FsError::permission_denied(&self.path))
        }
    }

    fn check_writable(&self) -> FsResult<()> {
        if self.flags.writable {
            Ok(())
        } else {
            Err(FsError::permission_denied(&self.path))
        }
    }

    /// Whole buffer, regardless of position.
    pub fn contents(&self) -> FsResult<&[u8]> {
        self.check_readable()?;
        Ok(&self.buffer)
    }

    /// Everything from the current position on; advances to the end.
    pub fn read_to_end(&mut self) -> FsResult<Vec<u8>> {
        self.check_readable()?;
        let start = self.position.min(self.buffer.len());
        let out = self.buffer[start..].to_vec();
        self.position = self.buffer.len();
        Ok(out)
    }

    /// Copy bytes at `offset` into `buf`, returning how many were read.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> FsResult<usize> {
        self.check_readable()?;
        if offset >= self.buffer.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.buffer.len() - offset);
        buf[..n].copy_from_slice(&self.buffer[offset..offset + n]);
        Ok(n)
    }

    /// Write at the current position (or the end, in append mode).
    pub fn write(&mut self, data: &[u8]) -> FsResult<usize> {
        let offset = if self.flags.append {
            self.buffer.len()
        } else {
            self.position
        };
        let n = self.write_at(offset, data)?;
        self.position = offset + n;
        Ok(n)
    }

    /// Write at `offset`, zero-filling any gap. Append mode ignores `offset`.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> FsResult<usize> {
        self.check_writable()?;
        let offset = if self.flags.append {
            self.buffer.len()
        } else {
            offset
        };
        let end = offset + data.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset..end].copy_from_slice(data);
        self.dirty = true;
        Ok(data.len())
    }

    pub fn truncate(&mut self, len: usize) -> FsResult<()> {
        self.check_writable()?;
        self.buffer.resize(len, 0);
        self.position = self.position.min(len);
        self.dirty = true;
        Ok(())
    }

    /// Flush a dirty buffer into the writable layer.
    pub async fn sync(&mut self) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        tracing::debug!(path = %self.path.display(), bytes = self.buffer.len(), "syncing file handle");
        self.store
            .write_with_mode(&self.path, &self.buffer, self.mode)
            .await?;
        self.dirty = false;
        Ok(())
    }

    pub async fn close(mut self) -> FsResult<()> {
        self.sync().await
    }
}
