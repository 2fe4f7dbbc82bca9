//! Paged file I/O: a thin 64-bit-clean facade over the host filesystem plus
//! the per-handle "seek base" addend that lets the rest of the engine address
//! any byte of a multi-segment file using only 32-bit relative offsets.
//!
//! Grounded on the classic `MFILE`/`SeekBase` abstraction (`file64.c`) that
//! AVI toolkits use to paper over 32-bit-vs-64-bit seek support. Where that C
//! code branches on platform to get 64-bit seeks, this is unnecessary here:
//! `std::fs::File` plus `Seek`/`Read`/`Write` is already 64-bit-clean on
//! every target Rust supports, so the abstraction collapses to one code path
//! instead of one per platform.

use crate::error::{AviError, AviResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A file handle with an associated seek base.
///
/// `SeekBase` is the absolute offset of the first byte of the RIFF segment
/// currently being addressed. Relative positions (`u32`) are added to it to
/// form the absolute seek target; for legacy AVI 1.0 files the base is always
/// zero. The base is never modified implicitly - callers change it
/// (typically when opening a new segment) via [`PagedFile::set_seek_base`].
pub struct PagedFile<F> {
    inner: F,
    seek_base: u64,
}

impl PagedFile<File> {
    pub fn open_read(path: impl AsRef<Path>) -> AviResult<Self> {
        let file = File::open(path).map_err(|_| AviError::NotExist)?;
        Ok(Self { inner: file, seek_base: 0 })
    }

    pub fn create_write(path: impl AsRef<Path>) -> AviResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|_| AviError::CantCreate)?;
        Ok(Self { inner: file, seek_base: 0 })
    }
}

impl<F: Read + Write + Seek> PagedFile<F> {
    pub fn from_inner(inner: F) -> Self {
        Self { inner, seek_base: 0 }
    }

    /// Set the base; subsequent `seek_rel`/`tell_rel` calls are relative to it.
    pub fn set_seek_base(&mut self, new_base: u64) {
        self.seek_base = new_base;
    }

    pub fn seek_base(&self) -> u64 {
        self.seek_base
    }

    /// Seek to an absolute 64-bit position, bypassing the seek base entirely.
    pub fn seek_abs(&mut self, pos: u64) -> AviResult<u64> {
        Ok(self.inner.seek(SeekFrom::Start(pos))?)
    }

    /// Seek to `seek_base + offset`.
    pub fn seek_rel(&mut self, offset: u32) -> AviResult<()> {
        self.seek_abs(self.seek_base + offset as u64)?;
        Ok(())
    }

    /// Absolute position of the cursor.
    pub fn tell_abs(&mut self) -> AviResult<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Current position relative to the seek base. Errors if the cursor has
    /// drifted below the base or more than 4 GiB above it - callers must
    /// arrange for that never to happen.
    pub fn tell_rel(&mut self) -> AviResult<u32> {
        let abs = self.tell_abs()?;
        let rel = abs
            .checked_sub(self.seek_base)
            .ok_or(AviError::Overflow)?;
        u32::try_from(rel).map_err(|_| AviError::Overflow)
    }

    pub fn seek_current(&mut self, delta: i64) -> AviResult<u64> {
        Ok(self.inner.seek(SeekFrom::Current(delta))?)
    }

    pub fn len(&mut self) -> AviResult<u64> {
        let cur = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(cur))?;
        Ok(end)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> AviResult<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }

    pub fn write_all(&mut self, buf: &[u8]) -> AviResult<()> {
        self.inner.write_all(buf)?;
        Ok(())
    }

    pub fn get_u8(&mut self) -> AviResult<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn put_u8(&mut self, b: u8) -> AviResult<()> {
        self.write_all(&[b])
    }

    /// Writes a single zero pad byte if `size` is odd, per RIFF chunk alignment.
    pub fn pad_if_odd(&mut self, size: u32) -> AviResult<()> {
        if size % 2 == 1 {
            self.put_u8(0)?;
        }
        Ok(())
    }

    pub fn skip(&mut self, size: u32) -> AviResult<()> {
        self.seek_current(size as i64)?;
        Ok(())
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Read + Write + Seek> Read for PagedFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<F: Read + Write + Seek> Write for PagedFile<F> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<F: Read + Write + Seek> Seek for PagedFile<F> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}
