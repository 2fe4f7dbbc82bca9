//! Public facade: a single handle type that opens either for reading or for
//! writing and exposes the narrow surface callers need, without leaking the
//! reader/writer split internally.
//!
//! Grounded on the classic `AVIStreamOpen`/`AVIFileOpen` entry points, which
//! likewise hand back one opaque handle regardless of mode and reject
//! operations that don't match how the handle was opened.

use crate::error::{AviError, AviResult};
use crate::fourcc::FourCc;
use crate::reader::{AviReader, ContainerInfo, OpenOptions};
use crate::writer::{AviWriter, WriteMode};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

enum Mode<F> {
    Reading(AviReader<F>),
    Writing(AviWriter<F>),
    /// Set only while `close()`/`Drop` is tearing the handle down.
    Closed,
}

/// A single AVI container handle, opened either for reading or for writing.
pub struct AviContainer<F> {
    mode: Mode<F>,
}

impl AviContainer<File> {
    pub fn open_read(path: impl AsRef<Path>) -> AviResult<Self> {
        Self::open_read_with(path, OpenOptions::default())
    }

    pub fn open_read_with(path: impl AsRef<Path>, opts: OpenOptions) -> AviResult<Self> {
        let file = crate::io::PagedFile::open_read(&path)?;
        let reader = AviReader::open(file.into_inner(), opts)?;
        Ok(Self { mode: Mode::Reading(reader) })
    }

    pub fn create_write(path: impl AsRef<Path>, write_mode: WriteMode) -> AviResult<Self> {
        let file = crate::io::PagedFile::create_write(&path)?;
        let writer = AviWriter::create(file.into_inner(), write_mode)?;
        Ok(Self { mode: Mode::Writing(writer) })
    }
}

impl<F: Read + Write + Seek> AviContainer<F> {
    pub fn open_reader(inner: F, opts: OpenOptions) -> AviResult<Self> {
        Ok(Self { mode: Mode::Reading(AviReader::open(inner, opts)?) })
    }

    pub fn create_writer(inner: F, write_mode: WriteMode) -> AviResult<Self> {
        Ok(Self { mode: Mode::Writing(AviWriter::create(inner, write_mode)?) })
    }

    /// Like [`Self::create_writer`], but with the segment-rolling thresholds
    /// overridden. Only meant for tests exercising multi-segment behavior
    /// without writing gigabytes of frame data.
    pub fn create_writer_with_limits(
        inner: F,
        write_mode: WriteMode,
        legacy_ceiling: u64,
        segment_soft_limit: u64,
    ) -> AviResult<Self> {
        Ok(Self { mode: Mode::Writing(AviWriter::create_with_limits(inner, write_mode, legacy_ceiling, segment_soft_limit)?) })
    }

    fn reader(&self) -> AviResult<&AviReader<F>> {
        match &self.mode {
            Mode::Reading(r) => Ok(r),
            _ => Err(AviError::WrongMode),
        }
    }

    fn reader_mut(&mut self) -> AviResult<&mut AviReader<F>> {
        match &mut self.mode {
            Mode::Reading(r) => Ok(r),
            _ => Err(AviError::WrongMode),
        }
    }

    fn writer_mut(&mut self) -> AviResult<&mut AviWriter<F>> {
        match &mut self.mode {
            Mode::Writing(w) => Ok(w),
            _ => Err(AviError::WrongMode),
        }
    }

    // -- read mode ------------------------------------------------------

    pub fn info(&self) -> AviResult<ContainerInfo> {
        Ok(self.reader()?.info())
    }

    pub fn video_frame_count(&self) -> AviResult<usize> {
        Ok(self.reader()?.video_frame_count())
    }

    pub fn audio_frame_count(&self) -> AviResult<usize> {
        Ok(self.reader()?.audio_frame_count())
    }

    pub fn seek_start(&mut self) -> AviResult<()> {
        self.reader_mut()?.seek_start();
        Ok(())
    }

    pub fn read_video_frame(&mut self, buf: &mut Vec<u8>) -> AviResult<bool> {
        self.reader_mut()?.read_video_frame(buf)
    }

    pub fn read_audio_frame(&mut self, buf: &mut Vec<u8>) -> AviResult<bool> {
        self.reader_mut()?.read_audio_frame(buf)
    }

    /// Size of the next video frame without reading or advancing - the
    /// `buf = none` form of `read-video-frame`.
    pub fn video_frame_size(&self) -> AviResult<u32> {
        self.reader()?.video_frame_size()
    }

    pub fn audio_frame_size(&self) -> AviResult<u32> {
        self.reader()?.audio_frame_size()
    }

    pub fn video_frame_is_keyframe(&self, frame: usize) -> AviResult<Option<bool>> {
        Ok(self.reader()?.video_frame_is_keyframe(frame))
    }

    // -- write mode -------------------------------------------------------

    pub fn set_video(&mut self, name: &str, width: u32, height: u32, fps: f64, codec: FourCc) -> AviResult<()> {
        self.writer_mut()?.set_video(name, width, height, fps, codec)
    }

    pub fn set_audio(
        &mut self,
        name: &str,
        channels: u16,
        samples_per_sec: u32,
        bits_per_sample: u16,
        codec_format_tag: u16,
    ) -> AviResult<()> {
        self.writer_mut()?.set_audio(name, channels, samples_per_sec, bits_per_sample, codec_format_tag)
    }

    pub fn write_video_frame(&mut self, data: &[u8], is_keyframe: bool) -> AviResult<usize> {
        self.writer_mut()?.write_video_frame(data, is_keyframe)
    }

    pub fn write_audio_frame(&mut self, data: &[u8]) -> AviResult<usize> {
        self.writer_mut()?.write_audio_frame(data)
    }

    /// Finalizes a write-mode handle, patching sizes and indexes and
    /// returning the underlying file. A no-op `Ok` for a read-mode handle.
    pub fn close(mut self) -> AviResult<Option<F>> {
        match std::mem::replace(&mut self.mode, Mode::Closed) {
            Mode::Writing(w) => Ok(Some(w.close()?)),
            Mode::Reading(_) => Ok(None),
            Mode::Closed => Ok(None),
        }
    }
}

impl<F> Drop for AviContainer<F> {
    fn drop(&mut self) {
        // Readers need no teardown. Writers that were never explicitly
        // closed are simply dropped unfinalized - callers that need a
        // correct file on disk must call `close()`.
    }
}

/// Human-readable description of an [`AviError`], matching the original
/// implementation's `AVI_StrError` table.
pub fn error_string(err: &AviError) -> &'static str {
    crate::error::error_string(err)
}
