//! The writer/assembler: accepts frames in arrival order, places each in the
//! current RIFF segment, appends an in-memory index entry, closes segments
//! as they approach the size ceiling, and finalizes the file with correct
//! sizes, a master index, and (when compatible) a legacy index.
//!
//! Grounded on `avi2_write.c`: the mode matrix (strict-legacy / hybrid /
//! strict-modern), the fps rationalization policy, the header-placeholder /
//! finalize double emission, `AddIndexEntry`'s growth, and the legacy-index
//! merge-by-offset-order performed when a segment that carries `idx1` closes.

use crate::error::{AviError, AviResult};
use crate::fourcc::{self, FourCc, StreamTagKind};
use crate::fps::rationalize_fps;
use crate::header::{
    self, BitmapInfoHeader, ChunkIndexHeader, MainHeader, MasterIndexEntry, MasterIndexHeader,
    StreamHeader, WaveFormatEx,
};
use crate::index::StreamIndex;
use crate::io::PagedFile;
use std::io::{Read, Seek, Write};
use tracing::{debug, info};

/// Payload ceiling for a strict-legacy file, leaving headroom for the
/// trailing `idx1` (16 bytes/frame) so the whole file still fits under 2 GiB.
pub const LEGACY_CEILING: u64 = 2_000_000_000;
/// Soft per-segment ceiling in hybrid/strict-modern mode; crossing it closes
/// the segment and opens a new one rather than growing further.
pub const SEGMENT_SOFT_LIMIT: u64 = 1_000_000_000;

const HEADER_RESERVE_BASE: u64 = 2048;
const HEADER_RESERVE_PER_STREAM: u64 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Single RIFF segment, `idx1` only, ≤2 GiB, silently drops frames past
    /// the ceiling.
    StrictLegacy,
    /// One or more segments; first segment carries `idx1` *and* `indx`, every
    /// segment carries `ixNN`.
    Hybrid,
    /// One or more segments, all tagged `AVIX`, no `idx1`.
    StrictModern,
}

#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: FourCc,
}

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub name: String,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub bits_per_sample: u16,
    pub codec_format_tag: u16,
}

impl AudioConfig {
    fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    fn avg_bytes_per_sec(&self) -> u32 {
        self.samples_per_sec * self.block_align() as u32
    }
}

struct SegmentPatch {
    riff_start: u64,
    riff_size_off: u64,
    movi_size_off: u64,
}

struct StreamPatch {
    strh_length_off: u64,
    master_index_size_off: u64,
    master_index_header_off: u64,
    master_entries_written: u32,
}

pub struct AviWriter<F> {
    file: PagedFile<F>,
    mode: WriteMode,
    video_cfg: Option<VideoConfig>,
    audio_cfg: Option<AudioConfig>,
    video_index: StreamIndex,
    audio_index: StreamIndex,
    video_patch: Option<StreamPatch>,
    audio_patch: Option<StreamPatch>,
    avih_total_frames_off: Option<u64>,
    dmlh_total_frames_off: Option<u64>,
    segments: Vec<SegmentPatch>,
    movi_open: bool,
    any_frame_written: bool,
    poisoned: bool,
    legacy_ceiling: u64,
    segment_soft_limit: u64,
}

impl<F: Read + Write + Seek> AviWriter<F> {
    pub fn create(inner: F, mode: WriteMode) -> AviResult<Self> {
        Self::create_with_limits(inner, mode, LEGACY_CEILING, SEGMENT_SOFT_LIMIT)
    }

    /// Like [`Self::create`], but with the segment-rolling thresholds
    /// overridden. Only meant for tests that need to exercise multi-segment
    /// behavior without writing gigabytes of frame data.
    pub fn create_with_limits(inner: F, mode: WriteMode, legacy_ceiling: u64, segment_soft_limit: u64) -> AviResult<Self> {
        Ok(Self {
            file: PagedFile::from_inner(inner),
            mode,
            video_cfg: None,
            audio_cfg: None,
            video_index: StreamIndex::new("00dc"),
            audio_index: StreamIndex::new("01wb"),
            video_patch: None,
            audio_patch: None,
            avih_total_frames_off: None,
            dmlh_total_frames_off: None,
            segments: Vec::new(),
            movi_open: false,
            any_frame_written: false,
            poisoned: false,
            legacy_ceiling,
            segment_soft_limit,
        })
    }

    pub fn set_video(&mut self, name: &str, width: u32, height: u32, fps: f64, codec: FourCc) -> AviResult<()> {
        self.check_alive()?;
        if self.any_frame_written {
            return Err(AviError::FunctionOrder);
        }
        header::check_video_geometry(width, height, fps)?;
        self.video_cfg = Some(VideoConfig { name: name.to_string(), width, height, fps, codec });
        Ok(())
    }

    pub fn set_audio(
        &mut self,
        name: &str,
        channels: u16,
        samples_per_sec: u32,
        bits_per_sample: u16,
        codec_format_tag: u16,
    ) -> AviResult<()> {
        self.check_alive()?;
        if self.any_frame_written {
            return Err(AviError::FunctionOrder);
        }
        header::check_audio_format(channels, samples_per_sec, bits_per_sample)?;
        self.audio_cfg = Some(AudioConfig { name: name.to_string(), channels, samples_per_sec, bits_per_sample, codec_format_tag });
        Ok(())
    }

    pub fn write_video_frame(&mut self, data: &[u8], is_keyframe: bool) -> AviResult<usize> {
        self.check_alive()?;
        if self.video_cfg.is_none() {
            return Err(AviError::MissingVideo);
        }
        self.write_frame(data, true, is_keyframe)
    }

    pub fn write_audio_frame(&mut self, data: &[u8]) -> AviResult<usize> {
        self.check_alive()?;
        if self.audio_cfg.is_none() {
            return Err(AviError::BadParameter("no audio stream configured"));
        }
        self.write_frame(data, false, true)
    }

    fn write_frame(&mut self, data: &[u8], is_video: bool, is_keyframe: bool) -> AviResult<usize> {
        let result = self.write_frame_inner(data, is_video, is_keyframe);
        // Per the writer's failure-mode contract, any failure other than the
        // legacy-mode silent drop (which returns `Ok(0)`, not an error)
        // poisons the handle: subsequent writes return the same error rather
        // than continuing against a partially-written segment.
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn write_frame_inner(&mut self, data: &[u8], is_video: bool, is_keyframe: bool) -> AviResult<usize> {
        if data.is_empty() {
            return Err(AviError::BadParameter("frame buffer must be non-empty"));
        }

        if !self.movi_open {
            self.open_segment()?;
        }

        if !self.room_for(data.len() as u32)? {
            match self.mode {
                WriteMode::StrictLegacy => {
                    debug!(len = data.len(), "dropping frame: strict-legacy file at 2GiB ceiling");
                    return Ok(0);
                }
                WriteMode::Hybrid | WriteMode::StrictModern => {
                    self.roll_segment()?;
                }
            }
        }

        let segment = (self.segments.len() - 1) as u32;
        let kind = if is_video { StreamTagKind::CompressedVideo } else { StreamTagKind::Audio };
        let stream_num = if is_video { 0 } else { 1 };

        fourcc::write_stream_fcc(&mut self.file, stream_num, kind)?;
        fourcc::write_u32(&mut self.file, data.len() as u32)?;
        let payload_start = self.file.tell_abs()?;
        self.file.write_all(data)?;
        self.file.pad_if_odd(data.len() as u32)?;

        let seg_start = self.segments.last().unwrap().riff_start;
        let rel = u32::try_from(payload_start - seg_start).map_err(|_| AviError::Overflow)?;

        if is_video {
            self.video_index.append(rel, data.len() as u32, segment, is_keyframe)?;
        } else {
            self.audio_index.append(rel, data.len() as u32, segment, true)?;
        }
        self.any_frame_written = true;
        Ok(data.len())
    }

    fn room_for(&mut self, size: u32) -> AviResult<bool> {
        let pos = self.file.tell_abs()?;
        let seg_start = self.segments.last().unwrap().riff_start;
        let projected = pos + 8 + size as u64 + (size % 2) as u64;
        let limit = match self.mode {
            WriteMode::StrictLegacy => self.legacy_ceiling,
            WriteMode::Hybrid | WriteMode::StrictModern => seg_start + self.segment_soft_limit,
        };
        Ok(projected <= limit)
    }

    // ------------------------------------------------------------------
    // Segment lifecycle
    // ------------------------------------------------------------------

    fn open_segment(&mut self) -> AviResult<()> {
        let is_first = self.segments.is_empty();
        let riff_start = self.file.tell_abs()?;

        fourcc::RIFF.write(&mut self.file)?;
        let riff_size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        let form = if is_first && self.mode != WriteMode::StrictModern {
            fourcc::AVI_
        } else {
            fourcc::AVIX
        };
        form.write(&mut self.file)?;

        if is_first {
            self.write_header_list()?;
            self.write_info_list()?;
            self.pad_to_reserve(riff_start)?;
        }

        fourcc::LIST.write(&mut self.file)?;
        let movi_size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        fourcc::MOVI.write(&mut self.file)?;

        self.segments.push(SegmentPatch { riff_start, riff_size_off, movi_size_off });
        self.movi_open = true;
        Ok(())
    }

    fn pad_to_reserve(&mut self, riff_start: u64) -> AviResult<()> {
        let stream_count = self.video_cfg.is_some() as u64 + self.audio_cfg.is_some() as u64;
        let target = riff_start + 12 + HEADER_RESERVE_BASE + HEADER_RESERVE_PER_STREAM * stream_count;
        let pos = self.file.tell_abs()?;
        if pos < target {
            let gap = (target - pos) as u32;
            if gap >= 8 {
                fourcc::JUNK.write(&mut self.file)?;
                fourcc::write_u32(&mut self.file, gap - 8)?;
                self.file.write_all(&vec![0u8; (gap - 8) as usize])?;
            } else {
                self.file.write_all(&vec![0u8; gap as usize])?;
            }
        }
        Ok(())
    }

    fn roll_segment(&mut self) -> AviResult<()> {
        self.close_segment(false)?;
        self.open_segment()
    }

    /// Closes the current segment: writes `ixNN` chunk indexes, patches the
    /// master-index slot reserved for this segment, patches `movi`/`RIFF`
    /// sizes, and (only for segment 0, only in modes that carry one) emits
    /// the merged legacy `idx1`.
    fn close_segment(&mut self, is_final: bool) -> AviResult<()> {
        let seg_idx = (self.segments.len() - 1) as u32;
        let write_master = matches!(self.mode, WriteMode::Hybrid | WriteMode::StrictModern);

        if write_master {
            if self.video_cfg.is_some() {
                self.write_chunk_index(seg_idx, 0, true)?;
            }
            if self.audio_cfg.is_some() {
                self.write_chunk_index(seg_idx, 1, false)?;
            }
        }

        let write_legacy = seg_idx == 0 && matches!(self.mode, WriteMode::StrictLegacy | WriteMode::Hybrid);
        if write_legacy {
            self.write_legacy_index()?;
        }

        self.patch_segment_sizes(seg_idx)?;

        if is_final {
            self.patch_frame_totals()?;
        }
        Ok(())
    }

    fn write_chunk_index(&mut self, segment: u32, stream_num: u32, is_video: bool) -> AviResult<()> {
        let index_ref = if is_video { &self.video_index } else { &self.audio_index };
        let entries: Vec<_> = index_ref.iter_segment(segment).map(|(i, e)| (i, *e)).collect();
        let segment_total_bytes: u64 = entries.iter().map(|(_, e)| e.size() as u64).sum();
        if entries.is_empty() {
            return Ok(());
        }

        let chunk_tag_start = self.file.tell_abs()?;
        fourcc::write_stream_fcc(&mut self.file, stream_num, StreamTagKind::ChunkIndex)?;
        let chunk_size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        let body_start = self.file.tell_abs()?;

        let seg_start = self.segments[segment as usize].riff_start;
        let data_tag = fourcc::make_stream_fcc(stream_num, if is_video { StreamTagKind::CompressedVideo } else { StreamTagKind::Audio })?;
        let cih = ChunkIndexHeader {
            longs_per_entry: 2,
            index_sub_type: 0,
            index_type: header::AVI_INDEX_OF_CHUNKS,
            entries_in_use: entries.len() as u32,
            chunk_id: data_tag,
            base_offset: seg_start,
        };
        cih.write(&mut self.file)?;

        let mut total_duration = 0u64;
        for (_, e) in &entries {
            let mut size = e.size();
            if !e.is_keyframe() {
                size |= header::StdIndexEntry::NOT_KEYFRAME_BIT;
            }
            header::StdIndexEntry { dw_offset: e.offset, dw_size: size }.write(&mut self.file)?;
            total_duration += 1;
        }

        let body_end = self.file.tell_abs()?;
        let chunk_size = (body_end - body_start) as u32;
        self.file.pad_if_odd(chunk_size)?;
        let resume = self.file.tell_abs()?;

        self.file.seek_abs(chunk_size_off)?;
        fourcc::write_u32(&mut self.file, chunk_size)?;
        self.file.seek_abs(resume)?;

        // Patch this stream's next free master-index slot.
        let patch = if is_video { self.video_patch.as_mut() } else { self.audio_patch.as_mut() };
        if let Some(patch) = patch {
            if patch.master_entries_written >= header::MASTER_INDEX_MAX_ENTRIES {
                return Err(AviError::TooManySegments);
            }
            let slot_off = patch.master_index_header_off
                + header::MASTER_INDEX_HEADER_SIZE as u64
                + patch.master_entries_written as u64 * header::MASTER_INDEX_ENTRY_SIZE as u64;
            let duration = if is_video {
                total_duration as u32
            } else {
                let audio_cfg = self.audio_cfg.as_ref().expect("audio configured");
                (segment_total_bytes / audio_cfg.block_align().max(1) as u64) as u32
            };
            self.file.seek_abs(slot_off)?;
            MasterIndexEntry { qw_offset: chunk_tag_start, dw_size: chunk_size, dw_duration: duration }.write(&mut self.file)?;

            let header_off = patch.master_index_header_off;
            patch.master_entries_written += 1;
            let entries_in_use = patch.master_entries_written;
            self.file.seek_abs(header_off + 4)?;
            fourcc::write_u32(&mut self.file, entries_in_use)?;
        }

        self.file.seek_abs(resume)?;
        Ok(())
    }

    /// Merges the video and audio in-memory indexes (segment 0 only) into a
    /// single `idx1` ordered by file position, matching how a legacy reader
    /// expects to walk them.
    fn write_legacy_index(&mut self) -> AviResult<()> {
        let mut rows: Vec<(FourCc, u32, u32, bool)> = Vec::new();
        for (_, e) in self.video_index.iter_segment(0) {
            rows.push((fourcc::make_stream_fcc(0, StreamTagKind::CompressedVideo)?, e.size(), e.offset, e.is_keyframe()));
        }
        for (_, e) in self.audio_index.iter_segment(0) {
            rows.push((fourcc::make_stream_fcc(1, StreamTagKind::Audio)?, e.size(), e.offset, true));
        }
        rows.sort_by_key(|r| r.2);

        if rows.is_empty() {
            return Ok(());
        }

        fourcc::IDX1.write(&mut self.file)?;
        let size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        let body_start = self.file.tell_abs()?;

        for (tag, size, offset, keyframe) in &rows {
            let flags = if *keyframe { header::AVIIF_KEYFRAME } else { 0 };
            // idx1 addresses the chunk tag, 8 bytes before the payload the
            // in-memory index stores.
            header::LegacyIndexEntry { ckid: *tag, flags, offset: offset.saturating_sub(8), size: *size }.write(&mut self.file)?;
        }

        let body_end = self.file.tell_abs()?;
        let size = (body_end - body_start) as u32;
        self.file.seek_abs(size_off)?;
        fourcc::write_u32(&mut self.file, size)?;
        self.file.seek_abs(body_end)?;
        Ok(())
    }

    fn patch_segment_sizes(&mut self, seg_idx: u32) -> AviResult<()> {
        let end = self.file.tell_abs()?;
        let seg = &self.segments[seg_idx as usize];
        let riff_size = (end - seg.riff_start - 8) as u32;
        let movi_size = (end - seg.movi_size_off - 4) as u32;

        self.file.seek_abs(seg.riff_size_off)?;
        fourcc::write_u32(&mut self.file, riff_size)?;
        self.file.seek_abs(seg.movi_size_off)?;
        fourcc::write_u32(&mut self.file, movi_size)?;
        self.file.seek_abs(end)?;
        Ok(())
    }

    fn patch_frame_totals(&mut self) -> AviResult<()> {
        if let Some(off) = self.avih_total_frames_off {
            self.file.seek_abs(off)?;
            fourcc::write_u32(&mut self.file, self.video_index.len() as u32)?;
        }
        if let Some(off) = self.dmlh_total_frames_off {
            self.file.seek_abs(off)?;
            fourcc::write_u32(&mut self.file, self.video_index.len() as u32)?;
        }
        if let Some(patch) = &self.video_patch {
            self.file.seek_abs(patch.strh_length_off)?;
            fourcc::write_u32(&mut self.file, self.video_index.len() as u32)?;
        }
        if let (Some(patch), Some(cfg)) = (&self.audio_patch, &self.audio_cfg) {
            let blocks = self.audio_index.total_bytes() / cfg.block_align().max(1) as u64;
            self.file.seek_abs(patch.strh_length_off)?;
            fourcc::write_u32(&mut self.file, blocks as u32)?;
        }

        if let Some(patch) = self.video_patch.take() {
            self.finalize_master_index(&patch)?;
            self.video_patch = Some(patch);
        }
        if let Some(patch) = self.audio_patch.take() {
            self.finalize_master_index(&patch)?;
            self.audio_patch = Some(patch);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Header list emission (placeholder pass)
    // ------------------------------------------------------------------

    fn write_header_list(&mut self) -> AviResult<()> {
        fourcc::LIST.write(&mut self.file)?;
        let hdrl_size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        fourcc::HDRL.write(&mut self.file)?;

        self.write_avih()?;
        if let Some(cfg) = self.video_cfg.clone() {
            self.write_strl_video(&cfg)?;
        }
        if let Some(cfg) = self.audio_cfg.clone() {
            self.write_strl_audio(&cfg)?;
        }

        if matches!(self.mode, WriteMode::Hybrid | WriteMode::StrictModern) {
            self.write_odml()?;
        }

        let end = self.file.tell_abs()?;
        let size = (end - hdrl_size_off - 4) as u32;
        self.file.seek_abs(hdrl_size_off)?;
        fourcc::write_u32(&mut self.file, size)?;
        self.file.seek_abs(end)?;
        Ok(())
    }

    fn write_avih(&mut self) -> AviResult<()> {
        fourcc::AVIH.write(&mut self.file)?;
        fourcc::write_u32(&mut self.file, header::MAIN_HEADER_SIZE)?;

        let stream_count = self.video_cfg.is_some() as u32 + self.audio_cfg.is_some() as u32;
        let mut flags = header::AVIF_ISINTERLEAVED;
        if matches!(self.mode, WriteMode::StrictLegacy | WriteMode::Hybrid) {
            flags |= header::AVIF_HASINDEX;
        }
        if matches!(self.mode, WriteMode::Hybrid | WriteMode::StrictModern) {
            flags |= header::AVIF_TRUSTCKTYPE;
        }

        let micro_sec_per_frame = self
            .video_cfg
            .as_ref()
            .map(|v| (1_000_000.0 / v.fps).round() as u32)
            .unwrap_or(0);

        let header_start = self.file.tell_abs()?;
        let h = MainHeader {
            micro_sec_per_frame,
            max_bytes_per_sec: 0,
            padding_granularity: 0,
            flags,
            total_frames: 0,
            initial_frames: 0,
            streams: stream_count,
            suggested_buffer_size: 0,
            width: self.video_cfg.as_ref().map(|v| v.width).unwrap_or(0),
            height: self.video_cfg.as_ref().map(|v| v.height).unwrap_or(0),
            reserved: [0; 4],
        };
        h.write(&mut self.file)?;
        self.avih_total_frames_off = Some(header_start + 16);
        Ok(())
    }

    fn write_strl_video(&mut self, cfg: &VideoConfig) -> AviResult<()> {
        let (scale, rate) = rationalize_fps(cfg.fps);
        fourcc::LIST.write(&mut self.file)?;
        let size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        fourcc::STRL.write(&mut self.file)?;

        fourcc::STRH.write(&mut self.file)?;
        fourcc::write_u32(&mut self.file, header::STREAM_HEADER_SIZE)?;
        let strh_start = self.file.tell_abs()?;
        let sh = StreamHeader {
            fcc_type: fourcc::VIDS,
            fcc_handler: cfg.codec,
            flags: 0,
            priority: 0,
            language: 0,
            initial_frames: 0,
            scale,
            rate,
            start: 0,
            length: 0,
            suggested_buffer_size: 0,
            quality: u32::MAX,
            sample_size: 0,
            frame_rect: [0, 0, cfg.width as i16, cfg.height as i16],
        };
        sh.write(&mut self.file)?;
        let strh_length_off = strh_start + 32; // fcc_type+fcc_handler+flags+priority+language+initial_frames+scale+rate+start, then length

        fourcc::STRF.write(&mut self.file)?;
        fourcc::write_u32(&mut self.file, header::BITMAP_INFO_HEADER_SIZE)?;
        let bih = BitmapInfoHeader {
            width: cfg.width as i32,
            height: cfg.height as i32,
            planes: 1,
            bit_count: 24,
            compression: cfg.codec,
            size_image: cfg.width * cfg.height * 3,
            x_pels_per_meter: 0,
            y_pels_per_meter: 0,
            clr_used: 0,
            clr_important: 0,
        };
        bih.write(&mut self.file)?;

        self.write_strn(&cfg.name)?;
        let (master_index_size_off, master_index_header_off) = self.write_master_index_placeholder(0)?;

        let end = self.file.tell_abs()?;
        let size = (end - size_off - 4) as u32;
        self.file.seek_abs(size_off)?;
        fourcc::write_u32(&mut self.file, size)?;
        self.file.seek_abs(end)?;

        self.video_patch = Some(StreamPatch { strh_length_off, master_index_size_off, master_index_header_off, master_entries_written: 0 });
        Ok(())
    }

    fn write_strl_audio(&mut self, cfg: &AudioConfig) -> AviResult<()> {
        fourcc::LIST.write(&mut self.file)?;
        let size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        fourcc::STRL.write(&mut self.file)?;

        fourcc::STRH.write(&mut self.file)?;
        fourcc::write_u32(&mut self.file, header::STREAM_HEADER_SIZE)?;
        let strh_start = self.file.tell_abs()?;
        let sh = StreamHeader {
            fcc_type: fourcc::AUDS,
            fcc_handler: FourCc::new([0; 4]),
            flags: 0,
            priority: 0,
            language: 0,
            initial_frames: 0,
            scale: cfg.block_align() as u32,
            rate: cfg.avg_bytes_per_sec(),
            start: 0,
            length: 0,
            suggested_buffer_size: 0,
            quality: u32::MAX,
            sample_size: cfg.block_align() as u32,
            frame_rect: [0, 0, 0, 0],
        };
        sh.write(&mut self.file)?;
        let strh_length_off = strh_start + 32;

        fourcc::STRF.write(&mut self.file)?;
        fourcc::write_u32(&mut self.file, header::WAVE_FORMAT_EX_SIZE)?;
        let wfx = WaveFormatEx {
            format_tag: cfg.codec_format_tag,
            channels: cfg.channels,
            samples_per_sec: cfg.samples_per_sec,
            avg_bytes_per_sec: cfg.avg_bytes_per_sec(),
            block_align: cfg.block_align(),
            bits_per_sample: cfg.bits_per_sample,
        };
        wfx.write(&mut self.file)?;

        self.write_strn(&cfg.name)?;
        let (master_index_size_off, master_index_header_off) = self.write_master_index_placeholder(1)?;

        let end = self.file.tell_abs()?;
        let size = (end - size_off - 4) as u32;
        self.file.seek_abs(size_off)?;
        fourcc::write_u32(&mut self.file, size)?;
        self.file.seek_abs(end)?;

        self.audio_patch = Some(StreamPatch { strh_length_off, master_index_size_off, master_index_header_off, master_entries_written: 0 });
        Ok(())
    }

    fn write_strn(&mut self, name: &str) -> AviResult<()> {
        let mut bytes = name.as_bytes().to_vec();
        bytes.push(0);
        if bytes.len() % 2 == 1 {
            bytes.push(0);
        }
        fourcc::STRN.write(&mut self.file)?;
        fourcc::write_u32(&mut self.file, bytes.len() as u32)?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    /// Reserves a 24-byte `indx` header plus 128 16-byte entry slots. The
    /// `indx` chunk's declared size covers the full reservation until
    /// [`Self::finalize_master_index`] shrinks it down to the entries
    /// actually used and marks the remainder `JUNK` at close time.
    ///
    /// Returns `(size_field_off, header_off)`; both are `0` in modes that
    /// carry no master index.
    fn write_master_index_placeholder(&mut self, stream_num: u32) -> AviResult<(u64, u64)> {
        if !matches!(self.mode, WriteMode::Hybrid | WriteMode::StrictModern) {
            return Ok((0, 0));
        }
        fourcc::INDX.write(&mut self.file)?;
        let size_off = self.file.tell_abs()?;
        let header_reserved_size = header::MASTER_INDEX_HEADER_SIZE
            + header::MASTER_INDEX_ENTRY_SIZE * header::MASTER_INDEX_MAX_ENTRIES;
        fourcc::write_u32(&mut self.file, header_reserved_size)?;
        let header_off = self.file.tell_abs()?;

        let kind = StreamTagKind::ChunkIndex;
        let chunk_id = fourcc::make_stream_fcc(stream_num, kind)?;
        let mih = MasterIndexHeader {
            longs_per_entry: 4,
            index_sub_type: 0,
            index_type: header::AVI_INDEX_OF_INDEXES,
            entries_in_use: 0,
            chunk_id,
        };
        mih.write(&mut self.file)?;
        self.file.write_all(&vec![0u8; (header::MASTER_INDEX_ENTRY_SIZE * header::MASTER_INDEX_MAX_ENTRIES) as usize])?;
        Ok((size_off, header_off))
    }

    /// Shrinks a stream's `indx` chunk to the entries actually written and
    /// marks the unused reserved tail `JUNK`, so the on-disk footprint
    /// reserved up front is unchanged but the declared size only covers
    /// real entries.
    fn finalize_master_index(&mut self, patch: &StreamPatch) -> AviResult<()> {
        if patch.master_index_header_off == 0 {
            return Ok(());
        }
        let used = patch.master_entries_written;
        let used_size = header::MASTER_INDEX_HEADER_SIZE + used * header::MASTER_INDEX_ENTRY_SIZE;
        self.file.seek_abs(patch.master_index_size_off)?;
        fourcc::write_u32(&mut self.file, used_size)?;

        let remaining = header::MASTER_INDEX_MAX_ENTRIES - used;
        if remaining > 0 {
            let junk_off = patch.master_index_header_off
                + header::MASTER_INDEX_HEADER_SIZE as u64
                + used as u64 * header::MASTER_INDEX_ENTRY_SIZE as u64;
            let junk_size = remaining * header::MASTER_INDEX_ENTRY_SIZE - 8;
            self.file.seek_abs(junk_off)?;
            fourcc::JUNK.write(&mut self.file)?;
            fourcc::write_u32(&mut self.file, junk_size)?;
        }
        Ok(())
    }

    fn write_odml(&mut self) -> AviResult<()> {
        fourcc::LIST.write(&mut self.file)?;
        let size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        fourcc::ODML.write(&mut self.file)?;

        fourcc::DMLH.write(&mut self.file)?;
        fourcc::write_u32(&mut self.file, 4)?;
        let off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        self.dmlh_total_frames_off = Some(off);

        let end = self.file.tell_abs()?;
        let size = (end - size_off - 4) as u32;
        self.file.seek_abs(size_off)?;
        fourcc::write_u32(&mut self.file, size)?;
        self.file.seek_abs(end)?;
        Ok(())
    }

    fn write_info_list(&mut self) -> AviResult<()> {
        fourcc::LIST.write(&mut self.file)?;
        let size_off = self.file.tell_abs()?;
        fourcc::write_u32(&mut self.file, 0)?;
        fourcc::INFO.write(&mut self.file)?;

        let software = b"ravi-core\0";
        fourcc::ISFT.write(&mut self.file)?;
        fourcc::write_u32(&mut self.file, software.len() as u32)?;
        self.file.write_all(software)?;
        self.file.pad_if_odd(software.len() as u32)?;

        let end = self.file.tell_abs()?;
        let size = (end - size_off - 4) as u32;
        self.file.seek_abs(size_off)?;
        fourcc::write_u32(&mut self.file, size)?;
        self.file.seek_abs(end)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn check_alive(&self) -> AviResult<()> {
        if self.poisoned {
            return Err(AviError::StructBad);
        }
        Ok(())
    }

    pub fn close(mut self) -> AviResult<F> {
        let result = (|| {
            if !self.movi_open {
                self.open_segment()?;
            }
            self.close_segment(true)
        })();
        if result.is_err() {
            self.poisoned = true;
        }
        result?;
        info!(
            video_frames = self.video_index.len(),
            audio_frames = self.audio_index.len(),
            segments = self.segments.len(),
            "finalized AVI file"
        );
        Ok(self.file.into_inner())
    }
}
