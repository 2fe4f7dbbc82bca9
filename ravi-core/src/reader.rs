//! The reader/parser: walks an AVI file, discovers every RIFF segment,
//! parses the header list and stream lists, and assimilates whichever index
//! form is present (legacy `idx1`, master+chunk `indx`/`ixNN`, or both) into
//! the in-memory index so random access to any frame is O(1).
//!
//! Grounded on `avi2_Read.c`: `WalkRiff` (segment discovery), `ParseAVIFile`
//! (top-level dispatch), `ParseHeaderList`/`ParseStreamList` (tolerant
//! parsing), `ParseLegacyIndex` (relative-vs-absolute detection),
//! `ChunkIndexHelper`/`ParseMasterIndex`/`ParseChunkIndex` (offset
//! normalization), and `GenerateIndex` (auto-index synthesis).

use crate::error::{AviError, AviResult};
use crate::fourcc::{self, FourCc};
use crate::header::{self, BitmapInfoHeader, MainHeader, StreamHeader, WaveFormatEx};
use crate::index::StreamIndex;
use crate::io::PagedFile;
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, Write};
use tracing::{debug, trace, warn};

pub const MAX_SEGMENTS: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub frame_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub channels: u16,
    pub samples_per_sec: u32,
    pub bits_per_sample: u16,
    pub format_tag: u16,
    pub block_align: u16,
    pub avg_bytes_per_sec: u32,
    pub frame_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub duration_us: i64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
    pub has_index: bool,
    pub segment_count: usize,
}

/// One segment's discovered bounds: absolute start of the `RIFF` tag, and
/// (once the header list is parsed) the offset of the first byte inside its
/// `movi` list payload.
#[derive(Debug, Clone, Copy, Default)]
struct Segment {
    riff_start: u64,
    movi_base: Option<u64>,
    movi_end: Option<u64>,
}

pub struct AviReader<F> {
    file: PagedFile<F>,
    segments: Vec<Segment>,
    video: Option<VideoStreamInfo>,
    audio: Option<AudioStreamInfo>,
    video_strh: Option<StreamHeader>,
    audio_strh: Option<StreamHeader>,
    video_index: StreamIndex,
    audio_index: StreamIndex,
    video_cursor: usize,
    audio_cursor: usize,
    has_index: bool,
    total_frames_hint: u32,
}

pub struct OpenOptions {
    /// If no usable index is found, scan `movi` and synthesize one rather
    /// than returning [`AviError::NoIndex`].
    pub auto_index: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { auto_index: true }
    }
}

impl<F: Read + Write + Seek> AviReader<F> {
    pub fn open(inner: F, opts: OpenOptions) -> AviResult<Self> {
        let mut reader = Self {
            file: PagedFile::from_inner(inner),
            segments: Vec::new(),
            video: None,
            audio: None,
            video_strh: None,
            audio_strh: None,
            video_index: StreamIndex::new("00dc"),
            audio_index: StreamIndex::new("01wb"),
            video_cursor: 0,
            audio_cursor: 0,
            has_index: false,
            total_frames_hint: 0,
        };
        reader.discover_segments()?;
        reader.parse_header_list()?;

        if !reader.has_index {
            if opts.auto_index {
                reader.synthesize_index()?;
            } else {
                return Err(AviError::NoIndex);
            }
        }

        Ok(reader)
    }

    // ------------------------------------------------------------------
    // Phase 1: segment discovery
    // ------------------------------------------------------------------

    fn discover_segments(&mut self) -> AviResult<()> {
        let len = self.file.len()?;
        let mut pos = 0u64;
        while pos + 8 <= len {
            self.file.seek_abs(pos)?;
            let tag = FourCc::read(&mut self.file)?;
            let size = fourcc::read_u32(&mut self.file)?;
            if tag != fourcc::RIFF {
                break;
            }
            self.segments.push(Segment { riff_start: pos, movi_base: None, movi_end: None });
            let advance = 8u64 + size as u64 + (size % 2) as u64;
            pos += advance;
            if self.segments.len() >= MAX_SEGMENTS {
                return Err(AviError::TooManySegments);
            }
        }
        if self.segments.is_empty() {
            return Err(AviError::Corrupted("no RIFF segment found"));
        }
        debug!(segments = self.segments.len(), "discovered RIFF segments");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase 2/3: header list + stream lists
    // ------------------------------------------------------------------

    fn parse_header_list(&mut self) -> AviResult<()> {
        let seg0_start = self.segments[0].riff_start;
        self.file.seek_abs(seg0_start)?;
        let tag = FourCc::read(&mut self.file)?;
        if tag != fourcc::RIFF {
            return Err(AviError::Corrupted("expected RIFF"));
        }
        let riff_size = fourcc::read_u32(&mut self.file)?;
        if !(100..header::AVI_MAX_RIFF_SIZE).contains(&riff_size) {
            return Err(AviError::Corrupted("RIFF size out of range"));
        }
        let form = FourCc::read(&mut self.file)?;
        if form != fourcc::AVI_ && form != fourcc::AVIX {
            return Err(AviError::Corrupted("expected AVI form type"));
        }

        let end = seg0_start + 8 + riff_size as u64;
        let mut idx1_region: Option<(u64, u32)> = None;

        while self.file.tell_abs()? + 8 <= end {
            let tag = FourCc::read(&mut self.file)?;
            let size = fourcc::read_u32(&mut self.file)?;
            let chunk_start = self.file.tell_abs()?;

            match tag {
                fourcc::LIST => {
                    let list_type = FourCc::read(&mut self.file)?;
                    if list_type == fourcc::HDRL {
                        self.parse_hdrl(chunk_start + size as u64)?;
                    } else if list_type == fourcc::MOVI {
                        let base = self.file.tell_abs()?;
                        self.segments[0].movi_base = Some(base);
                        self.segments[0].movi_end = Some(chunk_start + size as u64);
                    } else {
                        trace!(list = %list_type, "skipping unrecognized top-level LIST");
                    }
                }
                fourcc::IDX1 => {
                    idx1_region = Some((chunk_start, size));
                }
                _ => {
                    trace!(tag = %tag, "skipping unrecognized top-level chunk");
                }
            }

            let mut next = chunk_start + size as u64;
            if size % 2 == 1 {
                next += 1;
            }
            self.file.seek_abs(next)?;
        }

        if self.segments[0].movi_base.is_none() {
            return Err(AviError::Corrupted("missing movi list"));
        }

        if let Some((offset, size)) = idx1_region {
            self.parse_legacy_index(offset, size)?;
        }

        // Remaining segments only ever carry `LIST movi` (+ optional `ixNN`);
        // their bounds are needed so segment-relative offsets resolve.
        for i in 1..self.segments.len() {
            self.discover_segment_movi(i)?;
        }

        if let (Some(v), Some(h)) = (&mut self.video, self.video_strh.as_ref()) {
            v.frame_count = self.total_frames_hint.max(h.length);
        }

        Ok(())
    }

    fn discover_segment_movi(&mut self, seg_idx: usize) -> AviResult<()> {
        let start = self.segments[seg_idx].riff_start;
        self.file.seek_abs(start)?;
        let tag = FourCc::read(&mut self.file)?;
        if tag != fourcc::RIFF {
            return Err(AviError::Corrupted("expected RIFF in secondary segment"));
        }
        let size = fourcc::read_u32(&mut self.file)?;
        let _form = FourCc::read(&mut self.file)?;
        let end = start + 8 + size as u64;

        while self.file.tell_abs()? + 8 <= end {
            let tag = FourCc::read(&mut self.file)?;
            let chunk_size = fourcc::read_u32(&mut self.file)?;
            let chunk_start = self.file.tell_abs()?;
            if tag == fourcc::LIST {
                let list_type = FourCc::read(&mut self.file)?;
                if list_type == fourcc::MOVI {
                    self.segments[seg_idx].movi_base = Some(self.file.tell_abs()?);
                    self.segments[seg_idx].movi_end = Some(chunk_start + chunk_size as u64);
                }
            }
            let mut next = chunk_start + chunk_size as u64;
            if chunk_size % 2 == 1 {
                next += 1;
            }
            self.file.seek_abs(next)?;
        }
        Ok(())
    }

    fn parse_hdrl(&mut self, end: u64) -> AviResult<()> {
        let mut seen_avih = false;
        while self.file.tell_abs()? + 8 <= end {
            let tag = FourCc::read(&mut self.file)?;
            let size = fourcc::read_u32(&mut self.file)?;
            let chunk_start = self.file.tell_abs()?;

            match tag {
                fourcc::AVIH => {
                    if seen_avih {
                        return Err(AviError::Corrupted("duplicate avih"));
                    }
                    self.parse_avih()?;
                    seen_avih = true;
                }
                fourcc::LIST => {
                    let list_type = FourCc::read(&mut self.file)?;
                    if list_type == fourcc::STRL {
                        self.parse_strl(chunk_start + size as u64)?;
                    } else if list_type == fourcc::ODML {
                        self.parse_odml(chunk_start + size as u64)?;
                    }
                }
                _ => {}
            }

            let mut next = chunk_start + size as u64;
            if size % 2 == 1 {
                next += 1;
            }
            self.file.seek_abs(next)?;
        }
        if !seen_avih {
            return Err(AviError::Corrupted("missing avih"));
        }
        Ok(())
    }

    fn parse_avih(&mut self) -> AviResult<()> {
        let h = MainHeader::read(&mut self.file)?;
        if !(8_000..=1_000_000).contains(&h.micro_sec_per_frame) {
            return Err(AviError::Corrupted("frame period out of range"));
        }
        let fps = 1_000_000.0 / h.micro_sec_per_frame as f64;
        self.video = Some(VideoStreamInfo {
            width: h.width,
            height: h.height,
            fps,
            codec: String::new(),
            frame_count: h.total_frames,
        });
        self.has_index |= h.flags & header::AVIF_HASINDEX != 0;
        Ok(())
    }

    fn parse_odml(&mut self, end: u64) -> AviResult<()> {
        while self.file.tell_abs()? + 8 <= end {
            let tag = FourCc::read(&mut self.file)?;
            let size = fourcc::read_u32(&mut self.file)?;
            let chunk_start = self.file.tell_abs()?;
            if tag == fourcc::DMLH && size >= 4 {
                self.total_frames_hint = fourcc::read_u32(&mut self.file)?;
            }
            let mut next = chunk_start + size as u64;
            if size % 2 == 1 {
                next += 1;
            }
            self.file.seek_abs(next)?;
        }
        Ok(())
    }

    fn parse_strl(&mut self, end: u64) -> AviResult<()> {
        let mut strh: Option<StreamHeader> = None;
        let mut is_video = false;
        let mut is_audio = false;

        while self.file.tell_abs()? + 8 <= end {
            let tag = FourCc::read(&mut self.file)?;
            let size = fourcc::read_u32(&mut self.file)?;
            let chunk_start = self.file.tell_abs()?;

            match tag {
                fourcc::STRH => {
                    if size != 48 && size != 56 && size != 64 {
                        warn!(size, "unusual strh size, consuming only leading bytes");
                    }
                    let h = StreamHeader::read(&mut self.file)?;
                    is_video = h.fcc_type == fourcc::VIDS;
                    is_audio = h.fcc_type == fourcc::AUDS;
                    strh = Some(h);
                }
                fourcc::STRF => {
                    if is_video {
                        let bih = BitmapInfoHeader::read(&mut self.file)?;
                        if let Some(v) = &mut self.video {
                            if bih.width > 0 {
                                v.width = bih.width as u32;
                            }
                            if bih.height != 0 {
                                v.height = bih.height.unsigned_abs();
                            }
                            v.codec = bih.compression.to_string();
                        }
                    } else if is_audio {
                        let wfx = WaveFormatEx::read(&mut self.file)?;
                        self.audio = Some(AudioStreamInfo {
                            channels: wfx.channels,
                            samples_per_sec: wfx.samples_per_sec,
                            bits_per_sample: wfx.bits_per_sample,
                            format_tag: wfx.format_tag,
                            block_align: wfx.block_align,
                            avg_bytes_per_sec: wfx.avg_bytes_per_sec,
                            frame_count: strh.as_ref().map(|h| h.length).unwrap_or(0),
                        });
                    }
                }
                fourcc::VPRP => {
                    trace!("accepting and skipping vprp");
                }
                _ => {}
            }

            // `indx` (master or direct chunk-index) handled after strh/strf so
            // we know which stream it belongs to.
            if tag == fourcc::INDX {
                if is_video {
                    self.parse_indx(chunk_start, size, true)?;
                } else if is_audio {
                    self.parse_indx(chunk_start, size, false)?;
                }
            }

            let mut next = chunk_start + size as u64;
            if size % 2 == 1 {
                next += 1;
            }
            self.file.seek_abs(next)?;
        }

        if is_video {
            self.video_strh = strh;
        } else if is_audio {
            self.audio_strh = strh;
        }
        Ok(())
    }

    fn parse_indx(&mut self, start: u64, size: u32, is_video: bool) -> AviResult<()> {
        self.file.seek_abs(start)?;
        let mih = header::MasterIndexHeader::read(&mut self.file)?;
        let end = start + size as u64;

        if mih.index_type == header::AVI_INDEX_OF_INDEXES {
            for _ in 0..mih.entries_in_use {
                if self.file.tell_abs()? + header::MASTER_INDEX_ENTRY_SIZE as u64 > end {
                    break;
                }
                let entry = header::MasterIndexEntry::read(&mut self.file)?;
                if entry.is_sentinel() {
                    warn!("skipping sentinel master-index entry (qwOffset == 0)");
                    continue;
                }
                let resume = self.file.tell_abs()?;
                self.parse_chunk_index_at(entry.qw_offset, is_video)?;
                self.file.seek_abs(resume)?;
            }
            self.has_index = true;
        } else if mih.index_type == header::AVI_INDEX_OF_CHUNKS {
            self.parse_chunk_index_body(&mih, start + header::MASTER_INDEX_HEADER_SIZE as u64, end, is_video)?;
            self.has_index = true;
        }
        Ok(())
    }

    fn parse_chunk_index_at(&mut self, abs_offset: u64, is_video: bool) -> AviResult<()> {
        self.file.seek_abs(abs_offset)?;
        let _tag = FourCc::read(&mut self.file)?; // ixNN
        let size = fourcc::read_u32(&mut self.file)?;
        let body_start = self.file.tell_abs()?;
        let cih = header::ChunkIndexHeader::read(&mut self.file)?;
        self.parse_chunk_index_body(&cih, body_start + header::CHUNK_INDEX_HEADER_SIZE as u64, body_start + size as u64, is_video)
    }

    /// Converts each on-disk `STDINDEXENTRY` into an in-memory entry whose
    /// offset is relative to the owning RIFF segment's base, per
    /// `ChunkIndexHelper`:
    /// `mem.offset = (base_offset + disk.dwOffset) - segment.riff_start`.
    fn parse_chunk_index_body(
        &mut self,
        header: &header::ChunkIndexHeader,
        body_start: u64,
        end: u64,
        is_video: bool,
    ) -> AviResult<()> {
        self.file.seek_abs(body_start)?;
        for _ in 0..header.entries_in_use {
            if self.file.tell_abs()? + header::CHUNK_INDEX_ENTRY_SIZE as u64 > end {
                break;
            }
            let entry = header::StdIndexEntry::read(&mut self.file)?;
            let abs = header.base_offset + entry.dw_offset as u64;
            let seg = self.segment_for_offset(abs)?;
            let rel = abs
                .checked_sub(self.segments[seg].riff_start)
                .ok_or(AviError::Corrupted("chunk index offset underflows segment base"))?;
            if rel > (1u64 << 31) {
                return Err(AviError::Corrupted("chunk index offset exceeds 2GiB segment limit"));
            }
            let rel = u32::try_from(rel).map_err(|_| AviError::Overflow)?;
            if is_video {
                self.video_index.append(rel, entry.size(), seg as u32, entry.is_keyframe())?;
            } else {
                self.audio_index.append(rel, entry.size(), seg as u32, entry.is_keyframe())?;
            }
        }
        Ok(())
    }

    fn segment_for_offset(&self, abs_offset: u64) -> AviResult<usize> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.riff_start <= abs_offset)
            .max_by_key(|(_, s)| s.riff_start)
            .map(|(i, _)| i)
            .ok_or(AviError::Corrupted("offset precedes every known segment"))
    }

    // ------------------------------------------------------------------
    // Phase 4: legacy idx1
    // ------------------------------------------------------------------

    fn parse_legacy_index(&mut self, start: u64, size: u32) -> AviResult<()> {
        let movi_base = self
            .segments[0]
            .movi_base
            .expect("movi must be located before idx1 is parsed");
        let entry_count = size / header::LEGACY_INDEX_ENTRY_SIZE;
        if entry_count == 0 {
            return Ok(());
        }

        self.file.seek_abs(start)?;
        let first = header::LegacyIndexEntry::read(&mut self.file)?;
        // Movie-relative producers emit 4 for entry 0 (the gap left by the
        // `movi` FourCC itself); anything else must be absolute.
        let movie_relative = first.offset == 4;
        if !movie_relative && (first.offset as u64) < movi_base {
            return Err(AviError::Corrupted(
                "legacy index entry 0 offset is neither movie-relative nor absolute",
            ));
        }

        // Sanity check: seek to entry 0's resolved chunk and confirm the tag
        // on disk matches the index, transparently skipping an enclosing
        // `LIST rec ` wrapper.
        let abs0 = if movie_relative {
            movi_base + first.offset as u64 - 4
        } else {
            first.offset as u64
        };
        self.file.seek_abs(abs0)?;
        let mut tag = FourCc::read(&mut self.file)?;
        if tag == fourcc::LIST {
            let _list_size = fourcc::read_u32(&mut self.file)?;
            tag = FourCc::read(&mut self.file)?;
            if tag != fourcc::REC_ {
                return Err(AviError::Corrupted(
                    "legacy index entry 0 is a LIST but not a 'rec ' wrapper",
                ));
            }
        }
        if tag != first.ckid {
            return Err(AviError::Corrupted(
                "legacy index entry 0 tag does not match the data at its resolved offset",
            ));
        }

        self.file.seek_abs(start)?;
        for _ in 0..entry_count {
            let entry = header::LegacyIndexEntry::read(&mut self.file)?;
            let abs = if movie_relative {
                movi_base + entry.offset as u64 - 4
            } else {
                entry.offset as u64
            };
            let seg = self.segment_for_offset(abs)?;
            let rel = abs
                .checked_sub(self.segments[seg].riff_start)
                .ok_or(AviError::Corrupted("legacy index offset underflows segment base"))?;
            let rel = u32::try_from(rel).map_err(|_| AviError::Overflow)?;
            // idx1 offsets address the chunk tag; the in-memory index stores
            // the payload start, so skip the 8-byte chunk header here.
            let payload_off = rel + 8;

            let keyframe = entry.flags & header::AVIIF_KEYFRAME != 0;
            match entry.ckid.0[2] {
                b'd' => self.video_index.append(payload_off, entry.size, seg as u32, keyframe)?,
                b'w' => self.audio_index.append(payload_off, entry.size, seg as u32, keyframe)?,
                _ => {}
            }
        }
        self.has_index = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase 5: auto-index synthesis
    // ------------------------------------------------------------------

    fn synthesize_index(&mut self) -> AviResult<()> {
        debug!("synthesizing index by scanning movi");
        let file_len = self.file.len()?;
        for seg_idx in 0..self.segments.len() {
            let Some(base) = self.segments[seg_idx].movi_base else { continue };
            // The declared `movi` size may overshoot the real file (a writer
            // crashed before patching sizes, or the file was truncated in
            // transit); never trust it past what the file actually contains.
            let end = self.segments[seg_idx].movi_end.unwrap_or(base).min(file_len);
            self.file.seek_abs(base)?;

            loop {
                let pos = self.file.tell_abs()?;
                if pos + 8 > end {
                    debug!("reached end of available movi data during auto-index scan");
                    break;
                }
                let tag = FourCc::read(&mut self.file)?;
                if tag.0[2] == b'i' && tag.0[3] == b'x' {
                    // An embedded chunk-index terminates auto-index scanning:
                    // no further movi records follow an odml index.
                    break;
                }
                let size = fourcc::read_u32(&mut self.file)?;
                let payload_off = self.file.tell_abs()?;
                if payload_off + size as u64 > end {
                    debug!("truncated trailing chunk during auto-index scan; stopping");
                    break;
                }

                let rel = (payload_off - self.segments[seg_idx].riff_start) as u32;
                match (fourcc::parse_stream_number(&tag), tag.0[2], tag.0[3]) {
                    (Some(_), b'd', b'c') | (Some(_), b'd', b'b') => {
                        self.video_index.append(rel, size, seg_idx as u32, true)?;
                    }
                    (Some(_), b'w', b'b') => {
                        self.audio_index.append(rel, size, seg_idx as u32, true)?;
                    }
                    _ => {}
                }

                let mut next = payload_off + size as u64;
                if size % 2 == 1 {
                    next += 1;
                }
                self.file.seek_abs(next)?;
            }
        }
        self.has_index = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public facade-facing operations
    // ------------------------------------------------------------------

    pub fn info(&self) -> ContainerInfo {
        let duration_us = self
            .video
            .as_ref()
            .filter(|v| v.fps > 0.0)
            .map(|v| (v.frame_count as f64 / v.fps * 1_000_000.0) as i64)
            .unwrap_or(0);
        ContainerInfo {
            duration_us,
            video: self.video.clone(),
            audio: self.audio.clone(),
            has_index: self.has_index,
            segment_count: self.segments.len(),
        }
    }

    pub fn video_frame_count(&self) -> usize {
        self.video_index.len()
    }

    pub fn audio_frame_count(&self) -> usize {
        self.audio_index.len()
    }

    pub fn seek_start(&mut self) {
        self.video_cursor = 0;
        self.audio_cursor = 0;
    }

    pub fn read_video_frame(&mut self, buf: &mut Vec<u8>) -> AviResult<bool> {
        Self::read_indexed(&mut self.file, &self.segments, &self.video_index, &mut self.video_cursor, buf)
    }

    pub fn read_audio_frame(&mut self, buf: &mut Vec<u8>) -> AviResult<bool> {
        Self::read_indexed(&mut self.file, &self.segments, &self.audio_index, &mut self.audio_cursor, buf)
    }

    /// Size of the frame the next `read_video_frame` call would return,
    /// without touching the cursor or the file - the `buf = none` form of
    /// the read operation.
    pub fn video_frame_size(&self) -> AviResult<u32> {
        self.video_index.get(self.video_cursor).map(|e| e.size()).ok_or(AviError::Eof)
    }

    pub fn audio_frame_size(&self) -> AviResult<u32> {
        self.audio_index.get(self.audio_cursor).map(|e| e.size()).ok_or(AviError::Eof)
    }

    pub fn video_frame_is_keyframe(&self, frame: usize) -> Option<bool> {
        self.video_index.get(frame).map(|e| e.is_keyframe())
    }

    fn read_indexed(
        file: &mut PagedFile<F>,
        segments: &[Segment],
        index: &StreamIndex,
        cursor: &mut usize,
        buf: &mut Vec<u8>,
    ) -> AviResult<bool> {
        let Some(entry) = index.get(*cursor) else {
            return Ok(false);
        };
        let seg = segments
            .get(entry.segment_id() as usize)
            .ok_or(AviError::Corrupted("index entry references unknown segment"))?;
        let abs = seg.riff_start + entry.offset as u64;
        file.seek_abs(abs)?;
        buf.resize(entry.size() as usize, 0);
        file.read_exact(buf)?;
        *cursor += 1;
        Ok(true)
    }
}
