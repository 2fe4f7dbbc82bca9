//! On-disk struct layouts for AVI headers and index records.
//!
//! Field names and sizes follow the classic Microsoft AVI structures
//! (`AVIMAINHEADER`, `AVISTREAMHEADER`, `BITMAPINFOHEADER`, `WAVEFORMATEX`)
//! as emitted and consumed by classic AVI toolkits' `avi2_Read.c`/
//! `avi2_write.c`. Every size below is load-bearing: readers in the wild
//! (and our own round-trip tests) depend on the exact byte counts.

use crate::error::{AviError, AviResult};
use crate::fourcc::{read_i32, read_u16, read_u32, read_u64, write_u16, write_u32, write_u64};
use std::io::{Read, Write};

pub const AVIF_HASINDEX: u32 = 0x0000_0010;
pub const AVIF_ISINTERLEAVED: u32 = 0x0000_0100;
pub const AVIF_TRUSTCKTYPE: u32 = 0x0000_0800;

pub const AVIIF_KEYFRAME: u32 = 0x0000_0010;

/// Just under the 2GB limit for standard AVI; a top-level RIFF chunk
/// bigger than this is rejected rather than treated as a 64-bit-capable
/// `AVIX`-extended file.
pub const AVI_MAX_RIFF_SIZE: u32 = 0x7FFF_FFF0;

/// `AVIMAINHEADER`, 56-byte payload.
#[derive(Debug, Clone, Default)]
pub struct MainHeader {
    pub micro_sec_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub padding_granularity: u32,
    pub flags: u32,
    pub total_frames: u32,
    pub initial_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
    pub reserved: [u32; 4],
}

pub const MAIN_HEADER_SIZE: u32 = 56;

impl MainHeader {
    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        Ok(Self {
            micro_sec_per_frame: read_u32(r)?,
            max_bytes_per_sec: read_u32(r)?,
            padding_granularity: read_u32(r)?,
            flags: read_u32(r)?,
            total_frames: read_u32(r)?,
            initial_frames: read_u32(r)?,
            streams: read_u32(r)?,
            suggested_buffer_size: read_u32(r)?,
            width: read_u32(r)?,
            height: read_u32(r)?,
            reserved: [read_u32(r)?, read_u32(r)?, read_u32(r)?, read_u32(r)?],
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        write_u32(w, self.micro_sec_per_frame)?;
        write_u32(w, self.max_bytes_per_sec)?;
        write_u32(w, self.padding_granularity)?;
        write_u32(w, self.flags)?;
        write_u32(w, self.total_frames)?;
        write_u32(w, self.initial_frames)?;
        write_u32(w, self.streams)?;
        write_u32(w, self.suggested_buffer_size)?;
        write_u32(w, self.width)?;
        write_u32(w, self.height)?;
        for r in self.reserved {
            write_u32(w, r)?;
        }
        Ok(())
    }
}

/// `AVISTREAMHEADER`, 56-byte payload (the writer always emits this size; the
/// reader also accepts the legacy 48-byte and the occasional 64-byte variant,
/// consuming only the leading bytes it understands).
#[derive(Debug, Clone, Default)]
pub struct StreamHeader {
    pub fcc_type: crate::fourcc::FourCc,
    pub fcc_handler: crate::fourcc::FourCc,
    pub flags: u32,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub suggested_buffer_size: u32,
    pub quality: u32,
    pub sample_size: u32,
    pub frame_rect: [i16; 4],
}

pub const STREAM_HEADER_SIZE: u32 = 56;

impl StreamHeader {
    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        use crate::fourcc::FourCc;
        Ok(Self {
            fcc_type: FourCc::read(r)?,
            fcc_handler: FourCc::read(r)?,
            flags: read_u32(r)?,
            priority: read_u16(r)?,
            language: read_u16(r)?,
            initial_frames: read_u32(r)?,
            scale: read_u32(r)?,
            rate: read_u32(r)?,
            start: read_u32(r)?,
            length: read_u32(r)?,
            suggested_buffer_size: read_u32(r)?,
            quality: read_u32(r)?,
            sample_size: read_u32(r)?,
            frame_rect: [
                read_i32(r)? as i16,
                read_i32(r)? as i16,
                read_i32(r)? as i16,
                read_i32(r)? as i16,
            ],
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        self.fcc_type.write(w)?;
        self.fcc_handler.write(w)?;
        write_u32(w, self.flags)?;
        write_u16(w, self.priority)?;
        write_u16(w, self.language)?;
        write_u32(w, self.initial_frames)?;
        write_u32(w, self.scale)?;
        write_u32(w, self.rate)?;
        write_u32(w, self.start)?;
        write_u32(w, self.length)?;
        write_u32(w, self.suggested_buffer_size)?;
        write_u32(w, self.quality)?;
        write_u32(w, self.sample_size)?;
        for v in self.frame_rect {
            write_u16(w, v as u16)?;
        }
        Ok(())
    }
}

/// `BITMAPINFOHEADER`, 40-byte `strf` payload for video streams.
#[derive(Debug, Clone, Default)]
pub struct BitmapInfoHeader {
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: crate::fourcc::FourCc,
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub clr_used: u32,
    pub clr_important: u32,
}

pub const BITMAP_INFO_HEADER_SIZE: u32 = 40;

impl BitmapInfoHeader {
    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        use crate::fourcc::FourCc;
        let _size = read_u32(r)?; // bih.biSize, re-derived on write
        Ok(Self {
            width: read_i32(r)?,
            height: read_i32(r)?,
            planes: read_u16(r)?,
            bit_count: read_u16(r)?,
            compression: FourCc::read(r)?,
            size_image: read_u32(r)?,
            x_pels_per_meter: read_i32(r)?,
            y_pels_per_meter: read_i32(r)?,
            clr_used: read_u32(r)?,
            clr_important: read_u32(r)?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        write_u32(w, BITMAP_INFO_HEADER_SIZE)?;
        write_u32(w, self.width as u32)?;
        write_u32(w, self.height as u32)?;
        write_u16(w, self.planes)?;
        write_u16(w, self.bit_count)?;
        self.compression.write(w)?;
        write_u32(w, self.size_image)?;
        write_u32(w, self.x_pels_per_meter as u32)?;
        write_u32(w, self.y_pels_per_meter as u32)?;
        write_u32(w, self.clr_used)?;
        write_u32(w, self.clr_important)?;
        Ok(())
    }
}

/// `WAVEFORMATEX`, 18-byte `strf` payload for audio streams (no extra data).
#[derive(Debug, Clone, Default)]
pub struct WaveFormatEx {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

pub const WAVE_FORMAT_EX_SIZE: u32 = 18;

impl WaveFormatEx {
    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        Ok(Self {
            format_tag: read_u16(r)?,
            channels: read_u16(r)?,
            samples_per_sec: read_u32(r)?,
            avg_bytes_per_sec: read_u32(r)?,
            block_align: read_u16(r)?,
            bits_per_sample: read_u16(r)?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        write_u16(w, self.format_tag)?;
        write_u16(w, self.channels)?;
        write_u32(w, self.samples_per_sec)?;
        write_u32(w, self.avg_bytes_per_sec)?;
        write_u16(w, self.block_align)?;
        write_u16(w, self.bits_per_sample)?;
        write_u16(w, 0)?; // cbSize, no extra format bytes
        Ok(())
    }
}

/// Legacy `idx1` entry, 16 bytes.
#[derive(Debug, Clone, Copy)]
pub struct LegacyIndexEntry {
    pub ckid: crate::fourcc::FourCc,
    pub flags: u32,
    pub offset: u32,
    pub size: u32,
}

pub const LEGACY_INDEX_ENTRY_SIZE: u32 = 16;

impl LegacyIndexEntry {
    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        use crate::fourcc::FourCc;
        Ok(Self {
            ckid: FourCc::read(r)?,
            flags: read_u32(r)?,
            offset: read_u32(r)?,
            size: read_u32(r)?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        self.ckid.write(w)?;
        write_u32(w, self.flags)?;
        write_u32(w, self.offset)?;
        write_u32(w, self.size)?;
        Ok(())
    }
}

pub const AVI_INDEX_OF_INDEXES: u8 = 0x00;
pub const AVI_INDEX_OF_CHUNKS: u8 = 0x01;

/// `AVISUPERINDEX` header, 24 bytes, followed by `nEntriesInUse` 16-byte entries.
#[derive(Debug, Clone)]
pub struct MasterIndexHeader {
    pub longs_per_entry: u16,
    pub index_sub_type: u8,
    pub index_type: u8,
    pub entries_in_use: u32,
    pub chunk_id: crate::fourcc::FourCc,
}

pub const MASTER_INDEX_HEADER_SIZE: u32 = 24;
pub const MASTER_INDEX_ENTRY_SIZE: u32 = 16;
/// Reserved slots per stream in the header placeholder region.
pub const MASTER_INDEX_MAX_ENTRIES: u32 = 128;

impl MasterIndexHeader {
    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        use crate::fourcc::FourCc;
        let longs_per_entry = read_u16(r)?;
        let index_sub_type = {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            b[0]
        };
        let index_type = {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            b[0]
        };
        let entries_in_use = read_u32(r)?;
        let chunk_id = FourCc::read(r)?;
        let mut reserved = [0u8; 12];
        r.read_exact(&mut reserved)?;
        Ok(Self { longs_per_entry, index_sub_type, index_type, entries_in_use, chunk_id })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        write_u16(w, self.longs_per_entry)?;
        w.write_all(&[self.index_sub_type, self.index_type])?;
        write_u32(w, self.entries_in_use)?;
        self.chunk_id.write(w)?;
        w.write_all(&[0u8; 12])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MasterIndexEntry {
    pub qw_offset: u64,
    pub dw_size: u32,
    pub dw_duration: u32,
}

impl MasterIndexEntry {
    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        Ok(Self {
            qw_offset: read_u64(r)?,
            dw_size: read_u32(r)?,
            dw_duration: read_u32(r)?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        write_u64(w, self.qw_offset)?;
        write_u32(w, self.dw_size)?;
        write_u32(w, self.dw_duration)?;
        Ok(())
    }

    /// Sentinel meaning "unused slot" - some producers leave trailing master
    /// index slots zeroed rather than trimming `entries_in_use`.
    pub fn is_sentinel(&self) -> bool {
        self.qw_offset == 0
    }
}

/// `AVISTDINDEX` header, 24 bytes, followed by `nEntriesInUse` 8-byte entries.
#[derive(Debug, Clone)]
pub struct ChunkIndexHeader {
    pub longs_per_entry: u16,
    pub index_sub_type: u8,
    pub index_type: u8,
    pub entries_in_use: u32,
    pub chunk_id: crate::fourcc::FourCc,
    pub base_offset: u64,
}

pub const CHUNK_INDEX_HEADER_SIZE: u32 = 24;
pub const CHUNK_INDEX_ENTRY_SIZE: u32 = 8;

impl ChunkIndexHeader {
    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        use crate::fourcc::FourCc;
        let longs_per_entry = read_u16(r)?;
        let index_sub_type = {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            b[0]
        };
        let index_type = {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            b[0]
        };
        let entries_in_use = read_u32(r)?;
        let chunk_id = FourCc::read(r)?;
        let base_offset = read_u64(r)?;
        let _reserved3 = read_u32(r)?;
        Ok(Self { longs_per_entry, index_sub_type, index_type, entries_in_use, chunk_id, base_offset })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        write_u16(w, self.longs_per_entry)?;
        w.write_all(&[self.index_sub_type, self.index_type])?;
        write_u32(w, self.entries_in_use)?;
        self.chunk_id.write(w)?;
        write_u64(w, self.base_offset)?;
        write_u32(w, 0)?;
        Ok(())
    }
}

/// A `STDINDEXENTRY`: `dwOffset` relative to the header's `qwBaseOffset`, and
/// `dwSize` with bit 31 set when the chunk is *not* a keyframe.
#[derive(Debug, Clone, Copy)]
pub struct StdIndexEntry {
    pub dw_offset: u32,
    pub dw_size: u32,
}

impl StdIndexEntry {
    pub const NOT_KEYFRAME_BIT: u32 = 0x8000_0000;

    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        Ok(Self { dw_offset: read_u32(r)?, dw_size: read_u32(r)? })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        write_u32(w, self.dw_offset)?;
        write_u32(w, self.dw_size)?;
        Ok(())
    }

    pub fn is_keyframe(&self) -> bool {
        self.dw_size & Self::NOT_KEYFRAME_BIT == 0
    }

    pub fn size(&self) -> u32 {
        self.dw_size & !Self::NOT_KEYFRAME_BIT
    }
}

/// Validates geometry/rate bounds shared by the reader and the facade.
pub fn check_video_geometry(width: u32, height: u32, fps: f64) -> AviResult<()> {
    if width == 0 || width > 8192 || height == 0 || height > 4096 {
        return Err(AviError::NotSupported);
    }
    if !(fps > 0.0 && fps <= 120.0) {
        return Err(AviError::NotSupported);
    }
    Ok(())
}

pub fn check_audio_format(channels: u16, samples_per_sec: u32, bits_per_sample: u16) -> AviResult<()> {
    if channels == 0 {
        return Err(AviError::BadParameter("channel count must be nonzero"));
    }
    if channels > 16 {
        return Err(AviError::TooManyChannels);
    }
    if !(8000..=192_000).contains(&samples_per_sec) {
        return Err(AviError::BadParameter("sample rate out of range"));
    }
    if !matches!(bits_per_sample, 8 | 16 | 24 | 32) {
        return Err(AviError::BadParameter("bits per sample must be 8, 16, 24, or 32"));
    }
    Ok(())
}
