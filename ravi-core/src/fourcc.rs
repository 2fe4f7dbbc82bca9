//! FourCC tags and the stream-numbered tag convention (`##dc`, `ix##`, ...).
//!
//! A [`FourCc`] is always held in file byte order, so there is no host-endian
//! ambiguity the way there would be storing it as a bare `u32`.

use crate::error::{AviError, AviResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCc(bytes)
    }

    /// Build from a 4-byte ASCII literal known at call time, e.g. `FourCc::ascii(b"RIFF")`.
    pub const fn ascii(bytes: &[u8; 4]) -> Self {
        FourCc(*bytes)
    }

    pub fn read<R: Read>(r: &mut R) -> AviResult<Self> {
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf)?;
        Ok(FourCc(buf))
    }

    pub fn write<W: Write>(&self, w: &mut W) -> AviResult<()> {
        w.write_all(&self.0)?;
        Ok(())
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

pub const RIFF: FourCc = FourCc::ascii(b"RIFF");
pub const AVI_: FourCc = FourCc::ascii(b"AVI ");
pub const AVIX: FourCc = FourCc::ascii(b"AVIX");
pub const LIST: FourCc = FourCc::ascii(b"LIST");
pub const HDRL: FourCc = FourCc::ascii(b"hdrl");
pub const AVIH: FourCc = FourCc::ascii(b"avih");
pub const STRL: FourCc = FourCc::ascii(b"strl");
pub const STRH: FourCc = FourCc::ascii(b"strh");
pub const STRF: FourCc = FourCc::ascii(b"strf");
pub const STRN: FourCc = FourCc::ascii(b"strn");
pub const MOVI: FourCc = FourCc::ascii(b"movi");
pub const IDX1: FourCc = FourCc::ascii(b"idx1");
pub const JUNK: FourCc = FourCc::ascii(b"JUNK");
pub const INFO: FourCc = FourCc::ascii(b"INFO");
pub const ISFT: FourCc = FourCc::ascii(b"ISFT");
pub const ODML: FourCc = FourCc::ascii(b"odml");
pub const DMLH: FourCc = FourCc::ascii(b"dmlh");
pub const VPRP: FourCc = FourCc::ascii(b"vprp");
pub const REC_: FourCc = FourCc::ascii(b"rec ");
pub const INDX: FourCc = FourCc::ascii(b"indx");

pub const VIDS: FourCc = FourCc::ascii(b"vids");
pub const AUDS: FourCc = FourCc::ascii(b"auds");
pub const TXTS: FourCc = FourCc::ascii(b"txts");

/// Canonical stream-numbered tag form, with `#` standing in for the two
/// decimal digits of the stream index (`##dc`, `ix##`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTagKind {
    CompressedVideo, // ##dc
    UncompressedVideo, // ##db
    Audio,             // ##wb
    Text,              // ##tx
    PaletteChange,     // ##pc
    ChunkIndex,        // ix##
}

impl StreamTagKind {
    fn suffix(self) -> &'static [u8; 2] {
        match self {
            StreamTagKind::CompressedVideo => b"dc",
            StreamTagKind::UncompressedVideo => b"db",
            StreamTagKind::Audio => b"wb",
            StreamTagKind::Text => b"tx",
            StreamTagKind::PaletteChange => b"pc",
            StreamTagKind::ChunkIndex => b"ix", // placeholder, unused (prefix form)
        }
    }
}

/// Reads a FourCC and, if it matches the stream-numbered convention, returns
/// the stream number alongside the canonical `#`-placeholder tag. This is the
/// only place stream-number parsing happens.
pub fn read_stream_fcc<R: Read>(r: &mut R) -> AviResult<(FourCc, Option<u32>)> {
    let tag = FourCc::read(r)?;
    Ok((tag, parse_stream_number(&tag)))
}

pub fn parse_stream_number(tag: &FourCc) -> Option<u32> {
    let b = &tag.0;
    if b[0] == b'i' && b[1] == b'x' && b[2].is_ascii_digit() && b[3].is_ascii_digit() {
        return Some(digits_to_num(b[2], b[3]));
    }
    if b[0].is_ascii_digit() && b[1].is_ascii_digit() {
        let suffix = [b[2], b[3]];
        if matches!(&suffix, b"dc" | b"db" | b"wb" | b"tx" | b"pc" | b"ix") {
            return Some(digits_to_num(b[0], b[1]));
        }
    }
    None
}

fn digits_to_num(hi: u8, lo: u8) -> u32 {
    (hi - b'0') as u32 * 10 + (lo - b'0') as u32
}

/// Builds the on-disk tag for a given stream number and kind, e.g.
/// `(0, ChunkIndex) -> "ix00"`, `(1, Audio) -> "01wb"`.
pub fn make_stream_fcc(stream: u32, kind: StreamTagKind) -> AviResult<FourCc> {
    if stream > 99 {
        return Err(AviError::BadParameter("stream number must fit in two decimal digits"));
    }
    let hi = b'0' + (stream / 10) as u8;
    let lo = b'0' + (stream % 10) as u8;
    let bytes = if kind == StreamTagKind::ChunkIndex {
        [b'i', b'x', hi, lo]
    } else {
        let s = kind.suffix();
        [hi, lo, s[0], s[1]]
    };
    Ok(FourCc(bytes))
}

pub fn write_stream_fcc<W: Write>(w: &mut W, stream: u32, kind: StreamTagKind) -> AviResult<()> {
    make_stream_fcc(stream, kind)?.write(w)
}

pub fn read_u16<R: Read>(r: &mut R) -> AviResult<u16> {
    Ok(r.read_u16::<LittleEndian>()?)
}
pub fn read_u32<R: Read>(r: &mut R) -> AviResult<u32> {
    Ok(r.read_u32::<LittleEndian>()?)
}
pub fn read_i32<R: Read>(r: &mut R) -> AviResult<i32> {
    Ok(r.read_i32::<LittleEndian>()?)
}
pub fn read_u64<R: Read>(r: &mut R) -> AviResult<u64> {
    Ok(r.read_u64::<LittleEndian>()?)
}
pub fn write_u16<W: Write>(w: &mut W, v: u16) -> AviResult<()> {
    Ok(w.write_u16::<LittleEndian>(v)?)
}
pub fn write_u32<W: Write>(w: &mut W, v: u32) -> AviResult<()> {
    Ok(w.write_u32::<LittleEndian>(v)?)
}
pub fn write_u64<W: Write>(w: &mut W, v: u64) -> AviResult<()> {
    Ok(w.write_u64::<LittleEndian>(v)?)
}
