//! End-to-end round-trip tests driving the public facade exactly the way a
//! caller would: `AviContainer::create_writer` to write, `AviContainer::open_reader`
//! (or a raw `AviReader`) to read back, over an in-memory `Cursor<Vec<u8>>` so
//! no real filesystem is needed.

use ravi_core::container::AviContainer;
use ravi_core::error::AviError;
use ravi_core::fourcc::FourCc;
use ravi_core::reader::{AviReader, OpenOptions};
use ravi_core::writer::WriteMode;
use std::io::Cursor;

const MJPG: FourCc = FourCc::ascii(b"MJPG");

fn make_frame(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// Scenario 1: strict-legacy, 320x240@30fps, MJPG, 100 frames of 1000 bytes,
/// no audio. Single segment, `idx1` present, frame count round-trips.
#[test]
fn scenario1_strict_legacy_round_trip() {
    let mut writer = AviContainer::create_writer(Cursor::new(Vec::new()), WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 320, 240, 30.0, MJPG).unwrap();

    let frames: Vec<Vec<u8>> = (0..100u8).map(|i| make_frame(i, 1000)).collect();
    for (i, f) in frames.iter().enumerate() {
        let written = writer.write_video_frame(f, i % 10 == 0).unwrap();
        assert_eq!(written, f.len());
    }
    let cursor = writer.close().unwrap().unwrap();

    let mut reader = AviContainer::open_reader(cursor, OpenOptions { auto_index: false }).unwrap();
    let info = reader.info().unwrap();
    assert!(info.has_index);
    assert_eq!(info.segment_count, 1);
    let video = info.video.clone().unwrap();
    assert_eq!(video.width, 320);
    assert_eq!(video.height, 240);
    assert!((video.fps - 30.0).abs() < 0.01);
    assert_eq!(reader.video_frame_count().unwrap(), 100);

    reader.seek_start().unwrap();
    let mut buf = Vec::new();
    for (i, expected) in frames.iter().enumerate() {
        let ok = reader.read_video_frame(&mut buf).unwrap();
        assert!(ok, "frame {i} missing");
        assert_eq!(&buf, expected, "frame {i} payload mismatch");
        assert_eq!(reader.video_frame_is_keyframe(i).unwrap(), Some(i % 10 == 0));
    }
    // One past the last frame: EOF signaled by `Ok(false)`, not an error.
    assert!(!reader.read_video_frame(&mut buf).unwrap());
}

/// Audio + video together, still strict-legacy, confirms both indexes
/// round-trip independently and interleaving doesn't corrupt either stream.
#[test]
fn round_trip_legacy_with_audio() {
    let mut writer = AviContainer::create_writer(Cursor::new(Vec::new()), WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 640, 480, 25.0, MJPG).unwrap();
    writer.set_audio("mic0", 2, 48_000, 16, 1).unwrap();

    let video_frames: Vec<Vec<u8>> = (0..20u8).map(|i| make_frame(i, 4000)).collect();
    let audio_frames: Vec<Vec<u8>> = (0..40u8).map(|i| make_frame(200u8.wrapping_add(i), 256)).collect();

    for i in 0..40 {
        if i % 2 == 0 {
            writer.write_video_frame(&video_frames[i / 2], true).unwrap();
        }
        writer.write_audio_frame(&audio_frames[i]).unwrap();
    }
    let cursor = writer.close().unwrap().unwrap();

    let mut reader = AviContainer::open_reader(cursor, OpenOptions { auto_index: false }).unwrap();
    assert_eq!(reader.video_frame_count().unwrap(), 20);
    assert_eq!(reader.audio_frame_count().unwrap(), 40);

    let mut buf = Vec::new();
    for expected in &video_frames {
        assert!(reader.read_video_frame(&mut buf).unwrap());
        assert_eq!(&buf, expected);
    }
    for expected in &audio_frames {
        assert!(reader.read_audio_frame(&mut buf).unwrap());
        assert_eq!(&buf, expected);
    }
}

/// Hybrid mode with a tiny forced segment ceiling: exercises segment rolling,
/// per-segment `ixNN` chunk indexes, the first segment's merged `idx1`, and
/// the index-offset invariant (segment_base + entry.offset == absolute
/// payload start) across multiple segments.
#[test]
fn hybrid_mode_rolls_segments_and_round_trips() {
    let frame = make_frame(7, 900);
    let frame_count = 40;

    let mut writer = AviContainer::create_writer_with_limits(
        Cursor::new(Vec::new()),
        WriteMode::Hybrid,
        2_000_000_000,
        9000, // small soft limit: forces a new segment every handful of frames
    )
    .unwrap();
    writer.set_video("cam0", 160, 120, 24.0, MJPG).unwrap();
    for _ in 0..frame_count {
        writer.write_video_frame(&frame, true).unwrap();
    }
    let cursor = writer.close().unwrap().unwrap();

    let mut reader = AviContainer::open_reader(cursor, OpenOptions { auto_index: false }).unwrap();
    let info = reader.info().unwrap();
    assert!(info.segment_count > 1, "expected segment rolling, got {}", info.segment_count);
    assert!(info.has_index);
    assert_eq!(reader.video_frame_count().unwrap(), frame_count);

    let mut buf = Vec::new();
    for _ in 0..frame_count {
        assert!(reader.read_video_frame(&mut buf).unwrap());
        assert_eq!(buf, frame);
    }
    assert!(!reader.read_video_frame(&mut buf).unwrap());
}

/// Truncating a hybrid file to the first segment's declared RIFF size must
/// still yield a valid legacy file whose first-segment frames read back
/// identically (the "hybrid compatibility" property).
#[test]
fn hybrid_truncated_to_first_segment_is_valid_legacy_file() {
    let frame = make_frame(3, 900);
    let frame_count = 40;

    let mut writer = AviContainer::create_writer_with_limits(
        Cursor::new(Vec::new()),
        WriteMode::Hybrid,
        2_000_000_000,
        9000,
    )
    .unwrap();
    writer.set_video("cam0", 160, 120, 24.0, MJPG).unwrap();
    for _ in 0..frame_count {
        writer.write_video_frame(&frame, true).unwrap();
    }
    let bytes = writer.close().unwrap().unwrap().into_inner();

    // Re-derive the first segment's declared size directly from the RIFF
    // header (bytes 4..8, little-endian) and truncate there.
    let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let first_segment_len = 8 + riff_size as usize;
    assert!(first_segment_len < bytes.len(), "test fixture didn't actually roll a second segment");
    let truncated = bytes[..first_segment_len].to_vec();

    let mut reader = AviContainer::open_reader(Cursor::new(truncated), OpenOptions { auto_index: false }).unwrap();
    let info = reader.info().unwrap();
    assert_eq!(info.segment_count, 1);
    assert!(info.has_index);

    let mut buf = Vec::new();
    let mut count = 0;
    while reader.read_video_frame(&mut buf).unwrap() {
        assert_eq!(buf, frame);
        count += 1;
    }
    assert!(count > 0, "expected at least one frame in the truncated first segment");
    assert!(count < frame_count, "truncated file should not contain every frame");
}

/// Auto-index equivalence: zeroing out `idx1` and reopening with auto-index
/// enabled must reconstruct a video index with the same frame count and the
/// same (offset, size) pairs as the original index.
#[test]
fn auto_index_matches_idx1_after_zeroing() {
    let mut writer = AviContainer::create_writer(Cursor::new(Vec::new()), WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 320, 240, 30.0, MJPG).unwrap();
    let frames: Vec<Vec<u8>> = (0..25u8).map(|i| make_frame(i, 777)).collect();
    for f in &frames {
        writer.write_video_frame(f, true).unwrap();
    }
    let bytes = writer.close().unwrap().unwrap().into_inner();

    let mut with_idx = AviReader::open(Cursor::new(bytes.clone()), OpenOptions { auto_index: false }).unwrap();
    assert_eq!(with_idx.video_frame_count(), frames.len());

    // Zero the idx1 payload (but keep its tag/size so segment discovery and
    // the hdrl/movi walk are unaffected) to force auto-index synthesis.
    let idx1_tag = bytes.windows(4).position(|w| w == b"idx1").expect("idx1 tag present");
    let idx1_size = u32::from_le_bytes(bytes[idx1_tag + 4..idx1_tag + 8].try_into().unwrap()) as usize;
    let mut zeroed = bytes.clone();
    for b in &mut zeroed[idx1_tag + 8..idx1_tag + 8 + idx1_size] {
        *b = 0;
    }

    let mut auto = AviReader::open(Cursor::new(zeroed), OpenOptions { auto_index: true }).unwrap();
    assert_eq!(auto.video_frame_count(), with_idx.video_frame_count());

    let mut buf_a = Vec::new();
    let mut buf_b = Vec::new();
    for _ in 0..frames.len() {
        assert!(with_idx.read_video_frame(&mut buf_a).unwrap());
        assert!(auto.read_video_frame(&mut buf_b).unwrap());
        assert_eq!(buf_a, buf_b);
    }
}

/// Scenario 5: 17 audio channels is rejected up front; video-only writing
/// still produces a valid file.
#[test]
fn seventeen_channels_rejected_video_still_valid() {
    let mut writer = AviContainer::create_writer(Cursor::new(Vec::new()), WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 320, 240, 30.0, MJPG).unwrap();
    let err = writer.set_audio("mic0", 17, 48_000, 16, 1).unwrap_err();
    assert!(matches!(err, AviError::TooManyChannels));

    let frame = make_frame(1, 500);
    writer.write_video_frame(&frame, true).unwrap();
    // No audio stream configured: writing audio must fail, not silently no-op.
    assert!(writer.write_audio_frame(&frame).is_err());
    let cursor = writer.close().unwrap().unwrap();

    let mut reader = AviContainer::open_reader(cursor, OpenOptions { auto_index: false }).unwrap();
    assert!(reader.info().unwrap().audio.is_none());
    assert_eq!(reader.video_frame_count().unwrap(), 1);
}

/// `set_video` after the first frame is a function-order error, not silently
/// accepted or silently ignored.
#[test]
fn set_video_after_first_frame_is_rejected() {
    let mut writer = AviContainer::create_writer(Cursor::new(Vec::new()), WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 320, 240, 30.0, MJPG).unwrap();
    writer.write_video_frame(&make_frame(0, 10), true).unwrap();
    let err = writer.set_video("cam0", 640, 480, 30.0, MJPG).unwrap_err();
    assert!(matches!(err, AviError::FunctionOrder));
}

/// Opening a handle for writing and then calling a read-only op (or vice
/// versa) is rejected with `WrongMode`, never silently misinterpreted.
#[test]
fn wrong_mode_operations_are_rejected() {
    let mut writer = AviContainer::create_writer(Cursor::new(Vec::new()), WriteMode::StrictLegacy).unwrap();
    assert!(matches!(writer.seek_start().unwrap_err(), AviError::WrongMode));
    assert!(matches!(writer.video_frame_count().unwrap_err(), AviError::WrongMode));

    writer.set_video("cam0", 320, 240, 30.0, MJPG).unwrap();
    writer.write_video_frame(&make_frame(0, 10), true).unwrap();
    let cursor = writer.close().unwrap().unwrap();

    let mut reader = AviContainer::open_reader(cursor, OpenOptions { auto_index: false }).unwrap();
    assert!(matches!(reader.set_video("x", 1, 1, 1.0, MJPG).unwrap_err(), AviError::WrongMode));
    assert!(matches!(reader.write_video_frame(&[0], true).unwrap_err(), AviError::WrongMode));
}

/// A frame-write failure poisons the handle: every later write attempt
/// returns an error too, rather than leaving the file in a partially-broken
/// state that later writes might silently paper over.
#[test]
fn write_failure_poisons_the_handle() {
    let mut writer = AviContainer::create_writer(Cursor::new(Vec::new()), WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 320, 240, 30.0, MJPG).unwrap();

    // An empty frame buffer is rejected by the write-frame algorithm itself,
    // not by a precondition check, so it must poison the handle.
    assert!(writer.write_video_frame(&[], true).is_err());
    let err = writer.write_video_frame(&make_frame(0, 10), true).unwrap_err();
    assert!(matches!(err, AviError::StructBad));
}

/// Index-offset invariant, checked directly against raw bytes: for every
/// in-memory entry, `segment_base + entry.offset` is the absolute file
/// position of that chunk's payload, so re-reading at that position through
/// a fresh cursor recovers the exact bytes without going through the
/// reader's own frame-advance bookkeeping.
#[test]
fn index_offsets_address_exact_payload_bytes() {
    use std::io::{Read, Seek, SeekFrom};

    let mut writer = AviContainer::create_writer(Cursor::new(Vec::new()), WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 320, 240, 30.0, MJPG).unwrap();
    let frames: Vec<Vec<u8>> = (0..10u8).map(|i| make_frame(i, 123)).collect();
    for f in &frames {
        writer.write_video_frame(f, true).unwrap();
    }
    let bytes = writer.close().unwrap().unwrap().into_inner();

    // Segment 0 starts at file offset 0 for a single-segment file, so the
    // reader's public frame reads already prove this, but we additionally
    // confirm the on-disk idx1 entries agree: each addresses a chunk tag
    // whose payload (8 bytes later) matches the expected frame bytes.
    let mut cur = Cursor::new(bytes);
    let idx1_tag = {
        let all = cur.get_ref().clone();
        all.windows(4).position(|w| w == b"idx1").expect("idx1 present")
    };
    let size = {
        cur.seek(SeekFrom::Start(idx1_tag as u64 + 4)).unwrap();
        let mut b = [0u8; 4];
        cur.read_exact(&mut b).unwrap();
        u32::from_le_bytes(b)
    };
    let entry_count = size / 16;
    assert_eq!(entry_count as usize, frames.len());

    for i in 0..entry_count {
        let entry_off = idx1_tag as u64 + 8 + i as u64 * 16;
        cur.seek(SeekFrom::Start(entry_off + 8)).unwrap(); // skip ckid+flags to offset field
        let mut b = [0u8; 4];
        cur.read_exact(&mut b).unwrap();
        let chunk_offset = u32::from_le_bytes(b);
        cur.read_exact(&mut b).unwrap();
        let chunk_size = u32::from_le_bytes(b);

        cur.seek(SeekFrom::Start(chunk_offset as u64 + 8)).unwrap();
        let mut payload = vec![0u8; chunk_size as usize];
        cur.read_exact(&mut payload).unwrap();
        assert_eq!(payload, frames[i as usize], "idx1 entry {i} addresses the wrong bytes");
    }
}
