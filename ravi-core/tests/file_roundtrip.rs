//! Exercises the real-filesystem entry points (`AviContainer::create_write`/
//! `open_read`, backed by `std::fs::File`) rather than an in-memory `Cursor`,
//! using `tempfile` for a scratch directory that's cleaned up automatically.
//! The in-memory tests elsewhere in this suite cover parsing/writing logic
//! exhaustively; this file's job is narrower: prove the `File`-backed paths
//! (and their filesystem-specific error cases) actually work.

use ravi_core::container::AviContainer;
use ravi_core::error::AviError;
use ravi_core::fourcc::FourCc;
use ravi_core::reader::OpenOptions;
use ravi_core::writer::WriteMode;

const MJPG: FourCc = FourCc::ascii(b"MJPG");

#[test]
fn write_then_read_back_a_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.avi");

    let mut writer = AviContainer::create_write(&path, WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 176, 144, 30.0, MJPG).unwrap();
    let frames: Vec<Vec<u8>> = (0..15u8).map(|i| vec![i; 500]).collect();
    for f in &frames {
        writer.write_video_frame(f, true).unwrap();
    }
    writer.close().unwrap();

    let mut reader = AviContainer::open_read(&path).unwrap();
    assert_eq!(reader.video_frame_count().unwrap(), frames.len());
    let mut buf = Vec::new();
    for expected in &frames {
        assert!(reader.read_video_frame(&mut buf).unwrap());
        assert_eq!(&buf, expected);
    }
}

#[test]
fn open_read_on_missing_path_is_not_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist.avi");
    let err = AviContainer::open_read(&missing).unwrap_err();
    assert!(matches!(err, AviError::NotExist));
}

#[test]
fn create_write_truncates_an_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overwrite-me.avi");
    std::fs::write(&path, b"stale contents from a previous run").unwrap();

    let mut writer = AviContainer::create_write(&path, WriteMode::StrictLegacy).unwrap();
    writer.set_video("cam0", 64, 48, 24.0, MJPG).unwrap();
    writer.write_video_frame(&[1, 2, 3, 4], true).unwrap();
    writer.close().unwrap();

    let mut reader = AviContainer::open_read_with(&path, OpenOptions { auto_index: false }).unwrap();
    assert_eq!(reader.video_frame_count().unwrap(), 1);
    let mut buf = Vec::new();
    assert!(reader.read_video_frame(&mut buf).unwrap());
    assert_eq!(buf, vec![1, 2, 3, 4]);
}
