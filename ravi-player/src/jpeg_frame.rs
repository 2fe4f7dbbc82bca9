//! Decodes the compressed payloads `AviContainer::read_video_frame` returns.
//!
//! Like audio output, frame decode is an external collaborator the container
//! engine hands raw bytes to and never touches itself - ravi-core only ever
//! sees opaque `&[u8]` chunk payloads.

use anyhow::{Context, Result};

/// One decoded frame, tightly packed RGB8, row-major, no padding.
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

pub fn decode_mjpeg(payload: &[u8]) -> Result<DecodedFrame> {
    let img = image::load_from_memory(payload).context("decoding MJPEG payload")?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(DecodedFrame { width, height, rgb: rgb.into_raw() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_payload() {
        assert!(decode_mjpeg(&[0u8; 16]).is_err());
    }
}
