//! Error taxonomy for the AVI container engine.
//!
//! Mirrors the classic AVI toolkits' `errvals` enum one-for-one so that
//! callers porting error-code checks from that world find a matching variant
//! here, but expressed as a `thiserror` enum instead of a table of integers
//! plus a side-channel "last error" slot.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type AviResult<T> = Result<T, AviError>;

#[derive(Debug, Error)]
pub enum AviError {
    #[error("file does not exist")]
    NotExist,

    #[error("cannot create file")]
    CantCreate,

    #[error("operation not valid in this open mode")]
    WrongMode,

    #[error("no video stream configured")]
    MissingVideo,

    #[error("no usable index found and auto-index was not requested")]
    NoIndex,

    #[error("caller-supplied buffer is too small for this chunk")]
    BufferTooSmall,

    #[error("end of stream")]
    Eof,

    #[error("audio channel count exceeds the supported maximum of 16")]
    TooManyChannels,

    #[error("parameter out of range: {0}")]
    BadParameter(&'static str),

    #[error("set-video/set-audio called after the first frame was written")]
    FunctionOrder,

    #[error("index growth would overflow 32-bit arithmetic")]
    Overflow,

    #[error("file requires more than 128 RIFF segments")]
    TooManySegments,

    #[error("geometry or frame rate outside the supported range")]
    NotSupported,

    #[error("the file is structurally corrupted: {0}")]
    Corrupted(&'static str),

    #[error("operation attempted on a handle already poisoned by a prior write error")]
    StructBad,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Pure, bounded lookup mirroring `AVI_StrError`'s fixed wording, for callers
/// that want a stable string independent of `Display` formatting (e.g. the
/// demo CLI's `--explain-error` diagnostic).
pub fn error_string(err: &AviError) -> &'static str {
    match err {
        AviError::NotExist => "file does not exist",
        AviError::CantCreate => "cannot create file",
        AviError::WrongMode => "operation not valid in this open mode",
        AviError::MissingVideo => "no video stream configured",
        AviError::NoIndex => "no usable index found and auto-index was not requested",
        AviError::BufferTooSmall => "caller-supplied buffer is too small for this chunk",
        AviError::Eof => "end of stream",
        AviError::TooManyChannels => "audio channel count exceeds the supported maximum of 16",
        AviError::BadParameter(_) => "parameter out of range",
        AviError::FunctionOrder => "set-video/set-audio called after the first frame was written",
        AviError::Overflow => "index growth would overflow 32-bit arithmetic",
        AviError::TooManySegments => "file requires more than 128 RIFF segments",
        AviError::NotSupported => "geometry or frame rate outside the supported range",
        AviError::Corrupted(_) => "the file is structurally corrupted",
        AviError::StructBad => "operation attempted on a handle already poisoned by a prior write error",
        AviError::Io(_) => "I/O error",
    }
}
