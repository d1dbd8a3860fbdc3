//! Typed failure kinds for the classification core.
//!
//! Every fallible function in the crate returns `anyhow::Result`. Failures that a caller
//! may want to branch on are raised as an `OccupancyError` and converted into
//! `anyhow::Error`; `error_kind` recovers the kind again.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Polygon with fewer than 3 points, empty or duplicate id, zero or self-intersecting
    /// area, or a zero-area rasterisation under strict mode.
    InvalidRegion,
    /// Frame with zero dimensions or a pixel buffer that does not match them.
    InvalidFrame,
    /// Bytes that could not be decoded into an image.
    FrameDecode,
    /// Threshold or kernel parameter outside its valid range.
    Configuration,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidRegion => "INVALID_REGION",
            ErrorKind::InvalidFrame => "INVALID_FRAME",
            ErrorKind::FrameDecode => "FRAME_DECODE_FAILURE",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
        }
    }
}

#[derive(Clone, Debug)]
pub struct OccupancyError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OccupancyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_region(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRegion, message)
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidFrame, message)
    }

    pub fn frame_decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FrameDecode, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }
}

impl std::fmt::Display for OccupancyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for OccupancyError {}

/// Kind of the first `OccupancyError` in the chain, if any.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<OccupancyError>())
        .map(|e| e.kind)
}
