//! Error types for the watermark-timeline crate.

/// Errors that can occur while analysing a video for watermarks.
///
/// Missing frames, probe failures and an absent OCR backend are not errors:
/// they degrade the analysis and are reported on the result instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every sampled timestamp failed to produce a frame.
    #[error("no usable frames: all {attempted} sampled timestamps failed to extract")]
    NoUsableFrames {
        /// Number of timestamps that were attempted.
        attempted: usize,
    },

    /// The frame is too small to hold an in-bounds region of the minimum size.
    #[error("frame too small ({width}x{height}) for an in-bounds removal region")]
    FrameTooSmall {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
    },

    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configurable text pattern failed to compile.
    #[error("invalid text pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// An I/O error occurred while reading files or running external tools.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An image could not be decoded.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// A JSON document could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
