//! OCR capability contract.
//!
//! The analysis never depends on a particular OCR engine. Backends implement
//! [`TextRecognizer`]; when none is available the analysis runs with
//! [`NoOcr`] and falls back to shape heuristics.

use image::RgbImage;

use crate::geometry::Rect;

/// One piece of text read from an image.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    /// Recognized string, as returned by the engine.
    pub text: String,
    /// Engine confidence in `[0, 1]`.
    pub confidence: f32,
    /// Location of the text inside the queried image, when the engine reports
    /// word or line boxes. `None` means "somewhere in the queried image".
    pub bounds: Option<Rect>,
}

impl RecognizedText {
    /// Text without a location.
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            bounds: None,
        }
    }

    /// Text with a location relative to the queried image.
    pub fn with_bounds(text: impl Into<String>, confidence: f32, bounds: Rect) -> Self {
        Self {
            text: text.into(),
            confidence,
            bounds: Some(bounds),
        }
    }
}

/// An OCR engine.
///
/// Implementations must not fail: a region the engine cannot read yields an
/// empty list.
pub trait TextRecognizer: Send + Sync {
    /// Whether the engine can actually read text. When this is `false`
    /// the proposer skips every OCR pass.
    fn is_available(&self) -> bool {
        true
    }

    /// Read all text in `image`.
    fn recognize_text(&self, image: &RgbImage) -> Vec<RecognizedText>;
}

/// Stand-in used when no OCR backend is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOcr;

impl TextRecognizer for NoOcr {
    fn is_available(&self) -> bool {
        false
    }

    fn recognize_text(&self, _image: &RgbImage) -> Vec<RecognizedText> {
        Vec::new()
    }
}
