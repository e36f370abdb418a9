//! Per-frame watermark candidates.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Which heuristic produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    /// OCR over a corner or edge-center region.
    CornerScan,
    /// OCR over one of the wide edge strips.
    EdgeStripScan,
    /// OCR over a cell of the border grid.
    GridScan,
    /// OCR over a whole (possibly downscaled) frame or oversized region.
    OcrFullRegion,
    /// OCR over a single connected component.
    OcrSelective,
    /// Connected component that OCR could not read.
    ComponentShape,
    /// Block of dense edges.
    EdgeScan,
    /// Bright, colourless overlay area.
    ColorScan,
}

impl DetectionSource {
    /// Sources that localise text (or text-shaped blobs). Only these take
    /// part in the merger's proximity rule.
    #[must_use]
    pub const fn is_text_like(self) -> bool {
        matches!(
            self,
            Self::CornerScan
                | Self::EdgeStripScan
                | Self::GridScan
                | Self::OcrFullRegion | Self::OcrSelective | Self::ComponentShape
        )
    }
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CornerScan => "corner-scan",
            Self::EdgeStripScan => "edge-strip-scan",
            Self::GridScan => "grid-scan",
            Self::OcrFullRegion => "ocr-full-region",
            Self::OcrSelective => "ocr-selective",
            Self::ComponentShape => "component-shape",
            Self::EdgeScan => "edge-scan",
            Self::ColorScan => "color-scan",
        };
        f.write_str(name)
    }
}

/// A candidate watermark region found in one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Location in frame pixels.
    pub region: Rect,
    /// Heuristic score in `[0, 1]`.
    pub confidence: f32,
    /// Producing heuristic.
    pub source: DetectionSource,
    /// Name of the scanned area (`top_left`, `grid_0_3`, `full_frame`, ...).
    pub scan_region: String,
    /// Recognized text; empty for shape heuristics.
    pub text: String,
    /// Whether `text` looks like a watermark.
    pub is_watermark_text: bool,
    /// Timestamp of the sampled frame, in seconds.
    pub sample_time: f64,
    /// Index of the sample within the run.
    pub frame_index: usize,
}

impl Detection {
    /// Detection without text or timing. OCR reads add theirs with
    /// [`Detection::with_text`]; the analyzer stamps timing later.
    #[must_use]
    pub fn new(
        region: Rect,
        confidence: f32,
        source: DetectionSource,
        scan_region: impl Into<String>,
    ) -> Self {
        Self {
            region,
            confidence,
            source,
            scan_region: scan_region.into(),
            text: String::new(),
            is_watermark_text: false,
            sample_time: 0.0,
            frame_index: 0,
        }
    }

    /// Attach recognized text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>, is_watermark_text: bool) -> Self {
        self.text = text.into();
        self.is_watermark_text = is_watermark_text;
        self
    }

    /// Attach the sample this detection came from.
    #[must_use]
    pub fn at_sample(mut self, sample_time: f64, frame_index: usize) -> Self {
        self.sample_time = sample_time;
        self.frame_index = frame_index;
        self
    }

    /// Trimmed text length in characters.
    #[must_use]
    pub fn text_len(&self) -> usize {
        self.text.trim().chars().count()
    }
}

/// One consolidated watermark candidate within a frame.
///
/// `detection.region` is the padded (and possibly size-clamped) union of the
/// constituents; `detection.text` equals `combined_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDetection {
    /// Merged geometry, best confidence and combined text.
    pub detection: Detection,
    /// Number of raw detections folded in.
    pub constituent_count: usize,
    /// Deduplicated constituent texts, length-capped.
    pub combined_text: String,
    /// Unpadded union of the constituents' boxes.
    pub span: Rect,
}

impl MergedDetection {
    /// Merged region.
    #[must_use]
    pub const fn region(&self) -> Rect {
        self.detection.region
    }

    /// Merged confidence.
    #[must_use]
    pub const fn confidence(&self) -> f32 {
        self.detection.confidence
    }
}
