//! Tunable detection policy.
//!
//! Every heuristic threshold used by the analysis lives here with its
//! documented default. All structs use `#[serde(default)]`, so a JSON file
//! only needs to name the values it overrides:
//!
//! ```json
//! { "merger": { "max_width": 400 }, "selector": { "dynamic_regions": false } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::selector::Treatment;

/// Complete analysis configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Which timestamps are sampled and fallbacks for the video probe.
    pub sampling: SamplingConfig,
    /// Region proposal heuristics.
    pub proposer: ProposerConfig,
    /// Watermark text vocabulary and patterns.
    pub text: TextConfig,
    /// Per-frame merging.
    pub merger: MergerConfig,
    /// Cross-frame grouping and movement classification.
    pub timeline: TimelineConfig,
    /// Final timeline selection and plan shape.
    pub selector: SelectorConfig,
}

impl DetectorConfig {
    /// Parse a JSON document, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed JSON and [`Error::InvalidConfig`]
    /// if a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise the same
    /// errors as [`DetectorConfig::from_json_str`].
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check every value against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let s = &self.sampling;
        positive("sampling.interval", s.interval)?;
        non_negative("sampling.start_offset", s.start_offset)?;
        non_negative("sampling.end_margin", s.end_margin)?;
        nonzero("sampling.max_samples", s.max_samples)?;
        positive("sampling.fallback_duration", s.fallback_duration)?;
        nonzero("sampling.fallback_width", s.fallback_width)?;
        nonzero("sampling.fallback_height", s.fallback_height)?;

        let p = &self.proposer;
        fraction("proposer.corner_fraction", p.corner_fraction)?;
        fraction("proposer.edge_fraction", p.edge_fraction)?;
        nonzero("proposer.grid_size", p.grid_size)?;
        nonzero("proposer.large_region_side", p.large_region_side)?;
        nonzero("proposer.full_frame_max_dim", p.full_frame_max_dim)?;
        unit("proposer.strong_confidence", p.strong_confidence)?;
        unit("proposer.watermark_confidence", p.watermark_confidence)?;
        unit("proposer.text_confidence", p.text_confidence)?;
        unit("proposer.min_ocr_confidence", p.min_ocr_confidence)?;
        unit("proposer.shape_confidence_scale", p.shape_confidence_scale)?;
        unit("proposer.component_max_fraction", p.component_max_fraction)?;
        unit("proposer.component_min_fill", p.component_min_fill)?;
        nonzero("proposer.adaptive_block", p.adaptive_block)?;
        nonzero("proposer.edge_block", p.edge_block)?;
        unit("proposer.edge_min_density", p.edge_min_density)?;
        if p.component_min_aspect > p.component_max_aspect {
            return Err(Error::InvalidConfig(
                "proposer.component_min_aspect exceeds component_max_aspect".to_string(),
            ));
        }

        nonzero("text.short_text_len", self.text.short_text_len)?;

        let m = &self.merger;
        unit("merger.overlap_threshold", m.overlap_threshold)?;
        unit("merger.span_pad_ratio", m.span_pad_ratio)?;
        nonzero("merger.max_width", m.max_width)?;
        nonzero("merger.max_height", m.max_height)?;
        nonzero("merger.single_pad_divisor", m.single_pad_divisor)?;
        nonzero("merger.max_texts", m.max_texts)?;

        let t = &self.timeline;
        unit("timeline.min_confidence", t.min_confidence)?;
        unit("timeline.short_text_min_confidence", t.short_text_min_confidence)?;
        unit("timeline.strong_confidence", t.strong_confidence)?;
        unit("timeline.long_text_confidence", t.long_text_confidence)?;
        unit("timeline.singleton_min_confidence", t.singleton_min_confidence)?;
        nonzero("timeline.max_candidates", t.max_candidates)?;
        positive("timeline.watermark_boost", f64::from(t.watermark_boost))?;
        positive("timeline.axis_dominance", t.axis_dominance)?;
        non_negative("timeline.static_variance", t.static_variance)?;

        let sel = &self.selector;
        unit("selector.min_confidence", sel.min_confidence)?;
        unit("selector.combine_min_confidence", sel.combine_min_confidence)?;
        nonzero("selector.min_region_side", sel.min_region_side)?;
        nonzero("selector.max_combined", sel.max_combined)?;
        positive("selector.last_segment_duration", sel.last_segment_duration)?;

        Ok(())
    }
}

fn unit(name: &str, v: impl Into<f64>) -> Result<()> {
    let v = v.into();
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} must be in [0, 1], got {v}")))
    }
}

fn fraction(name: &str, v: f32) -> Result<()> {
    if v > 0.0 && v <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} must be in (0, 1], got {v}")))
    }
}

fn positive(name: &str, v: f64) -> Result<()> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} must be positive, got {v}")))
    }
}

fn non_negative(name: &str, v: f64) -> Result<()> {
    if v >= 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} must not be negative, got {v}")))
    }
}

fn nonzero<T: PartialEq + Default>(name: &str, v: T) -> Result<()> {
    if v == T::default() {
        Err(Error::InvalidConfig(format!("{name} must be non-zero")))
    } else {
        Ok(())
    }
}

/// Timestamp schedule and probe fallbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Seconds between samples.
    pub interval: f64,
    /// First sample time.
    pub start_offset: f64,
    /// Samples stop this many seconds before the end.
    pub end_margin: f64,
    /// Below this many samples the schedule becomes start/middle/end.
    pub min_samples: usize,
    /// Upper bound on the number of samples; longer videos get a wider step.
    pub max_samples: usize,
    /// Frame width assumed when probing fails.
    pub fallback_width: u32,
    /// Frame height assumed when probing fails.
    pub fallback_height: u32,
    /// Duration assumed when probing fails, in seconds.
    pub fallback_duration: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: 2.0,
            start_offset: 1.0,
            end_margin: 1.0,
            min_samples: 3,
            max_samples: 1000,
            fallback_width: 1920,
            fallback_height: 1080,
            fallback_duration: 60.0,
        }
    }
}

/// Region proposal heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposerConfig {
    /// Scan the four corners and four edge centers.
    pub corner_scan: bool,
    /// Scan the four wide edge strips.
    pub edge_scan: bool,
    /// Scan the outer ring of a grid for watermarks in unusual places.
    pub grid_scan: bool,
    /// Run OCR over the (downscaled) whole frame.
    pub full_frame_scan: bool,
    /// Run the edge-density heuristic when OCR finds nothing watermark-like.
    pub edge_density_scan: bool,
    /// Run the bright-overlay colour heuristic when OCR finds nothing watermark-like.
    pub color_scan: bool,
    /// Corner region size relative to the frame.
    pub corner_fraction: f32,
    /// Edge strip thickness relative to the frame.
    pub edge_fraction: f32,
    /// Grid cells per side; the inner `(n-2) x (n-2)` cells are skipped.
    pub grid_size: u32,
    /// Regions narrower or shorter than this are not sent to OCR.
    pub min_region_side: u32,
    /// Regions with a side above this are read whole first, then quartered.
    pub large_region_side: u32,
    /// Maximum quartering depth for large regions.
    pub max_split_depth: u32,
    /// The full-frame pass downscales the frame to this larger side.
    pub full_frame_max_dim: u32,
    /// A watermark-like read at or above this stops further splitting.
    pub strong_confidence: f32,
    /// Confidence given to watermark-like OCR text.
    pub watermark_confidence: f32,
    /// Confidence given to other OCR text.
    pub text_confidence: f32,
    /// OCR reads below this engine confidence are ignored.
    pub min_ocr_confidence: f32,
    /// Multiplier applied to shape-only detections.
    pub shape_confidence_scale: f32,
    /// Component filter: minimum width (exclusive).
    pub component_min_width: u32,
    /// Component filter: minimum height (exclusive).
    pub component_min_height: u32,
    /// Component filter: maximum side as a fraction of the scanned region.
    pub component_max_fraction: f32,
    /// Component filter: minimum height / width.
    pub component_min_aspect: f32,
    /// Component filter: maximum height / width.
    pub component_max_aspect: f32,
    /// Component filter: minimum pixel count (exclusive).
    pub component_min_area: u32,
    /// Component filter: minimum fill ratio (exclusive).
    pub component_min_fill: f32,
    /// Adaptive threshold neighbourhood size.
    pub adaptive_block: u32,
    /// Adaptive threshold offset in 8-bit grey levels.
    pub adaptive_offset: f32,
    /// Edge-density block size in pixels.
    pub edge_block: u32,
    /// Sobel magnitude above which a pixel counts as an edge.
    pub edge_magnitude: f32,
    /// Fraction of edge pixels for a block to count as dense.
    pub edge_min_density: f32,
    /// Minimum channel value for the bright-overlay mask.
    pub overlay_min_value: u8,
    /// Maximum channel spread for the bright-overlay mask.
    pub overlay_max_spread: u8,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            corner_scan: true,
            edge_scan: true,
            grid_scan: true,
            full_frame_scan: true,
            edge_density_scan: true,
            color_scan: true,
            corner_fraction: 0.3,
            edge_fraction: 0.2,
            grid_size: 6,
            min_region_side: 20,
            large_region_side: 400,
            max_split_depth: 3,
            full_frame_max_dim: 800,
            strong_confidence: 0.7,
            watermark_confidence: 0.8,
            text_confidence: 0.5,
            min_ocr_confidence: 0.1,
            shape_confidence_scale: 0.7,
            component_min_width: 20,
            component_min_height: 10,
            component_max_fraction: 0.8,
            component_min_aspect: 0.2,
            component_max_aspect: 2.0,
            component_min_area: 100,
            component_min_fill: 0.3,
            adaptive_block: 11,
            adaptive_offset: 2.0,
            edge_block: 24,
            edge_magnitude: 0.5,
            edge_min_density: 0.1,
            overlay_min_value: 180,
            overlay_max_spread: 50,
        }
    }
}

/// Watermark vocabulary and text patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Domain suffixes that mark URL-like text.
    pub url_suffixes: Vec<String>,
    /// Promotional / streaming keywords.
    pub promo_keywords: Vec<String>,
    /// Copyright and trademark marks.
    pub glyphs: Vec<String>,
    /// Texts shorter than this are flagged if they contain any keyword.
    pub short_text_len: usize,
    /// Known watermark phrases; OCR fragments of these count as watermark text.
    pub vocabulary: Vec<String>,
    /// Regular expressions for timestamps and frame counters.
    pub counter_patterns: Vec<String>,
}

impl Default for TextConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(ToString::to_string).collect();
        Self {
            url_suffixes: strings(&["com", "net", "org", "tv", "me", "io"]),
            promo_keywords: strings(&[
                "free",
                "download",
                "stream",
                "watch",
                "hd",
                "1080p",
                "720p",
                "4k",
                "subscribe",
                "follow",
                "movie",
                "drama",
                "watermark",
                "logo",
                "copyright",
            ]),
            glyphs: strings(&["©", "®", "™", "(c)"]),
            short_text_len: 30,
            vocabulary: strings(&["moving watermark", "watermark", "copyright notice"]),
            counter_patterns: strings(&[r"\b\d{1,2}:\d{2}", r"(?i)fps", r"(?i)frame", r"(?i)\bsec\b"]),
        }
    }
}

/// Per-frame detection merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    /// Overlap ratio above which two detections merge.
    pub overlap_threshold: f64,
    /// Center distance below which two text detections merge.
    pub proximity: f64,
    /// Maximum vertical offset for the proximity rule.
    pub alignment: u32,
    /// Cluster padding as a fraction of the cluster span.
    pub span_pad_ratio: f64,
    /// Horizontal cluster padding floor.
    pub min_pad_x: u32,
    /// Horizontal cluster padding cap.
    pub max_pad_x: u32,
    /// Vertical cluster padding floor.
    pub min_pad_y: u32,
    /// Vertical cluster padding cap.
    pub max_pad_y: u32,
    /// Hard maximum merged width.
    pub max_width: u32,
    /// Hard maximum merged height.
    pub max_height: u32,
    /// Maximum self-padding for an unmatched detection.
    pub single_pad_max: u32,
    /// Unmatched detections are padded by at most `side / single_pad_divisor`.
    pub single_pad_divisor: u32,
    /// Maximum distinct texts joined into the combined text.
    pub max_texts: usize,
    /// Maximum combined text length in characters.
    pub max_text_len: usize,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.3,
            proximity: 30.0,
            alignment: 20,
            span_pad_ratio: 0.05,
            min_pad_x: 5,
            max_pad_x: 15,
            min_pad_y: 3,
            max_pad_y: 10,
            max_width: 300,
            max_height: 100,
            single_pad_max: 8,
            single_pad_divisor: 8,
            max_texts: 3,
            max_text_len: 80,
        }
    }
}

/// Cross-frame grouping and movement classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Detections below this confidence are noise.
    pub min_confidence: f32,
    /// Texts shorter than this many characters need `short_text_min_confidence`.
    pub min_text_len: usize,
    /// Confidence that lets a short or text-less detection through.
    pub short_text_min_confidence: f32,
    /// Score multiplier for detections with watermark indicators.
    pub watermark_boost: f32,
    /// Confidence above which a detection counts as a watermark indicator.
    pub strong_confidence: f32,
    /// Texts at least this long with `long_text_confidence` count as indicators.
    pub long_text_len: usize,
    /// See `long_text_len`.
    pub long_text_confidence: f32,
    /// Candidates kept after scoring.
    pub max_candidates: usize,
    /// Texts at most this long are short fragments.
    pub short_fragment_len: usize,
    /// Time window for short fragments, in seconds.
    pub fragment_window: f64,
    /// Horizontal distance bound for short fragments.
    pub fragment_max_dx: f64,
    /// Vertical distance bound for short fragments.
    pub fragment_max_dy: f64,
    /// Total horizontal range allowed for a watermark text group.
    pub watermark_max_x_range: u32,
    /// Total vertical range allowed for a watermark text group.
    pub watermark_max_y_range: u32,
    /// Time window for ordinary (non-watermark) text.
    pub text_window: f64,
    /// Horizontal distance bound for ordinary text.
    pub text_max_dx: f64,
    /// Vertical distance bound for ordinary text.
    pub text_max_dy: f64,
    /// Time window for purely spatial grouping.
    pub spatial_window: f64,
    /// Horizontal distance bound for purely spatial grouping.
    pub spatial_max_dx: f64,
    /// Vertical distance bound for purely spatial grouping.
    pub spatial_max_dy: f64,
    /// Single-detection groups survive only at or above this confidence
    /// (or when flagged as watermark text).
    pub singleton_min_confidence: f32,
    /// Position variance (px²) at or below which an axis counts as still.
    pub static_variance: f64,
    /// One axis dominates when its variance exceeds the other by this factor.
    pub axis_dominance: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_text_len: 2,
            short_text_min_confidence: 0.7,
            watermark_boost: 2.0,
            strong_confidence: 0.8,
            long_text_len: 3,
            long_text_confidence: 0.6,
            max_candidates: 20,
            short_fragment_len: 2,
            fragment_window: 5.0,
            fragment_max_dx: 100.0,
            fragment_max_dy: 50.0,
            watermark_max_x_range: 500,
            watermark_max_y_range: 300,
            text_window: 3.0,
            text_max_dx: 200.0,
            text_max_dy: 100.0,
            spatial_window: 3.0,
            spatial_max_dx: 150.0,
            spatial_max_dy: 80.0,
            singleton_min_confidence: 0.8,
            static_variance: 100.0,
            axis_dominance: 2.0,
        }
    }
}

/// Timeline selection and plan shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Timelines below this confidence are never acted on.
    pub min_confidence: f32,
    /// Smallest region side the renderer accepts.
    pub min_region_side: u32,
    /// Watermark timelines at or above this confidence take part in combined removal.
    pub combine_min_confidence: f32,
    /// Up to this many simultaneous watermarks are removed as one combined area.
    pub max_combined: usize,
    /// Padding around the combined area.
    pub combined_padding: u32,
    /// Padding around each position of a moving watermark.
    pub moving_padding: u32,
    /// Emit per-segment regions for moving watermarks instead of one envelope.
    pub dynamic_regions: bool,
    /// Length of the final segment of a dynamic plan, in seconds.
    pub last_segment_duration: f64,
    /// Treatment requested from the renderer.
    pub treatment: Treatment,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_region_side: 2,
            combine_min_confidence: 0.7,
            max_combined: 3,
            combined_padding: 10,
            moving_padding: 10,
            dynamic_regions: true,
            last_segment_duration: 5.0,
            treatment: Treatment::Delogo,
        }
    }
}
