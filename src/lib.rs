//! Find watermarks in a video, follow them over time and plan their removal.
//!
//! Frames are sampled at a fixed interval. In each frame a region proposer
//! reads the corners, edges and border grid with OCR and falls back to shape
//! heuristics when no watermark text turns up. Per-frame proposals are merged,
//! linked across frames into timelines by text similarity and position, and
//! each timeline's movement is classified. A selector finally turns the best
//! timelines into a [`RemovalPlan`]: either one static rectangle or a list of
//! timed rectangles that follow a moving watermark.
//!
//! # Quick Start
//!
//! ```no_run
//! use watermark_timeline::{DetectorConfig, FfmpegVideo, NoOcr, WatermarkAnalyzer};
//!
//! let analyzer = WatermarkAnalyzer::new(DetectorConfig::default(), Box::new(NoOcr))
//!     .expect("valid default config");
//! let video = FfmpegVideo::new("clip.mp4");
//! let report = analyzer.analyze(&video).expect("analysis failed");
//! match &report.plan {
//!     Some(plan) => println!("{} region(s), treatment {}", plan.regions.rects().len(), plan.treatment),
//!     None => println!("No watermark detected"),
//! }
//! ```
//!
//! # OCR
//!
//! No OCR engine is bundled. Implement [`TextRecognizer`] for your engine of
//! choice; with [`NoOcr`] the analysis still runs on shape, edge and colour
//! heuristics alone.

#![deny(missing_docs)]

pub mod analyzer;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod merger;
pub mod ocr;
pub mod proposer;
pub mod raster;
pub mod selector;
pub mod source;
pub mod text;
pub mod timeline;

pub use analyzer::{AnalysisReport, WatermarkAnalyzer};
pub use config::DetectorConfig;
pub use detection::{Detection, DetectionSource, MergedDetection};
pub use error::{Error, Result};
pub use geometry::Rect;
pub use ocr::{NoOcr, RecognizedText, TextRecognizer};
pub use selector::{RemovalPlan, RemovalRegions, TimedRegion, Treatment};
pub use source::{is_supported_image, FfmpegVideo, FrameDirectory, FrameSource, VideoInfo, VideoProbe};
pub use text::{FragmentSimilarity, TextClassifier, TextSimilarity};
pub use timeline::{MovementType, WatermarkTimeline};
