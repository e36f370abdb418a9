//! The end-to-end analysis pipeline.

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::DetectorConfig;
use crate::detection::MergedDetection;
use crate::error::{Error, Result};
use crate::merger::DetectionMerger;
use crate::ocr::TextRecognizer;
use crate::proposer::RegionProposer;
use crate::selector::{RemovalPlan, TimelineSelector};
use crate::source::{probe_video, FrameSource, VideoInfo, VideoProbe};
use crate::text::{TextClassifier, TextSimilarity};
use crate::timeline::{TimelineBuilder, WatermarkTimeline};

/// Everything learned about one video.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Probed video properties, corrected to the decoded frame size.
    pub video: VideoInfo,
    /// Timestamps that were sampled.
    pub samples_attempted: usize,
    /// Samples that produced a frame.
    pub samples_used: usize,
    /// Whether OCR was available. Without it only shape heuristics ran.
    pub ocr_available: bool,
    /// Every surviving timeline, best first.
    pub timelines: Vec<WatermarkTimeline>,
    /// What to remove, if anything.
    pub plan: Option<RemovalPlan>,
}

impl AnalysisReport {
    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Samples a video, proposes and merges regions per frame, links them into
/// timelines and picks a removal plan.
///
/// Create once and reuse across videos.
#[derive(Debug)]
pub struct WatermarkAnalyzer {
    config: DetectorConfig,
    proposer: RegionProposer,
    merger: DetectionMerger,
    timelines: TimelineBuilder,
    selector: TimelineSelector,
}

impl WatermarkAnalyzer {
    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a value is out of range and
    /// [`Error::InvalidPattern`] if a text pattern does not compile.
    pub fn new(config: DetectorConfig, ocr: Box<dyn TextRecognizer>) -> Result<Self> {
        config.validate()?;
        let classifier = TextClassifier::new(&config.text)?;
        Ok(Self {
            proposer: RegionProposer::new(config.proposer.clone(), classifier, ocr),
            merger: DetectionMerger::new(config.merger.clone()),
            timelines: TimelineBuilder::new(&config)?,
            selector: TimelineSelector::new(config.selector.clone()),
            config,
        })
    }

    /// Replace the text similarity used to link timelines.
    #[must_use]
    pub fn with_similarity(mut self, similarity: impl TextSimilarity + 'static) -> Self {
        self.timelines = self.timelines.with_similarity(similarity);
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Whether the OCR backend can read text.
    #[must_use]
    pub fn ocr_available(&self) -> bool {
        self.proposer.ocr_available()
    }

    /// Sample times for a video of `duration` seconds.
    ///
    /// Samples start at the configured offset and step by the interval until
    /// the end margin. Videos too short for the minimum sample count get a
    /// start, middle and end sample instead. At most `max_samples` times are
    /// returned; when the interval would produce more, the step is widened to
    /// spread them over the whole video.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_timestamps(&self, duration: f64) -> Vec<f64> {
        let s = &self.config.sampling;
        let end = duration - s.end_margin;
        let span = end - s.start_offset;
        let mut step = s.interval;
        if span / step > s.max_samples as f64 {
            step = span / s.max_samples as f64;
            warn!(
                duration,
                max_samples = s.max_samples,
                step,
                "too many samples for the interval, widening the step"
            );
        }
        let mut times: Vec<f64> = (0_u32..)
            .map(|i| s.start_offset + f64::from(i) * step)
            .take_while(|t| *t < end)
            .take(s.max_samples)
            .collect();
        if times.len() < s.min_samples {
            times = vec![s.start_offset, duration / 2.0, end]
                .into_iter()
                .map(|t| t.clamp(0.0, duration.max(0.0)))
                .collect();
            times.sort_by(f64::total_cmp);
            times.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
        }
        times
    }

    /// Propose and merge regions in one frame.
    #[must_use]
    #[instrument(level = "debug", skip(self, frame), fields(width = frame.width(), height = frame.height()))]
    pub fn analyze_frame(
        &self,
        frame: &RgbImage,
        timestamp: f64,
        frame_index: usize,
    ) -> Vec<MergedDetection> {
        let raw: Vec<_> = self
            .proposer
            .propose(frame)
            .into_iter()
            .map(|d| d.at_sample(timestamp, frame_index))
            .collect();
        self.merger.merge(&raw, frame.width(), frame.height())
    }

    /// Run the whole pipeline on `source`.
    ///
    /// Frames that cannot be extracted are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoUsableFrames`] if no sampled frame could be
    /// extracted and [`Error::FrameTooSmall`] if the frames are too small to
    /// hold a removal region.
    #[instrument(skip_all)]
    pub fn analyze<S: FrameSource + VideoProbe + ?Sized>(&self, source: &S) -> Result<AnalysisReport> {
        let mut video = probe_video(source, &self.config.sampling);
        let times = source
            .timestamps()
            .unwrap_or_else(|| self.sample_timestamps(video.duration));
        info!(
            width = video.width,
            height = video.height,
            duration = video.duration,
            samples = times.len(),
            ocr = self.ocr_available(),
            "analysing video"
        );
        if !self.ocr_available() {
            warn!("OCR unavailable, falling back to shape heuristics only");
        }

        let process = |(index, &timestamp): (usize, &f64)| {
            let Some(frame) = source.extract_frame(timestamp) else {
                warn!(timestamp, "skipping sample, frame could not be extracted");
                return None;
            };
            let detections = self.analyze_frame(&frame, timestamp, index);
            Some((frame.dimensions(), detections))
        };

        #[cfg(feature = "parallel")]
        let frames: Vec<_> = {
            use rayon::prelude::*;
            times.par_iter().enumerate().map(process).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let frames: Vec<_> = times.iter().enumerate().map(process).collect();

        let frames: Vec<_> = frames.into_iter().flatten().collect();
        if frames.is_empty() {
            return Err(Error::NoUsableFrames {
                attempted: times.len(),
            });
        }

        if let Some(&((width, height), _)) = frames.first() {
            if (width, height) != (video.width, video.height) {
                debug!(width, height, "decoded frame size differs from probe");
                video.width = width;
                video.height = height;
            }
        }

        let samples_used = frames.len();
        let detections: Vec<MergedDetection> = frames
            .into_iter()
            .flat_map(|(_, detections)| detections)
            .collect();
        let timelines = self.timelines.build(&detections);
        let plan = self.selector.select(&timelines, &video)?;

        Ok(AnalysisReport {
            video,
            samples_attempted: times.len(),
            samples_used,
            ocr_available: self.ocr_available(),
            timelines,
            plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::ocr::NoOcr;

    struct Blank {
        size: (u32, u32),
        duration: Option<f64>,
        fail: bool,
    }

    impl FrameSource for Blank {
        fn extract_frame(&self, _timestamp: f64) -> Option<RgbImage> {
            (!self.fail).then(|| RgbImage::from_pixel(self.size.0, self.size.1, Rgb([12, 12, 12])))
        }
    }

    impl VideoProbe for Blank {
        fn dimensions(&self) -> Option<(u32, u32)> {
            None
        }

        fn duration(&self) -> Option<f64> {
            self.duration
        }
    }

    fn analyzer() -> WatermarkAnalyzer {
        WatermarkAnalyzer::new(DetectorConfig::default(), Box::new(NoOcr)).unwrap()
    }

    #[test]
    fn regular_schedule() {
        let times = analyzer().sample_timestamps(10.0);
        assert_eq!(times, vec![1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn short_videos_sample_start_middle_end() {
        let a = analyzer();
        assert_eq!(a.sample_timestamps(4.0), vec![1.0, 2.0, 3.0]);
        assert_eq!(a.sample_timestamps(2.0), vec![1.0]);
        assert_eq!(a.sample_timestamps(0.5), vec![0.0, 0.25, 0.5]);
    }

    #[test]
    fn huge_durations_are_capped() {
        let a = analyzer();
        let times = a.sample_timestamps(1e9);
        assert_eq!(times.len(), 1000);
        assert!((times[0] - 1.0).abs() < f64::EPSILON);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!(*times.last().unwrap() > 0.99e9);

        let mut config = DetectorConfig::default();
        config.sampling.max_samples = 5;
        let a = WatermarkAnalyzer::new(config, Box::new(NoOcr)).unwrap();
        assert_eq!(a.sample_timestamps(10.0), vec![1.0, 3.0, 5.0, 7.0]);
        assert_eq!(a.sample_timestamps(22.0), vec![1.0, 5.0, 9.0, 13.0, 17.0]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = DetectorConfig::default();
        config.sampling.interval = 0.0;
        assert!(matches!(
            WatermarkAnalyzer::new(config, Box::new(NoOcr)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn all_frames_failing_is_an_error() {
        let source = Blank {
            size: (64, 64),
            duration: Some(10.0),
            fail: true,
        };
        match analyzer().analyze(&source) {
            Err(Error::NoUsableFrames { attempted }) => assert_eq!(attempted, 4),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn blank_video_has_no_plan() {
        let source = Blank {
            size: (320, 180),
            duration: Some(10.0),
            fail: false,
        };
        let report = analyzer().analyze(&source).unwrap();
        assert_eq!(report.samples_attempted, 4);
        assert_eq!(report.samples_used, 4);
        assert!(!report.ocr_available);
        assert!(report.timelines.is_empty());
        assert!(report.plan.is_none());
        // The probe failed, so the decoded size wins over the fallback.
        assert_eq!((report.video.width, report.video.height), (320, 180));
        assert!(report.to_json().unwrap().contains("\"samples_used\": 4"));
    }
}
