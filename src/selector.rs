//! Timeline selection and the removal plan handed to the renderer.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SelectorConfig;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::source::VideoInfo;
use crate::timeline::WatermarkTimeline;

/// Removal method requested from the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Treatment {
    /// Gaussian blur over the region.
    Blur,
    /// Interpolate from the region border.
    #[default]
    Delogo,
    /// Fill with black.
    Blackout,
    /// Content-aware fill.
    Inpaint,
    /// Mosaic.
    Pixelate,
    /// Let [`recommend_treatment`] decide.
    Auto,
}

impl Treatment {
    /// Lowercase name, as used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blur => "blur",
            Self::Delogo => "delogo",
            Self::Blackout => "blackout",
            Self::Inpaint => "inpaint",
            Self::Pixelate => "pixelate",
            Self::Auto => "auto",
        }
    }
}

impl std::fmt::Display for Treatment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Treatment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blur" => Ok(Self::Blur),
            "delogo" => Ok(Self::Delogo),
            "blackout" => Ok(Self::Blackout),
            "inpaint" => Ok(Self::Inpaint),
            "pixelate" => Ok(Self::Pixelate),
            "auto" => Ok(Self::Auto),
            other => Err(Error::InvalidConfig(format!("unknown treatment '{other}'"))),
        }
    }
}

/// Hint for how aggressively the renderer should treat a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    /// A single static watermark.
    Normal,
    /// Moving or combined watermarks; use a stronger blend.
    Strong,
}

/// Which selection rule produced the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// One timeline was acted on.
    Single,
    /// Several simultaneous watermarks removed as one area.
    Combined,
    /// Too many candidates; only the highest-priority one is removed.
    HighestPriorityFallback,
}

/// A region active during `[start_time, end_time)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedRegion {
    /// Area to treat.
    #[serde(flatten)]
    pub region: Rect,
    /// Start of the interval, in seconds.
    pub start_time: f64,
    /// End of the interval (exclusive), in seconds.
    pub end_time: f64,
}

/// Spatial shape of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "regions", rename_all = "lowercase")]
pub enum RemovalRegions {
    /// One region for the whole video.
    Static(Rect),
    /// Per-segment regions following a moving watermark.
    Timed(Vec<TimedRegion>),
}

impl RemovalRegions {
    /// Every rectangle in the plan.
    #[must_use]
    pub fn rects(&self) -> Vec<Rect> {
        match self {
            Self::Static(r) => vec![*r],
            Self::Timed(segments) => segments.iter().map(|s| s.region).collect(),
        }
    }
}

/// What the renderer should do. Every region lies inside the frame with a
/// one pixel margin and is at least the renderer's minimum size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalPlan {
    /// Regions to treat.
    pub regions: RemovalRegions,
    /// Removal method.
    pub treatment: Treatment,
    /// Strength hint.
    pub intensity: Intensity,
    /// Selection rule that was applied.
    pub strategy: SelectionStrategy,
    /// Identities of the timelines the plan covers.
    pub identities: Vec<String>,
    /// Frame width the regions were clamped to.
    pub frame_width: u32,
    /// Frame height the regions were clamped to.
    pub frame_height: u32,
}

/// Pick a treatment for `timeline` in a video of `duration` seconds.
///
/// Short videos and long text watermarks get inpainting; moving watermarks in
/// long videos get delogo; everything else gets inpainting.
#[must_use]
pub fn recommend_treatment(timeline: &WatermarkTimeline, duration: f64) -> Treatment {
    if duration < 30.0 || timeline.identity.chars().count() > 10 {
        Treatment::Inpaint
    } else if timeline.is_moving && duration > 60.0 {
        Treatment::Delogo
    } else {
        Treatment::Inpaint
    }
}

/// Chooses which timelines to act on and shapes the removal plan.
#[derive(Debug, Clone, Default)]
pub struct TimelineSelector {
    config: SelectorConfig,
}

impl TimelineSelector {
    /// Create a selector.
    #[must_use]
    pub const fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// Whether a timeline passes the confidence and size checks.
    #[must_use]
    pub fn is_usable(&self, timeline: &WatermarkTimeline) -> bool {
        let min_side = self.config.min_region_side;
        timeline.confidence >= self.config.min_confidence
            && timeline
                .envelope()
                .is_some_and(|r| r.width >= min_side && r.height >= min_side)
    }

    /// Build the removal plan. `Ok(None)` means no timeline is worth acting on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooSmall`] if the frame cannot hold a region of
    /// the minimum size.
    pub fn select(
        &self,
        timelines: &[WatermarkTimeline],
        video: &VideoInfo,
    ) -> Result<Option<RemovalPlan>> {
        let cfg = &self.config;
        let mut usable: Vec<&WatermarkTimeline> =
            timelines.iter().filter(|t| self.is_usable(t)).collect();
        if usable.is_empty() {
            info!(candidates = timelines.len(), "no usable watermark timeline");
            return Ok(None);
        }
        usable.sort_by(|a, b| priority(b, a));

        let high: Vec<&WatermarkTimeline> = usable
            .iter()
            .copied()
            .filter(|t| t.is_watermark && t.confidence >= cfg.combine_min_confidence)
            .collect();

        let plan = if high.len() > cfg.max_combined {
            info!(
                high_confidence = high.len(),
                "too many simultaneous watermarks, removing highest priority only"
            );
            self.single(usable[0], video, SelectionStrategy::HighestPriorityFallback)?
        } else if high.len() >= 2 {
            info!(count = high.len(), "removing simultaneous watermarks as one area");
            self.combined(&high, video)?
        } else {
            debug!(usable = usable.len(), "acting on best timeline");
            self.single(usable[0], video, SelectionStrategy::Single)?
        };
        Ok(Some(plan))
    }

    fn single(
        &self,
        timeline: &WatermarkTimeline,
        video: &VideoInfo,
        strategy: SelectionStrategy,
    ) -> Result<RemovalPlan> {
        let cfg = &self.config;
        let envelope = timeline.envelope().unwrap_or_default();

        let (regions, intensity) = if timeline.is_moving && cfg.dynamic_regions {
            (
                RemovalRegions::Timed(self.segments(timeline, video)?),
                Intensity::Strong,
            )
        } else if timeline.is_moving {
            let padded = envelope.expand(cfg.moving_padding, cfg.moving_padding);
            (
                RemovalRegions::Static(self.clamp(padded, video)?),
                Intensity::Strong,
            )
        } else {
            (
                RemovalRegions::Static(self.clamp(envelope, video)?),
                Intensity::Normal,
            )
        };

        Ok(RemovalPlan {
            regions,
            treatment: self.treatment(timeline, video),
            intensity,
            strategy,
            identities: vec![timeline.identity.clone()],
            frame_width: video.width,
            frame_height: video.height,
        })
    }

    fn combined(&self, timelines: &[&WatermarkTimeline], video: &VideoInfo) -> Result<RemovalPlan> {
        let pad = self.config.combined_padding;
        let union = Rect::bounding(timelines.iter().filter_map(|t| t.envelope()))
            .unwrap_or_default()
            .expand(pad, pad);
        Ok(RemovalPlan {
            regions: RemovalRegions::Static(self.clamp(union, video)?),
            treatment: self.treatment(timelines[0], video),
            intensity: Intensity::Strong,
            strategy: SelectionStrategy::Combined,
            identities: timelines.iter().map(|t| t.identity.clone()).collect(),
            frame_width: video.width,
            frame_height: video.height,
        })
    }

    /// One padded region per sighting, active until the next sighting. Sightings
    /// sharing a timestamp are united.
    fn segments(&self, timeline: &WatermarkTimeline, video: &VideoInfo) -> Result<Vec<TimedRegion>> {
        let cfg = &self.config;
        let mut grouped: Vec<(f64, Rect)> = Vec::new();
        for p in &timeline.positions {
            match grouped.last_mut() {
                Some((t, r)) if (*t - p.sample_time).abs() < f64::EPSILON => *r = r.union(&p.region),
                _ => grouped.push((p.sample_time, p.region)),
            }
        }

        let mut segments = Vec::with_capacity(grouped.len());
        for (i, &(start, region)) in grouped.iter().enumerate() {
            let end = grouped
                .get(i + 1)
                .map_or(start + cfg.last_segment_duration, |next| next.0);
            let padded = region.expand(cfg.moving_padding, cfg.moving_padding);
            segments.push(TimedRegion {
                region: self.clamp(padded, video)?,
                start_time: start,
                end_time: end,
            });
        }
        Ok(segments)
    }

    fn clamp(&self, region: Rect, video: &VideoInfo) -> Result<Rect> {
        region
            .clamp_into(video.width, video.height, self.config.min_region_side)
            .ok_or(Error::FrameTooSmall {
                width: video.width,
                height: video.height,
            })
    }

    fn treatment(&self, timeline: &WatermarkTimeline, video: &VideoInfo) -> Treatment {
        match self.config.treatment {
            Treatment::Auto => recommend_treatment(timeline, video.duration),
            chosen => chosen,
        }
    }
}

/// Ordering by `(is_watermark, confidence, position_count)`.
fn priority(a: &WatermarkTimeline, b: &WatermarkTimeline) -> Ordering {
    a.is_watermark
        .cmp(&b.is_watermark)
        .then_with(|| a.confidence.total_cmp(&b.confidence))
        .then_with(|| a.position_count().cmp(&b.position_count()))
}
