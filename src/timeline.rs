//! Cross-frame grouping of detections into watermark timelines, and
//! movement classification of each timeline.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DetectorConfig, TimelineConfig};
use crate::detection::{Detection, MergedDetection};
use crate::error::Result;
use crate::geometry::Rect;
use crate::text::{normalize, FragmentSimilarity, TextClassifier, TextSimilarity};

/// How a watermark moves over the sampled frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Both axes stay (nearly) still.
    Static,
    /// Movement dominated by the x axis.
    Horizontal,
    /// Movement dominated by the y axis.
    Vertical,
    /// Movement on both axes without a dominant one.
    Complex,
}

impl MovementType {
    /// Every type except [`MovementType::Static`] counts as moving.
    #[must_use]
    pub const fn is_moving(self) -> bool {
        !matches!(self, Self::Static)
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Static => "static",
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
            Self::Complex => "complex",
        };
        f.write_str(name)
    }
}

/// Spread of a timeline's top-left corners.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementStats {
    /// Population variance of `x`, in px².
    pub x_variance: f64,
    /// Population variance of `y`, in px².
    pub y_variance: f64,
    /// `max(x) - min(x)`.
    pub x_range: u32,
    /// `max(y) - min(y)`.
    pub y_range: u32,
}

impl MovementStats {
    /// Statistics over the given rectangles.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_regions(regions: &[Rect]) -> Self {
        if regions.is_empty() {
            return Self::default();
        }
        let n = regions.len() as f64;
        let variance = |coord: fn(&Rect) -> u32| {
            let mean = regions.iter().map(|r| f64::from(coord(r))).sum::<f64>() / n;
            regions
                .iter()
                .map(|r| (f64::from(coord(r)) - mean).powi(2))
                .sum::<f64>()
                / n
        };
        let range = |coord: fn(&Rect) -> u32| {
            let min = regions.iter().map(coord).min().unwrap_or(0);
            let max = regions.iter().map(coord).max().unwrap_or(0);
            max - min
        };
        Self {
            x_variance: variance(|r| r.x),
            y_variance: variance(|r| r.y),
            x_range: range(|r| r.x),
            y_range: range(|r| r.y),
        }
    }

    /// Classify the movement.
    ///
    /// Both variances at or below `static_variance` is static. Otherwise an
    /// axis whose variance exceeds the other's by `dominance` wins; anything
    /// in between is complex.
    #[must_use]
    pub fn classify(&self, static_variance: f64, dominance: f64) -> MovementType {
        if self.x_variance <= static_variance && self.y_variance <= static_variance {
            MovementType::Static
        } else if self.x_variance > self.y_variance * dominance {
            MovementType::Horizontal
        } else if self.y_variance > self.x_variance * dominance {
            MovementType::Vertical
        } else {
            MovementType::Complex
        }
    }
}

/// One sighting of a watermark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelinePosition {
    /// Where it was seen.
    #[serde(flatten)]
    pub region: Rect,
    /// Confidence of that detection.
    pub confidence: f32,
    /// When it was seen, in seconds.
    pub sample_time: f64,
}

/// A watermark tracked across the sampled frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkTimeline {
    /// Most representative text; empty for text-less elements.
    pub identity: String,
    /// Movement classification.
    pub movement_type: MovementType,
    /// Same as `movement_type.is_moving()`.
    pub is_moving: bool,
    /// Sightings in temporal order.
    pub positions: Vec<TimelinePosition>,
    /// Highest confidence among the sightings.
    pub confidence: f32,
    /// Whether any sighting carried watermark text.
    pub is_watermark: bool,
    /// Spread of the positions.
    pub movement_stats: MovementStats,
}

impl WatermarkTimeline {
    /// Number of sightings.
    #[must_use]
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Smallest rectangle covering every sighting.
    #[must_use]
    pub fn envelope(&self) -> Option<Rect> {
        Rect::bounding(self.positions.iter().map(|p| p.region))
    }

    /// Time of the first and last sighting.
    #[must_use]
    pub fn time_span(&self) -> Option<(f64, f64)> {
        Some((
            self.positions.first()?.sample_time,
            self.positions.last()?.sample_time,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Text,
    Position,
}

#[derive(Debug)]
struct Group<'a> {
    kind: GroupKind,
    members: Vec<&'a Detection>,
}

/// Groups merged detections from all frames into [`WatermarkTimeline`]s.
pub struct TimelineBuilder {
    config: TimelineConfig,
    classifier: TextClassifier,
    similarity: Box<dyn TextSimilarity>,
}

impl std::fmt::Debug for TimelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TimelineBuilder {
    /// Builder with the default [`FragmentSimilarity`] policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPattern`] if a configured text pattern
    /// does not compile.
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            config: config.timeline.clone(),
            classifier: TextClassifier::new(&config.text)?,
            similarity: Box::new(FragmentSimilarity::new(&config.text)),
        })
    }

    /// Replace the text similarity policy.
    #[must_use]
    pub fn with_similarity(mut self, similarity: impl TextSimilarity + 'static) -> Self {
        self.similarity = Box::new(similarity);
        self
    }

    /// Build timelines from the merged detections of every sampled frame,
    /// sorted by confidence (then sighting count) descending.
    #[must_use]
    pub fn build(&self, detections: &[MergedDetection]) -> Vec<WatermarkTimeline> {
        let candidates = self.candidates(detections);
        let groups = self.group(&candidates);

        let mut timelines: Vec<WatermarkTimeline> = groups
            .into_iter()
            .filter_map(|g| self.finalize(g.members))
            .collect();
        timelines.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.position_count().cmp(&a.position_count()))
        });

        info!(
            candidates = candidates.len(),
            timelines = timelines.len(),
            moving = timelines.iter().filter(|t| t.is_moving).count(),
            "built watermark timelines"
        );
        timelines
    }

    /// Noise-filtered detections, ranked by watermark score and capped at
    /// `max_candidates`.
    #[must_use]
    pub fn candidates<'a>(&self, detections: &'a [MergedDetection]) -> Vec<&'a Detection> {
        let cfg = &self.config;
        let mut scored: Vec<(f32, &Detection)> = detections
            .iter()
            .map(|m| &m.detection)
            .filter(|d| self.keep(d))
            .map(|d| {
                let boost = if self.has_indicator(d) {
                    cfg.watermark_boost
                } else {
                    1.0
                };
                (d.confidence * boost, d)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        if scored.len() > cfg.max_candidates {
            debug!(
                kept = cfg.max_candidates,
                dropped = scored.len() - cfg.max_candidates,
                "truncated timeline candidates"
            );
            scored.truncate(cfg.max_candidates);
        }
        scored.into_iter().map(|(_, d)| d).collect()
    }

    fn keep(&self, d: &Detection) -> bool {
        let cfg = &self.config;
        if d.confidence < cfg.min_confidence {
            return false;
        }
        if d.text_len() < cfg.min_text_len && d.confidence < cfg.short_text_min_confidence {
            return false;
        }
        !self.classifier.is_counter_text(&d.text)
    }

    fn has_indicator(&self, d: &Detection) -> bool {
        let cfg = &self.config;
        d.is_watermark_text
            || d.confidence > cfg.strong_confidence
            || (d.text_len() >= cfg.long_text_len && d.confidence > cfg.long_text_confidence)
    }

    fn group<'a>(&self, candidates: &[&'a Detection]) -> Vec<Group<'a>> {
        let mut groups: Vec<Group<'a>> = Vec::new();

        for &d in candidates {
            let text = d.text.trim();
            let matched: Vec<usize> = if text.is_empty() {
                Vec::new()
            } else {
                // Position groups count too once a text detection has joined them.
                groups
                    .iter()
                    .enumerate()
                    .filter(|(_, g)| self.text_matches(g, d))
                    .map(|(i, _)| i)
                    .collect()
            };

            if let Some((&first, rest)) = matched.split_first() {
                // A detection linking several groups joins them into one.
                for &i in rest.iter().rev() {
                    let absorbed = groups.remove(i);
                    if absorbed.kind == GroupKind::Position {
                        groups[first].kind = GroupKind::Position;
                    }
                    groups[first].members.extend(absorbed.members);
                }
                groups[first].members.push(d);
                continue;
            }

            let cfg = &self.config;
            let nearby = groups.iter_mut().find(|g| {
                g.kind == GroupKind::Position
                    && near_recent(
                        &g.members,
                        d,
                        cfg.spatial_window,
                        cfg.spatial_max_dx,
                        cfg.spatial_max_dy,
                    )
            });
            if let Some(group) = nearby {
                group.members.push(d);
            } else {
                groups.push(Group {
                    kind: if text.is_empty() {
                        GroupKind::Position
                    } else {
                        GroupKind::Text
                    },
                    members: vec![d],
                });
            }
        }
        groups
    }

    fn text_matches(&self, group: &Group<'_>, d: &Detection) -> bool {
        let cfg = &self.config;
        let text = d.text.trim();
        let key = normalize(text);

        let texts = group
            .members
            .iter()
            .map(|m| m.text.trim())
            .filter(|t| !t.is_empty());
        let mut similar_short = false;
        let mut any_similar = false;
        let short = text.chars().count() <= cfg.short_fragment_len;
        for other in texts {
            let other_key = normalize(other);
            let exact = other_key == key;
            if exact && !short {
                return true;
            }
            let contained = !key.is_empty()
                && !other_key.is_empty()
                && (key.contains(&other_key) || other_key.contains(&key));
            if exact || contained || self.similarity.is_similar(text, other) {
                any_similar = true;
                similar_short |= other.chars().count() <= cfg.short_fragment_len;
            }
        }
        if !any_similar {
            return false;
        }

        if short || similar_short {
            near_recent(
                &group.members,
                d,
                cfg.fragment_window,
                cfg.fragment_max_dx,
                cfg.fragment_max_dy,
            )
        } else if d.is_watermark_text || self.classifier.is_watermark(text) {
            within_range(
                &group.members,
                d,
                cfg.watermark_max_x_range,
                cfg.watermark_max_y_range,
            )
        } else {
            near_recent(
                &group.members,
                d,
                cfg.text_window,
                cfg.text_max_dx,
                cfg.text_max_dy,
            )
        }
    }

    fn finalize(&self, mut members: Vec<&Detection>) -> Option<WatermarkTimeline> {
        let cfg = &self.config;
        members.sort_by(|a, b| a.sample_time.total_cmp(&b.sample_time));

        let confidence = members.iter().map(|d| d.confidence).fold(0.0_f32, f32::max);
        let is_watermark = members.iter().any(|d| d.is_watermark_text);
        if members.len() == 1 && confidence < cfg.singleton_min_confidence && !is_watermark {
            return None;
        }

        let positions: Vec<TimelinePosition> = members
            .iter()
            .map(|d| TimelinePosition {
                region: d.region,
                confidence: d.confidence,
                sample_time: d.sample_time,
            })
            .collect();
        let regions: Vec<Rect> = positions.iter().map(|p| p.region).collect();
        let movement_stats = MovementStats::from_regions(&regions);
        let movement_type = if positions.len() < 2 {
            MovementType::Static
        } else {
            movement_stats.classify(cfg.static_variance, cfg.axis_dominance)
        };

        Some(WatermarkTimeline {
            identity: identity(&members),
            movement_type,
            is_moving: movement_type.is_moving(),
            positions,
            confidence,
            is_watermark,
            movement_stats,
        })
    }
}

/// Whether `d` lies near the average position of the group members seen
/// within `window` seconds of it.
#[allow(clippy::cast_precision_loss)]
fn near_recent(members: &[&Detection], d: &Detection, window: f64, max_dx: f64, max_dy: f64) -> bool {
    let recent: Vec<&&Detection> = members
        .iter()
        .filter(|m| (m.sample_time - d.sample_time).abs() < window)
        .collect();
    if recent.is_empty() {
        return false;
    }
    let n = recent.len() as f64;
    let avg_x = recent.iter().map(|m| f64::from(m.region.x)).sum::<f64>() / n;
    let avg_y = recent.iter().map(|m| f64::from(m.region.y)).sum::<f64>() / n;
    (f64::from(d.region.x) - avg_x).abs() < max_dx && (f64::from(d.region.y) - avg_y).abs() < max_dy
}

/// Whether adding `d` keeps the group's overall position range bounded.
fn within_range(members: &[&Detection], d: &Detection, max_x: u32, max_y: u32) -> bool {
    let (mut min_x, mut max_seen_x) = (d.region.x, d.region.x);
    let (mut min_y, mut max_seen_y) = (d.region.y, d.region.y);
    for m in members {
        min_x = min_x.min(m.region.x);
        max_seen_x = max_seen_x.max(m.region.x);
        min_y = min_y.min(m.region.y);
        max_seen_y = max_seen_y.max(m.region.y);
    }
    max_seen_x - min_x <= max_x && max_seen_y - min_y <= max_y
}

/// Most frequent text; ties go to the longer text, then to the earliest.
fn identity(members: &[&Detection]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for text in members.iter().map(|d| d.text.trim()).filter(|t| !t.is_empty()) {
        match counts.iter_mut().find(|(t, _)| *t == text) {
            Some((_, n)) => *n += 1,
            None => counts.push((text, 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (text, n) in counts {
        let better = best.is_none_or(|(bt, bn)| {
            n > bn || (n == bn && text.chars().count() > bt.chars().count())
        });
        if better {
            best = Some((text, n));
        }
    }
    best.map(|(t, _)| t.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionSource;

    #[allow(clippy::too_many_arguments)]
    fn merged(x: u32, y: u32, w: u32, h: u32, conf: f32, text: &str, wm: bool, t: f64) -> MergedDetection {
        let detection = Detection::new(Rect::new(x, y, w, h), conf, DetectionSource::CornerScan, "test")
            .with_text(text, wm)
            .at_sample(t, 0);
        MergedDetection {
            combined_text: text.to_string(),
            constituent_count: 1,
            span: detection.region,
            detection,
        }
    }

    fn builder() -> TimelineBuilder {
        TimelineBuilder::new(&DetectorConfig::default()).unwrap()
    }

    #[test]
    fn static_watermark_forms_one_static_timeline() {
        let input: Vec<_> = (0..5)
            .map(|i| merged(47, 47, 156, 36, 0.9, "www.example.com", true, 1.0 + 2.0 * f64::from(i)))
            .collect();
        let timelines = builder().build(&input);
        assert_eq!(timelines.len(), 1);
        let t = &timelines[0];
        assert_eq!(t.movement_type, MovementType::Static);
        assert!(!t.is_moving);
        assert_eq!(t.position_count(), 5);
        assert_eq!(t.identity, "www.example.com");
        assert!(t.envelope().unwrap().contains(&Rect::new(50, 50, 150, 30)));
    }

    #[test]
    fn linear_motion_is_horizontal() {
        let input: Vec<_> = (0..5u32)
            .map(|i| merged(50 + 100 * i, 50, 150, 30, 0.9, "www.example.com", true, f64::from(i) * 10.0))
            .collect();
        let timelines = builder().build(&input);
        assert_eq!(timelines.len(), 1);
        let t = &timelines[0];
        assert_eq!(t.movement_type, MovementType::Horizontal);
        assert!(t.is_moving);
        assert_eq!(t.movement_stats.x_range, 400);
        assert_eq!(t.movement_stats.y_range, 0);
        assert!((t.movement_stats.x_variance - 20_000.0).abs() < 1e-9);
    }

    #[test]
    fn classify_tie_break_is_complex() {
        let stats = MovementStats {
            x_variance: 500.0,
            y_variance: 300.0,
            x_range: 60,
            y_range: 40,
        };
        assert_eq!(stats.classify(100.0, 2.0), MovementType::Complex);
        let vertical = MovementStats {
            x_variance: 10.0,
            y_variance: 300.0,
            ..stats
        };
        assert_eq!(vertical.classify(100.0, 2.0), MovementType::Vertical);
        let still = MovementStats {
            x_variance: 99.0,
            y_variance: 100.0,
            ..stats
        };
        assert_eq!(still.classify(100.0, 2.0), MovementType::Static);
    }

    #[test]
    fn candidates_are_capped() {
        let input: Vec<_> = (0..30u32)
            .map(|i| merged(10 * i, 10 * i, 40, 20, 0.9, &format!("label {i}"), false, 0.0))
            .collect();
        assert_eq!(builder().candidates(&input).len(), 20);
    }

    #[test]
    fn noise_is_filtered() {
        let input = vec![
            merged(10, 10, 40, 20, 0.4, "www.low.com", true, 0.0),
            merged(10, 10, 40, 20, 0.6, "x", false, 0.0),
            merged(10, 10, 40, 20, 0.9, "00:15", false, 0.0),
            merged(10, 10, 40, 20, 0.9, "Frame 3", false, 0.0),
            merged(10, 10, 40, 20, 0.75, "", false, 0.0),
            merged(10, 10, 40, 20, 0.6, "ok", false, 0.0),
        ];
        let kept: Vec<_> = builder()
            .candidates(&input)
            .iter()
            .map(|d| d.text.clone())
            .collect();
        assert_eq!(kept, vec!["".to_string(), "ok".to_string()]);
    }

    #[test]
    fn watermark_candidates_rank_first() {
        let input = vec![
            merged(10, 10, 40, 20, 0.55, "pl", false, 0.0),
            merged(300, 10, 40, 20, 0.5, "www.site.tv", true, 0.0),
        ];
        let ranked = builder().candidates(&input);
        assert_eq!(ranked[0].text, "www.site.tv");
    }

    #[test]
    fn linking_detection_joins_groups() {
        let input = vec![
            merged(100, 600, 100, 30, 0.95, "www.acme.tv", true, 1.0),
            merged(120, 600, 100, 30, 0.9, "studio hd", true, 3.0),
            merged(110, 600, 200, 30, 0.85, "www.acme.tv studio hd", true, 5.0),
        ];
        let timelines = builder().build(&input);
        assert_eq!(timelines.len(), 1, "{timelines:?}");
        assert_eq!(timelines[0].position_count(), 3);
        let times: Vec<f64> = timelines[0].positions.iter().map(|p| p.sample_time).collect();
        assert_eq!(times, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn exact_text_stays_in_one_timeline_after_joining_a_shape() {
        let input = vec![
            merged(100, 100, 80, 30, 0.75, "", false, 1.0),
            // Joins the shape's group by position.
            merged(110, 100, 80, 30, 0.55, "caption", false, 1.5),
            // Far later in time: only the text can link these.
            merged(110, 100, 80, 30, 0.55, "caption", false, 20.0),
            merged(110, 100, 80, 30, 0.55, "caption", false, 21.0),
        ];
        let timelines = builder().build(&input);
        let with_caption: Vec<_> = timelines
            .iter()
            .filter(|t| t.identity == "caption")
            .collect();
        assert_eq!(with_caption.len(), 1, "{timelines:?}");
        assert_eq!(with_caption[0].position_count(), 4);
        let times: Vec<f64> = with_caption[0].positions.iter().map(|p| p.sample_time).collect();
        assert_eq!(times, vec![1.0, 1.5, 20.0, 21.0]);
    }

    #[test]
    fn short_fragments_need_proximity() {
        let input = vec![
            merged(100, 100, 40, 20, 0.9, "WATERMARK", true, 1.0),
            // Close in time and space: joins.
            merged(130, 110, 20, 20, 0.9, "MA", true, 3.0),
            // Same fragment far away: separate.
            merged(900, 500, 20, 20, 0.9, "MA", true, 3.0),
        ];
        let timelines = builder().build(&input);
        assert_eq!(timelines.len(), 2);
        assert_eq!(timelines[0].position_count(), 2);
        assert_eq!(timelines[0].identity, "WATERMARK");
    }

    #[test]
    fn textless_shapes_group_spatially() {
        let input = vec![
            merged(600, 20, 60, 30, 0.75, "", false, 1.0),
            merged(610, 25, 60, 30, 0.75, "", false, 3.0),
            merged(620, 30, 60, 30, 0.75, "", false, 5.0),
            // Too far in time from every member.
            merged(600, 20, 60, 30, 0.75, "", false, 20.0),
        ];
        let timelines = builder().build(&input);
        assert_eq!(timelines.len(), 1, "lone late sighting is dropped");
        assert_eq!(timelines[0].position_count(), 3);
        assert!(timelines[0].identity.is_empty());
        assert_eq!(timelines[0].movement_type, MovementType::Static);
    }

    #[test]
    fn singletons_need_confidence_or_watermark_text() {
        let input = vec![
            merged(10, 10, 40, 20, 0.7, "caption one", false, 1.0),
            merged(500, 300, 40, 20, 0.6, "www.x.tv", true, 1.0),
            merged(900, 10, 40, 20, 0.85, "another caption", false, 1.0),
        ];
        let timelines = builder().build(&input);
        let ids: Vec<_> = timelines.iter().map(|t| t.identity.as_str()).collect();
        assert_eq!(ids, vec!["another caption", "www.x.tv"]);
        assert!(timelines.iter().all(|t| !t.is_moving));
    }

    #[test]
    fn identity_prefers_frequent_then_long() {
        let a = merged(0, 0, 10, 10, 0.9, "abc", false, 0.0).detection;
        let b = merged(0, 0, 10, 10, 0.9, "abcdef", false, 0.0).detection;
        let c = merged(0, 0, 10, 10, 0.9, "abc", false, 0.0).detection;
        assert_eq!(identity(&[&a, &b, &c]), "abc");
        assert_eq!(identity(&[&a, &b]), "abcdef");
        assert_eq!(identity(&[]), "");
    }

    #[test]
    fn custom_similarity_is_used() {
        struct Never;
        impl TextSimilarity for Never {
            fn is_similar(&self, _: &str, _: &str) -> bool {
                false
            }
        }
        let input = vec![
            merged(100, 100, 100, 30, 0.9, "www.example.com", true, 1.0),
            merged(100, 100, 100, 30, 0.9, "www.exarnple.com", true, 3.0),
        ];
        assert_eq!(builder().build(&input).len(), 1);
        assert_eq!(builder().with_similarity(Never).build(&input).len(), 2);
    }

    #[test]
    fn containment_holds_under_custom_similarity() {
        struct Never;
        impl TextSimilarity for Never {
            fn is_similar(&self, _: &str, _: &str) -> bool {
                false
            }
        }
        let input = vec![
            merged(100, 100, 100, 30, 0.9, "www.example.com", true, 1.0),
            merged(100, 100, 100, 30, 0.9, "www.example.co", true, 3.0),
        ];
        let timelines = builder().with_similarity(Never).build(&input);
        assert_eq!(timelines.len(), 1);
        assert_eq!(timelines[0].position_count(), 2);
    }
}
