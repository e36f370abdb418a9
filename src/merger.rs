//! Per-frame consolidation of overlapping and adjacent detections.

use std::cmp::Ordering;

use tracing::debug;

use crate::config::MergerConfig;
use crate::detection::{Detection, MergedDetection};
use crate::geometry::Rect;

/// Merges the raw detections of one frame.
///
/// Clustering is greedy around the most confident detection, then repeated
/// on the padded results until no two outputs would merge. Merging the output
/// again therefore returns it unchanged.
#[derive(Debug, Clone, Default)]
pub struct DetectionMerger {
    config: MergerConfig,
}

/// One unit taking part in clustering.
#[derive(Debug, Clone)]
enum Piece {
    Raw(Detection),
    Merged(MergedDetection),
}

impl Piece {
    const fn detection(&self) -> &Detection {
        match self {
            Self::Raw(d) => d,
            Self::Merged(m) => &m.detection,
        }
    }

    const fn span(&self) -> Rect {
        match self {
            Self::Raw(d) => d.region,
            Self::Merged(m) => m.span,
        }
    }

    const fn count(&self) -> usize {
        match self {
            Self::Raw(_) => 1,
            Self::Merged(m) => m.constituent_count,
        }
    }

    fn text(&self) -> &str {
        match self {
            Self::Raw(d) => d.text.trim(),
            Self::Merged(m) => m.combined_text.trim(),
        }
    }
}

impl DetectionMerger {
    /// Create a merger with the given thresholds.
    #[must_use]
    pub const fn new(config: MergerConfig) -> Self {
        Self { config }
    }

    /// Merge the raw detections of a `frame_width x frame_height` frame.
    #[must_use]
    pub fn merge(
        &self,
        detections: &[Detection],
        frame_width: u32,
        frame_height: u32,
    ) -> Vec<MergedDetection> {
        let pieces = detections.iter().cloned().map(Piece::Raw).collect();
        let merged = self.run(pieces, frame_width, frame_height);
        debug!(
            input = detections.len(),
            output = merged.len(),
            "merged frame detections"
        );
        merged
    }

    /// Merge an already merged list again. Merged inputs keep their padding;
    /// only inputs that still satisfy the merge criteria are combined.
    #[must_use]
    pub fn remerge(
        &self,
        merged: &[MergedDetection],
        frame_width: u32,
        frame_height: u32,
    ) -> Vec<MergedDetection> {
        let pieces = merged.iter().cloned().map(Piece::Merged).collect();
        self.run(pieces, frame_width, frame_height)
    }

    /// Whether two detections belong to the same watermark.
    #[must_use]
    pub fn should_merge(&self, a: &Detection, b: &Detection) -> bool {
        if a.region.overlap_ratio(&b.region) > self.config.overlap_threshold {
            return true;
        }
        a.source.is_text_like()
            && b.source.is_text_like()
            && a.region.center_distance(&b.region) < self.config.proximity
            && a.region.y.abs_diff(b.region.y) < self.config.alignment
    }

    fn run(&self, mut pieces: Vec<Piece>, frame_width: u32, frame_height: u32) -> Vec<MergedDetection> {
        pieces.sort_by(|a, b| by_confidence(a.detection(), b.detection()));

        let mut clusters: Vec<Vec<Piece>> = Vec::new();
        let mut remaining = pieces;
        while !remaining.is_empty() {
            let seed = remaining.remove(0);
            let (joined, rest): (Vec<Piece>, Vec<Piece>) = remaining
                .into_iter()
                .partition(|p| self.should_merge(seed.detection(), p.detection()));
            remaining = rest;
            let mut members = vec![seed];
            members.extend(joined);
            clusters.push(members);
        }

        let mut outputs: Vec<(Vec<Piece>, MergedDetection)> = clusters
            .into_iter()
            .map(|members| {
                let merged = self.finalize(&members, frame_width, frame_height);
                (members, merged)
            })
            .collect();

        // Padding can bring separate clusters into merge range; fold them
        // together until the outputs are stable.
        while let Some((a, b)) = self.find_mergeable(&outputs) {
            let (mut members, _) = outputs.remove(b);
            members.append(&mut outputs[a].0);
            members.sort_by(|x, y| by_confidence(x.detection(), y.detection()));
            let merged = self.finalize(&members, frame_width, frame_height);
            outputs[a] = (members, merged);
        }

        let mut result: Vec<MergedDetection> = outputs.into_iter().map(|(_, m)| m).collect();
        result.sort_by(|a, b| by_confidence(&a.detection, &b.detection));
        result
    }

    fn find_mergeable(&self, outputs: &[(Vec<Piece>, MergedDetection)]) -> Option<(usize, usize)> {
        outputs.iter().enumerate().find_map(|(a, (_, first))| {
            outputs[a + 1..]
                .iter()
                .position(|(_, second)| self.should_merge(&first.detection, &second.detection))
                .map(|offset| (a, a + 1 + offset))
        })
    }

    fn finalize(&self, members: &[Piece], frame_width: u32, frame_height: u32) -> MergedDetection {
        let cfg = &self.config;
        if let [only] = members {
            return match only {
                Piece::Merged(m) => m.clone(),
                Piece::Raw(d) => {
                    let pad = cfg
                        .single_pad_max
                        .min(d.region.width / cfg.single_pad_divisor)
                        .min(d.region.height / cfg.single_pad_divisor);
                    let padded = d.region.expand(pad, pad);
                    let mut detection = d.clone();
                    detection.region = padded.clip_to(frame_width, frame_height).unwrap_or(d.region);
                    let combined_text = self.combine_texts(members);
                    detection.text.clone_from(&combined_text);
                    MergedDetection {
                        detection,
                        constituent_count: 1,
                        combined_text,
                        span: d.region,
                    }
                }
            };
        }

        let span = Rect::bounding(members.iter().map(Piece::span)).unwrap_or_default();
        let pad_x = span_pad(span.width, cfg.span_pad_ratio, cfg.min_pad_x, cfg.max_pad_x);
        let pad_y = span_pad(span.height, cfg.span_pad_ratio, cfg.min_pad_y, cfg.max_pad_y);
        let region = span
            .expand(pad_x, pad_y)
            .clamp_centered(cfg.max_width, cfg.max_height);
        let region = region.clip_to(frame_width, frame_height).unwrap_or(region);

        let combined_text = self.combine_texts(members);
        let mut detection = members[0].detection().clone();
        detection.region = region;
        detection.confidence = members
            .iter()
            .map(|p| p.detection().confidence)
            .fold(0.0_f32, f32::max);
        detection.is_watermark_text = members.iter().any(|p| p.detection().is_watermark_text);
        detection.text.clone_from(&combined_text);

        MergedDetection {
            detection,
            constituent_count: members.iter().map(Piece::count).sum(),
            combined_text,
            span,
        }
    }

    fn combine_texts(&self, members: &[Piece]) -> String {
        let mut unique: Vec<&str> = Vec::new();
        for text in members.iter().map(Piece::text) {
            if !text.is_empty() && !unique.contains(&text) {
                unique.push(text);
            }
        }
        unique.truncate(self.config.max_texts);
        unique
            .join(" ")
            .chars()
            .take(self.config.max_text_len)
            .collect()
    }
}

fn by_confidence(a: &Detection, b: &Detection) -> Ordering {
    b.confidence.total_cmp(&a.confidence)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn span_pad(span: u32, ratio: f64, min: u32, max: u32) -> u32 {
    let pad = (f64::from(span) * ratio) as u32;
    pad.clamp(min, max)
}
