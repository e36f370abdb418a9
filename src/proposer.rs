//! Per-frame region proposal.
//!
//! The frame is cut into named regions: four corners, four edge centers,
//! four wide edge strips, and the outer ring of a grid. Each region is read
//! with OCR first. Only when OCR finds nothing watermark-like do the shape
//! heuristics run (connected components, edge density, bright overlay
//! colour). A separate OCR pass over the downscaled whole frame catches text
//! that straddles region borders.

use image::RgbImage;
use tracing::{debug, trace};

use crate::config::ProposerConfig;
use crate::detection::{Detection, DetectionSource};
use crate::geometry::Rect;
use crate::ocr::TextRecognizer;
use crate::raster::{self, Component};
use crate::text::TextClassifier;

/// OCR reads shorter than this are ignored.
const MIN_TEXT_CHARS: usize = 2;

/// Padding around the edge pixels of a dense edge area.
const EDGE_PADDING: u32 = 5;

/// Margin kept around a component when it is cropped out for OCR.
const OCR_MARGIN: u32 = 4;

/// Produces raw [`Detection`]s for one frame.
pub struct RegionProposer {
    config: ProposerConfig,
    classifier: TextClassifier,
    ocr: Box<dyn TextRecognizer>,
}

impl std::fmt::Debug for RegionProposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionProposer")
            .field("config", &self.config)
            .field("ocr_available", &self.ocr.is_available())
            .finish_non_exhaustive()
    }
}

impl RegionProposer {
    /// Create a proposer reading text with `ocr`.
    #[must_use]
    pub fn new(
        config: ProposerConfig,
        classifier: TextClassifier,
        ocr: Box<dyn TextRecognizer>,
    ) -> Self {
        Self {
            config,
            classifier,
            ocr,
        }
    }

    /// Whether the OCR backend can read text.
    #[must_use]
    pub fn ocr_available(&self) -> bool {
        self.ocr.is_available()
    }

    /// Propose candidate regions for one frame. Every returned region lies
    /// inside the frame. Timing fields are left at zero.
    #[must_use]
    pub fn propose(&self, frame: &RgbImage) -> Vec<Detection> {
        let (width, height) = frame.dimensions();
        let mut detections = Vec::new();

        for (name, rect, source) in self.named_regions(width, height) {
            detections.extend(self.scan_region(frame, &name, rect, source));
        }

        if self.ocr_available() {
            if self.config.grid_scan {
                for (name, rect) in self.grid_cells(width, height) {
                    let cell = raster::crop(frame, rect);
                    let source = DetectionSource::GridScan;
                    detections.extend(self.ocr_pass(&cell, rect, &name, source, 0));
                }
            }
            if self.config.full_frame_scan {
                detections.extend(self.full_frame_pass(frame));
            }
        }

        let detections: Vec<Detection> = detections
            .into_iter()
            .filter_map(|mut d| {
                d.region = d.region.clip_to(width, height)?;
                Some(d)
            })
            .collect();
        debug!(width, height, count = detections.len(), "proposed regions");
        detections
    }

    /// Corner, edge-center and edge-strip regions, clipped to the frame, with
    /// the source their OCR reads are tagged with. Empty regions are left out.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn named_regions(&self, width: u32, height: u32) -> Vec<(String, Rect, DetectionSource)> {
        let cfg = &self.config;
        let mut regions = Vec::new();

        if cfg.corner_scan {
            let corner = DetectionSource::CornerScan;
            let cw = (width as f32 * cfg.corner_fraction) as u32;
            let ch = (height as f32 * cfg.corner_fraction) as u32;
            let (mid_x, mid_y) = (width / 2, height / 2);
            regions.extend([
                ("top_left", Rect::new(0, 0, cw, ch), corner),
                ("top_right", Rect::new(width - cw, 0, cw, ch), corner),
                ("bottom_left", Rect::new(0, height - ch, cw, ch), corner),
                ("bottom_right", Rect::new(width - cw, height - ch, cw, ch), corner),
                (
                    "top_center",
                    Rect::new(mid_x.saturating_sub(cw / 2), 0, cw, ch / 2),
                    corner,
                ),
                (
                    "bottom_center",
                    Rect::new(mid_x.saturating_sub(cw / 2), height - ch / 2, cw, ch / 2),
                    corner,
                ),
                (
                    "left_center",
                    Rect::new(0, mid_y.saturating_sub(ch / 2), cw / 2, ch),
                    corner,
                ),
                (
                    "right_center",
                    Rect::new(width - cw / 2, mid_y.saturating_sub(ch / 2), cw / 2, ch),
                    corner,
                ),
            ]);
        }

        if cfg.edge_scan {
            let ew = (width as f32 * cfg.edge_fraction) as u32;
            let eh = (height as f32 * cfg.edge_fraction) as u32;
            let strip = DetectionSource::EdgeStripScan;
            regions.extend([
                ("top_edge", Rect::new(0, 0, width, eh), strip),
                ("bottom_edge", Rect::new(0, height - eh, width, eh), strip),
                ("left_edge", Rect::new(0, 0, ew, height), strip),
                ("right_edge", Rect::new(width - ew, 0, ew, height), strip),
            ]);
        }

        regions
            .into_iter()
            .filter_map(|(name, r, source)| Some((name.to_string(), r.clip_to(width, height)?, source)))
            .collect()
    }

    /// Outer ring of a `grid_size x grid_size` grid, named `grid_<row>_<col>`.
    #[must_use]
    pub fn grid_cells(&self, width: u32, height: u32) -> Vec<(String, Rect)> {
        let n = self.config.grid_size;
        let (cell_w, cell_h) = (width / n, height / n);
        if cell_w == 0 || cell_h == 0 {
            return Vec::new();
        }
        let inner = 1..n.saturating_sub(1);
        let mut cells = Vec::new();
        for row in 0..n {
            for col in 0..n {
                if inner.contains(&row) && inner.contains(&col) {
                    continue;
                }
                cells.push((
                    format!("grid_{row}_{col}"),
                    Rect::new(col * cell_w, row * cell_h, cell_w, cell_h),
                ));
            }
        }
        cells
    }

    /// OCR first; shape heuristics only if no watermark text was read.
    fn scan_region(
        &self,
        frame: &RgbImage,
        name: &str,
        rect: Rect,
        source: DetectionSource,
    ) -> Vec<Detection> {
        let sub = raster::crop(frame, rect);
        let mut found = self.ocr_pass(&sub, rect, name, source, 0);
        if found.iter().any(|d| d.is_watermark_text) {
            return found;
        }

        found.extend(self.component_scan(&sub, rect, name));
        if self.config.edge_density_scan {
            found.extend(self.edge_scan(&sub, rect, name));
        }
        if self.config.color_scan {
            found.extend(self.color_scan(&sub, rect, name));
        }
        trace!(region = name, count = found.len(), "scanned region");
        found
    }

    /// OCR over `img`, which sits at `area` in frame coordinates.
    ///
    /// Oversized areas are read whole first, keeping only watermark text; if
    /// that finds nothing strong the area is quartered and each quarter is
    /// read on its own. Reads of normal-sized areas are tagged `source`.
    fn ocr_pass(
        &self,
        img: &RgbImage,
        area: Rect,
        name: &str,
        source: DetectionSource,
        depth: u32,
    ) -> Vec<Detection> {
        let cfg = &self.config;
        let (w, h) = img.dimensions();
        if w < cfg.min_region_side || h < cfg.min_region_side || !self.ocr_available() {
            return Vec::new();
        }

        if (w > cfg.large_region_side || h > cfg.large_region_side) && depth < cfg.max_split_depth {
            let mut found: Vec<Detection> = self
                .read(img)
                .into_iter()
                .filter(|(text, _)| self.classifier.is_watermark(text))
                .map(|(text, local)| {
                    Detection::new(
                        local.offset(area.x, area.y),
                        cfg.watermark_confidence,
                        DetectionSource::OcrFullRegion,
                        name,
                    )
                    .with_text(text, true)
                })
                .collect();
            if found.iter().any(|d| d.confidence > cfg.strong_confidence) {
                return found;
            }
            for quarter in quarters(w, h) {
                let sub = raster::crop(img, quarter);
                let sub_area = quarter.offset(area.x, area.y);
                found.extend(self.ocr_pass(&sub, sub_area, name, source, depth + 1));
            }
            return found;
        }

        self.read(img)
            .into_iter()
            .map(|(text, local)| {
                let is_watermark = self.classifier.is_watermark(&text);
                let confidence = if is_watermark {
                    cfg.watermark_confidence
                } else {
                    cfg.text_confidence
                };
                Detection::new(local.offset(area.x, area.y), confidence, source, name)
                    .with_text(text, is_watermark)
            })
            .collect()
    }

    /// Text reads that pass the length and confidence floor, with their
    /// location inside `img` (the whole image when the engine gives none).
    fn read(&self, img: &RgbImage) -> Vec<(String, Rect)> {
        let (w, h) = img.dimensions();
        let whole = Rect::new(0, 0, w, h);
        self.ocr
            .recognize_text(img)
            .into_iter()
            .filter(|r| r.confidence >= self.config.min_ocr_confidence)
            .filter_map(|r| {
                let text = r.text.trim();
                if text.chars().count() < MIN_TEXT_CHARS {
                    return None;
                }
                let bounds = r.bounds.and_then(|b| b.clip_to(w, h)).unwrap_or(whole);
                Some((text.to_string(), bounds))
            })
            .collect()
    }

    /// Downscaled whole-frame OCR, mapped back to frame coordinates.
    fn full_frame_pass(&self, frame: &RgbImage) -> Vec<Detection> {
        let (scaled, factor) = raster::downscale_to(frame, self.config.full_frame_max_dim);
        let (w, h) = scaled.dimensions();
        let mut found = self.ocr_pass(
            &scaled,
            Rect::new(0, 0, w, h),
            "full_frame",
            DetectionSource::OcrFullRegion,
            0,
        );
        if factor < 1.0 {
            for d in &mut found {
                d.region = d.region.scale(1.0 / factor);
            }
        }
        found
    }

    /// Components of the adaptive-threshold mask that look like text blocks.
    /// Each is re-read by OCR when possible.
    fn component_scan(&self, sub: &RgbImage, area: Rect, name: &str) -> Vec<Detection> {
        let cfg = &self.config;
        let (w, h) = sub.dimensions();
        let gray = raster::to_grayscale(sub);
        let mask = raster::adaptive_threshold(
            &gray,
            w as usize,
            h as usize,
            cfg.adaptive_block as usize,
            cfg.adaptive_offset / 255.0,
        );

        raster::connected_components(&mask, w as usize, h as usize)
            .into_iter()
            .filter(|c| self.is_text_block(c, w, h))
            .map(|c| {
                let fill = c.fill_ratio();
                let region = c.bounds.offset(area.x, area.y);
                let text = if self.ocr_available() {
                    let crop = c.bounds.expand(OCR_MARGIN, OCR_MARGIN).clip_to(w, h);
                    crop.map(|r| self.read(&raster::crop(sub, r)))
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(text, _)| text)
                        .max_by_key(|t| t.chars().count())
                } else {
                    None
                };
                match text {
                    Some(text) => {
                        let is_watermark = self.classifier.is_watermark(&text);
                        let confidence = if is_watermark {
                            cfg.watermark_confidence
                        } else {
                            fill
                        };
                        Detection::new(region, confidence, DetectionSource::OcrSelective, name)
                            .with_text(text, is_watermark)
                    }
                    None => Detection::new(
                        region,
                        fill * cfg.shape_confidence_scale,
                        DetectionSource::ComponentShape,
                        name,
                    ),
                }
            })
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_text_block(&self, c: &Component, region_w: u32, region_h: u32) -> bool {
        let cfg = &self.config;
        let b = c.bounds;
        let aspect = b.height as f32 / b.width.max(1) as f32;
        b.width > cfg.component_min_width
            && b.height > cfg.component_min_height
            && (b.width as f32) < region_w as f32 * cfg.component_max_fraction
            && (b.height as f32) < region_h as f32 * cfg.component_max_fraction
            && (cfg.component_min_aspect..=cfg.component_max_aspect).contains(&aspect)
            && c.area > cfg.component_min_area
            && c.fill_ratio() > cfg.component_min_fill
    }

    /// Areas of dense Sobel edges, found on a block grid and tightened to
    /// their edge pixels.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn edge_scan(&self, sub: &RgbImage, area: Rect, name: &str) -> Vec<Detection> {
        let cfg = &self.config;
        let (w, h) = (sub.width() as usize, sub.height() as usize);
        let block = cfg.edge_block as usize;
        let gray = raster::to_grayscale(sub);
        let edges: Vec<bool> = raster::sobel_magnitude(&gray, w, h)
            .into_iter()
            .map(|m| m > cfg.edge_magnitude)
            .collect();

        let (bw, bh) = (w.div_ceil(block), h.div_ceil(block));
        let mut density = vec![0.0_f32; bw * bh];
        for by in 0..bh {
            for bx in 0..bw {
                let (x0, y0) = (bx * block, by * block);
                let (x1, y1) = ((x0 + block).min(w), (y0 + block).min(h));
                let count = (y0..y1)
                    .flat_map(|y| (x0..x1).map(move |x| y * w + x))
                    .filter(|&i| edges[i])
                    .count();
                density[by * bw + bx] = count as f32 / ((x1 - x0) * (y1 - y0)) as f32;
            }
        }
        let dense: Vec<bool> = density.iter().map(|&d| d > cfg.edge_min_density).collect();

        let region_area = (w * h) as f32;
        let mut found = Vec::new();
        for comp in raster::connected_components(&dense, bw, bh) {
            let cb = comp.bounds;
            let mut blocks = Vec::new();
            for by in cb.y..cb.bottom() {
                for bx in cb.x..cb.right() {
                    let idx = by as usize * bw + bx as usize;
                    if dense[idx] {
                        blocks.push(density[idx]);
                    }
                }
            }
            let mean_density = blocks.iter().sum::<f32>() / blocks.len().max(1) as f32;

            let px = Rect::new(
                cb.x * cfg.edge_block,
                cb.y * cfg.edge_block,
                cb.width * cfg.edge_block,
                cb.height * cfg.edge_block,
            );
            let Some(px) = px.clip_to(w as u32, h as u32) else {
                continue;
            };
            let Some(tight) = edge_bounds(&edges, w, px) else {
                continue;
            };
            let Some(padded) = tight
                .expand(EDGE_PADDING, EDGE_PADDING)
                .clip_to(w as u32, h as u32)
            else {
                continue;
            };
            if padded.area() as f32 > region_area * cfg.component_max_fraction {
                continue;
            }
            found.push(Detection::new(
                padded.offset(area.x, area.y),
                (mean_density * cfg.shape_confidence_scale).min(1.0),
                DetectionSource::EdgeScan,
                name,
            ));
        }
        found
    }

    /// Bright, colourless blobs: the usual look of overlay text and logos.
    fn color_scan(&self, sub: &RgbImage, area: Rect, name: &str) -> Vec<Detection> {
        let cfg = &self.config;
        let (w, h) = sub.dimensions();
        let mask: Vec<bool> = sub
            .pixels()
            .map(|px| raster::is_bright_neutral(px, cfg.overlay_min_value, cfg.overlay_max_spread))
            .collect();
        raster::connected_components(&mask, w as usize, h as usize)
            .into_iter()
            .filter(|c| self.is_text_block(c, w, h))
            .map(|c| {
                Detection::new(
                    c.bounds.offset(area.x, area.y),
                    c.fill_ratio() * cfg.shape_confidence_scale,
                    DetectionSource::ColorScan,
                    name,
                )
            })
            .collect()
    }
}

/// The four quarters of a `w x h` area.
fn quarters(w: u32, h: u32) -> [Rect; 4] {
    let (hw, hh) = (w / 2, h / 2);
    [
        Rect::new(0, 0, hw, hh),
        Rect::new(hw, 0, w - hw, hh),
        Rect::new(0, hh, hw, h - hh),
        Rect::new(hw, hh, w - hw, h - hh),
    ]
}

/// Tight box around the edge pixels inside `within`.
#[allow(clippy::cast_possible_truncation)]
fn edge_bounds(edges: &[bool], width: usize, within: Rect) -> Option<Rect> {
    let mut bounds: Option<Rect> = None;
    for y in within.y..within.bottom() {
        for x in within.x..within.right() {
            if edges[y as usize * width + x as usize] {
                let px = Rect::new(x, y, 1, 1);
                bounds = Some(bounds.map_or(px, |b| b.union(&px)));
            }
        }
    }
    bounds
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::config::TextConfig;
    use crate::ocr::{NoOcr, RecognizedText};

    /// Reads `text` wherever a bright block lies fully inside the queried image.
    struct BlockReader {
        text: &'static str,
    }

    impl TextRecognizer for BlockReader {
        fn recognize_text(&self, image: &RgbImage) -> Vec<RecognizedText> {
            let (w, h) = image.dimensions();
            let mut bounds: Option<Rect> = None;
            for (x, y, px) in image.enumerate_pixels() {
                if raster::luminance(px) > 0.8 {
                    let p = Rect::new(x, y, 1, 1);
                    bounds = Some(bounds.map_or(p, |b| b.union(&p)));
                }
            }
            match bounds {
                Some(b) if b.x > 0 && b.y > 0 && b.right() < w && b.bottom() < h => {
                    vec![RecognizedText::with_bounds(self.text, 0.9, b)]
                }
                _ => Vec::new(),
            }
        }
    }

    fn frame_with_block(w: u32, h: u32, block: Rect) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if x >= block.x && x < block.right() && y >= block.y && y < block.bottom() {
                Rgb([245, 245, 245])
            } else {
                Rgb([30, 35, 40])
            }
        })
    }

    fn proposer(ocr: Box<dyn TextRecognizer>) -> RegionProposer {
        let classifier = TextClassifier::new(&TextConfig::default()).unwrap();
        RegionProposer::new(ProposerConfig::default(), classifier, ocr)
    }

    #[test]
    fn named_regions_follow_fractions() {
        let p = proposer(Box::new(NoOcr));
        let regions = p.named_regions(1000, 500);
        assert_eq!(regions.len(), 12);
        let find = |n: &str| regions.iter().find(|(name, _, _)| name == n).unwrap().1;
        assert_eq!(find("top_left"), Rect::new(0, 0, 300, 150));
        assert_eq!(find("bottom_right"), Rect::new(700, 350, 300, 150));
        assert_eq!(find("top_center"), Rect::new(350, 0, 300, 75));
        assert_eq!(find("right_center"), Rect::new(850, 175, 150, 150));
        assert_eq!(find("bottom_edge"), Rect::new(0, 400, 1000, 100));
        assert_eq!(find("right_edge"), Rect::new(800, 0, 200, 500));
        for (name, _, source) in &regions {
            let expected = if name.ends_with("_edge") {
                DetectionSource::EdgeStripScan
            } else {
                DetectionSource::CornerScan
            };
            assert_eq!(*source, expected, "{name}");
        }
    }

    #[test]
    fn grid_skips_center_cells() {
        let p = proposer(Box::new(NoOcr));
        let cells = p.grid_cells(600, 600);
        assert_eq!(cells.len(), 36 - 16);
        assert!(cells.iter().any(|(n, r)| n == "grid_0_3" && *r == Rect::new(300, 0, 100, 100)));
        assert!(!cells.iter().any(|(n, _)| n == "grid_2_2"));
    }

    #[test]
    fn degenerate_frames_yield_nothing() {
        let p = proposer(Box::new(BlockReader { text: "www.example.com" }));
        assert!(p.propose(&RgbImage::new(1, 1)).is_empty());
        assert!(p.propose(&RgbImage::new(0, 0)).is_empty());
    }

    #[test]
    fn ocr_finds_watermark_text_in_full_frame() {
        let block = Rect::new(50, 50, 150, 30);
        let frame = frame_with_block(640, 360, block);
        let p = proposer(Box::new(BlockReader { text: "www.example.com" }));
        let detections = p.propose(&frame);
        let text: Vec<_> = detections.iter().filter(|d| d.is_watermark_text).collect();
        assert!(!text.is_empty());
        assert!(text.iter().any(|d| d.region == block && d.source == DetectionSource::OcrFullRegion));
        for d in &detections {
            assert!(d.region.right() <= 640 && d.region.bottom() <= 360, "{}", d.region);
        }
    }

    #[test]
    fn corner_text_is_read_in_its_region() {
        let block = Rect::new(1200, 20, 60, 30);
        let frame = frame_with_block(1280, 720, block);
        let p = proposer(Box::new(BlockReader { text: "dramacool.tv" }));
        let detections = p.propose(&frame);
        assert!(detections.iter().any(|d| d.scan_region == "top_right"
            && d.source == DetectionSource::CornerScan
            && d.region == block
            && (d.confidence - 0.8).abs() < 1e-6));
        // Full-frame reads are mapped back from the downscaled frame.
        let full = detections
            .iter()
            .find(|d| d.scan_region == "full_frame")
            .unwrap();
        assert!(full.region.overlap_ratio(&block) > 0.8, "{}", full.region);
    }

    #[test]
    fn ordinary_text_gets_lower_confidence_and_triggers_fallbacks() {
        let block = Rect::new(40, 30, 120, 40);
        let frame = frame_with_block(640, 360, block);
        let p = proposer(Box::new(BlockReader { text: "VIDEO CONTENT" }));
        let detections = p.propose(&frame);
        let top_left: Vec<_> = detections.iter().filter(|d| d.scan_region == "top_left").collect();
        assert!(top_left
            .iter()
            .any(|d| d.source == DetectionSource::CornerScan && (d.confidence - 0.5).abs() < 1e-6));
        assert!(top_left.iter().any(|d| d.source == DetectionSource::OcrSelective));
    }

    #[test]
    fn edge_strip_reads_are_tagged_by_region() {
        // Inside the left strip but outside every corner and edge-center region.
        let block = Rect::new(20, 225, 50, 20);
        let frame = frame_with_block(1280, 720, block);
        let p = proposer(Box::new(BlockReader { text: "VIDEO CONTENT" }));
        let detections = p.propose(&frame);
        assert!(detections.iter().any(|d| d.scan_region == "left_edge"
            && d.source == DetectionSource::EdgeStripScan
            && d.region == block));
        assert!(!detections
            .iter()
            .any(|d| d.scan_region == "left_edge" && d.source == DetectionSource::CornerScan));
    }

    #[test]
    fn small_area_reads_carry_the_area_source() {
        let frame = frame_with_block(200, 100, Rect::new(50, 30, 60, 20));
        let p = proposer(Box::new(BlockReader { text: "www.example.com" }));
        let found = p.ocr_pass(
            &frame,
            Rect::new(400, 0, 200, 100),
            "grid_0_2",
            DetectionSource::GridScan,
            0,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, DetectionSource::GridScan);
        assert_eq!(found[0].region, Rect::new(450, 30, 60, 20));
        assert_eq!(found[0].scan_region, "grid_0_2");
    }

    #[test]
    fn without_ocr_shape_heuristics_still_fire() {
        let block = Rect::new(40, 30, 120, 40);
        let frame = frame_with_block(640, 360, block);
        let p = proposer(Box::new(NoOcr));
        assert!(!p.ocr_available());
        let detections = p.propose(&frame);
        assert!(!detections.is_empty());
        assert!(detections.iter().all(|d| d.text.is_empty()));
        for source in [DetectionSource::ComponentShape, DetectionSource::ColorScan] {
            assert!(
                detections.iter().any(|d| d.source == source && d.region.overlap_ratio(&block) > 0.5),
                "missing {source}"
            );
        }
        for d in &detections {
            assert!(d.region.right() <= 640 && d.region.bottom() <= 360);
        }
    }

    #[test]
    fn dense_edges_are_found_without_ocr() {
        let block = Rect::new(40, 30, 120, 40);
        let frame = RgbImage::from_fn(640, 360, |x, y| {
            let inside = x >= block.x && x < block.right() && y >= block.y && y < block.bottom();
            if inside && (x / 2) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([20, 20, 20])
            }
        });
        let p = proposer(Box::new(NoOcr));
        let edges: Vec<_> = p
            .propose(&frame)
            .into_iter()
            .filter(|d| d.source == DetectionSource::EdgeScan && d.scan_region == "top_left")
            .collect();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].region.contains(&Rect::new(42, 32, 116, 36)), "{}", edges[0].region);
        assert!(edges[0].region.overlap_ratio(&block) > 0.6);
        assert!(edges[0].confidence > 0.3);
    }

    #[test]
    fn flat_frames_produce_no_shapes() {
        let p = proposer(Box::new(NoOcr));
        let flat = RgbImage::from_pixel(320, 240, Rgb([30, 30, 30]));
        assert!(p.propose(&flat).is_empty());
    }

    #[test]
    fn large_regions_are_quartered_when_whole_read_fails() {
        // Two blocks: the whole-region read sees both and reports nothing,
        // each quarter sees one.
        let mut frame = frame_with_block(1000, 1000, Rect::new(100, 100, 100, 40));
        for y in 700..740 {
            for x in 700..800 {
                frame.put_pixel(x, y, Rgb([245, 245, 245]));
            }
        }
        struct SingleBlock;
        impl TextRecognizer for SingleBlock {
            fn recognize_text(&self, image: &RgbImage) -> Vec<RecognizedText> {
                let bright = image
                    .pixels()
                    .filter(|px| raster::luminance(px) > 0.8)
                    .count();
                if bright == 4000 {
                    vec![RecognizedText::new("www.example.com", 0.9)]
                } else {
                    Vec::new()
                }
            }
        }
        let p = proposer(Box::new(SingleBlock));
        let found = p.ocr_pass(
            &frame,
            Rect::new(0, 0, 1000, 1000),
            "grid_0_0",
            DetectionSource::GridScan,
            0,
        );
        assert_eq!(found.len(), 2);
        // Each quarter is still oversized, so it is read whole.
        assert!(found.iter().all(|d| d.source == DetectionSource::OcrFullRegion));
        assert!(found.iter().any(|d| d.region == Rect::new(0, 0, 500, 500)));
        assert!(found.iter().any(|d| d.region == Rect::new(500, 500, 500, 500)));
    }
}
