use image::{Rgb, RgbImage};
use watermark_timeline::{
    raster, DetectorConfig, Error, FrameDirectory, FrameSource, MovementType, NoOcr,
    RecognizedText, Rect, RemovalRegions, TextRecognizer, VideoProbe, WatermarkAnalyzer,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;

/// Reads a fixed text wherever one bright block lies fully inside the image.
struct BlockOcr(&'static str);

impl TextRecognizer for BlockOcr {
    fn recognize_text(&self, image: &RgbImage) -> Vec<RecognizedText> {
        let (w, h) = image.dimensions();
        let bright = image
            .enumerate_pixels()
            .filter(|(_, _, px)| raster::luminance(px) > 0.8)
            .map(|(x, y, _)| Rect::new(x, y, 1, 1));
        match Rect::bounding(bright) {
            Some(b) if b.x > 0 && b.y > 0 && b.right() < w && b.bottom() < h => {
                vec![RecognizedText::with_bounds(self.0, 0.9, b)]
            }
            _ => Vec::new(),
        }
    }
}

/// Synthetic video with one bright block whose position depends on time.
struct BlockVideo {
    duration: f64,
    block_at: fn(f64) -> Option<Rect>,
}

fn render(block: Option<Rect>) -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| match block {
        Some(b) if x >= b.x && x < b.right() && y >= b.y && y < b.bottom() => Rgb([245, 245, 245]),
        _ => Rgb([30, 35, 40]),
    })
}

impl FrameSource for BlockVideo {
    fn extract_frame(&self, timestamp: f64) -> Option<RgbImage> {
        (self.block_at)(timestamp).map(|b| render(Some(b)))
    }
}

impl VideoProbe for BlockVideo {
    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((WIDTH, HEIGHT))
    }

    fn duration(&self) -> Option<f64> {
        Some(self.duration)
    }
}

fn analyzer_with_ocr() -> WatermarkAnalyzer {
    WatermarkAnalyzer::new(DetectorConfig::default(), Box::new(BlockOcr("www.example.com"))).unwrap()
}

fn static_block(_t: f64) -> Option<Rect> {
    Some(Rect::new(50, 50, 150, 30))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sliding_block(t: f64) -> Option<Rect> {
    // 1s -> x=50, 9s -> x=450
    Some(Rect::new((50.0 + (t - 1.0) * 50.0) as u32, 50, 150, 30))
}

#[test]
fn static_watermark_yields_one_static_timeline() {
    let video = BlockVideo {
        duration: 11.0,
        block_at: static_block,
    };
    let report = analyzer_with_ocr().analyze(&video).unwrap();

    assert_eq!(report.samples_attempted, 5);
    assert_eq!(report.samples_used, 5);
    assert!(report.ocr_available);
    assert_eq!(report.timelines.len(), 1);

    let timeline = &report.timelines[0];
    assert_eq!(timeline.identity, "www.example.com");
    assert_eq!(timeline.movement_type, MovementType::Static);
    assert!(!timeline.is_moving);
    assert!(timeline.is_watermark);
    assert_eq!(timeline.position_count(), 5);

    let plan = report.plan.expect("a plan");
    match plan.regions {
        RemovalRegions::Static(region) => {
            assert!(region.contains(&Rect::new(50, 50, 150, 30)), "{region}");
            assert!(region.right() < WIDTH && region.bottom() < HEIGHT);
        }
        RemovalRegions::Timed(_) => panic!("static watermark got timed regions"),
    }
    assert_eq!(plan.identities, vec!["www.example.com".to_string()]);
}

#[test]
fn moving_watermark_is_horizontal_with_timed_regions() {
    let video = BlockVideo {
        duration: 11.0,
        block_at: sliding_block,
    };
    let report = analyzer_with_ocr().analyze(&video).unwrap();

    let watermarks: Vec<_> = report.timelines.iter().filter(|t| t.is_watermark).collect();
    assert_eq!(watermarks.len(), 1);
    let timeline = watermarks[0];
    assert_eq!(timeline.movement_type, MovementType::Horizontal);
    assert!(timeline.is_moving);
    assert_eq!(timeline.position_count(), 5);
    assert!(
        (390..=410).contains(&timeline.movement_stats.x_range),
        "x range {}",
        timeline.movement_stats.x_range
    );
    assert!(timeline.movement_stats.y_range <= 5);

    let plan = report.plan.expect("a plan");
    let RemovalRegions::Timed(segments) = &plan.regions else {
        panic!("moving watermark got a static region");
    };
    assert_eq!(segments.len(), 5);
    assert!((segments[0].start_time - 1.0).abs() < 1e-9);
    assert!((segments[0].end_time - 3.0).abs() < 1e-9);
    assert!((segments[4].end_time - 14.0).abs() < 1e-9);
    assert!(segments[0].region.contains(&Rect::new(50, 50, 150, 30)));
    assert!(segments[4].region.contains(&Rect::new(450, 50, 150, 30)));
    for s in segments {
        assert!(s.start_time < s.end_time);
        assert!(s.region.right() < WIDTH && s.region.bottom() < HEIGHT);
    }
}

#[test]
fn static_only_plans_one_envelope_for_moving_watermark() {
    let mut config = DetectorConfig::default();
    config.selector.dynamic_regions = false;
    let analyzer = WatermarkAnalyzer::new(config, Box::new(BlockOcr("www.example.com"))).unwrap();
    let video = BlockVideo {
        duration: 11.0,
        block_at: sliding_block,
    };
    let plan = analyzer.analyze(&video).unwrap().plan.expect("a plan");
    let RemovalRegions::Static(region) = plan.regions else {
        panic!("expected one envelope");
    };
    assert!(region.contains(&Rect::new(50, 50, 550, 30)), "{region}");
}

#[test]
fn frame_regions_stay_inside_the_frame() {
    let analyzer = analyzer_with_ocr();
    let blocks = [
        Rect::new(0, 0, 120, 40),
        Rect::new(520, 320, 120, 40),
        Rect::new(300, 170, 60, 20),
        Rect::new(600, 10, 40, 30),
    ];
    for (i, block) in blocks.into_iter().enumerate() {
        let frame = render(Some(block));
        for d in analyzer.analyze_frame(&frame, 1.0, i) {
            let r = d.region();
            assert!(r.width > 0 && r.height > 0);
            assert!(r.right() <= WIDTH && r.bottom() <= HEIGHT, "{r} for {block}");
            assert!((d.detection.sample_time - 1.0).abs() < f64::EPSILON);
            assert_eq!(d.detection.frame_index, i);
        }
    }
}

#[test]
fn plan_regions_keep_a_margin_at_the_frame_edge() {
    fn corner_block(_t: f64) -> Option<Rect> {
        Some(Rect::new(500, 310, 139, 49))
    }
    let video = BlockVideo {
        duration: 11.0,
        block_at: corner_block,
    };
    let report = analyzer_with_ocr().analyze(&video).unwrap();
    let plan = report.plan.expect("a plan");
    for r in plan.regions.rects() {
        assert!(r.width >= 2 && r.height >= 2);
        assert!(r.right() < WIDTH && r.bottom() < HEIGHT, "{r}");
    }
}

#[test]
fn without_ocr_shapes_still_produce_a_plan() {
    let analyzer = WatermarkAnalyzer::new(DetectorConfig::default(), Box::new(NoOcr)).unwrap();
    let video = BlockVideo {
        duration: 11.0,
        block_at: static_block,
    };
    let report = analyzer.analyze(&video).unwrap();
    assert!(!report.ocr_available);
    assert!(!report.timelines.is_empty());
    assert!(report.timelines.iter().all(|t| t.identity.is_empty() && !t.is_watermark));

    let plan = report.plan.expect("a plan");
    let RemovalRegions::Static(region) = plan.regions else {
        panic!("expected a static region");
    };
    assert!(region.overlap_ratio(&Rect::new(50, 50, 150, 30)) > 0.5, "{region}");
}

#[test]
fn unreadable_video_is_an_error() {
    fn nothing(_t: f64) -> Option<Rect> {
        None
    }
    let video = BlockVideo {
        duration: 11.0,
        block_at: nothing,
    };
    match analyzer_with_ocr().analyze(&video) {
        Err(Error::NoUsableFrames { attempted }) => assert_eq!(attempted, 5),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn missing_frames_are_skipped() {
    fn gaps(t: f64) -> Option<Rect> {
        (t < 4.0 || t > 6.0).then_some(Rect::new(50, 50, 150, 30))
    }
    let video = BlockVideo {
        duration: 11.0,
        block_at: gaps,
    };
    let report = analyzer_with_ocr().analyze(&video).unwrap();
    assert_eq!(report.samples_attempted, 5);
    assert_eq!(report.samples_used, 4);
    assert_eq!(report.timelines[0].position_count(), 4);
}

#[test]
fn analyses_a_frame_directory() {
    let dir = std::env::temp_dir().join(format!("watermark-timeline-it-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    for t in ["0.5", "2.5", "4.5"] {
        render(Some(Rect::new(50, 50, 150, 30)))
            .save(dir.join(format!("{t}.png")))
            .unwrap();
    }

    let frames = FrameDirectory::open(&dir, 0.1).unwrap();
    let report = analyzer_with_ocr().analyze(&frames).unwrap();
    assert_eq!(report.samples_used, 3);
    assert_eq!((report.video.width, report.video.height), (WIDTH, HEIGHT));
    let timeline = &report.timelines[0];
    assert_eq!(timeline.time_span(), Some((0.5, 4.5)));
    assert!(report.plan.is_some());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn report_serializes_to_json() {
    let video = BlockVideo {
        duration: 11.0,
        block_at: static_block,
    };
    let report = analyzer_with_ocr().analyze(&video).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["plan"]["regions"]["kind"], "static");
    assert_eq!(json["plan"]["treatment"], "delogo");
    assert_eq!(json["timelines"][0]["movement_type"], "static");
}
