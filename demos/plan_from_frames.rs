//! Plan the removal of a synthetic watermark that drifts across the frame.
//!
//! Frames are generated in memory, so no video or OCR engine is needed. Pass
//! a frame directory to analyse real frames instead.
//!
//! Usage:
//! ```sh
//! cargo run --example plan_from_frames
//! cargo run --example plan_from_frames -- frames/
//! ```

use std::env;
use std::path::Path;
use std::process;

use image::{Rgb, RgbImage};
use watermark_timeline::{
    DetectorConfig, FrameDirectory, FrameSource, NoOcr, VideoProbe, WatermarkAnalyzer,
};

/// A bright logo sliding right by 40 px per second over a dark picture.
struct DriftingLogo;

impl FrameSource for DriftingLogo {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn extract_frame(&self, timestamp: f64) -> Option<RgbImage> {
        let left = 40 + (timestamp * 40.0) as u32;
        Some(RgbImage::from_fn(640, 360, |x, y| {
            if (left..left + 120).contains(&x) && (30..70).contains(&y) {
                Rgb([240, 240, 240])
            } else {
                Rgb([25, 30, 35])
            }
        }))
    }
}

impl VideoProbe for DriftingLogo {
    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((640, 360))
    }

    fn duration(&self) -> Option<f64> {
        Some(12.0)
    }
}

fn main() {
    let analyzer = WatermarkAnalyzer::new(DetectorConfig::default(), Box::new(NoOcr))
        .expect("default config is valid");

    let report = match env::args().nth(1) {
        Some(dir) => FrameDirectory::open(Path::new(&dir), 0.5).and_then(|frames| analyzer.analyze(&frames)),
        None => analyzer.analyze(&DriftingLogo),
    };

    match report.and_then(|r| r.to_json()) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
