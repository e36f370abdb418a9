use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use watermark_timeline::{
    AnalysisReport, DetectorConfig, FfmpegVideo, FrameDirectory, NoOcr, RemovalRegions,
    Treatment, WatermarkAnalyzer,
};

#[derive(Parser)]
#[command(
    name = "watermark-timeline",
    about = "Detect and track video watermarks over time and plan their removal",
    version,
    after_help = "Simple usage: watermark-timeline <video>\n\n\
                  The input may also be a directory of frames named by timestamp \
                  in seconds (e.g. 12.5.png).\n\
                  Videos are decoded with ffmpeg/ffprobe from PATH. No OCR engine \
                  is bundled, so only shape heuristics run."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input video file or frame directory
    input: String,

    /// JSON configuration file (missing fields use defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between sampled frames
    #[arg(short, long)]
    interval: Option<f64>,

    /// Removal treatment (blur, delogo, blackout, inpaint, pixelate, auto)
    #[arg(short, long)]
    treatment: Option<Treatment>,

    /// Plan one static region even for moving watermarks
    #[arg(long)]
    static_only: bool,

    /// Nearest-frame tolerance in seconds for frame directories
    /// (default: half the sampling interval)
    #[arg(long)]
    frame_tolerance: Option<f64>,

    /// Print the full report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Write the full JSON report to a file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let analyzer = match WatermarkAnalyzer::new(config, Box::new(NoOcr)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize analyzer: {e}");
            process::exit(1);
        }
    };

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    let result = if input_path.is_dir() {
        let tolerance = cli
            .frame_tolerance
            .unwrap_or(analyzer.config().sampling.interval / 2.0);
        FrameDirectory::open(input_path, tolerance).and_then(|frames| analyzer.analyze(&frames))
    } else {
        analyzer.analyze(&FfmpegVideo::new(input_path))
    };
    let report = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("[FAIL] {}: {e}", cli.input);
            process::exit(1);
        }
    };

    if let Some(path) = &cli.output {
        let written = report
            .to_json()
            .and_then(|json| std::fs::write(path, json).map_err(Into::into));
        if let Err(e) = written {
            eprintln!("Error: Failed to write {}: {e}", path.display());
            process::exit(1);
        }
    }

    if cli.json {
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    } else if !cli.quiet {
        print_summary(&report);
    }
}

fn load_config(cli: &Cli) -> watermark_timeline::Result<DetectorConfig> {
    let mut config = match &cli.config {
        Some(path) => DetectorConfig::from_json_file(path)?,
        None => DetectorConfig::default(),
    };
    if let Some(interval) = cli.interval {
        config.sampling.interval = interval;
    }
    if let Some(treatment) = cli.treatment {
        config.selector.treatment = treatment;
    }
    if cli.static_only {
        config.selector.dynamic_regions = false;
    }
    config.validate()?;
    Ok(config)
}

fn print_summary(report: &AnalysisReport) {
    let video = &report.video;
    eprintln!(
        "Analysed {}/{} frames ({}x{}, {:.1}s){}",
        report.samples_used,
        report.samples_attempted,
        video.width,
        video.height,
        video.duration,
        if report.ocr_available { "" } else { " without OCR" }
    );

    for timeline in &report.timelines {
        let identity = if timeline.identity.is_empty() {
            "<shape>"
        } else {
            timeline.identity.as_str()
        };
        eprintln!(
            "  {identity}: {} position(s), {}, {:.0}% confidence",
            timeline.position_count(),
            timeline.movement_type,
            timeline.confidence * 100.0
        );
    }

    let Some(plan) = &report.plan else {
        println!("No watermark detected");
        return;
    };

    println!(
        "Plan: {} ({:?}, {:?})",
        plan.treatment, plan.strategy, plan.intensity
    );
    match &plan.regions {
        RemovalRegions::Static(rect) => println!("  region {rect}"),
        RemovalRegions::Timed(regions) => {
            for r in regions {
                println!(
                    "  {:>8.2}s - {:>8.2}s  {}",
                    r.start_time, r.end_time, r.region
                );
            }
        }
    }
}
