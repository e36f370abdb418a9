//! Frame sources and video probing.
//!
//! The analyzer only needs two things from a video: a frame at a given time
//! and the video's size and length. Both are traits so that tests and callers
//! with their own decoders can plug in. Two implementations ship with the
//! crate: [`FfmpegVideo`] shells out to `ffmpeg`/`ffprobe`, and
//! [`FrameDirectory`] serves pre-extracted frames named by their timestamp.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SamplingConfig;
use crate::error::Result;

/// Dimensions and length of the analysed video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Duration in seconds.
    pub duration: f64,
}

/// Something that can hand out decoded frames.
pub trait FrameSource: Send + Sync {
    /// The frame at `timestamp` seconds, or `None` if it cannot be produced.
    fn extract_frame(&self, timestamp: f64) -> Option<RgbImage>;

    /// The timestamps this source prefers to be sampled at. `None` lets the
    /// analyzer build its own schedule from the duration.
    fn timestamps(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Metadata lookup for a video.
pub trait VideoProbe {
    /// Frame width and height, if known.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Duration in seconds, if known.
    fn duration(&self) -> Option<f64> {
        None
    }
}

/// Probe `video`, substituting the configured fallbacks for anything the
/// probe cannot answer.
#[must_use]
pub fn probe_video<P: VideoProbe + ?Sized>(video: &P, sampling: &SamplingConfig) -> VideoInfo {
    let (width, height) = video
        .dimensions()
        .filter(|&(w, h)| w > 0 && h > 0)
        .unwrap_or_else(|| {
            warn!(
                width = sampling.fallback_width,
                height = sampling.fallback_height,
                "could not probe dimensions, using fallback"
            );
            (sampling.fallback_width, sampling.fallback_height)
        });
    let duration = video
        .duration()
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or_else(|| {
            warn!(
                duration = sampling.fallback_duration,
                "could not probe duration, using fallback"
            );
            sampling.fallback_duration
        });
    VideoInfo {
        width,
        height,
        duration,
    }
}

/// A video file decoded by the `ffmpeg` command line tools.
#[derive(Debug)]
pub struct FfmpegVideo {
    path: PathBuf,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    probed: OnceLock<Option<StreamInfo>>,
}

/// What `ffprobe` reported about the first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StreamInfo {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

impl FfmpegVideo {
    /// Use the `ffmpeg` and `ffprobe` binaries found on `PATH`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            probed: OnceLock::new(),
        }
    }

    /// Use specific tool binaries.
    #[must_use]
    pub fn with_tools(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    /// The video file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        *self.probed.get_or_init(|| match self.run_ffprobe() {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ffprobe failed");
                None
            }
        })
    }

    fn run_ffprobe(&self) -> Result<StreamInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(&self.path)
            .stderr(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!("ffprobe exited with {}", output.status)).into());
        }
        parse_ffprobe(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Pull the first video stream's size and the container duration out of
/// `ffprobe -print_format json` output.
fn parse_ffprobe(json: &str) -> Result<StreamInfo> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let seconds = |s: &Option<String>| s.as_deref().and_then(|d| d.trim().parse::<f64>().ok());
    Ok(StreamInfo {
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        duration: seconds(&probe.format.duration).or_else(|| video.and_then(|s| seconds(&s.duration))),
    })
}

impl FrameSource for FfmpegVideo {
    fn extract_frame(&self, timestamp: f64) -> Option<RgbImage> {
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{timestamp:.3}"), "-i"])
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        let output = match output {
            Ok(o) if o.status.success() && !o.stdout.is_empty() => o,
            Ok(o) => {
                debug!(timestamp, status = %o.status, "ffmpeg produced no frame");
                return None;
            }
            Err(e) => {
                warn!(timestamp, error = %e, "could not run ffmpeg");
                return None;
            }
        };
        match image::load_from_memory(&output.stdout) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!(timestamp, error = %e, "could not decode extracted frame");
                None
            }
        }
    }
}

impl VideoProbe for FfmpegVideo {
    fn dimensions(&self) -> Option<(u32, u32)> {
        let info = self.stream_info()?;
        Some((info.width?, info.height?))
    }

    fn duration(&self) -> Option<f64> {
        self.stream_info()?.duration
    }
}

/// Check if a file path has a frame image extension.
///
/// Recognizes: jpg, jpeg, png, webp, bmp (case-insensitive).
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// A directory of extracted frames whose file stems are their timestamps in
/// seconds, e.g. `12.5.png`.
#[derive(Debug, Clone)]
pub struct FrameDirectory {
    frames: Vec<(f64, PathBuf)>,
    tolerance: f64,
}

impl FrameDirectory {
    /// Index the frames in `dir`. Files that are not images or whose stem is
    /// not a number are ignored. A request is served by the nearest frame
    /// within `tolerance` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the directory cannot be read.
    pub fn open(dir: &Path, tolerance: f64) -> Result<Self> {
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || !is_supported_image(&path) {
                continue;
            }
            let time = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|t| t.is_finite() && *t >= 0.0);
            match time {
                Some(t) => frames.push((t, path)),
                None => debug!(path = %path.display(), "skipping frame without timestamp name"),
            }
        }
        frames.sort_by(|a, b| a.0.total_cmp(&b.0));
        debug!(dir = %dir.display(), frames = frames.len(), "indexed frame directory");
        Ok(Self { frames, tolerance })
    }

    /// Number of indexed frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn nearest(&self, timestamp: f64) -> Option<&Path> {
        self.frames
            .iter()
            .min_by(|a, b| (a.0 - timestamp).abs().total_cmp(&(b.0 - timestamp).abs()))
            .filter(|(t, _)| (t - timestamp).abs() <= self.tolerance)
            .map(|(_, p)| p.as_path())
    }
}

impl FrameSource for FrameDirectory {
    fn extract_frame(&self, timestamp: f64) -> Option<RgbImage> {
        let path = self.nearest(timestamp)?;
        match image::open(path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read frame");
                None
            }
        }
    }

    fn timestamps(&self) -> Option<Vec<f64>> {
        Some(self.frames.iter().map(|(t, _)| *t).collect())
    }
}

impl VideoProbe for FrameDirectory {
    fn dimensions(&self) -> Option<(u32, u32)> {
        let (_, first) = self.frames.first()?;
        image::image_dimensions(first).ok()
    }

    fn duration(&self) -> Option<f64> {
        self.frames.last().map(|(t, _)| *t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<(u32, u32)>, Option<f64>);

    impl VideoProbe for Fixed {
        fn dimensions(&self) -> Option<(u32, u32)> {
            self.0
        }

        fn duration(&self) -> Option<f64> {
            self.1
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("watermark-timeline-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn probe_uses_reported_values() {
        let info = probe_video(&Fixed(Some((1280, 720)), Some(42.5)), &SamplingConfig::default());
        assert_eq!(
            info,
            VideoInfo {
                width: 1280,
                height: 720,
                duration: 42.5
            }
        );
    }

    #[test]
    fn probe_falls_back_per_field() {
        let sampling = SamplingConfig::default();
        let info = probe_video(&Fixed(None, Some(10.0)), &sampling);
        assert_eq!((info.width, info.height, info.duration), (1920, 1080, 10.0));

        let info = probe_video(&Fixed(Some((640, 0)), Some(f64::NAN)), &sampling);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.duration - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_ffprobe_json() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio", "duration": "30.0"},
                {"codec_type": "video", "width": 1920, "height": 800, "duration": "29.9"}
            ],
            "format": {"duration": "30.016000"}
        }"#;
        let info = parse_ffprobe(json).unwrap();
        assert_eq!(info.width, Some(1920));
        assert_eq!(info.height, Some(800));
        assert!((info.duration.unwrap() - 30.016).abs() < 1e-9);
    }

    #[test]
    fn ffprobe_without_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        let info = parse_ffprobe(json).unwrap();
        assert_eq!(info.width, None);
        assert_eq!(info.duration, None);
        assert!(parse_ffprobe("not json").is_err());
    }

    #[test]
    fn missing_tools_degrade_to_none() {
        let video = FfmpegVideo::new("/nonexistent/video.mp4")
            .with_tools("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(video.extract_frame(1.0).is_none());
        assert!(video.dimensions().is_none());
        assert!(video.duration().is_none());
        let info = probe_video(&video, &SamplingConfig::default());
        assert_eq!((info.width, info.height), (1920, 1080));
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("1.0.jpg")));
        assert!(is_supported_image(Path::new("frame.JPEG")));
        assert!(is_supported_image(Path::new("frame.png")));
        assert!(is_supported_image(Path::new("frame.webp")));
        assert!(is_supported_image(Path::new("frame.bmp")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("clip.mp4")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("frame")));
    }

    #[test]
    fn frame_directory_serves_nearest_frame() {
        let dir = temp_dir("frames");
        for (name, shade) in [("1", 10u8), ("3.5", 20), ("6", 30)] {
            RgbImage::from_pixel(32, 16, image::Rgb([shade, shade, shade]))
                .save(dir.join(format!("{name}.png")))
                .unwrap();
        }
        std::fs::write(dir.join("readme.txt"), "ignored").unwrap();
        std::fs::write(dir.join("poster.png"), "ignored").unwrap();

        let frames = FrameDirectory::open(&dir, 0.5).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames.timestamps(), Some(vec![1.0, 3.5, 6.0]));
        assert_eq!(frames.dimensions(), Some((32, 16)));
        assert_eq!(frames.duration(), Some(6.0));

        let frame = frames.extract_frame(3.3).unwrap();
        assert_eq!(frame.get_pixel(0, 0)[0], 20);
        assert!(frames.extract_frame(2.2).is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn frame_directory_missing_dir_is_an_error() {
        assert!(matches!(
            FrameDirectory::open(Path::new("/nonexistent/frames"), 0.5),
            Err(crate::Error::Io(_))
        ));
    }
}
