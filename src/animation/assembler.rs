//! Video assembly from a directory of numbered frame images.

use std::env;
use std::fmt;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use log::{debug, info, warn};

use crate::error::{Result, VisError};
use crate::schema::{ConfigError, MAX_GIF_FRAME_RATE, VideoFormat, VisualizerConfig};

/// Environment variable overriding the `ffmpeg` binary.
pub const FFMPEG_ENV: &str = "ZNVIS_FFMPEG";

/// Numeric index embedded in a frame file name: the first run of digits.
///
/// `frame_10.png` → 10. Returns `None` when the name has no digits.
pub fn frame_index(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits: String = name[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Order frame paths by their embedded index, dropping unnumbered ones.
pub fn order_frames(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut indexed: Vec<(u64, PathBuf)> = paths
        .into_iter()
        .filter_map(|p| match frame_index(&p) {
            Some(i) => Some((i, p)),
            None => {
                warn!("Skipping unnumbered frame {}", p.display());
                None
            }
        })
        .collect();
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, p)| p).collect()
}

/// PNG frames in `dir`, numerically ordered.
pub fn sorted_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            paths.push(path);
        }
    }
    Ok(order_frames(paths))
}

/// Delay of GIF frame `index` in centiseconds.
///
/// GIF delays are whole centiseconds, so delays alternate between the two
/// neighbouring values: the first `n` frames always last
/// `n * 100 / frame_rate` centiseconds (rounded down) in total.
pub fn gif_frame_delay_cs(index: usize, frame_rate: u32) -> u16 {
    let rate = u64::from(frame_rate.max(1));
    let start = index as u64 * 100 / rate;
    let end = (index as u64 + 1) * 100 / rate;
    (end - start).min(u64::from(u16::MAX)) as u16
}

/// Concatenates frame images into a video file.
#[derive(Debug, Clone)]
pub struct Assembler {
    frame_rate: u32,
    format: VideoFormat,
    keep_frames: bool,
    ffmpeg: Option<PathBuf>,
}

impl Assembler {
    pub fn new(frame_rate: u32, format: VideoFormat) -> Self {
        Self {
            frame_rate: frame_rate.max(1),
            format,
            keep_frames: false,
            ffmpeg: None,
        }
    }

    /// Assembler matching a viewer configuration.
    pub fn from_config(config: &VisualizerConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(config.frame_rate, config.video_format()?).keep_frames(config.store_run_files))
    }

    /// Keep the frame directory after a successful assembly.
    pub fn keep_frames(mut self, keep: bool) -> Self {
        self.keep_frames = keep;
        self
    }

    /// Use this `ffmpeg` binary instead of `$ZNVIS_FFMPEG` or the one on `PATH`.
    pub fn ffmpeg(mut self, binary: impl Into<PathBuf>) -> Self {
        self.ffmpeg = Some(binary.into());
        self
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    /// Encode every frame in `frame_dir` into `output`.
    ///
    /// The first frame fixes the video dimensions. Fails without creating
    /// `output` when the directory holds no frames or a frame has different
    /// dimensions. On success the directory is removed unless frames are kept.
    pub fn assemble(&self, frame_dir: &Path, output: &Path) -> Result<AssemblyStats> {
        let frames = sorted_frames(frame_dir)?;
        let Some(first) = frames.first() else {
            return Err(VisError::EmptyCapture(frame_dir.to_path_buf()));
        };
        let (width, height) = image::image_dimensions(first)?;

        info!(
            "Exporting video: {} frames ({}x{}) at {} fps -> {}",
            frames.len(),
            width,
            height,
            self.frame_rate,
            output.display()
        );

        let encoded = match self.format {
            VideoFormat::Gif => self.encode_gif(&frames, (width, height), output),
            _ => self.encode_ffmpeg(&frames, (width, height), output),
        };
        if let Err(err) = encoded {
            if output.exists() {
                let _ = fs::remove_file(output);
            }
            return Err(err);
        }

        let frames_removed = !self.keep_frames;
        if frames_removed {
            fs::remove_dir_all(frame_dir)?;
            debug!("Removed {}", frame_dir.display());
        }

        Ok(AssemblyStats {
            frame_count: frames.len(),
            width,
            height,
            frame_rate: self.frame_rate,
            output: output.to_path_buf(),
            frames_removed,
        })
    }

    fn encode_gif(&self, frames: &[PathBuf], size: (u32, u32), output: &Path) -> Result<()> {
        if self.frame_rate > MAX_GIF_FRAME_RATE {
            return Err(ConfigError::GifFrameRateTooHigh(self.frame_rate).into());
        }
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = GifEncoder::new(&mut buffer);
            encoder.set_repeat(Repeat::Infinite)?;
            for (index, path) in frames.iter().enumerate() {
                let image = load_frame(path, size)?;
                let centis = gif_frame_delay_cs(index, self.frame_rate);
                let delay = Delay::from_numer_denom_ms(u32::from(centis) * 10, 1);
                encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
            }
        }
        fs::write(output, buffer.into_inner())?;
        Ok(())
    }

    fn encode_ffmpeg(&self, frames: &[PathBuf], size: (u32, u32), output: &Path) -> Result<()> {
        let ffmpeg = self
            .ffmpeg
            .clone()
            .or_else(|| env::var_os(FFMPEG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));
        let mut cmd = Command::new(&ffmpeg);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgba")
            .arg("-s")
            .arg(format!("{}x{}", size.0, size.1))
            .arg("-r")
            .arg(self.frame_rate.to_string())
            .arg("-i")
            .arg("-")
            .arg("-frames:v")
            .arg(frames.len().to_string())
            .args(codec_args(self.format))
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| VisError::Encoder(format!("failed to launch {}: {}", ffmpeg.display(), e)))?;

        let fed = feed_frames(&mut child, frames, size);
        if let Err(VisError::FrameDimensionMismatch { .. }) = &fed {
            let _ = child.kill();
        }
        // Closes stdin so ffmpeg can finish.
        let out = child.wait_with_output()?;
        let stderr = || VisError::Encoder(String::from_utf8_lossy(&out.stderr).trim().to_string());
        match fed {
            // A broken pipe means ffmpeg exited early; its stderr says why.
            Err(VisError::Io(_)) if !out.status.success() => Err(stderr()),
            Err(err) => Err(err),
            Ok(()) if !out.status.success() => Err(stderr()),
            Ok(()) => Ok(()),
        }
    }
}

fn codec_args(format: VideoFormat) -> &'static [&'static str] {
    match format {
        VideoFormat::Mp4 => &[
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
        ],
        VideoFormat::Webm => &["-c:v", "libvpx-vp9", "-pix_fmt", "yuv420p"],
        VideoFormat::Mkv => &["-c:v", "ffv1"],
        VideoFormat::Avi | VideoFormat::Mov | VideoFormat::Gif => &["-c:v", "mjpeg", "-q:v", "3"],
    }
}

fn feed_frames(child: &mut Child, frames: &[PathBuf], size: (u32, u32)) -> Result<()> {
    let Some(stdin) = child.stdin.as_mut() else {
        return Err(VisError::Encoder("ffmpeg stdin unavailable".into()));
    };
    for path in frames {
        let image = load_frame(path, size)?;
        stdin.write_all(image.as_raw())?;
    }
    stdin.flush()?;
    Ok(())
}

/// Load a frame and check it against the video dimensions.
fn load_frame(path: &Path, expected: (u32, u32)) -> Result<RgbaImage> {
    let image = image::open(path)?.to_rgba8();
    let actual = image.dimensions();
    if actual != expected {
        return Err(VisError::FrameDimensionMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(image)
}

/// Result of a successful assembly.
#[derive(Debug, Clone)]
pub struct AssemblyStats {
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub output: PathBuf,
    /// True when the frame directory was deleted.
    pub frames_removed: bool,
}

impl fmt::Display for AssemblyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} frames, {}x{} @ {} fps)",
            self.output.display(),
            self.frame_count,
            self.width,
            self.height,
            self.frame_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgb, RgbImage};
    use proptest::prelude::*;
    use std::fs::File;
    use std::io::BufReader;
    use tempfile::tempdir;

    fn write_frame(dir: &Path, name: &str, size: (u32, u32), shade: u8) {
        RgbImage::from_pixel(size.0, size.1, Rgb([shade, 0, 0]))
            .save(dir.join(name))
            .unwrap();
    }

    fn decode_gif(path: &Path) -> Vec<Frame> {
        let reader = BufReader::new(File::open(path).unwrap());
        GifDecoder::new(reader)
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap()
    }

    #[test]
    fn test_frame_index() {
        assert_eq!(frame_index(Path::new("temp_video/frame_10.png")), Some(10));
        assert_eq!(frame_index(Path::new("frame_0.png")), Some(0));
        assert_eq!(frame_index(Path::new("cover.png")), None);
    }

    #[test]
    fn test_numeric_not_lexical_order() {
        let ordered = order_frames(vec![
            PathBuf::from("frame_2.png"),
            PathBuf::from("frame_10.png"),
            PathBuf::from("frame_1.png"),
        ]);
        assert_eq!(
            ordered,
            vec![
                PathBuf::from("frame_1.png"),
                PathBuf::from("frame_2.png"),
                PathBuf::from("frame_10.png"),
            ]
        );
    }

    #[test]
    fn test_sorted_frames_ignores_other_files() {
        let dir = tempdir().unwrap();
        write_frame(dir.path(), "frame_10.png", (4, 4), 10);
        write_frame(dir.path(), "frame_2.png", (4, 4), 2);
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let frames = sorted_frames(dir.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["frame_2.png", "frame_10.png"]);
    }

    #[test]
    fn test_empty_directory_fails_without_output() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir(&frames).unwrap();
        let output = dir.path().join("video.gif");

        let result = Assembler::new(10, VideoFormat::Gif).assemble(&frames, &output);
        assert!(matches!(result, Err(VisError::EmptyCapture(_))));
        assert!(!output.exists());
        assert!(frames.exists());
    }

    #[test]
    fn test_gif_assembly_order_and_rate() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir(&frames).unwrap();
        for i in [2u8, 10, 1] {
            write_frame(&frames, &format!("frame_{}.png", i), (8, 6), i * 20);
        }
        let output = dir.path().join("video.gif");

        let stats = Assembler::new(10, VideoFormat::Gif)
            .assemble(&frames, &output)
            .unwrap();
        assert_eq!(stats.frame_count, 3);
        assert_eq!((stats.width, stats.height), (8, 6));
        assert!(stats.frames_removed);
        assert!(!frames.exists());

        let decoded = decode_gif(&output);
        assert_eq!(decoded.len(), 3);
        let reds: Vec<u8> = decoded
            .iter()
            .map(|f| f.buffer().get_pixel(0, 0)[0])
            .collect();
        assert!(reds[0] < reds[1] && reds[1] < reds[2], "{:?}", reds);
        for frame in &decoded {
            let (numer, denom) = frame.delay().numer_denom_ms();
            assert_eq!(numer / denom, 100);
        }
    }

    #[test]
    fn test_keep_frames() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir(&frames).unwrap();
        write_frame(&frames, "frame_0.png", (4, 4), 0);
        let output = dir.path().join("video.gif");

        let stats = Assembler::new(24, VideoFormat::Gif)
            .keep_frames(true)
            .assemble(&frames, &output)
            .unwrap();
        assert!(!stats.frames_removed);
        assert!(frames.join("frame_0.png").exists());
        assert!(output.exists());
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir(&frames).unwrap();
        write_frame(&frames, "frame_0.png", (8, 8), 0);
        write_frame(&frames, "frame_1.png", (8, 4), 0);
        let output = dir.path().join("video.gif");

        let result = Assembler::new(10, VideoFormat::Gif).assemble(&frames, &output);
        match result {
            Err(VisError::FrameDimensionMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, (8, 8));
                assert_eq!(actual, (8, 4));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!output.exists());
        assert!(frames.exists());
    }

    #[test]
    fn test_from_config() {
        let config = VisualizerConfig {
            frame_rate: 12,
            video_format: "avi".to_string(),
            store_run_files: true,
            ..Default::default()
        };
        let assembler = Assembler::from_config(&config).unwrap();
        assert_eq!(assembler.format(), VideoFormat::Avi);
        assert!(assembler.keep_frames);
    }

    fn frame_dir_with(dir: &Path, count: usize, size: (u32, u32)) -> PathBuf {
        let frames = dir.join("frames");
        fs::create_dir(&frames).unwrap();
        for i in 0..count {
            write_frame(&frames, &format!("frame_{}.png", i), size, (i * 4) as u8);
        }
        frames
    }

    fn total_delay_ms(frames: &[Frame]) -> u32 {
        frames
            .iter()
            .map(|f| {
                let (numer, denom) = f.delay().numer_denom_ms();
                numer / denom
            })
            .sum()
    }

    #[test]
    fn test_gif_frame_delays_alternate() {
        let delays: Vec<u16> = (0..6).map(|i| gif_frame_delay_cs(i, 24)).collect();
        assert_eq!(delays, vec![4, 4, 4, 4, 4, 5]);
        assert!((0..100).all(|i| gif_frame_delay_cs(i, 10) == 10));
        assert!((0..100).all(|i| gif_frame_delay_cs(i, 100) == 1));
    }

    #[test]
    fn test_gif_keeps_frame_rate() {
        for fps in [24u32, 30, 60] {
            let dir = tempdir().unwrap();
            let frames = frame_dir_with(dir.path(), fps as usize, (4, 4));
            let output = dir.path().join("video.gif");

            Assembler::new(fps, VideoFormat::Gif)
                .assemble(&frames, &output)
                .unwrap();

            // One second of frames plays for one second.
            let decoded = decode_gif(&output);
            assert_eq!(decoded.len(), fps as usize);
            assert_eq!(total_delay_ms(&decoded), 1000, "fps {}", fps);
        }
    }

    #[test]
    fn test_gif_rejects_unrepresentable_rate() {
        let dir = tempdir().unwrap();
        let frames = frame_dir_with(dir.path(), 2, (4, 4));
        let output = dir.path().join("video.gif");

        let result = Assembler::new(200, VideoFormat::Gif).assemble(&frames, &output);
        assert!(matches!(
            result,
            Err(VisError::Config(ConfigError::GifFrameRateTooHigh(200)))
        ));
        assert!(!output.exists());
        assert!(frames.exists());
    }

    #[test]
    fn test_codec_args() {
        assert!(codec_args(VideoFormat::Mp4).contains(&"libx264"));
        assert!(codec_args(VideoFormat::Webm).contains(&"libvpx-vp9"));
        assert!(codec_args(VideoFormat::Avi).contains(&"mjpeg"));
    }

    #[test]
    fn test_missing_ffmpeg_binary() {
        let dir = tempdir().unwrap();
        let frames = frame_dir_with(dir.path(), 2, (4, 4));
        let output = dir.path().join("video.avi");

        let result = Assembler::new(10, VideoFormat::Avi)
            .ffmpeg(dir.path().join("no-such-ffmpeg"))
            .assemble(&frames, &output);
        match result {
            Err(VisError::Encoder(msg)) => assert!(msg.contains("no-such-ffmpeg"), "{}", msg),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!output.exists());
        assert!(frames.join("frame_0.png").exists());
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_receives_raw_frames() {
        let dir = tempdir().unwrap();
        let frames = frame_dir_with(dir.path(), 3, (4, 2));
        let output = dir.path().join("video.avi");
        // Writes its arguments and the number of stdin bytes to the output path.
        let ffmpeg = fake_ffmpeg(
            dir.path(),
            "for last; do :; done\n{ echo \"$*\"; wc -c | tr -d ' '; } > \"$last\"",
        );

        let stats = Assembler::new(12, VideoFormat::Avi)
            .ffmpeg(&ffmpeg)
            .assemble(&frames, &output)
            .unwrap();
        assert_eq!(stats.frame_count, 3);
        assert!(!frames.exists());

        let text = fs::read_to_string(&output).unwrap();
        let mut lines = text.lines();
        let args = lines.next().unwrap();
        assert!(args.contains("-f rawvideo -pix_fmt rgba -s 4x2 -r 12"), "{}", args);
        assert!(args.contains("-frames:v 3"), "{}", args);
        assert!(args.contains("-c:v mjpeg"), "{}", args);
        assert_eq!(lines.next().unwrap().trim(), (3 * 4 * 2 * 4).to_string());
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_failure_reports_stderr() {
        let dir = tempdir().unwrap();
        let frames = frame_dir_with(dir.path(), 2, (4, 4));
        let output = dir.path().join("video.mp4");
        let ffmpeg = fake_ffmpeg(dir.path(), "echo \"Unknown encoder 'libx264'\" >&2\nexit 1");

        let result = Assembler::new(10, VideoFormat::Mp4)
            .ffmpeg(&ffmpeg)
            .assemble(&frames, &output);
        match result {
            Err(VisError::Encoder(msg)) => assert!(msg.contains("Unknown encoder"), "{}", msg),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!output.exists());
        assert!(frames.exists());
    }

    proptest! {
        #[test]
        fn prop_gif_delays_sum_to_elapsed_time(fps in 1u32..=100, n in 1usize..500) {
            let total: u64 = (0..n).map(|i| u64::from(gif_frame_delay_cs(i, fps))).sum();
            prop_assert_eq!(total, n as u64 * 100 / u64::from(fps));
        }

        #[test]
        fn prop_order_frames_is_numeric(indices in prop::collection::hash_set(0u64..100_000, 1..40)) {
            let paths: Vec<PathBuf> = indices
                .iter()
                .map(|i| PathBuf::from(format!("frame_{}.png", i)))
                .collect();
            let ordered: Vec<u64> = order_frames(paths)
                .iter()
                .map(|p| frame_index(p).unwrap())
                .collect();
            prop_assert_eq!(ordered.len(), indices.len());
            prop_assert!(ordered.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
