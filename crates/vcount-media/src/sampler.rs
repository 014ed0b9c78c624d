//! Frame sampling.
//!
//! A `FrameSampler` probes an upload and opens a `FrameSource`: a lazy,
//! finite, non-restartable sequence of RGB frames with strictly increasing
//! timestamps covering `[0, duration)`. The FFmpeg implementation decodes
//! through `-f rawvideo -pix_fmt rgb24` on stdout so only one frame is held
//! in memory at a time; dropping the source kills the decoder.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use metrics::counter;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};
use crate::source::{VideoSource, VideoUpload};

/// Frame rate assumed when the container does not report one.
const FALLBACK_FPS: f64 = 30.0;

/// Frames wider than this are downscaled before detection.
pub const DEFAULT_MAX_FRAME_WIDTH: u32 = 640;

/// Number of FFmpeg stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 20;

/// Which frames of the video are handed to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingPolicy {
    /// Every decoded frame
    EveryFrame,
    /// One frame every N seconds
    EverySeconds(f64),
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        SamplingPolicy::EverySeconds(1.0)
    }
}

impl SamplingPolicy {
    /// Build from a seconds value; zero or negative means every frame.
    pub fn from_secs(secs: f64) -> Self {
        if secs.is_finite() && secs > 0.0 {
            SamplingPolicy::EverySeconds(secs)
        } else {
            SamplingPolicy::EveryFrame
        }
    }

    /// Sampled frames per second for a video with the given native rate.
    pub fn rate(&self, native_fps: Option<f64>) -> f64 {
        let native = native_fps.filter(|f| *f > 0.0).unwrap_or(FALLBACK_FPS);
        match self {
            SamplingPolicy::EveryFrame => native,
            SamplingPolicy::EverySeconds(secs) => (1.0 / secs).min(native),
        }
    }

    /// Expected number of sampled frames over `duration` seconds.
    pub fn estimated_frames(&self, duration: f64, native_fps: Option<f64>) -> u64 {
        (duration * self.rate(native_fps)).ceil().max(0.0) as u64
    }
}

/// One decoded RGB24 frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the sampled sequence
    pub index: u64,
    /// Offset from the start of the video in seconds
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Packed RGB bytes, `width * height * 3` long
    pub data: Vec<u8>,
}

/// Lazy sequence of sampled frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, `None` once the sequence is exhausted.
    ///
    /// An `Err` ends the sequence; frames returned before it stay valid.
    async fn next_frame(&mut self) -> Option<MediaResult<Frame>>;
}

/// Probes uploads and opens frame sources over them.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Read duration, frame rate and dimensions.
    async fn probe(&self, upload: &VideoUpload) -> MediaResult<VideoInfo>;

    /// Start decoding `source` under `policy`.
    async fn open(
        &self,
        source: &VideoSource,
        policy: SamplingPolicy,
    ) -> MediaResult<Box<dyn FrameSource>>;
}

/// Sampler backed by the `ffprobe` and `ffmpeg` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegSampler {
    max_width: u32,
}

impl Default for FfmpegSampler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_WIDTH)
    }
}

impl FfmpegSampler {
    pub fn new(max_width: u32) -> Self {
        Self {
            max_width: max_width.max(2),
        }
    }

    /// Output dimensions after downscaling to `max_width`.
    fn output_size(&self, info: &VideoInfo) -> (u32, u32) {
        if info.width <= self.max_width {
            return (info.width, info.height);
        }
        let scaled = (f64::from(info.height) * f64::from(self.max_width) / f64::from(info.width))
            .round() as u32;
        // Keep the height even so every scaler accepts it
        let height = (scaled / 2 * 2).max(2);
        (self.max_width, height)
    }

    /// Decoder invocation emitting frames at exactly `policy.rate(fps)`.
    ///
    /// Frame timestamps are `index / rate`, so every policy applies the fps
    /// filter.
    fn decode_command(&self, path: &Path, info: &VideoInfo, policy: SamplingPolicy) -> FfmpegCommand {
        let (width, height) = self.output_size(info);
        let mut filters = vec![format!("fps={:.6}", policy.rate(info.fps))];
        if (width, height) != (info.width, info.height) {
            filters.push(format!("scale={}:{}", width, height));
        }

        FfmpegCommand::to_stdout(path)
            .input_arg("-nostdin")
            .video_filter(filters.join(","))
            .pixel_format("rgb24")
            .format("rawvideo")
    }
}

#[async_trait]
impl FrameSampler for FfmpegSampler {
    async fn probe(&self, upload: &VideoUpload) -> MediaResult<VideoInfo> {
        probe_video(upload.path()).await
    }

    async fn open(
        &self,
        source: &VideoSource,
        policy: SamplingPolicy,
    ) -> MediaResult<Box<dyn FrameSource>> {
        check_ffmpeg()?;

        let info = source.info();
        let (width, height) = self.output_size(info);
        let rate = policy.rate(info.fps);

        let args = self.decode_command(source.path(), info, policy).build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::decode_failed(format!("Failed to spawn FFmpeg: {}", e), 0))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        info!(
            filename = %source.filename(),
            duration = info.duration,
            width,
            height,
            rate,
            "Frame sampling started"
        );

        Ok(Box::new(FfmpegFrameStream {
            child,
            stdout: BufReader::new(stdout),
            stderr_task: Some(stderr_task),
            width,
            height,
            rate,
            duration: info.duration,
            next_index: 0,
            done: false,
        }))
    }
}

/// Raw frames read from an FFmpeg child process.
struct FfmpegFrameStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    rate: f64,
    duration: f64,
    next_index: u64,
    done: bool,
}

impl FfmpegFrameStream {
    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Collect the decoder's exit status once stdout is exhausted.
    async fn finish(&mut self) -> MediaResult<()> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            return Ok(());
        }

        let message = if stderr.trim().is_empty() {
            format!("FFmpeg exited with status {:?}", status.code())
        } else {
            stderr
        };
        Err(MediaError::decode_failed(message, self.next_index))
    }

    /// Stop decoding early, once the frames cover the whole duration.
    async fn stop(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("FFmpeg already exited: {}", e);
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameStream {
    async fn next_frame(&mut self) -> Option<MediaResult<Frame>> {
        if self.done {
            return None;
        }

        let mut data = vec![0u8; self.frame_bytes()];
        let read = match read_full(&mut self.stdout, &mut data).await {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(MediaError::decode_failed(
                    format!("Failed to read FFmpeg output: {}", e),
                    self.next_index,
                )));
            }
        };

        if read == 0 {
            self.done = true;
            return match self.finish().await {
                Ok(()) => {
                    debug!(frames = self.next_index, "Frame sampling finished");
                    None
                }
                Err(e) => Some(Err(e)),
            };
        }

        if read < data.len() {
            self.done = true;
            warn!(
                frames = self.next_index,
                bytes = read,
                "Truncated frame in FFmpeg output"
            );
            let _ = self.finish().await;
            return Some(Err(MediaError::decode_failed(
                "Truncated frame in decoder output",
                self.next_index,
            )));
        }

        let timestamp = self.next_index as f64 / self.rate;
        if timestamp >= self.duration {
            self.done = true;
            self.stop().await;
            return None;
        }

        let frame = Frame {
            index: self.next_index,
            timestamp,
            width: self.width,
            height: self.height,
            data,
        };
        self.next_index += 1;
        counter!("vcount_frames_decoded_total").increment(1);

        Some(Ok(frame))
    }
}

/// Fill `buf` unless the reader hits EOF first; returns bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
