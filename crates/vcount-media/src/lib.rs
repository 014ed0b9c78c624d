//! Video decoding and object detection for vcount.
//!
//! This crate provides:
//! - Upload handling with extension checks and temp-file cleanup
//! - FFprobe metadata probing
//! - Lazy FFmpeg frame sampling over a raw RGB pipe
//! - The `ObjectDetector` seam and a YOLOv8 ONNX implementation

pub mod command;
pub mod detector;
pub mod error;
pub mod probe;
pub mod sampler;
pub mod source;
pub mod yolo;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use detector::ObjectDetector;
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use sampler::{
    FfmpegSampler, Frame, FrameSampler, FrameSource, SamplingPolicy, DEFAULT_MAX_FRAME_WIDTH,
};
pub use source::{
    is_allowed_file, sanitize_filename, UploadWriter, VideoSource, VideoUpload, ALLOWED_EXTENSIONS,
};
pub use yolo::{YoloConfig, YoloDetector, COCO_CLASSES};
