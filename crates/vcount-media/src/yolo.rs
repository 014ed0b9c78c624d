//! YOLOv8 ONNX object detector.
//!
//! Runs a COCO-trained YOLOv8 model through ONNX Runtime. Candidates below
//! the confidence threshold are dropped and overlapping boxes are merged
//! with class-agnostic non-maximum suppression, so each physical object
//! counts once per frame.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::FilterType;
use image::{ImageBuffer, Rgb};
use ndarray::{Array, ArrayView2};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};
use vcount_models::DetectedObject;

use crate::detector::ObjectDetector;
use crate::error::{MediaError, MediaResult};
use crate::sampler::Frame;

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Candidate boxes produced by a 640x640 YOLOv8 head.
const NUM_CANDIDATES: usize = 8400;

/// Detector settings.
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,
    /// Candidates scoring at or below this are dropped
    pub confidence_threshold: f32,
    /// IoU above which the weaker of two boxes is suppressed
    pub nms_threshold: f32,
    /// Square model input size
    pub input_size: u32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
            input_size: 640,
        }
    }
}

/// Box in model input coordinates, center format.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    class_id: usize,
    score: f32,
}

impl Candidate {
    fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        )
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let (ax1, ay1, ax2, ay2) = self.corners();
        let (bx1, by1, bx2, by2) = other.corners();

        let inter_w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
        let inter_h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
        let intersection = inter_w * inter_h;
        let union = self.w * self.h + other.w * other.h - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// YOLOv8 detector over an ONNX Runtime session.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: YoloConfig,
}

impl YoloDetector {
    /// Load the model named in `config`.
    pub fn new(config: YoloConfig) -> MediaResult<Self> {
        if !config.model_path.exists() {
            return Err(MediaError::model_not_found(
                config.model_path.display().to_string(),
            ));
        }

        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            confidence = config.confidence_threshold,
            nms = config.nms_threshold,
            "YOLO detector initialized"
        );

        Ok(Self { session, config })
    }

    pub fn config(&self) -> &YoloConfig {
        &self.config
    }

    /// Resize to the model input and lay out as normalized NCHW.
    fn preprocess(&self, frame: &Frame) -> MediaResult<Value> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.data.len() != expected {
            return Err(MediaError::detection_failed(format!(
                "Frame {} has {} bytes, expected {}",
                frame.index,
                frame.data.len(),
                expected
            )));
        }

        let buffer: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.as_slice())
                .ok_or_else(|| MediaError::detection_failed("Frame buffer has wrong size"))?;

        let size = self.config.input_size;
        let resized = image::imageops::resize(&buffer, size, size, FilterType::Triangle);

        let side = size as usize;
        let mut input = Array::<f32, _>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
            }
        }

        let shape = vec![1usize, 3, side, side];
        Tensor::from_array((shape, input.into_raw_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detection_failed(format!("Failed to create tensor: {}", e)))
    }

    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 84, 8400]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.to_vec())
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, frame: &Frame) -> MediaResult<Vec<DetectedObject>> {
        let input = self.preprocess(frame)?;
        let raw = self.run_inference(input)?;
        let candidates = decode_output(&raw, self.config.confidence_threshold)?;
        let kept = non_maximum_suppression(candidates, self.config.nms_threshold);

        debug!(frame = frame.index, count = kept.len(), "Frame detected");

        Ok(kept
            .into_iter()
            .map(|c| DetectedObject::new(class_label(c.class_id), c.score))
            .collect())
    }

    fn name(&self) -> &str {
        "yolov8"
    }
}

/// Label for a COCO class id.
pub fn class_label(class_id: usize) -> &'static str {
    COCO_CLASSES.get(class_id).copied().unwrap_or("unknown")
}

/// Parse a `[84, 8400]` YOLOv8 head into candidates above `threshold`.
fn decode_output(raw: &[f32], threshold: f32) -> MediaResult<Vec<Candidate>> {
    let features = 4 + COCO_CLASSES.len();
    if raw.len() != features * NUM_CANDIDATES {
        return Err(MediaError::detection_failed(format!(
            "Unexpected output size: expected {}, got {}",
            features * NUM_CANDIDATES,
            raw.len()
        )));
    }

    let view = ArrayView2::from_shape((features, NUM_CANDIDATES), raw)
        .map_err(|e| MediaError::detection_failed(format!("Failed to reshape output: {}", e)))?;

    let mut candidates = Vec::new();
    for column in view.columns() {
        let (class_id, score) = column
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, s)| if s > best.1 { (i, s) } else { best });

        if score <= threshold {
            continue;
        }

        candidates.push(Candidate {
            cx: column[0],
            cy: column[1],
            w: column[2],
            h: column[3],
            class_id,
            score,
        });
    }

    Ok(candidates)
}

/// Greedy NMS across all classes, highest score first.
fn non_maximum_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Build an ONNX Runtime session, preferring GPU providers when compiled in.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, using CPU");
    }

    info!("Using CPU execution provider");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}
