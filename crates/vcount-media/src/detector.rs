//! Object detector seam.

use vcount_models::DetectedObject;

use crate::error::MediaResult;
use crate::sampler::Frame;

/// Labels objects in a single frame.
///
/// Implementations are pure with respect to the frame: the same frame always
/// yields the same detections. `detect` is blocking (inference is CPU or GPU
/// bound), so async callers run it on the blocking pool.
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in `frame`, after confidence filtering and NMS.
    fn detect(&self, frame: &Frame) -> MediaResult<Vec<DetectedObject>>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}
