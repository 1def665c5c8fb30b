// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// - Detector:     统一检测接口 `detect(frame) -> boxes`
/// - YoloDetector: 基于 YOLOv8 + ONNX Runtime 的默认实现
pub mod detector;
pub mod types;

pub use detector::{Detector, YoloDetector};
pub use types::{non_max_suppression, Bbox, DetectionResult};
