// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 服务启动参数
pub mod detection; // 智能检测系统
pub mod input; // 视频输入/输出系统
pub mod lane_config; // 车道几何配置
pub mod models; // 模型接口与具体实现
pub mod pipeline; // 逐帧处理流水线
pub mod server; // HTTP / WebSocket 网关

pub mod ort_backend;

pub use crate::config::Args;
pub use crate::detection::{Bbox, DetectionResult, Detector, YoloDetector};
pub use crate::input::{FfmpegTranscoder, MemoryTranscoder, Transcoder, VideoInfo};
pub use crate::lane_config::LaneConfig;
pub use crate::models::{Model, YOLOv8, YOLOv8Config};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{
    Broadcaster, FrameAnnotator, OverlayRenderer, ProcessingState, ProcessingStatus,
    ProgressSnapshot, VideoJob, VideoPipeline,
};
pub use crate::server::{router, AppError, AppState};
