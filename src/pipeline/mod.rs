// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频处理流水线 (Video Processing Pipeline)
///
/// 每帧顺序执行:
/// - RegionMask:      检测带以外的行置零 / 还原
/// - Detector:        目标检测 (见 `crate::detection`)
/// - LaneCounter:     左右车道计数 + 拥堵判定
/// - OverlayRenderer: ROI 多边形 + 文字面板
///
/// 进度状态由 `ProcessingState` 持有, 由 `Broadcaster` 推送给所有订阅者。
pub mod broadcaster;
pub mod lane_counter;
pub mod overlay;
pub mod region_mask;
pub mod state;
pub mod video;

use serde::Serialize;

pub use broadcaster::{Broadcaster, Subscription};
pub use lane_counter::{Lane, LaneCounter, LaneCounts, TrafficIntensity};
pub use overlay::OverlayRenderer;
pub use region_mask::RegionMask;
pub use state::ProcessingState;
pub use video::{FrameAnnotator, RunOutcome, VideoJob, VideoPipeline};

/// 每隔多少帧推送一次进度
pub const BROADCAST_EVERY: u64 = 10;

/// 处理状态 (`/api/status` 原样返回)
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProcessingStatus {
    pub is_processing: bool,
    pub progress: u32,
    pub current_file: Option<String>,
    pub error: Option<String>,
    pub total_frames: u64,
    pub processed_frames: u64,
    pub output_file: Option<String>,
}

/// 推送给订阅者的进度快照
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_frames: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    pub is_processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressSnapshot {
    pub fn running(progress: u32, processed_frames: u64, total_frames: u64) -> Self {
        Self {
            progress: Some(progress),
            processed_frames: Some(processed_frames),
            total_frames: Some(total_frames),
            is_processing: true,
            output_file: None,
            error: None,
        }
    }

    pub fn completed(frames: u64, output_file: String) -> Self {
        Self {
            progress: Some(100),
            processed_frames: Some(frames),
            total_frames: Some(frames),
            is_processing: false,
            output_file: Some(output_file),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            progress: None,
            processed_frames: None,
            total_frames: None,
            is_processing: false,
            output_file: None,
            error: Some(error),
        }
    }

    /// 当前状态对应的快照 (新订阅者接入时使用)
    pub fn from_status(status: &ProcessingStatus) -> Self {
        Self::running(
            status.progress,
            status.processed_frames,
            status.total_frames,
        )
    }
}

/// 进度百分比 (向下取整, 上限 100)
pub fn progress_percent(processed: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((processed.saturating_mul(100) / total).min(100)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(5, 3), 100);
    }

    #[test]
    fn test_snapshot_json_shapes() {
        let running = serde_json::to_value(ProgressSnapshot::running(40, 4, 10)).unwrap();
        assert_eq!(
            running,
            serde_json::json!({
                "progress": 40, "processed_frames": 4, "total_frames": 10, "is_processing": true
            })
        );

        let done = serde_json::to_value(ProgressSnapshot::completed(10, "a_processed.mp4".into()))
            .unwrap();
        assert_eq!(done["output_file"], "a_processed.mp4");
        assert_eq!(done["progress"], 100);
        assert_eq!(done["is_processing"], false);

        let failed = serde_json::to_value(ProgressSnapshot::failed("boom".into())).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({ "error": "boom", "is_processing": false })
        );
    }

    #[test]
    fn test_status_serializes_all_fields() {
        let v = serde_json::to_value(ProcessingStatus::default()).unwrap();
        for key in [
            "is_processing",
            "progress",
            "current_file",
            "error",
            "total_frames",
            "processed_frames",
            "output_file",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }
}
