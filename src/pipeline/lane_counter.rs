// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 车道计数: 按检测框左边界划分左右车道, 统计车辆数与拥堵程度

use std::fmt;

use serde::Serialize;

use crate::detection::Bbox;
use crate::lane_config::LaneConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lane {
    Left,
    Right,
}

/// 车流强度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrafficIntensity {
    Heavy,
    Smooth,
}

impl fmt::Display for TrafficIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficIntensity::Heavy => f.write_str("Heavy"),
            TrafficIntensity::Smooth => f.write_str("Smooth"),
        }
    }
}

/// 单帧计数结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaneCounts {
    pub left: usize,
    pub right: usize,
    pub left_intensity: TrafficIntensity,
    pub right_intensity: TrafficIntensity,
}

/// 无状态逐帧计数器
#[derive(Debug, Clone, Copy)]
pub struct LaneCounter {
    lane_threshold: f32,
    heavy_traffic_threshold: u32,
}

impl LaneCounter {
    pub fn new(lane_threshold: f32, heavy_traffic_threshold: u32) -> Self {
        Self {
            lane_threshold,
            heavy_traffic_threshold,
        }
    }

    pub fn from_config(config: &LaneConfig) -> Self {
        Self::new(config.lane_threshold, config.heavy_traffic_threshold)
    }

    pub fn classify(&self, bbox: &Bbox) -> Lane {
        if bbox.xmin() < self.lane_threshold {
            Lane::Left
        } else {
            Lane::Right
        }
    }

    /// 严格大于阈值才算拥堵
    pub fn intensity(&self, count: usize) -> TrafficIntensity {
        if count > self.heavy_traffic_threshold as usize {
            TrafficIntensity::Heavy
        } else {
            TrafficIntensity::Smooth
        }
    }

    pub fn count(&self, bboxes: &[Bbox]) -> LaneCounts {
        let left = bboxes
            .iter()
            .filter(|b| self.classify(b) == Lane::Left)
            .count();
        let right = bboxes.len() - left;
        LaneCounts {
            left,
            right,
            left_intensity: self.intensity(left),
            right_intensity: self.intensity(right),
        }
    }
}
