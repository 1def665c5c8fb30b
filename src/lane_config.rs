// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 车道几何配置 - 可通过JSON文件调整参数

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// 车道与叠加层参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    // === 检测带 (行范围 [x1, x2)) ===
    pub x1: u32, // 检测带起始行
    pub x2: u32, // 检测带结束行 (不含)

    // === 车道划分 ===
    pub lane_threshold: f32,         // 左/右车道分界 (像素, 比较 box.x1)
    pub heavy_traffic_threshold: u32, // 车辆数 > 该值判定为拥堵

    // === ROI 多边形 ===
    pub vertices_left: Vec<(i32, i32)>,
    pub vertices_right: Vec<(i32, i32)>,

    // === 文字面板位置 ===
    pub text_position_left: (i32, i32),
    pub intensity_position_left: (i32, i32),
    pub text_position_right: (i32, i32),
    pub intensity_position_right: (i32, i32),
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            x1: 325,
            x2: 635,

            lane_threshold: 609.0,
            heavy_traffic_threshold: 10,

            vertices_left: vec![(465, 350), (609, 350), (510, 630), (2, 630)],
            vertices_right: vec![(678, 350), (815, 350), (1203, 630), (743, 630)],

            text_position_left: (10, 50),
            intensity_position_left: (10, 100),
            text_position_right: (820, 50),
            intensity_position_right: (820, 100),
        }
    }
}

impl LaneConfig {
    /// 从JSON文件加载配置, 文件缺失或解析失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Self>(&json) {
                Ok(config) => {
                    info!("✅ 车道配置已从 {} 加载", path.display());
                    config.validated()
                }
                Err(e) => {
                    warn!("⚠️  车道配置解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("⚠️  车道配置 {} 读取失败: {}, 使用默认值", path.display(), e);
                Self::default()
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 车道配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// x1 > x2 时交换, 保证检测带非负
    fn validated(mut self) -> Self {
        if self.x1 > self.x2 {
            warn!("⚠️  检测带 x1={} > x2={}, 已交换", self.x1, self.x2);
            std::mem::swap(&mut self.x1, &mut self.x2);
        }
        self
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!(
            "🛣️  车道配置: 检测带 [{}, {}) | 分界 x={} | 拥堵阈值 >{}",
            self.x1, self.x2, self.lane_threshold, self.heavy_traffic_threshold
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_scene() {
        let config = LaneConfig::default();
        assert_eq!((config.x1, config.x2), (325, 635));
        assert_eq!(config.lane_threshold, 609.0);
        assert_eq!(config.heavy_traffic_threshold, 10);
        assert_eq!(config.vertices_left.len(), 4);
        assert_eq!(config.vertices_right.len(), 4);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lanes.json");
        fs::write(&path, r#"{ "lane_threshold": 500.0, "x1": 700, "x2": 100 }"#).unwrap();

        let config = LaneConfig::load(&path);
        assert_eq!(config.lane_threshold, 500.0);
        assert_eq!((config.x1, config.x2), (100, 700));
        assert_eq!(config.heavy_traffic_threshold, 10);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = LaneConfig::load("/nonexistent/lanes.json");
        assert_eq!(config, LaneConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lanes.json");
        let mut config = LaneConfig::default();
        config.heavy_traffic_threshold = 3;
        config.save(&path).unwrap();
        assert_eq!(LaneConfig::load(&path), config);
    }
}
