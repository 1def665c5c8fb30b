// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 输入一帧 → YOLO检测 → 返回检测框

use std::time::Instant;

use anyhow::Result;
use image::RgbImage;
use tracing::debug;

use super::types::Bbox;
use crate::models::{Model, YOLOv8, YOLOv8Config};

/// 检测接口: 一帧进, 一组检测框出
///
/// 流水线只依赖这个 trait, 模型本身的推理细节由实现方负责。
pub trait Detector: Send {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Bbox>>;

    /// 类别名称表 (用于绘制标签)
    fn names(&self) -> &[String] {
        &[]
    }
}

/// YOLOv8 检测器
pub struct YoloDetector {
    model: YOLOv8,

    // 统计
    count: u64,
    last: Instant,
}

impl YoloDetector {
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let model = YOLOv8::new(config)?;
        model.summary();
        Ok(Self {
            model,
            count: 0,
            last: Instant::now(),
        })
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Bbox>> {
        let start = Instant::now();
        let frames = std::slice::from_ref(frame);
        let results = self.model.forward(frames)?;
        let conf = self.model.conf();
        let bboxes: Vec<Bbox> = results
            .into_iter()
            .flat_map(|r| r.into_bboxes())
            .filter(|b| b.confidence() >= conf)
            .collect();

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 5.0 {
            let fps = self.count as f64 / self.last.elapsed().as_secs_f64();
            debug!(
                "🔍 检测统计: {:.1} fps | 本帧 {} 个目标 | 耗时 {:.1}ms",
                fps,
                bboxes.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
            self.count = 0;
            self.last = Instant::now();
        }

        Ok(bboxes)
    }

    fn names(&self) -> &[String] {
        self.model.names()
    }
}
