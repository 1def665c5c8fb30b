// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型统一接口与实现
///
/// # 架构说明
///
/// - **YOLOv8**: 包含完整的 struct + impl Model trait
///   - 模型加载 (new)
///   - 预处理 (preprocess)
///   - 推理 (run)
///   - 后处理 (postprocess)
///   - 文件: `yolov8.rs`
///
/// ## Model Trait
/// 统一的模型接口，定义标准流程: preprocess → run → postprocess
use anyhow::Result;
use image::RgbImage;
use ndarray::{Array, IxDyn};

use crate::detection::DetectionResult;

/// 统一的深度学习模型接口
///
/// ## 核心流程
/// ```text
/// 原始帧 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测结果
/// ```
pub trait Model {
    /// 预处理: 帧 → NCHW 张量
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播, 返回原始输出(未解码)
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 检测结果 (坐标还原到原图)
    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[RgbImage],
    ) -> Result<Vec<DetectionResult>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[RgbImage]) -> Result<Vec<DetectionResult>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs)?;
        self.postprocess(ys, images)
    }

    /// 打印模型信息
    fn summary(&self);
}

pub mod yolov8;

pub use yolov8::{YOLOv8, YOLOv8Config};
