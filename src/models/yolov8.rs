// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、letterbox 预处理、推理、后处理 (置信度过滤 + NMS)

use anyhow::{bail, Result};
use image::{imageops, RgbImage};
use ndarray::{s, Array, Axis, IxDyn};
use tracing::{debug, info};

use crate::detection::{non_max_suppression, Bbox, DetectionResult};
use crate::{OrtBackend, OrtConfig, OrtEP};

/// 模型构建参数
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: String,
    pub imgsz: u32,
    pub conf: f32,
    pub iou: f32,
    pub ep: OrtEP,
    pub fp16: bool,
    pub profile: bool,
}

impl Default for YOLOv8Config {
    fn default() -> Self {
        Self {
            model: String::from("runs/detect/train/weights/best.onnx"),
            imgsz: 640,
            conf: 0.4,
            iou: 0.7,
            ep: OrtEP::CPU,
            fp16: false,
            profile: false,
        }
    }
}

/// YOLOv8 检测模型
pub struct YOLOv8 {
    engine: OrtBackend,
    height: u32,
    width: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
    profile: bool,
}

impl YOLOv8 {
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            trt_fp16: config.fp16,
            image_size: (config.imgsz, config.imgsz),
        })?;

        let names = engine
            .names()
            .unwrap_or_else(|| vec!["vehicle".to_string()]);

        Ok(Self {
            height: engine.height(),
            width: engine.width(),
            engine,
            conf: config.conf,
            iou: config.iou,
            names,
            profile: config.profile,
        })
    }

    fn scale_wh(&self, w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
        let r = (w1 / w0).min(h1 / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }

    pub fn conf(&self) -> f32 {
        self.conf
    }

    pub fn iou(&self) -> f32 {
        self.iou
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl super::Model for YOLOv8 {
    fn preprocess(&mut self, xs: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        let mut ys =
            Array::ones((xs.len(), 3, self.height as usize, self.width as usize)).into_dyn();
        ys.fill(144.0 / 255.0);
        for (idx, x) in xs.iter().enumerate() {
            let (w0, h0) = x.dimensions();
            let (_, w_new, h_new) =
                self.scale_wh(w0 as f32, h0 as f32, self.width as f32, self.height as f32);
            let img = imageops::resize(
                x,
                w_new as u32,
                h_new as u32,
                imageops::FilterType::Triangle,
            );

            for (x, y, rgb) in img.enumerate_pixels() {
                let x = x as usize;
                let y = y as usize;
                let [r, g, b] = rgb.0;
                ys[[idx, 0, y, x]] = (r as f32) / 255.0;
                ys[[idx, 1, y, x]] = (g as f32) / 255.0;
                ys[[idx, 2, y, x]] = (b as f32) / 255.0;
            }
        }

        Ok(ys)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(xs, self.profile)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[RgbImage],
    ) -> Result<Vec<DetectionResult>> {
        let Some(preds) = xs.first() else {
            bail!("Model returned no outputs");
        };
        let sizes: Vec<(u32, u32)> = xs0.iter().map(|x| x.dimensions()).collect();
        let ys = decode_predictions(preds, &sizes, (self.width, self.height), self.conf, self.iou)?;
        if self.profile {
            debug!("[Model Postprocess]: {} frame(s)", ys.len());
        }
        Ok(ys)
    }

    fn summary(&self) {
        info!(
            "\nSummary:\n\
            > Task: Detect{}\n\
            > EP: {:?}\n\
            > Height: {}, Width: {}\n\
            > nc: {}, conf: {}, iou: {}",
            match self.engine.author().zip(self.engine.version()) {
                Some((author, ver)) => format!(" ({} {})", author, ver),
                None => String::from(""),
            },
            self.engine.ep(),
            self.height,
            self.width,
            self.names.len(),
            self.conf,
            self.iou,
        );
    }
}

/// 解码 YOLOv8 检测头输出 `[batch, 4 + nc, anchors]`
///
/// 坐标从 letterbox 输入尺寸还原到原图, 低于 `conf` 的候选丢弃, 再做 NMS。
pub fn decode_predictions(
    preds: &Array<f32, IxDyn>,
    sizes: &[(u32, u32)],
    input_wh: (u32, u32),
    conf: f32,
    iou: f32,
) -> Result<Vec<DetectionResult>> {
    const CXYWH_OFFSET: usize = 4;
    if preds.ndim() != 3 || preds.shape()[1] <= CXYWH_OFFSET {
        bail!("Unexpected YOLOv8 output shape: {:?}", preds.shape());
    }
    if preds.shape()[0] > sizes.len() {
        bail!(
            "Batch size mismatch: {} outputs for {} frames",
            preds.shape()[0],
            sizes.len()
        );
    }
    let nc = preds.shape()[1] - CXYWH_OFFSET;

    let mut ys = Vec::new();
    for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
        let width_original = sizes[idx].0 as f32;
        let height_original = sizes[idx].1 as f32;
        let ratio =
            (input_wh.0 as f32 / width_original).min(input_wh.1 as f32 / height_original);

        let mut data: Vec<Bbox> = Vec::new();
        for pred in anchor.axis_iter(Axis(1)) {
            let bbox = pred.slice(s![0..CXYWH_OFFSET]);
            let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

            let Some((id, &confidence)) = clss
                .into_iter()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
            else {
                continue;
            };

            if confidence < conf {
                continue;
            }

            let cx = bbox[0] / ratio;
            let cy = bbox[1] / ratio;
            let w = bbox[2] / ratio;
            let h = bbox[3] / ratio;
            let x = cx - w / 2.;
            let y = cy - h / 2.;
            data.push(Bbox::new(
                x.max(0.0f32).min(width_original),
                y.max(0.0f32).min(height_original),
                w,
                h,
                id,
                confidence,
            ));
        }

        non_max_suppression(&mut data, iou);
        ys.push(DetectionResult::new(data));
    }

    Ok(ys)
}
