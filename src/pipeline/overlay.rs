// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 叠加层渲染: 检测框、车道 ROI、计数/拥堵文字面板

use std::path::Path;

use ab_glyph::{FontArc, FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use tracing::{info, warn};

use super::lane_counter::LaneCounts;
use crate::detection::Bbox;
use crate::lane_config::LaneConfig;

const LEFT_ROI_COLOR: Rgb<u8> = Rgb([0, 255, 0]); // 绿色
const RIGHT_ROI_COLOR: Rgb<u8> = Rgb([0, 0, 255]); // 蓝色
const PANEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]); // 红色
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 内置字体 (DejaVu Sans)
static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font/DejaVuSans.ttf");
const ROI_THICKNESS: i32 = 2;

const PANEL_WIDTH: i32 = 470;
const PANEL_HEIGHT: i32 = 35;
const TEXT_SCALE: f32 = 28.0;
const LABEL_SCALE: f32 = 14.0;

/// 检测框调色板 (按类别循环)
const BOX_PALETTE: [Rgb<u8>; 6] = [
    Rgb([255, 56, 56]),
    Rgb([255, 157, 151]),
    Rgb([255, 112, 31]),
    Rgb([255, 178, 29]),
    Rgb([207, 210, 49]),
    Rgb([72, 249, 10]),
];

pub struct OverlayRenderer {
    config: LaneConfig,
    font: Option<FontArc>,
}

impl OverlayRenderer {
    pub fn new(config: LaneConfig, font: Option<FontArc>) -> Self {
        Self { config, font }
    }

    /// 使用内置字体
    pub fn with_default_font(config: LaneConfig) -> Self {
        Self::new(config, builtin_font())
    }

    /// 加载外部字体, 失败时回退到内置字体
    pub fn with_font_file(config: LaneConfig, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let font = match std::fs::read(path) {
            Ok(data) => match FontVec::try_from_vec(data) {
                Ok(font) => {
                    info!("✅ 字体加载成功: {}", path.display());
                    Some(FontArc::new(font))
                }
                Err(e) => {
                    warn!("⚠️  字体解析失败 {}: {}, 改用内置字体", path.display(), e);
                    builtin_font()
                }
            },
            Err(e) => {
                warn!("⚠️  字体读取失败 {}: {}, 改用内置字体", path.display(), e);
                builtin_font()
            }
        };
        Self::new(config, font)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 检测框 (1px) + 类别标签
    pub fn draw_detections(&self, frame: &mut RgbImage, bboxes: &[Bbox], names: &[String]) {
        for bbox in bboxes {
            let w = bbox.width().round() as u32;
            let h = bbox.height().round() as u32;
            if w == 0 || h == 0 {
                continue;
            }
            let color = BOX_PALETTE[bbox.id() % BOX_PALETTE.len()];
            let rect = Rect::at(bbox.xmin().round() as i32, bbox.ymin().round() as i32).of_size(w, h);
            draw_hollow_rect_mut(frame, rect, color);

            if let Some(font) = &self.font {
                let name = names.get(bbox.id()).map(String::as_str).unwrap_or("vehicle");
                let label = format!("{} {:.2}", name, bbox.confidence());
                let y = (bbox.ymin() - LABEL_SCALE - 2.0).max(0.0) as i32;
                draw_text_mut(
                    frame,
                    color,
                    bbox.xmin() as i32,
                    y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    &label,
                );
            }
        }
    }

    /// 车道 ROI + 文字面板
    pub fn draw(&self, frame: &mut RgbImage, counts: &LaneCounts) {
        draw_polygon(frame, &self.config.vertices_left, LEFT_ROI_COLOR, ROI_THICKNESS);
        draw_polygon(frame, &self.config.vertices_right, RIGHT_ROI_COLOR, ROI_THICKNESS);

        let labels = [
            (
                self.config.text_position_left,
                format!("Vehicles in Left Lane: {}", counts.left),
            ),
            (
                self.config.intensity_position_left,
                format!("Traffic Intensity: {}", counts.left_intensity),
            ),
            (
                self.config.text_position_right,
                format!("Vehicles in Right Lane: {}", counts.right),
            ),
            (
                self.config.intensity_position_right,
                format!("Traffic Intensity: {}", counts.right_intensity),
            ),
        ];

        for ((x, y), _) in &labels {
            draw_filled_rect_mut(
                frame,
                Rect::at(x - 10, y - 25).of_size(PANEL_WIDTH as u32, PANEL_HEIGHT as u32),
                PANEL_COLOR,
            );
        }

        let Some(font) = &self.font else {
            return;
        };
        for ((x, y), text) in &labels {
            // (x, y) 为文字基线, imageproc 以左上角定位
            draw_text_mut(
                frame,
                TEXT_COLOR,
                *x,
                y - 24,
                PxScale::from(TEXT_SCALE),
                font,
                text,
            );
        }
    }
}

fn builtin_font() -> Option<FontArc> {
    match FontArc::try_from_slice(DEFAULT_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("⚠️  内置字体解析失败: {}, 文字标注将被跳过", e);
            None
        }
    }
}

/// 闭合多边形, 按偏移叠画实现线宽
fn draw_polygon(frame: &mut RgbImage, vertices: &[(i32, i32)], color: Rgb<u8>, thickness: i32) {
    if vertices.len() < 2 {
        return;
    }
    for (i, &(x0, y0)) in vertices.iter().enumerate() {
        let (x1, y1) = vertices[(i + 1) % vertices.len()];
        for d in 0..thickness {
            let offset = (d - thickness / 2) as f32;
            draw_line_segment_mut(
                frame,
                (x0 as f32 + offset, y0 as f32),
                (x1 as f32 + offset, y1 as f32),
                color,
            );
            draw_line_segment_mut(
                frame,
                (x0 as f32, y0 as f32 + offset),
                (x1 as f32, y1 as f32 + offset),
                color,
            );
        }
    }
}
