// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// FFmpeg标注过滤器模块
/// FFmpeg annotate filter module
///
/// 挂在输出端的帧流水线上: YUV420P帧 → RGB → 交给调用线程标注 → 写回YUV → 编码
use crossbeam_channel::{Receiver, Sender};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use ffmpeg_sys_next::{av_frame_make_writable, AVPixelFormat};
use image::{Rgb, RgbImage};
use std::time::Instant;
use tracing::{debug, info};

/// 2x2 色度块内的像素偏移
static BLOCK: [(usize, usize); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// YUV420P 三平面的可变视图
pub struct Yuv420Planes<'a> {
    pub y: &'a mut [u8],
    pub u: &'a mut [u8],
    pub v: &'a mut [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
    pub width: usize,
    pub height: usize,
}

impl Yuv420Planes<'_> {
    /// YUV420P → RGB (BT.601 定点近似)
    pub fn to_rgb(&self) -> RgbImage {
        let mut img = RgbImage::new(self.width as u32, self.height as u32);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let (x, y) = (x as usize, y as usize);
            let y_val = self.y[y * self.y_stride + x] as i32;
            let uv_idx = (y >> 1) * self.uv_stride + (x >> 1);
            let u_val = self.u[uv_idx] as i32 - 128;
            let v_val = self.v[uv_idx] as i32 - 128;

            *px = Rgb([
                (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8,
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8,
                (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8,
            ]);
        }
        img
    }

    /// 只回写有变化的 2x2 块, 未改动区域保持原始 YUV 数据
    ///
    /// 返回写回的块数
    pub fn write_changed(&mut self, original: &RgbImage, annotated: &RgbImage) -> usize {
        let mut written = 0;
        for by in (0..self.height).step_by(2) {
            for bx in (0..self.width).step_by(2) {
                let (w, h) = (self.width, self.height);
                let block = BLOCK
                    .iter()
                    .map(move |&(dx, dy)| (bx + dx, by + dy))
                    .filter(move |&(x, y)| x < w && y < h);

                let changed = block.clone().any(|(x, y)| {
                    original.get_pixel(x as u32, y as u32) != annotated.get_pixel(x as u32, y as u32)
                });
                if !changed {
                    continue;
                }

                let (mut r_sum, mut g_sum, mut b_sum, mut n) = (0i32, 0i32, 0i32, 0i32);
                for (x, y) in block {
                    let [r, g, b] = annotated.get_pixel(x as u32, y as u32).0;
                    let (r, g, b) = (r as i32, g as i32, b as i32);
                    self.y[y * self.y_stride + x] = ((77 * r + 150 * g + 29 * b) >> 8).clamp(0, 255) as u8;
                    r_sum += r;
                    g_sum += g;
                    b_sum += b;
                    n += 1;
                }
                let (r, g, b) = (r_sum / n, g_sum / n, b_sum / n);
                let uv_idx = (by >> 1) * self.uv_stride + (bx >> 1);
                self.u[uv_idx] = (((-43 * r - 85 * g + 128 * b) >> 8) + 128).clamp(0, 255) as u8;
                self.v[uv_idx] = (((128 * r - 107 * g - 21 * b) >> 8) + 128).clamp(0, 255) as u8;
                written += 1;
            }
        }
        written
    }
}

/// FFmpeg标注过滤器: 与调用线程之间通过一对 rendezvous 通道交换帧
pub struct AnnotateFilter {
    frame_tx: Option<Sender<RgbImage>>,
    done_rx: Receiver<RgbImage>,
    pub count: usize,
    pub last: Instant,
    pub current_fps: f64,
}

impl AnnotateFilter {
    pub fn new(frame_tx: Sender<RgbImage>, done_rx: Receiver<RgbImage>) -> Self {
        Self {
            frame_tx: Some(frame_tx),
            done_rx,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }
}

impl FrameFilter for AnnotateFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 标注过滤器启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        mut frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() {
                return Ok(Some(frame));
            }

            let raw = frame.as_mut_ptr();
            if (*raw).format != AVPixelFormat::AV_PIX_FMT_YUV420P as i32 {
                return Err(format!("不支持的像素格式: {}", (*raw).format));
            }
            // 解码器可能仍引用该缓冲区, 写回前先确保独占
            if av_frame_make_writable(raw) < 0 {
                return Err("av_frame_make_writable 失败".to_string());
            }

            let w = (*raw).width as usize;
            let h = (*raw).height as usize;
            let y_stride = (*raw).linesize[0];
            let uv_stride = (*raw).linesize[1];
            if w == 0 || h == 0 || y_stride < w as i32 || uv_stride < (w as i32 + 1) / 2 {
                return Err(format!(
                    "非法帧布局 {}x{} y_stride={} uv_stride={}",
                    w, h, y_stride, uv_stride
                ));
            }
            let (y_stride, uv_stride) = (y_stride as usize, uv_stride as usize);
            let uv_rows = (h + 1) / 2;

            let mut planes = Yuv420Planes {
                y: std::slice::from_raw_parts_mut((*raw).data[0], y_stride * h),
                u: std::slice::from_raw_parts_mut((*raw).data[1], uv_stride * uv_rows),
                v: std::slice::from_raw_parts_mut((*raw).data[2], uv_stride * uv_rows),
                y_stride,
                uv_stride,
                width: w,
                height: h,
            };

            let original = planes.to_rgb();
            let tx = self
                .frame_tx
                .as_ref()
                .ok_or_else(|| "标注通道已关闭".to_string())?;
            tx.send(original.clone())
                .map_err(|_| "流水线已停止".to_string())?;
            let annotated = self
                .done_rx
                .recv()
                .map_err(|_| "流水线已停止".to_string())?;
            if annotated.dimensions() != original.dimensions() {
                return Err("标注帧尺寸与原帧不一致".to_string());
            }
            planes.write_changed(&original, &annotated);
        }

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 5.0 {
            self.current_fps = self.count as f64 / self.last.elapsed().as_secs_f64();
            debug!("🎞️ 标注统计: {:.1} fps", self.current_fps);
            self.last = Instant::now();
            self.count = 0;
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        // 关闭发送端, 调用线程的接收循环随之结束
        self.frame_tx.take();
        info!("✅ 标注过滤器退出");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Buffers {
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
    }

    fn grey(h: usize, stride: usize) -> Buffers {
        let uv_stride = (stride + 1) / 2;
        Buffers {
            y: vec![120; stride * h],
            u: vec![128; uv_stride * ((h + 1) / 2)],
            v: vec![128; uv_stride * ((h + 1) / 2)],
        }
    }

    fn planes(b: &mut Buffers, w: usize, h: usize, stride: usize) -> Yuv420Planes<'_> {
        Yuv420Planes {
            y: &mut b.y,
            u: &mut b.u,
            v: &mut b.v,
            y_stride: stride,
            uv_stride: (stride + 1) / 2,
            width: w,
            height: h,
        }
    }

    #[test]
    fn test_grey_to_rgb() {
        let mut b = grey(4, 8);
        let img = planes(&mut b, 6, 4, 8).to_rgb();
        assert_eq!(img.dimensions(), (6, 4));
        assert!(img.pixels().all(|p| p.0 == [120, 120, 120]));
    }

    #[test]
    fn test_unchanged_frame_is_not_rewritten() {
        let mut b = grey(4, 8);
        let before = (b.y.clone(), b.u.clone(), b.v.clone());
        let mut p = planes(&mut b, 6, 4, 8);
        let original = p.to_rgb();
        assert_eq!(p.write_changed(&original, &original.clone()), 0);
        assert_eq!((b.y, b.u, b.v), before);
    }

    #[test]
    fn test_changed_block_written_back() {
        let mut b = grey(4, 8);
        let mut p = planes(&mut b, 6, 4, 8);
        let original = p.to_rgb();
        let mut annotated = original.clone();
        annotated.put_pixel(3, 1, Rgb([255, 255, 255]));

        assert_eq!(p.write_changed(&original, &annotated), 1);
        // (3,1) 属于块 (2,0), 只有该像素亮度变化
        assert_eq!(b.y[8 + 3], 255);
        assert_eq!(b.y[8 + 2], 120);
        assert_eq!(b.y[0], 120);
    }

    #[test]
    fn test_odd_dimensions() {
        let mut b = grey(3, 5);
        let mut p = planes(&mut b, 5, 3, 5);
        let original = p.to_rgb();
        let mut annotated = original.clone();
        annotated.put_pixel(4, 2, Rgb([0, 0, 0]));
        assert_eq!(p.write_changed(&original, &annotated), 1);
        assert_eq!(b.y[2 * 5 + 4], 0);
    }

    #[test]
    fn test_block_chroma_is_average_of_changed_block() {
        let mut b = grey(4, 8);
        let mut p = planes(&mut b, 6, 4, 8);
        let original = p.to_rgb();
        let mut annotated = original.clone();
        for (x, y) in BLOCK {
            annotated.put_pixel(x as u32, y as u32, Rgb([255, 0, 0]));
        }
        assert_eq!(p.write_changed(&original, &annotated), 1);
        // 纯红: V 明显高于 128, U 低于 128, 其余块不变
        assert!(b.v[0] > 200);
        assert!(b.u[0] < 128);
        assert_eq!((b.u[1], b.v[1]), (128, 128));
    }
}
