// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测带遮罩: 只让 [x1, x2) 行参与检测

use image::RgbImage;

/// 行区间遮罩
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionMask {
    x1: u32,
    x2: u32,
}

impl RegionMask {
    pub fn new(x1: u32, x2: u32) -> Self {
        Self {
            x1: x1.min(x2),
            x2: x1.max(x2),
        }
    }

    /// 按帧高裁剪后的检测带 [start, end)
    pub fn band(&self, height: u32) -> (u32, u32) {
        (self.x1.min(height), self.x2.min(height))
    }

    /// 拷贝一帧, 检测带以外的行全部置零
    pub fn apply(&self, frame: &RgbImage) -> RgbImage {
        let mut masked = frame.clone();
        let (start, end) = self.band(frame.height());
        let row = frame.width() as usize * 3;
        let buf: &mut [u8] = &mut masked;
        buf[..start as usize * row].fill(0);
        buf[end as usize * row..].fill(0);
        masked
    }

    /// 把原帧检测带以外的行拷回标注帧
    pub fn restore(&self, annotated: &mut RgbImage, original: &RgbImage) {
        debug_assert_eq!(annotated.dimensions(), original.dimensions());
        let (start, end) = self.band(original.height());
        let row = original.width() as usize * 3;
        let (head, tail) = (start as usize * row, end as usize * row);
        let dst: &mut [u8] = annotated;
        let src: &[u8] = original;
        dst[..head].copy_from_slice(&src[..head]);
        dst[tail..].copy_from_slice(&src[tail..]);
    }
}
