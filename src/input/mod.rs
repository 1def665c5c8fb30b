// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入/输出系统 (Video I/O System)
///
/// - Transcoder:        解码 → 逐帧回调 → 编码 的统一接口
/// - FfmpegTranscoder:  基于 ez-ffmpeg 的实现 (文件 → mp4)
/// - AnnotateFilter:    FFmpeg 帧过滤器, 把每帧交给流水线标注后写回
/// - MemoryTranscoder:  内存帧序列实现, 用于测试与离线调试
pub mod decode_filter;
pub mod decoder;
pub mod memory;

use std::path::Path;

use anyhow::Result;
use image::RgbImage;

pub use decode_filter::{AnnotateFilter, Yuv420Planes};
pub use decoder::FfmpegTranscoder;
pub use memory::MemoryTranscoder;

/// 输入视频基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub total_frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// 逐帧回调: 在调用线程上原地修改帧
pub type FrameCallback<'a> = dyn FnMut(&mut RgbImage) -> Result<()> + 'a;

/// 视频转码接口
///
/// `transcode` 按顺序把每一帧交给 `on_frame`, 回调返回错误时中止并原样返回该错误。
/// 输出保持输入的帧率与分辨率。
pub trait Transcoder: Send + Sync {
    fn inspect(&self, input: &Path) -> Result<VideoInfo>;

    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        info: &VideoInfo,
        on_frame: &mut FrameCallback<'_>,
    ) -> Result<()>;
}
