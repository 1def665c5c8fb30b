// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 内存转码器: 用预置帧序列代替真实解码, 输出写成帧摘要文件

use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use image::RgbImage;

use super::{FrameCallback, Transcoder, VideoInfo};

pub struct MemoryTranscoder {
    frames: Vec<RgbImage>,
    fps: f64,
    reported_total: Option<u64>,
    write_output: bool,
    written: Mutex<Vec<RgbImage>>,
}

impl MemoryTranscoder {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            reported_total: None,
            write_output: true,
            written: Mutex::new(Vec::new()),
        }
    }

    /// `n` 帧纯色画面
    pub fn solid(n: usize, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let frame = RgbImage::from_pixel(width, height, image::Rgb(rgb));
        Self::new(vec![frame; n], 30.0)
    }

    /// 探测时报告的总帧数 (模拟容器元数据与实际帧数不一致)
    pub fn with_reported_total(mut self, total: u64) -> Self {
        self.reported_total = Some(total);
        self
    }

    /// 不生成输出文件 (模拟编码器静默失败)
    pub fn without_output_file(mut self) -> Self {
        self.write_output = false;
        self
    }

    /// 已经过回调处理的帧
    pub fn written(&self) -> Vec<RgbImage> {
        self.written.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Transcoder for MemoryTranscoder {
    fn inspect(&self, input: &Path) -> Result<VideoInfo> {
        if !input.exists() {
            bail!("Could not open video file");
        }
        let (width, height) = self.frames.first().map_or((0, 0), |f| f.dimensions());
        Ok(VideoInfo {
            total_frames: self.reported_total.unwrap_or(self.frames.len() as u64),
            fps: self.fps,
            width,
            height,
        })
    }

    fn transcode(
        &self,
        _input: &Path,
        output: &Path,
        _info: &VideoInfo,
        on_frame: &mut FrameCallback<'_>,
    ) -> Result<()> {
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        written.clear();
        for frame in &self.frames {
            let mut frame = frame.clone();
            on_frame(&mut frame)?;
            written.push(frame);
        }
        if self.write_output {
            std::fs::write(output, format!("{} frames\n", written.len()))
                .with_context(|| format!("写入输出失败: {}", output.display()))?;
        }
        Ok(())
    }
}
