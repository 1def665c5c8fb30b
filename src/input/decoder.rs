// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频文件转码器
/// File transcoder: decode → annotate → encode, software only
use super::decode_filter::AnnotateFilter;
use super::{FrameCallback, Transcoder, VideoInfo};
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::bounded;
use ez_ffmpeg::container_info::get_duration_us;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input, Output};
use image::RgbImage;
use std::path::Path;
use std::thread;
use tracing::{debug, info, warn};

/// 基于 ez-ffmpeg 的转码器
pub struct FfmpegTranscoder {
    video_codec: String,
}

impl FfmpegTranscoder {
    pub fn new(video_codec: impl Into<String>) -> Self {
        Self {
            video_codec: video_codec.into(),
        }
    }

    pub fn video_codec(&self) -> &str {
        &self.video_codec
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("mpeg4")
    }
}

fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .with_context(|| format!("路径不是合法 UTF-8: {}", path.display()))
}

impl Transcoder for FfmpegTranscoder {
    fn inspect(&self, input: &Path) -> Result<VideoInfo> {
        let url = path_str(input)?;
        let stream = find_video_stream_info(url.clone())
            .map_err(|e| anyhow!("读取视频流信息失败: {}", e))?
            .ok_or_else(|| anyhow!("Could not open video file"))?;

        let StreamInfo::Video {
            nb_frames,
            fps,
            width,
            height,
            ..
        } = stream
        else {
            bail!("Could not open video file");
        };

        if width <= 0 || height <= 0 {
            bail!("Could not open video file");
        }

        // 部分容器不记录帧数, 用时长 × 帧率估算
        let total_frames = if nb_frames > 0 {
            nb_frames as u64
        } else {
            match get_duration_us(url) {
                Ok(us) if us > 0 && fps > 0.0 => (us as f64 / 1_000_000.0 * fps).round() as u64,
                Ok(_) => 0,
                Err(e) => {
                    warn!("⚠️  无法获取视频时长: {}", e);
                    0
                }
            }
        };

        let info = VideoInfo {
            total_frames,
            fps,
            width: width as u32,
            height: height as u32,
        };
        debug!("🔍 视频信息: {:?}", info);
        Ok(info)
    }

    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        info: &VideoInfo,
        on_frame: &mut FrameCallback<'_>,
    ) -> Result<()> {
        let input_url = path_str(input)?;
        let output_url = path_str(output)?;
        let codec = self.video_codec.clone();

        // 容量为 0: 每帧在过滤器与调用线程之间同步交接
        let (frame_tx, frame_rx) = bounded::<RgbImage>(0);
        let (done_tx, done_rx) = bounded::<RgbImage>(0);
        let filter = AnnotateFilter::new(frame_tx, done_rx);

        info!(
            "🎬 转码启动: {} → {} ({}x{} @ {:.2}fps, 编码器 {})",
            input.display(),
            output.display(),
            info.width,
            info.height,
            info.fps,
            codec
        );

        let worker = thread::Builder::new()
            .name("ffmpeg-transcode".into())
            .spawn(move || -> std::result::Result<(), String> {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("annotate", Box::new(filter));
                let out = Output::from(output_url)
                    .set_video_codec(codec)
                    .add_frame_pipeline(pipe);

                let ctx = FfmpegContext::builder()
                    .input(Input::from(input_url))
                    .filter_descs(["format=yuv420p"].into())
                    .output(out)
                    .build()
                    .map_err(|e| format!("构建失败: {}", e))?;
                let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
                sch.wait().map_err(|e| format!("转码失败: {}", e))
            })
            .context("无法启动转码线程")?;

        let mut callback_err = None;
        for mut frame in frame_rx.iter() {
            if let Err(e) = on_frame(&mut frame) {
                callback_err = Some(e);
                break;
            }
            if done_tx.send(frame).is_err() {
                break;
            }
        }
        // 断开通道, 让仍在等待的过滤器报错退出
        drop(done_tx);
        drop(frame_rx);

        let exit = worker
            .join()
            .map_err(|_| anyhow!("转码线程异常退出"))?;

        if let Some(e) = callback_err {
            return Err(e);
        }
        exit.map_err(|e| anyhow!(e))?;
        info!("✅ 转码完成: {}", output.display());
        Ok(())
    }
}
