// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 视频处理任务: 探测 → 逐帧 (遮罩/检测/计数/绘制) → 编码 → 终态

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{error, info};

use super::{
    progress_percent, Broadcaster, LaneCounter, LaneCounts, OverlayRenderer, ProcessingState,
    ProgressSnapshot, RegionMask, BROADCAST_EVERY,
};
use crate::detection::Detector;
use crate::input::Transcoder;
use crate::lane_config::LaneConfig;

/// 单帧标注器
pub struct FrameAnnotator {
    mask: RegionMask,
    counter: LaneCounter,
    overlay: OverlayRenderer,
}

impl FrameAnnotator {
    pub fn new(config: &LaneConfig, overlay: OverlayRenderer) -> Self {
        Self {
            mask: RegionMask::new(config.x1, config.x2),
            counter: LaneCounter::from_config(config),
            overlay,
        }
    }

    /// 原地标注一帧, 返回本帧车道计数
    ///
    /// 检测框画在遮罩后的副本上, 随后检测带以外的行从原帧还原, 最后叠加 ROI 与文字面板。
    pub fn annotate(&self, frame: &mut RgbImage, detector: &mut dyn Detector) -> Result<LaneCounts> {
        let mut masked = self.mask.apply(frame);
        let bboxes = detector.detect(&masked)?;
        let counts = self.counter.count(&bboxes);

        self.overlay.draw_detections(&mut masked, &bboxes, detector.names());
        self.mask.restore(&mut masked, frame);
        self.overlay.draw(&mut masked, &counts);

        *frame = masked;
        Ok(counts)
    }
}

/// 一次处理任务
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
}

impl VideoJob {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
        }
    }

    /// `<stem>_processed.mp4`
    pub fn output_name(&self) -> String {
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        format!("{}_processed.mp4", stem)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.output_name())
    }
}

/// 任务终态
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { output_file: String, frames: u64 },
    Failed(String),
}

/// 视频处理流水线 (在阻塞线程上运行)
#[derive(Clone)]
pub struct VideoPipeline {
    state: Arc<ProcessingState>,
    broadcaster: Arc<Broadcaster>,
    annotator: Arc<FrameAnnotator>,
    transcoder: Arc<dyn Transcoder>,
    detector: Arc<Mutex<Box<dyn Detector>>>,
}

impl VideoPipeline {
    pub fn new(
        state: Arc<ProcessingState>,
        broadcaster: Arc<Broadcaster>,
        annotator: Arc<FrameAnnotator>,
        transcoder: Arc<dyn Transcoder>,
        detector: Arc<Mutex<Box<dyn Detector>>>,
    ) -> Self {
        Self {
            state,
            broadcaster,
            annotator,
            transcoder,
            detector,
        }
    }

    /// 执行一次任务, 调用方须已通过 `ProcessingState::try_begin` 取得运行权
    ///
    /// 无论成功失败, 返回前都会写入终态、推送最后一次快照并释放运行权。
    pub fn run(&self, job: &VideoJob) -> RunOutcome {
        let start = Instant::now();
        info!("🚀 开始处理: {}", job.input.display());

        let (outcome, snapshot) = match self.execute(job) {
            Ok((output_file, frames)) => {
                self.state.update(|s| {
                    s.progress = 100;
                    s.total_frames = frames;
                    s.processed_frames = frames;
                    s.output_file = Some(output_file.clone());
                });
                info!(
                    "✅ 处理完成: {} ({} 帧, 耗时 {:.1}s)",
                    output_file,
                    frames,
                    start.elapsed().as_secs_f64()
                );
                (
                    RunOutcome::Completed {
                        output_file: output_file.clone(),
                        frames,
                    },
                    ProgressSnapshot::completed(frames, output_file),
                )
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("❌ 处理失败 {}: {}", job.input.display(), message);
                self.state.update(|s| s.error = Some(message.clone()));
                (
                    RunOutcome::Failed(message.clone()),
                    ProgressSnapshot::failed(message),
                )
            }
        };

        self.state.finish();
        self.broadcaster.publish(&snapshot);
        outcome
    }

    fn execute(&self, job: &VideoJob) -> Result<(String, u64)> {
        let info = self.transcoder.inspect(&job.input)?;
        info!(
            "🎞️ 输入: {}x{} @ {:.2}fps, 共 {} 帧",
            info.width, info.height, info.fps, info.total_frames
        );
        self.state.update(|s| s.total_frames = info.total_frames);

        std::fs::create_dir_all(&job.output_dir)
            .with_context(|| format!("无法创建输出目录 {}", job.output_dir.display()))?;
        let output = job.output_path();

        let mut detector = self.detector.lock().unwrap_or_else(|e| e.into_inner());
        let mut processed = 0u64;
        self.transcoder
            .transcode(&job.input, &output, &info, &mut |frame: &mut RgbImage| -> Result<()> {
                self.annotator.annotate(frame, &mut **detector)?;
                processed += 1;

                let progress = progress_percent(processed, info.total_frames);
                self.state.update(|s| {
                    s.processed_frames = processed;
                    s.progress = progress;
                });
                if processed % BROADCAST_EVERY == 0 {
                    self.broadcaster.publish(&ProgressSnapshot::running(
                        progress,
                        processed,
                        info.total_frames,
                    ));
                }
                Ok(())
            })?;
        drop(detector);

        if !file_exists(&output) {
            bail!("Failed to create output video file");
        }
        Ok((job.output_name(), processed))
    }
}

fn file_exists(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Bbox;
    use crate::input::MemoryTranscoder;
    use crate::pipeline::{Lane, TrafficIntensity};
    use image::Rgb;

    const GREY: [u8; 3] = [90, 90, 90];

    /// 固定返回同一组检测框, 并记录收到的帧
    struct ScriptedDetector {
        boxes: Vec<Bbox>,
        fail_on_call: Option<usize>,
        calls: usize,
        seen: Arc<Mutex<Vec<RgbImage>>>,
    }

    impl ScriptedDetector {
        fn new(boxes: Vec<Bbox>) -> Self {
            Self {
                boxes,
                fail_on_call: None,
                calls: 0,
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Bbox>> {
            self.calls += 1;
            if self.fail_on_call == Some(self.calls) {
                bail!("inference failed");
            }
            self.seen.lock().unwrap().push(frame.clone());
            Ok(self.boxes.clone())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        job: VideoJob,
        state: Arc<ProcessingState>,
        broadcaster: Arc<Broadcaster>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("clip.mp4");
            std::fs::write(&input, b"fake").unwrap();
            let job = VideoJob::new(input, dir.path().join("outputs"));
            Self {
                _dir: dir,
                job,
                state: Arc::new(ProcessingState::new()),
                broadcaster: Arc::new(Broadcaster::new()),
            }
        }

        fn pipeline(&self, transcoder: MemoryTranscoder, detector: ScriptedDetector) -> VideoPipeline {
            let config = LaneConfig::default();
            let annotator = FrameAnnotator::new(&config, OverlayRenderer::new(config.clone(), None));
            VideoPipeline::new(
                self.state.clone(),
                self.broadcaster.clone(),
                Arc::new(annotator),
                Arc::new(transcoder),
                Arc::new(Mutex::new(Box::new(detector))),
            )
        }

        fn start(&self) {
            assert!(self.state.try_begin());
            self.state.reset_for_run("clip.mp4");
        }
    }

    fn drain(sub: &mut crate::pipeline::Subscription) -> Vec<ProgressSnapshot> {
        let mut out = Vec::new();
        while let Ok(s) = sub.rx.try_recv() {
            out.push(s);
        }
        out
    }

    #[test]
    fn test_output_name() {
        let job = VideoJob::new("/tmp/up/clip.final.avi", "/tmp/out");
        assert_eq!(job.output_name(), "clip.final_processed.mp4");
        assert_eq!(job.output_path(), PathBuf::from("/tmp/out/clip.final_processed.mp4"));
    }

    #[test]
    fn test_annotate_masks_detects_and_restores() {
        let config = LaneConfig::default();
        let annotator = FrameAnnotator::new(&config, OverlayRenderer::new(config.clone(), None));
        let mut detector =
            ScriptedDetector::new(vec![Bbox::from_xyxy(900.0, 300.0, 1000.0, 400.0, 0, 0.9)]);
        let seen = detector.seen.clone();

        let mut frame = RgbImage::from_pixel(1280, 720, Rgb(GREY));
        let counts = annotator.annotate(&mut frame, &mut detector).unwrap();

        assert_eq!(counts.right, 1);
        assert_eq!(counts.left, 0);
        assert_eq!(counts.right_intensity, TrafficIntensity::Smooth);
        assert_eq!(LaneCounter::from_config(&config).classify(&detector.boxes[0]), Lane::Right);

        // 检测器只看到检测带
        let seen = seen.lock().unwrap();
        let masked = &seen[0];
        assert_eq!(masked.get_pixel(640, 0).0, [0, 0, 0]);
        assert_eq!(masked.get_pixel(640, 400).0, GREY);
        assert_eq!(masked.get_pixel(640, 700).0, [0, 0, 0]);

        // 检测带内保留检测框, 带外被还原
        assert_ne!(frame.get_pixel(900, 350).0, GREY);
        assert_eq!(frame.get_pixel(900, 310).0, GREY);
        assert_eq!(frame.get_pixel(640, 700).0, GREY);
        // 文字面板在还原之后绘制
        assert_eq!(frame.get_pixel(5, 40).0, [255, 0, 0]);
    }

    #[test]
    fn test_completed_run_reports_all_frames() {
        let fx = Fixture::new();
        let mut sub = fx.broadcaster.subscribe();
        let pipeline = fx.pipeline(
            MemoryTranscoder::solid(25, 64, 48, GREY),
            ScriptedDetector::new(vec![]),
        );

        fx.start();
        let outcome = pipeline.run(&fx.job);
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                output_file: "clip_processed.mp4".into(),
                frames: 25
            }
        );

        let s = fx.state.snapshot();
        assert!(!s.is_processing);
        assert!(!fx.state.is_processing());
        assert_eq!(s.progress, 100);
        assert_eq!(s.processed_frames, 25);
        assert_eq!(s.total_frames, 25);
        assert_eq!(s.output_file.as_deref(), Some("clip_processed.mp4"));
        assert!(fx.job.output_path().exists());

        let snapshots = drain(&mut sub);
        assert_eq!(
            snapshots,
            vec![
                ProgressSnapshot::running(40, 10, 25),
                ProgressSnapshot::running(80, 20, 25),
                ProgressSnapshot::completed(25, "clip_processed.mp4".into()),
            ]
        );
    }

    #[test]
    fn test_frame_count_mismatch_uses_processed_frames() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(
            MemoryTranscoder::solid(7, 16, 16, GREY).with_reported_total(40),
            ScriptedDetector::new(vec![]),
        );
        fx.start();
        pipeline.run(&fx.job);

        let s = fx.state.snapshot();
        assert_eq!((s.processed_frames, s.total_frames, s.progress), (7, 7, 100));
    }

    #[test]
    fn test_missing_output_file_fails_run() {
        let fx = Fixture::new();
        let mut sub = fx.broadcaster.subscribe();
        let pipeline = fx.pipeline(
            MemoryTranscoder::solid(3, 16, 16, GREY).without_output_file(),
            ScriptedDetector::new(vec![]),
        );
        fx.start();

        let outcome = pipeline.run(&fx.job);
        assert_eq!(
            outcome,
            RunOutcome::Failed("Failed to create output video file".into())
        );
        let s = fx.state.snapshot();
        assert!(!s.is_processing);
        assert_eq!(s.error.as_deref(), Some("Failed to create output video file"));
        assert_eq!(s.output_file, None);
        assert_eq!(
            drain(&mut sub),
            vec![ProgressSnapshot::failed("Failed to create output video file".into())]
        );
    }

    #[test]
    fn test_detector_error_stops_run() {
        let fx = Fixture::new();
        let mut detector = ScriptedDetector::new(vec![]);
        detector.fail_on_call = Some(4);
        let pipeline = fx.pipeline(MemoryTranscoder::solid(10, 16, 16, GREY), detector);
        fx.start();

        let outcome = pipeline.run(&fx.job);
        assert_eq!(outcome, RunOutcome::Failed("inference failed".into()));
        let s = fx.state.snapshot();
        assert_eq!(s.processed_frames, 3);
        assert!(!s.is_processing);
        // 运行权已释放, 可以开始下一次
        assert!(fx.state.try_begin());
    }

    #[test]
    fn test_unreadable_input_fails_run() {
        let fx = Fixture::new();
        std::fs::remove_file(&fx.job.input).unwrap();
        let pipeline = fx.pipeline(
            MemoryTranscoder::solid(3, 16, 16, GREY),
            ScriptedDetector::new(vec![]),
        );
        fx.start();
        assert_eq!(
            pipeline.run(&fx.job),
            RunOutcome::Failed("Could not open video file".into())
        );
    }
}
