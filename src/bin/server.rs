// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 车道车流统计 Web 服务
///
/// 主程序入口 - 直接运行: cargo run --bin traffic-server --release
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use traffic_counter::detection::Detector;
use traffic_counter::{
    router, AppState, Args, Broadcaster, FfmpegTranscoder, FrameAnnotator, LaneConfig,
    OverlayRenderer, ProcessingState, VideoPipeline, YoloDetector,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("traffic_counter=info,tower_http=info,ort=warn")),
        )
        .init();

    let args = Args::parse();
    info!("🚗 车道车流统计服务启动");

    for dir in [&args.upload_dir, &args.output_dir, &args.static_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("无法创建目录 {}", dir.display()))?;
    }

    let lane_config = match &args.lane_config {
        Some(path) => LaneConfig::load(path),
        None => LaneConfig::default(),
    };
    lane_config.print_summary();

    let overlay = match &args.font {
        Some(path) => OverlayRenderer::with_font_file(lane_config.clone(), path),
        None => OverlayRenderer::with_default_font(lane_config.clone()),
    };
    if !overlay.has_font() {
        warn!("⚠️  未加载字体, 叠加层只绘制背景面板");
    }
    let annotator = Arc::new(FrameAnnotator::new(&lane_config, overlay));

    let processing = Arc::new(ProcessingState::new());
    let broadcaster = Arc::new(Broadcaster::new());

    // 模型加载失败不退出: 健康检查报告 model_loaded=false, 处理请求返回 500
    let model_config = args.model_config();
    let detector = tokio::task::spawn_blocking(move || YoloDetector::new(model_config))
        .await
        .context("模型加载线程异常退出")?;
    let pipeline = match detector {
        Ok(detector) => {
            info!("✅ 模型加载成功: {}", args.model);
            let detector: Box<dyn Detector> = Box::new(detector);
            Some(VideoPipeline::new(
                processing.clone(),
                broadcaster.clone(),
                annotator,
                Arc::new(FfmpegTranscoder::new(args.video_codec.clone())),
                Arc::new(Mutex::new(detector)),
            ))
        }
        Err(e) => {
            error!("❌ 模型加载失败 {}: {:#}", args.model, e);
            None
        }
    };

    let app = router(AppState {
        upload_dir: args.upload_dir.clone(),
        output_dir: args.output_dir.clone(),
        static_dir: args.static_dir.clone(),
        processing: processing.clone(),
        broadcaster,
        pipeline,
    });

    let addr = args.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;
    info!("🌐 服务地址: http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !processing.worker_finished() {
        warn!("⚠️  仍有处理任务在运行, 等待其结束");
        if let Some(worker) = processing.take_worker() {
            let _ = worker.await;
        }
    }
    info!("👋 服务已退出");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ 无法监听 Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 收到退出信号");
}
