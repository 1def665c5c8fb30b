// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// HTTP / WebSocket 网关 (Gateway)
///
/// - /api/*     上传、启动处理、状态、视频流、下载、健康检查
/// - /ws        进度推送
/// - /static/*  前端页面, /outputs/* 输出目录
pub mod error;
pub mod routes;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::pipeline::{Broadcaster, ProcessingState, ProgressSnapshot, VideoJob, VideoPipeline};

pub use error::AppError;

/// 上传大小上限 (500 MB, 与前端一致)
pub const MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

/// 允许上传的视频扩展名
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

/// 网关共享状态
#[derive(Clone)]
pub struct AppState {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub static_dir: PathBuf,
    pub processing: Arc<ProcessingState>,
    pub broadcaster: Arc<Broadcaster>,
    /// 模型加载失败时为 None
    pub pipeline: Option<VideoPipeline>,
}

impl AppState {
    pub fn model_loaded(&self) -> bool {
        self.pipeline.is_some()
    }

    /// 在阻塞线程上执行任务, 另起一个监督任务兜底线程崩溃
    ///
    /// 调用方须已取得运行权。
    pub fn spawn_run(&self, pipeline: VideoPipeline, job: VideoJob) {
        let processing = self.processing.clone();
        let broadcaster = self.broadcaster.clone();
        let worker = tokio::task::spawn_blocking(move || pipeline.run(&job));

        let supervisor = tokio::spawn(async move {
            if let Err(e) = worker.await {
                let message = format!("Processing worker crashed: {}", e);
                error!("💥 {}", message);
                processing.update(|s| s.error = Some(message.clone()));
                processing.finish();
                broadcaster.publish(&ProgressSnapshot::failed(message));
            }
        });
        self.processing.set_worker(supervisor);
    }
}

pub fn router(app: AppState) -> Router {
    let index = ServeFile::new(app.static_dir.join("index.html"));
    let static_files = ServeDir::new(&app.static_dir);
    let outputs = ServeDir::new(&app.output_dir);

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .route("/api/upload", post(routes::upload))
        .route("/api/process/:filename", post(routes::process))
        .route("/api/video/:filename", get(routes::video))
        .route("/api/download/:filename", get(routes::download))
        .route("/ws", get(ws::ws_handler))
        .route_service("/", index)
        .nest_service("/static", static_files)
        .nest_service("/outputs", outputs)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// 拒绝带路径分隔符或 `..` 的文件名
pub fn validate_filename(name: &str) -> Result<&str, AppError> {
    if name.is_empty()
        || name == "."
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0')
    {
        return Err(AppError::InvalidInput(format!("Invalid filename: {}", name)));
    }
    Ok(name)
}

/// 扩展名是否为允许的视频格式 (不区分大小写)
pub fn is_allowed_video(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_EXTENSIONS.iter().any(|a| e.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_video() {
        assert!(is_allowed_video("a.mp4"));
        assert!(is_allowed_video("A.MOV"));
        assert!(is_allowed_video("clip.final.Avi"));
        assert!(!is_allowed_video("clip.txt"));
        assert!(!is_allowed_video("mp4"));
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("clip.mp4").is_ok());
        assert!(validate_filename("../etc/passwd").is_err());
        assert!(validate_filename("a/b.mp4").is_err());
        assert!(validate_filename("a\\b.mp4").is_err());
        assert!(validate_filename("").is_err());
    }
}
