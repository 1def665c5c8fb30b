// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! REST 接口

use std::path::Path as FsPath;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, Request, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use super::{is_allowed_video, validate_filename, AppError, AppState};
use crate::pipeline::{ProcessingStatus, VideoJob};

const BUSY: &str = "Another video is currently being processed.";

pub async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": app.model_loaded(),
    }))
}

pub async fn status(State(app): State<AppState>) -> Json<ProcessingStatus> {
    Json(app.processing.snapshot())
}

pub async fn upload(
    State(app): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("No filename provided".into()))?;
        validate_filename(&filename)?;
        if !is_allowed_video(&filename) {
            return Err(AppError::InvalidInput(
                "Invalid file type. Only MP4, AVI, and MOV are supported.".into(),
            ));
        }
        if app.processing.is_processing() {
            return Err(AppError::Conflict(BUSY.into()));
        }

        let path = app.upload_dir.join(&filename);
        let written = match save_field(&mut field, &path).await {
            Ok(written) => written,
            Err(e) => {
                // 不保留写了一半的文件
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };

        app.processing
            .update(|s| s.current_file = Some(filename.clone()));
        info!("📥 上传完成: {} ({:.1} MB)", filename, written as f64 / 1_048_576.0);

        return Ok(Json(json!({
            "message": "File uploaded successfully",
            "filename": filename,
            "path": path.display().to_string(),
        })));
    }

    Err(AppError::InvalidInput("No file provided".into()))
}

async fn save_field(field: &mut Field<'_>, path: &FsPath) -> Result<usize, AppError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    Ok(written)
}

pub async fn process(
    State(app): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<Value>, AppError> {
    let pipeline = app.pipeline.clone().ok_or(AppError::ModelUnavailable)?;
    validate_filename(&filename)?;
    if app.processing.is_processing() {
        return Err(AppError::Conflict(BUSY.into()));
    }

    let input = app.upload_dir.join(&filename);
    if !is_file(&input).await {
        return Err(AppError::NotFound("File not found".into()));
    }

    if !app.processing.try_begin() {
        return Err(AppError::Conflict(BUSY.into()));
    }
    app.processing.reset_for_run(&filename);
    app.spawn_run(pipeline, VideoJob::new(input, app.output_dir.clone()));
    info!("🚀 已提交处理任务: {}", filename);

    Ok(Json(json!({
        "message": "Processing started",
        "filename": filename,
    })))
}

/// 播放输出视频 (支持 Range), mp4 不存在时回退到同名 avi
pub async fn video(
    State(app): State<AppState>,
    Path(filename): Path<String>,
    req: Request,
) -> Result<Response, AppError> {
    validate_filename(&filename)?;
    let mut path = app.output_dir.join(&filename);
    if !is_file(&path).await && has_extension(&path, "mp4") {
        let avi = path.with_extension("avi");
        if is_file(&avi).await {
            warn!("⚠️  {} 不存在, 回退到 {}", filename, avi.display());
            path = avi;
        }
    }
    if !is_file(&path).await {
        return Err(AppError::NotFound(format!("Video not found: {}", filename)));
    }

    let content_type = if has_extension(&path, "avi") {
        "video/x-msvideo"
    } else {
        "video/mp4"
    };
    let mut resp = serve_file(&path, req).await;
    if resp.status().is_success() {
        resp.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    Ok(resp)
}

/// 以附件形式下载输出视频
pub async fn download(
    State(app): State<AppState>,
    Path(filename): Path<String>,
    req: Request,
) -> Result<Response, AppError> {
    validate_filename(&filename)?;
    let path = app.output_dir.join(&filename);
    if !is_file(&path).await {
        return Err(AppError::NotFound("File not found".into()));
    }

    let mut resp = serve_file(&path, req).await;
    if resp.status().is_success() {
        let headers = resp.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
        let disposition = format!("attachment; filename=\"{}\"", filename);
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
    Ok(resp)
}

async fn serve_file(path: &FsPath, req: Request) -> Response {
    ServeFile::new(path)
        .oneshot(req)
        .await
        .map(IntoResponse::into_response)
        .unwrap_or_else(|e| match e {})
}

async fn is_file(path: &FsPath) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn has_extension(path: &FsPath, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
