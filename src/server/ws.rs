// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! /ws 进度推送

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::{debug, info};

use super::AppState;
use crate::pipeline::ProgressSnapshot;

pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_conn(socket, app))
}

async fn ws_conn(mut socket: WebSocket, app: AppState) {
    let mut sub = app.broadcaster.subscribe();
    info!("🔌 WebSocket 已连接 (#{})", sub.id);

    // 处理中途接入: 先补发当前进度
    if app.processing.is_processing() {
        let current = ProgressSnapshot::from_status(&app.processing.snapshot());
        if send_json(&mut socket, &current).await.is_err() {
            app.broadcaster.unsubscribe(sub.id);
            return;
        }
    }

    loop {
        tokio::select! {
            snapshot = sub.rx.recv() => match snapshot {
                Some(snapshot) => {
                    if send_json(&mut socket, &snapshot).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    app.broadcaster.unsubscribe(sub.id);
    info!("🔌 WebSocket 已断开 (#{})", sub.id);
}

async fn send_json(socket: &mut WebSocket, snapshot: &ProgressSnapshot) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(snapshot) {
        Ok(text) => text,
        Err(e) => {
            debug!("快照序列化失败: {}", e);
            return Ok(());
        }
    };
    socket.send(Message::Text(text)).await
}
