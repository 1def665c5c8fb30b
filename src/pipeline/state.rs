// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 处理状态: 单写者 (流水线) 多读者 (HTTP / WebSocket)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use tokio::task::JoinHandle;

use super::ProcessingStatus;

#[derive(Default)]
pub struct ProcessingState {
    busy: AtomicBool,
    status: RwLock<ProcessingStatus>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 抢占运行权, 已有任务在跑时返回 false
    pub fn try_begin(&self) -> bool {
        let acquired = self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if acquired {
            self.update(|s| s.is_processing = true);
        }
        acquired
    }

    /// 释放运行权 (成功/失败两种终态都会调用)
    pub fn finish(&self) {
        self.update(|s| s.is_processing = false);
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_processing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProcessingStatus {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut ProcessingStatus)) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        f(&mut status);
    }

    /// 新一轮处理开始前重置计数
    pub fn reset_for_run(&self, filename: &str) {
        self.update(|s| {
            s.is_processing = true;
            s.progress = 0;
            s.error = None;
            s.processed_frames = 0;
            s.total_frames = 0;
            s.output_file = None;
            s.current_file = Some(filename.to_string());
        });
    }

    pub fn set_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// 最近一次任务是否已结束 (没有任务时视为已结束)
    pub fn worker_finished(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(true, |h| h.is_finished())
    }

    /// 取出任务句柄 (用于等待完成)
    pub fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_admission() {
        let state = ProcessingState::new();
        assert!(state.try_begin());
        assert!(!state.try_begin());
        assert!(state.snapshot().is_processing);

        state.finish();
        assert!(!state.is_processing());
        assert!(!state.snapshot().is_processing);
        assert!(state.try_begin());
    }

    #[test]
    fn test_rejected_begin_leaves_status_untouched() {
        let state = ProcessingState::new();
        assert!(state.try_begin());
        state.reset_for_run("a.mp4");
        state.update(|s| {
            s.total_frames = 100;
            s.processed_frames = 42;
            s.progress = 42;
        });
        let before = state.snapshot();

        assert!(!state.try_begin());
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_reset_clears_previous_error() {
        let state = ProcessingState::new();
        state.update(|s| {
            s.error = Some("old".into());
            s.progress = 70;
        });
        state.reset_for_run("b.mp4");
        let s = state.snapshot();
        assert_eq!(s.error, None);
        assert_eq!(s.progress, 0);
        assert_eq!(s.current_file.as_deref(), Some("b.mp4"));
    }

    #[test]
    fn test_no_worker_counts_as_finished() {
        assert!(ProcessingState::new().worker_finished());
    }
}
