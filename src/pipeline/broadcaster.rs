// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 进度广播: 一对多推送, 断开的订阅者在下一次推送时剔除

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::ProgressSnapshot;

/// 订阅句柄: 持有接收端, 丢弃即视为断开
pub struct Subscription {
    pub id: u64,
    pub rx: UnboundedReceiver<ProgressSnapshot>,
}

#[derive(Default)]
pub struct Broadcaster {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, UnboundedSender<ProgressSnapshot>)>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push((id, tx));
        debug!("📡 订阅者 #{} 已接入", id);
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.lock().retain(|(listener, _)| *listener != id);
        debug!("📡 订阅者 #{} 已退出", id);
    }

    /// 推送给全部订阅者, 返回成功送达的数量
    pub fn publish(&self, snapshot: &ProgressSnapshot) -> usize {
        let mut listeners = self.lock();
        listeners.retain(|(id, tx)| match tx.send(snapshot.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!("📡 订阅者 #{} 已断开, 移除", id);
                false
            }
        });
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, UnboundedSender<ProgressSnapshot>)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_all_listeners() {
        let bus = Broadcaster::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let snapshot = ProgressSnapshot::running(10, 1, 10);
        assert_eq!(bus.publish(&snapshot), 2);
        assert_eq!(a.rx.try_recv().unwrap(), snapshot);
        assert_eq!(b.rx.try_recv().unwrap(), snapshot);
    }

    #[test]
    fn test_disconnected_listener_does_not_block_others() {
        let bus = Broadcaster::new();
        let mut a = bus.subscribe();
        let dropped = bus.subscribe();
        let mut c = bus.subscribe();
        drop(dropped);

        let snapshot = ProgressSnapshot::running(50, 5, 10);
        assert_eq!(bus.publish(&snapshot), 2);
        assert_eq!(bus.listener_count(), 2);
        assert_eq!(a.rx.try_recv().unwrap(), snapshot);
        assert_eq!(c.rx.try_recv().unwrap(), snapshot);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = Broadcaster::new();
        let a = bus.subscribe();
        let _b = bus.subscribe();
        bus.unsubscribe(a.id);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn test_publish_without_listeners() {
        let bus = Broadcaster::new();
        assert_eq!(bus.publish(&ProgressSnapshot::failed("x".into())), 0);
    }
}
