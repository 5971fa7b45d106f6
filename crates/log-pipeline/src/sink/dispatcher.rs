//! 알림 디스패처 -- 엔진과 싱크 사이의 bounded 큐
//!
//! 엔진 태스크는 [`AlertSender::dispatch`]로 알림을 큐에 넣기만 하고, 별도의
//! writer 태스크가 큐에서 꺼내 싱크에 기록합니다. 느린 싱크가 탐지를 막지
//! 않습니다.
//!
//! # 규칙
//! - `dispatch`는 절대 대기하지 않습니다. 큐가 가득 찼거나 닫혔으면 알림을 버립니다.
//! - writer는 `recorded_at`을 `max(now, last + 1µs)`로 찍어 단조 증가를 보장합니다.
//! - 기록 실패/타임아웃은 로그를 남기고 해당 알림만 버립니다.
//! - [`AlertDispatcher::close`]는 큐에 남은 알림을 모두 기록한 뒤 반환합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use authwatch_core::config::SinkConfig;
use authwatch_core::error::SinkError;
use authwatch_core::metrics as m;
use authwatch_core::pipeline::AlertSink;
use authwatch_core::types::Alert;

/// 디스패처 옵션
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// 큐 용량
    pub queue_capacity: usize,
    /// 알림 하나당 기록 타임아웃
    pub write_timeout: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::from_config(&SinkConfig::default())
    }
}

impl DispatcherOptions {
    /// core 설정에서 옵션을 생성합니다.
    pub fn from_config(config: &SinkConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity.max(1),
            write_timeout: config.write_timeout(),
        }
    }
}

/// 디스패처 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// 싱크에 기록된 알림 수
    pub written: u64,
    /// 기록 실패/타임아웃으로 버린 알림 수
    pub failed: u64,
    /// 큐가 가득 차거나 닫혀 버린 알림 수
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// 큐에 알림을 넣는 핸들. 복제해서 여러 곳에서 쓸 수 있습니다.
#[derive(Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<Alert>,
    sink_name: Arc<str>,
    counters: Arc<Counters>,
}

impl AlertSender {
    /// 알림을 큐에 넣습니다. 대기하지 않습니다.
    ///
    /// 큐에 넣었으면 `true`, 버렸으면 `false`를 반환합니다.
    pub fn dispatch(&self, alert: Alert) -> bool {
        let reason = match self.tx.try_send(alert) {
            Ok(()) => {
                gauge!(m::SINK_QUEUE_DEPTH, m::LABEL_SINK => self.sink_name.to_string())
                    .set((self.tx.max_capacity() - self.tx.capacity()) as f64);
                return true;
            }
            Err(TrySendError::Full(alert)) => {
                warn!(sink = %self.sink_name, kind = %alert.kind, id = %alert.id, "alert queue full, dropping alert");
                "full"
            }
            Err(TrySendError::Closed(alert)) => {
                warn!(sink = %self.sink_name, kind = %alert.kind, id = %alert.id, "alert queue closed, dropping alert");
                "closed"
            }
        };

        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        counter!(m::SINK_ALERTS_DROPPED_TOTAL, m::LABEL_SINK => self.sink_name.to_string(), "reason" => reason)
            .increment(1);
        false
    }

    /// 큐에 대기 중인 알림 수
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// 지금까지의 통계
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot()
    }
}

/// 알림 디스패처
///
/// writer 태스크를 소유합니다. tokio 런타임 안에서 생성해야 합니다.
pub struct AlertDispatcher {
    sender: AlertSender,
    writer: JoinHandle<()>,
}

impl AlertDispatcher {
    /// writer 태스크를 띄우고 디스패처를 반환합니다.
    pub fn spawn(sink: Arc<dyn AlertSink>, options: DispatcherOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let sink_name: Arc<str> = Arc::from(sink.name());
        let counters = Arc::new(Counters::default());

        let writer = tokio::spawn(run_writer(
            sink,
            rx,
            options.write_timeout,
            Arc::clone(&sink_name),
            Arc::clone(&counters),
        ));

        info!(
            sink = %sink_name,
            queue_capacity = options.queue_capacity,
            write_timeout_ms = options.write_timeout.as_millis() as u64,
            "alert dispatcher started"
        );

        Self {
            sender: AlertSender { tx, sink_name, counters },
            writer,
        }
    }

    /// 큐 핸들을 복제해 반환합니다.
    pub fn sender(&self) -> AlertSender {
        self.sender.clone()
    }

    /// 알림을 큐에 넣습니다. [`AlertSender::dispatch`]와 같습니다.
    pub fn dispatch(&self, alert: Alert) -> bool {
        self.sender.dispatch(alert)
    }

    /// 지금까지의 통계
    pub fn stats(&self) -> DispatcherStats {
        self.sender.stats()
    }

    /// writer 태스크가 살아 있는지 여부
    pub fn is_running(&self) -> bool {
        !self.writer.is_finished()
    }

    /// 큐를 닫고 남은 알림을 모두 기록한 뒤 통계를 반환합니다.
    ///
    /// 복제된 [`AlertSender`]가 남아 있으면 그것들이 모두 drop될 때까지 기다립니다.
    pub async fn close(self) -> DispatcherStats {
        let Self { sender, writer } = self;
        let counters = Arc::clone(&sender.counters);
        let sink_name = Arc::clone(&sender.sink_name);
        drop(sender);

        if let Err(e) = writer.await {
            error!(sink = %sink_name, error = %e, "alert writer task failed");
        }

        let stats = counters.snapshot();
        info!(
            sink = %sink_name,
            written = stats.written,
            failed = stats.failed,
            dropped = stats.dropped,
            "alert dispatcher closed"
        );
        stats
    }
}

async fn run_writer(
    sink: Arc<dyn AlertSink>,
    mut rx: mpsc::Receiver<Alert>,
    write_timeout: Duration,
    sink_name: Arc<str>,
    counters: Arc<Counters>,
) {
    let mut last_stamp: Option<DateTime<Utc>> = None;

    while let Some(mut alert) = rx.recv().await {
        gauge!(m::SINK_QUEUE_DEPTH, m::LABEL_SINK => sink_name.to_string()).set(rx.len() as f64);

        let stamp = next_stamp(last_stamp, Utc::now());
        last_stamp = Some(stamp);
        alert.recorded_at = Some(stamp);

        let result = match tokio::time::timeout(write_timeout, sink.record(&alert)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout {
                timeout_ms: u64::try_from(write_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match result {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
                counter!(m::SINK_ALERTS_WRITTEN_TOTAL, m::LABEL_SINK => sink_name.to_string()).increment(1);
                debug!(sink = %sink_name, kind = %alert.kind, id = %alert.id, "alert recorded");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                counter!(m::SINK_WRITE_FAILURES_TOTAL, m::LABEL_SINK => sink_name.to_string()).increment(1);
                warn!(sink = %sink_name, kind = %alert.kind, id = %alert.id, error = %e, "failed to record alert, dropping");
            }
        }
    }

    gauge!(m::SINK_QUEUE_DEPTH, m::LABEL_SINK => sink_name.to_string()).set(0.0);
    debug!(sink = %sink_name, "alert writer drained");
}

/// 이전 스탬프보다 엄격히 큰 기록 시각을 계산합니다.
fn next_stamp(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if now <= last => last + TimeDelta::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authwatch_core::error::SinkError;
    use authwatch_core::pipeline::BoxFuture;
    use authwatch_core::types::{AlertKind, AuthLogin, LoginEvent};

    use crate::sink::MemorySink;

    fn alert(user: &str) -> Alert {
        let event = LoginEvent::Auth(AuthLogin {
            time_local: String::new(),
            timestamp: Utc::now(),
            level: "WARNING".to_owned(),
            status: "failure".to_owned(),
            username: user.to_owned(),
            password: None,
        });
        Alert::from_event(AlertKind::Login, &event)
    }

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn record<'a>(&'a self, _alert: &'a Alert) -> BoxFuture<'a, Result<(), SinkError>> {
            Box::pin(async { Err(SinkError::Unavailable("backend down".to_owned())) })
        }
    }

    struct SlowSink;

    impl AlertSink for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }

        fn record<'a>(&'a self, _alert: &'a Alert) -> BoxFuture<'a, Result<(), SinkError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
        }
    }

    #[test]
    fn stamp_is_strictly_increasing() {
        let now = Utc::now();
        assert_eq!(next_stamp(None, now), now);

        let later = now + TimeDelta::seconds(1);
        assert_eq!(next_stamp(Some(now), later), later);

        assert_eq!(next_stamp(Some(now), now), now + TimeDelta::microseconds(1));
        let earlier = now - TimeDelta::seconds(5);
        assert_eq!(next_stamp(Some(now), earlier), now + TimeDelta::microseconds(1));
    }

    #[tokio::test]
    async fn close_drains_queue_in_order() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = AlertDispatcher::spawn(sink.clone(), DispatcherOptions::default());

        for user in ["a", "b", "c"] {
            assert!(dispatcher.dispatch(alert(user)));
        }
        let stats = dispatcher.close().await;

        assert_eq!(stats.written, 3);
        let alerts = sink.alerts();
        let users: Vec<_> = alerts.iter().map(|a| a.username.as_deref().unwrap()).collect();
        assert_eq!(users, vec!["a", "b", "c"]);

        let stamps: Vec<_> = alerts.iter().map(|a| a.recorded_at.unwrap()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn failed_writes_are_counted_and_dropped() {
        let dispatcher = AlertDispatcher::spawn(Arc::new(FailingSink), DispatcherOptions::default());
        dispatcher.dispatch(alert("a"));
        dispatcher.dispatch(alert("b"));

        let stats = dispatcher.close().await;
        assert_eq!(stats.written, 0);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_writes_time_out() {
        let options = DispatcherOptions {
            queue_capacity: 4,
            write_timeout: Duration::from_millis(100),
        };
        let dispatcher = AlertDispatcher::spawn(Arc::new(SlowSink), options);
        dispatcher.dispatch(alert("a"));

        let stats = dispatcher.close().await;
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_without_blocking() {
        let options = DispatcherOptions {
            queue_capacity: 1,
            write_timeout: Duration::from_secs(120),
        };
        let dispatcher = AlertDispatcher::spawn(Arc::new(SlowSink), options);

        // writer가 첫 알림을 꺼내 기록 중인 상태로 만듭니다
        assert!(dispatcher.dispatch(alert("a")));
        tokio::task::yield_now().await;

        assert!(dispatcher.dispatch(alert("b")));
        assert!(!dispatcher.dispatch(alert("c")));
        assert_eq!(dispatcher.stats().dropped, 1);
    }

    #[tokio::test]
    async fn cloned_sender_alerts_are_written() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = AlertDispatcher::spawn(sink.clone(), DispatcherOptions::default());
        let sender = dispatcher.sender();
        sender.dispatch(alert("a"));
        drop(sender);

        let stats = dispatcher.close().await;
        assert_eq!(stats.written, 1);
        assert_eq!(sink.len(), 1);
    }
}
