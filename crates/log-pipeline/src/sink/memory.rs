//! 인메모리 알림 싱크 (테스트/임베딩용)

use std::sync::{Mutex, MutexGuard};

use authwatch_core::error::SinkError;
use authwatch_core::pipeline::{AlertSink, BoxFuture};
use authwatch_core::types::{Alert, AlertKind};

/// 기록된 알림을 프로세스 메모리에 보관하는 싱크
#[derive(Debug, Default)]
pub struct MemorySink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemorySink {
    /// 빈 싱크를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 알림의 스냅샷 (기록 순서)
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().clone()
    }

    /// 특정 종류의 알림만 반환합니다.
    pub fn alerts_of(&self, kind: AlertKind) -> Vec<Alert> {
        self.lock().iter().filter(|a| a.kind == kind).cloned().collect()
    }

    /// 기록된 알림 수
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 모든 알림을 꺼내고 비웁니다.
    pub fn take(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.lock())
    }

    // poison 무시
    fn lock(&self) -> MutexGuard<'_, Vec<Alert>> {
        self.alerts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AlertSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn record<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.lock().push(alert.clone());
            Ok(())
        })
    }
}
