//! 탐지 엔진 -- 로그인 이벤트를 모든 탐지기에 순서대로 통과시킵니다.
//!
//! [`DetectionEngine`]은 탐지기를 소유하고 평가 순서를 고정합니다.
//! 엔진 자체는 동기 코드이며, 파이프라인은 이를 단일 태스크에서만 호출하여
//! 탐지기 상태 변경을 직렬화합니다.
//!
//! # 사용 예시
//! ```ignore
//! use authwatch_core::config::DetectionConfig;
//! use authwatch_log_pipeline::DetectionEngine;
//!
//! let mut engine = DetectionEngine::new(&DetectionConfig::default());
//! for alert in engine.process_event(&event) {
//!     dispatcher.dispatch(alert);
//! }
//! ```

use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, gauge, histogram};
use tracing::{debug, info};

use authwatch_core::config::DetectionConfig;
use authwatch_core::metrics as m;
use authwatch_core::pipeline::Detector;
use authwatch_core::types::{Alert, AlertKind, LoginEvent};

use crate::rule::build_detectors;
use crate::rule::window::to_delta;

/// 엔진 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// 탐지기를 통과한 로그인 이벤트 수
    pub events_processed: u64,
    /// 로그인이 아니어서 건너뛴 이벤트 수
    pub events_skipped: u64,
    /// 생성된 알림 수 (`alert_login` 포함)
    pub alerts_emitted: u64,
    /// 정리(sweep) 실행 횟수
    pub sweeps: u64,
}

/// 탐지 엔진
pub struct DetectionEngine {
    detectors: Vec<Box<dyn Detector>>,
    emit_login_alerts: bool,
    sweep_interval: TimeDelta,
    last_sweep: Option<DateTime<Utc>>,
    stats: EngineStats,
}

impl DetectionEngine {
    /// 설정에서 엔진을 생성합니다. 비활성화된 규칙은 포함되지 않습니다.
    pub fn new(config: &DetectionConfig) -> Self {
        Self::with_detectors(
            build_detectors(config),
            config.emit_login_alerts,
            config.sweep_interval(),
        )
    }

    /// 직접 구성한 탐지기 목록으로 엔진을 생성합니다. 목록 순서가 평가 순서입니다.
    pub fn with_detectors(
        detectors: Vec<Box<dyn Detector>>,
        emit_login_alerts: bool,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            detectors,
            emit_login_alerts,
            sweep_interval: to_delta(sweep_interval),
            last_sweep: None,
            stats: EngineStats::default(),
        }
    }

    /// 현재 벽시계 시각으로 이벤트를 처리합니다.
    pub fn process_event(&mut self, event: &LoginEvent) -> Vec<Alert> {
        self.process_event_at(event, Utc::now())
    }

    /// `now` 시각 기준으로 이벤트를 처리하고 생성된 알림을 반환합니다.
    ///
    /// 로그인이 아닌 이벤트는 무시합니다. 정리 주기가 지났으면 먼저 정리합니다.
    pub fn process_event_at(&mut self, event: &LoginEvent, now: DateTime<Utc>) -> Vec<Alert> {
        let started = Instant::now();
        self.maybe_sweep(now);

        if !event.is_login() {
            self.stats.events_skipped += 1;
            counter!(m::ENGINE_EVENTS_SKIPPED_TOTAL).increment(1);
            return Vec::new();
        }

        self.stats.events_processed += 1;
        counter!(m::ENGINE_EVENTS_PROCESSED_TOTAL).increment(1);

        let mut alerts = Vec::new();
        for detector in &mut self.detectors {
            if let Some(alert) = detector.check(event, now) {
                info!(
                    detector = detector.name(),
                    kind = %alert.kind,
                    username = alert.username.as_deref().unwrap_or("-"),
                    source_addr = alert.source_addr.as_deref().unwrap_or("-"),
                    count = alert.count,
                    "attack pattern detected"
                );
                alerts.push(alert);
            }
        }

        if self.emit_login_alerts {
            let mut login = Alert::from_event(AlertKind::Login, event).with_outcome(event.outcome());
            login.password = event.password().map(str::to_owned);
            alerts.push(login);
        }

        for alert in &alerts {
            counter!(m::DETECTOR_ALERTS_TOTAL, m::LABEL_KIND => alert.kind.as_str()).increment(1);
        }
        self.stats.alerts_emitted += alerts.len() as u64;

        histogram!(m::ENGINE_PROCESSING_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        alerts
    }

    /// 모든 탐지기의 만료 상태를 정리하고 제거한 키 수를 반환합니다.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for detector in &mut self.detectors {
            let swept = detector.sweep(now);
            removed += swept;
            let tracked = detector.tracked_keys();
            gauge!(m::DETECTOR_TRACKED_KEYS, m::LABEL_DETECTOR => detector.name().to_owned())
                .set(tracked as f64);
            debug!(detector = detector.name(), swept, tracked, "detector state swept");
        }

        counter!(m::DETECTOR_KEYS_SWEPT_TOTAL).increment(removed as u64);
        self.last_sweep = Some(now);
        self.stats.sweeps += 1;
        removed
    }

    fn maybe_sweep(&mut self, now: DateTime<Utc>) {
        match self.last_sweep {
            None => self.last_sweep = Some(now),
            Some(last) if now.signed_duration_since(last) >= self.sweep_interval => {
                self.sweep(now);
            }
            Some(_) => {}
        }
    }

    /// 모든 탐지기가 추적 중인 키 수의 합
    pub fn tracked_keys(&self) -> usize {
        self.detectors.iter().map(|d| d.tracked_keys()).sum()
    }

    /// 평가 순서대로 탐지기 이름을 반환합니다.
    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// 처리 통계
    pub fn stats(&self) -> EngineStats {
        self.stats
    }
}
