//! 파이프라인 trait — 모듈 확장 포인트 정의

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AuthwatchError, SinkError};
use crate::types::{Alert, LoginEvent};

/// `Send` 가능한 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 상태를 가진 탐지 규칙 trait
///
/// 새로운 탐지 규칙을 추가하려면 이 trait을 구현합니다.
/// `check`는 전체 함수(total)여야 합니다. 필요한 필드가 없거나 조건에 맞지
/// 않으면 `None`을 반환할 뿐 실패하지 않습니다.
pub trait Detector: Send + Sync {
    /// 탐지기 이름
    fn name(&self) -> &str;

    /// 이벤트 하나를 `now` 시각 기준으로 평가합니다.
    fn check(&mut self, event: &LoginEvent, now: DateTime<Utc>) -> Option<Alert>;

    /// 윈도우/쿨다운이 지난 키를 정리하고 제거한 키 수를 반환합니다.
    fn sweep(&mut self, now: DateTime<Utc>) -> usize;

    /// 현재 추적 중인 키 수 (시도 맵 + 쿨다운 맵)
    fn tracked_keys(&self) -> usize;
}

/// 로그 라인 파서 trait
///
/// 새로운 로그 소스를 지원하려면 이 trait을 구현합니다.
pub trait LoginParser: Send + Sync {
    /// 지원하는 로그 형식 이름
    fn format_name(&self) -> &str;

    /// 원시 라인을 로그인 이벤트로 파싱
    ///
    /// `received_at`은 라인 시각을 해석할 수 없을 때 대신 사용됩니다.
    fn parse(&self, raw: &[u8], received_at: DateTime<Utc>) -> Result<LoginEvent, AuthwatchError>;
}

/// 알림 저장소 trait
///
/// 쓰기 전용 계약입니다. 일시적 백엔드 장애는 `SinkError`로 반환하며,
/// 호출자는 이를 기록하고 알림을 버립니다.
pub trait AlertSink: Send + Sync {
    /// 싱크 이름 (로그/메트릭용)
    fn name(&self) -> &str;

    /// 알림 하나를 기록합니다.
    fn record<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// 파이프라인 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 여부
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 장기 실행 모듈의 생명주기 trait
pub trait Pipeline: Send {
    /// 모듈을 시작합니다. 백그라운드 태스크를 스폰한 뒤 바로 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), AuthwatchError>> + Send;

    /// 모듈을 정지하고 백그라운드 태스크 종료를 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), AuthwatchError>> + Send;

    /// 현재 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
