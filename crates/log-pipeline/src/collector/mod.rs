//! 로그 수집 모듈 -- 감시 중인 로그 파일에서 원시 라인을 수집합니다.
//!
//! # 수집 소스
//! - [`FileTailer`]: 파일 하나를 `tail -F` 방식으로 따라가는 테일러
//!
//! # 아키텍처
//! 각 테일러는 자체 tokio 태스크에서 실행되며, 읽은 라인을 [`RawLog`]로 감싸
//! [`LineHandler`]에 넘깁니다. 파이프라인은 핸들러에서 라인을 파싱한 뒤
//! 엔진 채널로 전송합니다.

pub mod file;

pub use file::{FileId, FileTailer, LineHandler, TailState, TailerOptions};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use authwatch_core::types::SourceKind;

/// 수집된 원시 로그 라인
///
/// 테일러가 생성하고, 파서가 소비하는 중간 데이터 형식입니다.
/// 줄바꿈 문자(`\n`, `\r\n`)는 제거된 상태입니다.
#[derive(Debug, Clone)]
pub struct RawLog {
    /// 라인 바이트
    pub data: Bytes,
    /// 수집 소스 식별자 (파일 경로)
    pub source: String,
    /// 로그 형식
    pub format: SourceKind,
    /// 수집 시각
    pub received_at: DateTime<Utc>,
}

impl RawLog {
    /// 새 RawLog를 생성합니다. 수집 시각은 현재 시각입니다.
    pub fn new(data: Bytes, source: impl Into<String>, format: SourceKind) -> Self {
        Self {
            data,
            source: source.into(),
            format,
            received_at: Utc::now(),
        }
    }

    /// 수집 시각을 지정합니다.
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// 라인을 UTF-8 문자열로 봅니다 (잘못된 바이트는 대체 문자).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_log_creation() {
        let raw = RawLog::new(Bytes::from_static(b"{}"), "/var/log/webapp/auth.log", SourceKind::Auth);
        assert_eq!(raw.source, "/var/log/webapp/auth.log");
        assert_eq!(raw.format, SourceKind::Auth);
        assert_eq!(raw.as_str_lossy(), "{}");
    }

    #[test]
    fn raw_log_with_received_at() {
        let at = DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let raw = RawLog::new(Bytes::from_static(b"x"), "a", SourceKind::Access).with_received_at(at);
        assert_eq!(raw.received_at, at);
    }
}
