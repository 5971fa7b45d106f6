//! 알림 싱크 모듈 -- 탐지된 알림의 저장
//!
//! core의 [`AlertSink`] trait 구현체와, 엔진과 싱크를 분리하는
//! [`AlertDispatcher`]를 제공합니다.
//!
//! # 싱크
//! - [`JsonLinesSink`]: append-only JSON lines 파일 (기본값)
//! - [`MemorySink`]: 프로세스 메모리 (테스트/임베딩용)

pub mod dispatcher;
pub mod jsonl;
pub mod memory;

pub use dispatcher::{AlertDispatcher, AlertSender, DispatcherOptions, DispatcherStats};
pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;

use std::sync::Arc;

use authwatch_core::config::{SinkConfig, SinkKind};
use authwatch_core::pipeline::AlertSink;

use crate::error::LogPipelineError;

/// 설정에 맞는 싱크를 생성합니다.
///
/// JSON lines 파일을 열 수 없으면 에러를 반환합니다.
pub fn build_sink(config: &SinkConfig) -> Result<Arc<dyn AlertSink>, LogPipelineError> {
    match config.kind {
        SinkKind::Jsonl => Ok(Arc::new(JsonLinesSink::open(&config.path)?)),
        SinkKind::Memory => Ok(Arc::new(MemorySink::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_memory_sink() {
        let config = SinkConfig {
            kind: SinkKind::Memory,
            ..SinkConfig::default()
        };
        assert_eq!(build_sink(&config).unwrap().name(), "memory");
    }

    #[test]
    fn builds_jsonl_sink() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            kind: SinkKind::Jsonl,
            path: dir.path().join("alerts.jsonl").display().to_string(),
            ..SinkConfig::default()
        };
        assert_eq!(build_sink(&config).unwrap().name(), "jsonl");
    }

    #[test]
    fn unopenable_jsonl_path_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            kind: SinkKind::Jsonl,
            path: dir.path().display().to_string(),
            ..SinkConfig::default()
        };
        let err = build_sink(&config).err().unwrap();
        assert!(matches!(err, LogPipelineError::Config { .. }));
    }
}
