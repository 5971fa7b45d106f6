//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 로그 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<LogPipelineError> for AuthwatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use authwatch_core::error::{AuthwatchError, ConfigError, ParseError, PipelineError, SinkError};

/// 로그 파이프라인 도메인 에러
///
/// 테일링, 파싱, 싱크 기록, 채널 통신 등 파이프라인 내부의
/// 모든 에러 상황을 포괄합니다. 탐지기는 에러를 반환하지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 로그 파싱 실패
    #[error("parse error: {format} at offset {offset}: {reason}")]
    Parse {
        /// 파서 형식 (access, auth)
        format: String,
        /// 실패 위치 (바이트 오프셋)
        offset: usize,
        /// 실패 사유
        reason: String,
    },

    /// 지원하지 않는 로그 형식
    #[error("unsupported log format: {0}")]
    UnsupportedFormat(String),

    /// 테일러 에러 (타임아웃, 파일 상태 이상 등)
    #[error("tailer error: {path}: {reason}")]
    Tailer {
        /// 대상 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화/역직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LogPipelineError {
    /// 파일이 아직 없어서 생긴 에러인지 확인합니다.
    ///
    /// 테일러는 이 경우를 정상적인 대기 상태로 보고 조용히 재시도합니다.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<LogPipelineError> for AuthwatchError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Parse { offset, reason, .. } => {
                AuthwatchError::Parse(ParseError::Failed { offset, reason })
            }
            LogPipelineError::UnsupportedFormat(format) => {
                AuthwatchError::Parse(ParseError::UnsupportedFormat(format))
            }
            LogPipelineError::Sink(e) => AuthwatchError::Sink(e),
            LogPipelineError::Config { field, reason } => {
                AuthwatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            LogPipelineError::Io(e) => AuthwatchError::Io(e),
            other => AuthwatchError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
