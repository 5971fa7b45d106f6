//! 에러 타입 — 도메인별 에러 정의

/// authwatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum AuthwatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 알림 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 지원하지 않는 형식
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 파싱 실패
    #[error("parse failed at offset {offset}: {reason}")]
    Failed { offset: usize, reason: String },
}

/// 알림 싱크 에러
///
/// 싱크 기록 실패는 일시적 에러로 취급합니다. 호출자는 로그를 남기고
/// 해당 알림을 버린 뒤 다음 이벤트 처리를 계속합니다.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 백엔드 연결/열기 실패
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// 기록 실패
    #[error("write failed: {0}")]
    Write(String),

    /// 기록 시간 초과
    #[error("write timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// 직렬화 실패
    #[error("serialization failed: {0}")]
    Serialize(String),
}
