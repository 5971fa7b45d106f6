//! 로그 파싱 모듈 -- 소스별 로그인 이벤트 파서
//!
//! 각 파서는 core의 [`LoginParser`](authwatch_core::pipeline::LoginParser) trait을 구현합니다.
//! [`ParserRouter`]는 등록된 파서를 형식 이름으로 찾거나, 형식을 모를 때는
//! 순서대로 시도합니다.
//!
//! # 지원 형식
//! - 리버스 프록시 JSON access 로그 ([`AccessLogParser`])
//! - 애플리케이션 JSON 인증 로그 ([`AuthLogParser`])
//!
//! # 사용 예시
//! ```ignore
//! use authwatch_log_pipeline::parser::ParserRouter;
//! use authwatch_core::types::SourceKind;
//!
//! let router = ParserRouter::with_defaults();
//! let event = router.parse_source(SourceKind::Auth, line, chrono::Utc::now())?;
//! ```

pub mod access;
pub mod auth;

pub use access::AccessLogParser;
pub use auth::AuthLogParser;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use authwatch_core::error::AuthwatchError;
use authwatch_core::pipeline::LoginParser;
use authwatch_core::types::{LoginEvent, SourceKind};

use crate::error::LogPipelineError;

/// 기본 최대 입력 크기 (1MB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 1024 * 1024;

/// 로그의 `time_local` 형식 (`19/Oct/2026:12:00:00`)
const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

/// 타임존이 붙은 `time_local` 형식 (`19/Oct/2026:12:00:00 +0300`)
const TIME_LOCAL_TZ_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// 파서 라우터 -- 형식 이름으로 파서를 선택합니다.
pub struct ParserRouter {
    /// 등록된 파서 목록 (자동 감지 시 순서대로 시도)
    parsers: Vec<Box<dyn LoginParser>>,
}

impl ParserRouter {
    /// 빈 라우터를 생성합니다.
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// 기본 파서 세트 (access + auth)로 라우터를 생성합니다.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Box::new(AccessLogParser::default()))
            .register(Box::new(AuthLogParser::default()))
    }

    /// 파서를 등록합니다. 등록 순서대로 시도됩니다.
    pub fn register(mut self, parser: Box<dyn LoginParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    /// 형식을 모르는 라인을 파싱합니다.
    ///
    /// 등록된 파서를 순서대로 시도하여 첫 번째 성공 결과를 반환합니다.
    pub fn parse(&self, raw: &[u8], received_at: DateTime<Utc>) -> Result<LoginEvent, AuthwatchError> {
        let mut last_error = None;
        for parser in &self.parsers {
            match parser.parse(raw, received_at) {
                Ok(event) => return Ok(event),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LogPipelineError::UnsupportedFormat("no parsers registered".to_owned()).into()
        }))
    }

    /// 특정 형식 이름의 파서로 직접 파싱합니다.
    pub fn parse_with(
        &self,
        format_name: &str,
        raw: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<LoginEvent, AuthwatchError> {
        self.parsers
            .iter()
            .find(|p| p.format_name() == format_name)
            .ok_or_else(|| LogPipelineError::UnsupportedFormat(format_name.to_owned()))?
            .parse(raw, received_at)
    }

    /// 소스 종류에 맞는 파서로 파싱합니다.
    pub fn parse_source(
        &self,
        kind: SourceKind,
        raw: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<LoginEvent, AuthwatchError> {
        self.parse_with(kind.as_str(), raw, received_at)
    }

    /// 등록된 파서 형식 이름 목록을 반환합니다.
    pub fn registered_formats(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.format_name()).collect()
    }
}

impl Default for ParserRouter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// `time_local` 문자열을 UTC 시각으로 해석합니다.
///
/// 허용 형식: `%d/%b/%Y:%H:%M:%S %z`, `%d/%b/%Y:%H:%M:%S` (UTC로 간주), RFC 3339.
pub fn parse_time_local(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_str(value, TIME_LOCAL_TZ_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, TIME_LOCAL_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// 시각을 해석하지 못하면 수신 시각을 사용합니다.
fn resolve_timestamp(format: &str, time_local: &str, received_at: DateTime<Utc>) -> DateTime<Utc> {
    parse_time_local(time_local).unwrap_or_else(|| {
        debug!(format, time_local, "unrecognised time_local, using receive time");
        received_at
    })
}

/// 라인을 JSON 객체로 파싱합니다.
fn parse_object(format: &str, raw: &[u8], max_input_size: usize) -> Result<Map<String, Value>, LogPipelineError> {
    if raw.len() > max_input_size {
        return Err(LogPipelineError::Parse {
            format: format.to_owned(),
            offset: 0,
            reason: format!("input too large: {} bytes (max: {})", raw.len(), max_input_size),
        });
    }

    let value: Value = serde_json::from_slice(raw).map_err(|e| LogPipelineError::Parse {
        format: format.to_owned(),
        offset: e.column(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Object(obj) => Ok(obj),
        _ => Err(LogPipelineError::Parse {
            format: format.to_owned(),
            offset: 0,
            reason: "expected JSON object at top level".to_owned(),
        }),
    }
}

/// 객체에서 문자열 필드를 추출합니다. 숫자와 불리언은 문자열로 변환합니다.
fn field_string(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn missing_field(format: &str, field: &str) -> LogPipelineError {
    LogPipelineError::Parse {
        format: format.to_owned(),
        offset: 0,
        reason: format!("missing required field '{field}'"),
    }
}
