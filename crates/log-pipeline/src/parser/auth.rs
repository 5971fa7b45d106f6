//! 애플리케이션 인증 로그 파서
//!
//! 웹 애플리케이션이 남기는 JSON 인증 로그 한 줄을 [`LoginEvent::Auth`]로 변환합니다.
//! 이 로그의 모든 레코드는 로그인 시도이며, 클라이언트 주소는 없습니다.
//!
//! ```text
//! {"time_local":"19/Oct/2026:12:00:00","level":"WARNING","status":"failure","username":"alice","password":"x"}
//! ```

use chrono::{DateTime, Utc};

use authwatch_core::error::AuthwatchError;
use authwatch_core::pipeline::LoginParser;
use authwatch_core::types::{AuthLogin, LoginEvent};

use super::{DEFAULT_MAX_INPUT_SIZE, field_string, missing_field, parse_object, resolve_timestamp};
use crate::error::LogPipelineError;

const FORMAT: &str = "auth";

/// 인증 로그 파서
pub struct AuthLogParser {
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
}

impl AuthLogParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    fn parse_line(&self, raw: &[u8], received_at: DateTime<Utc>) -> Result<LoginEvent, LogPipelineError> {
        let obj = parse_object(FORMAT, raw, self.max_input_size)?;

        let username = field_string(&obj, "username").ok_or_else(|| missing_field(FORMAT, "username"))?;
        let time_local = field_string(&obj, "time_local").unwrap_or_default();

        Ok(LoginEvent::Auth(AuthLogin {
            timestamp: resolve_timestamp(FORMAT, &time_local, received_at),
            time_local,
            level: field_string(&obj, "level").unwrap_or_default(),
            status: field_string(&obj, "status").unwrap_or_default(),
            username,
            password: field_string(&obj, "password"),
        }))
    }
}

impl Default for AuthLogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginParser for AuthLogParser {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn parse(&self, raw: &[u8], received_at: DateTime<Utc>) -> Result<LoginEvent, AuthwatchError> {
        self.parse_line(raw, received_at).map_err(AuthwatchError::from)
    }
}
