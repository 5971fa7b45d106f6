//! 리버스 프록시 access 로그 파서
//!
//! JSON 형식으로 기록된 access 로그 한 줄을 [`LoginEvent::Access`]로 변환합니다.
//! 로그인 폼은 `application/x-www-form-urlencoded` 본문으로 전송되므로
//! `request_body`에서 `username`/`password`를 디코딩합니다.
//!
//! ```text
//! {"time_local":"19/Oct/2026:12:00:00 +0300","remote_addr":"203.0.113.7",
//!  "request":"POST /login HTTP/1.1","request_body":"username=alice&password=x","status":"200"}
//! ```

use chrono::{DateTime, Utc};

use authwatch_core::error::AuthwatchError;
use authwatch_core::pipeline::LoginParser;
use authwatch_core::types::{AccessLogin, LoginEvent};

use super::{DEFAULT_MAX_INPUT_SIZE, field_string, missing_field, parse_object, resolve_timestamp};
use crate::error::LogPipelineError;

const FORMAT: &str = "access";

/// access 로그 파서
pub struct AccessLogParser {
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
}

impl AccessLogParser {
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

        let request = field_string(&obj, "request").ok_or_else(|| missing_field(FORMAT, "request"))?;
        let time_local = field_string(&obj, "time_local").unwrap_or_default();
        let body = field_string(&obj, "request_body").unwrap_or_default();
        let (username, password) = form_credentials(&body);

        Ok(LoginEvent::Access(AccessLogin {
            timestamp: resolve_timestamp(FORMAT, &time_local, received_at),
            time_local,
            source_addr: field_string(&obj, "remote_addr").unwrap_or_default(),
            request,
            status: field_string(&obj, "status").unwrap_or_default(),
            username: username.unwrap_or_default(),
            password,
        }))
    }
}

impl Default for AccessLogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginParser for AccessLogParser {
    fn format_name(&self) -> &str {
        FORMAT
    }

    fn parse(&self, raw: &[u8], received_at: DateTime<Utc>) -> Result<LoginEvent, AuthwatchError> {
        self.parse_line(raw, received_at).map_err(AuthwatchError::from)
    }
}

/// 폼 본문에서 첫 번째 `username`과 `password` 값을 꺼냅니다.
fn form_credentials(body: &str) -> (Option<String>, Option<String>) {
    let mut username = None;
    let mut password = None;
    for (key, value) in form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "username" if username.is_none() => username = Some(value.into_owned()),
            "password" if password.is_none() => password = Some(value.into_owned()),
            _ => {}
        }
        if username.is_some() && password.is_some() {
            break;
        }
    }
    (username, password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use authwatch_core::types::Outcome;

    fn parse(line: &str) -> Result<LoginEvent, AuthwatchError> {
        AccessLogParser::default().parse(line.as_bytes(), Utc::now())
    }

    #[test]
    fn parses_failed_login() {
        let event = parse(
            r#"{"time_local":"19/Oct/2026:12:00:00 +0000","remote_addr":"203.0.113.7","request":"POST /login HTTP/1.1","request_body":"username=alice&password=hunter2","status":"200"}"#,
        )
        .unwrap();

        assert!(event.is_login());
        assert_eq!(event.username(), "alice");
        assert_eq!(event.password(), Some("hunter2"));
        assert_eq!(event.source_addr(), Some("203.0.113.7"));
        assert_eq!(event.outcome(), Some(Outcome::Failure));
        assert_eq!(event.time_local(), "19/Oct/2026:12:00:00 +0000");
    }

    #[test]
    fn redirect_status_is_success() {
        let event = parse(
            r#"{"remote_addr":"203.0.113.7","request":"POST /login","request_body":"username=alice&password=x","status":303}"#,
        )
        .unwrap();
        assert_eq!(event.outcome(), Some(Outcome::Success));
    }

    #[test]
    fn percent_encoded_body_is_decoded() {
        let event = parse(
            r#"{"request":"POST /login","request_body":"username=admin%27--&password=a+b%3B","status":"200"}"#,
        )
        .unwrap();
        assert_eq!(event.username(), "admin'--");
        assert_eq!(event.password(), Some("a b;"));
    }

    #[test]
    fn non_login_request_is_parsed_but_not_login() {
        let event = parse(r#"{"request":"GET /static/app.js HTTP/1.1","request_body":"-","status":"200"}"#)
            .unwrap();
        assert!(!event.is_login());
        assert_eq!(event.username(), "");
    }

    #[test]
    fn missing_request_field_is_error() {
        assert!(parse(r#"{"remote_addr":"203.0.113.7"}"#).is_err());
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(parse("not json").is_err());
        assert!(parse(r#"{"request":"POST /login""#).is_err());
    }

    #[test]
    fn first_credential_wins() {
        let (user, pass) = form_credentials("username=a&username=b&password=1&password=2");
        assert_eq!(user.as_deref(), Some("a"));
        assert_eq!(pass.as_deref(), Some("1"));
    }

    #[test]
    fn oversized_line_is_rejected() {
        let parser = AccessLogParser::new().with_max_input_size(8);
        assert!(parser.parse(br#"{"request":"POST /login"}"#, Utc::now()).is_err());
    }
}
