//! 통합 테스트 -- 파이프라인 전체 흐름 검증
//!
//! 파싱부터 탐지, 알림 기록까지의 흐름을 엔진 단위(결정적 시각)와
//! 실제 파일을 쓰는 파이프라인 단위로 검증합니다.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use authwatch_core::config::{DetectionConfig, StartPosition, TailerConfig};
use authwatch_core::pipeline::{LoginParser, Pipeline};
use authwatch_core::types::{AlertKind, AuthLogin, LoginEvent, Outcome, SourceKind};
use authwatch_log_pipeline::{
    AccessLogParser, DetectionEngine, JsonLinesSink, LogPipeline, LogPipelineBuilder, MemorySink,
    PipelineConfigBuilder,
};

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn auth_event(user: &str, password: &str, status: &str) -> LoginEvent {
    LoginEvent::Auth(AuthLogin {
        time_local: "19/Oct/2026:12:00:00".to_owned(),
        timestamp: t0(),
        level: "WARNING".to_owned(),
        status: status.to_owned(),
        username: user.to_owned(),
        password: Some(password.to_owned()),
    })
}

fn auth_line(user: &str, password: &str, status: &str) -> String {
    format!(
        r#"{{"time_local":"19/Oct/2026:12:00:00","level":"WARNING","status":"{status}","username":"{user}","password":"{password}"}}"#
    )
}

fn append(path: &Path, lines: &[String]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

fn kinds_of(alerts: &[authwatch_core::types::Alert], kind: AlertKind) -> usize {
    alerts.iter().filter(|a| a.kind == kind).count()
}

async fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    cond()
}

fn file_pipeline(log: &Path, start: StartPosition, sink: Arc<MemorySink>) -> LogPipeline {
    let config = PipelineConfigBuilder::new()
        .sources(Vec::new())
        .source(log.display().to_string(), SourceKind::Auth)
        .start_position(start)
        .poll_interval_secs(1)
        .build()
        .unwrap();
    LogPipelineBuilder::new().config(config).sink(sink).build().unwrap()
}

/// alice 시나리오: 실패 5회 -> 알림 1건(count 5), 6번째는 쿨다운으로 억제,
/// 쿨다운 후 다시 5회 누적 -> 두 번째 알림
#[test]
fn test_alice_bruteforce_scenario() {
    let mut engine = DetectionEngine::new(&DetectionConfig::default());
    let failure = auth_event("alice", "guess", "failure");

    let mut bruteforce = Vec::new();
    for i in 0..6 {
        let alerts = engine.process_event_at(&failure, t0() + TimeDelta::seconds(i));
        bruteforce.extend(alerts.into_iter().filter(|a| a.kind == AlertKind::Bruteforce));
        if i == 4 {
            assert_eq!(bruteforce.len(), 1, "fifth failure must raise the alert");
        }
    }
    assert_eq!(bruteforce.len(), 1, "sixth failure must be suppressed");
    assert_eq!(bruteforce[0].count, Some(5));
    assert_eq!(bruteforce[0].username.as_deref(), Some("alice"));
    assert_eq!(bruteforce[0].outcome, Some(Outcome::Failure));

    for i in 70..75 {
        let alerts = engine.process_event_at(&failure, t0() + TimeDelta::seconds(i));
        bruteforce.extend(alerts.into_iter().filter(|a| a.kind == AlertKind::Bruteforce));
    }
    assert_eq!(bruteforce.len(), 2);
    assert_eq!(bruteforce[1].count, Some(5));
}

/// 서로 다른 사용자가 같은 비밀번호로 실패하면 스프레이 알림
#[test]
fn test_password_spray_across_users() {
    let mut engine = DetectionEngine::new(&DetectionConfig::default());

    let first = engine.process_event_at(&auth_event("bob", "Winter2026!", "failure"), t0());
    assert_eq!(kinds_of(&first, AlertKind::PasswordSpraying), 0);

    let second = engine.process_event_at(
        &auth_event("carol", "Winter2026!", "failure"),
        t0() + TimeDelta::seconds(3),
    );
    let spray: Vec<_> = second
        .iter()
        .filter(|a| a.kind == AlertKind::PasswordSpraying)
        .collect();
    assert_eq!(spray.len(), 1);
    assert_eq!(spray[0].count, Some(2));
    assert_eq!(spray[0].common_password.as_deref(), Some("Winter2026!"));
}

/// 같은 사용자가 같은 비밀번호로 반복 실패해도 스프레이가 아님
#[test]
fn test_same_user_repeating_password_is_not_spray() {
    let mut engine = DetectionEngine::new(&DetectionConfig::default());
    let mut spray = 0;
    for i in 0..4 {
        let alerts = engine.process_event_at(
            &auth_event("dave", "hunter2", "failure"),
            t0() + TimeDelta::seconds(i),
        );
        spray += kinds_of(&alerts, AlertKind::PasswordSpraying);
    }
    assert_eq!(spray, 0);
}

/// access 로그의 SQL 인젝션 시도가 주소 기준으로 중복 제거됨
#[test]
fn test_sql_injection_from_access_log() {
    let parser = AccessLogParser::new();
    let line = br#"{"time_local":"19/Oct/2026:12:00:00 +0000","remote_addr":"198.51.100.23","request":"POST /login HTTP/1.1","request_body":"username=admin%27+OR+1%3D1+--&password=x","status":"200"}"#;
    let event = parser.parse(line, t0()).unwrap();

    let mut engine = DetectionEngine::new(&DetectionConfig::default());
    let first = engine.process_event_at(&event, t0());
    let sqli: Vec<_> = first.iter().filter(|a| a.kind == AlertKind::SqlInjection).collect();
    assert_eq!(sqli.len(), 1);
    assert_eq!(sqli[0].source_addr.as_deref(), Some("198.51.100.23"));
    assert_eq!(sqli[0].username.as_deref(), Some("admin' OR 1=1 --"));

    // 쿨다운(5초) 안에서는 억제
    let again = engine.process_event_at(&event, t0() + TimeDelta::seconds(2));
    assert_eq!(kinds_of(&again, AlertKind::SqlInjection), 0);

    let later = engine.process_event_at(&event, t0() + TimeDelta::seconds(6));
    assert_eq!(kinds_of(&later, AlertKind::SqlInjection), 1);
}

/// 알림 순서: 탐지 알림이 먼저, 감사용 alert_login이 마지막
#[test]
fn test_alert_order_within_one_event() {
    let mut engine = DetectionEngine::new(&DetectionConfig::default());
    let event = auth_event("x' OR '1'='1", "pw", "failure");
    let alerts = engine.process_event_at(&event, t0());

    let kinds: Vec<_> = alerts.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AlertKind::SqlInjection, AlertKind::Login]);
}

/// 파일에 기록된 실패 로그가 파이프라인을 거쳐 싱크에 알림으로 남음
#[tokio::test]
async fn test_pipeline_end_to_end_bruteforce() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("auth.log");
    let lines: Vec<_> = (0..5).map(|_| auth_line("alice", "guess", "failure")).collect();
    append(&log, &lines);

    let sink = Arc::new(MemorySink::new());
    let mut pipeline = file_pipeline(&log, StartPosition::Beginning, sink.clone());
    pipeline.start().await.unwrap();

    let found = wait_until(|| !sink.alerts_of(AlertKind::Bruteforce).is_empty()).await;
    pipeline.stop().await.unwrap();
    assert!(found, "bruteforce alert was not recorded");

    let alerts = sink.alerts();
    assert_eq!(kinds_of(&alerts, AlertKind::Bruteforce), 1);
    assert_eq!(kinds_of(&alerts, AlertKind::Login), 5);
    assert_eq!(sink.alerts_of(AlertKind::Bruteforce)[0].count, Some(5));

    let stamps: Vec<_> = alerts.iter().map(|a| a.recorded_at.unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(pipeline.parsed_count(), 5);
}

/// 시작 위치가 End면 기존 내용은 무시하고 이후 추가된 라인만 탐지
#[tokio::test]
async fn test_pipeline_detects_appended_lines_only() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("auth.log");
    append(&log, &[auth_line("old", "pw", "success")]);

    let sink = Arc::new(MemorySink::new());
    let mut pipeline = file_pipeline(&log, StartPosition::End, sink.clone());
    pipeline.start().await.unwrap();

    append(&log, &[auth_line("new", "pw", "success")]);
    let found = wait_until(|| sink.len() == 1).await;
    pipeline.stop().await.unwrap();
    assert!(found);

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].username.as_deref(), Some("new"));
    assert_eq!(alerts[0].outcome, Some(Outcome::Success));
}

/// 파싱 실패 라인은 세기만 하고 처리를 계속함
#[tokio::test]
async fn test_pipeline_counts_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("auth.log");
    append(
        &log,
        &[
            "not json".to_owned(),
            r#"{"status":"failure"}"#.to_owned(),
            auth_line("eve", "pw", "failure"),
        ],
    );

    let sink = Arc::new(MemorySink::new());
    let mut pipeline = file_pipeline(&log, StartPosition::Beginning, sink.clone());
    pipeline.start().await.unwrap();

    let found = wait_until(|| sink.len() == 1).await;
    pipeline.stop().await.unwrap();
    assert!(found);
    assert_eq!(pipeline.parse_error_count(), 2);
    assert_eq!(pipeline.parsed_count(), 1);
}

/// 재시작하면 마지막 위치부터 이어 읽어 같은 라인을 두 번 처리하지 않음
#[tokio::test]
async fn test_pipeline_restart_resumes_position() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("auth.log");
    append(&log, &[auth_line("a", "pw", "success"), auth_line("b", "pw", "success")]);

    let sink = Arc::new(MemorySink::new());
    let mut pipeline = file_pipeline(&log, StartPosition::Beginning, sink.clone());

    pipeline.start().await.unwrap();
    assert!(wait_until(|| sink.len() == 2).await);
    pipeline.stop().await.unwrap();

    append(&log, &[auth_line("c", "pw", "success")]);

    pipeline.start().await.unwrap();
    assert!(wait_until(|| sink.len() == 3).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    pipeline.stop().await.unwrap();

    let users: Vec<_> = sink
        .alerts()
        .iter()
        .filter_map(|a| a.username.clone())
        .collect();
    assert_eq!(users, vec!["a", "b", "c"]);
}

/// 백로그를 처리하는 도중 멈췄다가 다시 시작해도 라인을 잃거나 두 번 처리하지 않음
#[tokio::test]
async fn test_pipeline_stop_mid_backlog_loses_no_lines() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("auth.log");
    let lines: Vec<_> = (0..3000)
        .map(|i| auth_line(&format!("user{i}"), "pw", "success"))
        .collect();
    append(&log, &lines);
    let file_len = std::fs::metadata(&log).unwrap().len();

    let config = PipelineConfigBuilder::new()
        .tailer(TailerConfig {
            channel_capacity: 1,
            ..TailerConfig::default()
        })
        .sources(Vec::new())
        .source(log.display().to_string(), SourceKind::Auth)
        .start_position(StartPosition::Beginning)
        .poll_interval_secs(1)
        .build()
        .unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut pipeline = LogPipelineBuilder::new().config(config).sink(sink).build().unwrap();

    // 첫 배치를 넘기는 도중에 멈춤
    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    pipeline.stop().await.unwrap();

    let first_run = pipeline.engine_stats().unwrap().events_processed;
    let saved = pipeline.tail_state(&log).unwrap().offset;
    assert!(saved <= file_len);
    assert_eq!(first_run, pipeline.parsed_count());

    pipeline.start().await.unwrap();
    assert!(wait_until(|| pipeline.parsed_count() >= 3000).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    pipeline.stop().await.unwrap();

    assert_eq!(pipeline.parsed_count(), 3000);
    assert_eq!(pipeline.engine_stats().unwrap().events_processed, 3000);
    assert_eq!(pipeline.tail_state(&log).unwrap().offset, file_len);
}

/// 탐지기 상태는 재시작 사이에 유지됨 (프로세스 안에서)
#[tokio::test]
async fn test_pipeline_restart_keeps_detector_state() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("auth.log");
    let three: Vec<_> = (0..3).map(|_| auth_line("frank", "pw", "failure")).collect();
    let two: Vec<_> = (0..2).map(|_| auth_line("frank", "pw", "failure")).collect();
    append(&log, &three);

    let sink = Arc::new(MemorySink::new());
    let mut pipeline = file_pipeline(&log, StartPosition::Beginning, sink.clone());

    pipeline.start().await.unwrap();
    assert!(wait_until(|| sink.len() == 3).await);
    pipeline.stop().await.unwrap();

    append(&log, &two);
    pipeline.start().await.unwrap();
    let found = wait_until(|| !sink.alerts_of(AlertKind::Bruteforce).is_empty()).await;
    pipeline.stop().await.unwrap();
    assert!(found);
}

/// JSON lines 싱크에 기록된 알림을 워터마크로 조회
#[tokio::test]
async fn test_pipeline_with_jsonl_sink() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("auth.log");
    append(&log, &[auth_line("g", "pw", "success"), auth_line("h", "pw", "success")]);

    let sink = Arc::new(JsonLinesSink::open(dir.path().join("out/alerts.jsonl")).unwrap());
    let config = PipelineConfigBuilder::new()
        .sources(Vec::new())
        .source(log.display().to_string(), SourceKind::Auth)
        .start_position(StartPosition::Beginning)
        .build()
        .unwrap();
    let mut pipeline = LogPipelineBuilder::new()
        .config(config)
        .sink(sink.clone())
        .build()
        .unwrap();

    pipeline.start().await.unwrap();
    assert!(wait_until(|| pipeline.parsed_count() == 2).await);
    pipeline.stop().await.unwrap();

    let all = sink.read_since(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let watermark = all[0].recorded_at;
    let rest = sink.read_since(watermark).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].username.as_deref(), Some("h"));
    assert_eq!(pipeline.dispatcher_stats().written, 2);
}

/// 헬스 체크 상태 전이
#[tokio::test]
async fn test_pipeline_health_check_states() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("auth.log");
    let sink = Arc::new(MemorySink::new());
    let mut pipeline = file_pipeline(&log, StartPosition::End, sink);

    assert!(pipeline.health_check().await.is_unhealthy());
    pipeline.start().await.unwrap();
    assert!(pipeline.health_check().await.is_healthy());
    pipeline.stop().await.unwrap();
    assert!(pipeline.health_check().await.is_unhealthy());
}
