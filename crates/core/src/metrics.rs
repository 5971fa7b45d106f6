//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `authwatch_`
//! - 컴포넌트: `tailer_`, `parser_`, `engine_`, `detector_`, `sink_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(authwatch_core::metrics::TAILER_LINES_READ_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 로그 소스 레이블 키 (access, auth)
pub const LABEL_SOURCE: &str = "source";

/// 알림 종류 레이블 키 (alert_login, bruteforce, password_spraying, sql_injection)
pub const LABEL_KIND: &str = "kind";

/// 탐지기 이름 레이블 키
pub const LABEL_DETECTOR: &str = "detector";

/// 싱크 이름 레이블 키 (jsonl, memory)
pub const LABEL_SINK: &str = "sink";

// ─── Tailer 메트릭 ─────────────────────────────────────────────────

/// Tailer: 읽은 전체 라인 수 (counter, label: source)
pub const TAILER_LINES_READ_TOTAL: &str = "authwatch_tailer_lines_read_total";

/// Tailer: 최대 길이 초과로 버린 라인 수 (counter, label: source)
pub const TAILER_LINES_DROPPED_TOTAL: &str = "authwatch_tailer_lines_dropped_total";

/// Tailer: 파일 잘림(로테이션) 감지 횟수 (counter, label: source)
pub const TAILER_TRUNCATIONS_TOTAL: &str = "authwatch_tailer_truncations_total";

/// Tailer: I/O 에러/타임아웃 횟수 (counter, label: source)
pub const TAILER_IO_ERRORS_TOTAL: &str = "authwatch_tailer_io_errors_total";

// ─── Parser 메트릭 ─────────────────────────────────────────────────

/// Parser: 파싱된 이벤트 수 (counter, label: source)
pub const PARSER_EVENTS_TOTAL: &str = "authwatch_parser_events_total";

/// Parser: 파싱 실패 수 (counter, label: source)
pub const PARSER_ERRORS_TOTAL: &str = "authwatch_parser_errors_total";

// ─── Engine / Detector 메트릭 ──────────────────────────────────────

/// Engine: 처리한 이벤트 수 (counter)
pub const ENGINE_EVENTS_PROCESSED_TOTAL: &str = "authwatch_engine_events_processed_total";

/// Engine: 로그인 이벤트가 아니어서 건너뛴 이벤트 수 (counter)
pub const ENGINE_EVENTS_SKIPPED_TOTAL: &str = "authwatch_engine_events_skipped_total";

/// Engine: 이벤트 하나 처리 지연 시간 (histogram, 초)
pub const ENGINE_PROCESSING_DURATION_SECONDS: &str =
    "authwatch_engine_processing_duration_seconds";

/// Detector: 생성된 알림 수 (counter, label: kind)
pub const DETECTOR_ALERTS_TOTAL: &str = "authwatch_detector_alerts_total";

/// Detector: 추적 중인 키 수 (gauge, label: detector)
pub const DETECTOR_TRACKED_KEYS: &str = "authwatch_detector_tracked_keys";

/// Detector: 정리(sweep)로 제거된 키 수 (counter)
pub const DETECTOR_KEYS_SWEPT_TOTAL: &str = "authwatch_detector_keys_swept_total";

// ─── Sink 메트릭 ───────────────────────────────────────────────────

/// Sink: 기록된 알림 수 (counter, label: sink)
pub const SINK_ALERTS_WRITTEN_TOTAL: &str = "authwatch_sink_alerts_written_total";

/// Sink: 기록 실패/타임아웃 수 (counter, label: sink)
pub const SINK_WRITE_FAILURES_TOTAL: &str = "authwatch_sink_write_failures_total";

/// Sink: 큐가 가득 차 버린 알림 수 (counter)
pub const SINK_ALERTS_DROPPED_TOTAL: &str = "authwatch_sink_alerts_dropped_total";

/// Sink: 큐에 대기 중인 알림 수 (gauge)
pub const SINK_QUEUE_DEPTH: &str = "authwatch_sink_queue_depth";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "authwatch_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version)
pub const DAEMON_BUILD_INFO: &str = "authwatch_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 이벤트 처리 지연 시간 히스토그램 버킷 (초)
///
/// 10us ~ 100ms 범위. 탐지기는 메모리 맵 조회만 수행합니다.
pub const PROCESSING_DURATION_BUCKETS: [f64; 8] =
    [0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `authwatch-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Tailer
    describe_counter!(
        TAILER_LINES_READ_TOTAL,
        "Total number of complete lines read from tailed files"
    );
    describe_counter!(
        TAILER_LINES_DROPPED_TOTAL,
        "Total number of lines dropped for exceeding the maximum line length"
    );
    describe_counter!(
        TAILER_TRUNCATIONS_TOTAL,
        "Total number of file truncations or rotations detected"
    );
    describe_counter!(
        TAILER_IO_ERRORS_TOTAL,
        "Total number of stat/open/read failures or timeouts"
    );

    // Parser
    describe_counter!(PARSER_EVENTS_TOTAL, "Total number of lines parsed into events");
    describe_counter!(PARSER_ERRORS_TOTAL, "Total number of malformed lines skipped");

    // Engine / Detector
    describe_counter!(
        ENGINE_EVENTS_PROCESSED_TOTAL,
        "Total number of login events run through the detectors"
    );
    describe_counter!(
        ENGINE_EVENTS_SKIPPED_TOTAL,
        "Total number of parsed events ignored because they are not logins"
    );
    describe_histogram!(
        ENGINE_PROCESSING_DURATION_SECONDS,
        "Time to run one event through all detectors in seconds"
    );
    describe_counter!(DETECTOR_ALERTS_TOTAL, "Total number of alerts produced by kind");
    describe_gauge!(
        DETECTOR_TRACKED_KEYS,
        "Number of keys currently held in detector state"
    );
    describe_counter!(
        DETECTOR_KEYS_SWEPT_TOTAL,
        "Total number of stale detector keys removed by sweeps"
    );

    // Sink
    describe_counter!(SINK_ALERTS_WRITTEN_TOTAL, "Total number of alerts persisted");
    describe_counter!(
        SINK_WRITE_FAILURES_TOTAL,
        "Total number of alert writes that failed or timed out"
    );
    describe_counter!(
        SINK_ALERTS_DROPPED_TOTAL,
        "Total number of alerts dropped because the dispatch queue was full"
    );
    describe_gauge!(SINK_QUEUE_DEPTH, "Number of alerts waiting in the dispatch queue");

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "authwatch daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1, with version label)");
}
