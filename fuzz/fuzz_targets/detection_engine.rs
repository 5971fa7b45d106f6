#![no_main]

use arbitrary::Arbitrary;
use chrono::{DateTime, TimeDelta, Utc};
use libfuzzer_sys::fuzz_target;

use authwatch_core::config::DetectionConfig;
use authwatch_core::types::{AccessLogin, AuthLogin, LoginEvent};
use authwatch_log_pipeline::DetectionEngine;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzEvent {
    access: bool,
    /// 직전 이벤트와의 시각 차이 (초, 음수면 시계 역행)
    delta_secs: i16,
    source_addr: String,
    status: String,
    username: String,
    password: Option<String>,
    /// 이 이벤트 뒤에 정리(sweep) 실행 여부
    sweep: bool,
}

fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_792_411_200, 0).unwrap_or_default()
}

fuzz_target!(|events: Vec<FuzzEvent>| {
    let mut engine = DetectionEngine::new(&DetectionConfig::default());
    let mut now = base_time();

    // 이벤트 수 제한 (성능)
    for input in events.into_iter().take(256) {
        now += TimeDelta::seconds(i64::from(input.delta_secs));
        let event = if input.access {
            LoginEvent::Access(AccessLogin {
                time_local: String::new(),
                timestamp: now,
                source_addr: input.source_addr,
                request: "POST /login HTTP/1.1".to_owned(),
                status: input.status,
                username: input.username,
                password: input.password,
            })
        } else {
            LoginEvent::Auth(AuthLogin {
                time_local: String::new(),
                timestamp: now,
                level: "INFO".to_owned(),
                status: input.status,
                username: input.username,
                password: input.password,
            })
        };

        // 어떤 입력 순서에도 패닉 없이 처리되어야 함
        let _ = engine.process_event_at(&event, now);
        if input.sweep {
            engine.sweep(now);
        }
    }
});
