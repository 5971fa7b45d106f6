#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`collector`]: 로그 파일 테일러 (`tail -F` 방식, 잘림/로테이션 감지)
//! - [`parser`]: access 로그 / 인증 로그 파서와 형식 라우터
//! - [`rule`]: 무차별 대입, 패스워드 스프레이, SQL 인젝션 탐지기
//! - [`engine`]: 탐지기 실행 순서와 주기적 정리를 담당하는 탐지 엔진
//! - [`sink`]: 알림 디스패처와 JSON lines / 인메모리 싱크
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! FileTailer x N -> ParserRouter -> mpsc -> DetectionEngine -> AlertDispatcher -> AlertSink
//!      |                |                        |                    |
//!  notify + poll   access/auth            SQLi/Brute/Spray     JSONL / memory
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;

pub mod collector;
pub mod parser;
pub mod rule;
pub mod sink;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{LogPipeline, LogPipelineBuilder};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 파서
pub use parser::{AccessLogParser, AuthLogParser, ParserRouter};

// 탐지기와 엔진
pub use engine::{DetectionEngine, EngineStats};
pub use rule::{BruteforceDetector, PasswordSprayDetector, SqlInjectionDetector};

// 수집기
pub use collector::{FileTailer, RawLog, TailState, TailerOptions};

// 싱크
pub use sink::{AlertDispatcher, AlertSender, JsonLinesSink, MemorySink};
