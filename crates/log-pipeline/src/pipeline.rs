//! 파이프라인 오케스트레이션 -- 테일링/파싱/탐지/알림 기록의 전체 흐름을 관리합니다.
//!
//! [`LogPipeline`]은 core의 [`Pipeline`](authwatch_core::pipeline::Pipeline) trait을 구현하여
//! `authwatch-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! FileTailer (소스당 태스크 1개) -> parse -> mpsc -> engine 태스크 -> AlertDispatcher -> AlertSink
//! ```
//!
//! 탐지기 상태는 engine 태스크 하나만 소유하므로 모든 변경이 순차적으로 일어납니다.
//! 테일러는 엔진 채널이 가득 차면 기다립니다 (back-pressure).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use authwatch_core::error::AuthwatchError;
use authwatch_core::metrics as m;
use authwatch_core::pipeline::{AlertSink, HealthStatus, Pipeline};
use authwatch_core::types::LoginEvent;

use crate::collector::{FileTailer, LineHandler, RawLog, TailState, TailerOptions};
use crate::config::PipelineConfig;
use crate::engine::{DetectionEngine, EngineStats};
use crate::error::LogPipelineError;
use crate::parser::ParserRouter;
use crate::sink::{AlertDispatcher, AlertSender, DispatcherOptions, DispatcherStats, build_sink};

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    lines_parsed: AtomicU64,
    parse_errors: AtomicU64,
}

/// 로그 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use authwatch_log_pipeline::{LogPipeline, LogPipelineBuilder, MemorySink};
///
/// let sink = Arc::new(MemorySink::new());
/// let mut pipeline = LogPipelineBuilder::new()
///     .config(config)
///     .sink(sink.clone())
///     .build()?;
///
/// pipeline.start().await?;
/// // ...
/// pipeline.stop().await?;
/// ```
pub struct LogPipeline {
    /// 파이프라인 설정
    config: PipelineConfig,
    /// 현재 상태
    state: PipelineState,
    /// 파서 라우터 (테일러 태스크들이 공유)
    parser: Arc<ParserRouter>,
    /// 알림 싱크
    sink: Arc<dyn AlertSink>,
    /// 정지 상태에서 보관하는 엔진. 실행 중에는 engine 태스크가 소유합니다.
    engine: Option<DetectionEngine>,
    /// 마지막으로 정지할 때의 테일러 위치 (재시작 시 이어 읽기)
    tail_states: HashMap<PathBuf, TailState>,
    /// 실행 중 태스크 취소 토큰
    cancel: CancellationToken,
    /// 테일러 태스크 핸들
    tailer_tasks: Vec<JoinHandle<TailState>>,
    /// engine 태스크 핸들
    engine_task: Option<JoinHandle<DetectionEngine>>,
    /// 알림 디스패처
    dispatcher: Option<AlertDispatcher>,
    /// 마지막으로 닫힌 디스패처의 통계
    last_dispatch_stats: DispatcherStats,
    /// 파싱 카운터
    counters: Arc<PipelineCounters>,
}

impl LogPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 파싱에 성공한 라인 수
    pub fn parsed_count(&self) -> u64 {
        self.counters.lines_parsed.load(Ordering::Relaxed)
    }

    /// 파싱에 실패한 라인 수
    pub fn parse_error_count(&self) -> u64 {
        self.counters.parse_errors.load(Ordering::Relaxed)
    }

    /// 감시 중인 소스 수
    pub fn source_count(&self) -> usize {
        self.config.tailer.sources.len()
    }

    /// 엔진 통계. 실행 중에는 engine 태스크가 엔진을 소유하므로 `None`입니다.
    pub fn engine_stats(&self) -> Option<EngineStats> {
        self.engine.as_ref().map(DetectionEngine::stats)
    }

    /// 디스패처 통계. 실행 중이면 현재 값, 아니면 마지막 실행의 값입니다.
    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher
            .as_ref()
            .map_or(self.last_dispatch_stats, AlertDispatcher::stats)
    }

    /// 마지막으로 정지할 때 저장한 파일 위치
    pub fn tail_state(&self, path: impl AsRef<Path>) -> Option<&TailState> {
        self.tail_states.get(path.as_ref())
    }

    /// 알림 싱크
    pub fn sink(&self) -> Arc<dyn AlertSink> {
        Arc::clone(&self.sink)
    }
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), AuthwatchError> {
        if self.state == PipelineState::Running {
            return Err(authwatch_core::error::PipelineError::AlreadyRunning.into());
        }

        info!(sources = self.config.tailer.sources.len(), sink = self.sink.name(), "starting log pipeline");

        // 취소된 토큰은 되돌릴 수 없으므로 실행마다 새로 만듭니다
        self.cancel = CancellationToken::new();

        // 1. 알림 디스패처
        let dispatcher = AlertDispatcher::spawn(
            Arc::clone(&self.sink),
            DispatcherOptions::from_config(&self.config.sink),
        );
        let alerts = dispatcher.sender();
        self.dispatcher = Some(dispatcher);

        // 2. 테일러 태스크
        let (event_tx, event_rx) = mpsc::channel(self.config.tailer.channel_capacity.max(1));
        let options = TailerOptions::from_config(&self.config.tailer);

        for source in &self.config.tailer.sources {
            let path = PathBuf::from(&source.path);
            let tailer = match self.tail_states.remove(&path) {
                Some(state) => FileTailer::resume(state, source.format, options.clone()),
                None => FileTailer::open(path, source.format, options.clone()).await,
            };

            let handler = ParsingHandler {
                parser: Arc::clone(&self.parser),
                events: event_tx.clone(),
                counters: Arc::clone(&self.counters),
            };
            self.tailer_tasks
                .push(tokio::spawn(tailer.watch(handler, self.cancel.clone())));
        }
        drop(event_tx);

        // 3. engine 태스크
        let engine = self
            .engine
            .take()
            .unwrap_or_else(|| DetectionEngine::new(&self.config.detection));
        info!(detectors = ?engine.detector_names(), "detection engine ready");

        self.engine_task = Some(tokio::spawn(run_engine(
            engine,
            event_rx,
            alerts,
            self.config.detection.sweep_interval(),
            self.cancel.clone(),
        )));

        self.state = PipelineState::Running;
        info!("log pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AuthwatchError> {
        if self.state != PipelineState::Running {
            return Err(authwatch_core::error::PipelineError::NotRunning.into());
        }

        info!("stopping log pipeline");

        // 1. 테일러와 엔진에 취소 신호
        self.cancel.cancel();

        // 2. 테일러 종료 대기, 위치 보관
        for task in self.tailer_tasks.drain(..) {
            match task.await {
                Ok(state) => {
                    self.tail_states.insert(state.path.clone(), state);
                }
                Err(e) => error!(error = %e, "tailer task failed"),
            }
        }

        // 3. 엔진 종료 대기 (채널에 남은 이벤트 처리 후 반환)
        if let Some(task) = self.engine_task.take() {
            match task.await {
                Ok(engine) => self.engine = Some(engine),
                Err(e) => {
                    error!(error = %e, "engine task failed, detector state is lost");
                    self.engine = Some(DetectionEngine::new(&self.config.detection));
                }
            }
        }

        // 4. 남은 알림 기록
        if let Some(dispatcher) = self.dispatcher.take() {
            self.last_dispatch_stats = dispatcher.close().await;
        }

        self.state = PipelineState::Stopped;
        info!(
            parsed = self.parsed_count(),
            parse_errors = self.parse_error_count(),
            "log pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                if self.engine_task.as_ref().is_none_or(JoinHandle::is_finished) {
                    return HealthStatus::Unhealthy("engine task stopped".to_owned());
                }
                if !self.dispatcher.as_ref().is_some_and(AlertDispatcher::is_running) {
                    return HealthStatus::Unhealthy("alert writer stopped".to_owned());
                }

                let stopped = self.tailer_tasks.iter().filter(|t| t.is_finished()).count();
                if stopped > 0 {
                    return HealthStatus::Degraded(format!(
                        "{stopped} of {} tailer task(s) stopped",
                        self.tailer_tasks.len()
                    ));
                }

                let stats = self.dispatcher_stats();
                if stats.dropped > 0 || stats.failed > 0 {
                    HealthStatus::Degraded(format!(
                        "alerts lost: {} dropped, {} failed",
                        stats.dropped, stats.failed
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 테일러가 읽은 라인을 파싱해 엔진 채널로 넘기는 핸들러
struct ParsingHandler {
    parser: Arc<ParserRouter>,
    events: mpsc::Sender<LoginEvent>,
    counters: Arc<PipelineCounters>,
}

impl LineHandler for ParsingHandler {
    async fn handle(&mut self, line: RawLog) -> bool {
        let label = line.format.as_str();
        match self.parser.parse_source(line.format, &line.data, line.received_at) {
            Ok(event) => {
                // 전달되지 못한 라인은 재개 후 다시 파싱되므로 전달된 것만 셉니다
                if self.events.send(event).await.is_ok() {
                    self.counters.lines_parsed.fetch_add(1, Ordering::Relaxed);
                    counter!(m::PARSER_EVENTS_TOTAL, m::LABEL_SOURCE => label).increment(1);
                    return true;
                }
                let err = LogPipelineError::Channel("engine channel closed".to_owned());
                debug!(source = %line.source, error = %err, "stopping tailer");
                false
            }
            Err(e) => {
                self.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
                counter!(m::PARSER_ERRORS_TOTAL, m::LABEL_SOURCE => label).increment(1);
                debug!(source = %line.source, format = label, error = %e, "skipping unparseable line");
                true
            }
        }
    }
}

/// 엔진 태스크 본체
///
/// 취소되면 채널을 닫고 이미 들어온 이벤트까지 처리한 뒤 엔진을 돌려줍니다.
async fn run_engine(
    mut engine: DetectionEngine,
    mut events: mpsc::Receiver<LoginEvent>,
    alerts: AlertSender,
    sweep_interval: Duration,
    cancel: CancellationToken,
) -> DetectionEngine {
    let mut sweep = tokio::time::interval(sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 첫 tick은 즉시 완료됨
    sweep.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = events.recv() => match received {
                Some(event) => forward(&mut engine, &event, &alerts),
                None => {
                    warn!("all tailers stopped, engine exiting");
                    break;
                }
            },
            _ = sweep.tick() => {
                let removed = engine.sweep(Utc::now());
                debug!(removed, tracked = engine.tracked_keys(), "periodic sweep");
            }
        }
    }

    events.close();
    let mut drained = 0usize;
    while let Some(event) = events.recv().await {
        forward(&mut engine, &event, &alerts);
        drained += 1;
    }

    let stats = engine.stats();
    info!(
        drained,
        events_processed = stats.events_processed,
        alerts_emitted = stats.alerts_emitted,
        "detection engine stopped"
    );
    engine
}

fn forward(engine: &mut DetectionEngine, event: &LoginEvent, alerts: &AlertSender) {
    for alert in engine.process_event(event) {
        alerts.dispatch(alert);
    }
}

/// 로그 파이프라인 빌더
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    sink: Option<Arc<dyn AlertSink>>,
    parser: Option<ParserRouter>,
}

impl LogPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            sink: None,
            parser: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 알림 싱크를 지정합니다.
    ///
    /// 지정하지 않으면 `config.sink`에 따라 싱크를 생성합니다.
    pub fn sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 파서 라우터를 지정합니다. 기본값은 [`ParserRouter::with_defaults`]입니다.
    pub fn parser(mut self, parser: ParserRouter) -> Self {
        self.parser = Some(parser);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<LogPipeline, LogPipelineError> {
        self.config.validate()?;

        let sink = match self.sink {
            Some(sink) => sink,
            None => build_sink(&self.config.sink)?,
        };

        let engine = DetectionEngine::new(&self.config.detection);

        Ok(LogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            parser: Arc::new(self.parser.unwrap_or_default()),
            sink,
            engine: Some(engine),
            tail_states: HashMap::new(),
            cancel: CancellationToken::new(),
            tailer_tasks: Vec::new(),
            engine_task: None,
            dispatcher: None,
            last_dispatch_stats: DispatcherStats::default(),
            counters: Arc::new(PipelineCounters::default()),
        })
    }
}

impl Default for LogPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
