//! Daemon orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `authwatch-daemon`.
//! It loads configuration, installs the metrics recorder, builds the alert
//! sink and the log pipeline, and drives startup and graceful shutdown.
//!
//! # Shutdown Order
//!
//! 1. Background tasks (uptime updater) receive the shutdown broadcast
//! 2. Log pipeline stops: tailers first, then the engine drains its queue,
//!    then the alert dispatcher flushes everything still queued to the sink

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use authwatch_core::config::AuthwatchConfig;
use authwatch_core::pipeline::{AlertSink, HealthStatus, Pipeline};
use authwatch_log_pipeline::{LogPipeline, LogPipelineBuilder, PipelineConfig};

use crate::health::{DaemonHealth, ModuleHealth, PipelineCounters, aggregate_status};
use crate::metrics_server;

/// How often the main loop re-evaluates daemon health.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// How often the uptime gauge is refreshed.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
///
/// Owns the configuration and the log pipeline, and manages the
/// complete lifecycle: ordered startup, health monitoring, and
/// graceful shutdown.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: AuthwatchConfig,
    /// The tail -> parse -> detect -> sink pipeline.
    pipeline: LogPipeline,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// Loads `authwatch.toml`, applies `AUTHWATCH_*` environment overrides,
    /// validates, then delegates to [`Orchestrator::build_from_config`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - The sink or the pipeline fails to initialize
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = AuthwatchConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    ///
    /// The alert sink is created from the `[sink]` section.
    pub fn build_from_config(config: AuthwatchConfig) -> Result<Self> {
        Self::assemble(config, None)
    }

    /// Build with an externally supplied alert sink, ignoring `[sink].kind`.
    ///
    /// Useful for embedding the daemon or inspecting alerts in tests.
    pub fn build_with_sink(config: AuthwatchConfig, sink: Arc<dyn AlertSink>) -> Result<Self> {
        Self::assemble(config, Some(sink))
    }

    fn assemble(config: AuthwatchConfig, sink: Option<Arc<dyn AlertSink>>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before any component records a metric
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        tracing::info!(
            sources = config.tailer.sources.len(),
            sink = ?config.sink.kind,
            "initializing log pipeline"
        );

        let mut builder =
            LogPipelineBuilder::new().config(PipelineConfig::from_core(&config));
        if let Some(sink) = sink {
            builder = builder.sink(sink);
        }
        let pipeline = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build log pipeline: {}", e))?;

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::info!(
            sources = pipeline.source_count(),
            sink = pipeline.sink().name(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            pipeline,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the pipeline and run until SIGTERM or SIGINT.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        let signal = shutdown_signal()?;
        self.run_until(signal).await
    }

    /// Start the pipeline and run until `shutdown` resolves.
    ///
    /// The future's output names the trigger in the shutdown log line.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = &'static str>,
    {
        tracing::info!("starting log pipeline");
        if let Err(e) = self.pipeline.start().await {
            tracing::error!(error = %e, "log pipeline failed to start");
            return Err(e.into());
        }

        let uptime_updater_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("entering main event loop");
        let signal = self.monitor_until(shutdown).await;
        tracing::info!(signal = signal, "shutdown signal received");

        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());

        if let Some(task) = uptime_updater_task {
            let _ = task.await;
        }

        self.shutdown().await
    }

    /// Periodically evaluate health until `shutdown` resolves.
    ///
    /// Logs only on status transitions.
    async fn monitor_until<F>(&self, shutdown: F) -> &'static str
    where
        F: Future<Output = &'static str>,
    {
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately
        interval.tick().await;

        let mut last = HealthStatus::Healthy;
        loop {
            tokio::select! {
                signal = &mut shutdown => return signal,
                _ = interval.tick() => {
                    let health = self.health().await;
                    if health.status != last {
                        log_health_transition(&health);
                        last = health.status;
                    }
                }
            }
        }
    }

    /// Stop the pipeline and report final counters.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping log pipeline");
        self.pipeline.stop().await?;

        let counters = self.counters();
        tracing::info!(
            parsed = counters.parsed,
            parse_errors = counters.parse_errors,
            alerts_written = counters.alerts_written,
            alerts_failed = counters.alerts_failed,
            alerts_dropped = counters.alerts_dropped,
            uptime_secs = self.start_time.elapsed().as_secs(),
            "authwatch-daemon shut down"
        );
        Ok(())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules = vec![
            ModuleHealth {
                name: "log-pipeline".to_owned(),
                enabled: true,
                status: self.pipeline.health_check().await,
            },
            ModuleHealth {
                name: "metrics-endpoint".to_owned(),
                enabled: self.config.metrics.enabled,
                status: HealthStatus::Healthy,
            },
        ];

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            use authwatch_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs,
            modules,
            counters: self.counters(),
        }
    }

    /// Snapshot of the pipeline counters.
    pub fn counters(&self) -> PipelineCounters {
        let dispatch = self.pipeline.dispatcher_stats();
        PipelineCounters {
            parsed: self.pipeline.parsed_count(),
            parse_errors: self.pipeline.parse_error_count(),
            alerts_written: dispatch.written,
            alerts_failed: dispatch.failed,
            alerts_dropped: dispatch.dropped,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &AuthwatchConfig {
        &self.config
    }

    /// Get a reference to the log pipeline.
    pub fn pipeline(&self) -> &LogPipeline {
        &self.pipeline
    }
}

fn log_health_transition(health: &DaemonHealth) {
    match &health.status {
        HealthStatus::Healthy => tracing::info!(
            uptime_secs = health.uptime_secs,
            "daemon health recovered"
        ),
        HealthStatus::Degraded(reason) => tracing::warn!(
            reason = %reason,
            alerts_dropped = health.counters.alerts_dropped,
            alerts_failed = health.counters.alerts_failed,
            "daemon health degraded"
        ),
        HealthStatus::Unhealthy(reason) => tracing::error!(
            reason = %reason,
            "daemon unhealthy"
        ),
    }
}

/// Install SIGTERM and SIGINT handlers.
///
/// The returned future resolves with the name of the first signal received.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    use authwatch_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use authwatch_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
