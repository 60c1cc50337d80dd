//! Async drivers used by the binary
//!
//! Both run until playback ends on its own or `shutdown` resolves.

use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::playback::engine::DEFAULT_GRACE;
use crate::playback::{PlaybackEngine, PollSession};
use crate::sink::IngestSink;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// How often the push driver checks whether the engine has finished
const FINISH_CHECK: Duration = Duration::from_millis(100);

/// Run the producer/consumer engine
pub async fn run_push<F>(config: PlaybackConfig, sink: Arc<dyn IngestSink>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut engine = PlaybackEngine::start(config, sink)?;
    let mut check = tokio::time::interval(FINISH_CHECK);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = check.tick() => {
                if engine.is_finished() {
                    break;
                }
            }
        }
    }

    // joining the workers blocks
    match tokio::task::spawn_blocking(move || engine.shutdown(DEFAULT_GRACE)).await {
        Ok(Some(err)) => Err(err),
        Ok(None) => Ok(()),
        Err(e) => {
            error!(error = %e, "engine shutdown task failed");
            Ok(())
        }
    }
}

/// Poll one payload per sample period
pub async fn run_poll<F>(config: PlaybackConfig, sink: Arc<dyn IngestSink>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut session = PollSession::open(&config)?;
    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break Ok(());
            }
            _ = ticker.tick() => {
                match session.poll() {
                    Ok(Some(payload)) => sink.ingest(payload),
                    Ok(None) if session.is_finished() => {
                        info!("playback finished");
                        break Ok(());
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "playback failed");
                        break Err(e);
                    }
                }
            }
        }
    };
    session.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;
    use crate::error::PlaybackError;
    use crate::sink::MemorySink;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(dir: &Path, overrides: RawConfig) -> PlaybackConfig {
        PlaybackConfig::from_raw(&RawConfig {
            csv_directory: dir.display().to_string(),
            csv_filename: "run".to_string(),
            locator_poll_ms: 20,
            ..overrides
        })
        .unwrap()
    }

    fn fast() -> RawConfig {
        RawConfig {
            sample_rate: 20,
            burst_interval: 100,
            ..RawConfig::default()
        }
    }

    #[tokio::test]
    async fn test_push_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("run.csv"), "x\n1\n2\n3\n").unwrap();
        let sink = Arc::new(MemorySink::new());

        run_push(config(dir.path(), fast()), sink.clone(), std::future::pending())
            .await
            .unwrap();
        assert_eq!(sink.reading_count(), 3);
        assert_eq!(sink.payloads().len(), 2);
    }

    #[tokio::test]
    async fn test_push_reports_terminal_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("run.csv"), "").unwrap();
        let result = run_push(
            config(dir.path(), fast()),
            Arc::new(MemorySink::new()),
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(PlaybackError::Decode(_))));
    }

    #[tokio::test]
    async fn test_push_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        run_push(config(dir.path(), fast()), Arc::new(MemorySink::new()), shutdown)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_poll_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("run.csv"), "x\n1\n2\n3\n").unwrap();
        let sink = Arc::new(MemorySink::new());
        let config = config(
            dir.path(),
            RawConfig {
                ingest_mode: "continuous".to_string(),
                sample_rate: 100,
                ..RawConfig::default()
            },
        );

        run_poll(config, sink.clone(), std::future::pending()).await.unwrap();
        assert_eq!(sink.payloads().len(), 3);
    }
}
