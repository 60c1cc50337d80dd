use crate::config::PlaybackConfig;
use crate::core::{Chunk, StopSignal};
use crate::error::{PlaybackError, Result};
use crate::playback::assembler::ReadingAssembler;
use crate::playback::lifecycle::Disposition;
use crate::playback::queue::{BoundedQueue, Pop};
use crate::playback::reader::{Advance, Reader};
use crate::playback::PlaybackState;
use crate::sink::IngestSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long each worker gets to exit on shutdown
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Producer back-off while no file is available
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Readings between throughput log lines
const THROUGHPUT_EVERY: u64 = 10_000;

/// Counters updated by the workers
#[derive(Debug, Default)]
pub struct EngineStats {
    pub chunks_queued: AtomicU64,
    pub chunks_emitted: AtomicU64,
    pub payloads_emitted: AtomicU64,
    pub readings_emitted: AtomicU64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_queued: self.chunks_queued.load(Ordering::SeqCst),
            chunks_emitted: self.chunks_emitted.load(Ordering::SeqCst),
            payloads_emitted: self.payloads_emitted.load(Ordering::SeqCst),
            readings_emitted: self.readings_emitted.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub chunks_queued: u64,
    pub chunks_emitted: u64,
    pub payloads_emitted: u64,
    pub readings_emitted: u64,
}

/// State shared between the engine handle and its workers
struct Shared {
    state: Mutex<PlaybackState>,
    /// First fatal error; later ones are only logged
    error: Mutex<Option<PlaybackError>>,
    stats: EngineStats,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(PlaybackState::Locating),
            error: Mutex::new(None),
            stats: EngineStats::default(),
        }
    }

    fn set_state(&self, state: PlaybackState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, err: PlaybackError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take_error(&self) -> Option<PlaybackError> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Push-mode playback: a producer decodes ahead into a bounded queue and a
/// consumer paces the chunks out to the sink
///
/// Reconfiguring means shutting one engine down and starting another.
pub struct PlaybackEngine {
    config: PlaybackConfig,
    stop: Arc<StopSignal>,
    queue: Arc<BoundedQueue<Chunk>>,
    shared: Arc<Shared>,
    producer: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Start locating, decoding and emitting
    ///
    /// A missing data directory is reported here and nothing is started.
    pub fn start(config: PlaybackConfig, sink: Arc<dyn IngestSink>) -> Result<Self> {
        let stop = Arc::new(StopSignal::new());
        let reader = Reader::start(&config, stop.clone())?;
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let shared = Arc::new(Shared::new());

        let producer = {
            let queue = queue.clone();
            let stop = stop.clone();
            let shared = shared.clone();
            spawn_worker("playback-producer", move || {
                run_producer(reader, &queue, &stop, &shared)
            })
        };
        let producer = match producer {
            Ok(handle) => handle,
            Err(e) => {
                stop.trigger();
                return Err(e);
            }
        };

        let consumer = {
            let queue = queue.clone();
            let stop = stop.clone();
            let shared = shared.clone();
            let assembler = ReadingAssembler::new(&config);
            let config = config.clone();
            spawn_worker("playback-consumer", move || {
                run_consumer(&config, assembler, sink, &queue, &stop, &shared)
            })
        };
        let consumer = match consumer {
            Ok(handle) => handle,
            Err(e) => {
                stop.trigger();
                queue.stop();
                return Err(e);
            }
        };

        info!(
            asset = %config.asset_name,
            chunk_size = config.chunk_size,
            period = ?config.period,
            "playback started"
        );
        Ok(Self {
            config,
            stop,
            queue,
            shared,
            producer: Some(producer),
            consumer: Some(consumer),
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Chunks decoded but not yet emitted
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Both workers have exited
    pub fn is_finished(&self) -> bool {
        [&self.producer, &self.consumer]
            .iter()
            .all(|handle| handle.as_ref().map_or(true, JoinHandle::is_finished))
    }

    /// Wait up to `timeout` for playback to end on its own
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// The error that ended playback, if any
    pub fn take_error(&mut self) -> Option<PlaybackError> {
        self.shared.take_error()
    }

    /// Stop both workers, waiting at most `grace` for each
    ///
    /// Returns the error that ended playback, if there was one.
    pub fn shutdown(&mut self, grace: Duration) -> Option<PlaybackError> {
        self.stop.trigger();
        self.queue.stop();

        for (name, handle) in [
            ("producer", self.producer.take()),
            ("consumer", self.consumer.take()),
        ] {
            if let Some(handle) = handle {
                join_within(name, handle, grace);
            }
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(chunks = dropped, "dropped undelivered chunks");
        }
        self.shared.set_state(PlaybackState::Stopped);
        info!(stats = ?self.stats(), "playback shut down");
        self.shared.take_error()
    }

    /// Replace this engine with one running `config`
    pub fn reconfigure(mut self, config: PlaybackConfig, sink: Arc<dyn IngestSink>) -> Result<Self> {
        if let Some(err) = self.shutdown(DEFAULT_GRACE) {
            warn!(error = %err, "previous playback had failed");
        }
        Self::start(config, sink)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if self.producer.is_some() || self.consumer.is_some() {
            self.shutdown(DEFAULT_GRACE);
        }
    }
}

fn spawn_worker<F>(name: &'static str, work: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
        .map_err(|source| PlaybackError::Spawn { name, source })
}

/// Join `handle` if it exits within `grace`, otherwise leave it detached
fn join_within(name: &str, handle: JoinHandle<()>, grace: Duration) {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if !handle.is_finished() {
        warn!(worker = name, "worker did not exit within grace period");
        return;
    }
    if handle.join().is_err() {
        error!(worker = name, "worker panicked");
    }
}

fn run_producer(mut reader: Reader, queue: &BoundedQueue<Chunk>, stop: &StopSignal, shared: &Shared) {
    while !stop.is_set() {
        let step = reader.advance().and_then(|advance| match advance {
            Advance::Exhausted(path) => {
                shared.set_state(PlaybackState::Draining);
                if reader.lifecycle().post_processes() {
                    // the file must not move before its rows were emitted
                    queue.wait_drained();
                    if stop.is_set() {
                        return Ok(Advance::Finished);
                    }
                }
                debug!(path = %path.display(), "finishing file");
                match reader.finish_file()? {
                    Disposition::Stop => Ok(Advance::Finished),
                    _ => Ok(Advance::Pending),
                }
            }
            other => Ok(other),
        });

        match step {
            Ok(Advance::Chunk(chunk)) => {
                shared.set_state(PlaybackState::Decoding);
                if queue.push(chunk).is_err() {
                    break;
                }
                shared.stats.chunks_queued.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Advance::Pending) => {
                shared.set_state(reader.state());
                if reader.state() == PlaybackState::Locating && stop.wait_timeout(RETRY_INTERVAL) {
                    break;
                }
            }
            Ok(Advance::Exhausted(_)) => {}
            Ok(Advance::Finished) => {
                queue.finish();
                break;
            }
            Err(PlaybackError::Decode(e)) if e.is_data_quality() => {
                error!(error = %e, "data quality check failed, stopping playback");
                shared.fail(e.into());
                stop.trigger();
                queue.stop();
                break;
            }
            Err(e) => {
                error!(error = %e, "playback of file failed");
                shared.fail(e);
                queue.finish();
                break;
            }
        }
    }
    debug!("producer exited");
}

fn run_consumer(
    config: &PlaybackConfig,
    mut assembler: ReadingAssembler,
    sink: Arc<dyn IngestSink>,
    queue: &BoundedQueue<Chunk>,
    stop: &StopSignal,
    shared: &Shared,
) {
    let mut window_start = Instant::now();
    let mut window_readings = 0u64;
    let mut window_chunks = 0u64;

    while !stop.is_set() {
        let chunk = match queue.pop() {
            Pop::Item(chunk) => chunk,
            Pop::Finished => {
                info!(stats = ?shared.stats.snapshot(), "playback finished");
                break;
            }
            Pop::Stopped => break,
        };
        let started = Instant::now();
        let rows = chunk.len();

        let payloads = match assembler.assemble(chunk) {
            Ok(payloads) => payloads,
            Err(e) => {
                error!(error = %e, "failed to assemble readings");
                shared.fail(e.into());
                stop.trigger();
                queue.stop();
                break;
            }
        };
        for payload in payloads {
            let readings = payload.len() as u64;
            sink.ingest(payload);
            shared.stats.payloads_emitted.fetch_add(1, Ordering::SeqCst);
            shared.stats.readings_emitted.fetch_add(readings, Ordering::SeqCst);
            window_readings += readings;
        }
        shared.stats.chunks_emitted.fetch_add(1, Ordering::SeqCst);
        queue.task_done();
        window_chunks += 1;

        if window_readings >= THROUGHPUT_EVERY {
            let secs = window_start.elapsed().as_secs_f64().max(f64::EPSILON);
            debug!(
                readings_per_sec = window_readings as f64 / secs,
                polls_per_sec = window_chunks as f64 / secs,
                "throughput"
            );
            window_start = Instant::now();
            window_readings = 0;
            window_chunks = 0;
        }

        let cadence = config.chunk_cadence(rows);
        if let Some(rest) = cadence.checked_sub(started.elapsed()) {
            if stop.wait_timeout(rest) {
                break;
            }
        }
    }
    shared.set_state(PlaybackState::Stopped);
    debug!("consumer exited");
}
