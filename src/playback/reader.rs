use crate::config::{FileLocation, PlaybackConfig};
use crate::core::{Chunk, StopSignal};
use crate::error::{PlaybackError, Result};
use crate::input::{ChunkDecoder, DecodeOptions, FileLocator, LocatorHandle};
use crate::playback::lifecycle::{Disposition, FileLifecycleManager};
use crate::playback::PlaybackState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One step of the reader
#[derive(Debug)]
pub enum Advance {
    Chunk(Chunk),
    /// No file yet; ask again later
    Pending,
    /// The file was read to the end; [`Reader::finish_file`] decides what's next
    Exhausted(PathBuf),
    /// Nothing more will be produced
    Finished,
}

enum ReaderState {
    Idle,
    Locating(LocatorHandle),
    Reading(ChunkDecoder),
    Draining { path: PathBuf, rows: u64 },
    Finished,
}

/// Pull-based chunk source shared by the push and poll facades
///
/// Owns the locate/decode/dispose cycle for one file at a time. Every file
/// opened (replays included) gets a new generation number.
pub struct Reader {
    options: DecodeOptions,
    location: FileLocation,
    locator_poll: Duration,
    lifecycle: FileLifecycleManager,
    stop: Arc<StopSignal>,
    state: ReaderState,
    generation: u64,
}

impl Reader {
    /// Begin looking for the first file
    ///
    /// Fails straight away when the configured directory does not exist.
    pub fn start(config: &PlaybackConfig, stop: Arc<StopSignal>) -> Result<Self> {
        let mut reader = Self {
            options: DecodeOptions::from(config),
            location: config.location.clone(),
            locator_poll: config.locator_poll,
            lifecycle: FileLifecycleManager::new(config.end_of_file.clone()),
            stop,
            state: ReaderState::Idle,
            generation: 0,
        };
        reader.state = ReaderState::Locating(reader.spawn_locator()?);
        Ok(reader)
    }

    pub fn lifecycle(&self) -> &FileLifecycleManager {
        &self.lifecycle
    }

    pub fn state(&self) -> PlaybackState {
        match self.state {
            ReaderState::Idle => PlaybackState::Idle,
            ReaderState::Locating(_) => PlaybackState::Locating,
            ReaderState::Reading(_) => PlaybackState::Decoding,
            ReaderState::Draining { .. } => PlaybackState::Draining,
            ReaderState::Finished => PlaybackState::Stopped,
        }
    }

    /// Move the reader one step forward without blocking on the locator
    ///
    /// Any error leaves the reader finished.
    pub fn advance(&mut self) -> Result<Advance> {
        let result = self.step();
        if result.is_err() {
            self.state = ReaderState::Finished;
        }
        result
    }

    fn step(&mut self) -> Result<Advance> {
        loop {
            match &mut self.state {
                ReaderState::Idle => {
                    self.state = ReaderState::Locating(self.spawn_locator()?);
                    return Ok(Advance::Pending);
                }
                ReaderState::Locating(handle) => match handle.try_take() {
                    None => return Ok(Advance::Pending),
                    Some(Ok(Some(path))) => {
                        let decoder = self.open(&path)?;
                        self.state = ReaderState::Reading(decoder);
                    }
                    // stopped while searching
                    Some(Ok(None)) => {
                        self.state = ReaderState::Finished;
                        return Ok(Advance::Finished);
                    }
                    Some(Err(e)) => return Err(e),
                },
                ReaderState::Reading(decoder) => match decoder.next_chunk()? {
                    Some(chunk) if chunk.is_empty() => continue,
                    Some(chunk) => return Ok(Advance::Chunk(chunk)),
                    None => {
                        let path = decoder.path().to_path_buf();
                        let rows = decoder.rows_decoded();
                        info!(path = %path.display(), rows, "source file exhausted");
                        self.state = ReaderState::Draining {
                            path: path.clone(),
                            rows,
                        };
                        return Ok(Advance::Exhausted(path));
                    }
                },
                ReaderState::Draining { path, .. } => return Ok(Advance::Exhausted(path.clone())),
                ReaderState::Finished => return Ok(Advance::Finished),
            }
        }
    }

    /// Apply the end-of-file action to the exhausted file
    ///
    /// Callers that need the file's data consumed first (delete, rename) must
    /// wait for that before calling.
    pub fn finish_file(&mut self) -> Result<Disposition> {
        let (path, rows) = match std::mem::replace(&mut self.state, ReaderState::Finished) {
            ReaderState::Draining { path, rows } => (path, rows),
            other => {
                self.state = other;
                return Ok(Disposition::Stop);
            }
        };

        let disposition = self.lifecycle.finish(&path)?;
        match disposition {
            Disposition::Reopen if rows == 0 => {
                warn!(path = %path.display(), "file has no data rows, not replaying");
                return Ok(Disposition::Stop);
            }
            Disposition::Reopen => {
                let decoder = self.open(&path)?;
                self.state = ReaderState::Reading(decoder);
            }
            Disposition::Rotate => self.state = ReaderState::Idle,
            Disposition::Stop => {}
        }
        Ok(disposition)
    }

    fn open(&mut self, path: &Path) -> Result<ChunkDecoder> {
        let generation = self.generation;
        self.generation += 1;
        ChunkDecoder::open(path, &self.options, generation).map_err(PlaybackError::from)
    }

    fn spawn_locator(&self) -> Result<LocatorHandle> {
        FileLocator::new(self.location.clone(), self.locator_poll, self.stop.clone()).spawn()
    }
}
