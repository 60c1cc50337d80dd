use crate::config::PlaybackConfig;
use crate::core::{Payload, StopSignal};
use crate::error::Result;
use crate::playback::assembler::ReadingAssembler;
use crate::playback::reader::{Advance, Reader};
use crate::playback::PlaybackState;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Synchronous pull-mode playback
///
/// Each call to [`PollSession::poll`] hands out at most one payload. There is
/// no queue and no pacing; the caller decides how often to poll.
pub struct PollSession {
    reader: Reader,
    assembler: ReadingAssembler,
    pending: VecDeque<Payload>,
    stop: Arc<StopSignal>,
    finished: bool,
}

impl PollSession {
    pub fn open(config: &PlaybackConfig) -> Result<Self> {
        let stop = Arc::new(StopSignal::new());
        Ok(Self {
            reader: Reader::start(config, stop.clone())?,
            assembler: ReadingAssembler::new(config),
            pending: VecDeque::new(),
            stop,
            finished: false,
        })
    }

    pub fn state(&self) -> PlaybackState {
        if self.finished {
            PlaybackState::Stopped
        } else {
            self.reader.state()
        }
    }

    /// No more payloads will ever be returned
    pub fn is_finished(&self) -> bool {
        self.finished && self.pending.is_empty()
    }

    /// Next payload, or `None` while no file is available or after the end
    ///
    /// End-of-file actions run inline, so a renamed or deleted file is
    /// disposed of as soon as its last payload has been returned.
    pub fn poll(&mut self) -> Result<Option<Payload>> {
        if let Some(payload) = self.pending.pop_front() {
            return Ok(Some(payload));
        }
        if self.finished {
            return Ok(None);
        }
        let result = self.fill();
        if result.is_err() {
            self.finished = true;
        }
        result.map(|_| self.pending.pop_front())
    }

    fn fill(&mut self) -> Result<()> {
        loop {
            match self.reader.advance()? {
                Advance::Chunk(chunk) => {
                    self.pending.extend(self.assembler.assemble(chunk)?);
                    if !self.pending.is_empty() {
                        return Ok(());
                    }
                }
                Advance::Pending => return Ok(()),
                Advance::Exhausted(path) => {
                    debug!(path = %path.display(), "finishing file");
                    self.reader.finish_file()?;
                }
                Advance::Finished => {
                    self.finished = true;
                    return Ok(());
                }
            }
        }
    }

    /// Abandon any search in progress
    pub fn shutdown(&mut self) {
        self.stop.trigger();
        self.pending.clear();
        self.finished = true;
    }
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.stop.trigger();
    }
}
