use crate::config::FileLocation;
use crate::core::StopSignal;
use crate::error::{PlaybackError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// File name endings the locator will pick up
pub const RECOGNIZED_EXTENSIONS: [&str; 3] = [".csv", ".csv.gz", ".csv.bz2"];

/// Does `name` look like a playable file for `pattern`?
pub fn matches(name: &str, pattern: &str) -> bool {
    name.contains(pattern) && RECOGNIZED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// List `directory` once and return the first matching file in name order
pub fn scan(directory: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(directory).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            PlaybackError::DirectoryNotFound(directory.to_path_buf())
        } else {
            PlaybackError::Scan {
                path: directory.to_path_buf(),
                source,
            }
        }
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| matches(name, pattern))
        })
        .map(|entry| entry.path())
        .collect();

    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Polls a directory until a playable file shows up
pub struct FileLocator {
    location: FileLocation,
    poll_interval: Duration,
    stop: Arc<StopSignal>,
}

impl FileLocator {
    pub fn new(location: FileLocation, poll_interval: Duration, stop: Arc<StopSignal>) -> Self {
        Self {
            location,
            poll_interval,
            stop,
        }
    }

    /// A missing directory is a configuration problem, not something to wait for
    pub fn check_directory(&self) -> Result<()> {
        let directory = self.location.directory();
        if directory.is_dir() {
            Ok(())
        } else {
            Err(PlaybackError::DirectoryNotFound(directory.to_path_buf()))
        }
    }

    pub fn locate_once(&self) -> Result<Option<PathBuf>> {
        match &self.location {
            FileLocation::Pattern { directory, pattern } => scan(directory, pattern),
            FileLocation::Exact(path) => {
                self.check_directory()?;
                Ok(path.is_file().then(|| path.clone()))
            }
        }
    }

    /// Block until a file is found; `None` if stopped first
    pub fn run(&self) -> Result<Option<PathBuf>> {
        loop {
            if self.stop.is_set() {
                return Ok(None);
            }
            if let Some(path) = self.locate_once()? {
                info!(path = %path.display(), "found source file");
                return Ok(Some(path));
            }
            debug!(
                directory = %self.location.directory().display(),
                "no matching file yet"
            );
            if self.stop.wait_timeout(self.poll_interval) {
                return Ok(None);
            }
        }
    }

    /// Start a search episode on its own thread
    pub fn spawn(self) -> Result<LocatorHandle> {
        self.check_directory()?;
        let handle = thread::Builder::new()
            .name("file-locator".to_string())
            .spawn(move || self.run())
            .map_err(|source| PlaybackError::Spawn {
                name: "file-locator",
                source,
            })?;
        Ok(LocatorHandle {
            handle: Some(handle),
        })
    }
}

/// A running search episode
///
/// The result is only handed out once the thread has been joined.
pub struct LocatorHandle {
    handle: Option<JoinHandle<Result<Option<PathBuf>>>>,
}

impl LocatorHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Join and return the result if the search has ended, without blocking
    pub fn try_take(&mut self) -> Option<Result<Option<PathBuf>>> {
        if !self.is_finished() {
            return None;
        }
        self.handle.take().map(join_locator)
    }

    /// Block until the search ends
    pub fn join(mut self) -> Result<Option<PathBuf>> {
        self.handle.take().map(join_locator).unwrap_or(Ok(None))
    }
}

fn join_locator(handle: JoinHandle<Result<Option<PathBuf>>>) -> Result<Option<PathBuf>> {
    handle.join().unwrap_or_else(|_| {
        error!("file locator thread panicked");
        Ok(None)
    })
}
