use crate::config::EndOfFileAction;
use crate::error::{PlaybackError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

/// What playback does after a file has been disposed of
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Open the same file again from the start
    Reopen,
    /// No more data will come
    Stop,
    /// The file is gone; look for the next one
    Rotate,
}

/// Applies the configured end-of-file action
#[derive(Debug, Clone)]
pub struct FileLifecycleManager {
    action: EndOfFileAction,
}

impl FileLifecycleManager {
    pub fn new(action: EndOfFileAction) -> Self {
        Self { action }
    }

    /// Whether finishing a file touches the filesystem
    pub fn post_processes(&self) -> bool {
        matches!(
            self.action,
            EndOfFileAction::Delete | EndOfFileAction::Rename { .. }
        )
    }

    /// Dispose of a fully played file
    pub fn finish(&self, path: &Path) -> Result<Disposition> {
        let post_process_err = |source| PlaybackError::PostProcess {
            path: path.to_path_buf(),
            source,
        };
        match &self.action {
            EndOfFileAction::Replay => {
                info!(path = %path.display(), "end of file reached, replaying");
                Ok(Disposition::Reopen)
            }
            EndOfFileAction::Keep => {
                info!(path = %path.display(), "end of file reached, playback complete");
                Ok(Disposition::Stop)
            }
            EndOfFileAction::Delete => {
                std::fs::remove_file(path).map_err(post_process_err)?;
                info!(path = %path.display(), "played file deleted");
                Ok(Disposition::Rotate)
            }
            EndOfFileAction::Rename { suffix } => {
                let target = renamed(path, suffix);
                std::fs::rename(path, &target).map_err(post_process_err)?;
                info!(
                    path = %path.display(),
                    renamed = %target.display(),
                    "played file renamed"
                );
                Ok(Disposition::Rotate)
            }
        }
    }
}

/// `path` with `suffix` appended to the file name
pub fn renamed(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_renamed_appends_suffix() {
        assert_eq!(
            renamed(Path::new("/data/vibe.csv"), ".done"),
            PathBuf::from("/data/vibe.csv.done")
        );
    }

    #[test]
    fn test_rename_moves_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, "a\n1\n").unwrap();

        let manager = FileLifecycleManager::new(EndOfFileAction::Rename {
            suffix: ".done".to_string(),
        });
        assert!(manager.post_processes());
        assert_eq!(manager.finish(&path).unwrap(), Disposition::Rotate);
        assert!(!path.exists());
        assert!(dir.path().join("run.csv.done").exists());
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, "a\n1\n").unwrap();

        let manager = FileLifecycleManager::new(EndOfFileAction::Delete);
        assert_eq!(manager.finish(&path).unwrap(), Disposition::Rotate);
        assert!(!path.exists());
    }

    #[test]
    fn test_replay_and_keep_leave_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, "a\n1\n").unwrap();

        let replay = FileLifecycleManager::new(EndOfFileAction::Replay);
        assert_eq!(replay.finish(&path).unwrap(), Disposition::Reopen);
        let keep = FileLifecycleManager::new(EndOfFileAction::Keep);
        assert_eq!(keep.finish(&path).unwrap(), Disposition::Stop);
        assert!(!keep.post_processes());
        assert!(path.exists());
    }

    #[test]
    fn test_delete_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let manager = FileLifecycleManager::new(EndOfFileAction::Delete);
        assert!(matches!(
            manager.finish(&dir.path().join("gone.csv")),
            Err(PlaybackError::PostProcess { .. })
        ));
    }
}
