pub mod assembler;
pub mod engine;
pub mod lifecycle;
pub mod poll;
pub mod queue;
pub mod reader;
pub mod timestamp;

pub use assembler::ReadingAssembler;
pub use engine::{EngineStats, PlaybackEngine, StatsSnapshot};
pub use lifecycle::{Disposition, FileLifecycleManager};
pub use poll::PollSession;
pub use queue::{BoundedQueue, Pop};
pub use reader::{Advance, Reader};
pub use timestamp::TimestampSynthesizer;

/// Where playback currently is in the per-file cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    /// Waiting for a source file to appear
    Locating,
    Decoding,
    /// File read to the end, waiting for its data to be consumed
    Draining,
    Stopped,
}
