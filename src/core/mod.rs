pub mod chunk;
pub mod reading;
pub mod signal;
pub mod time;

pub use chunk::{Chunk, FileContext, Row};
pub use reading::{Payload, Reading};
pub use signal::StopSignal;
