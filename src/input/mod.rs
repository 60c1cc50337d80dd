pub mod columns;
pub mod decoder;
pub mod locator;
pub mod source;

pub use columns::{ColumnSpec, ColumnType};
pub use decoder::{ChunkDecoder, DecodeOptions};
pub use locator::{FileLocator, LocatorHandle};
pub use source::{open_source, Compression};
