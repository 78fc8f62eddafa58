mod utils;
mod protocol;
mod chunk;
mod config;

// Re-export commonly used types at crate root
pub use utils::*;
pub use protocol::*;
pub use chunk::*;
pub use config::{ChunkConfig, ChunkConfigBuilder};
