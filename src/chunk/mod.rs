mod types;
mod basic_header;
mod header;
mod stream;
mod chunk;
mod reader;
mod writer;

pub use types::*;
pub use basic_header::*;
pub use header::*;
pub use stream::*;
pub use chunk::*;
pub use reader::*;
pub use writer::*;
