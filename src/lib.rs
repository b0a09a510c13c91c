pub mod sink;
pub mod codec;
pub mod frame;
pub mod options;
pub mod io_stream;

pub use codec::{EngineError, StreamEngine, ZstdEngine};
pub use frame::FrameHeader;
pub use io_stream::{FrameWriter, WriterError};
pub use options::{EngineParams, WriterOptions};
