#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod core;
pub mod event;
pub mod index;
pub mod query;
pub mod stats;
pub mod storage;

pub use crate::core::error::{IrError, Result};
pub use crate::core::event::{EventBody, LogEvent};
pub use crate::core::options::{KeyPath, ReaderOptions, WriterConfig};
pub use crate::core::types::{LogLevel, StreamType};
pub use crate::core::value::{Record, Value};
pub use crate::event::sink::{ByteSink, ChannelSink, ChannelSinkReceiver, VecSink};
pub use crate::event::writer::{StreamWriter, WriteRecord};
pub use crate::index::reader::StreamReader;
pub use crate::storage::frame::{StreamMetadata, TextRecord};
