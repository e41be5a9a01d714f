pub mod config;
pub mod error;
pub mod event;
pub mod options;
pub mod types;
pub mod value;

pub use config::ToolConfig;
pub use error::{IrError, Result};
pub use event::{EventBody, LogEvent};
pub use options::{KeyPath, ReaderOptions, WriterConfig, DEFAULT_COMPRESSION_LEVEL};
pub use types::{
    LogLevel, StreamType, AUTO_GENERATED_KEY, MERGED_KV_PAIRS_AUTO_GENERATED_KEY,
    MERGED_KV_PAIRS_USER_GENERATED_KEY, USER_GENERATED_KEY,
};
pub use value::{Record, Value};
