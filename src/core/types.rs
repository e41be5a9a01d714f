use serde::{Deserialize, Serialize};
use std::fmt;

/// auto-generated 命名空间在合并 JSON / KeyPath 中的名字
pub const AUTO_GENERATED_KEY: &str = "auto-generated";
/// user-generated 命名空间
pub const USER_GENERATED_KEY: &str = "user-generated";

pub const MERGED_KV_PAIRS_AUTO_GENERATED_KEY: &str = AUTO_GENERATED_KEY;
pub const MERGED_KV_PAIRS_USER_GENERATED_KEY: &str = USER_GENERATED_KEY;

/// IR 流方言（header 中的 1 字节 tag）
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    Structured,
    Unstructured,
}

impl StreamType {
    pub fn tag(self) -> u8 {
        match self {
            StreamType::Structured => 0,
            StreamType::Unstructured => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(StreamType::Structured),
            1 => Some(StreamType::Unstructured),
            _ => None,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Structured => f.write_str("STRUCTURED"),
            StreamType::Unstructured => f.write_str("UNSTRUCTURED"),
        }
    }
}

/// 日志级别。`None` 不是合法级别，只表示“未知”。
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogLevel {
    #[default]
    None = 0,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// 与 `LogLevel` 的判别值一一对应，需手动保持同步。
pub const LOG_LEVEL_NAMES: [&str; 7] = ["NONE", "TRACE", "DEBUG", "INFO", "WARN", "ERROR", "FATAL"];

impl LogLevel {
    pub const ALL: [LogLevel; 7] = [
        LogLevel::None,
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    pub fn name(self) -> &'static str {
        LOG_LEVEL_NAMES[self as usize]
    }

    /// 大小写不敏感；"NONE" 不算合法级别名。
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL[1..]
            .iter()
            .copied()
            .find(|lvl| lvl.name().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
