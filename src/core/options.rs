use serde::{Deserialize, Serialize};

use crate::core::error::{IrError, Result};
use crate::core::types::StreamType;

/// 结构化记录中的字段路径；`is_auto_generated` 选择命名空间
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPath {
    #[serde(default)]
    pub is_auto_generated: bool,
    pub parts: Vec<String>,
}

impl KeyPath {
    pub fn user<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Self {
            is_auto_generated: false,
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn auto<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Self {
            is_auto_generated: true,
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }
}

/// Reader 构造参数：只影响 STRUCTURED 方言的 level/timestamp/offset 提取
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderOptions {
    #[serde(default)]
    pub log_level_key: Option<KeyPath>,
    #[serde(default)]
    pub timestamp_key: Option<KeyPath>,
    #[serde(default)]
    pub utc_offset_key: Option<KeyPath>,
}

impl ReaderOptions {
    pub fn validate(&self) -> Result<()> {
        let keys = [
            ("log_level_key", &self.log_level_key),
            ("timestamp_key", &self.timestamp_key),
            ("utc_offset_key", &self.utc_offset_key),
        ];
        for (name, key) in keys {
            if let Some(k) = key {
                if k.parts.is_empty() {
                    return Err(IrError::InvalidConfig(format!("{name} has no parts")));
                }
            }
        }
        Ok(())
    }
}

pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Writer 构造参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    #[serde(default = "default_stream_type")]
    pub stream_type: StreamType,
    #[serde(default)]
    pub reference_timestamp: Option<i64>,
    #[serde(default)]
    pub timezone_id: Option<String>,
    #[serde(default)]
    pub utc_offset_minutes: i64,
    #[serde(default)]
    pub user_defined_metadata: Option<serde_json::Value>,
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_stream_type() -> StreamType {
    StreamType::Structured
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            stream_type: StreamType::Structured,
            reference_timestamp: None,
            timezone_id: None,
            utc_offset_minutes: 0,
            user_defined_metadata: None,
        }
    }
}

impl WriterConfig {
    pub fn unstructured() -> Self {
        Self {
            stream_type: StreamType::Unstructured,
            ..Self::default()
        }
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_path_is_rejected() {
        let opts = ReaderOptions {
            timestamp_key: Some(KeyPath::user(Vec::<String>::new())),
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(IrError::InvalidConfig(_))));
        assert!(ReaderOptions::default().validate().is_ok());
    }
}
