use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::options::{ReaderOptions, WriterConfig};

/// CLI 配置文件（TOML）
///
/// ```toml
/// [reader.log_level_key]
/// is_auto_generated = false
/// parts = ["level"]
///
/// [writer]
/// compression_level = 9
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub reader: ReaderOptions,
    #[serde(default)]
    pub writer: WriterConfig,
}

impl ToolConfig {
    /// `$XDG_CONFIG_HOME/clp-ir/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("clp-ir").join("config.toml"))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: ToolConfig = toml::from_str(&text)?;
        Ok(cfg)
    }

    /// 显式路径必须存在；默认路径不存在时退回默认值
    pub fn load_or_default(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(p) = explicit {
            return Self::load(p);
        }
        match Self::default_path() {
            Some(p) if p.exists() => {
                tracing::debug!("Loading config from {:?}", p);
                Self::load(&p)
            }
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StreamType;

    #[test]
    fn parses_reader_and_writer_sections() {
        let text = r#"
            [reader.log_level_key]
            parts = ["level"]

            [reader.timestamp_key]
            is_auto_generated = true
            parts = ["ts"]

            [writer]
            compression_level = 9
            stream_type = "UNSTRUCTURED"
        "#;
        let cfg: ToolConfig = toml::from_str(text).unwrap();
        let lvl = cfg.reader.log_level_key.unwrap();
        assert!(!lvl.is_auto_generated);
        assert_eq!(lvl.parts, vec!["level"]);
        assert!(cfg.reader.timestamp_key.unwrap().is_auto_generated);
        assert_eq!(cfg.writer.compression_level, 9);
        assert_eq!(cfg.writer.stream_type, StreamType::Unstructured);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: ToolConfig = toml::from_str("").unwrap();
        assert!(cfg.reader.log_level_key.is_none());
        assert_eq!(cfg.writer.compression_level, 3);
    }

    #[test]
    fn explicit_path_must_exist_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(ToolConfig::load_or_default(Some(path.as_path())).is_err());

        std::fs::write(&path, "[writer]\ncompression_level = 19\n").unwrap();
        let cfg = ToolConfig::load_or_default(Some(path.as_path())).unwrap();
        assert_eq!(cfg.writer.compression_level, 19);

        std::fs::write(&path, "[writer]\ncompression_level = \"high\"\n").unwrap();
        assert!(ToolConfig::load(&path).is_err());
    }
}
