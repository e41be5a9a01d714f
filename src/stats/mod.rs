use std::fmt;

use crate::core::types::{LogLevel, StreamType};

/// 读取侧统计（字节数 + 事件分布）
#[derive(Clone, Debug)]
pub struct ReaderStats {
    pub stream_type: StreamType,
    /// 输入字节数（压缩后）
    pub compressed_bytes: u64,
    /// 解压后 IR 字节数
    pub decompressed_bytes: u64,
    pub events_buffered: usize,
    /// 按 level 数值下标计数
    pub level_counts: [usize; LogLevel::ALL.len()],
    /// (最小, 最大) 时间戳
    pub timestamp_range: Option<(i64, i64)>,
    /// 当前 filter 命中数；无 filter 时为 None
    pub filtered_events: Option<usize>,
}

impl Default for ReaderStats {
    fn default() -> Self {
        Self {
            stream_type: StreamType::Structured,
            compressed_bytes: 0,
            decompressed_bytes: 0,
            events_buffered: 0,
            level_counts: [0; LogLevel::ALL.len()],
            timestamp_range: None,
            filtered_events: None,
        }
    }
}

impl ReaderStats {
    pub fn record(&mut self, level: LogLevel, timestamp: i64) {
        self.level_counts[level.as_u8() as usize] += 1;
        self.timestamp_range = Some(match self.timestamp_range {
            Some((lo, hi)) => (lo.min(timestamp), hi.max(timestamp)),
            None => (timestamp, timestamp),
        });
    }

    /// 解压后 / 压缩后；空输入返回 0
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            0.0
        } else {
            self.decompressed_bytes as f64 / self.compressed_bytes as f64
        }
    }
}

fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for ReaderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           clp-ir Stream Report                   ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Stream type:  {:>34} ║", self.stream_type.to_string())?;
        writeln!(f, "║ Compressed:   {:>34} ║", human_bytes(self.compressed_bytes))?;
        writeln!(f, "║ Decompressed: {:>34} ║", human_bytes(self.decompressed_bytes))?;
        writeln!(f, "║ Ratio:        {:>33.2}x ║", self.compression_ratio())?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Events:       {:>34} ║", self.events_buffered)?;
        for level in LogLevel::ALL {
            let n = self.level_counts[level.as_u8() as usize];
            if n > 0 {
                writeln!(f, "║   {:<6}      {:>34} ║", level.name(), n)?;
            }
        }
        if let Some((lo, hi)) = self.timestamp_range {
            writeln!(f, "╠──────────────────────────────────────────────────╣")?;
            writeln!(f, "║ First ts:     {:>34} ║", lo)?;
            writeln!(f, "║ Last ts:      {:>34} ║", hi)?;
        }
        if let Some(n) = self.filtered_events {
            writeln!(f, "║ Filtered:     {:>34} ║", n)?;
        }
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
