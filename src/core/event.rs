use crate::core::types::{
    LogLevel, MERGED_KV_PAIRS_AUTO_GENERATED_KEY, MERGED_KV_PAIRS_USER_GENERATED_KEY,
};
use crate::core::value::{record_to_json_map, Record};

/// 事件正文：非结构化文本 或 两个命名空间的 KV 记录
#[derive(Clone, Debug, PartialEq)]
pub enum EventBody {
    Text(String),
    Structured {
        auto_generated: Record,
        user_generated: Record,
    },
}

/// 已解码的日志事件（只由 EventIndex 持有，对外给的都是 clone）
#[derive(Clone, Debug, PartialEq)]
pub struct LogEvent {
    /// 1-based，按解码顺序
    pub seq: u64,
    /// epoch 毫秒
    pub timestamp: i64,
    pub utc_offset_minutes: i64,
    pub level: LogLevel,
    pub body: EventBody,
}

impl LogEvent {
    pub fn user_generated(&self) -> Option<&Record> {
        match &self.body {
            EventBody::Structured { user_generated, .. } => Some(user_generated),
            EventBody::Text(_) => None,
        }
    }

    pub fn auto_generated(&self) -> Option<&Record> {
        match &self.body {
            EventBody::Structured { auto_generated, .. } => Some(auto_generated),
            EventBody::Text(_) => None,
        }
    }

    /// 文本原样返回；结构化事件渲染成 {"auto-generated": .., "user-generated": ..}
    pub fn message(&self) -> String {
        match &self.body {
            EventBody::Text(s) => s.clone(),
            EventBody::Structured {
                auto_generated,
                user_generated,
            } => {
                let mut merged = serde_json::Map::with_capacity(2);
                merged.insert(
                    MERGED_KV_PAIRS_AUTO_GENERATED_KEY.to_string(),
                    serde_json::Value::Object(record_to_json_map(auto_generated)),
                );
                merged.insert(
                    MERGED_KV_PAIRS_USER_GENERATED_KEY.to_string(),
                    serde_json::Value::Object(record_to_json_map(user_generated)),
                );
                serde_json::Value::Object(merged).to_string()
            }
        }
    }
}
