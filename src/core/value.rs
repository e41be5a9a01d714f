use indexmap::IndexMap;

use crate::core::error::{IrError, Result};

/// 结构化记录：保持插入顺序的 key -> value
pub type Record = IndexMap<String, Value>;

/// 结构化日志的值（封闭的 tagged union）
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Record),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// 数值比较用：Int / Float 都能转成 f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// 沿 parts 逐层下钻；任何一层缺失或不是 object 都返回 None
    pub fn lookup<'a, S: AsRef<str>>(record: &'a Record, parts: &[S]) -> Option<&'a Value> {
        let (first, rest) = parts.split_first()?;
        let mut cur = record.get(first.as_ref())?;
        for part in rest {
            cur = cur.as_object()?.get(part.as_ref())?;
        }
        Some(cur)
    }

    /// 从 JSON 转换；超出 i64 的整数无法表示，直接报 EncodeError
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if n.is_u64() {
                    return Err(IrError::Encode(format!(
                        "integer {} exceeds the 64-bit signed range",
                        n
                    )));
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            serde_json::Value::Object(map) => {
                let mut out = Record::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, Value::from_json(v)?);
                }
                Value::Object(out)
            }
        })
    }

    /// 转 JSON；非有限浮点数在 JSON 中没有表示，渲染为 null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(record_to_json_map(map)),
        }
    }
}

pub fn record_to_json_map(record: &Record) -> serde_json::Map<String, serde_json::Value> {
    record
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Object(v)
    }
}
