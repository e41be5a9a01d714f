//! IR 流的 frame 编解码（解压后的字节）。
//!
//! 布局（定长整数均为 LE）：
//!
//! | 字段        | 大小 | 说明                          |
//! |-------------|------|-------------------------------|
//! | magic       | 4    | `b"CIR1"`                     |
//! | stream type | 1    | 0 = STRUCTURED, 1 = UNSTRUCTURED |
//! | meta len    | 4    | u32                           |
//! | metadata    | N    | JSON                          |
//! | frames      | ...  | 以 `TAG_EOF` 结束             |
//!
//! frame = 1 字节 tag + body：
//! - `TAG_LOG_EVENT`：u32 payload 长度 + payload
//! - `TAG_UTC_OFFSET_CHANGE`：i64 分钟
//! - `TAG_EOF`：无 body

use serde::{Deserialize, Serialize};

use crate::core::error::{IrError, Result};
use crate::core::event::{EventBody, LogEvent};
use crate::core::options::{KeyPath, ReaderOptions};
use crate::core::types::{LogLevel, StreamType};
use crate::core::value::{Record, Value};
use crate::storage::varint::{put_ivarint, put_uvarint, read_ivarint, read_uvarint};

pub const IR_MAGIC: [u8; 4] = *b"CIR1";
pub const IR_VERSION: &str = "0.1.0";
pub const SUPPORTED_VERSIONS: &[&str] = &[IR_VERSION];

pub const TAG_EOF: u8 = 0x00;
pub const TAG_LOG_EVENT: u8 = 0x01;
pub const TAG_UTC_OFFSET_CHANGE: u8 = 0x02;

const VALUE_NULL: u8 = 0x10;
const VALUE_FALSE: u8 = 0x11;
const VALUE_TRUE: u8 = 0x12;
const VALUE_INT: u8 = 0x13;
const VALUE_FLOAT: u8 = 0x14;
const VALUE_STRING: u8 = 0x15;
const VALUE_ARRAY: u8 = 0x16;
const VALUE_OBJECT: u8 = 0x17;

const MAX_NESTING_DEPTH: usize = 64;
const HEADER_FIXED_SIZE: usize = 4 + 1 + 4; // magic + stream type + meta len

/// 流元数据；解析后不可变
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamMetadata {
    pub stream_type: StreamType,
    pub version: String,
    pub reference_timestamp: Option<i64>,
    pub timezone_id: Option<String>,
    pub timestamp_pattern: Option<String>,
    /// 流默认 UTC offset（分钟）
    pub utc_offset_minutes: i64,
    pub user_defined: Option<serde_json::Value>,
}

impl StreamMetadata {
    pub fn new(stream_type: StreamType) -> Self {
        Self {
            stream_type,
            version: IR_VERSION.to_string(),
            reference_timestamp: None,
            timezone_id: None,
            timestamp_pattern: None,
            utc_offset_minutes: 0,
            user_defined: None,
        }
    }
}

/// header 里的 JSON 部分（stream type 单独存 1 字节）
#[derive(Serialize, Deserialize)]
struct MetadataJson {
    #[serde(rename = "VERSION")]
    version: String,
    #[serde(rename = "REFERENCE_TIMESTAMP", default, skip_serializing_if = "Option::is_none")]
    reference_timestamp: Option<i64>,
    #[serde(rename = "TZ_ID", default, skip_serializing_if = "Option::is_none")]
    timezone_id: Option<String>,
    #[serde(rename = "TIMESTAMP_PATTERN", default, skip_serializing_if = "Option::is_none")]
    timestamp_pattern: Option<String>,
    #[serde(rename = "UTC_OFFSET", default)]
    utc_offset_minutes: i64,
    #[serde(rename = "USER_DEFINED_METADATA", default, skip_serializing_if = "Option::is_none")]
    user_defined: Option<serde_json::Value>,
}

/// 带绝对偏移的只读游标：所有越界都变成带 offset 的 ParseError
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos, base: 0 }
    }

    /// 用于 payload 子切片：报错时 offset = base + pos
    fn with_base(buf: &'a [u8], base: u64) -> Self {
        Self { buf, pos: 0, base }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn err(&self, reason: impl Into<String>) -> IrError {
        IrError::parse(self.offset(), reason)
    }

    pub fn bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| self.err(format!("truncated {what}")))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.bytes(1, what)?[0])
    }

    pub fn u32_le(&mut self, what: &str) -> Result<u32> {
        let b = self.bytes(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i64_le(&mut self, what: &str) -> Result<i64> {
        let b = self.bytes(8, what)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_le_bytes(arr))
    }

    pub fn uvarint(&mut self, what: &str) -> Result<u64> {
        let rest = self.buf.get(self.pos..).unwrap_or(&[]);
        let (v, n) = read_uvarint(rest).ok_or_else(|| self.err(format!("bad varint for {what}")))?;
        self.pos += n;
        Ok(v)
    }

    pub fn ivarint(&mut self, what: &str) -> Result<i64> {
        let rest = self.buf.get(self.pos..).unwrap_or(&[]);
        let (v, n) = read_ivarint(rest).ok_or_else(|| self.err(format!("bad varint for {what}")))?;
        self.pos += n;
        Ok(v)
    }

    pub fn len_prefixed_str(&mut self, what: &str) -> Result<&'a str> {
        let start = self.offset();
        let len = self.uvarint(what)?;
        let len: usize = len
            .try_into()
            .map_err(|_| IrError::parse(start, format!("{what} length overflow")))?;
        let raw = self.bytes(len, what)?;
        std::str::from_utf8(raw).map_err(|e| IrError::parse(start, format!("{what} is not UTF-8: {e}")))
    }
}

/// 解析 header，返回 (metadata, 消耗字节数)
pub fn decode_header(bytes: &[u8]) -> Result<(StreamMetadata, usize)> {
    let mut cur = ByteCursor::new(bytes, 0);
    let magic = cur.bytes(IR_MAGIC.len(), "magic")?;
    if magic != IR_MAGIC {
        return Err(IrError::parse(0, format!("magic mismatch: {:02x?}", magic)));
    }

    let tag_off = cur.offset();
    let tag = cur.u8("stream type")?;
    let stream_type = StreamType::from_tag(tag)
        .ok_or_else(|| IrError::parse(tag_off, format!("unknown stream type tag {tag}")))?;

    let meta_off = cur.offset();
    let meta_len = cur.u32_le("metadata length")? as usize;
    let raw = cur.bytes(meta_len, "metadata")?;
    let json: MetadataJson = serde_json::from_slice(raw)
        .map_err(|e| IrError::parse(meta_off, format!("metadata is not valid JSON: {e}")))?;

    if !SUPPORTED_VERSIONS.contains(&json.version.as_str()) {
        return Err(IrError::parse(
            meta_off,
            format!("unsupported IR version {}", json.version),
        ));
    }

    let meta = StreamMetadata {
        stream_type,
        version: json.version,
        reference_timestamp: json.reference_timestamp,
        timezone_id: json.timezone_id,
        timestamp_pattern: json.timestamp_pattern,
        utc_offset_minutes: json.utc_offset_minutes,
        user_defined: json.user_defined,
    };
    debug_assert!(cur.pos() >= HEADER_FIXED_SIZE);
    Ok((meta, cur.pos()))
}

pub fn encode_header(meta: &StreamMetadata) -> Result<Vec<u8>> {
    let json = MetadataJson {
        version: meta.version.clone(),
        reference_timestamp: meta.reference_timestamp,
        timezone_id: meta.timezone_id.clone(),
        timestamp_pattern: meta.timestamp_pattern.clone(),
        utc_offset_minutes: meta.utc_offset_minutes,
        user_defined: meta.user_defined.clone(),
    };
    let body = serde_json::to_vec(&json).map_err(|e| IrError::Encode(e.to_string()))?;
    let len: u32 = body
        .len()
        .try_into()
        .map_err(|_| IrError::Encode("metadata too large".into()))?;

    let mut out = Vec::with_capacity(HEADER_FIXED_SIZE + body.len());
    out.extend_from_slice(&IR_MAGIC);
    out.push(meta.stream_type.tag());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// 非结构化记录（写入侧）
#[derive(Clone, Debug, PartialEq)]
pub struct TextRecord {
    pub timestamp: i64,
    pub level: LogLevel,
    pub utc_offset_minutes: i64,
    pub message: String,
}

/// `FrameEncoder::encode_frame` 的输入
#[derive(Clone, Copy, Debug)]
pub enum FrameRecord<'a> {
    Text(&'a TextRecord),
    Structured {
        auto_generated: &'a Record,
        user_generated: &'a Record,
    },
}

/// 单次 decode_next 的结果
#[derive(Debug)]
pub enum Decoded {
    Event { event: LogEvent, consumed: usize },
    EndOfStream { consumed: usize },
}

/// 有状态的 frame 解码器：时间戳 delta 基准 + 当前 UTC offset
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    stream_type: StreamType,
    options: ReaderOptions,
    prev_timestamp: i64,
    utc_offset_minutes: i64,
    next_seq: u64,
}

impl FrameDecoder {
    pub fn new(meta: &StreamMetadata, options: ReaderOptions) -> Self {
        Self {
            stream_type: meta.stream_type,
            options,
            prev_timestamp: meta.reference_timestamp.unwrap_or(0),
            utc_offset_minutes: meta.utc_offset_minutes,
            next_seq: 1,
        }
    }

    /// 从流中间开始解码时指定 delta 基准
    pub fn with_prev_timestamp(mut self, ts: i64) -> Self {
        self.prev_timestamp = ts;
        self
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn utc_offset_minutes(&self) -> i64 {
        self.utc_offset_minutes
    }

    pub fn prev_timestamp(&self) -> i64 {
        self.prev_timestamp
    }

    /// 从 `cursor` 开始解码下一个事件；UTC offset 变更包在内部消化。
    pub fn decode_next(&mut self, bytes: &[u8], cursor: usize) -> Result<Decoded> {
        let mut cur = ByteCursor::new(bytes, cursor);
        loop {
            if cur.is_empty() {
                return Err(cur.err("stream ended without end-of-stream marker"));
            }
            let tag_off = cur.offset();
            match cur.u8("frame tag")? {
                TAG_EOF => {
                    return Ok(Decoded::EndOfStream {
                        consumed: cur.pos() - cursor,
                    })
                }
                TAG_UTC_OFFSET_CHANGE => {
                    self.utc_offset_minutes = cur.i64_le("utc offset")?;
                }
                TAG_LOG_EVENT => {
                    let len = cur.u32_le("frame length")? as usize;
                    let payload_off = cur.offset();
                    let payload = cur.bytes(len, "frame payload")?;
                    let event = self.decode_payload(payload, payload_off)?;
                    return Ok(Decoded::Event {
                        event,
                        consumed: cur.pos() - cursor,
                    });
                }
                other => {
                    return Err(IrError::parse(tag_off, format!("unknown frame tag {other:#04x}")))
                }
            }
        }
    }

    fn decode_payload(&mut self, payload: &[u8], base: u64) -> Result<LogEvent> {
        let mut cur = ByteCursor::with_base(payload, base);
        let (timestamp, utc_offset_minutes, level, body) = match self.stream_type {
            StreamType::Unstructured => {
                let delta = cur.ivarint("timestamp delta")?;
                let timestamp = self.prev_timestamp.wrapping_add(delta);
                let lvl_off = cur.offset();
                let raw_level = cur.u8("level")?;
                let level = LogLevel::from_u8(raw_level)
                    .ok_or_else(|| IrError::parse(lvl_off, format!("invalid level {raw_level}")))?;
                let offset = cur.ivarint("utc offset")?;
                let text = cur.len_prefixed_str("message")?.to_string();
                self.prev_timestamp = timestamp;
                (timestamp, offset, level, EventBody::Text(text))
            }
            StreamType::Structured => {
                let auto_generated = decode_object(&mut cur, "auto-generated record")?;
                let user_generated = decode_object(&mut cur, "user-generated record")?;
                let (level, timestamp, offset) = self.extract_fields(&auto_generated, &user_generated);
                (
                    timestamp,
                    offset,
                    level,
                    EventBody::Structured {
                        auto_generated,
                        user_generated,
                    },
                )
            }
        };
        if !cur.is_empty() {
            return Err(cur.err("trailing bytes in frame payload"));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(LogEvent {
            seq,
            timestamp,
            utc_offset_minutes,
            level,
            body,
        })
    }

    /// 缺失字段或类型不对都回退默认值，不算错误
    fn extract_fields(&self, auto: &Record, user: &Record) -> (LogLevel, i64, i64) {
        let level = self
            .options
            .log_level_key
            .as_ref()
            .and_then(|k| resolve(k, auto, user))
            .map(|v| match v.as_str().and_then(LogLevel::parse) {
                Some(l) => l,
                None => {
                    tracing::trace!("Unparsable log level value {:?} at event {}", v, self.next_seq);
                    LogLevel::None
                }
            })
            .unwrap_or(LogLevel::None);

        let timestamp = self
            .options
            .timestamp_key
            .as_ref()
            .and_then(|k| resolve(k, auto, user))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let offset = self
            .options
            .utc_offset_key
            .as_ref()
            .and_then(|k| resolve(k, auto, user))
            .and_then(Value::as_i64)
            .unwrap_or(self.utc_offset_minutes);

        (level, timestamp, offset)
    }
}

fn resolve<'a>(key: &KeyPath, auto: &'a Record, user: &'a Record) -> Option<&'a Value> {
    let ns = if key.is_auto_generated { auto } else { user };
    Value::lookup(ns, key.parts.as_slice())
}

fn decode_object(cur: &mut ByteCursor<'_>, what: &str) -> Result<Record> {
    let off = cur.offset();
    match decode_value(cur, 0)? {
        Value::Object(m) => Ok(m),
        _ => Err(IrError::parse(off, format!("{what} is not an object"))),
    }
}

fn decode_value(cur: &mut ByteCursor<'_>, depth: usize) -> Result<Value> {
    if depth > MAX_NESTING_DEPTH {
        return Err(cur.err("value nesting too deep"));
    }
    let tag_off = cur.offset();
    Ok(match cur.u8("value tag")? {
        VALUE_NULL => Value::Null,
        VALUE_FALSE => Value::Bool(false),
        VALUE_TRUE => Value::Bool(true),
        VALUE_INT => Value::Int(cur.ivarint("int value")?),
        VALUE_FLOAT => Value::Float(f64::from_bits(cur.i64_le("float value")? as u64)),
        VALUE_STRING => Value::String(cur.len_prefixed_str("string value")?.to_string()),
        VALUE_ARRAY => {
            let n = cur.uvarint("array length")?;
            // 每个元素至少 1 字节，预分配不超过剩余字节数
            let mut items = Vec::with_capacity((n as usize).min(cur.remaining()));
            for _ in 0..n {
                items.push(decode_value(cur, depth + 1)?);
            }
            Value::Array(items)
        }
        VALUE_OBJECT => {
            let n = cur.uvarint("object length")?;
            let mut map = Record::with_capacity((n as usize).min(cur.remaining()));
            for _ in 0..n {
                let key_off = cur.offset();
                let key = cur.len_prefixed_str("object key")?.to_string();
                let value = decode_value(cur, depth + 1)?;
                if map.insert(key, value).is_some() {
                    return Err(IrError::parse(key_off, "duplicate object key"));
                }
            }
            Value::Object(map)
        }
        other => return Err(IrError::parse(tag_off, format!("unknown value tag {other:#04x}"))),
    })
}

/// 有状态的 frame 编码器（非结构化方言的时间戳 delta 基准）
#[derive(Clone, Debug)]
pub struct FrameEncoder {
    stream_type: StreamType,
    prev_timestamp: i64,
}

impl FrameEncoder {
    pub fn new(meta: &StreamMetadata) -> Self {
        Self {
            stream_type: meta.stream_type,
            prev_timestamp: meta.reference_timestamp.unwrap_or(0),
        }
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    /// 预编码 frame 校验通过后，同步 delta 基准
    pub fn set_prev_timestamp(&mut self, ts: i64) {
        self.prev_timestamp = ts;
    }

    pub fn prev_timestamp(&self) -> i64 {
        self.prev_timestamp
    }

    /// 把一条记录编码成完整 frame 追加到 `out`。失败时 `out` 不变。
    pub fn encode_frame(&mut self, record: FrameRecord<'_>, out: &mut Vec<u8>) -> Result<()> {
        let mut payload = Vec::new();
        let mut next_ts = None;
        match (self.stream_type, record) {
            (StreamType::Unstructured, FrameRecord::Text(rec)) => {
                put_ivarint(&mut payload, rec.timestamp.wrapping_sub(self.prev_timestamp));
                payload.push(rec.level.as_u8());
                put_ivarint(&mut payload, rec.utc_offset_minutes);
                put_uvarint(&mut payload, rec.message.len() as u64);
                payload.extend_from_slice(rec.message.as_bytes());
                next_ts = Some(rec.timestamp);
            }
            (
                StreamType::Structured,
                FrameRecord::Structured {
                    auto_generated,
                    user_generated,
                },
            ) => {
                encode_record(auto_generated, &mut payload, 0)?;
                encode_record(user_generated, &mut payload, 0)?;
            }
            (st, _) => {
                return Err(IrError::Encode(format!(
                    "record kind does not match {st} stream"
                )))
            }
        }

        let len: u32 = payload
            .len()
            .try_into()
            .map_err(|_| IrError::Encode("frame payload exceeds 4 GiB".into()))?;
        out.push(TAG_LOG_EVENT);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&payload);
        if let Some(ts) = next_ts {
            self.prev_timestamp = ts;
        }
        Ok(())
    }
}

pub fn encode_utc_offset_change(minutes: i64, out: &mut Vec<u8>) {
    out.push(TAG_UTC_OFFSET_CHANGE);
    out.extend_from_slice(&minutes.to_le_bytes());
}

pub fn encode_eof(out: &mut Vec<u8>) {
    out.push(TAG_EOF);
}

fn encode_record(record: &Record, out: &mut Vec<u8>, depth: usize) -> Result<()> {
    out.push(VALUE_OBJECT);
    put_uvarint(out, record.len() as u64);
    for (k, v) in record {
        put_uvarint(out, k.len() as u64);
        out.extend_from_slice(k.as_bytes());
        encode_value(v, out, depth + 1)?;
    }
    Ok(())
}

fn encode_value(value: &Value, out: &mut Vec<u8>, depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(IrError::Encode("value nesting too deep".into()));
    }
    match value {
        Value::Null => out.push(VALUE_NULL),
        Value::Bool(false) => out.push(VALUE_FALSE),
        Value::Bool(true) => out.push(VALUE_TRUE),
        Value::Int(i) => {
            out.push(VALUE_INT);
            put_ivarint(out, *i);
        }
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(IrError::Encode(format!("non-finite float {f} is not representable")));
            }
            out.push(VALUE_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::String(s) => {
            out.push(VALUE_STRING);
            put_uvarint(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            out.push(VALUE_ARRAY);
            put_uvarint(out, items.len() as u64);
            for item in items {
                encode_value(item, out, depth + 1)?;
            }
        }
        Value::Object(map) => encode_record(map, out, depth)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(ts: i64, level: LogLevel, msg: &str) -> TextRecord {
        TextRecord {
            timestamp: ts,
            level,
            utc_offset_minutes: 60,
            message: msg.to_string(),
        }
    }

    fn stream_with(meta: &StreamMetadata, frames: &[u8]) -> Vec<u8> {
        let mut out = encode_header(meta).unwrap();
        out.extend_from_slice(frames);
        out
    }

    #[test]
    fn header_rejects_bad_magic_and_unknown_dialect() {
        let meta = StreamMetadata::new(StreamType::Unstructured);
        let mut bytes = encode_header(&meta).unwrap();
        let (parsed, n) = decode_header(&bytes).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(n, bytes.len());

        bytes[4] = 9;
        match decode_header(&bytes) {
            Err(IrError::Parse { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("unexpected {:?}", other),
        }
        bytes[0] = b'X';
        assert!(matches!(decode_header(&bytes), Err(IrError::Parse { offset: 0, .. })));
    }

    #[test]
    fn header_rejects_unsupported_version() {
        let mut meta = StreamMetadata::new(StreamType::Structured);
        meta.version = "9.9.9".into();
        let bytes = encode_header(&meta).unwrap();
        assert!(matches!(decode_header(&bytes), Err(IrError::Parse { .. })));
    }

    #[test]
    fn unstructured_frames_carry_delta_timestamps() {
        let mut meta = StreamMetadata::new(StreamType::Unstructured);
        meta.reference_timestamp = Some(1_700_000_000_000);
        let mut enc = FrameEncoder::new(&meta);
        let mut frames = Vec::new();
        enc.encode_frame(FrameRecord::Text(&text(1_700_000_000_005, LogLevel::Info, "a")), &mut frames)
            .unwrap();
        enc.encode_frame(FrameRecord::Text(&text(1_699_999_999_990, LogLevel::Warn, "b")), &mut frames)
            .unwrap();
        encode_eof(&mut frames);

        let bytes = stream_with(&meta, &frames);
        let (meta2, mut pos) = decode_header(&bytes).unwrap();
        let mut dec = FrameDecoder::new(&meta2, ReaderOptions::default());
        let mut got = Vec::new();
        loop {
            match dec.decode_next(&bytes, pos).unwrap() {
                Decoded::Event { event, consumed } => {
                    pos += consumed;
                    got.push(event);
                }
                Decoded::EndOfStream { consumed } => {
                    pos += consumed;
                    break;
                }
            }
        }
        assert_eq!(pos, bytes.len());
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].timestamp, 1_700_000_000_005);
        assert_eq!(got[1].timestamp, 1_699_999_999_990);
        assert_eq!(got[1].level, LogLevel::Warn);
        assert_eq!(got[1].seq, 2);
        assert_eq!(got[0].utc_offset_minutes, 60);
    }

    #[test]
    fn structured_fields_fall_back_when_key_missing_or_mistyped() {
        let meta = StreamMetadata::new(StreamType::Structured);
        let mut enc = FrameEncoder::new(&meta);
        let mut user = Record::new();
        user.insert("level".into(), Value::from("error"));
        user.insert("ts".into(), Value::from("not-a-number"));
        let auto = Record::new();
        let mut frames = Vec::new();
        encode_utc_offset_change(-300, &mut frames);
        enc.encode_frame(
            FrameRecord::Structured {
                auto_generated: &auto,
                user_generated: &user,
            },
            &mut frames,
        )
        .unwrap();
        encode_eof(&mut frames);
        let bytes = stream_with(&meta, &frames);

        let opts = ReaderOptions {
            log_level_key: Some(KeyPath::user(["level"])),
            timestamp_key: Some(KeyPath::user(["ts"])),
            utc_offset_key: Some(KeyPath::auto(["tz"])),
        };
        let (meta2, pos) = decode_header(&bytes).unwrap();
        let mut dec = FrameDecoder::new(&meta2, opts);
        let Decoded::Event { event, .. } = dec.decode_next(&bytes, pos).unwrap() else {
            panic!("expected event");
        };
        assert_eq!(event.level, LogLevel::Error);
        assert_eq!(event.timestamp, 0);
        assert_eq!(event.utc_offset_minutes, -300);
    }

    #[test]
    fn corrupt_payload_reports_offset() {
        let meta = StreamMetadata::new(StreamType::Structured);
        let header_len = encode_header(&meta).unwrap().len();
        // payload 声称 4 字节但第一个 value tag 非法
        let frames = [TAG_LOG_EVENT, 4, 0, 0, 0, 0xEE, 0, 0, 0, TAG_EOF];
        let bytes = stream_with(&meta, &frames);
        let mut dec = FrameDecoder::new(&meta, ReaderOptions::default());
        match dec.decode_next(&bytes, header_len) {
            Err(IrError::Parse { offset, .. }) => assert_eq!(offset, (header_len + 5) as u64),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_eof_is_a_parse_error() {
        let meta = StreamMetadata::new(StreamType::Unstructured);
        let mut enc = FrameEncoder::new(&meta);
        let mut frames = Vec::new();
        enc.encode_frame(FrameRecord::Text(&text(1, LogLevel::Info, "x")), &mut frames)
            .unwrap();
        let bytes = stream_with(&meta, &frames);
        let (_, pos) = decode_header(&bytes).unwrap();
        let mut dec = FrameDecoder::new(&meta, ReaderOptions::default());
        let Decoded::Event { consumed, .. } = dec.decode_next(&bytes, pos).unwrap() else {
            panic!("expected event");
        };
        assert!(matches!(
            dec.decode_next(&bytes, pos + consumed),
            Err(IrError::Parse { .. })
        ));
    }

    /// auto 为空对象，user 为 `{"k": {"k": ... null}}`，null 位于第 `leaf_depth` 层
    fn nested_frame(leaf_depth: usize) -> Vec<u8> {
        let mut payload = vec![VALUE_OBJECT, 0];
        for _ in 0..leaf_depth {
            payload.extend_from_slice(&[VALUE_OBJECT, 1, 1, b'k']);
        }
        payload.push(VALUE_NULL);
        let mut frame = vec![TAG_LOG_EVENT];
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        encode_eof(&mut frame);
        frame
    }

    #[test]
    fn decoder_nesting_limit_is_inclusive() {
        let meta = StreamMetadata::new(StreamType::Structured);
        let header_len = encode_header(&meta).unwrap().len();

        let bytes = stream_with(&meta, &nested_frame(MAX_NESTING_DEPTH));
        let mut dec = FrameDecoder::new(&meta, ReaderOptions::default());
        let Decoded::Event { event, .. } = dec.decode_next(&bytes, header_len).unwrap() else {
            panic!("expected event");
        };
        let mut v = &Value::Object(event.user_generated().unwrap().clone());
        let mut levels = 0;
        while let Value::Object(m) = v {
            v = &m["k"];
            levels += 1;
        }
        assert_eq!(levels, MAX_NESTING_DEPTH);
        assert_eq!(*v, Value::Null);

        let bytes = stream_with(&meta, &nested_frame(MAX_NESTING_DEPTH + 1));
        let mut dec = FrameDecoder::new(&meta, ReaderOptions::default());
        assert!(matches!(
            dec.decode_next(&bytes, header_len),
            Err(IrError::Parse { .. })
        ));
    }

    #[test]
    fn huge_collection_length_is_a_parse_error() {
        let meta = StreamMetadata::new(StreamType::Structured);
        let header_len = encode_header(&meta).unwrap().len();
        for tag in [VALUE_ARRAY, VALUE_OBJECT] {
            let mut payload = vec![VALUE_OBJECT, 0, VALUE_OBJECT, 1, 1, b'k', tag];
            put_uvarint(&mut payload, 1 << 40);
            let mut frames = vec![TAG_LOG_EVENT];
            frames.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            frames.extend_from_slice(&payload);
            encode_eof(&mut frames);
            let bytes = stream_with(&meta, &frames);
            let mut dec = FrameDecoder::new(&meta, ReaderOptions::default());
            assert!(matches!(
                dec.decode_next(&bytes, header_len),
                Err(IrError::Parse { .. })
            ));
        }
    }

    #[test]
    fn non_finite_floats_and_dialect_mismatch_fail_to_encode() {
        let meta = StreamMetadata::new(StreamType::Structured);
        let mut enc = FrameEncoder::new(&meta);
        let mut user = Record::new();
        user.insert("x".into(), Value::Float(f64::NAN));
        let auto = Record::new();
        let mut out = Vec::new();
        let res = enc.encode_frame(
            FrameRecord::Structured {
                auto_generated: &auto,
                user_generated: &user,
            },
            &mut out,
        );
        assert!(matches!(res, Err(IrError::Encode(_))));
        assert!(out.is_empty());

        let res = enc.encode_frame(FrameRecord::Text(&text(0, LogLevel::Info, "x")), &mut out);
        assert!(matches!(res, Err(IrError::Encode(_))));
    }
}
