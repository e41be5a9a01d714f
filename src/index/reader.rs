use std::time::Instant;

use crate::core::error::Result;
use crate::core::event::LogEvent;
use crate::core::options::ReaderOptions;
use crate::core::types::StreamType;
use crate::index::event_index::EventIndex;
use crate::query::filter::FilterState;
use crate::stats::ReaderStats;
use crate::storage::compress::decompress;
use crate::storage::frame::{decode_header, Decoded, FrameDecoder, StreamMetadata};

/// IR 流读取器：解压 + header 在 open 时完成，frame 解码推迟到 `deserialize_stream`。
///
/// ## 契约
/// - 解码失败不提交任何事件（staging 后一次性 commit）。
/// - 成功解码后再次调用直接返回已有数量。
/// - 所有返回的事件都是 clone，reader drop 后依旧有效。
#[derive(Debug)]
pub struct StreamReader {
    metadata: StreamMetadata,
    options: ReaderOptions,
    /// 解压后的字节；解码成功后释放
    bytes: Vec<u8>,
    header_len: usize,
    compressed_len: usize,
    decompressed_len: usize,
    index: EventIndex,
    filter: FilterState,
    decoded: bool,
}

impl StreamReader {
    pub fn open(input: &[u8], options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        let bytes = decompress(input)?;
        let (metadata, header_len) = decode_header(&bytes)?;
        tracing::info!(
            "Opened {} IR stream (version {}, {} bytes decompressed)",
            metadata.stream_type,
            metadata.version,
            bytes.len()
        );
        Ok(Self {
            metadata,
            options,
            decompressed_len: bytes.len(),
            bytes,
            header_len,
            compressed_len: input.len(),
            index: EventIndex::new(),
            filter: FilterState::default(),
            decoded: false,
        })
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn ir_stream_type(&self) -> StreamType {
        self.metadata.stream_type
    }

    pub fn num_events_buffered(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &EventIndex {
        &self.index
    }

    /// 解码全部 frame，返回事件总数
    pub fn deserialize_stream(&mut self) -> Result<usize> {
        if self.decoded {
            return Ok(self.index.len());
        }
        let start = Instant::now();
        let mut decoder = FrameDecoder::new(&self.metadata, self.options.clone());
        let mut staged = Vec::new();
        let mut cursor = self.header_len;
        loop {
            match decoder.decode_next(&self.bytes, cursor)? {
                Decoded::Event { event, consumed } => {
                    cursor += consumed;
                    staged.push(event);
                }
                Decoded::EndOfStream { consumed } => {
                    cursor += consumed;
                    break;
                }
            }
        }
        if cursor < self.bytes.len() {
            tracing::debug!(
                "Ignoring {} trailing bytes after end-of-stream marker",
                self.bytes.len() - cursor
            );
        }

        let n = staged.len();
        self.index.commit(staged);
        self.decoded = true;
        self.bytes = Vec::new();
        tracing::info!("Decoded {} log events in {:?}", n, start.elapsed());
        Ok(self.index.len())
    }

    /// `[begin, end)`；`use_filter` 且有生效 filter 时按 filter map 寻址
    pub fn decode_range(&self, begin: usize, end: usize, use_filter: bool) -> Option<Vec<LogEvent>> {
        self.index.decode_range(begin, end, self.view(use_filter))
    }

    /// 返回 EventIndex 中的位置（不是 filter map 中的位置）
    pub fn find_nearest_log_event_by_timestamp(&self, timestamp: i64) -> Option<usize> {
        self.index.find_nearest_by_timestamp(timestamp, self.view(true))
    }

    /// `levels` 与 `query` 都为 None 时清空 filter；两者同时给出取交集
    pub fn filter_log_events(&mut self, levels: Option<&[u8]>, query: Option<&str>) -> Result<()> {
        let stream_type = self.ir_stream_type();
        self.filter.apply(&self.index, stream_type, levels, query)
    }

    pub fn filtered_log_event_map(&self) -> Option<&[u64]> {
        self.filter.map()
    }

    pub fn stats(&self) -> ReaderStats {
        let mut stats = ReaderStats {
            stream_type: self.ir_stream_type(),
            compressed_bytes: self.compressed_len as u64,
            decompressed_bytes: self.decompressed_len as u64,
            events_buffered: self.index.len(),
            filtered_events: self.filter.map().map(<[u64]>::len),
            ..ReaderStats::default()
        };
        for ev in self.index.iter() {
            stats.record(ev.level, ev.timestamp);
        }
        stats
    }

    fn view(&self, use_filter: bool) -> Option<&[u64]> {
        if use_filter {
            self.filter.map()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::IrError;
    use crate::core::options::KeyPath;
    use crate::core::types::LogLevel;
    use crate::core::value::{Record, Value};
    use crate::storage::compress::{Compressor, ZstdCompressor};
    use crate::storage::frame::{
        encode_eof, encode_header, encode_utc_offset_change, FrameEncoder, FrameRecord, TextRecord,
    };

    fn compress(plain: &[u8]) -> Vec<u8> {
        let mut c: Box<dyn Compressor> = Box::new(ZstdCompressor::new(3).unwrap());
        c.write(plain).unwrap();
        let mut out = c.take_output();
        out.extend(c.finish().unwrap());
        out
    }

    /// 结构化流：user 记录带 level / ts / msg
    fn structured_stream(rows: &[(&str, i64, &str)]) -> Vec<u8> {
        let meta = StreamMetadata::new(StreamType::Structured);
        let mut enc = FrameEncoder::new(&meta);
        let mut plain = encode_header(&meta).unwrap();
        for (level, ts, msg) in rows {
            let mut user = Record::new();
            user.insert("level".into(), Value::from(*level));
            user.insert("ts".into(), Value::Int(*ts));
            user.insert("msg".into(), Value::from(*msg));
            let mut auto = Record::new();
            auto.insert("tz".into(), Value::Int(120));
            enc.encode_frame(
                FrameRecord::Structured {
                    auto_generated: &auto,
                    user_generated: &user,
                },
                &mut plain,
            )
            .unwrap();
        }
        encode_eof(&mut plain);
        compress(&plain)
    }

    fn structured_options() -> ReaderOptions {
        ReaderOptions {
            log_level_key: Some(KeyPath::user(["level"])),
            timestamp_key: Some(KeyPath::user(["ts"])),
            utc_offset_key: None,
        }
    }

    fn unstructured_plain(count: usize) -> Vec<u8> {
        let mut meta = StreamMetadata::new(StreamType::Unstructured);
        meta.reference_timestamp = Some(1_000);
        let mut enc = FrameEncoder::new(&meta);
        let mut plain = encode_header(&meta).unwrap();
        for i in 0..count {
            if i == 2 {
                encode_utc_offset_change(330, &mut plain);
            }
            let rec = TextRecord {
                timestamp: 1_000 + i as i64 * 10,
                level: LogLevel::ALL[i % LogLevel::ALL.len()],
                utc_offset_minutes: 0,
                message: format!("line {i}"),
            };
            enc.encode_frame(FrameRecord::Text(&rec), &mut plain).unwrap();
        }
        encode_eof(&mut plain);
        plain
    }

    #[test]
    fn structured_stream_extracts_configured_fields() {
        let bytes = structured_stream(&[("INFO", 10, "a"), ("error", 20, "b"), ("bogus", 30, "c")]);
        let mut reader = StreamReader::open(&bytes, structured_options()).unwrap();
        assert_eq!(reader.ir_stream_type(), StreamType::Structured);
        assert_eq!(reader.deserialize_stream().unwrap(), 3);
        let evs = reader.decode_range(0, 3, false).unwrap();
        assert_eq!(evs[0].level, LogLevel::Info);
        assert_eq!(evs[1].level, LogLevel::Error);
        assert_eq!(evs[2].level, LogLevel::None);
        assert_eq!(evs[1].timestamp, 20);
        assert_eq!(evs.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn deserialize_is_idempotent() {
        let bytes = structured_stream(&[("INFO", 1, "x"), ("INFO", 2, "y")]);
        let mut reader = StreamReader::open(&bytes, ReaderOptions::default()).unwrap();
        assert_eq!(reader.num_events_buffered(), 0);
        assert_eq!(reader.deserialize_stream().unwrap(), 2);
        assert_eq!(reader.deserialize_stream().unwrap(), 2);
        assert_eq!(reader.num_events_buffered(), 2);
    }

    #[test]
    fn raw_unstructured_stream_tracks_offset_changes() {
        let plain = unstructured_plain(4);
        let mut reader = StreamReader::open(&plain, ReaderOptions::default()).unwrap();
        assert_eq!(reader.metadata().reference_timestamp, Some(1_000));
        reader.deserialize_stream().unwrap();
        let evs = reader.decode_range(0, 4, false).unwrap();
        assert_eq!(evs[3].timestamp, 1_030);
        assert_eq!(evs[3].message(), "line 3");
        // 非结构化 frame 自带 offset，不受变更包影响
        assert_eq!(evs[3].utc_offset_minutes, 0);
    }

    #[test]
    fn truncated_stream_commits_nothing() {
        let mut plain = unstructured_plain(5);
        plain.truncate(plain.len() - 3);
        let mut reader = StreamReader::open(&compress(&plain), ReaderOptions::default()).unwrap();
        assert!(matches!(reader.deserialize_stream(), Err(IrError::Parse { .. })));
        assert_eq!(reader.num_events_buffered(), 0);
        assert!(reader.decode_range(0, 1, false).is_none());
    }

    #[test]
    fn open_rejects_invalid_options_and_garbage() {
        let opts = ReaderOptions {
            log_level_key: Some(KeyPath::user(Vec::<String>::new())),
            ..Default::default()
        };
        let bytes = structured_stream(&[]);
        assert!(matches!(StreamReader::open(&bytes, opts), Err(IrError::InvalidConfig(_))));
        assert!(matches!(
            StreamReader::open(b"\x00\x01\x02\x03", ReaderOptions::default()),
            Err(IrError::Parse { .. })
        ));
    }

    #[test]
    fn filter_then_range_and_nearest() {
        let bytes = structured_stream(&[
            ("INFO", 100, "boot"),
            ("ERROR", 200, "disk full"),
            ("WARN", 300, "slow"),
            ("ERROR", 400, "disk gone"),
        ]);
        let mut reader = StreamReader::open(&bytes, structured_options()).unwrap();
        reader.deserialize_stream().unwrap();

        // 无 filter 时 use_filter 退化为全量
        assert_eq!(reader.decode_range(0, 4, true).unwrap().len(), 4);

        reader
            .filter_log_events(Some(&[LogLevel::Error.as_u8()][..]), Some("msg:disk*"))
            .unwrap();
        assert_eq!(reader.filtered_log_event_map(), Some(&[1u64, 3][..]));
        let evs = reader.decode_range(0, 2, true).unwrap();
        assert_eq!(evs[1].seq, 4);
        assert!(reader.decode_range(0, 3, true).is_none());

        assert_eq!(reader.find_nearest_log_event_by_timestamp(290), Some(1));
        assert_eq!(reader.find_nearest_log_event_by_timestamp(310), Some(3));

        reader.filter_log_events(None, Some("msg:nothing")).unwrap();
        assert_eq!(reader.find_nearest_log_event_by_timestamp(310), None);

        reader.filter_log_events(None, None).unwrap();
        assert_eq!(reader.find_nearest_log_event_by_timestamp(310), Some(2));

        let stats = reader.stats();
        assert_eq!(stats.events_buffered, 4);
        assert_eq!(stats.level_counts[LogLevel::Error.as_u8() as usize], 2);
        assert_eq!(stats.timestamp_range, Some((100, 400)));
    }

    #[test]
    fn empty_stream_has_no_nearest_event() {
        let bytes = structured_stream(&[]);
        let mut reader = StreamReader::open(&bytes, ReaderOptions::default()).unwrap();
        assert_eq!(reader.deserialize_stream().unwrap(), 0);
        assert_eq!(reader.find_nearest_log_event_by_timestamp(0), None);
        assert_eq!(reader.decode_range(0, 0, false).unwrap().len(), 0);
    }
}
