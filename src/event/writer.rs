use std::time::Instant;

use bytes::Bytes;

use crate::core::error::{IrError, Result};
use crate::core::options::{ReaderOptions, WriterConfig};
use crate::core::types::StreamType;
use crate::core::value::{Record, Value};
use crate::event::sink::ByteSink;
use crate::storage::compress::{Compressor, ZstdCompressor};
use crate::storage::frame::{
    encode_eof, encode_header, encode_utc_offset_change, Decoded, FrameDecoder, FrameEncoder,
    FrameRecord, StreamMetadata, TextRecord,
};

/// IR buffer 攒到这么多字节再喂给压缩器
pub const IR_BUFFER_THRESHOLD: usize = 64 * 1024;

/// `StreamWriter::write` 的输入
#[derive(Clone, Debug)]
pub enum WriteRecord {
    /// 已编码好的完整 frame；写入前会解码校验
    Encoded(Vec<u8>),
    Structured {
        auto_generated: Record,
        user_generated: Record,
    },
    /// 必须是 object，作为 user-generated 记录写入
    Value(Value),
    Text(TextRecord),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriterState {
    Open,
    Closed,
    Aborted,
    /// sink 出错后已送出的字节有缺口，只允许 abort
    Failed,
}

/// IR 流写入器：编码 → IR buffer → zstd → sink
///
/// ## 契约
/// - 写入顺序 = sink 收到的字节顺序。
/// - 单条记录的 EncodeError 不影响后续写入。
/// - close / abort 之后所有调用返回 `ClosedStream`。
/// - sink 出错后除 abort 以外的调用都返回 `Sink` 错误。
pub struct StreamWriter<S: ByteSink> {
    sink: S,
    metadata: StreamMetadata,
    encoder: FrameEncoder,
    compressor: Option<Box<dyn Compressor>>,
    ir_buffer: Vec<u8>,
    state: WriterState,
    events_written: u64,
    ir_bytes: u64,
    bytes_out: u64,
}

impl<S: ByteSink> StreamWriter<S> {
    /// 校验压缩等级，启动 sink 并写入 header（header 随第一次 flush 送出）
    pub async fn open(mut sink: S, config: WriterConfig) -> Result<Self> {
        let compressor: Box<dyn Compressor> = Box::new(ZstdCompressor::new(config.compression_level)?);
        let metadata = StreamMetadata {
            reference_timestamp: config.reference_timestamp,
            timezone_id: config.timezone_id,
            utc_offset_minutes: config.utc_offset_minutes,
            user_defined: config.user_defined_metadata,
            ..StreamMetadata::new(config.stream_type)
        };
        let header = encode_header(&metadata)?;

        sink.start().await?;
        tracing::info!(
            "Opened {} IR writer (zstd level {})",
            metadata.stream_type,
            config.compression_level
        );

        let mut ir_buffer = Vec::with_capacity(IR_BUFFER_THRESHOLD + 4096);
        ir_buffer.extend_from_slice(&header);
        Ok(Self {
            sink,
            encoder: FrameEncoder::new(&metadata),
            metadata,
            compressor: Some(compressor),
            ir_bytes: ir_buffer.len() as u64,
            ir_buffer,
            state: WriterState::Open,
            events_written: 0,
            bytes_out: 0,
        })
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn stream_type(&self) -> StreamType {
        self.metadata.stream_type
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// 已交给 sink 的压缩字节数
    pub fn bytes_written(&self) -> u64 {
        self.bytes_out
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub async fn write(&mut self, record: WriteRecord) -> Result<()> {
        self.ensure_open()?;
        let before = self.ir_buffer.len();
        match record {
            WriteRecord::Encoded(frame) => self.append_encoded(&frame)?,
            WriteRecord::Structured {
                auto_generated,
                user_generated,
            } => self.encoder.encode_frame(
                FrameRecord::Structured {
                    auto_generated: &auto_generated,
                    user_generated: &user_generated,
                },
                &mut self.ir_buffer,
            )?,
            WriteRecord::Value(Value::Object(user_generated)) => self.encoder.encode_frame(
                FrameRecord::Structured {
                    auto_generated: &Record::new(),
                    user_generated: &user_generated,
                },
                &mut self.ir_buffer,
            )?,
            WriteRecord::Value(_) => {
                return Err(IrError::Encode("top-level value must be an object".into()))
            }
            WriteRecord::Text(rec) => self
                .encoder
                .encode_frame(FrameRecord::Text(&rec), &mut self.ir_buffer)?,
        }
        self.events_written += 1;
        self.ir_bytes += (self.ir_buffer.len() - before) as u64;

        if self.ir_buffer.len() >= IR_BUFFER_THRESHOLD {
            self.drain_ir_buffer().await?;
        }
        Ok(())
    }

    /// 之后的事件在结构化方言中默认使用新的 offset
    pub async fn write_utc_offset_change(&mut self, minutes: i64) -> Result<()> {
        self.ensure_open()?;
        encode_utc_offset_change(minutes, &mut self.ir_buffer);
        self.ir_bytes += 9;
        Ok(())
    }

    /// 把 IR buffer 和压缩器内部缓冲全部推给 sink
    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.drain_ir_buffer().await?;
        let compressor = self.compressor_mut()?;
        let res = compressor.flush().map(|()| compressor.take_output());
        let out = res.map_err(|e| self.fail(e))?;
        self.push(out).await?;
        tracing::debug!(
            "Flushed IR writer: {} events, {} bytes out",
            self.events_written,
            self.bytes_out
        );
        Ok(())
    }

    /// 写 end-of-stream、结束 zstd frame、关闭 sink（等待排空）
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        let start = Instant::now();
        encode_eof(&mut self.ir_buffer);
        self.ir_bytes += 1;
        self.drain_ir_buffer().await?;

        let compressor = self.compressor.take().ok_or(IrError::ClosedStream)?;
        let tail = compressor.finish().map_err(|e| self.fail(e))?;
        self.push(tail).await?;
        self.sink.close().await.map_err(|e| self.fail(e))?;
        self.state = WriterState::Closed;
        tracing::info!(
            "Closed IR writer: {} events, {} IR bytes -> {} compressed bytes in {:?}",
            self.events_written,
            self.ir_bytes,
            self.bytes_out,
            start.elapsed()
        );
        Ok(())
    }

    /// 立即终止：不 flush，reason 传给 sink
    pub async fn abort(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.state != WriterState::Failed {
            self.ensure_open()?;
        }
        let reason = reason.into();
        self.state = WriterState::Aborted;
        self.compressor = None;
        self.ir_buffer = Vec::new();
        tracing::warn!("Aborting IR writer after {} events: {}", self.events_written, reason);
        self.sink.abort(reason).await;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Closed | WriterState::Aborted => Err(IrError::ClosedStream),
            WriterState::Failed => Err(IrError::Sink("writer failed on a sink error".into())),
        }
    }

    fn fail(&mut self, err: IrError) -> IrError {
        tracing::warn!("IR writer failed after {} events: {}", self.events_written, err);
        self.state = WriterState::Failed;
        err
    }

    fn compressor_mut(&mut self) -> Result<&mut Box<dyn Compressor>> {
        self.compressor.as_mut().ok_or(IrError::ClosedStream)
    }

    /// 预编码 frame：必须恰好是一个合法的事件 frame
    fn append_encoded(&mut self, frame: &[u8]) -> Result<()> {
        let mut decoder = FrameDecoder::new(&self.metadata, ReaderOptions::default())
            .with_prev_timestamp(self.encoder.prev_timestamp());
        let event = match decoder.decode_next(frame, 0) {
            Ok(Decoded::Event { event, consumed }) if consumed == frame.len() => event,
            Ok(Decoded::Event { .. }) => {
                return Err(IrError::Encode("pre-encoded input holds more than one frame".into()))
            }
            Ok(Decoded::EndOfStream { .. }) => {
                return Err(IrError::Encode("pre-encoded input is an end-of-stream marker".into()))
            }
            Err(e) => return Err(IrError::Encode(format!("invalid pre-encoded frame: {e}"))),
        };
        if self.metadata.stream_type == StreamType::Unstructured {
            self.encoder.set_prev_timestamp(event.timestamp);
        }
        self.ir_buffer.extend_from_slice(frame);
        Ok(())
    }

    async fn drain_ir_buffer(&mut self) -> Result<()> {
        if self.ir_buffer.is_empty() {
            return Ok(());
        }
        let buf = std::mem::take(&mut self.ir_buffer);
        let compressor = self.compressor_mut()?;
        let res = compressor.write(&buf).map(|()| compressor.take_output());
        self.ir_buffer = buf;
        self.ir_buffer.clear();
        let out = res.map_err(|e| self.fail(e))?;
        self.push(out).await
    }

    /// 按 sink 的背压推送一块压缩字节
    async fn push(&mut self, chunk: Vec<u8>) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if self.sink.desired_size() <= 0 {
            self.sink.ready().await.map_err(|e| self.fail(e))?;
        }
        let len = chunk.len() as u64;
        self.sink
            .write(Bytes::from(chunk))
            .await
            .map_err(|e| self.fail(e))?;
        self.bytes_out += len;
        Ok(())
    }
}
