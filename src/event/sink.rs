//! 字节下游（sink）抽象。
//!
//! Writer 只通过 [`ByteSink`] 推送压缩后的字节；背压通过 `desired_size` / `ready`
//! 暴露，语义对齐 WHATWG `WritableStream` + `ByteLengthQueuingStrategy`。
//!
//! ## 实现
//! - [`ChannelSink`]：字节预算 semaphore + unbounded channel，消费端为 [`ChannelSinkReceiver`]
//! - [`VecSink`]：内存 sink，测试用

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use crate::core::error::{IrError, Result};

/// 默认高水位：64 KiB 的排队字节
pub const DEFAULT_HIGH_WATER_MARK: u32 = 64 * 1024;

#[async_trait]
pub trait ByteSink: Send {
    /// 在第一次 write 之前调用恰好一次
    async fn start(&mut self) -> Result<()>;

    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// 可能挂起直到下游排空
    async fn close(&mut self) -> Result<()>;

    async fn abort(&mut self, reason: String);

    /// 高水位 - 已排队字节；<= 0 表示应等待 `ready`
    fn desired_size(&self) -> i64;

    /// desired size > 0 时返回
    async fn ready(&mut self) -> Result<()>;
}

/// 消费端看到的事件
#[derive(Debug, PartialEq, Eq)]
pub enum SinkEvent {
    Chunk(Bytes),
    Closed,
    Aborted(String),
}

#[derive(Debug)]
enum SinkMessage {
    /// permit 随 chunk 一起走，消费端取出时归还字节预算
    Chunk(Bytes, OwnedSemaphorePermit),
    Closed,
    Aborted(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SinkState {
    Idle,
    Writable,
    Closed,
    Aborted,
}

/// 字节预算背压的 channel sink
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkMessage>,
    budget: Arc<Semaphore>,
    high_water_mark: u32,
    state: SinkState,
}

impl ChannelSink {
    pub fn new(high_water_mark: u32) -> Result<(Self, ChannelSinkReceiver)> {
        if high_water_mark == 0 {
            return Err(IrError::InvalidConfig("sink high-water mark must be > 0".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            budget: Arc::new(Semaphore::new(high_water_mark as usize)),
            high_water_mark,
            state: SinkState::Idle,
        };
        Ok((sink, ChannelSinkReceiver { rx }))
    }

    pub fn high_water_mark(&self) -> u32 {
        self.high_water_mark
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.state {
            SinkState::Writable => Ok(()),
            SinkState::Idle => Err(IrError::Sink("sink not started".into())),
            SinkState::Closed => Err(IrError::Sink("sink already closed".into())),
            SinkState::Aborted => Err(IrError::Sink("sink aborted".into())),
        }
    }

    fn send(&self, msg: SinkMessage) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| IrError::Sink("receiver dropped".into()))
    }
}

#[async_trait]
impl ByteSink for ChannelSink {
    async fn start(&mut self) -> Result<()> {
        if self.state != SinkState::Idle {
            return Err(IrError::Sink("sink started twice".into()));
        }
        self.state = SinkState::Writable;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.ensure_writable()?;
        if chunk.is_empty() {
            return Ok(());
        }
        // 超过高水位的 chunk 只占满整个预算，否则永远拿不到 permit
        let cost = u32::try_from(chunk.len()).unwrap_or(u32::MAX).min(self.high_water_mark);
        let permit = self
            .budget
            .clone()
            .acquire_many_owned(cost)
            .await
            .map_err(|_| IrError::Sink("sink aborted".into()))?;
        self.send(SinkMessage::Chunk(chunk, permit))
    }

    async fn close(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.send(SinkMessage::Closed)?;
        self.state = SinkState::Closed;
        // 等全部预算回来 = 队列已排空
        let drained = self
            .budget
            .acquire_many(self.high_water_mark)
            .await
            .map_err(|_| IrError::Sink("sink aborted while draining".into()))?;
        drop(drained);
        tracing::debug!("Channel sink drained and closed");
        Ok(())
    }

    async fn abort(&mut self, reason: String) {
        if matches!(self.state, SinkState::Aborted) {
            return;
        }
        self.state = SinkState::Aborted;
        self.budget.close();
        // 消费端可能已经不在了
        let _ = self.tx.send(SinkMessage::Aborted(reason));
    }

    fn desired_size(&self) -> i64 {
        if self.budget.is_closed() {
            return 0;
        }
        self.budget.available_permits() as i64
    }

    async fn ready(&mut self) -> Result<()> {
        let permit = self
            .budget
            .acquire()
            .await
            .map_err(|_| IrError::Sink("sink aborted".into()))?;
        drop(permit);
        Ok(())
    }
}

/// ChannelSink 的消费端
pub struct ChannelSinkReceiver {
    rx: mpsc::UnboundedReceiver<SinkMessage>,
}

impl ChannelSinkReceiver {
    /// 取出 chunk 即归还其字节预算；sink 被 drop 后返回 None
    pub async fn recv(&mut self) -> Option<SinkEvent> {
        Some(match self.rx.recv().await? {
            SinkMessage::Chunk(bytes, permit) => {
                drop(permit);
                SinkEvent::Chunk(bytes)
            }
            SinkMessage::Closed => SinkEvent::Closed,
            SinkMessage::Aborted(reason) => SinkEvent::Aborted(reason),
        })
    }

    /// 收集到 Closed 为止；abort 变成 Sink 错误
    pub async fn collect(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.recv().await {
                Some(SinkEvent::Chunk(b)) => out.extend_from_slice(&b),
                Some(SinkEvent::Closed) => return Ok(out),
                Some(SinkEvent::Aborted(reason)) => return Err(IrError::Sink(reason)),
                None => return Err(IrError::Sink("sink dropped before close".into())),
            }
        }
    }
}

/// 内存 sink：全部字节拼进一个 Vec
#[derive(Debug, Default)]
pub struct VecSink {
    pub data: Vec<u8>,
    pub chunks: usize,
    pub start_calls: usize,
    pub closed: bool,
    pub abort_reason: Option<String>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ByteSink for VecSink {
    async fn start(&mut self) -> Result<()> {
        self.start_calls += 1;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        if self.closed || self.abort_reason.is_some() {
            return Err(IrError::Sink("write after close".into()));
        }
        self.chunks += 1;
        self.data.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    async fn abort(&mut self, reason: String) {
        self.abort_reason = Some(reason);
    }

    fn desired_size(&self) -> i64 {
        i64::MAX
    }

    async fn ready(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn write_blocks_when_budget_is_exhausted() {
        let (mut sink, mut rx) = ChannelSink::new(4).unwrap();
        sink.start().await.unwrap();
        sink.write(Bytes::from_static(b"abcd")).await.unwrap();
        assert_eq!(sink.desired_size(), 0);

        let pending = tokio::time::timeout(Duration::from_millis(50), sink.write(Bytes::from_static(b"ef"))).await;
        assert!(pending.is_err(), "write should wait for the consumer");

        assert_eq!(rx.recv().await, Some(SinkEvent::Chunk(Bytes::from_static(b"abcd"))));
        assert_eq!(sink.desired_size(), 4);
        sink.ready().await.unwrap();
        sink.write(Bytes::from_static(b"ef")).await.unwrap();
        assert_eq!(sink.desired_size(), 2);
    }

    #[tokio::test]
    async fn oversized_chunk_takes_whole_budget() {
        let (mut sink, rx) = ChannelSink::new(4).unwrap();
        sink.start().await.unwrap();
        sink.write(Bytes::from(vec![7u8; 10])).await.unwrap();
        assert_eq!(sink.desired_size(), 0);
        let consumer = tokio::spawn(rx.collect());
        sink.close().await.unwrap();
        assert_eq!(consumer.await.unwrap().unwrap(), vec![7u8; 10]);
    }

    #[tokio::test]
    async fn close_waits_for_drain() {
        let (mut sink, mut rx) = ChannelSink::new(8).unwrap();
        sink.start().await.unwrap();
        sink.write(Bytes::from_static(b"xyz")).await.unwrap();
        {
            let close = sink.close();
            tokio::pin!(close);
            assert!(tokio::time::timeout(Duration::from_millis(50), &mut close).await.is_err());
            assert!(matches!(rx.recv().await, Some(SinkEvent::Chunk(_))));
            close.await.unwrap();
        }
        assert_eq!(rx.recv().await, Some(SinkEvent::Closed));
        assert!(sink.write(Bytes::from_static(b"late")).await.is_err());
    }

    #[tokio::test]
    async fn abort_reaches_consumer_and_fails_writes() {
        let (mut sink, rx) = ChannelSink::new(8).unwrap();
        sink.start().await.unwrap();
        sink.write(Bytes::from_static(b"ab")).await.unwrap();
        sink.abort("boom".into()).await;
        assert!(matches!(sink.write(Bytes::from_static(b"c")).await, Err(IrError::Sink(_))));
        match rx.collect().await {
            Err(IrError::Sink(reason)) => assert_eq!(reason, "boom"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn write_before_start_is_rejected() {
        let (mut sink, _rx) = ChannelSink::new(8).unwrap();
        assert!(sink.write(Bytes::from_static(b"a")).await.is_err());
        assert!(ChannelSink::new(0).is_err());
    }
}
