//! 压缩适配层：IR 字节流外面包一层通用压缩（zstd）。
//!
//! frame codec 只看到解压后的字节；压缩格式对它不可见。

use std::io::Write;

use crate::core::error::{IrError, Result};
use crate::storage::frame::IR_MAGIC;

/// zstd frame magic（LE 0xFD2FB528）
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// 流式压缩器：写入明文，按需取走已产出的压缩字节
pub trait Compressor: Send {
    fn write(&mut self, data: &[u8]) -> Result<()>;
    /// 取走目前已产出的压缩字节（可能为空）
    fn take_output(&mut self) -> Vec<u8>;
    /// 把内部缓冲全部推出（不结束 frame）
    fn flush(&mut self) -> Result<()>;
    /// 结束压缩 frame，返回剩余的全部压缩字节
    fn finish(self: Box<Self>) -> Result<Vec<u8>>;
}

pub fn validate_level(level: i32) -> Result<()> {
    let range = zstd::compression_level_range();
    if range.contains(&level) {
        Ok(())
    } else {
        Err(IrError::InvalidConfig(format!(
            "compression level {} out of range [{}, {}]",
            level,
            range.start(),
            range.end()
        )))
    }
}

pub struct ZstdCompressor {
    encoder: zstd::stream::write::Encoder<'static, Vec<u8>>,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Result<Self> {
        validate_level(level)?;
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), level)?;
        // reader 侧会校验 content checksum
        encoder.include_checksum(true)?;
        Ok(Self { encoder })
    }
}

impl Compressor for ZstdCompressor {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.encoder.write_all(data)?;
        Ok(())
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(self.encoder.get_mut())
    }

    fn flush(&mut self) -> Result<()> {
        self.encoder.flush()?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        Ok(self.encoder.finish()?)
    }
}

/// 识别输入是 zstd 封装还是裸 IR，返回解压后的字节
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    if input.starts_with(&ZSTD_MAGIC) {
        let out = zstd::stream::decode_all(input)
            .map_err(|e| IrError::parse(0, format!("zstd decompression failed: {e}")))?;
        tracing::debug!(
            "Decompressed IR stream: {} -> {} bytes",
            input.len(),
            out.len()
        );
        return Ok(out);
    }
    if input.starts_with(&IR_MAGIC) {
        return Ok(input.to_vec());
    }
    Err(IrError::parse(0, "input is neither zstd-compressed nor raw IR"))
}
