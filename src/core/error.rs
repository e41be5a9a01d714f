/// 读写 IR 流的统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// header / frame 字节无法解析（offset 为解压后流内的字节偏移）
    #[error("parse error at byte {offset}: {reason}")]
    Parse { offset: u64, reason: String },

    /// 查询语句无法解析；调用方的旧 filter 保持不变
    #[error("query error at position {position}: {reason}")]
    Query { position: usize, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// 单条记录无法编码；流仍可继续写
    #[error("encode error: {0}")]
    Encode(String),

    #[error("stream already closed")]
    ClosedStream,

    #[error("sink error: {0}")]
    Sink(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IrError {
    pub fn parse(offset: u64, reason: impl Into<String>) -> Self {
        IrError::Parse {
            offset,
            reason: reason.into(),
        }
    }

    pub fn query(position: usize, reason: impl Into<String>) -> Self {
        IrError::Query {
            position,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IrError>;
