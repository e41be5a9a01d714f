pub mod compress;
pub mod frame;
pub mod varint;

pub use compress::{decompress, Compressor, ZstdCompressor};
pub use frame::{
    decode_header, encode_header, Decoded, FrameDecoder, FrameEncoder, FrameRecord,
    StreamMetadata, TextRecord,
};
