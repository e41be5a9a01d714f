pub mod sink;
pub mod writer;

pub use sink::{ByteSink, ChannelSink, ChannelSinkReceiver, SinkEvent, VecSink};
pub use writer::{StreamWriter, WriteRecord};
