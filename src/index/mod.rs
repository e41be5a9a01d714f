pub mod event_index;
pub mod reader;

pub use event_index::EventIndex;
pub use reader::StreamReader;
