//! Ingestion pipeline: tail the resolver log, decode lines into events,
//! hold them in a bounded buffer, and batch-write them to the store.

pub mod buffer;
pub mod decoder;
pub mod tailer;
pub mod writer;

pub use buffer::EventBuffer;
pub use decoder::{DecodeError, DnsEvent, LineDecoder, QueryOutcome, QueryType};
pub use tailer::{LogTailer, SourceCursor, TailerState};
pub use writer::BatchWriter;
