//! Translation of provider streaming formats into one client format
//!
//! Every upstream body, whatever its framing, is turned into a sequence of
//! [`NormalizedChunk`]s ending in exactly one terminal marker, then relayed
//! to a client connection or an in-process callback.

pub mod accumulator;
pub mod chunk;
pub mod gemini;
pub mod json_objects;
pub mod openai;
pub mod relay;
pub mod sse;
pub mod translator;

pub use accumulator::StreamAccumulator;
pub use chunk::{ChunkDelta, NormalizedChunk, SSE_DONE};
pub use relay::{
    client_body, relay, CallbackSink, ChunkCallback, ChunkSink, ClientSink, SinkClosed, StreamEnd,
    ABORTED_REASON,
};
pub use translator::{StreamTranslator, TranslatorOptions, WireFormat};
