//! Vertex storage, batching, and the shared index caches.
//!
//! - [`VertexBuffer`] is a fixed-capacity, depth-tagged vertex array with
//!   change detection and dirty-span uploads.
//! - [`VertexBatch`] rotates a pool of buffers ("pages") behind a write
//!   cursor, flushing eagerly whenever observable GPU state changes.
//! - [`IndexCache`] holds the context-wide static index buffers (sequential
//!   and quad fan), which only ever grow.

mod batch;
mod buffer;
mod index;
mod types;

pub use batch::VertexBatch;
pub(crate) use batch::PendingFlush;
pub use buffer::VertexBuffer;
pub use index::IndexKind;
pub(crate) use index::IndexCache;
pub use types::{TaggedVertex, TexturedVertex, Vertex};
