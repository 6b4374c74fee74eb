//! Texture resources: ref-counted handles, streamed uploads, atlasing, and
//! image decoding.
//!
//! CPU-side texture state is `Send`; device storage is created lazily on
//! the context thread when a texture is first bound, and destroyed through
//! the disposal queue when the last handle drops.

mod atlas;
mod decode;
mod handle;
mod source;

pub use atlas::{AtlasConfig, TextureAtlas};
pub use handle::{Texture, TextureUpdater};
pub use source::TextureUpload;
