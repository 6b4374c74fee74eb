//! Shader programs, uniforms, and the source store.
//!
//! Programs come from the [`ShaderStore`], which composes raw GLSL
//! (preamble, injected global declarations, `#include` resolution, the
//! vertex depth wrapper) and memoizes one program per source pair.
//! Compilation is lazy and a failure is terminal for its program.
//!
//! Uniform state lives CPU-side per program. Writes are equality-gated and
//! either apply immediately (program bound) or stay pending until the next
//! bind. [`GlobalUniforms`] broadcasts context-wide values to every program
//! declaring them.

mod globals;
mod program;
mod source;
mod uniform;

pub use globals::GlobalUniforms;
pub use program::{ShaderPart, ShaderProgram, ShaderState, UniformManifest};
pub use source::ShaderStore;
pub use uniform::{TextureUnit, Uniform, UniformKind, UniformType, UniformValue};
