use thiserror::Error;

use crate::shader::UniformKind;

/// Error taxonomy for the rendering core.
///
/// These are the terminal, named failures. Programmer errors (unbalanced
/// stacks, out-of-range vertex writes) are asserts, and unreliable inputs
/// (undecodable image bytes) degrade silently instead of erroring.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    /// No usable adapter, device, or surface configuration was found.
    #[error("device initialization failed: {reason}")]
    DeviceInit { reason: String },

    /// A shader part failed to compile. Terminal for the owning program.
    #[error("shader part '{part}' failed to compile: {log}")]
    PartCompile { part: String, log: String },

    /// Compiled parts failed to link into a program. Terminal.
    #[error("shader '{name}' failed to link: {log}")]
    ProgramLink { name: String, log: String },

    /// A uniform name missing from the program's manifest, either reflected
    /// by the device at link time or requested as a typed handle.
    #[error("uniform '{uniform}' is not declared in the manifest of shader '{shader}'")]
    UndeclaredUniform { shader: String, uniform: String },

    /// A declared uniform kind disagrees with the reflected kind.
    #[error(
        "uniform '{uniform}' on shader '{shader}' is declared as {declared:?} \
         but reflected as {reflected:?}"
    )]
    UniformKindMismatch {
        shader: String,
        uniform: String,
        declared: UniformKind,
        reflected: UniformKind,
    },

    /// A typed uniform handle was requested at the wrong kind.
    #[error(
        "uniform '{uniform}' on shader '{shader}' is declared as {declared:?} \
         but was requested as {requested:?}"
    )]
    UniformTypeMismatch {
        shader: String,
        uniform: String,
        declared: UniformKind,
        requested: UniformKind,
    },

    /// A texture was touched after its last reference was released.
    #[error("texture '{name}' was used after its last reference was released")]
    TextureUseAfterFree { name: String },

    /// A single atlas request cannot fit even a fresh backing surface.
    #[error("atlas request {width}x{height} exceeds the maximum backing surface {max}x{max}")]
    AtlasRequestTooLarge { width: u32, height: u32, max: u32 },

    /// A shader source (or `#include` target) is not in the store.
    #[error("unknown shader source '{name}'")]
    UnknownShaderSource { name: String },
}
