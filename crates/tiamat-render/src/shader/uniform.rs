use std::fmt;
use std::marker::PhantomData;
use std::rc::Weak;

use super::program::ShaderProgram;

/// The closed set of uniform kinds a shader manifest may declare.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Sampler,
}

impl UniformKind {
    /// GLSL type name for generated uniform declarations.
    pub(crate) fn glsl_name(self) -> &'static str {
        match self {
            UniformKind::Bool => "bool",
            UniformKind::Int => "int",
            UniformKind::Float => "float",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Vec4 => "vec4",
            UniformKind::Mat3 => "mat3",
            UniformKind::Mat4 => "mat4",
            UniformKind::Sampler => "sampler2D",
        }
    }
}

/// A uniform value of any supported kind.
///
/// Matrices are column-major. Samplers carry the texture unit they read from.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([[f32; 4]; 4]),
    Sampler(i32),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Bool(_) => UniformKind::Bool,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat3(_) => UniformKind::Mat3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Sampler(_) => UniformKind::Sampler,
        }
    }

    /// The zero value used before a uniform is first written.
    pub fn default_for(kind: UniformKind) -> Self {
        match kind {
            UniformKind::Bool => UniformValue::Bool(false),
            UniformKind::Int => UniformValue::Int(0),
            UniformKind::Float => UniformValue::Float(0.0),
            UniformKind::Vec2 => UniformValue::Vec2([0.0; 2]),
            UniformKind::Vec3 => UniformValue::Vec3([0.0; 3]),
            UniformKind::Vec4 => UniformValue::Vec4([0.0; 4]),
            UniformKind::Mat3 => UniformValue::Mat3([0.0; 9]),
            UniformKind::Mat4 => UniformValue::Mat4([[0.0; 4]; 4]),
            UniformKind::Sampler => UniformValue::Sampler(0),
        }
    }
}

/// Rust-side types that map onto a [`UniformKind`].
pub trait UniformType: Copy {
    const KIND: UniformKind;

    fn into_value(self) -> UniformValue;
    fn from_value(value: &UniformValue) -> Option<Self>;
}

impl UniformType for bool {
    const KIND: UniformKind = UniformKind::Bool;

    fn into_value(self) -> UniformValue {
        UniformValue::Bool(self)
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl UniformType for i32 {
    const KIND: UniformKind = UniformKind::Int;

    fn into_value(self) -> UniformValue {
        UniformValue::Int(self)
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl UniformType for f32 {
    const KIND: UniformKind = UniformKind::Float;

    fn into_value(self) -> UniformValue {
        UniformValue::Float(self)
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl UniformType for [f32; 2] {
    const KIND: UniformKind = UniformKind::Vec2;

    fn into_value(self) -> UniformValue {
        UniformValue::Vec2(self)
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }
}

impl UniformType for [f32; 3] {
    const KIND: UniformKind = UniformKind::Vec3;

    fn into_value(self) -> UniformValue {
        UniformValue::Vec3(self)
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }
}

impl UniformType for [f32; 4] {
    const KIND: UniformKind = UniformKind::Vec4;

    fn into_value(self) -> UniformValue {
        UniformValue::Vec4(self)
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Vec4(v) => Some(*v),
            _ => None,
        }
    }
}

impl UniformType for glam::Mat3 {
    const KIND: UniformKind = UniformKind::Mat3;

    fn into_value(self) -> UniformValue {
        UniformValue::Mat3(self.to_cols_array())
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Mat3(v) => Some(glam::Mat3::from_cols_array(v)),
            _ => None,
        }
    }
}

impl UniformType for glam::Mat4 {
    const KIND: UniformKind = UniformKind::Mat4;

    fn into_value(self) -> UniformValue {
        UniformValue::Mat4(self.to_cols_array_2d())
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Mat4(v) => Some(glam::Mat4::from_cols_array_2d(v)),
            _ => None,
        }
    }
}

/// Texture unit argument for sampler uniforms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureUnit(pub i32);

impl UniformType for TextureUnit {
    const KIND: UniformKind = UniformKind::Sampler;

    fn into_value(self) -> UniformValue {
        UniformValue::Sampler(self.0)
    }

    fn from_value(value: &UniformValue) -> Option<Self> {
        match value {
            UniformValue::Sampler(v) => Some(TextureUnit(*v)),
            _ => None,
        }
    }
}

/// Typed handle to one uniform of one shader.
///
/// Handles are created through [`ShaderProgram::uniform`], which checks the
/// name and kind against the manifest once; writes through the handle then
/// follow the deferred-application rules (no-op when structurally equal,
/// immediate when the owner is bound, pending otherwise). A handle does not
/// keep its shader alive; once the shader drops, writes become no-ops and
/// reads return `None`.
pub struct Uniform<T: UniformType> {
    shader: Weak<ShaderProgram>,
    name: String,
    _marker: PhantomData<T>,
}

impl<T: UniformType> Uniform<T> {
    pub(super) fn new(shader: Weak<ShaderProgram>, name: String) -> Self {
        Self {
            shader,
            name,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self, value: T) {
        if let Some(shader) = self.shader.upgrade() {
            shader.write_uniform(&self.name, value.into_value());
        }
    }

    pub fn get(&self) -> Option<T> {
        T::from_value(&self.shader.upgrade()?.uniform_value(&self.name)?)
    }
}

impl<T: UniformType> Clone for Uniform<T> {
    fn clone(&self) -> Self {
        Self {
            shader: Weak::clone(&self.shader),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: UniformType> fmt::Debug for Uniform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uniform")
            .field("name", &self.name)
            .field("kind", &T::KIND)
            .finish_non_exhaustive()
    }
}
