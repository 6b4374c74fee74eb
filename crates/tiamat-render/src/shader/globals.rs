//! Context-wide uniform broadcast.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use super::program::ShaderProgram;
use super::uniform::{UniformKind, UniformValue};

/// Registry of uniforms shared by every shader in a context.
///
/// A global holds one current value. Writing it fans out to every attached
/// shader declaring the name: bound shaders apply immediately (after the
/// active batch flushes), unbound ones adopt the value as pending. Shaders
/// created later adopt the value at construction, so late loaders never see
/// a stale global.
pub struct GlobalUniforms {
    values: RefCell<BTreeMap<String, UniformValue>>,
    listeners: RefCell<Vec<Weak<ShaderProgram>>>,
}

impl GlobalUniforms {
    /// The standard set every context starts with: projection, masking
    /// parameters, and the backbuffer scale.
    pub(crate) fn with_standard_set() -> Self {
        let globals = Self {
            values: RefCell::new(BTreeMap::new()),
            listeners: RefCell::new(Vec::new()),
        };
        globals.register("g_ProjMatrix", UniformValue::Mat4(glam::Mat4::IDENTITY.to_cols_array_2d()));
        globals.register("g_MaskingRect", UniformValue::Vec4([0.0; 4]));
        globals.register("g_CornerRadius", UniformValue::Float(0.0));
        globals.register("g_CornerExponent", UniformValue::Float(2.0));
        globals.register("g_BorderThickness", UniformValue::Float(0.0));
        globals.register("g_MaskingBlendRange", UniformValue::Float(1.0));
        globals.register("g_IsMasking", UniformValue::Float(0.0));
        globals.register("g_BackbufferScale", UniformValue::Vec2([1.0, 1.0]));
        globals
    }

    /// Adds a global with its initial value. Registering an existing name
    /// is a programmer error.
    pub fn register(&self, name: &str, initial: UniformValue) {
        let previous = self.values.borrow_mut().insert(name.to_owned(), initial);
        debug_assert!(previous.is_none(), "global uniform '{name}' registered twice");
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.borrow().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.values.borrow().get(name).copied()
    }

    /// Writes a global and fans the change out to attached shaders.
    /// Returns whether the value actually changed; a structurally equal
    /// write is a complete no-op.
    pub fn set(&self, name: &str, value: UniformValue) -> bool {
        {
            let mut values = self.values.borrow_mut();
            let Some(current) = values.get_mut(name) else {
                debug_assert!(false, "global uniform '{name}' was never registered");
                return false;
            };
            debug_assert_eq!(
                current.kind(),
                value.kind(),
                "global uniform '{name}' written at the wrong kind"
            );
            if *current == value {
                return false;
            }
            *current = value;
        }

        for shader in self.live_listeners() {
            shader.receive_global(name, value);
        }
        true
    }

    /// Subscribes `shader` to future global writes. Dead listeners are
    /// pruned on the next fan-out.
    pub(crate) fn attach(&self, shader: &Rc<ShaderProgram>) {
        self.listeners.borrow_mut().push(Rc::downgrade(shader));
    }

    /// Declarations injected into every composed shader, in name order.
    pub(crate) fn manifest_entries(&self) -> Vec<(String, UniformKind)> {
        self.values
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.kind()))
            .collect()
    }

    fn live_listeners(&self) -> Vec<Rc<ShaderProgram>> {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|weak| weak.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }
}
