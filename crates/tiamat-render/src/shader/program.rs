//! Shader programs and their uniform state.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::context::RenderContext;
use crate::device::{PartKind, ShaderId};
use crate::error::RenderError;

use super::uniform::{Uniform, UniformKind, UniformType, UniformValue};

/// Where a program is in its lifecycle.
///
/// `Failed` is terminal: every later load or bind attempt returns the
/// original error without touching the device again.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShaderState {
    Unlinked,
    Compiling,
    Loaded,
    Failed,
}

/// One composed source unit of a program.
#[derive(Debug, Clone)]
pub struct ShaderPart {
    pub name: String,
    pub kind: PartKind,
    pub source: String,
}

/// The uniforms a program declares up front, name to kind.
///
/// The manifest is the contract the device's link-time reflection is
/// validated against; it also seeds the program's CPU-side uniform slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformManifest {
    entries: BTreeMap<String, UniformKind>,
}

impl UniformManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, kind: UniformKind) -> Self {
        self.insert(name, kind);
        self
    }

    pub fn insert(&mut self, name: &str, kind: UniformKind) {
        self.entries.insert(name.to_owned(), kind);
    }

    pub fn get(&self, name: &str) -> Option<UniformKind> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, UniformKind)> {
        self.entries.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Adds entries that are not already declared. Existing declarations
    /// win over incoming ones.
    pub(crate) fn merge_missing(
        &mut self,
        entries: impl IntoIterator<Item = (String, UniformKind)>,
    ) {
        for (name, kind) in entries {
            self.entries.entry(name).or_insert(kind);
        }
    }
}

struct UniformSlot {
    kind: UniformKind,
    value: UniformValue,
    /// Value not yet applied to the device program.
    dirty: bool,
    /// Mirrors a context global of the same name.
    global: bool,
    /// Reflected by the device at link time; inactive slots accept writes
    /// but never produce device calls.
    active: bool,
}

/// A linked (or linkable) shader program.
///
/// Programs are created through [`ShaderStore`](super::ShaderStore) and
/// shared as `Rc`. Compilation is deferred to the first
/// [`bind`](Self::bind) or an explicit [`ensure_loaded`](Self::ensure_loaded).
pub struct ShaderProgram {
    ctx: Rc<RenderContext>,
    /// Weak self-handle handed to uniform handles.
    me: Weak<ShaderProgram>,
    name: String,
    parts: RefCell<Vec<ShaderPart>>,
    state: Cell<ShaderState>,
    device_id: Cell<Option<ShaderId>>,
    uniforms: RefCell<BTreeMap<String, UniformSlot>>,
    failure: RefCell<Option<RenderError>>,
}

impl ShaderProgram {
    pub(crate) fn new(
        ctx: Rc<RenderContext>,
        name: String,
        parts: Vec<ShaderPart>,
        manifest: &UniformManifest,
    ) -> Rc<Self> {
        let mut slots = BTreeMap::new();
        for (uniform, kind) in manifest.iter() {
            let global = ctx.globals().contains(uniform);
            // Globals adopt the current registry value so a late-created
            // program starts in sync.
            let value = if global {
                ctx.globals()
                    .get(uniform)
                    .unwrap_or_else(|| UniformValue::default_for(kind))
            } else {
                UniformValue::default_for(kind)
            };
            slots.insert(
                uniform.to_owned(),
                UniformSlot { kind, value, dirty: true, global, active: false },
            );
        }

        let program = Rc::new_cyclic(|me| Self {
            ctx,
            me: me.clone(),
            name,
            parts: RefCell::new(parts),
            state: Cell::new(ShaderState::Unlinked),
            device_id: Cell::new(None),
            uniforms: RefCell::new(slots),
            failure: RefCell::new(None),
        });
        program.ctx.globals().attach(&program);
        program
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> ShaderState {
        self.state.get()
    }

    pub fn is_bound(&self) -> bool {
        match self.device_id.get() {
            Some(program) => self.ctx.bound_program() == Some(program),
            None => false,
        }
    }

    /// Compiles and links if still unlinked. A program that once failed
    /// returns the original error forever.
    pub fn ensure_loaded(&self) -> Result<(), RenderError> {
        match self.state.get() {
            ShaderState::Loaded => Ok(()),
            ShaderState::Failed => Err(self.stored_failure()),
            ShaderState::Compiling => {
                debug_assert!(false, "re-entrant load of shader '{}'", self.name);
                Ok(())
            }
            ShaderState::Unlinked => self.load_now(),
        }
    }

    /// Makes this program the bound one, loading it first if necessary and
    /// applying every pending uniform. Binding the already-bound program is
    /// a no-op.
    pub fn bind(&self) -> Result<(), RenderError> {
        self.ensure_loaded()?;
        let Some(program) = self.device_id.get() else {
            debug_assert!(false, "loaded shader '{}' has no device program", self.name);
            return Ok(());
        };
        if self.ctx.bound_program() == Some(program) {
            return Ok(());
        }

        self.ctx.flush_active_batch();
        self.ctx.device().bind_program(program);
        self.ctx.set_bound_program(Some(program));
        self.ctx.stats().add_state_change();
        self.apply_pending(program);
        Ok(())
    }

    /// Forgets the binding. Unbinding a program that is not bound is a
    /// no-op.
    pub fn unbind(&self) {
        if self.is_bound() {
            self.ctx.set_bound_program(None);
        }
    }

    /// A typed handle to a declared uniform. The name and kind are checked
    /// against the manifest once, here; writes through the handle are then
    /// unchecked. The handle does not keep the program alive.
    pub fn uniform<T: UniformType>(&self, name: &str) -> Result<Uniform<T>, RenderError> {
        {
            let slots = self.uniforms.borrow();
            let Some(slot) = slots.get(name) else {
                return Err(RenderError::UndeclaredUniform {
                    shader: self.name.clone(),
                    uniform: name.to_owned(),
                });
            };
            if slot.kind != T::KIND {
                return Err(RenderError::UniformTypeMismatch {
                    shader: self.name.clone(),
                    uniform: name.to_owned(),
                    declared: slot.kind,
                    requested: T::KIND,
                });
            }
        }
        Ok(Uniform::new(self.me.clone(), name.to_owned()))
    }

    /// Writes a uniform value. Structurally equal writes are complete
    /// no-ops; real changes apply immediately when this program is bound
    /// (flushing the active batch first) and stay pending otherwise.
    pub(crate) fn write_uniform(&self, name: &str, value: UniformValue) {
        let apply_to = {
            let mut slots = self.uniforms.borrow_mut();
            let Some(slot) = slots.get_mut(name) else {
                debug_assert!(false, "uniform '{name}' not declared on shader '{}'", self.name);
                return;
            };
            debug_assert_eq!(
                slot.kind,
                value.kind(),
                "uniform '{name}' written at the wrong kind"
            );
            if slot.value == value {
                return;
            }
            slot.value = value;
            if slot.active && self.is_bound() {
                slot.dirty = false;
                self.device_id.get()
            } else {
                slot.dirty = true;
                None
            }
        };

        if let Some(program) = apply_to {
            self.ctx.flush_active_batch();
            self.ctx.device().apply_uniform(program, name, value);
        }
    }

    pub(crate) fn uniform_value(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.borrow().get(name).map(|slot| slot.value)
    }

    /// Global fan-out entry point. Ignores names this program does not
    /// mirror; otherwise follows the normal write rules.
    pub(crate) fn receive_global(&self, name: &str, value: UniformValue) {
        let mirrors = self
            .uniforms
            .borrow()
            .get(name)
            .is_some_and(|slot| slot.global);
        if mirrors {
            self.write_uniform(name, value);
        }
    }

    /// Swaps in freshly composed parts and resets the lifecycle so the next
    /// bind recompiles. Uniform values survive; they re-apply after the
    /// relink.
    pub(crate) fn reset_parts(&self, parts: Vec<ShaderPart>) {
        if self.is_bound() {
            self.ctx.set_bound_program(None);
        }
        if let Some(program) = self.device_id.take() {
            self.ctx.device().destroy_program(program);
        }
        *self.parts.borrow_mut() = parts;
        self.state.set(ShaderState::Unlinked);
        *self.failure.borrow_mut() = None;
        for slot in self.uniforms.borrow_mut().values_mut() {
            slot.active = false;
            slot.dirty = true;
        }
    }

    fn load_now(&self) -> Result<(), RenderError> {
        self.state.set(ShaderState::Compiling);
        let device = Rc::clone(self.ctx.device());

        let mut part_ids = Vec::new();
        for part in self.parts.borrow().iter() {
            match device.compile_part(&part.name, part.kind, &part.source) {
                Ok(id) => part_ids.push(id),
                Err(log) => {
                    return Err(self.fail(RenderError::PartCompile {
                        part: part.name.clone(),
                        log,
                    }));
                }
            }
        }

        let linked = match device.link_program(&self.name, &part_ids) {
            Ok(linked) => linked,
            Err(log) => {
                return Err(self.fail(RenderError::ProgramLink {
                    name: self.name.clone(),
                    log,
                }));
            }
        };

        // The reflected uniforms must all be declared at matching kinds;
        // extra declared-but-unreflected entries stay inert.
        {
            let mut slots = self.uniforms.borrow_mut();
            for (uniform, kind) in &linked.uniforms {
                let error = match slots.get_mut(uniform) {
                    None => Some(RenderError::UndeclaredUniform {
                        shader: self.name.clone(),
                        uniform: uniform.clone(),
                    }),
                    Some(slot) if slot.kind != *kind => Some(RenderError::UniformKindMismatch {
                        shader: self.name.clone(),
                        uniform: uniform.clone(),
                        declared: slot.kind,
                        reflected: *kind,
                    }),
                    Some(slot) => {
                        slot.active = true;
                        None
                    }
                };
                if let Some(error) = error {
                    drop(slots);
                    device.destroy_program(linked.program);
                    return Err(self.fail(error));
                }
            }
        }

        self.device_id.set(Some(linked.program));
        self.state.set(ShaderState::Loaded);
        log::debug!(
            "shader '{}' linked, {} reflected uniforms",
            self.name,
            linked.uniforms.len()
        );
        Ok(())
    }

    fn apply_pending(&self, program: ShaderId) {
        let mut slots = self.uniforms.borrow_mut();
        for (name, slot) in slots.iter_mut() {
            if slot.dirty && slot.active {
                self.ctx.device().apply_uniform(program, name, slot.value);
                slot.dirty = false;
            }
        }
    }

    fn fail(&self, error: RenderError) -> RenderError {
        self.state.set(ShaderState::Failed);
        *self.failure.borrow_mut() = Some(error.clone());
        error
    }

    fn stored_failure(&self) -> RenderError {
        self.failure.borrow().clone().unwrap_or(RenderError::ProgramLink {
            name: self.name.clone(),
            log: String::new(),
        })
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        if self.is_bound() {
            self.ctx.set_bound_program(None);
        }
        if let Some(program) = self.device_id.take() {
            self.ctx
                .disposal()
                .defer(move |device| device.destroy_program(program));
        }
    }
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::device::DeviceOp;

    fn part(name: &str, kind: PartKind, source: &str) -> ShaderPart {
        ShaderPart { name: name.to_owned(), kind, source: source.to_owned() }
    }

    fn simple_program(
        ctx: &Rc<RenderContext>,
        fs_body: &str,
        manifest: UniformManifest,
    ) -> Rc<ShaderProgram> {
        ShaderProgram::new(
            Rc::clone(ctx),
            "test".to_owned(),
            vec![
                part("test.vs", PartKind::Vertex, "void main() {}"),
                part("test.fs", PartKind::Fragment, fs_body),
            ],
            &manifest,
        )
    }

    fn applies(ops: &[DeviceOp]) -> Vec<(String, UniformValue)> {
        ops.iter()
            .filter_map(|op| match op {
                DeviceOp::ApplyUniform { name, value, .. } => Some((name.clone(), *value)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_bind_compiles_links_and_applies_defaults() {
        let (device, ctx) = test_context();
        let program = simple_program(
            &ctx,
            "uniform float u_Alpha;\nvoid main() {}",
            UniformManifest::new().with("u_Alpha", UniformKind::Float),
        );
        assert_eq!(program.state(), ShaderState::Unlinked);

        program.bind().unwrap();
        assert_eq!(program.state(), ShaderState::Loaded);
        assert!(program.is_bound());

        let ops = device.take_ops();
        let compile_count = ops
            .iter()
            .filter(|op| matches!(op, DeviceOp::CompilePart { .. }))
            .count();
        assert_eq!(compile_count, 2);
        let bind_at = ops
            .iter()
            .position(|op| matches!(op, DeviceOp::BindProgram(_)))
            .unwrap();
        let apply_at = ops
            .iter()
            .position(|op| matches!(op, DeviceOp::ApplyUniform { .. }))
            .unwrap();
        assert!(bind_at < apply_at);
        assert_eq!(applies(&ops), vec![("u_Alpha".to_owned(), UniformValue::Float(0.0))]);

        // Rebinding the bound program touches nothing.
        program.bind().unwrap();
        assert!(device.take_ops().is_empty());
    }

    #[test]
    fn compile_failure_is_terminal_and_replayed() {
        let (device, ctx) = test_context();
        let program = simple_program(
            &ctx,
            "#error bad fragment\nvoid main() {}",
            UniformManifest::new(),
        );

        let first = program.bind().unwrap_err();
        assert!(matches!(
            &first,
            RenderError::PartCompile { part, .. } if part == "test.fs"
        ));
        assert_eq!(program.state(), ShaderState::Failed);
        device.take_ops();

        // The same error comes back with no further device calls.
        let second = program.bind().unwrap_err();
        assert_eq!(first, second);
        assert!(device.take_ops().is_empty());
    }

    #[test]
    fn reflected_uniform_missing_from_manifest_fails_the_load() {
        let (_device, ctx) = test_context();
        let program = simple_program(
            &ctx,
            "uniform float u_Mystery;\nvoid main() {}",
            UniformManifest::new(),
        );

        let err = program.ensure_loaded().unwrap_err();
        assert!(matches!(
            err,
            RenderError::UndeclaredUniform { uniform, .. } if uniform == "u_Mystery"
        ));
        assert_eq!(program.state(), ShaderState::Failed);
    }

    #[test]
    fn reflected_kind_mismatch_fails_the_load() {
        let (_device, ctx) = test_context();
        let program = simple_program(
            &ctx,
            "uniform vec2 u_Alpha;\nvoid main() {}",
            UniformManifest::new().with("u_Alpha", UniformKind::Float),
        );

        let err = program.ensure_loaded().unwrap_err();
        assert!(matches!(
            err,
            RenderError::UniformKindMismatch {
                declared: UniformKind::Float,
                reflected: UniformKind::Vec2,
                ..
            }
        ));
    }

    #[test]
    fn typed_handles_are_checked_against_the_manifest() {
        let (_device, ctx) = test_context();
        let program = simple_program(
            &ctx,
            "uniform float u_Alpha;\nvoid main() {}",
            UniformManifest::new().with("u_Alpha", UniformKind::Float),
        );

        assert!(program.uniform::<f32>("u_Alpha").is_ok());
        assert!(matches!(
            program.uniform::<f32>("u_Nope").unwrap_err(),
            RenderError::UndeclaredUniform { .. }
        ));
        assert!(matches!(
            program.uniform::<i32>("u_Alpha").unwrap_err(),
            RenderError::UniformTypeMismatch { .. }
        ));
    }

    #[test]
    fn unbound_writes_defer_until_bind() {
        let (device, ctx) = test_context();
        let program = simple_program(
            &ctx,
            "uniform float u_Alpha;\nvoid main() {}",
            UniformManifest::new().with("u_Alpha", UniformKind::Float),
        );

        let alpha = program.uniform::<f32>("u_Alpha").unwrap();
        alpha.set(0.5);
        assert_eq!(alpha.get(), Some(0.5));
        assert!(device.take_ops().is_empty());

        program.bind().unwrap();
        assert_eq!(
            applies(&device.take_ops()),
            vec![("u_Alpha".to_owned(), UniformValue::Float(0.5))]
        );
    }

    #[test]
    fn bound_writes_apply_immediately_and_equal_writes_are_inert() {
        let (device, ctx) = test_context();
        let program = simple_program(
            &ctx,
            "uniform float u_Alpha;\nvoid main() {}",
            UniformManifest::new().with("u_Alpha", UniformKind::Float),
        );
        let alpha = program.uniform::<f32>("u_Alpha").unwrap();

        program.bind().unwrap();
        device.take_ops();

        alpha.set(0.25);
        assert_eq!(
            applies(&device.take_ops()),
            vec![("u_Alpha".to_owned(), UniformValue::Float(0.25))]
        );

        alpha.set(0.25);
        assert!(device.take_ops().is_empty());
    }

    #[test]
    fn declared_but_unreflected_uniforms_are_inert() {
        let (device, ctx) = test_context();
        let program = simple_program(
            &ctx,
            "void main() {}",
            UniformManifest::new().with("u_Unused", UniformKind::Float),
        );

        let unused = program.uniform::<f32>("u_Unused").unwrap();
        unused.set(3.0);
        program.bind().unwrap();

        assert!(applies(&device.take_ops()).is_empty());
        // The CPU-side value is still readable.
        assert_eq!(unused.get(), Some(3.0));
    }

    #[test]
    fn global_writes_fan_out_to_declaring_programs() {
        let (device, ctx) = test_context();
        let mut manifest = UniformManifest::new();
        manifest.merge_missing(ctx.globals().manifest_entries());
        let program = simple_program(
            &ctx,
            "uniform float g_CornerRadius;\nvoid main() {}",
            manifest,
        );

        program.bind().unwrap();
        device.take_ops();

        // Bound program: the change lands immediately.
        assert!(ctx.globals().set("g_CornerRadius", UniformValue::Float(8.0)));
        assert_eq!(
            applies(&device.take_ops()),
            vec![("g_CornerRadius".to_owned(), UniformValue::Float(8.0))]
        );

        // Unbound program: the change is adopted as pending.
        program.unbind();
        assert!(ctx.globals().set("g_CornerRadius", UniformValue::Float(2.0)));
        assert!(device.take_ops().is_empty());
        program.bind().unwrap();
        assert_eq!(
            applies(&device.take_ops()),
            vec![("g_CornerRadius".to_owned(), UniformValue::Float(2.0))]
        );

        // Equal global writes reach nobody.
        assert!(!ctx.globals().set("g_CornerRadius", UniformValue::Float(2.0)));
        assert!(device.take_ops().is_empty());
    }

    #[test]
    fn late_created_programs_adopt_current_global_values() {
        let (device, ctx) = test_context();
        ctx.globals().set("g_CornerRadius", UniformValue::Float(5.0));

        let mut manifest = UniformManifest::new();
        manifest.merge_missing(ctx.globals().manifest_entries());
        let program = simple_program(
            &ctx,
            "uniform float g_CornerRadius;\nvoid main() {}",
            manifest,
        );

        program.bind().unwrap();
        assert!(
            applies(&device.take_ops())
                .contains(&("g_CornerRadius".to_owned(), UniformValue::Float(5.0)))
        );
    }

    #[test]
    fn dropping_a_program_defers_destruction() {
        let (device, ctx) = test_context();
        let program = simple_program(&ctx, "void main() {}", UniformManifest::new());
        program.bind().unwrap();
        device.take_ops();

        drop(program);
        assert!(ctx.bound_program().is_none());
        assert!(device.take_ops().is_empty());

        ctx.disposal().drain(device.as_ref());
        assert!(
            device
                .take_ops()
                .iter()
                .any(|op| matches!(op, DeviceOp::DestroyProgram(_)))
        );
    }
}
