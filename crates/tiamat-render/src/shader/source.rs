//! Shader source management and composition.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::context::RenderContext;
use crate::device::PartKind;
use crate::error::RenderError;

use super::program::{ShaderPart, ShaderProgram, UniformManifest};

const PREAMBLE: &str = "#version 450\n\n";

/// Wrapper appended to every vertex part. The original `main` is renamed to
/// `src_main`; the wrapper stamps the per-vertex draw depth into z and
/// applies the backbuffer y-flip.
const VERTEX_EPILOGUE: &str = "\nlayout(location = 15) in float m_DrawDepth;\n\nvoid main()\n{\n    src_main();\n    gl_Position.y *= g_BackbufferScale.y;\n    gl_Position.z = m_DrawDepth;\n}\n";

const STANDARD_SOURCES: &[(&str, &str)] = &[
    ("sh_texture2d.vs", include_str!("shaders/sh_texture2d.vs")),
    ("sh_texture2d.fs", include_str!("shaders/sh_texture2d.fs")),
    ("sh_utils.h", include_str!("shaders/sh_utils.h")),
    ("sh_masking.h", include_str!("shaders/sh_masking.h")),
];

/// The gateway through which every shader program is created.
///
/// The store owns raw source text (standard sources are embedded, more can
/// be registered), composes full parts on demand (preamble, injected global
/// declarations, recursive `#include` resolution, the vertex wrapper), and
/// memoizes programs per `(vertex, fragment)` pair.
pub struct ShaderStore {
    ctx: Rc<RenderContext>,
    sources: RefCell<HashMap<String, String>>,
    cache: RefCell<HashMap<(String, String), Rc<ShaderProgram>>>,
    continuous_compilation: Cell<bool>,
}

impl ShaderStore {
    pub fn new(ctx: Rc<RenderContext>) -> Self {
        let sources = STANDARD_SOURCES
            .iter()
            .map(|(name, text)| ((*name).to_owned(), (*text).to_owned()))
            .collect();
        Self {
            ctx,
            sources: RefCell::new(sources),
            cache: RefCell::new(HashMap::new()),
            continuous_compilation: Cell::new(false),
        }
    }

    /// Adds (or replaces) a named source. Names ending in `.vs` or `.fs`
    /// load as parts; anything else is only reachable through `#include`.
    pub fn register_source(&self, name: &str, text: &str) {
        self.sources
            .borrow_mut()
            .insert(name.to_owned(), text.to_owned());
    }

    /// When on, every `load` composes and links afresh instead of returning
    /// the memoized program. A development aid for shader iteration.
    pub fn set_continuous_compilation(&self, enabled: bool) {
        self.continuous_compilation.set(enabled);
    }

    /// The memoized program for this source pair, composing and creating it
    /// on first request. `manifest` declares the pair's own uniforms; the
    /// context globals are merged in automatically.
    pub fn load(
        &self,
        vertex: &str,
        fragment: &str,
        manifest: &UniformManifest,
    ) -> Result<Rc<ShaderProgram>, RenderError> {
        let key = (vertex.to_owned(), fragment.to_owned());
        if !self.continuous_compilation.get()
            && let Some(hit) = self.cache.borrow().get(&key)
        {
            return Ok(Rc::clone(hit));
        }

        let parts = vec![
            self.compose_part(vertex, PartKind::Vertex)?,
            self.compose_part(fragment, PartKind::Fragment)?,
        ];
        let mut manifest = manifest.clone();
        manifest.merge_missing(self.ctx.globals().manifest_entries());

        let program = ShaderProgram::new(
            Rc::clone(&self.ctx),
            format!("{vertex}/{fragment}"),
            parts,
            &manifest,
        );
        self.cache.borrow_mut().insert(key, Rc::clone(&program));
        Ok(program)
    }

    /// The standard textured-quad shader.
    pub fn load_texture_shader(&self) -> Result<Rc<ShaderProgram>, RenderError> {
        self.load(
            "sh_texture2d.vs",
            "sh_texture2d.fs",
            &UniformManifest::new().with("m_Texture", super::UniformKind::Sampler),
        )
    }

    /// Recomposes a pair from current source text and resets the memoized
    /// program so its next bind recompiles. A pair never loaded is left
    /// alone.
    pub fn reload(&self, vertex: &str, fragment: &str) -> Result<(), RenderError> {
        let key = (vertex.to_owned(), fragment.to_owned());
        let Some(program) = self.cache.borrow().get(&key).map(Rc::clone) else {
            return Ok(());
        };

        let parts = vec![
            self.compose_part(vertex, PartKind::Vertex)?,
            self.compose_part(fragment, PartKind::Fragment)?,
        ];
        log::info!("reloading shader '{}'", program.name());
        program.reset_parts(parts);
        Ok(())
    }

    /// The fully composed text for `name`, as a part would receive it.
    pub fn compose(&self, name: &str) -> Result<String, RenderError> {
        let kind = if name.ends_with(".vs") {
            Some(PartKind::Vertex)
        } else if name.ends_with(".fs") {
            Some(PartKind::Fragment)
        } else {
            None
        };
        match kind {
            Some(kind) => Ok(self.compose_part(name, kind)?.source),
            None => self.resolve_includes(name, &mut HashSet::new()),
        }
    }

    fn compose_part(&self, name: &str, kind: PartKind) -> Result<ShaderPart, RenderError> {
        let body = self.resolve_includes(name, &mut HashSet::new())?;

        let mut source = String::from(PREAMBLE);
        for (global, global_kind) in self.ctx.globals().manifest_entries() {
            source.push_str(&format!("uniform {} {global};\n", global_kind.glsl_name()));
        }
        source.push('\n');

        match kind {
            PartKind::Vertex => {
                source.push_str(&body.replacen("void main(", "void src_main(", 1));
                source.push_str(VERTEX_EPILOGUE);
            }
            PartKind::Fragment => source.push_str(&body),
        }

        Ok(ShaderPart { name: name.to_owned(), kind, source })
    }

    /// Splices `#include "name"` targets in place. Each source contributes
    /// at most once per composition, so diamond includes are safe.
    fn resolve_includes(
        &self,
        name: &str,
        included: &mut HashSet<String>,
    ) -> Result<String, RenderError> {
        if !included.insert(name.to_owned()) {
            return Ok(String::new());
        }

        let raw = self
            .sources
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::UnknownShaderSource { name: name.to_owned() })?;

        let mut out = String::new();
        for line in raw.lines() {
            match parse_include(line) {
                Some(target) => out.push_str(&self.resolve_includes(target, included)?),
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }
}

fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?;
    rest.trim().strip_prefix('"')?.strip_suffix('"')
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::device::DeviceOp;
    use crate::shader::ShaderState;

    fn store(ctx: &Rc<RenderContext>) -> ShaderStore {
        let store = ShaderStore::new(Rc::clone(ctx));
        store.register_source("plain.vs", "void main()\n{\n    gl_Position = vec4(0.0);\n}\n");
        store.register_source("plain.fs", "void main()\n{\n}\n");
        store
    }

    #[test]
    fn includes_resolve_once_even_when_diamond_shaped() {
        let (_device, ctx) = test_context();
        let store = store(&ctx);
        store.register_source("leaf.h", "float leafMarker() { return 1.0; }\n");
        store.register_source("mid.h", "#include \"leaf.h\"\nfloat midMarker() { return 2.0; }\n");
        store.register_source(
            "diamond.fs",
            "#include \"leaf.h\"\n#include \"mid.h\"\nvoid main() {}\n",
        );

        let composed = store.compose("diamond.fs").unwrap();
        assert_eq!(composed.matches("leafMarker").count(), 1);
        assert_eq!(composed.matches("midMarker").count(), 1);
    }

    #[test]
    fn unknown_sources_and_includes_are_named_errors() {
        let (_device, ctx) = test_context();
        let store = store(&ctx);
        store.register_source("broken.fs", "#include \"missing.h\"\nvoid main() {}\n");

        assert!(matches!(
            store.compose("nope.fs").unwrap_err(),
            RenderError::UnknownShaderSource { name } if name == "nope.fs"
        ));
        assert!(matches!(
            store.compose("broken.fs").unwrap_err(),
            RenderError::UnknownShaderSource { name } if name == "missing.h"
        ));
    }

    #[test]
    fn vertex_parts_get_the_depth_wrapper_and_global_declarations() {
        let (_device, ctx) = test_context();
        let store = store(&ctx);

        let composed = store.compose("sh_texture2d.vs").unwrap();
        assert!(composed.starts_with("#version 450\n"));
        assert!(composed.contains("uniform mat4 g_ProjMatrix;"));
        assert!(composed.contains("void src_main("));
        assert!(composed.contains("gl_Position.z = m_DrawDepth;"));
        assert!(composed.contains("gl_Position.y *= g_BackbufferScale.y;"));
        // Exactly one real entry point: the wrapper.
        assert_eq!(composed.matches("void main(").count(), 1);
    }

    #[test]
    fn programs_are_memoized_per_source_pair() {
        let (_device, ctx) = test_context();
        let store = store(&ctx);

        let first = store.load("plain.vs", "plain.fs", &UniformManifest::new()).unwrap();
        let second = store.load("plain.vs", "plain.fs", &UniformManifest::new()).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        store.set_continuous_compilation(true);
        let third = store.load("plain.vs", "plain.fs", &UniformManifest::new()).unwrap();
        assert!(!Rc::ptr_eq(&first, &third));
    }

    #[test]
    fn standard_shader_exposes_merged_globals() {
        let (_device, ctx) = test_context();
        let store = ShaderStore::new(Rc::clone(&ctx));

        let program = store.load_texture_shader().unwrap();
        assert!(program.uniform::<glam::Mat4>("g_ProjMatrix").is_ok());
        assert!(
            program
                .uniform::<crate::shader::TextureUnit>("m_Texture")
                .is_ok()
        );
    }

    #[test]
    fn reload_resets_the_program_for_recompilation() {
        let (device, ctx) = test_context();
        let store = store(&ctx);

        let program = store.load("plain.vs", "plain.fs", &UniformManifest::new()).unwrap();
        program.bind().unwrap();
        assert_eq!(program.state(), ShaderState::Loaded);
        device.take_ops();

        store.register_source("plain.fs", "float ignored;\nvoid main()\n{\n}\n");
        store.reload("plain.vs", "plain.fs").unwrap();
        assert_eq!(program.state(), ShaderState::Unlinked);
        assert!(
            device
                .take_ops()
                .iter()
                .any(|op| matches!(op, DeviceOp::DestroyProgram(_)))
        );

        // The next bind compiles the fresh source.
        program.bind().unwrap();
        let recompiled = device.take_ops().iter().any(|op| {
            matches!(op, DeviceOp::CompilePart { name, .. } if name == "plain.fs")
        });
        assert!(recompiled);

        // Reloading a pair that was never loaded is a quiet no-op.
        store.reload("plain.vs", "never.fs").unwrap();
    }
}
