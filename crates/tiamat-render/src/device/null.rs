use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::coords::Rect;
use crate::renderer::{BlendingParameters, ClearInfo, DepthInfo};
use crate::shader::{UniformKind, UniformValue};

use super::reflect::scan_uniform_decls;
use super::{
    BufferId, BufferKind, GpuDevice, LinkedProgram, PartId, PartKind, Scissor, ShaderId,
    TextureDesc, TextureId, Topology,
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOp {
    MakeCurrent,
    SwapBuffers,
    SetVsync(bool),

    SetViewport(Rect),
    SetScissor(Scissor),
    SetScissorEnabled(bool),
    SetBlend(BlendingParameters),
    SetDepth(DepthInfo),
    Clear(ClearInfo),

    CreateBuffer { buffer: BufferId, kind: BufferKind, bytes: u64 },
    UploadBuffer { buffer: BufferId, offset: u64, data: Vec<u8> },
    DestroyBuffer(BufferId),
    BindVertexBuffer(BufferId),
    BindIndexBuffer(BufferId),

    CreateTexture { texture: TextureId, width: u32, height: u32 },
    UploadTexture { texture: TextureId, x: u32, y: u32, width: u32, height: u32, bytes: usize },
    DestroyTexture(TextureId),
    BindTexture { texture: TextureId, unit: u32 },

    CompilePart { part: PartId, name: String, kind: PartKind },
    LinkProgram { program: ShaderId, name: String },
    DestroyProgram(ShaderId),
    BindProgram(ShaderId),
    ApplyUniform { program: ShaderId, name: String, value: UniformValue },

    DrawIndexed { topology: Topology, first_index: u32, index_count: u32 },
}

/// Recording device backend.
///
/// Every call is appended to an op log; nothing is validated against
/// earlier calls (destroying a never-created buffer simply records the
/// destroy). Shader reflection comes from scanning the composed GLSL, so
/// every declared uniform counts as active.
///
/// A part whose source contains `#error` fails compilation with that line
/// as the log; parts declaring the same uniform name at different kinds
/// fail the link.
#[derive(Default)]
pub struct NullDevice {
    ops: RefCell<Vec<DeviceOp>>,
    next_id: Cell<u64>,
    parts: RefCell<HashMap<PartId, StoredPart>>,
}

struct StoredPart {
    name: String,
    source: String,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the op log.
    pub fn ops(&self) -> Vec<DeviceOp> {
        self.ops.borrow().clone()
    }

    /// Drains the op log, returning everything recorded so far.
    pub fn take_ops(&self) -> Vec<DeviceOp> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }

    /// The source text last compiled for `part`, if any.
    pub fn part_source(&self, part: PartId) -> Option<String> {
        self.parts.borrow().get(&part).map(|p| p.source.clone())
    }

    fn record(&self, op: DeviceOp) {
        self.ops.borrow_mut().push(op);
    }

    fn fresh_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

impl GpuDevice for NullDevice {
    fn make_current(&self) {
        self.record(DeviceOp::MakeCurrent);
    }

    fn swap_buffers(&self) {
        self.record(DeviceOp::SwapBuffers);
    }

    fn set_vsync(&self, enabled: bool) {
        self.record(DeviceOp::SetVsync(enabled));
    }

    fn set_viewport(&self, rect: Rect) {
        self.record(DeviceOp::SetViewport(rect));
    }

    fn set_scissor(&self, scissor: Scissor) {
        self.record(DeviceOp::SetScissor(scissor));
    }

    fn set_scissor_enabled(&self, enabled: bool) {
        self.record(DeviceOp::SetScissorEnabled(enabled));
    }

    fn set_blend(&self, blend: BlendingParameters) {
        self.record(DeviceOp::SetBlend(blend));
    }

    fn set_depth(&self, depth: DepthInfo) {
        self.record(DeviceOp::SetDepth(depth));
    }

    fn clear(&self, clear: ClearInfo) {
        self.record(DeviceOp::Clear(clear));
    }

    fn create_buffer(&self, kind: BufferKind, bytes: u64) -> BufferId {
        let buffer = BufferId(self.fresh_id());
        self.record(DeviceOp::CreateBuffer { buffer, kind, bytes });
        buffer
    }

    fn upload_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) {
        self.record(DeviceOp::UploadBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        self.record(DeviceOp::DestroyBuffer(buffer));
    }

    fn bind_vertex_buffer(&self, buffer: BufferId) {
        self.record(DeviceOp::BindVertexBuffer(buffer));
    }

    fn bind_index_buffer(&self, buffer: BufferId) {
        self.record(DeviceOp::BindIndexBuffer(buffer));
    }

    fn create_texture(&self, desc: TextureDesc<'_>) -> TextureId {
        let texture = TextureId(self.fresh_id());
        self.record(DeviceOp::CreateTexture {
            texture,
            width: desc.width,
            height: desc.height,
        });
        texture
    }

    fn upload_texture(&self, texture: TextureId, x: u32, y: u32, width: u32, height: u32, data: &[u8]) {
        self.record(DeviceOp::UploadTexture {
            texture,
            x,
            y,
            width,
            height,
            bytes: data.len(),
        });
    }

    fn destroy_texture(&self, texture: TextureId) {
        self.record(DeviceOp::DestroyTexture(texture));
    }

    fn bind_texture(&self, texture: TextureId, unit: u32) {
        self.record(DeviceOp::BindTexture { texture, unit });
    }

    fn compile_part(&self, name: &str, kind: PartKind, source: &str) -> Result<PartId, String> {
        if let Some(line) = source.lines().find(|l| l.trim_start().starts_with("#error")) {
            return Err(line.trim().to_owned());
        }

        let part = PartId(self.fresh_id());
        self.parts.borrow_mut().insert(
            part,
            StoredPart {
                name: name.to_owned(),
                source: source.to_owned(),
            },
        );
        self.record(DeviceOp::CompilePart {
            part,
            name: name.to_owned(),
            kind,
        });
        Ok(part)
    }

    fn link_program(&self, name: &str, parts: &[PartId]) -> Result<LinkedProgram, String> {
        let stored = self.parts.borrow();

        let mut uniforms: Vec<(String, UniformKind)> = Vec::new();
        for id in parts {
            let Some(part) = stored.get(id) else {
                return Err(format!("part {id:?} was never compiled"));
            };
            for (uniform, kind) in scan_uniform_decls(&part.source) {
                match uniforms.iter().find(|(n, _)| *n == uniform) {
                    None => uniforms.push((uniform, kind)),
                    Some((_, existing)) if *existing == kind => {}
                    Some((_, existing)) => {
                        return Err(format!(
                            "uniform '{uniform}' declared as {existing:?} in one part \
                             and {kind:?} in '{}'",
                            part.name
                        ));
                    }
                }
            }
        }
        drop(stored);

        let program = ShaderId(self.fresh_id());
        self.record(DeviceOp::LinkProgram {
            program,
            name: name.to_owned(),
        });
        Ok(LinkedProgram { program, uniforms })
    }

    fn destroy_program(&self, program: ShaderId) {
        self.record(DeviceOp::DestroyProgram(program));
    }

    fn bind_program(&self, program: ShaderId) {
        self.record(DeviceOp::BindProgram(program));
    }

    fn apply_uniform(&self, program: ShaderId, name: &str, value: UniformValue) {
        self.record(DeviceOp::ApplyUniform {
            program,
            name: name.to_owned(),
            value,
        });
    }

    fn draw_indexed(&self, topology: Topology, first_index: u32, index_count: u32) {
        self.record(DeviceOp::DrawIndexed {
            topology,
            first_index,
            index_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ops_in_call_order() {
        let device = NullDevice::new();
        device.make_current();
        let buffer = device.create_buffer(BufferKind::Vertex, 64);
        device.destroy_buffer(buffer);

        let ops = device.take_ops();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], DeviceOp::MakeCurrent);
        assert!(matches!(ops[1], DeviceOp::CreateBuffer { bytes: 64, .. }));
        assert_eq!(ops[2], DeviceOp::DestroyBuffer(buffer));
    }

    #[test]
    fn compile_fails_on_error_directive() {
        let device = NullDevice::new();
        let err = device
            .compile_part("sh_bad.fs", PartKind::Fragment, "#error broken\nvoid main() {}")
            .unwrap_err();
        assert!(err.contains("broken"));
    }

    #[test]
    fn link_reflects_union_of_part_uniforms() {
        let device = NullDevice::new();
        let vs = device
            .compile_part("a.vs", PartKind::Vertex, "uniform mat4 g_ProjMatrix;\nvoid main() {}")
            .unwrap();
        let fs = device
            .compile_part(
                "a.fs",
                PartKind::Fragment,
                "uniform mat4 g_ProjMatrix;\nuniform float u_Alpha;\nvoid main() {}",
            )
            .unwrap();

        let linked = device.link_program("a", &[vs, fs]).unwrap();
        assert_eq!(
            linked.uniforms,
            vec![
                ("g_ProjMatrix".to_owned(), UniformKind::Mat4),
                ("u_Alpha".to_owned(), UniformKind::Float),
            ]
        );
    }

    #[test]
    fn link_fails_on_conflicting_uniform_kinds() {
        let device = NullDevice::new();
        let vs = device
            .compile_part("b.vs", PartKind::Vertex, "uniform float u_Thing;\nvoid main() {}")
            .unwrap();
        let fs = device
            .compile_part("b.fs", PartKind::Fragment, "uniform vec2 u_Thing;\nvoid main() {}")
            .unwrap();

        let err = device.link_program("b", &[vs, fs]).unwrap_err();
        assert!(err.contains("u_Thing"));
    }
}
