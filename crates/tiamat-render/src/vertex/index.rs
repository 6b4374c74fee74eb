//! Context-wide static index buffers.
//!
//! Two caches exist per context, one per [`IndexKind`]. Capacity only ever
//! grows; growing rebuilds the whole buffer and bumps a generation counter
//! so vertex buffers can rebind after a rebuild.

use crate::device::{BufferId, BufferKind, GpuDevice};

/// Largest vertex count addressable with 16-bit indices.
pub(crate) const MAX_INDEXED_VERTICES: usize = 65536;

const MIN_CACHE_VERTICES: usize = 256;

/// How a draw range maps vertices to index elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// One index per vertex: `0, 1, 2, ...`.
    Linear,
    /// Six indices per four vertices: `0, 1, 2, 0, 2, 3` per quad, with the
    /// vertices ordered top-left, top-right, bottom-right, bottom-left.
    Quad,
}

impl IndexKind {
    /// Number of index elements covering `vertices` vertices.
    #[inline]
    pub(crate) fn elements_for(self, vertices: usize) -> usize {
        match self {
            IndexKind::Linear => vertices,
            IndexKind::Quad => vertices / 4 * 6,
        }
    }

    /// Element offset of the first index referencing `vertex`.
    #[inline]
    pub(crate) fn first_element(self, vertex: usize) -> usize {
        match self {
            IndexKind::Linear => vertex,
            IndexKind::Quad => vertex / 4 * 6,
        }
    }
}

pub(crate) struct IndexCache {
    kind: IndexKind,
    buffer: Option<BufferId>,
    capacity_vertices: usize,
    generation: u64,
}

impl IndexCache {
    pub(crate) fn new(kind: IndexKind) -> Self {
        Self { kind, buffer: None, capacity_vertices: 0, generation: 0 }
    }

    /// Returns a buffer covering at least `vertices` vertices, together with
    /// the generation it belongs to. Rebuilds (and destroys the outgrown
    /// buffer) when the request exceeds the current capacity.
    pub(crate) fn ensure(&mut self, device: &dyn GpuDevice, vertices: usize) -> (BufferId, u64) {
        debug_assert!(vertices <= MAX_INDEXED_VERTICES, "index cache request exceeds 16-bit range");
        if let Some(buffer) = self.buffer
            && vertices <= self.capacity_vertices
        {
            return (buffer, self.generation);
        }

        let capacity = vertices
            .next_power_of_two()
            .clamp(MIN_CACHE_VERTICES, MAX_INDEXED_VERTICES);
        let indices = build_indices(self.kind, capacity);
        let bytes: &[u8] = bytemuck::cast_slice(&indices);

        if let Some(old) = self.buffer.take() {
            device.destroy_buffer(old);
        }
        let buffer = device.create_buffer(BufferKind::Index, bytes.len() as u64);
        device.upload_buffer(buffer, 0, bytes);
        log::trace!(
            "index cache ({:?}) grown to {capacity} vertices, generation {}",
            self.kind,
            self.generation + 1
        );

        self.buffer = Some(buffer);
        self.capacity_vertices = capacity;
        self.generation += 1;
        (buffer, self.generation)
    }

    #[cfg(test)]
    fn capacity_vertices(&self) -> usize {
        self.capacity_vertices
    }
}

fn build_indices(kind: IndexKind, vertices: usize) -> Vec<u16> {
    match kind {
        IndexKind::Linear => (0..vertices).map(|i| i as u16).collect(),
        IndexKind::Quad => {
            let mut indices = Vec::with_capacity(vertices / 4 * 6);
            for quad in 0..vertices / 4 {
                let base = (quad * 4) as u16;
                indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            }
            indices
        }
    }
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceOp, NullDevice};

    #[test]
    fn grows_monotonically_and_bumps_generation() {
        let device = NullDevice::new();
        let mut cache = IndexCache::new(IndexKind::Linear);

        let (first, gen1) = cache.ensure(&device, 100);
        assert_eq!(gen1, 1);
        assert_eq!(cache.capacity_vertices(), 256);

        // Smaller and equal requests reuse the existing buffer.
        let (again, gen2) = cache.ensure(&device, 10);
        assert_eq!(again, first);
        assert_eq!(gen2, 1);

        let (grown, gen3) = cache.ensure(&device, 300);
        assert_ne!(grown, first);
        assert_eq!(gen3, 2);
        assert_eq!(cache.capacity_vertices(), 512);

        // A shrinking request never shrinks the cache.
        let (kept, gen4) = cache.ensure(&device, 4);
        assert_eq!(kept, grown);
        assert_eq!(gen4, 2);
        assert_eq!(cache.capacity_vertices(), 512);
    }

    #[test]
    fn growth_destroys_the_outgrown_buffer() {
        let device = NullDevice::new();
        let mut cache = IndexCache::new(IndexKind::Quad);

        let (first, _) = cache.ensure(&device, 16);
        device.take_ops();
        cache.ensure(&device, 1024);

        let ops = device.take_ops();
        assert!(matches!(ops[0], DeviceOp::DestroyBuffer(buffer) if buffer == first));
        assert!(matches!(ops[1], DeviceOp::CreateBuffer { kind: BufferKind::Index, .. }));
        assert!(matches!(ops[2], DeviceOp::UploadBuffer { .. }));
    }

    #[test]
    fn quad_indices_follow_the_fan_pattern() {
        let device = NullDevice::new();
        let mut cache = IndexCache::new(IndexKind::Quad);
        cache.ensure(&device, 8);

        let ops = device.take_ops();
        let data = ops
            .iter()
            .find_map(|op| match op {
                DeviceOp::UploadBuffer { data, .. } => Some(data.clone()),
                _ => None,
            })
            .unwrap();
        let indices: &[u16] = bytemuck::cast_slice(&data);
        assert_eq!(&indices[..12], &[0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn element_translation() {
        assert_eq!(IndexKind::Linear.elements_for(7), 7);
        assert_eq!(IndexKind::Linear.first_element(3), 3);
        assert_eq!(IndexKind::Quad.elements_for(8), 12);
        assert_eq!(IndexKind::Quad.first_element(4), 6);
    }
}
