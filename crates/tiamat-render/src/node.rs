//! Draw nodes: the snapshot objects the renderer consumes each frame.

use crate::renderer::Renderer;

// ── DrawNode trait ────────────────────────────────────────────────────────

/// A frame snapshot of one drawable.
///
/// The update thread builds nodes and refreshes them through
/// [`apply_state`](Self::apply_state); the draw thread walks the finished
/// tree and calls [`draw`](Self::draw). Nodes cross threads between those
/// two steps, which is why the trait requires `Send` while [`Renderer`]
/// itself stays pinned to the draw thread.
///
/// ```rust,ignore
/// struct SpriteNode { texture: Texture, rect: Rect, color: ColorRgba }
///
/// impl DrawNode for SpriteNode {
///     fn draw(&self, renderer: &mut Renderer) {
///         self.texture.draw_quad(renderer, self.rect, self.color);
///     }
/// }
/// ```
pub trait DrawNode: Send + 'static {
    /// Snapshots render parameters from the owning object.
    ///
    /// The default implementation does nothing, so nodes with no mutable
    /// parameters only implement [`draw`](Self::draw).
    fn apply_state(&mut self) {}

    /// Emits state and geometry calls for this node. Push/pop pairs issued
    /// here must balance before the method returns.
    fn draw(&self, renderer: &mut Renderer);
}

/// Capability marker for nodes carrying an ordered child list, so composite
/// containers can be walked without knowing the concrete type.
pub trait CompositeNode: DrawNode {
    fn children(&self) -> &[Box<dyn DrawNode>];
    fn children_mut(&mut self) -> &mut Vec<Box<dyn DrawNode>>;
}

// ── ContainerDrawNode ─────────────────────────────────────────────────────

/// Plain composite that applies and draws its children in insertion order.
#[derive(Default)]
pub struct ContainerDrawNode {
    children: Vec<Box<dyn DrawNode>>,
}

impl ContainerDrawNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, child: impl DrawNode) {
        self.children.push(Box::new(child));
    }
}

impl DrawNode for ContainerDrawNode {
    fn apply_state(&mut self) {
        for child in &mut self.children {
            child.apply_state();
        }
    }

    fn draw(&self, renderer: &mut Renderer) {
        for child in &self.children {
            child.draw(renderer);
        }
    }
}

impl CompositeNode for ContainerDrawNode {
    fn children(&self) -> &[Box<dyn DrawNode>] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<Box<dyn DrawNode>> {
        &mut self.children
    }
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::context::test_context;
    use crate::coords::Vec2;

    struct Recorder {
        id: u32,
        log: Arc<Mutex<Vec<u32>>>,
        applied: Arc<Mutex<Vec<u32>>>,
    }

    impl DrawNode for Recorder {
        fn apply_state(&mut self) {
            self.applied.lock().push(self.id);
        }

        fn draw(&self, _renderer: &mut Renderer) {
            self.log.lock().push(self.id);
        }
    }

    #[test]
    fn container_walks_children_in_insertion_order() {
        let (_device, ctx) = test_context();
        let mut renderer = Renderer::new(ctx);
        renderer.reset_state(Vec2::new(100.0, 100.0));

        let log = Arc::new(Mutex::new(Vec::new()));
        let applied = Arc::new(Mutex::new(Vec::new()));

        let mut inner = ContainerDrawNode::new();
        inner.push(Recorder { id: 2, log: Arc::clone(&log), applied: Arc::clone(&applied) });
        inner.push(Recorder { id: 3, log: Arc::clone(&log), applied: Arc::clone(&applied) });

        let mut root = ContainerDrawNode::new();
        root.push(Recorder { id: 1, log: Arc::clone(&log), applied: Arc::clone(&applied) });
        root.push(inner);

        root.apply_state();
        root.draw(&mut renderer);
        renderer.finish_frame();

        assert_eq!(*applied.lock(), vec![1, 2, 3]);
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(root.children().len(), 2);
    }
}
