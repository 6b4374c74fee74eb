/// Source/destination blend factor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend equation applied to factored source/destination terms.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Full fixed-function blend configuration.
///
/// Compared structurally to gate device state changes; redundant
/// `set_blend` calls with an equal value are no-ops.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlendingParameters {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub rgb_operation: BlendOperation,
    pub alpha_operation: BlendOperation,
}

impl BlendingParameters {
    /// Premultiplied-alpha "over" blending, the default for UI composition.
    pub const MIXTURE: BlendingParameters = BlendingParameters {
        src: BlendFactor::One,
        dst: BlendFactor::OneMinusSrcAlpha,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
        rgb_operation: BlendOperation::Add,
        alpha_operation: BlendOperation::Add,
    };

    /// Additive blending.
    pub const ADDITIVE: BlendingParameters = BlendingParameters {
        src: BlendFactor::One,
        dst: BlendFactor::One,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::One,
        rgb_operation: BlendOperation::Add,
        alpha_operation: BlendOperation::Add,
    };

    /// Source replaces destination.
    pub const OPAQUE: BlendingParameters = BlendingParameters {
        src: BlendFactor::One,
        dst: BlendFactor::Zero,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::Zero,
        rgb_operation: BlendOperation::Add,
        alpha_operation: BlendOperation::Add,
    };
}

impl Default for BlendingParameters {
    fn default() -> Self {
        Self::MIXTURE
    }
}
