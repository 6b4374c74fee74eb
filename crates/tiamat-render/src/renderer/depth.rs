/// Depth comparison function.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DepthFunction {
    Never,
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Always,
}

/// Depth test/write configuration, pushed and popped as a stack frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DepthInfo {
    pub depth_test: bool,
    pub write_depth: bool,
    pub function: DepthFunction,
}

impl DepthInfo {
    pub const DEFAULT: DepthInfo = DepthInfo {
        depth_test: true,
        write_depth: true,
        function: DepthFunction::LessThan,
    };
}

impl Default for DepthInfo {
    fn default() -> Self {
        Self::DEFAULT
    }
}
