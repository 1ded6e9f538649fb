use r2plus1d_core::GraphError;

/// Supported network depths and their per-stage block counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelDepth {
    D10,
    D16,
    #[default]
    D18,
    D26,
    D34,
}

impl ModelDepth {
    pub const ALL: [ModelDepth; 5] = [
        ModelDepth::D10,
        ModelDepth::D16,
        ModelDepth::D18,
        ModelDepth::D26,
        ModelDepth::D34,
    ];

    /// Residual blocks in each of the four stages.
    pub fn stage_counts(self) -> [usize; 4] {
        match self {
            ModelDepth::D10 => [1, 1, 1, 1],
            ModelDepth::D16 => [2, 2, 2, 1],
            ModelDepth::D18 => [2, 2, 2, 2],
            ModelDepth::D26 => [2, 3, 4, 3],
            ModelDepth::D34 => [3, 4, 6, 3],
        }
    }

    pub fn depth(self) -> u32 {
        match self {
            ModelDepth::D10 => 10,
            ModelDepth::D16 => 16,
            ModelDepth::D18 => 18,
            ModelDepth::D26 => 26,
            ModelDepth::D34 => 34,
        }
    }

    /// Total residual blocks across all stages.
    pub fn num_blocks(self) -> usize {
        self.stage_counts().iter().sum()
    }
}

impl TryFrom<u32> for ModelDepth {
    type Error = GraphError;

    fn try_from(depth: u32) -> Result<Self, Self::Error> {
        match depth {
            10 => Ok(ModelDepth::D10),
            16 => Ok(ModelDepth::D16),
            18 => Ok(ModelDepth::D18),
            26 => Ok(ModelDepth::D26),
            34 => Ok(ModelDepth::D34),
            other => Err(GraphError::UnsupportedDepth(other)),
        }
    }
}

impl std::fmt::Display for ModelDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R(2+1)D-{}", self.depth())
    }
}
