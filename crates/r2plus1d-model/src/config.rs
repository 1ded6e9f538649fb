use r2plus1d_core::{GraphError, GraphResult};
use r2plus1d_symbol::CudnnTune;
use serde::{Deserialize, Serialize};

use crate::depth::ModelDepth;

/// Hyper-parameters of [`create_r3d`](crate::r3d::create_r3d).
///
/// Every field except `num_class` has a default, so `{"num_class": 400}` is
/// a complete JSON config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct R3dConfig {
    pub num_class: usize,
    #[serde(default)]
    pub no_bias: bool,
    #[serde(default = "default_model_depth")]
    pub model_depth: u32,
    #[serde(default = "default_final_spatial_kernel")]
    pub final_spatial_kernel: usize,
    #[serde(default = "default_final_temporal_kernel")]
    pub final_temporal_kernel: usize,
    #[serde(default = "default_bn_mom")]
    pub bn_mom: f64,
    #[serde(default)]
    pub cudnn_tune: CudnnTune,
    #[serde(default = "default_workspace")]
    pub workspace: usize,
}

fn default_model_depth() -> u32 {
    18
}

fn default_final_spatial_kernel() -> usize {
    7
}

fn default_final_temporal_kernel() -> usize {
    1
}

fn default_bn_mom() -> f64 {
    0.9
}

fn default_workspace() -> usize {
    512
}

impl R3dConfig {
    pub fn new(num_class: usize) -> Self {
        R3dConfig {
            num_class,
            no_bias: false,
            model_depth: default_model_depth(),
            final_spatial_kernel: default_final_spatial_kernel(),
            final_temporal_kernel: default_final_temporal_kernel(),
            bn_mom: default_bn_mom(),
            cudnn_tune: CudnnTune::Off,
            workspace: default_workspace(),
        }
    }

    pub fn with_depth(mut self, model_depth: u32) -> Self {
        self.model_depth = model_depth;
        self
    }

    pub fn with_no_bias(mut self, no_bias: bool) -> Self {
        self.no_bias = no_bias;
        self
    }

    /// Final pooling window; 7x7 spatial for 112x112 input, `t` frames for `8*t`.
    pub fn with_final_kernels(mut self, spatial: usize, temporal: usize) -> Self {
        self.final_spatial_kernel = spatial;
        self.final_temporal_kernel = temporal;
        self
    }

    pub fn depth(&self) -> GraphResult<ModelDepth> {
        ModelDepth::try_from(self.model_depth)
    }

    /// Check the config before any node is built. The depth is checked first.
    pub fn validate(&self) -> GraphResult<ModelDepth> {
        let depth = self.depth()?;
        if self.num_class == 0 {
            return Err(GraphError::InvalidConfig("num_class must be positive".into()));
        }
        if self.final_spatial_kernel == 0 || self.final_temporal_kernel == 0 {
            return Err(GraphError::InvalidConfig(format!(
                "final pooling kernel must be positive, got spatial {} temporal {}",
                self.final_spatial_kernel, self.final_temporal_kernel
            )));
        }
        if !(0.0..=1.0).contains(&self.bn_mom) {
            return Err(GraphError::InvalidConfig(format!(
                "bn_mom must lie in [0, 1], got {}",
                self.bn_mom
            )));
        }
        Ok(depth)
    }
}
