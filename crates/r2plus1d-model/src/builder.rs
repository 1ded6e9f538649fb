use log::{debug, info};
use r2plus1d_core::{GraphError, GraphResult};
use r2plus1d_symbol::{BatchNormParams, ConvParams, CudnnTune, Graph, NodeId};
use serde::Serialize;

use crate::config::R3dConfig;

/// Resolution change applied by the first convolution of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Downsample {
    #[default]
    Off,
    /// Halve height and width, keep time.
    SpatialOnly,
    /// Halve time, height and width.
    SpatioTemporal,
}

impl Downsample {
    /// `(time, height, width)` stride.
    pub fn stride(self) -> [usize; 3] {
        match self {
            Downsample::Off => [1, 1, 1],
            Downsample::SpatialOnly => [1, 2, 2],
            Downsample::SpatioTemporal => [2, 2, 2],
        }
    }

    pub fn is_requested(self) -> bool {
        self != Downsample::Off
    }
}

/// Width of the intermediate layer of a factorized `3x3x3` convolution.
///
/// Chosen so the `1x3x3` + `3x1x1` pair has the parameter count of the full
/// kernel: `3*in*out*9 / (9*in + 3*out)`, truncated once. Both widths must
/// be positive.
pub fn middle_filters(in_filters: usize, out_filters: usize) -> GraphResult<usize> {
    if in_filters == 0 || out_filters == 0 {
        return Err(GraphError::InvalidShape {
            op: "spatial_temporal_conv".to_string(),
            reason: format!(
                "filter counts must be positive, got {} -> {}",
                in_filters, out_filters
            ),
        });
    }
    Ok((3 * in_filters * out_filters * 3 * 3) / (in_filters * 3 * 3 + 3 * out_filters))
}

/// Record of one emitted residual block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub index: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub stride: [usize; 3],
    /// The shortcut goes through a 1x1x1 convolution instead of the identity.
    pub projection: bool,
    pub output: NodeId,
}

/// Emits residual blocks into a graph, naming nodes from a block counter
/// (`comp_count`) and a per-block layer counter (`comp_idx`).
///
/// One builder serves a single pass over one graph.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    comp_count: usize,
    comp_idx: usize,
    bn_mom: f64,
    no_bias: bool,
    cudnn_tune: CudnnTune,
    workspace: usize,
    blocks: Vec<BlockSummary>,
}

impl BlockBuilder {
    pub fn new(no_bias: bool, bn_mom: f64, cudnn_tune: CudnnTune, workspace: usize) -> Self {
        BlockBuilder {
            comp_count: 0,
            comp_idx: 0,
            bn_mom,
            no_bias,
            cudnn_tune,
            workspace,
            blocks: Vec::new(),
        }
    }

    pub fn from_config(config: &R3dConfig) -> Self {
        Self::new(config.no_bias, config.bn_mom, config.cudnn_tune, config.workspace)
    }

    /// Blocks emitted so far.
    pub fn comp_count(&self) -> usize {
        self.comp_count
    }

    pub fn blocks(&self) -> &[BlockSummary] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<BlockSummary> {
        self.blocks
    }

    fn conv(&self, num_filter: usize, kernel: [usize; 3], stride: [usize; 3], pad: [usize; 3]) -> ConvParams {
        ConvParams::new(num_filter, &kernel, &stride, &pad)
            .no_bias(self.no_bias)
            .tuning(self.cudnn_tune, self.workspace)
    }

    fn bn(&self) -> BatchNormParams {
        BatchNormParams {
            eps: 1e-3,
            momentum: self.bn_mom,
            fix_gamma: false,
        }
    }

    /// `1x3x3` conv -> BN -> ReLU -> `3x1x1` conv. Returns the last conv,
    /// before any normalization.
    pub fn add_spatial_temporal_conv(
        &mut self,
        graph: &mut Graph,
        body: NodeId,
        in_filters: usize,
        out_filters: usize,
        stride: [usize; 3],
    ) -> GraphResult<NodeId> {
        let middle = middle_filters(in_filters, out_filters)?;
        self.comp_idx += 1;
        let (c, i) = (self.comp_count, self.comp_idx);
        info!("Number of middle filters: {}", middle);

        let spatial = self.conv(middle, [1, 3, 3], [1, stride[1], stride[2]], [0, 1, 1]);
        let body = graph.convolution(body, spatial, &format!("comp_{}_conv_{}_middle", c, i))?;
        let body = graph.batch_norm(body, self.bn(), &format!("comp_{}_spatbn_{}_middle", c, i))?;
        let body = graph.relu(body)?;

        let temporal = self.conv(out_filters, [3, 1, 1], [stride[0], 1, 1], [1, 0, 0]);
        graph.convolution(body, temporal, &format!("comp_{}_conv_{}", c, i))
    }

    /// Append one residual block and return its output (post-ReLU).
    pub fn add_r3d_block(
        &mut self,
        graph: &mut Graph,
        data: NodeId,
        input_filters: usize,
        num_filters: usize,
        downsample: Downsample,
    ) -> GraphResult<NodeId> {
        self.comp_idx = 0;
        let c = self.comp_count;
        let stride = downsample.stride();

        let body = self.add_spatial_temporal_conv(graph, data, input_filters, num_filters, stride)?;
        let body = graph.batch_norm(body, self.bn(), &format!("comp_{}_spatbn_{}", c, self.comp_idx))?;
        let body = graph.relu(body)?;

        let body = self.add_spatial_temporal_conv(graph, body, num_filters, num_filters, [1, 1, 1])?;
        let body = graph.batch_norm(body, self.bn(), &format!("comp_{}_spatbn_{}", c, self.comp_idx))?;

        let projection = num_filters != input_filters || downsample.is_requested();
        let shortcut = if projection {
            let params =
                ConvParams::new(num_filters, &[1, 1, 1], &stride, &[0, 0, 0]).no_bias(self.no_bias);
            let shortcut = graph.convolution(data, params, &format!("shortcut_projection_{}", c))?;
            // running-stat momentum is left at the engine default here
            let bn = BatchNormParams {
                fix_gamma: false,
                ..BatchNormParams::default()
            };
            graph.batch_norm(shortcut, bn, &format!("shortcut_projection_{}_spatbn", c))?
        } else {
            data
        };

        let out = graph.elemwise_add(shortcut, body)?;
        let out = graph.relu(out)?;

        debug!(
            "block {}: {} -> {} channels, stride {:?}, projection {}",
            c, input_filters, num_filters, stride, projection
        );
        self.blocks.push(BlockSummary {
            index: c,
            in_channels: input_filters,
            out_channels: num_filters,
            stride,
            projection,
            output: out,
        });
        self.comp_count += 1;
        Ok(out)
    }
}
