use log::info;
use r2plus1d_core::{DType, GraphResult, Shape};
use r2plus1d_symbol::{
    BatchNormParams, ConvParams, Graph, Normalization, NodeId, PoolParams, PoolType, SoftmaxParams,
};

use crate::builder::{BlockBuilder, BlockSummary, Downsample};
use crate::config::R3dConfig;
use crate::depth::ModelDepth;

/// Output channels of the four residual stages.
pub const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];

/// A fully assembled R(2+1)D classification graph.
#[derive(Debug, Clone, PartialEq)]
pub struct R3dNetwork {
    pub graph: Graph,
    /// The `softmax` output node; everything else is reachable from it.
    pub output: NodeId,
    pub depth: ModelDepth,
    pub blocks: Vec<BlockSummary>,
}

impl R3dNetwork {
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Copy of the graph with shapes inferred for a `(batch, 3, time, h, w)` input.
    pub fn bind(&self, data_shape: Shape) -> GraphResult<Graph> {
        self.graph.with_input_shapes(&[("data", data_shape)])
    }
}

/// Build the R(2+1)D network described by `config`.
///
/// Input is expected as `3 x 8t x 112 x 112`, giving a `512 x t x 7 x 7`
/// feature map before the final pool.
pub fn create_r3d(config: &R3dConfig) -> GraphResult<R3dNetwork> {
    let mut graph = Graph::new();
    let (output, depth, blocks) = build_r3d(&mut graph, config)?;
    info!(
        "built {}: {} blocks, {} nodes",
        depth,
        blocks.len(),
        graph.len()
    );
    Ok(R3dNetwork {
        graph,
        output,
        depth,
        blocks,
    })
}

/// Append the network to `graph`. The config is validated before the first
/// node is created.
pub fn build_r3d(
    graph: &mut Graph,
    config: &R3dConfig,
) -> GraphResult<(NodeId, ModelDepth, Vec<BlockSummary>)> {
    let depth = config.validate()?;
    let bn = BatchNormParams {
        eps: 1e-3,
        momentum: config.bn_mom,
        fix_gamma: false,
    };
    let conv = |num_filter: usize, kernel: [usize; 3], stride: [usize; 3], pad: [usize; 3]| {
        ConvParams::new(num_filter, &kernel, &stride, &pad)
            .no_bias(config.no_bias)
            .tuning(config.cudnn_tune, config.workspace)
    };

    // Stem
    let data = graph.variable("data", DType::Float32)?;
    let body = graph.convolution(data, conv(45, [1, 7, 7], [1, 2, 2], [0, 3, 3]), "conv1_middle")?;
    let body = graph.batch_norm(body, bn.clone(), "conv1_middle_spatbn_relu")?;
    let body = graph.relu(body)?;

    let body = graph.convolution(body, conv(64, [3, 1, 1], [1, 1, 1], [1, 0, 0]), "conv1")?;
    let body = graph.batch_norm(body, bn, "conv1_spatbn_relu")?;
    let mut body = graph.relu(body)?;

    // Residual stages; only the first block of a stage changes width or resolution.
    let mut builder = BlockBuilder::from_config(config);
    let mut in_filters = STAGE_WIDTHS[0];
    for (stage, (&width, &count)) in STAGE_WIDTHS.iter().zip(depth.stage_counts().iter()).enumerate() {
        let downsample = if stage == 0 {
            Downsample::Off
        } else {
            Downsample::SpatioTemporal
        };
        body = builder.add_r3d_block(graph, body, in_filters, width, downsample)?;
        for _ in 1..count {
            body = builder.add_r3d_block(graph, body, width, width, Downsample::Off)?;
        }
        in_filters = width;
    }

    // Head
    let t = config.final_temporal_kernel;
    let s = config.final_spatial_kernel;
    let pool = PoolParams::new(PoolType::Avg, &[t, s, s], &[1, 1, 1], &[0, 0, 0]);
    let body = graph.pooling(body, pool, "final_pool")?;
    let body = graph.fully_connected(body, config.num_class, false, "final_fc")?;
    let label = graph.variable("softmax_label", DType::Float32)?;
    let softmax = SoftmaxParams {
        multi_output: true,
        use_ignore: true,
        normalization: Normalization::Null,
        ..SoftmaxParams::default()
    };
    let output = graph.softmax_output(body, label, softmax, "softmax")?;

    Ok((output, depth, builder.into_blocks()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2plus1d_core::GraphError;
    use r2plus1d_symbol::{Op, ParamKind};
    use std::collections::HashSet;

    fn net(depth: u32) -> R3dNetwork {
        create_r3d(&R3dConfig::new(101).with_depth(depth)).unwrap()
    }

    #[test]
    fn test_block_count_per_depth() {
        for depth in ModelDepth::ALL {
            let n = net(depth.depth());
            assert_eq!(n.num_blocks(), depth.stage_counts().iter().sum::<usize>());
            assert_eq!(n.depth, depth);
            let adds = n.graph.nodes().iter().filter(|x| x.op == Op::ElemwiseAdd).count();
            assert_eq!(adds, n.num_blocks());
        }
    }

    #[test]
    fn test_depth18_channel_plan() {
        let n = net(18);
        let plan: Vec<(usize, usize)> = n.blocks.iter().map(|b| (b.in_channels, b.out_channels)).collect();
        assert_eq!(
            plan,
            vec![
                (64, 64),
                (64, 64),
                (64, 128),
                (128, 128),
                (128, 256),
                (256, 256),
                (256, 512),
                (512, 512),
            ]
        );
        let indices: Vec<usize> = n.blocks.iter().map(|b| b.index).collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_depth18_node_count() {
        // stem 7, blocks 8*13 plus 3 projections of 2, head 4
        assert_eq!(net(18).graph.len(), 7 + 8 * 13 + 3 * 2 + 4);
        assert_eq!(net(10).graph.len(), 7 + 4 * 13 + 3 * 2 + 4);
    }

    #[test]
    fn test_unsupported_depth_creates_nothing() {
        let mut graph = Graph::new();
        let err = build_r3d(&mut graph, &R3dConfig::new(101).with_depth(20)).unwrap_err();
        assert_eq!(err, GraphError::UnsupportedDepth(20));
        assert!(err.to_string().contains("20"));
        assert!(graph.is_empty());
        assert!(create_r3d(&R3dConfig::new(101).with_depth(20)).is_err());
    }

    #[test]
    fn test_names_unique() {
        for depth in ModelDepth::ALL {
            let n = net(depth.depth());
            let names = n.graph.names();
            let set: HashSet<&str> = names.iter().copied().collect();
            assert_eq!(set.len(), names.len());

            let params = n.graph.list_parameters();
            let param_set: HashSet<&str> = params.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(param_set.len(), params.len());
        }
    }

    #[test]
    fn test_projection_iff_width_or_resolution_changes() {
        let n = net(34);
        for block in &n.blocks {
            let expected = block.in_channels != block.out_channels || block.stride != [1, 1, 1];
            assert_eq!(block.projection, expected, "block {}", block.index);
            let proj = n.graph.find(&format!("shortcut_projection_{}", block.index));
            assert_eq!(proj.is_some(), expected, "block {}", block.index);
        }
        let projected: Vec<usize> = n.blocks.iter().filter(|b| b.projection).map(|b| b.index).collect();
        // stage starts for (3, 4, 6, 3)
        assert_eq!(projected, vec![3, 7, 13]);
    }

    #[test]
    fn test_deterministic() {
        let cfg = R3dConfig::new(400).with_depth(26);
        let a = create_r3d(&cfg).unwrap();
        let b = create_r3d(&cfg).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.graph.names(), b.graph.names());
    }

    #[test]
    fn test_output_reaches_everything() {
        let n = net(18);
        assert_eq!(n.graph.get(n.output).unwrap().name, "softmax");
        assert_eq!(n.graph.reachable(n.output).unwrap().len(), n.graph.len());
        let vars: Vec<&str> = n.graph.variables().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(vars, vec!["data", "softmax_label"]);
    }

    #[test]
    fn test_stem_and_head() {
        let n = net(18);
        let g = &n.graph;
        assert_eq!(
            &g.names()[..7],
            &[
                "data",
                "conv1_middle",
                "conv1_middle_spatbn_relu",
                "activation0",
                "conv1",
                "conv1_spatbn_relu",
                "activation1"
            ]
        );
        match &g.get(g.find("final_pool").unwrap()).unwrap().op {
            Op::Pooling(p) => {
                assert_eq!(p.kernel, vec![1, 7, 7]);
                assert_eq!(p.stride, vec![1, 1, 1]);
                assert_eq!(p.pool_type, PoolType::Avg);
            }
            other => panic!("unexpected op {:?}", other),
        }
        match &g.get(n.output).unwrap().op {
            Op::SoftmaxOutput(p) => {
                assert!(p.multi_output);
                assert!(p.use_ignore);
                assert_eq!(p.normalization, Normalization::Null);
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_shapes_for_standard_clip() {
        let n = net(18);
        let g = n.bind(Shape::from([1, 3, 8, 112, 112])).unwrap();
        let last_block = n.blocks.last().unwrap().output;
        assert_eq!(g.shape(last_block).unwrap(), Some(&Shape::from([1, 512, 1, 7, 7])));
        let pool = g.find("final_pool").unwrap();
        assert_eq!(g.shape(pool).unwrap(), Some(&Shape::from([1, 512, 1, 1, 1])));
        assert_eq!(g.shape(n.output).unwrap(), Some(&Shape::from([1, 101])));
    }

    #[test]
    fn test_longer_clip_with_temporal_pool() {
        // 8t frames with t = 4 -> 4 frames left before pooling
        let cfg = R3dConfig::new(10).with_final_kernels(7, 4);
        let n = create_r3d(&cfg).unwrap();
        let g = n.bind(Shape::from([2, 3, 32, 112, 112])).unwrap();
        let pool = g.find("final_pool").unwrap();
        assert_eq!(g.shape(pool).unwrap(), Some(&Shape::from([2, 512, 1, 1, 1])));
    }

    #[test]
    fn test_small_input_fails_in_engine() {
        // 32x32 frames leave a 2x2 map, too small for the 7x7 pool
        let n = net(18);
        let err = n.bind(Shape::from([1, 3, 8, 32, 32])).unwrap_err();
        assert!(matches!(err, GraphError::InvalidShape { .. }));
    }

    #[test]
    fn test_parameter_shapes() {
        let n = net(18);
        let g = n.bind(Shape::from([1, 3, 8, 112, 112])).unwrap();
        let params = g.list_parameters();
        let shape_of = |name: &str| {
            params
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| p.shape.clone())
                .unwrap()
        };
        assert_eq!(shape_of("conv1_middle_weight"), Shape::from([45, 3, 1, 7, 7]));
        assert_eq!(shape_of("comp_0_conv_1_middle_weight"), Shape::from([144, 64, 1, 3, 3]));
        assert_eq!(shape_of("comp_2_conv_1_middle_weight"), Shape::from([230, 64, 1, 3, 3]));
        assert_eq!(shape_of("comp_2_conv_1_weight"), Shape::from([128, 230, 3, 1, 1]));
        assert_eq!(shape_of("shortcut_projection_2_weight"), Shape::from([128, 64, 1, 1, 1]));
        assert_eq!(shape_of("final_fc_weight"), Shape::from([101, 512]));
        assert!(params.iter().any(|p| p.name == "final_fc_bias"));
        // bias is on by default for every convolution, projections included
        assert!(params.iter().any(|p| p.name == "conv1_bias"));
        assert!(params.iter().any(|p| p.name == "shortcut_projection_2_bias"));
        assert!(params
            .iter()
            .any(|p| p.name == "comp_7_spatbn_2_moving_var" && p.kind == ParamKind::Aux));
        assert!(g.parameter_count().unwrap() > 0);
    }

    #[test]
    fn test_no_bias_drops_conv_bias() {
        let n = create_r3d(&R3dConfig::new(101).with_no_bias(true)).unwrap();
        let params = n.graph.list_parameters();
        assert!(params.iter().all(|p| !(p.name.starts_with("comp_") && p.name.ends_with("_bias"))));
        assert!(params.iter().all(|p| p.name != "conv1_bias"));
        assert!(params.iter().all(|p| p.name != "shortcut_projection_2_bias"));
        assert!(params.iter().any(|p| p.name == "final_fc_bias"));
    }
}
