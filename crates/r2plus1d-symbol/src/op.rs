use r2plus1d_core::shape::window_out;
use r2plus1d_core::{DType, GraphError, GraphResult, Shape};
use serde::{Deserialize, Serialize};

/// Convolution algorithm selection hint, forwarded untouched to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CudnnTune {
    #[default]
    Off,
    LimitedWorkspace,
    Fastest,
}

impl std::fmt::Display for CudnnTune {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CudnnTune::Off => "off",
            CudnnTune::LimitedWorkspace => "limited_workspace",
            CudnnTune::Fastest => "fastest",
        };
        write!(f, "{}", s)
    }
}

/// N-dimensional convolution. `kernel`, `stride` and `pad` share one length,
/// which must equal the input rank minus two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvParams {
    pub num_filter: usize,
    pub kernel: Vec<usize>,
    pub stride: Vec<usize>,
    pub pad: Vec<usize>,
    pub no_bias: bool,
    pub cudnn_tune: CudnnTune,
    /// Scratch space hint in MB.
    pub workspace: usize,
}

impl ConvParams {
    pub fn new(num_filter: usize, kernel: &[usize], stride: &[usize], pad: &[usize]) -> Self {
        ConvParams {
            num_filter,
            kernel: kernel.to_vec(),
            stride: stride.to_vec(),
            pad: pad.to_vec(),
            no_bias: false,
            cudnn_tune: CudnnTune::Off,
            workspace: 1024,
        }
    }

    pub fn no_bias(mut self, no_bias: bool) -> Self {
        self.no_bias = no_bias;
        self
    }

    pub fn tuning(mut self, cudnn_tune: CudnnTune, workspace: usize) -> Self {
        self.cudnn_tune = cudnn_tune;
        self.workspace = workspace;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNormParams {
    pub eps: f64,
    pub momentum: f64,
    /// Freeze the scale at 1 instead of learning it.
    pub fix_gamma: bool,
}

impl Default for BatchNormParams {
    fn default() -> Self {
        BatchNormParams {
            eps: 1e-3,
            momentum: 0.9,
            fix_gamma: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActType {
    Relu,
    Sigmoid,
    Tanh,
}

impl std::fmt::Display for ActType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActType::Relu => "relu",
            ActType::Sigmoid => "sigmoid",
            ActType::Tanh => "tanh",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    Max,
    Avg,
    Sum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    pub kernel: Vec<usize>,
    pub stride: Vec<usize>,
    pub pad: Vec<usize>,
    pub pool_type: PoolType,
}

impl PoolParams {
    pub fn new(pool_type: PoolType, kernel: &[usize], stride: &[usize], pad: &[usize]) -> Self {
        PoolParams {
            kernel: kernel.to_vec(),
            stride: stride.to_vec(),
            pad: pad.to_vec(),
            pool_type,
        }
    }
}

/// How the softmax output gradient is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    Null,
    Batch,
    Valid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxParams {
    /// Softmax over axis 1 for every remaining position.
    pub multi_output: bool,
    pub use_ignore: bool,
    /// Label value skipped when `use_ignore` is set.
    pub ignore_label: f64,
    pub normalization: Normalization,
    pub grad_scale: f64,
}

impl Default for SoftmaxParams {
    fn default() -> Self {
        SoftmaxParams {
            multi_output: false,
            use_ignore: false,
            ignore_label: -1.0,
            normalization: Normalization::Null,
            grad_scale: 1.0,
        }
    }
}

/// The operation that produced a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Placeholder fed by the caller (data or label).
    Variable { dtype: DType, shape: Option<Shape> },
    Convolution(ConvParams),
    BatchNorm(BatchNormParams),
    Activation { act_type: ActType },
    /// Element-wise sum of two same-shape inputs.
    ElemwiseAdd,
    Pooling(PoolParams),
    FullyConnected { num_hidden: usize, no_bias: bool },
    /// Softmax with cross-entropy gradient against a label input.
    SoftmaxOutput(SoftmaxParams),
}

/// Whether a parameter is learned or a running statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Arg,
    Aux,
}

/// A parameter implicitly owned by an operator node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub shape: Option<Shape>,
    pub kind: ParamKind,
}

impl Op {
    /// Prefix used when the graph generates a name for this op.
    pub fn name_prefix(&self) -> &'static str {
        match self {
            Op::Variable { .. } => "var",
            Op::Convolution(_) => "convolution",
            Op::BatchNorm(_) => "batchnorm",
            Op::Activation { .. } => "activation",
            Op::ElemwiseAdd => "_plus",
            Op::Pooling(_) => "pooling",
            Op::FullyConnected { .. } => "fullyconnected",
            Op::SoftmaxOutput(_) => "softmaxoutput",
        }
    }

    /// Number of node inputs the op consumes.
    pub fn arity(&self) -> usize {
        match self {
            Op::Variable { .. } => 0,
            Op::ElemwiseAdd | Op::SoftmaxOutput(_) => 2,
            _ => 1,
        }
    }

    /// Infer the output shape from whatever input shapes are known.
    ///
    /// Returns `Ok(None)` when a required input shape is still unknown.
    pub fn infer_shape(&self, name: &str, inputs: &[Option<&Shape>]) -> GraphResult<Option<Shape>> {
        if inputs.len() != self.arity() {
            return Err(GraphError::InvalidShape {
                op: name.to_string(),
                reason: format!("expected {} inputs, got {}", self.arity(), inputs.len()),
            });
        }

        match self {
            Op::Variable { shape, .. } => Ok(shape.clone()),
            Op::Convolution(p) => match inputs[0] {
                Some(x) => {
                    let spatial = sliding_window(name, x, &p.kernel, &p.stride, &p.pad)?;
                    let mut dims = vec![x.dim(0)?, p.num_filter];
                    dims.extend(spatial);
                    Ok(Some(Shape::new(dims)))
                }
                None => Ok(None),
            },
            Op::Pooling(p) => match inputs[0] {
                Some(x) => {
                    let spatial = sliding_window(name, x, &p.kernel, &p.stride, &p.pad)?;
                    let mut dims = vec![x.dim(0)?, x.dim(1)?];
                    dims.extend(spatial);
                    Ok(Some(Shape::new(dims)))
                }
                None => Ok(None),
            },
            Op::BatchNorm(_) => match inputs[0] {
                Some(x) if x.ndim() < 2 => Err(GraphError::InvalidShape {
                    op: name.to_string(),
                    reason: format!("batch norm needs a channel axis, got {}", x),
                }),
                other => Ok(other.cloned()),
            },
            Op::Activation { .. } => Ok(inputs[0].cloned()),
            Op::ElemwiseAdd => match (inputs[0], inputs[1]) {
                (Some(a), Some(b)) if a != b => Err(GraphError::ShapeMismatch {
                    op: name.to_string(),
                    expected: a.to_vec(),
                    got: b.to_vec(),
                }),
                (Some(a), _) => Ok(Some(a.clone())),
                (None, b) => Ok(b.cloned()),
            },
            Op::FullyConnected { num_hidden, .. } => match inputs[0] {
                Some(x) => {
                    let batch = x.flatten_batch()?.dim(0)?;
                    Ok(Some(Shape::new(vec![batch, *num_hidden])))
                }
                None => Ok(None),
            },
            Op::SoftmaxOutput(p) => match inputs[0] {
                Some(data) => {
                    if let Some(label) = inputs[1] {
                        let expected = softmax_label_shape(data, p.multi_output);
                        if label.numel() != expected.numel() {
                            return Err(GraphError::ShapeMismatch {
                                op: name.to_string(),
                                expected: expected.to_vec(),
                                got: label.to_vec(),
                            });
                        }
                    }
                    Ok(Some(data.clone()))
                }
                None => Ok(None),
            },
        }
    }

    /// Parameters the op owns, named after the node. `input` is the shape of
    /// the first input, when known.
    pub fn parameters(&self, name: &str, input: Option<&Shape>) -> Vec<ParamSpec> {
        let arg = |suffix: &str, shape: Option<Shape>| ParamSpec {
            name: format!("{}_{}", name, suffix),
            shape,
            kind: ParamKind::Arg,
        };
        let aux = |suffix: &str, shape: Option<Shape>| ParamSpec {
            name: format!("{}_{}", name, suffix),
            shape,
            kind: ParamKind::Aux,
        };

        match self {
            Op::Convolution(p) => {
                let weight = input.and_then(|x| x.dim(1).ok()).map(|in_channels| {
                    let mut dims = vec![p.num_filter, in_channels];
                    dims.extend_from_slice(&p.kernel);
                    Shape::new(dims)
                });
                let mut params = vec![arg("weight", weight)];
                if !p.no_bias {
                    params.push(arg("bias", Some(Shape::new(vec![p.num_filter]))));
                }
                params
            }
            Op::BatchNorm(_) => {
                let channels = input.and_then(|x| x.dim(1).ok()).map(|c| Shape::new(vec![c]));
                vec![
                    arg("gamma", channels.clone()),
                    arg("beta", channels.clone()),
                    aux("moving_mean", channels.clone()),
                    aux("moving_var", channels),
                ]
            }
            Op::FullyConnected { num_hidden, no_bias } => {
                let weight = input
                    .and_then(|x| x.flatten_batch().ok())
                    .and_then(|flat| flat.dim(1).ok())
                    .map(|features| Shape::new(vec![*num_hidden, features]));
                let mut params = vec![arg("weight", weight)];
                if !*no_bias {
                    params.push(arg("bias", Some(Shape::new(vec![*num_hidden]))));
                }
                params
            }
            _ => Vec::new(),
        }
    }

    /// One-line description used in logs and graph dumps.
    pub fn summary(&self) -> String {
        match self {
            Op::Variable { dtype, .. } => format!("Variable[{}]", dtype),
            Op::Convolution(p) => format!(
                "Convolution[{}, k={:?}, s={:?}, p={:?}]",
                p.num_filter, p.kernel, p.stride, p.pad
            ),
            Op::BatchNorm(p) => format!("BatchNorm[eps={}, mom={}]", p.eps, p.momentum),
            Op::Activation { act_type } => format!("Activation[{}]", act_type),
            Op::ElemwiseAdd => "ElemwiseAdd".to_string(),
            Op::Pooling(p) => format!("Pooling[{:?}, k={:?}, s={:?}]", p.pool_type, p.kernel, p.stride),
            Op::FullyConnected { num_hidden, .. } => format!("FullyConnected[{}]", num_hidden),
            Op::SoftmaxOutput(_) => "SoftmaxOutput".to_string(),
        }
    }
}

fn sliding_window(
    name: &str,
    x: &Shape,
    kernel: &[usize],
    stride: &[usize],
    pad: &[usize],
) -> GraphResult<Vec<usize>> {
    let n = kernel.len();
    if stride.len() != n || pad.len() != n {
        return Err(GraphError::InvalidShape {
            op: name.to_string(),
            reason: format!(
                "kernel {:?}, stride {:?} and pad {:?} differ in length",
                kernel, stride, pad
            ),
        });
    }
    if x.ndim() != n + 2 {
        return Err(GraphError::InvalidShape {
            op: name.to_string(),
            reason: format!("{}-d kernel needs a rank {} input, got {}", n, n + 2, x),
        });
    }

    let mut out = Vec::with_capacity(n);
    for axis in 0..n {
        let len = x.dims()[axis + 2];
        let dim = window_out(len, kernel[axis], stride[axis], pad[axis]).ok_or_else(|| {
            GraphError::InvalidShape {
                op: name.to_string(),
                reason: format!(
                    "window {} (stride {}, pad {}) does not fit axis {} of {}",
                    kernel[axis],
                    stride[axis],
                    pad[axis],
                    axis + 2,
                    x
                ),
            }
        })?;
        out.push(dim);
    }
    Ok(out)
}

/// Label layout expected for softmax over `data`.
fn softmax_label_shape(data: &Shape, multi_output: bool) -> Shape {
    let dims = data.dims();
    if multi_output && dims.len() > 1 {
        let mut label = vec![dims[0]];
        label.extend_from_slice(&dims[2..]);
        Shape::new(label)
    } else {
        Shape::new(dims.iter().take(1).copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(num_filter: usize, kernel: [usize; 3], stride: [usize; 3], pad: [usize; 3]) -> Op {
        Op::Convolution(ConvParams::new(num_filter, &kernel, &stride, &pad))
    }

    #[test]
    fn test_conv_shape_stem() {
        let x = Shape::from([2, 3, 8, 112, 112]);
        let op = conv(45, [1, 7, 7], [1, 2, 2], [0, 3, 3]);
        let out = op.infer_shape("conv1_middle", &[Some(&x)]).unwrap().unwrap();
        assert_eq!(out.dims(), &[2, 45, 8, 56, 56]);
    }

    #[test]
    fn test_conv_shape_unknown_input() {
        let op = conv(64, [3, 1, 1], [1, 1, 1], [1, 0, 0]);
        assert_eq!(op.infer_shape("conv1", &[None]).unwrap(), None);
    }

    #[test]
    fn test_conv_rank_mismatch() {
        let x = Shape::from([2, 3, 112, 112]);
        let op = conv(45, [1, 7, 7], [1, 2, 2], [0, 3, 3]);
        assert!(matches!(
            op.infer_shape("c", &[Some(&x)]),
            Err(GraphError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_pool_kernel_too_large() {
        let x = Shape::from([1, 512, 1, 4, 4]);
        let op = Op::Pooling(PoolParams::new(PoolType::Avg, &[1, 7, 7], &[1, 1, 1], &[0, 0, 0]));
        assert!(op.infer_shape("final_pool", &[Some(&x)]).is_err());
    }

    #[test]
    fn test_add_mismatch() {
        let a = Shape::from([1, 64, 8, 56, 56]);
        let b = Shape::from([1, 128, 4, 28, 28]);
        let err = Op::ElemwiseAdd.infer_shape("_plus0", &[Some(&a), Some(&b)]).unwrap_err();
        assert!(matches!(err, GraphError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_fc_flattens() {
        let x = Shape::from([4, 512, 1, 1, 1]);
        let op = Op::FullyConnected { num_hidden: 101, no_bias: false };
        let out = op.infer_shape("final_fc", &[Some(&x)]).unwrap().unwrap();
        assert_eq!(out.dims(), &[4, 101]);

        let params = op.parameters("final_fc", Some(&x));
        assert_eq!(params[0].name, "final_fc_weight");
        assert_eq!(params[0].shape, Some(Shape::from([101, 512])));
        assert_eq!(params[1].shape, Some(Shape::from([101])));
    }

    #[test]
    fn test_softmax_label_check() {
        let logits = Shape::from([4, 10]);
        let op = Op::SoftmaxOutput(SoftmaxParams {
            multi_output: true,
            ..Default::default()
        });
        let good = Shape::from([4]);
        let bad = Shape::from([3]);
        assert!(op.infer_shape("softmax", &[Some(&logits), Some(&good)]).is_ok());
        assert!(op.infer_shape("softmax", &[Some(&logits), Some(&bad)]).is_err());
        // label shape may stay unknown
        let out = op.infer_shape("softmax", &[Some(&logits), None]).unwrap();
        assert_eq!(out, Some(logits));
    }

    #[test]
    fn test_conv_parameters() {
        let x = Shape::from([1, 64, 8, 56, 56]);
        let op = Op::Convolution(ConvParams::new(144, &[1, 3, 3], &[1, 1, 1], &[0, 1, 1]).no_bias(true));
        let params = op.parameters("comp_0_conv_1_middle", Some(&x));
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "comp_0_conv_1_middle_weight");
        assert_eq!(params[0].shape, Some(Shape::from([144, 64, 1, 3, 3])));
    }

    #[test]
    fn test_batchnorm_parameters() {
        let x = Shape::from([1, 64, 8, 56, 56]);
        let params = Op::BatchNorm(BatchNormParams::default()).parameters("bn", Some(&x));
        let aux: Vec<_> = params.iter().filter(|p| p.kind == ParamKind::Aux).collect();
        assert_eq!(params.len(), 4);
        assert_eq!(aux.len(), 2);
        assert_eq!(aux[0].name, "bn_moving_mean");
    }

    #[test]
    fn test_op_serde_tag() {
        let op = Op::Activation { act_type: ActType::Relu };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"op":"activation","act_type":"relu"}"#);
        let back: Op = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
