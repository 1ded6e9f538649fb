use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};

/// Dimensions of a graph node's output, batch axis first.
///
/// Video tensors are laid out as `(batch, channels, time, height, width)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Size along a specific axis.
    pub fn dim(&self, axis: usize) -> GraphResult<usize> {
        self.dims.get(axis).copied().ok_or_else(|| GraphError::InvalidShape {
            op: "dim".to_string(),
            reason: format!("axis {} out of range for rank {}", axis, self.ndim()),
        })
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        if self.dims.is_empty() {
            1 // scalar
        } else {
            self.dims.iter().product()
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.dims.clone()
    }

    /// Collapse every axis after the first: `(n, a, b, ...)` becomes `(n, a*b*...)`.
    pub fn flatten_batch(&self) -> GraphResult<Shape> {
        let batch = self.dim(0)?;
        let rest: usize = self.dims[1..].iter().product();
        Ok(Shape::new(vec![batch, rest]))
    }
}

/// Output length of a sliding window over one axis.
///
/// `(input + 2 * pad - kernel) / stride + 1`, or `None` when the window does
/// not fit inside the padded input or the stride is zero.
pub fn window_out(input: usize, kernel: usize, stride: usize, pad: usize) -> Option<usize> {
    let padded = input + 2 * pad;
    if kernel == 0 || stride == 0 || kernel > padded {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let s = Shape::new(vec![2, 3, 8, 112, 112]);
        assert_eq!(s.ndim(), 5);
        assert_eq!(s.numel(), 2 * 3 * 8 * 112 * 112);
        assert_eq!(s.dim(1).unwrap(), 3);
        assert!(s.dim(5).is_err());
    }

    #[test]
    fn test_flatten_batch() {
        let s = Shape::from([4, 512, 1, 1, 1]);
        assert_eq!(s.flatten_batch().unwrap().dims(), &[4, 512]);
        assert!(Shape::new(vec![]).flatten_batch().is_err());
    }

    #[test]
    fn test_window_out() {
        // 1x7x7 stem: 112 -> 56 with stride 2, pad 3
        assert_eq!(window_out(112, 7, 2, 3), Some(56));
        // same padding
        assert_eq!(window_out(8, 3, 1, 1), Some(8));
        assert_eq!(window_out(1, 3, 1, 0), None);
        assert_eq!(window_out(4, 1, 0, 0), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::from([1, 3, 8]).to_string(), "(1, 3, 8)");
    }
}
