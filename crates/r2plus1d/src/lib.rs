//! # r2plus1d
//!
//! Symbolic graphs for R(2+1)D video classification networks: residual
//! networks whose 3D convolutions are factorized into a `1x3x3` spatial and a
//! `3x1x1` temporal convolution.
//!
//! ## Modules
//!
//! - **core** — Shapes, element types and the shared error type
//! - **symbol** — Append-only node graph with shape inference and parameter listing
//! - **model** — Depth table, residual block builder and `create_r3d`
//! - **io** — JSON configs, graph export and Graphviz output
//!
//! ```no_run
//! use r2plus1d::model::{create_r3d, R3dConfig};
//! use r2plus1d::core::Shape;
//!
//! let net = create_r3d(&R3dConfig::new(400).with_depth(34)).unwrap();
//! let bound = net.bind(Shape::from([1, 3, 8, 112, 112])).unwrap();
//! println!("{} parameters", bound.parameter_count().unwrap());
//! ```

/// Shapes, dtypes and errors.
pub use r2plus1d_core as core;

/// Symbolic graph engine.
pub use r2plus1d_symbol as symbol;

/// Network assembly.
pub use r2plus1d_model as model;

/// I/O utilities.
pub use r2plus1d_io as io;

pub use r2plus1d_model::{create_r3d, R3dConfig, R3dNetwork};
