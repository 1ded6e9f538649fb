pub mod graph;
pub mod op;
pub mod ops;
pub mod infer;
pub mod dot;

pub use graph::*;
pub use op::*;
