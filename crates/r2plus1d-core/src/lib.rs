pub mod shape;
pub mod dtype;
pub mod error;

pub use shape::Shape;
pub use dtype::DType;
pub use error::{GraphError, GraphResult};
