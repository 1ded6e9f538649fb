pub mod depth;
pub mod config;
pub mod builder;
pub mod r3d;

pub use depth::*;
pub use config::*;
pub use builder::*;
pub use r3d::*;
