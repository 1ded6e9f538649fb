pub mod config_io;
pub mod graph_io;

pub use config_io::*;
pub use graph_io::*;
