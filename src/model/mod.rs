pub mod edge;
pub mod node;

pub use edge::*;
pub use node::*;
