//! Random-forest classifier inference
//!
//! Trees are stored as flat node arrays (node 0 is the root) and serialize to
//! plain JSON, so a model bundle can be hashed canonically and reloaded
//! without the trainer.

pub mod model;
pub mod tree;

pub use model::{Forest, FOREST_VERSION};
pub use tree::{Node, Tree};
