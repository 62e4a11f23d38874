//! Fat-tree topology module.
//!
//! This module contains the fabric data model and the k-ary-n-tree
//! construction algorithm that fills it.

pub mod builder;
pub mod types;

// Re-export key types and functions for easier access
pub use builder::{build, build_fat_tree, BuildError};
pub use types::{Guid, Link, Node, NodeId, NodeKind, PortNumber, Topology};
