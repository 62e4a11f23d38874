//! # fattree-builder - k-ary-n-tree topology generator
//!
//! This library builds the full cabling plan of a k-ary-n-tree (fat-tree)
//! InfiniBand fabric and writes it in the `ibnetdiscover` format that
//! network simulators and topology analysis scripts read.
//!
//! ## Overview
//!
//! A k-ary-n-tree has `n` levels of switches with `2k` ports each (or
//! `k + k * oversubscription` with oversubscription). The first `k` ports of
//! every switch go up, the rest go down. Host adapters hang off the leaf
//! switches. With fully connected roots, a mirrored subtree is attached to
//! the root ports the primary tree leaves free, doubling the host count.
//!
//! ## Architecture
//!
//! - `config`: fabric parameters, YAML loading and validation
//! - `topology`: the node/port graph and the construction algorithm
//! - `output`: ibnetdiscover and JSON serialization
//! - `utils`: log level parsing and topology invariant checks
//!
//! ## Example Usage
//!
//! ```rust
//! use fattree_builder::config::FabricConfig;
//! use fattree_builder::output::{self, OutputFormat};
//! use fattree_builder::topology;
//!
//! let config = FabricConfig::new(2, 3, 1, false);
//! let fabric = topology::build(&config)?;
//! assert_eq!(fabric.switch_count(), 12);
//! assert_eq!(fabric.host_count(), 8);
//!
//! let mut out = Vec::new();
//! output::render(&mut out, OutputFormat::Ibnetdiscover, &fabric, &config, None)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Library functions return `thiserror` enums: [`config::ConfigurationError`]
//! for invalid parameters, [`topology::BuildError`] for construction
//! failures and [`output::OutputError`] for serialization. The binary wraps
//! them with `color_eyre` for reporting.

pub mod config;
pub mod output;
pub mod topology;
pub mod utils;

pub use config::{ConfigurationError, FabricConfig};
pub use topology::{build, build_fat_tree, BuildError, Topology};
