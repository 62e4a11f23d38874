//! Fabric serialization.
//!
//! A finished [`Topology`] is written either as an `ibnetdiscover` dump, the
//! format InfiniBand simulators and analysis scripts read, or as JSON.
//! Nothing here touches the topology; a build error can never produce a
//! half-written file.

pub mod ibnetdiscover;
pub mod json;

use chrono::NaiveDateTime;
use log::info;
use std::io::Write;

use crate::config::FabricConfig;
use crate::topology::{NodeId, PortNumber, Topology};

/// Errors that can occur while writing a topology
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to write topology: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode topology as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{node} port {port} points to {peer}, which is not in the topology")]
    DanglingLink {
        node: NodeId,
        port: PortNumber,
        peer: NodeId,
    },

    #[error("{0} is a host adapter without a port GUID")]
    MissingPortGuid(NodeId),
}

/// Output format of the generated topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// ibnetdiscover topology file
    #[default]
    Ibnetdiscover,
    /// JSON document with every node and its ports
    Json,
}

/// Write `topology` in the requested format
pub fn render<W: Write>(
    out: &mut W,
    format: OutputFormat,
    topology: &Topology,
    config: &FabricConfig,
    generated_at: Option<NaiveDateTime>,
) -> Result<(), OutputError> {
    match format {
        OutputFormat::Ibnetdiscover => {
            ibnetdiscover::write_topology(out, topology, config, generated_at)
        }
        OutputFormat::Json => json::write_topology(out, topology, config),
    }
}

/// Log node counts. They go to the log stream so that redirecting the
/// topology to a file captures only the topology.
pub fn log_summary(topology: &Topology) {
    info!("Total number of nodes: {}", topology.len());
    info!("Total number of Switches: {}", topology.switch_count());
    info!("Total number of HCAs: {}", topology.host_count());
    info!("Total number of links: {}", topology.link_count());
}
