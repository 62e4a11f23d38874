//! JSON rendering of a topology.
//!
//! The document carries the fabric parameters and one entry per node, in
//! the same order as the ibnetdiscover output.

use serde::Serialize;
use std::io::Write;

use super::OutputError;
use crate::config::FabricConfig;
use crate::topology::{Node, NodeKind, PortNumber, Topology};

/// Top-level JSON document
#[derive(Serialize, Debug)]
pub struct FabricDocument<'a> {
    /// Parameters the fabric was built from
    pub fabric: &'a FabricConfig,
    pub total_switches: usize,
    pub total_hcas: usize,
    pub total_links: usize,
    pub nodes: Vec<NodeEntry>,
}

/// One switch or host adapter
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct NodeEntry {
    pub name: String,
    pub kind: NodeKind,
    pub guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_guid: Option<String>,
    pub total_ports: usize,
    /// Connected ports only
    pub ports: Vec<PortEntry>,
}

/// A connected port and its peer
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct PortEntry {
    pub port: PortNumber,
    pub peer: String,
    pub peer_port: PortNumber,
}

impl From<&Node> for NodeEntry {
    fn from(node: &Node) -> Self {
        Self {
            name: node.id.to_string(),
            kind: node.kind(),
            guid: node.guid.prefixed_hex(),
            port_guid: node.port_guid.map(|guid| guid.prefixed_hex()),
            total_ports: node.total_ports(),
            ports: node
                .links()
                .map(|(port, link)| PortEntry {
                    port,
                    peer: link.peer.to_string(),
                    peer_port: link.peer_port,
                })
                .collect(),
        }
    }
}

impl<'a> FabricDocument<'a> {
    pub fn new(topology: &Topology, config: &'a FabricConfig) -> Self {
        Self {
            fabric: config,
            total_switches: topology.switch_count(),
            total_hcas: topology.host_count(),
            total_links: topology.link_count(),
            nodes: topology.nodes().map(NodeEntry::from).collect(),
        }
    }
}

/// Write `topology` as pretty-printed JSON followed by a newline
pub fn write_topology<W: Write>(
    out: &mut W,
    topology: &Topology,
    config: &FabricConfig,
) -> Result<(), OutputError> {
    let document = FabricDocument::new(topology, config);
    serde_json::to_writer_pretty(&mut *out, &document)?;
    writeln!(out)?;
    Ok(())
}
