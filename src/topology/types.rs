//! Topology type definitions.
//!
//! The fabric is a map from [`NodeId`] to [`Node`]. Every node owns a
//! fixed-size port array; a bound port holds a [`Link`] naming the peer node
//! and the peer's port, and the peer holds the mirror image of it.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::builder::BuildError;
use crate::utils::validation::{self, InvariantViolation};

/// 1-based port number on a node
pub type PortNumber = usize;

/// Kind of a fabric node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Switch,
    HostAdapter,
}

impl NodeKind {
    /// Name used on the node line of a topology file (`Switch` or `Ca`)
    pub fn long_name(self) -> &'static str {
        match self {
            Self::Switch => "Switch",
            Self::HostAdapter => "Ca",
        }
    }

    /// Prefix used in quoted GUIDs (`S` or `H`)
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Switch => "S",
            Self::HostAdapter => "H",
        }
    }
}

/// Stable identity of a node.
///
/// The derived ordering puts every switch before every host adapter and
/// orders each kind by index, which is exactly the order nodes are written
/// out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Switch(usize),
    Hca(usize),
}

impl NodeId {
    pub fn kind(self) -> NodeKind {
        match self {
            Self::Switch(_) => NodeKind::Switch,
            Self::Hca(_) => NodeKind::HostAdapter,
        }
    }

    /// Ordinal of the node among nodes of its kind
    pub fn index(self) -> usize {
        match self {
            Self::Switch(index) | Self::Hca(index) => index,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switch(index) => write!(f, "Switch{}", index),
            Self::Hca(index) => write!(f, "Hca{}", index),
        }
    }
}

/// 64-bit globally unique identifier of a node or port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(pub u64);

impl Guid {
    /// Lower-case hex without prefix or padding, e.g. `2000000`
    pub fn hex(self) -> String {
        format!("{:x}", self.0)
    }

    /// Hex zero-padded to 16 digits, e.g. `0000000003000000`
    pub fn padded_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Hex with a `0x` prefix, e.g. `0x3000000`
    pub fn prefixed_hex(self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One half of a cable: the node and port at the far end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub peer: NodeId,
    pub peer_port: PortNumber,
}

/// A switch or a host adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub guid: Guid,
    /// GUID of the single port of a host adapter; switches have none
    pub port_guid: Option<Guid>,
    ports: Vec<Option<Link>>,
}

impl Node {
    /// Create a switch with `total_ports` unconnected ports
    pub fn new_switch(index: usize, guid: Guid, total_ports: usize) -> Self {
        Self {
            id: NodeId::Switch(index),
            guid,
            port_guid: None,
            ports: vec![None; total_ports],
        }
    }

    /// Create a host adapter with its single unconnected port
    pub fn new_host_adapter(index: usize, guid: Guid, port_guid: Guid) -> Self {
        Self {
            id: NodeId::Hca(index),
            guid,
            port_guid: Some(port_guid),
            ports: vec![None],
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.id.kind()
    }

    pub fn total_ports(&self) -> usize {
        self.ports.len()
    }

    /// Link bound to `port`, or `None` when the port is unconnected or
    /// does not exist
    pub fn link(&self, port: PortNumber) -> Option<&Link> {
        port.checked_sub(1)
            .and_then(|slot| self.ports.get(slot))
            .and_then(Option::as_ref)
    }

    /// All ports in ascending order, bound or not
    pub fn ports(&self) -> impl Iterator<Item = (PortNumber, Option<&Link>)> + '_ {
        self.ports
            .iter()
            .enumerate()
            .map(|(slot, link)| (slot + 1, link.as_ref()))
    }

    /// Bound ports in ascending order
    pub fn links(&self) -> impl Iterator<Item = (PortNumber, &Link)> + '_ {
        self.ports()
            .filter_map(|(port, link)| link.map(|link| (port, link)))
    }

    pub fn connected_ports(&self) -> usize {
        self.ports.iter().filter(|link| link.is_some()).count()
    }

    pub fn is_disconnected(&self) -> bool {
        self.ports.iter().all(Option::is_none)
    }

    /// First unconnected port at or above `from`
    pub fn first_free_port(&self, from: PortNumber) -> Option<PortNumber> {
        (from.max(1)..=self.total_ports()).find(|&port| self.link(port).is_none())
    }
}

/// The whole fabric, iterated switches first, then host adapters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    nodes: BTreeMap<NodeId, Node>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, replacing any node with the same id
    pub(crate) fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in output order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn switch_count(&self) -> usize {
        self.nodes.keys().filter(|id| matches!(id, NodeId::Switch(_))).count()
    }

    pub fn host_count(&self) -> usize {
        self.nodes.keys().filter(|id| matches!(id, NodeId::Hca(_))).count()
    }

    /// Number of cables; each one is stored on both of its ends
    pub fn link_count(&self) -> usize {
        self.nodes().map(Node::connected_ports).sum::<usize>() / 2
    }

    /// First unconnected port of `id` at or above `from`
    pub fn first_free_port(&self, id: NodeId, from: PortNumber) -> Result<PortNumber, BuildError> {
        let node = self.get(id).ok_or(BuildError::UnknownNode(id))?;
        node.first_free_port(from)
            .ok_or(BuildError::NoFreePort { node: id, from })
    }

    /// Cable port `a_port` of `a` to port `b_port` of `b`.
    ///
    /// Both bindings are written or neither is.
    pub(crate) fn connect(
        &mut self,
        a: NodeId,
        a_port: PortNumber,
        b: NodeId,
        b_port: PortNumber,
    ) -> Result<(), BuildError> {
        if a == b {
            return Err(BuildError::SelfLink { node: a, port: a_port });
        }
        self.check_port_free(a, a_port)?;
        self.check_port_free(b, b_port)?;

        self.bind(a, a_port, Link { peer: b, peer_port: b_port });
        self.bind(b, b_port, Link { peer: a, peer_port: a_port });
        Ok(())
    }

    fn check_port_free(&self, id: NodeId, port: PortNumber) -> Result<(), BuildError> {
        let node = self.get(id).ok_or(BuildError::UnknownNode(id))?;
        if port < 1 || port > node.total_ports() {
            return Err(BuildError::PortOutOfRange {
                node: id,
                port,
                total: node.total_ports(),
            });
        }
        if let Some(existing) = node.link(port) {
            return Err(BuildError::PortInUse {
                node: id,
                port,
                peer: existing.peer,
            });
        }
        Ok(())
    }

    fn bind(&mut self, id: NodeId, port: PortNumber, link: Link) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.ports[port - 1] = Some(link);
        }
    }

    /// Write a single binding without its mirror, to build broken fabrics
    #[cfg(test)]
    pub(crate) fn bind_one_way(&mut self, id: NodeId, port: PortNumber, link: Link) {
        self.bind(id, port, link);
    }

    /// Remove every node with no bound port and return their ids.
    ///
    /// A node that is removed has no links, so no other node refers to it.
    pub fn prune_disconnected(&mut self) -> Vec<NodeId> {
        let removed: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.is_disconnected())
            .map(|node| node.id)
            .collect();

        for id in &removed {
            log::warn!("Removing {} because none of its ports are connected", id);
            self.nodes.remove(id);
        }

        removed
    }

    /// Check link symmetry, simplicity and GUID uniqueness
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        validation::validate_links(self)?;
        validation::validate_guids(self)
    }
}
