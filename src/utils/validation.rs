//! Topology invariant checks.
//!
//! These run on every freshly built topology and can be used on any
//! [`Topology`] assembled by hand. They check the cabling invariants
//! (symmetry, no self-links, no duplicate cables) and the GUID invariants
//! (uniqueness, each kind inside its own range).

use std::collections::{HashMap, HashSet};

use crate::config::{GUID_RANGE_SIZE, HCA_GUID_BASE, PORT_GUID_BASE, SWITCH_GUID_BASE};
use crate::topology::types::{Guid, NodeId, NodeKind, PortNumber, Topology};

/// A broken topology invariant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("{node} port {port} points to {peer}, which is not in the topology")]
    DanglingLink {
        node: NodeId,
        port: PortNumber,
        peer: NodeId,
    },

    #[error("{node} port {port} points to {peer} port {peer_port}, which does not point back")]
    AsymmetricLink {
        node: NodeId,
        port: PortNumber,
        peer: NodeId,
        peer_port: PortNumber,
    },

    #[error("{node} port {port} is linked to its own node")]
    SelfLink { node: NodeId, port: PortNumber },

    #[error("{node} and {peer} are cabled together more than once")]
    DuplicateLink { node: NodeId, peer: NodeId },

    #[error("GUID {guid} is used by both {first} and {second}")]
    DuplicateGuid {
        guid: Guid,
        first: String,
        second: String,
    },

    #[error("GUID {guid} of {owner} is outside its range")]
    GuidOutOfRange { guid: Guid, owner: String },

    #[error("{node} is a {kind:?} but its port GUID does not match its kind")]
    PortGuidMismatch { node: NodeId, kind: NodeKind },
}

/// Check that every bound port is mirrored by its peer and that the graph
/// is simple.
///
/// # Returns
/// * `Ok(())` if every link is symmetric
/// * `Err(InvariantViolation)` describing the first broken link
pub fn validate_links(topology: &Topology) -> Result<(), InvariantViolation> {
    for node in topology.nodes() {
        let mut peers = HashSet::new();

        for (port, link) in node.links() {
            if link.peer == node.id {
                return Err(InvariantViolation::SelfLink { node: node.id, port });
            }

            let peer = topology
                .get(link.peer)
                .ok_or(InvariantViolation::DanglingLink {
                    node: node.id,
                    port,
                    peer: link.peer,
                })?;

            let mirrored = peer
                .link(link.peer_port)
                .is_some_and(|back| back.peer == node.id && back.peer_port == port);
            if !mirrored {
                return Err(InvariantViolation::AsymmetricLink {
                    node: node.id,
                    port,
                    peer: link.peer,
                    peer_port: link.peer_port,
                });
            }

            if !peers.insert(link.peer) {
                return Err(InvariantViolation::DuplicateLink {
                    node: node.id,
                    peer: link.peer,
                });
            }
        }
    }

    Ok(())
}

/// Check that no GUID is reused and that each GUID lies in the range of
/// its kind.
///
/// Node GUIDs and host port GUIDs share one namespace, so a port GUID that
/// equals any node GUID is a duplicate too.
pub fn validate_guids(topology: &Topology) -> Result<(), InvariantViolation> {
    let mut owners: HashMap<Guid, String> = HashMap::new();

    let mut claim = |guid: Guid, owner: String, base: u64| {
        if guid.0 < base || guid.0 - base >= GUID_RANGE_SIZE {
            return Err(InvariantViolation::GuidOutOfRange { guid, owner });
        }
        if let Some(first) = owners.get(&guid) {
            return Err(InvariantViolation::DuplicateGuid {
                guid,
                first: first.clone(),
                second: owner,
            });
        }
        owners.insert(guid, owner);
        Ok(())
    };

    for node in topology.nodes() {
        match (node.kind(), node.port_guid) {
            (NodeKind::Switch, None) => {
                claim(node.guid, node.id.to_string(), SWITCH_GUID_BASE)?;
            }
            (NodeKind::HostAdapter, Some(port_guid)) => {
                claim(node.guid, node.id.to_string(), HCA_GUID_BASE)?;
                claim(port_guid, format!("{} port 1", node.id), PORT_GUID_BASE)?;
            }
            (kind, _) => {
                return Err(InvariantViolation::PortGuidMismatch { node: node.id, kind });
            }
        }
    }

    Ok(())
}
