//! k-ary-n-tree construction.
//!
//! Switches are numbered row by row, leaves first. With root doubling the
//! rows above the shared root row hold the mirrored subtree, whose leaves
//! sit in the top row. Wiring always goes from a lower row up: the first k
//! ports of a switch are its up-links and the peer switch hands out its
//! first free port from the down-facing half.

use log::{debug, info};

use super::types::{Guid, Node, NodeId, PortNumber, Topology};
use crate::config::{
    ConfigurationError, FabricConfig, FabricDimensions, HCA_GUID_BASE, PORT_GUID_BASE,
    SWITCH_GUID_BASE,
};
use crate::utils::validation::InvariantViolation;

/// Errors that can occur while building a topology
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{0} does not exist in the topology")]
    UnknownNode(NodeId),

    #[error("{node} has no free port at or above port {from}")]
    NoFreePort { node: NodeId, from: PortNumber },

    #[error("{node} port {port} is already connected to {peer}")]
    PortInUse {
        node: NodeId,
        port: PortNumber,
        peer: NodeId,
    },

    #[error("{node} has no port {port} (total ports: {total})")]
    PortOutOfRange {
        node: NodeId,
        port: PortNumber,
        total: usize,
    },

    #[error("{node} port {port} cannot be connected to its own node")]
    SelfLink { node: NodeId, port: PortNumber },

    #[error("Up-link {port} of Switch{switch} points outside the switch rows")]
    UplinkOutOfRange { switch: usize, port: PortNumber },

    #[error("Topology failed verification: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// How the up-links of one switch are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkPlan {
    /// Level of the switch inside its own subtree (0 = leaf)
    pub level: usize,
    /// The scan for a free port on the upper switch starts after this port
    pub remote_port_offset: usize,
    /// Subtracted from the computed upper switch index
    pub remote_switch_offset: usize,
}

/// Work out how switch `sw_no` connects upward.
///
/// Returns `None` for the switches of the shared root row; their links are
/// all made while the rows below them are processed.
pub fn uplink_plan(sw_no: usize, k: usize, n: usize, switches_per_row: usize) -> Option<UplinkPlan> {
    let mut level = sw_no / switches_per_row;
    let mut remote_port_offset = k;
    let mut remote_switch_offset = 0;

    if level == n - 1 {
        return None;
    }
    if level > n - 1 {
        // Mirrored subtree. The row right below the roots lands on the first
        // k root ports, because the primary subtree already holds the rest.
        level -= n;
        if level == n - 2 {
            remote_port_offset = 0;
            remote_switch_offset = n * switches_per_row;
        }
    }

    Some(UplinkPlan {
        level,
        remote_port_offset,
        remote_switch_offset,
    })
}

/// Index of the switch that up-port `port` (1-based) of `sw_no` connects to.
///
/// Switches in a row repeat their wiring pattern every `k^level` switches,
/// which yields the butterfly fan-out of a fat tree.
pub fn remote_switch_index(
    sw_no: usize,
    port: PortNumber,
    plan: &UplinkPlan,
    k: usize,
    switches_per_row: usize,
) -> Option<usize> {
    let start_of_upper_row = plan.level * switches_per_row + switches_per_row;
    let index_in_row = sw_no - plan.level * switches_per_row;
    let step = k.pow(plan.level as u32);
    let pattern_multiplier = (index_in_row / step / k) * step;

    (start_of_upper_row + (port - 1) * step + pattern_multiplier * k + index_in_row % step)
        .checked_sub(plan.remote_switch_offset)
}

/// Leaf switch index and switch port serving host adapter `hca_no`
pub fn host_attachment(
    hca_no: usize,
    k: usize,
    n: usize,
    oversubscription: usize,
    switches_per_row: usize,
) -> (usize, PortNumber) {
    let hosts_per_leaf = k * oversubscription;
    let mut sw_no = hca_no / hosts_per_leaf;
    if sw_no > switches_per_row - 1 {
        // Leaves of the mirrored subtree occupy the top switch row
        sw_no += (n - 1) * switches_per_row;
    }
    (sw_no, hca_no % hosts_per_leaf + k + 1)
}

/// Build a k-ary-n-tree from its four defining parameters
pub fn build_fat_tree(
    k: u32,
    n: u32,
    oversubscription: u32,
    fully_connected_roots: bool,
) -> Result<Topology, BuildError> {
    build(&FabricConfig::new(k, n, oversubscription, fully_connected_roots))
}

/// Build the topology described by `config`.
///
/// The configuration is validated first, so nothing is allocated for a
/// fabric that exceeds the switch port ceiling.
pub fn build(config: &FabricConfig) -> Result<Topology, BuildError> {
    let dims = config.validate()?;
    let k = config.k as usize;
    let n = config.n as usize;
    let oversubscription = config.oversubscription as usize;

    info!(
        "Building a {}-ary-{}-tree (oversubscription {}, fully connected roots: {})",
        k, n, oversubscription, config.fully_connected_roots
    );
    debug!("Fabric dimensions: {:?}", dims);

    let mut topology = initialize_nodes(&dims);
    wire_switches(&mut topology, k, n, &dims)?;
    wire_hosts(&mut topology, k, n, oversubscription, &dims)?;

    let removed = topology.prune_disconnected();
    if !removed.is_empty() {
        info!("Removed {} disconnected nodes", removed.len());
    }

    topology.verify()?;
    debug!("Topology verified: {} links", topology.link_count());

    Ok(topology)
}

/// Allocate every switch, then every host adapter, with their GUIDs
fn initialize_nodes(dims: &FabricDimensions) -> Topology {
    let mut topology = Topology::new();

    for sw_no in 0..dims.total_switches {
        topology.insert(Node::new_switch(
            sw_no,
            Guid(SWITCH_GUID_BASE + sw_no as u64),
            dims.ports_per_switch,
        ));
    }

    for hca_no in 0..dims.total_hosts {
        topology.insert(Node::new_host_adapter(
            hca_no,
            Guid(HCA_GUID_BASE + hca_no as u64),
            Guid(PORT_GUID_BASE + hca_no as u64),
        ));
    }

    topology
}

fn wire_switches(
    topology: &mut Topology,
    k: usize,
    n: usize,
    dims: &FabricDimensions,
) -> Result<(), BuildError> {
    for sw_no in 0..dims.total_switches {
        let Some(plan) = uplink_plan(sw_no, k, n, dims.switches_per_row) else {
            continue;
        };

        for port in 1..=k {
            let remote_sw_no = remote_switch_index(sw_no, port, &plan, k, dims.switches_per_row)
                .filter(|&index| index < dims.total_switches)
                .ok_or(BuildError::UplinkOutOfRange { switch: sw_no, port })?;

            let remote = NodeId::Switch(remote_sw_no);
            let remote_port = topology.first_free_port(remote, plan.remote_port_offset + 1)?;

            debug!(
                "Switch{}[{}] <-> {}[{}]",
                sw_no, port, remote, remote_port
            );
            topology.connect(NodeId::Switch(sw_no), port, remote, remote_port)?;
        }
    }

    Ok(())
}

fn wire_hosts(
    topology: &mut Topology,
    k: usize,
    n: usize,
    oversubscription: usize,
    dims: &FabricDimensions,
) -> Result<(), BuildError> {
    for hca_no in 0..dims.total_hosts {
        let (sw_no, port) = host_attachment(hca_no, k, n, oversubscription, dims.switches_per_row);

        debug!("Hca{}[1] <-> Switch{}[{}]", hca_no, sw_no, port);
        topology.connect(NodeId::Hca(hca_no), 1, NodeId::Switch(sw_no), port)?;
    }

    Ok(())
}
