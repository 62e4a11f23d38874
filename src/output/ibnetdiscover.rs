//! ibnetdiscover topology file writer.
//!
//! Each node becomes a block like this one:
//!
//! ```text
//! vendid=0x0
//! devid=0x0
//! sysimgguid=0x3000000
//! switchguid=0x3000000(3000000)
//! Switch	4 "S-0000000003000000"		# "Switch0"
//! [1]	"S-0000000003000002"[3]		# "Switch2" lid 0 4xEDR
//! [3]	"H-0000000001000000"[1](2000000) 		# "Hca0" lid 0 4xEDR
//! ```
//!
//! followed by a blank line. Only connected ports get a line.

use chrono::NaiveDateTime;
use std::io::Write;

use super::OutputError;
use crate::config::FabricConfig;
use crate::topology::{Link, Node, NodeKind, PortNumber, Topology};

/// Write the header comment block and every node block
pub fn write_topology<W: Write>(
    out: &mut W,
    topology: &Topology,
    config: &FabricConfig,
    generated_at: Option<NaiveDateTime>,
) -> Result<(), OutputError> {
    write_header(out, topology, config, generated_at)?;
    for node in topology.nodes() {
        write_node(out, topology, node, &config.link_speed)?;
    }
    Ok(())
}

/// Comment block describing the fabric.
///
/// The generation time is left out when `generated_at` is `None`, so two
/// runs with the same parameters produce identical files.
pub fn write_header<W: Write>(
    out: &mut W,
    topology: &Topology,
    config: &FabricConfig,
    generated_at: Option<NaiveDateTime>,
) -> Result<(), OutputError> {
    let generated_on = generated_at
        .map(|time| format!(" on {}", time.format("%a %b %e %H:%M:%S %Y")))
        .unwrap_or_default();
    let fully_populated = if config.fully_connected_roots {
        ", Fully populated"
    } else {
        ""
    };

    writeln!(out, "#")?;
    writeln!(
        out,
        "# Topology file: generated with {} v{}{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        generated_on
    )?;
    writeln!(out, "#")?;
    writeln!(out, "# Topology description")?;
    writeln!(out, "# -------------------------------")?;
    writeln!(
        out,
        "# k = {}, n = {}, oversubscription = {}{}",
        config.k, config.n, config.oversubscription, fully_populated
    )?;
    writeln!(out, "# Total number of nodes: {}", topology.len())?;
    writeln!(out, "# Total number of Switches: {}", topology.switch_count())?;
    writeln!(out, "# Total number of HCAs: {}", topology.host_count())?;
    writeln!(out, "#")?;
    writeln!(out)?;
    Ok(())
}

/// Write the block of a single node, closed by a blank line
pub fn write_node<W: Write>(
    out: &mut W,
    topology: &Topology,
    node: &Node,
    link_speed: &str,
) -> Result<(), OutputError> {
    writeln!(out, "vendid=0x0")?;
    writeln!(out, "devid=0x0")?;
    writeln!(out, "sysimgguid={}", node.guid.prefixed_hex())?;
    match node.kind() {
        NodeKind::Switch => writeln!(
            out,
            "switchguid={}({})",
            node.guid.prefixed_hex(),
            node.guid.hex()
        )?,
        NodeKind::HostAdapter => writeln!(out, "caguid={}", node.guid.prefixed_hex())?,
    }
    writeln!(out, "{}", node_line(node))?;

    for (port, link) in node.links() {
        let remote = topology
            .get(link.peer)
            .ok_or(OutputError::DanglingLink {
                node: node.id,
                port,
                peer: link.peer,
            })?;
        writeln!(out, "{}", port_line(node, port, link, remote, link_speed)?)?;
    }

    writeln!(out)?;
    Ok(())
}

/// `Switch\t4 "S-0000000003000000"\t\t# "Switch0"`
pub fn node_line(node: &Node) -> String {
    format!(
        "{}\t{} \"{}-{}\"\t\t# \"{}\"",
        node.kind().long_name(),
        node.total_ports(),
        node.kind().short_name(),
        node.guid.padded_hex(),
        node.id
    )
}

/// Line for local port `port`, cabled to `remote` as described by `link`.
///
/// The shape depends on both ends: a host adapter port carries its port
/// GUID after the bracketed port number, and a host adapter's own lines
/// carry an extra `lid 0 lmc 0` before the remote name.
pub fn port_line(
    local: &Node,
    port: PortNumber,
    link: &Link,
    remote: &Node,
    link_speed: &str,
) -> Result<String, OutputError> {
    let remote_guid = format!("{}-{}", remote.kind().short_name(), remote.guid.padded_hex());

    let line = match (local.kind(), remote.kind()) {
        (NodeKind::Switch, NodeKind::Switch) => format!(
            "[{}]\t\"{}\"[{}]\t\t# \"{}\" lid 0 {}",
            port, remote_guid, link.peer_port, remote.id, link_speed
        ),
        (NodeKind::Switch, NodeKind::HostAdapter) => format!(
            "[{}]\t\"{}\"[{}]({}) \t\t# \"{}\" lid 0 {}",
            port,
            remote_guid,
            link.peer_port,
            port_guid_hex(remote)?,
            remote.id,
            link_speed
        ),
        (NodeKind::HostAdapter, NodeKind::Switch) => format!(
            "[{}]({}) \t\"{}\"[{}]\t\t# lid 0 lmc 0 \"{}\" lid 0 {}",
            port,
            port_guid_hex(local)?,
            remote_guid,
            link.peer_port,
            remote.id,
            link_speed
        ),
        (NodeKind::HostAdapter, NodeKind::HostAdapter) => format!(
            "[{}]({}) \t\"{}\"[{}]({}) \t\t# lid 0 lmc 0 \"{}\" lid 0 {}",
            port,
            port_guid_hex(local)?,
            remote_guid,
            link.peer_port,
            port_guid_hex(remote)?,
            remote.id,
            link_speed
        ),
    };

    Ok(line)
}

fn port_guid_hex(node: &Node) -> Result<String, OutputError> {
    node.port_guid
        .map(|guid| guid.hex())
        .ok_or(OutputError::MissingPortGuid(node.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{build_fat_tree, Guid, NodeId};

    fn render(topology: &Topology, config: &FabricConfig) -> String {
        let mut buffer = Vec::new();
        write_topology(&mut buffer, topology, config, None).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn switch() -> Node {
        Node::new_switch(2, Guid(0x3000002), 4)
    }

    fn hca() -> Node {
        Node::new_host_adapter(5, Guid(0x1000005), Guid(0x2000005))
    }

    #[test]
    fn test_node_lines() {
        assert_eq!(
            node_line(&switch()),
            "Switch\t4 \"S-0000000003000002\"\t\t# \"Switch2\""
        );
        assert_eq!(
            node_line(&hca()),
            "Ca\t1 \"H-0000000001000005\"\t\t# \"Hca5\""
        );
    }

    #[test]
    fn test_port_line_shapes() {
        let other_switch = Node::new_switch(0, Guid(0x3000000), 4);
        let other_hca = Node::new_host_adapter(1, Guid(0x1000001), Guid(0x2000001));

        let line = port_line(
            &other_switch,
            1,
            &Link { peer: NodeId::Switch(2), peer_port: 3 },
            &switch(),
            "4xEDR",
        )
        .unwrap();
        assert_eq!(line, "[1]\t\"S-0000000003000002\"[3]\t\t# \"Switch2\" lid 0 4xEDR");

        let line = port_line(
            &switch(),
            4,
            &Link { peer: NodeId::Hca(5), peer_port: 1 },
            &hca(),
            "4xEDR",
        )
        .unwrap();
        assert_eq!(
            line,
            "[4]\t\"H-0000000001000005\"[1](2000005) \t\t# \"Hca5\" lid 0 4xEDR"
        );

        let line = port_line(
            &hca(),
            1,
            &Link { peer: NodeId::Switch(2), peer_port: 4 },
            &switch(),
            "4xQDR",
        )
        .unwrap();
        assert_eq!(
            line,
            "[1](2000005) \t\"S-0000000003000002\"[4]\t\t# lid 0 lmc 0 \"Switch2\" lid 0 4xQDR"
        );

        let line = port_line(
            &hca(),
            1,
            &Link { peer: NodeId::Hca(1), peer_port: 1 },
            &other_hca,
            "4xEDR",
        )
        .unwrap();
        assert_eq!(
            line,
            "[1](2000005) \t\"H-0000000001000001\"[1](2000001) \t\t# lid 0 lmc 0 \"Hca1\" lid 0 4xEDR"
        );
    }

    #[test]
    fn test_header_with_and_without_timestamp() {
        let topology = build_fat_tree(2, 2, 1, true).unwrap();
        let config = FabricConfig::new(2, 2, 1, true);

        let mut buffer = Vec::new();
        write_header(&mut buffer, &topology, &config, None).unwrap();
        let header = String::from_utf8(buffer).unwrap();
        let expected = format!(
            "#\n\
             # Topology file: generated with fattree-builder v{}\n\
             #\n\
             # Topology description\n\
             # -------------------------------\n\
             # k = 2, n = 2, oversubscription = 1, Fully populated\n\
             # Total number of nodes: 14\n\
             # Total number of Switches: 6\n\
             # Total number of HCAs: 8\n\
             #\n\
             \n",
            env!("CARGO_PKG_VERSION")
        );
        assert_eq!(header, expected);

        let time = NaiveDateTime::parse_from_str("2016-03-07 09:05:01", "%Y-%m-%d %H:%M:%S").unwrap();
        let mut buffer = Vec::new();
        write_header(&mut buffer, &topology, &config, Some(time)).unwrap();
        let header = String::from_utf8(buffer).unwrap();
        assert!(header.contains(" on Mon Mar  7 09:05:01 2016\n"));
    }

    #[test]
    fn test_switch_and_hca_blocks() {
        let topology = build_fat_tree(2, 2, 1, false).unwrap();
        let config = FabricConfig::new(2, 2, 1, false);
        let output = render(&topology, &config);

        let leaf_block = "vendid=0x0\n\
                          devid=0x0\n\
                          sysimgguid=0x3000000\n\
                          switchguid=0x3000000(3000000)\n\
                          Switch\t4 \"S-0000000003000000\"\t\t# \"Switch0\"\n\
                          [1]\t\"S-0000000003000002\"[3]\t\t# \"Switch2\" lid 0 4xEDR\n\
                          [2]\t\"S-0000000003000003\"[3]\t\t# \"Switch3\" lid 0 4xEDR\n\
                          [3]\t\"H-0000000001000000\"[1](2000000) \t\t# \"Hca0\" lid 0 4xEDR\n\
                          [4]\t\"H-0000000001000001\"[1](2000001) \t\t# \"Hca1\" lid 0 4xEDR\n\
                          \n";
        assert!(output.contains(leaf_block), "missing leaf block in:\n{}", output);

        // Root ports 1 and 2 are unconnected and get no line
        let root_block = "switchguid=0x3000002(3000002)\n\
                          Switch\t4 \"S-0000000003000002\"\t\t# \"Switch2\"\n\
                          [3]\t\"S-0000000003000000\"[1]\t\t# \"Switch0\" lid 0 4xEDR\n\
                          [4]\t\"S-0000000003000001\"[1]\t\t# \"Switch1\" lid 0 4xEDR\n\
                          \n";
        assert!(output.contains(root_block), "missing root block in:\n{}", output);

        let hca_block = "vendid=0x0\n\
                         devid=0x0\n\
                         sysimgguid=0x1000003\n\
                         caguid=0x1000003\n\
                         Ca\t1 \"H-0000000001000003\"\t\t# \"Hca3\"\n\
                         [1](2000003) \t\"S-0000000003000001\"[4]\t\t# lid 0 lmc 0 \"Switch1\" lid 0 4xEDR\n\
                         \n";
        assert!(output.ends_with(hca_block), "missing final block in:\n{}", output);

        assert_eq!(output.matches("vendid=0x0").count(), 8);
    }

    #[test]
    fn test_blocks_follow_node_order() {
        let topology = build_fat_tree(2, 3, 1, false).unwrap();
        let output = render(&topology, &FabricConfig::new(2, 3, 1, false));

        let names: Vec<&str> = output
            .lines()
            .filter(|line| line.starts_with("Switch\t") || line.starts_with("Ca\t"))
            .map(|line| line.rsplit('"').nth(1).unwrap())
            .collect();
        let expected: Vec<String> = topology.nodes().map(|node| node.id.to_string()).collect();
        assert_eq!(names, expected);
        assert_eq!(names.first(), Some(&"Switch0"));
        assert_eq!(names.last(), Some(&"Hca7"));
    }
}
