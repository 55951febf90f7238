// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per NUMA node hugepage memory budget (`dpdk-socket-mem`).

use std::num::NonZero;

use hardware::numa::NumaNode;
use tracing::error;

use crate::PlacementError;
use crate::numa::NumaBuckets;

/// Megabytes of hugepage memory to reserve on each NUMA node, indexed by node id.
///
/// Displays as the comma separated list DPDK expects, e.g. `2048,1024`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketMem(Vec<u32>);

impl SocketMem {
    /// The budget (in MB) of each node, in node order.
    #[must_use]
    pub fn per_node(&self) -> &[u32] {
        &self.0
    }
}

impl std::fmt::Display for SocketMem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{joined}")
    }
}

/// Compute the hugepage budget of every NUMA node on the host.
///
/// Nodes hosting at least one device get `device_node_mb`, all others `idle_node_mb`.
///
/// # Errors
///
/// [`PlacementError::NodeOutOfRange`] if a device sits on a node beyond `numa_nodes`.
pub fn socket_mem(
    buckets: &NumaBuckets,
    numa_nodes: NonZero<usize>,
    device_node_mb: u32,
    idle_node_mb: u32,
) -> Result<SocketMem, PlacementError> {
    if let Some(node) = buckets
        .nodes()
        .find(|node| usize::try_from(node.value()).map_or(true, |n| n >= numa_nodes.get()))
    {
        let err = PlacementError::NodeOutOfRange {
            node,
            numa_nodes: numa_nodes.get(),
        };
        error!("{err}");
        return Err(err);
    }
    Ok(SocketMem(
        (0..numa_nodes.get())
            .map(|index| {
                let hosts_device =
                    u32::try_from(index).is_ok_and(|id| buckets.contains(NumaNode::new(id)));
                if hosts_device {
                    device_node_mb
                } else {
                    idle_node_mb
                }
            })
            .collect(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::numa::group_by_numa;
    use hardware::cpu::CpuList;

    fn nodes(n: usize) -> NonZero<usize> {
        NonZero::new(n).unwrap()
    }

    #[test]
    fn device_nodes_get_the_larger_budget() {
        let list: CpuList = "1-7".parse().unwrap();
        let buckets = group_by_numa([(NumaNode::new(0), &list)]);
        let mem = socket_mem(&buckets, nodes(2), 2048, 1024).unwrap();
        assert_eq!(mem.to_string(), "2048,1024");

        let buckets = group_by_numa([(NumaNode::new(1), &list)]);
        let mem = socket_mem(&buckets, nodes(4), 2048, 1024).unwrap();
        assert_eq!(mem.per_node(), &[1024, 2048, 1024, 1024]);
    }

    #[test]
    fn device_beyond_the_node_count_is_an_error() {
        let list: CpuList = "1-7".parse().unwrap();
        let buckets = group_by_numa([(NumaNode::new(2), &list)]);
        assert_eq!(
            socket_mem(&buckets, nodes(2), 2048, 1024),
            Err(PlacementError::NodeOutOfRange {
                node: NumaNode::new(2),
                numa_nodes: 2
            })
        );
    }

    #[test]
    fn budget_covers_every_node_with_known_values_only() {
        bolero::check!()
            .with_type::<(Vec<u8>, u8)>()
            .for_each(|(device_nodes, extra): &(Vec<u8>, u8)| {
                let list: CpuList = "1".parse().unwrap();
                let max = device_nodes.iter().copied().max().map_or(0, usize::from);
                let count = nodes(max + 1 + usize::from(*extra % 4));
                let buckets = group_by_numa(
                    device_nodes
                        .iter()
                        .map(|&node| (NumaNode::new(u32::from(node)), &list)),
                );
                let mem = socket_mem(&buckets, count, 2048, 1024).unwrap();
                assert_eq!(mem.per_node().len(), count.get());
                assert!(mem.per_node().iter().all(|mb| *mb == 2048 || *mb == 1024));
                for &node in device_nodes {
                    assert_eq!(mem.per_node()[usize::from(node)], 2048);
                }
            });
    }
}
