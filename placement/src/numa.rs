// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Grouping of devices by NUMA node.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use hardware::cpu::CpuList;
use hardware::numa::NumaNode;
use tracing::debug;

/// The devices placed on one NUMA node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumaBucket {
    /// Number of devices attached to the node.
    pub nics: usize,
    /// The (zero core stripped) cpu list of the first device seen on this node.
    ///
    /// The lists of later devices on the same node are not merged in: devices on one node are
    /// expected to share the same local cores.
    pub cpu_list: CpuList,
}

/// Devices grouped by NUMA node, iterated in ascending node order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumaBuckets(BTreeMap<NumaNode, NumaBucket>);

impl NumaBuckets {
    /// The bucket of `node`, if any device is attached to it.
    #[must_use]
    pub fn get(&self, node: NumaNode) -> Option<&NumaBucket> {
        self.0.get(&node)
    }

    /// Returns true if any device is attached to `node`.
    #[must_use]
    pub fn contains(&self, node: NumaNode) -> bool {
        self.0.contains_key(&node)
    }

    /// Number of NUMA nodes with at least one device.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no device was grouped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the buckets in ascending node order.
    pub fn iter(&self) -> impl Iterator<Item = (NumaNode, &NumaBucket)> {
        self.0.iter().map(|(node, bucket)| (*node, bucket))
    }

    /// The NUMA nodes with at least one device, ascending.
    pub fn nodes(&self) -> impl Iterator<Item = NumaNode> + '_ {
        self.0.keys().copied()
    }
}

/// Fold `(numa node, cpu list)` pairs of devices into per node buckets.
///
/// The cpu lists are expected to have core 0 stripped already.
/// The first device seen on a node decides the bucket's cpu list, so callers must supply devices
/// in a stable order.
#[must_use]
pub fn group_by_numa<'a>(devices: impl IntoIterator<Item = (NumaNode, &'a CpuList)>) -> NumaBuckets {
    let mut buckets = BTreeMap::new();
    for (node, cpu_list) in devices {
        match buckets.entry(node) {
            Entry::Vacant(entry) => {
                debug!("NUMA node {node}: first device, local cpus {cpu_list}");
                entry.insert(NumaBucket {
                    nics: 1,
                    cpu_list: cpu_list.clone(),
                });
            }
            Entry::Occupied(mut entry) => {
                let bucket: &mut NumaBucket = entry.get_mut();
                bucket.nics += 1;
                if bucket.cpu_list != *cpu_list {
                    debug!(
                        "NUMA node {node}: ignoring local cpus {cpu_list} of additional device (node uses {})",
                        bucket.cpu_list
                    );
                }
            }
        }
    }
    NumaBuckets(buckets)
}
