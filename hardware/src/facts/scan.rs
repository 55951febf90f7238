// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Device facts read from the running kernel.

use std::io::ErrorKind;
use std::num::NonZero;

use sysfs::{SysfsErr, SysfsPath, sysfs_root};
use tracing::{debug, warn};

use crate::cpu::CpuList;
use crate::facts::{DeviceFactProvider, FactError};
use crate::numa::NumaNode;
use crate::pci::address::PciAddress;

/// Reads device facts out of sysfs.
///
/// - `bus/pci/devices/<address>/numa_node`
/// - `bus/pci/devices/<address>/local_cpulist`
/// - the `devices/system/node/node<N>` directories
#[derive(Debug, Clone)]
pub struct SysfsFacts {
    root: &'static SysfsPath,
}

impl SysfsFacts {
    /// Locate sysfs and prepare to read facts from it.
    ///
    /// # Errors
    ///
    /// [`FactError::Sysfs`] if sysfs can not be located.
    pub fn new() -> Result<Self, FactError> {
        Ok(Self {
            root: sysfs_root()?,
        })
    }

    fn device_attribute(&self, device: &PciAddress, attribute: &str) -> Result<String, FactError> {
        let path = self
            .root
            .relative(format!("bus/pci/devices/{device}/{attribute}"))
            .map_err(|e| match e {
                SysfsErr::IoError(io) if io.kind() == ErrorKind::NotFound => {
                    FactError::UnknownDevice(*device)
                }
                e => FactError::Sysfs(e),
            })?;
        Ok(path.read_attribute()?)
    }
}

/// Count `node<N>` entries in a listing of `devices/system/node`.
fn count_numa_nodes<'a>(entries: impl IntoIterator<Item = &'a str>) -> usize {
    entries
        .into_iter()
        .filter(|name| {
            name.strip_prefix("node")
                .is_some_and(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        })
        .count()
}

impl DeviceFactProvider for SysfsFacts {
    fn numa_node(&self, device: &PciAddress) -> Result<NumaNode, FactError> {
        let raw = self.device_attribute(device, "numa_node")?;
        NumaNode::from_sysfs_value(&raw).map_err(|source| FactError::NumaNode {
            device: *device,
            source,
        })
    }

    fn local_cpu_list(&self, device: &PciAddress) -> Result<CpuList, FactError> {
        let raw = self.device_attribute(device, "local_cpulist")?;
        raw.parse().map_err(|source| FactError::CpuList {
            device: *device,
            source,
        })
    }

    fn numa_node_count(&self) -> Result<NonZero<usize>, FactError> {
        let nodes = match self.root.relative("devices/system/node") {
            Ok(nodes) => nodes,
            Err(SysfsErr::IoError(e)) if e.kind() == ErrorKind::NotFound => {
                warn!("kernel exposes no NUMA topology: assuming a single NUMA node");
                return Ok(NonZero::<usize>::MIN);
            }
            Err(e) => return Err(e.into()),
        };
        let names = nodes.entry_names()?;
        let count = count_numa_nodes(names.iter().map(String::as_str));
        debug!("found {count} NUMA nodes under {nodes}");
        NonZero::new(count).ok_or(FactError::NoNumaNodes)
    }
}

#[cfg(test)]
mod test {
    use super::count_numa_nodes;

    #[test]
    fn only_node_directories_are_counted() {
        let listing = [
            "node0",
            "node1",
            "has_cpu",
            "has_memory",
            "online",
            "possible",
            "power",
            "uevent",
            "node",
            "nodex",
        ];
        assert_eq!(count_numa_nodes(listing), 2);
        assert_eq!(count_numa_nodes(std::iter::empty()), 0);
    }
}
