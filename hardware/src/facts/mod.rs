// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Facts about network devices which decide their placement.
//!
//! Placement only needs three facts from the host:
//!
//! 1. the NUMA node of each device,
//! 2. the cores local to each device (its `local_cpulist`),
//! 3. how many NUMA nodes the host has.
//!
//! [`DeviceFactProvider`] is the seam between gathering those facts and computing with them.
//! [`SysfsFacts`] reads them from the running kernel, [`StaticFacts`] serves them from memory
//! (e.g. a YAML snapshot taken on another host).

use std::collections::BTreeMap;
use std::num::NonZero;

use sysfs::SysfsErr;
use tracing::debug;

use crate::cpu::{CpuList, CpuListError};
use crate::numa::{NumaNode, NumaNodeParseError};
use crate::pci::address::PciAddress;

mod scan;

pub use self::scan::SysfsFacts;

/// Errors which may occur while collecting device facts.
#[derive(Debug, thiserror::Error)]
pub enum FactError {
    /// No facts are known for the device.
    #[error("no facts known for device {0}")]
    UnknownDevice(PciAddress),
    /// The device reported a cpu list which does not parse.
    #[error("device {device} reported an invalid local cpu list: {source}")]
    CpuList {
        /// The device in question.
        device: PciAddress,
        /// Why the cpu list was rejected.
        source: CpuListError,
    },
    /// The device reported a NUMA node which does not parse.
    #[error("device {device} reported an invalid NUMA node: {source}")]
    NumaNode {
        /// The device in question.
        device: PciAddress,
        /// Why the NUMA node was rejected.
        source: NumaNodeParseError,
    },
    /// The host reports no NUMA nodes at all.
    #[error("host reports no NUMA nodes")]
    NoNumaNodes,
    /// Reading sysfs failed.
    #[error(transparent)]
    Sysfs(#[from] SysfsErr),
}

/// Everything placement needs to know about one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFacts {
    /// The device.
    pub address: PciAddress,
    /// The NUMA node the device is attached to (unknown already normalized to node 0).
    pub numa_node: NumaNode,
    /// The cores local to the device, exactly as reported (core 0 included).
    pub cpu_list: CpuList,
}

/// Source of per-device and per-host facts.
pub trait DeviceFactProvider {
    /// The NUMA node of `device`.
    ///
    /// # Errors
    ///
    /// [`FactError`] if the fact is missing or malformed.
    fn numa_node(&self, device: &PciAddress) -> Result<NumaNode, FactError>;

    /// The cores local to `device`.
    ///
    /// # Errors
    ///
    /// [`FactError`] if the fact is missing or malformed.
    fn local_cpu_list(&self, device: &PciAddress) -> Result<CpuList, FactError>;

    /// The number of NUMA nodes on the host.
    ///
    /// # Errors
    ///
    /// [`FactError`] if the node count can not be determined.
    fn numa_node_count(&self) -> Result<NonZero<usize>, FactError>;

    /// Collect all facts about `device`.
    ///
    /// # Errors
    ///
    /// [`FactError`] if any fact is missing or malformed.
    fn facts(&self, device: &PciAddress) -> Result<DeviceFacts, FactError> {
        let facts = DeviceFacts {
            address: *device,
            numa_node: self.numa_node(device)?,
            cpu_list: self.local_cpu_list(device)?,
        };
        debug!(
            "device {device}: numa node {}, local cpus {}",
            facts.numa_node, facts.cpu_list
        );
        Ok(facts)
    }
}

/// Raw facts about one device, as they would be read from sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct StaticDevice {
    /// Raw NUMA node (`-1` for unknown).
    pub numa_node: i64,
    /// Raw `local_cpulist`.
    pub local_cpulist: String,
}

/// An in-memory snapshot of host facts.
///
/// # Examples
///
/// ```
/// # use dpdk_setup_hardware::facts::{DeviceFactProvider, StaticFacts};
/// # use dpdk_setup_hardware::pci::address::PciAddress;
/// #
/// let nic = PciAddress::try_from("0000:03:00.0").unwrap();
/// let facts = StaticFacts::new(2).with_device(nic, -1, "0-7");
/// assert_eq!(facts.numa_node(&nic).unwrap().value(), 0);
/// assert_eq!(facts.numa_node_count().unwrap().get(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct StaticFacts {
    numa_nodes: usize,
    #[cfg_attr(any(test, feature = "serde"), serde(default))]
    devices: BTreeMap<PciAddress, StaticDevice>,
}

impl StaticFacts {
    /// Creates a snapshot of a host with `numa_nodes` NUMA nodes and no devices.
    #[must_use]
    pub fn new(numa_nodes: usize) -> Self {
        Self {
            numa_nodes,
            devices: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) the raw facts of a device.
    #[must_use]
    pub fn with_device(
        mut self,
        device: PciAddress,
        numa_node: i64,
        local_cpulist: impl Into<String>,
    ) -> Self {
        self.devices.insert(
            device,
            StaticDevice {
                numa_node,
                local_cpulist: local_cpulist.into(),
            },
        );
        self
    }

    fn device(&self, device: &PciAddress) -> Result<&StaticDevice, FactError> {
        self.devices
            .get(device)
            .ok_or(FactError::UnknownDevice(*device))
    }
}

impl DeviceFactProvider for StaticFacts {
    fn numa_node(&self, device: &PciAddress) -> Result<NumaNode, FactError> {
        NumaNode::from_raw(self.device(device)?.numa_node).map_err(|source| FactError::NumaNode {
            device: *device,
            source,
        })
    }

    fn local_cpu_list(&self, device: &PciAddress) -> Result<CpuList, FactError> {
        self.device(device)?
            .local_cpulist
            .parse()
            .map_err(|source| FactError::CpuList {
                device: *device,
                source,
            })
    }

    fn numa_node_count(&self) -> Result<NonZero<usize>, FactError> {
        NonZero::new(self.numa_nodes).ok_or(FactError::NoNumaNodes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cpu::CoreId;
    use pretty_assertions::assert_eq;

    fn nic(addr: &str) -> PciAddress {
        PciAddress::try_from(addr).unwrap()
    }

    #[test]
    fn facts_are_collected_per_device() {
        let facts = StaticFacts::new(2)
            .with_device(nic("0000:03:00.0"), 1, "8-15\n")
            .with_device(nic("0000:03:00.1"), -1, "0-7");
        let first = facts.facts(&nic("0000:03:00.0")).unwrap();
        assert_eq!(first.numa_node, NumaNode::new(1));
        assert_eq!(first.cpu_list.as_str(), "8-15");
        let second = facts.facts(&nic("0000:03:00.1")).unwrap();
        assert_eq!(second.numa_node, NumaNode::new(0));
        assert_eq!(second.cpu_list.cores().first(), Some(&CoreId::new(0)));
    }

    #[test]
    fn missing_device_is_an_error() {
        let facts = StaticFacts::new(1);
        assert!(matches!(
            facts.facts(&nic("0000:00:04.0")),
            Err(FactError::UnknownDevice(device)) if device == nic("0000:00:04.0")
        ));
    }

    #[test]
    fn malformed_facts_are_errors() {
        let facts = StaticFacts::new(1)
            .with_device(nic("0000:00:04.0"), 0, "")
            .with_device(nic("0000:00:05.0"), i64::MAX, "1-3")
            .with_device(nic("0000:00:06.0"), 0, "0 ,2,3");
        assert!(matches!(
            facts.local_cpu_list(&nic("0000:00:04.0")),
            Err(FactError::CpuList {
                source: CpuListError::Empty,
                ..
            })
        ));
        assert!(matches!(
            facts.numa_node(&nic("0000:00:05.0")),
            Err(FactError::NumaNode { .. })
        ));
        assert!(matches!(
            facts.local_cpu_list(&nic("0000:00:06.0")),
            Err(FactError::CpuList {
                source: CpuListError::InvalidItem { .. },
                ..
            })
        ));
    }

    #[test]
    fn zero_numa_nodes_is_an_error() {
        assert!(matches!(
            StaticFacts::new(0).numa_node_count(),
            Err(FactError::NoNumaNodes)
        ));
    }

    #[test]
    fn snapshot_loads_from_yaml() {
        let yaml = r#"
numa_nodes: 2
devices:
  "0000:03:00.0":
    numa_node: 0
    local_cpulist: "0-7"
  "0000:81:00.0":
    numa_node: 1
    local_cpulist: "8,10,12"
"#;
        let facts: StaticFacts = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(
            facts,
            StaticFacts::new(2)
                .with_device(nic("0000:03:00.0"), 0, "0-7")
                .with_device(nic("0000:81:00.0"), 1, "8,10,12")
        );
    }
}
