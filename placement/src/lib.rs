// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NUMA aware placement of a userspace (DPDK) dataplane.
//!
//! Given the facts of the devices the dataplane drives, [`compute_placement`] decides
//!
//! - which cores run poll mode driver (PMD) threads, and their mask (`pmd-cpu-mask`),
//! - which cores run the remaining DPDK threads (`dpdk-lcore-mask`),
//! - how much hugepage memory each NUMA node reserves (`dpdk-socket-mem`),
//! - which cores are isolated from the kernel scheduler.
//!
//! Core 0 is always left to the host.
//! The computation is pure: facts are gathered beforehand (see [`hardware::facts`]).

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod lcore;
pub mod numa;
pub mod pmd;
pub mod socket_mem;

use std::num::NonZero;

use derive_builder::Builder;
use hardware::cpu::{CoreId, CoreMask, CpuList, CpuListError};
use hardware::facts::DeviceFacts;
use hardware::numa::NumaNode;
use hardware::pci::address::PciAddress;
use tracing::{debug, error, info};

use crate::lcore::select_lcores;
use crate::numa::group_by_numa;
use crate::pmd::allocate_pmd_cores;
use crate::socket_mem::{SocketMem, socket_mem};

/// PMD threads per device unless configured otherwise.
pub const DEFAULT_PMD_THREADS_PER_DEVICE: usize = 1;
/// Upper bound on the number of lcores unless configured otherwise.
pub const DEFAULT_MAX_LCORES: usize = 2;
/// Hugepage memory (MB) of a NUMA node hosting devices unless configured otherwise.
pub const DEFAULT_DEVICE_SOCKET_MEM_MB: u32 = 2048;
/// Hugepage memory (MB) of a NUMA node hosting no devices unless configured otherwise.
pub const DEFAULT_IDLE_SOCKET_MEM_MB: u32 = 1024;

/// Errors which may occur while computing a placement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// There is nothing to place.
    #[error("no devices to place")]
    NoDevices,
    /// A NUMA node does not have enough cores for its PMD threads.
    #[error(
        "insufficient CPU cores for requested PMD thread count on NUMA node {node}: {requested} requested, {available} available"
    )]
    InsufficientCores {
        /// The node which ran out of cores.
        node: NumaNode,
        /// Number of PMD cores the node needs.
        requested: usize,
        /// Number of cores the node offers.
        available: usize,
    },
    /// A device sits on a NUMA node the host does not have.
    #[error("device on NUMA node {node}, but the host has only {numa_nodes} NUMA node(s)")]
    NodeOutOfRange {
        /// The offending node.
        node: NumaNode,
        /// Number of NUMA nodes on the host.
        numa_nodes: usize,
    },
    /// A device's cpu list is unusable once core 0 is removed.
    #[error("device {device}: invalid cpu list after removing core 0: {source}")]
    CpuList {
        /// The device in question.
        device: PciAddress,
        /// Why the cpu list was rejected.
        source: CpuListError,
    },
}

/// Tunables of [`compute_placement`].
///
/// ```
/// # use dpdk_setup_placement::PlacementConfigBuilder;
/// let config = PlacementConfigBuilder::default()
///     .pmd_threads_per_device(2usize)
///     .build()
///     .unwrap();
/// assert_eq!(config.pmd_threads_per_device, 2);
/// assert_eq!(config.max_lcores, 2);
/// ```
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct PlacementConfig {
    /// Number of PMD threads (and cores) per device.
    #[builder(setter(into), default = DEFAULT_PMD_THREADS_PER_DEVICE)]
    pub pmd_threads_per_device: usize,
    /// Upper bound on the number of lcores.
    #[builder(setter(into), default = DEFAULT_MAX_LCORES)]
    pub max_lcores: usize,
    /// Hugepage memory (MB) of every NUMA node hosting a device.
    #[builder(setter(into), default = DEFAULT_DEVICE_SOCKET_MEM_MB)]
    pub device_socket_mem_mb: u32,
    /// Hugepage memory (MB) of every other NUMA node.
    #[builder(setter(into), default = DEFAULT_IDLE_SOCKET_MEM_MB)]
    pub idle_socket_mem_mb: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            pmd_threads_per_device: DEFAULT_PMD_THREADS_PER_DEVICE,
            max_lcores: DEFAULT_MAX_LCORES,
            device_socket_mem_mb: DEFAULT_DEVICE_SOCKET_MEM_MB,
            idle_socket_mem_mb: DEFAULT_IDLE_SOCKET_MEM_MB,
        }
    }
}

/// The outcome of [`compute_placement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Distinct (core 0 stripped) cpu lists of all devices, in order of first appearance.
    pub isolated_cpu_list: CpuList,
    /// PMD cores, node by node.
    pub pmd_cores: Vec<CoreId>,
    /// Mask of [`Placement::pmd_cores`].
    pub pmd_cpu_mask: CoreMask,
    /// Cores for the non PMD DPDK threads, ascending.
    pub lcores: Vec<CoreId>,
    /// Mask of [`Placement::lcores`].
    pub dpdk_lcore_mask: CoreMask,
    /// Hugepage memory of every NUMA node of the host.
    pub socket_mem: SocketMem,
}

/// Compute the placement of a dataplane driving `devices` on a host with `numa_nodes` NUMA nodes.
///
/// Devices are considered in the given order.
/// When several devices share a NUMA node, the cpu list of the first one is used for the node.
///
/// # Errors
///
/// - [`PlacementError::NoDevices`] if `devices` is empty.
/// - [`PlacementError::CpuList`] if a device's cpu list breaks once core 0 is removed.
/// - [`PlacementError::NodeOutOfRange`] if a device sits beyond `numa_nodes`.
/// - [`PlacementError::InsufficientCores`] if a node can not host its PMD threads.
pub fn compute_placement(
    devices: &[DeviceFacts],
    numa_nodes: NonZero<usize>,
    config: &PlacementConfig,
) -> Result<Placement, PlacementError> {
    if devices.is_empty() {
        error!("{}", PlacementError::NoDevices);
        return Err(PlacementError::NoDevices);
    }

    let stripped = devices
        .iter()
        .map(|dev| {
            let list = dev
                .cpu_list
                .without_zero_core()
                .map_err(|source| PlacementError::CpuList {
                    device: dev.address,
                    source,
                })?;
            debug!("device {}: usable cpus '{list}'", dev.address);
            Ok((dev.numa_node, list))
        })
        .collect::<Result<Vec<_>, PlacementError>>()?;

    let isolated_cpu_list = CpuList::merge(stripped.iter().map(|(_, list)| list));
    let buckets = group_by_numa(stripped.iter().map(|(node, list)| (*node, list)));
    let socket_mem = socket_mem(
        &buckets,
        numa_nodes,
        config.device_socket_mem_mb,
        config.idle_socket_mem_mb,
    )?;
    let pmd_cores = allocate_pmd_cores(&buckets, config.pmd_threads_per_device)?;
    let lcores = select_lcores(&pmd_cores, &isolated_cpu_list, config.max_lcores);

    let placement = Placement {
        pmd_cpu_mask: pmd_cores.iter().collect(),
        dpdk_lcore_mask: lcores.iter().collect(),
        isolated_cpu_list,
        pmd_cores,
        lcores,
        socket_mem,
    };
    info!(
        "placed {} device(s) on {} NUMA node(s): pmd-cpu-mask={} dpdk-lcore-mask={} dpdk-socket-mem={} isolated cores '{}'",
        devices.len(),
        buckets.len(),
        placement.pmd_cpu_mask,
        placement.dpdk_lcore_mask,
        placement.socket_mem,
        placement.isolated_cpu_list
    );
    Ok(placement)
}
