// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of `dpdk-setup`.

pub use clap::Parser;
use hardware::pci::address::PciAddress;
use hardware::pci::driver::PciDriver;
use placement::{DEFAULT_DEVICE_SOCKET_MEM_MB, DEFAULT_IDLE_SOCKET_MEM_MB, DEFAULT_MAX_LCORES};
use std::num::NonZero;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{Level, debug};

/// A device and the driver it is (to be) bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceArg {
    address: PciAddress,
    driver: Option<PciDriver>,
}

impl DeviceArg {
    /// The PCI address of the device.
    #[must_use]
    pub fn address(&self) -> PciAddress {
        self.address
    }

    /// The driver of the device, `None` meaning the kernel's default.
    #[must_use]
    pub fn driver(&self) -> Option<&PciDriver> {
        self.driver.as_ref()
    }

    /// Returns true if the device is driven by the userspace dataplane.
    #[must_use]
    pub fn is_dpdk(&self) -> bool {
        self.driver.as_ref().is_some_and(PciDriver::is_dpdk)
    }
}

impl FromStr for DeviceArg {
    type Err = String;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (addr, driver) = match input.split_once('=') {
            Some((addr, "")) => (addr, None),
            Some((addr, driver)) => {
                let driver = PciDriver::from_str(driver)
                    .map_err(|e| format!("Invalid driver name: {e}"))?;
                (addr, Some(driver))
            }
            None => (input, Some(PciDriver::VfioPci)),
        };
        let address =
            PciAddress::try_from(addr).map_err(|e| format!("Invalid PCI address: {e}"))?;
        Ok(DeviceArg { address, driver })
    }
}

/// Format of the placement report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// A YAML document with every computed value.
    #[default]
    Yaml,
    /// `other_config` assignments for `ovs-vsctl set Open_vSwitch .`
    Ovs,
    /// The `isolated_cores` line of tuned's cpu-partitioning variables.
    Tuned,
    /// Kernel command line arguments for hugepages and the IOMMU.
    Kernel,
}

/// Default number of 2M hugepages reserved on the kernel command line.
pub const DEFAULT_HUGEPAGES: u32 = 512;

#[derive(Parser)]
#[command(name = "dpdk-setup")]
#[command(version)]
#[command(about = "NUMA aware PMD / lcore / hugepage placement for OVS-DPDK hosts", long_about = None)]
pub struct CmdArgs {
    #[arg(
        long,
        value_name = "ADDR[=DRIVER]",
        value_parser = DeviceArg::from_str,
        value_delimiter = ',',
        required = true,
        help = "PCI device with optional driver in the format ADDRESS[=DRIVER].
A device without a driver is bound to vfio-pci; ADDRESS= leaves it to the kernel's default driver.
Only devices bound to vfio-pci receive PMD cores.
E.g. --device 0000:03:00.0 --device 0000:03:00.1=i40e, or comma-separated: --device 0000:03:00.0,0000:81:00.0"
    )]
    device: Vec<DeviceArg>,

    #[arg(
        long,
        value_name = "N",
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..=64),
        help = "Number of PMD threads per device in [1..64]"
    )]
    pmd_threads: u16,

    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Number of NUMA nodes of the host (detected when omitted)"
    )]
    numa_nodes: Option<u16>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Read device facts from a YAML snapshot instead of sysfs"
    )]
    facts: Option<PathBuf>,

    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_MAX_LCORES,
        help = "Maximum number of lcores"
    )]
    max_lcores: usize,

    #[arg(
        long,
        value_name = "MB",
        default_value_t = DEFAULT_DEVICE_SOCKET_MEM_MB,
        help = "Hugepage memory of NUMA nodes hosting devices"
    )]
    socket_mem_mb: u32,

    #[arg(
        long,
        value_name = "MB",
        default_value_t = DEFAULT_IDLE_SOCKET_MEM_MB,
        help = "Hugepage memory of NUMA nodes hosting no devices"
    )]
    idle_socket_mem_mb: u32,

    #[arg(
        long,
        value_name = "yaml|ovs|tuned|kernel",
        default_value_t = OutputFormat::Yaml,
        help = "Format of the placement report"
    )]
    format: OutputFormat,

    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_HUGEPAGES,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Number of 2M hugepages reserved at boot"
    )]
    hugepages: u32,

    #[arg(long, help = "Leave the IOMMU out of the kernel arguments")]
    no_iommu: bool,

    #[arg(
        long,
        value_name = "LEVEL",
        default_value_t = Level::INFO,
        help = "Log level, one of [error,warn,info,debug,trace]. Logs go to stderr"
    )]
    log_level: Level,
}

impl CmdArgs {
    // device getter. Includes devices left to kernel drivers
    pub fn devices(&self) -> impl Iterator<Item = &DeviceArg> {
        self.device.iter()
    }

    /// The devices to place, in command line order and without repetitions.
    pub fn dpdk_devices(&self) -> Vec<PciAddress> {
        let mut out: Vec<PciAddress> = Vec::new();
        for dev in self.devices() {
            if !dev.is_dpdk() {
                debug!(
                    "device {} is not bound to a DPDK driver: skipping",
                    dev.address()
                );
                continue;
            }
            if !out.contains(&dev.address()) {
                out.push(dev.address());
            }
        }
        out
    }

    pub fn pmd_threads(&self) -> usize {
        self.pmd_threads.into()
    }
    pub fn numa_nodes(&self) -> Option<NonZero<usize>> {
        self.numa_nodes.and_then(|n| NonZero::new(usize::from(n)))
    }
    pub fn facts(&self) -> Option<&Path> {
        self.facts.as_deref()
    }
    pub fn max_lcores(&self) -> usize {
        self.max_lcores
    }
    pub fn socket_mem_mb(&self) -> u32 {
        self.socket_mem_mb
    }
    pub fn idle_socket_mem_mb(&self) -> u32 {
        self.idle_socket_mem_mb
    }
    pub fn format(&self) -> OutputFormat {
        self.format
    }
    pub fn hugepages(&self) -> u32 {
        self.hugepages
    }
    pub fn iommu(&self) -> bool {
        !self.no_iommu
    }
    pub fn log_level(&self) -> Level {
        self.log_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn addr(text: &str) -> PciAddress {
        PciAddress::try_from(text).unwrap()
    }

    #[test]
    fn test_parse_device() {
        // address only: vfio-pci
        let spec = DeviceArg::from_str("0000:03:00.0").unwrap();
        assert_eq!(spec.address(), addr("0000:03:00.0"));
        assert_eq!(spec.driver(), Some(&PciDriver::VfioPci));
        assert!(spec.is_dpdk());

        // address + driver
        let spec = DeviceArg::from_str("0000:03:00.1=i40e").unwrap();
        assert_eq!(spec.driver(), Some(&PciDriver::I40e));
        assert!(!spec.is_dpdk());

        // address= we treat as the kernel default
        let spec = DeviceArg::from_str("0000:03:00.1=").unwrap();
        assert_eq!(spec.driver(), None);
        assert!(!spec.is_dpdk());

        // unknown drivers are kept by name
        let spec = DeviceArg::from_str("0000:03:00.1=igb_uio").unwrap();
        assert_eq!(spec.driver(), Some(&PciDriver::Other("igb_uio".to_string())));

        // bad pci address
        assert!(DeviceArg::from_str("0000:03:00").is_err());
        assert!(DeviceArg::from_str("=vfio-pci").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = CmdArgs::try_parse_from(["dpdk-setup", "--device", "0000:03:00.0"]).unwrap();
        assert_eq!(args.pmd_threads(), 1);
        assert_eq!(args.numa_nodes(), None);
        assert_eq!(args.facts(), None);
        assert_eq!(args.max_lcores(), 2);
        assert_eq!(args.socket_mem_mb(), 2048);
        assert_eq!(args.idle_socket_mem_mb(), 1024);
        assert_eq!(args.format(), OutputFormat::Yaml);
        assert_eq!(args.hugepages(), 512);
        assert!(args.iommu());
        assert_eq!(args.log_level(), Level::INFO);
    }

    #[test]
    fn test_device_selection() {
        let args = CmdArgs::try_parse_from([
            "dpdk-setup",
            "--device",
            "0000:81:00.0,0000:03:00.0=mlx5_core",
            "--device",
            "0000:03:00.1=vfio-pci",
            "--device",
            "0000:81:00.0",
        ])
        .unwrap();
        assert_eq!(args.devices().count(), 4);
        assert_eq!(
            args.dpdk_devices(),
            vec![addr("0000:81:00.0"), addr("0000:03:00.1")]
        );
    }

    #[test]
    fn test_options() {
        let args = CmdArgs::try_parse_from([
            "dpdk-setup",
            "--device=0000:03:00.0",
            "--pmd-threads=4",
            "--numa-nodes=2",
            "--facts=/tmp/facts.yaml",
            "--format=ovs",
            "--log-level=debug",
        ])
        .unwrap();
        assert_eq!(args.pmd_threads(), 4);
        assert_eq!(args.numa_nodes().map(NonZero::get), Some(2));
        assert_eq!(args.facts(), Some(Path::new("/tmp/facts.yaml")));
        assert_eq!(args.format(), OutputFormat::Ovs);
        assert_eq!(args.log_level(), Level::DEBUG);

        let args = CmdArgs::try_parse_from([
            "dpdk-setup",
            "--device=0000:03:00.0",
            "--format=kernel",
            "--hugepages=1024",
            "--no-iommu",
        ])
        .unwrap();
        assert_eq!(args.format(), OutputFormat::Kernel);
        assert_eq!(args.hugepages(), 1024);
        assert!(!args.iommu());
    }

    #[test]
    fn test_rejected_options() {
        assert!(CmdArgs::try_parse_from(["dpdk-setup"]).is_err());
        for bad in [
            ["dpdk-setup", "--device=0000:03:00.0", "--pmd-threads=0"],
            ["dpdk-setup", "--device=0000:03:00.0", "--pmd-threads=65"],
            ["dpdk-setup", "--device=0000:03:00.0", "--numa-nodes=0"],
            ["dpdk-setup", "--device=0000:03:00.0", "--format=json"],
            ["dpdk-setup", "--device=0000:03:00.0", "--hugepages=0"],
        ] {
            assert!(CmdArgs::try_parse_from(bad).is_err(), "{bad:?}");
        }
    }
}
