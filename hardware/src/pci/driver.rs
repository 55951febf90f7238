// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

/// Linux drivers a PCI network device may be bound to.
///
/// Driver names which are not specifically known are preserved in [`PciDriver::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::EnumIs)]
pub enum PciDriver {
    /// Intel's i40e driver.
    #[strum(serialize = "i40e")]
    I40e,
    /// Intel's iavf driver.
    #[strum(serialize = "iavf")]
    Iavf,
    /// Intel's ixgbe driver.
    #[strum(serialize = "ixgbe")]
    Ixgbe,
    /// NVIDIA/Mellanox's mlx5 driver
    #[strum(serialize = "mlx5_core")]
    Mlx5Core,
    /// The vfio-pci driver.
    #[strum(serialize = "vfio-pci")]
    VfioPci,
    /// The virtio-net driver.
    // NOTE: inconsistent use of _ vs - is deliberate.  Linux is not consistent
    #[strum(serialize = "virtio_net")]
    VirtioNet,
    /// The virtio-pci driver (sometimes assigned to virtio net devices)
    #[strum(serialize = "virtio-pci")]
    VirtioPci,
    /// Any other driver, by name.
    #[strum(default)]
    Other(String),
}

impl PciDriver {
    /// Returns true if binding a device to this driver hands it to a userspace (DPDK) dataplane.
    ///
    /// Only devices bound to such a driver receive PMD cores.
    #[must_use]
    pub fn is_dpdk(&self) -> bool {
        matches!(self, PciDriver::VfioPci)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn known_drivers_round_trip_their_name() {
        for driver in [
            PciDriver::I40e,
            PciDriver::Iavf,
            PciDriver::Ixgbe,
            PciDriver::Mlx5Core,
            PciDriver::VfioPci,
            PciDriver::VirtioNet,
            PciDriver::VirtioPci,
        ] {
            assert_eq!(PciDriver::from_str(&driver.to_string()), Ok(driver));
        }
    }

    #[test]
    fn unknown_drivers_are_kept_by_name() {
        let driver: PciDriver = "igb".parse().unwrap();
        assert_eq!(driver, PciDriver::Other("igb".to_string()));
        assert_eq!(driver.to_string(), "igb");
        assert!(!driver.is_dpdk());
        assert_eq!(
            "vfio-pci".parse::<PciDriver>().map(|d| d.to_string()),
            Ok("vfio-pci".to_string())
        );
    }

    #[test]
    fn only_vfio_pci_is_a_dpdk_driver() {
        assert!(PciDriver::VfioPci.is_dpdk());
        assert!(!PciDriver::VirtioNet.is_dpdk());
        assert!(!PciDriver::Mlx5Core.is_dpdk());
    }
}
