// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI device addresses in the extended BDF (EBDF) format `domain:bus:device.function`
//! (e.g. `0000:03:00.0`), which is how sysfs names devices under `bus/pci/devices`.
//!
//! # Examples
//!
//! ```
//! use dpdk_setup_hardware::pci::address::PciAddress;
//!
//! let addr = PciAddress::try_from("0000:03:00.1").unwrap();
//! assert_eq!(addr.bus(), 0x03);
//! assert_eq!(addr.function(), 1);
//! assert_eq!(addr.to_string(), "0000:03:00.1");
//! ```

use std::str::FromStr;

/// A PCI device address.
///
/// Ordering follows the numeric value of domain, bus, device and function, so collections keyed
/// by address iterate in the same order `lspci` lists devices.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
}

/// Errors that can occur when parsing a PCI address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPciAddress {
    /// Invalid address syntax.
    #[error("invalid PCI address {0:?} (should be domain:bus:device.function, e.g. 0000:03:00.0)")]
    Syntax(String),
    /// The device number exceeds 0x1f.
    #[error("invalid PCI address {address:?}: device {device:#x} is larger than 0x1f")]
    Device {
        /// The address being parsed.
        address: String,
        /// The offending device number.
        device: u8,
    },
    /// The function number exceeds 7.
    #[error("invalid PCI address {address:?}: function {function} is larger than 7")]
    Function {
        /// The address being parsed.
        address: String,
        /// The offending function number.
        function: u8,
    },
}

impl PciAddress {
    /// Largest legal device number.
    pub const MAX_DEVICE: u8 = 0x1f;
    /// Largest legal function number.
    pub const MAX_FUNCTION: u8 = 0x7;

    /// Creates a new PCI address from its components.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPciAddress`] if device or function are out of range.
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        let address = Self {
            domain,
            bus,
            device,
            function,
        };
        if device > Self::MAX_DEVICE {
            return Err(InvalidPciAddress::Device {
                address: address.to_string(),
                device,
            });
        }
        if function > Self::MAX_FUNCTION {
            return Err(InvalidPciAddress::Function {
                address: address.to_string(),
                function,
            });
        }
        Ok(address)
    }

    /// PCI domain (segment) number.
    #[must_use]
    pub fn domain(&self) -> u16 {
        self.domain
    }

    /// PCI bus number.
    #[must_use]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Device number on the bus.
    #[must_use]
    pub fn device(&self) -> u8 {
        self.device
    }

    /// Function number within the device.
    #[must_use]
    pub fn function(&self) -> u8 {
        self.function
    }
}

impl std::fmt::Display for PciAddress {
    /// Formats the PCI address as `DDDD:BB:DD.F` (lowercase hex).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

fn hex_field(value: &str, width: usize) -> Option<&str> {
    (value.len() == width && value.chars().all(|c| c.is_ascii_hexdigit())).then_some(value)
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    /// Parses a PCI address from a string in exactly the format `DDDD:BB:DD.F`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is wrong or any component value is out of range.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let syntax = || InvalidPciAddress::Syntax(value.to_string());
        let mut parts = value.split(':');
        let (Some(domain), Some(bus), Some(dev_and_func), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(syntax());
        };
        let Some((device, function)) = dev_and_func.split_once('.') else {
            return Err(syntax());
        };
        let domain = hex_field(domain, 4)
            .and_then(|d| u16::from_str_radix(d, 16).ok())
            .ok_or_else(syntax)?;
        let bus = hex_field(bus, 2)
            .and_then(|b| u8::from_str_radix(b, 16).ok())
            .ok_or_else(syntax)?;
        let device = hex_field(device, 2)
            .and_then(|d| u8::from_str_radix(d, 16).ok())
            .ok_or_else(syntax)?;
        let function = hex_field(function, 1)
            .and_then(|f| u8::from_str_radix(f, 16).ok())
            .ok_or_else(syntax)?;
        PciAddress::new(domain, bus, device, function)
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl From<PciAddress> for String {
    fn from(value: PciAddress) -> String {
        value.to_string()
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use bolero::{Driver, TypeGenerator};

    use crate::pci::address::PciAddress;

    impl TypeGenerator for PciAddress {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            PciAddress::new(
                driver.produce()?,
                driver.produce()?,
                driver.produce::<u8>()? & PciAddress::MAX_DEVICE,
                driver.produce::<u8>()? & PciAddress::MAX_FUNCTION,
            )
            .ok()
        }
    }
}
