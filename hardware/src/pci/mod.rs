// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI network devices: how they are addressed and which driver they are bound to.

/// PCI device addressing.
pub mod address;
/// PCI drivers and their classification.
pub mod driver;
