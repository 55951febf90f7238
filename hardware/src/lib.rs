// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Vocabulary for describing where network devices live on a host.
//!
//! The `hardware` crate names the pieces of host topology which matter when a userspace
//! dataplane decides which CPU cores and which NUMA memory to use:
//!
//! - [`pci`]: PCI addresses of network devices and the drivers they are bound to
//! - [`cpu`]: CPU core ids, sysfs style cpu lists, and core masks
//! - [`numa`]: NUMA node ids
//! - [`facts`]: the per-device facts (NUMA node, local cpu list) and the providers which
//!   collect them, either from sysfs or from an in-memory snapshot
//!
//! ## Features
//!
//! - `serde`: Adds (de)serialization support, required for fact snapshots.
//! - `bolero`: Enables fuzzing support for testing.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod cpu;
pub mod facts;
pub mod numa;
pub mod pci;
