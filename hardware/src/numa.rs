// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NUMA (Non-Uniform Memory Access) node ids.
//!
//! The kernel reports the NUMA node of a PCI device in `numa_node`.
//! That attribute reads `-1` when the platform does not know (or does not have) NUMA locality
//! for the device; such devices are treated as living on node 0.

use tracing::warn;

/// The id of a NUMA node.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
#[repr(transparent)]
pub struct NumaNode(u32);

/// Error type for NUMA node parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NumaNodeParseError {
    /// The text is not an integer.
    #[error("invalid NUMA node {0:?} (must be an integer)")]
    Syntax(String),
    /// The node id does not fit the supported range.
    #[error("NUMA node {0} is out of range")]
    OutOfRange(i64),
}

impl NumaNode {
    /// Creates a new NUMA node id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw node number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Interpret a raw NUMA node value as reported by the kernel.
    ///
    /// Negative values mean "unknown" and normalize to node 0.
    ///
    /// # Errors
    ///
    /// [`NumaNodeParseError::OutOfRange`] if the value does not fit a node id.
    pub fn from_raw(raw: i64) -> Result<Self, NumaNodeParseError> {
        if raw < 0 {
            warn!("NUMA node of device is unknown ({raw}): assuming node 0");
            return Ok(NumaNode(0));
        }
        u32::try_from(raw)
            .map(NumaNode)
            .map_err(|_| NumaNodeParseError::OutOfRange(raw))
    }

    /// Parse the contents of a sysfs `numa_node` attribute (see [`NumaNode::from_raw`]).
    ///
    /// # Errors
    ///
    /// [`NumaNodeParseError`] if the text is not an integer or does not fit a node id.
    pub fn from_sysfs_value(text: &str) -> Result<Self, NumaNodeParseError> {
        let raw = text
            .trim()
            .parse::<i64>()
            .map_err(|_| NumaNodeParseError::Syntax(text.to_string()))?;
        Self::from_raw(raw)
    }
}

impl From<u32> for NumaNode {
    fn from(value: u32) -> Self {
        NumaNode(value)
    }
}

impl std::fmt::Display for NumaNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_node_normalizes_to_zero() {
        assert_eq!(NumaNode::from_sysfs_value("-1\n"), Ok(NumaNode::new(0)));
        assert_eq!(NumaNode::from_raw(-7), Ok(NumaNode::new(0)));
    }

    #[test]
    fn known_nodes_parse() {
        assert_eq!(NumaNode::from_sysfs_value("0"), Ok(NumaNode::new(0)));
        assert_eq!(NumaNode::from_sysfs_value(" 3\n"), Ok(NumaNode::new(3)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(
            NumaNode::from_sysfs_value("unknown"),
            Err(NumaNodeParseError::Syntax("unknown".to_string()))
        );
        assert_eq!(
            NumaNode::from_raw(i64::from(u32::MAX) + 1),
            Err(NumaNodeParseError::OutOfRange(i64::from(u32::MAX) + 1))
        );
    }
}
