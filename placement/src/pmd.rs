// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Allocation of poll mode driver (PMD) cores.

use hardware::cpu::{CoreId, CoreSet};
use hardware::numa::NumaNode;
use tracing::{debug, error};

use crate::PlacementError;
use crate::numa::NumaBuckets;

/// Take the `count` smallest cores out of `pool`, one at a time.
///
/// Each chosen core is removed from `pool` before the next one is chosen, so the result is
/// ascending and free of duplicates.
///
/// # Errors
///
/// [`PlacementError::InsufficientCores`] if `pool` holds fewer than `count` cores.
/// The pool is left untouched in that case.
pub fn take_smallest(
    pool: &mut CoreSet,
    count: usize,
    node: NumaNode,
) -> Result<Vec<CoreId>, PlacementError> {
    if pool.len() < count {
        let err = PlacementError::InsufficientCores {
            node,
            requested: count,
            available: pool.len(),
        };
        error!("{err}");
        return Err(err);
    }
    Ok(std::iter::from_fn(|| pool.pop_min()).take(count).collect())
}

/// Allocate `nics × pmd_threads_per_device` PMD cores on every NUMA node which hosts devices.
///
/// Nodes are visited in ascending order and each node allocates from its own cpu list only.
/// The result is the concatenation of every node's allocation (not deduplicated across nodes).
///
/// # Errors
///
/// [`PlacementError::InsufficientCores`] if any node has fewer cores than it needs.
pub fn allocate_pmd_cores(
    buckets: &NumaBuckets,
    pmd_threads_per_device: usize,
) -> Result<Vec<CoreId>, PlacementError> {
    let mut pmd_cores = Vec::new();
    for (node, bucket) in buckets.iter() {
        let mut pool = bucket.cpu_list.core_set();
        let requested = bucket.nics.saturating_mul(pmd_threads_per_device);
        let taken = take_smallest(&mut pool, requested, node)?;
        debug!(
            "NUMA node {node}: {} device(s) x {pmd_threads_per_device} thread(s) -> PMD cores {taken:?}",
            bucket.nics
        );
        pmd_cores.extend(taken);
    }
    Ok(pmd_cores)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::numa::group_by_numa;
    use hardware::cpu::CpuList;
    use pretty_assertions::assert_eq;

    fn ids(raw: &[u32]) -> Vec<CoreId> {
        raw.iter().copied().map(CoreId::new).collect()
    }

    #[test]
    fn smallest_cores_are_taken_and_removed() {
        let mut pool: CoreSet = ids(&[1, 2, 3, 5]).into_iter().collect();
        let taken = take_smallest(&mut pool, 2, NumaNode::new(0)).unwrap();
        assert_eq!(taken, ids(&[1, 2]));
        assert_eq!(pool.iter().collect::<Vec<_>>(), ids(&[3, 5]));
    }

    #[test]
    fn exhaustion_is_an_error_not_a_short_result() {
        let mut pool: CoreSet = ids(&[1, 2, 3]).into_iter().collect();
        let err = take_smallest(&mut pool, 5, NumaNode::new(1)).unwrap_err();
        assert_eq!(
            err,
            PlacementError::InsufficientCores {
                node: NumaNode::new(1),
                requested: 5,
                available: 3
            }
        );
        assert_eq!(pool.len(), 3);
        assert!(err.to_string().contains("NUMA node 1"));
    }

    #[test]
    fn every_node_allocates_from_its_own_list() {
        let node0: CpuList = "1-7".parse().unwrap();
        let node1: CpuList = "9,11,13,15".parse().unwrap();
        let buckets = group_by_numa([
            (NumaNode::new(1), &node1),
            (NumaNode::new(0), &node0),
            (NumaNode::new(1), &node1),
        ]);
        let pmd = allocate_pmd_cores(&buckets, 2).unwrap();
        assert_eq!(pmd, ids(&[1, 2, 9, 11, 13, 15]));
    }

    #[test]
    fn zero_threads_allocate_nothing() {
        let list: CpuList = "1-3".parse().unwrap();
        let buckets = group_by_numa([(NumaNode::new(0), &list)]);
        assert!(allocate_pmd_cores(&buckets, 0).unwrap().is_empty());
    }

    #[test]
    fn node_without_usable_cores_fails() {
        let empty = CpuList::default();
        let buckets = group_by_numa([(NumaNode::new(0), &empty)]);
        assert!(matches!(
            allocate_pmd_cores(&buckets, 1),
            Err(PlacementError::InsufficientCores {
                requested: 1,
                available: 0,
                ..
            })
        ));
    }

    #[test]
    fn allocation_is_minimal_and_duplicate_free() {
        bolero::check!()
            .with_type::<(Vec<u8>, u8)>()
            .for_each(|(raw, count): &(Vec<u8>, u8)| {
                let mut pool: CoreSet = raw.iter().map(|&c| CoreId::new(u32::from(c))).collect();
                let before = pool.clone();
                let count = usize::from(*count % 8);
                match take_smallest(&mut pool, count, NumaNode::new(0)) {
                    Ok(taken) => {
                        let expected: Vec<_> = before.iter().take(count).collect();
                        assert_eq!(taken, expected);
                        assert_eq!(pool.len(), before.len() - count);
                        assert!(taken.iter().all(|core| !pool.contains(*core)));
                    }
                    Err(PlacementError::InsufficientCores { available, .. }) => {
                        assert!(before.len() < count);
                        assert_eq!(available, before.len());
                        assert_eq!(pool, before);
                    }
                    Err(other) => panic!("unexpected error {other}"),
                }
            });
    }
}
