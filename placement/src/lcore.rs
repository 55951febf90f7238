// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Selection of the dataplane's control (lcore) cores.

use hardware::cpu::{CoreId, CoreSet, CpuList};
use tracing::{debug, warn};

/// Pick up to `max_lcores` control cores out of `cpu_list`, avoiding every PMD core.
///
/// `cpu_list` is the merged (zero core stripped) list of all placed devices, not a per node list.
/// The lowest numbered remaining cores are chosen.
/// Running out of cores is not an error: the result may be shorter than `max_lcores`, or empty.
#[must_use]
pub fn select_lcores(pmd_cores: &[CoreId], cpu_list: &CpuList, max_lcores: usize) -> Vec<CoreId> {
    let pmd: CoreSet = pmd_cores.iter().copied().collect();
    let lcores: Vec<CoreId> = cpu_list
        .core_set()
        .difference(&pmd)
        .iter()
        .take(max_lcores)
        .collect();
    if lcores.len() < max_lcores {
        warn!(
            "only {} of {max_lcores} lcore(s) available in {cpu_list} after PMD allocation",
            lcores.len()
        );
    }
    debug!("lcores {lcores:?}");
    lcores
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(raw: &[u32]) -> Vec<CoreId> {
        raw.iter().copied().map(CoreId::new).collect()
    }

    #[test]
    fn lowest_free_cores_are_chosen() {
        let list: CpuList = "1-7".parse().unwrap();
        assert_eq!(select_lcores(&ids(&[1]), &list, 2), ids(&[2, 3]));
    }

    #[test]
    fn merged_lists_are_searched_ascending() {
        let list: CpuList = "9-11,1-3".parse().unwrap();
        assert_eq!(select_lcores(&ids(&[1, 2, 9]), &list, 2), ids(&[3, 10]));
    }

    #[test]
    fn fewer_or_no_lcores_are_fine() {
        let list: CpuList = "1-3".parse().unwrap();
        assert_eq!(select_lcores(&ids(&[1, 2]), &list, 2), ids(&[3]));
        assert!(select_lcores(&ids(&[1, 2, 3]), &list, 2).is_empty());
        assert!(select_lcores(&[], &CpuList::default(), 2).is_empty());
    }

    #[test]
    fn lcores_are_bounded_and_disjoint_from_pmd_cores() {
        bolero::check!()
            .with_type::<(Vec<u8>, Vec<u8>)>()
            .for_each(|(listed, pmd): &(Vec<u8>, Vec<u8>)| {
                if listed.is_empty() {
                    return;
                }
                let text = listed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                let list: CpuList = text.parse().unwrap();
                let pmd: Vec<CoreId> = pmd.iter().map(|&c| CoreId::new(u32::from(c))).collect();
                let lcores = select_lcores(&pmd, &list, 2);
                assert!(lcores.len() <= 2);
                assert!(lcores.iter().all(|core| !pmd.contains(core)));
                assert!(lcores.iter().all(|core| list.cores().contains(core)));
                assert!(lcores.windows(2).all(|pair| pair[0] < pair[1]));
            });
    }
}
