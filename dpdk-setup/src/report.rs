// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Rendering of a [`Placement`] for its consumers.

use args::{DEFAULT_HUGEPAGES, OutputFormat};
use hardware::cpu::CoreId;
use placement::Placement;

/// Arguments enabling IOMMU passthrough for vfio-pci.
pub const IOMMU_KERNEL_ARGS: &str = "iommu=pt intel_iommu=on";

/// Boot time hugepage reservation and IOMMU settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelArgs {
    /// Number of 2M hugepages.
    pub hugepages: u32,
    pub iommu: bool,
}

impl Default for KernelArgs {
    fn default() -> Self {
        KernelArgs {
            hugepages: DEFAULT_HUGEPAGES,
            iommu: true,
        }
    }
}

impl std::fmt::Display for KernelArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "default_hugepagesz=2M hugepagesz=2M hugepages={}",
            self.hugepages
        )?;
        if self.iommu {
            write!(f, " {IOMMU_KERNEL_ARGS}")?;
        }
        Ok(())
    }
}

/// The values a placement hands to the rest of host preparation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Report {
    pub dpdk_socket_mem: String,
    pub pmd_cpu_mask: String,
    pub dpdk_lcores_mask: String,
    pub isolated_cores: String,
    pub kernel_args: String,
    pub pmd_cores: Vec<CoreId>,
    pub lcores: Vec<CoreId>,
}

impl Report {
    #[must_use]
    pub fn new(placement: &Placement, kernel: KernelArgs) -> Self {
        Report {
            dpdk_socket_mem: placement.socket_mem.to_string(),
            pmd_cpu_mask: placement.pmd_cpu_mask.to_string(),
            dpdk_lcores_mask: placement.dpdk_lcore_mask.to_string(),
            isolated_cores: placement.isolated_cpu_list.to_string(),
            kernel_args: kernel.to_string(),
            pmd_cores: placement.pmd_cores.clone(),
            lcores: placement.lcores.clone(),
        }
    }

    /// `other_config` assignments, one per line, for `ovs-vsctl set Open_vSwitch .`
    #[must_use]
    pub fn ovs_other_config(&self) -> String {
        [
            ("dpdk-init", "true"),
            ("dpdk-socket-mem", self.dpdk_socket_mem.as_str()),
            ("pmd-cpu-mask", self.pmd_cpu_mask.as_str()),
            ("dpdk-lcore-mask", self.dpdk_lcores_mask.as_str()),
        ]
        .iter()
        .map(|(key, value)| format!("other_config:{key}={value}\n"))
        .collect::<String>()
    }

    /// The cpu-partitioning variables line of tuned.
    #[must_use]
    pub fn tuned_variables(&self) -> String {
        format!("isolated_cores={}\n", self.isolated_cores)
    }

    /// Render the report in `format`.
    ///
    /// # Errors
    ///
    /// Fails if the YAML serializer does.
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_yaml_ng::Error> {
        match format {
            OutputFormat::Yaml => serde_yaml_ng::to_string(self),
            OutputFormat::Ovs => Ok(self.ovs_other_config()),
            OutputFormat::Tuned => Ok(self.tuned_variables()),
            OutputFormat::Kernel => Ok(format!("{}\n", self.kernel_args)),
        }
    }
}
