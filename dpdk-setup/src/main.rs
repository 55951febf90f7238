// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `dpdk-setup`: compute where a DPDK dataplane's threads and hugepages go on this host.

#![deny(clippy::pedantic, clippy::unwrap_used)]

mod report;

use std::num::NonZero;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use args::{CmdArgs, Parser};
use hardware::facts::{DeviceFactProvider, DeviceFacts, FactError, StaticFacts, SysfsFacts};
use hardware::pci::address::PciAddress;
use placement::{
    Placement, PlacementConfig, PlacementConfigBuilder, PlacementConfigBuilderError,
    PlacementError, compute_placement,
};
use tracing::{debug, error, info};

use crate::report::{KernelArgs, Report};

/// Errors which may end a `dpdk-setup` run.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The fact snapshot could not be read.
    #[error("failed to read fact snapshot {path:?}: {source}")]
    ReadFacts {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The fact snapshot is not valid YAML (or misses required facts).
    #[error("invalid fact snapshot {path:?}: {source}")]
    ParseFacts {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },
    #[error(transparent)]
    Facts(#[from] FactError),
    #[error(transparent)]
    Config(#[from] PlacementConfigBuilderError),
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error("failed to render report: {0}")]
    Render(#[from] serde_yaml_ng::Error),
}

fn init_logging(args: &CmdArgs) {
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_file(true)
        .with_level(true)
        .with_line_number(true)
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .init();
}

fn load_snapshot(path: &Path) -> Result<StaticFacts, SetupError> {
    let text = std::fs::read_to_string(path).map_err(|source| SetupError::ReadFacts {
        path: path.to_path_buf(),
        source,
    })?;
    let facts = serde_yaml_ng::from_str(&text).map_err(|source| SetupError::ParseFacts {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("loaded fact snapshot {path:?}");
    Ok(facts)
}

fn fact_provider(args: &CmdArgs) -> Result<Box<dyn DeviceFactProvider>, SetupError> {
    match args.facts() {
        Some(path) => Ok(Box::new(load_snapshot(path)?)),
        None => Ok(Box::new(SysfsFacts::new()?)),
    }
}

fn gather_facts(
    provider: &dyn DeviceFactProvider,
    devices: &[PciAddress],
) -> Result<Vec<DeviceFacts>, FactError> {
    devices.iter().map(|dev| provider.facts(dev)).collect()
}

fn placement_config(args: &CmdArgs) -> Result<PlacementConfig, PlacementConfigBuilderError> {
    PlacementConfigBuilder::default()
        .pmd_threads_per_device(args.pmd_threads())
        .max_lcores(args.max_lcores())
        .device_socket_mem_mb(args.socket_mem_mb())
        .idle_socket_mem_mb(args.idle_socket_mem_mb())
        .build()
}

/// Compute the placement of the DPDK bound devices named in `args`, with facts from `provider`.
fn plan(args: &CmdArgs, provider: &dyn DeviceFactProvider) -> Result<Placement, SetupError> {
    let devices = args.dpdk_devices();
    info!("placing {} DPDK device(s): {devices:?}", devices.len());
    let facts = gather_facts(provider, &devices)?;
    let numa_nodes: NonZero<usize> = match args.numa_nodes() {
        Some(n) => n,
        None => provider.numa_node_count()?,
    };
    debug!("host has {numa_nodes} NUMA node(s)");
    let config = placement_config(args)?;
    Ok(compute_placement(&facts, numa_nodes, &config)?)
}

fn kernel_args(args: &CmdArgs) -> KernelArgs {
    KernelArgs {
        hugepages: args.hugepages(),
        iommu: args.iommu(),
    }
}

fn run(args: &CmdArgs) -> Result<String, SetupError> {
    let provider = fact_provider(args)?;
    let placement = plan(args, provider.as_ref())?;
    Ok(Report::new(&placement, kernel_args(args)).render(args.format())?)
}

fn main() -> ExitCode {
    let args = CmdArgs::parse();
    init_logging(&args);
    match run(&args) {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            eprintln!("dpdk-setup: {e}");
            ExitCode::FAILURE
        }
    }
}
