// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Read only access to [sysfs] attributes.
//!
//! Which cores end up isolated from the kernel scheduler is decided by attribute files such as
//! `bus/pci/devices/<address>/local_cpulist`.
//! Every path and every opened file is checked to really live on a sysfs filesystem, so facts
//! can not be picked up from a look-alike file outside of it.
//!
//! [sysfs]: https://www.kernel.org/doc/Documentation/filesystems/sysfs.txt

use std::fs::File;
use std::io::Read;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use nix::sys::statfs::{FsType, SYSFS_MAGIC, fstatfs, statfs};
use tracing::{debug, error, info};

/// Errors which might occur when reading sysfs
#[derive(Debug, thiserror::Error)]
pub enum SysfsErr {
    /// No (unique) sysfs mount could be located.
    #[error("unable to locate sysfs: {0}")]
    NotMounted(String),
    /// The path (or the file opened through it) is not on a sysfs filesystem.
    #[error("path {0:?} is not under sysfs")]
    PathNotUnderSysfs(PathBuf),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// A path or attribute under sysfs is not valid UTF-8.
    ///
    /// The kernel only ever writes ascii there.
    /// The offending bytes are not carried along, so they never reach a log.
    #[error("path or attribute under sysfs is not a valid UTF-8 string")]
    SysfsPathIsNotValidUtf8,
}

fn ensure_sysfs(fs_type: nix::Result<FsType>, path: &Path) -> Result<(), SysfsErr> {
    match fs_type {
        Ok(fs_type) if fs_type == SYSFS_MAGIC => Ok(()),
        Ok(_) => Err(SysfsErr::PathNotUnderSysfs(path.to_path_buf())),
        Err(errno) => Err(SysfsErr::IoError(errno.into())),
    }
}

fn locate_sysfs() -> Result<SysfsPath, String> {
    let mounts = procfs::mounts().map_err(|e| format!("unable to list mounts: {e}"))?;
    let mut sysfs = mounts.iter().filter(|mount| mount.fs_vfstype == "sysfs");
    let (Some(mount), None) = (sysfs.next(), sysfs.next()) else {
        let message = if mounts.iter().any(|mount| mount.fs_vfstype == "sysfs") {
            "sysfs is mounted at more than one location".to_string()
        } else {
            "sysfs is not mounted".to_string()
        };
        error!("{message}");
        return Err(message);
    };
    let root = SysfsPath::new(&mount.fs_file).map_err(|e| e.to_string())?;
    info!("found sysfs filesystem at {root}");
    Ok(root)
}

/// The mount point of sysfs.
///
/// Mounts are inspected on first use only.
///
/// # Errors
///
/// [`SysfsErr::NotMounted`] if sysfs is not mounted, or is mounted more than once.
pub fn sysfs_root() -> Result<&'static SysfsPath, SysfsErr> {
    static SYSFS: LazyLock<Result<SysfsPath, String>> = LazyLock::new(locate_sysfs);
    SYSFS
        .as_ref()
        .map_err(|reason| SysfsErr::NotMounted(reason.clone()))
}

/// A canonical, UTF-8 path which was on a sysfs filesystem when it was checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SysfsPath(PathBuf);

impl SysfsPath {
    /// Canonicalize `path` (sysfs is full of symlinks) and check that it is on sysfs.
    ///
    /// # Errors
    ///
    /// - [`SysfsErr::PathNotUnderSysfs`] if the canonical path is on another filesystem.
    /// - [`SysfsErr::SysfsPathIsNotValidUtf8`] if either path is not valid UTF-8.
    /// - [`SysfsErr::IoError`] if the path does not exist or can not be inspected.
    pub fn new(path: impl AsRef<Path>) -> Result<SysfsPath, SysfsErr> {
        let canonical = std::fs::canonicalize(path.as_ref())?;
        if path.as_ref().to_str().is_none() || canonical.to_str().is_none() {
            return Err(SysfsErr::SysfsPathIsNotValidUtf8);
        }
        ensure_sysfs(statfs(&canonical).map(|stat| stat.filesystem_type()), &canonical)?;
        Ok(SysfsPath(canonical))
    }

    /// The path `path` below this one, checked like [`SysfsPath::new`].
    ///
    /// # Errors
    ///
    /// As for [`SysfsPath::new`]; a missing child is an [`SysfsErr::IoError`] of kind
    /// [`std::io::ErrorKind::NotFound`].
    pub fn relative(&self, path: impl AsRef<Path>) -> Result<SysfsPath, SysfsErr> {
        SysfsPath::new(self.0.join(path))
    }

    /// The contents of this attribute file, surrounding whitespace removed.
    ///
    /// The opened file is checked to be on sysfs as well.
    ///
    /// # Errors
    ///
    /// - If the attribute can not be opened or read.
    /// - If the opened file is not on sysfs.
    /// - If the attribute does not contain valid UTF-8.
    pub fn read_attribute(&self) -> Result<String, SysfsErr> {
        let mut file = File::open(&self.0)?;
        ensure_sysfs(fstatfs(file.as_fd()).map(|stat| stat.filesystem_type()), &self.0)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => SysfsErr::SysfsPathIsNotValidUtf8,
            _ => SysfsErr::IoError(e),
        })?;
        let contents = contents.trim().to_string();
        debug!("read {self}: {contents:?}");
        Ok(contents)
    }

    /// Names of the entries of this directory.
    ///
    /// # Errors
    ///
    /// - If the directory can not be listed.
    /// - If an entry name is not valid UTF-8.
    pub fn entry_names(&self) -> Result<Vec<String>, SysfsErr> {
        std::fs::read_dir(&self.0)?
            .map(|entry| {
                entry?
                    .file_name()
                    .into_string()
                    .map_err(|_| SysfsErr::SysfsPathIsNotValidUtf8)
            })
            .collect()
    }
}

impl AsRef<Path> for SysfsPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for SysfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // valid UTF-8, checked on construction
        write!(f, "{}", self.0.display())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_path_is_an_io_error() {
        match SysfsPath::new("/this/path/should/not/exist/anywhere") {
            Err(SysfsErr::IoError(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn temp_dir_is_not_sysfs() {
        let tmp = std::env::temp_dir();
        match SysfsPath::new(&tmp) {
            Err(SysfsErr::PathNotUnderSysfs(path)) => {
                assert_eq!(path, std::fs::canonicalize(&tmp).unwrap());
            }
            other => panic!("expected path outside of sysfs, got {other:?}"),
        }
    }

    #[test]
    fn file_outside_sysfs_is_rejected() {
        let file = std::env::temp_dir().join(format!("sysfs-guard-{}", std::process::id()));
        std::fs::write(&file, "0-7\n").unwrap();
        let result = SysfsPath::new(&file);
        std::fs::remove_file(&file).unwrap();
        assert!(matches!(result, Err(SysfsErr::PathNotUnderSysfs(_))));
    }
}
