// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

//! Platform-adapted filesystem primitives.
//!
//! [`PathOps`] is a common, object-safe, `Send + Sync` trait — shaped
//! like [`crate::reconcile::reporter::ReconcileReporter`], itself an
//! adaptation of `spfs`'s `RenderReporter` — behind which
//! [`crate::reconcile::Reconciler`] drives either a real POSIX or
//! Windows-family implementation, or in tests, a fake one, so both code
//! paths are exercisable on any host.

use std::ffi::OsString;
use std::path::Path;

use crate::error::Result;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::UnixOps;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsOps;

#[cfg(test)]
pub mod fake;

/// Which family of equivalence/deletion semantics is active. Drives the
/// `already_correct` branch in [`crate::reconcile::Reconciler`] and
/// whether `trash()` is available as an `unlink` fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Posix,
    WindowsFamily,
}

/// The physical mechanism used to realize a logical `Symlink` entry,
/// chosen once for the whole run from the `--windows_compatible` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAlgorithm {
    /// Always create a POSIX symlink.
    Posix,
    /// Create a directory junction if the target is a directory,
    /// otherwise a hard link.
    WindowsCompatible,
}

/// How strictly a hardlinked file must match its desired target name to
/// be considered already correct. Only consulted on
/// `Platform::WindowsFamily`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardlinkEquivalence {
    /// The desired target must be among this file's hardlink names.
    Strong,
    /// The file merely needs to be a hardlink with *some* matching
    /// name.
    Weak,
}

/// The actual, on-disk kind of an entry as observed by a directory scan
/// or an `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActualKind {
    Regular,
    Directory,
    Symlink,
}

/// A single child yielded by [`PathOps::iter_dir`]. `dtype` is `None`
/// when the underlying directory-entry type is unknown and the caller
/// must fall back to `lstat`.
#[derive(Debug, Clone)]
pub struct DirChild {
    pub name: OsString,
    pub dtype: Option<ActualKind>,
}

/// Platform primitives needed by [`crate::reconcile::Reconciler`].
pub trait PathOps: Send + Sync {
    fn platform(&self) -> Platform;

    /// `lstat`: does not follow a trailing symlink.
    fn lstat(&self, path: &Path) -> Result<Option<ActualKind>>;

    /// `stat`: follows symlinks. Used by Phase B to decide, in
    /// `windows_compatible` mode, whether a symlink's target is itself
    /// a directory (junction) or not (hardlink).
    fn stat_is_dir(&self, path: &Path) -> Result<bool>;

    /// Raw bytes of a symlink's target, as returned by the kernel.
    fn read_link(&self, path: &Path) -> Result<OsString>;

    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<()>;

    /// Add `required_bits` to `path`'s mode if missing, preserving all
    /// other bits.
    fn ensure_mode(&self, path: &Path, required_bits: u32) -> Result<()>;

    fn make_symlink(&self, target: &str, link_path: &Path) -> Result<()>;
    fn make_hardlink(&self, existing: &Path, link_path: &Path) -> Result<()>;
    fn make_junction(&self, target_dir: &Path, link_path: &Path) -> Result<()>;

    /// Create `path` exclusively (must not already exist) with `mode`,
    /// then close it immediately. Used only for empty regular files;
    /// pre-existence is a bug (Phase A should already have pruned it).
    fn create_file_exclusive(&self, path: &Path, mode: u32) -> Result<()>;

    fn unlink(&self, path: &Path) -> Result<()>;
    fn rmdir(&self, path: &Path) -> Result<()>;
    fn rename(&self, old: &Path, new: &Path) -> Result<()>;

    fn iter_dir(&self, path: &Path) -> Result<Vec<DirChild>>;

    /// Hardlink names that currently point at the same file as `path`.
    /// Only meaningful (and only called) on `Platform::WindowsFamily`.
    fn hardlink_names(&self, path: &Path) -> Result<Vec<OsString>>;

    /// Move `path` into a `bazel-trash` directory under `trash_root`
    /// with a unique name, retrying up to 3 times on collision. Only
    /// called as a fallback when `unlink` fails on
    /// `Platform::WindowsFamily`; unsupported (and never called) on
    /// POSIX.
    fn trash(&self, trash_root: &Path, path: &Path) -> Result<()>;
}
