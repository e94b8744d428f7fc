// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

//! Reconciles an on-disk directory tree against a [`DesiredState`] in two
//! passes: [`Reconciler::scan_and_prune`] walks what already exists and
//! deletes anything that does not match, then [`Reconciler::create_files`]
//! walks the remaining entries in shallow-first order and creates them.

pub mod reporter;

use std::path::{Path, PathBuf};

use crate::desired_state::DesiredState;
use crate::manifest::{Entry, FileKind};
use crate::path_ops::{ActualKind, HardlinkEquivalence, LinkAlgorithm, PathOps, Platform};

pub use reporter::{ReconcileReporter, SilentReporter, TracingReporter};

/// Drives the two-phase walk over `root` using `ops` for every filesystem
/// mutation, so the same traversal logic runs unmodified against a real
/// POSIX tree, a real Windows-family tree, or an in-memory fake in tests.
pub struct Reconciler<'a> {
    ops: &'a dyn PathOps,
    reporter: &'a dyn ReconcileReporter,
    root: PathBuf,
    link_algorithm: LinkAlgorithm,
    hardlink_equivalence: HardlinkEquivalence,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        ops: &'a dyn PathOps,
        reporter: &'a dyn ReconcileReporter,
        root: impl Into<PathBuf>,
        link_algorithm: LinkAlgorithm,
        hardlink_equivalence: HardlinkEquivalence,
    ) -> Self {
        Self { ops, reporter, root: root.into(), link_algorithm, hardlink_equivalence }
    }

    fn full_path(&self, relpath: &str) -> PathBuf {
        self.root.join(relpath)
    }

    /// Phase A: recursively visit every entry already on disk under
    /// `root`, relative to `root`. An entry that matches `desired`
    /// exactly is left alone and removed from `desired` so Phase B does
    /// not try to recreate it; everything else — extraneous entries and
    /// mismatched ones — is deleted so Phase B starts from a clean slate.
    pub fn scan_and_prune(&self, desired: &mut DesiredState) -> crate::error::Result<()> {
        self.scan_dir(Path::new(""), desired)
    }

    fn scan_dir(&self, relpath: &Path, desired: &mut DesiredState) -> crate::error::Result<()> {
        let full = self.full_path(&relpath.to_string_lossy());
        let children = self.ops.iter_dir(&full)?;

        for child in children {
            let child_rel = if relpath.as_os_str().is_empty() {
                PathBuf::from(&child.name)
            } else {
                relpath.join(&child.name)
            };
            let child_rel_str = child_rel.to_string_lossy().replace('\\', "/");
            self.reporter.visit_entry(&child_rel_str);

            let actual = match child.dtype {
                Some(kind) => kind,
                None => match self.ops.lstat(&self.full_path(&child_rel_str))? {
                    Some(kind) => kind,
                    None => continue,
                },
            };

            let desired_entry = desired.get(&child_rel_str).cloned();
            let is_directory_match =
                actual == ActualKind::Directory && matches!(&desired_entry, Some(e) if e.is_directory());

            if is_directory_match {
                // Directories are matched by kind alone; recurse before
                // deciding whether to keep this exact entry so children
                // can still be pruned independently.
                self.scan_dir(&child_rel, desired)?;
                desired.remove(&child_rel_str);
                self.reporter.entry_kept(&child_rel_str);
                continue;
            }

            let keep = match &desired_entry {
                Some(entry) => self.already_correct(&child_rel_str, actual, entry)?,
                None => false,
            };

            if keep {
                desired.remove(&child_rel_str);
                self.reporter.entry_kept(&child_rel_str);
                continue;
            }

            if actual == ActualKind::Directory {
                // A directory that is not wanted as a directory: recurse
                // to empty it before removing, since `rmdir` requires an
                // empty directory.
                self.scan_dir(&child_rel, &mut DesiredState::new())?;
            }

            self.reporter.entry_pruned(&child_rel_str, desired_entry.as_ref());
            self.remove_entry(&child_rel_str, actual)?;
        }

        Ok(())
    }

    /// Whether the on-disk entry at `relpath` already satisfies `desired`
    /// without any changes. Directories are handled by the caller before
    /// this is reached; this only judges regular files and the various
    /// physical realizations of a logical symlink.
    fn already_correct(&self, relpath: &str, actual: ActualKind, desired: &Entry) -> crate::error::Result<bool> {
        match (self.ops.platform(), desired.kind) {
            (_, FileKind::Regular) => Ok(actual == ActualKind::Regular),
            (_, FileKind::Directory) => Ok(actual == ActualKind::Directory),
            (Platform::Posix, FileKind::Symlink) => {
                if actual != ActualKind::Symlink {
                    return Ok(false);
                }
                let current = self.ops.read_link(&self.full_path(relpath))?;
                let wanted = desired.target.as_deref().unwrap_or("");
                Ok(current == wanted)
            }
            (Platform::WindowsFamily, FileKind::Symlink) => {
                self.windows_symlink_matches(relpath, actual, desired)
            }
        }
    }

    /// On Windows-family hosts a logical symlink is realized as either a
    /// directory junction (target is a directory) or a hardlink (target
    /// is a file), chosen by `stat`-ing the desired target. A junction
    /// is compared by its stored target path, normalized for separator
    /// and drive-letter case; a hardlink is compared by whether its
    /// target name currently appears among the file's hardlink names,
    /// with the exact rule depending on `hardlink_equivalence`.
    fn windows_symlink_matches(
        &self,
        relpath: &str,
        actual: ActualKind,
        desired: &Entry,
    ) -> crate::error::Result<bool> {
        let target = desired.target.as_deref().unwrap_or("");
        let full = self.full_path(relpath);
        let target_is_dir = self.ops.stat_is_dir(Path::new(target)).unwrap_or(false);

        if target_is_dir {
            if actual != ActualKind::Directory {
                return Ok(false);
            }
            let current = self.ops.read_link(&full)?;
            Ok(normalize_windows(&current.to_string_lossy()) == normalize_windows(target))
        } else {
            if actual != ActualKind::Regular {
                return Ok(false);
            }
            let names = self.ops.hardlink_names(&full)?;
            match self.hardlink_equivalence {
                HardlinkEquivalence::Strong => {
                    let wanted = normalize_windows(target);
                    Ok(names.iter().any(|n| normalize_windows(&n.to_string_lossy()) == wanted))
                }
                HardlinkEquivalence::Weak => Ok(!names.is_empty()),
            }
        }
    }

    fn remove_entry(&self, relpath: &str, actual: ActualKind) -> crate::error::Result<()> {
        let full = self.full_path(relpath);
        let primary = if actual == ActualKind::Directory { self.ops.rmdir(&full) } else { self.ops.unlink(&full) };
        match primary {
            Ok(()) => Ok(()),
            Err(_err) if self.ops.platform() == Platform::WindowsFamily => {
                // `unlink`/`rmdir` failing on a Windows-family host usually
                // means the file is still held open; fall back to moving
                // it into the trash directory. If the trash fallback also
                // fails, its own error is what must surface — it is the
                // one carrying the "could not be removed or trashed"
                // diagnostic, not the original unlink/rmdir failure.
                self.ops.trash(&self.root, &full)
            }
            Err(err) => Err(err),
        }
    }

    /// Phase B: create every entry remaining in `desired` (those Phase A
    /// did not find already correct), in shallow-first order so parent
    /// directories always exist before their children are created.
    pub fn create_files(&self, desired: &DesiredState) -> crate::error::Result<()> {
        for relpath in desired.keys_shallow_first() {
            let entry = desired.get(relpath).expect("key came from this map");
            self.create_entry(relpath, entry)?;
            self.reporter.entry_created(relpath, entry);
        }
        Ok(())
    }

    fn create_entry(&self, relpath: &str, entry: &Entry) -> crate::error::Result<()> {
        let full = self.full_path(relpath);
        match entry.kind {
            FileKind::Directory => self.ops.ensure_dir(&full, 0o777),
            FileKind::Regular => self.ops.create_file_exclusive(&full, 0o555),
            FileKind::Symlink => self.create_symlink(&full, entry.target.as_deref().unwrap_or("")),
        }
    }

    fn create_symlink(&self, link_path: &Path, target: &str) -> crate::error::Result<()> {
        match self.link_algorithm {
            LinkAlgorithm::Posix => self.ops.make_symlink(target, link_path),
            LinkAlgorithm::WindowsCompatible => {
                let target_path = Path::new(target);
                let target_is_dir = self.ops.stat_is_dir(target_path).unwrap_or(false);
                if target_is_dir {
                    self.ops.make_junction(target_path, link_path)
                } else {
                    self.ops.make_hardlink(target_path, link_path)
                }
            }
        }
    }
}

/// Normalize a Windows path for equality comparison: backslashes become
/// forward slashes, and only the drive-letter prefix (`C:`) is
/// lowercased, since NTFS paths are case-insensitive there but the rest
/// of a junction target is not reliably so.
fn normalize_windows(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let bytes = unified.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let mut out = String::with_capacity(unified.len());
        out.push(bytes[0].to_ascii_lowercase() as char);
        out.push(':');
        out.push_str(&unified[2..]);
        out
    } else {
        unified
    }
}
