// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

use std::fmt;

/// The logical category of a manifest entry. `Symlink` is a logical
/// category only — the physical realization chosen by the Reconciler can
/// be a POSIX symlink, a hard link, or an NTFS directory junction,
/// depending on the active [`crate::path_ops::LinkAlgorithm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileKind::Regular => "regular file",
            FileKind::Directory => "directory",
            FileKind::Symlink => "symlink",
        };
        f.write_str(s)
    }
}

/// A single node of the desired runfiles tree: `(RelativePath, FileKind,
/// Option<TargetPath>)`, with the path itself used as the map key in
/// [`crate::desired_state::DesiredState`] rather than stored inline.
///
/// `target` is populated iff `kind == FileKind::Symlink`; it is the
/// literal string observed in the manifest (or, for an on-disk entry
/// under scan, the literal bytes returned by `readlink`). No
/// normalization of separators, case, or `..`/`.` components happens
/// here — the string is preserved verbatim, with normalization confined
/// to equivalence checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: FileKind,
    pub target: Option<String>,
}

impl Entry {
    pub fn directory() -> Self {
        Entry { kind: FileKind::Directory, target: None }
    }

    pub fn regular() -> Self {
        Entry { kind: FileKind::Regular, target: None }
    }

    pub fn symlink(target: impl Into<String>) -> Self {
        Entry { kind: FileKind::Symlink, target: Some(target.into()) }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, FileKind::Directory)
    }
}
