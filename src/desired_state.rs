// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

//! The canonical map from relative path to expected [`Entry`], populated
//! by [`crate::manifest::parser::ManifestParser`] and drained by
//! [`crate::reconcile::Reconciler`].

use std::collections::BTreeMap;

use crate::manifest::{ancestors, Entry, FileKind};

/// The reserved archive path. Always forced to `FileKind::Regular` so
/// the prune pass never deletes the manifest it is in the middle of
/// writing.
pub const MANIFEST_NAME: &str = "MANIFEST";
pub const MANIFEST_TMP_NAME: &str = "MANIFEST.tmp";

/// An error raised when a manifest line would demote an already-known
/// ancestor directory to a non-directory kind. Rejected outright rather
/// than silently assumed safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorConflict {
    pub path: String,
    pub earlier_kind: FileKind,
}

/// Ordered by path string, which is equivalent to lexicographic order
/// over `/`-separated components: a path is always byte-wise less than
/// any of its descendants, so iterating a `BTreeMap` in key order visits
/// every directory before the entries nested under it. This ordering is
/// what lets the create pass walk directories before their children.
#[derive(Debug, Default)]
pub struct DesiredState {
    entries: BTreeMap<String, Entry>,
}

impl DesiredState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys_shallow_first(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Force-insert the archived manifest's in-progress path as a
    /// regular file so it is never classified as extraneous while it is
    /// still being written.
    pub fn reserve_manifest_tmp(&mut self) {
        self.entries.insert(MANIFEST_TMP_NAME.to_string(), Entry::regular());
    }

    /// Insert a leaf entry and synthesize any missing ancestor
    /// directories, stopping parent-walking at the first ancestor
    /// already present.
    ///
    /// Returns an [`AncestorConflict`] if an ancestor is already present
    /// with a non-directory kind — a manifest that declares both `a` and
    /// `a/b` is ill-formed.
    pub fn insert(&mut self, path: String, entry: Entry) -> Result<(), AncestorConflict> {
        if let Some(existing) = self.entries.get(&path) {
            if existing.is_directory() && !entry.is_directory() {
                return Err(AncestorConflict {
                    path,
                    earlier_kind: FileKind::Directory,
                });
            }
        }
        for ancestor in ancestors(&path) {
            match self.entries.get(ancestor) {
                Some(existing) if existing.is_directory() => break,
                Some(existing) => {
                    return Err(AncestorConflict {
                        path: ancestor.to_string(),
                        earlier_kind: existing.kind,
                    });
                }
                None => {
                    self.entries.insert(ancestor.to_string(), Entry::directory());
                }
            }
        }
        self.entries.insert(path, entry);
        Ok(())
    }
}
