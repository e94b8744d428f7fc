// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

//! Progress/observation hooks for [`super::Reconciler`], modeled on
//! `spfs`'s `RenderReporter` (`storage/fs/render_reporter.rs`): a small
//! `Send + Sync` trait with no-op defaults, so the traversal logic never
//! needs to special-case whether anyone is listening.
//!
//! Kept as a separate module (rather than inline in [`super::Reconciler`])
//! so alternative reporters can be swapped in without touching the
//! traversal code itself.

use crate::manifest::Entry;

pub trait ReconcileReporter: Send + Sync {
    /// Phase A is about to classify `path` against `DesiredState`.
    fn visit_entry(&self, _path: &str) {}
    /// Phase A kept `path` because it was already correct.
    fn entry_kept(&self, _path: &str) {}
    /// Phase A deleted `path` because it did not match `desired` (or had
    /// no desired counterpart at all).
    fn entry_pruned(&self, _path: &str, _desired: Option<&Entry>) {}
    /// Phase B created `path` to realize `desired`.
    fn entry_created(&self, _path: &str, _desired: &Entry) {}
}

#[derive(Default)]
pub struct SilentReporter;
impl ReconcileReporter for SilentReporter {}

/// The default reporter: every callback is a `tracing` event at
/// `trace` level, matching how `spfs` logs rendering decisions.
#[derive(Default)]
pub struct TracingReporter;

impl ReconcileReporter for TracingReporter {
    fn visit_entry(&self, path: &str) {
        tracing::trace!(path, "visiting");
    }

    fn entry_kept(&self, path: &str) {
        tracing::debug!(path, "already correct, keeping");
    }

    fn entry_pruned(&self, path: &str, desired: Option<&Entry>) {
        match desired {
            Some(entry) => tracing::debug!(path, desired = %entry.kind, "mismatched, pruning"),
            None => tracing::debug!(path, "extraneous, pruning"),
        }
    }

    fn entry_created(&self, path: &str, desired: &Entry) {
        tracing::debug!(path, kind = %desired.kind, "created");
    }
}
