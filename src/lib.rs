// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

//! Reconciles an on-disk directory tree to match a runfiles manifest:
//! parses a manifest describing the desired tree, prunes whatever is
//! already on disk down to what matches, then creates the rest.

pub mod desired_state;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod path_ops;
pub mod reconcile;
