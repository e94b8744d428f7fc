// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

//! A small immutable diagnostic context, threaded through [`crate::driver::Driver`]
//! and [`crate::reconcile::Reconciler`] instead of the process-wide globals
//! (`argv0`, `input_filename`, `output_base_dir`) that the original tool
//! kept at file scope for its error macros.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Identifies the invocation for the purpose of error prefixes. Built
/// once by [`crate::driver::Driver`] at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    argv0: String,
    input: PathBuf,
    runfiles: PathBuf,
}

impl Diagnostics {
    pub fn new(argv0: impl Into<String>, input: impl Into<PathBuf>, runfiles: impl Into<PathBuf>) -> Self {
        Self {
            argv0: argv0.into(),
            input: input.into(),
            runfiles: runfiles.into(),
        }
    }

    fn prefix(&self) -> String {
        format!(
            "{} (args {} {}): ",
            self.argv0,
            self.input.display(),
            self.runfiles.display()
        )
    }

    /// Render an error for display: the invocation prefix, the error's
    /// own message, and for errno-bearing failures a trailing
    /// `: <strerror> [<errno>]`.
    pub fn render(&self, err: &Error) -> String {
        let mut msg = format!("{}{}", self.prefix(), err);
        if let Some(errno) = err.raw_os_error() {
            let strerror = unsafe {
                let ptr = libc::strerror(errno);
                std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
            };
            msg.push_str(&format!(": {strerror} [{errno}]"));
        }
        msg
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn runfiles(&self) -> &Path {
        &self.runfiles
    }
}
