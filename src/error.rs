// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

use std::fmt;
use std::io;
use std::path::PathBuf;

/// The kind of failure that aborted a run, independent of the message
/// text. Every variant here maps to exit code 1 (spec does not vary the
/// exit code by kind) but scenario tests assert on the kind directly.
#[derive(Debug)]
pub enum Error {
    /// Wrong argc or an unrecognized flag.
    Argument(String),
    /// A manifest line could not be parsed.
    Parse { line: usize, message: String },
    /// The input manifest could not be opened for reading.
    MissingInput { path: PathBuf, source: io::Error },
    /// Any other syscall failure encountered while reconciling the tree.
    Filesystem { path: PathBuf, source: io::Error },
    /// A filesystem failure that already carries a raw errno, without an
    /// associated `io::Error` (e.g. surfaced from `nix` or `libc`).
    Errno { path: PathBuf, errno: i32, message: String },
    /// `trash()` exhausted its retries after `unlink` reported the file
    /// was still busy.
    WindowsBusy { path: PathBuf, attempts: u32 },
    /// The link-algorithm selection in Phase B fell through to a branch
    /// that should be unreachable. Guards against future code changes
    /// silently dropping a case.
    LinkAlgorithm(String),
}

impl Error {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem { path: path.into(), source }
    }

    pub fn errno(path: impl Into<PathBuf>, errno: i32, message: impl Into<String>) -> Self {
        Error::Errno { path: path.into(), errno, message: message.into() }
    }

    /// The raw OS error number behind this failure, if any. Used by
    /// Driver to render the `: <strerror> [<errno>]` suffix appended to
    /// errno-bearing failures.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::MissingInput { source, .. } | Error::Filesystem { source, .. } => {
                source.raw_os_error()
            }
            Error::Errno { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Argument(msg) => write!(f, "{msg}"),
            Error::Parse { line, message } => {
                write!(f, "{message} at line {line}")
            }
            Error::MissingInput { path, source } => {
                write!(f, "could not open manifest '{}': {source}", path.display())
            }
            Error::Filesystem { path, source } => {
                write!(f, "'{}': {source}", path.display())
            }
            Error::Errno { path, message, .. } => {
                write!(f, "'{}': {message}", path.display())
            }
            Error::WindowsBusy { path, attempts } => {
                write!(f, "'{}' could not be removed or trashed after {attempts} attempts", path.display())
            }
            Error::LinkAlgorithm(msg) => write!(f, "internal error selecting link algorithm: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MissingInput { source, .. } | Error::Filesystem { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
