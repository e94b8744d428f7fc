// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

use std::io::{BufRead, Write};

use super::{is_absolute_target, Entry};
use crate::desired_state::DesiredState;
use crate::error::{Error, Result};

/// `allow_relative` and `use_metadata` flags controlling how manifest
/// lines are validated and consumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub allow_relative: bool,
    pub use_metadata: bool,
}

/// Reads a runfiles manifest into a [`DesiredState`], while streaming
/// every line it reads — including skipped metadata lines — into the
/// archive writer verbatim, so the caller ends up with a byte-identical
/// copy at `MANIFEST.tmp` once parsing completes successfully.
pub struct ManifestParser;

impl ManifestParser {
    /// Parse `reader` according to `options`, writing every line read
    /// to `archive` as it goes. On any malformed line the function
    /// returns `Err` immediately; the archive writer will hold a
    /// truncated but byte-faithful prefix of the input, which is
    /// discarded by the caller since the whole run aborts.
    pub fn parse<R: BufRead, W: Write>(
        mut reader: R,
        archive: &mut W,
        options: &ParseOptions,
    ) -> Result<DesiredState> {
        let mut state = DesiredState::new();
        let mut raw = Vec::new();
        let mut line_no = 0usize;

        loop {
            raw.clear();
            let read = reader
                .read_until(b'\n', &mut raw)
                .map_err(|source| Error::filesystem("<manifest>", source))?;
            if read == 0 {
                break;
            }
            line_no += 1;

            if raw.last() != Some(&b'\n') {
                return Err(Error::Parse {
                    line: line_no,
                    message: format!(
                        "missing trailing newline: '{}'",
                        String::from_utf8_lossy(&raw)
                    ),
                });
            }

            archive
                .write_all(&raw)
                .map_err(|source| Error::filesystem("MANIFEST.tmp", source))?;

            if options.use_metadata && line_no % 2 == 0 {
                continue;
            }

            let text = std::str::from_utf8(&raw[..raw.len() - 1]).map_err(|_| Error::Parse {
                line: line_no,
                message: "line is not valid UTF-8".to_string(),
            })?;

            Self::parse_line(text, line_no, options, &mut state)?;
        }

        Ok(state)
    }

    fn parse_line(
        text: &str,
        line_no: usize,
        options: &ParseOptions,
        state: &mut DesiredState,
    ) -> Result<()> {
        let delimiter = text.find(' ').ok_or_else(|| Error::Parse {
            line: line_no,
            message: "missing field delimiter".to_string(),
        })?;
        let (relpath, target) = (&text[..delimiter], &text[delimiter + 1..]);

        if target.contains(' ') {
            return Err(Error::Parse {
                line: line_no,
                message: format!("unexpected extra field: '{text}'"),
            });
        }
        if relpath.is_empty() {
            return Err(Error::Parse {
                line: line_no,
                message: "relative path must not be empty".to_string(),
            });
        }
        if relpath.starts_with('/') {
            return Err(Error::Parse {
                line: line_no,
                message: "paths must not be absolute".to_string(),
            });
        }
        if !target.is_empty() && !options.allow_relative && !is_absolute_target(target) {
            return Err(Error::Parse {
                line: line_no,
                message: format!("relative target '{target}' is not allowed without --allow_relative"),
            });
        }

        let entry = if target.is_empty() {
            Entry::regular()
        } else {
            Entry::symlink(target)
        };

        state.insert(relpath.to_string(), entry).map_err(|conflict| Error::Parse {
            line: line_no,
            message: format!(
                "'{}' was already declared as a {} and cannot also be an ancestor directory",
                conflict.path, conflict.earlier_kind
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::manifest::FileKind;

    fn parse(input: &str, options: ParseOptions) -> Result<(DesiredState, Vec<u8>)> {
        let mut archive = Vec::new();
        let state = ManifestParser::parse(input.as_bytes(), &mut archive, &options)?;
        Ok((state, archive))
    }

    #[test]
    fn empty_manifest_produces_empty_state() {
        let (state, archive) = parse("", ParseOptions::default()).unwrap();
        assert!(state.is_empty());
        assert!(archive.is_empty());
    }

    #[test]
    fn symlink_line() {
        let (state, archive) = parse(
            "foo/bar /etc/hosts\n",
            ParseOptions::default(),
        )
        .unwrap();
        let entry = state.get("foo/bar").unwrap();
        assert_eq!(entry.kind, FileKind::Symlink);
        assert_eq!(entry.target.as_deref(), Some("/etc/hosts"));
        assert_eq!(state.get("foo").unwrap().kind, FileKind::Directory);
        assert_eq!(archive, b"foo/bar /etc/hosts\n");
    }

    #[test]
    fn empty_target_is_a_regular_file() {
        let (state, _) = parse("touched \n", ParseOptions::default()).unwrap();
        assert_eq!(state.get("touched").unwrap().kind, FileKind::Regular);
    }

    #[rstest]
    #[case::missing_delimiter("no space line\n", "missing field delimiter at line 1")]
    #[case::absolute_relpath("/etc/x /tmp/y\n", "paths must not be absolute")]
    #[case::ancestor_demotion("a /x\na/b /y\n", "already declared")]
    #[case::missing_trailing_newline("foo /bar", "missing trailing newline")]
    fn malformed_manifest_is_rejected(#[case] input: &str, #[case] expected_message: &str) {
        let err = parse(input, ParseOptions::default()).unwrap_err();
        assert!(
            err.to_string().contains(expected_message),
            "expected '{}' to contain '{expected_message}'",
            err
        );
    }

    #[test]
    fn relative_target_requires_flag() {
        let err = parse("foo bar\n", ParseOptions::default()).unwrap_err();
        assert!(err.to_string().contains("not allowed without --allow_relative"));

        let (state, _) = parse(
            "foo bar\n",
            ParseOptions { allow_relative: true, use_metadata: false },
        )
        .unwrap();
        assert_eq!(state.get("foo").unwrap().target.as_deref(), Some("bar"));
    }

    #[test]
    fn metadata_lines_are_skipped_but_archived() {
        let (state, archive) = parse(
            "real/path /abs\nmetadata opaque junk\nother /abs2\n",
            ParseOptions { allow_relative: false, use_metadata: true },
        )
        .unwrap();
        assert!(state.get("real/path").is_some());
        assert!(state.get("other").is_some());
        assert!(state.get("metadata").is_none());
        assert_eq!(
            archive,
            b"real/path /abs\nmetadata opaque junk\nother /abs2\n".to_vec()
        );
    }
}
