// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::fcntl::{self, OFlag};
use nix::sys::stat::{self, FchmodatFlags, Mode, SFlag};
use nix::unistd::{self, LinkatFlags, UnlinkatFlags};

use super::{ActualKind, DirChild, Platform};
use crate::error::{Error, Result};

const ALLPERMS: u32 = 0o7777;

/// The POSIX implementation of [`super::PathOps`]: plain symlinks, real
/// hardlinks, no junctions, no trash fallback. Mutating calls go through
/// `nix` so every failure carries the syscall's errno.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixOps;

fn io_err(path: &Path, source: std::io::Error) -> Error {
    Error::filesystem(path, source)
}

fn nix_err(path: &Path, source: nix::Error) -> Error {
    Error::errno(path, source as i32, source.desc())
}

impl super::PathOps for UnixOps {
    fn platform(&self) -> Platform {
        Platform::Posix
    }

    fn lstat(&self, path: &Path) -> Result<Option<ActualKind>> {
        match stat::lstat(path) {
            Ok(stat) => Ok(Some(kind_of_mode(stat.st_mode))),
            Err(nix::Error::ENOENT) => Ok(None),
            Err(err) => Err(nix_err(path, err)),
        }
    }

    fn stat_is_dir(&self, path: &Path) -> Result<bool> {
        stat::stat(path).map(|s| (s.st_mode & SFlag::S_IFMT.bits()) == SFlag::S_IFDIR.bits()).map_err(|err| nix_err(path, err))
    }

    fn read_link(&self, path: &Path) -> Result<OsString> {
        std::fs::read_link(path)
            .map(|p| p.into_os_string())
            .map_err(|err| io_err(path, err))
    }

    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<()> {
        match unistd::mkdir(path, Mode::from_bits_truncate(mode & ALLPERMS)) {
            Ok(()) => {}
            Err(nix::Error::EEXIST) => {}
            Err(err) => return Err(nix_err(path, err)),
        }
        self.ensure_mode(path, mode & ALLPERMS)
    }

    fn ensure_mode(&self, path: &Path, required_bits: u32) -> Result<()> {
        let meta = std::fs::metadata(path).map_err(|err| io_err(path, err))?;
        let current = meta.permissions().mode() & ALLPERMS;
        let required_bits = required_bits & ALLPERMS;
        if current & required_bits != required_bits {
            let updated = current | required_bits;
            stat::fchmodat(None, path, Mode::from_bits_truncate(updated), FchmodatFlags::FollowSymlink)
                .map_err(|err| nix_err(path, err))?;
        }
        Ok(())
    }

    fn make_symlink(&self, target: &str, link_path: &Path) -> Result<()> {
        unistd::symlinkat(target, None, link_path).map_err(|err| nix_err(link_path, err))
    }

    fn make_hardlink(&self, existing: &Path, link_path: &Path) -> Result<()> {
        unistd::linkat(None, existing, None, link_path, LinkatFlags::NoSymlinkFollow)
            .map_err(|err| nix_err(link_path, err))
    }

    fn create_file_exclusive(&self, path: &Path, mode: u32) -> Result<()> {
        let mode = mode & ALLPERMS;
        let fd = fcntl::open(path, OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_EXCL, Mode::from_bits_truncate(mode))
            .map_err(|err| nix_err(path, err))?;
        unistd::close(fd).map_err(|err| nix_err(path, err))?;
        // `open`'s mode argument is masked by the process umask, so a
        // caller asking for e.g. 0555 can still end up with narrower
        // bits. Force the exact mode afterward.
        stat::fchmodat(None, path, Mode::from_bits_truncate(mode), FchmodatFlags::FollowSymlink)
            .map_err(|err| nix_err(path, err))
    }

    fn make_junction(&self, _target_dir: &Path, link_path: &Path) -> Result<()> {
        // Directory junctions are an NTFS reparse-point concept; there is
        // nothing for a POSIX host to create here. `--windows_compatible`
        // is only meaningful when run under Windows-family `PathOps`.
        Err(Error::LinkAlgorithm(format!(
            "cannot create a directory junction for {} on a POSIX host",
            link_path.display()
        )))
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        unistd::unlink(path).map_err(|err| nix_err(path, err))
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        unistd::unlinkat(None, path, UnlinkatFlags::RemoveDir).map_err(|err| nix_err(path, err))
    }

    fn rename(&self, old: &Path, new: &Path) -> Result<()> {
        fcntl::renameat(None, old, None, new).map_err(|err| nix_err(new, err))
    }

    fn iter_dir(&self, path: &Path) -> Result<Vec<DirChild>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path).map_err(|err| io_err(path, err))? {
            let entry = entry.map_err(|err| io_err(path, err))?;
            let dtype = entry.file_type().ok().map(|ft| {
                if ft.is_symlink() {
                    ActualKind::Symlink
                } else if ft.is_dir() {
                    ActualKind::Directory
                } else {
                    ActualKind::Regular
                }
            });
            out.push(DirChild { name: entry.file_name(), dtype });
        }
        Ok(out)
    }

    fn hardlink_names(&self, _path: &Path) -> Result<Vec<OsString>> {
        // Never invoked: `already_correct` only consults hardlink names
        // under `Platform::WindowsFamily`, which `UnixOps` never reports.
        Ok(Vec::new())
    }

    fn trash(&self, _trash_root: &Path, path: &Path) -> Result<()> {
        Err(Error::filesystem(
            path,
            std::io::Error::new(std::io::ErrorKind::Unsupported, "trash is windows-family only"),
        ))
    }
}

fn kind_of_mode(mode: nix::libc::mode_t) -> ActualKind {
    let masked = mode & SFlag::S_IFMT.bits();
    if masked == SFlag::S_IFLNK.bits() {
        ActualKind::Symlink
    } else if masked == SFlag::S_IFDIR.bits() {
        ActualKind::Directory
    } else {
        ActualKind::Regular
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::super::PathOps;
    use super::*;

    #[fixture]
    fn tmp_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    #[case::adds_missing_bits(0o600, 0o700, 0o700)]
    #[case::preserves_unrelated_bits(0o620, 0o100, 0o720)]
    #[case::already_satisfied_is_a_no_op(0o755, 0o700, 0o755)]
    fn ensure_mode(tmp_dir: TempDir, #[case] initial: u32, #[case] required: u32, #[case] expected: u32) {
        let path = tmp_dir.path().join("f");
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(initial)).unwrap();

        UnixOps.ensure_mode(&path, required).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & ALLPERMS;
        assert_eq!(mode, expected);
    }

    #[rstest]
    fn lstat_reports_symlink_without_following(tmp_dir: TempDir) {
        let target = tmp_dir.path().join("target");
        std::fs::write(&target, b"").unwrap();
        let link = tmp_dir.path().join("link");
        symlink(&target, &link).unwrap();

        assert_eq!(UnixOps.lstat(&link).unwrap(), Some(ActualKind::Symlink));
        assert_eq!(UnixOps.lstat(&target).unwrap(), Some(ActualKind::Regular));
        assert_eq!(UnixOps.lstat(&tmp_dir.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn create_file_exclusive_fails_if_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        UnixOps.create_file_exclusive(&path, 0o644).unwrap();
        assert!(UnixOps.create_file_exclusive(&path, 0o644).is_err());
    }
}
