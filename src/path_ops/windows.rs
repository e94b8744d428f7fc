// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

use std::ffi::OsString;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, ERROR_HANDLE_EOF, ERROR_MORE_DATA, HANDLE};
use windows::Win32::Storage::FileSystem::{
    FindClose, FindFirstFileNameW, FindNextFileNameW,
};

use super::{ActualKind, DirChild, Platform};
use crate::error::{Error, Result};

const TRASH_DIR_NAME: &str = "bazel-trash";
const TRASH_RETRIES: u32 = 3;

/// The Windows-family implementation of [`super::PathOps`]: hardlinks
/// and directory junctions stand in for symlinks, and `unlink` falls
/// back to moving the file into `bazel-trash` when the kernel still
/// holds it open.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsOps;

fn io_err(path: &Path, source: std::io::Error) -> Error {
    Error::filesystem(path, source)
}

fn to_wide(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
}

impl super::PathOps for WindowsOps {
    fn platform(&self) -> Platform {
        Platform::WindowsFamily
    }

    fn lstat(&self, path: &Path) -> Result<Option<ActualKind>> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                let ft = meta.file_type();
                let kind = if ft.is_symlink() {
                    ActualKind::Symlink
                } else if ft.is_dir() {
                    ActualKind::Directory
                } else {
                    ActualKind::Regular
                };
                Ok(Some(kind))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn stat_is_dir(&self, path: &Path) -> Result<bool> {
        std::fs::metadata(path).map(|m| m.is_dir()).map_err(|err| io_err(path, err))
    }

    fn read_link(&self, path: &Path) -> Result<OsString> {
        std::fs::read_link(path).map(|p| p.into_os_string()).map_err(|err| io_err(path, err))
    }

    fn ensure_dir(&self, path: &Path, _mode: u32) -> Result<()> {
        match std::fs::create_dir(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn ensure_mode(&self, path: &Path, _required_bits: u32) -> Result<()> {
        // NTFS ACLs have no direct analogue of POSIX mode bits; creating
        // the directory as the current user is already sufficient for
        // this process to read and write it.
        if !path.exists() {
            return Err(Error::filesystem(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "directory does not exist"),
            ));
        }
        Ok(())
    }

    fn make_symlink(&self, target: &str, link_path: &Path) -> Result<()> {
        // Reachable only if a caller asks for a POSIX-style link on a
        // Windows-family host without `--windows_compatible`.
        if Path::new(target).is_dir() {
            std::os::windows::fs::symlink_dir(target, link_path)
        } else {
            std::os::windows::fs::symlink_file(target, link_path)
        }
        .map_err(|err| io_err(link_path, err))
    }

    fn make_hardlink(&self, existing: &Path, link_path: &Path) -> Result<()> {
        std::fs::hard_link(existing, link_path).map_err(|err| io_err(link_path, err))
    }

    fn make_junction(&self, target_dir: &Path, link_path: &Path) -> Result<()> {
        junction::create(target_dir, link_path).map_err(|err| io_err(link_path, err))
    }

    fn create_file_exclusive(&self, path: &Path, _mode: u32) -> Result<()> {
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(|_| ())
            .map_err(|err| io_err(path, err))
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path).map_err(|err| io_err(path, err))
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir(path).map_err(|err| io_err(path, err))
    }

    fn rename(&self, old: &Path, new: &Path) -> Result<()> {
        std::fs::rename(old, new).map_err(|err| io_err(new, err))
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

    /// Enumerate every hardlink name pointing at the same file as
    /// `path`, via `FindFirstFileNameW`/`FindNextFileNameW`. Names are
    /// returned as absolute paths on the same volume as `path`.
    fn hardlink_names(&self, path: &Path) -> Result<Vec<OsString>> {
        let root = path
            .components()
            .next()
            .map(|c| PathBuf::from(c.as_os_str()))
            .unwrap_or_else(|| PathBuf::from("C:\\"));
        let wide_path = to_wide(path);
        let mut names = Vec::new();
        let mut buf = vec![0u16; 1024];
        let mut len = buf.len() as u32;

        unsafe {
            let handle = match FindFirstFileNameW(PCWSTR(wide_path.as_ptr()), 0, &mut len, buf.as_mut_ptr()) {
                Ok(h) => h,
                Err(err) => return Err(io_err(path, std::io::Error::from_raw_os_error(err.code().0))),
            };
            push_name(&root, &buf, len, &mut names);

            loop {
                len = buf.len() as u32;
                match FindNextFileNameW(handle, &mut len, buf.as_mut_ptr()) {
                    Ok(()) => push_name(&root, &buf, len, &mut names),
                    Err(err) if err.code() == ERROR_HANDLE_EOF.to_hresult() => break,
                    Err(err) if err.code() == ERROR_MORE_DATA.to_hresult() => {
                        buf.resize(len as usize, 0);
                        continue;
                    }
                    Err(err) => {
                        let _ = CloseHandle(handle);
                        return Err(io_err(path, std::io::Error::from_raw_os_error(err.code().0)));
                    }
                }
            }
            let _ = CloseHandle(handle);
        }

        Ok(names)
    }

    fn trash(&self, trash_root: &Path, path: &Path) -> Result<()> {
        let bazel_trash = trash_root.join(TRASH_DIR_NAME);
        self.ensure_dir(&bazel_trash, 0o777)?;

        for _ in 0..TRASH_RETRIES {
            let name = unique_trash_name();
            let destination = bazel_trash.join(name);
            match std::fs::rename(path, &destination) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(io_err(path, err)),
            }
        }

        Err(Error::WindowsBusy { path: path.to_path_buf(), attempts: TRASH_RETRIES })
    }
}

fn push_name(root: &Path, buf: &[u16], len: u32, out: &mut Vec<OsString>) {
    // FindFirstFileNameW/FindNextFileNameW return the length in bytes
    // including the trailing NUL; convert to a u16 count without it.
    let count = (len as usize / 2).saturating_sub(1).min(buf.len());
    let relative = OsString::from_wide(&buf[..count]);
    out.push(root.join(relative).into_os_string());
}

fn unique_trash_name() -> String {
    let ticks = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let rand16: u16 = rand::thread_rng().gen();
    format!("{ticks}-{rand16}")
}
