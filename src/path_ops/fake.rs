// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

//! An in-memory [`super::PathOps`] double, so [`crate::reconcile::Reconciler`]
//! tests can exercise both the POSIX and Windows-family `already_correct`
//! branches on any host.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ActualKind, DirChild, Platform};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Node {
    Directory,
    Regular,
    /// A logical symlink. `hardlink_of` is `Some(id)` when this node was
    /// created via `make_hardlink`, grouping it with every other node
    /// sharing the same backing "inode" for [`FakeOps::hardlink_names`].
    Link { target: String, physical: ActualKind, hardlink_of: Option<u64> },
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    modes: BTreeMap<PathBuf, u32>,
    next_inode: u64,
}

pub struct FakeOps {
    platform: Platform,
    state: Mutex<State>,
}

impl FakeOps {
    pub fn new(platform: Platform) -> Self {
        Self { platform, state: Mutex::new(State::default()) }
    }

    pub fn seed_directory(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().nodes.insert(path.into(), Node::Directory);
    }

    pub fn seed_regular(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().nodes.insert(path.into(), Node::Regular);
    }

    pub fn seed_symlink(&self, path: impl Into<PathBuf>, target: impl Into<String>) {
        self.state.lock().unwrap().nodes.insert(
            path.into(),
            Node::Link { target: target.into(), physical: ActualKind::Symlink, hardlink_of: None },
        );
    }

    /// Seed a hardlink whose backing inode already has `names` pointing
    /// at `target`, simulating the Windows-family "symlink realized as
    /// a hardlink" case.
    pub fn seed_hardlink_group(&self, names: &[&str], target: &str) {
        let mut state = self.state.lock().unwrap();
        let inode = state.next_inode;
        state.next_inode += 1;
        for name in names {
            state.nodes.insert(
                PathBuf::from(name),
                Node::Link {
                    target: target.to_string(),
                    physical: ActualKind::Regular,
                    hardlink_of: Some(inode),
                },
            );
        }
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.state.lock().unwrap().nodes.contains_key(path)
    }
}

impl super::PathOps for FakeOps {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn lstat(&self, path: &Path) -> Result<Option<ActualKind>> {
        let state = self.state.lock().unwrap();
        Ok(state.nodes.get(path).map(|n| match n {
            Node::Directory => ActualKind::Directory,
            Node::Regular => ActualKind::Regular,
            Node::Link { physical, .. } => *physical,
        }))
    }

    fn stat_is_dir(&self, path: &Path) -> Result<bool> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(path) {
            Some(Node::Directory) => Ok(true),
            Some(Node::Link { target, .. }) => Ok(state
                .nodes
                .get(Path::new(target.as_str()))
                .map(|n| matches!(n, Node::Directory))
                .unwrap_or(false)),
            Some(_) => Ok(false),
            None => Err(Error::filesystem(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            )),
        }
    }

    fn read_link(&self, path: &Path) -> Result<OsString> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(path) {
            Some(Node::Link { target, .. }) => Ok(OsString::from(target)),
            _ => Err(Error::filesystem(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a link"),
            )),
        }
    }

    fn ensure_dir(&self, path: &Path, _mode: u32) -> Result<()> {
        self.state.lock().unwrap().nodes.entry(path.to_path_buf()).or_insert(Node::Directory);
        Ok(())
    }

    fn ensure_mode(&self, path: &Path, required_bits: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let mode = state.modes.entry(path.to_path_buf()).or_insert(0o755);
        *mode |= required_bits;
        Ok(())
    }

    fn make_symlink(&self, target: &str, link_path: &Path) -> Result<()> {
        self.state.lock().unwrap().nodes.insert(
            link_path.to_path_buf(),
            Node::Link { target: target.to_string(), physical: ActualKind::Symlink, hardlink_of: None },
        );
        Ok(())
    }

    fn make_hardlink(&self, existing: &Path, link_path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let inode = state.next_inode;
        state.next_inode += 1;
        let target = existing.to_string_lossy().into_owned();
        state.nodes.insert(
            link_path.to_path_buf(),
            Node::Link { target, physical: ActualKind::Regular, hardlink_of: Some(inode) },
        );
        Ok(())
    }

    fn make_junction(&self, target_dir: &Path, link_path: &Path) -> Result<()> {
        self.state.lock().unwrap().nodes.insert(
            link_path.to_path_buf(),
            Node::Link {
                target: target_dir.to_string_lossy().into_owned(),
                physical: ActualKind::Directory,
                hardlink_of: None,
            },
        );
        Ok(())
    }

    fn create_file_exclusive(&self, path: &Path, mode: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.nodes.contains_key(path) {
            return Err(Error::filesystem(
                path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "already exists"),
            ));
        }
        state.nodes.insert(path.to_path_buf(), Node::Regular);
        state.modes.insert(path.to_path_buf(), mode);
        Ok(())
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::filesystem(path, std::io::Error::new(std::io::ErrorKind::NotFound, "missing")))
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        self.unlink(path)
    }

    fn rename(&self, old: &Path, new: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(node) = state.nodes.remove(old) {
            state.nodes.insert(new.to_path_buf(), node);
            Ok(())
        } else {
            Err(Error::filesystem(old, std::io::Error::new(std::io::ErrorKind::NotFound, "missing")))
        }
    }

    fn iter_dir(&self, path: &Path) -> Result<Vec<DirChild>> {
        let state = self.state.lock().unwrap();
        let mut out = Vec::new();
        for (candidate, node) in state.nodes.iter() {
            if candidate.parent() == Some(path) {
                let dtype = Some(match node {
                    Node::Directory => ActualKind::Directory,
                    Node::Regular => ActualKind::Regular,
                    Node::Link { physical, .. } => *physical,
                });
                out.push(DirChild { name: candidate.file_name().unwrap().to_os_string(), dtype });
            }
        }
        Ok(out)
    }

    fn hardlink_names(&self, path: &Path) -> Result<Vec<OsString>> {
        let state = self.state.lock().unwrap();
        let inode = match state.nodes.get(path) {
            Some(Node::Link { hardlink_of: Some(id), .. }) => *id,
            _ => return Ok(Vec::new()),
        };
        Ok(state
            .nodes
            .iter()
            .filter(|(_, n)| matches!(n, Node::Link { hardlink_of: Some(id), .. } if *id == inode))
            .map(|(p, _)| p.clone().into_os_string())
            .collect())
    }

    fn trash(&self, trash_root: &Path, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .remove(path)
            .ok_or_else(|| Error::filesystem(path, std::io::Error::new(std::io::ErrorKind::NotFound, "missing")))?;
        let destination = trash_root.join("bazel-trash").join(format!("{:?}", path));
        state.nodes.insert(destination, node);
        Ok(())
    }
}
