//! Static filesystem
//!
//! A tree built once from a [`TreeSpec`] supplied by the host. Files are
//! inline text, command implementations, or remote references. Only the
//! directories the spec marks writeable accept new files, and nothing
//! written here survives the process.

use super::handle::{FileHandle, OpenMode};
use super::mount::FsType;
use super::node::{Content, Node, NodeRef};
use super::tree::{Tree, TreeSpec};
use super::Backend;
use crate::error::FsResult;

pub struct StaticFs {
    tree: Tree,
}

impl StaticFs {
    pub fn new(spec: &TreeSpec) -> Self {
        Self {
            tree: Tree::new(spec.build()),
        }
    }

    /// Empty read-only root, used when nothing else is mounted at `/`
    pub fn empty() -> Self {
        Self {
            tree: Tree::empty(false),
        }
    }
}

impl Backend for StaticFs {
    fn fs_type(&self) -> FsType {
        FsType::Jfs
    }

    fn get(&self, path: &str) -> FsResult<NodeRef> {
        self.tree.walk(path)
    }

    fn create(&self, path: &str) -> FsResult<NodeRef> {
        self.tree.create(path, Node::empty_file())
    }

    fn open(&self, path: &str, mode: OpenMode) -> FileHandle {
        self.tree.open(path, mode, None)
    }

    fn chmod(&self, path: &str, mode: &str) -> bool {
        self.tree.chmod(path, mode)
    }

    fn list_backing_store(&self) -> Vec<String> {
        remote_locations(self.tree.root())
    }
}

/// Locations of every remote file under `node`
pub(crate) fn remote_locations(node: &NodeRef) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![node.clone()];
    while let Some(node) = stack.pop() {
        match &*node.borrow() {
            Node::Directory(dir) => stack.extend(dir.children.values().cloned()),
            Node::File(file) => {
                if let Content::RemoteReference(remote) = &file.content {
                    found.push(remote.location().to_string());
                }
            }
        }
    }
    found.sort();
    found
}
