//! Scratch filesystem
//!
//! Starts as an empty writeable directory and lives as long as the shell.

use super::handle::{FileHandle, OpenMode};
use super::mount::FsType;
use super::node::{Node, NodeRef};
use super::tree::Tree;
use super::Backend;
use crate::error::FsResult;

pub struct TmpFs {
    tree: Tree,
}

impl TmpFs {
    pub fn new() -> Self {
        Self {
            tree: Tree::empty(true),
        }
    }
}

impl Default for TmpFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for TmpFs {
    fn fs_type(&self) -> FsType {
        FsType::Tmpfs
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
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let fs = TmpFs::new();
        let mut out = fs.open("/notes", OpenMode::Overwrite);
        out.write("hello").unwrap();
        out.close().unwrap();

        let input = fs.open("/notes", OpenMode::Read);
        assert_eq!(input.read().unwrap(), "hello\n");
    }

    #[test]
    fn test_chmod_locks_directory() {
        let fs = TmpFs::new();
        assert!(fs.chmod("/", "-w"));
        assert!(fs.create("/x").is_err());
        assert!(fs.open("/y", OpenMode::Append).is_error());
    }
}
