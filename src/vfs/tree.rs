//! Node tree walking, shared by every backend
//!
//! Paths handed to a tree are already resolved and relative to the mount
//! point. Empty and `.` segments are skipped; a walk stops at the first
//! missing child or the first file that is indexed like a directory.

use super::handle::{FileHandle, OpenMode, SyncHook};
use super::node::{Entry, Node, NodeRef, RemoteFile, basename};
use crate::error::{FsError, FsResult};
use crate::shell::command::{Command, Executable};
use std::collections::BTreeMap;
use std::rc::Rc;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Split into (parent, name). The parent of a top-level name is "/".
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", trimmed),
    }
}

/// A rooted node tree
#[derive(Clone)]
pub struct Tree {
    root: NodeRef,
}

impl Tree {
    pub fn new(root: NodeRef) -> Self {
        Self { root }
    }

    /// Tree with an empty root directory
    pub fn empty(writeable: bool) -> Self {
        Self::new(Node::directory(writeable).into_ref())
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Live node at `path`
    pub fn walk(&self, path: &str) -> FsResult<NodeRef> {
        let mut current = self.root.clone();
        let mut walked = String::new();
        for segment in segments(path) {
            let next = match &*current.borrow() {
                Node::Directory(dir) => match dir.children.get(segment) {
                    Some(child) => child.clone(),
                    None => return Err(FsError::NotFound(path.to_string())),
                },
                Node::File(_) => {
                    let at = if walked.is_empty() { "/" } else { &walked };
                    return Err(FsError::NotADirectory(at.to_string()));
                }
            };
            walked.push('/');
            walked.push_str(segment);
            current = next;
        }
        Ok(current)
    }

    /// Snapshot of the node at `path`
    pub fn get(&self, path: &str) -> FsResult<Entry> {
        let node = self.walk(path)?;
        let entry = Entry::snapshot(&node.borrow(), path);
        Ok(entry)
    }

    /// Add `node` under its parent. The parent must exist, be a writeable
    /// directory, and not already have a child of that name.
    pub fn create(&self, path: &str, node: Node) -> FsResult<NodeRef> {
        let (parent_path, name) = split_parent(path);
        if name.is_empty() || name == "." || name == ".." {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let parent = self.walk(parent_path)?;
        let mut parent = parent.borrow_mut();
        let Node::Directory(dir) = &mut *parent else {
            return Err(FsError::NotADirectory(parent_path.to_string()));
        };
        if !dir.writeable {
            return Err(FsError::PermissionDenied(name.to_string()));
        }
        if dir.children.contains_key(name) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let node = node.into_ref();
        dir.children.insert(name.to_string(), node.clone());
        tracing::trace!(path, "created node");
        Ok(node)
    }

    /// Toggle the writeable flag with "+w" or "-w".
    ///
    /// Returns false if nothing changed (missing path or unknown mode).
    pub fn chmod(&self, path: &str, mode: &str) -> bool {
        let writeable = if mode.contains("+w") {
            true
        } else if mode.contains("-w") {
            false
        } else {
            return false;
        };
        match self.walk(path) {
            Ok(node) => {
                node.borrow_mut().set_writeable(writeable);
                true
            }
            Err(_) => false,
        }
    }

    /// Open `path`, creating an empty file first if it is missing.
    ///
    /// Never fails: if the file cannot be found or created, the returned
    /// handle is in error mode.
    pub fn open(&self, path: &str, mode: OpenMode, sync: Option<SyncHook>) -> FileHandle {
        let node = match self.walk(path) {
            Ok(node) => Ok(node),
            Err(FsError::NotFound(_)) => self.create(path, Node::empty_file()),
            Err(err) => Err(err),
        };
        match node {
            Ok(node) => FileHandle::new(node, path, mode, sync),
            Err(err) => {
                tracing::debug!(path, error = %err, "open failed");
                FileHandle::error(path, FsError::PermissionDenied(basename(path).to_string()))
            }
        }
    }
}

/// Declarative description of a tree, used to build static filesystems
#[derive(Clone)]
pub enum TreeSpec {
    Dir {
        writeable: bool,
        children: BTreeMap<String, TreeSpec>,
    },
    Text {
        text: String,
        writeable: bool,
    },
    Exec(Executable),
    Remote(RemoteFile),
}

impl TreeSpec {
    /// Read-only empty directory
    pub fn dir() -> Self {
        TreeSpec::Dir {
            writeable: false,
            children: BTreeMap::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        TreeSpec::Text {
            text: text.into(),
            writeable: false,
        }
    }

    pub fn exec<C: Command + 'static>(command: C) -> Self {
        TreeSpec::Exec(Rc::new(command))
    }

    pub fn remote(remote: RemoteFile) -> Self {
        TreeSpec::Remote(remote)
    }

    /// Mark a directory or text file writeable
    pub fn writeable(mut self) -> Self {
        match &mut self {
            TreeSpec::Dir { writeable, .. } | TreeSpec::Text { writeable, .. } => *writeable = true,
            TreeSpec::Exec(_) | TreeSpec::Remote(_) => {}
        }
        self
    }

    /// Add a child to a directory (ignored for files)
    pub fn child(mut self, name: impl Into<String>, spec: TreeSpec) -> Self {
        if let TreeSpec::Dir { children, .. } = &mut self {
            children.insert(name.into(), spec);
        }
        self
    }

    /// Build fresh live nodes
    pub fn build(&self) -> NodeRef {
        match self {
            TreeSpec::Dir {
                writeable,
                children,
            } => {
                let mut dir = Node::directory(*writeable);
                if let Node::Directory(d) = &mut dir {
                    d.children = children
                        .iter()
                        .map(|(name, spec)| (name.clone(), spec.build()))
                        .collect();
                }
                dir.into_ref()
            }
            TreeSpec::Text { text, writeable } => Node::text(text.clone(), *writeable).into_ref(),
            TreeSpec::Exec(handler) => Node::executable(handler.clone()).into_ref(),
            TreeSpec::Remote(remote) => Node::remote(remote.clone()).into_ref(),
        }
    }
}
