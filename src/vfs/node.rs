//! Filesystem nodes
//!
//! A node is either a directory with named children or a file with content.
//! What a file holds is decided once, when the node is built: inline text,
//! a command implementation, or a reference to a remote body that is
//! fetched on read.

use crate::error::{FetchError, FsError, FsResult};
use crate::shell::command::Executable;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Live, shared, mutable node
pub type NodeRef = Rc<RefCell<Node>>;

/// Fetches remote file bodies and indexes
///
/// Supplied by the host. Synchronous from the filesystem's point of view.
pub trait Fetcher {
    fn fetch(&self, location: &str) -> Result<String, FetchError>;
}

/// A file body that lives elsewhere and is fetched lazily
#[derive(Clone)]
pub struct RemoteFile {
    fetcher: Rc<dyn Fetcher>,
    location: String,
}

impl RemoteFile {
    pub fn new(fetcher: Rc<dyn Fetcher>, location: impl Into<String>) -> Self {
        Self {
            fetcher,
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn fetch(&self) -> Result<String, FetchError> {
        tracing::debug!(location = %self.location, "fetching remote file");
        self.fetcher.fetch(&self.location)
    }
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RemoteFile({})", self.location)
    }
}

/// What a file holds
#[derive(Clone)]
pub enum Content {
    InlineText(String),
    ExecutableHandler(Executable),
    RemoteReference(RemoteFile),
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Content::InlineText(text) => f.debug_tuple("InlineText").field(text).finish(),
            Content::ExecutableHandler(_) => write!(f, "ExecutableHandler(..)"),
            Content::RemoteReference(remote) => write!(f, "{:?}", remote),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub writeable: bool,
    pub children: BTreeMap<String, NodeRef>,
}

#[derive(Debug, Clone)]
pub struct File {
    pub writeable: bool,
    pub executable: bool,
    pub content: Content,
}

/// A stored file or directory
#[derive(Debug, Clone)]
pub enum Node {
    Directory(Directory),
    File(File),
}

impl Node {
    /// Empty directory
    pub fn directory(writeable: bool) -> Self {
        Node::Directory(Directory {
            writeable,
            children: BTreeMap::new(),
        })
    }

    /// Fresh empty text file, as made by `create`
    pub fn empty_file() -> Self {
        Node::File(File {
            writeable: true,
            executable: false,
            content: Content::InlineText(String::new()),
        })
    }

    pub fn text(text: impl Into<String>, writeable: bool) -> Self {
        Node::File(File {
            writeable,
            executable: false,
            content: Content::InlineText(text.into()),
        })
    }

    pub fn executable(handler: Executable) -> Self {
        Node::File(File {
            writeable: false,
            executable: true,
            content: Content::ExecutableHandler(handler),
        })
    }

    pub fn remote(remote: RemoteFile) -> Self {
        Node::File(File {
            writeable: false,
            executable: false,
            content: Content::RemoteReference(remote),
        })
    }

    pub fn into_ref(self) -> NodeRef {
        Rc::new(RefCell::new(self))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn writeable(&self) -> bool {
        match self {
            Node::Directory(dir) => dir.writeable,
            Node::File(file) => file.writeable,
        }
    }

    pub fn set_writeable(&mut self, writeable: bool) {
        match self {
            Node::Directory(dir) => dir.writeable = writeable,
            Node::File(file) => file.writeable = writeable,
        }
    }

    /// Command implementation, if this is an executable file
    pub fn handler(&self) -> Option<Executable> {
        match self {
            Node::File(File {
                executable: true,
                content: Content::ExecutableHandler(handler),
                ..
            }) => Some(handler.clone()),
            _ => None,
        }
    }
}

/// What kind of node an [`Entry`] describes
#[derive(Debug, Clone)]
pub enum EntryKind {
    /// Sorted child names
    Directory { children: Vec<String> },
    File { executable: bool, content: Content },
}

/// Read-only snapshot of a node, annotated with where it was found
#[derive(Debug, Clone)]
pub struct Entry {
    pub full_path: String,
    pub basename: String,
    pub writeable: bool,
    pub kind: EntryKind,
}

impl Entry {
    pub fn snapshot(node: &Node, full_path: &str) -> Self {
        let kind = match node {
            Node::Directory(dir) => EntryKind::Directory {
                children: dir.children.keys().cloned().collect(),
            },
            Node::File(file) => EntryKind::File {
                executable: file.executable,
                content: file.content.clone(),
            },
        };
        Self {
            full_path: full_path.to_string(),
            basename: basename(full_path).to_string(),
            writeable: node.writeable(),
            kind,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    /// Child names, empty for files
    pub fn children(&self) -> &[String] {
        match &self.kind {
            EntryKind::Directory { children } => children,
            EntryKind::File { .. } => &[],
        }
    }

    /// Resolve the content to text, fetching remote bodies
    pub fn read_text(&self) -> FsResult<String> {
        match &self.kind {
            EntryKind::Directory { .. } => Err(FsError::IsADirectory(self.full_path.clone())),
            EntryKind::File { content, .. } => read_content(content, &self.full_path),
        }
    }
}

/// Text of a file's content
pub(crate) fn read_content(content: &Content, path: &str) -> FsResult<String> {
    match content {
        Content::InlineText(text) => Ok(text.clone()),
        Content::RemoteReference(remote) => Ok(remote.fetch()?),
        Content::ExecutableHandler(_) => Err(FsError::PermissionDenied(basename(path).to_string())),
    }
}

/// Last path segment ("/" for the root)
pub fn basename(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit('/').next() {
        Some("") | None => "/",
        Some(name) => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(basename("/etc/motd"), "motd");
        assert_eq!(basename("/etc/"), "etc");
        assert_eq!(basename("/"), "/");
        assert_eq!(basename("file"), "file");
    }

    #[test]
    fn test_snapshot_of_directory_lists_sorted_children() {
        let mut dir = Directory::default();
        dir.children.insert("b".into(), Node::empty_file().into_ref());
        dir.children.insert("a".into(), Node::empty_file().into_ref());
        let entry = Entry::snapshot(&Node::Directory(dir), "/x");
        assert!(entry.is_dir());
        assert_eq!(entry.children(), ["a".to_string(), "b".to_string()]);
        assert_eq!(entry.basename, "x");
    }

    #[test]
    fn test_only_executable_files_have_handlers() {
        assert!(Node::text("hi", false).handler().is_none());
        assert!(Node::directory(true).handler().is_none());
    }

    #[test]
    fn test_read_text() {
        let entry = Entry::snapshot(&Node::text("hello", false), "/etc/motd");
        assert_eq!(entry.read_text().unwrap(), "hello");

        let dir = Entry::snapshot(&Node::directory(false), "/etc");
        assert!(matches!(dir.read_text(), Err(FsError::IsADirectory(_))));
    }

    #[test]
    fn test_chmod_flag() {
        let mut node = Node::directory(false);
        node.set_writeable(true);
        assert!(node.writeable());
    }
}
