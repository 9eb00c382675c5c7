//! Persisted filesystem
//!
//! A writeable tree mirrored into a key-value store under the mount's
//! device key. The whole tree is one JSON snapshot: loaded at mount, saved
//! after every create, chmod, write, and close. Only text files are stored.
//!
//! Store failures are logged and do not fail the operation; the in-memory
//! tree stays authoritative for the rest of the session.

use super::handle::{FileHandle, OpenMode, SyncHook};
use super::mount::FsType;
use super::node::{Content, Directory, File, Node, NodeRef};
use super::tree::Tree;
use super::Backend;
use crate::error::{FsResult, StoreError};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::rc::Rc;

/// Host-provided string store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Store that lives in memory (tests, and hosts without persistence)
#[derive(Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store with one JSON file per key under a directory
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Keys may contain path separators; flatten them
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let io = |e: std::io::Error| StoreError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(&self.dir).map_err(io)?;
        std::fs::write(self.path_for(key), value).map_err(io)
    }
}

/// Serialized form of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StoredNode {
    Directory {
        writeable: bool,
        children: BTreeMap<String, StoredNode>,
    },
    File {
        writeable: bool,
        content: String,
    },
}

impl StoredNode {
    /// Snapshot a live node; non-text files are skipped
    fn capture(node: &NodeRef) -> Option<StoredNode> {
        match &*node.borrow() {
            Node::Directory(dir) => Some(StoredNode::Directory {
                writeable: dir.writeable,
                children: dir
                    .children
                    .iter()
                    .filter_map(|(name, child)| Some((name.clone(), StoredNode::capture(child)?)))
                    .collect(),
            }),
            Node::File(File {
                writeable,
                content: Content::InlineText(text),
                ..
            }) => Some(StoredNode::File {
                writeable: *writeable,
                content: text.clone(),
            }),
            Node::File(_) => None,
        }
    }

    fn restore(&self) -> NodeRef {
        match self {
            StoredNode::Directory {
                writeable,
                children,
            } => Node::Directory(Directory {
                writeable: *writeable,
                children: children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.restore()))
                    .collect(),
            })
            .into_ref(),
            StoredNode::File { writeable, content } => {
                Node::text(content.clone(), *writeable).into_ref()
            }
        }
    }
}

/// Write the tree to the store, logging failures
fn save(store: &dyn KeyValueStore, key: &str, root: &NodeRef) {
    let Some(snapshot) = StoredNode::capture(root) else {
        return;
    };
    let result = serde_json::to_string(&snapshot)
        .map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
        .and_then(|json| store.set(key, &json));
    match result {
        Ok(()) => tracing::trace!(key, "persisted filesystem"),
        Err(err) => tracing::warn!(key, error = %err, "failed to persist filesystem"),
    }
}

pub struct PersistentFs {
    key: String,
    store: Rc<dyn KeyValueStore>,
    tree: Tree,
}

impl PersistentFs {
    /// Load the tree stored under `key`, or start with an empty writeable
    /// root if there is none or it cannot be read.
    pub fn load(key: &str, store: Rc<dyn KeyValueStore>) -> Self {
        let tree = match Self::read(key, store.as_ref()) {
            Ok(Some(root)) => Tree::new(root.restore()),
            Ok(None) => Tree::empty(true),
            Err(err) => {
                tracing::warn!(key, error = %err, "starting with an empty filesystem");
                Tree::empty(true)
            }
        };
        Self {
            key: key.to_string(),
            store,
            tree,
        }
    }

    fn read(key: &str, store: &dyn KeyValueStore) -> Result<Option<StoredNode>, StoreError> {
        let Some(body) = store.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn sync(&self) {
        save(self.store.as_ref(), &self.key, self.tree.root());
    }

    fn sync_hook(&self) -> SyncHook {
        let store = self.store.clone();
        let key = self.key.clone();
        let root = self.tree.root().clone();
        Rc::new(move || save(store.as_ref(), &key, &root))
    }
}

impl Backend for PersistentFs {
    fn fs_type(&self) -> FsType {
        FsType::Wsfs
    }

    fn get(&self, path: &str) -> FsResult<NodeRef> {
        self.tree.walk(path)
    }

    fn create(&self, path: &str) -> FsResult<NodeRef> {
        let node = self.tree.create(path, Node::empty_file())?;
        self.sync();
        Ok(node)
    }

    fn open(&self, path: &str, mode: OpenMode) -> FileHandle {
        let existed = self.tree.walk(path).is_ok();
        let handle = self.tree.open(path, mode, Some(self.sync_hook()));
        if !existed && !handle.is_error() {
            self.sync();
        }
        handle
    }

    fn chmod(&self, path: &str, mode: &str) -> bool {
        let changed = self.tree.chmod(path, mode);
        if changed {
            self.sync();
        }
        changed
    }

    fn list_backing_store(&self) -> Vec<String> {
        vec![self.key.clone()]
    }
}
