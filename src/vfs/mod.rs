//! Virtual File System
//!
//! A mount table over pluggable backends. Every backend walks paths the
//! same way (see [`tree`]); they differ only in where nodes come from and
//! whether changes leave the process.
//!
//! Paths given to [`FileSystem`] are resolved lexically first, then routed
//! to the mount whose point is the longest prefix of the path. The backend
//! sees the path relative to its mount point.

pub mod handle;
pub mod http;
pub mod memory;
pub mod mount;
pub mod node;
pub mod persist;
pub mod tmp;
pub mod tree;

pub use handle::{FileHandle, OpenMode};
pub use http::{DirFetcher, MapFetcher, RemoteFs};
pub use memory::StaticFs;
pub use mount::{FsType, FstabEntry, Mount, MountOptions, MountTable};
pub use node::{Content, Entry, EntryKind, Fetcher, Node, NodeRef, RemoteFile};
pub use persist::{DirStore, KeyValueStore, MemoryStore, PersistentFs};
pub use tmp::TmpFs;
pub use tree::TreeSpec;

use crate::error::{FsError, FsResult};
use crate::shell::command::Executable;
use std::collections::HashMap;
use std::rc::Rc;

/// Storage behind one mount point
///
/// Paths are relative to the mount point and always start with '/'.
pub trait Backend {
    fn fs_type(&self) -> FsType;

    /// Live node at `path`
    fn get(&self, path: &str) -> FsResult<NodeRef>;

    /// Create an empty file; the parent must be a writeable directory
    fn create(&self, path: &str) -> FsResult<NodeRef>;

    /// Open a handle, creating the file if missing. Failure is reported
    /// through an error-mode handle.
    fn open(&self, path: &str, mode: OpenMode) -> FileHandle;

    /// Toggle the writeable flag with "+w" or "-w"
    fn chmod(&self, path: &str, mode: &str) -> bool;

    /// External locations this backend reads or writes
    fn list_backing_store(&self) -> Vec<String>;
}

/// Resolve `.` and `..` lexically into an absolute path.
///
/// `..` at the root stays at the root. The path need not exist.
pub fn resolve_path(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Resolve `path` against a working directory
pub fn resolve_from(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        resolve_path(path)
    } else {
        resolve_path(&format!("{}/{}", cwd, path))
    }
}

/// What the host makes available to mount: static trees by name, a fetcher
/// for remote backends, and a store for persisted ones
#[derive(Default)]
pub struct Devices {
    trees: HashMap<String, TreeSpec>,
    fetcher: Option<Rc<dyn Fetcher>>,
    store: Option<Rc<dyn KeyValueStore>>,
}

impl Devices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(mut self, name: &str, spec: TreeSpec) -> Self {
        self.trees.insert(name.to_string(), spec);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Rc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_store(mut self, store: Rc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the backend an fstab entry asks for
    fn backend_for(&self, entry: &FstabEntry) -> Option<Box<dyn Backend>> {
        let device = entry.device_spec.as_str();
        match entry.fs_type() {
            FsType::Jfs => match self.trees.get(device) {
                Some(spec) => Some(Box::new(StaticFs::new(spec))),
                None => {
                    tracing::warn!(device, "no static tree registered under this name");
                    None
                }
            },
            FsType::Httpfs => match &self.fetcher {
                Some(fetcher) => Some(Box::new(RemoteFs::new(device, fetcher.clone()))),
                None => {
                    tracing::warn!(device, "remote mount without a fetcher");
                    None
                }
            },
            FsType::Tmpfs => Some(Box::new(TmpFs::new())),
            FsType::Wsfs => match &self.store {
                Some(store) => Some(Box::new(PersistentFs::load(device, store.clone()))),
                None => {
                    tracing::warn!(device, "persisted mount without a store");
                    None
                }
            },
            FsType::Other(kind) => {
                tracing::warn!(device, fs_type = %kind, "unknown filesystem type");
                None
            }
        }
    }
}

/// The mounted filesystem
pub struct FileSystem {
    table: MountTable,
}

impl FileSystem {
    /// Filesystem with only an empty read-only root
    pub fn new() -> Self {
        let mut fs = Self {
            table: MountTable::new(),
        };
        fs.ensure_root();
        fs
    }

    /// Mount every automount entry whose backend can be built
    pub fn from_fstab(entries: &[FstabEntry], devices: &Devices) -> Self {
        let mut fs = Self {
            table: MountTable::new(),
        };
        for entry in entries.iter().filter(|e| e.automount) {
            if let Some(backend) = devices.backend_for(entry) {
                fs.mount(entry, backend);
            }
        }
        fs.ensure_root();
        fs
    }

    fn ensure_root(&mut self) {
        if !self.table.is_mount_point("/") {
            tracing::debug!("nothing mounted at /, using an empty root");
            let entry = FstabEntry::new("none", "/", "jfs", "ro");
            self.mount(&entry, Box::new(StaticFs::empty()));
        }
    }

    /// Mount `backend` as described by `entry`
    pub fn mount(&mut self, entry: &FstabEntry, backend: Box<dyn Backend>) {
        let mount_point = resolve_path(&entry.mount_point);
        tracing::info!(
            device = %entry.device_spec,
            mount_point = %mount_point,
            fs_type = backend.fs_type().as_str(),
            "mounted"
        );
        self.table.insert(Mount {
            device_spec: entry.device_spec.clone(),
            mount_point,
            fs_type: backend.fs_type(),
            options: entry.options.clone(),
            flags: MountOptions::parse(&entry.options),
            backend,
        });
    }

    /// Mount and inner path for `path`
    fn locate(&self, path: &str) -> FsResult<(&Mount, String, String)> {
        let full = resolve_path(path);
        let mount = self
            .table
            .containing(&full)
            .ok_or_else(|| FsError::NotFound(full.clone()))?;
        let inner = mount::inner_path(&mount.mount_point, &full);
        Ok((mount, full, inner))
    }

    /// Snapshot of the node at `path`. Directory listings include mount
    /// points directly beneath them.
    pub fn get(&self, path: &str) -> FsResult<Entry> {
        let (mount, full, inner) = self.locate(path)?;
        let node = mount.backend.get(&inner)?;
        let mut entry = Entry::snapshot(&node.borrow(), &full);
        if let EntryKind::Directory { children } = &mut entry.kind {
            children.extend(self.table.children_of(&full));
            children.sort();
            children.dedup();
        }
        Ok(entry)
    }

    /// Live node at `path`, for in-place changes
    pub fn pointer(&self, path: &str) -> FsResult<NodeRef> {
        let (mount, _, inner) = self.locate(path)?;
        mount.backend.get(&inner)
    }

    pub fn create(&self, path: &str) -> FsResult<NodeRef> {
        let (mount, full, inner) = self.locate(path)?;
        if mount.flags.read_only {
            return Err(FsError::PermissionDenied(node::basename(&full).to_string()));
        }
        mount.backend.create(&inner)
    }

    pub fn open(&self, path: &str, mode: OpenMode) -> FileHandle {
        let (mount, full, inner) = match self.locate(path) {
            Ok(found) => found,
            Err(err) => return FileHandle::error(&resolve_path(path), err),
        };
        if mount.flags.read_only && mode.is_write() {
            return FileHandle::error(
                &full,
                FsError::PermissionDenied(node::basename(&full).to_string()),
            );
        }
        mount.backend.open(&inner, mode).with_path(&full)
    }

    pub fn chmod(&self, path: &str, mode: &str) -> bool {
        match self.locate(path) {
            Ok((mount, _, _)) if mount.flags.read_only => false,
            Ok((mount, _, inner)) => mount.backend.chmod(&inner, mode),
            Err(_) => false,
        }
    }

    /// Command implementation at `path`, unless it is not executable or its
    /// mount forbids execution
    pub fn executable(&self, path: &str) -> Option<Executable> {
        let (mount, _, inner) = self.locate(path).ok()?;
        if mount.flags.noexec {
            return None;
        }
        let node = mount.backend.get(&inner).ok()?;
        let handler = node.borrow().handler();
        handler
    }

    /// One line per mount, in mount order
    pub fn mounts(&self) -> Vec<String> {
        self.table.list().iter().map(Mount::describe).collect()
    }

    /// External locations, per mount point
    pub fn list_backing_store(&self) -> Vec<(String, Vec<String>)> {
        self.table
            .list()
            .iter()
            .map(|m| (m.mount_point.clone(), m.backend.list_backing_store()))
            .collect()
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}
