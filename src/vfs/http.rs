//! Remote filesystem
//!
//! A read-only tree described by an index document fetched from
//! `{location}/_index.json`. The index is fetched on first use and kept
//! once it parses; a failed fetch is retried on the next access.
//!
//! Index format: the root entry is `"/"`. A string value is an inline file,
//! an object with `children` is a directory, and any other value is a file
//! whose body lives at `{location}{path}`.
//!
//! ```json
//! {"/": {"children": {
//!     "README": "inline text",
//!     "docs": {"children": {"guide.txt": {}}}
//! }}}
//! ```

use super::handle::{FileHandle, OpenMode};
use super::memory::remote_locations;
use super::mount::FsType;
use super::node::{Fetcher, NodeRef, RemoteFile, basename};
use super::tree::{Tree, TreeSpec};
use super::Backend;
use crate::error::{FetchError, FsError, FsResult};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

const INDEX_NAME: &str = "_index.json";

pub struct RemoteFs {
    location: String,
    fetcher: Rc<dyn Fetcher>,
    tree: RefCell<Option<Tree>>,
}

impl RemoteFs {
    pub fn new(location: &str, fetcher: Rc<dyn Fetcher>) -> Self {
        Self {
            location: location.trim_end_matches('/').to_string(),
            fetcher,
            tree: RefCell::new(None),
        }
    }

    pub fn index_location(&self) -> String {
        format!("{}/{}", self.location, INDEX_NAME)
    }

    fn tree(&self) -> FsResult<Tree> {
        if let Some(tree) = self.tree.borrow().as_ref() {
            return Ok(tree.clone());
        }

        let index = self.index_location();
        tracing::debug!(%index, "fetching remote index");
        let body = self.fetcher.fetch(&index)?;
        let spec = parse_index(&body, &self.location, &self.fetcher)
            .map_err(|reason| FetchError::new(&index, reason))?;

        let tree = Tree::new(spec.build());
        *self.tree.borrow_mut() = Some(tree.clone());
        Ok(tree)
    }
}

/// Turn an index document into a tree description
fn parse_index(body: &str, location: &str, fetcher: &Rc<dyn Fetcher>) -> Result<TreeSpec, String> {
    let doc: Value = serde_json::from_str(body).map_err(|e| format!("malformed index: {}", e))?;
    let root = doc
        .get("/")
        .ok_or_else(|| "malformed index: missing \"/\" entry".to_string())?;
    Ok(index_entry(root, "", location, fetcher))
}

fn index_entry(value: &Value, path: &str, location: &str, fetcher: &Rc<dyn Fetcher>) -> TreeSpec {
    match value {
        Value::String(text) => TreeSpec::text(text.clone()),
        Value::Object(map) if map.get("children").is_some_and(Value::is_object) => {
            let mut dir = TreeSpec::dir();
            if let Some(Value::Object(children)) = map.get("children") {
                for (name, child) in children {
                    let child_path = format!("{}/{}", path, name);
                    dir = dir.child(name.clone(), index_entry(child, &child_path, location, fetcher));
                }
            }
            dir
        }
        _ => TreeSpec::remote(RemoteFile::new(
            fetcher.clone(),
            format!("{}{}", location, path),
        )),
    }
}

impl Backend for RemoteFs {
    fn fs_type(&self) -> FsType {
        FsType::Httpfs
    }

    fn get(&self, path: &str) -> FsResult<NodeRef> {
        self.tree()?.walk(path)
    }

    fn create(&self, path: &str) -> FsResult<NodeRef> {
        Err(FsError::PermissionDenied(basename(path).to_string()))
    }

    fn open(&self, path: &str, mode: OpenMode) -> FileHandle {
        let tree = match self.tree() {
            Ok(tree) => tree,
            Err(err) => return FileHandle::error(path, err),
        };
        match tree.walk(path) {
            Ok(node) => FileHandle::new(node, path, mode, None),
            Err(_) => FileHandle::error(path, FsError::PermissionDenied(basename(path).to_string())),
        }
    }

    fn chmod(&self, _path: &str, _mode: &str) -> bool {
        false
    }

    fn list_backing_store(&self) -> Vec<String> {
        let mut locations = vec![self.index_location()];
        if let Some(tree) = self.tree.borrow().as_ref() {
            locations.extend(remote_locations(tree.root()));
        }
        locations
    }
}

/// Fetcher over a local directory: location `a/b` reads `{root}/a/b`.
/// Scheme and host prefixes are stripped, so `http://host/a/b` reads the
/// same file.
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn local_path(&self, location: &str) -> PathBuf {
        let path = match location.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
            None => location,
        };
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Fetcher for DirFetcher {
    fn fetch(&self, location: &str) -> Result<String, FetchError> {
        let path = self.local_path(location);
        std::fs::read_to_string(&path).map_err(|e| FetchError::new(location, e.to_string()))
    }
}

/// Fetcher over an in-memory map of location to body
#[derive(Default)]
pub struct MapFetcher {
    bodies: RefCell<HashMap<String, String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: &str, body: &str) {
        self.bodies
            .borrow_mut()
            .insert(location.to_string(), body.to_string());
    }
}

impl Fetcher for MapFetcher {
    fn fetch(&self, location: &str) -> Result<String, FetchError> {
        self.bodies
            .borrow()
            .get(location)
            .cloned()
            .ok_or_else(|| FetchError::new(location, "404 not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{"/": {"children": {
        "README": "inline text",
        "docs": {"children": {"guide.txt": {}}}
    }}}"#;

    fn remote() -> (Rc<MapFetcher>, RemoteFs) {
        let fetcher = Rc::new(MapFetcher::new());
        fetcher.insert("http://host/fs/_index.json", INDEX);
        fetcher.insert("http://host/fs/docs/guide.txt", "the guide");
        let fs = RemoteFs::new("http://host/fs/", fetcher.clone());
        (fetcher, fs)
    }

    #[test]
    fn test_inline_and_remote_files() {
        let (_, fs) = remote();
        assert_eq!(fs.open("/README", OpenMode::Read).read().unwrap(), "inline text");
        assert_eq!(
            fs.open("/docs/guide.txt", OpenMode::Read).read().unwrap(),
            "the guide"
        );
        assert!(fs.get("/docs").unwrap().borrow().is_dir());
    }

    #[test]
    fn test_writes_rejected() {
        let (_, fs) = remote();
        assert!(matches!(fs.create("/new"), Err(FsError::PermissionDenied(_))));
        let mut handle = fs.open("/README", OpenMode::Overwrite);
        assert!(handle.write("x").is_err());
        assert!(fs.open("/missing", OpenMode::Append).is_error());
    }

    #[test]
    fn test_unreachable_index_is_fetch_failure_and_retried() {
        let fetcher = Rc::new(MapFetcher::new());
        let fs = RemoteFs::new("http://down", fetcher.clone());
        assert!(matches!(fs.get("/"), Err(FsError::Fetch(_))));

        fetcher.insert("http://down/_index.json", r#"{"/": {"children": {}}}"#);
        assert!(fs.get("/").is_ok());
    }

    #[test]
    fn test_malformed_index() {
        let fetcher = Rc::new(MapFetcher::new());
        fetcher.insert("x/_index.json", r#"{"children": {}}"#);
        let fs = RemoteFs::new("x", fetcher);
        let err = fs.get("/").unwrap_err();
        assert!(err.to_string().contains("malformed index"));
    }

    #[test]
    fn test_backing_store() {
        let (_, fs) = remote();
        assert_eq!(fs.list_backing_store(), vec!["http://host/fs/_index.json"]);
        fs.get("/").unwrap();
        assert_eq!(
            fs.list_backing_store(),
            vec!["http://host/fs/_index.json", "http://host/fs/docs/guide.txt"]
        );
    }

    #[test]
    fn test_dir_fetcher_strips_scheme() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("motd"), "hello").unwrap();
        let fetcher = DirFetcher::new(dir.path());
        assert_eq!(fetcher.fetch("http://example.com/motd").unwrap(), "hello");
        assert_eq!(fetcher.fetch("/motd").unwrap(), "hello");
        assert!(fetcher.fetch("missing").is_err());
    }
}
