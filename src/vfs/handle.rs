//! File handles
//!
//! A handle binds one node to a mode. Write-mode handles terminate the
//! file with a newline when closed; a handle can be closed only once.
//! Handles that failed to open are born closed and carry the reason.

use super::node::{Content, Node, NodeRef, basename, read_content};
use crate::error::{FsError, FsResult};
use std::rc::Rc;

/// Called after a handle changes its node (persisted backends flush here)
pub type SyncHook = Rc<dyn Fn()>;

/// How a handle was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Append,
    Overwrite,
    /// The open failed; the handle only reports why
    Error,
}

impl OpenMode {
    pub fn is_write(self) -> bool {
        matches!(self, OpenMode::Append | OpenMode::Overwrite)
    }
}

pub struct FileHandle {
    node: Option<NodeRef>,
    path: String,
    mode: OpenMode,
    closed: bool,
    error: Option<FsError>,
    sync: Option<SyncHook>,
}

impl FileHandle {
    pub fn new(node: NodeRef, path: &str, mode: OpenMode, sync: Option<SyncHook>) -> Self {
        Self {
            node: Some(node),
            path: path.to_string(),
            mode,
            closed: false,
            error: None,
            sync,
        }
    }

    /// A handle that failed to open
    pub fn error(path: &str, error: FsError) -> Self {
        Self {
            node: None,
            path: path.to_string(),
            mode: OpenMode::Error,
            closed: true,
            error: Some(error),
            sync: None,
        }
    }

    /// Report `path` instead of the backend's inner path
    pub(crate) fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_error(&self) -> bool {
        self.mode == OpenMode::Error
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Why the open failed, for error-mode handles
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Full text of the file
    pub fn read(&self) -> FsResult<String> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.closed {
            return Err(FsError::HandleClosed);
        }
        let Some(node) = &self.node else {
            return Err(FsError::HandleClosed);
        };
        match &*node.borrow() {
            Node::Directory(_) => Err(FsError::IsADirectory(self.path.clone())),
            Node::File(file) => read_content(&file.content, &self.path),
        }
    }

    /// Write `data`. Overwrite replaces the whole body on every call;
    /// append adds to the end.
    pub fn write(&mut self, data: &str) -> FsResult<()> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.closed {
            return Err(FsError::HandleClosed);
        }
        if !self.mode.is_write() {
            return Err(FsError::ReadOnly(self.path.clone()));
        }
        let Some(node) = &self.node else {
            return Err(FsError::HandleClosed);
        };

        {
            let mut node = node.borrow_mut();
            let Node::File(file) = &mut *node else {
                return Err(FsError::IsADirectory(self.path.clone()));
            };
            if !file.writeable {
                return Err(FsError::PermissionDenied(basename(&self.path).to_string()));
            }
            let Content::InlineText(text) = &mut file.content else {
                return Err(FsError::ReadOnly(self.path.clone()));
            };
            match self.mode {
                OpenMode::Overwrite => *text = data.to_string(),
                _ => text.push_str(data),
            }
        }

        self.sync();
        Ok(())
    }

    /// Close the handle. Write-mode handles append a trailing newline.
    /// Closing twice is an error.
    pub fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Err(FsError::HandleClosed);
        }
        self.closed = true;

        if self.mode.is_write()
            && let Some(node) = &self.node
        {
            let terminated = match &mut *node.borrow_mut() {
                Node::File(file) if file.writeable => match &mut file.content {
                    Content::InlineText(text) => {
                        text.push('\n');
                        true
                    }
                    _ => false,
                },
                _ => false,
            };
            if terminated {
                self.sync();
            }
        }
        Ok(())
    }

    fn sync(&self) {
        if let Some(sync) = &self.sync {
            sync();
        }
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("closed", &self.closed)
            .finish()
    }
}
