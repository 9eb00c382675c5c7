//! Mount table
//!
//! Maps mount points to backends. A path belongs to the mount whose point
//! is its longest prefix on a segment boundary, so `/etcetera` never lands
//! in a mount at `/etc`.

use super::Backend;
use serde::{Deserialize, Serialize};

/// Filesystem type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsType {
    /// Static tree compiled into the host
    Jfs,
    /// Read-only tree described by a remote index
    Httpfs,
    /// In-memory scratch space
    Tmpfs,
    /// Tree persisted to a key-value store
    Wsfs,
    /// Unknown/custom filesystem
    Other(String),
}

impl FsType {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "jfs" | "static" => FsType::Jfs,
            "httpfs" | "remote" => FsType::Httpfs,
            "tmpfs" => FsType::Tmpfs,
            "wsfs" | "persist" => FsType::Wsfs,
            other => FsType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FsType::Jfs => "jfs",
            FsType::Httpfs => "httpfs",
            FsType::Tmpfs => "tmpfs",
            FsType::Wsfs => "wsfs",
            FsType::Other(s) => s,
        }
    }
}

/// Mount options that change behavior. Others are kept for display only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountOptions {
    /// Refuse creates and writes
    pub read_only: bool,
    /// Refuse to run executables found on this mount
    pub noexec: bool,
}

impl MountOptions {
    /// Parse mount options from a comma-separated string
    pub fn parse(options: &str) -> Self {
        let mut opts = MountOptions::default();
        for opt in options.split(',') {
            match opt.trim() {
                "ro" | "readonly" => opts.read_only = true,
                "rw" | "readwrite" => opts.read_only = false,
                "noexec" => opts.noexec = true,
                "exec" => opts.noexec = false,
                _ => {} // Unknown options ignored
            }
        }
        opts
    }
}

fn default_automount() -> bool {
    true
}

/// One line of the mount configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FstabEntry {
    /// Backend-specific source: static tree name, remote base location,
    /// or store key
    pub device_spec: String,
    pub mount_point: String,
    pub fs_type: String,
    #[serde(default)]
    pub options: String,
    #[serde(default = "default_automount")]
    pub automount: bool,
}

impl FstabEntry {
    pub fn new(device_spec: &str, mount_point: &str, fs_type: &str, options: &str) -> Self {
        Self {
            device_spec: device_spec.to_string(),
            mount_point: mount_point.to_string(),
            fs_type: fs_type.to_string(),
            options: options.to_string(),
            automount: true,
        }
    }

    /// Parse a whitespace-separated fstab line:
    /// `device mount_point type [options]`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }

        let options = parts.get(3).copied().unwrap_or("");
        Some(Self::new(parts[0], parts[1], parts[2], options))
    }

    pub fn fs_type(&self) -> FsType {
        FsType::parse(&self.fs_type)
    }
}

/// A mounted backend
pub struct Mount {
    pub device_spec: String,
    pub mount_point: String,
    pub fs_type: FsType,
    /// Options as written in the configuration
    pub options: String,
    pub flags: MountOptions,
    pub backend: Box<dyn Backend>,
}

impl Mount {
    /// `{device} on {mount point} type {fs} ({options})`
    pub fn describe(&self) -> String {
        format!(
            "{} on {} type {} ({})",
            self.device_spec,
            self.mount_point,
            self.fs_type.as_str(),
            self.options
        )
    }
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Does `mount_point` contain `path`?
fn contains(mount_point: &str, path: &str) -> bool {
    mount_point == "/"
        || path == mount_point
        || path
            .strip_prefix(mount_point)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Path inside the mount, always starting with '/'
pub(crate) fn inner_path(mount_point: &str, path: &str) -> String {
    if mount_point == "/" {
        return path.to_string();
    }
    match path.strip_prefix(mount_point) {
        Some("") | None => "/".to_string(),
        Some(rest) => rest.to_string(),
    }
}

/// Mount table, in mount order
#[derive(Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mount. A later mount at the same point replaces the earlier one.
    pub fn insert(&mut self, mount: Mount) {
        if let Some(existing) = self
            .mounts
            .iter_mut()
            .find(|m| m.mount_point == mount.mount_point)
        {
            tracing::warn!(mount_point = %mount.mount_point, "replacing existing mount");
            *existing = mount;
        } else {
            self.mounts.push(mount);
        }
    }

    pub fn is_mount_point(&self, path: &str) -> bool {
        self.mounts.iter().any(|m| m.mount_point == path)
    }

    /// Mount holding an absolute, resolved path
    pub fn containing(&self, path: &str) -> Option<&Mount> {
        self.mounts
            .iter()
            .filter(|m| contains(&m.mount_point, path))
            .max_by_key(|m| m.mount_point.len())
    }

    /// All mounts
    pub fn list(&self) -> &[Mount] {
        &self.mounts
    }

    /// Mount points directly under a directory
    pub fn children_of(&self, dir: &str) -> Vec<String> {
        self.mounts
            .iter()
            .filter_map(|m| {
                if m.mount_point == "/" || m.mount_point == dir {
                    return None;
                }
                let (parent, name) = super::tree::split_parent(&m.mount_point);
                (parent == dir).then(|| name.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_type_parse() {
        assert_eq!(FsType::parse("JFS"), FsType::Jfs);
        assert_eq!(FsType::parse("httpfs"), FsType::Httpfs);
        assert_eq!(FsType::parse("tmpfs"), FsType::Tmpfs);
        assert_eq!(FsType::parse("wsfs"), FsType::Wsfs);
        assert_eq!(FsType::parse("nfs"), FsType::Other("nfs".into()));
        assert_eq!(FsType::Wsfs.as_str(), "wsfs");
    }

    #[test]
    fn test_mount_options_parse() {
        let opts = MountOptions::parse("ro,noexec,size=1M");
        assert!(opts.read_only);
        assert!(opts.noexec);
        assert_eq!(MountOptions::parse("rw"), MountOptions::default());
    }

    #[test]
    fn test_fstab_parse() {
        let entry = FstabEntry::parse("http://host/fs /mnt httpfs ro").unwrap();
        assert_eq!(entry.device_spec, "http://host/fs");
        assert_eq!(entry.mount_point, "/mnt");
        assert_eq!(entry.fs_type(), FsType::Httpfs);
        assert_eq!(entry.options, "ro");
        assert!(entry.automount);

        assert!(FstabEntry::parse("# comment").is_none());
        assert!(FstabEntry::parse("only two").is_none());
    }

    #[test]
    fn test_fstab_json_defaults() {
        let entry: FstabEntry = serde_json::from_str(
            r#"{"device_spec": "scratch", "mount_point": "/tmp", "fs_type": "tmpfs"}"#,
        )
        .unwrap();
        assert!(entry.automount);
        assert_eq!(entry.options, "");
    }

    #[test]
    fn test_contains_respects_segment_boundary() {
        assert!(contains("/", "/anything"));
        assert!(contains("/etc", "/etc"));
        assert!(contains("/etc", "/etc/motd"));
        assert!(!contains("/etc", "/etcetera"));
    }

    #[test]
    fn test_inner_path() {
        assert_eq!(inner_path("/", "/etc/motd"), "/etc/motd");
        assert_eq!(inner_path("/etc", "/etc/motd"), "/motd");
        assert_eq!(inner_path("/etc", "/etc"), "/");
    }
}
