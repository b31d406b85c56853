//! Access control for owner-initiated file uploads (fdo.upload).
//!
//! The operator registers files and directories the owner server may
//! read. Each entry is stored under a normalized name derived from
//! the path as given; owner requests are matched by exact name first,
//! then by walking up the requested path's parent directories. The
//! special `/` entry grants unrestricted read access, used when the
//! operator configured no restrictions at all.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct UploadAccessList {
    entries: HashMap<String, PathBuf>,
}

impl UploadAccessList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one or more comma-separated paths.
    pub fn insert(&mut self, paths: &str) -> io::Result<()> {
        for path in paths.split(',') {
            let abs = if Path::new(path).is_absolute() {
                clean_path(Path::new(path))
            } else {
                clean_path(&std::env::current_dir()?.join(path))
            };
            self.entries.insert(path_to_name(path, &abs), abs);
        }
        Ok(())
    }

    /// Grants unrestricted read access. Used when the operator gave
    /// no upload restrictions.
    pub fn allow_all(&mut self) {
        self.entries.insert("/".to_string(), PathBuf::new());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The registered entry names, for validation at startup.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Maps an owner-requested path to the local file to serve, or
    /// `None` if the request is outside every registered entry.
    pub fn resolve(&self, requested: &str) -> Option<PathBuf> {
        if !is_valid_request(requested) {
            return None;
        }

        if self.entries.contains_key("/") {
            return Some(clean_path(Path::new(requested)));
        }

        let name = path_to_name(requested, Path::new(""));
        if let Some(abs) = self.entries.get(&name) {
            return Some(abs.clone());
        }
        // A registered directory covers everything beneath it.
        let mut dir = Path::new(&name).parent();
        while let Some(parent) = dir {
            if let Some(parent_str) = parent.to_str() {
                if parent_str.is_empty() || parent_str == "/" {
                    break;
                }
                if let Some(abs) = self.entries.get(parent_str) {
                    return Some(abs.join(Path::new(&name).strip_prefix(parent).ok()?));
                }
            }
            dir = parent.parent();
        }
        None
    }
}

impl std::fmt::Display for UploadAccessList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        write!(f, "[{}]", names.join(","))
    }
}

// Owner requests arrive as slash-separated relative paths; anything
// rooted, empty, or traversing upward is refused outright.
fn is_valid_request(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') {
        return false;
    }
    !path
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
}

/// Lexically normalizes a path: resolves `.` and `..` components
/// without touching the filesystem.
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(Component::RootDir);
                }
            }
            other => cleaned.push(other),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Derives the entry name for a path. Names are stored unrooted so
/// they compare directly against owner requests, which arrive as
/// slash-separated relative paths. Leading `..`/`.` are stripped; a
/// path that is nothing but `..`/`.` names the basename of its
/// absolute form.
fn path_to_name(path: &str, abs: &Path) -> String {
    let cleaned = clean_path(Path::new(path));
    let mut parts: Vec<&str> = cleaned
        .to_str()
        .unwrap_or_default()
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();
    while let Some(first) = parts.first() {
        if *first == ".." || *first == "." {
            parts.remove(0);
        } else {
            break;
        }
    }
    if parts.is_empty() {
        if let Some(base) = abs.file_name() {
            return base.to_string_lossy().into_owned();
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_sentinel_allows_everything() {
        let mut list = UploadAccessList::new();
        list.allow_all();
        assert_eq!(
            list.resolve("etc/hostname"),
            Some(PathBuf::from("etc/hostname"))
        );
    }

    #[test]
    fn test_exact_file_match() {
        let mut list = UploadAccessList::new();
        list.insert("/var/log/boot.log").unwrap();
        assert_eq!(
            list.resolve("var/log/boot.log"),
            Some(PathBuf::from("/var/log/boot.log"))
        );
        assert!(list.resolve("var/log/secure").is_none());
    }

    #[test]
    fn test_directory_covers_children() {
        let mut list = UploadAccessList::new();
        list.insert("/var/log").unwrap();
        assert_eq!(
            list.resolve("var/log/nested/boot.log"),
            Some(PathBuf::from("/var/log/nested/boot.log"))
        );
    }

    #[test]
    fn test_traversal_refused() {
        let mut list = UploadAccessList::new();
        list.allow_all();
        assert!(list.resolve("../etc/shadow").is_none());
        assert!(list.resolve("/etc/shadow").is_none());
        assert!(list.resolve("").is_none());
    }

    #[test]
    fn test_comma_separated_insert() {
        let mut list = UploadAccessList::new();
        list.insert("/var/log,/etc/hostname").unwrap();
        let mut names: Vec<&str> = list.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["etc/hostname", "var/log"]);
    }

    #[test]
    fn test_clean_path_resolves_dots() {
        assert_eq!(
            clean_path(Path::new("/var/log/../run/./x")),
            PathBuf::from("/var/run/x")
        );
    }

    #[test]
    fn test_path_to_name_relative() {
        assert_eq!(path_to_name("./data/file.txt", Path::new("")), "data/file.txt");
        assert_eq!(
            path_to_name("..", Path::new("/home/user/project")),
            "project"
        );
    }
}
