//! Defines the in-memory directory index: [`Entry`], [`DirectoryIndex`],
//! and the synthetic cache-suppression entries optionally added to root.

mod loader;

use std::collections::HashMap;
use std::time::SystemTime;

pub use loader::{load_document, LoadReport};

/// The inode `fuser` reserves for the mount root.
pub const ROOT_INODE: u64 = 1;

/// Mode bits reported for directories: read-only, `0555`.
pub const DIR_MODE: u32 = 0o555;
/// Mode bits reported for files: read-only, `0444`.
pub const FILE_MODE: u32 = 0o444;
/// Conventional size reported for directories, regardless of any advisory
/// size carried in the source document.
pub const DIR_REPORT_SIZE: u64 = 4096;

/// Zero-byte files synthesized under the root to suppress host indexer
/// activity (Spotlight, `.nomedia`, AppleDouble) unless disabled via
/// `--no-macos-cache-files`.
pub const CACHE_SUPPRESSION_FILES: &[&str] =
    &[".metadata_never_index", ".nomedia", ".caches", ".Trash"];

/// The kind of node an [`Entry`] represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    Directory,
    File,
}

/// One node in the virtual tree.
#[derive(Debug, Clone)]
pub struct Entry {
    pub inode: u64,
    pub parent: u64,
    pub kind: Kind,
    /// Single path component, already normalized.
    pub name: String,
    /// Logical size in bytes. For directories this is advisory only; the
    /// kernel is always told a conventional directory size instead.
    pub size: u64,
    /// Children in declaration order. Empty for files.
    pub children: Vec<u64>,
}

impl Entry {
    /// The mode bits reported to the kernel for this entry.
    pub fn mode(&self) -> u32 {
        match self.kind {
            Kind::Directory => DIR_MODE,
            Kind::File => FILE_MODE,
        }
    }

    /// The link count reported to the kernel: 2 for directories (`.` plus
    /// the entry in its parent), 1 for files.
    pub fn nlink(&self) -> u32 {
        match self.kind {
            Kind::Directory => 2,
            Kind::File => 1,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == Kind::Directory
    }
}

/// Immutable, fully constructed view of the mounted tree.
///
/// Built once by [`load_document`] and shared read-only (behind an `Arc`)
/// by every filesystem callback thread for the lifetime of the mount.
pub struct DirectoryIndex {
    by_inode: HashMap<u64, Entry>,
    by_path: HashMap<String, u64>,
    pub total_files: u64,
    pub total_bytes: u64,
    pub uid: u32,
    pub gid: u32,
    pub mtime: SystemTime,
}

impl DirectoryIndex {
    pub fn get(&self, inode: u64) -> Option<&Entry> {
        self.by_inode.get(&inode)
    }

    pub fn get_by_path(&self, path: &str) -> Option<&Entry> {
        self.by_path.get(path).and_then(|ino| self.get(*ino))
    }

    /// Looks up a child of `parent` by its already-normalized name.
    pub fn lookup_child(&self, parent: u64, name: &str) -> Option<&Entry> {
        let parent_entry = self.get(parent)?;
        parent_entry
            .children
            .iter()
            .filter_map(|ino| self.get(*ino))
            .find(|child| child.name == name)
    }

    /// Total number of entries in the index, including the root.
    pub fn len(&self) -> usize {
        self.by_inode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_inode.is_empty()
    }

    /// Reconstructs the canonical absolute path for an inode by walking
    /// its parent chain. Used only where a path is required as a
    /// synthesis key (semi-random content reads); every other lookup
    /// addresses entries directly by inode.
    pub fn path_of(&self, inode: u64) -> String {
        if inode == ROOT_INODE {
            return "/".to_string();
        }

        let mut components = Vec::new();
        let mut current = inode;
        while current != ROOT_INODE {
            let entry = match self.get(current) {
                Some(e) => e,
                None => break,
            };
            components.push(entry.name.clone());
            current = entry.parent;
        }
        components.reverse();
        format!("/{}", components.join("/"))
    }

    /// The size reported to the kernel for this entry: the conventional
    /// directory size for directories, the declared size for files.
    pub fn report_size(&self, entry: &Entry) -> u64 {
        match entry.kind {
            Kind::Directory => DIR_REPORT_SIZE,
            Kind::File => entry.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::NormalizationForm;

    fn index() -> DirectoryIndex {
        let doc = br#"[{"type":"directory","name":"a","size":0,"contents":[
            {"type":"directory","name":"b","size":0,"contents":[
                {"type":"file","name":"c","size":3}
            ]}
        ]}]"#;
        load_document(doc, NormalizationForm::None, false, 0, 0, SystemTime::UNIX_EPOCH)
            .unwrap()
            .0
    }

    #[test]
    fn path_of_reconstructs_nested_paths() {
        let index = index();
        let file = index.get_by_path("/a/b/c").unwrap();
        assert_eq!(index.path_of(file.inode), "/a/b/c");
        assert_eq!(index.path_of(ROOT_INODE), "/");
    }

    #[test]
    fn lookup_child_finds_direct_children_only() {
        let index = index();
        let a = index.get_by_path("/a").unwrap();
        let b = index.lookup_child(a.inode, "b").unwrap();
        assert!(b.is_dir());
        assert!(index.lookup_child(ROOT_INODE, "c").is_none());
    }

    #[test]
    fn directories_report_conventional_size() {
        let index = index();
        let a = index.get_by_path("/a").unwrap();
        assert_eq!(index.report_size(a), DIR_REPORT_SIZE);
        let c = index.get_by_path("/a/b/c").unwrap();
        assert_eq!(index.report_size(c), 3);
    }
}
