//! Validates and ingests the JSON input document into a [`super::DirectoryIndex`].
//!
//! This is the only code that writes the directory index; once
//! [`load_document`] returns, the index is immutable for the mount's
//! lifetime.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use serde_json::Value;

use crate::error::Error;
use crate::path::{normalize_component, NormalizationForm};

use super::{DirectoryIndex, Entry, Kind, CACHE_SUPPRESSION_FILES, ROOT_INODE};

/// Summary tallied while walking the document, used for the startup log
/// line and for [`super::DirectoryIndex::total_files`] / `total_bytes`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadReport {
    pub total_files: u64,
    pub total_bytes: u64,
}

struct Builder {
    by_inode: HashMap<u64, Entry>,
    by_path: HashMap<String, u64>,
    next_inode: u64,
    report: LoadReport,
}

impl Builder {
    fn alloc_inode(&mut self) -> u64 {
        let inode = self.next_inode;
        self.next_inode += 1;
        inode
    }
}

fn invalid(path: &str, reason: impl std::fmt::Display) -> Error {
    Error::InvalidDocument(format!("{path}: {reason}"))
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Parses raw document bytes and builds the immutable [`DirectoryIndex`].
///
/// `uid`, `gid`, and `mtime` are the uniform ownership and modification
/// time applied to every entry, per the CLI's `--uid`/`--gid`/`--mtime`
/// options. `include_cache_files` mirrors `!--no-macos-cache-files`.
pub fn load_document(
    bytes: &[u8],
    form: NormalizationForm,
    include_cache_files: bool,
    uid: u32,
    gid: u32,
    mtime: SystemTime,
) -> Result<(DirectoryIndex, LoadReport), Error> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidDocument(format!("malformed JSON: {e}")))?;

    let top_level = document
        .as_array()
        .ok_or_else(|| Error::InvalidDocument("top level must be a sequence of nodes".to_string()))?;

    let mut builder = Builder {
        by_inode: HashMap::new(),
        by_path: HashMap::new(),
        next_inode: ROOT_INODE + 1,
        report: LoadReport::default(),
    };

    let root = Entry {
        inode: ROOT_INODE,
        parent: ROOT_INODE,
        kind: Kind::Directory,
        name: String::new(),
        size: 0,
        children: Vec::new(),
    };
    builder.by_inode.insert(ROOT_INODE, root);
    builder.by_path.insert("/".to_string(), ROOT_INODE);

    insert_children(&mut builder, top_level, ROOT_INODE, "/", form, "/")?;

    if include_cache_files {
        add_cache_suppression_files(&mut builder);
    }

    let index = DirectoryIndex {
        by_inode: builder.by_inode,
        by_path: builder.by_path,
        total_files: builder.report.total_files,
        total_bytes: builder.report.total_bytes,
        uid,
        gid,
        mtime,
    };
    Ok((index, builder.report))
}

fn insert_children(
    builder: &mut Builder,
    nodes: &[Value],
    parent_inode: u64,
    parent_path: &str,
    form: NormalizationForm,
    context: &str,
) -> Result<(), Error> {
    let mut seen: HashSet<String> = HashSet::new();

    for (index, node) in nodes.iter().enumerate() {
        let node_context = format!("{context}[{index}]");
        let obj = node
            .as_object()
            .ok_or_else(|| invalid(&node_context, "node must be an object"))?;

        let kind_str = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(&node_context, "missing or non-string \"type\""))?;
        let kind = match kind_str {
            "directory" => Kind::Directory,
            "file" => Kind::File,
            other => return Err(invalid(&node_context, format!("unknown kind {other:?}"))),
        };

        let raw_name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(&node_context, "missing or non-string \"name\""))?;
        if raw_name.contains('/') || raw_name.contains('\0') {
            return Err(invalid(&node_context, format!("name {raw_name:?} contains '/' or NUL")));
        }

        let size = obj
            .get("size")
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid(&node_context, "missing or non-negative-integer \"size\""))?;

        let name = normalize_component(raw_name, form);
        if !seen.insert(name.clone()) {
            return Err(invalid(&node_context, format!("duplicate sibling name {name:?}")));
        }

        let child_path = join_path(parent_path, &name);
        let child_inode = builder.alloc_inode();

        let entry = Entry {
            inode: child_inode,
            parent: parent_inode,
            kind,
            name: name.clone(),
            size,
            children: Vec::new(),
        };
        builder.by_inode.insert(child_inode, entry);
        builder.by_path.insert(child_path.clone(), child_inode);
        builder
            .by_inode
            .get_mut(&parent_inode)
            .expect("parent was inserted before its children")
            .children
            .push(child_inode);

        match kind {
            Kind::File => {
                builder.report.total_files += 1;
                builder.report.total_bytes += size;
            }
            Kind::Directory => {
                let contents = match obj.get("contents") {
                    None => &[][..],
                    Some(Value::Array(items)) => items.as_slice(),
                    Some(_) => return Err(invalid(&node_context, "\"contents\" must be a sequence")),
                };
                insert_children(builder, contents, child_inode, &child_path, form, &node_context)?;
            }
        }
    }

    Ok(())
}

fn add_cache_suppression_files(builder: &mut Builder) {
    let root = builder.by_inode.get(&ROOT_INODE).expect("root always present");
    let existing: HashSet<String> = root.children
        .iter()
        .filter_map(|ino| builder.by_inode.get(ino))
        .map(|e| e.name.clone())
        .collect();

    for &name in CACHE_SUPPRESSION_FILES {
        if existing.contains(name) {
            continue;
        }
        let inode = builder.alloc_inode();
        let entry = Entry {
            inode,
            parent: ROOT_INODE,
            kind: Kind::File,
            name: name.to_string(),
            size: 0,
            children: Vec::new(),
        };
        builder.by_inode.insert(inode, entry);
        builder.by_path.insert(format!("/{name}"), inode);
        builder
            .by_inode
            .get_mut(&ROOT_INODE)
            .expect("root always present")
            .children
            .push(inode);
    }
}
