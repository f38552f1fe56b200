//! Binds the directory index, content synthesizer, and limiter to the
//! `fuser::Filesystem` callback surface.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request,
};

use crate::error::Error;
use crate::limiter::Limiter;
use crate::path::Sanitizer;
use crate::stats::Counters;
use crate::synth::ContentSynthesizer;
use crate::tree::{DirectoryIndex, Entry};

/// Attribute cache TTL handed back to the kernel. The index never
/// changes, so any value would be correct; one second matches common FUSE
/// filesystem defaults and keeps `getattr` traffic visible to the limiter
/// and stats reporter rather than being fully suppressed by the kernel.
const ATTR_TTL: Duration = Duration::from_secs(1);

/// Statfs block size reported to the kernel.
const STATFS_BLOCK_SIZE: u32 = 512;

/// AppleDouble companion file prefix, probed heavily by macOS Finder.
const APPLEDOUBLE_PREFIX: &str = "._";

/// Extended attribute names that are recognized-but-absent (`ENODATA`)
/// rather than generically empty.
const KNOWN_ABSENT_XATTRS: &[&str] =
    &["com.apple.quarantine", "com.apple.FinderInfo", "security.capability"];

/// The assembled, read-only synthetic filesystem.
pub struct PhantomFs {
    index: Arc<DirectoryIndex>,
    synth: Arc<ContentSynthesizer>,
    sanitizer: Arc<Sanitizer>,
    limiter: Arc<Limiter>,
    counters: Arc<Counters>,
    ignore_appledouble: bool,
}

impl PhantomFs {
    pub fn new(
        index: Arc<DirectoryIndex>,
        synth: Arc<ContentSynthesizer>,
        sanitizer: Arc<Sanitizer>,
        limiter: Arc<Limiter>,
        counters: Arc<Counters>,
        ignore_appledouble: bool,
    ) -> Self {
        Self { index, synth, sanitizer, limiter, counters, ignore_appledouble }
    }

    fn file_attr(&self, entry: &Entry) -> FileAttr {
        let size = self.index.report_size(entry);
        FileAttr {
            ino: entry.inode,
            size,
            blocks: size.div_ceil(512),
            atime: self.index.mtime,
            mtime: self.index.mtime,
            ctime: self.index.mtime,
            crtime: self.index.mtime,
            kind: if entry.is_dir() { FileType::Directory } else { FileType::RegularFile },
            perm: entry.mode() as u16,
            nlink: entry.nlink(),
            uid: self.index.uid,
            gid: self.index.gid,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }

    /// Resolves and validates a directory for `readdir`, building its
    /// `.`/`..`/children listing.
    fn readdir_entries(&self, ino: u64) -> Result<Vec<(u64, FileType, String)>, Error> {
        let dir = self.index.get(ino).ok_or(Error::PathNotFound)?;
        if !dir.is_dir() {
            return Err(Error::NotDir);
        }

        let mut entries: Vec<(u64, FileType, String)> =
            vec![(dir.inode, FileType::Directory, ".".to_string())];
        entries.push((dir.parent, FileType::Directory, "..".to_string()));
        for &child_ino in &dir.children {
            if let Some(child) = self.index.get(child_ino) {
                let kind = if child.is_dir() { FileType::Directory } else { FileType::RegularFile };
                entries.push((child.inode, kind, child.name.clone()));
            }
        }
        Ok(entries)
    }

    /// Resolves and validates a file for `read`.
    fn readable_file(&self, ino: u64) -> Result<&Entry, Error> {
        let entry = self.index.get(ino).ok_or(Error::PathNotFound)?;
        if entry.is_dir() {
            return Err(Error::IsDir);
        }
        Ok(entry)
    }

    /// Resolves a path probe that missed the index. Host indexers repeatedly
    /// probe AppleDouble companion files (`._foo`); those are demoted to a
    /// debug log unless even that is silenced, everything else logs a warning.
    fn log_missing_path(&self, context: &str, name: &str) {
        let is_appledouble = name.starts_with(APPLEDOUBLE_PREFIX);
        if is_appledouble {
            if !self.ignore_appledouble {
                tracing::debug!(name, "probed missing AppleDouble companion in {context}");
            }
        } else {
            tracing::warn!(name, "{context}: no such file or directory");
        }
    }
}

impl Filesystem for PhantomFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let canonical = self.sanitizer.sanitize(name);
        match self.index.lookup_child(parent, &canonical).ok_or(Error::PathNotFound) {
            Ok(entry) => reply.entry(&ATTR_TTL, &self.file_attr(entry), 0),
            Err(e) => {
                self.log_missing_path("lookup", &canonical);
                reply.error(e.to_errno());
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        self.limiter.admit();
        self.counters.record_operation();

        match self.index.get(ino).ok_or(Error::PathNotFound) {
            Ok(entry) => reply.attr(&ATTR_TTL, &self.file_attr(entry)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        self.limiter.admit();
        self.counters.record_operation();

        let dir = match self.readdir_entries(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };

        for (i, (ino, kind, name)) in dir.into_iter().enumerate().skip(offset as usize) {
            // `add` returns true when the reply buffer is full; stop and
            // let the kernel resume with a later offset.
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        self.limiter.admit();
        self.counters.record_operation();

        let entry = match self.readable_file(ino) {
            Ok(entry) => entry,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };

        let path = self.index.path_of(ino);
        let offset = offset.max(0) as u64;
        let data = self.synth.read(&path, entry.size, offset, size as u64);
        self.counters.record_bytes_read(data.len() as u64);
        reply.data(&data);
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.index.get(ino).ok_or(Error::PathNotFound) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.index.get(ino).ok_or(Error::PathNotFound) {
            Ok(entry) if entry.is_dir() => reply.opened(0, 0),
            Ok(_) => reply.error(Error::NotDir.to_errno()),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn readlink(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyData) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _link_name: &OsStr,
        _target: &std::path::Path,
        reply: ReplyEntry,
    ) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(Error::ReadOnly.to_errno());
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(Error::ReadOnly.to_errno());
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.index.get(ino).ok_or(Error::PathNotFound) {
            // setattr on an otherwise-valid, existing node is still a
            // mutation on a read-only filesystem.
            Ok(_) => reply.error(Error::ReadOnly.to_errno()),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        if self.index.get(ino).is_none() {
            reply.error(Error::PathNotFound.to_errno());
            return;
        }
        if let Some(name) = name.to_str() {
            if KNOWN_ABSENT_XATTRS.contains(&name) {
                reply.error(libc::ENODATA);
                return;
            }
        }
        if size == 0 {
            reply.size(0);
        } else {
            reply.data(&[]);
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        if self.index.get(ino).is_none() {
            reply.error(Error::PathNotFound.to_errno());
            return;
        }
        if size == 0 {
            reply.size(0);
        } else {
            reply.data(&[]);
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let total_blocks = self.index.total_bytes.div_ceil(STATFS_BLOCK_SIZE as u64);
        reply.statfs(
            total_blocks,
            0,
            0,
            self.index.total_files,
            0,
            STATFS_BLOCK_SIZE,
            255,
            STATFS_BLOCK_SIZE,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{NormalizationForm, Sanitizer};
    use crate::synth::{ContentSynthesizer, FillSynth};
    use crate::tree::load_document;
    use std::time::SystemTime;

    fn build_fs(doc: &[u8]) -> PhantomFs {
        let (index, _) =
            load_document(doc, NormalizationForm::None, false, 0, 0, SystemTime::UNIX_EPOCH).unwrap();
        PhantomFs::new(
            Arc::new(index),
            Arc::new(ContentSynthesizer::Fill(FillSynth::new(0))),
            Arc::new(Sanitizer::new(NormalizationForm::None)),
            Arc::new(Limiter::new(0.0, 0)),
            Arc::new(Counters::default()),
            false,
        )
    }

    #[test]
    fn file_attr_reports_conventional_directory_size_and_modes() {
        let fs = build_fs(br#"[{"type":"directory","name":"d","size":123,"contents":[{"type":"file","name":"f","size":7}]}]"#);
        let dir = fs.index.get_by_path("/d").unwrap();
        let file = fs.index.get_by_path("/d/f").unwrap();

        let dir_attr = fs.file_attr(dir);
        assert_eq!(dir_attr.size, crate::tree::DIR_REPORT_SIZE);
        assert_eq!(dir_attr.perm, crate::tree::DIR_MODE as u16);
        assert_eq!(dir_attr.kind, FileType::Directory);
        assert_eq!(dir_attr.nlink, 2);

        let file_attr = fs.file_attr(file);
        assert_eq!(file_attr.size, 7);
        assert_eq!(file_attr.perm, crate::tree::FILE_MODE as u16);
        assert_eq!(file_attr.kind, FileType::RegularFile);
        assert_eq!(file_attr.nlink, 1);
    }

    #[test]
    fn readdir_on_a_file_reports_not_dir() {
        let fs = build_fs(br#"[{"type":"file","name":"f","size":1}]"#);
        let file = fs.index.get_by_path("/f").unwrap();
        let err = fs.readdir_entries(file.inode).unwrap_err();
        assert_eq!(err, Error::NotDir);
        assert_eq!(err.to_errno(), libc::ENOTDIR);
    }

    #[test]
    fn read_on_a_directory_reports_is_dir() {
        let fs = build_fs(br#"[{"type":"directory","name":"d","size":0,"contents":[]}]"#);
        let dir = fs.index.get_by_path("/d").unwrap();
        let err = fs.readable_file(dir.inode).unwrap_err();
        assert_eq!(err, Error::IsDir);
        assert_eq!(err.to_errno(), libc::EISDIR);
    }

    #[test]
    fn missing_inode_reports_path_not_found() {
        let fs = build_fs(br#"[]"#);
        assert_eq!(fs.readdir_entries(999).unwrap_err(), Error::PathNotFound);
        assert_eq!(fs.readable_file(999).unwrap_err(), Error::PathNotFound);
    }
}
