//! Crate-wide error type and its translation to process exit codes and
//! POSIX errno values at the `fuser` callback boundary.

use std::fmt;

/// Exit code returned when the input document fails validation.
pub const EXIT_INVALID_DOCUMENT: i32 = 1;
/// Exit code returned when the FUSE bridge refuses to attach.
pub const EXIT_MOUNT_ERROR: i32 = 2;
/// Exit code returned for CLI misuse, including semantically invalid
/// option values that `clap` itself cannot range-check.
pub const EXIT_CLI_MISUSE: i32 = 64;

/// All error kinds produced by this crate.
///
/// `InvalidDocument` and `InvalidConfig` are fatal before a mount is
/// established. `PathNotFound`, `NotDir`, `IsDir`, and `ReadOnly` occur
/// during normal callback handling and are translated to an errno by
/// [`Error::to_errno`]; they are never allowed to unwind across the
/// `fuser::Filesystem` boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The input document is malformed or semantically invalid.
    InvalidDocument(String),
    /// A CLI value was rejected by the size parser or a range check.
    InvalidConfig(String),
    /// The requested path or inode is absent from the directory index.
    PathNotFound,
    /// A directory-only operation (`readdir`, `opendir`) was attempted on a file.
    NotDir,
    /// `read` was attempted on a directory.
    IsDir,
    /// A mutating operation was attempted on this read-only filesystem.
    ReadOnly,
    /// The FUSE bridge refused to attach the filesystem to the mount point.
    MountError(String),
}

impl Error {
    /// Maps callback-time errors onto the POSIX errno returned to the kernel.
    ///
    /// Only meaningful for the four variants that can occur inside a
    /// `fuser::Filesystem` callback; calling this on `InvalidDocument`,
    /// `InvalidConfig`, or `MountError` is a programming error, since those
    /// always abort before a session starts.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::PathNotFound => libc::ENOENT,
            Error::NotDir => libc::ENOTDIR,
            Error::IsDir => libc::EISDIR,
            Error::ReadOnly => libc::EROFS,
            Error::InvalidDocument(_) | Error::InvalidConfig(_) | Error::MountError(_) => {
                unreachable!("{self} cannot occur inside a filesystem callback")
            }
        }
    }

    /// The process exit code this error implies when it aborts startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidDocument(_) => EXIT_INVALID_DOCUMENT,
            Error::InvalidConfig(_) => EXIT_CLI_MISUSE,
            Error::MountError(_) => EXIT_MOUNT_ERROR,
            Error::PathNotFound | Error::NotDir | Error::IsDir | Error::ReadOnly => {
                unreachable!("{self} does not abort startup")
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidDocument(msg) => write!(f, "invalid document: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Error::PathNotFound => write!(f, "no such file or directory"),
            Error::NotDir => write!(f, "not a directory"),
            Error::IsDir => write!(f, "is a directory"),
            Error::ReadOnly => write!(f, "read-only file system"),
            Error::MountError(msg) => write!(f, "mount failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
