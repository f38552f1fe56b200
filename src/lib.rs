//! PhantomFS: a read-only FUSE filesystem that mounts a declarative JSON
//! tree description and synthesizes file contents on demand, without
//! backing storage.

pub mod block_cache;
pub mod cli;
pub mod error;
pub mod fs;
pub mod limiter;
pub mod logging;
pub mod path;
pub mod size;
pub mod stats;
pub mod synth;
pub mod tree;

pub use error::{Error, Result};
