#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! bashfs: a filesystem whose paths are shell pipelines
//! 
//! Every directory name below the mount point is a command segment. Opening
//! the reserved `run` file inside a directory spawns the segments joined by
//! `" | "` through `bash -c`; reading the file returns the command's output
//! and writing to it feeds the command's input.
//! 
//! ## Features
//! 
//! - Directories are created on first lookup and keep their inode forever
//! - Bytes that cannot appear in a path are escaped with `!`
//! - Configurable shell, separator and terminal name
//! - Commands run on a tokio runtime, so slow processes never block lookups
//! 
//! ## Quick Start
//! 
//! ```rust,no_run
//! use bashfs::{FsConfig, MountManager};
//! use std::path::Path;
//! 
//! # fn main() -> anyhow::Result<()> {
//! let manager = MountManager::new(FsConfig::default())?;
//! manager.mount(Path::new("/tmp/bashfs"))?;
//! # Ok(())
//! # }
//! ```
//! 
//! Then, from a shell:
//! 
//! ```text
//! $ cat "/tmp/bashfs/echo hello/run"
//! hello
//! $ cat "/tmp/bashfs/cat !oetc!ohostname/tr a!mz A!mZ/run"
//! ```
//! 
//! ## Escaping
//! 
//! A byte in `0x00..=0x3f` (except space, `>` and `?`), `~` or DEL is
//! written as `!` followed by the byte XOR `0x40`. Use `bashfs encode` to
//! produce escaped segments.

pub mod modules;

pub use modules::config::FsConfig;
pub use modules::error::{FsError, FsResult};
pub use modules::mount::MountManager;
pub use modules::proto::BashFs;

// Re-export commonly used types
pub use modules::escape::{decode, encode};
pub use modules::namespace::Namespace;
pub use modules::session::SessionManager;
