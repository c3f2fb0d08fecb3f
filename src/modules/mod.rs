//! Core filesystem modules.
//! 
//! This module provides the main components of the filesystem:
//! 
//! - `constants`: Filesystem constants and default values
//! - `error`: Error kinds and their errno mapping
//! - `config`: Command assembly settings
//! - `escape`: Path segment escaping
//! - `namespace`: Lazily built tree of command segments
//! - `session`: Subprocesses bound to open file handles
//! - `proto`: FUSE protocol implementation
//! - `mount`: Filesystem mounting and lifecycle

#[allow(missing_docs)]
pub mod constants;
pub mod error;
/// Filesystem configuration loading and validation.
pub mod config;
pub mod escape;
/// Path tree that maps directory lookups to command segments.
pub mod namespace;
pub mod session;
/// FUSE operations backed by the namespace and session table.
pub mod proto;
/// Mounting and signal-driven unmounting.
pub mod mount;
