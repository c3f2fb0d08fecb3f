use fuser::consts::FOPEN_DIRECT_IO;
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use log::{debug, error};
use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;

use super::config::FsConfig;
use super::constants::*;
use super::error::{FsError, FsResult};
use super::namespace::{Namespace, Node};
use super::session::SessionManager;

/// Open flags for terminal entries: bypass the page cache so every read
/// and write reaches the process, whatever the offset or synthetic size.
pub const TERMINAL_OPEN_FLAGS: u32 = FOPEN_DIRECT_IO;

/// One entry produced by a directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    /// Inode of the entry
    pub ino: u64,
    /// Offset the kernel passes back to continue after this entry
    pub offset: i64,
    /// Entry type
    pub kind: FileType,
    /// Entry name
    pub name: OsString,
}

/// Synthetic volume statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    /// Total data blocks
    pub blocks: u64,
    /// Free blocks
    pub bfree: u64,
    /// Free blocks available to unprivileged users
    pub bavail: u64,
    /// Total file nodes
    pub files: u64,
    /// Free file nodes
    pub ffree: u64,
    /// Block size
    pub bsize: u32,
    /// Maximum name length
    pub namelen: u32,
    /// Fragment size
    pub frsize: u32,
}

/// FUSE filesystem that turns directory paths into shell commands.
///
/// Metadata operations run directly on the FUSE thread. `open`, `read` and
/// `write` are handed to the tokio runtime and reply once the process or
/// pipe is ready, so a command waiting for input never stalls lookups.
pub struct BashFs {
    namespace: Namespace,
    sessions: SessionManager,
    runtime: Handle,
}

impl BashFs {
    /// Creates the filesystem state.
    ///
    /// # Arguments
    ///
    /// * `config` - Command assembly settings
    /// * `runtime` - Runtime that serves process I/O
    pub fn new(config: &FsConfig, runtime: Handle) -> Self {
        Self {
            namespace: Namespace::new(
                config.terminal_name.as_bytes(),
                config.separator.as_bytes(),
            ),
            sessions: SessionManager::new(config.argv_prefix.iter()),
            runtime,
        }
    }

    /// The path tree backing this filesystem.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The table of open command sessions.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn attr_for(node: &Node) -> FileAttr {
        let mode = if node.is_terminal { FILE_MODE } else { DIR_MODE };
        let stamp = UNIX_EPOCH + Duration::from_nanos(TIMESTAMP_NANOS);
        FileAttr {
            ino: node.ino,
            size: SYNTHETIC_SIZE,
            blocks: SYNTHETIC_BLOCKS,
            atime: stamp,
            mtime: stamp,
            ctime: stamp,
            crtime: stamp,
            kind: if node.is_terminal {
                FileType::RegularFile
            } else {
                FileType::Directory
            },
            perm: (mode & 0o7777) as u16,
            nlink: 1,
            uid: DEFAULT_UID,
            gid: DEFAULT_GID,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE,
        }
    }

    /// Resolves `name` under `parent`, creating the node on first use.
    pub fn lookup_entry(&mut self, parent: u64, name: &OsStr) -> FsResult<FileAttr> {
        let node = self.namespace.lookup(parent, name.as_bytes())?;
        Ok(Self::attr_for(node))
    }

    /// Synthesized attributes for an existing node.
    pub fn attr(&self, ino: u64) -> FsResult<FileAttr> {
        Ok(Self::attr_for(self.namespace.resolve(ino)?))
    }

    /// Lists a directory starting at `offset`.
    ///
    /// Every directory holds exactly one entry, the terminal entry, which
    /// is returned for `offset < 1`.
    pub fn dir_entries(&mut self, ino: u64, offset: i64) -> FsResult<Vec<DirEntry>> {
        if offset >= 1 {
            self.namespace.resolve(ino)?;
            return Ok(Vec::new());
        }
        let name = self.namespace.terminal_name().to_vec();
        let node = self.namespace.get_or_create_child(ino, &name)?;
        Ok(vec![DirEntry {
            ino: node.ino,
            offset: 1,
            kind: FileType::RegularFile,
            name: OsString::from_vec(name),
        }])
    }

    /// Statistics derived from the current node count.
    pub fn volume_stats(&self) -> VolumeStats {
        let nodes = self.namespace.len() as u64;
        VolumeStats {
            blocks: STATFS_TOTAL_BLOCKS,
            bfree: STATFS_FREE_BLOCKS,
            bavail: STATFS_FREE_BLOCKS,
            files: nodes,
            ffree: nodes + 2,
            bsize: BLOCK_SIZE,
            namelen: MAX_NAME_LEN,
            frsize: BLOCK_SIZE,
        }
    }

    /// Command text that opening `ino` will run.
    pub fn command_for(&self, ino: u64) -> FsResult<Vec<u8>> {
        if !self.namespace.resolve(ino)?.is_terminal {
            return Err(FsError::NotTerminal(ino));
        }
        self.namespace.reconstruct_command(ino)
    }

    /// Accepts an attribute change without storing it.
    ///
    /// Shell redirects truncate before writing; the synthetic attributes
    /// are returned unchanged so `> run` works.
    pub fn set_attr(&self, ino: u64, size: Option<u64>) -> FsResult<FileAttr> {
        let attr = self.attr(ino)?;
        if let Some(size) = size {
            debug!("ignoring resize of {} to {}", ino, size);
        }
        Ok(attr)
    }

    /// Spawns the command behind terminal entry `ino`.
    ///
    /// Resolves to the new file handle and the open flags for the kernel.
    /// Terminal files are streams, so they always bypass the page cache.
    pub fn open_session(
        &self,
        ino: u64,
    ) -> impl Future<Output = FsResult<(u64, u32)>> + Send + 'static {
        let command = self.command_for(ino);
        let sessions = self.sessions.clone();
        async move {
            let command = command?;
            debug!("open: {} -> {:?}", ino, String::from_utf8_lossy(&command));
            let fh = sessions.spawn(&command)?;
            Ok((fh, TERMINAL_OPEN_FLAGS))
        }
    }

    /// Reads from the session's output. `offset` is ignored.
    pub fn read_session(
        &self,
        fh: u64,
        offset: i64,
        size: u32,
    ) -> impl Future<Output = FsResult<Vec<u8>>> + Send + 'static {
        let sessions = self.sessions.clone();
        async move {
            let data = sessions.read(fh, size as usize).await?;
            debug!("read: {} bytes at offset {} from {}", data.len(), offset, fh);
            Ok(data)
        }
    }

    /// Writes to the session's input. `offset` is ignored.
    pub fn write_session(
        &self,
        fh: u64,
        offset: i64,
        data: &[u8],
    ) -> impl Future<Output = FsResult<u32>> + Send + 'static {
        let sessions = self.sessions.clone();
        let data = data.to_vec();
        async move {
            let written = sessions.write(fh, &data).await?;
            debug!("write: {} bytes at offset {} to {}", written, offset, fh);
            Ok(written as u32)
        }
    }
}

impl Filesystem for BashFs {
    fn destroy(&mut self) {
        let _guard = self.runtime.enter();
        self.sessions.release_all();
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup: parent {}, name {:?}", parent, name);
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => {
                error!("lookup failed: {}", e);
                reply.error(e.errno());
            }
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        debug!("getattr: {}", ino);
        match self.attr(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        debug!("access: {} mask {:#o}", ino, mask);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let stats = self.volume_stats();
        reply.statfs(
            stats.blocks,
            stats.bfree,
            stats.bavail,
            stats.files,
            stats.ffree,
            stats.bsize,
            stats.namelen,
            stats.frsize,
        );
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.namespace.resolve(ino) {
            Ok(_) => reply.opened(ino, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: {} offset {}", ino, offset);
        match self.dir_entries(ino, offset) {
            Ok(entries) => {
                for entry in entries {
                    if reply.add(entry.ino, entry.offset, entry.kind, &entry.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr: {} size {:?}", ino, size);
        match self.set_attr(ino, size) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("open: {}", ino);
        let open = self.open_session(ino);
        self.runtime.spawn(async move {
            match open.await {
                Ok((fh, flags)) => reply.opened(fh, flags),
                Err(e) => {
                    error!("open {} failed: {}", ino, e);
                    reply.error(e.errno());
                }
            }
        });
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        let read = self.read_session(fh, offset, size);
        self.runtime.spawn(async move {
            match read.await {
                Ok(data) => reply.data(&data),
                Err(e) => {
                    error!("read failed: {}", e);
                    reply.error(e.errno());
                }
            }
        });
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let write = self.write_session(fh, offset, data);
        self.runtime.spawn(async move {
            match write.await {
                Ok(written) => reply.written(written),
                Err(e) => {
                    error!("write failed: {}", e);
                    reply.error(e.errno());
                }
            }
        });
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let _guard = self.runtime.enter();
        self.sessions.release(fh);
        reply.ok();
    }
}
