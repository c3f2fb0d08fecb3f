use std::time::Duration;

// File system constants
pub const TTL: Duration = Duration::from_secs(300);
pub const BLOCK_SIZE: u32 = 512;
pub const SYNTHETIC_SIZE: u64 = 4096;
pub const SYNTHETIC_BLOCKS: u64 = 1;
pub const DIR_MODE: u32 = 0o040777;
pub const FILE_MODE: u32 = 0o100777;
pub const TIMESTAMP_NANOS: u64 = 1;
pub const MAX_NAME_LEN: u32 = 255;

// Identity generators
pub const ROOT_INODE: u64 = 1;
pub const INITIAL_INODE: u64 = 10;
pub const INITIAL_HANDLE: u64 = 10;

// Volume statistics
pub const STATFS_TOTAL_BLOCKS: u64 = 0;
pub const STATFS_FREE_BLOCKS: u64 = 20;

// User and group IDs
pub const DEFAULT_UID: u32 = 1000;
pub const DEFAULT_GID: u32 = 1000;

// Command assembly defaults
pub const DEFAULT_TERMINAL_NAME: &str = "run";
pub const DEFAULT_SEPARATOR: &str = " | ";
pub const DEFAULT_ARGV_PREFIX: [&str; 2] = ["bash", "-c"];
pub const DEFAULT_FS_NAME: &str = "bashfs";
