use anyhow::{anyhow, Context, Result};
use fuser::MountOption;
use libc::{c_int, SIGINT, SIGTERM};
use log::info;
use signal_hook::iterator::Signals;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use super::config::FsConfig;
use super::proto::BashFs;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Why the mount loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// A termination signal arrived
    Signal(c_int),
    /// The FUSE session ended on its own, e.g. after `fusermount -u`
    Unmounted,
}

/// Blocks until a signal from `signals` is pending or `session_finished`
/// reports that the FUSE session thread has exited.
pub fn wait_for_shutdown<F>(signals: &mut Signals, session_finished: F) -> Shutdown
where
    F: Fn() -> bool,
{
    loop {
        if let Some(sig) = signals.pending().next() {
            return Shutdown::Signal(sig);
        }
        if session_finished() {
            return Shutdown::Unmounted;
        }
        thread::sleep(SHUTDOWN_POLL);
    }
}

/// Owns the runtime that serves command sessions and mounts [`BashFs`].
pub struct MountManager {
    config: FsConfig,
    runtime: tokio::runtime::Runtime,
}

impl MountManager {
    /// Validates `config` and starts the process I/O runtime.
    pub fn new(config: FsConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("bashfs-io")
            .build()
            .context("Failed to start tokio runtime")?;
        Ok(Self { config, runtime })
    }

    /// Mount options passed to the kernel.
    ///
    /// `DefaultPermissions` is deliberately absent: the synthetic
    /// attributes grant everything and `access` always succeeds.
    pub fn mount_options(&self) -> Vec<MountOption> {
        vec![MountOption::FSName(self.config.fs_name.clone())]
    }

    /// Mounts the filesystem at `mount_point` and serves it until `SIGINT`
    /// or `SIGTERM` arrives or the filesystem is unmounted from outside.
    pub fn mount(self, mount_point: &Path) -> Result<()> {
        let abs_mount = fs::canonicalize(mount_point)
            .with_context(|| format!("Mount point does not exist: {}", mount_point.display()))?;
        if !abs_mount.is_dir() {
            return Err(anyhow!("Mount point is not a directory: {:?}", abs_mount));
        }

        let fs = BashFs::new(&self.config, self.runtime.handle().clone());
        let session = fuser::spawn_mount2(fs, &abs_mount, &self.mount_options())
            .with_context(|| format!("Failed to mount at {:?}", abs_mount))?;
        info!("Mounted {} at {:?}", self.config.fs_name, abs_mount);

        // Signal handling
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        match wait_for_shutdown(&mut signals, || session.guard.is_finished()) {
            Shutdown::Signal(sig) => info!("Received signal {}, unmounting...", sig),
            Shutdown::Unmounted => info!("Filesystem was unmounted externally"),
        }

        drop(session);
        info!("Unmounted {:?}", abs_mount);

        self.runtime.shutdown_background();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::{SIGUSR1, SIGUSR2};
    use signal_hook::low_level::raise;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio_test::assert_err;

    #[test]
    fn test_shutdown_when_session_ends() -> Result<()> {
        let mut signals = Signals::new([SIGUSR2])?;
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let unmounter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });

        let reason = wait_for_shutdown(&mut signals, || finished.load(Ordering::SeqCst));
        assert_eq!(reason, Shutdown::Unmounted);
        unmounter.join().map_err(|_| anyhow!("unmount thread panicked"))?;
        Ok(())
    }

    #[test]
    fn test_shutdown_on_signal() -> Result<()> {
        let mut signals = Signals::new([SIGUSR1])?;
        raise(SIGUSR1)?;
        assert_eq!(
            wait_for_shutdown(&mut signals, || false),
            Shutdown::Signal(SIGUSR1)
        );
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = FsConfig {
            argv_prefix: Vec::new(),
            ..FsConfig::default()
        };
        assert!(MountManager::new(config).is_err());
    }

    #[test]
    fn test_mount_options_carry_fs_name() -> Result<()> {
        let manager = MountManager::new(FsConfig {
            fs_name: "pipes".to_string(),
            ..FsConfig::default()
        })?;
        let options = manager.mount_options();
        assert_eq!(options.len(), 1);
        assert!(matches!(&options[0], MountOption::FSName(name) if name == "pipes"));
        assert!(!options.contains(&MountOption::DefaultPermissions));
        Ok(())
    }

    #[test]
    fn test_missing_mount_point() -> Result<()> {
        let dir = tempdir()?;
        let manager = MountManager::new(FsConfig::default())?;
        assert_err!(manager.mount(&dir.path().join("missing")));
        Ok(())
    }
}
