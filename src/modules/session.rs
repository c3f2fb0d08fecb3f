//! Process sessions bound to open file handles.
//!
//! Opening the terminal entry spawns the reconstructed command through a
//! shell. The resulting [`Session`] owns the child process together with its
//! stdin and stdout pipes; FUSE reads drain stdout and FUSE writes feed stdin.
//! Both pipes are independent, so a read blocked on output never holds up a
//! write on the same handle.

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::constants::INITIAL_HANDLE;
use super::error::{FsError, FsResult};

/// A live subprocess reachable through one file handle.
#[derive(Debug)]
pub struct Session {
    /// File handle returned to the kernel
    pub handle: u64,
    /// Command text the process was started with
    pub command: String,
    child: Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    stdout: tokio::sync::Mutex<ChildStdout>,
}

impl Session {
    /// Sends `SIGTERM` unless the process has already exited.
    ///
    /// Does not wait for the process. Once the session is dropped the tokio
    /// runtime reaps the child in the background.
    fn terminate(&self) {
        let mut child = self.child.lock();
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("session {} already exited with {}", self.handle, status);
            }
            Ok(None) => {
                let Some(pid) = child.id() else {
                    return;
                };
                match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    Ok(()) | Err(Errno::ESRCH) => {
                        debug!("sent SIGTERM to session {} (pid {})", self.handle, pid);
                    }
                    Err(e) => error!("Failed to terminate session {}: {}", self.handle, e),
                }
            }
            Err(e) => warn!("Failed to poll session {}: {}", self.handle, e),
        }
    }
}

/// Maps file handles to running subprocesses.
///
/// Cloning is cheap; clones share the same session table, which lets async
/// tasks serve reads and writes while the FUSE thread keeps dispatching.
#[derive(Debug, Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<u64, Arc<Session>>>>,
    next_handle: Arc<AtomicU64>,
    argv_prefix: Arc<Vec<OsString>>,
}

impl SessionManager {
    /// Creates a manager that runs commands as `argv_prefix... <command>`.
    pub fn new<I, S>(argv_prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_handle: Arc::new(AtomicU64::new(INITIAL_HANDLE)),
            argv_prefix: Arc::new(argv_prefix.into_iter().map(Into::into).collect()),
        }
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Returns true when no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Returns true if `handle` is bound to a session.
    pub fn contains(&self, handle: u64) -> bool {
        self.sessions.lock().contains_key(&handle)
    }

    /// Starts `command` with piped stdin and stdout and registers a session.
    ///
    /// Must be called from within a tokio runtime. No session is registered
    /// when spawning fails.
    ///
    /// # Returns
    ///
    /// The file handle of the new session
    pub fn spawn(&self, command: &[u8]) -> FsResult<u64> {
        let command_text = String::from_utf8_lossy(command).into_owned();
        let spawn_error = |source: io::Error| FsError::Spawn {
            command: command_text.clone(),
            source,
        };

        let (program, args) = self.argv_prefix.split_first().ok_or_else(|| {
            spawn_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty argv prefix",
            ))
        })?;

        let mut child = Command::new(program)
            .args(args)
            .arg(OsStr::from_bytes(command))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let missing = |name: &str| {
            spawn_error(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} was not captured", name),
            ))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        info!(
            "session {}: spawned {:?} (pid {:?})",
            handle,
            command_text,
            child.id()
        );

        let session = Session {
            handle,
            command: command_text,
            child: Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            stdout: tokio::sync::Mutex::new(stdout),
        };
        self.sessions.lock().insert(handle, Arc::new(session));
        Ok(handle)
    }

    fn get(&self, handle: u64) -> FsResult<Arc<Session>> {
        self.sessions
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(FsError::UnknownHandle(handle))
    }

    /// Reads up to `length` bytes of the process's output.
    ///
    /// Returns fewer bytes when the pipe has less available and an empty
    /// buffer once the process has closed its stdout.
    pub async fn read(&self, handle: u64, length: usize) -> FsResult<Vec<u8>> {
        let session = self.get(handle)?;
        let mut stdout = session.stdout.lock().await;
        let mut buf = vec![0u8; length];
        let n = stdout
            .read(&mut buf)
            .await
            .map_err(|source| FsError::Stream { handle, source })?;
        buf.truncate(n);
        debug!("session {}: read {} bytes", handle, n);
        Ok(buf)
    }

    /// Writes all of `data` to the process's input.
    ///
    /// Suspends while the pipe is full.
    pub async fn write(&self, handle: u64, data: &[u8]) -> FsResult<usize> {
        let session = self.get(handle)?;
        let mut stdin = session.stdin.lock().await;
        stdin
            .write_all(data)
            .await
            .map_err(|source| FsError::Stream { handle, source })?;
        debug!("session {}: wrote {} bytes", handle, data.len());
        Ok(data.len())
    }

    /// Removes the session and terminates its process if still running.
    ///
    /// Releasing a handle that is not (or no longer) registered is a no-op.
    pub fn release(&self, handle: u64) {
        let removed = self.sessions.lock().remove(&handle);
        match removed {
            Some(session) => {
                session.terminate();
                debug!("session {}: released {:?}", handle, session.command);
            }
            None => debug!("release of unknown handle {}", handle),
        }
    }

    /// Releases every open session.
    pub fn release_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().collect();
        if !sessions.is_empty() {
            info!("Terminating {} open sessions", sessions.len());
        }
        for (_, session) in sessions {
            session.terminate();
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(super::constants::DEFAULT_ARGV_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    async fn read_to_end(manager: &SessionManager, handle: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let chunk = assert_ok!(manager.read(handle, 4096).await);
            if chunk.is_empty() {
                return out;
            }
            out.extend_from_slice(&chunk);
        }
    }

    #[tokio::test]
    async fn test_read_command_output() {
        let manager = SessionManager::default();
        let handle = assert_ok!(manager.spawn(b"echo hello"));
        assert_eq!(handle, INITIAL_HANDLE);
        assert_eq!(read_to_end(&manager, handle).await, b"hello\n");
        manager.release(handle);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read_echoes() {
        let manager = SessionManager::default();
        let handle = assert_ok!(manager.spawn(b"cat"));
        assert_eq!(assert_ok!(manager.write(handle, b"ping").await), 4);
        let mut echoed = Vec::new();
        while echoed.len() < 4 {
            let chunk = assert_ok!(manager.read(handle, 4096).await);
            assert!(!chunk.is_empty(), "cat exited early");
            echoed.extend_from_slice(&chunk);
        }
        assert_eq!(echoed, b"ping");
        manager.release(handle);
    }

    #[tokio::test]
    async fn test_pipeline_through_shell() {
        let manager = SessionManager::default();
        let handle = assert_ok!(manager.spawn(b"printf 'b\\na\\n' | sort"));
        assert_eq!(read_to_end(&manager, handle).await, b"a\nb\n");
        manager.release(handle);
    }

    #[tokio::test]
    async fn test_read_respects_length() {
        let manager = SessionManager::default();
        let handle = assert_ok!(manager.spawn(b"printf abcdef"));
        let mut out = Vec::new();
        loop {
            let chunk = assert_ok!(manager.read(handle, 2).await);
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 2);
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, b"abcdef");
        manager.release(handle);
    }

    #[tokio::test]
    async fn test_release_after_exit() {
        let manager = SessionManager::default();
        let handle = assert_ok!(manager.spawn(b"true"));
        assert!(read_to_end(&manager, handle).await.is_empty());
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.release(handle);
        assert!(!manager.contains(handle));
        manager.release(handle);
    }

    #[tokio::test]
    async fn test_release_terminates_running_process() {
        let manager = SessionManager::default();
        let handle = assert_ok!(manager.spawn(b"sleep 30"));
        let session = assert_ok!(manager.get(handle));
        manager.release(handle);

        let mut exited = false;
        for _ in 0..100 {
            if let Ok(Some(_)) = session.child.lock().try_wait() {
                exited = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(exited, "process survived release");
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let manager = SessionManager::default();
        let a = assert_ok!(manager.spawn(b"true"));
        let b = assert_ok!(manager.spawn(b"true"));
        assert_ne!(a, b);
        assert_eq!(manager.len(), 2);
        manager.release_all();
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_registers_nothing() {
        let manager = SessionManager::new(["/nonexistent/bashfs-shell", "-c"]);
        let err = assert_err!(manager.spawn(b"echo hi"));
        assert!(matches!(err, FsError::Spawn { .. }));
        assert!(manager.is_empty());

        let empty = SessionManager::new(Vec::<String>::new());
        assert!(matches!(empty.spawn(b"echo hi"), Err(FsError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let manager = SessionManager::default();
        assert!(matches!(
            manager.read(99, 16).await,
            Err(FsError::UnknownHandle(99))
        ));
        assert!(matches!(
            manager.write(99, b"x").await,
            Err(FsError::UnknownHandle(99))
        ));
    }

    #[tokio::test]
    async fn test_write_to_exited_process_is_stream_error() {
        let manager = SessionManager::default();
        let handle = assert_ok!(manager.spawn(b"exec 0<&-; true"));
        assert!(read_to_end(&manager, handle).await.is_empty());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = assert_err!(manager.write(handle, &vec![b'x'; 1 << 20]).await);
        assert!(matches!(err, FsError::Stream { .. }));
        assert!(manager.contains(handle));
        manager.release(handle);
    }
}
