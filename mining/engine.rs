//! Compute-engine subprocess handle
//!
//! The engine is spawned once per run and persists across requests:
//! work arrives on its stdin, results stream back on its stdout, and
//! its stderr is passed through to the operator. Termination is an
//! interrupt signal with no shutdown handshake.

use std::io;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

/// A running compute-engine process.
pub struct Engine {
    child: Child,
}

impl Engine {
    /// Spawn the engine binary. Returns the handle, its stdin writer
    /// and its stdout read half.
    pub fn spawn(path: &Path) -> io::Result<(Engine, Box<dyn io::Write + Send>, ChildStdout)> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdout unavailable"))?;
        log::info!("compute engine started: {} (pid {})", path.display(), child.id());
        Ok((Engine { child }, Box::new(stdin), stdout))
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Deliver the interrupt signal. On non-unix platforms the process
    /// is killed outright.
    pub fn interrupt(&mut self) {
        #[cfg(unix)]
        {
            let pid = self.child.id() as libc::pid_t;
            // SAFETY: plain signal delivery to a child we own.
            let rc = unsafe { libc::kill(pid, libc::SIGINT) };
            if rc != 0 {
                log::debug!("SIGINT to engine pid {pid} failed, killing");
                let _ = self.child.kill();
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }
    }

    /// Reap the process. Interrupts first if it is still running.
    pub fn shutdown(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("compute engine exited: {status}");
                return;
            }
            Ok(None) => {}
            Err(e) => log::warn!("compute engine status check failed: {e}"),
        }
        self.interrupt();
        match self.child.wait() {
            Ok(status) => log::info!("compute engine stopped: {status}"),
            Err(e) => log::warn!("failed to reap compute engine: {e}"),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // The engine must never be left running headless.
        self.shutdown();
    }
}
