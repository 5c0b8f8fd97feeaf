//! Process-group-aware child handle.
//!
//! A `process-wrap` `ChildWrapper` trait object, narrowed to exactly the
//! operations the bridge needs: stdout capture for streaming and group
//! kill for cancellation/timeout.

use process_wrap::tokio::{ChildWrapper, CommandWrap, ProcessGroup};
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};

pub struct BridgeChild {
    inner: Box<dyn ChildWrapper>,
}

/// Spawn `command` as the leader of a new process group so a later kill
/// tears down the whole `cursor-agent` subtree, not just the direct child.
pub fn spawn_grouped(command: Command) -> std::io::Result<BridgeChild> {
    let inner = CommandWrap::from(command)
        .wrap(ProcessGroup::leader())
        .spawn()?;
    Ok(BridgeChild { inner })
}

impl BridgeChild {
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.inner.stdout().take()
    }

    pub async fn kill(&mut self) -> std::io::Result<()> {
        std::pin::Pin::from(self.inner.kill()).await
    }

    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        std::pin::Pin::from(self.inner.wait()).await
    }

    /// Drain stdout and stderr concurrently with waiting for exit, avoiding
    /// a deadlock on a full pipe buffer.
    pub async fn wait_with_output(&mut self) -> std::io::Result<(String, String, std::process::ExitStatus)> {
        let mut stdout_pipe = self.inner.stdout().take();
        let mut stderr_pipe = self.inner.stderr().take();

        let stdout_fut = async move {
            let mut buf = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        };
        let stderr_fut = async move {
            let mut buf = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        };

        let (stdout, stderr, status) = tokio::join!(stdout_fut, stderr_fut, self.wait());
        Ok((stdout, stderr, status?))
    }
}
