use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Write side of a server console.
///
/// Commands are plain text lines on the child's stdin. The handle is cheap to
/// clone; writes from different clones never interleave within a line.
///
/// # Example
///
/// ```no_run
/// use fleet_runner::transport::{StdioConsole, spawn_line_reader};
/// use fleet_runner::error::Result;
/// use std::process::Stdio;
/// use tokio::process::Command;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let mut child = Command::new("java")
///         .args(["-jar", "start.jar", "nogui"])
///         .stdin(Stdio::piped())
///         .stdout(Stdio::piped())
///         .spawn()?;
///
///     let stdin = child.stdin.take().expect("stdin is piped");
///     let stdout = child.stdout.take().expect("stdout is piped");
///
///     let reader = spawn_line_reader(stdout, |line| println!("{}", line));
///     let console = StdioConsole::new(stdin);
///     console.send_command("stop").await?;
///
///     child.wait().await?;
///     reader.await.ok();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct StdioConsole {
    stdin: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl StdioConsole {
    /// Wraps the write end of a console, normally the child's stdin.
    pub fn new(stdin: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            stdin: Arc::new(Mutex::new(Box::new(stdin))),
        }
    }

    /// Writes `command` followed by a newline and flushes.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        let mut line = command.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
        line.push(b'\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(&line)
            .await
            .map_err(|e| Error::Process(format!("Failed to write to stdin: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::Process(format!("Failed to flush stdin: {}", e)))?;
        Ok(())
    }
}

impl std::fmt::Debug for StdioConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioConsole").finish_non_exhaustive()
    }
}

/// Reads `reader` line by line until EOF, handing each line to `on_line`.
///
/// Lines are delivered in order with the trailing newline (and carriage
/// return) removed. Invalid UTF-8 is replaced rather than ending the stream.
pub fn spawn_line_reader<R, F>(reader: R, mut on_line: F) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: FnMut(String) + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => break,
                Ok(_) => {
                    while matches!(buffer.last(), Some(b'\n' | b'\r')) {
                        buffer.pop();
                    }
                    on_line(String::from_utf8_lossy(&buffer).into_owned());
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Console stream closed with error");
                    break;
                }
            }
        }
    })
}
