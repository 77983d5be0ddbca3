//! Local terminal handling for interactive sessions: size, raw mode, stdin
//! and resize notifications.

use std::future::Future;
use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::SshError;

/// Size used when the local terminal cannot report one.
pub const FALLBACK_SIZE: TerminalSize = TerminalSize { cols: 80, rows: 40 };

const STDIN_CHUNK: usize = 4096;

/// Terminal dimensions in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminalSize {
    /// Columns.
    pub cols: u32,
    /// Rows.
    pub rows: u32,
}

/// Callback that re-reads the current terminal size.
pub type SizeProbe = Arc<dyn Fn() -> TerminalSize + Send + Sync>;

/// Future yielding the next resize notification, or `None` once the source
/// is exhausted.
pub type ResizeFuture<'a> = Pin<Box<dyn Future<Output = Option<()>> + Send + 'a>>;

/// Source of "terminal was resized" notifications.
pub trait ResizeSignal: Send {
    /// Waits for the next notification.
    fn next(&mut self) -> ResizeFuture<'_>;
}

/// Local side of an interactive session.
pub trait LocalTerminal: Send {
    /// Current size, falling back to [`FALLBACK_SIZE`].
    fn size(&self) -> TerminalSize;

    /// Callable the resize forwarder uses to re-query the size.
    fn size_probe(&self) -> SizeProbe;

    /// Switches to raw mode; the returned guard restores the previous mode.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Terminal`] when raw mode cannot be enabled.
    fn enter_raw_mode(&mut self) -> Result<RawModeGuard, SshError>;

    /// Stream of resize notifications for the session's lifetime.
    fn resize_signal(&mut self) -> Box<dyn ResizeSignal>;

    /// Receiver of raw stdin chunks. Closes when stdin reaches end of file.
    fn input(&mut self) -> mpsc::UnboundedReceiver<Vec<u8>>;

    /// Writes remote stdout bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Io`] when the local stream fails.
    fn write_stdout(&mut self, data: &[u8]) -> Result<(), SshError>;

    /// Writes remote stderr bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Io`] when the local stream fails.
    fn write_stderr(&mut self, data: &[u8]) -> Result<(), SshError>;
}

/// Restores the terminal mode when dropped, on every exit path.
#[must_use = "raw mode is restored as soon as the guard is dropped"]
pub struct RawModeGuard {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl RawModeGuard {
    /// Wraps the restore action.
    pub fn new(restore: impl FnOnce() + Send + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl std::fmt::Debug for RawModeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawModeGuard")
            .field("armed", &self.restore.is_some())
            .finish()
    }
}

/// Background task relaying resize notifications as fresh sizes.
///
/// The session owns the stop signal and awaits the task handle as the
/// completion acknowledgement. The task also ends when the size receiver
/// has gone away or the notification source is exhausted.
#[derive(Debug)]
pub struct ResizeForwarder {
    stop: Option<oneshot::Sender<()>>,
    done: JoinHandle<()>,
}

impl ResizeForwarder {
    /// Spawns the forwarder on the current runtime.
    pub fn spawn(
        mut signal: Box<dyn ResizeSignal>,
        probe: SizeProbe,
        sizes: mpsc::Sender<TerminalSize>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let done = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    event = signal.next() => {
                        if event.is_none() {
                            break;
                        }
                        let size = probe();
                        debug!(cols = size.cols, rows = size.rows, "local terminal resized");
                        if sizes.send(size).await.is_err() {
                            debug!("session no longer accepts resizes; forwarder exiting");
                            break;
                        }
                    }
                }
            }
        });
        Self {
            stop: Some(stop_tx),
            done,
        }
    }

    /// Signals the task to stop and waits until it has.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take()
            && stop.send(()).is_err()
        {
            debug!("resize forwarder already finished");
        }
        if let Err(err) = (&mut self.done).await {
            warn!(error = %err, "resize forwarder task failed");
        }
    }
}

/// The process's own terminal, driven through crossterm.
#[derive(Clone, Copy, Debug, Default)]
pub struct CrosstermTerminal;

fn current_size() -> TerminalSize {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalSize {
            cols: u32::from(cols),
            rows: u32::from(rows),
        },
        Ok(_) | Err(_) => FALLBACK_SIZE,
    }
}

impl LocalTerminal for CrosstermTerminal {
    fn size(&self) -> TerminalSize {
        current_size()
    }

    fn size_probe(&self) -> SizeProbe {
        Arc::new(current_size)
    }

    fn enter_raw_mode(&mut self) -> Result<RawModeGuard, SshError> {
        crossterm::terminal::enable_raw_mode().map_err(|err| SshError::Terminal {
            message: format!("failed to enable raw mode: {err}"),
        })?;
        Ok(RawModeGuard::new(|| {
            if let Err(err) = crossterm::terminal::disable_raw_mode() {
                warn!(error = %err, "failed to restore terminal mode");
            }
        }))
    }

    fn resize_signal(&mut self) -> Box<dyn ResizeSignal> {
        window_change_signal()
    }

    fn input(&mut self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        spawn_stdin_reader()
    }

    fn write_stdout(&mut self, data: &[u8]) -> Result<(), SshError> {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(data)
            .and_then(|()| stdout.flush())
            .map_err(SshError::io("stdout"))
    }

    fn write_stderr(&mut self, data: &[u8]) -> Result<(), SshError> {
        let mut stderr = io::stderr().lock();
        stderr
            .write_all(data)
            .and_then(|()| stderr.flush())
            .map_err(SshError::io("stderr"))
    }
}

/// Reads stdin on a dedicated thread so blocking reads never stall the
/// runtime. The thread ends at end of file or once the receiver is dropped
/// and another chunk arrives.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buffer = [0_u8; STDIN_CHUNK];
        loop {
            match stdin.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => {
                    let chunk = buffer.get(..read).map(<[u8]>::to_vec).unwrap_or_default();
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

/// A resize source that never fires.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoResizeSignal;

impl ResizeSignal for NoResizeSignal {
    fn next(&mut self) -> ResizeFuture<'_> {
        Box::pin(std::future::pending::<Option<()>>())
    }
}

#[cfg(unix)]
struct WindowChangeSignal(tokio::signal::unix::Signal);

#[cfg(unix)]
impl ResizeSignal for WindowChangeSignal {
    fn next(&mut self) -> ResizeFuture<'_> {
        Box::pin(self.0.recv())
    }
}

#[cfg(unix)]
fn window_change_signal() -> Box<dyn ResizeSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::window_change()) {
        Ok(stream) => Box::new(WindowChangeSignal(stream)),
        Err(err) => {
            warn!(error = %err, "cannot watch for terminal resizes");
            Box::new(NoResizeSignal)
        }
    }
}

#[cfg(not(unix))]
fn window_change_signal() -> Box<dyn ResizeSignal> {
    Box::new(NoResizeSignal)
}
