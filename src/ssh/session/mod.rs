//! A connected session: interactive shell, one-shot commands, and file
//! pushes.

use std::io::Write;

use camino::Utf8Path;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::SshError;
use super::channel::{ChannelEvent, ShellChannel, Transport};
use super::scp::{self, RemoteTarget};
use super::terminal::{LocalTerminal, ResizeForwarder, TerminalSize};
use crate::paths;

/// Terminal type requested for interactive shells.
pub const TERM: &str = "xterm-256color";

const RESIZE_QUEUE: usize = 8;

/// Output of a command whose streams were captured.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Remote stdout.
    pub stdout: String,
    /// Remote stderr.
    pub stderr: String,
}

/// An authenticated connection to one host.
///
/// Each operation opens its own channel, which is released when the
/// operation returns. Call [`RemoteSession::close`] on every exit path to
/// release the connection.
pub struct RemoteSession<T> {
    transport: T,
    host: String,
}

impl<T: Transport> RemoteSession<T> {
    /// Wraps an authenticated transport for `host`.
    #[must_use]
    pub fn new(transport: T, host: impl Into<String>) -> Self {
        Self {
            transport,
            host: host.into(),
        }
    }

    /// Host this session talks to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Runs a login shell bound to `terminal` until the remote side closes.
    ///
    /// Returns the remote exit status when one was reported.
    ///
    /// # Errors
    ///
    /// Returns [`SshError`] for failures other than the remote side ending
    /// the session. Raw mode is restored either way.
    pub async fn interactive<L: LocalTerminal>(
        &mut self,
        terminal: &mut L,
    ) -> Result<Option<u32>, SshError> {
        let mut channel = self.transport.open_channel().await?;
        run_interactive(&mut channel, terminal).await
    }

    /// Runs `command`, relaying its output to `stdout` and `stderr`.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::RemoteCommandFailed`] on a non-zero exit and
    /// [`SshError::MissingExitStatus`] when none was reported.
    pub async fn run(
        &mut self,
        command: &str,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<(), SshError> {
        let mut channel = self.transport.open_channel().await?;
        run_command(&mut channel, command, stdout, stderr).await
    }

    /// Runs `command` and returns what it printed.
    ///
    /// # Errors
    ///
    /// As [`Self::run`].
    pub async fn run_captured(&mut self, command: &str) -> Result<CapturedOutput, SshError> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        self.run(command, &mut stdout, &mut stderr).await?;
        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Creates `directory` (and parents) on the remote host.
    ///
    /// # Errors
    ///
    /// As [`Self::run`].
    pub async fn ensure_directory(&mut self, directory: &str) -> Result<(), SshError> {
        self.run_captured(&format!("mkdir -p {}", scp::shell_path(directory)))
            .await
            .map(|_| ())
    }

    /// Writes `contents` to `remote_path` with permission bits `mode`.
    ///
    /// The parent directory is created first on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Scp`] when the receiver rejects the file.
    pub async fn push_bytes(
        &mut self,
        contents: &[u8],
        remote_path: &str,
        mode: u32,
    ) -> Result<(), SshError> {
        let target = RemoteTarget::parse(remote_path)?;
        if let Err(err) = self.ensure_directory(&target.directory).await {
            warn!(directory = %target.directory, error = %err, "could not pre-create remote directory");
        }
        let mut channel = self.transport.open_channel().await?;
        scp::send_file(&mut channel, &target, contents, mode).await?;
        debug!(host = %self.host, remote_path, bytes = contents.len(), "copied file");
        Ok(())
    }

    /// Copies the local file at `local` to `remote_path`, keeping its mode.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Io`] when the local file cannot be read and
    /// [`SshError::Scp`] when the copy fails.
    pub async fn push_file(&mut self, local: &Utf8Path, remote_path: &str) -> Result<(), SshError> {
        let contents = paths::read_bytes(local).map_err(SshError::io(local.as_str()))?;
        let mode = paths::mode(local).map_err(SshError::io(local.as_str()))?;
        self.push_bytes(&contents, remote_path, mode).await
    }

    /// Copies the directory tree at `local` into `remote_dir`.
    ///
    /// The base directory must be creatable; nested directories are created
    /// best-effort before each file is copied individually.
    ///
    /// # Errors
    ///
    /// Returns [`SshError`] when the base directory cannot be created, the
    /// local tree cannot be read, or a file copy fails.
    pub async fn push_dir(&mut self, local: &Utf8Path, remote_dir: &str) -> Result<(), SshError> {
        let listing = paths::walk(local).map_err(SshError::io(local.as_str()))?;
        self.ensure_directory(remote_dir).await?;

        let base = remote_dir.trim_end_matches('/');
        for directory in &listing.directories {
            let remote = format!("{base}/{directory}");
            if let Err(err) = self.ensure_directory(&remote).await {
                warn!(directory = %remote, error = %err, "could not create remote directory");
            }
        }
        for file in &listing.files {
            self.push_file(&local.join(file), &format!("{base}/{file}"))
                .await?;
        }
        info!(
            local = %local,
            remote = remote_dir,
            files = listing.files.len(),
            "copied directory"
        );
        Ok(())
    }

    /// Disconnects from the host.
    pub async fn close(mut self) {
        if let Err(err) = self.transport.disconnect().await {
            debug!(host = %self.host, error = %err, "disconnect reported an error");
        }
    }
}

/// Drives an interactive shell on `channel` until the remote side closes.
///
/// Raw mode is held by a guard for the duration, so every return path,
/// including errors, restores the local terminal.
pub(crate) async fn run_interactive<C, L>(
    channel: &mut C,
    terminal: &mut L,
) -> Result<Option<u32>, SshError>
where
    C: ShellChannel,
    L: LocalTerminal,
{
    channel.request_pty(TERM, terminal.size()).await?;
    let raw_mode = terminal.enter_raw_mode()?;

    let (resize_tx, mut resize_rx) = mpsc::channel(RESIZE_QUEUE);
    let forwarder =
        ResizeForwarder::spawn(terminal.resize_signal(), terminal.size_probe(), resize_tx);
    let mut input = terminal.input();

    let outcome = match channel.request_shell().await {
        Ok(()) => bridge(channel, terminal, &mut input, &mut resize_rx).await,
        Err(err) => Err(err),
    };

    forwarder.stop().await;
    drop(raw_mode);

    match outcome {
        Err(SshError::SessionClosed) => {
            debug!("remote side closed the session");
            Ok(None)
        }
        other => other,
    }
}

async fn bridge<C, L>(
    channel: &mut C,
    terminal: &mut L,
    input: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    resizes: &mut mpsc::Receiver<TerminalSize>,
) -> Result<Option<u32>, SshError>
where
    C: ShellChannel,
    L: LocalTerminal,
{
    let mut exit_status = None;
    let mut stdin_open = true;
    let mut resizes_open = true;

    loop {
        tokio::select! {
            event = channel.next_event() => match event? {
                ChannelEvent::Stdout(bytes) => terminal.write_stdout(&bytes)?,
                ChannelEvent::Stderr(bytes) => terminal.write_stderr(&bytes)?,
                ChannelEvent::ExitStatus(code) => exit_status = Some(code),
                ChannelEvent::Eof => {}
                ChannelEvent::Closed => return Ok(exit_status),
            },
            chunk = input.recv(), if stdin_open => match chunk {
                Some(bytes) => channel.send_data(&bytes).await?,
                None => {
                    stdin_open = false;
                    channel.send_eof().await?;
                }
            },
            size = resizes.recv(), if resizes_open => match size {
                Some(size) => {
                    if let Err(err) = channel.window_change(size).await {
                        debug!(error = %err, "window change not delivered; no longer forwarding resizes");
                        resizes_open = false;
                        resizes.close();
                    }
                }
                None => resizes_open = false,
            },
        }
    }
}

async fn run_command<C: ShellChannel>(
    channel: &mut C,
    command: &str,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<(), SshError> {
    debug!(command, "running remote command");
    channel.exec(command).await?;

    let mut captured_stderr = Vec::new();
    let mut exit_status = None;
    loop {
        match channel.next_event().await {
            Ok(ChannelEvent::Stdout(bytes)) => {
                stdout.write_all(&bytes).map_err(SshError::io("stdout"))?;
            }
            Ok(ChannelEvent::Stderr(bytes)) => {
                stderr.write_all(&bytes).map_err(SshError::io("stderr"))?;
                captured_stderr.extend_from_slice(&bytes);
            }
            Ok(ChannelEvent::ExitStatus(code)) => exit_status = Some(code),
            Ok(ChannelEvent::Eof) => {}
            Ok(ChannelEvent::Closed) | Err(SshError::SessionClosed) => break,
            Err(err) => return Err(err),
        }
    }
    stdout.flush().map_err(SshError::io("stdout"))?;

    match exit_status {
        Some(0) => Ok(()),
        Some(code) => Err(SshError::RemoteCommandFailed {
            command: command.to_owned(),
            exit_code: code,
            stderr: String::from_utf8_lossy(&captured_stderr).into_owned(),
        }),
        None => Err(SshError::MissingExitStatus {
            command: command.to_owned(),
        }),
    }
}
