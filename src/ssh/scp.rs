//! Sink side of the `scp -t` protocol: one file per receiver invocation.

use shell_escape::unix::escape;

use super::SshError;
use super::channel::{ChannelEvent, ShellChannel};

const ACK_OK: u8 = 0;
const ACK_WARNING: u8 = 1;
const ACK_FATAL: u8 = 2;

/// A remote destination split into directory and file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RemoteTarget {
    pub(crate) directory: String,
    pub(crate) file_name: String,
}

impl RemoteTarget {
    /// Splits `remote_path`; a bare file name lands in the login directory.
    pub(crate) fn parse(remote_path: &str) -> Result<Self, SshError> {
        let (directory, file_name) = match remote_path.rsplit_once('/') {
            Some(("", name)) => ("/", name),
            Some((dir, name)) => (dir, name),
            None => (".", remote_path),
        };
        if file_name.is_empty() {
            return Err(SshError::Scp {
                destination: remote_path.to_owned(),
                message: "destination has no file name".to_owned(),
            });
        }
        Ok(Self {
            directory: directory.to_owned(),
            file_name: file_name.to_owned(),
        })
    }
}

/// Quotes a remote path for the shell. `~/` becomes a path relative to the
/// login directory, where the remote shell starts.
pub(crate) fn shell_path(path: &str) -> String {
    let relative = match path {
        "~" => ".",
        _ => path.strip_prefix("~/").unwrap_or(path),
    };
    escape(relative.into()).into_owned()
}

/// Control line announcing a file: `C<mode> <length> <name>\n`.
pub(crate) fn file_header(mode: u32, length: usize, file_name: &str) -> String {
    format!("C{:04o} {length} {file_name}\n", mode & 0o7777)
}

/// Receiver command for a destination directory.
pub(crate) fn sink_command(directory: &str) -> String {
    format!("scp -qt {}", shell_path(directory))
}

/// Waits for the receiver's acknowledgement byte.
async fn expect_ack<C: ShellChannel>(channel: &mut C, destination: &str) -> Result<(), SshError> {
    let mut diagnostics = Vec::new();
    loop {
        match channel.next_event().await? {
            ChannelEvent::Stdout(bytes) => {
                let Some((&status, rest)) = bytes.split_first() else {
                    continue;
                };
                return match status {
                    ACK_OK => Ok(()),
                    ACK_WARNING | ACK_FATAL => Err(SshError::Scp {
                        destination: destination.to_owned(),
                        message: String::from_utf8_lossy(rest).trim().to_owned(),
                    }),
                    other => Err(SshError::Scp {
                        destination: destination.to_owned(),
                        message: format!("unexpected acknowledgement byte {other:#04x}"),
                    }),
                };
            }
            ChannelEvent::Stderr(bytes) => diagnostics.extend_from_slice(&bytes),
            ChannelEvent::ExitStatus(_) | ChannelEvent::Eof | ChannelEvent::Closed => {
                let detail = String::from_utf8_lossy(&diagnostics).trim().to_owned();
                return Err(SshError::Scp {
                    destination: destination.to_owned(),
                    message: if detail.is_empty() {
                        "receiver exited before acknowledging".to_owned()
                    } else {
                        detail
                    },
                });
            }
        }
    }
}

/// Streams `contents` to `target` over `channel`, which must not have run a
/// command yet.
pub(crate) async fn send_file<C: ShellChannel>(
    channel: &mut C,
    target: &RemoteTarget,
    contents: &[u8],
    mode: u32,
) -> Result<(), SshError> {
    let destination = format!("{}/{}", target.directory, target.file_name);
    channel.exec(&sink_command(&target.directory)).await?;
    expect_ack(channel, &destination).await?;

    let header = file_header(mode, contents.len(), &target.file_name);
    channel.send_data(header.as_bytes()).await?;
    expect_ack(channel, &destination).await?;

    channel.send_data(contents).await?;
    channel.send_data(&[ACK_OK]).await?;
    expect_ack(channel, &destination).await?;
    channel.send_eof().await?;

    loop {
        match channel.next_event().await? {
            ChannelEvent::ExitStatus(0) | ChannelEvent::Closed => return Ok(()),
            ChannelEvent::ExitStatus(code) => {
                return Err(SshError::Scp {
                    destination,
                    message: format!("receiver exited with status {code}"),
                });
            }
            ChannelEvent::Stdout(_) | ChannelEvent::Stderr(_) | ChannelEvent::Eof => {}
        }
    }
}
