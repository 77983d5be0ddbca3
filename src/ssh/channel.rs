//! Channel and transport seams over russh.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use russh_keys::key::PublicKey;
use tracing::warn;

use super::SshError;
use super::known_hosts::{HostKeyPolicy, verify_host_key};
use super::terminal::TerminalSize;

/// Future returned by channel and transport operations.
pub type SshFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SshError>> + Send + 'a>>;

const TERMINAL_MODES: [(Pty, u32); 3] = [
    (Pty::ECHO, 1),
    (Pty::TTY_OP_ISPEED, 14_400),
    (Pty::TTY_OP_OSPEED, 14_400),
];

/// Something that happened on a session channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes on the remote stdout.
    Stdout(Vec<u8>),
    /// Bytes on the remote stderr.
    Stderr(Vec<u8>),
    /// Remote process exit status.
    ExitStatus(u32),
    /// Remote side will send no more data.
    Eof,
    /// Channel closed.
    Closed,
}

/// One session channel on an SSH connection.
pub trait ShellChannel: Send {
    /// Requests a pseudo-terminal of `size` with terminal type `term`.
    fn request_pty<'a>(&'a mut self, term: &'a str, size: TerminalSize) -> SshFuture<'a, ()>;
    /// Starts the login shell.
    fn request_shell(&mut self) -> SshFuture<'_, ()>;
    /// Runs `command`.
    fn exec<'a>(&'a mut self, command: &'a str) -> SshFuture<'a, ()>;
    /// Writes to the remote stdin.
    fn send_data<'a>(&'a mut self, data: &'a [u8]) -> SshFuture<'a, ()>;
    /// Closes the remote stdin.
    fn send_eof(&mut self) -> SshFuture<'_, ()>;
    /// Announces a new terminal size.
    fn window_change(&mut self, size: TerminalSize) -> SshFuture<'_, ()>;
    /// Waits for the next event.
    fn next_event(&mut self) -> SshFuture<'_, ChannelEvent>;
}

/// An authenticated connection able to open channels.
pub trait Transport: Send {
    /// Channel type produced by [`Self::open_channel`].
    type Channel: ShellChannel;
    /// Opens a new session channel.
    fn open_channel(&mut self) -> SshFuture<'_, Self::Channel>;
    /// Disconnects, releasing the connection.
    fn disconnect(&mut self) -> SshFuture<'_, ()>;
}

/// Slot in which the host key check records why it refused a server.
pub(crate) type RejectionSlot = Arc<Mutex<Option<SshError>>>;

pub(crate) fn take_rejection(slot: &RejectionSlot) -> Option<SshError> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// russh client handler enforcing the host key policy.
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    rejection: RejectionSlot,
}

impl ClientHandler {
    pub(crate) const fn new(
        host: String,
        port: u16,
        policy: HostKeyPolicy,
        rejection: RejectionSlot,
    ) -> Self {
        Self {
            host,
            port,
            policy,
            rejection,
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match verify_host_key(&self.policy, &self.host, self.port, server_public_key) {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(host = %self.host, error = %err, "rejecting server host key");
                *self.rejection.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
                Ok(false)
            }
        }
    }
}

/// Live russh connection.
pub struct RusshTransport {
    handle: Handle<ClientHandler>,
}

impl RusshTransport {
    pub(crate) const fn new(handle: Handle<ClientHandler>) -> Self {
        Self { handle }
    }
}

impl Transport for RusshTransport {
    type Channel = RusshChannel;

    fn open_channel(&mut self) -> SshFuture<'_, Self::Channel> {
        Box::pin(async move {
            let inner = self.handle.channel_open_session().await?;
            Ok(RusshChannel { inner })
        })
    }

    fn disconnect(&mut self) -> SshFuture<'_, ()> {
        Box::pin(async move {
            self.handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await?;
            Ok(())
        })
    }
}

/// Session channel backed by russh.
pub struct RusshChannel {
    inner: Channel<Msg>,
}

impl ShellChannel for RusshChannel {
    fn request_pty<'a>(&'a mut self, term: &'a str, size: TerminalSize) -> SshFuture<'a, ()> {
        Box::pin(async move {
            self.inner
                .request_pty(true, term, size.cols, size.rows, 0, 0, &TERMINAL_MODES)
                .await?;
            Ok(())
        })
    }

    fn request_shell(&mut self) -> SshFuture<'_, ()> {
        Box::pin(async move {
            self.inner.request_shell(true).await?;
            Ok(())
        })
    }

    fn exec<'a>(&'a mut self, command: &'a str) -> SshFuture<'a, ()> {
        Box::pin(async move {
            self.inner.exec(true, command).await?;
            Ok(())
        })
    }

    fn send_data<'a>(&'a mut self, data: &'a [u8]) -> SshFuture<'a, ()> {
        Box::pin(async move {
            self.inner.data(data).await?;
            Ok(())
        })
    }

    fn send_eof(&mut self) -> SshFuture<'_, ()> {
        Box::pin(async move {
            self.inner.eof().await?;
            Ok(())
        })
    }

    fn window_change(&mut self, size: TerminalSize) -> SshFuture<'_, ()> {
        Box::pin(async move {
            self.inner.window_change(size.cols, size.rows, 0, 0).await?;
            Ok(())
        })
    }

    fn next_event(&mut self) -> SshFuture<'_, ChannelEvent> {
        Box::pin(async move {
            loop {
                let event = match self.inner.wait().await {
                    Some(ChannelMsg::Data { data }) => ChannelEvent::Stdout(data.to_vec()),
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        ChannelEvent::Stderr(data.to_vec())
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        ChannelEvent::ExitStatus(exit_status)
                    }
                    Some(ChannelMsg::Eof) => ChannelEvent::Eof,
                    Some(ChannelMsg::Close) | None => ChannelEvent::Closed,
                    Some(_) => continue,
                };
                return Ok(event);
            }
        })
    }
}
