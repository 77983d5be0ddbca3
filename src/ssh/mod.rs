//! Remote session bridge over SSH.
//!
//! [`connect`] produces a [`RemoteSession`] that can attach the local
//! terminal to a login shell, run one-shot commands, and push files with the
//! `scp` sink protocol. Channel, transport, and terminal access sit behind
//! traits so the session logic runs against scripted doubles in tests.

mod channel;
mod connect;
mod error;
mod keys;
mod known_hosts;
mod scp;
mod session;
mod terminal;

pub use channel::{
    ChannelEvent, ClientHandler, RusshChannel, RusshTransport, ShellChannel, SshFuture, Transport,
};
pub use connect::{
    CONNECT_TIMEOUT, Connector, DEFAULT_PORT, DEFAULT_USER, RusshConnector, SshSettings, connect,
};
pub use error::SshError;
pub use keys::{KeyProtection, PassphrasePrompt, TerminalPrompt, key_protection, load_private_key};
pub use known_hosts::{HostKeyPolicy, verify_host_key};
pub use session::{CapturedOutput, RemoteSession, TERM};
pub use terminal::{
    CrosstermTerminal, FALLBACK_SIZE, LocalTerminal, NoResizeSignal, RawModeGuard,
    ResizeForwarder, ResizeFuture, ResizeSignal, SizeProbe, TerminalSize,
};
