//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here script the API, SSH channels, the local terminal, and
//! local subprocesses so orchestration and session logic can be exercised
//! without a network or a TTY.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{
    ApiError, ApiFuture, Filesystem, Instance, InstanceStatus, InstanceTypeEntry, LambdaApi,
    LaunchRequest,
};
use crate::provision::{CommandOutput, CommandRunner, ProvisionError};
use crate::ssh::{
    ChannelEvent, Connector, LocalTerminal, NoResizeSignal, RawModeGuard, RemoteSession,
    ResizeFuture, ResizeSignal, ShellChannel, SizeProbe, SshError, SshFuture, TerminalSize,
    Transport,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds an instance record for scripted listings.
#[must_use]
pub fn instance(
    id: &str,
    name: &str,
    type_name: &str,
    status: InstanceStatus,
    ip: Option<&str>,
) -> Instance {
    Instance {
        id: id.to_owned(),
        name: name.to_owned(),
        ip: ip.map(str::to_owned),
        status,
        region: "us-east-1".to_owned(),
        instance_type_name: type_name.to_owned(),
        price_cents_per_hour: None,
    }
}

/// Builds a catalog entry with capacity in `regions`.
#[must_use]
pub fn instance_type(type_name: &str, regions: &[&str]) -> InstanceTypeEntry {
    InstanceTypeEntry {
        type_name: type_name.to_owned(),
        gpu_description: String::new(),
        price_cents_per_hour: None,
        regions_with_capacity: regions.iter().map(|region| (*region).to_owned()).collect(),
    }
}

/// A call observed by [`ScriptedApi`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    /// `list_instances`.
    ListInstances,
    /// `list_instance_types`.
    ListInstanceTypes,
    /// `list_filesystems`.
    ListFilesystems,
    /// `create_filesystem`.
    CreateFilesystem {
        /// Requested name.
        name: String,
        /// Requested region.
        region: String,
    },
    /// `launch`.
    Launch(LaunchRequest),
    /// `terminate`.
    Terminate(Vec<String>),
    /// `restart`.
    Restart(Vec<String>),
}

#[derive(Default)]
struct ApiScript {
    instance_lists: VecDeque<Result<Vec<Instance>, ApiError>>,
    last_instances: Vec<Instance>,
    instance_types: Vec<InstanceTypeEntry>,
    filesystems: Vec<Filesystem>,
    created_filesystem_name: Option<String>,
    launch_ids: Vec<String>,
    terminate_response: Option<Vec<String>>,
    restart_response: Option<Vec<String>>,
    calls: Vec<ApiCall>,
}

/// Scripted [`LambdaApi`] that replays queued responses and records calls.
///
/// Instance listings are consumed in FIFO order; once the queue is empty the
/// last successful listing keeps being returned. Terminate and restart echo
/// the requested IDs unless a response was set explicitly.
#[derive(Clone, Default)]
pub struct ScriptedApi {
    script: Arc<Mutex<ApiScript>>,
}

impl ScriptedApi {
    /// Creates an API with empty listings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an instance listing.
    pub fn push_instances(&self, instances: Vec<Instance>) {
        lock(&self.script).instance_lists.push_back(Ok(instances));
    }

    /// Queues a failing instance listing.
    pub fn push_list_error(&self, error: ApiError) {
        lock(&self.script).instance_lists.push_back(Err(error));
    }

    /// Sets the instance type catalog.
    pub fn set_instance_types(&self, entries: Vec<InstanceTypeEntry>) {
        lock(&self.script).instance_types = entries;
    }

    /// Sets the existing filesystems.
    pub fn set_filesystems(&self, filesystems: Vec<Filesystem>) {
        lock(&self.script).filesystems = filesystems;
    }

    /// Makes filesystem creation answer with `name` instead of the request.
    pub fn set_created_filesystem_name(&self, name: &str) {
        lock(&self.script).created_filesystem_name = Some(name.to_owned());
    }

    /// Sets the IDs returned by launch.
    pub fn set_launch_ids(&self, ids: &[&str]) {
        lock(&self.script).launch_ids = ids.iter().map(|id| (*id).to_owned()).collect();
    }

    /// Sets the IDs terminate reports as affected.
    pub fn set_terminate_response(&self, ids: &[&str]) {
        lock(&self.script).terminate_response =
            Some(ids.iter().map(|id| (*id).to_owned()).collect());
    }

    /// Sets the IDs restart reports as affected.
    pub fn set_restart_response(&self, ids: &[&str]) {
        lock(&self.script).restart_response =
            Some(ids.iter().map(|id| (*id).to_owned()).collect());
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.script).calls.clone()
    }

    /// Number of `list_instances` calls made so far.
    #[must_use]
    pub fn list_instance_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ApiCall::ListInstances))
            .count()
    }

    /// Launch requests submitted so far.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Launch(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) {
        lock(&self.script).calls.push(call);
    }
}

impl LambdaApi for ScriptedApi {
    fn list_instances(&self) -> ApiFuture<'_, Vec<Instance>> {
        Box::pin(async move {
            self.record(ApiCall::ListInstances);
            let mut script = lock(&self.script);
            match script.instance_lists.pop_front() {
                Some(Ok(instances)) => {
                    script.last_instances.clone_from(&instances);
                    Ok(instances)
                }
                Some(Err(err)) => Err(err),
                None => Ok(script.last_instances.clone()),
            }
        })
    }

    fn list_instance_types(&self) -> ApiFuture<'_, Vec<InstanceTypeEntry>> {
        Box::pin(async move {
            self.record(ApiCall::ListInstanceTypes);
            Ok(lock(&self.script).instance_types.clone())
        })
    }

    fn list_filesystems(&self) -> ApiFuture<'_, Vec<Filesystem>> {
        Box::pin(async move {
            self.record(ApiCall::ListFilesystems);
            Ok(lock(&self.script).filesystems.clone())
        })
    }

    fn create_filesystem<'a>(
        &'a self,
        name: &'a str,
        region: &'a str,
    ) -> ApiFuture<'a, Filesystem> {
        Box::pin(async move {
            self.record(ApiCall::CreateFilesystem {
                name: name.to_owned(),
                region: region.to_owned(),
            });
            let mut script = lock(&self.script);
            let created = Filesystem {
                id: Some(format!("fs-{region}")),
                name: script
                    .created_filesystem_name
                    .clone()
                    .unwrap_or_else(|| name.to_owned()),
                region: region.to_owned(),
            };
            script.filesystems.push(created.clone());
            Ok(created)
        })
    }

    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.record(ApiCall::Launch(request.clone()));
            Ok(lock(&self.script).launch_ids.clone())
        })
    }

    fn terminate<'a>(&'a self, instance_ids: &'a [String]) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.record(ApiCall::Terminate(instance_ids.to_vec()));
            Ok(lock(&self.script)
                .terminate_response
                .clone()
                .unwrap_or_else(|| instance_ids.to_vec()))
        })
    }

    fn restart<'a>(&'a self, instance_ids: &'a [String]) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.record(ApiCall::Restart(instance_ids.to_vec()));
            Ok(lock(&self.script)
                .restart_response
                .clone()
                .unwrap_or_else(|| instance_ids.to_vec()))
        })
    }
}

/// A call observed on a [`FakeChannel`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelCall {
    /// `request_pty`.
    RequestPty {
        /// Terminal type.
        term: String,
        /// Requested size.
        size: TerminalSize,
    },
    /// `request_shell`.
    RequestShell,
    /// `exec`.
    Exec(String),
    /// `send_data`.
    Data(Vec<u8>),
    /// `send_eof`.
    Eof,
    /// `window_change`, recorded even when it fails.
    WindowChange(TerminalSize),
}

/// One scripted step returned by [`FakeChannel::next_event`].
#[derive(Clone, Debug)]
pub enum ChannelStep {
    /// Deliver an event.
    Event(ChannelEvent),
    /// Fail with an error.
    Fail(SshError),
    /// Sleep before moving to the next step.
    Pause(Duration),
}

/// Shared record of channel calls.
#[derive(Clone, Debug, Default)]
pub struct ChannelLog {
    calls: Arc<Mutex<Vec<ChannelCall>>>,
}

impl ChannelLog {
    /// Calls recorded so far, across every channel sharing this log.
    #[must_use]
    pub fn calls(&self) -> Vec<ChannelCall> {
        lock(&self.calls).clone()
    }

    /// Commands passed to `exec`, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChannelCall::Exec(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of every `send_data` payload.
    #[must_use]
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChannelCall::Data(bytes) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn push(&self, call: ChannelCall) {
        lock(&self.calls).push(call);
    }
}

/// Scripted [`ShellChannel`]. Returns [`ChannelEvent::Closed`] once the
/// script runs out.
#[derive(Debug)]
pub struct FakeChannel {
    steps: VecDeque<ChannelStep>,
    log: ChannelLog,
    fail_window_change: bool,
}

impl FakeChannel {
    /// Creates a channel replaying `steps`, recording into `log`.
    #[must_use]
    pub fn new(steps: Vec<ChannelStep>, log: ChannelLog) -> Self {
        Self {
            steps: steps.into(),
            log,
            fail_window_change: false,
        }
    }

    /// Script for a command that exits with `code`.
    #[must_use]
    pub fn exit_steps(code: u32) -> Vec<ChannelStep> {
        vec![
            ChannelStep::Event(ChannelEvent::ExitStatus(code)),
            ChannelStep::Event(ChannelEvent::Closed),
        ]
    }

    /// Script for an `scp -t` receiver that accepts one file.
    #[must_use]
    pub fn scp_accepting_steps() -> Vec<ChannelStep> {
        vec![
            ChannelStep::Event(ChannelEvent::Stdout(vec![0])),
            ChannelStep::Event(ChannelEvent::Stdout(vec![0])),
            ChannelStep::Event(ChannelEvent::Stdout(vec![0])),
            ChannelStep::Event(ChannelEvent::ExitStatus(0)),
            ChannelStep::Event(ChannelEvent::Closed),
        ]
    }

    /// Makes every `window_change` fail as if the channel were closed.
    #[must_use]
    pub const fn failing_window_change(mut self) -> Self {
        self.fail_window_change = true;
        self
    }
}

impl ShellChannel for FakeChannel {
    fn request_pty<'a>(&'a mut self, term: &'a str, size: TerminalSize) -> SshFuture<'a, ()> {
        Box::pin(async move {
            self.log.push(ChannelCall::RequestPty {
                term: term.to_owned(),
                size,
            });
            Ok(())
        })
    }

    fn request_shell(&mut self) -> SshFuture<'_, ()> {
        Box::pin(async move {
            self.log.push(ChannelCall::RequestShell);
            Ok(())
        })
    }

    fn exec<'a>(&'a mut self, command: &'a str) -> SshFuture<'a, ()> {
        Box::pin(async move {
            self.log.push(ChannelCall::Exec(command.to_owned()));
            Ok(())
        })
    }

    fn send_data<'a>(&'a mut self, data: &'a [u8]) -> SshFuture<'a, ()> {
        Box::pin(async move {
            self.log.push(ChannelCall::Data(data.to_vec()));
            Ok(())
        })
    }

    fn send_eof(&mut self) -> SshFuture<'_, ()> {
        Box::pin(async move {
            self.log.push(ChannelCall::Eof);
            Ok(())
        })
    }

    fn window_change(&mut self, size: TerminalSize) -> SshFuture<'_, ()> {
        Box::pin(async move {
            self.log.push(ChannelCall::WindowChange(size));
            if self.fail_window_change {
                return Err(SshError::SessionClosed);
            }
            Ok(())
        })
    }

    fn next_event(&mut self) -> SshFuture<'_, ChannelEvent> {
        Box::pin(async move {
            loop {
                match self.steps.pop_front() {
                    Some(ChannelStep::Event(event)) => return Ok(event),
                    Some(ChannelStep::Fail(err)) => return Err(err),
                    Some(ChannelStep::Pause(delay)) => tokio::time::sleep(delay).await,
                    None => return Ok(ChannelEvent::Closed),
                }
            }
        })
    }
}

/// Scripted [`Transport`] handing out pre-built channels in order.
#[derive(Debug, Default)]
pub struct FakeTransport {
    channels: VecDeque<Vec<ChannelStep>>,
    log: ChannelLog,
    disconnected: Arc<AtomicBool>,
}

impl FakeTransport {
    /// Creates a transport with no channels queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a channel that will replay `steps`.
    #[must_use]
    pub fn with_channel(mut self, steps: Vec<ChannelStep>) -> Self {
        self.channels.push_back(steps);
        self
    }

    /// Log shared by every channel this transport opens.
    #[must_use]
    pub fn log(&self) -> ChannelLog {
        self.log.clone()
    }

    /// Flag set once `disconnect` runs.
    #[must_use]
    pub fn disconnected(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.disconnected)
    }
}

impl Transport for FakeTransport {
    type Channel = FakeChannel;

    fn open_channel(&mut self) -> SshFuture<'_, Self::Channel> {
        Box::pin(async move {
            let steps = self.channels.pop_front().ok_or_else(|| SshError::Transport {
                message: "no scripted channel left".to_owned(),
            })?;
            Ok(FakeChannel::new(steps, self.log.clone()))
        })
    }

    fn disconnect(&mut self) -> SshFuture<'_, ()> {
        Box::pin(async move {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// [`Connector`] handing out one scripted transport and recording the host.
#[derive(Debug, Default)]
pub struct FakeConnector {
    transport: Mutex<Option<FakeTransport>>,
    hosts: Mutex<Vec<String>>,
}

impl FakeConnector {
    /// Connector that yields `transport` on the first connection.
    #[must_use]
    pub fn new(transport: FakeTransport) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            hosts: Mutex::default(),
        }
    }

    /// Hosts connected to, in order.
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        lock(&self.hosts).clone()
    }
}

impl Connector for FakeConnector {
    type Transport = FakeTransport;

    fn connect<'a>(&'a self, host: &'a str) -> SshFuture<'a, RemoteSession<FakeTransport>> {
        Box::pin(async move {
            lock(&self.hosts).push(host.to_owned());
            let transport = lock(&self.transport)
                .take()
                .ok_or_else(|| SshError::ConnectionRefused {
                    host: host.to_owned(),
                    port: 22,
                    message: "no scripted transport left".to_owned(),
                })?;
            Ok(RemoteSession::new(transport, host))
        })
    }
}

struct TickSignal(mpsc::UnboundedReceiver<()>);

impl ResizeSignal for TickSignal {
    fn next(&mut self) -> ResizeFuture<'_> {
        Box::pin(self.0.recv())
    }
}

/// In-memory [`LocalTerminal`] that records raw-mode transitions and output.
pub struct FakeTerminal {
    size: TerminalSize,
    resized_to: TerminalSize,
    raw: Arc<AtomicBool>,
    raw_entries: Arc<AtomicU32>,
    input: Vec<Vec<u8>>,
    held_input: Option<mpsc::UnboundedSender<Vec<u8>>>,
    keep_stdin_open: bool,
    ticks: Option<mpsc::UnboundedReceiver<()>>,
    tick_sender: mpsc::UnboundedSender<()>,
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
}

impl FakeTerminal {
    /// A terminal of `size` whose probe reports `resized_to` after a resize.
    #[must_use]
    pub fn new(size: TerminalSize, resized_to: TerminalSize) -> Self {
        let (tick_sender, ticks) = mpsc::unbounded_channel();
        Self {
            size,
            resized_to,
            raw: Arc::new(AtomicBool::new(false)),
            raw_entries: Arc::new(AtomicU32::new(0)),
            input: Vec::new(),
            held_input: None,
            keep_stdin_open: false,
            ticks: Some(ticks),
            tick_sender,
            stdout: Arc::default(),
            stderr: Arc::default(),
        }
    }

    /// Queues stdin chunks delivered before end of file.
    #[must_use]
    pub fn with_input(mut self, chunks: &[&[u8]]) -> Self {
        self.input = chunks.iter().map(|chunk| chunk.to_vec()).collect();
        self
    }

    /// Keeps stdin open after the queued chunks instead of signalling EOF.
    #[must_use]
    pub const fn keep_stdin_open(mut self) -> Self {
        self.keep_stdin_open = true;
        self
    }

    /// Sender that simulates a resize notification per message.
    #[must_use]
    pub fn resize_trigger(&self) -> mpsc::UnboundedSender<()> {
        self.tick_sender.clone()
    }

    /// Whether raw mode is currently on.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.raw.load(Ordering::SeqCst)
    }

    /// Number of times raw mode was entered.
    #[must_use]
    pub fn raw_entries(&self) -> u32 {
        self.raw_entries.load(Ordering::SeqCst)
    }

    /// Bytes written to stdout.
    #[must_use]
    pub fn stdout(&self) -> Vec<u8> {
        lock(&self.stdout).clone()
    }

    /// Bytes written to stderr.
    #[must_use]
    pub fn stderr(&self) -> Vec<u8> {
        lock(&self.stderr).clone()
    }
}

impl LocalTerminal for FakeTerminal {
    fn size(&self) -> TerminalSize {
        self.size
    }

    fn size_probe(&self) -> SizeProbe {
        let resized = self.resized_to;
        Arc::new(move || resized)
    }

    fn enter_raw_mode(&mut self) -> Result<RawModeGuard, SshError> {
        self.raw.store(true, Ordering::SeqCst);
        self.raw_entries.fetch_add(1, Ordering::SeqCst);
        let raw = Arc::clone(&self.raw);
        Ok(RawModeGuard::new(move || raw.store(false, Ordering::SeqCst)))
    }

    fn resize_signal(&mut self) -> Box<dyn ResizeSignal> {
        match self.ticks.take() {
            Some(ticks) => Box::new(TickSignal(ticks)),
            None => Box::new(NoResizeSignal),
        }
    }

    fn input(&mut self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in self.input.drain(..) {
            if tx.send(chunk).is_err() {
                break;
            }
        }
        if self.keep_stdin_open {
            self.held_input = Some(tx);
        }
        rx
    }

    fn write_stdout(&mut self, data: &[u8]) -> Result<(), SshError> {
        lock(&self.stdout).extend_from_slice(data);
        Ok(())
    }

    fn write_stderr(&mut self, data: &[u8]) -> Result<(), SshError> {
        lock(&self.stderr).extend_from_slice(data);
        Ok(())
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful run printing `stdout`.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.push_output(Some(code), "", stderr);
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ProvisionError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ProvisionError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}
