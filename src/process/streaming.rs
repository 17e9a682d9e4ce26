//! Streaming agent runner.
//!
//! [`spawn_streaming`] launches the agent and returns an [`EventStream`]:
//! 1. Two reader tasks (see `reader`) drain stdout and stderr concurrently
//!    into one queue.
//! 2. The full input is written to stdin, which is then closed; some agents
//!    only start answering after stdin EOF.
//! 3. [`EventStream::next`] re-yields queue events in arrival order until
//!    both channels reported EOF, then waits for the exit status and yields
//!    exactly one terminal item: `Done` or an error.
//!
//! A single deadline covers spawn through exit. Reader tasks are cancelled
//! and awaited on every terminal path; dropping the stream early cancels
//! them and kills the child.

use futures_util::Stream;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reader::run_pump;
use super::{preview, settle_outcome, spawn_child, timeout_error, Channel, Invocation, StreamEvent};
use crate::agent::session::SessionTicket;
use crate::agent::AgentKind;
use crate::{AppError, Result};

/// Live output of one agent call.
///
/// Single-pass: once a terminal item (`Done` or an error) has been yielded,
/// [`next`](Self::next) returns `None`.
#[derive(Debug)]
pub struct EventStream {
    agent: AgentKind,
    limit: std::time::Duration,
    started: Instant,
    deadline: Instant,
    child: Child,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    readers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    ticket: Option<SessionTicket>,
    /// Held until the stream settles so session calls never overlap.
    exec_guard: Option<OwnedMutexGuard<()>>,
    stdout: String,
    stderr: String,
    open_channels: u8,
    logged_stdout: bool,
    logged_stderr: bool,
    finished: bool,
}

/// Spawn `invocation` and return its event stream.
///
/// `exec_guard` is released when the stream reaches a terminal state or is
/// dropped.
///
/// # Errors
///
/// - `AppError::ExecutableNotFound`: the binary is not on `PATH`.
/// - `AppError::Timeout`: writing stdin outlived the budget.
/// - `AppError::Spawn`: stdio pipes could not be set up or written.
pub async fn spawn_streaming(
    invocation: Invocation,
    ticket: Option<SessionTicket>,
    exec_guard: Option<OwnedMutexGuard<()>>,
) -> Result<EventStream> {
    let agent = invocation.agent;
    let started = Instant::now();
    let deadline = started + invocation.timeout;
    invocation.log_start("stream", ticket.as_ref());

    let mut child = match spawn_child(&invocation) {
        Ok(child) => child,
        Err(err) => {
            if let Some(ticket) = &ticket {
                ticket.fail();
            }
            return Err(err);
        }
    };

    let (Some(mut stdin), Some(stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        if let Some(ticket) = &ticket {
            ticket.fail();
        }
        return Err(AppError::Spawn(format!("failed to open {agent} stdio pipes")));
    };

    let (tx, events) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let readers = vec![
        tokio::spawn(run_pump(Channel::Stdout, stdout, tx.clone(), cancel.clone())),
        tokio::spawn(run_pump(Channel::Stderr, stderr, tx, cancel.clone())),
    ];

    let mut stream = EventStream {
        agent,
        limit: invocation.timeout,
        started,
        deadline,
        child,
        events,
        readers,
        cancel,
        ticket,
        exec_guard,
        stdout: String::new(),
        stderr: String::new(),
        open_channels: 2,
        logged_stdout: false,
        logged_stderr: false,
        finished: false,
    };

    let write = timeout_at(deadline, async {
        stdin.write_all(invocation.input.as_bytes()).await?;
        stdin.shutdown().await
    })
    .await;
    drop(stdin);

    match write {
        Ok(Ok(())) => Ok(stream),
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
            // The child closed stdin without reading it; its output still counts.
            debug!(agent = %agent, "stdin closed early by agent");
            Ok(stream)
        }
        Ok(Err(err)) => {
            stream.abandon().await;
            Err(AppError::Spawn(format!("failed to write {agent} stdin: {err}")))
        }
        Err(_elapsed) => Err(stream.expire().await),
    }
}

impl EventStream {
    /// Next event, or `None` once the stream has settled.
    pub async fn next(&mut self) -> Option<Result<StreamEvent>> {
        if self.finished {
            return None;
        }

        if self.open_channels > 0 {
            match timeout_at(self.deadline, self.events.recv()).await {
                Err(_elapsed) => return Some(Err(self.expire().await)),
                Ok(Some(event)) => {
                    self.record(&event);
                    return Some(Ok(event));
                }
                Ok(None) => {
                    // Both readers are gone; nothing more can arrive.
                    self.open_channels = 0;
                }
            }
        }

        let status = match timeout_at(self.deadline, self.child.wait()).await {
            Err(_elapsed) => return Some(Err(self.expire().await)),
            Ok(Err(err)) => {
                self.abandon().await;
                return Some(Err(AppError::Spawn(format!(
                    "failed to wait for {}: {err}",
                    self.agent
                ))));
            }
            Ok(Ok(status)) => status,
        };

        self.shutdown_readers().await;
        self.finished = true;
        let result = settle_outcome(
            self.agent,
            self.ticket.as_ref(),
            status,
            &self.stdout,
            &self.stderr,
            self.started,
        );
        self.exec_guard = None;
        Some(result.map(|result| StreamEvent::Done { result }))
    }

    /// Drain the stream and return the final output.
    ///
    /// # Errors
    ///
    /// Returns the stream's terminal error.
    pub async fn collect(mut self) -> Result<String> {
        while let Some(item) = self.next().await {
            if let StreamEvent::Done { result } = item? {
                return Ok(result);
            }
        }
        Err(AppError::Spawn(format!(
            "{} stream ended without a result",
            self.agent
        )))
    }

    /// Adapt into a [`Stream`] of the same items.
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent>> {
        futures_util::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|item| (item, stream))
        })
    }

    fn record(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Chunk {
                channel: Channel::Stdout,
                text,
            } => {
                self.stdout.push_str(text);
                if !self.logged_stdout {
                    self.logged_stdout = true;
                    info!(agent = %self.agent, preview = %preview(text), "agent stream stdout partial");
                }
            }
            StreamEvent::Chunk {
                channel: Channel::Stderr,
                text,
            } => {
                self.stderr.push_str(text);
                if !self.logged_stderr {
                    self.logged_stderr = true;
                    warn!(agent = %self.agent, preview = %preview(text), "agent stream stderr partial");
                }
            }
            StreamEvent::Eof { .. } => {
                self.open_channels = self.open_channels.saturating_sub(1);
            }
            StreamEvent::Done { .. } => {}
        }
    }

    /// Kill the child after the deadline passed and settle as a timeout.
    async fn expire(&mut self) -> AppError {
        // `kill` also reaps the child.
        self.child.kill().await.ok();
        self.shutdown_readers().await;
        self.finished = true;
        self.exec_guard = None;
        timeout_error(self.agent, self.ticket.as_ref(), self.limit, self.started)
    }

    /// Kill the child after an I/O failure and settle as failed.
    async fn abandon(&mut self) {
        self.child.kill().await.ok();
        self.shutdown_readers().await;
        self.finished = true;
        self.exec_guard = None;
        if let Some(ticket) = &self.ticket {
            ticket.fail();
        }
    }

    async fn shutdown_readers(&mut self) {
        self.cancel.cancel();
        for reader in self.readers.drain(..) {
            if let Err(err) = reader.await {
                if !err.is_cancelled() {
                    warn!(agent = %self.agent, %err, "pipe reader task failed");
                }
            }
        }
    }
}

impl Drop for EventStream {
    /// Cancel the readers of an abandoned stream; `kill_on_drop` reaps the child.
    fn drop(&mut self) {
        self.cancel.cancel();
        for reader in &self.readers {
            reader.abort();
        }
        if !self.finished {
            debug!(agent = %self.agent, "event stream dropped before completion");
        }
    }
}
