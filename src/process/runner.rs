//! Buffered agent runner.
//!
//! Spawns the agent, feeds stdin from a writer task while two reader tasks
//! collect stdout and stderr, and waits for exit under the invocation's
//! timeout. On expiry the child is killed and reaped before the error is
//! returned.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info_span, Instrument};

use super::{settle_outcome, spawn_child, timeout_error, Invocation};
use crate::agent::session::SessionTicket;
use crate::{AppError, Result};

/// Run `invocation` to completion and return its trimmed stdout.
///
/// `ticket`, when present, is settled exactly once with the outcome.
///
/// # Errors
///
/// - `AppError::ExecutableNotFound`: the binary is not on `PATH`.
/// - `AppError::Timeout`: the call outlived its budget (child killed first).
/// - `AppError::NonZeroExit`: the agent failed; carries its stderr.
/// - `AppError::EmptyOutput`: zero exit with blank stdout.
/// - `AppError::Spawn` / `AppError::Io`: pipe or wait failures.
pub async fn run_buffered(invocation: &Invocation, ticket: Option<&SessionTicket>) -> Result<String> {
    let span = info_span!(
        "agent_run",
        agent = %invocation.agent,
        session = ticket.map_or("-", SessionTicket::label),
    );
    run_inner(invocation, ticket).instrument(span).await
}

async fn run_inner(invocation: &Invocation, ticket: Option<&SessionTicket>) -> Result<String> {
    let agent = invocation.agent;
    let started = Instant::now();
    let deadline = started + invocation.timeout;
    invocation.log_start("buffered", ticket);

    let mut child = match spawn_child(invocation) {
        Ok(child) => child,
        Err(err) => {
            if let Some(ticket) = ticket {
                ticket.fail();
            }
            return Err(err);
        }
    };

    let (Some(mut stdin), Some(stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        if let Some(ticket) = ticket {
            ticket.fail();
        }
        return Err(AppError::Spawn(format!("failed to capture {agent} stdio pipes")));
    };

    let input = invocation.input.clone();
    let writer = tokio::spawn(async move {
        // A child that exits without reading stdin closes the pipe early.
        if let Err(err) = stdin.write_all(input.as_bytes()).await {
            debug!(%err, "stdin write interrupted");
            return;
        }
        if let Err(err) = stdin.shutdown().await {
            debug!(%err, "stdin shutdown failed");
        }
    });
    let mut stdout_task = tokio::spawn(read_all(stdout));
    let mut stderr_task = tokio::spawn(read_all(stderr));

    let status = match timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            writer.abort();
            stdout_task.abort();
            stderr_task.abort();
            if let Some(ticket) = ticket {
                ticket.fail();
            }
            return Err(AppError::Spawn(format!("failed to wait for {agent}: {err}")));
        }
        Err(_elapsed) => {
            // `kill` also reaps the child.
            child.kill().await.ok();
            writer.abort();
            stdout_task.abort();
            stderr_task.abort();
            return Err(timeout_error(agent, ticket, invocation.timeout, started));
        }
    };
    writer.abort();

    // Grandchildren may hold the pipes open past the child's exit.
    let joined = timeout_at(deadline, async {
        (
            join_output(&mut stdout_task).await,
            join_output(&mut stderr_task).await,
        )
    })
    .await;
    let Ok((stdout, stderr)) = joined else {
        stdout_task.abort();
        stderr_task.abort();
        return Err(timeout_error(agent, ticket, invocation.timeout, started));
    };

    let (stdout, stderr) = match (stdout, stderr) {
        (Ok(out), Ok(err)) => (out, err),
        (Err(err), _) | (_, Err(err)) => {
            if let Some(ticket) = ticket {
                ticket.fail();
            }
            return Err(err);
        }
    };

    settle_outcome(agent, ticket, status, &stdout, &stderr, started)
}

async fn read_all<R>(mut stream: R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn join_output(task: &mut JoinHandle<std::io::Result<Vec<u8>>>) -> Result<String> {
    let bytes = task
        .await
        .map_err(|err| AppError::Io(format!("pipe reader task failed: {err}")))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
