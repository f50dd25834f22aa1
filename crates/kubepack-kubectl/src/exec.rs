//! Child-process supervision
//!
//! Every kubectl invocation runs through here. Stderr is captured in full as
//! a line list so callers can filter it selectively. When the context is
//! cancelled the child is killed and the context's error is returned instead
//! of the child's exit error.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use kubepack_model::JsonStreamDecoder;

use crate::client::ResourceEvent;
use crate::context::Context;
use crate::error::{ClientError, Result};

/// Runs the child to completion, returning its captured stdout
pub(crate) async fn run(
    ctx: &Context,
    program: &str,
    args: &[String],
    stdin: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    tracing::debug!("running {} {}", program, args.join(" "));
    let mut child = spawn(program, args, stdin.is_some())?;

    // Stdin is written concurrently so a large manifest cannot deadlock
    // against the child's output pipes.
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        tokio::spawn(async move {
            let _ = pipe.write_all(&input).await;
        });
    }
    let stdout_task = read_pipe(child.stdout.take());
    let stderr_task = read_pipe(child.stderr.take());

    let status = tokio::select! {
        _ = ctx.cancelled() => {
            let _ = child.kill().await;
            return Err(ctx.error().unwrap_or(ClientError::Cancelled));
        }
        status = child.wait() => status?,
    };
    let stdout = stdout_task.await.map_err(std::io::Error::other)??;
    let stderr = stderr_task.await.map_err(std::io::Error::other)??;
    let stderr_lines = to_lines(&stderr);

    if !status.success() {
        if let Some(err) = ctx.error() {
            return Err(err);
        }
        return Err(exec_error(program, args, &status, stderr_lines));
    }
    Ok(stdout)
}

/// Spawns the child and forwards its stdout as a resource event stream. The
/// returned channel closes when the child exits or the context is cancelled;
/// a terminal failure is delivered as a final error event.
pub(crate) fn stream(ctx: Context, program: String, args: Vec<String>) -> mpsc::Receiver<ResourceEvent> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if let Err(e) = stream_inner(&ctx, &program, &args, &tx).await {
            let _ = tx.send(Err(e)).await;
        }
    });
    rx
}

async fn stream_inner(
    ctx: &Context,
    program: &str,
    args: &[String],
    tx: &mpsc::Sender<ResourceEvent>,
) -> Result<()> {
    tracing::debug!("running {} {}", program, args.join(" "));
    let mut child = spawn(program, args, false)?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout not piped"))?;
    let stderr_task = read_pipe(child.stderr.take());

    let mut decoder = JsonStreamDecoder::new();
    let mut buf = [0u8; 8192];
    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                let _ = child.kill().await;
                return Err(ctx.error().unwrap_or(ClientError::Cancelled));
            }
            read = stdout.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                for event in decoder.push(&buf[..n]) {
                    let event = event.map_err(ClientError::from);
                    let stop = event.is_err();
                    if tx.send(event).await.is_err() || stop {
                        let _ = child.kill().await;
                        return Ok(());
                    }
                }
            }
        }
    }

    let status = child.wait().await?;
    let stderr = stderr_task.await.map_err(std::io::Error::other)??;
    if !status.success() {
        if let Some(err) = ctx.error() {
            return Err(err);
        }
        return Err(exec_error(program, args, &status, to_lines(&stderr)));
    }
    decoder.finish()?;
    Ok(())
}

fn spawn(program: &str, args: &[String], piped_stdin: bool) -> Result<Child> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if piped_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(cmd.spawn()?)
}

fn read_pipe<R: AsyncReadExt + Unpin + Send + 'static>(
    pipe: Option<R>,
) -> tokio::task::JoinHandle<std::io::Result<Vec<u8>>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

fn to_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn exec_error(
    program: &str,
    args: &[String],
    status: &std::process::ExitStatus,
    stderr: Vec<String>,
) -> ClientError {
    let command = format!("{program} {}", args.join(" "));
    let message = if stderr.is_empty() {
        status.to_string()
    } else {
        format!("{status}. {}", stderr.join("\n  "))
    };
    ClientError::Exec {
        command,
        message,
        stderr,
    }
}
