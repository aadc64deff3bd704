use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::mask::Masker;

/// How long an interrupted command may take to shut down before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("No command to run")]
    EmptyCommand,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed while running command: {0}")]
    Io(#[from] io::Error),
}

/// Captured result of the wrapped command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// stdout and stderr interleaved in the order lines arrived
    pub combined_output: String,
    pub exit_code: i32,
    pub ci_name: String,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs the wrapped command, echoing its output while capturing it.
pub struct Runner {
    grace_period: Duration,
    masker: Masker,
    ci_name: String,
}

impl Runner {
    pub fn new(masker: Masker, ci_name: String) -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            masker,
            ci_name,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    #[instrument(skip(self), fields(program = args.first().map(String::as_str).unwrap_or("")))]
    pub async fn run(&self, args: &[String]) -> Result<ExecOutput, ExecError> {
        let (program, rest) = args.split_first().ok_or(ExecError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;
        debug!(pid = child.id(), "command started");

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);
        let collector = tokio::spawn(collect(rx, self.masker.clone()));

        let status = self.wait(&mut child).await?;

        for reader in readers {
            match reader.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "failed to read command output"),
                Err(e) => warn!(error = %e, "output reader panicked"),
            }
        }
        let mut output = collector.await.map_err(io::Error::other)?;

        output.exit_code = status.code().unwrap_or(-1);
        output.ci_name = self.ci_name.clone();
        info!(exit_code = output.exit_code, "command finished");
        Ok(output)
    }

    /// Wait for the child, forwarding Ctrl-C as an interrupt and killing it
    /// once the grace period runs out.
    async fn wait(&self, child: &mut Child) -> io::Result<std::process::ExitStatus> {
        tokio::select! {
            status = child.wait() => status,
            _ = tokio::signal::ctrl_c() => {
                warn!(grace_period = ?self.grace_period, "interrupted, waiting for command to exit");
                interrupt(child);
                match tokio::time::timeout(self.grace_period, child.wait()).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!("grace period elapsed, killing command");
                        child.kill().await?;
                        child.wait().await
                    }
                }
            }
        }
    }
}

fn forward<R>(
    reader: R,
    stream: Stream,
    tx: mpsc::UnboundedSender<(Stream, Vec<u8>)>,
) -> JoinHandle<io::Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                return Ok(());
            }
            if tx.send((stream, line)).is_err() {
                return Ok(());
            }
        }
    })
}

async fn collect(mut rx: mpsc::UnboundedReceiver<(Stream, Vec<u8>)>, masker: Masker) -> ExecOutput {
    let mut output = ExecOutput::default();
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    while let Some((stream, line)) = rx.recv().await {
        let text = String::from_utf8_lossy(&line);
        let echoed = masker.mask(&text);
        let written = match stream {
            Stream::Stdout => {
                output.stdout.push_str(&text);
                stdout.write_all(echoed.as_bytes()).await
            }
            Stream::Stderr => {
                output.stderr.push_str(&text);
                stderr.write_all(echoed.as_bytes()).await
            }
        };
        if let Err(e) = written {
            debug!(error = %e, "failed to echo command output");
        }
        output.combined_output.push_str(&text);
    }

    let _ = stdout.flush().await;
    let _ = stderr.flush().await;
    output
}

#[cfg(unix)]
fn interrupt(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if result != 0 {
        warn!(pid, error = %io::Error::last_os_error(), "failed to interrupt command");
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> Runner {
        Runner::new(Masker::default(), "github-actions".to_string())
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_streams_and_exit_code() {
        let output = runner()
            .run(&args(&["sh", "-c", "echo out; echo err 1>&2; exit 3"]))
            .await
            .unwrap();

        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(output.combined_output.contains("out\n"));
        assert!(output.combined_output.contains("err\n"));
        assert_eq!(output.combined_output.len(), 8);
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.ci_name, "github-actions");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_keeps_last_line_without_newline() {
        let output = runner()
            .run(&args(&["sh", "-c", "printf 'a\\nb'"]))
            .await
            .unwrap();

        assert_eq!(output.stdout, "a\nb");
        assert_eq!(output.exit_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_capture_is_not_masked() {
        let masker = Masker::new(vec![crate::mask::Mask::Equal("secret".to_string())]);
        let output = Runner::new(masker, String::new())
            .run(&args(&["sh", "-c", "echo secret"]))
            .await
            .unwrap();

        assert_eq!(output.stdout, "secret\n");
    }

    #[tokio::test]
    async fn test_empty_command() {
        assert!(matches!(
            runner().run(&[]).await,
            Err(ExecError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let result = runner()
            .run(&args(&["/nonexistent/tfnotify-test-binary"]))
            .await;
        assert!(matches!(result, Err(ExecError::Spawn { program, .. }) if program == "/nonexistent/tfnotify-test-binary"));
    }
}
