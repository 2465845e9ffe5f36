/// Application hand-off.
///
/// After the bundle is on disk the launcher resolves an [`Application`] from
/// configuration and runs it. The default is a child process started in the
/// target directory, with its stdout/stderr forwarded into the log.
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{bail, Context};
use streamboot_shared::config::BootConfig;
use streamboot_shared::errors::BootError;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// The downloaded application's entry point.
pub trait Application: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Run the application to completion.
    fn run(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Runs the entry command as a child process.
#[derive(Debug, Clone)]
pub struct ProcessApplication {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl ProcessApplication {
    pub fn new(program: impl Into<String>, args: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
        }
    }
}

impl Application for ProcessApplication {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(&self) -> anyhow::Result<()> {
        info!(
            "Launching {} {:?} in {}",
            self.program,
            self.args,
            self.work_dir.display()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {} in {}", self.program, self.work_dir.display()))?;

        info!("Application spawned (pid: {:?})", child.id());

        let stdout = child.stdout.take().context("no stdout handle")?;
        let stderr = child.stderr.take().context("no stderr handle")?;
        let stdout_task = tokio::spawn(forward_lines(stdout, "stdout"));
        let stderr_task = tokio::spawn(forward_lines(stderr, "stderr"));

        let status = child.wait().await.context("failed to wait for application")?;
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        info!("Application exited cleanly");
        Ok(())
    }
}

/// Forward each line of a child stream into the log.
async fn forward_lines<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!("[app {}] {}", stream, line),
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read application {}: {}", stream, e);
                break;
            }
        }
    }
    debug!("Application {} stream ended", stream);
}

/// Split a command line on whitespace; double quotes group words.
pub fn split_command(command: &str) -> Result<Vec<String>, BootError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;

    for c in command.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }

    if in_quotes {
        return Err(BootError::Config(format!("unterminated quote in entry command: {}", command)));
    }
    if has_word {
        words.push(current);
    }
    Ok(words)
}

/// Build the application named by `config.entry_command`.
pub fn resolve_application(config: &BootConfig) -> Result<ProcessApplication, BootError> {
    let mut words = split_command(&config.entry_command)?.into_iter();
    let program = words
        .next()
        .ok_or_else(|| BootError::Config("entry command is empty".into()))?;
    Ok(ProcessApplication::new(program, words.collect(), config.target_dir.clone()))
}
