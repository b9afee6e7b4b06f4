// Launched target processes
//
// The target's stdio is piped and handed to the caller untouched. Nothing
// here reads the pipes: a caller that does not drain stdout and stderr will
// see the target block once the OS pipe buffer is full.

use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

#[derive(Debug)]
pub struct TargetProcess {
    child: Child,
    // Held apart from the child so that waiting on it never closes stdin
    stdin: Option<ChildStdin>,
    command_line: Vec<String>,
}

impl TargetProcess {
    /// Spawn `command_line[0]` with the remaining tokens as arguments
    ///
    /// The child is killed if the handle is dropped while it is still running.
    pub(crate) fn spawn(command_line: Vec<String>) -> io::Result<Self> {
        let (program, args) = command_line
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

        debug!("Spawning target: {:?}", command_line);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        info!("Launched target process pid={:?}", child.id());

        let stdin = child.stdin.take();
        Ok(Self {
            child,
            stdin,
            command_line,
        })
    }

    /// OS process id, `None` once the process has been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    pub async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedQuote;

/// Split a command line on whitespace, treating `quote` as a grouping mark
///
/// The quote character itself is dropped; `""` yields an empty token.
pub fn tokenize(command: &str, quote: char) -> Result<Vec<String>, UnmatchedQuote> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in command.chars() {
        if c == quote {
            quoted = !quoted;
            in_token = true;
        } else if c.is_whitespace() && !quoted {
            if in_token {
                tokens.push(std::mem::take(&mut current));
                in_token = false;
            }
        } else {
            current.push(c);
            in_token = true;
        }
    }

    if quoted {
        return Err(UnmatchedQuote);
    }
    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}
