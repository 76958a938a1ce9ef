//! Local process runner
//!
//! Spawns agents with `tokio::process`, buffers their stdout/stderr per tag and
//! streams the lines to whoever is waiting for a marker. Agents can optionally
//! run inside the network namespace of their node and under `strace`.
//!
//! Each agent leads its own process group. Stop signals and the forced kill
//! after `reap_timeout` go to the whole group so wrapped agents and their
//! children are covered too.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::command::AgentCommand;
use crate::config::RunnerConfig;
use crate::errors::RunnerError;
use crate::runner::ProcessRunner;
use crate::types::CapturedStream;

/// Status reported when a process was terminated by a signal
const SIGNALED_STATUS: i32 = -1;

struct TrackedProcess {
    node: String,
    child: Option<Child>,
    /// Process group led by the child
    pgid: Option<u32>,
    output: Arc<Mutex<String>>,
    readers: Vec<JoinHandle<()>>,
    trace_path: Option<PathBuf>,
    status: i32,
    stopped: bool,
}

impl TrackedProcess {
    /// Reap the child and drain its output readers, each bounded by `reap_timeout`
    async fn settle(&mut self, reap_timeout: Duration, tag: &str) {
        if let Some(mut child) = self.child.take() {
            self.status = reap(reap_timeout, tag, self.pgid, &mut child).await;
        }
        let readers = std::mem::take(&mut self.readers);
        drain_readers(reap_timeout, tag, self.pgid, readers).await;
    }
}

/// Runs agents as child processes of the harness
pub struct LocalProcessRunner {
    config: RunnerConfig,
    processes: HashMap<String, TrackedProcess>,
}

impl LocalProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            processes: HashMap::new(),
        }
    }

    /// Tags of processes that have not been stopped
    pub fn running_tags(&self) -> Vec<String> {
        self.processes
            .iter()
            .filter(|(_, process)| !process.stopped)
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    fn trace_path(&self, tag: &str) -> PathBuf {
        self.config.trace_dir().join(format!("{}.strace", tag))
    }

    /// Full argv after applying the namespace and strace wrappers
    fn argv(&self, node: &str, command: &AgentCommand, trace_path: Option<&PathBuf>) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::new();

        if self.config.netns {
            argv.extend(["ip", "netns", "exec"].map(OsString::from));
            argv.push(format!("{}{}", self.config.netns_prefix, node).into());
        }

        if let Some(path) = trace_path {
            argv.extend(["strace", "-tt", "-f", "-A", "-o"].map(OsString::from));
            argv.push(path.as_os_str().to_os_string());
        }

        argv.push(command.program.as_os_str().to_os_string());
        argv.extend(command.args.iter().map(OsString::from));
        argv
    }
}

async fn reap(reap_timeout: Duration, tag: &str, pgid: Option<u32>, child: &mut Child) -> i32 {
    let status = match timeout(reap_timeout, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!("Process {} did not exit in time, killing it", tag);
            kill(tag, pgid, child);
            child.wait().await
        }
    };

    match status {
        Ok(status) => {
            debug!("Process {} exited with status: {}", tag, status);
            status.code().unwrap_or(SIGNALED_STATUS)
        }
        Err(e) => {
            warn!("Error waiting for {} to exit: {}", tag, e);
            SIGNALED_STATUS
        }
    }
}

/// Join the output readers by a shared deadline.
///
/// A reader still running at the deadline means some process in the group
/// holds the pipe open; the group is killed and the remaining readers are
/// aborted. Output read so far stays in the buffer.
async fn drain_readers(
    reap_timeout: Duration,
    tag: &str,
    pgid: Option<u32>,
    readers: Vec<JoinHandle<()>>,
) {
    let deadline = Instant::now() + reap_timeout;
    let mut readers = readers.into_iter();

    while let Some(mut reader) = readers.next() {
        match timeout_at(deadline, &mut reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Output reader for {} failed: {}", tag, e),
            Err(_) => {
                warn!("Output of {} still open after {:?}, killing its group", tag, reap_timeout);
                if let Some(pgid) = pgid {
                    signal_group(tag, pgid, Signal::Kill);
                }
                reader.abort();
                readers.by_ref().for_each(|reader| reader.abort());
                return;
            }
        }
    }
}

fn spawn_reader<R>(
    reader: R,
    tag: String,
    output: Arc<Mutex<String>>,
    sender: mpsc::UnboundedSender<String>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut sender = Some(sender);

        while let Ok(Some(line)) = lines.next_line().await {
            debug!("Output from {}: {}", tag, line);

            {
                let mut buffer = output.lock().await;
                buffer.push_str(&line);
                buffer.push('\n');
            }

            // Keep buffering after the waiter has gone away.
            if let Some(tx) = &sender {
                if tx.send(line).is_err() {
                    sender = None;
                }
            }
        }
    })
}

// ----------------------------------------------------------------------------
// Signals
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Send `signal` to every process in the group; false if it could not be sent
#[cfg(unix)]
fn signal_group(tag: &str, pgid: u32, signal: Signal) -> bool {
    let signo = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };

    // SAFETY: killpg(2) only delivers a signal; the group was created for our own child
    let result = unsafe { libc::killpg(pgid as libc::pid_t, signo) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        debug!("{:?} to process group of {} failed: {}", signal, tag, err);
    }
    result == 0
}

#[cfg(not(unix))]
fn signal_group(_tag: &str, _pgid: u32, _signal: Signal) -> bool {
    false
}

/// Ask the agent and everything in its group to terminate
fn terminate(tag: &str, pgid: Option<u32>, child: &mut Child) {
    let signaled = pgid.is_some_and(|pgid| signal_group(tag, pgid, Signal::Term));
    if !signaled {
        debug!("SIGTERM to {} failed, killing it", tag);
        if let Err(e) = child.start_kill() {
            warn!("Failed to kill {}: {}", tag, e);
        }
    }
}

/// Kill the agent and everything in its group
fn kill(tag: &str, pgid: Option<u32>, child: &mut Child) {
    let signaled = pgid.is_some_and(|pgid| signal_group(tag, pgid, Signal::Kill));
    if !signaled {
        if let Err(e) = child.start_kill() {
            warn!("Failed to kill {}: {}", tag, e);
        }
    }
}

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
    async fn start(
        &mut self,
        node: &str,
        command: &AgentCommand,
        tag: &str,
        wait_marker: Option<&str>,
    ) -> Result<(), RunnerError> {
        // A stopped tag may be started again; its output keeps accumulating.
        let previous = match self.processes.remove(tag) {
            Some(process) if !process.stopped => {
                self.processes.insert(tag.to_string(), process);
                return Err(RunnerError::DuplicateTag {
                    tag: tag.to_string(),
                });
            }
            Some(mut process) => {
                process.settle(self.config.reap_timeout(), tag).await;
                Some(process)
            }
            None => None,
        };

        let output = match &previous {
            Some(process) => process.output.clone(),
            None => Arc::new(Mutex::new(String::new())),
        };

        let trace_path = self.config.strace.then(|| self.trace_path(tag));
        if let (Some(path), None) = (&trace_path, &previous) {
            // strace appends; drop leftovers from an earlier run with this tag.
            let _ = tokio::fs::remove_file(path).await;
        }

        let argv = self.argv(node, command, trace_path.as_ref());
        info!("Starting {} on {}", tag, node);
        debug!("Command: {:?}", argv);

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                // Keep the earlier run's output collectable.
                if let Some(process) = previous {
                    self.processes.insert(tag.to_string(), process);
                }
                return Err(RunnerError::Spawn {
                    tag: tag.to_string(),
                    source,
                });
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tag.to_string(), output.clone(), tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tag.to_string(), output.clone(), tx));
        }

        self.processes.insert(
            tag.to_string(),
            TrackedProcess {
                node: node.to_string(),
                pgid: child.id(),
                child: Some(child),
                output,
                readers,
                trace_path,
                status: 0,
                stopped: false,
            },
        );

        // Without a marker nobody reads the lines; dropping the receiver
        // leaves the readers buffering only.
        let Some(marker) = wait_marker else {
            return Ok(());
        };

        while let Some(line) = rx.recv().await {
            if line.contains(marker) {
                info!("{} reported '{}'", tag, marker);
                return Ok(());
            }
        }

        Err(RunnerError::OutputClosed {
            tag: tag.to_string(),
            marker: marker.to_string(),
        })
    }

    async fn stop(&mut self, _node: &str, tag: &str) -> Result<(), RunnerError> {
        let Some(process) = self.processes.get_mut(tag) else {
            debug!("No process tagged {} to stop", tag);
            return Ok(());
        };

        if !process.stopped {
            info!("Stopping {} on {}", tag, process.node);
            if let Some(child) = process.child.as_mut() {
                terminate(tag, process.pgid, child);
            }
            process.stopped = true;
        }

        Ok(())
    }

    async fn collect_output(&mut self, _node: &str, tag: &str) -> Result<CapturedStream, RunnerError> {
        let reap_timeout = self.config.reap_timeout();
        let Some(process) = self.processes.get_mut(tag) else {
            return Ok(CapturedStream::default());
        };

        process.settle(reap_timeout, tag).await;

        let text = process.output.lock().await.clone();
        Ok(CapturedStream::new(process.status, text))
    }

    async fn collect_trace(&mut self, _node: &str, tag: &str) -> Result<CapturedStream, RunnerError> {
        let Some(path) = self
            .processes
            .get(tag)
            .and_then(|process| process.trace_path.clone())
        else {
            return Ok(CapturedStream::default());
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(CapturedStream::new(0, text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No trace written for {} at {}", tag, path.display());
                Ok(CapturedStream::new(1, String::new()))
            }
            Err(e) => Err(RunnerError::Io(e)),
        }
    }
}

impl Drop for LocalProcessRunner {
    fn drop(&mut self) {
        for (tag, process) in self.processes.iter_mut() {
            if let Some(mut child) = process.child.take() {
                kill(tag, process.pgid, &mut child);
            }
        }
    }
}
