//! Owns the target subprocess: spawns it, pumps its stdout/stderr through a
//! [`Segmenter`] each, serialises writes to its stdin and tears it down.

use std::{
    fmt, io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, Command},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::segment::{Matcher, Segmenter};

/// Marks the start of a multi-line block the target prints on stdout.
pub const STDOUT_BLOCK_START: &[u8] = b"***DebugAdapterBlockPrint***";
/// Marks the end of a stdout block.
pub const STDOUT_BLOCK_END: &[u8] = b"***EndDebugAdapterBlockPrint***";
/// Marks the start of a multi-line block on stderr.
pub const STDERR_BLOCK_START: &[u8] = b"***DebugAdapterStderrBlock***";
/// Marks the end of a stderr block.
pub const STDERR_BLOCK_END: &[u8] = b"***EndDebugAdapterStderrBlock***";

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Matchers for the target's stdout.
pub fn stdout_matchers() -> Vec<Matcher> {
    vec![
        Matcher::bracket(STDOUT_BLOCK_START, STDOUT_BLOCK_END),
        Matcher::delimiter(b"\n".as_slice()),
    ]
}

/// Matchers for the target's stderr.
pub fn stderr_matchers() -> Vec<Matcher> {
    vec![
        Matcher::bracket(STDERR_BLOCK_START, STDERR_BLOCK_END),
        Matcher::delimiter(b"\n".as_slice()),
    ]
}

/// A native debugger (gdb, lldb, ...) that launches the real binary as its
/// own child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapper {
    pub program: PathBuf,
    /// Arguments placed before the real binary on the wrapper's command line.
    pub args: Vec<String>,
}

/// Everything needed to start the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub wrapper: Option<Wrapper>,
}

impl fmt::Display for SpawnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(wrapper) = &self.wrapper {
            write!(f, "{}", wrapper.program.display())?;
            for arg in &wrapper.args {
                write!(f, " {arg}")?;
            }
            write!(f, " ")?;
        }
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Output of the subprocess, delivered in the order it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// The process is gone and both output streams have been drained.
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

/// Handle to a running target.
///
/// Dropping the handle does not kill the process; call [`ChildBridge::kill`].
pub struct ChildBridge {
    pid: Option<u32>,
    stdin: mpsc::UnboundedSender<Vec<u8>>,
    kill: CancellationToken,
}

impl ChildBridge {
    /// Spawn the target described by `spec`. Segments and the final exit are
    /// sent to `events`.
    pub fn spawn(spec: &SpawnSpec, events: mpsc::UnboundedSender<BridgeEvent>) -> io::Result<Self> {
        let mut cmd = match &spec.wrapper {
            Some(wrapper) => {
                let mut cmd = Command::new(&wrapper.program);
                cmd.args(&wrapper.args).arg(&spec.program);
                cmd
            }
            None => Command::new(&spec.program),
        };
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        // The real binary is a grandchild when wrapped; a dedicated process
        // group lets teardown reach it.
        #[cfg(unix)]
        if spec.wrapper.is_some() {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();
        debug!(command = %spec, ?pid, "spawned target");

        let Some(stdin) = child.stdin.take() else {
            return Err(io::Error::other("child stdin was not captured"));
        };
        let Some(stdout) = child.stdout.take() else {
            return Err(io::Error::other("child stdout was not captured"));
        };
        let Some(stderr) = child.stderr.take() else {
            return Err(io::Error::other("child stderr was not captured"));
        };

        let stdout_task = tokio::spawn(pump(
            stdout,
            Segmenter::new(stdout_matchers()),
            events.clone(),
            BridgeEvent::Stdout,
        ));
        let stderr_task = tokio::spawn(pump(
            stderr,
            Segmenter::new(stderr_matchers()),
            events.clone(),
            BridgeEvent::Stderr,
        ));

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_stdin_loop(stdin, stdin_rx));

        let kill = CancellationToken::new();
        tokio::spawn(wait_for_exit(
            child,
            spec.wrapper.is_some(),
            kill.clone(),
            [stdout_task, stderr_task],
            events,
        ));

        Ok(Self {
            pid,
            stdin: stdin_tx,
            kill,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Queue `data` for the child's stdin. Writes reach the pipe in call order.
    pub fn write_stdin(&self, data: Vec<u8>) -> io::Result<()> {
        self.stdin
            .send(data)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "target stdin is closed"))
    }

    /// Request termination. Safe to call more than once.
    pub fn kill(&self) {
        self.kill.cancel();
    }
}

async fn pump<R: AsyncRead + Unpin>(
    mut reader: R,
    mut segmenter: Segmenter,
    events: mpsc::UnboundedSender<BridgeEvent>,
    wrap: fn(Vec<u8>) -> BridgeEvent,
) {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "failed to read target output");
                break;
            }
        };
        for segment in segmenter.feed(&buf[..n]) {
            if is_line_noise(&segment) {
                continue;
            }
            if events.send(wrap(segment)).is_err() {
                return;
            }
        }
    }

    let rest = segmenter.into_remainder();
    if !rest.is_empty() && !is_line_noise(&rest) {
        let _ = events.send(wrap(rest));
    }
}

/// A lone carriage return left over from a CRLF line ending.
fn is_line_noise(segment: &[u8]) -> bool {
    segment == b"\r"
}

async fn write_stdin_loop(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = rx.recv().await {
        if let Err(err) = stdin.write_all(&data).await {
            warn!(error = %err, "failed to write to target stdin");
            break;
        }
        if let Err(err) = stdin.flush().await {
            warn!(error = %err, "failed to flush target stdin");
            break;
        }
    }
}

async fn wait_for_exit(
    mut child: Child,
    wrapped: bool,
    kill: CancellationToken,
    pumps: [JoinHandle<()>; 2],
    events: mpsc::UnboundedSender<BridgeEvent>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            terminate(&mut child, wrapped);
            child.wait().await
        }
    };

    for pump in pumps {
        let _ = pump.await;
    }

    let (code, signal) = match status {
        Ok(status) => split_status(status),
        Err(err) => {
            warn!(error = %err, "failed to wait for target");
            (None, None)
        }
    };
    debug!(?code, ?signal, "target exited");
    let _ = events.send(BridgeEvent::Exited { code, signal });
}

fn split_status(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        (status.code(), status.signal())
    }

    #[cfg(not(unix))]
    {
        (status.code(), None)
    }
}

fn terminate(child: &mut Child, tree: bool) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = pid as libc::pid_t;
            // Negative pid targets the process group created at spawn.
            let target = if tree { -pid } else { pid };
            let signal = if tree { libc::SIGKILL } else { libc::SIGTERM };
            unsafe {
                let _ = libc::kill(target, signal);
            }
        }
        // SIGTERM occasionally leaves the target hanging; follow up regardless.
        let _ = child.start_kill();
    }

    #[cfg(windows)]
    {
        if tree {
            if let Some(pid) = child.id() {
                let pid = pid.to_string();
                let _ = std::process::Command::new("taskkill")
                    .args(["/PID", &pid, "/T", "/F"])
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
            }
        }
        let _ = child.start_kill();
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = tree;
        let _ = child.start_kill();
    }
}
