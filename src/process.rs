//! # Process Lifecycle Module
//!
//! Questo modulo avvia ffmpeg e ne gestisce il ciclo di vita.
//!
//! ## Responsabilità:
//! - Spawn del processo con stdout/stderr in pipe, letti da task dedicati
//! - Consegna dei chunk di output come `ProcessEvent`, con l'evento `Exit`
//!   garantito dopo l'ultimo chunk
//! - Modalità bufferizzata (`run_buffered`) con timeout e limite di buffer
//! - Abort idempotente: kill del processo e cancellazione dell'output
//!   solo dopo che il processo è effettivamente terminato
//! - `Conversion<T>`: handle con canale di progresso e risultato unico
//!
//! ## Stati:
//! `Running → Completed` (uscita osservata) oppure `Running → Aborted`
//! (kill richiesto). Gli stati terminali non cambiano più.

use crate::config::Config;
use crate::error::{MediaError, Result};
use crate::progress::ProgressTracker;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, warn};

const READ_CHUNK: usize = 8 * 1024;

/// One piece of output, or the final exit notification
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    Exit(ExitInfo),
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// An abort was requested while the process was running
    pub aborted: bool,
}

impl ExitInfo {
    /// Exit code 0 and no signal
    pub fn success(&self) -> bool {
        self.code == Some(0) && self.signal.is_none()
    }

    fn from_status(status: &ExitStatus, aborted: bool) -> Self {
        Self {
            code: status.code(),
            signal: exit_signal(status),
            aborted,
        }
    }

    fn into_error(self) -> MediaError {
        MediaError::ProcessExit {
            code: self.code,
            signal: self.signal,
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Completed,
    Aborted,
}

#[derive(Debug)]
struct Lifecycle {
    state: ProcessState,
    delete_output: bool,
}

#[derive(Debug)]
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    output: Option<PathBuf>,
    kill: Notify,
}

/// Handle to a spawned process. Clones refer to the same process.
#[derive(Debug, Clone)]
pub struct RunningProcess {
    shared: Arc<Shared>,
    pid: Option<u32>,
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn output(&self) -> Option<&Path> {
        self.shared.output.as_deref()
    }

    pub fn state(&self) -> ProcessState {
        self.shared
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Kills the process and removes its output file once it has exited.
    ///
    /// Returns `false` when the process already completed or was aborted.
    pub fn abort(&self) -> bool {
        {
            let mut lifecycle = self.shared.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            if lifecycle.state != ProcessState::Running {
                return false;
            }
            lifecycle.state = ProcessState::Aborted;
            lifecycle.delete_output = self
                .shared
                .output
                .as_deref()
                .and_then(|p| std::fs::symlink_metadata(p).ok())
                .is_some_and(|m| m.is_file());
        }

        debug!("Aborting process {:?}", self.pid);
        self.shared.kill.notify_one();
        true
    }
}

/// Spawns `argv` and streams its output as events.
///
/// `output` is the file deleted if the process gets aborted.
pub fn spawn(argv: &[String], output: Option<PathBuf>) -> Result<(RunningProcess, mpsc::UnboundedReceiver<ProcessEvent>)> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| MediaError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line")))?;

    debug!("Spawning: {}", argv.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let pid = child.id();
    let shared = Arc::new(Shared {
        lifecycle: Mutex::new(Lifecycle {
            state: ProcessState::Running,
            delete_output: false,
        }),
        output,
        kill: Notify::new(),
    });
    let (tx, rx) = mpsc::unbounded_channel();

    let stdout_task = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(forward(pipe, tx.clone(), ProcessEvent::Stdout)));
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(forward(pipe, tx.clone(), ProcessEvent::Stderr)));

    let supervisor = Arc::clone(&shared);
    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = supervisor.kill.notified() => {
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill process {:?}: {}", pid, e);
                }
                child.wait().await
            }
        };

        let (aborted, delete_output) = {
            let mut lifecycle = supervisor.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            if lifecycle.state == ProcessState::Running {
                lifecycle.state = ProcessState::Completed;
            }
            (lifecycle.state == ProcessState::Aborted, lifecycle.delete_output)
        };

        if delete_output {
            if let Some(ref path) = supervisor.output {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => debug!("Removed partial output {}", path.display()),
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }

        // every data event is delivered before the exit event
        futures::future::join(join_reader(stdout_task), join_reader(stderr_task)).await;

        let info = match status {
            Ok(status) => ExitInfo::from_status(&status, aborted),
            Err(e) => {
                error!("Failed to wait for process {:?}: {}", pid, e);
                ExitInfo {
                    aborted,
                    ..Default::default()
                }
            }
        };
        debug!("Process {:?} exited: {:?}", pid, info);
        let _ = tx.send(ProcessEvent::Exit(info));
    });

    Ok((RunningProcess { shared, pid }, rx))
}

async fn forward<R>(mut pipe: R, tx: mpsc::UnboundedSender<ProcessEvent>, wrap: fn(String) -> ProcessEvent)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(String::from_utf8_lossy(&buf[..n]).into_owned())).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading process output: {}", e);
                break;
            }
        }
    }
}

async fn join_reader(task: Option<tokio::task::JoinHandle<()>>) {
    if let Some(task) = task {
        if let Err(e) = task.await {
            warn!("Output reader task failed: {}", e);
        }
    }
}

/// Output of a process run to completion with buffered streams
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: ExitInfo,
}

impl BufferedOutput {
    /// Fails with `ProcessExit` on a signal or a non-zero exit
    pub fn check(&self) -> Result<()> {
        if self.exit.success() {
            Ok(())
        } else {
            Err(self.exit.into_error())
        }
    }

    /// Killed by a signal or by the timeout
    pub fn killed(&self) -> bool {
        self.exit.signal.is_some() || self.exit.aborted
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        text.push_str(&self.stdout);
        text.push_str(&self.stderr);
        text
    }
}

/// Runs `argv` to completion, keeping at most `config.max_buffer` bytes per
/// stream. The process is killed when `config.timeout()` elapses.
pub async fn run_buffered(argv: &[String], config: &Config) -> Result<BufferedOutput> {
    let (process, mut events) = spawn(argv, None)?;
    let deadline = config.timeout().map(|t| tokio::time::Instant::now() + t);
    let mut timed_out = false;
    let mut stdout = String::new();
    let mut stderr = String::new();

    let exit = loop {
        let event = match deadline {
            Some(deadline) if !timed_out => {
                tokio::select! {
                    event = events.recv() => event,
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!("Process {:?} timed out after {}s", process.pid(), config.timeout_secs);
                        timed_out = true;
                        process.abort();
                        continue;
                    }
                }
            }
            _ => events.recv().await,
        };

        match event {
            Some(ProcessEvent::Stdout(chunk)) => push_capped(&mut stdout, &chunk, config.max_buffer),
            Some(ProcessEvent::Stderr(chunk)) => push_capped(&mut stderr, &chunk, config.max_buffer),
            Some(ProcessEvent::Exit(info)) => break info,
            None => {
                return Err(MediaError::Io(std::io::Error::other("process supervisor ended without exit status")));
            }
        }
    };

    Ok(BufferedOutput { stdout, stderr, exit })
}

fn push_capped(buf: &mut String, chunk: &str, max: usize) {
    let room = max.saturating_sub(buf.len());
    if chunk.len() <= room {
        buf.push_str(chunk);
        return;
    }

    let mut end = room;
    while !chunk.is_char_boundary(end) {
        end -= 1;
    }
    if end > 0 {
        debug!("Output buffer full, dropping {} bytes", chunk.len() - end);
    }
    buf.push_str(&chunk[..end]);
}

/// A running conversion: live progress plus a single final result
#[derive(Debug)]
pub struct Conversion<T> {
    process: RunningProcess,
    progress: mpsc::UnboundedReceiver<f64>,
    result: oneshot::Receiver<Result<T>>,
}

impl<T: Send + 'static> Conversion<T> {
    pub fn process(&self) -> &RunningProcess {
        &self.process
    }

    pub fn abort(&self) -> bool {
        self.process.abort()
    }

    /// Next progress percentage, `None` once the process has exited
    pub async fn next_progress(&mut self) -> Option<f64> {
        self.progress.recv().await
    }

    /// Waits for the final result, discarding progress
    pub async fn wait(self) -> Result<T> {
        flatten(self.result.await)
    }

    /// Waits for the final result, handing every percentage to `on_progress`
    pub async fn wait_with_progress<F>(self, mut on_progress: F) -> Result<T>
    where
        F: FnMut(f64),
    {
        let Conversion {
            mut progress,
            mut result,
            ..
        } = self;

        loop {
            tokio::select! {
                biased;
                Some(percent) = progress.recv() => on_progress(percent),
                outcome = &mut result => return flatten(outcome),
            }
        }
    }

    /// Derives a new result from the successful one, e.g. folder → file list
    pub fn map_output<U, F>(self, f: F) -> Conversion<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let result = self.result;
        tokio::spawn(async move {
            let _ = tx.send(flatten(result.await).and_then(f));
        });

        Conversion {
            process: self.process,
            progress: self.progress,
            result: rx,
        }
    }
}

fn flatten<T>(outcome: std::result::Result<Result<T>, oneshot::error::RecvError>) -> Result<T> {
    outcome.unwrap_or_else(|_| Err(MediaError::Io(std::io::Error::other("conversion task ended without a result"))))
}

/// Spawns a conversion, feeding output through `tracker` and resolving to
/// `expected_output` if the process succeeds and the path exists afterwards
pub fn start_conversion(argv: &[String], expected_output: PathBuf, tracker: ProgressTracker) -> Result<Conversion<PathBuf>> {
    let (process, mut events) = spawn(argv, Some(expected_output.clone()))?;
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let (result_tx, result_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut exit = None;
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Stdout(chunk) | ProcessEvent::Stderr(chunk) => {
                    if let Some(percent) = tracker.feed(&chunk) {
                        let _ = progress_tx.send(percent);
                    }
                }
                ProcessEvent::Exit(info) => {
                    exit = Some(info);
                    break;
                }
            }
        }
        drop(progress_tx);

        let outcome = conversion_outcome(exit, expected_output);
        if let Err(ref e) = outcome {
            debug!("Conversion failed: {} (code {})", e, e.code());
        }
        let _ = result_tx.send(outcome);
    });

    Ok(Conversion {
        process,
        progress: progress_rx,
        result: result_rx,
    })
}

fn conversion_outcome(exit: Option<ExitInfo>, expected_output: PathBuf) -> Result<PathBuf> {
    let exit = exit.ok_or_else(|| MediaError::Io(std::io::Error::other("process supervisor ended without exit status")))?;

    if exit.aborted {
        return Err(MediaError::Aborted);
    }
    if !exit.success() {
        return Err(exit.into_error());
    }
    if !expected_output.exists() {
        return Err(MediaError::NoOutputProduced(expected_output));
    }
    Ok(expected_output)
}
