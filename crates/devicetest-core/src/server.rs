//! Launching a local Appium server for local test runs.
//!
//! [`start_local_server`] spawns the server as a detached background process,
//! sends both of its output streams to one append-only log file, and then polls
//! the server's `/status` endpoint until it answers. The returned
//! [`ServerProcess`] does not own the server's lifetime: dropping it leaves the
//! server running, and [`ServerProcess::stop`] must be called explicitly to
//! terminate it.
//!
//! # Example
//!
//! ```no_run
//! use devicetest_core::config::TestConfig;
//! use devicetest_core::server::{start_local_server, ServerLaunchConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TestConfig::from_env();
//! let server = start_local_server(&ServerLaunchConfig::for_config(&config)).await?;
//! println!("appium pid {} logging to {}", server.pid(), server.log_path().display());
//! # Ok(())
//! # }
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{TestConfig, DEFAULT_APPIUM_PORT};
use crate::driver::{status_is_ready, AutomationDriver, DriverError, ServerEndpoint};
use crate::readiness::{wait_until_ready, ProbeOutcome, ReadinessError, RetryPolicy};
use crate::webdriver::WebDriverClient;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default server executable.
pub const DEFAULT_PROGRAM: &str = "appium";

/// Default log file, relative to the working directory.
pub const DEFAULT_LOG_PATH: &str = "./appium-out.log";

/// Number of log lines included in [`ServerError::Exited`].
const LOG_TAIL_LINES: usize = 20;

/// How much of the end of the log is read for the tail.
const LOG_TAIL_BYTES: u64 = 64 * 1024;

/// How to launch the local server.
#[derive(Debug, Clone)]
pub struct ServerLaunchConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Port the server will listen on, used for the readiness probe.
    pub port: u16,
    /// File receiving the server's stdout and stderr (appended).
    pub log_path: PathBuf,
    /// How long and how often to probe for readiness.
    pub readiness: RetryPolicy,
}

impl Default for ServerLaunchConfig {
    fn default() -> Self {
        Self::appium(DEFAULT_APPIUM_PORT)
    }
}

impl ServerLaunchConfig {
    /// `appium -p <port>` logging to [`DEFAULT_LOG_PATH`].
    pub fn appium(port: u16) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            args: vec!["-p".to_string(), port.to_string()],
            port,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            readiness: RetryPolicy::default(),
        }
    }

    /// The launch configuration matching a run's local port.
    pub fn for_config(config: &TestConfig) -> Self {
        Self::appium(config.local_port)
    }

    /// The endpoint the launched server will serve.
    pub fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint::local(self.port)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors specific to launching the local server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The log file could not be opened.
    #[error("Failed to open server log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The executable could not be started.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The server exited before becoming ready.
    #[error("Server exited before becoming ready ({status})\n{log_tail}")]
    Exited { status: String, log_tail: String },

    /// The server is still running but never answered the readiness probe.
    #[error("Server (pid {pid}) did not become ready: {source}")]
    NotReady {
        pid: u32,
        #[source]
        source: ReadinessError,
    },

    /// The probe client could not be built.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// ServerProcess
// ---------------------------------------------------------------------------

/// Handle to a launched server.
///
/// Dropping the handle does not stop the server.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    log_path: PathBuf,
    endpoint: ServerEndpoint,
}

impl ServerProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// The endpoint sessions should be opened against.
    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    /// Returns `true` while the process has not exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the server together with everything it started, and reap it.
    /// Succeeds if it had already exited.
    pub fn stop(&mut self) -> std::io::Result<()> {
        if self.is_running() {
            info!(pid = self.pid(), "stopping server");
            kill_process_group(&mut self.child)?;
        }
        self.child.wait()?;
        Ok(())
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> std::io::Result<()> {
    let pgid: libc::pid_t = match child.id().try_into() {
        Ok(pgid) => pgid,
        Err(_) => return child.kill(),
    };

    // SAFETY: the child was spawned as the leader of its own process group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// Reads the last lines of the server log, for error reports.
///
/// Only the end of the file is read. Invalid UTF-8 is replaced.
fn log_tail(path: &Path) -> String {
    let Ok(mut file) = File::open(path) else {
        return String::new();
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    let offset = len.saturating_sub(LOG_TAIL_BYTES);

    let mut bytes = Vec::new();
    if file.seek(SeekFrom::Start(offset)).is_err() || file.read_to_end(&mut bytes).is_err() {
        return String::new();
    }

    let text = String::from_utf8_lossy(&bytes);
    let mut lines: Vec<&str> = text.lines().collect();
    // Reading from the middle of the file starts mid-line.
    if offset > 0 && !lines.is_empty() {
        lines.remove(0);
    }
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

/// Spawns the server without waiting for it.
///
/// The log file is opened in append mode (created if missing) and shared by
/// stdout and stderr. Stdin is closed. The child is put in its own process
/// group so it is not tied to the caller's terminal or signals.
///
/// # Errors
///
/// - [`ServerError::Log`] if the log file cannot be opened
/// - [`ServerError::Spawn`] if the executable cannot be started
pub fn spawn_server(config: &ServerLaunchConfig) -> Result<ServerProcess, ServerError> {
    let open_log = || {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_path)
            .map_err(|source| ServerError::Log {
                path: config.log_path.clone(),
                source,
            })
    };
    let out = open_log()?;
    let err = out.try_clone()?;

    let mut command = Command::new(&config.program);
    command
        .args(&config.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = command.spawn().map_err(|source| ServerError::Spawn {
        program: config.program.display().to_string(),
        source,
    })?;

    info!(
        pid = child.id(),
        program = %config.program.display(),
        args = ?config.args,
        log = %config.log_path.display(),
        "server spawned"
    );

    Ok(ServerProcess {
        child,
        log_path: config.log_path.clone(),
        endpoint: config.endpoint(),
    })
}

/// Spawns the server and waits until its `/status` endpoint answers.
///
/// # Errors
///
/// - Any error from [`spawn_server`]
/// - [`ServerError::Exited`] if the process exits while being probed
/// - [`ServerError::NotReady`] if the readiness budget runs out; the process
///   is left running
#[instrument(skip(config), fields(port = config.port))]
pub async fn start_local_server(config: &ServerLaunchConfig) -> Result<ServerProcess, ServerError> {
    let mut process = spawn_server(config)?;
    let client = WebDriverClient::new(process.endpoint.clone())?;

    let result = {
        let child = &mut process.child;
        let client = &client;
        wait_until_ready(&config.readiness, "appium server", move || {
            let exited = child.try_wait();
            async move {
                match exited {
                    Ok(Some(status)) => ProbeOutcome::Abort(format!("process exited with {status}")),
                    Err(e) => ProbeOutcome::Abort(e.to_string()),
                    Ok(None) => match client.status().await {
                        Ok(status) if status_is_ready(&status) => ProbeOutcome::Ready,
                        Ok(_) => ProbeOutcome::NotReady("status reports not ready".into()),
                        // A WebDriver error body still means the server is listening,
                        // e.g. Appium 2 serving under `/` rather than `/wd/hub`.
                        Err(DriverError::Remote { error, .. }) => {
                            debug!(%error, "server answered status with an error");
                            ProbeOutcome::Ready
                        }
                        Err(e) => ProbeOutcome::NotReady(e.to_string()),
                    },
                }
            }
        })
        .await
    };

    match result {
        Ok(attempts) => {
            info!(pid = process.pid(), attempts, "server ready");
            Ok(process)
        }
        Err(source) => match process.child.try_wait() {
            Ok(Some(status)) => Err(ServerError::Exited {
                status: status.to_string(),
                log_tail: log_tail(&process.log_path),
            }),
            _ => {
                warn!(pid = process.pid(), "server not ready, leaving it running");
                Err(ServerError::NotReady {
                    pid: process.pid(),
                    source,
                })
            }
        },
    }
}
