//! CLI for launching Appium and driving mobile UI test sessions.
//!
//! Configuration comes from the same environment variables the test suite
//! reads (`TEST_RN_PLATFORM`, `TEST_ENV`, `ANDROID_APP_PATH`, `IOS_APP_PATH`,
//! `CIRCLE_BRANCH`, `APPIUM_PORT`), overridable with flags.
//!
//! # Usage
//!
//! ```bash
//! # Show what the environment resolves to
//! devicetest env
//!
//! # Print the capability set for an iOS run on the hosted grid
//! devicetest --platform ios --env sauce caps
//!
//! # Start Appium in the background (keeps running after exit)
//! devicetest server
//!
//! # Open a session, wait for the block list, print status and session id
//! devicetest session --ready ~block-list
//!
//! # Type into an element of an existing session, clearing it first
//! devicetest type <session-id> ~post-title "Hello" --clear
//!
//! # Tap the start of an element instead of its center
//! devicetest tap <session-id> "//XCUIElementTypeButton[@name='Add']" --start
//! ```

mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use devicetest_core::capabilities::Capabilities;
use devicetest_core::config::TestConfig;
use devicetest_core::driver::{AutomationDriver, DriverError};
use devicetest_core::element::Locator;
use devicetest_core::interaction::{enter_text, tap_center, tap_start};
use devicetest_core::readiness::RetryPolicy;
use devicetest_core::server::{start_local_server, ServerError, ServerLaunchConfig};
use devicetest_core::session::{start_session, SessionError, SessionOptions};
use devicetest_core::webdriver::WebDriverClient;

/// Launch Appium and drive mobile UI test sessions.
#[derive(Parser)]
#[command(name = "devicetest")]
#[command(about = "Launch Appium and drive mobile UI test sessions")]
#[command(version)]
struct Cli {
    /// Target platform (android or ios)
    #[arg(long, env = "TEST_RN_PLATFORM")]
    platform: Option<String>,

    /// Test environment (local, or anything else for the hosted grid)
    #[arg(long = "env", env = "TEST_ENV")]
    environment: Option<String>,

    /// Port of the local Appium server
    #[arg(long, env = "APPIUM_PORT")]
    port: Option<u16>,

    /// Write logs to devicetest.log in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved platform, environment and server
    Env,

    /// Print the capability set for this run
    Caps {
        /// Print the full new-session request body instead
        #[arg(long)]
        w3c: bool,
    },

    /// Start a local Appium server in the background
    Server {
        /// Server executable
        #[arg(long, default_value = "appium")]
        program: PathBuf,
        /// Log file receiving the server's output (appended)
        #[arg(long, default_value = "./appium-out.log")]
        log: PathBuf,
        /// Seconds to wait for the server to answer
        #[arg(short = 'o', long, default_value = "30")]
        timeout: u64,
    },

    /// Open a session and print the server status
    Session {
        /// Element whose presence means the app has loaded
        #[arg(long)]
        ready: Option<Locator>,
        /// Seconds to wait for readiness
        #[arg(short = 'o', long, default_value = "30")]
        timeout: u64,
        /// Close the session again before exiting
        #[arg(long)]
        end: bool,
    },

    /// Type text into an element of an existing session
    Type {
        /// Session id printed by `devicetest session`
        session_id: String,
        /// Element locator: ~accessibility-id, id=..., class=..., or an XPath
        locator: Locator,
        /// Text to type
        text: String,
        /// Clear the element first
        #[arg(short, long)]
        clear: bool,
    },

    /// Tap an element of an existing session
    Tap {
        /// Session id printed by `devicetest session`
        session_id: String,
        /// Element locator: ~accessibility-id, id=..., class=..., or an XPath
        locator: Locator,
        /// Tap the element's top-left corner instead of its center
        #[arg(long)]
        start: bool,
    },
}

fn init_logging(log_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, "devicetest.log");
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file_appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_dir.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

#[derive(Debug)]
enum CliError {
    Connection(String),
    ActionFailed(String),
    Protocol(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Connection(_) => ExitCode::from(2),
            CliError::ActionFailed(_) => ExitCode::from(1),
            CliError::Protocol(_) => ExitCode::from(3),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CliError::ActionFailed(msg) => write!(f, "{}", msg),
            CliError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl From<DriverError> for CliError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Http(_) | DriverError::Timeout | DriverError::Io(_) => {
                CliError::Connection(err.to_string())
            }
            DriverError::JsonParse(_) => CliError::Protocol(err.to_string()),
            DriverError::NoSession | DriverError::Remote { .. } | DriverError::CommandFailed(_) => {
                CliError::ActionFailed(err.to_string())
            }
        }
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Driver(e) => e.into(),
            SessionError::NotReady(e) => CliError::ActionFailed(e.to_string()),
        }
    }
}

impl From<ServerError> for CliError {
    fn from(err: ServerError) -> Self {
        CliError::Connection(err.to_string())
    }
}

/// Environment first, then flags on top.
fn resolve_config(cli: &Cli) -> TestConfig {
    let mut config = TestConfig::from_env();
    if let Some(platform) = cli.platform.as_ref().filter(|p| !p.is_empty()) {
        config.platform = platform.clone();
    }
    if let Some(environment) = cli.environment.as_ref().filter(|e| !e.is_empty()) {
        config.environment = environment.clone();
    }
    if let Some(port) = cli.port {
        config.local_port = port;
    }
    config
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = resolve_config(&cli);

    match cli.command {
        Command::Env => {
            output::print_json(&output::env_summary(&config));
        }

        Command::Caps { w3c } => {
            let caps = Capabilities::for_config(&config);
            if w3c {
                output::print_json(&caps.new_session_payload());
            } else {
                output::print_json(&serde_json::Value::Object(caps.to_json()));
            }
        }

        Command::Server {
            program,
            log,
            timeout,
        } => {
            let launch = ServerLaunchConfig {
                program,
                log_path: log,
                readiness: RetryPolicy::with_timeout(Duration::from_secs(timeout)),
                ..ServerLaunchConfig::for_config(&config)
            };
            let server = start_local_server(&launch).await?;
            println!("{}\t{}", server.pid(), server.log_path().display());
        }

        Command::Session {
            ready,
            timeout,
            end,
        } => {
            let options = SessionOptions {
                ready_locator: ready,
                readiness: RetryPolicy::with_timeout(Duration::from_secs(timeout)),
                ..SessionOptions::default()
            };
            let session = start_session(&config, &options).await?;
            output::print_json(session.status());
            println!("{}", session.id());
            if end {
                session.end().await?;
            }
        }

        Command::Type {
            session_id,
            locator,
            text,
            clear,
        } => {
            let client = WebDriverClient::attach(config.server_endpoint(), session_id)?;
            let element = client.find_element(&locator).await?;
            enter_text(&client, &element, &text, clear).await?;
            info!(%locator, "typed");
        }

        Command::Tap {
            session_id,
            locator,
            start,
        } => {
            let client = WebDriverClient::attach(config.server_endpoint(), session_id)?;
            let element = client.find_element(&locator).await?;
            let at = if start {
                tap_start(&client, &element).await?
            } else {
                tap_center(&client, &element).await?
            };
            println!("{} {}", at.x, at.y);
        }
    }

    Ok(())
}
