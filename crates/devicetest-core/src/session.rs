//! Opening automation sessions.
//!
//! [`start_session`] is the entry point test programs use: it builds the
//! capability set for the configured platform and environment, opens a session
//! on the matching server and waits until the app under test is usable.
//! [`open_session`] does the same against any [`AutomationDriver`], which is how
//! the sequence is tested without a device.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument};

use crate::capabilities::Capabilities;
use crate::config::TestConfig;
use crate::driver::{status_is_ready, AutomationDriver, DriverError};
use crate::element::Locator;
use crate::readiness::{wait_until_ready, ProbeOutcome, ReadinessError, RetryPolicy};
use crate::webdriver::WebDriverClient;

/// Implicit wait applied to element lookups once a session is open.
pub const DEFAULT_IMPLICIT_WAIT: Duration = Duration::from_millis(2000);

/// Tunables for [`open_session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long element lookups wait for a match.
    pub implicit_wait: Duration,
    /// How long and how often to probe for readiness after opening.
    pub readiness: RetryPolicy,
    /// Element whose presence means the app has finished loading.
    ///
    /// When unset, readiness is judged from the server status alone.
    pub ready_locator: Option<Locator>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            implicit_wait: DEFAULT_IMPLICIT_WAIT,
            readiness: RetryPolicy::default(),
            ready_locator: None,
        }
    }
}

/// Errors that can occur while opening a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A driver call failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The session opened but the app never became ready.
    #[error(transparent)]
    NotReady(#[from] ReadinessError),
}

/// An open automation session.
///
/// Owns the driver addressing it. The session stays open until
/// [`end`](Self::end) is called; dropping it leaves the remote session to the
/// server's own command timeout.
pub struct Session<D: AutomationDriver> {
    driver: D,
    id: String,
    capabilities: Capabilities,
    status: Value,
}

impl<D: AutomationDriver> Session<D> {
    /// Server-assigned session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The capabilities the session was opened with.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Server status reported right after the session opened.
    pub fn status(&self) -> &Value {
        &self.status
    }

    /// Close the remote session.
    pub async fn end(mut self) -> Result<(), DriverError> {
        self.driver.quit().await
    }
}

/// Opens a session on `driver` and waits for it to become usable.
///
/// Steps, in order: open the session, fetch and log the server status, set
/// the implicit wait, then probe for readiness (the ready locator if one is
/// configured, otherwise the server status). Opening is attempted once.
///
/// # Errors
///
/// - [`SessionError::Driver`] if any driver call fails
/// - [`SessionError::NotReady`] if the readiness budget runs out
#[instrument(skip_all, fields(platform = %capabilities.platform_name))]
pub async fn open_session<D: AutomationDriver>(
    mut driver: D,
    capabilities: Capabilities,
    options: &SessionOptions,
) -> Result<Session<D>, SessionError> {
    let record = capabilities.clone();
    let id = driver.init_session(capabilities).await?;

    let status = driver.status().await?;
    info!(session_id = %id, %status, "automation server status");

    driver.set_implicit_wait(options.implicit_wait).await?;

    {
        let driver = &driver;
        let locator = options.ready_locator.as_ref();
        wait_until_ready(&options.readiness, "session", move || async move {
            match locator {
                Some(locator) => match driver.find_element(locator).await {
                    Ok(_) => ProbeOutcome::Ready,
                    Err(DriverError::NoSession) => ProbeOutcome::Abort("session closed".into()),
                    Err(e) => ProbeOutcome::NotReady(format!("{locator}: {e}")),
                },
                None => match driver.status().await {
                    Ok(status) if status_is_ready(&status) => ProbeOutcome::Ready,
                    Ok(_) => ProbeOutcome::NotReady("status reports not ready".into()),
                    Err(e) => ProbeOutcome::NotReady(e.to_string()),
                },
            }
        })
        .await?;
    }

    info!(session_id = %id, "session ready");
    Ok(Session {
        driver,
        id,
        capabilities: record,
        status,
    })
}

/// Opens a session for the configured platform and environment.
///
/// Local runs go to the Appium server on localhost, everything else to the
/// hosted grid.
pub async fn start_session(
    config: &TestConfig,
    options: &SessionOptions,
) -> Result<Session<WebDriverClient>, SessionError> {
    let endpoint = config.server_endpoint();
    info!(
        platform = %config.platform,
        environment = %config.environment,
        server = %endpoint.base_url,
        "starting session"
    );
    let driver = WebDriverClient::new(endpoint)?;
    open_session(driver, Capabilities::for_config(config), options).await
}
