//! Automation driver trait for backend-agnostic mobile UI automation.
//!
//! This module defines the [`AutomationDriver`] trait, the capability the rest
//! of the crate is written against: session lifecycle, element lookup and
//! geometry, text input and touch gestures. The production implementation is
//! [`WebDriverClient`](crate::webdriver::WebDriverClient), which talks to an
//! Appium server over HTTP. Tests substitute an in-memory fake so the session
//! factory and interaction helpers can be exercised without a device.
//!
//! # Backend Selection
//!
//! Use [`ServerEndpoint`] to point a backend at a local or hosted server:
//!
//! ```no_run
//! use devicetest_core::driver::ServerEndpoint;
//!
//! // Local Appium started by the launcher
//! let local = ServerEndpoint::local(4723);
//!
//! // Hosted grid with basic-auth credentials
//! let remote = ServerEndpoint::new("https://ondemand.saucelabs.com:443/wd/hub")
//!     .with_credentials("user", "access-key");
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::capabilities::Capabilities;
use crate::element::{ElementRef, Locator, Point, Size};
use crate::gesture::TouchAction;

/// Errors that can occur during automation driver operations.
///
/// This enum unifies transport failures and errors reported by the server
/// behind a single type so callers can propagate them with `?`.
#[derive(Error, Debug)]
pub enum DriverError {
    /// A command or operation failed with the given message.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// A session-scoped command was issued before a session was opened.
    #[error("No active session")]
    NoSession,

    /// The HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// An operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// The server reported a WebDriver error.
    #[error("{error}: {message}")]
    Remote {
        /// The WebDriver error code, e.g. `no such element`.
        error: String,
        /// Human-readable detail from the server.
        message: String,
    },

    /// Failed to parse a response body.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Returns true if the server reported that no element matched a locator.
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, DriverError::Remote { error, .. } if error == "no such element")
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DriverError::Timeout
        } else if err.is_decode() {
            DriverError::JsonParse(err.to_string())
        } else {
            DriverError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::JsonParse(err.to_string())
    }
}

/// Where an automation server can be reached.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    /// Base URL of the WebDriver API, without a trailing slash.
    pub base_url: String,
    /// Optional basic-auth user and key.
    pub credentials: Option<(String, String)>,
}

impl ServerEndpoint {
    /// An endpoint at `base_url` with no credentials.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            credentials: None,
        }
    }

    /// The endpoint of an Appium server listening on localhost.
    pub fn local(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{port}/wd/hub"))
    }

    pub fn with_credentials(mut self, user: impl Into<String>, key: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), key.into()));
        self
    }

    /// Joins a command path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

// Keeps access keys out of logs.
impl fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials.as_ref().map(|(u, _)| (u, "***")))
            .finish()
    }
}

/// Reads the `ready` flag of a server status payload.
///
/// Servers that omit the flag are treated as ready.
pub fn status_is_ready(status: &Value) -> bool {
    status.get("ready").and_then(Value::as_bool).unwrap_or(true)
}

/// Trait for backend-agnostic mobile UI automation.
///
/// Session-scoped methods take `&self`; opening and closing a session take
/// `&mut self` because they change which session the driver addresses.
///
/// # Required Methods
///
/// Implementors must provide every method except
/// [`find_element`](AutomationDriver::find_element), whose default reports the
/// lookup as unsupported.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Open a new session with the given capabilities.
    ///
    /// Returns the server-assigned session id. The capabilities are consumed;
    /// each session is opened from a freshly built set.
    async fn init_session(&mut self, capabilities: Capabilities) -> Result<String, DriverError>;

    /// The id of the open session, if any.
    fn session_id(&self) -> Option<&str>;

    /// Query the server status.
    ///
    /// Returns the `value` object of the status response.
    async fn status(&self) -> Result<Value, DriverError>;

    /// Configure how long element lookups wait for a match.
    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Find a single element.
    ///
    /// The default implementation reports the lookup as unsupported.
    async fn find_element(&self, locator: &Locator) -> Result<ElementRef, DriverError> {
        Err(DriverError::CommandFailed(format!(
            "find_element({locator}) not supported by this backend"
        )))
    }

    /// The element's top-left corner in screen coordinates.
    async fn element_location(&self, element: &ElementRef) -> Result<Point, DriverError>;

    /// The element's on-screen dimensions.
    async fn element_size(&self, element: &ElementRef) -> Result<Size, DriverError>;

    /// Clear the element's current content.
    async fn clear(&self, element: &ElementRef) -> Result<(), DriverError>;

    /// Type text into the element.
    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError>;

    /// Perform a touch gesture.
    async fn perform_touch(&self, action: &TouchAction) -> Result<(), DriverError>;

    /// Close the open session.
    async fn quit(&mut self) -> Result<(), DriverError>;
}
